use anyhow::Context;
use burst64::framesync::{FrameCallback, FrameSync};
use burst64::params::Params;
use clap::Parser;
use num_complex::Complex32;
use std::cell::Cell;
use std::io::Read;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(about = "burst64 receiver: reads interleaved f32 LE I/Q")]
struct Args {
    /// Input path (`-` for stdin).
    #[arg(long, default_value = "-")]
    input: String,

    /// Load PHY parameters from a TOML file.
    #[arg(long)]
    params: Option<String>,

    /// Samples per execute chunk.
    #[arg(long, default_value_t = 4096)]
    chunk: usize,

    /// Write a receiver trace script to this path after the stream ends.
    #[arg(long)]
    debug_out: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let p = if let Some(path) = args.params.as_deref() {
        Params::from_file(path)?
    } else {
        Params::default()
    };

    let count = Rc::new(Cell::new(0u64));
    let sink = count.clone();
    let callback: FrameCallback = Box::new(move |ev| {
        sink.set(sink.get() + 1);
        let end = ev
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ev.payload.len());
        let text = String::from_utf8_lossy(&ev.payload[..end]);
        println!(
            "[rx] frame {}: valid={} rssi={:.1}dB cfo={:+.5} header={:02x?} payload=\"{}\"",
            sink.get(),
            ev.payload_valid,
            ev.stats.rssi,
            ev.stats.cfo,
            ev.header,
            text
        );
    });

    let mut sync = FrameSync::with_params(p, Some(callback))?;
    if args.debug_out.is_some() {
        sync.debug_enable();
    }

    let mut reader: Box<dyn Read> = if args.input == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(
            std::fs::File::open(&args.input).with_context(|| format!("open {}", args.input))?,
        )
    };

    let chunk = args.chunk.max(1);
    let mut io_buf = vec![0u8; chunk * 8];
    let mut stash: Vec<u8> = Vec::new();
    let mut samples: Vec<Complex32> = Vec::with_capacity(chunk);
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut io_buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(e).context("read input"),
        };
        stash.extend_from_slice(&io_buf[..n]);

        let n_samp = stash.len() / 8;
        if n_samp == 0 {
            continue;
        }
        samples.clear();
        for i in 0..n_samp {
            let off = i * 8;
            let re = f32::from_le_bytes(stash[off..off + 4].try_into().unwrap());
            let im = f32::from_le_bytes(stash[off + 4..off + 8].try_into().unwrap());
            samples.push(Complex32::new(re, im));
        }
        stash.drain(..n_samp * 8);

        sync.execute(&samples);
        total += n_samp as u64;
    }

    eprintln!("[rx] stream ended: {} samples, {} frames", total, count.get());
    if let Some(path) = args.debug_out.as_deref() {
        sync.debug_print(path)?;
        eprintln!("[rx] trace written to {path}");
    }
    Ok(())
}
