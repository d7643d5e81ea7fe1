use anyhow::Context;
use burst64::framegen::FrameGen;
use burst64::params::Params;
use clap::Parser;
use num_complex::Complex32;
use std::io::Write;

#[derive(Parser, Debug)]
#[command(about = "burst64 frame generator: writes interleaved f32 LE I/Q")]
struct Args {
    /// Output path (`-` for stdout).
    #[arg(long, default_value = "-")]
    out: String,

    /// ASCII text placed at the start of the 64-byte packet body.
    #[arg(long, default_value = "hello, burst64")]
    message: String,

    /// Number of frames to emit.
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Silence before the first frame (samples).
    #[arg(long, default_value_t = 512)]
    lead: usize,

    /// Silence between frames (samples).
    #[arg(long, default_value_t = 256)]
    gap: usize,

    /// Carrier frequency offset applied to the stream (radians/sample).
    #[arg(long, default_value_t = 0.0)]
    cfo: f32,

    /// Channel gain (linear).
    #[arg(long, default_value_t = 1.0)]
    gain: f32,

    /// AWGN stddev per I/Q component (0 = no noise).
    #[arg(long, default_value_t = 0.0)]
    noise_std: f32,

    /// Load PHY parameters from a TOML file.
    #[arg(long)]
    params: Option<String>,

    /// RNG seed for the noise.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

struct Rng64 {
    st: u64,
}

impl Rng64 {
    fn new(seed: u64) -> Self {
        Self {
            st: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.st;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.st = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_f32(&mut self) -> f32 {
        let u = (self.next_u64() >> 40) as u32;
        ((u as f32) + 1.0) / ((1u32 << 24) as f32 + 2.0)
    }
}

struct Gauss {
    have: bool,
    spare: f32,
}

impl Gauss {
    fn new() -> Self {
        Self {
            have: false,
            spare: 0.0,
        }
    }

    fn next(&mut self, rng: &mut Rng64) -> f32 {
        if self.have {
            self.have = false;
            return self.spare;
        }
        let u1 = rng.next_f32().max(1e-12);
        let u2 = rng.next_f32();
        let r = (-2.0 * u1.ln()).sqrt();
        let th = 2.0 * std::f32::consts::PI * u2;
        self.have = true;
        self.spare = r * th.sin();
        r * th.cos()
    }
}

struct Channel {
    gain: f32,
    cfo: f32,
    noise_std: f32,
    phi: f32,
    rng: Rng64,
    gauss: Gauss,
}

impl Channel {
    fn apply(&mut self, x: Complex32) -> Complex32 {
        let mut y = x * Complex32::from_polar(self.gain, self.phi);
        self.phi += self.cfo;
        if self.phi.abs() > 1000.0 {
            self.phi = self.phi.rem_euclid(2.0 * std::f32::consts::PI);
        }
        if self.noise_std > 0.0 {
            y += Complex32::new(
                self.noise_std * self.gauss.next(&mut self.rng),
                self.noise_std * self.gauss.next(&mut self.rng),
            );
        }
        y
    }
}

fn build_packet(message: &str, index: u32, header_len: usize, payload_len: usize) -> Vec<u8> {
    let mut packet = vec![0u8; payload_len];
    packet[..3].copy_from_slice(b"B64");
    packet[4..8].copy_from_slice(&index.to_be_bytes());
    let body = &mut packet[header_len..];
    let msg = message.as_bytes();
    let n = msg.len().min(body.len());
    body[..n].copy_from_slice(&msg[..n]);
    packet
}

fn write_samples(w: &mut impl Write, xs: &[Complex32], ch: &mut Channel) -> anyhow::Result<()> {
    let mut out = Vec::with_capacity(xs.len() * 8);
    for &x in xs {
        let y = ch.apply(x);
        out.extend_from_slice(&y.re.to_le_bytes());
        out.extend_from_slice(&y.im.to_le_bytes());
    }
    w.write_all(&out).context("write samples")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let p = if let Some(path) = args.params.as_deref() {
        Params::from_file(path)?
    } else {
        Params::default()
    };
    let header_len = p.header_len;
    let payload_len = p.payload_len;
    let gen = FrameGen::with_params(p)?;

    let mut writer: Box<dyn Write> = if args.out == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(
            std::fs::File::create(&args.out).with_context(|| format!("create {}", args.out))?,
        )
    };

    let mut ch = Channel {
        gain: args.gain,
        cfo: args.cfo,
        noise_std: args.noise_std,
        phi: 0.0,
        rng: Rng64::new(args.seed),
        gauss: Gauss::new(),
    };

    let silence = vec![Complex32::new(0.0, 0.0); 256];
    let send_silence = |w: &mut Box<dyn Write>, ch: &mut Channel, n: usize| -> anyhow::Result<()> {
        let mut left = n;
        while left > 0 {
            let take = left.min(silence.len());
            write_samples(w, &silence[..take], ch)?;
            left -= take;
        }
        Ok(())
    };

    send_silence(&mut writer, &mut ch, args.lead)?;
    for idx in 0..args.frames {
        let packet = build_packet(&args.message, idx, header_len, payload_len);
        let samples = gen.execute(&packet)?;
        write_samples(&mut writer, &samples, &mut ch)?;
        eprintln!(
            "[tx] frame={} samples={} gain={} cfo={:+.5} noise_std={}",
            idx,
            samples.len(),
            args.gain,
            args.cfo,
            args.noise_std
        );
        if idx + 1 < args.frames {
            send_silence(&mut writer, &mut ch, args.gap)?;
        }
    }
    send_silence(&mut writer, &mut ch, 64)?;
    writer.flush().context("flush output")?;
    Ok(())
}
