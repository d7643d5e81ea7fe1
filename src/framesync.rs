use crate::detect::{CoarseEstimates, Detector};
use crate::msequence::MSequence;
use crate::nco::Nco;
use crate::packet::{Check, Fec, ModScheme, PacketModem};
use crate::params::Params;
use crate::pfb::FilterBank;
use crate::pilot::PilotSync;
use crate::ring::SampleRing;
use anyhow::Context;
use num_complex::Complex32;
use std::fs::File;
use std::io::{BufWriter, Write};

const DEBUG_BUFFER_LEN: usize = 1600;

/// Per-frame statistics handed to the callback.
#[derive(Clone, Copy, Debug)]
pub struct FrameStats<'a> {
    /// Error-vector magnitude. Not computed; always zero.
    pub evm: f32,
    /// Received signal strength from the detector's gain estimate, dB.
    pub rssi: f32,
    /// Carrier frequency offset in radians per sample.
    pub cfo: f32,
    /// The recovered data symbols.
    pub framesyms: &'a [Complex32],
    pub mod_scheme: ModScheme,
    pub mod_bps: u32,
    pub check: Check,
    pub fec0: Fec,
    pub fec1: Fec,
}

/// One decoded frame. All references point into receiver-owned storage and
/// are valid only for the duration of the callback.
#[derive(Debug)]
pub struct FrameEvent<'a> {
    pub header: &'a [u8],
    pub header_valid: bool,
    pub payload: &'a [u8],
    pub payload_valid: bool,
    pub stats: FrameStats<'a>,
}

pub type FrameCallback = Box<dyn FnMut(FrameEvent<'_>)>;

#[derive(Clone, Copy, Debug)]
enum State {
    Detect,
    RxPreamble { counter: usize },
    RxPayload { counter: usize },
}

/// Streaming frame synchronizer. Push samples through [`execute`]; the
/// callback fires once per completed frame, after which the receiver resets
/// itself and hunts for the next preamble.
///
/// [`execute`]: FrameSync::execute
pub struct FrameSync {
    callback: Option<FrameCallback>,
    p: Params,

    detector: Detector,
    est: CoarseEstimates,
    mixer: Nco,
    mf: FilterBank,
    mf_counter: usize,
    pfb_index: usize,

    preamble_pn: Vec<Complex32>,
    preamble_rx: Vec<Complex32>,

    payload_rx: Vec<Complex32>,
    payload_sym: Vec<Complex32>,
    payload_dec: Vec<u8>,
    dec: PacketModem,
    pilotsync: PilotSync,

    state: State,

    debug_enabled: bool,
    debug_ring: Option<SampleRing>,
}

impl FrameSync {
    pub fn new(callback: Option<FrameCallback>) -> anyhow::Result<Self> {
        Self::with_params(Params::default(), callback)
    }

    pub fn with_params(p: Params, callback: Option<FrameCallback>) -> anyhow::Result<Self> {
        let mut ms = MSequence::new(p.pn_degree, p.pn_genpoly, 1);
        let preamble_pn: Vec<Complex32> = (0..p.preamble_len)
            .map(|_| {
                if ms.advance() != 0 {
                    Complex32::new(1.0, 0.0)
                } else {
                    Complex32::new(-1.0, 0.0)
                }
            })
            .collect();

        let mut detector = Detector::new(&preamble_pn, p.k, p.m, p.beta)?;
        detector.set_threshold(p.detect_threshold);

        let mf = FilterBank::new(p.npfb, p.k, p.m, p.beta)?;

        let dec = PacketModem::new(p.payload_len)?;
        anyhow::ensure!(
            dec.frame_len() == p.data_symbols(),
            "packet modem produces {} symbols, params expect {}",
            dec.frame_len(),
            p.data_symbols()
        );
        let pilotsync = PilotSync::new(dec.frame_len(), p.pilot_spacing)?;
        anyhow::ensure!(
            pilotsync.frame_len() == p.pilot_frame_len(),
            "pilot framing holds {} symbols, params expect {}",
            pilotsync.frame_len(),
            p.pilot_frame_len()
        );
        anyhow::ensure!(
            p.header_len < p.payload_len,
            "header must leave room for the packet body"
        );

        let preamble_rx = vec![Complex32::new(0.0, 0.0); p.preamble_len];
        let payload_rx = vec![Complex32::new(0.0, 0.0); pilotsync.frame_len()];
        let payload_sym = Vec::with_capacity(dec.frame_len());
        let payload_dec = vec![0u8; p.payload_len];

        let mut q = Self {
            callback,
            p,
            detector,
            est: CoarseEstimates::default(),
            mixer: Nco::new(),
            mf,
            mf_counter: 0,
            pfb_index: 0,
            preamble_pn,
            preamble_rx,
            payload_rx,
            payload_sym,
            payload_dec,
            dec,
            pilotsync,
            state: State::Detect,
            debug_enabled: false,
            debug_ring: None,
        };
        q.reset();
        Ok(q)
    }

    /// Consume a block of samples in order. The callback may fire any number
    /// of times during the call, once per frame completed within it.
    pub fn execute(&mut self, samples: &[Complex32]) {
        for &x in samples {
            if self.debug_enabled {
                if let Some(ring) = self.debug_ring.as_mut() {
                    ring.push(x);
                }
            }
            match self.state {
                State::Detect => self.execute_detect(x),
                State::RxPreamble { .. } => self.execute_rxpreamble(x),
                State::RxPayload { .. } => self.execute_rxpayload(x),
            }
        }
    }

    /// Return to frame hunting without deallocating. Counters clear, the
    /// DSP sub-objects reset, buffers are reused for the next frame.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.mixer.reset();
        self.mf.reset();
        self.mf_counter = 0;
        self.pfb_index = 0;
        self.state = State::Detect;
    }

    pub fn print(&self) {
        println!(
            "framesync: preamble {} syms, payload {} syms ({} data), packet {} bytes, k={}, m={}, beta={}",
            self.p.preamble_len,
            self.pilotsync.frame_len(),
            self.dec.frame_len(),
            self.p.payload_len,
            self.p.k,
            self.p.m,
            self.p.beta,
        );
    }

    fn execute_detect(&mut self, x: Complex32) {
        let Some(buf) = self.detector.execute(x) else {
            return;
        };

        self.est = self.detector.estimates();
        log::info!(
            "frame detected: tau={:+.4}, dphi={:+.5}, gamma={:.2} dB",
            self.est.tau,
            self.est.dphi,
            20.0 * self.est.gamma.log10()
        );

        // Hand the coarse estimates to the tracking chain. The 0.5 folds the
        // samples-per-symbol gain of the matched cascade into the amplitude
        // correction.
        self.mf.set_scale(0.5 / self.est.gamma);
        self.pfb_index = 0;
        self.mixer.set_frequency(self.est.dphi);
        self.mixer.set_phase(self.est.phi);

        self.state = State::RxPreamble { counter: 0 };

        // Replay the detector's buffered samples through the normal path.
        // The state is no longer Detect, so the recursion is depth one.
        self.execute(&buf);
    }

    /// Mix one sample down, advance it through the matched filter, and
    /// return the symbol when the decimation counter lines up. Firing on
    /// count one (not zero) places the symbol grid one sample into the
    /// replayed buffer, where the detector put the first symbol peak.
    fn step(&mut self, x: Complex32) -> Option<Complex32> {
        let v = self.mixer.mix_down(x);
        self.mixer.step();

        self.mf.push(v);
        let out = self.mf.execute(self.pfb_index);

        self.mf_counter += 1;
        let available = self.mf_counter == 1;
        self.mf_counter %= self.p.k;
        available.then_some(out)
    }

    fn execute_rxpreamble(&mut self, x: Complex32) {
        let Some(sym) = self.step(x) else {
            return;
        };
        let State::RxPreamble { counter } = self.state else {
            unreachable!()
        };

        // The first 2m symbols are matched-filter settling transients.
        let settle = 2 * self.p.m;
        if counter >= settle {
            self.preamble_rx[counter - settle] = sym;
        }

        let counter = counter + 1;
        self.state = if counter == self.p.preamble_len + settle {
            State::RxPayload { counter: 0 }
        } else {
            State::RxPreamble { counter }
        };
    }

    fn execute_rxpayload(&mut self, x: Complex32) {
        let Some(sym) = self.step(x) else {
            return;
        };
        let State::RxPayload { counter } = self.state else {
            unreachable!()
        };

        self.payload_rx[counter] = sym;
        let counter = counter + 1;
        if counter < self.pilotsync.frame_len() {
            self.state = State::RxPayload { counter };
            return;
        }

        // Full pilot frame accumulated: strip pilots, decode, dispatch.
        self.pilotsync.execute(&self.payload_rx, &mut self.payload_sym);
        let payload_valid = self.dec.decode(&self.payload_sym, &mut self.payload_dec);

        if let Some(cb) = self.callback.as_mut() {
            let stats = FrameStats {
                evm: 0.0,
                rssi: 20.0 * self.est.gamma.log10(),
                cfo: self.mixer.frequency(),
                framesyms: &self.payload_sym,
                mod_scheme: ModScheme::Qpsk,
                mod_bps: 2,
                check: Check::Crc24,
                fec0: Fec::None,
                fec1: Fec::Golay2412,
            };
            cb(FrameEvent {
                header: &self.payload_dec[..self.p.header_len],
                header_valid: payload_valid,
                payload: &self.payload_dec[self.p.header_len..],
                payload_valid,
                stats,
            });
        }

        self.reset();
    }

    /// Start capturing raw input into the trace ring. Idempotent; may be
    /// called in any state.
    pub fn debug_enable(&mut self) {
        if self.debug_ring.is_none() {
            self.debug_ring = Some(SampleRing::new(DEBUG_BUFFER_LEN));
        }
        self.debug_enabled = true;
    }

    pub fn debug_disable(&mut self) {
        self.debug_enabled = false;
    }

    /// Write an Octave script with the captured input, the p/n reference,
    /// the received preamble and the recovered payload symbols.
    pub fn debug_print(&self, path: &str) -> anyhow::Result<()> {
        let Some(ring) = self.debug_ring.as_ref() else {
            log::warn!("debug_print: debugging was never enabled");
            return Ok(());
        };

        let file = File::create(path).with_context(|| format!("create {path}"))?;
        let mut w = BufWriter::new(file);

        writeln!(w, "% {path}: auto-generated receiver trace")?;
        writeln!(w)?;
        writeln!(w, "clear all;")?;
        writeln!(w, "close all;")?;
        writeln!(w)?;
        writeln!(w, "n = {DEBUG_BUFFER_LEN};")?;

        writeln!(w, "x = zeros(1,n);")?;
        for (i, v) in ring.snapshot().iter().enumerate() {
            writeln!(w, "x({:4}) = {:12.4e} + 1i*{:12.4e};", i + 1, v.re, v.im)?;
        }
        writeln!(w)?;
        writeln!(w, "figure;")?;
        writeln!(w, "plot(1:length(x),real(x), 1:length(x),imag(x));")?;
        writeln!(w, "ylabel('received signal, x');")?;
        writeln!(w)?;

        writeln!(w, "preamble_pn = zeros(1,{});", self.preamble_pn.len())?;
        for (i, v) in self.preamble_pn.iter().enumerate() {
            writeln!(
                w,
                "preamble_pn({:4}) = {:12.4e} + 1i*{:12.4e};",
                i + 1,
                v.re,
                v.im
            )?;
        }
        writeln!(w, "preamble_rx = zeros(1,{});", self.preamble_rx.len())?;
        for (i, v) in self.preamble_rx.iter().enumerate() {
            writeln!(
                w,
                "preamble_rx({:4}) = {:12.4e} + 1i*{:12.4e};",
                i + 1,
                v.re,
                v.im
            )?;
        }
        writeln!(w)?;

        writeln!(w, "payload_syms = zeros(1,{});", self.dec.frame_len())?;
        for (i, v) in self.payload_sym.iter().enumerate() {
            writeln!(
                w,
                "payload_syms({:4}) = {:12.4e} + 1i*{:12.4e};",
                i + 1,
                v.re,
                v.im
            )?;
        }
        writeln!(w)?;
        writeln!(w, "figure;")?;
        writeln!(w, "plot(real(payload_syms),imag(payload_syms),'o');")?;
        writeln!(w, "xlabel('in-phase');")?;
        writeln!(w, "ylabel('quadrature phase');")?;
        writeln!(w, "grid on;")?;
        writeln!(w, "axis([-1 1 -1 1]*1.5);")?;
        writeln!(w, "axis square;")?;

        w.flush().context("flush debug trace")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_print_without_enable_is_a_no_op() {
        let fs = FrameSync::new(None).unwrap();
        let path = std::env::temp_dir().join("burst64_no_debug.m");
        fs.debug_print(path.to_str().unwrap()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn debug_trace_is_written_and_deterministic() {
        let mut fs = FrameSync::new(None).unwrap();
        fs.debug_enable();
        fs.debug_enable(); // idempotent
        let samples: Vec<Complex32> = (0..64)
            .map(|i| Complex32::new((i as f32 * 0.1).sin(), (i as f32 * 0.1).cos()))
            .collect();
        fs.execute(&samples);

        let dir = std::env::temp_dir();
        let a = dir.join("burst64_trace_a.m");
        let b = dir.join("burst64_trace_b.m");
        fs.debug_print(a.to_str().unwrap()).unwrap();
        fs.debug_print(b.to_str().unwrap()).unwrap();
        let ta = std::fs::read_to_string(&a).unwrap();
        let tb = std::fs::read_to_string(&b).unwrap();
        assert!(ta.contains("preamble_pn"));
        // Path comments differ; the data body must not.
        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with('%'))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&ta), strip(&tb));
    }
}
