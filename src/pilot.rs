use crate::msequence::MSequence;
use crate::packet::qpsk_modulate;
use num_complex::Complex32;

const PILOT_PN_DEGREE: u32 = 7;
const PILOT_PN_GENPOLY: u32 = 0x89;

/// Known pilot symbols: QPSK points drawn from a degree-7 m-sequence.
fn pilot_sequence(n: usize) -> Vec<Complex32> {
    let mut ms = MSequence::new(PILOT_PN_DEGREE, PILOT_PN_GENPOLY, 1);
    (0..n)
        .map(|_| {
            let bits = (ms.advance() << 1) | ms.advance();
            qpsk_modulate(bits)
        })
        .collect()
}

fn validate(payload_len: usize, spacing: usize) -> anyhow::Result<usize> {
    if spacing < 2 {
        anyhow::bail!("pilot spacing must be at least 2");
    }
    if payload_len == 0 || payload_len % (spacing - 1) != 0 {
        anyhow::bail!("payload length {payload_len} does not fill whole pilot blocks");
    }
    Ok(payload_len / (spacing - 1))
}

/// Inserts one known pilot at the head of every `spacing`-symbol block.
#[derive(Clone, Debug)]
pub struct PilotGen {
    pilots: Vec<Complex32>,
    spacing: usize,
    payload_len: usize,
}

impl PilotGen {
    pub fn new(payload_len: usize, spacing: usize) -> anyhow::Result<Self> {
        let num_pilots = validate(payload_len, spacing)?;
        Ok(Self {
            pilots: pilot_sequence(num_pilots),
            spacing,
            payload_len,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.payload_len + self.pilots.len()
    }

    pub fn execute(&self, data: &[Complex32]) -> Vec<Complex32> {
        debug_assert_eq!(data.len(), self.payload_len);
        let mut out = Vec::with_capacity(self.frame_len());
        for (block, chunk) in data.chunks(self.spacing - 1).enumerate() {
            out.push(self.pilots[block]);
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// Recovers the data symbols from a pilot-framed block: estimates residual
/// carrier frequency, phase and gain from the received pilots, then emits
/// the corrected data symbols with the pilots stripped.
#[derive(Clone, Debug)]
pub struct PilotSync {
    pilots: Vec<Complex32>,
    spacing: usize,
    payload_len: usize,
}

impl PilotSync {
    pub fn new(payload_len: usize, spacing: usize) -> anyhow::Result<Self> {
        let num_pilots = validate(payload_len, spacing)?;
        Ok(Self {
            pilots: pilot_sequence(num_pilots),
            spacing,
            payload_len,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.payload_len + self.pilots.len()
    }

    pub fn execute(&self, rx: &[Complex32], out: &mut Vec<Complex32>) {
        debug_assert_eq!(rx.len(), self.frame_len());

        // Received pilots against the reference.
        let v: Vec<Complex32> = self
            .pilots
            .iter()
            .enumerate()
            .map(|(i, p)| rx[i * self.spacing] * p.conj())
            .collect();

        // Residual frequency from the phase advance between adjacent pilots.
        let mut acc = Complex32::new(0.0, 0.0);
        for w in v.windows(2) {
            acc += w[1] * w[0].conj();
        }
        let dphi = acc.arg() / self.spacing as f32;

        // Frequency-corrected phase and gain.
        let mut psum = Complex32::new(0.0, 0.0);
        let mut gsum = 0.0f32;
        for (i, &vi) in v.iter().enumerate() {
            psum += vi * Complex32::from_polar(1.0, -dphi * (i * self.spacing) as f32);
            gsum += vi.norm();
        }
        let phi = psum.arg();
        let gain = gsum / v.len() as f32 + 1e-18;

        out.clear();
        for (n, &x) in rx.iter().enumerate() {
            if n % self.spacing == 0 {
                continue;
            }
            out.push(x * Complex32::from_polar(1.0 / gain, -(phi + dphi * n as f32)));
        }
    }
}
