use crate::msequence::MSequence;
use crate::packet::PacketModem;
use crate::params::Params;
use crate::pfb::{rrc_taps, shape_symbols};
use crate::pilot::PilotGen;
use num_complex::Complex32;

/// Frame generator: the transmit side matching the receiver's fixed format.
/// One call produces a complete frame: the p/n preamble symbols followed by
/// the pilot-framed packet symbols, upsampled and pulse-shaped.
pub struct FrameGen {
    preamble_pn: Vec<Complex32>,
    taps: Vec<f32>,
    k: usize,
    modem: PacketModem,
    pilotgen: PilotGen,
    payload_len: usize,
    frame_samples: usize,
}

impl FrameGen {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_params(Params::default())
    }

    pub fn with_params(p: Params) -> anyhow::Result<Self> {
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

        let root = (p.k as f32).sqrt();
        let taps: Vec<f32> = rrc_taps(p.beta, p.k, 2 * p.m)?
            .into_iter()
            .map(|t| t * root)
            .collect();

        let modem = PacketModem::new(p.payload_len)?;
        anyhow::ensure!(
            modem.frame_len() == p.data_symbols(),
            "packet modem produces {} symbols, params expect {}",
            modem.frame_len(),
            p.data_symbols()
        );
        let pilotgen = PilotGen::new(modem.frame_len(), p.pilot_spacing)?;
        anyhow::ensure!(
            pilotgen.frame_len() == p.pilot_frame_len(),
            "pilot framing produces {} symbols, params expect {}",
            pilotgen.frame_len(),
            p.pilot_frame_len()
        );

        Ok(Self {
            preamble_pn,
            taps,
            k: p.k,
            modem,
            pilotgen,
            payload_len: p.payload_len,
            frame_samples: p.frame_samples(),
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Samples per generated frame, filter tail included.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Modulate one packet into a complete frame.
    pub fn execute(&self, payload: &[u8]) -> anyhow::Result<Vec<Complex32>> {
        let data = self.modem.encode(payload)?;
        let framed = self.pilotgen.execute(&data);

        let mut syms = Vec::with_capacity(self.preamble_pn.len() + framed.len());
        syms.extend_from_slice(&self.preamble_pn);
        syms.extend_from_slice(&framed);

        let out = shape_symbols(&syms, &self.taps, self.k);
        debug_assert_eq!(out.len(), self.frame_samples);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_expected_length_and_is_deterministic() {
        let gen = FrameGen::new().unwrap();
        let payload: Vec<u8> = (0..72).map(|i| i as u8).collect();
        let a = gen.execute(&payload).unwrap();
        let b = gen.execute(&payload).unwrap();
        assert_eq!(a.len(), 1400);
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_payload_length_is_rejected() {
        let gen = FrameGen::new().unwrap();
        assert!(gen.execute(&[0u8; 71]).is_err());
    }
}
