use anyhow::Context;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Params {
    /// Samples per symbol at the receiver input.
    pub k: usize,
    /// Pulse-shaping filter delay in symbols.
    pub m: usize,
    /// Root-raised-cosine excess bandwidth.
    pub beta: f64,
    /// Number of sub-filters in the polyphase matched-filter bank.
    pub npfb: usize,

    /// Length of the p/n preamble in symbols.
    pub preamble_len: usize,
    /// Decoded packet length in bytes (header + body).
    pub payload_len: usize,
    /// Header length in bytes (leading part of the packet).
    pub header_len: usize,
    /// One pilot symbol per `pilot_spacing` payload symbols.
    pub pilot_spacing: usize,

    /// Preamble LFSR degree.
    pub pn_degree: u32,
    /// Preamble LFSR generator polynomial.
    pub pn_genpoly: u32,

    /// Normalized preamble-correlation detection threshold.
    pub detect_threshold: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            k: 2,
            m: 3,
            beta: 0.5,
            npfb: 32,
            preamble_len: 64,
            payload_len: 72,
            header_len: 8,
            pilot_spacing: 21,
            pn_degree: 6,
            pn_genpoly: 0x43,
            detect_threshold: 0.5,
        }
    }
}

impl Params {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read params file {path}"))?;
        let params: Params = toml::from_str(&content).context("parse params toml")?;
        Ok(params)
    }

    /// Data symbols per frame. The 24-bit check adds 3 bytes, the rate-1/2
    /// inner code doubles the bit count and QPSK halves it back, so the
    /// symbol count equals the protected bit count.
    pub fn data_symbols(&self) -> usize {
        (self.payload_len + 3) * 8
    }

    /// Payload symbols including pilots.
    pub fn pilot_frame_len(&self) -> usize {
        let blocks = self.data_symbols() / (self.pilot_spacing - 1);
        self.data_symbols() + blocks
    }

    /// Length of the pulse-shaped preamble in samples.
    pub fn preamble_samples(&self) -> usize {
        self.k * (self.preamble_len + 2 * self.m)
    }

    /// Full frame length in samples, filter tail included.
    pub fn frame_samples(&self) -> usize {
        self.k * (self.preamble_len + self.pilot_frame_len() + 2 * self.m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_derived_lengths() {
        let p = Params::default();
        assert_eq!(p.data_symbols(), 600);
        assert_eq!(p.pilot_frame_len(), 630);
        assert_eq!(p.preamble_samples(), 140);
        assert_eq!(p.frame_samples(), 1400);
    }
}
