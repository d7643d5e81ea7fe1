use crate::golay::GolayCodec;
use num_complex::Complex32;

/// Integrity check carried by a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Check {
    Crc24,
}

/// Forward error correction schemes carried by a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fec {
    None,
    Golay2412,
}

/// Modulation schemes carried by a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModScheme {
    Qpsk,
}

const CRC24_POLY: u32 = 0x86_4CFB;
const CRC24_INIT: u32 = 0xB7_04CE;

const fn crc24_table() -> [u32; 256] {
    let mut tbl = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut c = (i as u32) << 16;
        let mut k = 0;
        while k < 8 {
            if c & 0x80_0000 != 0 {
                c = (c << 1) ^ CRC24_POLY;
            } else {
                c <<= 1;
            }
            k += 1;
        }
        tbl[i] = c & 0xff_ffff;
        i += 1;
    }
    tbl
}

const CRC24_TBL: [u32; 256] = crc24_table();

pub fn crc24(data: &[u8]) -> u32 {
    let mut crc: u32 = CRC24_INIT;
    for &b in data {
        let idx = (((crc >> 16) ^ (b as u32)) & 0xff) as usize;
        crc = ((crc << 8) ^ CRC24_TBL[idx]) & 0xff_ffff;
    }
    crc
}

const QPSK_AMP: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Gray-map two bits onto a unit-energy QPSK point.
pub fn qpsk_modulate(bits: u8) -> Complex32 {
    let re = if bits & 0b10 == 0 { QPSK_AMP } else { -QPSK_AMP };
    let im = if bits & 0b01 == 0 { QPSK_AMP } else { -QPSK_AMP };
    Complex32::new(re, im)
}

pub fn qpsk_demodulate(x: Complex32) -> u8 {
    (((x.re < 0.0) as u8) << 1) | ((x.im < 0.0) as u8)
}

fn bytes_to_bits_be(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 8);
    for &b in bytes {
        for bit in (0..8).rev() {
            out.push((b >> bit) & 1);
        }
    }
    out
}

fn bits_be_to_bytes(bits: &[u8]) -> Vec<u8> {
    debug_assert!(bits.len() % 8 == 0);
    let mut out = Vec::with_capacity(bits.len() / 8);
    for chunk in bits.chunks_exact(8) {
        let mut b = 0u8;
        for &v in chunk {
            b = (b << 1) | (v & 1);
        }
        out.push(b);
    }
    out
}

/// Packet-level modem: payload bytes + CRC-24, Golay(24,12) inner code,
/// QPSK symbols. Encode and decode are exact inverses on a clean channel.
#[derive(Clone, Debug)]
pub struct PacketModem {
    golay: GolayCodec,
    payload_len: usize,
    frame_len: usize,
}

impl PacketModem {
    pub fn new(payload_len: usize) -> anyhow::Result<Self> {
        let protected_bits = (payload_len + 3) * 8;
        if protected_bits % 12 != 0 {
            anyhow::bail!("payload length {payload_len} does not fill whole Golay blocks");
        }
        // Rate-1/2 code doubles the bits, QPSK halves them back.
        let frame_len = protected_bits;
        Ok(Self {
            golay: GolayCodec::new(),
            payload_len,
            frame_len,
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Data symbols per encoded packet.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn encode(&self, payload: &[u8]) -> anyhow::Result<Vec<Complex32>> {
        if payload.len() != self.payload_len {
            anyhow::bail!(
                "payload must be {} bytes, got {}",
                self.payload_len,
                payload.len()
            );
        }
        let mut msg = payload.to_vec();
        let crc = crc24(payload);
        msg.push((crc >> 16) as u8);
        msg.push((crc >> 8) as u8);
        msg.push(crc as u8);

        let bits = bytes_to_bits_be(&msg);
        let mut coded = Vec::with_capacity(bits.len() * 2);
        for chunk in bits.chunks_exact(12) {
            let mut d = 0u16;
            for &b in chunk {
                d = (d << 1) | (b as u16);
            }
            let cw = self.golay.encode(d);
            for bit in (0..24).rev() {
                coded.push(((cw >> bit) & 1) as u8);
            }
        }

        let syms = coded
            .chunks_exact(2)
            .map(|pair| qpsk_modulate((pair[0] << 1) | pair[1]))
            .collect();
        Ok(syms)
    }

    /// Hard-decision decode of `frame_len` symbols into `payload_len` bytes.
    /// Returns whether the recovered bytes pass the CRC.
    pub fn decode(&self, syms: &[Complex32], out: &mut [u8]) -> bool {
        debug_assert_eq!(syms.len(), self.frame_len);
        debug_assert_eq!(out.len(), self.payload_len);

        let mut coded = Vec::with_capacity(syms.len() * 2);
        for &s in syms {
            let v = qpsk_demodulate(s);
            coded.push((v >> 1) & 1);
            coded.push(v & 1);
        }

        let mut bits = Vec::with_capacity(coded.len() / 2);
        for chunk in coded.chunks_exact(24) {
            let mut cw = 0u32;
            for &b in chunk {
                cw = (cw << 1) | (b as u32);
            }
            let d = self.golay.decode(cw);
            for bit in (0..12).rev() {
                bits.push(((d >> bit) & 1) as u8);
            }
        }

        let bytes = bits_be_to_bytes(&bits);
        out.copy_from_slice(&bytes[..self.payload_len]);
        let rx_crc = ((bytes[self.payload_len] as u32) << 16)
            | ((bytes[self.payload_len + 1] as u32) << 8)
            | (bytes[self.payload_len + 2] as u32);
        crc24(out) == rx_crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31) ^ 0x5a).collect()
    }

    #[test]
    fn crc24_detects_single_byte_change() {
        let a = crc24(b"123456789");
        let b = crc24(b"123456788");
        assert_ne!(a, b);
        assert_eq!(a & !0xff_ffff, 0);
    }

    #[test]
    fn qpsk_map_demap_inverse() {
        for bits in 0..4u8 {
            let s = qpsk_modulate(bits);
            assert!((s.norm() - 1.0).abs() < 1e-6);
            assert_eq!(qpsk_demodulate(s), bits);
        }
    }

    #[test]
    fn packet_frame_len_is_600_for_72_bytes() {
        let modem = PacketModem::new(72).unwrap();
        assert_eq!(modem.frame_len(), 600);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let modem = PacketModem::new(72).unwrap();
        let payload = test_payload(72);
        let syms = modem.encode(&payload).unwrap();
        assert_eq!(syms.len(), 600);

        let mut out = vec![0u8; 72];
        assert!(modem.decode(&syms, &mut out));
        assert_eq!(out, payload);
    }

    #[test]
    fn few_symbol_errors_are_corrected() {
        let modem = PacketModem::new(72).unwrap();
        let payload = test_payload(72);
        let mut syms = modem.encode(&payload).unwrap();
        // One flipped symbol per codeword region stays inside the Golay
        // correction radius.
        for i in (0..600).step_by(60) {
            syms[i] = -syms[i];
        }
        let mut out = vec![0u8; 72];
        assert!(modem.decode(&syms, &mut out));
        assert_eq!(out, payload);
    }

    #[test]
    fn heavy_corruption_fails_the_check() {
        let modem = PacketModem::new(72).unwrap();
        let payload = test_payload(72);
        let mut syms = modem.encode(&payload).unwrap();
        for (i, s) in syms.iter_mut().enumerate() {
            if i % 3 == 0 {
                *s = -*s;
            }
        }
        let mut out = vec![0u8; 72];
        assert!(!modem.decode(&syms, &mut out));
    }
}
