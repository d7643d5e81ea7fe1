use num_complex::Complex32;

/// Root-raised-cosine taps at `sps` samples per symbol spanning
/// `span_symbols` symbols, normalized to unit energy.
pub fn rrc_taps(beta: f64, sps: usize, span_symbols: usize) -> anyhow::Result<Vec<f32>> {
    if !(0.0 < beta && beta <= 1.0) {
        anyhow::bail!("beta must be in (0,1]");
    }
    if span_symbols == 0 || span_symbols % 2 != 0 {
        anyhow::bail!("span_symbols must be a positive even integer");
    }
    if sps == 0 {
        anyhow::bail!("sps must be positive");
    }

    let n_taps = span_symbols * sps + 1;
    let center = (n_taps as f64 - 1.0) / 2.0;
    let pi = std::f64::consts::PI;

    let mut h = vec![0f64; n_taps];
    for (i, h_i) in h.iter_mut().enumerate() {
        let t = (i as f64 - center) / (sps as f64);
        if t.abs() < 1e-12 {
            *h_i = 1.0 - beta + 4.0 * beta / pi;
            continue;
        }
        if (t.abs() - 1.0 / (4.0 * beta)).abs() < 1e-9 {
            *h_i = (beta / 2.0_f64.sqrt())
                * ((1.0 + 2.0 / pi) * (pi / (4.0 * beta)).sin()
                    + (1.0 - 2.0 / pi) * (pi / (4.0 * beta)).cos());
            continue;
        }
        let num = (pi * t * (1.0 - beta)).sin() + 4.0 * beta * t * (pi * t * (1.0 + beta)).cos();
        let den = pi * t * (1.0 - (4.0 * beta * t).powi(2));
        *h_i = num / den;
    }

    let energy: f64 = h.iter().map(|v| v * v).sum();
    let scale = energy.sqrt();
    Ok(h.into_iter().map(|v| (v / scale) as f32).collect())
}

/// Upsample `syms` by `k` and pulse-shape with `taps`. Full convolution, so
/// the filter tail is flushed into the output.
pub fn shape_symbols(syms: &[Complex32], taps: &[f32], k: usize) -> Vec<Complex32> {
    let mut out = vec![Complex32::new(0.0, 0.0); syms.len() * k + taps.len() - 1];
    for (l, &s) in syms.iter().enumerate() {
        for (j, &h) in taps.iter().enumerate() {
            out[l * k + j] += s * h;
        }
    }
    out
}

/// Polyphase root-Nyquist matched-filter bank. A single prototype designed
/// at `k * npfb` samples per symbol is decomposed into `npfb` sub-filters;
/// all of them share one delay line, and the sub-filter index selects the
/// fractional-sample phase of the output.
#[derive(Clone, Debug)]
pub struct FilterBank {
    taps: Vec<Vec<f32>>,
    window: Vec<Complex32>,
    scale: f32,
}

impl FilterBank {
    pub fn new(npfb: usize, k: usize, m: usize, beta: f64) -> anyhow::Result<Self> {
        if npfb < 2 {
            anyhow::bail!("npfb must be at least 2");
        }
        if k == 0 || m == 0 {
            anyhow::bail!("k and m must be positive");
        }
        let proto = rrc_taps(beta, k * npfb, 2 * m)?;
        let taps_per_phase = 2 * m * k + 1;

        let mut padded = proto;
        padded.resize(taps_per_phase * npfb, 0.0);
        let mut taps = vec![vec![0f32; taps_per_phase]; npfb];
        for (p, sub) in taps.iter_mut().enumerate() {
            for (j, t) in sub.iter_mut().enumerate() {
                *t = padded[j * npfb + p];
            }
        }

        // Each branch carries tap energy k, matching the transmit
        // interpolation filter so the cascaded gain is exactly k.
        let e0: f32 = taps[0].iter().map(|t| t * t).sum();
        let norm = ((k as f32) / e0).sqrt();
        for sub in &mut taps {
            for t in sub.iter_mut() {
                *t *= norm;
            }
        }

        Ok(Self {
            taps,
            window: vec![Complex32::new(0.0, 0.0); taps_per_phase],
            scale: 1.0,
        })
    }

    pub fn num_phases(&self) -> usize {
        self.taps.len()
    }

    pub fn push(&mut self, x: Complex32) {
        let n = self.window.len();
        self.window.copy_within(..n - 1, 1);
        self.window[0] = x;
    }

    pub fn execute(&self, index: usize) -> Complex32 {
        let mut acc = Complex32::new(0.0, 0.0);
        for (&w, &h) in self.window.iter().zip(self.taps[index].iter()) {
            acc += w * h;
        }
        acc * self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn reset(&mut self) {
        self.window.fill(Complex32::new(0.0, 0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taps_reject_bad_arguments() {
        assert!(rrc_taps(0.0, 2, 6).is_err());
        assert!(rrc_taps(0.5, 0, 6).is_err());
        assert!(rrc_taps(0.5, 2, 5).is_err());
    }

    #[test]
    fn taps_are_symmetric_with_central_peak() {
        let h = rrc_taps(0.5, 2, 6).unwrap();
        assert_eq!(h.len(), 13);
        for i in 0..h.len() {
            assert!((h[i] - h[h.len() - 1 - i]).abs() < 1e-6);
        }
        let center = h[h.len() / 2];
        assert!(h.iter().all(|&t| t <= center));
    }

    #[test]
    fn branch_energy_matches_samples_per_symbol() {
        let bank = FilterBank::new(32, 2, 3, 0.5).unwrap();
        let e0: f32 = bank.taps[0].iter().map(|t| t * t).sum();
        assert!((e0 - 2.0).abs() < 1e-4);
    }

    #[test]
    fn impulse_reproduces_branch_taps() {
        let mut bank = FilterBank::new(32, 2, 3, 0.5).unwrap();
        bank.set_scale(0.25);
        bank.push(Complex32::new(1.0, 0.0));
        for j in 0..bank.taps[0].len() {
            let y = bank.execute(0);
            assert!((y.re - 0.25 * bank.taps[0][j]).abs() < 1e-6);
            assert!(y.im.abs() < 1e-9);
            bank.push(Complex32::new(0.0, 0.0));
        }
    }

    #[test]
    fn matched_cascade_recovers_unit_symbol() {
        // Transmit one unit symbol through an energy-k interpolation filter,
        // then through branch 0 with the compensating 1/k scale.
        let k = 2usize;
        let tx: Vec<f32> = rrc_taps(0.5, k, 6)
            .unwrap()
            .into_iter()
            .map(|t| t * (k as f32).sqrt())
            .collect();
        let x = shape_symbols(&[Complex32::new(1.0, 0.0)], &tx, k);

        let mut bank = FilterBank::new(32, k, 3, 0.5).unwrap();
        bank.set_scale(0.5);
        let mut peak = 0.0f32;
        for &v in &x {
            bank.push(v);
            peak = peak.max(bank.execute(0).re);
        }
        assert!((peak - 1.0).abs() < 0.03, "peak={peak}");
    }
}
