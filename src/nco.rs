use num_complex::Complex32;

fn wrap_pm_pi(x: f32) -> f32 {
    (x + std::f32::consts::PI).rem_euclid(2.0 * std::f32::consts::PI) - std::f32::consts::PI
}

/// Numerically controlled oscillator used for carrier derotation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nco {
    phase: f32,
    freq: f32,
}

impl Nco {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frequency(&mut self, freq: f32) {
        self.freq = freq;
    }

    pub fn frequency(&self) -> f32 {
        self.freq
    }

    pub fn set_phase(&mut self, phase: f32) {
        self.phase = wrap_pm_pi(phase);
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Rotate `x` by the negated oscillator phase.
    pub fn mix_down(&self, x: Complex32) -> Complex32 {
        x * Complex32::from_polar(1.0, -self.phase)
    }

    pub fn step(&mut self) {
        self.phase = wrap_pm_pi(self.phase + self.freq);
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_down_preserves_magnitude() {
        let mut nco = Nco::new();
        nco.set_frequency(0.03);
        nco.set_phase(1.2);
        for _ in 0..500 {
            let y = nco.mix_down(Complex32::new(0.6, -0.8));
            assert!((y.norm() - 1.0).abs() < 1e-5);
            nco.step();
        }
    }

    #[test]
    fn phase_stays_wrapped() {
        let mut nco = Nco::new();
        nco.set_frequency(0.05);
        for _ in 0..100_000 {
            nco.step();
        }
        assert!(nco.phase().abs() <= std::f32::consts::PI + 1e-6);
    }

    #[test]
    fn accumulated_phase_matches_frequency() {
        let mut nco = Nco::new();
        nco.set_frequency(0.01);
        for _ in 0..100 {
            nco.step();
        }
        assert!((nco.phase() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn reset_clears_state() {
        let mut nco = Nco::new();
        nco.set_frequency(0.2);
        nco.step();
        nco.reset();
        assert_eq!(nco.phase(), 0.0);
        assert_eq!(nco.frequency(), 0.0);
    }
}
