use crate::pfb::{rrc_taps, shape_symbols};
use crate::ring::SampleRing;
use num_complex::Complex32;

const NUM_SEGMENTS: usize = 4;
/// Samples past the metric maximum before a detection is declared.
const PEAK_CONFIRM: u64 = 2;

/// One-shot estimates produced at detection time.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoarseEstimates {
    /// Fractional timing offset in samples.
    pub tau: f32,
    /// Channel gain, linear amplitude.
    pub gamma: f32,
    /// Carrier frequency offset in radians per sample.
    pub dphi: f32,
    /// Carrier phase at the first replayed sample, radians.
    pub phi: f32,
}

#[derive(Clone, Copy, Debug)]
struct Peak {
    at: u64,
    metric: f32,
    m_minus: f32,
    m_plus: f32,
    segs: [Complex32; NUM_SEGMENTS],
    energy: f32,
}

/// Streaming preamble detector. Cross-correlates the input against the
/// pulse-shaped p/n reference in `NUM_SEGMENTS` coherent segments combined
/// noncoherently, which keeps the metric usable under carrier offsets that
/// would wash out a full-length correlation. On detection it hands back the
/// buffered samples from the frame start so the caller can replay them.
pub struct Detector {
    ref_conj: Vec<Complex32>,
    template_energy: f32,
    window: Vec<Complex32>,
    replay: SampleRing,
    threshold: f32,
    metric_prev: f32,
    peak: Option<Peak>,
    est: CoarseEstimates,
}

impl Detector {
    pub fn new(sequence: &[Complex32], k: usize, m: usize, beta: f64) -> anyhow::Result<Self> {
        if sequence.is_empty() {
            anyhow::bail!("reference sequence must be non-empty");
        }
        let root = (k as f32).sqrt();
        let taps: Vec<f32> = rrc_taps(beta, k, 2 * m)?
            .into_iter()
            .map(|t| t * root)
            .collect();
        let template = shape_symbols(sequence, &taps, k);
        let template_energy: f32 = template.iter().map(|t| t.norm_sqr()).sum();
        let len = template.len();
        Ok(Self {
            ref_conj: template.iter().map(|t| t.conj()).collect(),
            template_energy,
            window: vec![Complex32::new(0.0, 0.0); len],
            replay: SampleRing::new(2 * len),
            threshold: 0.5,
            metric_prev: 0.0,
            peak: None,
            est: CoarseEstimates::default(),
        })
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn estimates(&self) -> CoarseEstimates {
        self.est
    }

    pub fn tau(&self) -> f32 {
        self.est.tau
    }

    pub fn gamma(&self) -> f32 {
        self.est.gamma
    }

    pub fn dphi(&self) -> f32 {
        self.est.dphi
    }

    pub fn phi(&self) -> f32 {
        self.est.phi
    }

    /// Consume one sample. Returns the buffered samples (frame start through
    /// the present sample) once a preamble has been confirmed; the caller
    /// must replay them before feeding new input.
    pub fn execute(&mut self, x: Complex32) -> Option<Vec<Complex32>> {
        self.replay.push(x);
        let n = self.replay.total_written() - 1;

        let len = self.window.len();
        self.window.copy_within(1.., 0);
        self.window[len - 1] = x;
        if self.replay.total_written() < len as u64 {
            return None;
        }

        let (metric, segs, energy) = self.correlate();
        let out = self.track_peak(n, metric, segs, energy);
        self.metric_prev = metric;
        out
    }

    pub fn reset(&mut self) {
        self.window.fill(Complex32::new(0.0, 0.0));
        self.replay.reset();
        self.metric_prev = 0.0;
        self.peak = None;
    }

    fn correlate(&self) -> (f32, [Complex32; NUM_SEGMENTS], f32) {
        let len = self.window.len();
        let mut segs = [Complex32::new(0.0, 0.0); NUM_SEGMENTS];
        let mut energy = 0.0f32;
        for (i, (&w, &c)) in self.window.iter().zip(self.ref_conj.iter()).enumerate() {
            segs[i * NUM_SEGMENTS / len] += w * c;
            energy += w.norm_sqr();
        }
        let sum_sq: f32 = segs.iter().map(|r| r.norm_sqr()).sum();
        let metric =
            (NUM_SEGMENTS as f32 * sum_sq).sqrt() / ((self.template_energy * energy).sqrt() + 1e-18);
        (metric, segs, energy)
    }

    fn track_peak(
        &mut self,
        n: u64,
        metric: f32,
        segs: [Complex32; NUM_SEGMENTS],
        energy: f32,
    ) -> Option<Vec<Complex32>> {
        let Some(peak) = self.peak.as_mut() else {
            if metric > self.threshold {
                self.peak = Some(Peak {
                    at: n,
                    metric,
                    m_minus: self.metric_prev,
                    m_plus: f32::NAN,
                    segs,
                    energy,
                });
            }
            return None;
        };

        if metric > peak.metric {
            *peak = Peak {
                at: n,
                metric,
                m_minus: self.metric_prev,
                m_plus: f32::NAN,
                segs,
                energy,
            };
            return None;
        }
        if n == peak.at + 1 {
            peak.m_plus = metric;
        }
        if n - peak.at < PEAK_CONFIRM {
            return None;
        }

        let peak = self.peak.take().expect("peak exists");
        self.est = Self::estimate(&peak, self.template_energy, self.window.len());

        // Replay capacity is twice the template, so this range is always held.
        let start = peak.at + 1 - self.window.len() as u64;
        let count = (n - start + 1) as usize;
        let buf = self.replay.read(start, count).expect("replay range held");
        Some(buf)
    }

    fn estimate(p: &Peak, template_energy: f32, window_len: usize) -> CoarseEstimates {
        // Fractional timing from the quadratic fit through the metric peak.
        let m_plus = if p.m_plus.is_nan() { p.metric } else { p.m_plus };
        let denom = p.m_minus - 2.0 * p.metric + m_plus;
        let tau = if denom.abs() > 1e-9 {
            (0.5 * (p.m_minus - m_plus) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let gamma = (p.energy / template_energy).sqrt().max(1e-9);

        // Carrier frequency from the phase advance between adjacent segment
        // correlations, one segment span apart.
        let seg_span = window_len as f32 / NUM_SEGMENTS as f32;
        let mut acc = Complex32::new(0.0, 0.0);
        for w in p.segs.windows(2) {
            acc += w[1] * w[0].conj();
        }
        let dphi = acc.arg() / seg_span;

        // Carrier phase referred to the window start: derotate each segment
        // correlation back to its centroid and recombine coherently.
        let mut sum = Complex32::new(0.0, 0.0);
        for (q, &r) in p.segs.iter().enumerate() {
            sum += r * Complex32::from_polar(1.0, -dphi * (q as f32 + 0.5) * seg_span);
        }
        let phi = sum.arg();

        CoarseEstimates {
            tau,
            gamma,
            dphi,
            phi,
        }
    }
}
