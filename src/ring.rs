use num_complex::Complex32;

/// Fixed-capacity ring of recent samples, addressed by the absolute index of
/// each sample since the last reset.
#[derive(Clone, Debug)]
pub struct SampleRing {
    buf: Vec<Complex32>,
    write_pos: usize,
    total: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![Complex32::new(0.0, 0.0); capacity],
            write_pos: 0,
            total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn total_written(&self) -> u64 {
        self.total
    }

    pub fn push(&mut self, x: Complex32) {
        let cap = self.buf.len();
        self.buf[self.write_pos] = x;
        self.write_pos = (self.write_pos + 1) % cap;
        self.total += 1;
    }

    /// Absolute [start, end) range currently held.
    fn held_range(&self) -> (u64, u64) {
        (self.total.saturating_sub(self.buf.len() as u64), self.total)
    }

    pub fn read(&self, abs_start: u64, len: usize) -> anyhow::Result<Vec<Complex32>> {
        let abs_end = abs_start + len as u64;
        let (keep_start, keep_end) = self.held_range();
        if abs_start < keep_start || abs_end > keep_end {
            anyhow::bail!(
                "range [{abs_start},{abs_end}) not held (have [{keep_start},{keep_end}))"
            );
        }
        let cap = self.buf.len();
        let start_idx = (abs_start % cap as u64) as usize;
        let end_idx = (abs_end % cap as u64) as usize;
        if start_idx < end_idx {
            Ok(self.buf[start_idx..end_idx].to_vec())
        } else {
            let mut out = Vec::with_capacity(len);
            out.extend_from_slice(&self.buf[start_idx..]);
            out.extend_from_slice(&self.buf[..end_idx]);
            Ok(out)
        }
    }

    /// The `capacity` most recent slots, oldest first. Slots never written
    /// read as zero.
    pub fn snapshot(&self) -> Vec<Complex32> {
        let mut out = Vec::with_capacity(self.buf.len());
        out.extend_from_slice(&self.buf[self.write_pos..]);
        out.extend_from_slice(&self.buf[..self.write_pos]);
        out
    }

    pub fn reset(&mut self) {
        self.buf.fill(Complex32::new(0.0, 0.0));
        self.write_pos = 0;
        self.total = 0;
    }
}
