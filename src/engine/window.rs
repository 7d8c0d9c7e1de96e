use dasp::ring_buffer::Fixed;

/// The most recent raw samples, oldest entries overwritten on overflow.
pub struct RawSampleWindow {
  ring: Fixed<Vec<f32>>,
  filled: usize,
}

impl RawSampleWindow {
  /// `capacity` must be non-zero.
  pub fn new(capacity: usize) -> Self {
    Self { ring: Fixed::from(vec![0.0; capacity.max(1)]), filled: 0 }
  }

  pub fn capacity(&self) -> usize { self.ring.len() }
  pub fn len(&self) -> usize { self.filled }
  pub fn is_empty(&self) -> bool { self.filled == 0 }

  pub fn push_slice(&mut self, samples: &[f32]) {
    let cap = self.capacity();
    // Only the tail can survive.
    let tail = &samples[samples.len().saturating_sub(cap)..];
    for &s in tail { let _ = self.ring.push(s); }
    self.filled = (self.filled + tail.len()).min(cap);
  }

  /// Copies the held samples, oldest to newest, into `out`.
  pub fn snapshot_into(&self, out: &mut Vec<f32>) {
    out.clear();
    let skip = self.capacity() - self.filled;
    out.extend(self.ring.iter().skip(skip).copied());
  }

  pub fn clear(&mut self) {
    self.ring = Fixed::from(vec![0.0; self.capacity()]);
    self.filled = 0;
  }
}
