use crate::error::SourceError;

/// Pull-based upstream of mono samples.
pub trait SampleSource {
  fn sample_rate(&self) -> u32;
  fn channels(&self) -> u16 { 1 }
  /// Fills up to `buf.len()` samples and returns how many were written.
  /// `Ok(0)` means the stream is exhausted.
  fn pull(&mut self, buf: &mut [f32]) -> Result<usize, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
  fn sample_rate(&self) -> u32 { (**self).sample_rate() }
  fn channels(&self) -> u16 { (**self).channels() }
  fn pull(&mut self, buf: &mut [f32]) -> Result<usize, SourceError> { (**self).pull(buf) }
}

/// Sources that can jump to an absolute frame.
pub trait SeekableSource: SampleSource {
  fn position(&self) -> usize;
  /// Moves the read head to `frame`, clamped to the end of the stream.
  fn seek(&mut self, frame: usize);
}

/// Fully decoded mono audio held in memory.
#[derive(Clone, Debug)]
pub struct BufferSource {
  samples: Vec<f32>,
  sample_rate: u32,
  pos: usize,
}

impl BufferSource {
  pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self { Self { samples, sample_rate, pos: 0 } }

  pub fn len(&self) -> usize { self.samples.len() }
  pub fn is_empty(&self) -> bool { self.samples.is_empty() }
  pub fn samples(&self) -> &[f32] { &self.samples }

  pub fn duration_secs(&self) -> f64 {
    if self.sample_rate == 0 { return 0.0; }
    self.samples.len() as f64 / self.sample_rate as f64
  }
}

impl SampleSource for BufferSource {
  fn sample_rate(&self) -> u32 { self.sample_rate }

  fn pull(&mut self, buf: &mut [f32]) -> Result<usize, SourceError> {
    let remaining = &self.samples[self.pos..];
    let n = remaining.len().min(buf.len());
    buf[..n].copy_from_slice(&remaining[..n]);
    self.pos += n;
    Ok(n)
  }
}

impl SeekableSource for BufferSource {
  fn position(&self) -> usize { self.pos }
  fn seek(&mut self, frame: usize) { self.pos = frame.min(self.samples.len()); }
}
