use crate::engine::source::SampleSource;
use crate::engine::tap::WaveformSink;
use crate::error::{invalid, Result, SourceError};

/// Fixed delay line length: 100 ms of audio at the source rate.
pub const DELAY_DIVISOR: u32 = 10;

/// Circular store of the dry signal. The write index advances by exactly one
/// slot per sample.
pub struct DelayLine {
  buf: Vec<f32>,
  wr: usize,
}

impl DelayLine {
  pub fn new(len: usize) -> Self { Self { buf: vec![0.0; len], wr: 0 } }

  pub fn len(&self) -> usize { self.buf.len() }
  pub fn is_empty(&self) -> bool { self.buf.is_empty() }

  /// Returns the sample written `len()` steps ago and replaces it with `dry`.
  #[inline]
  pub fn exchange(&mut self, dry: f32) -> f32 {
    let delayed = std::mem::replace(&mut self.buf[self.wr], dry);
    self.wr += 1; if self.wr >= self.buf.len() { self.wr = 0; }
    delayed
  }
}

/// Single-tap delay: `out = in + decay * in[t - len]`.
///
/// The dry input is stored, never the mixed output, so only one repeat is
/// ever audible. Decay is fixed for the life of an instance; use
/// [`DelayMix::rebuild`] to change it.
pub struct DelayMix<S> {
  source: S,
  line: DelayLine,
  decay: f32,
  delay_ms: u32,
  sink: Option<Box<dyn WaveformSink + Send>>,
}

impl<S: SampleSource> DelayMix<S> {
  pub fn new(source: S, delay_ms: u32, decay: f32) -> Result<Self> {
    if source.channels() != 1 {
      return Err(invalid(format!("delay mix expects a mono source, got {} channels", source.channels())));
    }
    let len = (source.sample_rate() / DELAY_DIVISOR) as usize;
    if len == 0 {
      return Err(invalid(format!("sample rate {} too low for a 100 ms delay line", source.sample_rate())));
    }
    if delay_ms != 1000 / DELAY_DIVISOR {
      log::debug!("delay time {delay_ms} ms requested; delay line stays at 100 ms");
    }
    Ok(Self { source, line: DelayLine::new(len), decay: clamp_decay(decay), delay_ms, sink: None })
  }

  pub fn with_sink(mut self, sink: impl WaveformSink + Send + 'static) -> Self {
    self.sink = Some(Box::new(sink));
    self
  }

  /// Pulls up to `block.len()` samples from upstream and mixes the delayed
  /// tap into them in place. Returns the number of samples produced.
  pub fn process(&mut self, block: &mut [f32]) -> Result<usize, SourceError> {
    let produced = self.source.pull(block)?;
    let decay = self.decay;
    for s in &mut block[..produced] {
      let dry = *s;
      let delayed = self.line.exchange(dry);
      *s = dry + decay * delayed;
    }
    if produced > 0 {
      if let Some(sink) = self.sink.as_mut() { sink.samples_ready(&block[..produced]); }
    }
    Ok(produced)
  }

  /// Replaces this instance with a fresh one at `decay`. The source and sink
  /// carry over; the delay line restarts silent.
  pub fn rebuild(self, decay: f32) -> Result<Self> {
    let Self { source, delay_ms, sink, .. } = self;
    let mut next = Self::new(source, delay_ms, decay)?;
    next.sink = sink;
    Ok(next)
  }

  pub fn decay(&self) -> f32 { self.decay }
  pub fn delay_ms(&self) -> u32 { self.delay_ms }
  pub fn buffer_len(&self) -> usize { self.line.len() }
  pub fn sample_rate(&self) -> u32 { self.source.sample_rate() }
  pub fn source(&self) -> &S { &self.source }
  pub fn source_mut(&mut self) -> &mut S { &mut self.source }
}

fn clamp_decay(decay: f32) -> f32 {
  if !decay.is_finite() {
    log::warn!("decay {decay} is not finite, using 0");
    return 0.0;
  }
  let d = decay.clamp(0.0, 1.0);
  if d != decay { log::warn!("decay {decay} clamped to {d}"); }
  d
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::source::{BufferSource, SeekableSource};
  use crate::engine::tap::SampleTap;

  fn run(samples: Vec<f32>, rate: u32, decay: f32, block: usize) -> Vec<f32> {
    let mut fx = DelayMix::new(BufferSource::new(samples, rate), 100, decay).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0.0f32; block];
    loop {
      let n = fx.process(&mut buf).unwrap();
      if n == 0 { break; }
      out.extend_from_slice(&buf[..n]);
    }
    out
  }

  fn ramp(n: usize) -> Vec<f32> { (0..n).map(|i| ((i * 7919) % 113) as f32 / 113.0 - 0.5).collect() }

  #[test]
  fn buffer_is_a_tenth_of_the_rate() {
    let fx = DelayMix::new(BufferSource::new(vec![], 44_100), 250, 0.3).unwrap();
    assert_eq!(fx.buffer_len(), 4410);
    assert_eq!(fx.delay_ms(), 250);
  }

  #[test]
  fn zero_decay_is_identity() {
    let input = ramp(5000);
    assert_eq!(run(input.clone(), 8000, 0.0, 333), input);
  }

  #[test]
  fn second_pass_with_zero_decay_reproduces_first() {
    let first = run(ramp(3000), 1000, 0.7, 64);
    assert_eq!(run(first.clone(), 1000, 0.0, 64), first);
  }

  #[test]
  fn impulse_repeats_once_after_buffer_len() {
    let rate = 1000;
    let len = (rate / DELAY_DIVISOR) as usize;
    let mut input = vec![0.0f32; len * 4];
    input[0] = 1.0;
    let out = run(input.clone(), rate, 0.5, 37);
    assert_eq!(out[len], 0.5);
    for (i, (&o, &x)) in out.iter().zip(&input).enumerate() {
      if i != len { assert_eq!(o, x, "sample {i}"); }
    }
  }

  #[test]
  fn dry_signal_is_stored_not_the_mix() {
    // With the wet output stored, an impulse would echo again at 2 * len.
    let rate = 500;
    let len = (rate / DELAY_DIVISOR) as usize;
    let mut input = vec![0.0f32; len * 3];
    input[3] = 1.0;
    let out = run(input, rate, 1.0, 16);
    assert_eq!(out[3 + len], 1.0);
    assert_eq!(out[3 + 2 * len], 0.0);
  }

  #[test]
  fn sink_sees_produced_samples_only() {
    let (tap, rx) = SampleTap::channel(16);
    let src = BufferSource::new(vec![0.25; 10], 100);
    let mut fx = DelayMix::new(src, 100, 0.0).unwrap().with_sink(tap);
    let mut buf = [0.0f32; 4];
    while fx.process(&mut buf).unwrap() > 0 {}
    let blocks: Vec<Vec<f32>> = rx.try_iter().collect();
    assert_eq!(blocks.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
    assert!(blocks.iter().flatten().all(|&s| s == 0.25));
  }

  #[test]
  fn decay_is_clamped() {
    let fx = DelayMix::new(BufferSource::new(vec![], 1000), 100, 1.5).unwrap();
    assert_eq!(fx.decay(), 1.0);
    let fx = DelayMix::new(BufferSource::new(vec![], 1000), 100, -0.2).unwrap();
    assert_eq!(fx.decay(), 0.0);
    let fx = DelayMix::new(BufferSource::new(vec![], 1000), 100, f32::NAN).unwrap();
    assert_eq!(fx.decay(), 0.0);
  }

  #[test]
  fn rate_below_ten_is_rejected() {
    assert!(DelayMix::new(BufferSource::new(vec![], 9), 100, 0.5).is_err());
  }

  #[test]
  fn rebuild_keeps_source_position_and_resets_line() {
    let mut input = vec![0.0f32; 400];
    input[0] = 1.0;
    let mut fx = DelayMix::new(BufferSource::new(input, 1000), 100, 0.5).unwrap();
    let mut buf = [0.0f32; 50];
    assert_eq!(fx.process(&mut buf).unwrap(), 50);
    let mut fx = fx.rebuild(0.8).unwrap();
    assert_eq!(fx.decay(), 0.8);
    assert_eq!(fx.source().position(), 50);
    let mut rest = Vec::new();
    loop {
      let n = fx.process(&mut buf).unwrap();
      if n == 0 { break; }
      rest.extend_from_slice(&buf[..n]);
    }
    // The impulse went into the discarded line, so nothing comes back.
    assert!(rest.iter().all(|&s| s == 0.0));
  }
}
