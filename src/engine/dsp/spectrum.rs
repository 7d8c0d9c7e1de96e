use std::f32::consts::PI;
use std::ops::Range;

use rustfft::num_complex::Complex32;

use super::fft::Fft;
use crate::engine::config::SpectrumConfig;
use crate::error::Result;

/// Hann window coefficient for `index` within a frame of `size`.
#[inline]
pub fn hann_window(index: usize, size: usize) -> f32 {
  0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

/// Log-spaced partition of the spectrum into bars.
#[derive(Clone, Debug)]
pub struct BandLayout {
  edges_hz: Vec<f64>,
  bins: Vec<Range<usize>>,
}

impl BandLayout {
  pub fn new(cfg: &SpectrumConfig) -> Self {
    let b = cfg.bar_count;
    let ratio = cfg.freq_max_hz / cfg.freq_min_hz;
    let edges_hz: Vec<f64> = (0..=b).map(|j| cfg.freq_min_hz * ratio.powf(j as f64 / b as f64)).collect();
    let max_bin = cfg.fft_size / 2 - 1;
    let to_bin = |f: f64| ((f * cfg.fft_size as f64 / cfg.sample_rate_hz).round() as usize).clamp(1, max_bin);
    let bins = edges_hz.windows(2).map(|e| to_bin(e[0])..to_bin(e[1])).collect();
    Self { edges_hz, bins }
  }

  /// `bar_count + 1` band edges in Hz.
  pub fn edges_hz(&self) -> &[f64] { &self.edges_hz }
  /// Half-open bin range averaged for each bar.
  pub fn bins(&self) -> &[Range<usize>] { &self.bins }
  pub fn len(&self) -> usize { self.bins.len() }
  pub fn is_empty(&self) -> bool { self.bins.is_empty() }
}

/// Windowed FFT → dB → one-step smoothing → log bands → display fractions.
pub struct SpectrumAnalyzer {
  cfg: SpectrumConfig,
  fft: Fft,
  layout: BandLayout,
  scratch: Vec<Complex32>,
  frame: Vec<f32>,
  smoothed: Vec<f32>,
  primed: bool,
  bands: Vec<f32>,
}

impl SpectrumAnalyzer {
  pub fn new(cfg: SpectrumConfig) -> Result<Self> {
    cfg.validate()?;
    let n = cfg.fft_size;
    let fft = Fft::new(n)?;
    let layout = BandLayout::new(&cfg);
    log::debug!("spectrum: {} point FFT, {} bars over {}..{} Hz @ {} Hz", n, cfg.bar_count, cfg.freq_min_hz, cfg.freq_max_hz, cfg.sample_rate_hz);
    Ok(Self {
      fft,
      layout,
      scratch: vec![Complex32::new(0.0, 0.0); n],
      frame: vec![0.0; n / 2],
      smoothed: vec![0.0; n / 2],
      primed: false,
      bands: vec![0.0; cfg.bar_count],
      cfg,
    })
  }

  /// Analyses `window` (oldest to newest). An empty window is a no-op and
  /// returns `None`, leaving the previous bands in place.
  pub fn analyze(&mut self, window: &[f32]) -> Option<&[f32]> {
    if window.is_empty() { return None; }
    let n = self.cfg.fft_size;

    for (i, c) in self.scratch.iter_mut().enumerate() {
      let re = window.get(i).map_or(0.0, |&s| s * hann_window(i, n));
      *c = Complex32::new(re, 0.0);
    }
    self.fft.forward(&mut self.scratch);

    let (gain, eps) = (self.cfg.gain, self.cfg.epsilon);
    for (db, c) in self.frame.iter_mut().zip(&self.scratch[..n / 2]) {
      *db = 20.0 * (c.norm() * gain + eps).log10();
    }

    if self.primed {
      // prev + (1 - α)(new - prev) == α·prev + (1 - α)·new
      let w = 1.0 - self.cfg.smoothing;
      for (p, &x) in self.smoothed.iter_mut().zip(&self.frame) { *p += w * (x - *p); }
    } else {
      self.smoothed.copy_from_slice(&self.frame);
      self.primed = true;
    }

    let (lo, span, top) = (self.cfg.db_min, self.cfg.db_max - self.cfg.db_min, self.cfg.max_height);
    for (bar, range) in self.bands.iter_mut().zip(self.layout.bins()) {
      let avg = mean(&self.smoothed[range.clone()]);
      *bar = ((avg - lo) / span * top).clamp(0.0, top);
    }
    Some(self.bands.as_slice())
  }

  /// Band heights from the latest analysis.
  pub fn bands(&self) -> &[f32] { &self.bands }

  /// Smoothed dB spectrum, `fft_size / 2` bins. `None` before the first analysis.
  pub fn spectrum(&self) -> Option<&[f32]> { self.primed.then_some(&self.smoothed[..]) }

  pub fn layout(&self) -> &BandLayout { &self.layout }
  pub fn config(&self) -> &SpectrumConfig { &self.cfg }
}

fn mean(values: &[f32]) -> f32 {
  if values.is_empty() { return 0.0; }
  values.iter().sum::<f32>() / values.len() as f32
}
