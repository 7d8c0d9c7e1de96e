use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{invalid, Result};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EffectConfig {
  /// Requested delay time. The delay line is always 100 ms long.
  pub delay_ms: u32,
  /// Mix strength in [0, 1].
  pub decay: f32,
}

impl Default for EffectConfig {
  fn default() -> Self { Self { delay_ms: 100, decay: 0.0 } }
}

impl EffectConfig {
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.decay) {
      log::warn!("effect.decay {} outside [0, 1], it will be clamped", self.decay);
    }
    Ok(())
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectrumConfig {
  /// Transform size, power of two.
  pub fft_size: usize,
  /// Raw samples kept for each analysis.
  pub window_capacity: usize,
  pub bar_count: usize,
  pub freq_min_hz: f64,
  pub freq_max_hz: f64,
  /// Rate used to map band frequencies to bins.
  pub sample_rate_hz: f64,
  pub db_min: f32,
  pub db_max: f32,
  /// Weight on the previous frame.
  pub smoothing: f32,
  pub gain: f32,
  pub epsilon: f32,
  /// Tallest bar as a fraction of display height.
  pub max_height: f32,
  pub tick_ms: u64,
}

impl Default for SpectrumConfig {
  fn default() -> Self {
    Self {
      fft_size: 4096,
      window_capacity: 2048,
      bar_count: 32,
      freq_min_hz: 20.0,
      freq_max_hz: 12_000.0,
      sample_rate_hz: 44_100.0,
      db_min: 170.0,
      db_max: 200.0,
      smoothing: 0.6,
      gain: 200_000.0,
      epsilon: 1e-10,
      max_height: 0.9,
      tick_ms: 100,
    }
  }
}

impl SpectrumConfig {
  pub fn validate(&self) -> Result<()> {
    if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
      return Err(invalid(format!("spectrum.fft_size must be a power of two >= 4, got {}", self.fft_size)));
    }
    if self.window_capacity == 0 {
      return Err(invalid("spectrum.window_capacity must be > 0"));
    }
    if self.bar_count == 0 {
      return Err(invalid("spectrum.bar_count must be > 0"));
    }
    if !(self.freq_min_hz > 0.0 && self.freq_max_hz > self.freq_min_hz) {
      return Err(invalid(format!(
        "spectrum frequency range {}..{} Hz is degenerate",
        self.freq_min_hz, self.freq_max_hz
      )));
    }
    if !(self.sample_rate_hz > 0.0) {
      return Err(invalid("spectrum.sample_rate_hz must be > 0"));
    }
    if !(self.db_max > self.db_min) {
      return Err(invalid(format!("spectrum dB range {}..{} is degenerate", self.db_min, self.db_max)));
    }
    if !(0.0..=1.0).contains(&self.smoothing) {
      return Err(invalid(format!("spectrum.smoothing must be in [0, 1], got {}", self.smoothing)));
    }
    if !(self.epsilon > 0.0) || !(self.gain > 0.0) || !(self.max_height > 0.0) {
      return Err(invalid("spectrum gain, epsilon and max_height must be > 0"));
    }
    if self.tick_ms == 0 {
      return Err(invalid("spectrum.tick_ms must be > 0"));
    }
    Ok(())
  }

  /// Samples that arrive between two ticks at `rate`.
  pub fn samples_per_tick(&self, rate: u32) -> usize {
    ((rate as u64 * self.tick_ms) / 1000).max(1) as usize
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
  /// Fixed device buffer size in frames; `None` keeps the device default.
  pub buffer_frames: Option<u32>,
  /// Decay change per `+`/`-` command, in percent.
  pub decay_step_percent: u8,
  /// Sample blocks that may queue between the audio thread and the analyzer.
  pub tap_depth: usize,
}

impl Default for PlaybackConfig {
  fn default() -> Self { Self { buffer_frames: Some(1024), decay_step_percent: 5, tap_depth: 64 } }
}

impl PlaybackConfig {
  pub fn validate(&self) -> Result<()> {
    if self.decay_step_percent == 0 || self.decay_step_percent > 100 {
      return Err(invalid(format!("playback.decay_step_percent must be in 1..=100, got {}", self.decay_step_percent)));
    }
    if self.buffer_frames == Some(0) {
      return Err(invalid("playback.buffer_frames must be > 0"));
    }
    Ok(())
  }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
  pub effect: EffectConfig,
  pub spectrum: SpectrumConfig,
  pub playback: PlaybackConfig,
}

impl EngineConfig {
  pub fn from_json_str(s: &str) -> Result<Self> {
    let cfg: Self = serde_json::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn from_json_file(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  /// Reads `path` when given, else the per-user config file if it exists,
  /// else defaults.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    if let Some(p) = path { return Self::from_json_file(p); }
    match default_config_path() {
      Some(p) if p.exists() => {
        log::info!("using config {}", p.display());
        Self::from_json_file(&p)
      }
      _ => Ok(Self::default()),
    }
  }

  pub fn validate(&self) -> Result<()> {
    self.effect.validate()?;
    self.spectrum.validate()?;
    self.playback.validate()
  }
}

pub fn default_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|d| d.join("delayscope").join("config.json"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.spectrum.fft_size, 4096);
    assert_eq!(cfg.spectrum.window_capacity, 2048);
    assert_eq!(cfg.spectrum.bar_count, 32);
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let cfg = EngineConfig::from_json_str(r#"{ "effect": { "decay": 0.35 }, "spectrum": { "bar_count": 16 } }"#).unwrap();
    assert_eq!(cfg.effect.decay, 0.35);
    assert_eq!(cfg.effect.delay_ms, 100);
    assert_eq!(cfg.spectrum.bar_count, 16);
    assert_eq!(cfg.spectrum.fft_size, 4096);
    assert_eq!(cfg.playback, PlaybackConfig::default());
  }

  #[test]
  fn rejects_non_power_of_two_transform() {
    let err = EngineConfig::from_json_str(r#"{ "spectrum": { "fft_size": 3000 } }"#).unwrap_err();
    assert!(err.to_string().contains("power of two"));
  }

  #[test]
  fn rejects_degenerate_frequency_range() {
    let cfg = SpectrumConfig { freq_min_hz: 500.0, freq_max_hz: 500.0, ..Default::default() };
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn rejects_malformed_json() {
    assert!(matches!(EngineConfig::from_json_str("{ nope"), Err(crate::error::EngineError::Config(_))));
  }

  #[test]
  fn samples_per_tick_follows_rate() {
    let cfg = SpectrumConfig::default();
    assert_eq!(cfg.samples_per_tick(44_100), 4410);
    assert_eq!(cfg.samples_per_tick(48_000), 4800);
  }
}
