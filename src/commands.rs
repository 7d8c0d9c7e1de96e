use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::engine::analysis::{SpectrumTicker, SpectrumWorker};
use crate::engine::audio::AudioEngine;
use crate::engine::config::{EngineConfig, SpectrumConfig};
use crate::engine::dsp::delay::DelayMix;
use crate::engine::messages::EngineMsg;
use crate::engine::params::DecayControl;
use crate::engine::source::SampleSource;
use crate::engine::tap::{BandSink, SampleTap};
use crate::error::Result;
use crate::fs_api::{default_export_path, export_wav, load_audio_file};

/// Band mapping rate: the source's real rate, or 44.1 kHz when `parity_44k`.
pub fn spectrum_config_for(base: &SpectrumConfig, source_rate: u32, parity_44k: bool) -> SpectrumConfig {
  let mut cfg = base.clone();
  if !parity_44k { cfg.sample_rate_hz = source_rate as f64; }
  cfg
}

/// `mm:ss`
pub fn format_clock(secs: f64) -> String {
  let total = secs.max(0.0) as u64;
  format!("{:02}:{:02}", total / 60, total % 60)
}

/// Frame for an absolute position of `secs`, clamped to `[0, total_frames]`.
pub fn seek_frame(secs: f64, sample_rate: u32, total_frames: u64) -> usize {
  if !secs.is_finite() || secs <= 0.0 { return 0; }
  ((secs * sample_rate as f64) as u64).min(total_frames) as usize
}

/// A file playing on the output device with the spectrum worker running.
pub struct PlaybackSession {
  engine: AudioEngine,
  worker: Option<SpectrumWorker>,
  tx: Sender<EngineMsg>,
  decay: DecayControl,
  playing: bool,
  total_frames: u64,
  sample_rate: u32,
  dropped: Arc<AtomicU64>,
}

pub fn start_playback<B>(path: &Path, cfg: &EngineConfig, parity_44k: bool, sink: B) -> Result<PlaybackSession>
where
  B: BandSink + Send + 'static,
{
  cfg.validate()?;
  let source = load_audio_file(path)?;
  let sample_rate = source.sample_rate();
  let total_frames = source.len() as u64;
  let spectrum = spectrum_config_for(&cfg.spectrum, sample_rate, parity_44k);

  let (tap, rx) = SampleTap::channel(cfg.playback.tap_depth);
  let dropped = tap.dropped_counter();
  let effect = DelayMix::new(source, cfg.effect.delay_ms, cfg.effect.decay)?.with_sink(tap);
  let decay = DecayControl::from_factor(effect.decay(), cfg.playback.decay_step_percent);
  let worker = SpectrumWorker::spawn(spectrum, rx, sink)?;

  let mut engine = AudioEngine::new();
  engine.start(effect, &cfg.playback)?;
  let tx = engine.sender();
  log::info!("playing {} (decay {}%)", path.display(), decay.percent());
  Ok(PlaybackSession { engine, worker: Some(worker), tx, decay, playing: true, total_frames, sample_rate, dropped })
}

impl PlaybackSession {
  pub fn decay_percent(&self) -> u8 { self.decay.percent() }

  pub fn increase_decay(&mut self) -> u8 {
    if self.decay.increase() { self.send_decay(); }
    self.decay.percent()
  }

  pub fn decrease_decay(&mut self) -> u8 {
    if self.decay.decrease() { self.send_decay(); }
    self.decay.percent()
  }

  fn send_decay(&self) {
    log::info!("decay {}%", self.decay.percent());
    let _ = self.tx.send(EngineMsg::SetDecay(self.decay.factor()));
  }

  pub fn toggle_pause(&mut self) -> bool {
    self.playing = !self.playing;
    let _ = self.tx.send(EngineMsg::Transport { playing: self.playing });
    self.playing
  }

  /// Jumps playback to `secs` from the start. Returns the clamped position.
  pub fn seek(&self, secs: f64) -> f64 {
    let frame = seek_frame(secs, self.sample_rate, self.total_frames);
    let at = frame as f64 / self.sample_rate.max(1) as f64;
    log::info!("seek to {}", format_clock(at));
    let _ = self.tx.send(EngineMsg::Seek { frame });
    at
  }

  pub fn quit(&self) { let _ = self.tx.send(EngineMsg::Quit); }

  pub fn is_finished(&self) -> bool { self.engine.is_finished() }

  /// (elapsed, total) in seconds.
  pub fn progress(&self) -> (f64, f64) {
    let sr = self.sample_rate.max(1) as f64;
    (self.engine.played_frames() as f64 / sr, self.total_frames as f64 / sr)
  }

  pub fn progress_label(&self) -> String {
    let (now, total) = self.progress();
    format!("{} / {}", format_clock(now), format_clock(total))
  }

  pub fn stop(mut self) {
    self.engine.stop();
    if let Some(w) = self.worker.take() { w.stop(); }
    let dropped = self.dropped.load(Ordering::Relaxed);
    if dropped > 0 { log::warn!("{dropped} sample blocks dropped before analysis"); }
  }
}

/// Renders `input` through a fresh effect from its first sample. Returns the
/// output path and sample count.
pub fn export_file(input: &Path, output: Option<&Path>, cfg: &EngineConfig) -> Result<(PathBuf, u64)> {
  cfg.validate()?;
  let source = load_audio_file(input)?;
  let mut effect = DelayMix::new(source, cfg.effect.delay_ms, cfg.effect.decay)?;
  let pct = DecayControl::from_factor(effect.decay(), cfg.playback.decay_step_percent).percent();
  let out = output.map(Path::to_path_buf).unwrap_or_else(|| default_export_path(input, pct));
  let written = export_wav(&mut effect, &out)?;
  Ok((out, written))
}

/// Offline spectrum: processes one tick's worth of samples at a time and
/// renders after each. Stops at end of stream or after `max_frames` renders.
pub fn analyze_source<S, B>(effect: &mut DelayMix<S>, spectrum: SpectrumConfig, sink: &mut B, max_frames: Option<usize>) -> Result<usize>
where
  S: SampleSource,
  B: BandSink,
{
  let mut block = vec![0.0f32; spectrum.samples_per_tick(effect.sample_rate())];
  let mut ticker = SpectrumTicker::new(spectrum)?;
  let mut rendered = 0usize;
  while max_frames.map_or(true, |m| rendered < m) {
    let n = effect.process(&mut block)?;
    if n == 0 { break; }
    ticker.push(&block[..n]);
    if let Some(bands) = ticker.tick() {
      sink.render(bands);
      rendered += 1;
    }
  }
  Ok(rendered)
}

pub fn analyze_file<B: BandSink>(input: &Path, cfg: &EngineConfig, parity_44k: bool, sink: &mut B, max_frames: Option<usize>) -> Result<usize> {
  cfg.validate()?;
  let source = load_audio_file(input)?;
  let spectrum = spectrum_config_for(&cfg.spectrum, source.sample_rate(), parity_44k);
  let mut effect = DelayMix::new(source, cfg.effect.delay_ms, cfg.effect.decay)?;
  analyze_source(&mut effect, spectrum, sink, max_frames)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::source::BufferSource;

  #[test]
  fn clock_formats_minutes_and_seconds() {
    assert_eq!(format_clock(0.0), "00:00");
    assert_eq!(format_clock(61.9), "01:01");
    assert_eq!(format_clock(600.0), "10:00");
  }

  #[test]
  fn seek_frame_is_clamped() {
    assert_eq!(seek_frame(1.5, 8000, 80_000), 12_000);
    assert_eq!(seek_frame(-3.0, 8000, 80_000), 0);
    assert_eq!(seek_frame(f64::NAN, 8000, 80_000), 0);
    assert_eq!(seek_frame(99.0, 8000, 80_000), 80_000);
  }

  #[test]
  fn parity_keeps_the_configured_rate() {
    let base = SpectrumConfig::default();
    assert_eq!(spectrum_config_for(&base, 48_000, false).sample_rate_hz, 48_000.0);
    assert_eq!(spectrum_config_for(&base, 48_000, true).sample_rate_hz, 44_100.0);
  }

  #[test]
  fn offline_analysis_renders_once_per_tick() {
    let rate = 8000;
    let src = BufferSource::new(vec![0.0; rate as usize], rate);
    let mut fx = DelayMix::new(src, 100, 0.5).unwrap();
    let mut frames: Vec<Vec<f32>> = Vec::new();
    let n = analyze_source(&mut fx, SpectrumConfig::default(), &mut frames, None).unwrap();
    // one second at a 100 ms tick
    assert_eq!(n, 10);
    assert!(frames.iter().all(|f| f.len() == 32 && f.iter().all(|&b| b == 0.0)));
  }

  #[test]
  fn offline_analysis_honours_frame_limit() {
    let src = BufferSource::new(vec![0.1; 44_100], 44_100);
    let mut fx = DelayMix::new(src, 100, 0.0).unwrap();
    let mut frames: Vec<Vec<f32>> = Vec::new();
    assert_eq!(analyze_source(&mut fx, SpectrumConfig::default(), &mut frames, Some(3)).unwrap(), 3);
  }
}
