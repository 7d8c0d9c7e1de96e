use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use super::config::PlaybackConfig;
use super::dsp::delay::DelayMix;
use super::messages::EngineMsg;
use super::source::SeekableSource;
use crate::error::{EngineError, Result};

/// Messages drained per callback; keeps control traffic from starving audio.
const MAX_MSGS_PER_CALLBACK: usize = 24;

/// Realtime playback of a [`DelayMix`] on the default output device.
/// The effect moves into the audio callback; control goes through
/// [`EngineMsg`]s.
pub struct AudioEngine {
  tx: Sender<EngineMsg>,
  rx: Receiver<EngineMsg>,
  pub sr: u32,
  pub channels: u16,
  stream: Option<cpal::Stream>,
  played: Arc<AtomicU64>,
  finished: Arc<AtomicBool>,
}

impl AudioEngine {
  pub fn new() -> Self {
    let (tx, rx) = unbounded();
    Self {
      tx,
      rx,
      sr: 0,
      channels: 0,
      stream: None,
      played: Arc::new(AtomicU64::new(0)),
      finished: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn start<S>(&mut self, effect: DelayMix<S>, cfg: &PlaybackConfig) -> Result<()>
  where
    S: SeekableSource + Send + 'static,
  {
    if self.stream.is_some() { return Ok(()); }
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| EngineError::Device("no output device".into()))?;
    let wanted = effect.sample_rate();
    let config = choose_config(&device, wanted)?;
    let mut stream_cfg: cpal::StreamConfig = config.into();
    if let Some(frames) = cfg.buffer_frames {
      stream_cfg.buffer_size = cpal::BufferSize::Fixed(frames);
    }
    self.sr = stream_cfg.sample_rate.0;
    self.channels = stream_cfg.channels;
    if self.sr != wanted {
      log::warn!("device runs at {} Hz, source is {} Hz; playback pitch will shift", self.sr, wanted);
    }
    log::info!(
      "audio: {} @ {} Hz, {} ch",
      device.name().unwrap_or_else(|_| "unknown".to_string()),
      self.sr,
      self.channels
    );

    let mut renderer = Renderer::new(
      effect,
      self.rx.clone(),
      self.channels as usize,
      Arc::clone(&self.played),
      Arc::clone(&self.finished),
    );

    let err_fn = |e: cpal::StreamError| log::error!("stream error: {e}");
    let stream = device
      .build_output_stream(
        &stream_cfg,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
        err_fn,
        None,
      )
      .map_err(|e| EngineError::Device(e.to_string()))?;
    stream.play().map_err(|e| EngineError::Device(e.to_string()))?;
    self.stream = Some(stream);
    Ok(())
  }

  pub fn stop(&mut self) { self.stream.take(); }

  pub fn sender(&self) -> Sender<EngineMsg> { self.tx.clone() }

  /// Source frames handed to the device so far.
  pub fn played_frames(&self) -> u64 { self.played.load(Ordering::Relaxed) }

  /// True once the source is exhausted or a `Quit` was processed.
  pub fn is_finished(&self) -> bool { self.finished.load(Ordering::Relaxed) }
}

impl Default for AudioEngine {
  fn default() -> Self { Self::new() }
}

/// Body of the output callback. Drains control messages, then fills one
/// interleaved device buffer from the mono effect output.
struct Renderer<S> {
  effect: Option<DelayMix<S>>,
  rx: Receiver<EngineMsg>,
  mono: Vec<f32>,
  channels: usize,
  playing: bool,
  played: Arc<AtomicU64>,
  finished: Arc<AtomicBool>,
}

impl<S: SeekableSource> Renderer<S> {
  fn new(effect: DelayMix<S>, rx: Receiver<EngineMsg>, channels: usize, played: Arc<AtomicU64>, finished: Arc<AtomicBool>) -> Self {
    Self { effect: Some(effect), rx, mono: vec![0.0; 4096], channels: channels.max(1), playing: true, played, finished }
  }

  fn render(&mut self, data: &mut [f32]) {
    self.drain();

    let frames = data.len() / self.channels;
    let fx = match self.effect.as_mut() {
      Some(fx) if self.playing && !self.finished.load(Ordering::Relaxed) => fx,
      _ => { data.fill(0.0); return; }
    };
    if self.mono.len() < frames { self.mono.resize(frames, 0.0); }
    let n = match fx.process(&mut self.mono[..frames]) {
      Ok(n) => n,
      Err(e) => { log::error!("source failed: {e}"); 0 }
    };
    if n == 0 { self.finished.store(true, Ordering::Relaxed); }
    self.played.fetch_add(n as u64, Ordering::Relaxed);
    for (i, frame) in data.chunks_mut(self.channels).enumerate() {
      frame.fill(if i < n { self.mono[i] } else { 0.0 });
    }
  }

  fn drain(&mut self) {
    let mut drained = 0usize;
    loop {
      match self.rx.try_recv() {
        Ok(msg) => self.apply(msg),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
      drained += 1;
      if drained >= MAX_MSGS_PER_CALLBACK { break; }
    }
  }

  fn apply(&mut self, msg: EngineMsg) {
    match msg {
      EngineMsg::SetDecay(decay) => {
        if let Some(fx) = self.effect.take() {
          match fx.rebuild(decay) {
            Ok(next) => self.effect = Some(next),
            Err(e) => {
              log::error!("effect rebuild failed, stopping: {e}");
              self.finished.store(true, Ordering::Relaxed);
            }
          }
        }
      }
      EngineMsg::Transport { playing } => { self.playing = playing; }
      EngineMsg::Seek { frame } => {
        if let Some(fx) = self.effect.as_mut() {
          fx.source_mut().seek(frame);
          self.played.store(fx.source().position() as u64, Ordering::Relaxed);
        }
      }
      EngineMsg::Quit => { self.finished.store(true, Ordering::Relaxed); }
    }
  }
}

/// f32 output config at `rate`, preferring stereo, else the device default.
fn choose_config(device: &cpal::Device, rate: u32) -> Result<cpal::SupportedStreamConfig> {
  let mut chosen: Option<cpal::SupportedStreamConfig> = None;
  if let Ok(supported) = device.supported_output_configs() {
    let mut fallback = None;
    for range in supported {
      if range.sample_format() != cpal::SampleFormat::F32 { continue; }
      if range.min_sample_rate().0 > rate || range.max_sample_rate().0 < rate { continue; }
      if range.channels() == 2 {
        chosen = Some(range.with_sample_rate(cpal::SampleRate(rate)));
        break;
      }
      if fallback.is_none() { fallback = Some(range.with_sample_rate(cpal::SampleRate(rate))); }
    }
    if chosen.is_none() { chosen = fallback; }
  }
  match chosen {
    Some(cfg) => Ok(cfg),
    None => {
      let cfg = device.default_output_config().map_err(|e| EngineError::Device(e.to_string()))?;
      if cfg.sample_format() != cpal::SampleFormat::F32 {
        return Err(EngineError::Device(format!("device default format {:?} is not f32", cfg.sample_format())));
      }
      Ok(cfg)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::source::{BufferSource, SampleSource};
  use crate::error::SourceError;
  use std::sync::atomic::AtomicU32;

  fn renderer(samples: Vec<f32>, rate: u32, decay: f32, channels: usize) -> (Renderer<BufferSource>, Sender<EngineMsg>) {
    let (tx, rx) = unbounded();
    let fx = DelayMix::new(BufferSource::new(samples, rate), 100, decay).unwrap();
    let r = Renderer::new(fx, rx, channels, Arc::new(AtomicU64::new(0)), Arc::new(AtomicBool::new(false)));
    (r, tx)
  }

  fn position<S: SeekableSource>(r: &Renderer<S>) -> usize { r.effect.as_ref().unwrap().source().position() }

  #[test]
  fn mono_fans_out_and_short_block_is_zero_padded() {
    let (mut r, _tx) = renderer(vec![0.5; 3], 100, 0.0, 2);
    let mut data = [1.0f32; 8];
    r.render(&mut data);
    assert_eq!(data, [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
    assert_eq!(r.played.load(Ordering::Relaxed), 3);
    assert!(!r.finished.load(Ordering::Relaxed));

    r.render(&mut data);
    assert!(data.iter().all(|&s| s == 0.0));
    assert!(r.finished.load(Ordering::Relaxed));
  }

  #[test]
  fn pause_outputs_silence_without_pulling() {
    let (mut r, tx) = renderer(vec![0.25; 50], 100, 0.0, 1);
    let mut data = [0.0f32; 10];
    r.render(&mut data);
    assert_eq!(position(&r), 10);

    tx.send(EngineMsg::Transport { playing: false }).unwrap();
    data.fill(1.0);
    r.render(&mut data);
    assert!(data.iter().all(|&s| s == 0.0));
    assert_eq!(position(&r), 10);
    assert_eq!(r.played.load(Ordering::Relaxed), 10);

    tx.send(EngineMsg::Transport { playing: true }).unwrap();
    r.render(&mut data);
    assert!(data.iter().all(|&s| s == 0.25));
    assert_eq!(position(&r), 20);
  }

  #[test]
  fn set_decay_swaps_in_a_fresh_line() {
    let rate = 100;
    let len = (rate / 10) as usize;
    let mut input = vec![0.0f32; len * 4];
    input[0] = 1.0;
    input[len] = 1.0;
    let (mut r, tx) = renderer(input, rate, 0.5, 1);
    let mut data = vec![0.0f32; len];
    r.render(&mut data);
    assert_eq!(data[0], 1.0);

    tx.send(EngineMsg::SetDecay(0.8)).unwrap();
    r.render(&mut data);
    let fx = r.effect.as_ref().unwrap();
    assert_eq!(fx.decay(), 0.8);
    assert_eq!(fx.source().position(), 2 * len);
    // The first impulse's echo went with the old line; the second one is dry.
    assert_eq!(data[0], 1.0);
    assert!(data[1..].iter().all(|&s| s == 0.0));

    r.render(&mut data);
    assert_eq!(data[0], 0.8);
  }

  #[test]
  fn seek_moves_the_source_and_the_played_counter() {
    let (mut r, tx) = renderer((0..100).map(|i| i as f32).collect(), 100, 0.0, 1);
    let mut data = [0.0f32; 4];
    r.render(&mut data);
    tx.send(EngineMsg::Seek { frame: 60 }).unwrap();
    r.render(&mut data);
    assert_eq!(data, [60.0, 61.0, 62.0, 63.0]);
    assert_eq!(r.played.load(Ordering::Relaxed), 64);

    tx.send(EngineMsg::Seek { frame: 1_000 }).unwrap();
    r.render(&mut data);
    assert_eq!(position(&r), 100);
    assert!(r.finished.load(Ordering::Relaxed));
  }

  #[test]
  fn quit_silences_and_finishes() {
    let (mut r, tx) = renderer(vec![0.5; 100], 100, 0.0, 1);
    tx.send(EngineMsg::Quit).unwrap();
    let mut data = [1.0f32; 4];
    r.render(&mut data);
    assert!(data.iter().all(|&s| s == 0.0));
    assert!(r.finished.load(Ordering::Relaxed));
    assert_eq!(position(&r), 0);
  }

  /// Source whose reported rate can change after construction.
  struct RateSwitch {
    inner: BufferSource,
    rate: Arc<AtomicU32>,
  }

  impl SampleSource for RateSwitch {
    fn sample_rate(&self) -> u32 { self.rate.load(Ordering::Relaxed) }
    fn pull(&mut self, buf: &mut [f32]) -> Result<usize, SourceError> { self.inner.pull(buf) }
  }

  impl SeekableSource for RateSwitch {
    fn position(&self) -> usize { self.inner.position() }
    fn seek(&mut self, frame: usize) { self.inner.seek(frame) }
  }

  #[test]
  fn failed_rebuild_finishes_the_stream() {
    let rate = Arc::new(AtomicU32::new(100));
    let src = RateSwitch { inner: BufferSource::new(vec![0.5; 100], 100), rate: Arc::clone(&rate) };
    let (tx, rx) = unbounded();
    let fx = DelayMix::new(src, 100, 0.2).unwrap();
    let mut r = Renderer::new(fx, rx, 1, Arc::new(AtomicU64::new(0)), Arc::new(AtomicBool::new(false)));

    rate.store(5, Ordering::Relaxed);
    tx.send(EngineMsg::SetDecay(0.4)).unwrap();
    let mut data = [1.0f32; 4];
    r.render(&mut data);
    assert!(r.effect.is_none());
    assert!(r.finished.load(Ordering::Relaxed));
    assert!(data.iter().all(|&s| s == 0.0));
  }
}
