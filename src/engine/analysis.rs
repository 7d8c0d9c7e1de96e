use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::config::SpectrumConfig;
use super::dsp::spectrum::SpectrumAnalyzer;
use super::tap::BandSink;
use super::window::RawSampleWindow;
use crate::error::Result;

/// Raw-sample window plus analyzer, driven one tick at a time.
pub struct SpectrumTicker {
  window: RawSampleWindow,
  analyzer: SpectrumAnalyzer,
  snapshot: Vec<f32>,
}

impl SpectrumTicker {
  pub fn new(cfg: SpectrumConfig) -> Result<Self> {
    let cap = cfg.window_capacity;
    Ok(Self { window: RawSampleWindow::new(cap), analyzer: SpectrumAnalyzer::new(cfg)?, snapshot: Vec::with_capacity(cap) })
  }

  pub fn push(&mut self, samples: &[f32]) { self.window.push_slice(samples); }

  /// Analyses the current window. `None` while nothing has arrived yet.
  pub fn tick(&mut self) -> Option<&[f32]> {
    self.window.snapshot_into(&mut self.snapshot);
    self.analyzer.analyze(&self.snapshot)
  }

  pub fn window(&self) -> &RawSampleWindow { &self.window }
}

/// Background thread that owns the raw-sample window. It collects blocks
/// from the audio side and renders bands once per tick.
pub struct SpectrumWorker {
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl SpectrumWorker {
  /// The analyzer is built before the thread starts so a bad config fails here.
  pub fn spawn<B>(cfg: SpectrumConfig, rx: Receiver<Vec<f32>>, mut sink: B) -> Result<Self>
  where
    B: BandSink + Send + 'static,
  {
    let tick = Duration::from_millis(cfg.tick_ms);
    let mut ticker = SpectrumTicker::new(cfg)?;
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let handle = thread::Builder::new().name("spectrum".into()).spawn(move || {
      let mut connected = true;
      let mut ticks = 0u64;
      while connected && !stop_flag.load(Ordering::Relaxed) {
        let deadline = Instant::now() + tick;
        loop {
          match rx.recv_deadline(deadline) {
            Ok(block) => ticker.push(&block),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => { connected = false; break; }
          }
        }
        if let Some(bands) = ticker.tick() {
          sink.render(bands);
          ticks += 1;
        }
      }
      log::debug!("spectrum worker exiting after {ticks} ticks");
    })?;
    Ok(Self { stop, handle: Some(handle) })
  }

  pub fn stop(mut self) { self.shutdown(); }

  fn shutdown(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(h) = self.handle.take() {
      if h.join().is_err() { log::error!("spectrum worker panicked"); }
    }
  }
}

impl Drop for SpectrumWorker {
  fn drop(&mut self) { self.shutdown(); }
}
