use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Receives a copy of every block a [`DelayMix`](crate::DelayMix) produces.
pub trait WaveformSink {
  fn samples_ready(&mut self, samples: &[f32]);
}

impl WaveformSink for Vec<f32> {
  fn samples_ready(&mut self, samples: &[f32]) { self.extend_from_slice(samples); }
}

/// Receives band intensities once per analysis tick.
pub trait BandSink {
  fn render(&mut self, bands: &[f32]);
}

impl BandSink for Vec<Vec<f32>> {
  fn render(&mut self, bands: &[f32]) { self.push(bands.to_vec()); }
}

/// Frames are dropped when the receiver lags; the next tick replaces them.
impl BandSink for Sender<Vec<f32>> {
  fn render(&mut self, bands: &[f32]) { let _ = self.try_send(bands.to_vec()); }
}

/// Audio-thread side of the handoff to the spectrum worker. Never blocks:
/// when the channel is full the block is dropped and counted.
#[derive(Clone)]
pub struct SampleTap {
  tx: Sender<Vec<f32>>,
  dropped: Arc<AtomicU64>,
}

impl SampleTap {
  /// Returns the tap and the receiving end. `depth` is the number of blocks
  /// that may be in flight.
  pub fn channel(depth: usize) -> (Self, Receiver<Vec<f32>>) {
    let (tx, rx) = bounded(depth.max(1));
    (Self { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
  }

  pub fn dropped(&self) -> u64 { self.dropped.load(Ordering::Relaxed) }
  pub fn dropped_counter(&self) -> Arc<AtomicU64> { Arc::clone(&self.dropped) }
}

impl WaveformSink for SampleTap {
  fn samples_ready(&mut self, samples: &[f32]) {
    match self.tx.try_send(samples.to_vec()) {
      Ok(()) => {}
      Err(TrySendError::Full(_)) => { self.dropped.fetch_add(1, Ordering::Relaxed); }
      Err(TrySendError::Disconnected(_)) => {}
    }
  }
}
