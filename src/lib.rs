//! Single-tap delay effect and log-band spectrum analyzer, plus the host
//! plumbing to play, analyse and export audio files through them.

pub mod engine {
  pub mod analysis;
  pub mod audio;
  pub mod config;
  pub mod dsp;
  pub mod messages;
  pub mod params;
  pub mod source;
  pub mod tap;
  pub mod window;
}
pub mod commands;
pub mod error;
pub mod fs_api;

pub use engine::analysis::{SpectrumTicker, SpectrumWorker};
pub use engine::config::{EffectConfig, EngineConfig, PlaybackConfig, SpectrumConfig};
pub use engine::dsp::delay::{DelayLine, DelayMix};
pub use engine::dsp::fft::Fft;
pub use engine::dsp::spectrum::{BandLayout, SpectrumAnalyzer};
pub use engine::source::{BufferSource, SampleSource, SeekableSource};
pub use engine::tap::{BandSink, SampleTap, WaveformSink};
pub use engine::window::RawSampleWindow;
pub use error::{EngineError, SourceError};
