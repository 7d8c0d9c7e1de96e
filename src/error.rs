use thiserror::Error;

/// Failure while pulling samples from an upstream source.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("source i/o: {0}")]
  Io(#[from] std::io::Error),
  #[error("source decode: {0}")]
  Decode(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
  #[error(transparent)]
  Source(#[from] SourceError),
  #[error("decode failed: {0}")]
  Decode(#[from] symphonia::core::errors::Error),
  #[error("no supported audio track")]
  NoAudioTrack,
  #[error("wav: {0}")]
  Wav(#[from] hound::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error("config: {0}")]
  Config(#[from] serde_json::Error),
  #[error("audio device: {0}")]
  Device(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

pub(crate) fn invalid(msg: impl Into<String>) -> EngineError { EngineError::InvalidConfig(msg.into()) }
