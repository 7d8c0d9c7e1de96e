/// Control messages drained by the audio callback.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineMsg {
  /// Rebuild the effect at a new decay factor.
  SetDecay(f32),
  Transport { playing: bool },
  /// Jump the source to an absolute frame.
  Seek { frame: usize },
  Quit,
}
