/// Decay as a whole percentage moved in fixed steps, the way the host exposes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecayControl {
  percent: u8,
  step: u8,
}

impl DecayControl {
  pub fn new(percent: u8, step: u8) -> Self { Self { percent: percent.min(100), step: step.clamp(1, 100) } }

  pub fn from_factor(decay: f32, step: u8) -> Self {
    let pct = (decay.clamp(0.0, 1.0) * 100.0).round() as u8;
    Self::new(pct, step)
  }

  pub fn percent(&self) -> u8 { self.percent }
  pub fn factor(&self) -> f32 { self.percent as f32 / 100.0 }

  /// Returns false when already at 100 %.
  pub fn increase(&mut self) -> bool { self.set(self.percent.saturating_add(self.step).min(100)) }

  /// Returns false when already at 0 %.
  pub fn decrease(&mut self) -> bool { self.set(self.percent.saturating_sub(self.step)) }

  fn set(&mut self, pct: u8) -> bool {
    let changed = pct != self.percent;
    self.percent = pct;
    changed
  }
}

impl Default for DecayControl {
  fn default() -> Self { Self::new(0, 5) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn steps_stay_within_bounds() {
    let mut d = DecayControl::new(90, 5);
    assert!(d.increase());
    assert!(d.increase());
    assert_eq!(d.percent(), 100);
    assert!(!d.increase());
    let mut d = DecayControl::new(3, 5);
    assert!(d.decrease());
    assert_eq!(d.percent(), 0);
    assert!(!d.decrease());
  }

  #[test]
  fn factor_maps_percent() {
    let d = DecayControl::from_factor(0.35, 5);
    assert_eq!(d.percent(), 35);
    assert!((d.factor() - 0.35).abs() < 1e-6);
    assert_eq!(DecayControl::from_factor(7.0, 5).percent(), 100);
  }
}
