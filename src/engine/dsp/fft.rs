//! Iterative in-place radix-2 Cooley-Tukey FFT.

use rustfft::num_complex::Complex32;

use crate::error::{invalid, Result};

/// Precomputed bit-reversal swaps and twiddles for one transform size.
pub struct Fft {
  n: usize,
  swaps: Vec<(usize, usize)>,
  // twiddles[k] = e^{-2πik/n} for k in [0, n/2)
  twiddles: Vec<Complex32>,
}

impl Fft {
  pub fn new(n: usize) -> Result<Self> {
    if n < 2 || !n.is_power_of_two() {
      return Err(invalid(format!("FFT size must be a power of two >= 2, got {n}")));
    }
    let bits = n.trailing_zeros();
    let swaps = (0..n)
      .filter_map(|i| {
        let j = bit_reverse(i, bits);
        (j > i).then_some((i, j))
      })
      .collect();
    let twiddles = (0..n / 2)
      .map(|k| {
        let phase = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
        Complex32::new(phase.cos() as f32, phase.sin() as f32)
      })
      .collect();
    Ok(Self { n, swaps, twiddles })
  }

  pub fn len(&self) -> usize { self.n }
  pub fn is_empty(&self) -> bool { self.n == 0 }
  pub fn stages(&self) -> u32 { self.n.trailing_zeros() }

  /// Forward transform in place. `buf.len()` must equal [`Fft::len`].
  pub fn forward(&self, buf: &mut [Complex32]) {
    assert_eq!(buf.len(), self.n, "buffer length does not match FFT size");
    for &(i, j) in &self.swaps { buf.swap(i, j); }

    let mut size = 2;
    while size <= self.n {
      let half = size / 2;
      let stride = self.n / size;
      for chunk in buf.chunks_exact_mut(size) {
        let (even, odd) = chunk.split_at_mut(half);
        for k in 0..half {
          let t = self.twiddles[k * stride] * odd[k];
          let e = even[k];
          even[k] = e + t;
          odd[k] = e - t;
        }
      }
      size <<= 1;
    }
  }

  /// Inverse transform in place via conjugate, forward, conjugate, scale.
  pub fn inverse(&self, buf: &mut [Complex32]) {
    for c in buf.iter_mut() { *c = c.conj(); }
    self.forward(buf);
    let scale = 1.0 / self.n as f32;
    for c in buf.iter_mut() { *c = c.conj() * scale; }
  }
}

/// Reverses the low `bits` bits of `n`.
#[inline]
pub fn bit_reverse(n: usize, bits: u32) -> usize {
  if bits == 0 { return 0; }
  n.reverse_bits() >> (usize::BITS - bits)
}
