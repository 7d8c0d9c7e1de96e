pub mod delay;
pub mod fft;
pub mod spectrum;
