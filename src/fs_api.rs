use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::dsp::delay::DelayMix;
use crate::engine::source::{BufferSource, SampleSource};
use crate::error::{invalid, EngineError, Result};

/// Samples pulled per block when rendering to disk.
pub const EXPORT_BLOCK: usize = 4096;

/// Decodes an audio file into memory, mixing all channels down to mono.
pub fn load_audio_file(path: &Path) -> Result<BufferSource> {
  let file = File::open(path)?;
  let mss = MediaSourceStream::new(Box::new(file), Default::default());

  let mut hint = Hint::new();
  if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
    hint.with_extension(ext);
  }

  let meta_opts: MetadataOptions = Default::default();
  let fmt_opts: FormatOptions = Default::default();
  let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
  let mut format = probed.format;

  let track = format
    .tracks()
    .iter()
    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    .ok_or(EngineError::NoAudioTrack)?;
  let dec_opts: DecoderOptions = Default::default();
  let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;
  let track_id = track.id;
  let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

  let mut mono: Vec<f32> = Vec::new();
  let mut interleaved: Option<SampleBuffer<f32>> = None;

  loop {
    let packet = match format.next_packet() {
      Ok(packet) => packet,
      // Track list changed (chained streams); treat as end of stream.
      Err(Error::ResetRequired) => break,
      // End of file.
      Err(Error::IoError(_)) => break,
      Err(err) => return Err(err.into()),
    };

    while !format.metadata().is_latest() {
      format.metadata().pop();
    }
    if packet.track_id() != track_id { continue; }

    let decoded = match decoder.decode(&packet) {
      Ok(d) => d,
      Err(Error::DecodeError(msg)) => {
        log::warn!("skipping undecodable packet: {msg}");
        continue;
      }
      Err(err) => return Err(err.into()),
    };

    let spec = *decoded.spec();
    sample_rate = spec.rate;
    let channels = spec.channels.count().max(1);
    let frames = decoded.capacity();
    if interleaved.as_ref().map_or(true, |b| b.capacity() < frames * channels) {
      interleaved = Some(SampleBuffer::new(frames as u64, spec));
    }
    let Some(buf) = interleaved.as_mut() else { continue };
    buf.copy_interleaved_ref(decoded);
    let scale = 1.0 / channels as f32;
    mono.extend(buf.samples().chunks(channels).map(|frame| frame.iter().sum::<f32>() * scale));
  }

  if sample_rate == 0 {
    return Err(invalid(format!("{}: unknown sample rate", path.display())));
  }
  log::info!("decoded {}: {} samples @ {} Hz", path.display(), mono.len(), sample_rate);
  Ok(BufferSource::new(mono, sample_rate))
}

/// `<stem>_reverb<pct>.wav` next to `input`.
pub fn default_export_path(input: &Path, decay_percent: u8) -> PathBuf {
  let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
  input.with_file_name(format!("{stem}_reverb{decay_percent}.wav"))
}

/// Pulls `effect` to exhaustion and writes 16-bit mono PCM. Returns the
/// number of samples written.
pub fn export_wav<S: SampleSource>(effect: &mut DelayMix<S>, path: &Path) -> Result<u64> {
  let spec = hound::WavSpec {
    channels: 1,
    sample_rate: effect.sample_rate(),
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut writer = hound::WavWriter::create(path, spec)?;
  let mut block = vec![0.0f32; EXPORT_BLOCK];
  let mut written = 0u64;
  loop {
    let n = effect.process(&mut block)?;
    if n == 0 { break; }
    for &s in &block[..n] {
      writer.write_sample(to_i16(s))?;
    }
    written += n as u64;
  }
  writer.finalize()?;
  log::info!("wrote {} samples to {}", written, path.display());
  Ok(written)
}

#[inline]
fn to_i16(sample: f32) -> i16 { (sample.clamp(-1.0, 1.0) * 32767.0) as i16 }
