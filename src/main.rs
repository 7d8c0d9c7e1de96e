use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};

use delayscope::commands::{analyze_file, export_file, start_playback};
use delayscope::{BandSink, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "delayscope")]
#[command(about = "Single-tap delay effect with a live log-band spectrum", long_about = None)]
struct Args {
  /// JSON config file (defaults to the per-user config if present)
  #[arg(long, value_name = "PATH", global = true)]
  config: Option<PathBuf>,

  /// Map bands assuming 44.1 kHz regardless of the file's rate
  #[arg(long, global = true)]
  parity_44k: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Play a file with the effect and draw its spectrum. Stdin: + - p s <secs> q
  Play {
    file: PathBuf,
    /// Decay in percent
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
    decay: Option<u8>,
  },
  /// Render a file through the effect to 16-bit WAV
  Export {
    file: PathBuf,
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
    decay: Option<u8>,
  },
  /// Print spectrum frames for a file without opening a device
  Analyze {
    file: PathBuf,
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
    decay: Option<u8>,
    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    frames: Option<usize>,
  },
}

/// Draws bands as one line of block glyphs.
struct TerminalBars {
  max_height: f32,
  redraw: bool,
}

const GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

impl BandSink for TerminalBars {
  fn render(&mut self, bands: &[f32]) {
    let line: String = bands
      .iter()
      .map(|&b| {
        let level = ((b / self.max_height) * 8.0).round().clamp(0.0, 8.0) as usize;
        GLYPHS[level]
      })
      .collect();
    let mut out = io::stdout().lock();
    let _ = if self.redraw { write!(out, "\r|{line}|") } else { writeln!(out, "|{line}|") };
    let _ = out.flush();
  }
}

fn init_logging() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    // Quiet the decoder's probe chatter.
    .filter_module("symphonia_core", log::LevelFilter::Warn)
    .filter_module("symphonia_bundle_mp3", log::LevelFilter::Warn)
    .init();
}

fn main() -> anyhow::Result<()> {
  init_logging();
  let args = Args::parse();
  let mut cfg = EngineConfig::load(args.config.as_deref()).context("loading config")?;

  match args.command {
    Command::Play { file, decay } => {
      apply_decay(&mut cfg, decay);
      play(file, cfg, args.parity_44k)
    }
    Command::Export { file, out, decay } => {
      apply_decay(&mut cfg, decay);
      let (path, n) = export_file(&file, out.as_deref(), &cfg).with_context(|| format!("exporting {}", file.display()))?;
      log::info!("saved {} ({} samples)", path.display(), n);
      Ok(())
    }
    Command::Analyze { file, decay, frames } => {
      apply_decay(&mut cfg, decay);
      let mut bars = TerminalBars { max_height: cfg.spectrum.max_height, redraw: false };
      let n = analyze_file(&file, &cfg, args.parity_44k, &mut bars, frames)
        .with_context(|| format!("analysing {}", file.display()))?;
      log::info!("{n} frames");
      Ok(())
    }
  }
}

fn apply_decay(cfg: &mut EngineConfig, percent: Option<u8>) {
  if let Some(p) = percent { cfg.effect.decay = p as f32 / 100.0; }
}

fn play(file: PathBuf, cfg: EngineConfig, parity_44k: bool) -> anyhow::Result<()> {
  let bars = TerminalBars { max_height: cfg.spectrum.max_height, redraw: true };
  let mut session = start_playback(&file, &cfg, parity_44k, bars).with_context(|| format!("playing {}", file.display()))?;
  let input = spawn_stdin_reader();
  let mut last_report = Instant::now();

  while !session.is_finished() {
    match input.recv_timeout(Duration::from_millis(200)) {
      Ok(cmd) => match cmd.trim() {
        "+" => { session.increase_decay(); }
        "-" => { session.decrease_decay(); }
        "p" => {
          let playing = session.toggle_pause();
          log::info!("{}", if playing { "resumed" } else { "paused" });
        }
        "q" => { session.quit(); break; }
        "" => {}
        other => match other.strip_prefix('s').map(|rest| rest.trim().parse::<f64>()) {
          Some(Ok(secs)) => { session.seek(secs); }
          Some(Err(_)) => log::warn!("seek expects seconds, e.g. 's 30'"),
          None => log::warn!("unknown command '{other}' (use + - p s <secs> q)"),
        },
      },
      Err(RecvTimeoutError::Timeout) => {}
      // stdin closed; keep playing until the end.
      Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(200)),
    }
    if last_report.elapsed() >= Duration::from_secs(1) {
      log::info!("{}  decay {}%", session.progress_label(), session.decay_percent());
      last_report = Instant::now();
    }
  }
  println!();
  session.stop();
  Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
  let (tx, rx) = unbounded();
  thread::spawn(move || {
    for line in io::stdin().lock().lines() {
      let Ok(line) = line else { break };
      if tx.send(line).is_err() { break; }
    }
  });
  rx
}
