/* Interactive demo for the tone engine.
Reads one command per line from stdin; type 'help' for the list.
*/

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use bowlsynth::background::TrackSource;
use bowlsynth::config::{EngineConfig, CHANNEL_COUNT};
use bowlsynth::utils::init_logger;
use bowlsynth::ToneEngine;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bowlsynth", about = "Four-channel singing bowl tone generator")]
struct Args {
    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// Samples per buffer
    #[arg(long, default_value_t = 2048)]
    buffer_size: usize,

    /// Milliseconds to wait for the playback thread on stop
    #[arg(long, default_value_t = 500)]
    stop_timeout_ms: u64,

    /// Initial channel frequencies in Hz (up to four, comma separated)
    #[arg(long, value_delimiter = ',')]
    frequencies: Vec<f32>,

    /// Background track to load at startup
    #[arg(long)]
    bgm: Option<PathBuf>,

    /// Start playback immediately
    #[arg(long)]
    autostart: bool,
}

const HELP: &str = "\
Commands:
  start | stop                 start or stop the tones
  f <ch> <hz>                  set channel frequency
  v <ch> <0-1>                 set channel volume
  on <ch> | off <ch>           enable or disable a channel
  lfo <ch> <hz> <depth>        set LFO rate and depth
  m <0-1>                      set master volume
  bgm <path>                   load a background track
  play | pause | rewind        background transport
  bv <0-1>                     background volume
  fade <in-secs> <out-secs>    background fade times
  loop on|off                  background looping
  status                       print engine state
  q                            quit";

fn parse<T: std::str::FromStr>(arg: Option<&str>) -> Option<T> {
    arg.and_then(|a| a.parse().ok())
}

fn print_status(engine: &ToneEngine) {
    println!(
        "playing: {}  master: {:.2}  bgm: {:?} ({})",
        engine.is_playing(),
        engine.master_volume(),
        engine.bgm_state(),
        engine
            .background()
            .source_name()
            .unwrap_or_else(|| "none".into())
    );
    let latest = engine.latest_waveform();
    for ch in 0..CHANNEL_COUNT {
        let Ok(params) = engine.channel(ch) else {
            continue;
        };
        let peak = latest
            .channel(ch)
            .map(|wave| wave.iter().fold(0.0f32, |acc, s| acc.max(s.abs())))
            .unwrap_or(0.0);
        println!(
            "  ch{} {:>8.1} Hz  vol {:.2}  {}  lfo {:.1} Hz x {:.2}  peak {:.3}",
            ch,
            params.frequency(),
            params.volume(),
            if params.is_enabled() { "on " } else { "off" },
            params.lfo_rate(),
            params.lfo_depth(),
            peak
        );
    }
}

fn handle(engine: &ToneEngine, line: &str) -> anyhow::Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };
    let a = words.next();
    let b = words.next();
    let c = words.next();

    match command {
        "start" => engine.start()?,
        "stop" => engine.stop()?,
        "f" => match (parse(a), parse(b)) {
            (Some(ch), Some(hz)) => engine.set_channel_frequency(ch, hz)?,
            _ => println!("usage: f <ch> <hz>"),
        },
        "v" => match (parse(a), parse(b)) {
            (Some(ch), Some(vol)) => engine.set_channel_volume(ch, vol)?,
            _ => println!("usage: v <ch> <0-1>"),
        },
        "on" | "off" => match parse(a) {
            Some(ch) => engine.set_channel_enabled(ch, command == "on")?,
            None => println!("usage: {} <ch>", command),
        },
        "lfo" => match (parse(a), parse(b), parse(c)) {
            (Some(ch), Some(rate), Some(depth)) => {
                engine.set_channel_lfo_rate(ch, rate)?;
                engine.set_channel_lfo_depth(ch, depth)?;
            }
            _ => println!("usage: lfo <ch> <hz> <depth>"),
        },
        "m" => match parse(a) {
            Some(vol) => engine.set_master_volume(vol),
            None => println!("usage: m <0-1>"),
        },
        "bgm" => match a {
            Some(path) => engine.load_bgm(&TrackSource::path(path))?,
            None => println!("usage: bgm <path>"),
        },
        "play" => engine.play_bgm(),
        "pause" => engine.pause_bgm(),
        "rewind" => engine.stop_bgm()?,
        "bv" => match parse(a) {
            Some(vol) => engine.set_bgm_volume(vol),
            None => println!("usage: bv <0-1>"),
        },
        "fade" => match (parse(a), parse(b)) {
            (Some(fade_in), Some(fade_out)) => {
                engine.set_bgm_fade_in(fade_in);
                engine.set_bgm_fade_out(fade_out);
            }
            _ => println!("usage: fade <in-secs> <out-secs>"),
        },
        "loop" => engine.set_bgm_looping(a == Some("on")),
        "status" => print_status(engine),
        "help" | "?" => println!("{}", HELP),
        "q" | "quit" => return Ok(false),
        other => println!("Unknown command '{}', type 'help'", other),
    }
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    init_logger();
    let args = Args::parse();

    let config = EngineConfig::default()
        .with_sample_rate(args.sample_rate)
        .with_buffer_size(args.buffer_size)
        .with_stop_timeout(Duration::from_millis(args.stop_timeout_ms));
    let engine = ToneEngine::native(config)?;

    for (ch, hz) in args.frequencies.iter().take(CHANNEL_COUNT).enumerate() {
        engine.set_channel_frequency(ch, *hz)?;
    }
    if let Some(path) = &args.bgm {
        engine.load_bgm(&TrackSource::path(path.clone()))?;
    }
    if args.autostart {
        engine.start()?;
    }

    println!("{}", HELP);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match handle(&engine, line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => println!("error: {:#}", err),
        }

        if let Some(err) = engine.take_playback_error() {
            println!("playback stopped: {}", err);
        }
    }

    println!("Quitting...");
    engine.release();
    Ok(())
}
