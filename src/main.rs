//! midiloop - background MIDI player driven from the terminal.
//!
//! Starts the player and acts as its producer: every line read from stdin
//! is posted as a command.
//!
//! # Usage
//!
//! ```bash
//! midiloop --soundfont assets/TimGM6mb.sf2
//! > music/theme.mid       # play and loop a track
//! > voladjust -600        # set the master volume
//! > stop                  # stop playback
//! > status                # print the player state
//! > quit
//! ```

use anyhow::{Context, Result};
use midiloop::{MidiPlayer, PlayerConfig, PlayerState};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Command-line options for the application.
struct CliOptions {
    /// Path to a JSON configuration file.
    config: Option<PathBuf>,
    /// Path to a custom SoundFont file.
    soundfont: Option<PathBuf>,
    /// Initial volume level.
    volume: Option<i32>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>` or `-c <path>`: Load settings from a JSON file
    /// - `--soundfont <path>` or `-sf <path>`: Specify a SoundFont file
    /// - `--volume <level>` or `-v <level>`: Initial volume (0 = normal, -1200 = quiet)
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut config: Option<PathBuf> = None;
        let mut soundfont: Option<PathBuf> = None;
        let mut volume: Option<i32> = None;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    let path = args.get(i).context("--config requires a path argument")?;
                    config = Some(PathBuf::from(path));
                }
                "--soundfont" | "-sf" => {
                    i += 1;
                    let path = args
                        .get(i)
                        .context("--soundfont requires a path argument")?;
                    soundfont = Some(PathBuf::from(path));
                }
                "--volume" | "-v" => {
                    i += 1;
                    let level = args.get(i).context("--volume requires a level argument")?;
                    volume = Some(
                        level
                            .parse()
                            .with_context(|| format!("Invalid volume level: {}", level))?,
                    );
                }
                "--help" | "-h" => {
                    eprintln!("midiloop - background MIDI player");
                    eprintln!();
                    eprintln!(
                        "Usage: {} [OPTIONS]",
                        args.first().map(String::as_str).unwrap_or("midiloop")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("  -c, --config PATH      Load settings from a JSON file");
                    eprintln!("  -sf, --soundfont PATH  Load a specific SoundFont file (.sf2)");
                    eprintln!("  -v, --volume LEVEL     Initial volume (0 = normal, -1200 = quiet)");
                    eprintln!("  -h, --help             Print this help message");
                    eprintln!();
                    eprintln!("Commands (stdin): <track.mid> | voladjust <level> | stop | status | quit");
                    std::process::exit(0);
                }
                other => {
                    // Positional SoundFont
                    if other.ends_with(".sf2") {
                        soundfont = Some(PathBuf::from(other));
                    } else {
                        anyhow::bail!("Unknown option: {} (use --help for usage)", other);
                    }
                }
            }
            i += 1;
        }

        Ok(Self {
            config,
            soundfont,
            volume,
        })
    }

    /// Builds the player configuration; command-line values win over the file.
    fn player_config(&self) -> Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => PlayerConfig::default(),
        };
        if let Some(soundfont) = &self.soundfont {
            config.soundfont = soundfont.clone();
        }
        if let Some(volume) = self.volume {
            config.initial_volume = volume;
        }
        Ok(config)
    }
}

fn print_status(state: &PlayerState) {
    let track = state
        .current_track
        .as_ref()
        .map(|t| t.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:?}  track: {}  volume: {}",
        state.transport, track, state.current_volume
    );
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = cli.player_config()?;
    let mut player = MidiPlayer::start(&config).context("Failed to start MIDI player")?;
    let mut volume = config.initial_volume;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        let line = line.trim();

        match line.split_once(char::is_whitespace) {
            _ if line.is_empty() => {}
            _ if line == "quit" || line == "exit" => break,
            _ if line == "status" => print_status(&player.status()),
            Some(("voladjust", level)) => match level.trim().parse::<i32>() {
                Ok(level) => {
                    volume = level;
                    player.post_command("voladjust", volume);
                }
                Err(_) => eprintln!("Invalid volume level: {}", level.trim()),
            },
            _ => player.post_command(line, volume),
        }

        if !player.is_running() {
            eprintln!("MIDI player stopped unexpectedly");
            break;
        }

        print!("> ");
        stdout.flush()?;
    }

    player.stop();
    Ok(())
}
