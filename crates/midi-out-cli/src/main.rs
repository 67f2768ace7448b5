use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;

use midi_out::{MidiOutput, OutputConfig};

#[derive(Parser, Debug)]
#[command(name = "midiout", about = "MIDI output utility")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config/midi.toml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List MIDI output devices
    Devices {
        /// Emit the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send one raw MIDI message given as hex bytes (e.g. `90 3C 7F`)
    Send {
        /// Output device name (overrides the config file)
        #[arg(short, long)]
        device: Option<String>,

        /// Message bytes in hex
        #[arg(required = true)]
        bytes: Vec<String>,
    },
    /// Play one note: Note On, hold, Note Off
    Note {
        /// Output device name (overrides the config file)
        #[arg(short, long)]
        device: Option<String>,

        /// MIDI note number (60 = middle C)
        #[arg(long, default_value_t = 60)]
        note: u8,

        /// Note On velocity
        #[arg(long, default_value_t = 100)]
        velocity: u8,

        /// MIDI channel (1-16)
        #[arg(long, default_value_t = 1)]
        channel: u8,

        /// How long to hold the note, in milliseconds
        #[arg(long, default_value_t = 500)]
        duration_ms: u64,
    },
    /// Silence everything: All Sound Off + All Notes Off on all channels
    Panic {
        /// Output device name (overrides the config file)
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(default)]
    midi: OutputConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    match args.command {
        Commands::Devices { json } => {
            let out = MidiOutput::new();
            let devices = out.devices();
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No MIDI output devices found");
            } else {
                println!("MIDI output devices");
                println!("══════════════════════════════");
                for dev in &devices {
                    println!("  {:>3}  {}", dev.id, dev.name);
                }
            }
        }
        Commands::Send { device, bytes } => {
            let data = parse_hex_bytes(&bytes)?;
            let mut out = open_output(&config, device)?;
            out.send(&data)?;
            println!("Sent {} byte(s)", data.len());
        }
        Commands::Note {
            device,
            note,
            velocity,
            channel,
            duration_ms,
        } => {
            anyhow::ensure!((1..=16).contains(&channel), "channel must be 1-16");
            anyhow::ensure!(note <= 127, "note must be 0-127");
            anyhow::ensure!(velocity <= 127, "velocity must be 0-127");

            let ch = channel - 1;
            let mut out = open_output(&config, device)?;
            out.send(&[0x90 | ch, note, velocity])?;
            thread::sleep(Duration::from_millis(duration_ms));
            out.send(&[0x80 | ch, note, 0])?;
            println!("Played note {} on channel {}", note, channel);
        }
        Commands::Panic { device } => {
            let mut out = open_output(&config, device)?;
            out.send_all_off()?;
            println!("Sent All Sound Off + All Notes Off on all channels");
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults when it doesn't exist.
fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
    if path.exists() {
        let config_str = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config_str)?)
    } else {
        info!("No config file found, using defaults");
        Ok(CliConfig::default())
    }
}

/// Open the requested device, or the configured one when no override is
/// given.
fn open_output(config: &CliConfig, device_override: Option<String>) -> anyhow::Result<MidiOutput> {
    let name = device_override.unwrap_or_else(|| config.midi.device.clone());
    let mut out = MidiOutput::new();
    out.open(&name)?;
    Ok(out)
}

/// Parse message bytes given as hex strings: "90 3C 7F", "0x90", "f0,7e,f7".
fn parse_hex_bytes(args: &[String]) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    for arg in args {
        for part in arg.split([' ', ',']) {
            if part.is_empty() {
                continue;
            }
            let hex = part.trim_start_matches("0x").trim_start_matches("0X");
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| anyhow::anyhow!("invalid hex byte: {}", part))?;
            data.push(byte);
        }
    }
    anyhow::ensure!(!data.is_empty(), "no message bytes given");
    Ok(data)
}
