// Copyright 2025-2026 CEMAXECUTER LLC

use std::path::{Path, PathBuf};

use ais_input::file::SampleFormat;
use ais_receiver::burst::DEFAULT_SQUELCH_DB;
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::InitError;

pub const DEFAULT_IPC_SOCKET: &str = "/tmp/aisrx.sock";

/// Which input channels feed which receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    #[default]
    Mono,
    Left,
    Right,
    Both,
}

impl ChannelLayout {
    /// Interleaved channels captured for this layout
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            _ => 2,
        }
    }

    /// Receivers to create, as (label, channel offset)
    pub fn receivers(self) -> &'static [(char, usize)] {
        match self {
            ChannelLayout::Mono | ChannelLayout::Left => &[('A', 0)],
            ChannelLayout::Right => &[('A', 1)],
            ChannelLayout::Both => &[('A', 0), ('B', 1)],
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "aisrx")]
#[command(about = "AIS receiver: sound card capture, channel dispatch and decoder statistics")]
pub struct Cli {
    /// JSON configuration file (command line flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Sound device: "default", a device name, or host:name
    #[arg(short = 'd', long)]
    pub device: Option<String>,

    /// Raw PCM file to replay instead of a live device
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Sample format for file input: s8, s16le, f32le
    #[arg(long)]
    pub format: Option<String>,

    /// Record captured audio (raw S16LE) to this file
    #[arg(short = 'w', long)]
    pub record: Option<PathBuf>,

    /// Channel layout
    #[arg(long, value_enum)]
    pub channels: Option<ChannelLayout>,

    /// Seconds between decoder statistics (0 disables)
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Fork to background after startup
    #[arg(short = 'D', long)]
    pub daemonize: bool,

    /// Pid file written by the background process
    #[arg(short = 'p', long)]
    pub pidfile: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(short = 'l', long)]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Serial port for NMEA output
    #[arg(long)]
    pub serial: Option<PathBuf>,

    /// Unix socket path for GUI clients
    #[arg(long)]
    pub ipc_socket: Option<PathBuf>,

    /// Do not open the GUI socket
    #[arg(long)]
    pub no_ipc: bool,

    /// JSON uplink target (tcp://host:port or zmq+tcp://host:port)
    #[arg(long)]
    pub uplink: Option<String>,

    /// Squelch threshold in dBFS
    #[arg(long, allow_hyphen_values = true)]
    pub squelch: Option<f32>,
}

fn default_station() -> String {
    "aisrx".to_string()
}

fn default_uplink_interval() -> u64 {
    60
}

fn default_cache_entries() -> usize {
    4096
}

fn default_cache_max_age() -> u64 {
    600
}

/// JSON uplink and its position cache
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UplinkConfig {
    pub url: String,
    #[serde(default = "default_station")]
    pub station: String,
    /// Seconds between uplink documents
    #[serde(default = "default_uplink_interval")]
    pub interval: u64,
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
    /// Positions older than this are not sent (0 keeps everything)
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,
}

impl UplinkConfig {
    fn with_url(url: String) -> Self {
        Self {
            url,
            station: default_station(),
            interval: default_uplink_interval(),
            cache_entries: default_cache_entries(),
            cache_max_age: default_cache_max_age(),
        }
    }
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub sound_device: Option<String>,
    pub sound_in_file: Option<PathBuf>,
    pub sound_format: Option<String>,
    pub sound_out_file: Option<PathBuf>,
    pub sound_channels: Option<ChannelLayout>,
    pub stats_interval: Option<u64>,
    pub daemonize: Option<bool>,
    pub pidfile: Option<PathBuf>,
    pub serial_port: Option<PathBuf>,
    pub ipc_socket: Option<PathBuf>,
    /// false disables the GUI socket
    pub ipc: Option<bool>,
    pub uplink: Option<UplinkConfig>,
    pub squelch_db: Option<f32>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, InitError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| InitError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| InitError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

/// Immutable runtime configuration, built once before the loop starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub sound_device: Option<String>,
    pub sound_in_file: Option<PathBuf>,
    pub sound_format: SampleFormat,
    pub sound_out_file: Option<PathBuf>,
    pub channels: ChannelLayout,
    pub stats_interval: u64,
    pub daemonize: bool,
    pub pidfile: Option<PathBuf>,
    pub serial_port: Option<PathBuf>,
    pub ipc_socket: Option<PathBuf>,
    pub uplink: Option<UplinkConfig>,
    pub squelch_db: f32,
}

impl RuntimeConfig {
    /// Read the config file named on the command line (if any) and apply
    /// command line overrides.
    pub fn load(cli: &Cli) -> Result<Self, InitError> {
        let file = match cli.config {
            Some(ref path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: FileConfig) -> Result<Self, InitError> {
        let format_name = cli.format.clone().or(file.sound_format);
        let sound_format = match format_name {
            Some(name) => SampleFormat::parse(&name).ok_or_else(|| {
                InitError::Config(format!(
                    "unknown sample format: {} (use s8, s16le, or f32le)",
                    name
                ))
            })?,
            None => SampleFormat::default(),
        };

        let ipc_enabled = !cli.no_ipc && file.ipc.unwrap_or(true);
        let ipc_socket = if ipc_enabled {
            Some(
                cli.ipc_socket
                    .clone()
                    .or(file.ipc_socket)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IPC_SOCKET)),
            )
        } else {
            None
        };

        let uplink = match cli.uplink {
            Some(ref url) => Some(match file.uplink {
                Some(section) => UplinkConfig {
                    url: url.clone(),
                    ..section
                },
                None => UplinkConfig::with_url(url.clone()),
            }),
            None => file.uplink,
        };

        let config = Self {
            sound_device: cli.device.clone().or(file.sound_device),
            sound_in_file: cli.file.clone().or(file.sound_in_file),
            sound_format,
            sound_out_file: cli.record.clone().or(file.sound_out_file),
            channels: cli.channels.or(file.sound_channels).unwrap_or_default(),
            stats_interval: cli.stats_interval.or(file.stats_interval).unwrap_or(0),
            daemonize: cli.daemonize || file.daemonize.unwrap_or(false),
            pidfile: cli.pidfile.clone().or(file.pidfile),
            serial_port: cli.serial.clone().or(file.serial_port),
            ipc_socket,
            uplink,
            squelch_db: cli.squelch.or(file.squelch_db).unwrap_or(DEFAULT_SQUELCH_DB),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), InitError> {
        if self.sound_device.is_none() && self.sound_in_file.is_none() {
            return Err(InitError::Config(
                "neither sound device or sound file configured".to_string(),
            ));
        }
        if self.daemonize && self.pidfile.is_none() {
            return Err(InitError::Config(
                "running as a daemon requires a pidfile".to_string(),
            ));
        }
        if let Some(ref up) = self.uplink {
            if up.url.is_empty() {
                return Err(InitError::Config("uplink url is empty".to_string()));
            }
            if up.interval == 0 {
                return Err(InitError::Config("uplink interval must be nonzero".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_file(path: &str) -> Cli {
        Cli {
            file: Some(PathBuf::from(path)),
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_receivers() {
        assert_eq!(ChannelLayout::Mono.receivers(), &[('A', 0)]);
        assert_eq!(ChannelLayout::Left.receivers(), &[('A', 0)]);
        assert_eq!(ChannelLayout::Right.receivers(), &[('A', 1)]);
        assert_eq!(ChannelLayout::Both.receivers(), &[('A', 0), ('B', 1)]);
        assert_eq!(ChannelLayout::Mono.channels(), 1);
        assert_eq!(ChannelLayout::Right.channels(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::merge(&cli_with_file("in.raw"), FileConfig::default()).unwrap();
        assert_eq!(config.channels, ChannelLayout::Mono);
        assert_eq!(config.stats_interval, 0);
        assert_eq!(config.sound_format, SampleFormat::S16Le);
        assert_eq!(config.ipc_socket, Some(PathBuf::from(DEFAULT_IPC_SOCKET)));
        assert!(config.uplink.is_none());
        assert!(!config.daemonize);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "sound_in_file": "file.raw",
                "sound_channels": "both",
                "stats_interval": 30,
                "uplink": { "url": "tcp://collector:5000", "interval": 120 }
            }"#,
        )
        .unwrap();
        let cli = Cli {
            file: Some(PathBuf::from("cli.raw")),
            stats_interval: Some(5),
            uplink: Some("tcp://other:6000".to_string()),
            ..Default::default()
        };
        let config = RuntimeConfig::merge(&cli, file).unwrap();
        assert_eq!(config.sound_in_file, Some(PathBuf::from("cli.raw")));
        assert_eq!(config.channels, ChannelLayout::Both);
        assert_eq!(config.stats_interval, 5);
        let up = config.uplink.unwrap();
        assert_eq!(up.url, "tcp://other:6000");
        assert_eq!(up.interval, 120);
        assert_eq!(up.station, "aisrx");
    }

    #[test]
    fn test_missing_input_rejected() {
        let err = RuntimeConfig::merge(&Cli::default(), FileConfig::default()).unwrap_err();
        assert!(matches!(err, InitError::Config(_)));
    }

    #[test]
    fn test_daemon_needs_pidfile() {
        let cli = Cli {
            daemonize: true,
            ..cli_with_file("in.raw")
        };
        assert!(RuntimeConfig::merge(&cli, FileConfig::default()).is_err());
        let cli = Cli {
            daemonize: true,
            pidfile: Some(PathBuf::from("/run/aisrx.pid")),
            ..cli_with_file("in.raw")
        };
        assert!(RuntimeConfig::merge(&cli, FileConfig::default()).unwrap().daemonize);
    }

    #[test]
    fn test_bad_format_rejected() {
        let cli = Cli {
            format: Some("ci16".to_string()),
            ..cli_with_file("in.raw")
        };
        assert!(RuntimeConfig::merge(&cli, FileConfig::default()).is_err());
    }

    #[test]
    fn test_ipc_disable() {
        let cli = Cli {
            no_ipc: true,
            ..cli_with_file("in.raw")
        };
        assert_eq!(RuntimeConfig::merge(&cli, FileConfig::default()).unwrap().ipc_socket, None);

        let file: FileConfig = serde_json::from_str(r#"{ "ipc": false }"#).unwrap();
        let config = RuntimeConfig::merge(&cli_with_file("in.raw"), file).unwrap();
        assert_eq!(config.ipc_socket, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<FileConfig>(r#"{ "sound_chanels": "both" }"#).is_err());
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aisrx.json");
        std::fs::write(
            &path,
            r#"{ "sound_device": "hw:1,0", "sound_channels": "right" }"#,
        )
        .unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let config = RuntimeConfig::load(&cli).unwrap();
        assert_eq!(config.sound_device.as_deref(), Some("hw:1,0"));
        assert_eq!(config.channels, ChannelLayout::Right);

        let cli = Cli {
            config: Some(dir.path().join("missing.json")),
            ..Default::default()
        };
        assert!(RuntimeConfig::load(&cli).is_err());
    }
}
