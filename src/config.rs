// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use crate::drivers::{FaultPolicy, SamplerConfig, SerialConfig};

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Timed single-channel trial recorder (RMS / AM)")]
pub struct Args {
    /// Load settings from a JSON file; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Serial port of the sensing device
    #[arg(long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud: Option<u32>,
    /// Trial length in seconds
    #[arg(long)]
    pub duration: Option<f64>,
    #[arg(long)]
    pub ticks_per_second: Option<u32>,
    /// Append-only text log of saved trials
    #[arg(long)]
    pub data_file: Option<PathBuf>,
    /// Directory for saved plot images
    #[arg(long)]
    pub graphs_dir: Option<PathBuf>,
    /// Log progress instead of opening the live plot window
    #[arg(long, default_value_t = false)]
    pub headless: bool,
    /// Use a synthetic signal instead of the serial device
    #[arg(long, default_value_t = false)]
    pub simulate: bool,
    /// Play back a capture file (one reading per line) instead of the serial device
    #[arg(long, conflicts_with = "simulate")]
    pub replay: Option<PathBuf>,
}

// 单次试验最长 24 小时
pub const MAX_TRIAL_SECS: f64 = 24.0 * 60.0 * 60.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub trial_duration_secs: f64,
    pub ticks_per_second: u32,
    pub fault_policy: FaultPolicy,
    pub data_file: PathBuf,
    pub graphs_dir: PathBuf,
    pub live_window: bool,
    pub simulate: bool,
    pub replay: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            trial_duration_secs: 45.0,
            ticks_per_second: 10,
            fault_policy: FaultPolicy::default(),
            data_file: PathBuf::from("data.txt"),
            graphs_dir: PathBuf::from("graphs"),
            live_window: true,
            simulate: false,
            replay: None,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading config {}", path_ref.display()))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path_ref.display()))?;
        Ok(config)
    }

    /// File (if any), then flags, then validation.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(port) = &args.port {
            self.serial.port = port.clone();
        }
        if let Some(baud) = args.baud {
            self.serial.baud_rate = baud;
        }
        if let Some(duration) = args.duration {
            self.trial_duration_secs = duration;
        }
        if let Some(rate) = args.ticks_per_second {
            self.ticks_per_second = rate;
        }
        if let Some(path) = &args.data_file {
            self.data_file = path.clone();
        }
        if let Some(dir) = &args.graphs_dir {
            self.graphs_dir = dir.clone();
        }
        if args.headless {
            self.live_window = false;
        }
        if args.simulate {
            self.simulate = true;
        }
        if let Some(path) = &args.replay {
            self.replay = Some(path.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.trial_duration_secs.is_finite() && self.trial_duration_secs > 0.0) {
            bail!("trial duration must be a positive number of seconds");
        }
        if self.trial_duration_secs > MAX_TRIAL_SECS {
            bail!(
                "trial duration {} s exceeds the {} s limit",
                self.trial_duration_secs,
                MAX_TRIAL_SECS
            );
        }
        if self.ticks_per_second == 0 {
            bail!("ticks per second must be greater than zero");
        }
        if self.simulate && self.replay.is_some() {
            bail!("--simulate and --replay are mutually exclusive");
        }
        if self.serial.baud_rate == 0 {
            bail!("baud rate must be greater than zero");
        }
        Ok(())
    }

    pub fn trial_duration(&self) -> Duration {
        Duration::from_secs_f64(self.trial_duration_secs)
    }

    pub fn sampler_config(&self) -> Result<SamplerConfig> {
        SamplerConfig::new(self.ticks_per_second, self.fault_policy)
            .context("building sampler config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sampler::FaultAction;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_the_bench_setup() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.trial_duration(), Duration::from_secs(45));
        assert_eq!(cfg.sampler_config().unwrap().tick_count(cfg.trial_duration()), 450);
        assert!(cfg.live_window);
    }

    #[test]
    fn load_reads_partial_json() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            br#"{"serial": {"port": "/dev/ttyACM0"}, "trial_duration_secs": 5,
                "fault_policy": {"parse": "abort"}}"#,
        )
        .unwrap();
        let cfg = AppConfig::load(temp.path()).unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyACM0");
        assert_eq!(cfg.serial.baud_rate, 9600);
        assert_eq!(cfg.trial_duration_secs, 5.0);
        assert_eq!(cfg.fault_policy.parse, FaultAction::Abort);
        assert_eq!(cfg.fault_policy.timeout, FaultAction::Skip);
    }

    #[test]
    fn flags_override_file_values() {
        let args = Args {
            port: Some("COM7".into()),
            duration: Some(2.5),
            headless: true,
            ..Args::default()
        };
        let cfg = AppConfig::from_args(&args).unwrap();
        assert_eq!(cfg.serial.port, "COM7");
        assert_eq!(cfg.trial_duration_secs, 2.5);
        assert!(!cfg.live_window);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = Args {
            ticks_per_second: Some(0),
            ..Args::default()
        };
        assert!(AppConfig::from_args(&args).is_err());
        let args = Args {
            duration: Some(-1.0),
            ..Args::default()
        };
        assert!(AppConfig::from_args(&args).is_err());
    }

    #[test]
    fn huge_durations_are_rejected() {
        for duration in [1e9, 1e20] {
            let args = Args {
                duration: Some(duration),
                ..Args::default()
            };
            let err = AppConfig::from_args(&args).unwrap_err();
            assert!(err.to_string().contains("limit"), "{err}");
        }
        let args = Args {
            duration: Some(MAX_TRIAL_SECS),
            ..Args::default()
        };
        let cfg = AppConfig::from_args(&args).unwrap();
        assert_eq!(cfg.trial_duration(), Duration::from_secs(86_400));
    }

    #[test]
    fn cli_parses_flags() {
        let args = Args::parse_from(["trialscope", "--simulate", "--baud", "115200"]);
        assert!(args.simulate);
        assert_eq!(args.baud, Some(115200));
    }

    #[test]
    fn replay_excludes_simulation() {
        assert!(Args::try_parse_from(["trialscope", "--simulate", "--replay", "cap.txt"]).is_err());
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(br#"{"simulate": true}"#).unwrap();
        let args = Args {
            config: Some(temp.path().to_path_buf()),
            replay: Some(PathBuf::from("cap.txt")),
            ..Args::default()
        };
        assert!(AppConfig::from_args(&args).is_err());
    }
}
