//! Startup configuration: the antenna config file and the data directory.
//!
//! The config file is plain `KEY=VALUE` text, for example:
//!
//! ```text
//! # Reader on the start/finish gantry
//! READER_IP=192.168.2.154
//! ANTENNA_COUNT=4
//! ANT1_POWER=10
//! ANT1_ROLE=checkin
//! ANT2_POWER=27.5
//! ANT4_ROLE=off
//! ```

use directories::ProjectDirs;
use log::{info, warn};
use miette::Diagnostic;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use lapgate_core::{ConfigError, ReaderConfig};

use crate::Cli;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigFileError {
    #[error("Cannot read config file {path}")]
    #[diagnostic(code(lapgate::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid reader configuration in {path}: {source}")]
    #[diagnostic(
        code(lapgate::config::invalid),
        help("Antenna power must be between 10 and 30 dBm and one antenna must have ANT<n>_ROLE=checkin")
    )]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "lapgate", "lapgate")
}

/// Directory for the profile and race documents
pub fn data_dir(args: &Cli) -> PathBuf {
    if let Some(dir) = &args.data_dir {
        return dir.clone();
    }
    match get_project_dirs() {
        Some(dirs) => dirs.data_dir().to_owned(),
        None => {
            warn!("No home directory found, storing data in the working directory");
            PathBuf::from(".")
        }
    }
}

/// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without
/// `=` are skipped; later keys override earlier ones.
pub fn parse_settings(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Load and validate the reader configuration.
///
/// A missing file means "all defaults". `reader_override` (from the
/// command line) replaces the file's `READER_IP`.
pub fn load_reader_config(
    path: &Path,
    reader_override: Option<&str>,
) -> Result<ReaderConfig, ConfigFileError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(text) => {
            info!("Reading configuration from {}", path.display());
            parse_settings(&text)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No config file at {}, using defaults", path.display());
            BTreeMap::new()
        }
        Err(e) => {
            return Err(ConfigFileError::Read {
                path: path.to_owned(),
                source: e,
            })
        }
    };

    if let Some(address) = reader_override {
        settings.insert("READER_IP".to_string(), address.to_string());
    }

    let config = ReaderConfig::from_settings(&settings).map_err(|e| ConfigFileError::Invalid {
        path: path.to_owned(),
        source: e,
    })?;

    for antenna in &config.antennas {
        info!(
            "Antenna {}: {} at {} dBm (tx power index {})",
            antenna.id,
            antenna.role,
            antenna.power_dbm,
            antenna.tx_power_index()
        );
    }
    Ok(config)
}
