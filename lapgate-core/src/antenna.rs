//! Antenna roles and transmit power configuration.
//!
//! Which antenna does check-in and which does timing is configuration, not
//! a property of the antenna number. The defaults mirror the usual
//! four-port fixed reader setup: antenna 1 at the sign-in desk on low
//! power, antennas 2-4 over the finish line.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Lowest transmit power the reader accepts (dBm)
pub const MIN_POWER_DBM: f64 = 10.0;
/// Highest transmit power the reader accepts (dBm)
pub const MAX_POWER_DBM: f64 = 30.0;
/// Power table step of the reader (dBm per index)
pub const POWER_STEP_DBM: f64 = 0.25;
/// Number of antenna ports assumed when the config does not say
pub const DEFAULT_ANTENNA_COUNT: u16 = 4;

/// What an antenna is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntennaRole {
    /// First-time registration of riders
    Checkin,
    /// Start/finish line detection
    Timing,
    /// Connected but ignored
    Off,
}

impl FromStr for AntennaRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checkin" | "check-in" => Ok(AntennaRole::Checkin),
            "timing" | "lap" => Ok(AntennaRole::Timing),
            "off" | "disabled" => Ok(AntennaRole::Off),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for AntennaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AntennaRole::Checkin => write!(f, "checkin"),
            AntennaRole::Timing => write!(f, "timing"),
            AntennaRole::Off => write!(f, "off"),
        }
    }
}

/// Configuration for a single antenna port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntennaConfig {
    pub id: u16,
    pub role: AntennaRole,
    pub power_dbm: f64,
}

impl AntennaConfig {
    pub fn new(id: u16, role: AntennaRole, power_dbm: f64) -> Self {
        AntennaConfig {
            id,
            role,
            power_dbm,
        }
    }

    /// Index into the reader's transmit power table.
    ///
    /// Index 0 is full power (30 dBm), each step is 0.25 dBm lower, so
    /// 10 dBm is index 80.
    pub fn tx_power_index(&self) -> u16 {
        ((MAX_POWER_DBM - self.power_dbm) / POWER_STEP_DBM) as u16
    }

    fn default_for(id: u16) -> Self {
        let power_dbm = match id {
            1 => 10.0,
            2 => 20.0,
            _ => 30.0,
        };
        let role = if id == 1 {
            AntennaRole::Checkin
        } else {
            AntennaRole::Timing
        };
        AntennaConfig::new(id, role, power_dbm)
    }
}

/// Validated reader configuration: address plus per-antenna settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderConfig {
    pub address: String,
    pub antennas: Vec<AntennaConfig>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            address: "192.168.2.154".to_string(),
            antennas: (1..=DEFAULT_ANTENNA_COUNT)
                .map(AntennaConfig::default_for)
                .collect(),
        }
    }
}

impl ReaderConfig {
    /// Build and validate a configuration.
    pub fn new(address: impl Into<String>, antennas: Vec<AntennaConfig>) -> Result<Self, ConfigError> {
        let config = ReaderConfig {
            address: address.into(),
            antennas,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `KEY=VALUE` settings.
    ///
    /// Recognised keys: `READER_IP`, `ANTENNA_COUNT`, `ANT<n>_POWER` and
    /// `ANT<n>_ROLE`. Unknown keys are ignored, missing ones take the
    /// defaults.
    pub fn from_settings(settings: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = ReaderConfig::default();
        let address = settings
            .get("READER_IP")
            .cloned()
            .unwrap_or(defaults.address);

        let count = match settings.get("ANTENNA_COUNT") {
            Some(v) => parse_number::<u16>("ANTENNA_COUNT", v)?,
            None => DEFAULT_ANTENNA_COUNT,
        };

        let mut antennas = Vec::with_capacity(count as usize);
        for id in 1..=count {
            let mut antenna = AntennaConfig::default_for(id);
            let power_key = format!("ANT{}_POWER", id);
            if let Some(v) = settings.get(&power_key) {
                antenna.power_dbm = parse_number::<f64>(&power_key, v)?;
            }
            if let Some(v) = settings.get(&format!("ANT{}_ROLE", id)) {
                antenna.role = v.parse()?;
            }
            antennas.push(antenna);
        }

        ReaderConfig::new(address, antennas)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.antennas.is_empty() {
            return Err(ConfigError::NoAntennas);
        }
        let mut seen = HashSet::new();
        for antenna in &self.antennas {
            if antenna.id == 0 {
                return Err(ConfigError::ZeroAntennaId);
            }
            if !seen.insert(antenna.id) {
                return Err(ConfigError::DuplicateAntenna(antenna.id));
            }
            // NaN fails both comparisons, so test for "inside" and negate
            if !(antenna.power_dbm >= MIN_POWER_DBM && antenna.power_dbm <= MAX_POWER_DBM) {
                return Err(ConfigError::PowerOutOfRange {
                    antenna: antenna.id,
                    dbm: antenna.power_dbm,
                    min: MIN_POWER_DBM,
                    max: MAX_POWER_DBM,
                });
            }
        }
        if !self
            .antennas
            .iter()
            .any(|a| a.role == AntennaRole::Checkin)
        {
            return Err(ConfigError::NoCheckinAntenna);
        }
        Ok(())
    }

    /// Role of the given antenna; antennas that are not configured are `Off`.
    pub fn role_of(&self, antenna_id: u16) -> AntennaRole {
        self.antennas
            .iter()
            .find(|a| a.id == antenna_id)
            .map(|a| a.role)
            .unwrap_or(AntennaRole::Off)
    }

    /// Antenna ids to enable on the reader (everything not switched off)
    pub fn active_antennas(&self) -> Vec<u16> {
        self.antennas
            .iter()
            .filter(|a| a.role != AntennaRole::Off)
            .map(|a| a.id)
            .collect()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::from_settings(&BTreeMap::new()).unwrap();
        assert_eq!(config.address, "192.168.2.154");
        assert_eq!(config.antennas.len(), 4);
        assert_eq!(config.role_of(1), AntennaRole::Checkin);
        assert_eq!(config.role_of(2), AntennaRole::Timing);
        assert_eq!(config.role_of(4), AntennaRole::Timing);
        assert_eq!(config.role_of(5), AntennaRole::Off);
        assert_eq!(config.antennas[0].power_dbm, 10.0);
        assert_eq!(config.antennas[1].power_dbm, 20.0);
        assert_eq!(config.antennas[3].power_dbm, 30.0);
    }

    #[test]
    fn test_tx_power_index() {
        assert_eq!(AntennaConfig::new(1, AntennaRole::Checkin, 30.0).tx_power_index(), 0);
        assert_eq!(AntennaConfig::new(1, AntennaRole::Checkin, 20.0).tx_power_index(), 40);
        assert_eq!(AntennaConfig::new(1, AntennaRole::Checkin, 10.0).tx_power_index(), 80);
        assert_eq!(AntennaConfig::new(1, AntennaRole::Checkin, 27.5).tx_power_index(), 10);
    }

    #[test]
    fn test_power_range_is_inclusive() {
        let config = ReaderConfig::from_settings(&settings(&[
            ("ANT1_POWER", "10"),
            ("ANT2_POWER", "30"),
        ]));
        assert!(config.is_ok());

        let err = ReaderConfig::from_settings(&settings(&[("ANT3_POWER", "31")])).unwrap_err();
        assert!(matches!(err, ConfigError::PowerOutOfRange { antenna: 3, .. }));

        let err = ReaderConfig::from_settings(&settings(&[("ANT1_POWER", "9.75")])).unwrap_err();
        assert!(matches!(err, ConfigError::PowerOutOfRange { antenna: 1, .. }));
    }

    #[test]
    fn test_roles_and_count() {
        let config = ReaderConfig::from_settings(&settings(&[
            ("READER_IP", "10.0.0.7"),
            ("ANTENNA_COUNT", "2"),
            ("ANT1_ROLE", "timing"),
            ("ANT2_ROLE", "checkin"),
        ]))
        .unwrap();
        assert_eq!(config.address, "10.0.0.7");
        assert_eq!(config.antennas.len(), 2);
        assert_eq!(config.role_of(1), AntennaRole::Timing);
        assert_eq!(config.role_of(2), AntennaRole::Checkin);
        assert_eq!(config.role_of(3), AntennaRole::Off);
    }

    #[test]
    fn test_invalid_settings() {
        assert_eq!(
            ReaderConfig::from_settings(&settings(&[("ANT1_ROLE", "finish")])),
            Err(ConfigError::UnknownRole("finish".to_string()))
        );
        assert!(matches!(
            ReaderConfig::from_settings(&settings(&[("ANT2_POWER", "loud")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert_eq!(
            ReaderConfig::from_settings(&settings(&[("ANTENNA_COUNT", "0")])),
            Err(ConfigError::NoAntennas)
        );
        assert_eq!(
            ReaderConfig::from_settings(&settings(&[("ANT1_ROLE", "off")])),
            Err(ConfigError::NoCheckinAntenna)
        );
    }

    #[test]
    fn test_duplicate_and_zero_ids() {
        let dup = vec![
            AntennaConfig::new(1, AntennaRole::Checkin, 10.0),
            AntennaConfig::new(1, AntennaRole::Timing, 20.0),
        ];
        assert_eq!(
            ReaderConfig::new("reader", dup),
            Err(ConfigError::DuplicateAntenna(1))
        );

        let zero = vec![AntennaConfig::new(0, AntennaRole::Checkin, 10.0)];
        assert_eq!(ReaderConfig::new("reader", zero), Err(ConfigError::ZeroAntennaId));
    }

    #[test]
    fn test_active_antennas_skip_off() {
        let config = ReaderConfig::from_settings(&settings(&[("ANT3_ROLE", "off")])).unwrap();
        assert_eq!(config.active_antennas(), vec![1, 2, 4]);
    }
}
