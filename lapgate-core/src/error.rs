//! Error types for tag parsing and reader configuration

use thiserror::Error;

/// Errors that can occur when turning a raw tag report into an identifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    /// Report carried no EPC data at all
    #[error("Empty tag identifier")]
    Empty,

    /// Text EPC contained something other than hex digits
    #[error("Invalid character {found:?} in tag identifier '{epc}'")]
    InvalidCharacter { epc: String, found: char },

    /// Text EPC with an odd number of hex digits cannot be a byte string
    #[error("Tag identifier '{0}' has an odd number of hex digits")]
    OddLength(String),
}

/// Errors in the antenna configuration handed to the reader at startup.
///
/// All of these are fatal: the process must not start ingesting with a
/// configuration the reader would reject or misinterpret.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Transmit power outside the range the reader supports
    #[error("ANT{antenna}_POWER must be between {min} and {max} dBm, got {dbm}")]
    PowerOutOfRange {
        antenna: u16,
        dbm: f64,
        min: f64,
        max: f64,
    },

    /// Antenna ids start at 1
    #[error("Antenna id 0 is not valid, antennas are numbered from 1")]
    ZeroAntennaId,

    /// The same antenna was configured twice
    #[error("Antenna {0} is configured more than once")]
    DuplicateAntenna(u16),

    /// Reader with no antennas
    #[error("At least one antenna must be configured")]
    NoAntennas,

    /// Without a check-in antenna no rider can ever be registered
    #[error("No antenna has the check-in role")]
    NoCheckinAntenna,

    /// Role name not understood
    #[error("Unknown antenna role '{0}', expected checkin, timing or off")]
    UnknownRole(String),

    /// Value could not be parsed as a number
    #[error("Invalid value for {key}: '{value}'")]
    InvalidNumber { key: String, value: String },
}
