//! Tag detection events.
//!
//! Readers deliver EPC data either as raw bytes or as text, depending on
//! the report field it was found in. Both are normalised to an uppercase
//! hex string, which is the identity used everywhere else.

use serde::{Deserialize, Serialize};

use crate::error::TagError;

/// Antenna used when a report does not say which antenna saw the tag
pub const DEFAULT_ANTENNA: u16 = 1;

/// EPC payload as found in a reader report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Epc {
    Bytes(Vec<u8>),
    Text(String),
}

impl Epc {
    /// Normalise to an uppercase hex identifier.
    pub fn to_rfid_id(&self) -> Result<String, TagError> {
        match self {
            Epc::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(TagError::Empty);
                }
                Ok(bytes.iter().map(|b| format!("{:02X}", b)).collect())
            }
            Epc::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(TagError::Empty);
                }
                if let Some(found) = text.chars().find(|c| !c.is_ascii_hexdigit()) {
                    return Err(TagError::InvalidCharacter {
                        epc: text.to_string(),
                        found,
                    });
                }
                if text.len() % 2 != 0 {
                    return Err(TagError::OddLength(text.to_string()));
                }
                Ok(text.to_ascii_uppercase())
            }
        }
    }
}

/// One tag seen by one antenna, as reported by the reader
#[derive(Debug, Clone, PartialEq)]
pub struct TagReport {
    pub epc: Epc,
    pub antenna_id: Option<u16>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// A validated tag-detection event, ready for routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    pub rfid_id: String,
    pub antenna_id: u16,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl TagEvent {
    pub fn new(rfid_id: impl Into<String>, antenna_id: u16, timestamp: f64) -> Self {
        TagEvent {
            rfid_id: rfid_id.into(),
            antenna_id,
            timestamp,
        }
    }
}

impl TryFrom<TagReport> for TagEvent {
    type Error = TagError;

    fn try_from(report: TagReport) -> Result<Self, Self::Error> {
        Ok(TagEvent {
            rfid_id: report.epc.to_rfid_id()?,
            antenna_id: report.antenna_id.unwrap_or(DEFAULT_ANTENNA),
            timestamp: report.timestamp,
        })
    }
}
