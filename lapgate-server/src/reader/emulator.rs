//! Built-in tag emulator.
//!
//! Simulates a field of riders for running the server without hardware.
//! Every rider first shows a tag at the check-in antenna and then passes the
//! timing antenna once per lap. Each pass is reported as a short burst of
//! reads, as a real reader does while a tag is inside its field.

use async_trait::async_trait;
use log::{info, warn};
use std::time::Duration;
use tokio::time::sleep;

use lapgate_core::{AntennaRole, Epc, ReaderConfig, TagReport};

use super::{ReaderError, TagReader};
use crate::timing::unix_now;

/// Reads reported for one pass through an antenna field
const READS_PER_PASS: usize = 3;
/// Spacing of the reads within one pass
const READ_SPACING_SECS: f64 = 0.05;

/// Shape of the emulated race
#[derive(Debug, Clone)]
pub struct EmulatorSchedule {
    pub riders: u32,
    /// Lap time of the fastest rider
    pub lap_secs: f64,
    /// Delay between riders at check-in; also added to each slower
    /// rider's lap time
    pub gap_secs: f64,
    /// Poll interval
    pub tick: Duration,
}

impl Default for EmulatorSchedule {
    fn default() -> Self {
        EmulatorSchedule {
            riders: 8,
            lap_secs: 75.0,
            gap_secs: 2.0,
            tick: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
struct Rider {
    epc: Vec<u8>,
    checkin_at: f64,
    checked_in: bool,
    lap_secs: f64,
    next_pass: f64,
}

pub struct EmulatorReader {
    schedule: EmulatorSchedule,
    riders: Vec<Rider>,
    checkin_antenna: Option<u16>,
    timing_antenna: Option<u16>,
}

impl EmulatorReader {
    pub fn new(schedule: EmulatorSchedule) -> Self {
        EmulatorReader {
            schedule,
            riders: Vec::new(),
            checkin_antenna: None,
            timing_antenna: None,
        }
    }

    fn first_with_role(config: &ReaderConfig, role: AntennaRole) -> Option<u16> {
        config.antennas.iter().find(|a| a.role == role).map(|a| a.id)
    }

    fn burst(epc: &[u8], antenna_id: u16, now: f64) -> impl Iterator<Item = TagReport> + '_ {
        (0..READS_PER_PASS).map(move |i| TagReport {
            epc: Epc::Bytes(epc.to_vec()),
            antenna_id: Some(antenna_id),
            timestamp: now + i as f64 * READ_SPACING_SECS,
        })
    }

    /// Reports due at `now`, advancing each rider's schedule.
    fn due_reports(&mut self, now: f64) -> Vec<TagReport> {
        let mut reports = Vec::new();
        for rider in &mut self.riders {
            if !rider.checked_in {
                if now < rider.checkin_at {
                    continue;
                }
                rider.checked_in = true;
                if let Some(antenna) = self.checkin_antenna {
                    reports.extend(Self::burst(&rider.epc, antenna, now));
                }
            }
            if let Some(antenna) = self.timing_antenna {
                if now >= rider.next_pass {
                    reports.extend(Self::burst(&rider.epc, antenna, now));
                    rider.next_pass += rider.lap_secs;
                }
            }
        }
        reports
    }
}

#[async_trait]
impl TagReader for EmulatorReader {
    fn name(&self) -> String {
        "Emulator".to_string()
    }

    async fn connect(&mut self, config: &ReaderConfig) -> Result<(), ReaderError> {
        self.checkin_antenna = Self::first_with_role(config, AntennaRole::Checkin);
        self.timing_antenna = Self::first_with_role(config, AntennaRole::Timing);
        if self.timing_antenna.is_none() {
            warn!("Emulator: no timing antenna configured, riders will only check in");
        }

        let schedule = &self.schedule;
        let start = unix_now();
        self.riders = (0..schedule.riders)
            .map(|i| {
                let mut epc = vec![0xE2, 0x80, 0x11, 0x60, 0x60, 0x00, 0x02, 0x00, 0x00, 0x00];
                epc.extend_from_slice(&(i as u16 + 1).to_be_bytes());
                let checkin_at = start + i as f64 * schedule.gap_secs;
                let lap_secs = schedule.lap_secs + i as f64 * schedule.gap_secs;
                Rider {
                    epc,
                    checkin_at,
                    checked_in: false,
                    lap_secs,
                    // First pass: riders roll out to the line after checking in
                    next_pass: checkin_at + schedule.gap_secs * schedule.riders as f64,
                }
            })
            .collect();

        info!(
            "Emulator: {} riders, base lap {:.1}s",
            schedule.riders, schedule.lap_secs
        );
        Ok(())
    }

    async fn next_reports(&mut self) -> Result<Vec<TagReport>, ReaderError> {
        sleep(self.schedule.tick).await;
        Ok(self.due_reports(unix_now()))
    }

    async fn disconnect(&mut self) {
        self.riders.clear();
    }
}
