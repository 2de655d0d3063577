//! Ingest subsystem: drains the tag event queue into the timing service.
//!
//! Each event is applied completely before the next one is taken from the
//! queue. On shutdown the queue is closed and whatever the reader already
//! handed over is still applied before the task returns.

use log::{debug, error, info};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_graceful_shutdown::SubsystemHandle;

use lapgate_core::TagEvent;

use crate::timing::{Outcome, Timing, TimingError};

/// Event counts since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub checkins: u64,
    pub laps: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl IngestStats {
    fn count(&mut self, outcome: &Result<Outcome, TimingError>) {
        match outcome {
            Ok(Outcome::CheckedIn(_)) => self.checkins += 1,
            Ok(Outcome::Lap(_)) => self.laps += 1,
            Ok(Outcome::AlreadyCheckedIn) | Ok(Outcome::Ignored) => self.ignored += 1,
            Ok(Outcome::Dropped(_)) => self.dropped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct Ingest {
    timing: Timing,
    rx: mpsc::Receiver<TagEvent>,
}

impl Ingest {
    pub fn new(timing: Timing, rx: mpsc::Receiver<TagEvent>) -> Self {
        Ingest { timing, rx }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), TimingError> {
        let stats = self.run_until(subsys.on_shutdown_requested()).await;
        info!(
            "Ingest stopped: {} check-ins, {} laps, {} ignored, {} dropped, {} failed",
            stats.checkins, stats.laps, stats.ignored, stats.dropped, stats.failed
        );
        Ok(())
    }

    /// Apply events until `shutdown` completes or every sender is gone.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> IngestStats {
        tokio::pin!(shutdown);
        let mut stats = IngestStats::default();

        loop {
            let event = tokio::select! { biased;
                _ = &mut shutdown => {
                    self.drain(&mut stats).await;
                    break;
                }
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("Event queue closed");
                        break;
                    }
                },
            };
            self.apply(&event, &mut stats);
        }
        stats
    }

    /// Close the queue and apply the events still in it.
    async fn drain(&mut self, stats: &mut IngestStats) {
        self.rx.close();
        let mut drained = 0;
        while let Some(event) = self.rx.recv().await {
            self.apply(&event, stats);
            drained += 1;
        }
        if drained > 0 {
            info!("Applied {} queued events during shutdown", drained);
        }
    }

    fn apply(&self, event: &TagEvent, stats: &mut IngestStats) {
        let outcome = self.timing.handle_event(event);
        if let Err(e) = &outcome {
            // Storage trouble loses this event only; keep serving the rest
            error!("Cannot apply {} from antenna {}: {}", event.rfid_id, event.antenna_id, e);
        }
        stats.count(&outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapgate_core::ReaderConfig;
    use tempfile::TempDir;

    const T0: f64 = 1_700_000_000.0;

    #[tokio::test]
    async fn test_applies_queued_events() {
        let temp = TempDir::new().unwrap();
        let timing = Timing::open(temp.path(), ReaderConfig::default(), 60.0).unwrap();
        timing.start(T0).unwrap();

        let (tx, rx) = mpsc::channel(16);
        for event in [
            TagEvent::new("AA", 1, T0),
            TagEvent::new("AA", 1, T0 + 0.1),
            TagEvent::new("AA", 2, T0 + 5.0),
            TagEvent::new("AA", 2, T0 + 5.1),
            TagEvent::new("AA", 9, T0 + 6.0),
            TagEvent::new("AA", 2, T0 + 65.0),
        ] {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let stats = Ingest::new(timing.clone(), rx)
            .run_until(std::future::pending())
            .await;
        assert_eq!(
            stats,
            IngestStats {
                checkins: 1,
                laps: 2,
                ignored: 2,
                dropped: 1,
                failed: 0,
            }
        );

        let race = timing.race();
        assert_eq!(race.laps.len(), 2);
        assert_eq!(race.laps[1].label, "Lap 1");
        assert_eq!(race.laps[1].name, "Rider 1");
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let timing = Timing::open(temp.path(), ReaderConfig::default(), 60.0).unwrap();
        let (_tx, rx) = mpsc::channel::<TagEvent>(16);

        let stats = Ingest::new(timing, rx).run_until(async {}).await;
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_applies_queued_events() {
        let temp = TempDir::new().unwrap();
        let timing = Timing::open(temp.path(), ReaderConfig::default(), 60.0).unwrap();

        let (tx, rx) = mpsc::channel(16);
        for rfid in ["AA", "BB", "CC"] {
            tx.send(TagEvent::new(rfid, 1, T0)).await.unwrap();
        }

        // Shutdown is already requested and the sender is still alive
        let stats = Ingest::new(timing.clone(), rx).run_until(async {}).await;
        assert_eq!(stats.checkins, 3);
        assert_eq!(timing.profiles().len(), 3);

        // The queue is closed for the reader
        assert!(tx.send(TagEvent::new("DD", 1, T0)).await.is_err());
    }
}
