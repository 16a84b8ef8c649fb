//! Pre-recorded sensor logs as an alternate sample source
//!
//! A log is a JSON document (optionally gzipped):
//!
//! ```json
//! { "name": "lobby-to-library", "samples": [ { "type": "beacon", ... }, ... ] }
//! ```
//!
//! Samples are replayed in timestamp order, either as fast as possible
//! ([`LogReplay`]) or paced against the wall clock ([`replay_paced`]).

use crate::error::{NavError, Result};
use crate::localization::beacon::read_json_file;
use crate::types::SensorSample;
use crossbeam::channel::Receiver;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// Anything that yields sensor samples in timestamp order
pub trait SampleSource {
    /// Next sample, or `None` once the source is exhausted
    fn next_sample(&mut self) -> Option<SensorSample>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SampleLog {
    #[serde(default)]
    pub name: String,
    pub samples: Vec<SensorSample>,
}

impl SampleLog {
    /// Samples are stably sorted by timestamp
    pub fn new(name: impl Into<String>, mut samples: Vec<SensorSample>) -> Self {
        samples.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let log: SampleLog = read_json_file(path)?;
        if log.samples.iter().any(|s| !s.timestamp().is_finite()) {
            return Err(NavError::InvalidState(format!(
                "{}: sample with non-finite timestamp",
                path.display()
            )));
        }
        let log = SampleLog::new(log.name, log.samples);
        info!(
            "loaded {} samples ({:.1}s) from {}",
            log.len(),
            log.duration(),
            path.display()
        );
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds between the first and last sample
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0.0,
        }
    }

    pub fn replay(&self) -> LogReplay<'_> {
        LogReplay {
            samples: self.samples.iter(),
        }
    }
}

/// Unpaced iteration over a log
pub struct LogReplay<'a> {
    samples: std::slice::Iter<'a, SensorSample>,
}

impl SampleSource for LogReplay<'_> {
    fn next_sample(&mut self) -> Option<SensorSample> {
        self.samples.next().cloned()
    }
}

/// Live samples pushed by a sensor layer; blocks until a sample or disconnect
pub struct ChannelSource {
    receiver: Receiver<SensorSample>,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<SensorSample>) -> Self {
        Self { receiver }
    }
}

impl SampleSource for ChannelSource {
    fn next_sample(&mut self) -> Option<SensorSample> {
        self.receiver.recv().ok()
    }
}

/// Send the log's samples to `tx`, sleeping between them so that sample time
/// advances `speed` times faster than wall time. Returns the number sent.
pub async fn replay_paced(log: &SampleLog, speed: f64, tx: mpsc::Sender<SensorSample>) -> Result<usize> {
    if speed.is_nan() || speed <= 0.0 {
        return Err(NavError::Config(format!("replay speed must be positive, got {}", speed)));
    }
    let mut previous: Option<f64> = None;
    let mut sent = 0;
    for sample in &log.samples {
        let t = sample.timestamp();
        if let Some(prev) = previous {
            let gap = ((t - prev) / speed).max(0.0);
            if gap > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(gap)).await;
            }
        }
        previous = Some(t);
        if tx.send(sample.clone()).await.is_err() {
            debug!("replay receiver closed after {} samples", sent);
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BeaconScan, InertialReading};

    fn inertial(t: f64) -> SensorSample {
        SensorSample::Inertial(InertialReading {
            timestamp: t,
            acceleration: [0.0; 3],
            heading: 0.0,
            heading_delta: 0.0,
            step: true,
        })
    }

    fn scan(t: f64) -> SensorSample {
        SensorSample::Beacon(BeaconScan {
            timestamp: t,
            readings: Vec::new(),
        })
    }

    #[test]
    fn test_samples_sorted_by_timestamp() {
        let log = SampleLog::new("walk", vec![scan(2.0), inertial(0.5), scan(1.0)]);
        let times: Vec<f64> = log.samples.iter().map(|s| s.timestamp()).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0]);
        assert_eq!(log.duration(), 1.5);

        let mut source = log.replay();
        let mut count = 0;
        while source.next_sample().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_save_and_load_gz() {
        let log = SampleLog::new("walk", vec![inertial(0.0), scan(1.0)]);
        let dir = std::env::temp_dir();
        let plain = dir.join(format!("navcog_log_{}.json", std::process::id()));
        log.save(&plain).unwrap();
        assert_eq!(SampleLog::load(&plain).unwrap().len(), 2);

        let gz = dir.join(format!("navcog_log_{}.json.gz", std::process::id()));
        let file = std::fs::File::create(&gz).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        serde_json::to_writer(&mut encoder, &log).unwrap();
        encoder.finish().unwrap();
        let loaded = SampleLog::load(&gz).unwrap();
        assert_eq!(loaded.name, "walk");
        assert!(loaded.samples[1].is_beacon());
    }

    #[test]
    fn test_channel_source_ends_on_disconnect() {
        let (tx, rx) = crossbeam::channel::unbounded();
        tx.send(scan(0.0)).unwrap();
        drop(tx);
        let mut source = ChannelSource::new(rx);
        assert!(source.next_sample().is_some());
        assert!(source.next_sample().is_none());
    }

    #[tokio::test]
    async fn test_paced_replay_delivers_in_order() {
        let log = SampleLog::new("fast", vec![scan(0.0), inertial(0.01), scan(0.02)]);
        let (tx, mut rx) = mpsc::channel(8);
        let sent = replay_paced(&log, 10.0, tx).await.unwrap();
        assert_eq!(sent, 3);
        let mut last = f64::NEG_INFINITY;
        while let Some(sample) = rx.recv().await {
            assert!(sample.timestamp() >= last);
            last = sample.timestamp();
        }
        assert_eq!(last, 0.02);
    }

    #[tokio::test]
    async fn test_paced_replay_rejects_bad_speed() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(replay_paced(&SampleLog::default(), 0.0, tx).await.is_err());
    }
}
