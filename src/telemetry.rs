//! Diagnostic telemetry sink
//!
//! Producers push records with [`TelemetrySink::record`], which never blocks:
//! records go into a bounded channel and are dropped (and counted) when it is
//! full. A single blocking worker drains the channel and writes one JSON
//! object per line.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::sim::{BallId, BallSnapshot, WallSide};
use crate::unix_millis;

/// Record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Movement,
    BallCollision,
    WallCollision,
}

/// Mirrored state of the second ball in a collision record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyRecord {
    pub entity_id: BallId,
    pub pos_x: f64,
    pub pos_y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub mass: f64,
}

impl From<&BallSnapshot> for BodyRecord {
    fn from(s: &BallSnapshot) -> Self {
        Self {
            entity_id: s.id,
            pos_x: s.pos.x,
            pos_y: s.pos.y,
            vel_x: s.vel.x,
            vel_y: s.vel.y,
            mass: s.mass,
        }
    }
}

/// One line of telemetry output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub entity_id: BallId,
    pub pos_x: f64,
    pub pos_y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub mass: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<WallSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<BodyRecord>,
}

impl TelemetryRecord {
    fn base(kind: RecordKind, s: &BallSnapshot) -> Self {
        Self {
            timestamp: unix_millis(),
            kind,
            entity_id: s.id,
            pos_x: s.pos.x,
            pos_y: s.pos.y,
            vel_x: s.vel.x,
            vel_y: s.vel.y,
            mass: s.mass,
            dt: None,
            side: None,
            other: None,
        }
    }

    pub fn movement(ball: &BallSnapshot, dt: Option<f64>) -> Self {
        Self {
            dt,
            ..Self::base(RecordKind::Movement, ball)
        }
    }

    pub fn ball_collision(ball: &BallSnapshot, other: &BallSnapshot) -> Self {
        Self {
            other: Some(BodyRecord::from(other)),
            ..Self::base(RecordKind::BallCollision, ball)
        }
    }

    pub fn wall_collision(ball: &BallSnapshot, side: WallSide) -> Self {
        Self {
            side: Some(side),
            ..Self::base(RecordKind::WallCollision, ball)
        }
    }
}

/// Bounded, non-blocking telemetry sink with one background writer
#[derive(Debug)]
pub struct TelemetrySink {
    sender: RwLock<Option<mpsc::Sender<TelemetryRecord>>>,
    consumer: Mutex<Option<JoinHandle<Result<u64>>>>,
    capacity: usize,
    drain_timeout: Duration,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl TelemetrySink {
    /// Start a sink writing to `writer`. Must be called inside a tokio runtime.
    pub fn spawn<W>(writer: W, capacity: usize, drain_timeout: Duration) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "telemetry capacity must be > 0".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidArgument("telemetry sink must be created inside a tokio runtime".to_string())
        })?;
        let (tx, rx) = mpsc::channel(capacity);
        let consumer = runtime.spawn_blocking(move || drain(rx, writer));

        Ok(Self {
            sender: RwLock::new(Some(tx)),
            consumer: Mutex::new(Some(consumer)),
            capacity,
            drain_timeout,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Start a sink writing to a fresh file at `path` (truncated if present)
    pub fn create(path: impl AsRef<Path>, capacity: usize, drain_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        log::info!("Telemetry writing to {}", path.display());
        Self::spawn(BufWriter::new(file), capacity, drain_timeout)
    }

    /// Start a sink that consumes records without keeping them
    pub fn discard(capacity: usize) -> Result<Self> {
        Self::spawn(std::io::sink(), capacity, crate::consts::TELEMETRY_DRAIN_TIMEOUT)
    }

    /// Queue a record without blocking. Returns `false` if it was dropped
    /// because the buffer is full or the sink is shut down.
    pub fn record(&self, record: TelemetryRecord) -> bool {
        let guard = self.sender.read().unwrap_or_else(|p| p.into_inner());
        let sent = match guard.as_ref() {
            Some(tx) => match tx.try_send(record) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
            },
            None => false,
        };
        if sent {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Records refused so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records queued so far
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently buffered (0 once shut down)
    pub fn pending(&self) -> usize {
        let guard = self.sender.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_none()
    }

    /// Stop accepting records, let the writer drain the buffer, flush and
    /// close. Waits at most the configured drain timeout; a writer that is
    /// still busy after that is logged and left to finish on its own.
    pub async fn shutdown(&self) -> Result<()> {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if sender.is_none() {
            return Err(Error::Disposed("telemetry sink"));
        }
        // Dropping the last sender lets the writer finish once it is empty.
        drop(sender);

        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(consumer) = consumer else {
            return Ok(());
        };

        match tokio::time::timeout(self.drain_timeout, consumer).await {
            Ok(Ok(Ok(written))) => {
                log::info!(
                    "Telemetry closed: {} written, {} dropped",
                    written,
                    self.dropped()
                );
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                log::error!("Telemetry writer failed: {e}");
                Err(e)
            }
            Ok(Err(join_err)) => {
                log::error!("Telemetry writer panicked: {join_err}");
                Ok(())
            }
            Err(_) => {
                log::error!(
                    "Telemetry writer did not drain within {:?}",
                    self.drain_timeout
                );
                Ok(())
            }
        }
    }
}

/// Writer loop. Runs until every sender is gone and the buffer is empty.
fn drain<W: Write>(mut rx: mpsc::Receiver<TelemetryRecord>, mut writer: W) -> Result<u64> {
    let mut written = 0u64;
    while let Some(record) = rx.blocking_recv() {
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;
    use std::sync::Arc;

    /// Cloneable in-memory writer
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    /// Writer that stalls on its first write until the test opens the gate
    struct Stalled {
        gate: Arc<std::sync::Barrier>,
        opened: bool,
    }

    impl Write for Stalled {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.opened {
                self.opened = true;
                self.gate.wait();
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn snap(id: u32) -> BallSnapshot {
        BallSnapshot {
            id: BallId(id),
            pos: DVec2::new(1.5, 2.5),
            vel: DVec2::new(-3.0, 4.0),
            mass: 4.5,
            radius: 16.0,
        }
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(TelemetryRecord::movement(&snap(3), Some(0.01))).unwrap();
        assert_eq!(json["type"], "movement");
        assert_eq!(json["entityId"], 3);
        assert_eq!(json["posX"], 1.5);
        assert_eq!(json["velY"], 4.0);
        assert_eq!(json["mass"], 4.5);
        assert_eq!(json["dt"], 0.01);
        assert!(json.get("other").is_none());
        assert!(json.get("side").is_none());
        assert!(json["timestamp"].as_u64().unwrap() > 0);

        let json = serde_json::to_value(TelemetryRecord::ball_collision(&snap(1), &snap(2))).unwrap();
        assert_eq!(json["type"], "ball_collision");
        assert_eq!(json["other"]["entityId"], 2);
        assert_eq!(json["other"]["velX"], -3.0);

        let json =
            serde_json::to_value(TelemetryRecord::wall_collision(&snap(1), WallSide::Bottom)).unwrap();
        assert_eq!(json["type"], "wall_collision");
        assert_eq!(json["side"], "bottom");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_are_written_as_lines() {
        let buf = SharedBuf::default();
        let sink = TelemetrySink::spawn(buf.clone(), 16, Duration::from_secs(2)).unwrap();

        assert!(sink.record(TelemetryRecord::movement(&snap(1), None)));
        assert!(sink.record(TelemetryRecord::wall_collision(&snap(1), WallSide::Left)));
        sink.shutdown().await.unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "movement");
        assert_eq!(lines[1]["side"], "left");
        assert_eq!(sink.accepted(), 2);
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_overflow_drops_without_blocking() {
        // The worker holds at most one record while stalled; nothing drains.
        let gate = Arc::new(std::sync::Barrier::new(2));
        let stalled = Stalled {
            gate: gate.clone(),
            opened: false,
        };
        let sink = TelemetrySink::spawn(stalled, 4, Duration::from_secs(2)).unwrap();

        let mut refused = 0;
        for i in 0..50 {
            if !sink.record(TelemetryRecord::movement(&snap(i), None)) {
                refused += 1;
            }
            assert!(sink.pending() <= sink.capacity());
        }
        // At most one record in the worker's hands plus a full buffer.
        assert!(sink.accepted() <= 5);
        assert_eq!(sink.accepted() + sink.dropped(), 50);
        assert_eq!(sink.dropped(), refused);

        gate.wait();
        sink.shutdown().await.unwrap();
    }

    #[test]
    fn test_spawn_outside_runtime_is_an_error() {
        assert!(matches!(TelemetrySink::discard(8), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            TelemetrySink::spawn(SharedBuf::default(), 8, Duration::from_secs(1)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_twice_is_an_error() {
        let sink = TelemetrySink::discard(8).unwrap();
        sink.shutdown().await.unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.shutdown().await, Err(Error::Disposed(_))));
        // Records after shutdown are dropped, not errors.
        assert!(!sink.record(TelemetryRecord::movement(&snap(1), None)));
        assert_eq!(sink.dropped(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_truncates_file() {
        let dir = std::env::temp_dir().join(format!("ball-arena-telemetry-{}", std::process::id()));
        let path = dir.join("nested").join("diag.jsonl");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale\n").unwrap();

        let sink = TelemetrySink::create(&path, 8, Duration::from_secs(2)).unwrap();
        sink.record(TelemetryRecord::movement(&snap(9), Some(0.02)));
        sink.shutdown().await.unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: TelemetryRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.entity_id, BallId(9));
        assert_eq!(parsed.dt, Some(0.02));
        let _ = fs::remove_dir_all(&dir);
    }
}
