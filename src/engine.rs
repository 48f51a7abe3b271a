//! Engine control surface
//!
//! `start` places balls, hands each one to the caller, then starts its motion
//! driver. `dispose` cancels and joins every driver, empties the registry and
//! shuts the telemetry sink down. Both fail with [`Error::Disposed`] once the
//! engine has been disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::consts::POSITION_BROADCAST_CAPACITY;
use crate::driver::{DriverContext, MotionDriver};
use crate::error::{Error, Result};
use crate::radius_for_table;
use crate::settings::EngineOptions;
use crate::sim::{Arena, Ball, BallId, BallSnapshot, SharedRegistry, StepOptions};
use crate::telemetry::TelemetrySink;

/// Position change of one ball, as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: BallId,
    pub x: f64,
    pub y: f64,
}

/// Read-only view of a ball handed to the presentation layer
#[derive(Debug, Clone)]
pub struct BallHandle {
    id: BallId,
    radius: f64,
    mass: f64,
    position: watch::Receiver<DVec2>,
}

impl BallHandle {
    pub fn id(&self) -> BallId {
        self.id
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Latest published position
    pub fn position(&self) -> DVec2 {
        *self.position.borrow()
    }

    /// Receiver notified on every step of this ball
    pub fn subscribe(&self) -> watch::Receiver<DVec2> {
        self.position.clone()
    }
}

/// Concurrent ball engine
#[derive(Debug)]
pub struct Engine {
    registry: SharedRegistry,
    telemetry: Arc<TelemetrySink>,
    options: EngineOptions,
    drivers: Mutex<Vec<MotionDriver>>,
    cancel: watch::Sender<bool>,
    positions: broadcast::Sender<PositionUpdate>,
    rng: Mutex<Pcg32>,
    disposed: AtomicBool,
}

impl Engine {
    /// Create an idle engine that reports to `telemetry`
    pub fn new(options: EngineOptions, telemetry: Arc<TelemetrySink>) -> Result<Self> {
        options.validate()?;
        let seed = options.seed.unwrap_or_else(rand::random);
        log::info!("Engine seed: {seed}");

        let (cancel, _) = watch::channel(false);
        let (positions, _) = broadcast::channel(POSITION_BROADCAST_CAPACITY);
        Ok(Self {
            registry: SharedRegistry::new(),
            telemetry,
            options,
            drivers: Mutex::new(Vec::new()),
            cancel,
            positions,
            rng: Mutex::new(Pcg32::seed_from_u64(seed)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Create `count` balls at random non-overlapping positions with random
    /// velocities, call `on_created` once per ball, then start every ball's
    /// motion driver. Must be called from inside a tokio runtime.
    ///
    /// `on_created` runs while the engine's driver list is locked; calling
    /// back into `start` or `dispose` from it deadlocks.
    pub fn start<F>(&self, count: usize, table_width: f64, table_height: f64, mut on_created: F) -> Result<()>
    where
        F: FnMut(DVec2, BallHandle),
    {
        if self.is_disposed() {
            return Err(Error::Disposed("engine"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::InvalidArgument("engine must be started inside a tokio runtime".to_string())
        })?;
        let arena = Arena::new(table_width, table_height)?;
        let radius = radius_for_table(table_height);
        if !arena.fits(radius) {
            return Err(Error::InvalidArgument(format!(
                "table {table_width}x{table_height} is too small for balls of radius {radius}"
            )));
        }
        let room = arena.max_balls(radius);
        if count > room {
            return Err(Error::InvalidArgument(format!(
                "{count} balls of radius {radius} cannot fit on a {table_width}x{table_height} table (at most {room})"
            )));
        }

        let mut drivers = self.drivers.lock().unwrap_or_else(|p| p.into_inner());
        // Re-check under the lock so a racing dispose cannot miss new drivers.
        if self.is_disposed() {
            return Err(Error::Disposed("engine"));
        }

        let balls = self.place(count, arena, radius)?;
        log::info!(
            "Starting {} balls on a {}x{} table (radius {:.2})",
            balls.len(),
            table_width,
            table_height,
            radius
        );

        let context = DriverContext {
            registry: self.registry.clone(),
            telemetry: Arc::clone(&self.telemetry),
            positions: self.positions.clone(),
            pacing: self.options.pacing,
            step_options: StepOptions {
                overlap_correction: self.options.overlap_correction,
            },
        };

        let mut ready = Vec::with_capacity(balls.len());
        for ball in &balls {
            let (position_tx, position_rx) = watch::channel(ball.pos);
            let handle = BallHandle {
                id: ball.id(),
                radius: ball.radius(),
                mass: ball.mass(),
                position: position_rx,
            };
            log::debug!(
                "Ball {} at ({:.1}, {:.1}) mass {:.2}",
                ball.id(),
                ball.pos.x,
                ball.pos.y,
                ball.mass()
            );
            on_created(ball.pos, handle);
            ready.push((ball.id(), ball.vel.length(), position_tx));
        }

        for (id, speed, position_tx) in ready {
            drivers.push(MotionDriver::spawn(
                &runtime,
                id,
                speed,
                context.clone(),
                position_tx,
                self.cancel.subscribe(),
            ));
        }
        Ok(())
    }

    /// Pick positions, velocities and masses and register the new balls.
    /// Either every ball is registered or none is.
    fn place(&self, count: usize, arena: Arena, radius: f64) -> Result<Vec<Ball>> {
        let mut registry = self.registry.lock();
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let speed = self.options.max_initial_speed;
        let (mass_min, mass_max) = (self.options.mass_min, self.options.mass_max);

        let mut pending: Vec<Ball> = Vec::new();
        for _ in 0..count {
            let pos = registry.find_free_position(&arena, radius, &pending, &mut *rng)?;
            let vel = DVec2::new(
                rng.random_range(-speed..=speed),
                rng.random_range(-speed..=speed),
            );
            let mass = if mass_max > mass_min {
                rng.random_range(mass_min..mass_max)
            } else {
                mass_min
            };
            let id = registry.next_ball_id();
            pending.push(Ball::new(id, pos, vel, mass, radius, arena)?);
        }

        for ball in &pending {
            registry.insert(ball.clone());
        }
        Ok(pending)
    }

    /// Stop every driver (bounded wait), clear the registry and shut the
    /// telemetry sink down. A second call fails with [`Error::Disposed`].
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(Error::Disposed("engine"));
        }
        self.cancel.send_replace(true);

        let drivers = std::mem::take(&mut *self.drivers.lock().unwrap_or_else(|p| p.into_inner()));
        let total = drivers.len();
        let deadline = Instant::now() + self.options.driver_join_timeout();
        let mut aborted = 0usize;
        for driver in drivers {
            let id = driver.id();
            let mut handle = driver.into_handle();
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Motion driver for ball {id} failed: {e}"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                    log::error!("Motion driver for ball {id} did not stop in time; aborted");
                }
            }
        }

        let removed = self.registry.with(|registry| registry.clear());
        log::info!("Engine disposed: {total} drivers joined ({aborted} aborted), {removed} balls removed");

        match self.telemetry.shutdown().await {
            Err(Error::Disposed(_)) => {
                log::warn!("Telemetry sink was already shut down");
                Ok(())
            }
            other => other,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Receiver for every position change of every ball
    pub fn subscribe(&self) -> broadcast::Receiver<PositionUpdate> {
        self.positions.subscribe()
    }

    pub fn ball_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Consistent copy of every live ball
    pub fn snapshots(&self) -> Vec<BallSnapshot> {
        self.registry.lock().snapshots()
    }

    /// Total momentum of all live balls, read under the registry lock
    pub fn total_momentum(&self) -> DVec2 {
        self.registry.lock().total_momentum()
    }

    pub fn telemetry(&self) -> &Arc<TelemetrySink> {
        &self.telemetry
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.is_disposed() {
            self.cancel.send_replace(true);
        }
    }
}
