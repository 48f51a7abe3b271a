//! Motion driver: one task per ball
//!
//! Each driver sleeps for its pacing interval, then runs one step under the
//! registry lock and publishes the result after releasing it. Cancellation is
//! checked between steps only, so a step is never cut in half.

use std::sync::Arc;

use glam::DVec2;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::consts::MAX_STEP_DT;
use crate::engine::PositionUpdate;
use crate::settings::TickPacing;
use crate::sim::{BallId, SharedRegistry, StepOptions, StepOutcome, tick};
use crate::telemetry::{TelemetryRecord, TelemetrySink};

/// Services shared by every driver of one engine
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub registry: SharedRegistry,
    pub telemetry: Arc<TelemetrySink>,
    pub positions: broadcast::Sender<PositionUpdate>,
    pub pacing: TickPacing,
    pub step_options: StepOptions,
}

impl DriverContext {
    /// Forward a finished step upward and to telemetry. Never blocks.
    fn publish(&self, outcome: &StepOutcome, position: &watch::Sender<DVec2>) {
        let ball = &outcome.ball;
        position.send_replace(ball.pos);
        // No subscribers is fine.
        let _ = self.positions.send(PositionUpdate {
            id: ball.id,
            x: ball.pos.x,
            y: ball.pos.y,
        });

        self.telemetry
            .record(TelemetryRecord::movement(ball, Some(outcome.dt)));
        for hit in &outcome.collisions {
            self.telemetry
                .record(TelemetryRecord::ball_collision(&hit.mover, &hit.other));
        }
        for hit in &outcome.wall_hits {
            self.telemetry
                .record(TelemetryRecord::wall_collision(&hit.ball, hit.side));
        }
    }
}

/// Handle to a running driver task
#[derive(Debug)]
pub struct MotionDriver {
    id: BallId,
    handle: JoinHandle<()>,
}

impl MotionDriver {
    /// Spawn the driver for ball `id` on `runtime`
    pub fn spawn(
        runtime: &tokio::runtime::Handle,
        id: BallId,
        initial_speed: f64,
        context: DriverContext,
        position: watch::Sender<DVec2>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let handle = runtime.spawn(run(id, initial_speed, context, position, cancel));
        Self { id, handle }
    }

    pub fn id(&self) -> BallId {
        self.id
    }

    pub fn into_handle(self) -> JoinHandle<()> {
        self.handle
    }
}

async fn run(
    id: BallId,
    initial_speed: f64,
    context: DriverContext,
    position: watch::Sender<DVec2>,
    mut cancel: watch::Receiver<bool>,
) {
    log::debug!("Motion driver for ball {id} started");
    let mut speed = initial_speed;
    let mut last = Instant::now();

    loop {
        if *cancel.borrow() {
            break;
        }

        let pause = context.pacing.interval(speed);
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                // A dropped sender means the engine is gone.
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep(pause) => {}
        }

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64().min(MAX_STEP_DT);
        last = now;

        let outcome = context
            .registry
            .with(|registry| tick::step(registry, id, dt, context.step_options));
        let Some(outcome) = outcome else {
            log::debug!("Ball {id} left the registry; driver exiting");
            break;
        };

        speed = outcome.ball.vel.length();
        context.publish(&outcome, &position);
    }

    log::debug!("Motion driver for ball {id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Arena, Ball};
    use std::time::Duration;

    fn context(registry: SharedRegistry) -> DriverContext {
        let (positions, _) = broadcast::channel(16);
        DriverContext {
            registry,
            telemetry: Arc::new(TelemetrySink::discard(64).unwrap()),
            positions,
            pacing: TickPacing::fixed(),
            step_options: StepOptions::default(),
        }
    }

    fn add_ball(registry: &SharedRegistry, pos: DVec2, vel: DVec2) -> BallId {
        registry.with(|reg| {
            let id = reg.next_ball_id();
            let arena = Arena::new(400.0, 400.0).unwrap();
            reg.insert(Ball::new(id, pos, vel, 4.0, 16.0, arena).unwrap());
            id
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_moves_ball_and_publishes() {
        let registry = SharedRegistry::new();
        let start = DVec2::new(100.0, 200.0);
        let id = add_ball(&registry, start, DVec2::new(50.0, 0.0));
        let (pos_tx, mut pos_rx) = watch::channel(start);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = MotionDriver::spawn(
            &tokio::runtime::Handle::current(),
            id,
            50.0,
            context(registry.clone()),
            pos_tx,
            cancel_rx,
        );

        tokio::time::timeout(Duration::from_secs(2), pos_rx.changed())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let moved = registry.lock().get(id).unwrap().pos;
        assert!(moved.x > start.x);
        assert_eq!(moved.y, start.y);

        cancel_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), driver.into_handle())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_exits_when_ball_is_removed() {
        let registry = SharedRegistry::new();
        let id = add_ball(&registry, DVec2::new(100.0, 100.0), DVec2::new(10.0, 10.0));
        let (pos_tx, _pos_rx) = watch::channel(DVec2::ZERO);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let driver = MotionDriver::spawn(
            &tokio::runtime::Handle::current(),
            id,
            10.0,
            context(registry.clone()),
            pos_tx,
            cancel_rx,
        );
        registry.with(|reg| reg.remove(id));

        tokio::time::timeout(Duration::from_secs(1), driver.into_handle())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_stops_when_cancel_sender_dropped() {
        let registry = SharedRegistry::new();
        let id = add_ball(&registry, DVec2::new(100.0, 100.0), DVec2::new(10.0, 10.0));
        let (pos_tx, _pos_rx) = watch::channel(DVec2::ZERO);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = MotionDriver::spawn(
            &tokio::runtime::Handle::current(),
            id,
            10.0,
            context(registry),
            pos_tx,
            cancel_rx,
        );
        drop(cancel_tx);

        tokio::time::timeout(Duration::from_secs(1), driver.into_handle())
            .await
            .unwrap()
            .unwrap();
    }
}
