//! Ball Arena headless runner
//!
//! Starts the engine with settings from an optional JSON file and the
//! environment, logs a summary once per second and disposes on exit.

use std::sync::Arc;
use std::time::Duration;

use ball_arena::{Engine, Settings, TelemetrySink};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Ball Arena starting...");

    if let Err(e) = run().await {
        log::error!("Ball Arena failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> ball_arena::Result<()> {
    let mut settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_env()?;
    settings.validate()?;

    let telemetry = match &settings.telemetry.path {
        Some(path) => TelemetrySink::create(
            path,
            settings.telemetry.capacity,
            settings.telemetry.drain_timeout(),
        )?,
        None => TelemetrySink::discard(settings.telemetry.capacity)?,
    };

    let engine = Engine::new(settings.engine.clone(), Arc::new(telemetry))?;
    let mut updates = engine.subscribe();
    engine.start(
        settings.ball_count,
        settings.table_width,
        settings.table_height,
        |pos, ball| {
            log::info!(
                "Ball {} created at ({:.1}, {:.1}), radius {:.1}, mass {:.2}",
                ball.id(),
                pos.x,
                pos.y,
                ball.radius(),
                ball.mass()
            );
        },
    )?;

    let stop_after = async {
        match settings.run_for_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop_after);

    let mut summary = tokio::time::interval(Duration::from_secs(1));
    summary.tick().await;
    let mut moves = 0u64;

    loop {
        tokio::select! {
            _ = &mut stop_after => {
                log::info!("Run time elapsed");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::warn!("Could not listen for Ctrl-C: {e}");
                }
                log::info!("Shutting down");
                break;
            }
            _ = summary.tick() => {
                let telemetry = engine.telemetry();
                log::info!(
                    "{} balls, {} moves/s, momentum {:.1}, telemetry {} written / {} dropped",
                    engine.ball_count(),
                    moves,
                    engine.total_momentum().length(),
                    telemetry.accepted(),
                    telemetry.dropped()
                );
                moves = 0;
            }
            update = updates.recv() => match update {
                Ok(_) => moves += 1,
                Err(RecvError::Lagged(n)) => moves += n,
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.dispose().await
}
