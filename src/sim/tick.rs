//! One motion step for a single ball
//!
//! `advance -> detect + resolve against every other ball -> wall check`.
//! The caller holds the registry lock for the whole call, so no other driver
//! can observe a half-updated velocity pair. The returned outcome is published
//! after the lock is released.

use super::collision::{Contact, resolve_pair, separate};
use super::registry::Registry;
use super::state::{Ball, BallId, BallSnapshot};
use super::walls::{WallSide, confine};

/// Per-step knobs
#[derive(Debug, Clone, Copy)]
pub struct StepOptions {
    /// Push resolved pairs apart so they no longer overlap
    pub overlap_correction: bool,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            overlap_correction: true,
        }
    }
}

/// A resolved ball-ball collision, captured after the impulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCollision {
    pub mover: BallSnapshot,
    pub other: BallSnapshot,
}

/// A reflected wall contact, captured after the reflection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallHit {
    pub ball: BallSnapshot,
    pub side: WallSide,
}

/// Everything that changed during one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Final state of the moving ball
    pub ball: BallSnapshot,
    /// Elapsed time integrated by this step (seconds)
    pub dt: f64,
    pub collisions: Vec<PairCollision>,
    pub wall_hits: Vec<WallHit>,
}

/// Move a ball along its velocity for `dt` seconds
#[inline]
pub fn advance(ball: &mut Ball, dt: f64) {
    ball.pos += ball.vel * dt;
}

/// Borrow two distinct balls mutably
fn pair_mut(balls: &mut [Ball], i: usize, j: usize) -> (&mut Ball, &mut Ball) {
    debug_assert_ne!(i, j);
    if i < j {
        let (head, tail) = balls.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = balls.split_at_mut(i);
        (&mut tail[0], &mut head[j])
    }
}

/// Advance ball `id` by `dt`, resolve its contacts in registry order, then
/// confine it to the table. Returns `None` if the ball is no longer registered.
///
/// Simultaneous contacts are resolved one pair at a time, in order; there is
/// no global solve.
pub fn step(registry: &mut Registry, id: BallId, dt: f64, options: StepOptions) -> Option<StepOutcome> {
    let index = registry.index_of(id)?;
    let balls = registry.balls_mut();

    advance(&mut balls[index], dt);

    let mut collisions = Vec::new();
    let mut displaced = Vec::new();
    for other in 0..balls.len() {
        if other == index {
            continue;
        }
        let (mover, target) = pair_mut(balls, index, other);
        if let Contact::Resolved {
            normal,
            penetration,
            ..
        } = resolve_pair(mover, target)
        {
            if options.overlap_correction && penetration > 0.0 {
                separate(mover, target, normal, penetration);
                displaced.push(other);
            }
            collisions.push(PairCollision {
                mover: mover.snapshot(),
                other: target.snapshot(),
            });
        }
    }

    let mut wall_hits = Vec::new();
    for side in confine(&mut balls[index]) {
        wall_hits.push(WallHit {
            ball: balls[index].snapshot(),
            side,
        });
    }
    // Overlap correction may have pushed a neighbour through a wall.
    for other in displaced {
        for side in confine(&mut balls[other]) {
            wall_hits.push(WallHit {
                ball: balls[other].snapshot(),
                side,
            });
        }
    }

    Some(StepOutcome {
        ball: balls[index].snapshot(),
        dt,
        collisions,
        wall_hits,
    })
}
