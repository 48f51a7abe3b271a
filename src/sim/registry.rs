//! The single authoritative store of live balls
//!
//! Balls are kept in insertion order; collision scans walk that order, which
//! makes multi-contact resolution deterministic for a given registry. All
//! access from concurrent motion drivers goes through [`SharedRegistry`],
//! whose lock is held for a whole step (advance, full pairwise scan, walls).

use std::sync::{Arc, Mutex, MutexGuard};

use glam::DVec2;
use rand::Rng;

use super::state::{Arena, Ball, BallId, BallSnapshot};
use crate::consts::PLACEMENT_ATTEMPTS;
use crate::error::{Error, Result};

/// Ordered collection of live balls with id allocation
#[derive(Debug)]
pub struct Registry {
    balls: Vec<Ball>,
    next_id: u32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            balls: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate a new ball ID
    pub fn next_ball_id(&mut self) -> BallId {
        let id = BallId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, ball: Ball) {
        self.balls.push(ball);
    }

    /// Remove a ball, preserving the order of the rest
    pub fn remove(&mut self, id: BallId) -> Option<Ball> {
        let index = self.index_of(id)?;
        Some(self.balls.remove(index))
    }

    pub fn clear(&mut self) -> usize {
        let n = self.balls.len();
        self.balls.clear();
        n
    }

    pub fn index_of(&self, id: BallId) -> Option<usize> {
        self.balls.iter().position(|b| b.id() == id)
    }

    pub fn get(&self, id: BallId) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id() == id)
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    pub(crate) fn balls_mut(&mut self) -> &mut [Ball] {
        &mut self.balls
    }

    pub fn snapshots(&self) -> Vec<BallSnapshot> {
        self.balls.iter().map(Ball::snapshot).collect()
    }

    /// Total linear momentum of all live balls
    pub fn total_momentum(&self) -> DVec2 {
        self.balls.iter().map(Ball::momentum).sum()
    }

    /// Find a uniformly random legal center for a ball of `radius` that does
    /// not overlap any registered ball nor any of `pending`.
    pub fn find_free_position<R: Rng>(
        &self,
        arena: &Arena,
        radius: f64,
        pending: &[Ball],
        rng: &mut R,
    ) -> Result<DVec2> {
        if !arena.fits(radius) {
            return Err(Error::InvalidArgument(format!(
                "table {}x{} is too small for balls of radius {radius}",
                arena.width, arena.height
            )));
        }
        let lo = arena.min_center(radius);
        let hi = arena.max_center(radius);

        for _ in 0..PLACEMENT_ATTEMPTS {
            let candidate = DVec2::new(
                rng.random_range(lo.x..=hi.x),
                rng.random_range(lo.y..=hi.y),
            );
            let overlaps = self.balls.iter().chain(pending.iter()).any(|other| {
                candidate.distance(other.pos) < radius + other.radius()
            });
            if !overlaps {
                return Ok(candidate);
            }
        }

        Err(Error::Placement {
            attempts: PLACEMENT_ATTEMPTS,
        })
    }
}

/// Cloneable guarded handle to the registry
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the exclusive region. The registry only holds plain data, so a
    /// guard poisoned by a panicking holder is still usable.
    pub fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` inside the exclusive region
    pub fn with<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        let mut guard = self.lock();
        f(&mut guard)
    }
}
