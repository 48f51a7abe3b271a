//! Ball and arena state
//!
//! A ball's mass, radius and table bounds are fixed at construction. Position
//! and velocity change only through the step pipeline in `tick`, which runs
//! under the registry lock.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::BORDER_THICKNESS;
use crate::error::{Error, Result};

/// Stable identity of a ball for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallId(pub u32);

impl std::fmt::Display for BallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rectangular table. The playable interior for a ball center is
/// `[radius, dim - border - radius]` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
    pub border: f64,
}

impl Arena {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        Self::with_border(width, height, BORDER_THICKNESS)
    }

    pub fn with_border(width: f64, height: f64, border: f64) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "table width must be a positive number, got {width}"
            )));
        }
        if !(height.is_finite() && height > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "table height must be a positive number, got {height}"
            )));
        }
        if !(border.is_finite() && border >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "border thickness must be >= 0, got {border}"
            )));
        }
        Ok(Self {
            width,
            height,
            border,
        })
    }

    /// Lowest legal center coordinate on either axis
    #[inline]
    pub fn min_center(&self, radius: f64) -> DVec2 {
        DVec2::splat(radius)
    }

    /// Highest legal center coordinate on each axis
    #[inline]
    pub fn max_center(&self, radius: f64) -> DVec2 {
        DVec2::new(
            self.width - self.border - radius,
            self.height - self.border - radius,
        )
    }

    /// True if a ball of this radius has room to exist at all
    pub fn fits(&self, radius: f64) -> bool {
        let lo = self.min_center(radius);
        let hi = self.max_center(radius);
        hi.x > lo.x && hi.y > lo.y
    }

    /// Upper bound on how many balls of this radius the playable area can
    /// hold without overlap (area ratio, ignores packing losses)
    pub fn max_balls(&self, radius: f64) -> usize {
        if !self.fits(radius) {
            return 0;
        }
        let area = (self.width - self.border) * (self.height - self.border);
        (area / (std::f64::consts::PI * radius * radius)).floor() as usize
    }

    /// True if `pos` is a legal center for a ball of this radius
    pub fn contains(&self, pos: DVec2, radius: f64) -> bool {
        let lo = self.min_center(radius);
        let hi = self.max_center(radius);
        pos.x >= lo.x && pos.x <= hi.x && pos.y >= lo.y && pos.y <= hi.y
    }
}

/// One simulated circular body
#[derive(Debug, Clone)]
pub struct Ball {
    id: BallId,
    mass: f64,
    radius: f64,
    arena: Arena,
    pub pos: DVec2,
    pub vel: DVec2,
}

impl Ball {
    pub fn new(id: BallId, pos: DVec2, vel: DVec2, mass: f64, radius: f64, arena: Arena) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(Error::InvalidArgument(format!("mass must be > 0, got {mass}")));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "radius must be > 0, got {radius}"
            )));
        }
        if !pos.is_finite() || !vel.is_finite() {
            return Err(Error::InvalidArgument(
                "position and velocity must be finite".to_string(),
            ));
        }
        Ok(Self {
            id,
            mass,
            radius,
            arena,
            pos,
            vel,
        })
    }

    #[inline]
    pub fn id(&self) -> BallId {
        self.id
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Linear momentum `m * v`
    #[inline]
    pub fn momentum(&self) -> DVec2 {
        self.vel * self.mass
    }

    /// Kinetic energy `m * |v|^2 / 2`
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.vel.length_squared()
    }

    pub fn snapshot(&self) -> BallSnapshot {
        BallSnapshot {
            id: self.id,
            pos: self.pos,
            vel: self.vel,
            mass: self.mass,
            radius: self.radius,
        }
    }
}

/// Copy of a ball's state taken under the registry lock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub id: BallId,
    pub pos: DVec2,
    pub vel: DVec2,
    pub mass: f64,
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_interior() {
        let arena = Arena::new(400.0, 400.0).unwrap();
        assert_eq!(arena.min_center(16.0), DVec2::new(16.0, 16.0));
        assert_eq!(arena.max_center(16.0), DVec2::new(376.0, 376.0));
        assert!(arena.contains(DVec2::new(16.0, 376.0), 16.0));
        assert!(!arena.contains(DVec2::new(15.9, 200.0), 16.0));
        assert!(arena.fits(16.0));
        assert!(!arena.fits(200.0));
    }

    #[test]
    fn test_max_balls_is_an_area_bound() {
        let arena = Arena::new(400.0, 400.0).unwrap();
        // 392 * 392 / (pi * 16^2) = 191.06
        assert_eq!(arena.max_balls(16.0), 191);
        assert_eq!(arena.max_balls(200.0), 0);
    }

    #[test]
    fn test_arena_rejects_bad_dimensions() {
        assert!(Arena::new(0.0, 100.0).is_err());
        assert!(Arena::new(100.0, -1.0).is_err());
        assert!(Arena::new(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn test_ball_rejects_bad_scalars() {
        let arena = Arena::new(400.0, 400.0).unwrap();
        assert!(Ball::new(BallId(1), DVec2::ZERO, DVec2::ZERO, 0.0, 1.0, arena).is_err());
        assert!(Ball::new(BallId(1), DVec2::ZERO, DVec2::ZERO, 1.0, -1.0, arena).is_err());
        assert!(Ball::new(BallId(1), DVec2::NAN, DVec2::ZERO, 1.0, 1.0, arena).is_err());
        let ball = Ball::new(BallId(7), DVec2::ONE, DVec2::X, 2.0, 3.0, arena).unwrap();
        assert_eq!(ball.id(), BallId(7));
        assert_eq!(ball.momentum(), DVec2::new(2.0, 0.0));
        assert!((ball.kinetic_energy() - 1.0).abs() < 1e-12);
    }
}
