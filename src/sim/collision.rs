//! Ball-ball contact detection and elastic impulse resolution
//!
//! Resolution uses the normal-impulse form: with `n` the unit vector from B
//! to A and `u = (vA - vB)·n`, the impulse `j = -2u / (mA + mB)` is applied as
//! `vA += j mB n`, `vB -= j mA n`. Momentum is conserved exactly and the
//! normal component of the relative velocity flips sign. Tangential components
//! are untouched.

use glam::DVec2;

use super::state::Ball;

/// What happened when a pair was examined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// Circles do not touch
    Apart,
    /// Centers coincide exactly; no normal can be defined, so nothing is done
    Coincident,
    /// Circles touch but are already moving apart along the normal
    Separating,
    /// Impulse applied
    Resolved {
        /// Unit normal pointing from B to A
        normal: DVec2,
        /// Normal relative speed before resolution (<= 0)
        impact_speed: f64,
        /// Overlap depth at the moment of resolution
        penetration: f64,
    },
}

impl Contact {
    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Contact::Resolved { .. })
    }
}

/// True if the two circles touch or overlap
#[inline]
pub fn in_contact(a: &Ball, b: &Ball) -> bool {
    let reach = a.radius() + b.radius();
    a.pos.distance_squared(b.pos) <= reach * reach
}

/// Detect contact between `a` and `b` and, if they approach, apply the
/// elastic impulse to both velocities.
pub fn resolve_pair(a: &mut Ball, b: &mut Ball) -> Contact {
    if !in_contact(a, b) {
        return Contact::Apart;
    }
    let d = a.pos - b.pos;
    let dist = d.length();
    let reach = a.radius() + b.radius();
    if dist == 0.0 {
        return Contact::Coincident;
    }

    let normal = d / dist;
    let impact_speed = (a.vel - b.vel).dot(normal);
    if impact_speed > 0.0 {
        return Contact::Separating;
    }

    let (ma, mb) = (a.mass(), b.mass());
    let j = -2.0 * impact_speed / (ma + mb);
    a.vel += normal * (j * mb);
    b.vel -= normal * (j * ma);

    Contact::Resolved {
        normal,
        impact_speed,
        penetration: (reach - dist).max(0.0),
    }
}

/// Push a resolved pair apart along `normal` so their centers end up exactly
/// `rA + rB` apart. Each ball moves in proportion to the other's mass.
/// Positions only; velocities and therefore momentum are untouched.
pub fn separate(a: &mut Ball, b: &mut Ball, normal: DVec2, penetration: f64) {
    if penetration <= 0.0 {
        return;
    }
    let total = a.mass() + b.mass();
    a.pos += normal * (penetration * b.mass() / total);
    b.pos -= normal * (penetration * a.mass() / total);
}
