//! Physics core
//!
//! Pure functions over ball state plus the shared registry:
//! - No I/O, no sleeping, no logging inside the locked region
//! - Stable scan order (registry insertion order)
//! - Fixed mass and radius per ball

pub mod collision;
pub mod registry;
pub mod state;
pub mod tick;
pub mod walls;

pub use collision::{Contact, in_contact, resolve_pair, separate};
pub use registry::{Registry, SharedRegistry};
pub use state::{Arena, Ball, BallId, BallSnapshot};
pub use tick::{PairCollision, StepOptions, StepOutcome, WallHit, advance, step};
pub use walls::{WallSide, confine};
