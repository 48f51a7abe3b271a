//! Wall boundary handling
//!
//! Policy: hard clamp. A ball whose edge has crossed a wall is put back on the
//! legal interior, and its velocity component is reflected only while it still
//! points out of the table. A ball resting against a wall with an inward
//! velocity is clamped but not flipped.

use serde::{Deserialize, Serialize};

use super::state::Ball;

/// Which table edge was hit. `Top` is the minimum-y edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallSide {
    Left,
    Right,
    Top,
    Bottom,
}

/// Clamp `ball` into the arena interior and reflect outward velocity
/// components. Returns the sides whose velocity was reflected (at most one per
/// axis).
pub fn confine(ball: &mut Ball) -> Vec<WallSide> {
    let lo = ball.arena().min_center(ball.radius());
    let hi = ball.arena().max_center(ball.radius());
    let mut hits = Vec::new();

    if ball.pos.x < lo.x {
        ball.pos.x = lo.x;
        if ball.vel.x < 0.0 {
            ball.vel.x = -ball.vel.x;
            hits.push(WallSide::Left);
        }
    } else if ball.pos.x > hi.x {
        ball.pos.x = hi.x;
        if ball.vel.x > 0.0 {
            ball.vel.x = -ball.vel.x;
            hits.push(WallSide::Right);
        }
    }

    if ball.pos.y < lo.y {
        ball.pos.y = lo.y;
        if ball.vel.y < 0.0 {
            ball.vel.y = -ball.vel.y;
            hits.push(WallSide::Top);
        }
    } else if ball.pos.y > hi.y {
        ball.pos.y = hi.y;
        if ball.vel.y > 0.0 {
            ball.vel.y = -ball.vel.y;
            hits.push(WallSide::Bottom);
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::{Arena, BallId};
    use glam::DVec2;
    use proptest::prelude::*;

    fn ball_at(pos: DVec2, vel: DVec2) -> Ball {
        let arena = Arena::new(400.0, 400.0).unwrap();
        Ball::new(BallId(1), pos, vel, 4.0, 16.0, arena).unwrap()
    }

    #[test]
    fn test_left_wall_reflects_and_clamps() {
        let mut ball = ball_at(DVec2::new(10.0, 200.0), DVec2::new(-5.0, 1.0));
        let hits = confine(&mut ball);
        assert_eq!(hits, vec![WallSide::Left]);
        assert_eq!(ball.pos, DVec2::new(16.0, 200.0));
        assert_eq!(ball.vel, DVec2::new(5.0, 1.0));
    }

    #[test]
    fn test_right_and_bottom_walls_account_for_border() {
        let mut ball = ball_at(DVec2::new(390.0, 399.0), DVec2::new(3.0, 4.0));
        let hits = confine(&mut ball);
        assert_eq!(hits, vec![WallSide::Right, WallSide::Bottom]);
        assert_eq!(ball.pos, DVec2::new(376.0, 376.0));
        assert_eq!(ball.vel, DVec2::new(-3.0, -4.0));
    }

    #[test]
    fn test_inward_velocity_is_not_flipped() {
        // Resting against the top wall but already heading back in.
        let mut ball = ball_at(DVec2::new(100.0, 12.0), DVec2::new(0.0, 2.0));
        let hits = confine(&mut ball);
        assert!(hits.is_empty());
        assert_eq!(ball.pos.y, 16.0);
        assert_eq!(ball.vel, DVec2::new(0.0, 2.0));

        // Repeating the check never flip-flops.
        assert!(confine(&mut ball).is_empty());
        assert_eq!(ball.vel, DVec2::new(0.0, 2.0));
    }

    #[test]
    fn test_interior_ball_is_untouched() {
        let mut ball = ball_at(DVec2::new(200.0, 200.0), DVec2::new(-7.0, 7.0));
        assert!(confine(&mut ball).is_empty());
        assert_eq!(ball.pos, DVec2::new(200.0, 200.0));
        assert_eq!(ball.vel, DVec2::new(-7.0, 7.0));
    }

    proptest! {
        #[test]
        fn prop_confine_always_lands_inside(
            x in -1000.0f64..1000.0,
            y in -1000.0f64..1000.0,
            vx in -100.0f64..100.0,
            vy in -100.0f64..100.0,
        ) {
            let mut ball = ball_at(DVec2::new(x, y), DVec2::new(vx, vy));
            let speed = ball.vel.length();
            confine(&mut ball);
            prop_assert!(ball.arena().contains(ball.pos, ball.radius()));
            prop_assert!((ball.vel.length() - speed).abs() < 1e-12);
        }
    }
}
