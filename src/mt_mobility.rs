//! Node mobility models driven by the engine's virtual clock

use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

use crate::mt_config::Bounds;
use crate::mt_interface::{Position, SimTime};

/// Mobility state of one node
#[derive(Debug, Clone)]
pub enum MobilityModel {
    ConstantPosition(Position),
    RandomWalk(RandomWalk),
}

impl MobilityModel {
    pub fn position_at(&mut self, now: SimTime) -> Position {
        match self {
            MobilityModel::ConstantPosition(position) => *position,
            MobilityModel::RandomWalk(walk) => walk.position_at(now),
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, MobilityModel::RandomWalk(_))
    }
}

/// 2-D random walk at constant speed, reflecting off the bounds
///
/// The walker keeps its heading for `change_distance` units of travel, then
/// draws a new direction uniformly in [0, 2π). Positions are advanced lazily.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    bounds: Bounds,
    speed: f64,
    change_distance: f64,
    position: Position,
    velocity: (f64, f64),
    last_update: SimTime,
    rng: StdRng,
}

impl RandomWalk {
    /// The walker is at rest until its first course change
    pub fn new(start: Position, bounds: Bounds, speed: f64, change_distance: f64, rng: StdRng) -> Self {
        Self {
            bounds,
            speed,
            change_distance,
            position: bounds.clamp(start),
            velocity: (0.0, 0.0),
            last_update: SimTime::ZERO,
            rng,
        }
    }

    /// Time to cover `change_distance` at the walk speed
    pub fn change_interval(&self) -> SimTime {
        SimTime::from_secs_f64(self.change_distance / self.speed)
    }

    pub fn position_at(&mut self, now: SimTime) -> Position {
        self.advance(now);
        self.position
    }

    /// Draw a new heading at `now`; returns the position where the turn happens
    pub fn change_course(&mut self, now: SimTime) -> Position {
        self.advance(now);
        let direction = self.rng.gen_range(0.0..2.0 * PI);
        self.velocity = (self.speed * direction.cos(), self.speed * direction.sin());
        self.position
    }

    fn advance(&mut self, now: SimTime) {
        if now <= self.last_update {
            return;
        }
        let mut remaining = (now - self.last_update).as_secs_f64();
        self.last_update = now;

        let (mut vx, mut vy) = self.velocity;
        let mut x = self.position.x;
        let mut y = self.position.y;
        let b = self.bounds;

        while remaining > 0.0 {
            let tx = time_to_wall(x, vx, b.x_min, b.x_max);
            let ty = time_to_wall(y, vy, b.y_min, b.y_max);
            let hit = tx.min(ty);

            if hit >= remaining {
                x += vx * remaining;
                y += vy * remaining;
                break;
            }

            x += vx * hit;
            y += vy * hit;
            remaining -= hit;
            if tx <= ty {
                vx = -vx;
            }
            if ty <= tx {
                vy = -vy;
            }
        }

        self.velocity = (vx, vy);
        self.position = b.clamp(Position::new(x, y));
    }
}

fn time_to_wall(p: f64, v: f64, lo: f64, hi: f64) -> f64 {
    if v > 0.0 {
        ((hi - p) / v).max(0.0)
    } else if v < 0.0 {
        ((lo - p) / v).max(0.0)
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn walker(start: Position) -> RandomWalk {
        RandomWalk::new(
            start,
            Bounds::default(),
            2.0,
            1.0,
            StdRng::from_seed([7u8; 32]),
        )
    }

    #[test]
    fn test_constant_position_never_moves() {
        let mut model = MobilityModel::ConstantPosition(Position::new(3.0, 4.0));
        assert_eq!(model.position_at(SimTime::ZERO), Position::new(3.0, 4.0));
        assert_eq!(model.position_at(SimTime::from_secs(100)), Position::new(3.0, 4.0));
        assert!(!model.is_mobile());
    }

    #[test]
    fn test_walk_at_rest_before_first_turn() {
        let mut walk = walker(Position::new(10.0, 10.0));
        assert_eq!(walk.position_at(SimTime::from_secs(5)), Position::new(10.0, 10.0));
    }

    #[test]
    fn test_walk_stays_in_bounds_and_respects_speed() {
        let mut walk = walker(Position::new(45.0, -45.0));
        let bounds = Bounds::default();
        let step = SimTime::from_millis(10);
        let mut now = SimTime::ZERO;
        let mut last = walk.change_course(now);

        // long enough to bounce off several walls
        for i in 1..=20_000u64 {
            now = now + step;
            let position = if i % 100 == 0 {
                walk.change_course(now)
            } else {
                walk.position_at(now)
            };
            assert!(bounds.contains(&position), "{} escaped at {}", position, now);
            assert!(position.distance(&last) <= 2.0 * step.as_secs_f64() + 1e-9);
            last = position;
        }
    }

    #[test]
    fn test_walk_reflects_at_wall() {
        let mut walk = walker(Position::new(49.0, 0.0));
        walk.velocity = (2.0, 0.0);
        // 0.5s to the wall, 1.5s back
        let position = walk.position_at(SimTime::from_secs(2));
        assert!((position.x - 47.0).abs() < 1e-9);
        assert!(walk.velocity.0 < 0.0);
    }

    #[test]
    fn test_turns_after_unit_distance() {
        let walk = walker(Position::new(0.0, 0.0));
        assert_eq!(walk.change_interval(), SimTime::from_millis(500));

        let mut fast = RandomWalk::new(
            Position::new(0.0, 0.0),
            Bounds::default(),
            20.0,
            1.0,
            StdRng::from_seed([7u8; 32]),
        );
        assert_eq!(fast.change_interval(), SimTime::from_millis(50));

        // one leg covers exactly the change distance
        fast.change_course(SimTime::ZERO);
        let moved = fast.position_at(fast.change_interval());
        assert!((moved.distance(&Position::new(0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_start_outside_bounds_is_clamped() {
        let mut walk = walker(Position::new(10.0, 330.0));
        assert_eq!(walk.position_at(SimTime::ZERO), Position::new(10.0, 50.0));
    }
}
