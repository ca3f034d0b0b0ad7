//! Kinematic state of the ball and bars

use super::registry::Role;

/// Last known ball state as reported by a client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ball {
    pub position_x: f32,
    pub position_y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    /// Role of the client whose report produced this state
    pub owner: Option<Role>,
}

impl Ball {
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position_x = x;
        self.position_y = y;
    }

    pub fn position(&self) -> (f32, f32) {
        (self.position_x, self.position_y)
    }

    pub fn set_velocity(&mut self, vx: f32, vy: f32) {
        self.velocity_x = vx;
        self.velocity_y = vy;
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.velocity_x, self.velocity_y)
    }

    /// Back to centre court, at rest
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A player's bar; it only moves along X
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bar {
    pub position_x: f32,
    /// Client clock of the latest sample
    pub timestamp: f32,
}

impl Bar {
    pub fn set_position_x(&mut self, x: f32, timestamp: f32) {
        self.position_x = x;
        self.timestamp = timestamp;
    }

    pub fn position_x(&self) -> f32 {
        self.position_x
    }
}

/// Opponent view of a bar: the X axis is flipped
pub fn mirror_bar(x: f32) -> f32 {
    -x
}

/// Opponent view of a ball: both axes are flipped, position and velocity
pub fn mirror_ball(ball: &Ball) -> Ball {
    Ball {
        position_x: -ball.position_x,
        position_y: -ball.position_y,
        velocity_x: -ball.velocity_x,
        velocity_y: -ball.velocity_y,
        owner: ball.owner,
    }
}
