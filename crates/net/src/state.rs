use glam::Vec2;

use crate::net::PLAYER_SLOTS;

pub const PADDLE_LIMIT: f32 = 7.0;

/// What the protocol reads from and writes into the running match.
///
/// Rendering and physics live behind this trait; the engine only moves
/// numbers across it.
pub trait PongState {
    fn set_paddle_position(&mut self, slot: usize, y: f32);
    fn paddle_position(&self, slot: usize) -> f32;
    fn set_ball_position(&mut self, position: Vec2);
    fn ball_position(&self) -> Vec2;
    fn increment_score(&mut self, slot: usize);
    fn scores(&self) -> [u8; PLAYER_SLOTS];
    fn set_scores(&mut self, scores: [u8; PLAYER_SLOTS]);

    fn paddle_positions(&self) -> [f32; PLAYER_SLOTS] {
        std::array::from_fn(|slot| self.paddle_position(slot))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchState {
    paddles: [f32; PLAYER_SLOTS],
    ball: Vec2,
    scores: [u8; PLAYER_SLOTS],
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl PongState for MatchState {
    fn set_paddle_position(&mut self, slot: usize, y: f32) {
        if let Some(paddle) = self.paddles.get_mut(slot) {
            *paddle = y.clamp(-PADDLE_LIMIT, PADDLE_LIMIT);
        }
    }

    fn paddle_position(&self, slot: usize) -> f32 {
        self.paddles.get(slot).copied().unwrap_or_default()
    }

    fn set_ball_position(&mut self, position: Vec2) {
        self.ball = position;
    }

    fn ball_position(&self) -> Vec2 {
        self.ball
    }

    fn increment_score(&mut self, slot: usize) {
        if let Some(score) = self.scores.get_mut(slot) {
            *score = score.saturating_add(1);
        }
    }

    fn scores(&self) -> [u8; PLAYER_SLOTS] {
        self.scores
    }

    fn set_scores(&mut self, scores: [u8; PLAYER_SLOTS]) {
        self.scores = scores;
    }
}
