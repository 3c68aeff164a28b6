use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::aircraft::AircraftState;

/// Grid units covered per tick on the runway.
pub const RUNWAY_SPEED: f32 = 4.0;
/// Grid units covered per tick while taxiing.
pub const TAXI_SPEED: f32 = 1.0;
/// Grid units covered per tick during pushback.
pub const PUSHBACK_SPEED: f32 = 0.5;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
  Landing,
  Departing,
  Taxi,
  Pushback,
}

impl MovementKind {
  pub fn speed(&self) -> f32 {
    match self {
      Self::Landing | Self::Departing => RUNWAY_SPEED,
      Self::Taxi => TAXI_SPEED,
      Self::Pushback => PUSHBACK_SPEED,
    }
  }
}

/// Movement category for an aircraft state. Runway edges override this at
/// the call site: they are always covered at runway speed.
pub fn movement_kind_for_state(state: AircraftState) -> MovementKind {
  match state {
    AircraftState::Landing => MovementKind::Landing,
    AircraftState::Departing => MovementKind::Departing,
    AircraftState::Pushback => MovementKind::Pushback,
    _ => MovementKind::Taxi,
  }
}

/// Whole ticks needed to cover `distance` at the category's speed. Never
/// zero, so every hop is observable for at least one tick.
pub fn duration_ticks(distance: f32, kind: MovementKind) -> u32 {
  (distance / kind.speed()).ceil().max(1.0) as u32
}

/// Straight-line interpolation between two node positions.
pub fn interpolate(from: Vec2, to: Vec2, progress: f32) -> Vec2 {
  from.lerp(to, progress.clamp(0.0, 1.0))
}
