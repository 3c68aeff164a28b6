pub mod aircraft;
pub mod graph;
pub mod movement;
pub mod runway;
pub mod segments;
pub mod sim;

/// Ticks a landing roll occupies before the aircraft hands over to taxi.
pub const MAX_LANDING_TICKS: u32 = 3;

/// Ticks of turnaround service at a stand before pushback.
pub const MAX_STAND_TICKS: u32 = 10;

/// How much of an edge each queued aircraft gives up to the one ahead of it.
/// The occupant at index `i` may advance no further than `1 - i * STEP`.
pub const HOLD_PROGRESS_STEP: f32 = 0.19;
