pub mod attack;
pub mod bookkeeper;
pub mod chart;
pub mod character;
pub mod course;
pub mod options;
pub mod scores;
pub mod song;
pub mod stage_stats;
pub mod state;

pub const MAX_PLAYERS: usize = 2;

/// Player index, 0-based. `MAX_PLAYERS` bounds every per-player array.
pub type PlayerNumber = usize;
