use crate::game::chart::ChartData;
use crate::game::scores::{self, Grade};
use crate::game::song::SongData;
use crate::game::{MAX_PLAYERS, PlayerNumber};
use std::sync::Arc;

pub const NUM_RADAR_CATEGORIES: usize = 5;

/// Groove radar axes. Values are 0..1 per song and are averaged over the
/// session for the final evaluation display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadarCategory {
    Stream,
    Voltage,
    Air,
    Freeze,
    Chaos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageType {
    #[default]
    Normal,
    Extra1,
    Extra2,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerStageStats {
    pub chart: Option<Arc<ChartData>>,
    pub meter: u32,
    pub possible_dance_points: i32,
    pub actual_dance_points: i32,
    pub cur_combo: u32,
    pub max_combo: u32,
    /// Includes the current song, so it is 1-based during play.
    pub songs_played: i32,
    pub songs_passed: i32,
    pub failed: bool,
    pub radar_possible: [f32; NUM_RADAR_CATEGORIES],
    pub radar_actual: [f32; NUM_RADAR_CATEGORIES],
}

impl PlayerStageStats {
    pub fn grade(&self) -> Grade {
        if self.failed {
            return Grade::E;
        }
        if self.possible_dance_points <= 0 {
            return Grade::NoData;
        }
        let percent = self.actual_dance_points as f32 / self.possible_dance_points as f32;
        scores::grade_from_percent(percent)
    }
}

/// Results of one stage. A fresh value is swapped in at every stage reset
/// and the old one is pushed onto the played-stages history.
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    pub stage_type: StageType,
    pub song: Option<Arc<SongData>>,
    pub players: [PlayerStageStats; MAX_PLAYERS],
}

impl StageStats {
    pub fn grade(&self, pn: PlayerNumber) -> Grade {
        self.players[pn].grade()
    }

    /// True if at least one player who played this stage did not fail.
    pub fn one_passed(&self) -> bool {
        self.players
            .iter()
            .any(|p| p.songs_played > 0 && !p.failed)
    }

    /// Accumulates another stage's numbers into this one, for the final
    /// evaluation rollup. Radar values are summed here and averaged by the
    /// caller once the song count is known.
    pub fn add_stats(&mut self, other: &StageStats) {
        if self.song.is_none() {
            self.song = other.song.clone();
        }
        for (mine, theirs) in self.players.iter_mut().zip(other.players.iter()) {
            if mine.chart.is_none() {
                mine.chart = theirs.chart.clone();
            }
            mine.meter = mine.meter.max(theirs.meter);
            mine.possible_dance_points += theirs.possible_dance_points;
            mine.actual_dance_points += theirs.actual_dance_points;
            mine.max_combo = mine.max_combo.max(theirs.max_combo);
            mine.cur_combo = theirs.cur_combo;
            mine.songs_played += theirs.songs_played;
            mine.songs_passed += theirs.songs_passed;
            mine.failed |= theirs.failed;
            for r in 0..NUM_RADAR_CATEGORIES {
                mine.radar_possible[r] += theirs.radar_possible[r];
                mine.radar_actual[r] += theirs.radar_actual[r];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PlayerStageStats, StageStats};
    use crate::game::scores::Grade;

    fn played(actual: i32, possible: i32, failed: bool) -> PlayerStageStats {
        PlayerStageStats {
            possible_dance_points: possible,
            actual_dance_points: actual,
            songs_played: 1,
            songs_passed: i32::from(!failed),
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn one_passed_requires_a_played_non_failed_player() {
        let mut stats = StageStats::default();
        assert!(!stats.one_passed(), "untouched stage has no passes");
        stats.players[0] = played(50, 100, true);
        assert!(!stats.one_passed());
        stats.players[1] = played(90, 100, false);
        assert!(stats.one_passed());
    }

    #[test]
    fn failing_forces_grade_e_regardless_of_score() {
        let stats = played(100, 100, true);
        assert_eq!(stats.grade(), Grade::E);
    }

    #[test]
    fn add_stats_accumulates_points_and_keeps_max_combo() {
        let mut total = StageStats::default();
        let mut a = StageStats::default();
        a.players[0] = played(80, 100, false);
        a.players[0].max_combo = 120;
        let mut b = StageStats::default();
        b.players[0] = played(60, 100, false);
        b.players[0].max_combo = 75;

        total.add_stats(&a);
        total.add_stats(&b);
        let p = &total.players[0];
        assert_eq!(p.actual_dance_points, 140);
        assert_eq!(p.possible_dance_points, 200);
        assert_eq!(p.max_combo, 120);
        assert_eq!(p.songs_played, 2);
    }
}
