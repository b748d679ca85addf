use crate::game::chart::StepsType;
use crate::game::{MAX_PLAYERS, PlayerNumber};
use bincode::{Decode, Encode};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Entries per high-score list.
pub const MAX_HIGH_SCORES: usize = 10;

pub const NUM_RANKING_CATEGORIES: usize = 4;

const MACHINE_SCORES_FILE: &str = "machine_scores.bin";

/// Placeholder written into a freshly earned record until the player enters
/// their initials. One marker per player so simultaneous records stay apart.
pub const RANKING_TO_FILL_IN_MARKER: [&str; MAX_PLAYERS] = ["#P1#", "#P2#"];

// --- Grades ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub enum Grade {
    NoData,
    E,
    D,
    C,
    B,
    A,
    AA,
    AAA,
}

impl Grade {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "?",
            Self::E => "E",
            Self::D => "D",
            Self::C => "C",
            Self::B => "B",
            Self::A => "A",
            Self::AA => "AA",
            Self::AAA => "AAA",
        }
    }
}

impl core::fmt::Display for Grade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn grade_from_percent(percent: f32) -> Grade {
    if percent >= 0.99 {
        Grade::AAA
    } else if percent >= 0.93 {
        Grade::AA
    } else if percent >= 0.85 {
        Grade::A
    } else if percent >= 0.70 {
        Grade::B
    } else if percent >= 0.50 {
        Grade::C
    } else {
        Grade::D
    }
}

// --- High score tables ---

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct HighScore {
    pub name: String,
    pub score: i32,
    pub percent_dp: f32,
    pub grade: Grade,
}

/// Which list a song record lives in: the machine table or one player's
/// per-session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreSlot {
    Machine,
    Player(PlayerNumber),
}

/// Difficulty bands for the machine ranking screens. Meter decides the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum RankingCategory {
    A,
    B,
    C,
    D,
}

impl RankingCategory {
    pub const ALL: [Self; NUM_RANKING_CATEGORIES] = [Self::A, Self::B, Self::C, Self::D];

    pub const fn from_meter(meter: u32) -> Self {
        if meter <= 4 {
            Self::A
        } else if meter <= 7 {
            Self::B
        } else if meter <= 10 {
            Self::C
        } else {
            Self::D
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

/// Opaque location of one high-score record, handed out by the feat scan and
/// resolved again by `set_name_at`. Replaces the original's raw pointer into
/// the score vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatTarget {
    Song {
        chart_key: String,
        slot: ScoreSlot,
        rank: usize,
    },
    Category {
        steps_type: StepsType,
        category: RankingCategory,
        rank: usize,
    },
    Course {
        course_key: String,
        steps_type: StepsType,
        rank: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatKind {
    Song,
    Ranking,
    Course,
}

/// One leaderboard placement still waiting for a name to be filled in.
#[derive(Debug, Clone)]
pub struct RankingFeat {
    pub kind: FeatKind,
    pub description: String,
    pub score: f32,
    pub grade: Grade,
    pub banner: Option<PathBuf>,
    pub target: FeatTarget,
}

/// All high-score lists the session can read or write. Owned by the session
/// state; machine slots are flushed to disk at every reset.
#[derive(Debug, Default)]
pub struct ScoreBook {
    song_scores: FxHashMap<(String, ScoreSlot), Vec<HighScore>>,
    category_scores: FxHashMap<(StepsType, RankingCategory), Vec<HighScore>>,
    course_scores: FxHashMap<(String, StepsType), Vec<HighScore>>,
}

fn insert_ranked(list: &mut Vec<HighScore>, entry: HighScore) -> Option<usize> {
    let rank = list
        .iter()
        .position(|e| entry.score > e.score)
        .unwrap_or(list.len());
    if rank >= MAX_HIGH_SCORES {
        return None;
    }
    list.insert(rank, entry);
    list.truncate(MAX_HIGH_SCORES);
    Some(rank)
}

impl ScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn song_scores(&self, chart_key: &str, slot: ScoreSlot) -> &[HighScore] {
        self.song_scores
            .get(&(chart_key.to_string(), slot))
            .map_or(&[], Vec::as_slice)
    }

    pub fn category_scores(&self, steps_type: StepsType, category: RankingCategory) -> &[HighScore] {
        self.category_scores
            .get(&(steps_type, category))
            .map_or(&[], Vec::as_slice)
    }

    pub fn course_scores(&self, course_key: &str, steps_type: StepsType) -> &[HighScore] {
        self.course_scores
            .get(&(course_key.to_string(), steps_type))
            .map_or(&[], Vec::as_slice)
    }

    /// Adds a song record; returns its rank if it made the list.
    pub fn add_song_score(
        &mut self,
        chart_key: &str,
        slot: ScoreSlot,
        entry: HighScore,
    ) -> Option<usize> {
        let list = self
            .song_scores
            .entry((chart_key.to_string(), slot))
            .or_default();
        insert_ranked(list, entry)
    }

    pub fn add_category_score(
        &mut self,
        steps_type: StepsType,
        category: RankingCategory,
        entry: HighScore,
    ) -> Option<usize> {
        let list = self
            .category_scores
            .entry((steps_type, category))
            .or_default();
        insert_ranked(list, entry)
    }

    pub fn add_course_score(
        &mut self,
        course_key: &str,
        steps_type: StepsType,
        entry: HighScore,
    ) -> Option<usize> {
        let list = self
            .course_scores
            .entry((course_key.to_string(), steps_type))
            .or_default();
        insert_ranked(list, entry)
    }

    /// Writes a name through a feat handle. Returns false if the record no
    /// longer exists (list shrank since the handle was issued).
    pub fn set_name_at(&mut self, target: &FeatTarget, name: &str) -> bool {
        let slot = match target {
            FeatTarget::Song { chart_key, slot, rank } => self
                .song_scores
                .get_mut(&(chart_key.clone(), *slot))
                .and_then(|l| l.get_mut(*rank)),
            FeatTarget::Category {
                steps_type,
                category,
                rank,
            } => self
                .category_scores
                .get_mut(&(*steps_type, *category))
                .and_then(|l| l.get_mut(*rank)),
            FeatTarget::Course {
                course_key,
                steps_type,
                rank,
            } => self
                .course_scores
                .get_mut(&(course_key.clone(), *steps_type))
                .and_then(|l| l.get_mut(*rank)),
        };
        match slot {
            Some(entry) => {
                entry.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Clears the per-player (memory card) song lists, keeping machine data.
    pub fn clear_player_scores(&mut self) {
        self.song_scores
            .retain(|(_, slot), _| matches!(slot, ScoreSlot::Machine));
    }
}

// --- Machine score persistence ---

#[derive(Debug, Encode, Decode)]
struct MachineScoresFile {
    songs: Vec<(String, Vec<HighScore>)>,
    categories: Vec<(StepsTypeCode, RankingCategory, Vec<HighScore>)>,
    courses: Vec<(String, StepsTypeCode, Vec<HighScore>)>,
}

// StepsType codes pinned for the on-disk format.
#[derive(Debug, Clone, Copy, Encode, Decode)]
struct StepsTypeCode(u8);

const fn steps_type_to_code(st: StepsType) -> StepsTypeCode {
    StepsTypeCode(match st {
        StepsType::DanceSingle => 0,
        StepsType::DanceDouble => 1,
        StepsType::DanceCouple => 2,
        StepsType::DanceSolo => 3,
    })
}

const fn steps_type_from_code(code: StepsTypeCode) -> StepsType {
    match code.0 {
        1 => StepsType::DanceDouble,
        2 => StepsType::DanceCouple,
        3 => StepsType::DanceSolo,
        _ => StepsType::DanceSingle,
    }
}

/// Flushes the machine-slot tables under `save_dir`. Errors are logged and
/// swallowed; losing a flush must never take the session down.
pub fn save_machine_scores(book: &ScoreBook, save_dir: &Path) {
    let file = MachineScoresFile {
        songs: book
            .song_scores
            .iter()
            .filter(|((_, slot), _)| matches!(slot, ScoreSlot::Machine))
            .map(|((key, _), list)| (key.clone(), list.clone()))
            .collect(),
        categories: book
            .category_scores
            .iter()
            .map(|((st, cat), list)| (steps_type_to_code(*st), *cat, list.clone()))
            .collect(),
        courses: book
            .course_scores
            .iter()
            .map(|((key, st), list)| (key.clone(), steps_type_to_code(*st), list.clone()))
            .collect(),
    };

    if let Err(e) = fs::create_dir_all(save_dir) {
        warn!("Failed to create save dir {:?}: {e}", save_dir);
        return;
    }
    let path = save_dir.join(MACHINE_SCORES_FILE);
    match bincode::encode_to_vec(&file, bincode::config::standard()) {
        Ok(buf) => {
            if let Err(e) = fs::write(&path, buf) {
                warn!("Failed to write machine scores to {:?}: {e}", path);
            } else {
                info!("Saved machine scores to {:?}", path);
            }
        }
        Err(e) => warn!("Failed to encode machine scores: {e}"),
    }
}

pub fn load_machine_scores(book: &mut ScoreBook, save_dir: &Path) {
    let path = save_dir.join(MACHINE_SCORES_FILE);
    let Ok(bytes) = fs::read(&path) else {
        return;
    };
    let Ok((file, _)) =
        bincode::decode_from_slice::<MachineScoresFile, _>(&bytes, bincode::config::standard())
    else {
        warn!("Ignoring unreadable machine score file {:?}", path);
        return;
    };
    for (key, list) in file.songs {
        book.song_scores.insert((key, ScoreSlot::Machine), list);
    }
    for (code, cat, list) in file.categories {
        book.category_scores
            .insert((steps_type_from_code(code), cat), list);
    }
    for (key, code, list) in file.courses {
        book.course_scores
            .insert((key, steps_type_from_code(code)), list);
    }
}

// --- Name filtering ---

/// Uppercases a ranking name and blanks it entirely if any blocklisted
/// substring appears, case-insensitively. A missing blocklist file means no
/// filtering.
pub fn filter_ranking_name(name: &str, blacklist_path: &Path) -> String {
    let mut name = name.to_uppercase();
    if let Ok(content) = fs::read_to_string(blacklist_path) {
        for line in content.lines() {
            let word = line.trim().to_uppercase();
            if !word.is_empty() && name.contains(&word) {
                name.clear();
                break;
            }
        }
    }
    name
}
