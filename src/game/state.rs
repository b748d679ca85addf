use crate::config::{self, Prefs, ShowDancingCharacters};
use crate::game::attack::{
    Attack, AttackLevel, MAX_SIMULTANEOUS_ATTACKS, NUM_INVENTORY_SLOTS,
};
use crate::game::bookkeeper::Bookkeeper;
use crate::game::chart::{ChartData, Difficulty, StepsType};
use crate::game::character::{
    self, CHARACTERS_DIR, Character, CharacterLoadError,
};
use crate::game::course::CourseData;
use crate::game::options::{self, FailType, PlayerOptions, SongOptions, Transform};
use crate::game::scores::{
    self, FeatKind, FeatTarget, Grade, RankingCategory, RankingFeat, ScoreBook, ScoreSlot,
    RANKING_TO_FILL_IN_MARKER,
};
use crate::game::song::SongData;
use crate::game::stage_stats::{NUM_RADAR_CATEGORIES, StageStats, StageType};
use crate::game::{MAX_PLAYERS, PlayerNumber};
use log::{debug, trace, warn};
use ordered_float::OrderedFloat;
use rand::RngExt;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MUSIC_SECONDS_INVALID: f32 = -5000.0;
pub const BEATS_PER_MEASURE: f32 = 4.0;

/// Timeline key guaranteed to sort before any real beat; holds the base skin.
const NOTE_SKIN_SENTINEL_BEAT: f32 = -1000.0;

const SAVE_DIR: &str = "save";
const NAMES_BLACKLIST_FILE: &str = "names_blacklist.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Arcade,
    Nonstop,
    Oni,
    Endless,
    Battle,
    Rave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Single,
    Versus,
    Double,
    Couple,
    Solo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleType {
    OnePlayerOneCredit,
    TwoPlayersTwoCredits,
    OnePlayerTwoCredits,
}

impl Style {
    pub const fn style_type(self) -> StyleType {
        match self {
            Self::Single | Self::Solo => StyleType::OnePlayerOneCredit,
            Self::Versus | Self::Couple => StyleType::TwoPlayersTwoCredits,
            Self::Double => StyleType::OnePlayerTwoCredits,
        }
    }

    pub const fn steps_type(self) -> StepsType {
        match self {
            Self::Single | Self::Versus => StepsType::DanceSingle,
            Self::Double => StepsType::DanceDouble,
            Self::Couple => StepsType::DanceCouple,
            Self::Solo => StepsType::DanceSolo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    Win,
    Lose,
}

/// Programmer errors the original signalled with asserts. Callers get a
/// typed error and decide for themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    StyleNotSet,
    PlayModeNotSet,
    NoSongPlaying,
    NoCourseSelected,
    NoHumanPlayers,
    InvalidPlayer,
}

impl core::fmt::Display for StateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StyleNotSet => write!(f, "no style has been selected"),
            Self::PlayModeNotSet => write!(f, "no play mode has been selected"),
            Self::NoSongPlaying => write!(f, "no song is playing"),
            Self::NoCourseSelected => write!(f, "no course has been selected"),
            Self::NoHumanPlayers => write!(f, "no human players are joined"),
            Self::InvalidPlayer => write!(f, "player number out of range"),
        }
    }
}

impl std::error::Error for StateError {}

type SkinTimeline = BTreeMap<OrderedFloat<f32>, String>;

/// The mutable state of one game session: current selections, music
/// position, per-stage statistics, and the attack/modifier machinery.
///
/// One value per process, owned by the game loop and passed down by
/// reference. All mutation happens synchronously on the logic thread.
pub struct GameState {
    pub prefs: Prefs,

    // --- selections ---
    pub play_mode: Option<PlayMode>,
    pub style: Option<Style>,
    pub master_player: Option<PlayerNumber>,
    pub players_can_join: bool,
    pub side_is_joined: [bool; MAX_PLAYERS],
    pub preferred_difficulty: [Option<Difficulty>; MAX_PLAYERS],
    pub cur_song: Option<Arc<SongData>>,
    pub cur_charts: [Option<Arc<ChartData>>; MAX_PLAYERS],
    pub cur_course: Option<Arc<CourseData>>,
    pub cur_characters: [Option<Arc<Character>>; MAX_PLAYERS],
    characters: Vec<Arc<Character>>,

    // --- stage ---
    pub current_stage_index: i32,
    pub allow_second_extra_stage: bool,
    pub coins: u32,
    pub game_seed: u32,
    pub round_seed: u32,

    // --- music position ---
    pub music_seconds: f32,
    pub song_beat: f32,
    pub cur_bps: f32,
    pub freeze: bool,
    pub past_here_we_go: bool,

    // --- statistics ---
    pub cur_stage_stats: StageStats,
    pub played_stage_stats: Vec<StageStats>,

    // --- options ---
    /// Effective options: stored options plus every started attack, rebuilt
    /// whenever the active attack set changes.
    pub player_options: [PlayerOptions; MAX_PLAYERS],
    /// What the renderer shows; drifts toward `player_options` each frame.
    pub current_player_options: [PlayerOptions; MAX_PLAYERS],
    pub stored_player_options: [PlayerOptions; MAX_PLAYERS],
    pub song_options: SongOptions,
    stored_song_options: SongOptions,
    pub changed_fail_type: bool,

    // --- attacks ---
    active_attacks: [[Attack; MAX_SIMULTANEOUS_ATTACKS]; MAX_PLAYERS],
    pub inventory: [[Attack; NUM_INVENTORY_SLOTS]; MAX_PLAYERS],
    attack_ended_this_update: [bool; MAX_PLAYERS],
    transforms_to_apply: [SmallVec<[Transform; 4]>; MAX_PLAYERS],

    // --- note skin timeline ---
    beat_to_note_skin: [SkinTimeline; MAX_PLAYERS],
    beat_to_note_skin_rev: u32,
    last_drawn_beat: [f32; MAX_PLAYERS],

    // --- battle / rave ---
    pub opponent_health_percent: f32,
    pub tug_life_percent_p1: f32,
    pub super_meter: [f32; MAX_PLAYERS],
    pub super_meter_growth_scale: [f32; MAX_PLAYERS],
    pub cpu_skill: [u8; MAX_PLAYERS],

    // --- collaborators ---
    pub bookkeeper: Bookkeeper,
    pub score_book: ScoreBook,
    save_dir: PathBuf,
}

impl GameState {
    /// Loads characters and persisted machine data from the default
    /// locations. Fails fatally if the character baseline is missing.
    pub fn new() -> Result<Self, CharacterLoadError> {
        Self::with_dirs(Path::new(CHARACTERS_DIR), Path::new(SAVE_DIR))
    }

    pub fn with_dirs(characters_dir: &Path, save_dir: &Path) -> Result<Self, CharacterLoadError> {
        let characters = character::load_characters(characters_dir)?;
        let bookkeeper = Bookkeeper::read_from_disk(save_dir);
        let mut score_book = ScoreBook::new();
        scores::load_machine_scores(&mut score_book, save_dir);

        let mut state = Self {
            prefs: config::get(),
            play_mode: None,
            style: None,
            master_player: None,
            players_can_join: false,
            side_is_joined: [false; MAX_PLAYERS],
            preferred_difficulty: Default::default(),
            cur_song: None,
            cur_charts: Default::default(),
            cur_course: None,
            cur_characters: Default::default(),
            characters,
            current_stage_index: 0,
            allow_second_extra_stage: true,
            coins: 0,
            game_seed: 0,
            round_seed: 0,
            music_seconds: MUSIC_SECONDS_INVALID,
            song_beat: 0.0,
            cur_bps: 10.0,
            freeze: false,
            past_here_we_go: false,
            cur_stage_stats: StageStats::default(),
            played_stage_stats: Vec::new(),
            player_options: Default::default(),
            current_player_options: Default::default(),
            stored_player_options: Default::default(),
            song_options: SongOptions::default(),
            stored_song_options: SongOptions::default(),
            changed_fail_type: false,
            active_attacks: Default::default(),
            inventory: Default::default(),
            attack_ended_this_update: [false; MAX_PLAYERS],
            transforms_to_apply: Default::default(),
            beat_to_note_skin: Default::default(),
            beat_to_note_skin_rev: 0,
            last_drawn_beat: [0.0; MAX_PLAYERS],
            opponent_health_percent: 1.0,
            tug_life_percent_p1: 0.5,
            super_meter: [0.0; MAX_PLAYERS],
            super_meter_growth_scale: [1.0; MAX_PLAYERS],
            cpu_skill: [5; MAX_PLAYERS],
            bookkeeper,
            score_book,
            save_dir: save_dir.to_path_buf(),
        };
        state.reset();
        Ok(state)
    }

    /// Re-snapshots the live preferences. Call before `reset()` when machine
    /// settings may have changed.
    pub fn reload_prefs(&mut self) {
        self.prefs = config::get();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Re-initializes everything that belongs to a single game session.
    /// The owning value survives; coins and loaded characters carry over.
    pub fn reset(&mut self) {
        self.style = None;
        self.players_can_join = false;
        self.side_is_joined = [false; MAX_PLAYERS];
        self.master_player = None;
        self.changed_fail_type = false;
        self.preferred_difficulty = Default::default();
        self.play_mode = None;
        self.current_stage_index = 0;
        self.allow_second_extra_stage = true;

        let mut rng = rand::rng();
        self.game_seed = rng.random();
        self.round_seed = rng.random();

        self.cur_song = None;
        self.cur_charts = Default::default();
        self.cur_course = None;

        self.reset_music_statistics();
        self.reset_stage_statistics();
        self.played_stage_stats.clear();

        for p in 0..MAX_PLAYERS {
            self.current_player_options[p].init();
            self.player_options[p].init();
            self.stored_player_options[p].init();
        }
        self.song_options.init();
        self.stored_song_options.init();

        let default_modifiers = self.prefs.default_modifiers.clone();
        for p in 0..MAX_PLAYERS {
            self.apply_modifiers(p, &default_modifiers);
        }

        for p in 0..MAX_PLAYERS {
            self.cur_characters[p] =
                if self.prefs.show_dancing_characters == ShowDancingCharacters::Random {
                    character::get_random_character(&self.characters)
                } else {
                    character::get_default_character(&self.characters)
                };
        }

        self.super_meter_growth_scale = [1.0; MAX_PLAYERS];
        self.cpu_skill = [5; MAX_PLAYERS];

        self.reset_note_skins();
        self.score_book.clear_player_scores();

        // Save accumulated stats now in case of a crash mid-session.
        self.bookkeeper.write_to_disk(&self.save_dir);
        scores::save_machine_scores(&self.score_book, &self.save_dir);
    }

    pub fn reset_music_statistics(&mut self) {
        self.music_seconds = MUSIC_SECONDS_INVALID;
        self.song_beat = 0.0;
        self.cur_bps = 10.0;
        self.freeze = false;
        self.past_here_we_go = false;
    }

    pub fn reset_stage_statistics(&mut self) {
        let old_stats = std::mem::take(&mut self.cur_stage_stats);
        if self.stage_index() > 0 && self.prefs.combo_continues_between_songs {
            for p in 0..MAX_PLAYERS {
                self.cur_stage_stats.players[p].cur_combo = old_stats.players[p].cur_combo;
            }
        }

        self.remove_all_active_attacks();
        self.remove_all_inventory();
        self.opponent_health_percent = 1.0;
        self.tug_life_percent_p1 = 0.5;
        self.super_meter = [0.0; MAX_PLAYERS];
    }

    /// Per-frame update. Per player: drift the visible options, fire queued
    /// attacks whose start time has passed, then count down started attacks.
    /// Any change to the active set rebuilds that player's options before
    /// this returns.
    pub fn update(&mut self, delta: f32) {
        for p in 0..MAX_PLAYERS {
            let target = self.player_options[p].clone();
            self.current_player_options[p].approach(&target, delta);

            let mut rebuild_player_options = false;

            // See if any delayed attacks are starting.
            for s in 0..MAX_SIMULTANEOUS_ATTACKS {
                let attack = &self.active_attacks[p][s];
                if attack.is_blank() || attack.has_started() {
                    continue;
                }
                if attack.start_second > self.music_seconds {
                    continue; // not yet
                }

                self.active_attacks[p][s].start_second = -1.0;
                self.activate_attack(p, s, true);
                rebuild_player_options = true;
            }

            // See if any attacks are ending.
            self.attack_ended_this_update[p] = false;

            for s in 0..MAX_SIMULTANEOUS_ATTACKS {
                let attack = &mut self.active_attacks[p][s];
                if attack.start_second >= 0.0 {
                    continue; // hasn't started yet
                }
                if attack.seconds_remaining <= 0.0 {
                    continue; // ended already
                }

                attack.seconds_remaining -= delta;
                if attack.seconds_remaining > 0.0 {
                    continue;
                }

                attack.clear();
                self.attack_ended_this_update[p] = true;
                rebuild_player_options = true;
            }

            if rebuild_player_options {
                self.rebuild_player_options_from_active_attacks(p);
            }
        }
    }

    /// Feeds the playback position through the song's timing data.
    pub fn update_song_position(&mut self, seconds: f32) -> Result<(), StateError> {
        let song = self.cur_song.as_ref().ok_or(StateError::NoSongPlaying)?;
        self.music_seconds = seconds;
        let (beat, bps, freeze) = song.timing.get_beat_and_bps_from_elapsed_time(seconds);
        self.song_beat = beat;
        self.cur_bps = bps;
        self.freeze = freeze;
        Ok(())
    }

    /// 0.0 at the first step, 1.0 at the last.
    pub fn get_song_percent(&self, beat: f32) -> Option<f32> {
        let song = self.cur_song.as_ref()?;
        Some((beat - song.first_beat) / song.last_beat)
    }

    // ------------------------------------------------------------------
    // Stage classification
    // ------------------------------------------------------------------

    pub fn stage_index(&self) -> i32 {
        self.current_stage_index
    }

    pub fn num_stages_left(&self) -> i32 {
        if self.is_extra_stage() || self.is_extra_stage2() {
            return 1;
        }
        if self.prefs.event_mode {
            return 999;
        }
        self.prefs.num_arcade_stages - self.current_stage_index
    }

    pub fn is_final_stage(&self) -> bool {
        if self.prefs.event_mode {
            return false;
        }
        let predicted = self.cur_song.as_ref().map_or(1, |s| s.num_stages());
        self.current_stage_index + predicted == self.prefs.num_arcade_stages
    }

    pub fn is_extra_stage(&self) -> bool {
        !self.prefs.event_mode && self.current_stage_index == self.prefs.num_arcade_stages
    }

    pub fn is_extra_stage2(&self) -> bool {
        !self.prefs.event_mode && self.current_stage_index == self.prefs.num_arcade_stages + 1
    }

    pub fn stage_text(&self) -> String {
        match self.play_mode {
            Some(PlayMode::Oni) => return "oni".to_string(),
            Some(PlayMode::Nonstop) => return "nonstop".to_string(),
            Some(PlayMode::Endless) => return "endless".to_string(),
            _ => {}
        }
        if self.prefs.event_mode {
            "event".to_string()
        } else if self.is_final_stage() {
            "final".to_string()
        } else if self.is_extra_stage() {
            "extra1".to_string()
        } else if self.is_extra_stage2() {
            "extra2".to_string()
        } else {
            format!("{}", self.current_stage_index + 1)
        }
    }

    pub fn all_stage_texts(&self) -> Vec<String> {
        let mut out = vec![
            "oni".to_string(),
            "nonstop".to_string(),
            "endless".to_string(),
            "event".to_string(),
            "final".to_string(),
            "extra1".to_string(),
            "extra2".to_string(),
        ];
        for stage in 0..self.prefs.num_arcade_stages {
            out.push(format!("{}", stage + 1));
        }
        out
    }

    /// Index of the current song within a course; `songs_played` includes
    /// the current song, so it's 1-based.
    pub fn course_song_index(&self) -> i32 {
        let mut index = 0;
        for p in 0..MAX_PLAYERS {
            if self.is_player_enabled(p) {
                index = index.max(self.cur_stage_stats.players[p].songs_played - 1);
            }
        }
        index
    }

    pub fn has_earned_extra_stage(&self) -> bool {
        if self.prefs.event_mode || !self.prefs.allow_extra_stage {
            return false;
        }
        if self.play_mode != Some(PlayMode::Arcade) {
            return false;
        }
        if !(self.is_final_stage() || self.is_extra_stage()) {
            return false;
        }

        for p in 0..MAX_PLAYERS {
            if !self.is_player_enabled(p) {
                continue;
            }
            let Some(chart) = &self.cur_charts[p] else {
                continue;
            };
            if chart.difficulty != Difficulty::Hard && chart.difficulty != Difficulty::Challenge {
                continue; // not hard enough!
            }
            // With "pick extra stage" enabled, only grant EX2 if the chosen
            // stage was the one we would have picked.
            if self.prefs.pick_extra_stage
                && self.is_extra_stage()
                && !self.allow_second_extra_stage
            {
                continue;
            }
            if self.cur_stage_stats.grade(p) >= Grade::AA {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub fn style(&self) -> Result<Style, StateError> {
        self.style.ok_or(StateError::StyleNotSet)
    }

    pub fn is_human_player(&self, pn: PlayerNumber) -> bool {
        let Some(style) = self.style else {
            // No style chosen yet. On join-capable screens only joined sides
            // count; everywhere else everyone does.
            return if self.players_can_join {
                self.side_is_joined[pn]
            } else {
                true
            };
        };

        match style.style_type() {
            StyleType::TwoPlayersTwoCredits => true,
            StyleType::OnePlayerOneCredit | StyleType::OnePlayerTwoCredits => {
                self.master_player == Some(pn)
            }
        }
    }

    pub fn is_player_enabled(&self, pn: PlayerNumber) -> bool {
        // In battle and rave all sides are present; non-humans are CPUs.
        if matches!(self.play_mode, Some(PlayMode::Battle) | Some(PlayMode::Rave)) {
            return true;
        }
        self.is_human_player(pn)
    }

    pub fn is_cpu_player(&self, pn: PlayerNumber) -> bool {
        self.is_player_enabled(pn) && !self.is_human_player(pn)
    }

    pub fn first_human_player(&self) -> Result<PlayerNumber, StateError> {
        (0..MAX_PLAYERS)
            .find(|&p| self.is_human_player(p))
            .ok_or(StateError::NoHumanPlayers)
    }

    pub fn is_course_mode(&self) -> bool {
        matches!(
            self.play_mode,
            Some(PlayMode::Oni) | Some(PlayMode::Nonstop) | Some(PlayMode::Endless)
        )
    }

    pub fn is_battle_mode(&self) -> bool {
        self.play_mode == Some(PlayMode::Battle)
    }

    /// Highest dance-point total, or `None` on a draw. Keeps the original
    /// early-return rule: the scan bails on the first tied pair it sees, so
    /// with more than two players a partial tie short-circuits the scan.
    pub fn get_best_player(&self) -> Option<PlayerNumber> {
        let points = |p: PlayerNumber| self.cur_stage_stats.players[p].actual_dance_points;
        let mut winner = 0;
        for p in 1..MAX_PLAYERS {
            if points(p) == points(winner) {
                return None; // draw
            }
            if points(p) > points(winner) {
                winner = p;
            }
        }
        Some(winner)
    }

    pub fn stage_result(&self, pn: PlayerNumber) -> Result<StageResult, StateError> {
        if matches!(self.play_mode, Some(PlayMode::Battle) | Some(PlayMode::Rave)) {
            return match pn {
                0 => Ok(if self.tug_life_percent_p1 >= 0.5 {
                    StageResult::Win
                } else {
                    StageResult::Lose
                }),
                1 => Ok(if self.tug_life_percent_p1 < 0.5 {
                    StageResult::Win
                } else {
                    StageResult::Lose
                }),
                _ => Err(StateError::InvalidPlayer),
            };
        }
        Ok(if self.get_best_player() == Some(pn) {
            StageResult::Win
        } else {
            StageResult::Lose
        })
    }

    /// Rolls up the stats shown on the final evaluation: the latest three
    /// passed normal stages plus any passed extra stages. Radar values are
    /// averaged over the included songs.
    pub fn final_eval_stats_and_songs(&self) -> (StageStats, Vec<Arc<SongData>>) {
        let mut stats_out = StageStats::default();
        let mut songs_out: Vec<Arc<SongData>> = Vec::new();

        let mut passed_regular_songs_left = 3;
        for s in self.played_stage_stats.iter().rev() {
            if !s.one_passed() {
                continue;
            }
            if s.stage_type == StageType::Normal {
                if passed_regular_songs_left == 0 {
                    break;
                }
                passed_regular_songs_left -= 1;
            }

            stats_out.add_stats(s);
            if let Some(song) = &s.song {
                songs_out.insert(0, song.clone());
            }
        }

        if songs_out.is_empty() {
            return (stats_out, songs_out);
        }

        let count = songs_out.len() as f32;
        for p in 0..MAX_PLAYERS {
            if !self.is_player_enabled(p) {
                continue;
            }
            for r in 0..NUM_RADAR_CATEGORIES {
                stats_out.players[p].radar_possible[r] /= count;
                stats_out.players[p].radar_actual[r] /= count;
            }
        }

        (stats_out, songs_out)
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    /// Folds a modifier string into one player's options and the shared
    /// song options.
    pub fn apply_modifiers(&mut self, pn: PlayerNumber, modifiers: &str) {
        let old_fail_type = self.song_options.fail_type;

        self.player_options[pn].from_string(modifiers);
        self.song_options.from_string(modifiers);

        if old_fail_type != self.song_options.fail_type {
            self.changed_fail_type = true;
        }
    }

    /// Stores the players' preferred options. Called at the very beginning
    /// of gameplay.
    pub fn store_selected_options(&mut self) {
        self.stored_player_options = self.player_options.clone();
        self.stored_song_options = self.song_options.clone();
    }

    /// Restores the preferred options, so modifiers from one song don't
    /// carry into the next.
    pub fn restore_selected_options(&mut self) {
        self.player_options = self.stored_player_options.clone();
        self.song_options = self.stored_song_options.clone();
    }

    /// Clamps the fail mode for low difficulties after the charts have been
    /// finalized: easy charts never fail mid-song, and beginner charts on
    /// the first stage never fail at all.
    pub fn adjust_fail_type(&mut self) {
        if self.is_course_mode() {
            return;
        }
        // If the player changed the fail mode explicitly, leave it alone.
        if self.changed_fail_type {
            return;
        }

        // Reset the fail type to the default before clamping.
        let mut default_options = SongOptions::default();
        default_options.from_string(&self.prefs.default_modifiers);
        self.song_options.fail_type = default_options.fail_type;

        let mut easiest: Option<Difficulty> = None;
        for p in 0..MAX_PLAYERS {
            if !self.is_human_player(p) {
                continue;
            }
            if let Some(chart) = &self.cur_charts[p] {
                easiest = Some(match easiest {
                    Some(d) => d.min(chart.difficulty),
                    None => chart.difficulty,
                });
            }
        }
        let Some(easiest) = easiest else {
            return;
        };

        if easiest <= Difficulty::Easy {
            self.song_options.fail_type = self.song_options.fail_type.max(FailType::EndOfSong);
        }
        if easiest == Difficulty::Beginner
            && !self.prefs.event_mode
            && self.current_stage_index == 0
        {
            self.song_options.fail_type = self.song_options.fail_type.max(FailType::Off);
        }
    }

    pub fn show_marvelous(&self) -> bool {
        match self.prefs.marvelous_timing {
            2 => true,
            1 => self.is_course_mode(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    pub fn characters(&self) -> Vec<Arc<Character>> {
        character::selectable_characters(&self.characters)
    }

    pub fn default_character(&self) -> Option<Arc<Character>> {
        character::get_default_character(&self.characters)
    }

    // ------------------------------------------------------------------
    // Attacks
    // ------------------------------------------------------------------

    pub fn active_attacks(&self, pn: PlayerNumber) -> &[Attack; MAX_SIMULTANEOUS_ATTACKS] {
        &self.active_attacks[pn]
    }

    pub fn attack_ended_this_update(&self, pn: PlayerNumber) -> bool {
        self.attack_ended_this_update[pn]
    }

    /// Hands gameplay the transforms accumulated by attack activation and
    /// clears the list.
    pub fn take_transforms_to_apply(&mut self, pn: PlayerNumber) -> SmallVec<[Transform; 4]> {
        std::mem::take(&mut self.transforms_to_apply[pn])
    }

    /// Launches an attack, or queues it if `start_second` is non-negative.
    /// With every slot busy the attack is dropped and reported; existing
    /// slots are never disturbed.
    pub fn launch_attack(&mut self, target: PlayerNumber, attack: Attack) {
        trace!(
            "Launch attack '{}' against P{} at {}",
            attack.modifiers,
            target + 1,
            attack.start_second
        );

        for s in 0..MAX_SIMULTANEOUS_ATTACKS {
            if self.active_attacks[target][s].is_blank() {
                self.active_attacks[target][s] = attack;
                self.activate_attack(target, s, false);
                self.rebuild_player_options_from_active_attacks(target);
                return;
            }
        }

        warn!(
            "Couldn't launch attack '{}' against P{}: no empty attack slots",
            attack.modifiers,
            target + 1
        );
    }

    /// Classifies a freshly stored or newly due attack and applies its
    /// side effects: transform accumulation and note-skin timeline edits.
    fn activate_attack(
        &mut self,
        target: PlayerNumber,
        slot: usize,
        activating_delayed_attack: bool,
    ) {
        #[derive(PartialEq)]
        enum ActivationKind {
            QueueForLater,
            ActivateQueued,
            StartImmediately,
        }

        let attack = self.active_attacks[target][slot].clone();
        let kind = if activating_delayed_attack {
            debug_assert!(attack.start_second < 0.0);
            ActivationKind::ActivateQueued
        } else if attack.start_second >= 0.0 {
            ActivationKind::QueueForLater
        } else {
            ActivationKind::StartImmediately
        };

        // Peek at the effect being applied. Transforms go onto a list the
        // player consumes on its next update.
        let ops = options::parse_mods(&attack.modifiers);
        let transform = ops.iter().rev().find_map(|op| match op {
            options::ModOp::Transform(t) => Some(*t),
            _ => None,
        });
        let note_skin = ops.iter().rev().find_map(|op| match op {
            options::ModOp::NoteSkin(skin) => Some(skin.clone()),
            _ => None,
        });

        if kind != ActivationKind::QueueForLater
            && let Some(t) = transform
            && t != Transform::None
        {
            self.transforms_to_apply[target].push(t);
        }

        let Some(skin) = note_skin else {
            return;
        };
        let Some(song) = self.cur_song.clone() else {
            debug!("Attack names skin '{skin}' with no song playing; skipping timeline edit");
            return;
        };

        match kind {
            ActivationKind::QueueForLater => {
                // Precompute the future window so renderers approaching it
                // can prefetch the skin.
                let start_beat = song.timing.get_beat_from_elapsed_time(attack.start_second);
                let end_beat = song
                    .timing
                    .get_beat_from_elapsed_time(attack.start_second + attack.seconds_remaining);
                trace!("attack skin '{skin}' queued at {start_beat}..{end_beat}");
                self.set_note_skin_for_beat_range(target, &skin, start_beat, end_beat);
            }
            ActivationKind::ActivateQueued | ActivationKind::StartImmediately => {
                // Changing skins on the fly: place the window past what's
                // already on screen so visible arrows don't snap.
                let (start_beat, end_beat) =
                    self.get_undisplayed_beats(target, attack.seconds_remaining);
                self.set_note_skin_for_beat_range(target, &skin, start_beat, end_beat);
            }
        }
    }

    pub fn remove_active_attacks_for_player(&mut self, pn: PlayerNumber, level: AttackLevel) {
        for s in 0..MAX_SIMULTANEOUS_ATTACKS {
            if level != AttackLevel::AllLevels && self.active_attacks[pn][s].level != level {
                continue;
            }
            self.active_attacks[pn][s].clear();
        }
        self.rebuild_player_options_from_active_attacks(pn);
    }

    pub fn remove_all_active_attacks(&mut self) {
        for p in 0..MAX_PLAYERS {
            self.remove_active_attacks_for_player(p, AttackLevel::AllLevels);
        }
    }

    pub fn remove_all_inventory(&mut self) {
        for p in 0..MAX_PLAYERS {
            for s in 0..NUM_INVENTORY_SLOTS {
                self.inventory[p][s].clear();
            }
        }
    }

    /// Rebuilds one player's effective options: stored options plus every
    /// started attack's modifiers, folded in slot order.
    pub fn rebuild_player_options_from_active_attacks(&mut self, pn: PlayerNumber) {
        let mut po = self.stored_player_options[pn].clone();
        for s in 0..MAX_SIMULTANEOUS_ATTACKS {
            let attack = &self.active_attacks[pn][s];
            if !attack.has_started() {
                continue; // pending attacks don't count
            }
            po.from_string(&attack.modifiers);
        }
        self.player_options[pn] = po;
    }

    pub fn get_sum_of_active_attack_levels(&self, pn: PlayerNumber) -> u32 {
        let mut sum = 0;
        for attack in &self.active_attacks[pn] {
            if attack.seconds_remaining > 0.0
                && let Some(index) = attack.level.index()
            {
                sum += index as u32;
            }
        }
        sum
    }

    // ------------------------------------------------------------------
    // Note skin timeline
    // ------------------------------------------------------------------

    pub fn reset_note_skins(&mut self) {
        for pn in 0..MAX_PLAYERS {
            self.beat_to_note_skin[pn].clear();
            self.beat_to_note_skin[pn].insert(
                OrderedFloat(NOTE_SKIN_SENTINEL_BEAT),
                self.player_options[pn].note_skin.clone(),
            );
        }
        self.beat_to_note_skin_rev = 0;
    }

    /// Monotonic revision; consumers compare it to detect timeline changes
    /// without walking the maps.
    pub fn note_skin_revision(&self) -> u32 {
        self.beat_to_note_skin_rev
    }

    /// Step-function lookup: the skin at the greatest key at or before
    /// `beat`.
    pub fn get_note_skin_at(&self, pn: PlayerNumber, beat: f32) -> Option<&str> {
        self.beat_to_note_skin[pn]
            .range(..=OrderedFloat(beat))
            .next_back()
            .map(|(_, skin)| skin.as_str())
    }

    /// Claims `[start_beat, end_beat]` for `skin`. Existing keys inside the
    /// closed interval are erased first so no stale fragment of a previous
    /// window survives, and the end key reverts to the player's base skin.
    pub fn set_note_skin_for_beat_range(
        &mut self,
        pn: PlayerNumber,
        skin: &str,
        start_beat: f32,
        end_beat: f32,
    ) {
        let timeline = &mut self.beat_to_note_skin[pn];

        let stale: Vec<OrderedFloat<f32>> = timeline
            .range(OrderedFloat(start_beat)..=OrderedFloat(end_beat))
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            timeline.remove(&key);
        }

        timeline.insert(OrderedFloat(start_beat), skin.to_string());
        // Return to the base skin after the window.
        timeline.insert(
            OrderedFloat(end_beat),
            self.stored_player_options[pn].note_skin.clone(),
        );

        self.beat_to_note_skin_rev += 1;
    }

    pub fn set_last_drawn_beat(&mut self, pn: PlayerNumber, beat: f32) {
        self.last_drawn_beat[pn] = beat;
    }

    /// Picks a beat window not yet on screen, so a skin change scrolls in
    /// instead of snapping visible notes. The start is the earlier of two
    /// measures past the current beat and the last beat already drawn,
    /// rounded up to the next whole beat; the end lands `total_seconds`
    /// later, rounded the same way.
    pub fn get_undisplayed_beats(&self, pn: PlayerNumber, total_seconds: f32) -> (f32, f32) {
        let mut start_beat =
            (self.song_beat + BEATS_PER_MEASURE * 2.0).min(self.last_drawn_beat[pn]);
        start_beat = start_beat.trunc() + 1.0;

        let Some(song) = self.cur_song.as_ref() else {
            return (start_beat, start_beat);
        };
        let start_second = song.timing.get_elapsed_time_from_beat(start_beat);
        let end_second = start_second + total_seconds;
        let end_beat = song.timing.get_beat_from_elapsed_time(end_second).trunc() + 1.0;
        (start_beat, end_beat)
    }

    /// Every skin the renderer could need this stage: each player's chosen
    /// skin, anything in the timelines, and in the versus modes anything
    /// the characters' attacks could apply.
    pub fn get_all_used_note_skins(&self) -> Vec<String> {
        let mut out = Vec::new();
        for pn in 0..MAX_PLAYERS {
            out.push(self.player_options[pn].note_skin.clone());

            if matches!(self.play_mode, Some(PlayMode::Battle) | Some(PlayMode::Rave))
                && let Some(character) = &self.cur_characters[pn]
            {
                for level in &character.attacks {
                    for attack_mods in level {
                        for op in options::parse_mods(attack_mods) {
                            if let options::ModOp::NoteSkin(skin) = op {
                                out.push(skin);
                            }
                        }
                    }
                }
            }

            for skin in self.beat_to_note_skin[pn].values() {
                out.push(skin.clone());
            }
        }
        out.sort();
        out.dedup();
        out
    }

    // ------------------------------------------------------------------
    // Ranking
    // ------------------------------------------------------------------

    /// Scans the relevant high-score tables for records still carrying this
    /// player's fill-in marker and returns them with opaque write-back
    /// handles for `store_ranking_name`.
    pub fn get_ranking_feats(&self, pn: PlayerNumber) -> Result<Vec<RankingFeat>, StateError> {
        let mut feats = Vec::new();
        if !self.is_human_player(pn) {
            return Ok(feats);
        }
        let marker = RANKING_TO_FILL_IN_MARKER[pn];

        match self.play_mode.ok_or(StateError::PlayModeNotSet)? {
            PlayMode::Arcade => {
                let steps_type = self.style()?.steps_type();

                // Unique (song, chart) pairs played this session, ordered by
                // owning-object identity so double plays count once.
                let mut song_and_charts: Vec<(Arc<SongData>, Arc<ChartData>)> = self
                    .played_stage_stats
                    .iter()
                    .filter_map(|s| {
                        let song = s.song.clone()?;
                        let chart = s.players[pn].chart.clone()?;
                        Some((song, chart))
                    })
                    .collect();
                song_and_charts.sort_by_key(|(song, chart)| {
                    (Arc::as_ptr(song) as usize, Arc::as_ptr(chart) as usize)
                });
                song_and_charts.dedup_by(|a, b| {
                    Arc::ptr_eq(&a.0, &b.0) && Arc::ptr_eq(&a.1, &b.1)
                });

                for (song, chart) in &song_and_charts {
                    // Machine records.
                    let machine = self
                        .score_book
                        .song_scores(&chart.chart_key, ScoreSlot::Machine);
                    for (rank, entry) in machine.iter().enumerate() {
                        if entry.name != marker {
                            continue;
                        }
                        feats.push(RankingFeat {
                            kind: FeatKind::Song,
                            description: format!(
                                "MR #{} in {} {}",
                                rank + 1,
                                song.display_title(true),
                                chart.difficulty
                            ),
                            score: if self.prefs.percentage_scoring {
                                entry.percent_dp
                            } else {
                                entry.score as f32
                            },
                            grade: entry.grade,
                            banner: song.background_path.clone(),
                            target: FeatTarget::Song {
                                chart_key: chart.chart_key.clone(),
                                slot: ScoreSlot::Machine,
                                rank,
                            },
                        });
                    }

                    // Personal records.
                    let personal = self
                        .score_book
                        .song_scores(&chart.chart_key, ScoreSlot::Player(pn));
                    for (rank, entry) in personal.iter().enumerate() {
                        if entry.name != marker {
                            continue;
                        }
                        feats.push(RankingFeat {
                            kind: FeatKind::Song,
                            description: format!(
                                "PR #{} in {} {}",
                                rank + 1,
                                song.display_title(true),
                                chart.difficulty
                            ),
                            score: entry.score as f32,
                            grade: entry.grade,
                            banner: song.background_path.clone(),
                            target: FeatTarget::Song {
                                chart_key: chart.chart_key.clone(),
                                slot: ScoreSlot::Player(pn),
                                rank,
                            },
                        });
                    }
                }

                // Category records.
                let (eval_stats, _) = self.final_eval_stats_and_songs();
                for category in RankingCategory::ALL {
                    let list = self.score_book.category_scores(steps_type, category);
                    for (rank, entry) in list.iter().enumerate() {
                        if entry.name != marker {
                            continue;
                        }
                        feats.push(RankingFeat {
                            kind: FeatKind::Ranking,
                            description: format!(
                                "#{} in Type {} ({})",
                                rank + 1,
                                category.letter(),
                                eval_stats.players[pn].meter
                            ),
                            score: entry.score as f32,
                            grade: Grade::NoData,
                            banner: None,
                            target: FeatTarget::Category {
                                steps_type,
                                category,
                                rank,
                            },
                        });
                    }
                }
            }
            PlayMode::Battle | PlayMode::Rave => {}
            PlayMode::Nonstop | PlayMode::Oni | PlayMode::Endless => {
                let steps_type = self.style()?.steps_type();
                let course = self.cur_course.as_ref().ok_or(StateError::NoCourseSelected)?;
                let list = self
                    .score_book
                    .course_scores(&course.course_key, steps_type);
                for (rank, entry) in list.iter().enumerate() {
                    if entry.name != marker {
                        continue;
                    }
                    feats.push(RankingFeat {
                        kind: FeatKind::Course,
                        description: format!("No. {} in {}", rank + 1, course.name),
                        score: entry.score as f32,
                        grade: Grade::NoData,
                        banner: course.banner_path.clone(),
                        target: FeatTarget::Course {
                            course_key: course.course_key.clone(),
                            steps_type,
                            rank,
                        },
                    });
                }
            }
        }

        Ok(feats)
    }

    /// Fills the player's pending records with `name`, after blanking it if
    /// any blocklisted substring matches.
    pub fn store_ranking_name(&mut self, pn: PlayerNumber, name: &str) -> Result<(), StateError> {
        let blacklist = self.save_dir.join(NAMES_BLACKLIST_FILE);
        let name = scores::filter_ranking_name(name, &blacklist);

        let feats = self.get_ranking_feats(pn)?;
        for feat in &feats {
            if !self.score_book.set_name_at(&feat.target, &name) {
                warn!("Stale ranking feat handle {:?}; name not stored", feat.target);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Coins
    // ------------------------------------------------------------------

    pub fn insert_coin(&mut self) {
        self.coins += 1;
        self.bookkeeper.coin_inserted();
    }
}

#[cfg(test)]
mod tests {
    use super::{GameState, PlayMode, StateError, Style};
    use crate::config::Prefs;
    use crate::game::attack::Attack;
    use crate::game::chart::{ChartData, Difficulty, StepsType};
    use crate::game::scores::{Grade, HighScore, RANKING_TO_FILL_IN_MARKER, ScoreSlot};
    use crate::game::song::{SongData, TimingData};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Builds a state with a temp character/save dir and known preferences,
    /// isolated from the global config.
    fn test_state() -> (GameState, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let characters_dir = tmp.path().join("characters");
        std::fs::create_dir_all(characters_dir.join("default")).unwrap();
        let save_dir = tmp.path().join("save");

        let mut state = GameState::with_dirs(&characters_dir, &save_dir).unwrap();
        state.prefs = Prefs::default();
        state.reset();
        (state, tmp)
    }

    /// 120 BPM constant-tempo song, one arcade stage long.
    fn test_song() -> Arc<SongData> {
        let mut song = SongData::new("Test Song", "Artist", TimingData::with_bpm(120.0));
        song.length_seconds = 100.0;
        song.last_beat = 200.0;
        Arc::new(song)
    }

    fn join_single(state: &mut GameState) {
        state.play_mode = Some(PlayMode::Arcade);
        state.style = Some(Style::Single);
        state.master_player = Some(0);
    }

    #[test]
    fn launched_attacks_fold_into_player_options_in_slot_order() {
        let (mut state, _tmp) = test_state();
        state.launch_attack(0, Attack::immediate("drunk", 10.0));
        state.launch_attack(0, Attack::immediate("50% drunk, 2x", 10.0));
        // Later slots win per field.
        assert!((state.player_options[0].drunk - 0.5).abs() < 1e-6);
        assert!((state.player_options[0].scroll_speed - 2.0).abs() < 1e-6);
        // The other player is untouched.
        assert!(state.player_options[1].drunk.abs() < 1e-6);
    }

    #[test]
    fn fourth_attack_is_dropped_without_disturbing_slots() {
        let (mut state, _tmp) = test_state();
        state.launch_attack(0, Attack::immediate("drunk", 10.0));
        state.launch_attack(0, Attack::immediate("dizzy", 10.0));
        state.launch_attack(0, Attack::immediate("tipsy", 10.0));
        state.launch_attack(0, Attack::immediate("flip", 10.0));

        let slots = state.active_attacks(0);
        assert_eq!(slots[0].modifiers, "drunk");
        assert_eq!(slots[1].modifiers, "dizzy");
        assert_eq!(slots[2].modifiers, "tipsy");
        assert!(state.player_options[0].flip.abs() < 1e-6, "dropped attack must not apply");
    }

    #[test]
    fn delayed_attack_waits_for_its_start_second() {
        let (mut state, _tmp) = test_state();
        state.cur_song = Some(test_song());
        state.launch_attack(0, Attack::delayed("drunk", 5.0, 3.0));
        assert!(
            state.player_options[0].drunk.abs() < 1e-6,
            "pending attacks must not affect options"
        );

        state.update_song_position(4.9).unwrap();
        state.update(0.016);
        assert!(state.player_options[0].drunk.abs() < 1e-6);

        state.update_song_position(5.01).unwrap();
        state.update(0.016);
        assert!(state.active_attacks(0)[0].has_started());
        assert!((state.player_options[0].drunk - 1.0).abs() < 1e-6);
    }

    #[test]
    fn expired_attack_clears_its_slot_and_reverts_options() {
        let (mut state, _tmp) = test_state();
        state.launch_attack(0, Attack::immediate("drunk", 1.0));
        assert!((state.player_options[0].drunk - 1.0).abs() < 1e-6);

        state.update(1.5);
        assert!(state.attack_ended_this_update(0));
        assert!(state.active_attacks(0)[0].is_blank());
        assert!(state.player_options[0].drunk.abs() < 1e-6, "options must revert");

        // The freed slot is reusable.
        state.launch_attack(0, Attack::immediate("dizzy", 5.0));
        assert_eq!(state.active_attacks(0)[0].modifiers, "dizzy");
        state.update(0.016);
        assert!(!state.attack_ended_this_update(0));
    }

    #[test]
    fn remove_all_active_attacks_restores_stored_options() {
        let (mut state, _tmp) = test_state();
        state.apply_modifiers(0, "2x, mirror");
        state.store_selected_options();
        state.launch_attack(0, Attack::immediate("drunk, 4x", 10.0));
        assert!((state.player_options[0].scroll_speed - 4.0).abs() < 1e-6);

        state.remove_all_active_attacks();
        assert!((state.player_options[0].scroll_speed - 2.0).abs() < 1e-6);
        assert!(state.player_options[0].drunk.abs() < 1e-6);
    }

    #[test]
    fn store_and_restore_options_round_trip() {
        let (mut state, _tmp) = test_state();
        state.apply_modifiers(0, "3x, drunk");
        state.store_selected_options();
        state.apply_modifiers(0, "no drunk, 1x");
        state.restore_selected_options();
        assert!((state.player_options[0].scroll_speed - 3.0).abs() < 1e-6);
        assert!((state.player_options[0].drunk - 1.0).abs() < 1e-6);
    }

    #[test]
    fn note_skin_windows_overwrite_overlapping_keys() {
        let (mut state, _tmp) = test_state();
        assert_eq!(state.note_skin_revision(), 0);

        state.set_note_skin_for_beat_range(0, "metal", 10.0, 20.0);
        state.set_note_skin_for_beat_range(0, "cel", 15.0, 25.0);
        assert_eq!(state.note_skin_revision(), 2);

        assert_eq!(state.get_note_skin_at(0, 5.0), Some("default"));
        assert_eq!(state.get_note_skin_at(0, 12.0), Some("metal"));
        // The second window erased the first one's end key at beat 20.
        assert_eq!(state.get_note_skin_at(0, 16.0), Some("cel"));
        assert_eq!(state.get_note_skin_at(0, 20.0), Some("cel"));
        assert_eq!(state.get_note_skin_at(0, 25.5), Some("default"));
    }

    #[test]
    fn skin_attack_lands_past_the_drawn_beats() {
        let (mut state, _tmp) = test_state();
        state.cur_song = Some(test_song());
        state.update_song_position(0.0).unwrap();
        state.set_last_drawn_beat(0, 100.0);

        state.launch_attack(0, Attack::immediate("metal", 10.0));
        // 2 beats/sec: window starts at min(0+8, 100).trunc()+1 = 9,
        // ends 10s later at beat 29.trunc()+1 = 30.
        assert_eq!(state.get_note_skin_at(0, 9.0), Some("metal"));
        assert_eq!(state.get_note_skin_at(0, 8.5), Some("default"));
        assert_eq!(state.get_note_skin_at(0, 30.0), Some("default"));
        assert!(state.get_all_used_note_skins().contains(&"metal".to_string()));
    }

    #[test]
    fn queued_skin_attack_marks_its_window_before_and_after_firing() {
        let (mut state, _tmp) = test_state();
        state.cur_song = Some(test_song());
        state.update_song_position(0.0).unwrap();
        state.set_last_drawn_beat(0, 100.0);

        state.launch_attack(0, Attack::delayed("metal", 5.0, 3.0));
        // 2 beats/sec: the future window 10..16 is pre-inserted at queue time.
        assert_eq!(state.note_skin_revision(), 1);
        assert_eq!(state.get_note_skin_at(0, 10.0), Some("metal"));
        assert_eq!(state.get_note_skin_at(0, 16.0), Some("default"));
        assert_eq!(state.player_options[0].note_skin, "default");

        state.update_song_position(5.01).unwrap();
        state.update(0.016);
        // Firing re-stamps a window past the drawn beats and bumps the
        // revision again: min(10.02 + 8, 100).trunc()+1 = 19, ending 3s
        // (6 beats) later rounded the same way.
        assert_eq!(state.note_skin_revision(), 2);
        assert_eq!(state.get_note_skin_at(0, 19.0), Some("metal"));
        assert_eq!(state.get_note_skin_at(0, 26.0), Some("default"));
        assert_eq!(state.player_options[0].note_skin, "metal");
    }

    #[test]
    fn undisplayed_beats_round_up_to_whole_beats() {
        let (mut state, _tmp) = test_state();
        state.cur_song = Some(test_song());
        state.update_song_position(0.0).unwrap();
        state.set_last_drawn_beat(0, 100.0);
        let (start, end) = state.get_undisplayed_beats(0, 10.0);
        assert!((start - 9.0).abs() < 1e-4, "got start {start}");
        assert!((end - 30.0).abs() < 1e-4, "got end {end}");

        // A nearer last-drawn beat caps the window start.
        state.set_last_drawn_beat(0, 4.5);
        let (start, _) = state.get_undisplayed_beats(0, 10.0);
        assert!((start - 5.0).abs() < 1e-4, "got start {start}");
    }

    #[test]
    fn best_player_is_none_on_a_draw() {
        let (mut state, _tmp) = test_state();
        state.cur_stage_stats.players[0].actual_dance_points = 500;
        state.cur_stage_stats.players[1].actual_dance_points = 500;
        assert_eq!(state.get_best_player(), None);

        state.cur_stage_stats.players[1].actual_dance_points = 600;
        assert_eq!(state.get_best_player(), Some(1));
    }

    #[test]
    fn stage_classification_follows_the_arcade_counter() {
        let (mut state, _tmp) = test_state();
        state.prefs.num_arcade_stages = 3;
        state.cur_song = Some(test_song());

        assert_eq!(state.stage_text(), "1");
        assert_eq!(state.num_stages_left(), 3);

        state.current_stage_index = 2;
        assert!(state.is_final_stage());
        assert_eq!(state.stage_text(), "final");

        state.current_stage_index = 3;
        assert!(state.is_extra_stage());
        assert_eq!(state.stage_text(), "extra1");
        assert_eq!(state.num_stages_left(), 1);

        state.prefs.event_mode = true;
        assert!(!state.is_extra_stage());
        assert_eq!(state.stage_text(), "event");
        assert_eq!(state.num_stages_left(), 999);
    }

    #[test]
    fn extra_stage_needs_a_hard_chart_and_an_aa() {
        let (mut state, _tmp) = test_state();
        join_single(&mut state);
        state.prefs.num_arcade_stages = 3;
        state.current_stage_index = 2;
        state.cur_song = Some(test_song());
        state.cur_charts[0] = Some(Arc::new(ChartData::new(
            StepsType::DanceSingle,
            Difficulty::Hard,
            9,
            "chart-hard",
        )));
        state.cur_stage_stats.players[0].possible_dance_points = 100;
        state.cur_stage_stats.players[0].actual_dance_points = 95;
        state.cur_stage_stats.players[0].songs_played = 1;
        assert!(state.has_earned_extra_stage());

        // An easy chart never earns the extra stage.
        state.cur_charts[0] = Some(Arc::new(ChartData::new(
            StepsType::DanceSingle,
            Difficulty::Easy,
            3,
            "chart-easy",
        )));
        assert!(!state.has_earned_extra_stage());
    }

    #[test]
    fn single_style_enables_only_the_master_side() {
        let (mut state, _tmp) = test_state();
        join_single(&mut state);
        assert!(state.is_human_player(0));
        assert!(!state.is_human_player(1));
        assert!(!state.is_player_enabled(1));
        assert_eq!(state.first_human_player().unwrap(), 0);

        // Battle mode makes the other side a CPU.
        state.play_mode = Some(PlayMode::Battle);
        assert!(state.is_player_enabled(1));
        assert!(state.is_cpu_player(1));
        assert!(!state.is_cpu_player(0));
    }

    #[test]
    fn ranking_feats_find_markers_and_store_names() {
        let (mut state, _tmp) = test_state();
        join_single(&mut state);

        let song = test_song();
        let chart = Arc::new(ChartData::new(
            StepsType::DanceSingle,
            Difficulty::Hard,
            9,
            "chart-hard",
        ));
        let mut played = crate::game::stage_stats::StageStats::default();
        played.song = Some(song.clone());
        played.players[0].chart = Some(chart.clone());
        played.players[0].songs_played = 1;
        state.played_stage_stats.push(played.clone());
        // A replay of the same chart must not double-count the feat scan.
        state.played_stage_stats.push(played);

        state.score_book.add_song_score(
            "chart-hard",
            ScoreSlot::Machine,
            HighScore {
                name: RANKING_TO_FILL_IN_MARKER[0].to_string(),
                score: 9000,
                percent_dp: 0.95,
                grade: Grade::AA,
            },
        );

        let feats = state.get_ranking_feats(0).unwrap();
        assert_eq!(feats.len(), 1);
        assert!(feats[0].description.contains("Test Song"));

        state.store_ranking_name(0, "abc").unwrap();
        let list = state.score_book.song_scores("chart-hard", ScoreSlot::Machine);
        assert_eq!(list[0].name, "ABC");
    }

    #[test]
    fn ranking_feats_require_a_play_mode() {
        let (mut state, _tmp) = test_state();
        assert_eq!(
            state.get_ranking_feats(0).unwrap_err(),
            StateError::PlayModeNotSet
        );
    }

    #[test]
    fn reset_flushes_bookkeeping_to_disk() {
        let (mut state, tmp) = test_state();
        state.insert_coin();
        assert_eq!(state.coins, 1);
        state.reset();
        assert!(tmp.path().join("save").join("bookkeeping.json").exists());
        assert_eq!(state.bookkeeper.coins_total(), 1, "coins survive the reset");
    }

    #[test]
    fn update_song_position_drives_beat_and_bps() {
        let (mut state, _tmp) = test_state();
        assert_eq!(
            state.update_song_position(1.0),
            Err(StateError::NoSongPlaying)
        );

        state.cur_song = Some(test_song());
        state.update_song_position(3.0).unwrap();
        assert!((state.song_beat - 6.0).abs() < 1e-4);
        assert!((state.cur_bps - 2.0).abs() < 1e-6);
        assert!(!state.freeze);
    }

    #[test]
    fn adjust_fail_type_relaxes_failure_for_easy_charts() {
        use crate::game::options::FailType;
        let (mut state, _tmp) = test_state();
        join_single(&mut state);
        state.cur_charts[0] = Some(Arc::new(ChartData::new(
            StepsType::DanceSingle,
            Difficulty::Easy,
            2,
            "chart-easy",
        )));
        state.adjust_fail_type();
        assert_eq!(state.song_options.fail_type, FailType::EndOfSong);

        // Beginner on the first stage disables failing entirely.
        state.cur_charts[0] = Some(Arc::new(ChartData::new(
            StepsType::DanceSingle,
            Difficulty::Beginner,
            1,
            "chart-beg",
        )));
        state.adjust_fail_type();
        assert_eq!(state.song_options.fail_type, FailType::Off);

        // An explicit player choice is never overridden.
        state.changed_fail_type = true;
        state.song_options.fail_type = FailType::Immediate;
        state.adjust_fail_type();
        assert_eq!(state.song_options.fail_type, FailType::Immediate);

        // With no chart selected the fail type still resets to the default.
        state.changed_fail_type = false;
        state.cur_charts[0] = None;
        state.song_options.fail_type = FailType::Off;
        state.adjust_fail_type();
        assert_eq!(state.song_options.fail_type, FailType::Immediate);
    }

    #[test]
    fn final_eval_keeps_the_last_three_passed_stages() {
        let (mut state, _tmp) = test_state();
        join_single(&mut state);
        for i in 0..5 {
            let mut s = crate::game::stage_stats::StageStats::default();
            s.song = Some(test_song());
            s.players[0].songs_played = 1;
            s.players[0].possible_dance_points = 100;
            s.players[0].actual_dance_points = 50 + i;
            state.played_stage_stats.push(s);
        }
        let (stats, songs) = state.final_eval_stats_and_songs();
        assert_eq!(songs.len(), 3);
        assert_eq!(stats.players[0].possible_dance_points, 300);
        // 52 + 53 + 54 from the three latest stages.
        assert_eq!(stats.players[0].actual_dance_points, 159);
    }

    #[test]
    fn transforms_from_attacks_are_handed_to_gameplay_once() {
        use crate::game::options::Transform;
        let (mut state, _tmp) = test_state();
        state.launch_attack(0, Attack::immediate("wide", 10.0));
        let transforms = state.take_transforms_to_apply(0);
        assert_eq!(transforms.as_slice(), &[Transform::Wide]);
        assert!(state.take_transforms_to_apply(0).is_empty());
    }

    #[test]
    fn attack_level_sum_counts_only_ticking_attacks() {
        use crate::game::attack::AttackLevel;
        let (mut state, _tmp) = test_state();
        let mut a = Attack::immediate("drunk", 10.0);
        a.level = AttackLevel::Level3;
        state.launch_attack(0, a);
        let mut b = Attack::immediate("dizzy", 10.0);
        b.level = AttackLevel::Level2;
        state.launch_attack(0, b);
        assert_eq!(state.get_sum_of_active_attack_levels(0), 3);

        state.update(20.0);
        assert_eq!(state.get_sum_of_active_attack_levels(0), 0);
    }
}
