mod config;
mod game;

use game::attack::Attack;
use game::chart::{ChartData, Difficulty};
use game::song::{SongData, TimingData};
use game::state::{GameState, PlayMode, Style};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    log::set_max_level(config::get().log_level.as_level_filter());

    let mut state = GameState::new()?;

    // Headless demo session: one arcade stage with a mid-song attack.
    state.insert_coin();
    state.play_mode = Some(PlayMode::Arcade);
    state.style = Some(Style::Single);
    state.master_player = Some(0);

    let mut song = SongData::new("Demo Song", "Demo Artist", TimingData::with_bpm(140.0));
    song.length_seconds = 95.0;
    song.last_beat = 220.0;
    state.cur_song = Some(Arc::new(song));
    state.cur_charts[0] = Some(Arc::new(ChartData::new(
        state.style.map(Style::steps_type).unwrap_or_default(),
        Difficulty::Medium,
        6,
        "demo-song/medium",
    )));

    state.apply_modifiers(0, &config::get().default_modifiers);
    state.store_selected_options();
    state.adjust_fail_type();
    state.reset_stage_statistics();

    state.launch_attack(0, Attack::delayed("drunk, 2x", 10.0, 8.0));

    let mut elapsed = 0.0_f32;
    let delta = 1.0 / 60.0;
    while elapsed < 30.0 {
        elapsed += delta;
        state.update_song_position(elapsed)?;
        state.update(delta);
    }

    log::info!(
        "Demo stage finished on '{}' at beat {:.1} ({} attack level(s) active)",
        state.cur_song.as_ref().map_or("?", |s| s.display_title(true)),
        state.song_beat,
        state.get_sum_of_active_attack_levels(0)
    );

    state.bookkeeper.song_played();
    state.reset();
    Ok(())
}
