use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const BOOKKEEPING_FILE: &str = "bookkeeping.json";

/// Per-day machine counters. Flushed to disk at every session reset so a
/// crash mid-session loses at most one game's worth of data.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Bookkeeper {
    coins_by_day: BTreeMap<NaiveDate, u32>,
    songs_played_by_day: BTreeMap<NaiveDate, u32>,
}

impl Bookkeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coin_inserted(&mut self) {
        *self.coins_by_day.entry(Local::now().date_naive()).or_insert(0) += 1;
    }

    pub fn song_played(&mut self) {
        *self
            .songs_played_by_day
            .entry(Local::now().date_naive())
            .or_insert(0) += 1;
    }

    pub fn coins_total(&self) -> u32 {
        self.coins_by_day.values().sum()
    }

    pub fn coins_on(&self, day: NaiveDate) -> u32 {
        self.coins_by_day.get(&day).copied().unwrap_or(0)
    }

    pub fn songs_played_total(&self) -> u32 {
        self.songs_played_by_day.values().sum()
    }

    /// Fire-and-forget flush; failures are logged and ignored.
    pub fn write_to_disk(&self, save_dir: &Path) {
        if let Err(e) = fs::create_dir_all(save_dir) {
            warn!("Failed to create save dir {:?}: {e}", save_dir);
            return;
        }
        let path = save_dir.join(BOOKKEEPING_FILE);
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("Failed to write bookkeeping to {:?}: {e}", path);
                } else {
                    info!("Flushed bookkeeping to {:?}", path);
                }
            }
            Err(e) => warn!("Failed to serialize bookkeeping: {e}"),
        }
    }

    pub fn read_from_disk(save_dir: &Path) -> Self {
        let path = save_dir.join(BOOKKEEPING_FILE);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(book) => book,
            Err(e) => {
                warn!("Ignoring unreadable bookkeeping file {:?}: {e}", path);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Bookkeeper;

    #[test]
    fn counters_accumulate_per_day() {
        let mut book = Bookkeeper::new();
        book.coin_inserted();
        book.coin_inserted();
        book.song_played();
        assert_eq!(book.coins_total(), 2);
        assert_eq!(book.songs_played_total(), 1);
        let today = chrono::Local::now().date_naive();
        assert_eq!(book.coins_on(today), 2);
    }

    #[test]
    fn flush_and_reload_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let mut book = Bookkeeper::new();
        book.coin_inserted();
        book.write_to_disk(tmp.path());
        let reloaded = Bookkeeper::read_from_disk(tmp.path());
        assert_eq!(reloaded.coins_total(), 1);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let book = Bookkeeper::read_from_disk(tmp.path());
        assert_eq!(book.coins_total(), 0);
    }
}
