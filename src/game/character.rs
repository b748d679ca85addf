use crate::config::SimpleIni;
use crate::game::attack::{NUM_ATTACK_LEVELS, NUM_ATTACKS_PER_LEVEL};
use log::{info, warn};
use rand::RngExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CHARACTERS_DIR: &str = "assets/characters";

/// Gameplay cannot start without a valid character baseline, so these abort
/// startup instead of being reported and skipped.
#[derive(Debug)]
pub enum CharacterLoadError {
    MissingDefault(PathBuf),
    NoCharacters(PathBuf),
    Io(std::io::Error),
}

impl core::fmt::Display for CharacterLoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingDefault(dir) => {
                write!(f, "couldn't find \"{}/default\"", dir.display())
            }
            Self::NoCharacters(dir) => {
                write!(f, "couldn't find any character definitions in {}", dir.display())
            }
            Self::Io(e) => write!(f, "couldn't scan characters directory: {e}"),
        }
    }
}

impl std::error::Error for CharacterLoadError {}

/// A dancing character: display data plus the attack modifier strings it
/// throws in battle and rave modes, three per level.
#[derive(Debug, Clone)]
pub struct Character {
    pub name: String,
    pub directory: PathBuf,
    pub attacks: [[String; NUM_ATTACKS_PER_LEVEL]; NUM_ATTACK_LEVELS],
}

impl Character {
    pub fn is_default(&self) -> bool {
        self.name.eq_ignore_ascii_case("default")
    }

    fn load(dir: &Path) -> Option<Self> {
        let name = dir.file_name()?.to_str()?.to_string();

        let mut attacks: [[String; NUM_ATTACKS_PER_LEVEL]; NUM_ATTACK_LEVELS] =
            Default::default();

        let ini_path = dir.join("character.ini");
        let mut ini = SimpleIni::new();
        match ini.load(&ini_path) {
            Ok(()) => {
                for (level, row) in attacks.iter_mut().enumerate() {
                    for (i, slot) in row.iter_mut().enumerate() {
                        let key = format!("Level{}Attack{}", level + 1, i + 1);
                        if let Some(v) = ini.get("Attacks", &key) {
                            *slot = v;
                        }
                    }
                }
            }
            Err(e) => {
                // A bare directory is still a usable character, it just has
                // no attacks defined.
                warn!("No readable character.ini in {}: {e}", dir.display());
            }
        }

        Some(Self {
            name,
            directory: dir.to_path_buf(),
            attacks,
        })
    }
}

/// Scans `base_dir` for character definitions. Fails if the set is empty or
/// the case-insensitive `default` entry is missing.
pub fn load_characters(base_dir: &Path) -> Result<Vec<Arc<Character>>, CharacterLoadError> {
    let read_dir = std::fs::read_dir(base_dir).map_err(CharacterLoadError::Io)?;

    let mut characters: Vec<Arc<Character>> = Vec::new();
    let mut found_default = false;

    let mut entries: Vec<PathBuf> = read_dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    for dir in entries {
        let Some(character) = Character::load(&dir) else {
            continue;
        };
        if character.is_default() {
            found_default = true;
        }
        characters.push(Arc::new(character));
    }

    if !found_default {
        return Err(CharacterLoadError::MissingDefault(base_dir.to_path_buf()));
    }
    if characters.is_empty() {
        return Err(CharacterLoadError::NoCharacters(base_dir.to_path_buf()));
    }

    info!("Loaded {} character(s) from {}", characters.len(), base_dir.display());
    Ok(characters)
}

/// All characters except the default placeholder.
pub fn selectable_characters(characters: &[Arc<Character>]) -> Vec<Arc<Character>> {
    characters
        .iter()
        .filter(|c| !c.is_default())
        .cloned()
        .collect()
}

pub fn get_default_character(characters: &[Arc<Character>]) -> Option<Arc<Character>> {
    characters.iter().find(|c| c.is_default()).cloned()
}

pub fn get_random_character(characters: &[Arc<Character>]) -> Option<Arc<Character>> {
    let selectable = selectable_characters(characters);
    if selectable.is_empty() {
        return get_default_character(characters);
    }
    let idx = rand::rng().random_range(0..selectable.len());
    Some(selectable[idx].clone())
}
