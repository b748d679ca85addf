use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "grooveline.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.load_from_str(&content);
        Ok(())
    }

    pub fn load_from_str(&mut self, content: &str) {
        self.sections.clear();

        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let name = &line[1..line.len() - 1];
                let section = name.trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some(eq_idx) = line.find('=') {
                let (key_raw, value_raw) = line.split_at(eq_idx);
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                // Skip '=' and trim whitespace from the value.
                let value = value_raw[1..].trim().to_string();
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }

    pub fn get_section(&self, section: &str) -> Option<&HashMap<String, String>> {
        self.sections.get(section)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }

    const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

/// How dancing characters are chosen at the start of each game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowDancingCharacters {
    Off,
    Random,
    #[default]
    Default,
}

impl ShowDancingCharacters {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Random => "Random",
            Self::Default => "Default",
        }
    }
}

impl FromStr for ShowDancingCharacters {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "random" => Ok(Self::Random),
            "default" => Ok(Self::Default),
            _ => Err(()),
        }
    }
}

/// Machine preferences. These seed the session state on every `reset()`.
#[derive(Debug, Clone)]
pub struct Prefs {
    pub event_mode: bool,
    pub num_arcade_stages: i32,
    pub percentage_scoring: bool,
    pub default_modifiers: String,
    pub allow_extra_stage: bool,
    pub pick_extra_stage: bool,
    pub combo_continues_between_songs: bool,
    /// 0 = never, 1 = course modes only, 2 = always.
    pub marvelous_timing: u8,
    pub show_dancing_characters: ShowDancingCharacters,
    pub log_level: LogLevel,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            event_mode: false,
            num_arcade_stages: 3,
            percentage_scoring: false,
            default_modifiers: String::new(),
            allow_extra_stage: true,
            pick_extra_stage: false,
            combo_continues_between_songs: false,
            marvelous_timing: 2,
            show_dancing_characters: ShowDancingCharacters::Default,
            log_level: LogLevel::Warn,
        }
    }
}

// Global, mutable preferences instance.
static PREFS: std::sync::LazyLock<Mutex<Prefs>> =
    std::sync::LazyLock::new(|| Mutex::new(Prefs::default()));

// --- File I/O ---

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    let default = Prefs::default();

    let mut content = String::new();
    content.push_str("[Options]\n");
    content.push_str(&format!("EventMode={}\n", u8::from(default.event_mode)));
    content.push_str(&format!("NumArcadeStages={}\n", default.num_arcade_stages));
    content.push_str(&format!(
        "PercentageScoring={}\n",
        u8::from(default.percentage_scoring)
    ));
    content.push_str(&format!("DefaultModifiers={}\n", default.default_modifiers));
    content.push_str(&format!(
        "AllowExtraStage={}\n",
        u8::from(default.allow_extra_stage)
    ));
    content.push_str(&format!(
        "PickExtraStage={}\n",
        u8::from(default.pick_extra_stage)
    ));
    content.push_str(&format!(
        "ComboContinuesBetweenSongs={}\n",
        u8::from(default.combo_continues_between_songs)
    ));
    content.push_str(&format!("MarvelousTiming={}\n", default.marvelous_timing));
    content.push_str(&format!(
        "ShowDancingCharacters={}\n",
        default.show_dancing_characters.as_str()
    ));
    content.push_str(&format!("LogLevel={}\n", default.log_level.as_str()));

    std::fs::write(CONFIG_PATH, content)
}

fn prefs_from_ini(conf: &SimpleIni) -> Prefs {
    let default = Prefs::default();
    let mut prefs = Prefs::default();

    prefs.event_mode = conf
        .get("Options", "EventMode")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.event_mode, |v| v != 0);
    prefs.num_arcade_stages = conf
        .get("Options", "NumArcadeStages")
        .and_then(|v| v.parse::<i32>().ok())
        .map(|v| v.max(1))
        .unwrap_or(default.num_arcade_stages);
    prefs.percentage_scoring = conf
        .get("Options", "PercentageScoring")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.percentage_scoring, |v| v != 0);
    prefs.default_modifiers = conf
        .get("Options", "DefaultModifiers")
        .unwrap_or(default.default_modifiers);
    prefs.allow_extra_stage = conf
        .get("Options", "AllowExtraStage")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.allow_extra_stage, |v| v != 0);
    prefs.pick_extra_stage = conf
        .get("Options", "PickExtraStage")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.pick_extra_stage, |v| v != 0);
    prefs.combo_continues_between_songs = conf
        .get("Options", "ComboContinuesBetweenSongs")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.combo_continues_between_songs, |v| v != 0);
    prefs.marvelous_timing = conf
        .get("Options", "MarvelousTiming")
        .and_then(|v| v.parse::<u8>().ok())
        .map(|v| v.min(2))
        .unwrap_or(default.marvelous_timing);
    prefs.show_dancing_characters = conf
        .get("Options", "ShowDancingCharacters")
        .and_then(|v| ShowDancingCharacters::from_str(&v).ok())
        .unwrap_or(default.show_dancing_characters);
    prefs.log_level = conf
        .get("Options", "LogLevel")
        .and_then(|v| LogLevel::from_str(&v).ok())
        .unwrap_or(default.log_level);

    prefs
}

pub fn load() {
    if !std::path::Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            *PREFS.lock().unwrap() = prefs_from_ini(&conf);
            info!("Loaded preferences from '{CONFIG_PATH}'");
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}', using defaults: {e}");
        }
    }
}

pub fn get() -> Prefs {
    PREFS.lock().unwrap().clone()
}

/// Replaces the live preferences wholesale. Used by tests and by screens that
/// edit machine settings.
pub fn set(prefs: Prefs) {
    *PREFS.lock().unwrap() = prefs;
}

#[cfg(test)]
mod tests {
    use super::{Prefs, ShowDancingCharacters, SimpleIni, prefs_from_ini};

    #[test]
    fn ini_reader_handles_sections_comments_and_whitespace() {
        let mut ini = SimpleIni::new();
        ini.load_from_str("; comment\n[Options]\nEventMode = 1\n\n# another\nNumArcadeStages=5\n");
        assert_eq!(ini.get("Options", "EventMode").as_deref(), Some("1"));
        assert_eq!(ini.get("Options", "NumArcadeStages").as_deref(), Some("5"));
        assert!(ini.get("Options", "Missing").is_none());
        assert!(ini.get_section("Options").is_some());
    }

    #[test]
    fn prefs_fall_back_to_defaults_for_missing_or_malformed_keys() {
        let mut ini = SimpleIni::new();
        ini.load_from_str(
            "[Options]\nEventMode=1\nNumArcadeStages=banana\nShowDancingCharacters=Random\n",
        );
        let prefs = prefs_from_ini(&ini);
        let default = Prefs::default();
        assert!(prefs.event_mode);
        assert_eq!(prefs.num_arcade_stages, default.num_arcade_stages);
        assert_eq!(prefs.show_dancing_characters, ShowDancingCharacters::Random);
        assert_eq!(prefs.marvelous_timing, default.marvelous_timing);
    }

    #[test]
    fn num_arcade_stages_is_clamped_to_at_least_one() {
        let mut ini = SimpleIni::new();
        ini.load_from_str("[Options]\nNumArcadeStages=0\n");
        assert_eq!(prefs_from_ini(&ini).num_arcade_stages, 1);
    }
}
