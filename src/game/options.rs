use log::debug;
use std::str::FromStr;

/// Per-second rate the visible options drift toward their targets.
const APPROACH_SPEED: f32 = 1.0;

#[inline(always)]
fn fapproach(value: &mut f32, target: f32, delta: f32) {
    if *value < target {
        *value = (*value + delta).min(target);
    } else {
        *value = (*value - delta).max(target);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnOption {
    #[default]
    None,
    Mirror,
    Left,
    Right,
    Shuffle,
    SuperShuffle,
}

impl FromStr for TurnOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "noturn" => Ok(Self::None),
            "mirror" => Ok(Self::Mirror),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "shuffle" => Ok(Self::Shuffle),
            "supershuffle" => Ok(Self::SuperShuffle),
            other => Err(format!("'{other}' is not a valid Turn setting")),
        }
    }
}

impl core::fmt::Display for TurnOption {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Mirror => write!(f, "Mirror"),
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
            Self::Shuffle => write!(f, "Shuffle"),
            Self::SuperShuffle => write!(f, "SuperShuffle"),
        }
    }
}

/// Note-data rewrites applied by gameplay on its next update. Unlike the
/// float effects these cannot be blended, so they are collected into a
/// per-player list when an attack fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    None,
    Little,
    Wide,
    Big,
    Quick,
    Skippy,
    Mines,
    Echo,
    Stomp,
    Planted,
    Floored,
    Twister,
    NoHolds,
    NoMines,
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "little" => Ok(Self::Little),
            "wide" => Ok(Self::Wide),
            "big" => Ok(Self::Big),
            "quick" => Ok(Self::Quick),
            "skippy" => Ok(Self::Skippy),
            "mines" => Ok(Self::Mines),
            "echo" => Ok(Self::Echo),
            "stomp" => Ok(Self::Stomp),
            "planted" => Ok(Self::Planted),
            "floored" => Ok(Self::Floored),
            "twister" => Ok(Self::Twister),
            "noholds" => Ok(Self::NoHolds),
            "nomines" => Ok(Self::NoMines),
            other => Err(format!("'{other}' is not a valid Transform")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Drunk,
    Dizzy,
    Mini,
    Tipsy,
    Flip,
    Invert,
    Reverse,
    Dark,
}

/// Note skins the engine ships. The grammar only accepts tokens from this
/// set as skin selections; anything else falls through to the unknown-token
/// path.
const KNOWN_NOTE_SKINS: &[&str] = &["default", "note", "flat", "solo", "metal", "cel"];

pub const DEFAULT_NOTE_SKIN: &str = "default";

/// One parsed token of a modifier string.
#[derive(Debug, Clone, PartialEq)]
pub enum ModOp {
    ScrollSpeed(f32),
    Effect(Effect, f32),
    Turn(TurnOption),
    Transform(Transform),
    NoteSkin(String),
}

/// Parses a single comma-separated token of the modifier grammar.
///
/// Recognized shapes: `2x` (scroll multiplier), `drunk`, `no drunk`,
/// `50% drunk`, turn names, transform names, and known note skin names.
pub fn parse_mod_token(token: &str) -> Option<ModOp> {
    let token = token.trim().to_lowercase();
    if token.is_empty() {
        return None;
    }

    // "Nx" scroll speed multiplier.
    if let Some(stripped) = token.strip_suffix('x')
        && let Ok(mult) = stripped.parse::<f32>()
        && mult.is_finite()
        && mult > 0.0
    {
        return Some(ModOp::ScrollSpeed(mult));
    }

    // Optional "N%" or "no" prefix scaling the named effect.
    let mut level = 1.0_f32;
    let mut name = token.as_str();
    if let Some((head, tail)) = token.split_once(char::is_whitespace) {
        if let Some(pct) = head.strip_suffix('%') {
            if let Ok(v) = pct.parse::<f32>() {
                level = v / 100.0;
                name = tail.trim();
            }
        } else if head == "no" {
            level = 0.0;
            name = tail.trim();
        }
    }

    let effect = match name {
        "drunk" => Some(Effect::Drunk),
        "dizzy" => Some(Effect::Dizzy),
        "mini" => Some(Effect::Mini),
        "tipsy" => Some(Effect::Tipsy),
        "flip" => Some(Effect::Flip),
        "invert" => Some(Effect::Invert),
        "reverse" => Some(Effect::Reverse),
        "dark" => Some(Effect::Dark),
        _ => None,
    };
    if let Some(e) = effect {
        return Some(ModOp::Effect(e, level));
    }

    if let Ok(turn) = TurnOption::from_str(name)
        && turn != TurnOption::None
    {
        return Some(ModOp::Turn(turn));
    }

    if let Ok(t) = Transform::from_str(name)
        && t != Transform::None
    {
        return Some(ModOp::Transform(t));
    }

    if KNOWN_NOTE_SKINS.contains(&name) {
        return Some(ModOp::NoteSkin(name.to_string()));
    }

    None
}

/// Parses a whole modifier string into its op list. Used by the session
/// state to peek at an attack's transform and note skin without mutating
/// any options.
pub fn parse_mods(s: &str) -> Vec<ModOp> {
    let mut ops = Vec::new();
    for token in s.split(',') {
        match parse_mod_token(token) {
            Some(op) => ops.push(op),
            None => {
                let t = token.trim();
                if !t.is_empty() {
                    debug!("Ignoring unrecognized modifier token '{t}'");
                }
            }
        }
    }
    ops
}

/// The options in effect for one player. Mutated only through `from_string`
/// folding so attack modifiers compose the same way typed modifiers do.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub scroll_speed: f32,
    pub drunk: f32,
    pub dizzy: f32,
    pub mini: f32,
    pub tipsy: f32,
    pub flip: f32,
    pub invert: f32,
    pub reverse: f32,
    pub dark: f32,
    pub turn: TurnOption,
    pub transform: Transform,
    pub note_skin: String,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            scroll_speed: 1.0,
            drunk: 0.0,
            dizzy: 0.0,
            mini: 0.0,
            tipsy: 0.0,
            flip: 0.0,
            invert: 0.0,
            reverse: 0.0,
            dark: 0.0,
            turn: TurnOption::None,
            transform: Transform::None,
            note_skin: DEFAULT_NOTE_SKIN.to_string(),
        }
    }
}

impl PlayerOptions {
    pub fn init(&mut self) {
        *self = Self::default();
    }

    fn apply(&mut self, op: &ModOp) {
        match op {
            ModOp::ScrollSpeed(mult) => self.scroll_speed = *mult,
            ModOp::Effect(effect, level) => {
                let slot = match effect {
                    Effect::Drunk => &mut self.drunk,
                    Effect::Dizzy => &mut self.dizzy,
                    Effect::Mini => &mut self.mini,
                    Effect::Tipsy => &mut self.tipsy,
                    Effect::Flip => &mut self.flip,
                    Effect::Invert => &mut self.invert,
                    Effect::Reverse => &mut self.reverse,
                    Effect::Dark => &mut self.dark,
                };
                *slot = *level;
            }
            ModOp::Turn(turn) => self.turn = *turn,
            ModOp::Transform(t) => self.transform = *t,
            ModOp::NoteSkin(skin) => self.note_skin = skin.clone(),
        }
    }

    /// Folds a modifier string into these options. Later tokens override
    /// earlier ones per field; unknown tokens are skipped.
    pub fn from_string(&mut self, modifiers: &str) {
        for op in parse_mods(modifiers) {
            self.apply(&op);
        }
    }

    /// Moves the smoothed float fields toward `target`. Discrete fields
    /// (turn, transform, skin) snap immediately.
    pub fn approach(&mut self, target: &PlayerOptions, delta: f32) {
        let step = delta * APPROACH_SPEED;
        fapproach(&mut self.scroll_speed, target.scroll_speed, step);
        fapproach(&mut self.drunk, target.drunk, step);
        fapproach(&mut self.dizzy, target.dizzy, step);
        fapproach(&mut self.mini, target.mini, step);
        fapproach(&mut self.tipsy, target.tipsy, step);
        fapproach(&mut self.flip, target.flip, step);
        fapproach(&mut self.invert, target.invert, step);
        fapproach(&mut self.reverse, target.reverse, step);
        fapproach(&mut self.dark, target.dark, step);
        self.turn = target.turn;
        self.transform = target.transform;
        if self.note_skin != target.note_skin {
            self.note_skin = target.note_skin.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FailType {
    /// Fail the moment the life bar empties.
    #[default]
    Immediate,
    /// Keep playing, fail at the end of the song.
    EndOfSong,
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongOptions {
    pub fail_type: FailType,
    pub music_rate: f32,
}

impl Default for SongOptions {
    fn default() -> Self {
        Self {
            fail_type: FailType::Immediate,
            music_rate: 1.0,
        }
    }
}

impl SongOptions {
    pub fn init(&mut self) {
        *self = Self::default();
    }

    pub fn from_string(&mut self, modifiers: &str) {
        for token in modifiers.split(',') {
            match token.trim().to_lowercase().as_str() {
                "failimmediate" | "failarcade" => self.fail_type = FailType::Immediate,
                "failendofsong" => self.fail_type = FailType::EndOfSong,
                "failoff" => self.fail_type = FailType::Off,
                other => {
                    if let Some(rate) = other.strip_suffix("xmusic")
                        && let Ok(v) = rate.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        self.music_rate = v;
                    }
                }
            }
        }
    }
}
