/// Most attacks a player can have ticking at once. Launches past this are
/// dropped, not queued.
pub const MAX_SIMULTANEOUS_ATTACKS: usize = 3;
pub const NUM_INVENTORY_SLOTS: usize = 3;
pub const NUM_ATTACK_LEVELS: usize = 3;
pub const NUM_ATTACKS_PER_LEVEL: usize = 3;

/// Strength tier of an attack. Characters define a set of modifier strings
/// per level; the tier also weights the super meter in rave mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackLevel {
    #[default]
    Level1,
    Level2,
    Level3,
    /// Sentinel accepted by removal filters: match any level.
    AllLevels,
}

impl AttackLevel {
    #[inline(always)]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Level1 => Some(0),
            Self::Level2 => Some(1),
            Self::Level3 => Some(2),
            Self::AllLevels => None,
        }
    }
}

/// A timed application of a modifier string to one player.
///
/// `start_second >= 0` means the attack is queued to fire when the music
/// reaches that time; negative means it starts the moment it is launched (or
/// has already started, once the countdown flips it over).
#[derive(Debug, Clone, Default)]
pub struct Attack {
    pub modifiers: String,
    pub level: AttackLevel,
    pub start_second: f32,
    pub seconds_remaining: f32,
}

impl Attack {
    pub fn immediate(modifiers: &str, seconds: f32) -> Self {
        Self {
            modifiers: modifiers.to_string(),
            level: AttackLevel::Level1,
            start_second: -1.0,
            seconds_remaining: seconds,
        }
    }

    pub fn delayed(modifiers: &str, start_second: f32, seconds: f32) -> Self {
        Self {
            modifiers: modifiers.to_string(),
            level: AttackLevel::Level1,
            start_second,
            seconds_remaining: seconds,
        }
    }

    /// A slot is reusable once its countdown has hit zero.
    #[inline(always)]
    pub fn is_blank(&self) -> bool {
        self.seconds_remaining <= 0.0
    }

    /// Started attacks affect the options fold; pending ones do not.
    #[inline(always)]
    pub fn has_started(&self) -> bool {
        self.start_second < 0.0
    }

    pub fn clear(&mut self) {
        self.seconds_remaining = 0.0;
        self.modifiers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Attack, AttackLevel};

    #[test]
    fn blank_and_started_track_the_two_timers() {
        let mut a = Attack::delayed("drunk", 5.0, 3.0);
        assert!(!a.is_blank());
        assert!(!a.has_started());
        a.start_second = -1.0;
        assert!(a.has_started());
        a.clear();
        assert!(a.is_blank());
        assert!(a.modifiers.is_empty());
    }

    #[test]
    fn all_levels_sentinel_has_no_index() {
        assert_eq!(AttackLevel::AllLevels.index(), None);
        assert_eq!(AttackLevel::Level2.index(), Some(1));
    }
}
