use std::str::FromStr;

/// Layouts the session can be playing. The session state only cares about the
/// key so score tables can be partitioned per layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepsType {
    #[default]
    DanceSingle,
    DanceDouble,
    DanceCouple,
    DanceSolo,
}

impl core::fmt::Display for StepsType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DanceSingle => write!(f, "dance-single"),
            Self::DanceDouble => write!(f, "dance-double"),
            Self::DanceCouple => write!(f, "dance-couple"),
            Self::DanceSolo => write!(f, "dance-solo"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Difficulty {
    Beginner,
    Easy,
    #[default]
    Medium,
    Hard,
    Challenge,
    Edit,
}

impl Difficulty {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::Challenge => "Challenge",
            Self::Edit => "Edit",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "easy" | "basic" | "light" => Ok(Self::Easy),
            "medium" | "another" | "trick" | "standard" => Ok(Self::Medium),
            "hard" | "ssr" | "maniac" | "heavy" => Ok(Self::Hard),
            "challenge" | "smaniac" | "expert" | "oni" => Ok(Self::Challenge),
            "edit" => Ok(Self::Edit),
            other => Err(format!("'{other}' is not a valid Difficulty")),
        }
    }
}

impl core::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chart of the current song. The notes themselves never reach the
/// session state; only classification facts and a stable key for scores.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub steps_type: StepsType,
    pub difficulty: Difficulty,
    pub description: String,
    pub meter: u32,
    /// Stable identifier used to key score tables across sessions.
    pub chart_key: String,
}

impl ChartData {
    pub fn new(steps_type: StepsType, difficulty: Difficulty, meter: u32, key: &str) -> Self {
        Self {
            steps_type,
            difficulty,
            description: String::new(),
            meter,
            chart_key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Difficulty;
    use std::str::FromStr;

    #[test]
    fn difficulty_parses_legacy_names() {
        assert_eq!(Difficulty::from_str("SMANIAC").unwrap(), Difficulty::Challenge);
        assert_eq!(Difficulty::from_str("basic").unwrap(), Difficulty::Easy);
        assert!(Difficulty::from_str("nightmare").is_err());
    }

    #[test]
    fn difficulty_orders_from_beginner_to_edit() {
        assert!(Difficulty::Beginner < Difficulty::Easy);
        assert!(Difficulty::Hard < Difficulty::Challenge);
        assert!(Difficulty::Challenge < Difficulty::Edit);
    }
}
