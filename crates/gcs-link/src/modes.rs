use std::fmt;
use std::str::FromStr;

/// ArduCopter custom flight modes (HEARTBEAT.custom_mode / DO_SET_MODE param2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Stabilize,
    Acro,
    AltHold,
    Auto,
    Guided,
    Loiter,
    Rtl,
    Circle,
    Land,
    Drift,
    Sport,
    PosHold,
    Brake,
    SmartRtl,
}

const ALL: [FlightMode; 14] = [
    FlightMode::Stabilize,
    FlightMode::Acro,
    FlightMode::AltHold,
    FlightMode::Auto,
    FlightMode::Guided,
    FlightMode::Loiter,
    FlightMode::Rtl,
    FlightMode::Circle,
    FlightMode::Land,
    FlightMode::Drift,
    FlightMode::Sport,
    FlightMode::PosHold,
    FlightMode::Brake,
    FlightMode::SmartRtl,
];

impl FlightMode {
    pub fn number(self) -> u32 {
        match self {
            FlightMode::Stabilize => 0,
            FlightMode::Acro => 1,
            FlightMode::AltHold => 2,
            FlightMode::Auto => 3,
            FlightMode::Guided => 4,
            FlightMode::Loiter => 5,
            FlightMode::Rtl => 6,
            FlightMode::Circle => 7,
            FlightMode::Land => 9,
            FlightMode::Drift => 11,
            FlightMode::Sport => 13,
            FlightMode::PosHold => 16,
            FlightMode::Brake => 17,
            FlightMode::SmartRtl => 21,
        }
    }

    pub fn from_number(n: u32) -> Option<Self> {
        ALL.iter().copied().find(|m| m.number() == n)
    }

    pub fn name(self) -> &'static str {
        match self {
            FlightMode::Stabilize => "STABILIZE",
            FlightMode::Acro => "ACRO",
            FlightMode::AltHold => "ALT_HOLD",
            FlightMode::Auto => "AUTO",
            FlightMode::Guided => "GUIDED",
            FlightMode::Loiter => "LOITER",
            FlightMode::Rtl => "RTL",
            FlightMode::Circle => "CIRCLE",
            FlightMode::Land => "LAND",
            FlightMode::Drift => "DRIFT",
            FlightMode::Sport => "SPORT",
            FlightMode::PosHold => "POSHOLD",
            FlightMode::Brake => "BRAKE",
            FlightMode::SmartRtl => "SMART_RTL",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown flight mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for FlightMode {
    type Err = UnknownMode;

    // "alt_hold", "ALTHOLD" and "AltHold" are all accepted, as is "2"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.trim().parse::<u32>() {
            return Self::from_number(n).ok_or_else(|| UnknownMode(s.to_string()));
        }
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        ALL.iter()
            .copied()
            .find(|m| m.name().replace('_', "") == key)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Display name for a reported custom mode; unknown numbers stay visible.
pub fn mode_label(custom_mode: u32) -> String {
    match FlightMode::from_number(custom_mode) {
        Some(m) => m.name().to_string(),
        None => format!("MODE({})", custom_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_lenient_about_case_and_separators() {
        assert_eq!("guided".parse::<FlightMode>().unwrap(), FlightMode::Guided);
        assert_eq!("ALT_HOLD".parse::<FlightMode>().unwrap(), FlightMode::AltHold);
        assert_eq!("althold".parse::<FlightMode>().unwrap(), FlightMode::AltHold);
        assert_eq!("smart-rtl".parse::<FlightMode>().unwrap(), FlightMode::SmartRtl);
        assert!("warp".parse::<FlightMode>().is_err());
    }

    #[test]
    fn parse_accepts_custom_mode_numbers() {
        assert_eq!("4".parse::<FlightMode>().unwrap(), FlightMode::Guided);
        assert_eq!(" 9 ".parse::<FlightMode>().unwrap(), FlightMode::Land);
        assert!("8".parse::<FlightMode>().is_err());
        assert!("4000".parse::<FlightMode>().is_err());
    }

    #[test]
    fn numbers_round_trip_through_the_table() {
        for m in ALL {
            assert_eq!(FlightMode::from_number(m.number()), Some(m));
        }
        assert_eq!(FlightMode::from_number(8), None);
    }

    #[test]
    fn labels() {
        assert_eq!(mode_label(4), "GUIDED");
        assert_eq!(mode_label(99), "MODE(99)");
    }
}
