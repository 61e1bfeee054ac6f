//! Enumerated values stored in virtual status sensors.
//!
//! Every enumeration maps to the integer code the bridge stores. Codes are
//! part of the contract with rules already living on a bridge, so they are
//! fixed and do not follow declaration order.

use serde::{Deserialize, Serialize};
use std::fmt;

pub trait StatusCode: Copy + Sized {
    fn code(self) -> i64;
    fn from_code(code: i64) -> Option<Self>;
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident {
        $($(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl StatusCode for $name {
            fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $($name::$variant => $label),+
                })
            }
        }
    };
}

status_enum!(
    /// Per-room motion lifecycle.
    MotionStatus {
        #[default]
        Armed = 0 => "armed",
        ShouldTriggerScene = 1 => "should trigger scene",
        SceneTriggered = 2 => "scene triggered",
        Dimmed = 3 => "dimmed",
    }
);

status_enum!(
    /// Whether a room already received its full scene in the current period.
    SceneSetStatus {
        #[default]
        NotSet = 0 => "not set",
        Set = 1 => "set",
    }
);

status_enum!(LateNightStatus {
    #[default]
    NotLateNight = 0 => "not late night",
    IsLateNight = 1 => "late night",
});

status_enum!(Activity {
    #[default]
    Normal = 0 => "normal",
    Relax = 1 => "relax",
    Focus = 2 => "focus",
    Dinner = 3 => "dinner",
    Tv = 4 => "tv",
});

status_enum!(
    /// User brightness preference applied on top of the selected scene.
    /// Declared darkest first, so `Ord` follows the ladder.
    BrightnessLevel {
        VeryDimmed = 4 => "very dimmed",
        Dimmed = 3 => "dimmed",
        #[default]
        Neutral = 0 => "neutral",
        Bright = 1 => "bright",
        VeryBright = 2 => "very bright",
    }
);

impl LateNightStatus {
    pub fn toggled(self) -> Self {
        match self {
            LateNightStatus::NotLateNight => LateNightStatus::IsLateNight,
            LateNightStatus::IsLateNight => LateNightStatus::NotLateNight,
        }
    }
}

impl Activity {
    /// Order the activity button cycles through.
    pub const CYCLE: [Activity; 5] =
        [Activity::Normal, Activity::Relax, Activity::Focus, Activity::Dinner, Activity::Tv];

    /// Next activity in the cycle, wrapping from the last back to the first.
    pub fn next(self) -> Self {
        let pos = Self::CYCLE.iter().position(|a| *a == self).unwrap_or(0);
        Self::CYCLE[(pos + 1) % Self::CYCLE.len()]
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Activity::Normal => "N",
            Activity::Relax => "R",
            Activity::Focus => "F",
            Activity::Dinner => "D",
            Activity::Tv => "TV",
        }
    }
}

impl BrightnessLevel {
    /// Levels from darkest to brightest.
    pub const LADDER: [BrightnessLevel; 5] = [
        BrightnessLevel::VeryDimmed,
        BrightnessLevel::Dimmed,
        BrightnessLevel::Neutral,
        BrightnessLevel::Bright,
        BrightnessLevel::VeryBright,
    ];

    fn rung(self) -> usize {
        Self::LADDER.iter().position(|l| *l == self).unwrap_or(2)
    }

    /// One step brighter, `None` at the top.
    pub fn step_up(self) -> Option<Self> {
        Self::LADDER.get(self.rung() + 1).copied()
    }

    /// One step darker, `None` at the bottom.
    pub fn step_down(self) -> Option<Self> {
        self.rung().checked_sub(1).map(|i| Self::LADDER[i])
    }

    /// Relative brightness change applied after a scene has been set.
    pub fn increment(self) -> i16 {
        match self {
            BrightnessLevel::VeryDimmed => -96,
            BrightnessLevel::Dimmed => -48,
            BrightnessLevel::Neutral => 0,
            BrightnessLevel::Bright => 48,
            BrightnessLevel::VeryBright => 96,
        }
    }
}

/// Derived from daylight and the late-night flag, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayCycle {
    Day,
    EarlyNight,
    LateNight,
}

impl DayCycle {
    pub const ALL: [DayCycle; 3] = [DayCycle::Day, DayCycle::EarlyNight, DayCycle::LateNight];

    pub fn classify(daylight: bool, late_night: LateNightStatus) -> Self {
        match (daylight, late_night) {
            (true, _) => DayCycle::Day,
            (false, LateNightStatus::NotLateNight) => DayCycle::EarlyNight,
            (false, LateNightStatus::IsLateNight) => DayCycle::LateNight,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            DayCycle::Day => "day",
            DayCycle::EarlyNight => "night",
            DayCycle::LateNight => "l8 night",
        }
    }
}

impl fmt::Display for DayCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DayCycle::Day => "day",
            DayCycle::EarlyNight => "early night",
            DayCycle::LateNight => "late night",
        })
    }
}
