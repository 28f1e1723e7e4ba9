//! Sleep analysis category values

use serde::{Deserialize, Serialize};

/// HealthKit sleep stages, stored by their `HKCategoryValueSleepAnalysis` raw code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    InBed,
    AsleepUnspecified,
    Awake,
    AsleepCore,
    AsleepDeep,
    AsleepRem,
}

impl SleepStage {
    pub fn code(&self) -> u8 {
        match self {
            SleepStage::InBed => 0,
            SleepStage::AsleepUnspecified => 1,
            SleepStage::Awake => 2,
            SleepStage::AsleepCore => 3,
            SleepStage::AsleepDeep => 4,
            SleepStage::AsleepRem => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SleepStage::InBed),
            1 => Some(SleepStage::AsleepUnspecified),
            2 => Some(SleepStage::Awake),
            3 => Some(SleepStage::AsleepCore),
            4 => Some(SleepStage::AsleepDeep),
            5 => Some(SleepStage::AsleepRem),
            _ => None,
        }
    }

    /// Parse the `value` attribute of a sleep record.
    ///
    /// Older exports use `Asleep` for what later became `AsleepUnspecified`.
    pub fn from_export_value(value: &str) -> Option<Self> {
        let name = value
            .strip_prefix("HKCategoryValueSleepAnalysis")
            .unwrap_or(value);
        match name {
            "InBed" => Some(SleepStage::InBed),
            "Asleep" | "AsleepUnspecified" => Some(SleepStage::AsleepUnspecified),
            "Awake" => Some(SleepStage::Awake),
            "AsleepCore" => Some(SleepStage::AsleepCore),
            "AsleepDeep" => Some(SleepStage::AsleepDeep),
            "AsleepREM" => Some(SleepStage::AsleepRem),
            other => other.parse::<u8>().ok().and_then(Self::from_code),
        }
    }

    pub fn is_asleep(&self) -> bool {
        !matches!(self, SleepStage::InBed | SleepStage::Awake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_values() {
        assert_eq!(
            SleepStage::from_export_value("HKCategoryValueSleepAnalysisAsleepREM"),
            Some(SleepStage::AsleepRem)
        );
        assert_eq!(
            SleepStage::from_export_value("HKCategoryValueSleepAnalysisAsleep"),
            Some(SleepStage::AsleepUnspecified)
        );
        assert_eq!(
            SleepStage::from_export_value("HKCategoryValueSleepAnalysisInBed"),
            Some(SleepStage::InBed)
        );
        assert_eq!(SleepStage::from_export_value("4"), Some(SleepStage::AsleepDeep));
        assert_eq!(SleepStage::from_export_value("HKCategoryValueSleepAnalysisNap"), None);
    }

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=5u8 {
            assert_eq!(SleepStage::from_code(code).unwrap().code(), code);
        }
        assert!(SleepStage::from_code(6).is_none());
    }

    #[test]
    fn test_is_asleep() {
        assert!(SleepStage::AsleepCore.is_asleep());
        assert!(!SleepStage::Awake.is_asleep());
        assert!(!SleepStage::InBed.is_asleep());
    }
}
