//! Test-plan configuration uploaded to the device.

use {
    crate::error::ValidationError,
    std::ops::RangeInclusive,
};

/// Valid plan slots.
pub const PLAN_RANGE: RangeInclusive<i32> = 1..=4;
/// Valid test current, mA.
pub const CURRENT_RANGE: RangeInclusive<i32> = 1..=500;
/// Valid sample interval, minutes.
pub const SAMPLE_RATE_RANGE: RangeInclusive<i32> = 1..=1000;
/// Valid test duration, hours.
pub const DURATION_RANGE: RangeInclusive<i32> = 1..=1000;
/// Valid temperature limits, °C.
pub const TEMP_RANGE: RangeInclusive<i32> = -40..=85;

/// CSV header line of a plan file.
pub const CSV_HEADER: &str = "current,sample rate,duration,min temp,max temp";

/// One test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanSettings {
    /// Plan slot, 1-4.
    pub plan_index: i32,
    /// Test current in mA.
    pub current_ma: i32,
    /// Sample interval in minutes.
    pub sample_rate_min: i32,
    /// Test duration in hours.
    pub duration_hr: i32,
    /// Lower temperature limit in °C.
    pub min_temp_c: i32,
    /// Upper temperature limit in °C.
    pub max_temp_c: i32,
}

impl PlanSettings {
    /// Check every field, in declaration order, stopping at the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !PLAN_RANGE.contains(&self.plan_index) {
            return Err(ValidationError::PlanIndex(self.plan_index));
        }
        if !CURRENT_RANGE.contains(&self.current_ma) {
            return Err(ValidationError::Current(self.current_ma));
        }
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate_min) {
            return Err(ValidationError::SampleRate(self.sample_rate_min));
        }
        if !DURATION_RANGE.contains(&self.duration_hr) {
            return Err(ValidationError::Duration(self.duration_hr));
        }
        if !TEMP_RANGE.contains(&self.min_temp_c) {
            return Err(ValidationError::MinTemp(self.min_temp_c));
        }
        if !TEMP_RANGE.contains(&self.max_temp_c) {
            return Err(ValidationError::MaxTemp(self.max_temp_c));
        }
        if self.min_temp_c >= self.max_temp_c {
            return Err(ValidationError::TempOrder {
                min: self.min_temp_c,
                max: self.max_temp_c,
            });
        }
        Ok(())
    }

    /// Plan slot as sent on the wire. Only meaningful after [`Self::validate`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // 1..=4
    pub fn plan_byte(&self) -> u8 {
        self.plan_index as u8
    }

    /// File name the device expects for this plan.
    pub fn filename(&self) -> String {
        format!("setting_{}.csv", self.plan_index)
    }

    /// CSV body: header line and one value line, no trailing newline.
    pub fn to_csv(&self) -> String {
        format!(
            "{CSV_HEADER}\n{},{},{},{},{}",
            self.current_ma,
            self.sample_rate_min,
            self.duration_hr,
            self.min_temp_c,
            self.max_temp_c
        )
    }
}
