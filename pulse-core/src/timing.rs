//! Conversion from switch settings to timer compare values.
//!
//! A pulse lasts `(setting + delay_constant)` duration units, where one unit
//! is `1 / delay_factor` milliseconds. The timer counts at
//! `clock_hz / prescaler`, so each unit spans
//! `clock_hz / (1000 * delay_factor * prescaler)` ticks:
//!
//! ```text
//! compare = (setting + delay_constant) * (clock_hz / (1000 * delay_factor * prescaler))
//! ```
//!
//! [`TimingConfig::new`] rejects parameter sets whose largest setting would
//! overflow the 16-bit compare register, which keeps
//! [`TimingConfig::compute_compare_value`] infallible.

use core::fmt;
use core::time::Duration;

use crate::switches::DurationSetting;

/// Largest value the compare register can hold.
pub const COMPARE_REGISTER_MAX: u32 = 0xFFFF;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Timer register value at which the pulse ends.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompareValue(u16);

impl CompareValue {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Reasons a timing parameter set is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingError {
    /// Clock, prescaler, or delay factor was zero.
    ZeroParameter,
    /// One duration unit is shorter than a single timer tick.
    ResolutionTooFine,
    /// The largest setting would not fit in the compare register.
    CompareOverflow { max_compare: u64 },
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingError::ZeroParameter => {
                write!(f, "clock, prescaler and delay factor must be non-zero")
            }
            TimingError::ResolutionTooFine => {
                write!(f, "duration unit is shorter than one timer tick")
            }
            TimingError::CompareOverflow { max_compare } => write!(
                f,
                "largest compare value {max_compare} exceeds {COMPARE_REGISTER_MAX}"
            ),
        }
    }
}

/// Validated timer and duration-unit parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    clock_hz: u32,
    prescaler: u16,
    delay_factor: u16,
    delay_constant: u8,
    ticks_per_unit: u16,
}

impl TimingConfig {
    /// Validates a parameter set.
    ///
    /// * `clock_hz` - timer input clock before the prescaler.
    /// * `prescaler` - timer clock divider.
    /// * `delay_factor` - duration units per millisecond (10 means 0.1 ms steps).
    /// * `delay_constant` - units added to every setting to cover the
    ///   actuator's mechanical response time; zero disables compensation.
    ///
    /// # Errors
    ///
    /// Returns a [`TimingError`] when a parameter is zero, when one unit is
    /// shorter than a timer tick, or when setting 255 would overflow the
    /// compare register.
    pub const fn new(
        clock_hz: u32,
        prescaler: u16,
        delay_factor: u16,
        delay_constant: u8,
    ) -> Result<Self, TimingError> {
        if clock_hz == 0 || prescaler == 0 || delay_factor == 0 {
            return Err(TimingError::ZeroParameter);
        }

        let divisor = 1_000 * delay_factor as u64 * prescaler as u64;
        let ticks = clock_hz as u64 / divisor;
        if ticks == 0 {
            return Err(TimingError::ResolutionTooFine);
        }

        let max_units = DurationSetting::MAX.as_u8() as u64 + delay_constant as u64;
        let max_compare = max_units * ticks;
        if max_compare > COMPARE_REGISTER_MAX as u64 {
            return Err(TimingError::CompareOverflow { max_compare });
        }

        // Bounded by the overflow check above.
        #[allow(clippy::cast_possible_truncation)]
        let ticks_per_unit = ticks as u16;

        Ok(Self {
            clock_hz,
            prescaler,
            delay_factor,
            delay_constant,
            ticks_per_unit,
        })
    }

    #[must_use]
    pub const fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    #[must_use]
    pub const fn prescaler(&self) -> u16 {
        self.prescaler
    }

    #[must_use]
    pub const fn delay_factor(&self) -> u16 {
        self.delay_factor
    }

    #[must_use]
    pub const fn delay_constant(&self) -> u8 {
        self.delay_constant
    }

    /// Timer ticks spanned by one duration unit.
    #[must_use]
    pub const fn ticks_per_unit(&self) -> u16 {
        self.ticks_per_unit
    }

    /// Maps a switch setting to the compare value that ends its pulse.
    #[must_use]
    pub fn compute_compare_value(&self, setting: DurationSetting) -> CompareValue {
        let units = u32::from(setting.as_u8()) + u32::from(self.delay_constant);
        let ticks = units * u32::from(self.ticks_per_unit);
        CompareValue(u16::try_from(ticks).unwrap_or(u16::MAX))
    }

    /// Compare value for the largest representable setting.
    #[must_use]
    pub fn max_compare_value(&self) -> CompareValue {
        self.compute_compare_value(DurationSetting::MAX)
    }

    /// Wall-clock length of a pulse ending at `compare`.
    #[must_use]
    pub fn duration_of(&self, compare: CompareValue) -> Duration {
        let ticks = u64::from(compare.as_u16()) * u64::from(self.prescaler);
        Duration::from_nanos(ticks * NANOS_PER_SECOND / u64::from(self.clock_hz))
    }

    /// Wall-clock length of the pulse produced by `setting`.
    #[must_use]
    pub fn pulse_duration(&self, setting: DurationSetting) -> Duration {
        self.duration_of(self.compute_compare_value(setting))
    }

    /// Longest pulse this configuration can produce.
    #[must_use]
    pub fn max_pulse_duration(&self) -> Duration {
        self.duration_of(self.max_compare_value())
    }
}
