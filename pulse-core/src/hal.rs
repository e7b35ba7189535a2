//! Capability traits the pulse controller consumes.
//!
//! The controller never touches registers directly. Firmware provides thin
//! adapters over the real peripherals; host tests use [`crate::sim`]. None of
//! these operations can fail at the software level, so the traits are
//! infallible.

use crate::timing::CompareValue;

/// Electrical polarity of a line relative to its logical "asserted" meaning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Converts a sampled electrical level into its logical meaning.
    #[must_use]
    pub const fn is_asserted(self, level_high: bool) -> bool {
        match self {
            Polarity::ActiveHigh => level_high,
            Polarity::ActiveLow => !level_high,
        }
    }

    /// Electrical level that represents the requested logical state.
    #[must_use]
    pub const fn level_for(self, asserted: bool) -> bool {
        match self {
            Polarity::ActiveHigh => asserted,
            Polarity::ActiveLow => !asserted,
        }
    }
}

/// Interrupt sources the controller coordinates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqSource {
    TriggerEdge,
    TimerExpiry,
    ConfigurationChange,
}

impl IrqSource {
    /// Every source, highest hardware priority first.
    pub const BY_PRIORITY: [IrqSource; 3] = [
        IrqSource::TimerExpiry,
        IrqSource::TriggerEdge,
        IrqSource::ConfigurationChange,
    ];

    /// Deterministic index used by bitmask-based bookkeeping.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            IrqSource::TriggerEdge => 0,
            IrqSource::TimerExpiry => 1,
            IrqSource::ConfigurationChange => 2,
        }
    }
}

/// Trigger input, already normalised to active-high semantics.
pub trait DigitalInputPin {
    /// Returns `true` while the trigger is held.
    fn is_asserted(&self) -> bool;
}

/// Actuator drive line. Both operations must be idempotent.
pub trait DigitalOutputPin {
    /// Energises the actuator.
    fn assert(&mut self);

    /// De-energises the actuator.
    fn deassert(&mut self);

    /// Reports the last commanded logical state.
    fn is_asserted(&self) -> bool;
}

/// 16-bit countdown timer that raises an interrupt on compare match.
///
/// The prescaler is fixed when the adapter is constructed.
pub trait CompareMatchTimer {
    /// Loads `compare`, zeroes the counter, and starts counting.
    fn arm(&mut self, compare: CompareValue);

    /// Stops the counter, zeroes it, and clears any latched match flag.
    fn stop_and_reset(&mut self);

    /// Loads the compare register without starting the counter.
    fn set_compare(&mut self, compare: CompareValue);
}

/// Masking and pending-state control for the three event sources.
pub trait InterruptController {
    /// Unmasks the source.
    fn enable(&mut self, source: IrqSource);

    /// Masks the source. Pending state is preserved.
    fn disable(&mut self, source: IrqSource);

    /// Returns `true` when the source has latched an event that has not run yet.
    fn is_pending(&self, source: IrqSource) -> bool;

    /// Discards a latched event for the source.
    fn clear_pending(&mut self, source: IrqSource);
}

/// Raw access to the configuration switch bank.
pub trait SwitchBank {
    /// Returns the unpermuted electrical image of the bank's ports.
    fn read_raw(&self) -> u32;
}

/// Processor sleep control.
pub trait PowerManager {
    /// Enters the deepest mode that still wakes on the trigger edge.
    ///
    /// Returns once any enabled wake source has fired.
    fn enter_idle(&mut self);

    /// Waits for the in-flight pulse without stopping the timer clock.
    fn wait_while_active(&mut self) {
        core::hint::spin_loop();
    }
}
