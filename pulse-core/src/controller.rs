//! Pulse controller state machine.
//!
//! The controller turns a trigger edge into one actuator pulse whose length is
//! enforced by the hardware compare timer. It owns the only shared mutable
//! state in the system: the [`PulseFlag`] and the current [`CompareValue`].
//!
//! Every event handler must run with the other event sources held off. The
//! firmware gets that by routing all handlers through
//! [`SharedController::with`], which holds a critical section for the whole
//! check-and-transition. The flag itself is atomic so the sleep supervisor can
//! read it without taking the lock.

use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::{AtomicBool, Ordering};

use crate::hal::{
    CompareMatchTimer, DigitalInputPin, DigitalOutputPin, InterruptController, IrqSource,
};
use crate::switches::SettingSource;
use crate::timing::{CompareValue, TimingConfig};

/// Pulse lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseState {
    /// Actuator off, timer stopped.
    Idle,
    /// Actuator on, timer counting toward the compare value.
    Active,
}

impl PulseState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, PulseState::Active)
    }
}

/// Process-wide pulse state, doubling as the re-entrancy guard.
#[derive(Debug, Default)]
pub struct PulseFlag {
    active: AtomicBool,
}

impl PulseFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Current state, readable from any context.
    #[must_use]
    pub fn state(&self) -> PulseState {
        if self.active.load(Ordering::Acquire) {
            PulseState::Active
        } else {
            PulseState::Idle
        }
    }

    /// Idle -> Active. Returns `false` if a pulse was already in flight.
    fn try_activate(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Active -> Idle.
    fn release(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Result of a trigger pin-change event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerOutcome {
    /// A pulse started and the timer was armed with this value.
    Started(CompareValue),
    /// A pulse was already in flight; nothing was touched.
    IgnoredBusy,
    /// The pin changed because the trigger was released.
    IgnoredReleased,
}

/// Result of a compare-match event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExpiryOutcome {
    /// The pulse ended; `next` is loaded for the following trigger.
    Completed { next: CompareValue },
    /// No pulse was in flight.
    Spurious,
}

/// Result of a switch-bank change event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReconfigureOutcome {
    /// The compare register now holds the new value.
    Applied(CompareValue),
    /// A pulse is in flight; the value waits for the next arm.
    Deferred(CompareValue),
}

/// Outcome of routing one interrupt source through [`PulseController::service`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceOutcome {
    Trigger(TriggerOutcome),
    Expiry(ExpiryOutcome),
    Reconfigure(ReconfigureOutcome),
}

/// Diagnostic counters. Wrap on overflow.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseStats {
    pub started: u32,
    pub completed: u32,
    pub ignored_busy: u32,
    pub ignored_released: u32,
    pub spurious_expiries: u32,
}

/// The pulse-timing state machine.
///
/// Owns the peripheral adapters for the life of the process. Construct it once
/// at boot, then drive it from the interrupt handlers.
pub struct PulseController<'f, T, A, M, I, R> {
    flag: &'f PulseFlag,
    trigger: T,
    actuator: A,
    timer: M,
    interrupts: I,
    reader: R,
    timing: TimingConfig,
    compare: CompareValue,
    stats: PulseStats,
}

impl<'f, T, A, M, I, R> PulseController<'f, T, A, M, I, R>
where
    T: DigitalInputPin,
    A: DigitalOutputPin,
    M: CompareMatchTimer,
    I: InterruptController,
    R: SettingSource,
{
    /// Brings the outputs to their idle configuration and loads the first
    /// compare value from the switches.
    ///
    /// Interrupt sources stay masked until [`Self::enable_sources`].
    pub fn new(
        flag: &'f PulseFlag,
        trigger: T,
        mut actuator: A,
        mut timer: M,
        interrupts: I,
        reader: R,
        timing: TimingConfig,
    ) -> Self {
        flag.release();
        actuator.deassert();
        timer.stop_and_reset();

        let compare = timing.compute_compare_value(reader.read_configuration());
        timer.set_compare(compare);

        Self {
            flag,
            trigger,
            actuator,
            timer,
            interrupts,
            reader,
            timing,
            compare,
            stats: PulseStats::default(),
        }
    }

    /// Unmasks the timer and trigger sources, and the switch-bank source when
    /// live reconfiguration is wired.
    pub fn enable_sources(&mut self, live_reconfiguration: bool) {
        self.interrupts.enable(IrqSource::TimerExpiry);
        self.interrupts.enable(IrqSource::TriggerEdge);
        if live_reconfiguration {
            self.interrupts.enable(IrqSource::ConfigurationChange);
        } else {
            self.interrupts.disable(IrqSource::ConfigurationChange);
        }
    }

    /// Handles a change on the trigger pin.
    pub fn on_trigger_edge(&mut self) -> TriggerOutcome {
        // A match that latched while this handler was held off belongs to the
        // pulse in flight and must finish before the edge is judged.
        if self.flag.state().is_active() && self.interrupts.is_pending(IrqSource::TimerExpiry) {
            self.interrupts.clear_pending(IrqSource::TimerExpiry);
            self.complete_pulse();
        }

        if self.flag.state().is_active() {
            self.stats.ignored_busy = self.stats.ignored_busy.wrapping_add(1);
            return TriggerOutcome::IgnoredBusy;
        }

        if !self.trigger.is_asserted() {
            self.stats.ignored_released = self.stats.ignored_released.wrapping_add(1);
            return TriggerOutcome::IgnoredReleased;
        }

        if !self.flag.try_activate() {
            self.stats.ignored_busy = self.stats.ignored_busy.wrapping_add(1);
            return TriggerOutcome::IgnoredBusy;
        }

        self.actuator.assert();
        self.timer.arm(self.compare);
        self.stats.started = self.stats.started.wrapping_add(1);
        TriggerOutcome::Started(self.compare)
    }

    /// Handles a compare match on the pulse timer.
    pub fn on_timer_expiry(&mut self) -> ExpiryOutcome {
        if !self.flag.state().is_active() {
            self.stats.spurious_expiries = self.stats.spurious_expiries.wrapping_add(1);
            return ExpiryOutcome::Spurious;
        }

        let next = self.complete_pulse();
        ExpiryOutcome::Completed { next }
    }

    /// Handles a change on the switch bank.
    pub fn on_configuration_change(&mut self) -> ReconfigureOutcome {
        let next = self.refresh_compare();
        if self.flag.state().is_active() {
            ReconfigureOutcome::Deferred(next)
        } else {
            self.timer.set_compare(next);
            ReconfigureOutcome::Applied(next)
        }
    }

    /// Routes one interrupt source to its handler.
    pub fn service(&mut self, source: IrqSource) -> ServiceOutcome {
        match source {
            IrqSource::TriggerEdge => ServiceOutcome::Trigger(self.on_trigger_edge()),
            IrqSource::TimerExpiry => ServiceOutcome::Expiry(self.on_timer_expiry()),
            IrqSource::ConfigurationChange => {
                ServiceOutcome::Reconfigure(self.on_configuration_change())
            }
        }
    }

    fn complete_pulse(&mut self) -> CompareValue {
        self.timer.stop_and_reset();
        self.actuator.deassert();

        let next = self.refresh_compare();
        self.timer.set_compare(next);

        self.flag.release();
        self.stats.completed = self.stats.completed.wrapping_add(1);
        next
    }

    fn refresh_compare(&mut self) -> CompareValue {
        self.compare = self
            .timing
            .compute_compare_value(self.reader.read_configuration());
        self.compare
    }
}

impl<T, A, M, I, R> PulseController<'_, T, A, M, I, R> {
    #[must_use]
    pub fn state(&self) -> PulseState {
        self.flag.state()
    }

    /// Compare value the next arm will use.
    #[must_use]
    pub const fn compare_value(&self) -> CompareValue {
        self.compare
    }

    #[must_use]
    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    #[must_use]
    pub const fn stats(&self) -> PulseStats {
        self.stats
    }

    #[must_use]
    pub const fn reader(&self) -> &R {
        &self.reader
    }
}

/// Interrupt-safe home for the controller.
///
/// Installed once by the bootstrap; every handler reaches the controller
/// through [`Self::with`], which holds a critical section for the call.
pub struct SharedController<C> {
    inner: Mutex<RefCell<Option<C>>>,
}

impl<C> SharedController<C> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Stores the controller.
    ///
    /// # Errors
    ///
    /// Hands the controller back if one is already installed.
    pub fn install(&self, controller: C) -> Result<(), C> {
        critical_section::with(|cs| {
            let mut slot = self.inner.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(controller);
            }
            *slot = Some(controller);
            Ok(())
        })
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_some())
    }

    /// Runs `f` against the controller inside a critical section.
    ///
    /// Returns `None` before [`Self::install`] has run.
    pub fn with<F, Out>(&self, f: F) -> Option<Out>
    where
        F: FnOnce(&mut C) -> Out,
    {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<C> Default for SharedController<C> {
    fn default() -> Self {
        Self::new()
    }
}
