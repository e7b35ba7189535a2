//! Main-loop sleep policy.
//!
//! While no pulse is in flight the processor sits in the deepest mode that
//! still wakes on the trigger edge. The state check and the sleep entry share
//! one critical section: an interrupt that fires in between stays pending, and
//! a pending interrupt wakes the core even with interrupts masked, so the loop
//! can never fall asleep on a pulse that has just started.

use crate::controller::PulseFlag;
use crate::hal::PowerManager;

/// What one pass of the supervisor did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdleOutcome {
    /// Entered the idle power mode and woke up again.
    Slept,
    /// A pulse was in flight; waited without stopping the timer clock.
    PulseInFlight,
}

/// Runs one supervisor pass and returns after the next wake-up.
pub fn idle_once<P: PowerManager>(flag: &PulseFlag, power: &mut P) -> IdleOutcome {
    critical_section::with(|_| {
        if flag.state().is_active() {
            power.wait_while_active();
            IdleOutcome::PulseInFlight
        } else {
            power.enter_idle();
            IdleOutcome::Slept
        }
    })
}

/// Supervisor loop for the firmware's thread-mode context.
pub fn idle_loop<P: PowerManager>(flag: &PulseFlag, power: &mut P) -> ! {
    loop {
        idle_once(flag, power);
    }
}
