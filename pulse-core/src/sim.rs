//! Software-simulated board.
//!
//! [`SimBoard`] models the trigger pin, actuator, compare timer, switch bank,
//! sleep controller and interrupt latches in plain cells. The adapters it
//! hands out are thin handles over that state, so a test can keep poking the
//! board while the controller owns the handles. Pending sources are serviced
//! in hardware priority order by [`SimBoard::dispatch_pending`].

use core::cell::{Cell, RefCell};

use heapless::{Deque, Vec};

use crate::controller::{PulseController, PulseFlag, ServiceOutcome};
use crate::hal::{
    CompareMatchTimer, DigitalInputPin, DigitalOutputPin, InterruptController, IrqSource,
    PowerManager, SwitchBank,
};
use crate::switches::{ConfigurationReader, SettingSource, SwitchMap, SwitchPolarity};
use crate::timing::{CompareValue, TimingConfig};

/// Number of peripheral events retained by the trace.
pub const TRACE_DEPTH: usize = 64;

/// Upper bound on handlers run by a single [`SimBoard::dispatch_pending`].
pub const MAX_DISPATCH: usize = 8;

/// Controller wired to a [`SimBoard`].
pub type SimController<'f, 'b, const N: usize> = PulseController<
    'f,
    SimTrigger<'b>,
    SimActuator<'b>,
    SimTimer<'b>,
    SimInterrupts<'b>,
    ConfigurationReader<SimSwitchBank<'b>, N>,
>;

/// Peripheral operation observed by the simulated board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimEvent {
    ActuatorAsserted,
    ActuatorDeasserted,
    TimerArmed(CompareValue),
    TimerStopped,
    CompareLoaded(CompareValue),
    EnteredIdle,
    WaitedWhileActive,
}

#[derive(Copy, Clone, Debug, Default)]
struct TimerModel {
    running: bool,
    counter: u16,
    compare: CompareValue,
    arms: u32,
}

/// Simulated hardware shared by every `Sim*` adapter.
#[derive(Default)]
pub struct SimBoard {
    trigger_high: Cell<bool>,
    switch_image: Cell<u32>,
    actuator: Cell<bool>,
    assert_calls: Cell<u32>,
    timer: Cell<TimerModel>,
    enabled: Cell<u8>,
    pending: Cell<u8>,
    sleeps: Cell<u32>,
    active_waits: Cell<u32>,
    trace: RefCell<Deque<SimEvent, TRACE_DEPTH>>,
}

const fn source_bit(source: IrqSource) -> u8 {
    1 << source.as_index()
}

impl SimBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a controller over this board's adapters.
    #[must_use]
    pub fn controller<'f, const N: usize>(
        &self,
        flag: &'f PulseFlag,
        map: SwitchMap<N>,
        polarity: SwitchPolarity,
        timing: TimingConfig,
    ) -> SimController<'f, '_, N> {
        PulseController::new(
            flag,
            SimTrigger { board: self },
            SimActuator { board: self },
            SimTimer { board: self },
            SimInterrupts { board: self },
            ConfigurationReader::new(SimSwitchBank { board: self }, map, polarity),
            timing,
        )
    }

    /// Sleep controller bound to this board.
    #[must_use]
    pub fn power(&self) -> SimPower<'_> {
        SimPower { board: self }
    }

    /// Drives the trigger high, latching a pin-change event on a real edge.
    pub fn press_trigger(&self) {
        if !self.trigger_high.replace(true) {
            self.latch(IrqSource::TriggerEdge);
        }
    }

    /// Drives the trigger low, latching a pin-change event on a real edge.
    pub fn release_trigger(&self) {
        if self.trigger_high.replace(false) {
            self.latch(IrqSource::TriggerEdge);
        }
    }

    /// Sets the raw port image, latching a change event when it differs.
    pub fn set_switch_image(&self, raw: u32) {
        if self.switch_image.replace(raw) != raw {
            self.latch(IrqSource::ConfigurationChange);
        }
    }

    /// Advances the running timer; reaching the compare value latches expiry.
    pub fn advance_timer(&self, ticks: u16) {
        let mut timer = self.timer.get();
        if !timer.running {
            return;
        }
        timer.counter = timer.counter.saturating_add(ticks);
        if timer.counter >= timer.compare.as_u16() {
            timer.counter = timer.compare.as_u16();
            self.latch(IrqSource::TimerExpiry);
        }
        self.timer.set(timer);
    }

    /// Runs the timer up to its compare value.
    pub fn run_timer_to_match(&self) {
        let timer = self.timer.get();
        let remaining = timer.compare.as_u16().saturating_sub(timer.counter);
        self.advance_timer(remaining);
    }

    /// Latches an interrupt source as hardware would.
    pub fn latch(&self, source: IrqSource) {
        self.pending.set(self.pending.get() | source_bit(source));
    }

    #[must_use]
    pub fn is_pending(&self, source: IrqSource) -> bool {
        self.pending.get() & source_bit(source) != 0
    }

    #[must_use]
    pub fn is_enabled(&self, source: IrqSource) -> bool {
        self.enabled.get() & source_bit(source) != 0
    }

    /// Returns `true` when an enabled source is waiting to run.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.pending.get() & self.enabled.get() != 0
    }

    /// Services enabled pending sources, highest priority first, until none
    /// remain. Each handler runs to completion before the next is chosen.
    pub fn dispatch_pending<T, A, M, I, R>(
        &self,
        controller: &mut PulseController<'_, T, A, M, I, R>,
    ) -> Vec<ServiceOutcome, MAX_DISPATCH>
    where
        T: DigitalInputPin,
        A: DigitalOutputPin,
        M: CompareMatchTimer,
        I: InterruptController,
        R: SettingSource,
    {
        let mut outcomes = Vec::new();
        while !outcomes.is_full() {
            let Some(source) = IrqSource::BY_PRIORITY
                .into_iter()
                .find(|&source| self.is_pending(source) && self.is_enabled(source))
            else {
                break;
            };
            self.unlatch(source);
            // Capacity is checked by the loop condition.
            let _ = outcomes.push(controller.service(source));
        }
        outcomes
    }

    #[must_use]
    pub fn trigger_high(&self) -> bool {
        self.trigger_high.get()
    }

    #[must_use]
    pub fn actuator_asserted(&self) -> bool {
        self.actuator.get()
    }

    /// Number of `assert` calls seen by the actuator.
    #[must_use]
    pub fn assert_calls(&self) -> u32 {
        self.assert_calls.get()
    }

    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.timer.get().running
    }

    #[must_use]
    pub fn timer_counter(&self) -> u16 {
        self.timer.get().counter
    }

    /// Value currently in the compare register.
    #[must_use]
    pub fn loaded_compare(&self) -> CompareValue {
        self.timer.get().compare
    }

    /// Number of times the timer was armed.
    #[must_use]
    pub fn arm_count(&self) -> u32 {
        self.timer.get().arms
    }

    #[must_use]
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.get()
    }

    #[must_use]
    pub fn active_wait_count(&self) -> u32 {
        self.active_waits.get()
    }

    /// Most recent peripheral events, oldest first.
    #[must_use]
    pub fn trace(&self) -> Vec<SimEvent, TRACE_DEPTH> {
        self.trace.borrow().iter().copied().collect()
    }

    pub fn clear_trace(&self) {
        self.trace.borrow_mut().clear();
    }

    fn unlatch(&self, source: IrqSource) {
        self.pending.set(self.pending.get() & !source_bit(source));
    }

    fn record(&self, event: SimEvent) {
        let mut trace = self.trace.borrow_mut();
        if trace.is_full() {
            trace.pop_front();
        }
        // Room was made above.
        let _ = trace.push_back(event);
    }
}

/// Trigger input handle.
pub struct SimTrigger<'b> {
    board: &'b SimBoard,
}

impl DigitalInputPin for SimTrigger<'_> {
    fn is_asserted(&self) -> bool {
        self.board.trigger_high.get()
    }
}

/// Actuator output handle.
pub struct SimActuator<'b> {
    board: &'b SimBoard,
}

impl DigitalOutputPin for SimActuator<'_> {
    fn assert(&mut self) {
        let board = self.board;
        board.assert_calls.set(board.assert_calls.get() + 1);
        board.actuator.set(true);
        board.record(SimEvent::ActuatorAsserted);
    }

    fn deassert(&mut self) {
        self.board.actuator.set(false);
        self.board.record(SimEvent::ActuatorDeasserted);
    }

    fn is_asserted(&self) -> bool {
        self.board.actuator.get()
    }
}

/// Compare timer handle.
pub struct SimTimer<'b> {
    board: &'b SimBoard,
}

impl CompareMatchTimer for SimTimer<'_> {
    fn arm(&mut self, compare: CompareValue) {
        let board = self.board;
        let mut timer = board.timer.get();
        timer.compare = compare;
        timer.counter = 0;
        timer.running = true;
        timer.arms += 1;
        board.timer.set(timer);
        board.record(SimEvent::TimerArmed(compare));
        if compare == CompareValue::ZERO {
            board.latch(IrqSource::TimerExpiry);
        }
    }

    fn stop_and_reset(&mut self) {
        let board = self.board;
        let mut timer = board.timer.get();
        timer.running = false;
        timer.counter = 0;
        board.timer.set(timer);
        board.unlatch(IrqSource::TimerExpiry);
        board.record(SimEvent::TimerStopped);
    }

    fn set_compare(&mut self, compare: CompareValue) {
        let board = self.board;
        let mut timer = board.timer.get();
        timer.compare = compare;
        board.timer.set(timer);
        board.record(SimEvent::CompareLoaded(compare));
    }
}

/// Interrupt controller handle.
pub struct SimInterrupts<'b> {
    board: &'b SimBoard,
}

impl InterruptController for SimInterrupts<'_> {
    fn enable(&mut self, source: IrqSource) {
        let enabled = &self.board.enabled;
        enabled.set(enabled.get() | source_bit(source));
    }

    fn disable(&mut self, source: IrqSource) {
        let enabled = &self.board.enabled;
        enabled.set(enabled.get() & !source_bit(source));
    }

    fn is_pending(&self, source: IrqSource) -> bool {
        self.board.is_pending(source)
    }

    fn clear_pending(&mut self, source: IrqSource) {
        self.board.unlatch(source);
    }
}

/// Switch bank handle.
pub struct SimSwitchBank<'b> {
    board: &'b SimBoard,
}

impl SwitchBank for SimSwitchBank<'_> {
    fn read_raw(&self) -> u32 {
        self.board.switch_image.get()
    }
}

/// Sleep controller handle.
pub struct SimPower<'b> {
    board: &'b SimBoard,
}

impl PowerManager for SimPower<'_> {
    fn enter_idle(&mut self) {
        let board = self.board;
        board.sleeps.set(board.sleeps.get() + 1);
        board.record(SimEvent::EnteredIdle);
    }

    fn wait_while_active(&mut self) {
        let board = self.board;
        board.active_waits.set(board.active_waits.get() + 1);
        board.record(SimEvent::WaitedWhileActive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_latches_only_on_level_changes() {
        let board = SimBoard::new();
        board.press_trigger();
        assert!(board.is_pending(IrqSource::TriggerEdge));

        board.unlatch(IrqSource::TriggerEdge);
        board.press_trigger();
        assert!(!board.is_pending(IrqSource::TriggerEdge));

        board.release_trigger();
        assert!(board.is_pending(IrqSource::TriggerEdge));
        assert!(!board.trigger_high());
    }

    #[test]
    fn timer_latches_expiry_at_compare() {
        let board = SimBoard::new();
        let mut timer = SimTimer { board: &board };
        timer.arm(CompareValue::new(100));

        board.advance_timer(99);
        assert!(!board.is_pending(IrqSource::TimerExpiry));
        board.advance_timer(5);
        assert!(board.is_pending(IrqSource::TimerExpiry));
        assert_eq!(board.timer_counter(), 100);

        timer.stop_and_reset();
        assert!(!board.is_pending(IrqSource::TimerExpiry));
        assert_eq!(board.timer_counter(), 0);
        assert!(!board.timer_running());
    }

    #[test]
    fn trace_keeps_the_most_recent_events() {
        let board = SimBoard::new();
        let mut power = board.power();
        for _ in 0..TRACE_DEPTH {
            power.enter_idle();
        }
        power.wait_while_active();

        let trace = board.trace();
        assert_eq!(trace.len(), TRACE_DEPTH);
        assert_eq!(trace.last(), Some(&SimEvent::WaitedWhileActive));
        assert_eq!(board.sleep_count(), 64);
    }
}
