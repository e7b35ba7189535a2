use pulse_core::controller::{ExpiryOutcome, ReconfigureOutcome, ServiceOutcome, TriggerOutcome};
use pulse_core::hal::IrqSource;
use pulse_core::sim::{SimBoard, SimEvent};
use pulse_core::supervisor::{IdleOutcome, idle_once};
use pulse_core::{CompareValue, PulseFlag, PulseState, SwitchMap, SwitchPolarity, TimingConfig};

const TIMING: TimingConfig = match TimingConfig::new(16_000_000, 64, 10, 10) {
    Ok(config) => config,
    Err(_) => panic!("bench timing must validate"),
};

#[test]
fn trigger_then_expiry_round_trips_to_idle() {
    let board = SimBoard::new();
    set_setting(&board, 0);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    board.press_trigger();
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Trigger(TriggerOutcome::Started(
            CompareValue::new(250)
        ))]
    );
    assert_eq!(controller.state(), PulseState::Active);
    assert!(board.actuator_asserted());
    assert!(board.timer_running());
    assert_eq!(board.timer_counter(), 0);

    board.advance_timer(249);
    assert!(board.dispatch_pending(&mut controller).is_empty());
    assert!(board.actuator_asserted(), "pulse must last until the match");

    board.advance_timer(1);
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Expiry(ExpiryOutcome::Completed {
            next: CompareValue::new(250)
        })]
    );
    assert_eq!(controller.state(), PulseState::Idle);
    assert!(!board.actuator_asserted());
    assert!(!board.timer_running());
    assert_eq!(board.timer_counter(), 0);
}

#[test]
fn repeated_cycles_leave_outputs_unchanged() {
    let board = SimBoard::new();
    set_setting(&board, 40);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    for cycle in 1..=500u32 {
        board.press_trigger();
        board.dispatch_pending(&mut controller);
        board.run_timer_to_match();
        board.dispatch_pending(&mut controller);
        board.release_trigger();
        board.dispatch_pending(&mut controller);

        assert_eq!(controller.state(), PulseState::Idle, "cycle {cycle}");
        assert!(!board.actuator_asserted(), "cycle {cycle}");
        assert!(!board.timer_running(), "cycle {cycle}");
        assert_eq!(board.timer_counter(), 0, "cycle {cycle}");
        assert_eq!(board.arm_count(), cycle);
        assert_eq!(controller.compare_value(), CompareValue::new(50 * 25));
    }

    let stats = controller.stats();
    assert_eq!(stats.started, 500);
    assert_eq!(stats.completed, 500);
    assert_eq!(stats.ignored_released, 500);
    assert_eq!(stats.ignored_busy, 0);
}

#[test]
fn trigger_while_active_touches_nothing() {
    let board = SimBoard::new();
    set_setting(&board, 100);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    board.advance_timer(1_000);
    board.clear_trace();

    for _ in 0..5 {
        assert_eq!(controller.on_trigger_edge(), TriggerOutcome::IgnoredBusy);
    }

    assert!(board.trace().is_empty(), "no peripheral may be touched");
    assert_eq!(board.arm_count(), 1);
    assert_eq!(board.assert_calls(), 1);
    assert_eq!(board.timer_counter(), 1_000);
    assert_eq!(controller.stats().ignored_busy, 5);
}

#[test]
fn bouncing_trigger_during_a_pulse_yields_one_pulse() {
    let board = SimBoard::new();
    set_setting(&board, 20);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    for _ in 0..10 {
        board.release_trigger();
        board.dispatch_pending(&mut controller);
        board.press_trigger();
        board.dispatch_pending(&mut controller);
        board.advance_timer(10);
    }

    assert_eq!(board.arm_count(), 1);
    assert_eq!(board.assert_calls(), 1);
    assert_eq!(controller.state(), PulseState::Active);

    board.run_timer_to_match();
    board.dispatch_pending(&mut controller);
    assert_eq!(controller.state(), PulseState::Idle);
    assert_eq!(controller.stats().completed, 1);
}

#[test]
fn released_trigger_does_not_start_a_pulse() {
    let board = SimBoard::new();
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    board.press_trigger();
    board.release_trigger();
    let outcomes = board.dispatch_pending(&mut controller);

    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Trigger(TriggerOutcome::IgnoredReleased)]
    );
    assert_eq!(controller.state(), PulseState::Idle);
    assert_eq!(board.arm_count(), 0);
}

#[test]
fn one_expiry_per_armed_cycle() {
    let board = SimBoard::new();
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    board.run_timer_to_match();
    board.dispatch_pending(&mut controller);

    board.latch(IrqSource::TimerExpiry);
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Expiry(ExpiryOutcome::Spurious)]
    );
    assert_eq!(controller.stats().completed, 1);
    assert!(!board.actuator_asserted());
}

#[test]
fn reconfiguration_during_a_pulse_waits_for_the_next_arm() {
    let board = SimBoard::new();
    set_setting(&board, 10);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);
    controller.enable_sources(true);

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    assert_eq!(board.loaded_compare(), CompareValue::new(500));

    set_setting(&board, 90);
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Reconfigure(ReconfigureOutcome::Deferred(
            CompareValue::new(2_500)
        ))]
    );
    assert_eq!(
        board.loaded_compare(),
        CompareValue::new(500),
        "the armed pulse keeps its length"
    );

    board.advance_timer(500);
    board.dispatch_pending(&mut controller);
    assert_eq!(controller.state(), PulseState::Idle);
    assert_eq!(board.loaded_compare(), CompareValue::new(2_500));

    board.release_trigger();
    board.press_trigger();
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.last(),
        Some(&ServiceOutcome::Trigger(TriggerOutcome::Started(
            CompareValue::new(2_500)
        )))
    );
}

#[test]
fn reconfiguration_while_idle_loads_the_register() {
    let board = SimBoard::new();
    set_setting(&board, 0);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);
    controller.enable_sources(true);

    set_setting(&board, 245);
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Reconfigure(ReconfigureOutcome::Applied(
            CompareValue::new(6_375)
        ))]
    );
    assert_eq!(board.loaded_compare(), CompareValue::new(6_375));
}

#[test]
fn switches_are_resampled_when_a_pulse_completes() {
    let board = SimBoard::new();
    set_setting(&board, 0);
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);
    // Without the live path, changes are only seen at expiry.
    controller.enable_sources(false);

    set_setting(&board, 30);
    board.dispatch_pending(&mut controller);
    assert_eq!(controller.compare_value(), CompareValue::new(250));

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    board.run_timer_to_match();
    let outcomes = board.dispatch_pending(&mut controller);
    assert_eq!(
        outcomes.as_slice(),
        &[ServiceOutcome::Expiry(ExpiryOutcome::Completed {
            next: CompareValue::new(1_000)
        })]
    );
}

#[test]
fn idle_with_nothing_pending_goes_straight_to_sleep() {
    let board = SimBoard::new();
    let flag = PulseFlag::new();
    let mut controller = build(&board, &flag);
    let mut power = board.power();

    board.press_trigger();
    board.dispatch_pending(&mut controller);
    board.run_timer_to_match();
    board.dispatch_pending(&mut controller);
    assert!(!board.has_pending_work());

    board.clear_trace();
    assert_eq!(idle_once(&flag, &mut power), IdleOutcome::Slept);
    assert_eq!(board.trace().as_slice(), &[SimEvent::EnteredIdle]);
}

fn build<'f, 'b>(
    board: &'b SimBoard,
    flag: &'f PulseFlag,
) -> pulse_core::sim::SimController<'f, 'b, 8> {
    let mut controller = board.controller(
        flag,
        SwitchMap::<8>::identity(),
        SwitchPolarity::ActiveLow,
        TIMING,
    );
    controller.enable_sources(false);
    controller
}

/// Closes the switches that spell `setting` on an active-low identity bank.
fn set_setting(board: &SimBoard, setting: u8) {
    board.set_switch_image(!u32::from(setting));
}
