use cortex_m::interrupt as cpu_interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use pulse_core::controller::{ExpiryOutcome, ReconfigureOutcome, TriggerOutcome};
use pulse_core::supervisor;
use pulse_core::{ConfigurationReader, PulseController, PulseFlag, SharedController};

use crate::board;
use crate::hw::power::{self, StopModePower};
use crate::hw::{self, BoardInterrupts, PortSwitchBank, PulseTimer, SolenoidDriver, TriggerPin};

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cpu_interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cpu_interrupt::enable();
            }
        }
    }
}

type BoardController = PulseController<
    'static,
    TriggerPin,
    SolenoidDriver,
    PulseTimer,
    BoardInterrupts,
    ConfigurationReader<PortSwitchBank, { board::SWITCH_COUNT }>,
>;

static PULSE_FLAG: PulseFlag = PulseFlag::new();
static CONTROLLER: SharedController<BoardController> = SharedController::new();

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut config = hal::Config::default();
    config.enable_debug_during_sleep = cfg!(debug_assertions);
    // Pins below must match the catalog in `board`.
    let hal::Peripherals {
        PA0,
        PA6,
        PA8,
        PA9,
        PA10,
        PA15,
        PB4,
        PB5,
        PB6,
        PB7,
        TIM3,
        ..
    } = hal::init(config);
    let core = cortex_m::Peripherals::take().expect("core peripherals taken once");

    power::configure_low_power();

    let actuator = SolenoidDriver::new(
        Output::new(
            PA6,
            Level::from(board::SOLENOID_POLARITY.level_for(false)),
            Speed::Low,
        ),
        board::SOLENOID_POLARITY,
    );
    let trigger = TriggerPin::new(Input::new(PA0, Pull::Down), board::TRIGGER_POLARITY);
    let switches = PortSwitchBank::new([
        Input::new(PA8, Pull::Up),
        Input::new(PA9, Pull::Up),
        Input::new(PA10, Pull::Up),
        Input::new(PA15, Pull::Up),
        Input::new(PB4, Pull::Up),
        Input::new(PB5, Pull::Up),
        Input::new(PB6, Pull::Up),
        Input::new(PB7, Pull::Up),
    ]);
    let timer = PulseTimer::new(TIM3, &board::TIMING);
    let interrupts = BoardInterrupts::new();

    hw::route_exti(&board::TRIGGER);
    for pin in &board::SWITCHES {
        hw::route_exti(pin);
    }
    hw::acknowledge_exti(board::TRIGGER_EXTI_MASK | board::SWITCH_EXTI_MASK);

    let reader = ConfigurationReader::new(switches, board::SWITCH_MAP, board::SWITCH_POLARITY);
    let controller = PulseController::new(
        &PULSE_FLAG,
        trigger,
        actuator,
        timer,
        interrupts,
        reader,
        board::TIMING,
    );

    let timing = controller.timing();
    defmt::info!(
        "boot: timer {} Hz / {} ({} ticks per unit), factor={} constant={}",
        timing.clock_hz(),
        timing.prescaler(),
        timing.ticks_per_unit(),
        timing.delay_factor(),
        timing.delay_constant(),
    );
    defmt::info!(
        "boot: compare={} max={} ({} us)",
        controller.compare_value(),
        timing.max_compare_value(),
        timing.max_pulse_duration().as_micros(),
    );
    for pin in [board::TRIGGER, board::SOLENOID].iter().chain(&board::SWITCHES) {
        defmt::debug!("boot: {} on P{}{}", pin.signal, pin.port, pin.pin);
    }
    defmt::debug!("boot: live reconfiguration={}", board::LIVE_RECONFIGURATION);

    if CONTROLLER.install(controller).is_err() {
        defmt::panic!("boot: pulse controller installed twice");
    }
    CONTROLLER.with(|controller| controller.enable_sources(board::LIVE_RECONFIGURATION));

    let mut power = StopModePower::new(core.SCB);
    supervisor::idle_loop(&PULSE_FLAG, &mut power)
}

#[interrupt]
fn EXTI0_1() {
    hw::acknowledge_exti(board::TRIGGER_EXTI_MASK);
    CONTROLLER.with(|controller| match controller.on_trigger_edge() {
        TriggerOutcome::Started(compare) => defmt::trace!("pulse: start compare={}", compare),
        outcome => defmt::trace!("pulse: trigger {}", outcome),
    });
}

#[interrupt]
fn TIM3_TIM4() {
    CONTROLLER.with(|controller| match controller.on_timer_expiry() {
        ExpiryOutcome::Completed { next } => defmt::trace!("pulse: done next={}", next),
        ExpiryOutcome::Spurious => defmt::debug!("pulse: spurious compare match"),
    });
    PulseTimer::acknowledge();
}

#[interrupt]
fn EXTI4_15() {
    hw::acknowledge_exti(board::SWITCH_EXTI_MASK);
    CONTROLLER.with(|controller| match controller.on_configuration_change() {
        ReconfigureOutcome::Applied(compare) => {
            defmt::debug!("pulse: reconfigured compare={}", compare);
        }
        ReconfigureOutcome::Deferred(compare) => {
            defmt::debug!("pulse: compare={} waits for the pulse to finish", compare);
        }
    });
}
