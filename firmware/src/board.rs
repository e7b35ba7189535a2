#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board catalog for the STM32G0B1 solenoid driver.
//!
//! Everything here is evaluated at compile time. A pin assignment or timing
//! choice that cannot work fails the build instead of misbehaving on the
//! bench.

use pulse_core::hal::{IrqSource, Polarity};
use pulse_core::{SwitchMap, SwitchPolarity, TimingConfig};

/// HSI16 drives SYSCLK and the APB timer clock after reset.
pub const TIMER_CLOCK_HZ: u32 = 16_000_000;

/// TIM3 prescaler; the register is loaded with `PULSE_TIMER_PRESCALER - 1`.
pub const PULSE_TIMER_PRESCALER: u16 = 64;

/// Setting units per millisecond. One switch step is 0.1 ms.
pub const DELAY_FACTOR: u16 = 10;

/// Units added to every setting so the shortest pulse still pulls the
/// plunger in (1.0 ms at the factor above).
pub const DELAY_CONSTANT: u8 = 10;

pub const TIMING: TimingConfig = match TimingConfig::new(
    TIMER_CLOCK_HZ,
    PULSE_TIMER_PRESCALER,
    DELAY_FACTOR,
    DELAY_CONSTANT,
) {
    Ok(timing) => timing,
    Err(_) => panic!("board timing does not fit the 16-bit compare register"),
};

/// GPIO port a signal lives on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Port {
    A,
    B,
}

impl Port {
    /// Bit offset of this port's IDR inside the combined switch-bank word.
    pub const fn raw_shift(self) -> u8 {
        match self {
            Port::A => 0,
            Port::B => 16,
        }
    }

    /// Port selector written into `EXTI_EXTICRx`.
    pub const fn exti_selector(self) -> u8 {
        match self {
            Port::A => 0,
            Port::B => 1,
        }
    }
}

/// One wired signal and where it lands on the MCU.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment {
    pub signal: &'static str,
    pub port: Port,
    pub pin: u8,
}

impl PinAssignment {
    const fn new(signal: &'static str, port: Port, pin: u8) -> Self {
        Self { signal, port, pin }
    }

    /// EXTI line shared by every port's pin with this number.
    pub const fn exti_line(&self) -> u8 {
        self.pin
    }

    /// Position of the pin in the word returned by the switch bank.
    pub const fn raw_position(&self) -> u8 {
        self.port.raw_shift() + self.pin
    }
}

/// Trigger contact, pulled down, closes to 3V3.
pub const TRIGGER: PinAssignment = PinAssignment::new("TRIGGER", Port::A, 0);

/// Gate of the low-side MOSFET that drives the solenoid.
pub const SOLENOID: PinAssignment = PinAssignment::new("SOLENOID", Port::A, 6);

/// DIP switches, least significant setting bit first. PA11/PA12 stay free
/// for USB and PA13/PA14 for SWD.
pub const SWITCHES: [PinAssignment; SWITCH_COUNT] = [
    PinAssignment::new("SW0", Port::A, 8),
    PinAssignment::new("SW1", Port::A, 9),
    PinAssignment::new("SW2", Port::A, 10),
    PinAssignment::new("SW3", Port::A, 15),
    PinAssignment::new("SW4", Port::B, 4),
    PinAssignment::new("SW5", Port::B, 5),
    PinAssignment::new("SW6", Port::B, 6),
    PinAssignment::new("SW7", Port::B, 7),
];

pub const SWITCH_COUNT: usize = 8;

pub const SWITCH_MAP: SwitchMap<SWITCH_COUNT> = match SwitchMap::new(raw_positions(&SWITCHES)) {
    Ok(map) => map,
    Err(_) => panic!("switch pins must map to distinct bits of the bank word"),
};

/// Closed switch pulls the pin to ground against the internal pull-up.
pub const SWITCH_POLARITY: SwitchPolarity = SwitchPolarity::ActiveLow;
pub const TRIGGER_POLARITY: Polarity = Polarity::ActiveHigh;
pub const SOLENOID_POLARITY: Polarity = Polarity::ActiveHigh;

/// Re-read the switches as soon as they move instead of only after a pulse.
pub const LIVE_RECONFIGURATION: bool = true;

/// EXTI lines owned by the switch bank.
pub const SWITCH_EXTI_MASK: u32 = exti_mask(&SWITCHES);

/// EXTI line owned by the trigger.
pub const TRIGGER_EXTI_MASK: u32 = 1 << TRIGGER.exti_line();

/// EXTI lines served by the `EXTI0_1` vector.
pub const EXTI0_1_LINES: u32 = 0b11;

/// EXTI lines served by the `EXTI4_15` vector.
pub const EXTI4_15_LINES: u32 = 0xFFF0;

/// NVIC priority for each source; lower is more urgent. The Cortex-M0+
/// implements two priority bits, so only 0..=3 exist.
pub const fn irq_priority(source: IrqSource) -> u8 {
    match source {
        IrqSource::TimerExpiry => 0,
        IrqSource::TriggerEdge => 1,
        IrqSource::ConfigurationChange => 2,
    }
}

const fn raw_positions(pins: &[PinAssignment; SWITCH_COUNT]) -> [u8; SWITCH_COUNT] {
    let mut positions = [0; SWITCH_COUNT];
    let mut index = 0;
    while index < SWITCH_COUNT {
        positions[index] = pins[index].raw_position();
        index += 1;
    }
    positions
}

const fn exti_mask(pins: &[PinAssignment]) -> u32 {
    let mut mask = 0;
    let mut index = 0;
    while index < pins.len() {
        mask |= 1 << pins[index].exti_line();
        index += 1;
    }
    mask
}

// Every switch needs its own EXTI line, all of them on the EXTI4_15 vector,
// and none shared with the trigger.
const _: () = assert!(SWITCH_EXTI_MASK.count_ones() == SWITCH_MAP.raw_mask().count_ones());
const _: () = assert!(SWITCH_EXTI_MASK & !EXTI4_15_LINES == 0);
const _: () = assert!(TRIGGER_EXTI_MASK & EXTI0_1_LINES != 0);

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use pulse_core::{CompareValue, DurationSetting};

    use super::*;

    #[test]
    fn bench_timing_matches_the_documented_range() {
        assert_eq!(TIMING.ticks_per_unit(), 25);
        assert_eq!(
            TIMING.compute_compare_value(DurationSetting::MIN),
            CompareValue::new(250)
        );
        assert_eq!(TIMING.max_compare_value(), CompareValue::new(6_625));
        assert_eq!(TIMING.max_pulse_duration(), Duration::from_micros(26_500));
    }

    #[test]
    fn switch_map_follows_the_pin_catalog() {
        assert_eq!(SWITCH_MAP.width(), SWITCH_COUNT);
        for (bit, pin) in SWITCHES.iter().enumerate() {
            assert_eq!(SWITCH_MAP.position(bit), Some(pin.raw_position()));
        }
        assert_eq!(SWITCH_MAP.position(SWITCH_COUNT), None);
    }

    #[test]
    fn closing_a_port_b_switch_sets_its_setting_bit() {
        // Bank word: GPIOA IDR in the low half, GPIOB IDR in the high half.
        let all_open: u32 = SWITCH_MAP.raw_mask();
        let sw5_closed = all_open & !(1 << (16 + 5));

        let reading = !SWITCH_MAP.assemble(sw5_closed);
        assert_eq!(reading, 1 << 5);
    }

    #[test]
    fn exti_lines_are_unique_and_on_the_right_vectors() {
        assert_eq!(SWITCH_EXTI_MASK, 0b1000_0111_1111_0000);
        assert_eq!(SWITCH_EXTI_MASK & TRIGGER_EXTI_MASK, 0);
        assert_eq!(TRIGGER_EXTI_MASK, 1);
    }

    #[test]
    fn priorities_follow_the_service_order() {
        let priorities = IrqSource::BY_PRIORITY.map(irq_priority);
        assert!(priorities.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(priorities.iter().all(|&priority| priority <= 3));
    }

    #[test]
    fn solenoid_and_trigger_avoid_the_switch_pins() {
        for pin in SWITCHES {
            assert_ne!((pin.port, pin.pin), (TRIGGER.port, TRIGGER.pin));
            assert_ne!((pin.port, pin.pin), (SOLENOID.port, SOLENOID.pin));
        }
    }
}
