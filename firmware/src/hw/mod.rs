//! Register-level adapters that implement the `pulse-core` capability traits
//! on the STM32G0B1.
//!
//! GPIO pins go through the Embassy drivers so pull and drive configuration
//! stay in one place. TIM3 and EXTI are touched through the PAC because the
//! controller needs single-register operations from interrupt context.

#![cfg(target_os = "none")]

pub mod power;

use embassy_stm32::Peri;
use embassy_stm32::gpio::{Input, Level, Output};
use embassy_stm32::interrupt::{Interrupt, InterruptExt, Priority};
use embassy_stm32::pac;
use embassy_stm32::pac::exti::regs::Lines;
use embassy_stm32::pac::timer::TimGp16;
use embassy_stm32::peripherals::TIM3;
use pulse_core::hal::{
    CompareMatchTimer, DigitalInputPin, DigitalOutputPin, InterruptController, IrqSource,
    Polarity, SwitchBank,
};
use pulse_core::{CompareValue, TimingConfig};

use crate::board::{self, PinAssignment};

/// Trigger contact behind an Embassy input.
pub struct TriggerPin {
    pin: Input<'static>,
    polarity: Polarity,
}

impl TriggerPin {
    pub fn new(pin: Input<'static>, polarity: Polarity) -> Self {
        Self { pin, polarity }
    }
}

impl DigitalInputPin for TriggerPin {
    fn is_asserted(&self) -> bool {
        self.polarity.is_asserted(self.pin.is_high())
    }
}

/// Solenoid gate drive.
pub struct SolenoidDriver {
    pin: Output<'static>,
    polarity: Polarity,
    asserted: bool,
}

impl SolenoidDriver {
    /// Takes an output already parked at the de-energised level.
    pub fn new(pin: Output<'static>, polarity: Polarity) -> Self {
        Self {
            pin,
            polarity,
            asserted: false,
        }
    }

    fn drive(&mut self, asserted: bool) {
        self.pin
            .set_level(Level::from(self.polarity.level_for(asserted)));
        self.asserted = asserted;
    }
}

impl DigitalOutputPin for SolenoidDriver {
    fn assert(&mut self) {
        self.drive(true);
    }

    fn deassert(&mut self) {
        self.drive(false);
    }

    fn is_asserted(&self) -> bool {
        self.asserted
    }
}

/// DIP switch bank spread over GPIOA and GPIOB.
///
/// The inputs are held only to keep their pull-ups configured; sampling reads
/// both IDRs so the whole bank is captured in two loads.
pub struct PortSwitchBank {
    _pins: [Input<'static>; board::SWITCH_COUNT],
}

impl PortSwitchBank {
    pub fn new(pins: [Input<'static>; board::SWITCH_COUNT]) -> Self {
        Self { _pins: pins }
    }
}

impl SwitchBank for PortSwitchBank {
    fn read_raw(&self) -> u32 {
        let port_a = pac::GPIOA.idr().read().0 & 0xFFFF;
        let port_b = pac::GPIOB.idr().read().0 & 0xFFFF;
        port_a | (port_b << 16)
    }
}

fn pulse_timer() -> TimGp16 {
    // SAFETY: TIM3 is a general-purpose 16-bit timer on this part and the
    // `PulseTimer` owns its peripheral singleton.
    unsafe { TimGp16::from_ptr(pac::TIM3.as_ptr()) }
}

/// TIM3 counting up from zero with channel 1 as the compare match.
pub struct PulseTimer {
    _timer: Peri<'static, TIM3>,
}

impl PulseTimer {
    /// Clocks TIM3, loads the prescaler, and unmasks the CC1 interrupt in the
    /// peripheral. The NVIC line stays under [`BoardInterrupts`] control.
    pub fn new(timer: Peri<'static, TIM3>, timing: &TimingConfig) -> Self {
        pac::RCC.apbenr1().modify(|w| w.set_tim3en(true));

        let regs = pulse_timer();
        regs.cr1().modify(|w| w.set_cen(false));
        regs.psc().write_value(timing.prescaler() - 1);
        regs.arr().write(|w| w.set_arr(u16::MAX));
        // UG latches the prescaler; its update flag is not used.
        regs.egr().write(|w| w.set_ug(true));
        regs.sr().modify(|w| {
            w.set_uif(false);
            w.set_ccif(0, false);
        });
        regs.dier().modify(|w| w.set_ccie(0, true));

        Self { _timer: timer }
    }

    /// Clears a CC1 match left behind after the controller has run.
    pub fn acknowledge() {
        pulse_timer().sr().modify(|w| w.set_ccif(0, false));
    }

    fn match_latched() -> bool {
        pulse_timer().sr().read().ccif(0)
    }
}

impl CompareMatchTimer for PulseTimer {
    fn arm(&mut self, compare: CompareValue) {
        let regs = pulse_timer();
        regs.ccr(0).write(|w| w.set_ccr(compare.as_u16()));
        regs.cnt().write(|w| w.set_cnt(0));
        regs.sr().modify(|w| w.set_ccif(0, false));
        regs.cr1().modify(|w| w.set_cen(true));
    }

    fn stop_and_reset(&mut self) {
        let regs = pulse_timer();
        regs.cr1().modify(|w| w.set_cen(false));
        regs.cnt().write(|w| w.set_cnt(0));
        regs.sr().modify(|w| w.set_ccif(0, false));
    }

    fn set_compare(&mut self, compare: CompareValue) {
        pulse_timer()
            .ccr(0)
            .write(|w| w.set_ccr(compare.as_u16()));
    }
}

/// Routes a pin to its EXTI line on both edges and unmasks it for the CPU.
pub fn route_exti(pin: &PinAssignment) {
    let line = usize::from(pin.exti_line());
    pac::EXTI
        .exticr(line / 4)
        .modify(|w| w.set_exti(line % 4, pin.port.exti_selector()));
    pac::EXTI.rtsr(0).modify(|w| w.set_line(line, true));
    pac::EXTI.ftsr(0).modify(|w| w.set_line(line, true));
    pac::EXTI.imr(0).modify(|w| w.set_line(line, true));
}

/// Clears latched rising and falling edges on the given lines.
pub fn acknowledge_exti(mask: u32) {
    pac::EXTI.rpr(0).write_value(Lines(mask));
    pac::EXTI.fpr(0).write_value(Lines(mask));
}

fn exti_latched(mask: u32) -> bool {
    (pac::EXTI.rpr(0).read().0 | pac::EXTI.fpr(0).read().0) & mask != 0
}

const fn vector(source: IrqSource) -> Interrupt {
    match source {
        IrqSource::TriggerEdge => Interrupt::EXTI0_1,
        IrqSource::TimerExpiry => Interrupt::TIM3_TIM4,
        IrqSource::ConfigurationChange => Interrupt::EXTI4_15,
    }
}

const fn nvic_priority(source: IrqSource) -> Priority {
    match board::irq_priority(source) {
        0 => Priority::P0,
        1 => Priority::P1,
        2 => Priority::P2,
        _ => Priority::P3,
    }
}

/// NVIC masking plus the peripheral flags behind each vector.
pub struct BoardInterrupts {
    _private: (),
}

impl BoardInterrupts {
    /// Programs the priorities with every vector masked.
    pub fn new() -> Self {
        for source in IrqSource::BY_PRIORITY {
            let irq = vector(source);
            irq.disable();
            irq.set_priority(nvic_priority(source));
        }
        Self { _private: () }
    }
}

impl InterruptController for BoardInterrupts {
    fn enable(&mut self, source: IrqSource) {
        // SAFETY: every vector has its handler bound in `runtime`, and the
        // controller is installed before any source is enabled.
        unsafe { vector(source).enable() };
    }

    fn disable(&mut self, source: IrqSource) {
        vector(source).disable();
    }

    fn is_pending(&self, source: IrqSource) -> bool {
        match source {
            IrqSource::TimerExpiry => PulseTimer::match_latched(),
            IrqSource::TriggerEdge => exti_latched(board::TRIGGER_EXTI_MASK),
            IrqSource::ConfigurationChange => exti_latched(board::SWITCH_EXTI_MASK),
        }
    }

    fn clear_pending(&mut self, source: IrqSource) {
        match source {
            IrqSource::TimerExpiry => PulseTimer::acknowledge(),
            IrqSource::TriggerEdge => acknowledge_exti(board::TRIGGER_EXTI_MASK),
            IrqSource::ConfigurationChange => acknowledge_exti(board::SWITCH_EXTI_MASK),
        }
        vector(source).unpend();
    }
}
