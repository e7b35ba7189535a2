//! Sleep control for the STM32G0.
//!
//! Idle uses Stop 1: every clock except the LSI/LSE domain halts and any
//! unmasked EXTI line wakes the core. While a pulse is in flight the core
//! only executes `WFI` with `SLEEPDEEP` clear, so TIM3 keeps counting.

#![cfg(target_os = "none")]

use cortex_m::peripheral::SCB;
use embassy_stm32::pac;
use embassy_stm32::pac::pwr::vals::Lpms;
use pulse_core::hal::PowerManager;

/// Selects Stop 1 as the deep-sleep mode and stops the clocks the firmware
/// never uses.
pub fn configure_low_power() {
    pac::RCC.apbenr1().modify(|w| w.set_pwren(true));
    pac::PWR.cr1().modify(|w| w.set_lpms(Lpms::STOP1));

    // Only GPIOA and GPIOB carry signals; the other ports stay in analog mode.
    pac::RCC.iopenr().modify(|w| {
        w.set_gpiocen(false);
        w.set_gpioden(false);
        w.set_gpioeen(false);
        w.set_gpiofen(false);
    });
}

/// [`PowerManager`] backed by the Cortex-M System Control Block.
pub struct StopModePower {
    scb: SCB,
}

impl StopModePower {
    pub fn new(scb: SCB) -> Self {
        Self { scb }
    }
}

impl PowerManager for StopModePower {
    fn enter_idle(&mut self) {
        self.scb.set_sleepdeep();
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        // Stop 1 wakes on HSI16, which is already the system clock.
        self.scb.clear_sleepdeep();
    }

    fn wait_while_active(&mut self) {
        self.scb.clear_sleepdeep();
        cortex_m::asm::wfi();
    }
}
