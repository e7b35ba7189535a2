#![no_std]

// Portable pulse-timing logic for the solenoid trigger.
//
// Everything here avoids the standard library and talks to hardware only
// through the capability traits in `hal`, so the same state machine runs in
// the MCU firmware and against the simulated backend in host tests.

pub mod controller;
pub mod hal;
pub mod sim;
pub mod supervisor;
pub mod switches;
pub mod timing;

pub use controller::{
    ExpiryOutcome, PulseController, PulseFlag, PulseState, PulseStats, ReconfigureOutcome,
    SharedController, TriggerOutcome,
};
pub use switches::{ConfigurationReader, DurationSetting, SwitchMap, SwitchPolarity};
pub use timing::{CompareValue, TimingConfig, TimingError};
