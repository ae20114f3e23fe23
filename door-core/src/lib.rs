#![no_std]

// Shared logic for the door controller and its remote dashboard.
//
// Everything here runs from a single cooperative tick on a wrapping millisecond
// clock, so the same code drives the STM32 firmware and the host emulator.

pub mod chain;
pub mod clock;
pub mod controller;
pub mod dashboard;
pub mod hardware;
pub mod link;
pub mod orchestrator;
pub mod persist;
pub mod state_machine;
pub mod telemetry;
pub mod timing;
