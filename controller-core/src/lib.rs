#![no_std]

// Shared logic for the hold-up power controller.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and talking to hardware only through `embedded-hal`
// traits and small seams owned by the callers.

pub mod config;
pub mod controller;
pub mod countdown;
pub mod handlers;
pub mod sampler;
pub mod signals;
pub mod telemetry;
