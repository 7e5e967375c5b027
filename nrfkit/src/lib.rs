//! Peripheral building blocks for nRF microcontrollers.
//!
//! | Module     | Contents                                                       |
//! |------------|----------------------------------------------------------------|
//! | [`pwm`]    | Multi-channel software PWM driven by one hardware timer        |
//! | [`timer`]  | The [`HardwareTimer`](timer::HardwareTimer) abstraction        |
//! | [`pin`]    | Pin identifiers, active levels and the pin driver trait        |
//! | [`button`] | Debounced push buttons                                         |
//! | [`ble`]    | BLE event dispatch and device manager                          |
//! | [`mcu`]    | Microcontroller backends                                       |
//!
//! # Features
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]

pub mod ble;
pub mod button;
pub mod mcu;
pub mod pin;
pub mod pwm;
pub mod timer;
mod util;

pub use pin::{ActiveLevel, PinId};
pub use pwm::SoftPwm;
