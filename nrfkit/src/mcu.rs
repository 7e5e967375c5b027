//! Microcontroller specific implementations of the crate's hardware traits.

#[cfg(feature = "nrf52840")]
pub mod nrf52840;
