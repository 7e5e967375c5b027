//! Output pins as seen by the software PWM engine.

use crate::util::error;
use embedded_hal::digital::{OutputPin, PinState};

/// Identifier of a logical output pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(pub u8);

impl From<u8> for PinId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// The electrical level that counts as "on".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    #[default]
    High,
    Low,
}

impl ActiveLevel {
    /// Returns the electrical level for the logical state `on`.
    pub const fn level(self, on: bool) -> PinState {
        match (self, on) {
            (ActiveLevel::High, true) | (ActiveLevel::Low, false) => PinState::High,
            (ActiveLevel::High, false) | (ActiveLevel::Low, true) => PinState::Low,
        }
    }

    /// Returns whether the electrical level `level` means "on".
    pub fn is_active(self, level: PinState) -> bool {
        self.level(true) == level
    }
}

/// Drives output pins to a level.
///
/// Implementations are called from interrupt context and must not block.
pub trait PinDriver {
    fn set_level(&mut self, pin: PinId, level: PinState);
}

impl<T: PinDriver + ?Sized> PinDriver for &mut T {
    fn set_level(&mut self, pin: PinId, level: PinState) {
        T::set_level(self, pin, level)
    }
}

/// A [`PinDriver`] over a fixed set of [`OutputPin`]s, where [`PinId`] `n` is the `n`-th pin.
///
/// Writes to unknown pins and failing writes are logged and otherwise ignored.
pub struct OutputPins<P, const N: usize> {
    pins: [P; N],
}

impl<P: OutputPin, const N: usize> OutputPins<P, N> {
    pub const fn new(pins: [P; N]) -> Self {
        Self { pins }
    }

    pub fn free(self) -> [P; N] {
        self.pins
    }
}

impl<P: OutputPin, const N: usize> PinDriver for OutputPins<P, N> {
    fn set_level(&mut self, pin: PinId, level: PinState) {
        let Some(output) = self.pins.get_mut(usize::from(pin.0)) else {
            error!("No output pin with id {}", pin.0);
            return;
        };
        if output.set_state(level).is_err() {
            error!("Failed to set pin {}", pin.0);
        }
    }
}
