//! Debounced push buttons.
//!
//! A [`Button`] turns the raw level of an input pin into [`Event::Pressed`] and
//! [`Event::Released`] events. It can be polled from a main loop with [`Button::poll`] or awaited
//! with [`Button::wait`] when the pin supports edge waiting.

mod debounce;

pub use debounce::Debounce;

use crate::pin::ActiveLevel;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{InputPin, PinState};
use embedded_hal_async::digital::Wait;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Nothing,
    Pressed,
    Released,
}

/// Configuration for a [`Button`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The level the pin is at while the button is held down.
    pub active: ActiveLevel,
    pub debounce: Debounce,
}

impl Default for Config {
    /// An active-low button (pulled up, shorted to ground when pressed) with the default
    /// [`Debounce`].
    fn default() -> Self {
        Self {
            active: ActiveLevel::Low,
            debounce: Debounce::default(),
        }
    }
}

pub struct Button<I> {
    pin: I,
    config: Config,
    pressed: bool,
    raw: bool,
    changed_at: Instant,
    ignore_until: Option<Instant>,
    lockout: Duration,
}

impl<I: InputPin> Button<I> {
    /// Creates a button that starts out released.
    pub fn new(pin: I, config: Config) -> Self {
        Self {
            pin,
            config,
            pressed: false,
            raw: false,
            changed_at: Instant::from_ticks(0),
            ignore_until: None,
            lockout: Duration::from_ticks(0),
        }
    }

    /// Samples the pin and returns the debounced event at `now`.
    ///
    /// Call this regularly; with [`Debounce::Defer`] an event is reported once the level has been
    /// stable for the debounce duration.
    pub fn poll(&mut self, now: Instant) -> Result<Event, I::Error> {
        let level = PinState::from(self.pin.is_high()?);
        let raw = self.config.active.is_active(level);
        if raw != self.raw {
            self.raw = raw;
            self.changed_at = now;
        }

        if let Some(until) = self.ignore_until {
            if now < until {
                return Ok(Event::Nothing);
            }
            self.ignore_until = None;
        }

        if raw == self.pressed || !self.config.debounce.settled(self.changed_at, now) {
            return Ok(Event::Nothing);
        }

        let lockout = self.config.debounce.lockout();
        if lockout > Duration::from_ticks(0) {
            self.ignore_until = Some(now + lockout);
        }
        Ok(self.report(raw))
    }

    /// The debounced state.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn free(self) -> I {
        self.pin
    }

    fn report(&mut self, pressed: bool) -> Event {
        self.pressed = pressed;
        if pressed {
            Event::Pressed
        } else {
            Event::Released
        }
    }
}

impl<I: InputPin + Wait> Button<I> {
    /// Waits for the next debounced press or release.
    pub async fn wait(&mut self) -> Result<Event, I::Error> {
        if self.lockout > Duration::from_ticks(0) {
            Timer::after(self.lockout).await;
        }
        let pressed = !self.pressed;
        self.lockout = self
            .config
            .debounce
            .wait_for_state(&mut self.pin, self.config.active, pressed)
            .await?;
        self.raw = pressed;
        Ok(self.report(pressed))
    }
}
