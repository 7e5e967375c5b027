use crate::pin::ActiveLevel;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::PinState;
use embedded_hal_async::digital::Wait;

/// Configuration for debouncing a button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Debounce {
    /// Waits for no level changes for the specified duration before reporting the change.
    ///
    /// This debounce algorithm is noise-resistant.
    Defer { duration: Duration },
    /// Reports the change immediately and ignores further changes for the specified duration.
    ///
    /// This debounce algorithm is not noise-resistant.
    Eager { duration: Duration },
    /// Performs no debouncing.
    None,
}

impl Default for Debounce {
    fn default() -> Self {
        Self::Defer {
            duration: Duration::from_millis(5),
        }
    }
}

async fn wait_for_level<T: Wait>(pin: &mut T, level: PinState) -> Result<(), T::Error> {
    match level {
        PinState::High => pin.wait_for_high().await,
        PinState::Low => pin.wait_for_low().await,
    }
}

impl Debounce {
    /// Whether a level that has been stable since `changed_at` may be reported at `now`.
    pub(super) fn settled(&self, changed_at: Instant, now: Instant) -> bool {
        match self {
            Debounce::Defer { duration } => now
                .checked_duration_since(changed_at)
                .is_some_and(|stable| stable >= *duration),
            Debounce::Eager { .. } | Debounce::None => true,
        }
    }

    /// How long further changes are ignored after a change was reported.
    pub(super) fn lockout(&self) -> Duration {
        match self {
            Debounce::Eager { duration } => *duration,
            Debounce::Defer { .. } | Debounce::None => Duration::from_ticks(0),
        }
    }

    /// Waits until `pin` is in the state `on` (as seen through `active`).
    ///
    /// Returns the duration for which further changes should be ignored.
    pub async fn wait_for_state<T: Wait>(
        &self,
        pin: &mut T,
        active: ActiveLevel,
        on: bool,
    ) -> Result<Duration, T::Error> {
        let target = active.level(on);
        let opposite = active.level(!on);
        match self {
            Debounce::Defer { duration } => {
                loop {
                    wait_for_level(pin, target).await?;
                    let fut1 = Timer::after(*duration);
                    let fut2 = wait_for_level(pin, opposite);
                    match select(fut1, fut2).await {
                        Either::First(()) => break,
                        Either::Second(result) => result?,
                    }
                }
                Ok(Duration::from_ticks(0))
            }
            Debounce::Eager { duration } => {
                wait_for_level(pin, target).await?;
                Ok(*duration)
            }
            Debounce::None => {
                wait_for_level(pin, target).await?;
                Ok(Duration::from_ticks(0))
            }
        }
    }
}
