//! Software PWM over a single hardware timer.
//!
//! [`SoftPwm`] produces independent pulse trains on up to `N` pins from one
//! [`HardwareTimer`](crate::timer::HardwareTimer) and its compare interrupt. All channels share one
//! period; each has its own duty.
//!
//! The application loop calls [`SoftPwm::output`] to change duties. The platform's timer
//! interrupt handler calls [`SoftPwm::on_interrupt`], which toggles the pins that are due and
//! programs the next compare value.
//!
//! ```ignore
//! static PWM: OnceLock<SoftPwm<CriticalSectionRawMutex, NrfTimer, Leds, 4>> = OnceLock::new();
//!
//! let pwm = PWM.get_or_init(|| unwrap!(SoftPwm::new(timer, leds)));
//! pwm.period(0.01)?;
//! pwm.enable()?;
//! pwm.output(PinId(17), 0.25)?;
//!
//! #[interrupt]
//! fn TIMER1() {
//!     if let Some(pwm) = PWM.try_get() {
//!         pwm.on_interrupt();
//!     }
//! }
//! ```

mod channel;
mod scheduler;

pub use channel::{Channel, ChannelTable, clamp_duty, duty_to_ticks};
pub use scheduler::{EdgeScheduler, Schedule, Toggle};

use crate::pin::{ActiveLevel, PinDriver, PinId};
use crate::timer::HardwareTimer;
use crate::util::{debug, warn};
use core::cell::RefCell;
use core::sync::atomic::Ordering;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use portable_atomic::AtomicU32;

/// Shortest period the engine accepts.
pub const MIN_PERIOD_TICKS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// [`SoftPwm::enable`] was called before a period was set.
    #[display("no PWM period configured")]
    NotConfigured,
    /// [`SoftPwm::period`] was called while running.
    #[display("operation not allowed while the PWM is running")]
    InvalidState,
    /// A new channel was requested but the channel table is full.
    #[display("channel table is full")]
    CapacityExceeded,
    /// The hardware timer is already claimed by another consumer.
    #[display("hardware timer is unavailable")]
    HardwareUnavailable,
    /// The requested period can not be represented with the timer.
    #[display("period out of range for the timer")]
    InvalidPeriod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No period configured yet.
    Disabled,
    /// Period configured, timer stopped.
    Armed,
    Running,
}

/// Configuration for [`SoftPwm`].
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// How many ticks early a falling edge may be taken when the interrupt handles a nearby
    /// deadline.
    ///
    /// Period boundaries are never taken early, so rising edges stay tick-exact. A late
    /// interrupt still emits its edges. `0` gives tick-exact falling edges at the cost of more
    /// interrupts when edges are close together.
    pub latency_tolerance_ticks: u32,
}

struct Driver<T, P, const N: usize> {
    timer: T,
    pins: P,
    scheduler: EdgeScheduler<N>,
    state: State,
}

impl<T: HardwareTimer, P: PinDriver, const N: usize> Driver<T, P, N> {
    fn apply(&mut self, toggles: &[Toggle]) {
        for toggle in toggles {
            self.pins.set_level(toggle.pin, toggle.level);
        }
    }
}

/// Multi-channel software PWM engine.
///
/// `M` is the raw mutex guarding the state shared with the interrupt handler; on target this is
/// [`CriticalSectionRawMutex`](embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex).
pub struct SoftPwm<M: RawMutex, T: HardwareTimer, P: PinDriver, const N: usize> {
    channels: ChannelTable<N>,
    driver: Mutex<M, RefCell<Driver<T, P, N>>>,
    tick_rate: u32,
    max_ticks: u32,
    overruns: AtomicU32,
}

impl<M: RawMutex, T: HardwareTimer, P: PinDriver, const N: usize> SoftPwm<M, T, P, N> {
    /// Creates an engine with the default [`Config`].
    pub fn new(timer: T, pins: P) -> Result<Self, Error> {
        Self::with_config(timer, pins, Config::default())
    }

    /// Creates an engine that owns `timer` and `pins`.
    ///
    /// Fails with [`Error::HardwareUnavailable`] if the timer can not be claimed.
    pub fn with_config(mut timer: T, pins: P, config: Config) -> Result<Self, Error> {
        if !timer.claim() {
            warn!("Hardware timer already claimed");
            return Err(Error::HardwareUnavailable);
        }
        let tick_rate = timer.tick_rate();
        let max_ticks = timer.max_ticks();
        Ok(Self {
            channels: ChannelTable::new(),
            driver: Mutex::new(RefCell::new(Driver {
                timer,
                pins,
                scheduler: EdgeScheduler::new(config.latency_tolerance_ticks),
                state: State::Disabled,
            })),
            tick_rate,
            max_ticks,
            overruns: AtomicU32::new(0),
        })
    }

    /// Sets the period shared by all channels.
    ///
    /// The period is rounded to the nearest timer tick, so [`effective_period`] may differ
    /// slightly from `seconds`. Channel tick counts are re-derived from their duties.
    ///
    /// [`effective_period`]: Self::effective_period
    pub fn period(&self, seconds: f32) -> Result<(), Error> {
        let ticks = f64::from(seconds) * f64::from(self.tick_rate) + 0.5;
        let valid = seconds.is_finite()
            && ticks >= f64::from(MIN_PERIOD_TICKS)
            && ticks <= f64::from(self.max_ticks);

        self.driver.lock(|driver| {
            let mut driver = driver.borrow_mut();
            if driver.state == State::Running {
                return Err(Error::InvalidState);
            }
            if !valid {
                warn!("Rejected PWM period of {} s", seconds);
                return Err(Error::InvalidPeriod);
            }
            self.channels.set_period_ticks(ticks as u32);
            driver.state = State::Armed;
            debug!("PWM period set to {} ticks", ticks as u32);
            Ok(())
        })
    }

    /// Starts the timer. Does nothing if already running.
    pub fn enable(&self) -> Result<(), Error> {
        self.driver.lock(|driver| {
            let mut driver = driver.borrow_mut();
            match driver.state {
                State::Running => return Ok(()),
                State::Disabled => return Err(Error::NotConfigured),
                State::Armed => {}
            }
            let period_ticks = self.channels.period_ticks();
            driver.scheduler.restart(period_ticks);
            let schedule = driver.scheduler.fire(0, &self.channels);
            driver.apply(&schedule.toggles);
            driver.timer.set_compare(schedule.compare);
            driver.timer.start(period_ticks);
            driver.state = State::Running;
            debug!("PWM enabled with {} channels", self.channels.len());
            Ok(())
        })
    }

    /// Stops the timer and drives every channel to its inactive level.
    ///
    /// No pin changes after this returns, even if a timer interrupt was already pending.
    pub fn disable(&self) {
        self.driver.lock(|driver| {
            let mut driver = driver.borrow_mut();
            if driver.state != State::Running {
                return;
            }
            driver.timer.stop();
            let toggles = driver.scheduler.park(&self.channels);
            driver.apply(&toggles);
            driver.state = State::Armed;
            debug!("PWM disabled");
        })
    }

    /// Sets the duty of the channel on `pin`, creating it (active high) on first use.
    ///
    /// `duty` is clamped to `0.0..=1.0`. The change takes effect at the next period boundary,
    /// also for a channel created while running.
    pub fn output(&self, pin: impl Into<PinId>, duty: f32) -> Result<(), Error> {
        let pin = pin.into();
        let index = match self.channels.find(pin) {
            Some(index) => index,
            None => self.register(pin, ActiveLevel::High, duty)?,
        };
        self.channels.set_duty(index, duty);
        Ok(())
    }

    /// Creates a channel on `pin` with the given active level and a duty of zero.
    ///
    /// Does nothing if the pin already has a channel.
    pub fn attach(&self, pin: impl Into<PinId>, active_level: ActiveLevel) -> Result<(), Error> {
        self.register(pin.into(), active_level, 0.0).map(|_| ())
    }

    fn register(&self, pin: PinId, active_level: ActiveLevel, duty: f32) -> Result<usize, Error> {
        self.driver.lock(|_| {
            self.channels
                .insert(pin, active_level, duty)
                .inspect_err(|_| {
                    warn!("No free PWM channel for pin {}", pin.0);
                })
        })
    }

    /// Timer interrupt entry point.
    ///
    /// Must be called from the interrupt handler of the timer passed to [`new`](Self::new), once
    /// per compare match.
    pub fn on_interrupt(&self) {
        self.driver.lock(|driver| {
            let mut driver = driver.borrow_mut();
            let driver = &mut *driver;
            driver.timer.clear_interrupt();
            if driver.state != State::Running {
                return;
            }

            let floor = driver.scheduler.armed().max(driver.scheduler.last_tick());
            let mut now = driver.scheduler.resolve(driver.timer.counter(), floor);
            // More rounds are needed when the handler runs past the next deadline, or when a
            // late interrupt finds a falling edge and the boundary after it both due.
            for _ in 0..N + 2 {
                let schedule = driver.scheduler.fire(now, &self.channels);
                driver.apply(&schedule.toggles);
                driver.timer.set_compare(schedule.compare);

                let last_tick = driver.scheduler.last_tick();
                now = driver.scheduler.resolve(driver.timer.counter(), last_tick);
                if !driver.scheduler.is_due(schedule.deadline, now) {
                    return;
                }
                driver.timer.clear_interrupt();
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
            warn!("PWM interrupt could not keep up at tick {}", now);
        })
    }

    pub fn state(&self) -> State {
        self.driver.lock(|driver| driver.borrow().state)
    }

    pub fn period_ticks(&self) -> u32 {
        self.channels.period_ticks()
    }

    /// The period actually produced, in seconds.
    pub fn effective_period(&self) -> f32 {
        (f64::from(self.period_ticks()) / f64::from(self.tick_rate.max(1))) as f32
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// The last duty accepted for `pin`, always within `0.0..=1.0`.
    pub fn duty(&self, pin: impl Into<PinId>) -> Option<f32> {
        self.channel(pin).map(|channel| channel.duty)
    }

    pub fn duty_ticks(&self, pin: impl Into<PinId>) -> Option<u32> {
        self.channel(pin).map(|channel| channel.duty_ticks)
    }

    pub fn channel(&self, pin: impl Into<PinId>) -> Option<Channel> {
        let index = self.channels.find(pin.into())?;
        self.channels.channel(index)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.channels()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub const fn capacity(&self) -> usize {
        self.channels.capacity()
    }

    /// Number of times the interrupt handler had to run again because it overran a deadline.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl<M: RawMutex, T: HardwareTimer, P: PinDriver, const N: usize> Drop for SoftPwm<M, T, P, N> {
    fn drop(&mut self) {
        let driver = self.driver.get_mut().get_mut();
        driver.timer.stop();
        driver.timer.release();
    }
}
