#![allow(dead_code)]

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::digital::PinState;
use nrfkit::pin::{PinDriver, PinId};
use nrfkit::pwm::SoftPwm;
use nrfkit::timer::HardwareTimer;
use std::cell::RefCell;
use std::rc::Rc;

pub type Pwm<const N: usize> = SoftPwm<NoopRawMutex, SimTimer, RecordingPins, N>;

/// State of the simulated timer peripheral.
#[derive(Debug)]
pub struct Clock {
    pub tick_rate: u32,
    pub max_ticks: u32,
    /// Ticks since the simulation began. Never reset.
    pub now: u64,
    pub period: u32,
    pub counter: u32,
    pub running: bool,
    pub compare: Option<u32>,
    pub pending: bool,
    pub claimed: bool,
    /// Ticks that pass every time the counter is read, to model a slow interrupt handler.
    pub read_cost: u32,
}

impl Clock {
    fn advance(&mut self, ticks: u64) {
        self.now += ticks;
        if self.running && self.period > 0 {
            let counter = (u64::from(self.counter) + ticks) % u64::from(self.period);
            self.counter = counter as u32;
        }
    }

    /// Ticks until the armed compare value matches next.
    fn until_match(&self) -> Option<u64> {
        let compare = self.compare?;
        if !self.running {
            return None;
        }
        let period = u64::from(self.period);
        let distance = (u64::from(compare) + period - u64::from(self.counter)) % period;
        Some(if distance == 0 { period } else { distance })
    }
}

pub struct SimTimer {
    clock: Rc<RefCell<Clock>>,
}

impl HardwareTimer for SimTimer {
    fn tick_rate(&self) -> u32 {
        self.clock.borrow().tick_rate
    }

    fn max_ticks(&self) -> u32 {
        self.clock.borrow().max_ticks
    }

    fn claim(&mut self) -> bool {
        let mut clock = self.clock.borrow_mut();
        if clock.claimed {
            return false;
        }
        clock.claimed = true;
        true
    }

    fn release(&mut self) {
        self.clock.borrow_mut().claimed = false;
    }

    fn start(&mut self, period_ticks: u32) {
        let mut clock = self.clock.borrow_mut();
        clock.period = period_ticks;
        clock.counter = 0;
        clock.running = true;
        clock.pending = false;
    }

    fn stop(&mut self) {
        let mut clock = self.clock.borrow_mut();
        clock.running = false;
        clock.compare = None;
        clock.pending = false;
    }

    fn counter(&mut self) -> u32 {
        let mut clock = self.clock.borrow_mut();
        let counter = clock.counter;
        let cost = u64::from(clock.read_cost);
        clock.advance(cost);
        counter
    }

    fn set_compare(&mut self, tick: u32) {
        self.clock.borrow_mut().compare = Some(tick);
    }

    fn clear_interrupt(&mut self) {
        self.clock.borrow_mut().pending = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Write {
    pub at: u64,
    pub pin: PinId,
    pub level: PinState,
}

pub struct RecordingPins {
    clock: Rc<RefCell<Clock>>,
    log: Rc<RefCell<Vec<Write>>>,
}

impl PinDriver for RecordingPins {
    fn set_level(&mut self, pin: PinId, level: PinState) {
        let at = self.clock.borrow().now;
        self.log.borrow_mut().push(Write { at, pin, level });
    }
}

/// Drives a simulated timer and records every pin write with its tick.
pub struct Sim {
    pub clock: Rc<RefCell<Clock>>,
    pub log: Rc<RefCell<Vec<Write>>>,
}

impl Sim {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            clock: Rc::new(RefCell::new(Clock {
                tick_rate,
                max_ticks: u32::MAX,
                now: 0,
                period: 0,
                counter: 0,
                running: false,
                compare: None,
                pending: false,
                claimed: false,
                read_cost: 0,
            })),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn timer(&self) -> SimTimer {
        SimTimer {
            clock: self.clock.clone(),
        }
    }

    pub fn pins(&self) -> RecordingPins {
        RecordingPins {
            clock: self.clock.clone(),
            log: self.log.clone(),
        }
    }

    pub fn pwm<const N: usize>(&self) -> Pwm<N> {
        SoftPwm::new(self.timer(), self.pins()).unwrap()
    }

    pub fn now(&self) -> u64 {
        self.clock.borrow().now
    }

    pub fn set_read_cost(&self, ticks: u32) {
        self.clock.borrow_mut().read_cost = ticks;
    }

    /// Makes the timer interrupt pending without a compare match.
    pub fn raise(&self) {
        self.clock.borrow_mut().pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.clock.borrow().pending
    }

    pub fn is_running(&self) -> bool {
        self.clock.borrow().running
    }

    /// Advances time to `end`, delivering every compare match on the way.
    ///
    /// Returns the number of interrupts delivered.
    pub fn run_until<const N: usize>(&self, pwm: &Pwm<N>, end: u64) -> u32 {
        let mut interrupts = 0;
        loop {
            let next = {
                let clock = self.clock.borrow();
                clock.until_match().map(|distance| clock.now + distance)
            };
            match next {
                Some(at) if at <= end => {
                    {
                        let mut clock = self.clock.borrow_mut();
                        let now = clock.now;
                        clock.advance(at - now);
                        clock.pending = true;
                    }
                    pwm.on_interrupt();
                    interrupts += 1;
                }
                _ => {
                    let mut clock = self.clock.borrow_mut();
                    let now = clock.now;
                    if end > now {
                        clock.advance(end - now);
                    }
                    return interrupts;
                }
            }
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.log.borrow().clone()
    }

    pub fn writes_for(&self, pin: u8) -> Vec<Write> {
        self.log
            .borrow()
            .iter()
            .filter(|write| write.pin == PinId(pin))
            .copied()
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    /// Level of `pin` at `at`, after all writes at that tick.
    pub fn level_at(&self, pin: u8, at: u64) -> Option<PinState> {
        self.writes_for(pin)
            .iter()
            .filter(|write| write.at <= at)
            .last()
            .map(|write| write.level)
    }

    /// Ticks in `from..to` during which `pin` was at `level`.
    pub fn ticks_at(&self, pin: u8, level: PinState, from: u64, to: u64) -> u64 {
        let writes = self.writes_for(pin);
        let mut current = writes
            .iter()
            .filter(|write| write.at <= from)
            .last()
            .map(|write| write.level);
        let mut since = from;
        let mut total = 0;
        for write in writes.iter().filter(|write| write.at > from && write.at < to) {
            if current == Some(level) {
                total += write.at - since;
            }
            current = Some(write.level);
            since = write.at;
        }
        if current == Some(level) {
            total += to - since;
        }
        total
    }

    pub fn high_ticks(&self, pin: u8, from: u64, to: u64) -> u64 {
        self.ticks_at(pin, PinState::High, from, to)
    }
}
