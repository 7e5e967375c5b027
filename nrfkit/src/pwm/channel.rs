use super::Error;
use crate::pin::{ActiveLevel, PinId};
use crate::util::trace;
use core::sync::atomic::Ordering;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize};

/// Clamps a normalized duty to `0.0..=1.0`. NaN maps to `0.0`.
pub fn clamp_duty(duty: f32) -> f32 {
    if duty.is_nan() { 0.0 } else { duty.clamp(0.0, 1.0) }
}

/// Converts a normalized duty into timer ticks, rounding half up.
///
/// The same `duty` and `period_ticks` always give the same result and the result never exceeds
/// `period_ticks`.
pub fn duty_to_ticks(duty: f32, period_ticks: u32) -> u32 {
    let duty = clamp_duty(duty);
    if duty >= 1.0 {
        return period_ticks;
    }
    let ticks = f64::from(duty) * f64::from(period_ticks) + 0.5;
    (ticks as u32).min(period_ticks)
}

/// A snapshot of one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    pub pin: PinId,
    pub active_level: ActiveLevel,
    pub duty: f32,
    pub duty_ticks: u32,
}

struct Slot {
    pin: AtomicU8,
    active_low: AtomicBool,
    /// Bits of the last accepted `f32` duty.
    duty: AtomicU32,
    duty_ticks: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            pin: AtomicU8::new(0),
            active_low: AtomicBool::new(false),
            duty: AtomicU32::new(0),
            duty_ticks: AtomicU32::new(0),
        }
    }

    fn duty(&self) -> f32 {
        f32::from_bits(self.duty.load(Ordering::Relaxed))
    }
}

/// Fixed-capacity set of PWM channels, looked up by pin.
///
/// Duties are single atomic words, so the interrupt side never observes a torn update. Slots are
/// published by bumping the length after they are filled in; a slot below [`len`](Self::len) is
/// never changed except for its duty.
pub struct ChannelTable<const N: usize> {
    slots: [Slot; N],
    len: AtomicUsize,
    period_ticks: AtomicU32,
}

impl<const N: usize> ChannelTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::new() }; N],
            len: AtomicUsize::new(0),
            period_ticks: AtomicU32::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn period_ticks(&self) -> u32 {
        self.period_ticks.load(Ordering::Relaxed)
    }

    /// Sets the period and re-derives the tick count of every channel from its stored duty.
    ///
    /// Must not race with the interrupt side; the engine only calls it while stopped.
    pub fn set_period_ticks(&self, period_ticks: u32) {
        self.period_ticks.store(period_ticks, Ordering::Relaxed);
        for slot in &self.slots[..self.len()] {
            let ticks = duty_to_ticks(slot.duty(), period_ticks);
            slot.duty_ticks.store(ticks, Ordering::Release);
        }
    }

    /// Returns the index of the channel bound to `pin`.
    pub fn find(&self, pin: PinId) -> Option<usize> {
        self.slots[..self.len()]
            .iter()
            .position(|slot| slot.pin.load(Ordering::Relaxed) == pin.0)
    }

    /// Adds a channel for `pin` with the given duty and returns its index.
    ///
    /// The duty is in place before the channel becomes visible, so the interrupt side never
    /// latches a half-built slot. If `pin` already has a channel, its index is returned and the
    /// channel is left as is.
    ///
    /// Insertions must be serialized by the caller; [`SoftPwm`](super::SoftPwm) does so under
    /// its lock. The table is left unchanged on error.
    pub fn insert(&self, pin: PinId, active_level: ActiveLevel, duty: f32) -> Result<usize, Error> {
        if let Some(index) = self.find(pin) {
            return Ok(index);
        }
        let index = self.len();
        let Some(slot) = self.slots.get(index) else {
            return Err(Error::CapacityExceeded);
        };
        slot.pin.store(pin.0, Ordering::Relaxed);
        slot.active_low
            .store(active_level == ActiveLevel::Low, Ordering::Relaxed);
        self.store_duty(slot, duty);
        self.len.store(index + 1, Ordering::Release);
        Ok(index)
    }

    /// Stores a new duty for the channel at `index`. Out-of-range duties are clamped.
    pub fn set_duty(&self, index: usize, duty: f32) {
        if let Some(slot) = self.slots[..self.len()].get(index) {
            self.store_duty(slot, duty);
        }
    }

    fn store_duty(&self, slot: &Slot, duty: f32) {
        let clamped = clamp_duty(duty);
        if clamped != duty {
            trace!("Clamped duty {} to {}", duty, clamped);
        }
        let ticks = duty_to_ticks(clamped, self.period_ticks());
        slot.duty.store(clamped.to_bits(), Ordering::Relaxed);
        slot.duty_ticks.store(ticks, Ordering::Release);
    }

    pub fn channel(&self, index: usize) -> Option<Channel> {
        let slot = self.slots[..self.len()].get(index)?;
        Some(Channel {
            pin: self.pin(index),
            active_level: self.active_level(index),
            duty: slot.duty(),
            duty_ticks: slot.duty_ticks.load(Ordering::Acquire),
        })
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        (0..self.len()).filter_map(|index| self.channel(index))
    }

    pub(crate) fn pin(&self, index: usize) -> PinId {
        PinId(self.slots[index].pin.load(Ordering::Relaxed))
    }

    pub(crate) fn active_level(&self, index: usize) -> ActiveLevel {
        if self.slots[index].active_low.load(Ordering::Relaxed) {
            ActiveLevel::Low
        } else {
            ActiveLevel::High
        }
    }

    pub(crate) fn duty_ticks(&self, index: usize) -> u32 {
        self.slots[index].duty_ticks.load(Ordering::Acquire)
    }
}

impl<const N: usize> Default for ChannelTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
