use super::ChannelTable;
use crate::pin::PinId;
use arrayvec::ArrayVec;
use embedded_hal::digital::PinState;

/// A level change the interrupt handler must apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Toggle {
    pub pin: PinId,
    pub level: PinState,
}

/// Result of one scheduler step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule<const N: usize> {
    /// Absolute tick of the next edge or period boundary.
    pub deadline: u64,
    /// `deadline` as a counter value, in `0..period_ticks`. `0` means the period wrap.
    pub compare: u32,
    /// Pins whose level changes now. Each pin appears at most once.
    pub toggles: ArrayVec<Toggle, N>,
}

#[derive(Clone, Copy)]
struct Lane {
    duty_ticks: u32,
    active: bool,
    /// Last logical state written to the pin.
    output: Option<bool>,
    falling_edge: Option<u64>,
}

impl Lane {
    const IDLE: Self = Self {
        duty_ticks: 0,
        active: false,
        output: None,
        falling_edge: None,
    };
}

/// Computes the edge stream of all channels sharing one timer.
///
/// Ticks are absolute (`u64`, zero at the last [`restart`](Self::restart)). Every period starts
/// with a boundary at which each channel latches its duty from the [`ChannelTable`] and goes
/// active unless its duty is zero. A channel with `0 < duty < period` then has one falling edge
/// at `cycle_start + duty`. A full-duty channel never falls, a zero-duty channel never rises.
///
/// The scheduler performs no I/O; [`fire`](Self::fire) returns what to write to the pins and
/// when to wake up next.
pub struct EdgeScheduler<const N: usize> {
    lanes: [Lane; N],
    /// Channels taking part in the current cycle.
    known: usize,
    period_ticks: u32,
    cycle_start: u64,
    last_tick: u64,
    armed: u64,
    tolerance: u32,
    fresh: bool,
}

impl<const N: usize> EdgeScheduler<N> {
    /// `tolerance` is how many ticks early an edge may be taken to absorb interrupt latency.
    pub const fn new(tolerance: u32) -> Self {
        Self {
            lanes: [Lane::IDLE; N],
            known: 0,
            period_ticks: 0,
            cycle_start: 0,
            last_tick: 0,
            armed: 0,
            tolerance,
            fresh: true,
        }
    }

    /// Absolute tick at which the current period began.
    pub fn cycle_start(&self) -> u64 {
        self.cycle_start
    }

    /// Absolute tick of the last deadline handed out by [`fire`](Self::fire).
    pub fn armed(&self) -> u64 {
        self.armed
    }

    /// Latest tick passed to [`fire`](Self::fire).
    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Starts over at absolute tick 0. The next [`fire`](Self::fire) begins a new period.
    ///
    /// Pins keep their last written level; only actual changes are reported later on.
    pub fn restart(&mut self, period_ticks: u32) {
        self.period_ticks = period_ticks;
        self.cycle_start = 0;
        self.last_tick = 0;
        self.armed = 0;
        self.known = 0;
        self.fresh = true;
        for lane in &mut self.lanes {
            lane.active = false;
            lane.falling_edge = None;
        }
    }

    /// Drives every registered channel inactive and forgets pending edges.
    pub fn park(&mut self, table: &ChannelTable<N>) -> ArrayVec<Toggle, N> {
        self.known = table.len().min(N);
        for lane in &mut self.lanes[..self.known] {
            lane.active = false;
            lane.falling_edge = None;
        }
        self.fresh = true;
        self.collect_toggles(table)
    }

    /// Maps a counter value to the smallest absolute tick that is not before `floor`.
    ///
    /// The counter is assumed to have wrapped at most once since the current period began.
    pub fn resolve(&self, counter: u32, floor: u64) -> u64 {
        let tick = self.cycle_start + u64::from(counter);
        if tick >= floor {
            tick
        } else {
            tick + u64::from(self.period_ticks)
        }
    }

    /// Whether `deadline` has already passed at `now`.
    pub fn is_due(&self, deadline: u64, now: u64) -> bool {
        deadline <= now
    }

    /// Handles everything due at `now` and returns the next deadline.
    ///
    /// Falling edges up to the latency tolerance ahead of `now` are taken early. The period
    /// boundary is never taken early, and a falling edge and the following rise are never
    /// merged into one call: if both are due, the returned deadline is already due and the
    /// caller fires again.
    pub fn fire(&mut self, now: u64, table: &ChannelTable<N>) -> Schedule<N> {
        let period = u64::from(self.period_ticks.max(1));

        if self.fresh {
            self.fresh = false;
            self.begin_cycle(table);
        } else {
            let horizon = now + u64::from(self.tolerance);
            let mut fell = false;
            for lane in &mut self.lanes[..self.known] {
                if lane.falling_edge.is_some_and(|edge| edge <= horizon) {
                    lane.active = false;
                    lane.falling_edge = None;
                    fell = true;
                }
            }

            let boundary = self.cycle_start + period;
            if !fell && boundary <= now {
                // Whole periods lost to latency are skipped, not replayed.
                let missed = (now - boundary) / period;
                self.cycle_start = boundary + missed * period;
                self.begin_cycle(table);
            }
        }

        self.last_tick = self.last_tick.max(now);

        let boundary = self.cycle_start + period;
        let deadline = self.lanes[..self.known]
            .iter()
            .filter_map(|lane| lane.falling_edge)
            .fold(boundary, u64::min);
        let offset = deadline - self.cycle_start;
        let compare = if offset >= period { 0 } else { offset as u32 };
        self.armed = deadline;

        Schedule {
            deadline,
            compare,
            toggles: self.collect_toggles(table),
        }
    }

    fn begin_cycle(&mut self, table: &ChannelTable<N>) {
        let period_ticks = self.period_ticks;
        let cycle_start = self.cycle_start;
        self.known = table.len().min(N);
        for (index, lane) in self.lanes[..self.known].iter_mut().enumerate() {
            let duty_ticks = table.duty_ticks(index).min(period_ticks);
            lane.duty_ticks = duty_ticks;
            lane.active = duty_ticks > 0;
            lane.falling_edge =
                (duty_ticks > 0 && duty_ticks < period_ticks).then(|| cycle_start + u64::from(duty_ticks));
        }
    }

    fn collect_toggles(&mut self, table: &ChannelTable<N>) -> ArrayVec<Toggle, N> {
        let mut toggles = ArrayVec::new();
        for (index, lane) in self.lanes[..self.known].iter_mut().enumerate() {
            if lane.output == Some(lane.active) {
                continue;
            }
            lane.output = Some(lane.active);
            toggles.push(Toggle {
                pin: table.pin(index),
                level: table.active_level(index).level(lane.active),
            });
        }
        toggles
    }
}
