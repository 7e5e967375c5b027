use crate::timer::HardwareTimer;
use core::sync::atomic::Ordering;
use embassy_nrf::interrupt::InterruptExt;
use embassy_nrf::pac;
use embassy_nrf::pac::Interrupt;
use embassy_nrf::pac::timer::vals;
use portable_atomic::AtomicU8;

/// Bit per [`Instance`] that is currently owned by an [`NrfTimer`].
static CLAIMED: AtomicU8 = AtomicU8::new(0);

/// Compare register for edges inside a period.
const CC_EDGE: usize = 0;
/// Compare register holding the period; its event clears the counter.
const CC_PERIOD: usize = 1;
/// Capture register used to read the counter.
const CC_CAPTURE: usize = 2;

/// Timer peripherals usable for software PWM.
///
/// `TIMER0` is left out because the BLE controller needs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Timer1,
    Timer2,
    Timer3,
    Timer4,
}

impl Instance {
    fn regs(self) -> pac::timer::Timer {
        match self {
            Instance::Timer1 => pac::TIMER1,
            Instance::Timer2 => pac::TIMER2,
            Instance::Timer3 => pac::TIMER3,
            Instance::Timer4 => pac::TIMER4,
        }
    }

    fn interrupt(self) -> Interrupt {
        match self {
            Instance::Timer1 => Interrupt::TIMER1,
            Instance::Timer2 => Interrupt::TIMER2,
            Instance::Timer3 => Interrupt::TIMER3,
            Instance::Timer4 => Interrupt::TIMER4,
        }
    }

    fn mask(self) -> u8 {
        1 << self as u8
    }
}

/// Counter frequency, derived from the 16 MHz peripheral clock by a power-of-two prescaler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Frequency {
    F16MHz = 0,
    F8MHz = 1,
    F4MHz = 2,
    F2MHz = 3,
    F1MHz = 4,
    F500kHz = 5,
    F250kHz = 6,
    F125kHz = 7,
    F62500Hz = 8,
    F31250Hz = 9,
}

impl Frequency {
    pub const fn hz(self) -> u32 {
        16_000_000 >> self as u8
    }
}

/// A [`HardwareTimer`] on one of the nRF52840 `TIMER` peripherals in 32-bit mode.
///
/// `CC[1]` holds the period and clears the counter through a short, so periods do not drift with
/// interrupt latency. Edges inside a period use `CC[0]`. The NVIC line is enabled by
/// [`start`](HardwareTimer::start) and disabled by [`stop`](HardwareTimer::stop); the application
/// binds the interrupt vector to [`SoftPwm::on_interrupt`](crate::pwm::SoftPwm::on_interrupt).
pub struct NrfTimer {
    instance: Instance,
    frequency: Frequency,
    claimed: bool,
}

impl NrfTimer {
    pub const fn new(instance: Instance, frequency: Frequency) -> Self {
        Self {
            instance,
            frequency,
            claimed: false,
        }
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    fn clear_events(&self) {
        let regs = self.instance.regs();
        regs.events_compare(CC_EDGE).write_value(0);
        regs.events_compare(CC_PERIOD).write_value(0);
    }
}

impl HardwareTimer for NrfTimer {
    fn tick_rate(&self) -> u32 {
        self.frequency.hz()
    }

    fn claim(&mut self) -> bool {
        if !self.claimed {
            let mask = self.instance.mask();
            self.claimed = CLAIMED.fetch_or(mask, Ordering::AcqRel) & mask == 0;
        }
        self.claimed
    }

    fn release(&mut self) {
        if self.claimed {
            CLAIMED.fetch_and(!self.instance.mask(), Ordering::AcqRel);
            self.claimed = false;
        }
    }

    fn start(&mut self, period_ticks: u32) {
        let regs = self.instance.regs();
        regs.tasks_stop().write_value(1);
        regs.tasks_clear().write_value(1);
        regs.mode().write(|w| w.set_mode(vals::Mode::TIMER));
        regs.bitmode().write(|w| w.set_bitmode(vals::Bitmode::_32BIT));
        regs.prescaler()
            .write(|w| w.set_prescaler(self.frequency as u8));
        regs.cc(CC_PERIOD).write_value(period_ticks);
        regs.shorts().write(|w| w.set_compare_clear(CC_PERIOD, true));
        self.clear_events();

        let irq = self.instance.interrupt();
        irq.unpend();
        // SAFETY: the interrupt handler only touches state guarded by the engine's mutex.
        unsafe { irq.enable() };
        regs.tasks_start().write_value(1);
    }

    fn stop(&mut self) {
        let regs = self.instance.regs();
        let irq = self.instance.interrupt();
        irq.disable();
        regs.intenclr().write(|w| {
            w.set_compare(CC_EDGE, true);
            w.set_compare(CC_PERIOD, true);
        });
        regs.tasks_stop().write_value(1);
        self.clear_events();
        irq.unpend();
    }

    fn counter(&mut self) -> u32 {
        let regs = self.instance.regs();
        regs.tasks_capture(CC_CAPTURE).write_value(1);
        regs.cc(CC_CAPTURE).read()
    }

    fn set_compare(&mut self, tick: u32) {
        let regs = self.instance.regs();
        // The wrap is signalled by the period compare; CC[0] can not match a counter that is
        // cleared to zero.
        let (armed, idle) = if tick == 0 {
            (CC_PERIOD, CC_EDGE)
        } else {
            regs.cc(CC_EDGE).write_value(tick);
            (CC_EDGE, CC_PERIOD)
        };
        regs.intenclr().write(|w| w.set_compare(idle, true));
        regs.events_compare(armed).write_value(0);
        regs.intenset().write(|w| w.set_compare(armed, true));
    }

    fn clear_interrupt(&mut self) {
        self.clear_events();
        self.instance.interrupt().unpend();
    }
}

impl Drop for NrfTimer {
    fn drop(&mut self) {
        self.release();
    }
}
