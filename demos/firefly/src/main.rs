#![no_main]
#![no_std]
#![feature(impl_trait_in_assoc_type)]

use defmt::unwrap;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::once_lock::OnceLock;
use embassy_time::Timer;
use micromath::F32Ext;
use nrfkit::ActiveLevel;
use nrfkit::mcu::nrf52840::{Frequency, Instance, NrfTimer};
use nrfkit::pin::OutputPins;
use nrfkit::pwm::SoftPwm;
use panic_probe as _;

const NUM_LEDS: usize = 4;

type Leds = OutputPins<Output<'static>, NUM_LEDS>;

static PWM: OnceLock<SoftPwm<CriticalSectionRawMutex, NrfTimer, Leds, NUM_LEDS>> =
    OnceLock::new();

fn map(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());

    // LEDs of the nRF52840-DK, lit when driven low.
    let leds = OutputPins::new([
        Output::new(p.P0_13, Level::High, OutputDrive::Standard),
        Output::new(p.P0_14, Level::High, OutputDrive::Standard),
        Output::new(p.P0_15, Level::High, OutputDrive::Standard),
        Output::new(p.P0_16, Level::High, OutputDrive::Standard),
    ]);
    let timer = NrfTimer::new(Instance::Timer1, Frequency::F1MHz);
    let pwm = PWM.get_or_init(|| unwrap!(SoftPwm::new(timer, leds)));

    for pin in 0..NUM_LEDS as u8 {
        unwrap!(pwm.attach(pin, ActiveLevel::Low));
    }
    unwrap!(pwm.period(0.01));
    unwrap!(pwm.enable());
    defmt::info!("FireFly running at {} s period", pwm.effective_period());

    let mut degrees: [u16; NUM_LEDS] = [0, 10, 20, 30];
    loop {
        for (pin, degree) in degrees.iter_mut().enumerate() {
            *degree = (*degree + 10) % 360;
            let y = f32::from(*degree).to_radians().sin();
            unwrap!(pwm.output(pin as u8, map(y, -1.0, 1.0, 0.0, 1.0)));
        }
        Timer::after_millis(10).await;
    }
}

#[interrupt]
fn TIMER1() {
    if let Some(pwm) = PWM.try_get() {
        pwm.on_interrupt();
    }
}
