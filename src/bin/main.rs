#![no_std]
#![no_main]

#[path = "../tlv493d.rs"]
mod tlv493d;
use crate::tlv493d::{PowerMode, Sample, Tlv493d, TLV493D_ADDR_HIGH};

#[path = "../report.rs"]
mod report;
use crate::report::{format_row, header_due, HEADER_ROW, READ_ERROR_MARKER};

use core::cell::RefCell;

use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::{bind_interrupts, i2c, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

// 2 spots
static SAMPLES: Channel<CriticalSectionRawMutex, Sample, 2> = Channel::new();

// Time to wait before the next read
const SAMPLE_INTERVAL_MS: u64 = 1;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());
    info!("TLV493D monitor starting");

    let mut i2c_config = embassy_stm32::i2c::Config::default();
    i2c_config.timeout = Duration::from_millis(100); // Set a 100ms timeout

    let i2c = I2c::new(
        p.I2C1,
        p.PB6,
        p.PB7,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH0,
        Hertz(100_000),
        i2c_config,
    );

    spawner.spawn(sample_field(i2c)).unwrap();
    spawner.spawn(report_samples()).unwrap();
}

#[embassy_executor::task]
async fn sample_field(i2c: I2c<'static, Async>) {
    let i2c_ref: RefCell<I2c<'static, Async>> = RefCell::new(i2c);
    let mut sensor = Tlv493d::new(&i2c_ref, TLV493D_ADDR_HIGH, PowerMode::LowPower);

    if let Err(e) = sensor.init().await {
        error!(
            "TLV493D initialization failed: {}",
            defmt::Debug2Format(&e)
        );
        // No recovery path without a responding bus; park this task.
        loop {
            Timer::after_secs(1).await;
        }
    }

    loop {
        Timer::after_millis(SAMPLE_INTERVAL_MS).await;
        match sensor.read().await {
            Ok(sample) => SAMPLES.send(sample).await,
            Err(e) => {
                warn!("TLV493D read failed: {}", defmt::Debug2Format(&e));
            }
        }
    }
}

#[embassy_executor::task]
async fn report_samples() {
    let mut received: u32 = 0;
    loop {
        let sample = SAMPLES.receive().await;
        if header_due(received) {
            info!("{=str}", HEADER_ROW);
        }
        received = received.wrapping_add(1);

        if sample.valid {
            let row = format_row(&sample);
            info!("{=str}", row.as_str());
        } else {
            warn!("{=str}", READ_ERROR_MARKER);
        }
    }
}
