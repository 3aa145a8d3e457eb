#![allow(dead_code)]

use core::cell::RefCell;
use defmt::*;
use embassy_stm32::i2c::{Error as I2cError, I2c};
use embassy_stm32::mode::Async;
use embassy_time::Timer;
use num_traits::float::Float;

// TLV493D-A1B6 I2C addresses (selected by the ADDR pin level at power-up)
pub const TLV493D_ADDR_LOW: u8 = 0x1F;
pub const TLV493D_ADDR_HIGH: u8 = 0x5E;

const GENERAL_CALL_ADDRESS: u8 = 0x00;
const MASTER_RESET_CMD: u8 = 0xFF;

pub const REGISTER_IMAGE_LEN: usize = 10; // read registers 0x00 - 0x09
pub const SAMPLE_FRAME_LEN: usize = 7; // read registers 0x00 - 0x06
pub const CONFIG_FRAME_LEN: usize = 4; // write registers 0x00 - 0x03

// --- Offsets within a read frame ---
const REG_BX_MSB: usize = 0; // Bx[11:4]
const REG_BY_MSB: usize = 1; // By[11:4]
const REG_BZ_MSB: usize = 2; // Bz[11:4]
const REG_TEMP_MSB: usize = 3; // bits 7:4 Temp[11:8], bits 1:0 channel status
const REG_BXY_LSB: usize = 4; // bits 7:4 Bx[3:0], bits 3:0 By[3:0]
const REG_BZ_LSB: usize = 5; // bits 3:0 Bz[3:0]
const REG_TEMP_LSB: usize = 6; // Temp[7:0]
const REG_FACTSET1: usize = 7;
const REG_FACTSET2: usize = 8;
const REG_FACTSET3: usize = 9;

// Factory bits that write registers 1 and 3 must round-trip, and the mode
// bits the presets are allowed to set. The two groups are disjoint.
const FACTSET1_MASK: u8 = 0b0111_1000; // read reg 7 bits 6:3 -> WR1 bits 6:3
const FACTSET3_MASK: u8 = 0b0000_1111; // read reg 9 bits 3:0 -> WR3 bits 3:0
const MODE1_MASK: u8 = 0b0000_0111; // WR1: INT / FAST / LOW
const MODE2_MASK: u8 = 0b1110_0000; // WR3: T / LP period / parity test

// Bits 1:0 of the Temp MSB register are nonzero while the sensor is still
// updating Bx, By, Bz or T; a frame read then mixes two measurement cycles.
const CHANNEL_BUSY_MASK: u8 = 0b0000_0011;

// Conversion factors
const MAGNETIC_SENSITIVITY_MT_PER_LSB: f32 = 0.098;
const TEMP_OFFSET_LSB_AT_25C: i16 = 340;
const TEMP_SENSITIVITY_C_PER_LSB: f32 = 1.1;

const DELAY_RESET_RECOVERY_MS: u64 = 2; // t_RES after a general-call reset

/// Sampling-rate / power trade-off. Chosen once when the driver is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerMode {
    UltraLowPower, // 10Hz update rate
    LowPower,      // 100Hz update rate
    FastMode,      // ~1kHz, not supported by this firmware's polling loop
    PowerDown,
}

impl PowerMode {
    /// Mode bit pattern for the four write registers. Only bytes 1 and 3
    /// carry mode bits and they never reach into the factory bit positions.
    pub const fn pattern(self) -> [u8; CONFIG_FRAME_LEN] {
        match self {
            PowerMode::UltraLowPower => [0b0000_0000, 0b0000_0101, 0b0000_0000, 0b0000_0000],
            PowerMode::LowPower => [0b0000_0000, 0b0000_0101, 0b0000_0000, 0b0100_0000],
            PowerMode::FastMode => [0b0000_0000, 0b0000_0110, 0b0000_0000, 0b0000_0000],
            PowerMode::PowerDown => [0b0000_0000, 0b0000_0001, 0b0000_0000, 0b0000_0000],
        }
    }

    const fn startup_delay_ms(self) -> u64 {
        match self {
            PowerMode::FastMode => 2,
            PowerMode::LowPower => 12,
            PowerMode::UltraLowPower => 100,
            PowerMode::PowerDown => 1,
        }
    }
}

#[derive(Debug)]
pub enum Tlv493dError {
    I2c(I2cError),
    NotInitialized,
}

impl From<I2cError> for Tlv493dError {
    fn from(e: I2cError) -> Self {
        Tlv493dError::I2c(e)
    }
}

/// One decoded measurement instant. `valid` is false when the channel-busy
/// bits flagged a torn read; x/y/z/t are not authoritative in that case.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub t: i16,
    pub valid: bool,
}

impl Sample {
    /// Magnetic field vector in mT.
    pub fn field_mt(&self) -> (f32, f32, f32) {
        (
            self.x as f32 * MAGNETIC_SENSITIVITY_MT_PER_LSB,
            self.y as f32 * MAGNETIC_SENSITIVITY_MT_PER_LSB,
            self.z as f32 * MAGNETIC_SENSITIVITY_MT_PER_LSB,
        )
    }

    /// Magnitude of the field vector in mT.
    pub fn magnitude_mt(&self) -> f32 {
        let (bx, by, bz) = self.field_mt();
        (bx * bx + by * by + bz * bz).sqrt()
    }

    /// Die temperature in degrees Celsius.
    pub fn temperature_c(&self) -> f32 {
        (self.t - TEMP_OFFSET_LSB_AT_25C) as f32 * TEMP_SENSITIVITY_C_PER_LSB + 25.0
    }
}

/// Reassembles the split 8-bit/4-bit register fragments of one measurement
/// frame into signed 12-bit readings.
pub fn decode_sample(frame: &[u8; SAMPLE_FRAME_LEN]) -> Sample {
    let x_raw = ((frame[REG_BX_MSB] as u16) << 4) | ((frame[REG_BXY_LSB] >> 4) & 0x0F) as u16;
    let y_raw = ((frame[REG_BY_MSB] as u16) << 4) | (frame[REG_BXY_LSB] & 0x0F) as u16;
    let z_raw = ((frame[REG_BZ_MSB] as u16) << 4) | (frame[REG_BZ_LSB] & 0x0F) as u16;
    let t_raw = (((frame[REG_TEMP_MSB] & 0xF0) as u16) << 4) | frame[REG_TEMP_LSB] as u16;

    Sample {
        x: twos_complement_12bit(x_raw),
        y: twos_complement_12bit(y_raw),
        z: twos_complement_12bit(z_raw),
        t: twos_complement_12bit(t_raw),
        valid: frame[REG_TEMP_MSB] & CHANNEL_BUSY_MASK == 0,
    }
}

fn twos_complement_12bit(raw: u16) -> i16 {
    if raw & (1 << 11) != 0 {
        (raw | 0xF000) as i16
    } else {
        raw as i16
    }
}

/// Merges the factory calibration bits of a freshly read register image with
/// a mode bit pattern. Write register 0 is not configurable and stays 0.
pub fn build_config_frame(
    image: &[u8; REGISTER_IMAGE_LEN],
    mode: PowerMode,
) -> [u8; CONFIG_FRAME_LEN] {
    let pattern = mode.pattern();
    [
        0b0000_0000,
        (image[REG_FACTSET1] & FACTSET1_MASK) | pattern[1],
        image[REG_FACTSET2] | pattern[2],
        (image[REG_FACTSET3] & FACTSET3_MASK) | pattern[3],
    ]
}

pub struct Tlv493d<'a> {
    i2c: &'a RefCell<I2c<'static, Async>>,
    address: u8,
    mode: PowerMode,
    // Last configuration written, so a later mode change can swap mode bits
    // without re-reading the factory registers.
    config_cache: [u8; CONFIG_FRAME_LEN],
    initialized: bool,
}

impl<'a> Tlv493d<'a> {
    pub fn new(i2c: &'a RefCell<I2c<'static, Async>>, address: u8, mode: PowerMode) -> Self {
        Tlv493d {
            i2c,
            address,
            mode,
            config_cache: [0; CONFIG_FRAME_LEN],
            initialized: false,
        }
    }

    /// Reads the sensor's register image, merges the factory bits with the
    /// selected power mode and writes the configuration back.
    pub async fn init(&mut self) -> Result<(), Tlv493dError> {
        // Recovery reset through the I2C general call. A NACK here is normal
        // when the sensor is already in its power-up state.
        match self
            .i2c
            .borrow_mut()
            .write(GENERAL_CALL_ADDRESS, &[MASTER_RESET_CMD])
            .await
        {
            Ok(_) => debug!("TLV493D: master reset sent"),
            Err(e) => warn!("TLV493D: master reset not acknowledged: {:?}", e),
        }
        Timer::after_millis(DELAY_RESET_RECOVERY_MS).await;

        // Registers 0-6 may hold transient data at this point; only the
        // factory bits in registers 7-9 are wanted.
        let mut image = [0u8; REGISTER_IMAGE_LEN];
        self.i2c
            .borrow_mut()
            .read(self.address, &mut image)
            .await
            .map_err(|e| {
                error!("TLV493D: register image read failed: {:?}", e);
                Tlv493dError::I2c(e)
            })?;

        let frame = build_config_frame(&image, self.mode);
        self.i2c
            .borrow_mut()
            .write(self.address, &frame)
            .await
            .map_err(|e| {
                error!("TLV493D: configuration write failed: {:?}", e);
                Tlv493dError::I2c(e)
            })?;

        self.config_cache = frame;
        self.initialized = true;

        // First conversion in the new mode
        Timer::after_millis(self.mode.startup_delay_ms()).await;

        info!(
            "TLV493D: configured at address 0x{:02X}, mode {}",
            self.address,
            Debug2Format(&self.mode)
        );
        Ok(())
    }

    /// Switches the power mode, keeping the cached factory bits intact.
    pub async fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Tlv493dError> {
        if !self.initialized {
            return Err(Tlv493dError::NotInitialized);
        }

        let pattern = mode.pattern();
        let frame = [
            0b0000_0000,
            (self.config_cache[1] & !MODE1_MASK) | pattern[1],
            self.config_cache[2] | pattern[2],
            (self.config_cache[3] & !MODE2_MASK) | pattern[3],
        ];
        self.i2c
            .borrow_mut()
            .write(self.address, &frame)
            .await
            .map_err(|e| {
                error!("TLV493D: power mode write failed: {:?}", e);
                Tlv493dError::I2c(e)
            })?;

        self.config_cache = frame;
        self.mode = mode;
        Timer::after_millis(mode.startup_delay_ms()).await;

        debug!(
            "TLV493D: power mode set, WR1=0x{:02X} WR3=0x{:02X}",
            frame[1], frame[3]
        );
        Ok(())
    }

    /// Reads one measurement frame and decodes it. A torn frame is returned
    /// as a sample with `valid == false`, not as an error.
    pub async fn read(&mut self) -> Result<Sample, Tlv493dError> {
        if !self.initialized {
            warn!("TLV493D: read before init, configuring now");
            self.init().await?;
        }

        let mut frame = [0u8; SAMPLE_FRAME_LEN];
        self.i2c
            .borrow_mut()
            .read(self.address, &mut frame)
            .await
            .map_err(|e| {
                error!("TLV493D: sample read failed: {:?}", e);
                Tlv493dError::I2c(e)
            })?;

        let sample = decode_sample(&frame);
        trace!(
            "TLV493D: raw x={} y={} z={} t={} valid={}",
            sample.x,
            sample.y,
            sample.z,
            sample.t,
            sample.valid
        );
        Ok(sample)
    }
}
