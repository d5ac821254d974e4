use std::thread::sleep;
use std::time::Duration;

use rppal::i2c::I2c;
use tracing::{info, warn};

use crate::config::DriveConfig;
use crate::error::{Error, Result};

/// Two-motor differential drive. Values run from -1.0 to 1.0.
pub trait Drivable: Send + 'static {
    fn set_left(&mut self, value: f64) -> Result<()>;

    fn set_right(&mut self, value: f64) -> Result<()>;

    /// Last commanded values.
    fn left(&self) -> f64;

    fn right(&self) -> f64;

    fn stop(&mut self) -> Result<()> {
        self.set_left(0.0)?;
        self.set_right(0.0)
    }
}

/// Maps a gamepad axis to a motor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMapping {
    /// Readings with a smaller magnitude count as centred.
    pub dead_zone: f64,
    pub scale: f64,
}

impl AxisMapping {
    pub fn map(&self, axis: f64) -> f64 {
        if axis.abs() < self.dead_zone {
            0.0
        } else {
            self.scale * axis
        }
    }
}

impl Default for AxisMapping {
    fn default() -> Self {
        AxisMapping {
            dead_zone: 0.2,
            scale: -0.5,
        }
    }
}

impl From<&DriveConfig> for AxisMapping {
    fn from(config: &DriveConfig) -> Self {
        AxisMapping {
            dead_zone: config.dead_zone,
            scale: config.scale,
        }
    }
}

const MODE1: u8 = 0x00;
const MODE2: u8 = 0x01;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;
const ALL_LED_ON_L: u8 = 0xFA;

const RESTART: u8 = 0x80;
const SLEEP: u8 = 0x10;
const ALLCALL: u8 = 0x01;
const OUTDRV: u8 = 0x04;

const OSCILLATOR_HZ: f64 = 25_000_000.0;
const MOTOR_PWM_HZ: f64 = 1600.0;
/// Channel value that turns a PCA9685 output fully on or off.
const FULL: u16 = 4096;

/// PCA9685 16-channel PWM controller.
struct Pca9685 {
    i2c: I2c,
}

impl Pca9685 {
    fn open(bus: u8, address: u16, frequency: f64) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        let mut pca = Pca9685 { i2c };

        pca.set_all(0, 0)?;
        pca.i2c.smbus_write_byte(MODE2, OUTDRV)?;
        pca.i2c.smbus_write_byte(MODE1, ALLCALL)?;
        sleep(Duration::from_millis(5));
        let mode = pca.i2c.smbus_read_byte(MODE1)? & !SLEEP;
        pca.i2c.smbus_write_byte(MODE1, mode)?;
        sleep(Duration::from_millis(5));

        pca.set_frequency(frequency)?;
        Ok(pca)
    }

    fn set_frequency(&mut self, frequency: f64) -> Result<()> {
        let prescale = (OSCILLATOR_HZ / f64::from(FULL) / frequency - 1.0).round() as u8;
        let old = self.i2c.smbus_read_byte(MODE1)?;
        // The prescaler only latches while the oscillator sleeps.
        self.i2c.smbus_write_byte(MODE1, (old & 0x7F) | SLEEP)?;
        self.i2c.smbus_write_byte(PRESCALE, prescale)?;
        self.i2c.smbus_write_byte(MODE1, old)?;
        sleep(Duration::from_millis(5));
        self.i2c.smbus_write_byte(MODE1, old | RESTART)?;
        Ok(())
    }

    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        self.write_pwm(LED0_ON_L + 4 * channel, on, off)
    }

    fn set_all(&mut self, on: u16, off: u16) -> Result<()> {
        self.write_pwm(ALL_LED_ON_L, on, off)
    }

    fn write_pwm(&mut self, register: u8, on: u16, off: u16) -> Result<()> {
        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        self.i2c.smbus_write_byte(register, on_l)?;
        self.i2c.smbus_write_byte(register + 1, on_h)?;
        self.i2c.smbus_write_byte(register + 2, off_l)?;
        self.i2c.smbus_write_byte(register + 3, off_h)?;
        Ok(())
    }

    fn set_pin(&mut self, channel: u8, high: bool) -> Result<()> {
        if high {
            self.set_pwm(channel, FULL, 0)
        } else {
            self.set_pwm(channel, 0, FULL)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// PCA9685 channels wired to one H-bridge.
#[derive(Debug, Clone, Copy)]
struct MotorPins {
    pwm: u8,
    in1: u8,
    in2: u8,
}

impl MotorPins {
    /// Wiring of motor terminals M1..M4 on the motor HAT.
    fn for_motor(number: u8) -> Result<Self> {
        let (pwm, in2, in1) = match number {
            1 => (8, 9, 10),
            2 => (13, 12, 11),
            3 => (2, 3, 4),
            4 => (7, 6, 5),
            other => return Err(Error::Device(format!("no motor terminal M{other}"))),
        };
        Ok(MotorPins { pwm, in1, in2 })
    }
}

/// Splits a motor value into an 8-bit speed and a direction. Negative
/// values spin the H-bridge forward, matching the JetBot wiring.
fn drive_signal(value: f64) -> (u16, Direction) {
    let mapped = (255.0 * value.clamp(-1.0, 1.0)) as i32;
    let speed = mapped.unsigned_abs().min(255) as u16;
    let direction = if mapped < 0 {
        Direction::Forward
    } else {
        Direction::Backward
    };
    (speed, direction)
}

/// Adafruit DC motor HAT on the JetBot chassis.
pub struct MotorHat {
    pca: Pca9685,
    left_pins: MotorPins,
    right_pins: MotorPins,
    left: f64,
    right: f64,
}

impl MotorHat {
    pub fn open(config: &DriveConfig) -> Result<Self> {
        let pca = Pca9685::open(config.i2c_bus, config.i2c_address, MOTOR_PWM_HZ)?;
        info!(
            bus = config.i2c_bus,
            address = config.i2c_address,
            "motor controller ready"
        );
        Ok(MotorHat {
            pca,
            left_pins: MotorPins::for_motor(config.left_motor)?,
            right_pins: MotorPins::for_motor(config.right_motor)?,
            left: 0.0,
            right: 0.0,
        })
    }

    fn write(&mut self, pins: MotorPins, value: f64) -> Result<()> {
        let (speed, direction) = drive_signal(value);
        self.pca.set_pwm(pins.pwm, 0, speed * 16)?;
        match direction {
            Direction::Forward => {
                self.pca.set_pin(pins.in2, false)?;
                self.pca.set_pin(pins.in1, true)
            }
            Direction::Backward => {
                self.pca.set_pin(pins.in1, false)?;
                self.pca.set_pin(pins.in2, true)
            }
        }
    }

    fn release(&mut self, pins: MotorPins) -> Result<()> {
        self.pca.set_pin(pins.in1, false)?;
        self.pca.set_pin(pins.in2, false)
    }
}

impl Drivable for MotorHat {
    fn set_left(&mut self, value: f64) -> Result<()> {
        self.write(self.left_pins, value)?;
        self.left = value;
        Ok(())
    }

    fn set_right(&mut self, value: f64) -> Result<()> {
        self.write(self.right_pins, value)?;
        self.right = value;
        Ok(())
    }

    fn left(&self) -> f64 {
        self.left
    }

    fn right(&self) -> f64 {
        self.right
    }
}

impl Drop for MotorHat {
    fn drop(&mut self) {
        for pins in [self.left_pins, self.right_pins] {
            if let Err(err) = self.release(pins) {
                warn!("Failed to release motor: {err}");
            }
        }
    }
}
