use rppal::gpio::{Gpio, OutputPin};
use tracing::info;

use crate::error::Result;

/// A switched output driven high for on and low for off.
pub trait LightOutput: Send + 'static {
    fn set(&mut self, on: bool) -> Result<()>;
}

impl LightOutput for OutputPin {
    fn set(&mut self, on: bool) -> Result<()> {
        if on {
            self.set_high();
        } else {
            self.set_low();
        }
        Ok(())
    }
}

/// Headlight made of one or more outputs switched together.
pub struct Light<O: LightOutput> {
    outputs: Vec<O>,
    on: bool,
}

impl<O: LightOutput> Light<O> {
    /// Starts off, with every output driven low.
    pub fn new(mut outputs: Vec<O>) -> Result<Self> {
        for output in outputs.iter_mut() {
            output.set(false)?;
        }
        Ok(Light { outputs, on: false })
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Flips the light and returns the new state.
    pub fn toggle(&mut self) -> Result<bool> {
        self.on = !self.on;
        for output in self.outputs.iter_mut() {
            output.set(self.on)?;
        }
        Ok(self.on)
    }
}

pub type GpioLight = Light<OutputPin>;

impl GpioLight {
    /// Claims the given BCM pins as outputs.
    pub fn open(pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new()?;
        let outputs = pins
            .iter()
            .map(|pin| Ok(gpio.get(*pin)?.into_output_low()))
            .collect::<Result<Vec<_>>>()?;
        info!(?pins, "light ready");
        Light::new(outputs)
    }
}
