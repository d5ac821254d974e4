use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::sleep;
use std::time::Duration;

use tracing::debug;

use crate::config::{LauncherConfig, TransportKind};
use crate::error::{Error, Result};

/// Commands understood by the USB missile launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurretCommand {
    Up,
    Down,
    Left,
    Right,
    Stop,
    Fire,
}

impl TurretCommand {
    fn code(&self) -> u8 {
        match self {
            TurretCommand::Down => 0x01,
            TurretCommand::Up => 0x02,
            TurretCommand::Left => 0x04,
            TurretCommand::Right => 0x08,
            TurretCommand::Fire => 0x10,
            TurretCommand::Stop => 0x20,
        }
    }

    /// Control report sent to the device, identical on every transport.
    pub fn payload(&self) -> [u8; 8] {
        [0x02, self.code(), 0, 0, 0, 0, 0, 0]
    }
}

/// Delivers an 8-byte control report to the launcher.
pub trait Transport: Send + 'static {
    fn send(&mut self, payload: &[u8; 8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, payload: &[u8; 8]) -> Result<()> {
        (**self).send(payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurretState {
    Idle,
    Moving,
}

/// Launcher turret. Moves are fixed-length pulses that block the caller and
/// run one at a time; a fire goes out immediately, even mid-move.
pub struct Launcher<T: Transport> {
    transport: Mutex<T>,
    state: Mutex<TurretState>,
    moves: Mutex<()>,
}

fn lock<T>(inner: &Mutex<T>) -> MutexGuard<'_, T> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> Launcher<T> {
    pub fn new(transport: T) -> Self {
        Launcher {
            transport: Mutex::new(transport),
            state: Mutex::new(TurretState::Idle),
            moves: Mutex::new(()),
        }
    }

    pub fn state(&self) -> TurretState {
        *lock(&self.state)
    }

    fn send(&self, command: TurretCommand) -> Result<()> {
        debug!(?command, "turret command");
        lock(&self.transport).send(&command.payload())
    }

    /// Drives in `direction` for `hold`, then stops.
    pub fn pulse(&self, direction: TurretCommand, hold: Duration) -> Result<()> {
        if matches!(direction, TurretCommand::Stop | TurretCommand::Fire) {
            return Err(Error::Device(format!("{direction:?} is not a direction")));
        }
        let _move = lock(&self.moves);
        self.send(direction)?;
        *lock(&self.state) = TurretState::Moving;
        sleep(hold);
        let stopped = self.send(TurretCommand::Stop);
        *lock(&self.state) = TurretState::Idle;
        stopped
    }

    pub fn fire(&self) -> Result<()> {
        self.send(TurretCommand::Fire)
    }
}

/// Opens the transport named in the configuration.
pub fn open_transport(config: &LauncherConfig) -> Result<Box<dyn Transport>> {
    match config.transport {
        #[cfg(feature = "hid")]
        TransportKind::Hid => Ok(Box::new(hid::HidTransport::open(config)?)),
        #[cfg(feature = "usb")]
        TransportKind::Usb => Ok(Box::new(usb::UsbTransport::open(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::Device(format!(
            "{other:?} transport was not compiled in"
        ))),
    }
}

#[cfg(feature = "hid")]
pub use self::hid::HidTransport;

#[cfg(feature = "hid")]
mod hid {
    use hidapi::{HidApi, HidDevice};
    use tracing::info;

    use super::Transport;
    use crate::config::LauncherConfig;
    use crate::error::Result;

    /// Sends reports as HID feature reports over hidraw.
    pub struct HidTransport {
        device: HidDevice,
    }

    impl HidTransport {
        pub fn open(config: &LauncherConfig) -> Result<Self> {
            let api = HidApi::new()?;
            let device = api.open(config.vendor_id, config.product_id)?;
            info!(
                vendor = config.vendor_id,
                product = config.product_id,
                "launcher opened over HID"
            );
            Ok(HidTransport { device })
        }
    }

    impl Transport for HidTransport {
        fn send(&mut self, payload: &[u8; 8]) -> Result<()> {
            Ok(self.device.send_feature_report(payload)?)
        }
    }
}

#[cfg(feature = "usb")]
pub use self::usb::UsbTransport;

#[cfg(feature = "usb")]
mod usb {
    use std::time::Duration;

    use rusb::{Context, DeviceHandle, UsbContext};
    use tracing::info;

    use super::Transport;
    use crate::config::LauncherConfig;
    use crate::error::{Error, Result};

    const REQUEST_TYPE: u8 = 0x21;
    const SET_REPORT: u8 = 0x09;
    const TIMEOUT: Duration = Duration::from_secs(1);

    /// Sends reports as class control transfers on interface 0.
    pub struct UsbTransport {
        handle: DeviceHandle<Context>,
    }

    impl UsbTransport {
        pub fn open(config: &LauncherConfig) -> Result<Self> {
            let context = Context::new()?;
            let mut handle = context
                .open_device_with_vid_pid(config.vendor_id, config.product_id)
                .ok_or_else(|| Error::Device("Launcher not found.".into()))?;
            if handle.kernel_driver_active(0)? {
                handle.detach_kernel_driver(0)?;
            }
            handle.set_active_configuration(1)?;
            info!("launcher opened over USB");
            Ok(UsbTransport { handle })
        }
    }

    impl Transport for UsbTransport {
        fn send(&mut self, payload: &[u8; 8]) -> Result<()> {
            self.handle
                .write_control(REQUEST_TYPE, SET_REPORT, 0, 0, payload, TIMEOUT)?;
            Ok(())
        }
    }
}
