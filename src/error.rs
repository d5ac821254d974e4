use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Camera error: {0}")]
    Camera(String),
    #[error("OpenCV error: {0}")]
    OpenCv(String),
    #[error("Inference error: {0}")]
    Inference(String),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid frame: {0}")]
    Frame(String),
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Invalid payload: {0}")]
    Payload(String),
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for Error {
    fn from(err: opencv::Error) -> Self {
        Error::OpenCv(err.to_string())
    }
}

#[cfg(feature = "hid")]
impl From<hidapi::HidError> for Error {
    fn from(err: hidapi::HidError) -> Self {
        Error::Device(err.to_string())
    }
}

#[cfg(feature = "usb")]
impl From<rusb::Error> for Error {
    fn from(err: rusb::Error) -> Self {
        Error::Device(err.to_string())
    }
}
