use thiserror::Error;

use crate::format::FourCC;

/// Errors reported by the capture driver.
///
/// Buffer-size mismatches are deliberately absent: they are discovered
/// after the queueing call has returned and are delivered through the
/// completion queue with [`crate::buffer::State::Error`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A camera client is already attached to the capture unit
    #[error("a camera client is already attached")]
    Busy,

    /// The operation needs an attached camera client
    #[error("no camera client attached")]
    NotAttached,

    /// The requested pixelformat is not one the hardware can write
    #[error("unsupported pixelformat {0}")]
    UnsupportedFormat(FourCC),

    /// The sensor reported a geometry beyond the hardware maximum
    #[error("sensor geometry {width}x{height} exceeds the hardware maximum")]
    OutOfRange { width: u32, height: u32 },

    /// The sensor could not be configured below the hardware maximum
    #[error("failed to configure the sensor below {width}x{height}")]
    SensorTooLarge { width: u32, height: u32 },

    /// The sensor refused a negotiation call
    #[error("sensor i/o: {0}")]
    Sensor(String),

    /// No common sync polarity configuration with the sensor
    #[error("incompatible bus configuration")]
    BusConfig,

    /// The hardware did not report quiescence in time
    #[error("timed out waiting for the capture unit to become idle")]
    Timeout,
}
