use bitflags::bitflags;

use crate::error::Error;
use crate::format::FrameFormat;
use crate::rect::Rect;

bitflags! {
    /// Parallel bus signalling options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusFlags: u32 {
        const MASTER             = 1 << 0;
        const PCLK_SAMPLE_RISING = 1 << 1;
        const HSYNC_ACTIVE_HIGH  = 1 << 2;
        const HSYNC_ACTIVE_LOW   = 1 << 3;
        const VSYNC_ACTIVE_HIGH  = 1 << 4;
        const VSYNC_ACTIVE_LOW   = 1 << 5;
        const DATA_ACTIVE_HIGH   = 1 << 6;
    }
}

/// Bus configuration advertised by or committed to a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub flags: BusFlags,
}

/// Cropping limits reported by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Total croppable pixel array
    pub bounds: Rect,
    /// Rectangle the sensor uses when no crop was ever set
    pub default: Rect,
}

/// Upstream image sensor, as seen from the capture unit.
///
/// Crop and format setters are best-effort: a sensor is free to apply an
/// adjusted geometry, so callers must read back what was actually applied
/// instead of trusting the request.
pub trait Sensor {
    /// Current crop rectangle, `None` if the sensor does not support
    /// cropping
    fn crop(&self) -> Result<Option<Rect>, Error>;

    /// Cropping bounds and default rectangle
    fn capabilities(&self) -> Result<Capabilities, Error>;

    /// Request a crop rectangle (best-effort)
    fn set_crop(&mut self, rect: &Rect) -> Result<(), Error>;

    /// Current output frame format
    fn format(&self) -> Result<FrameFormat, Error>;

    /// Request an output frame format; the sensor updates `fmt` with what
    /// it actually applied
    fn set_format(&mut self, fmt: &mut FrameFormat) -> Result<(), Error>;

    /// Like [`Sensor::set_format`] but without changing sensor state
    fn try_format(&self, fmt: &mut FrameFormat) -> Result<(), Error>;

    /// Bus configuration the sensor can drive, `None` if it does not
    /// report one
    fn bus_config(&self) -> Result<Option<BusConfig>, Error> {
        Ok(None)
    }

    /// Commit a reconciled bus configuration
    fn set_bus_config(&mut self, _config: &BusConfig) -> Result<(), Error> {
        Ok(())
    }
}
