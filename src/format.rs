use std::convert::TryFrom;
use std::{fmt, str};

use crate::regs::{DataMode, ModeControl};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Four character code representing a pixelformat
pub struct FourCC {
    repr: [u8; 4],
}

impl FourCC {
    /// Returns a pixelformat as four character code
    ///
    /// # Example
    ///
    /// ```
    /// use vin::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// ```
    pub const fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(string) = str::from_utf8(&self.repr) {
            write!(f, "{}", string)?;
        }
        Ok(())
    }
}

/// Pixel packing modes the capture unit can write to memory.
///
/// All of them transfer 16 bits per sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUV 4:2:2, Y first
    Yuyv,
    /// Packed YUV 4:2:2, Cb first
    Uyvy,
    /// 16 bit RGB, 5-6-5
    Rgb565,
    /// 16 bit ARGB, 1-5-5-5
    Argb1555,
    /// Semi-planar YUV 4:2:2, separate UV plane
    Nv16,
}

impl PixelFormat {
    pub const fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Uyvy => FourCC::new(b"UYVY"),
            PixelFormat::Rgb565 => FourCC::new(b"RGBP"),
            PixelFormat::Argb1555 => FourCC::new(b"AR15"),
            PixelFormat::Nv16 => FourCC::new(b"NV16"),
        }
    }

    /// Line stride in bytes for a given width
    pub const fn bytes_per_line(self, width: u32) -> u32 {
        width * 2
    }

    /// Whether the scaler may resize this format.
    ///
    /// NV16 goes through the YC separate path which has to be fed the exact
    /// output size by the sensor.
    pub fn can_scale(self) -> bool {
        !matches!(self, PixelFormat::Nv16)
    }

    /// Data mode register bits selecting this packing
    pub fn data_mode(self) -> DataMode {
        match self {
            PixelFormat::Yuyv => DataMode::BPSM,
            PixelFormat::Uyvy => DataMode::empty(),
            PixelFormat::Rgb565 => DataMode::empty(),
            PixelFormat::Argb1555 => DataMode::DTMD_ARGB1555,
            PixelFormat::Nv16 => DataMode::DTMD_YCSEP,
        }
    }

    /// Capture control bits this packing requires on top of the interlace
    /// mode bits
    pub fn mode_control(self) -> ModeControl {
        match self {
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Nv16 => {
                ModeControl::VUP | ModeControl::BPS
            }
            PixelFormat::Rgb565 | PixelFormat::Argb1555 => ModeControl::VUP,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

impl TryFrom<FourCC> for PixelFormat {
    type Error = ();

    fn try_from(fourcc: FourCC) -> Result<Self, Self::Error> {
        const FORMATS: [PixelFormat; 5] = [
            PixelFormat::Yuyv,
            PixelFormat::Uyvy,
            PixelFormat::Rgb565,
            PixelFormat::Argb1555,
            PixelFormat::Nv16,
        ];

        FORMATS
            .iter()
            .copied()
            .find(|fmt| fmt.fourcc() == fourcc)
            .ok_or(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Represents how fields are interlaced (if they are)
pub enum FieldOrder {
    /// Progressive, not interlaced
    Progressive,
    /// Top, or odd, field only
    Top,
    /// Bottom, or even, field only
    Bottom,
    /// Both fields interlaced, order up to the driver
    Interlaced,
    /// Both fields interlaced, starting with top
    InterlacedTb,
    /// Both fields interlaced, starting with bottom
    InterlacedBt,
}

impl FieldOrder {
    pub fn is_interlaced(self) -> bool {
        matches!(
            self,
            FieldOrder::Interlaced | FieldOrder::InterlacedTb | FieldOrder::InterlacedBt
        )
    }

    /// Interlace mode bits of the capture control register
    pub fn mode_control(self) -> ModeControl {
        match self {
            FieldOrder::Top => ModeControl::IM_ODD,
            FieldOrder::Bottom => ModeControl::IM_EVEN,
            FieldOrder::Interlaced | FieldOrder::InterlacedTb => ModeControl::IM_FULL,
            FieldOrder::InterlacedBt => ModeControl::IM_FULL | ModeControl::FOC,
            FieldOrder::Progressive => ModeControl::IM_ODD,
        }
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progressive => write!(f, "progressive"),
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
            Self::Interlaced => write!(f, "interlaced"),
            Self::InterlacedTb => write!(f, "interlaced, starting with top"),
            Self::InterlacedBt => write!(f, "interlaced, starting with bottom"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
/// Capture output format requested by (and adjusted for) the application
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// field order for interlacing
    pub field_order: FieldOrder,
    /// bytes per line
    pub stride: u32,
    /// number of bytes required to store an image
    pub size: u32,
}

impl Format {
    /// Returns a capture format
    ///
    /// # Example
    ///
    /// ```
    /// use vin::{Format, FourCC};
    /// let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            field_order: FieldOrder::Progressive,
            stride: 0,
            size: 0,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "field          : {}", self.field_order)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        Ok(())
    }
}

/// Media bus codes an upstream sensor may produce towards the VIN
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MbusCode {
    /// YUV 4:2:2, 8 bit samples, two per pixel clock
    Yuyv8_2x8,
    /// RGB565, 8 bit samples, little endian
    Rgb565_2x8Le,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Frame geometry and encoding on the sensor side of the bus
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub code: MbusCode,
}

impl FrameFormat {
    pub const fn new(width: u32, height: u32, code: MbusCode) -> Self {
        FrameFormat {
            width,
            height,
            code,
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ({:?})", self.width, self.height, self.code)
    }
}
