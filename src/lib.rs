pub mod regs;

mod buffer;
pub use buffer::{FrameBuffer, Metadata, State};

mod capture;
pub use capture::{BusInput, Status, CONT_TRANS};

mod error;
pub use error::Error;

mod format;
pub use format::{FieldOrder, Format, FourCC, FrameFormat, MbusCode, PixelFormat};

mod geometry;
pub use geometry::{Geometry, MAX_HEIGHT, MAX_WIDTH};

mod host;
pub use host::{Config, Vin};

mod rect;
pub use rect::Rect;

pub mod scaler;

pub mod sensor;
pub use sensor::Sensor;

mod timestamp;
pub use timestamp::Timestamp;
