use std::fmt;

use crate::timestamp::Timestamp;

/// Completion state of a retired frame buffer.
///
/// A buffer waiting for a slot sits in the pending queue and a bound one
/// in its hardware slot, so only the terminal states are reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Capture finished, frame data is valid
    Done,
    /// Retired without valid frame data
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One application-supplied destination for a captured frame.
///
/// The driver never touches the memory behind it; it only programs the DMA
/// address into a hardware slot. Ownership passes to the driver on queueing
/// and returns with the completion metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Opaque handle chosen by the application, returned on completion
    pub id: u32,
    /// Physical/DMA base address of the destination memory
    pub addr: u32,
    /// Size of the destination memory in bytes
    pub len: u32,
}

impl FrameBuffer {
    pub const fn new(id: u32, addr: u32, len: u32) -> Self {
        FrameBuffer { id, addr, len }
    }
}

/// Buffer metadata delivered with each completion
#[derive(Debug, Copy, Clone)]
pub struct Metadata {
    /// Sequence number, counting the frames
    pub sequence: u32,
    /// Time of capture
    pub timestamp: Timestamp,
    /// Done for a valid frame, Error otherwise
    pub state: State,
}

impl Metadata {
    /// Returns a buffer metadata description
    ///
    /// # Arguments
    ///
    /// * `sequence` - Sequence number as counted by the driver
    /// * `timestamp` - Time of capture
    /// * `state` - Completion state
    pub fn new(sequence: u32, timestamp: Timestamp, state: State) -> Self {
        Metadata {
            sequence,
            timestamp,
            state,
        }
    }
}
