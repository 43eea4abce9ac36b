use bitflags::bitflags;

//
// VIN register map. Offsets are fixed by the hardware; all registers are
// 32 bit wide.
//

/// Main capture control
pub const MC: u32 = 0x0000;
/// Module status
pub const MS: u32 = 0x0004;
/// Frame capture control
pub const FC: u32 = 0x0008;
/// Start line, pre-clip
pub const SLPRC: u32 = 0x000C;
/// End line, pre-clip
pub const ELPRC: u32 = 0x0010;
/// Start pixel, pre-clip
pub const SPPRC: u32 = 0x0014;
/// End pixel, pre-clip
pub const EPPRC: u32 = 0x0018;
/// Start line, post-clip
pub const SLPOC: u32 = 0x001C;
/// End line, post-clip
pub const ELPOC: u32 = 0x0020;
/// Start pixel, post-clip
pub const SPPOC: u32 = 0x0024;
/// End pixel, post-clip
pub const EPPOC: u32 = 0x0028;
/// Image stride
pub const IS: u32 = 0x002C;
/// Memory base address, slot 1
pub const MB1: u32 = 0x0030;
/// Memory base address, slot 2
pub const MB2: u32 = 0x0034;
/// Memory base address, slot 3
pub const MB3: u32 = 0x0038;
/// Line count
pub const LC: u32 = 0x003C;
/// Interrupt enable
pub const IE: u32 = 0x0040;
/// Interrupt status
pub const INTS: u32 = 0x0044;
/// Scanline interrupt
pub const SI: u32 = 0x0048;
/// Memory transfer control
pub const MTC: u32 = 0x004C;
/// Vertical scale factor (Q12)
pub const YS: u32 = 0x0050;
/// Horizontal scale factor (Q12)
pub const XS: u32 = 0x0054;
/// Data mode
pub const DMR: u32 = 0x0058;
/// Data mode 2 (sync polarities)
pub const DMR2: u32 = 0x005C;
/// UV plane address offset (NV16)
pub const UVAOF: u32 = 0x0060;

/// Scaling coefficient registers C1A..C8C: eight groups of three, each
/// group 0x10 apart.
pub const COEFF: [u32; 24] = [
    0x0080, 0x0084, 0x0088,
    0x0090, 0x0094, 0x0098,
    0x00A0, 0x00A4, 0x00A8,
    0x00B0, 0x00B4, 0x00B8,
    0x00C0, 0x00C4, 0x00C8,
    0x00D0, 0x00D4, 0x00D8,
    0x00E0, 0x00E4, 0x00E8,
    0x00F0, 0x00F4, 0x00F8,
];

/// Stride between the memory base address registers
pub const MB_OFF: u32 = 0x04;
/// Number of hardware buffer slots
pub const MB_NUM: usize = 3;
/// Shift of the frame buffer status field in MS
pub const MS_FBS_SHIFT: u32 = 3;

bitflags! {
    /// Main capture control register (MC) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeControl: u32 {
        /// Field order control
        const FOC           = 0x0020_0000;
        /// YCbCr-422 input data alignment
        const YCAL          = 0x0008_0000;
        /// Input interface: ITU-R BT.709 24 bit (BT.656 8 bit when clear)
        const INF_BT709_24  = 0x0006_0000;
        /// Register update control
        const VUP           = 0x0000_0400;
        /// Interlace mode field
        const IM_MASK       = 0x0000_0018;
        const IM_ODD        = 0x0000_0000;
        const IM_ODD_EVEN   = 0x0000_0008;
        const IM_EVEN       = 0x0000_0010;
        const IM_FULL       = 0x0000_0018;
        /// YCbCr-422 to YCbCr-422 conversion bypass
        const BPS           = 0x0000_0002;
        /// Module enable
        const ME            = 0x0000_0001;
    }
}

bitflags! {
    /// Module status register (MS) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModuleStatus: u32 {
        /// Frame buffer status (two bit field, see [`MS_FBS_SHIFT`])
        const FBS = 0x0000_0018;
        /// Field status
        const FS  = 0x0000_0004;
        /// Active video
        const AV  = 0x0000_0002;
        /// Capture active
        const CA  = 0x0000_0001;
    }
}

bitflags! {
    /// Frame capture control register (FC) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameCapture: u32 {
        /// Continuous frame capture mode
        const C_FRAME = 0x0000_0002;
        /// Single frame capture mode
        const S_FRAME = 0x0000_0001;
    }
}

bitflags! {
    /// Interrupt enable (IE) and interrupt status (INTS) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupt: u32 {
        /// Field interrupt 2
        const FIE2 = 1 << 31;
        /// Vsync falling edge
        const VFE  = 1 << 17;
        /// Vsync rising edge
        const VRE  = 1 << 16;
        /// Field interrupt
        const FIE  = 1 << 4;
        /// Correctable error
        const CEE  = 1 << 3;
        /// Scanline
        const SIE  = 1 << 2;
        /// End of frame
        const EFE  = 1 << 1;
        /// FIFO overflow
        const FOE  = 1 << 0;
    }
}

impl Interrupt {
    /// Interrupts enabled during normal capture
    pub const NORMAL: Interrupt = Interrupt::EFE;
}

bitflags! {
    /// Data mode register (DMR) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataMode: u32 {
        /// Even field address offset
        const EVA          = 0x0001_0000;
        /// Byte position swap mode
        const BPSM         = 0x0000_0010;
        /// Transfer as YC separate planes
        const DTMD_YCSEP   = 0x0000_0002;
        /// Transfer as ARGB1555
        const DTMD_ARGB1555 = 0x0000_0001;
    }
}

bitflags! {
    /// Data mode register 2 (DMR2) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataMode2: u32 {
        /// Field polarity select
        const FPS   = 1 << 31;
        /// Vsync polarity select (set: active high)
        const VPS   = 1 << 30;
        /// Hsync polarity select (set: active high)
        const HPS   = 1 << 29;
        /// Clock enable polarity select
        const CES   = 1 << 28;
        /// Field toggle enable of vsync
        const FTEV  = 0x0002_0000;
        /// Field toggle mode transition period
        const VLV_1 = 0x0000_1000;
    }
}

/// Access to the VIN register block.
///
/// Implementations perform the actual MMIO; the driver core only does
/// offset arithmetic on the constants above. Writes must reach the device
/// in call order, the capture sequences rely on it.
pub trait Registers {
    /// Read a 32 bit register at `offset`
    fn read(&self, offset: u32) -> u32;

    /// Write a 32 bit register at `offset`
    fn write(&mut self, offset: u32, value: u32);
}
