use std::collections::VecDeque;
use std::fmt;

use log::{debug, error, warn};

use crate::buffer::{FrameBuffer, Metadata, State};
use crate::format::{FieldOrder, PixelFormat};
use crate::geometry::Geometry;
use crate::rect::Rect;
use crate::regs::{
    self, FrameCapture, Interrupt, ModeControl, ModuleStatus, Registers, MB_NUM,
};
use crate::scaler;
use crate::timestamp::Timestamp;

/// Queue depth at which capture switches from single frame mode (one
/// hardware slot, software re-arms every frame) to continuous mode (all
/// three slots cycling without software intervention)
pub const CONT_TRANS: u32 = 4;

/// System-wide capture status
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// Capture engine disabled, registers safe to reconfigure
    Stopped,
    /// Hardware actively capturing into bound slots
    Running,
    /// Stop requested, waiting for the hardware to finish the current frame
    Stopping,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Input interface the capture unit is wired to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusInput {
    /// ITU-R BT.656, 8 bit
    Bt656_8bit,
    /// ITU-R BT.709, 24 bit
    Bt709_24bit,
}

/// The capture state machine.
///
/// Owns the three hardware buffer slots, the pending buffer FIFO and the
/// completion FIFO. All methods expect to run under the single driver lock;
/// none of them blocks.
pub struct CaptureEngine<R: Registers> {
    regs: R,
    input: BusInput,

    format: PixelFormat,
    field: FieldOrder,
    /// Sensor output as seen by the capture unit
    width: u32,
    height: u32,
    /// User output window
    out_width: u32,
    out_height: u32,
    /// Effective input window for pre-clipping
    subrect: Rect,

    slots: [Option<FrameBuffer>; MB_NUM],
    pending: VecDeque<FrameBuffer>,
    completed: VecDeque<(FrameBuffer, Metadata)>,
    /// Number of currently bound slots
    slot_count: usize,
    /// Negotiated queue depth, selects single vs. continuous mode
    buffer_count: u32,
    set_pos: usize,
    get_pos: usize,

    status: Status,
    request_to_stop: bool,
    sequence: u32,
}

impl<R: Registers> CaptureEngine<R> {
    pub fn new(regs: R, input: BusInput) -> Self {
        CaptureEngine {
            regs,
            input,
            format: PixelFormat::Yuyv,
            field: FieldOrder::Progressive,
            width: 640,
            height: 480,
            out_width: 640,
            out_height: 480,
            subrect: Rect::new(0, 0, 640, 480),
            slots: [None; MB_NUM],
            pending: VecDeque::new(),
            completed: VecDeque::new(),
            slot_count: 0,
            buffer_count: 0,
            set_pos: 0,
            get_pos: 0,
            status: Status::Stopped,
            request_to_stop: false,
            sequence: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn bound_slots(&self) -> usize {
        self.slot_count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the hardware reports an active capture
    pub fn is_active(&self) -> bool {
        self.regs.read(regs::MS) & ModuleStatus::CA.bits() != 0
    }

    /// The hardware's two bit frame buffer position field
    fn frame_buffer_status(&self) -> u32 {
        (self.regs.read(regs::MS) & ModuleStatus::FBS.bits()) >> regs::MS_FBS_SHIFT
    }

    /// Clear any latched interrupt status
    pub fn soft_reset(&mut self) {
        self.regs.write(regs::INTS, 0);
    }

    fn continuous(&self) -> bool {
        self.buffer_count >= CONT_TRANS
    }

    /// Active slot capacity: one in single frame mode, all three in
    /// continuous mode
    fn slot_capacity(&self) -> usize {
        if self.continuous() {
            MB_NUM
        } else {
            1
        }
    }

    /// Negotiate the queue depth for the upcoming streaming session.
    ///
    /// Resets the frame sequence counter; must only be called while
    /// stopped.
    pub fn set_buffer_count(&mut self, count: u32) {
        self.buffer_count = count;
        self.sequence = 0;
        debug!("queue depth {}, continuous={}", count, self.continuous());
    }

    /// Commit negotiated geometry as the source for register programming
    pub fn apply_geometry(&mut self, geo: &Geometry) {
        self.width = geo.width;
        self.height = geo.height;
        self.out_width = geo.out_width;
        self.out_height = geo.out_height;
        self.subrect = geo.subrect;
    }

    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn set_field(&mut self, field: FieldOrder) {
        self.field = field;
    }

    /// Re-derive both position counters from the hardware's own frame
    /// buffer status, so software never trusts a stale counter across a
    /// stop/start cycle.
    pub fn sync_positions(&mut self) {
        let fbs = self.frame_buffer_status() as usize;
        let pos = if fbs >= 2 { 2 } else { fbs };
        self.set_pos = pos;
        self.get_pos = pos;
    }

    /// Program the pre-clip window, scale factors, filter coefficients and
    /// post-clip window from the committed geometry.
    ///
    /// The caller guarantees the sub-rectangle does not exceed the scaled
    /// sensor rectangle and that capture is quiesced.
    pub fn set_rect(&mut self) {
        let sub = self.subrect;
        let interlaced = self.field.is_interlaced();

        debug!(
            "clip {}x{} -> {}x{}, subrect {}",
            self.width, self.height, self.out_width, self.out_height, sub
        );

        // pre-clip with the crop window
        let left = sub.left as u32;
        let top = sub.top as u32;
        self.regs.write(regs::SPPRC, left);
        self.regs.write(regs::EPPRC, left + sub.width - 1);
        if interlaced {
            self.regs.write(regs::SLPRC, (top + 1) / 2);
            self.regs.write(regs::ELPRC, (top + sub.height + 1) / 2 - 1);
        } else {
            self.regs.write(regs::SLPRC, top);
            self.regs.write(regs::ELPRC, top + sub.height - 1);
        }

        let mut value = 0;
        if sub.height != self.out_height {
            value = (4096 * sub.height) / self.out_height;
        }
        debug!("YS value: {:#x}", value);
        self.regs.write(regs::YS, value);

        let mut value = 0;
        if sub.width != self.out_width {
            value = (4096 * sub.width) / self.out_width;
        }

        // horizontal enlargement is limited to double size
        if 0 < value && value < 0x0800 {
            value = 0x0800;
        }
        debug!("XS value: {:#x}", value);
        self.regs.write(regs::XS, value);

        // enlargement is carried out by scaling down from double size
        let ratio = if value < 0x1000 { value * 2 } else { value };
        scaler::program(&mut self.regs, ratio);

        // post-clip with the output size
        self.regs.write(regs::SPPOC, 0);
        self.regs.write(regs::SLPOC, 0);
        self.regs.write(regs::EPPOC, self.out_width - 1);
        if interlaced {
            self.regs.write(regs::ELPOC, (self.out_height + 1) / 2 - 1);
        } else {
            self.regs.write(regs::ELPOC, self.out_height - 1);
        }

        self.regs.write(regs::IS, (self.out_width + 15) & !0xf);
    }

    /// Arm the hardware and trigger capture in the mode matching the
    /// negotiated queue depth.
    fn start_capture(&mut self) {
        let ints = self.regs.read(regs::INTS);
        self.regs.write(regs::INTS, ints);

        self.regs.write(regs::IE, 0);

        // priority for memory transfer
        self.regs.write(regs::MTC, 0x0a09_0008);

        let mut mc = self.field.mode_control();
        mc |= self.format.mode_control();
        let dmr = self.format.data_mode();

        if self.format == PixelFormat::Nv16 {
            self.regs
                .write(regs::UVAOF, (self.width * self.height + 0x7f) & !0x7f);
        }

        match self.input {
            BusInput::Bt656_8bit => {}
            BusInput::Bt709_24bit => {
                mc |= ModeControl::INF_BT709_24;
                mc.toggle(ModeControl::BPS);
            }
        }

        self.regs.write(regs::IE, Interrupt::NORMAL.bits());

        self.regs.write(regs::DMR, dmr.bits());
        self.regs.write(regs::MC, (mc | ModeControl::ME).bits());

        if self.continuous() {
            self.regs.write(regs::FC, FrameCapture::C_FRAME.bits());
        } else {
            self.regs.write(regs::FC, FrameCapture::S_FRAME.bits());
        }
    }

    /// Disable the capture engine; transitions to Stopped right away if
    /// the hardware already reports quiescence.
    fn stop_capture(&mut self) {
        self.regs.write(regs::FC, 0);

        let mc = self.regs.read(regs::MC);
        self.regs.write(regs::MC, mc & !ModeControl::ME.bits());

        if !self.is_active() {
            self.status = Status::Stopped;
        }
    }

    fn bind_slot(&mut self, slot: usize, buf: FrameBuffer) {
        self.regs
            .write(regs::MB1 + regs::MB_OFF * slot as u32, buf.addr);
        self.slots[slot] = Some(buf);
        self.set_pos = slot;
        self.slot_count += 1;
    }

    fn complete(&mut self, buf: FrameBuffer, state: State) {
        let sequence = self.sequence;
        if state == State::Done {
            self.sequence = self.sequence.wrapping_add(1);
        }
        self.completed
            .push_back((buf, Metadata::new(sequence, Timestamp::now(), state)));
    }

    /// Hand a buffer to the driver.
    ///
    /// Binds it into the next free slot (programming its address
    /// immediately) or appends it to the pending FIFO when all slots are
    /// busy. Reaching the required slot count starts capture.
    ///
    /// An undersized buffer is retired through the completion queue with
    /// Error state; other queued buffers are unaffected.
    pub fn queue(&mut self, buf: FrameBuffer) {
        let required = self.format.bytes_per_line(self.out_width) * self.out_height;
        if buf.len < required {
            error!("buffer #{} too small ({} < {})", buf.id, buf.len, required);
            self.complete(buf, State::Error);
            return;
        }

        // never trust a software counter across a stop/start cycle
        if self.status == Status::Stopped && self.slot_count == 0 {
            self.sync_positions();
        }

        let capacity = self.slot_capacity();
        if self.slot_count >= capacity {
            self.pending.push_back(buf);
        } else {
            let slot = (self.set_pos + 1) % capacity;
            self.bind_slot(slot, buf);
        }

        if self.status != Status::Running && self.slot_count >= capacity {
            self.request_to_stop = false;
            self.status = Status::Running;
            self.start_capture();
        }
    }

    /// Whether the buffer is currently bound to a hardware slot
    pub fn is_bound(&self, id: u32) -> bool {
        self.slots.iter().flatten().any(|buf| buf.id == id)
    }

    /// Ask the hardware to stop so a bound buffer can be reclaimed.
    ///
    /// The caller loops on this plus a completion wait until the status
    /// lands on Stopped.
    pub fn request_stop(&mut self) {
        self.request_to_stop = true;

        if self.status == Status::Running {
            self.status = Status::Stopping;
            self.stop_capture();
        }
    }

    /// Reclaim a buffer after the hardware stopped.
    ///
    /// Every slot bound to it is retired with Error state: its frame
    /// never completed.
    pub fn fail_bound(&mut self, id: u32) {
        let capacity = self.slot_capacity();

        for slot in 0..MB_NUM {
            let buf = match self.slots[slot] {
                Some(buf) if buf.id == id => buf,
                _ => continue,
            };

            self.slots[slot] = None;
            self.complete(buf, State::Error);
            self.slot_count -= 1;
            // step set_pos back so the freed slot is handed out next
            self.set_pos = (self.set_pos + capacity - 1) % capacity;
        }
    }

    /// Drop a buffer that is waiting in the pending FIFO, retiring it
    /// with Error state
    pub fn remove_pending(&mut self, id: u32) {
        let mut kept = VecDeque::with_capacity(self.pending.len());
        while let Some(buf) = self.pending.pop_front() {
            if buf.id == id {
                self.complete(buf, State::Error);
            } else {
                kept.push_back(buf);
            }
        }
        self.pending = kept;
    }

    /// Retire the buffer in the next completed slot and promote a pending
    /// buffer into the freed slot if there is one.
    fn retire_and_promote(&mut self, capacity: usize, empty: &mut bool, start: &mut bool) {
        self.get_pos = (self.get_pos + 1) % capacity;

        match self.slots[self.get_pos].take() {
            Some(buf) => {
                self.complete(buf, State::Done);
                self.slot_count -= 1;
            }
            None => warn!("slot {} completed without a bound buffer", self.get_pos),
        }

        if self.status == Status::Stopping {
            return;
        }

        // set the next frame address
        match self.pending.pop_front() {
            Some(next) => {
                let slot = (self.set_pos + 1) % capacity;
                self.bind_slot(slot, next);
                *start = true;
            }
            None => *empty = true,
        }
    }

    /// Frame completion event, run from interrupt context under the
    /// driver lock.
    ///
    /// Retires every slot the hardware reports finished (in hardware
    /// order), promotes pending buffers, then acts on the start/stop
    /// decision collected along the way. Returns true once a requested
    /// stop is confirmed quiescent, so the caller can wake the waiter.
    pub fn interrupt_completion(&mut self) -> bool {
        let ints = self.regs.read(regs::INTS);
        self.regs.write(regs::INTS, ints);

        // nothing to do when capture never ran
        if self.status == Status::Stopped {
            return false;
        }

        let stopped = !self.is_active();

        if !self.request_to_stop {
            let mut empty = false;
            let mut start = false;

            if self.continuous() {
                // drain until the software position catches up with the
                // hardware's frame buffer status
                let fbs = self.frame_buffer_status() as usize;
                while fbs < 3 && self.get_pos != fbs {
                    self.retire_and_promote(MB_NUM, &mut empty, &mut start);
                }
            } else {
                // single frame mode: exactly one completion per interrupt
                self.retire_and_promote(1, &mut empty, &mut start);
            }

            if stopped {
                self.status = Status::Stopped;
            }

            // two-phase: decisions above, hardware commands below
            if empty && self.status == Status::Running {
                // out of buffers, stop the continuous transfer
                self.status = Status::Stopping;
                self.stop_capture();
            } else if start && self.status == Status::Stopped {
                // re-arm the next single transfer
                self.status = Status::Running;
                self.start_capture();
            }

            false
        } else if stopped {
            self.status = Status::Stopped;
            self.request_to_stop = false;
            true
        } else {
            false
        }
    }

    /// Read the capture control register and disable the module,
    /// returning the saved value for a later restore
    pub fn save_and_disable(&mut self) -> u32 {
        let mc = self.regs.read(regs::MC);
        self.regs.write(regs::MC, mc & !ModeControl::ME.bits());
        mc
    }

    /// Restore a capture control value saved by
    /// [`CaptureEngine::save_and_disable`]
    pub fn restore(&mut self, mc: u32) {
        self.regs.write(regs::MC, mc);
    }

    /// Whether restoring should re-enable the module: a slot is still
    /// bound but capture stopped while reconfiguring
    pub fn needs_restart(&self) -> bool {
        self.status == Status::Stopped && self.slots.iter().any(|slot| slot.is_some())
    }

    /// Program the sync polarity register
    pub fn set_data_mode2(&mut self, value: u32) {
        self.regs.write(regs::DMR2, value);
    }

    /// Retire every bound and pending buffer with Error state.
    ///
    /// Must only run while stopped; their frames never completed.
    pub fn flush_buffers(&mut self) {
        for slot in 0..MB_NUM {
            if let Some(buf) = self.slots[slot].take() {
                self.complete(buf, State::Error);
            }
        }
        self.slot_count = 0;

        while let Some(buf) = self.pending.pop_front() {
            self.complete(buf, State::Error);
        }
    }

    /// Full teardown when the camera client detaches: disable capture and
    /// interrupts, retire everything with Error state, reset all
    /// bookkeeping.
    pub fn detach_reset(&mut self) {
        let mc = self.regs.read(regs::MC);
        self.regs.write(regs::MC, mc & !ModeControl::ME.bits());
        self.regs.write(regs::IE, 0);
        self.soft_reset();

        self.status = Status::Stopped;
        self.request_to_stop = false;

        self.flush_buffers();
    }

    /// Pop the oldest completion, in hardware capture order
    pub fn next_completed(&mut self) -> Option<(FrameBuffer, Metadata)> {
        self.completed.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Register file that latches writes and raises the capture active
    /// bit whenever a frame capture is triggered.
    #[derive(Default)]
    struct TestRegs {
        mem: HashMap<u32, u32>,
        writes: Vec<(u32, u32)>,
    }

    impl TestRegs {
        fn set_ms(&mut self, active: bool, fbs: u32) {
            let mut value = fbs << regs::MS_FBS_SHIFT;
            if active {
                value |= ModuleStatus::CA.bits();
            }
            self.mem.insert(regs::MS, value);
        }

        fn writes_to(&self, offset: u32) -> Vec<u32> {
            self.writes
                .iter()
                .filter(|(off, _)| *off == offset)
                .map(|(_, value)| *value)
                .collect()
        }
    }

    impl Registers for TestRegs {
        fn read(&self, offset: u32) -> u32 {
            *self.mem.get(&offset).unwrap_or(&0)
        }

        fn write(&mut self, offset: u32, value: u32) {
            self.writes.push((offset, value));
            self.mem.insert(offset, value);

            // triggering a capture makes the hardware active
            if offset == regs::FC && value != 0 {
                let ms = self.read(regs::MS) | ModuleStatus::CA.bits();
                self.mem.insert(regs::MS, ms);
            }
        }
    }

    fn engine() -> CaptureEngine<TestRegs> {
        CaptureEngine::new(TestRegs::default(), BusInput::Bt656_8bit)
    }

    /// Buffer large enough for the default 640x480 YUYV geometry
    fn buf(id: u32) -> FrameBuffer {
        FrameBuffer::new(id, 0x1000_0000 + id * 0x0010_0000, 640 * 480 * 2)
    }

    #[test]
    fn continuous_capture_starts_once_after_three_buffers() {
        let mut engine = engine();
        engine.set_buffer_count(4);

        engine.queue(buf(1));
        engine.queue(buf(2));
        assert_eq!(engine.status(), Status::Stopped);
        assert!(engine.regs.writes_to(regs::FC).is_empty());

        engine.queue(buf(3));
        assert_eq!(engine.status(), Status::Running);
        assert_eq!(
            engine.regs.writes_to(regs::FC),
            vec![FrameCapture::C_FRAME.bits()]
        );

        // slots fill in hardware order starting after set_pos
        assert_eq!(engine.regs.read(regs::MB2), buf(1).addr);
        assert_eq!(engine.regs.read(regs::MB3), buf(2).addr);
        assert_eq!(engine.regs.read(regs::MB1), buf(3).addr);

        // a fourth buffer waits in the pending queue, no new trigger
        engine.queue(buf(4));
        assert_eq!(engine.pending_len(), 1);
        assert_eq!(engine.regs.writes_to(regs::FC).len(), 1);
    }

    #[test]
    fn undersized_buffer_retires_with_error() {
        let mut engine = engine();
        engine.set_buffer_count(4);

        engine.queue(FrameBuffer::new(7, 0x2000_0000, 64));

        let (buf, meta) = engine.next_completed().unwrap();
        assert_eq!(buf.id, 7);
        assert_eq!(meta.state, State::Error);
        assert_eq!(engine.status(), Status::Stopped);
        assert!(engine.regs.writes_to(regs::FC).is_empty());
    }

    #[test]
    fn single_mode_rearms_after_each_frame() {
        let mut engine = engine();
        engine.set_buffer_count(2);

        engine.queue(buf(1));
        assert_eq!(engine.status(), Status::Running);
        assert_eq!(
            engine.regs.writes_to(regs::FC),
            vec![FrameCapture::S_FRAME.bits()]
        );

        engine.queue(buf(2));
        assert_eq!(engine.pending_len(), 1);

        // the single transfer finished, hardware went idle
        engine.regs.set_ms(false, 0);
        assert!(!engine.interrupt_completion());

        let (done, meta) = engine.next_completed().unwrap();
        assert_eq!(done.id, 1);
        assert_eq!(meta.state, State::Done);
        assert_eq!(meta.sequence, 0);

        // the pending buffer was promoted and capture re-armed
        assert_eq!(engine.status(), Status::Running);
        assert_eq!(engine.regs.writes_to(regs::FC).len(), 2);
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn continuous_stops_when_pending_queue_runs_dry() {
        let mut engine = engine();
        engine.set_buffer_count(4);
        engine.queue(buf(1));
        engine.queue(buf(2));
        engine.queue(buf(3));
        assert_eq!(engine.status(), Status::Running);

        // slot 1 finished, nothing pending to promote into it
        engine.regs.set_ms(true, 1);
        assert!(!engine.interrupt_completion());
        assert_eq!(engine.status(), Status::Stopping);

        let (done, meta) = engine.next_completed().unwrap();
        assert_eq!(done.id, 1);
        assert_eq!(meta.sequence, 0);

        // slot 2 finished while the stop was in flight, then idle
        engine.regs.set_ms(false, 2);
        assert!(!engine.interrupt_completion());
        assert_eq!(engine.status(), Status::Stopped);

        let (done, meta) = engine.next_completed().unwrap();
        assert_eq!(done.id, 2);
        assert_eq!(meta.sequence, 1);

        // no restart: the trigger register saw start and stop only
        assert_eq!(
            engine.regs.writes_to(regs::FC),
            vec![FrameCapture::C_FRAME.bits(), 0]
        );
        assert_eq!(engine.bound_slots(), 1);
    }

    #[test]
    fn requested_stop_confirms_only_when_idle() {
        let mut engine = engine();
        engine.set_buffer_count(4);
        engine.queue(buf(1));
        engine.queue(buf(2));
        engine.queue(buf(3));

        engine.request_stop();
        assert_eq!(engine.status(), Status::Stopping);

        // still capturing the current frame
        assert!(!engine.interrupt_completion());
        assert_eq!(engine.status(), Status::Stopping);

        engine.regs.set_ms(false, 1);
        assert!(engine.interrupt_completion());
        assert_eq!(engine.status(), Status::Stopped);

        assert!(engine.is_bound(2));
        engine.fail_bound(2);
        assert!(!engine.is_bound(2));
        let (_, meta) = engine.next_completed().unwrap();
        assert_eq!(meta.state, State::Error);
    }

    #[test]
    fn positions_resync_from_hardware_status() {
        let mut engine = engine();
        engine.regs.set_ms(false, 2);
        engine.sync_positions();

        engine.set_buffer_count(4);
        engine.queue(buf(1));

        // binding continues after the hardware's last slot
        assert_eq!(engine.regs.read(regs::MB1), buf(1).addr);
    }

    #[test]
    fn detach_retires_everything_with_error() {
        let mut engine = engine();
        engine.set_buffer_count(4);
        engine.queue(buf(1));
        engine.queue(buf(2));
        engine.queue(buf(3));
        engine.queue(buf(4));

        engine.detach_reset();

        assert_eq!(engine.status(), Status::Stopped);
        assert_eq!(engine.bound_slots(), 0);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.regs.read(regs::IE), 0);

        let mut retired = 0;
        while let Some((_, meta)) = engine.next_completed() {
            assert_eq!(meta.state, State::Error);
            retired += 1;
        }
        assert_eq!(retired, 4);
    }
}
