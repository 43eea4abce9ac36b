use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use vin::regs::{self, ModuleStatus, Registers};
use vin::sensor::{Capabilities, Sensor};
use vin::{
    Config, Error, Format, FourCC, FrameBuffer, FrameFormat, MbusCode, Rect, State, Status, Vin,
};

#[derive(Default)]
struct RegFile {
    mem: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

/// Register block handle shared between the host under test and the test
/// itself, standing in for the interrupt side of the hardware.
#[derive(Clone, Default)]
struct SharedRegs(Arc<Mutex<RegFile>>);

impl SharedRegs {
    /// Simulate the hardware status: capture active flag plus the last
    /// completed slot
    fn set_status(&self, active: bool, fbs: u32) {
        let mut value = fbs << regs::MS_FBS_SHIFT;
        if active {
            value |= ModuleStatus::CA.bits();
        }
        self.0.lock().unwrap().mem.insert(regs::MS, value);
    }

    fn value(&self, offset: u32) -> u32 {
        *self.0.lock().unwrap().mem.get(&offset).unwrap_or(&0)
    }

    fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.0
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(off, _)| *off == offset)
            .map(|(_, value)| *value)
            .collect()
    }
}

impl Registers for SharedRegs {
    fn read(&self, offset: u32) -> u32 {
        *self.0.lock().unwrap().mem.get(&offset).unwrap_or(&0)
    }

    fn write(&mut self, offset: u32, value: u32) {
        let mut file = self.0.lock().unwrap();
        file.writes.push((offset, value));
        file.mem.insert(offset, value);

        // triggering a capture makes the hardware active
        if offset == regs::FC && value != 0 {
            let ms = *file.mem.get(&regs::MS).unwrap_or(&0) | ModuleStatus::CA.bits();
            file.mem.insert(regs::MS, ms);
        }
    }
}

/// Sensor that crops anywhere within its bounds and scales its output
/// freely down from the crop window.
struct TestSensor {
    bounds: Rect,
    rect: Rect,
    format: FrameFormat,
    /// When set, format requests are ignored; models a sensor without
    /// scaling support
    fixed: bool,
}

impl TestSensor {
    fn new(width: u32, height: u32) -> Self {
        let bounds = Rect::new(0, 0, width, height);
        TestSensor {
            bounds,
            rect: bounds,
            format: FrameFormat::new(width, height, MbusCode::Yuyv8_2x8),
            fixed: false,
        }
    }

    fn fixed(width: u32, height: u32) -> Self {
        let mut sensor = Self::new(width, height);
        sensor.fixed = true;
        sensor
    }
}

impl Sensor for TestSensor {
    fn crop(&self) -> Result<Option<Rect>, Error> {
        Ok(Some(self.rect))
    }

    fn capabilities(&self) -> Result<Capabilities, Error> {
        Ok(Capabilities {
            bounds: self.bounds,
            default: self.bounds,
        })
    }

    fn set_crop(&mut self, rect: &Rect) -> Result<(), Error> {
        let mut rect = *rect;
        rect.clamp_within(&self.bounds);
        self.rect = rect;
        Ok(())
    }

    fn format(&self) -> Result<FrameFormat, Error> {
        Ok(self.format)
    }

    fn set_format(&mut self, fmt: &mut FrameFormat) -> Result<(), Error> {
        self.try_format(fmt)?;
        self.format = *fmt;
        Ok(())
    }

    fn try_format(&self, fmt: &mut FrameFormat) -> Result<(), Error> {
        if self.fixed {
            fmt.width = self.format.width;
            fmt.height = self.format.height;
            return Ok(());
        }
        fmt.width = fmt.width.min(self.bounds.width);
        fmt.height = fmt.height.min(self.bounds.height);
        Ok(())
    }
}

fn vin(regs: &SharedRegs) -> Vin<SharedRegs, TestSensor> {
    let _ = env_logger::builder().is_test(true).try_init();
    Vin::new(regs.clone(), Config::default())
}

/// Attach, negotiate 640x480 YUYV and program the bus
fn streaming_setup(vin: &Vin<SharedRegs, TestSensor>) -> Format {
    vin.attach(TestSensor::new(1280, 960)).unwrap();

    let request = Format::new(640, 480, FourCC::new(b"YUYV"));
    let fmt = vin.set_format(&request).unwrap();
    vin.set_bus_params().unwrap();

    fmt
}

fn buffers(fmt: &Format, count: u32) -> Vec<FrameBuffer> {
    (1..=count)
        .map(|id| FrameBuffer::new(id, 0x4000_0000 + id * 0x0100_0000, fmt.size))
        .collect()
}

#[test]
fn only_one_client_at_a_time() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);

    vin.attach(TestSensor::new(1280, 960)).unwrap();
    assert_eq!(vin.attach(TestSensor::new(640, 480)), Err(Error::Busy));

    vin.detach().unwrap();
    vin.attach(TestSensor::new(640, 480)).unwrap();
}

#[test]
fn streaming_starts_with_enough_buffers() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    let fmt = streaming_setup(&vin);

    assert_eq!((fmt.width, fmt.height), (640, 480));
    assert_eq!(fmt.size, 640 * 2 * 480);

    assert_eq!(vin.request_buffers(4).unwrap(), 4);
    for buf in buffers(&fmt, 3) {
        vin.queue(buf).unwrap();
    }

    assert_eq!(vin.status(), Status::Running);
    assert_eq!(regs.writes_to(regs::FC).len(), 1);

    // sync polarities were programmed before streaming
    assert_ne!(regs.value(regs::DMR2), 0);
}

#[test]
fn oversized_sensor_fails_attach_cleanly() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);

    let err = vin.attach(TestSensor::fixed(4000, 3000)).unwrap_err();
    assert!(matches!(err, Error::SensorTooLarge { .. }));

    // the failed negotiation left no client behind
    assert_eq!(vin.request_buffers(4), Err(Error::NotAttached));
    vin.attach(TestSensor::new(1280, 960)).unwrap();
}

#[test]
fn release_of_bound_buffer_waits_for_stop_confirmation() {
    let regs = SharedRegs::default();
    let vin = Arc::new(vin(&regs));
    let fmt = streaming_setup(&vin);

    vin.request_buffers(4).unwrap();
    for buf in buffers(&fmt, 3) {
        vin.queue(buf).unwrap();
    }
    assert_eq!(vin.status(), Status::Running);

    // the interrupt side confirms quiescence a little later
    let irq_vin = vin.clone();
    let irq_regs = regs.clone();
    let irq = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        irq_regs.set_status(false, 0);
        irq_vin.handle_interrupt();
    });

    vin.release(1).unwrap();
    irq.join().unwrap();

    assert_eq!(vin.status(), Status::Stopped);
    let (buf, meta) = vin.dequeue().unwrap();
    assert_eq!(buf.id, 1);
    assert_eq!(meta.state, State::Error);

    // capture already stopped, the remaining releases return right away
    vin.release(2).unwrap();
    vin.release(3).unwrap();
    assert_eq!(vin.dequeue().unwrap().0.id, 2);
    assert_eq!(vin.dequeue().unwrap().0.id, 3);
    assert!(vin.dequeue().is_none());
}

#[test]
fn release_of_pending_buffer_does_not_stop_capture() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    let fmt = streaming_setup(&vin);

    vin.request_buffers(4).unwrap();
    for buf in buffers(&fmt, 4) {
        vin.queue(buf).unwrap();
    }

    // buffer 4 never made it into a slot
    vin.release(4).unwrap();
    assert_eq!(vin.status(), Status::Running);

    let (buf, meta) = vin.dequeue().unwrap();
    assert_eq!(buf.id, 4);
    assert_eq!(meta.state, State::Error);
}

#[test]
fn completions_arrive_in_hardware_order() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    let fmt = streaming_setup(&vin);

    vin.request_buffers(4).unwrap();
    for buf in buffers(&fmt, 4) {
        vin.queue(buf).unwrap();
    }

    // two frames done back to back before software caught up
    regs.set_status(true, 2);
    vin.handle_interrupt();

    let (first, meta) = vin.dequeue().unwrap();
    assert_eq!((first.id, meta.sequence), (1, 0));
    assert_eq!(meta.state, State::Done);

    let (second, meta) = vin.dequeue().unwrap();
    assert_eq!((second.id, meta.sequence), (2, 1));
    assert!(vin.dequeue().is_none());
}

#[test]
fn crop_programs_clip_and_scale_registers() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    vin.attach(TestSensor::new(1280, 960)).unwrap();

    vin.set_crop(&Rect::new(64, 32, 640, 480)).unwrap();
    assert_eq!(vin.crop().unwrap(), Rect::new(64, 32, 640, 480));

    // after cropping the output window is the full sensor output
    let fmt = vin.format().unwrap();
    assert_eq!((fmt.width, fmt.height), (1280, 960));

    // pre-clip follows the sub-rectangle
    assert_eq!(regs.value(regs::SPPRC), 64);
    assert_eq!(regs.value(regs::EPPRC), 64 + 640 - 1);
    assert_eq!(regs.value(regs::SLPRC), 32);
    assert_eq!(regs.value(regs::ELPRC), 32 + 480 - 1);

    // 640 -> 1280 is a 2x enlargement, expressed in Q12
    assert_eq!(regs.value(regs::XS), 0x0800);
    assert_eq!(regs.value(regs::YS), 0x0800);

    // post-clip and stride follow the output window
    assert_eq!(regs.value(regs::EPPOC), 1280 - 1);
    assert_eq!(regs.value(regs::ELPOC), 960 - 1);
    assert_eq!(regs.value(regs::IS), 1280);
}

#[test]
fn format_negotiation_is_idempotent() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    vin.attach(TestSensor::new(1280, 960)).unwrap();

    let request = Format::new(720, 480, FourCC::new(b"YUYV"));
    let tried = vin.try_format(&request).unwrap();
    assert_eq!((tried.width, tried.height), (720, 480));

    let first = vin.set_format(&tried).unwrap();
    let second = vin.set_format(&first).unwrap();
    assert_eq!((first.width, first.height), (second.width, second.height));
    assert_eq!(first.size, second.size);
    assert_eq!(second.size, vin.format().unwrap().size);

    // trying the configured format again changes nothing
    let retried = vin.try_format(&second).unwrap();
    assert_eq!((retried.width, retried.height), (720, 480));
}

#[test]
fn try_format_clamps_to_what_the_sensor_delivers() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    vin.attach(TestSensor::new(640, 480)).unwrap();

    let request = Format::new(2560, 1920, FourCC::new(b"YUYV"));
    let fmt = vin.try_format(&request).unwrap();
    assert_eq!((fmt.width, fmt.height), (640, 480));
    assert_eq!(fmt.size, 640 * 2 * 480);

    // unknown pixelformats are refused outright
    let request = Format::new(640, 480, FourCC::new(b"MJPG"));
    assert!(matches!(
        vin.try_format(&request),
        Err(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn oversized_format_request_fails_without_register_writes() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    vin.attach(TestSensor::new(1280, 960)).unwrap();

    let request = Format::new(1920, 1080, FourCC::new(b"YUYV"));
    let err = vin.set_format(&request).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));

    // nothing was programmed and the cached format is untouched
    assert!(regs.writes_to(regs::XS).is_empty());
    assert_eq!(vin.format().unwrap().width, 1280);
}

#[test]
fn zero_size_format_request_is_rejected() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    vin.attach(TestSensor::new(1280, 960)).unwrap();

    let request = Format::new(0, 0, FourCC::new(b"YUYV"));
    let err = vin.set_format(&request).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));

    // and the same request rounds up through try_format
    let adjusted = vin.try_format(&request).unwrap();
    assert!(adjusted.width >= 2 && adjusted.height >= 4);
    vin.set_format(&adjusted).unwrap();
}

#[test]
fn stop_stream_drains_all_buffers() {
    let regs = SharedRegs::default();
    let vin = Arc::new(vin(&regs));
    let fmt = streaming_setup(&vin);

    vin.request_buffers(4).unwrap();
    for buf in buffers(&fmt, 4) {
        vin.queue(buf).unwrap();
    }

    let irq_vin = vin.clone();
    let irq_regs = regs.clone();
    let irq = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        irq_regs.set_status(false, 0);
        irq_vin.handle_interrupt();
    });

    vin.stop_stream().unwrap();
    irq.join().unwrap();

    assert_eq!(vin.status(), Status::Stopped);
    let mut drained = 0;
    while let Some((_, meta)) = vin.dequeue() {
        assert_eq!(meta.state, State::Error);
        drained += 1;
    }
    assert_eq!(drained, 4);

    // a new session starts from a clean sequence counter
    vin.request_buffers(4).unwrap();
}

#[test]
fn detach_returns_the_sensor() {
    let regs = SharedRegs::default();
    let vin = vin(&regs);
    let fmt = streaming_setup(&vin);

    vin.request_buffers(4).unwrap();
    vin.queue(FrameBuffer::new(1, 0x4000_0000, fmt.size)).unwrap();

    let sensor = vin.detach().unwrap();
    assert_eq!(sensor.format().unwrap().width, 640);

    assert_eq!(vin.dequeue().unwrap().1.state, State::Error);
    assert_eq!(vin.queue(FrameBuffer::new(2, 0, 0)), Err(Error::NotAttached));
}
