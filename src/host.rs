use std::convert::TryFrom;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::buffer::{FrameBuffer, Metadata};
use crate::capture::{BusInput, CaptureEngine, Status};
use crate::error::Error;
use crate::format::{FieldOrder, Format, FrameFormat, PixelFormat};
use crate::geometry::{Geometry, MAX_HEIGHT, MAX_WIDTH};
use crate::rect::Rect;
use crate::regs::{DataMode2, ModeControl, Registers};
use crate::sensor::{BusConfig, BusFlags, Sensor};

/// How long a frame may take to finish after the module is disabled
const QUIESCE_TIMEOUT: Duration = Duration::from_millis(100);

/// How long a requested capture stop may take to be confirmed by the
/// interrupt handler
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Bus options the capture unit itself supports
const HOST_BUS_FLAGS: BusFlags = BusFlags::MASTER
    .union(BusFlags::PCLK_SAMPLE_RISING)
    .union(BusFlags::HSYNC_ACTIVE_HIGH)
    .union(BusFlags::HSYNC_ACTIVE_LOW)
    .union(BusFlags::VSYNC_ACTIVE_HIGH)
    .union(BusFlags::VSYNC_ACTIVE_LOW)
    .union(BusFlags::DATA_ACTIVE_HIGH);

/// Board wiring description for one VIN instance
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Input interface the sensor is wired to
    pub input: BusInput,
    /// Prefer hsync active low when the sensor offers both polarities
    pub hsync_low: bool,
    /// Prefer vsync active low when the sensor offers both polarities
    pub vsync_low: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: BusInput::Bt656_8bit,
            hsync_low: false,
            vsync_low: false,
        }
    }
}

struct Client<S> {
    sensor: S,
    geometry: Geometry,
    format: PixelFormat,
    field: FieldOrder,
}

/// One VIN capture unit with its attached camera client.
///
/// Streaming methods lock only the engine and are safe to call
/// concurrently with [`Vin::handle_interrupt`]; negotiation methods
/// additionally serialize on the client and may sleep while waiting for
/// the hardware to quiesce.
pub struct Vin<R: Registers, S: Sensor> {
    config: Config,
    engine: Mutex<CaptureEngine<R>>,
    /// Signalled by the interrupt handler when a requested stop lands
    stopped: Condvar,
    client: Mutex<Option<Client<S>>>,
}

impl<R: Registers, S: Sensor> Vin<R, S> {
    /// Returns a capture host for the register block described by `regs`
    ///
    /// # Arguments
    ///
    /// * `regs` - Register access for this VIN instance
    /// * `config` - Board wiring of the camera bus
    pub fn new(regs: R, config: Config) -> Self {
        Vin {
            config,
            engine: Mutex::new(CaptureEngine::new(regs, config.input)),
            stopped: Condvar::new(),
            client: Mutex::new(None),
        }
    }

    fn engine(&self) -> MutexGuard<'_, CaptureEngine<R>> {
        match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn client(&self) -> MutexGuard<'_, Option<Client<S>>> {
        match self.client.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Attach a camera client.
    ///
    /// Re-derives the slot positions from the hardware, clears stale
    /// interrupt status and negotiates an initial geometry with the
    /// sensor. Only one client can be attached at a time.
    pub fn attach(&self, mut sensor: S) -> Result<(), Error> {
        let mut client = self.client();
        if client.is_some() {
            return Err(Error::Busy);
        }

        {
            let mut engine = self.engine();
            engine.sync_positions();
            engine.soft_reset();
        }

        let geometry = Geometry::negotiate_initial(&mut sensor)?;
        self.engine().apply_geometry(&geometry);

        *client = Some(Client {
            sensor,
            geometry,
            format: PixelFormat::Yuyv,
            field: FieldOrder::Progressive,
        });
        info!("camera client attached");

        Ok(())
    }

    /// Detach the camera client, returning the sensor.
    ///
    /// Disables capture and retires every outstanding buffer with Error
    /// state through the completion queue.
    pub fn detach(&self) -> Result<S, Error> {
        let mut client = self.client();
        let client = client.take().ok_or(Error::NotAttached)?;

        self.engine().detach_reset();
        info!("camera client detached");

        Ok(client.sensor)
    }

    /// Current capture status
    pub fn status(&self) -> Status {
        self.engine().status()
    }

    /// Negotiate the queue depth for the next streaming session.
    ///
    /// At least two buffers are required; four or more select continuous
    /// transfer mode. Returns the granted count. Fails while streaming.
    pub fn request_buffers(&self, count: u32) -> Result<u32, Error> {
        let client = self.client();
        client.as_ref().ok_or(Error::NotAttached)?;

        let mut engine = self.engine();
        if engine.status() != Status::Stopped {
            return Err(Error::Busy);
        }

        let count = count.max(2);
        engine.set_buffer_count(count);

        Ok(count)
    }

    /// Hand a buffer to the driver for capture.
    ///
    /// Starts the hardware once enough buffers are bound. An undersized
    /// buffer comes back through [`Vin::dequeue`] with Error state.
    pub fn queue(&self, buf: FrameBuffer) -> Result<(), Error> {
        let client = self.client();
        client.as_ref().ok_or(Error::NotAttached)?;

        self.engine().queue(buf);
        Ok(())
    }

    /// Pop the oldest completed buffer, in hardware capture order
    pub fn dequeue(&self) -> Option<(FrameBuffer, Metadata)> {
        self.engine().next_completed()
    }

    /// Forcibly reclaim one buffer.
    ///
    /// A buffer bound to a hardware slot cannot be taken away while the
    /// device may still write to it, so this stops capture first and
    /// blocks until the interrupt handler confirms quiescence. The buffer
    /// is retired through the completion queue with Error state.
    pub fn release(&self, id: u32) -> Result<(), Error> {
        let mut engine = self.engine();

        if engine.is_bound(id) {
            engine = self.wait_for_stop(engine)?;
            engine.fail_bound(id);
        } else {
            engine.remove_pending(id);
        }

        Ok(())
    }

    /// Stop streaming and retire every outstanding buffer with Error
    /// state
    pub fn stop_stream(&self) -> Result<(), Error> {
        let mut engine = self.engine();
        engine = self.wait_for_stop(engine)?;
        engine.flush_buffers();

        Ok(())
    }

    /// Frame completion interrupt entry point.
    ///
    /// Call from the interrupt thread whenever the VIN raises its
    /// interrupt line.
    pub fn handle_interrupt(&self) {
        let mut engine = self.engine();
        if engine.interrupt_completion() {
            self.stopped.notify_all();
        }
    }

    /// Current crop rectangle, in sensor coordinates
    pub fn crop(&self) -> Result<Rect, Error> {
        let client = self.client();
        let client = client.as_ref().ok_or(Error::NotAttached)?;

        Ok(client.geometry.subrect)
    }

    /// Crop the capture window.
    ///
    /// Negotiates the crop iteratively with the sensor; the output window
    /// becomes the full sensor output and the requested rectangle is cut
    /// out by the capture unit's own pre-clipping. Read the result back
    /// with [`Vin::crop`] and [`Vin::format`], the sensor may have
    /// adjusted the geometry.
    pub fn set_crop(&self, rect: &Rect) -> Result<(), Error> {
        debug!("S_CROP {}", rect);

        let mut client = self.client();
        let client = client.as_mut().ok_or(Error::NotAttached)?;

        // the sensor output window can change during sensor cropping
        let saved = self.save_and_quiesce();

        client
            .geometry
            .negotiate_crop(&mut client.sensor, rect)?;

        let mf = client.sensor.format()?;
        if mf.width > MAX_WIDTH || mf.height > MAX_HEIGHT {
            return Err(Error::OutOfRange {
                width: mf.width,
                height: mf.height,
            });
        }

        let geo = &mut client.geometry;
        geo.width = mf.width;
        geo.height = mf.height;
        geo.out_width = mf.width;
        geo.out_height = mf.height;

        let mut rect = *rect;
        if rect.left < 0 {
            rect.left = 0;
        }
        if rect.top < 0 {
            rect.top = 0;
        }
        geo.vin_left = (rect.left & !1) as u32;
        geo.vin_top = (rect.top & !1) as u32;
        geo.subrect = rect;
        geo.update_subrect();

        let mut engine = self.engine();
        engine.apply_geometry(geo);
        engine.set_rect();

        debug!(
            "cropped to {}x{}@{}:{}",
            geo.out_width, geo.out_height, geo.vin_left, geo.vin_top
        );

        // a buffer may have been bound while capture was quiesced
        let saved = if engine.needs_restart() {
            saved | ModeControl::ME.bits()
        } else {
            saved
        };
        engine.restore(saved);

        Ok(())
    }

    /// Current capture output format
    pub fn format(&self) -> Result<Format, Error> {
        let client = self.client();
        let client = client.as_ref().ok_or(Error::NotAttached)?;

        let geo = &client.geometry;
        let stride = client.format.bytes_per_line(geo.out_width);
        Ok(Format {
            width: geo.out_width,
            height: geo.out_height,
            fourcc: client.format.fourcc(),
            field_order: client.field,
            stride,
            size: geo.out_height * stride,
        })
    }

    /// Adjust a format request to what a subsequent [`Vin::set_format`]
    /// would deliver, without changing any state.
    pub fn try_format(&self, fmt: &Format) -> Result<Format, Error> {
        debug!("TRY_FMT {} {}x{}", fmt.fourcc, fmt.width, fmt.height);

        let mut client = self.client();
        let client = client.as_mut().ok_or(Error::NotAttached)?;

        let pixel = PixelFormat::try_from(fmt.fourcc)
            .map_err(|_| Error::UnsupportedFormat(fmt.fourcc))?;

        let mut fmt = *fmt;
        fmt.width = fmt.width.clamp(2, MAX_WIDTH) & !1;
        fmt.height = fmt.height.clamp(4, MAX_HEIGHT) & !3;

        let width = fmt.width;
        let height = fmt.height;

        // limit to sensor capabilities: the capture unit only scales
        // down, so the sensor output caps the deliverable window
        let code = client.sensor.format()?.code;
        let mut mf = FrameFormat::new(fmt.width, fmt.height, code);
        client.sensor.try_format(&mut mf)?;

        if fmt.width > mf.width {
            fmt.width = mf.width;
        }
        if fmt.height > mf.height {
            fmt.height = mf.height;
        }

        if pixel == PixelFormat::Nv16 {
            // no scaling on the YC separate path, the sensor must deliver
            // the exact size
            if fmt.width < width || fmt.height < height {
                mf.width = MAX_WIDTH;
                mf.height = MAX_HEIGHT;
                client.sensor.try_format(&mut mf)?;
            }
            if mf.width >= width {
                fmt.width = width;
            }
            if mf.height >= height {
                fmt.height = height;
            }
        }

        fmt.stride = pixel.bytes_per_line(fmt.width);
        fmt.size = fmt.height * fmt.stride;

        Ok(fmt)
    }

    /// Negotiate the capture output format.
    ///
    /// Multistage iterative algorithm like [`Vin::set_crop`]: maps the
    /// requested user window back onto the sensor input, lets the sensor
    /// scale as close as it can and leaves the rest to the capture unit's
    /// own scaler. Returns the format actually configured. Run the
    /// request through [`Vin::try_format`] first.
    pub fn set_format(&self, fmt: &Format) -> Result<Format, Error> {
        debug!("S_FMT {} {}x{}", fmt.fourcc, fmt.width, fmt.height);

        let mut client = self.client();
        let client = client.as_mut().ok_or(Error::NotAttached)?;

        let pixel = PixelFormat::try_from(fmt.fourcc)
            .map_err(|_| Error::UnsupportedFormat(fmt.fourcc))?;

        // the scale ratio divides by the output dimensions; anything
        // outside the hardware window is rejected before touching the
        // sensor ([`Vin::try_format`] clamps instead)
        if fmt.width < 2 || fmt.height < 4 || fmt.width > MAX_WIDTH || fmt.height > MAX_HEIGHT {
            return Err(Error::OutOfRange {
                width: fmt.width,
                height: fmt.height,
            });
        }

        // the hardware captures whole frames; a generic interlaced
        // request gets the top field first
        let field = match fmt.field_order {
            FieldOrder::Interlaced => FieldOrder::InterlacedTb,
            other => other,
        };

        // negotiate on a working copy, committed only on full success
        let mut geo = client.geometry;

        // calculate the required sensor output window
        let (out_width, out_height) = geo.output_for_request(fmt.width, fmt.height);
        debug!("request sensor output {}x{}", out_width, out_height);

        let code = client.sensor.format()?.code;
        let mut mf = FrameFormat::new(out_width, out_height, code);

        let (sub_width, sub_height) =
            geo.apply_format(&mut client.sensor, &mut mf, pixel.can_scale())?;

        if mf.code != code {
            return Err(Error::Sensor(format!(
                "media bus code changed during negotiation: {:?}",
                mf.code
            )));
        }

        // the capture unit only scales down from the sensor output; a
        // window the sensor cannot cover fails instead of being clamped
        if mf.width < fmt.width || mf.height < fmt.height {
            return Err(Error::OutOfRange {
                width: fmt.width,
                height: fmt.height,
            });
        }

        geo.width = mf.width;
        geo.height = mf.height;
        geo.out_width = fmt.width;
        geo.out_height = fmt.height;
        geo.code = mf.code;

        debug!(
            "scaling {}x{} -> {}x{}",
            sub_width, sub_height, fmt.width, fmt.height
        );

        client.geometry = geo;
        client.format = pixel;
        client.field = field;

        let mut engine = self.engine();
        engine.apply_geometry(&geo);
        engine.set_format(pixel);
        engine.set_field(field);

        let mut fmt = *fmt;
        fmt.field_order = field;
        fmt.stride = pixel.bytes_per_line(fmt.width);
        fmt.size = fmt.height * fmt.stride;

        Ok(fmt)
    }

    /// Reconcile sync polarities with the sensor and program the capture
    /// window.
    ///
    /// Intersects the sensor's bus options with what the capture unit
    /// supports, breaks polarity ties with the board [`Config`], commits
    /// the result to the sensor and programs the clip, scale and sync
    /// registers. Call after format or crop negotiation, before
    /// streaming.
    pub fn set_bus_params(&self) -> Result<(), Error> {
        let mut client = self.client();
        let client = client.as_mut().ok_or(Error::NotAttached)?;

        let saved = self.save_and_quiesce();

        let mut flags = HOST_BUS_FLAGS;
        if let Some(cfg) = client.sensor.bus_config()? {
            flags &= cfg.flags;
            if !flags.contains(BusFlags::HSYNC_ACTIVE_HIGH)
                && !flags.contains(BusFlags::HSYNC_ACTIVE_LOW)
            {
                return Err(Error::BusConfig);
            }
            if !flags.contains(BusFlags::VSYNC_ACTIVE_HIGH)
                && !flags.contains(BusFlags::VSYNC_ACTIVE_LOW)
            {
                return Err(Error::BusConfig);
            }
        }

        // break ties based on board preferences
        if flags.contains(BusFlags::HSYNC_ACTIVE_HIGH | BusFlags::HSYNC_ACTIVE_LOW) {
            if self.config.hsync_low {
                flags.remove(BusFlags::HSYNC_ACTIVE_HIGH);
            } else {
                flags.remove(BusFlags::HSYNC_ACTIVE_LOW);
            }
        }
        if flags.contains(BusFlags::VSYNC_ACTIVE_HIGH | BusFlags::VSYNC_ACTIVE_LOW) {
            if self.config.vsync_low {
                flags.remove(BusFlags::VSYNC_ACTIVE_HIGH);
            } else {
                flags.remove(BusFlags::VSYNC_ACTIVE_LOW);
            }
        }

        client.sensor.set_bus_config(&BusConfig { flags })?;

        let mut value = DataMode2::FTEV | DataMode2::VLV_1;
        if !flags.contains(BusFlags::VSYNC_ACTIVE_LOW) {
            value |= DataMode2::VPS;
        }
        if !flags.contains(BusFlags::HSYNC_ACTIVE_LOW) {
            value |= DataMode2::HPS;
        }

        {
            let mut engine = self.engine();
            engine.set_data_mode2(value.bits());
            engine.apply_geometry(&client.geometry);
            engine.set_format(client.format);
            engine.set_field(client.field);
            engine.set_rect();
        }

        // let the sync configuration settle before re-enabling capture
        thread::sleep(Duration::from_millis(1));

        self.engine().restore(saved);

        Ok(())
    }

    /// Disable the capture module and wait until the current frame ends.
    ///
    /// Sleeps without holding the engine lock so completion interrupts
    /// keep being served. Returns the saved capture control value.
    fn save_and_quiesce(&self) -> u32 {
        let saved = self.engine().save_and_disable();

        let deadline = Instant::now() + QUIESCE_TIMEOUT;
        while self.engine().is_active() {
            if Instant::now() >= deadline {
                error!("timeout waiting for frame end, interface problem?");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        saved
    }

    /// Request a capture stop and block until the interrupt handler
    /// confirms it
    fn wait_for_stop<'a>(
        &'a self,
        mut engine: MutexGuard<'a, CaptureEngine<R>>,
    ) -> Result<MutexGuard<'a, CaptureEngine<R>>, Error> {
        while engine.status() != Status::Stopped {
            engine.request_stop();

            let (guard, timeout) = self
                .stopped
                .wait_timeout(engine, STOP_TIMEOUT)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            engine = guard;

            if timeout.timed_out() && engine.status() != Status::Stopped {
                error!("capture did not stop, giving up on the hardware");
                return Err(Error::Timeout);
            }
        }

        Ok(engine)
    }
}
