use log::{debug, error};

use crate::error::Error;
use crate::format::{FrameFormat, MbusCode};
use crate::rect::Rect;
use crate::sensor::Sensor;

/// Largest frame the capture hardware can accept from a sensor
pub const MAX_WIDTH: u32 = 2560;
pub const MAX_HEIGHT: u32 = 1920;

/// Q12 unity scale: a ratio of 4096 is 1:1 passthrough
pub const UNITY_SCALE: u32 = 4096;

/// Q12 ratio between a source and a destination dimension, rounded
pub fn scale_ratio(input: u32, output: u32) -> u32 {
    (input * UNITY_SCALE + output / 2) / output
}

/// Apply a Q12 ratio to a dimension, rounded
pub fn scale_down(size: u32, scale: u32) -> u32 {
    (size * UNITY_SCALE + scale / 2) / scale
}

/// Current sensor crop, falling back to the default rectangle for sensors
/// without crop support
pub fn sensor_rect<S: Sensor>(sensor: &S) -> Result<Rect, Error> {
    if let Some(rect) = sensor.crop()? {
        return Ok(rect);
    }

    Ok(sensor.capabilities()?.default)
}

/// Cached geometry of one negotiation session.
///
/// Scale factors are never stored: they are re-derived from these
/// rectangles whenever registers get programmed, so the cache cannot drift
/// from the geometry it describes.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Capture window offsets within the scaled sensor output
    pub vin_left: u32,
    pub vin_top: u32,
    /// Sensor output size, as seen by the capture unit
    pub width: u32,
    pub height: u32,
    /// User output window
    pub out_width: u32,
    pub out_height: u32,
    /// Effective input window, mapped onto sensor coordinates
    pub subrect: Rect,
    /// Current sensor crop rectangle
    pub rect: Rect,
    /// Media bus code the sensor currently produces
    pub code: MbusCode,
}

impl Geometry {
    /// First-time negotiation when a client attaches.
    ///
    /// Queries the current sensor geometry and, if it exceeds the hardware
    /// maximum, walks the sensor down through 2560x1920, 1280x960, 640x480
    /// and 320x240 until it fits.
    pub fn negotiate_initial<S: Sensor>(sensor: &mut S) -> Result<Geometry, Error> {
        let rect = sensor_rect(sensor)?;
        let mut mf = sensor.format()?;

        let mut shift = 0;
        while (mf.width > MAX_WIDTH || mf.height > MAX_HEIGHT) && shift < 4 {
            mf.width = MAX_WIDTH >> shift;
            mf.height = MAX_HEIGHT >> shift;
            sensor.set_format(&mut mf)?;
            shift += 1;
        }

        if shift == 4 {
            error!(
                "failed to configure the sensor below {}x{}",
                mf.width, mf.height
            );
            return Err(Error::SensorTooLarge {
                width: mf.width,
                height: mf.height,
            });
        }

        debug!("initial sensor geometry {} within {}", mf, rect);

        Ok(Geometry {
            vin_left: 0,
            vin_top: 0,
            width: mf.width,
            height: mf.height,
            out_width: mf.width,
            out_height: mf.height,
            subrect: rect,
            rect,
            code: mf.code,
        })
    }

    /// Re-clamp the cached sub-rectangle after the sensor crop changed.
    ///
    /// Shrinks only when the sub-rectangle cannot fit at all, otherwise
    /// shifts it to the nearest valid edge. Never enlarges.
    pub fn update_subrect(&mut self) {
        let rect = self.rect;
        self.subrect.clamp_within(&rect);
    }

    /// Iterative sensor cropping.
    ///
    /// 1. ask the sensor for exactly the requested rectangle
    /// 2. if the sensor applied something else, double a working rectangle
    ///    (dropping left/top to the capability bounds when uncovered) until
    ///    the sensor rectangle covers the request or the bounds run out
    /// 3. as a last resort request the full bounds
    ///
    /// On success the cache holds the actual sensor rectangle and the
    /// requested rectangle re-clamped into it.
    pub fn negotiate_crop<S: Sensor>(
        &mut self,
        sensor: &mut S,
        rect: &Rect,
    ) -> Result<(), Error> {
        let _ = sensor.set_crop(rect);

        let mut cam_rect = sensor_rect(sensor)?;
        if cam_rect == *rect {
            // even if the sensor refused the call, the rectangle matches
            debug!("sensor crop successful for {}", rect);
            self.rect = cam_rect;
            self.subrect = *rect;
            self.update_subrect();
            return Ok(());
        }

        debug!("fix sensor crop {} towards {}", cam_rect, rect);

        let cap = sensor.capabilities()?;

        // some sensors only handle fixed sizes like QVGA or VGA; starting
        // from at least 2x2 avoids an infinite doubling loop
        let mut width = cam_rect.width.max(2);
        let mut height = cam_rect.height.max(2);

        while (cam_rect.is_smaller(rect) || cam_rect.fails_to_cover(rect))
            && (cap.bounds.width > width || cap.bounds.height > height)
        {
            width *= 2;
            height *= 2;

            cam_rect.width = width;
            cam_rect.height = height;

            // No way to know how the sensor iterates its borders, so drop
            // straight to the capability bounds whenever the target is not
            // covered on that side.
            if cam_rect.left > rect.left {
                cam_rect.left = cap.bounds.left;
            }
            let right = rect.left + rect.width as i32;
            if cam_rect.left + (cam_rect.width as i32) < right {
                cam_rect.width = (right - cam_rect.left).max(0) as u32;
            }

            if cam_rect.top > rect.top {
                cam_rect.top = cap.bounds.top;
            }
            let bottom = rect.top + rect.height as i32;
            if cam_rect.top + (cam_rect.height as i32) < bottom {
                cam_rect.height = (bottom - cam_rect.top).max(0) as u32;
            }

            let _ = sensor.set_crop(&cam_rect);
            cam_rect = sensor_rect(sensor)?;
            debug!("sensor crop now {}", cam_rect);
        }

        if cam_rect.is_smaller(rect) || cam_rect.fails_to_cover(rect) {
            // the sensor failed to configure a usable crop, request the max
            cam_rect = cap.bounds;
            let _ = sensor.set_crop(&cam_rect);
            cam_rect = sensor_rect(sensor)?;
            debug!("sensor crop fell back to bounds {}", cam_rect);
        }

        self.rect = cam_rect;
        self.subrect = *rect;
        debug!("update subrect {} within {}", self.subrect, self.rect);
        self.update_subrect();

        Ok(())
    }

    /// Iterative sensor format negotiation.
    ///
    /// If the sensor did not deliver the exact size and this driver's own
    /// scaler may shrink the frame, grow the sensor request (doubling,
    /// capped at the hardware maximum) until it is at least as large as
    /// required, so the scaler only ever downsamples.
    fn negotiate_format<S: Sensor>(
        &mut self,
        sensor: &mut S,
        mf: &mut FrameFormat,
        can_scale: bool,
    ) -> Result<(), Error> {
        let width = mf.width;
        let height = mf.height;

        sensor.set_format(mf)?;
        debug!("sensor scaled to {}x{}", mf.width, mf.height);

        if !((width == mf.width && height == mf.height) || !can_scale) {
            let cap = sensor.capabilities()?;

            let max_width = cap.bounds.width.min(MAX_WIDTH);
            let max_height = cap.bounds.height.min(MAX_HEIGHT);

            // the sensor set a format, but the geometry is not precise yet
            let mut tmp_w = mf.width;
            let mut tmp_h = mf.height;

            while (width > tmp_w || height > tmp_h) && tmp_w < max_width && tmp_h < max_height {
                tmp_w = (2 * tmp_w).min(max_width);
                tmp_h = (2 * tmp_h).min(max_height);
                mf.width = tmp_w;
                mf.height = tmp_h;
                if let Err(e) = sensor.set_format(mf) {
                    error!("sensor failed to set format: {}", e);
                    return Err(e);
                }
                debug!("sensor scaled to {}x{}", mf.width, mf.height);
            }
        }

        self.rect = sensor_rect(sensor)?;
        self.update_subrect();

        Ok(())
    }

    /// Negotiate a sensor output window for a user format request.
    ///
    /// `mf` holds the desired sensor output on entry and the actual one on
    /// return. The result is the user window mapped back onto the sensor
    /// input: the sub-rectangle with the freshly negotiated sensor scales
    /// applied.
    pub fn apply_format<S: Sensor>(
        &mut self,
        sensor: &mut S,
        mf: &mut FrameFormat,
        can_scale: bool,
    ) -> Result<(u32, u32), Error> {
        let mut tmp = *mf;
        self.negotiate_format(sensor, &mut tmp, can_scale)?;

        // sensor scales come out as 4096 when it cannot scale at all
        let scale_h = scale_ratio(self.rect.width, tmp.width);
        let scale_v = scale_ratio(self.rect.height, tmp.height);

        mf.width = tmp.width;
        mf.height = tmp.height;

        let sub_width = scale_down(self.subrect.width, scale_h);
        let sub_height = scale_down(self.subrect.height, scale_v);
        debug!("new sensor sub-window {}x{}", sub_width, sub_height);

        Ok((sub_width, sub_height))
    }

    /// Sensor output size needed for a requested user window.
    ///
    /// Applies the combined sub-window to user-window scales inversely to
    /// the current sensor rectangle. With no sub-cropping the request is
    /// passed through untouched.
    pub fn output_for_request(&self, width: u32, height: u32) -> (u32, u32) {
        if self.subrect.width == self.rect.width && self.subrect.height == self.rect.height {
            return (width, height);
        }

        let scale_h = scale_ratio(self.subrect.width, width);
        let scale_v = scale_ratio(self.subrect.height, height);
        debug!("combined scales {}:{}", scale_h, scale_v);

        (
            scale_down(self.rect.width, scale_h),
            scale_down(self.rect.height, scale_v),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Capabilities;

    /// Sensor that can crop anywhere within its bounds but only in fixed
    /// size steps, and scales output by integer binning only.
    struct StepSensor {
        bounds: Rect,
        rect: Rect,
        format: FrameFormat,
        step: u32,
    }

    impl StepSensor {
        fn new(width: u32, height: u32, step: u32) -> Self {
            let bounds = Rect::new(0, 0, width, height);
            StepSensor {
                bounds,
                rect: bounds,
                format: FrameFormat::new(width, height, MbusCode::Yuyv8_2x8),
                step,
            }
        }
    }

    impl Sensor for StepSensor {
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
            rect.width = (rect.width / self.step).max(1) * self.step;
            rect.height = (rect.height / self.step).max(1) * self.step;
            rect.clamp_within(&self.bounds);
            self.rect = rect;
            Ok(())
        }

        fn format(&self) -> Result<FrameFormat, Error> {
            Ok(self.format)
        }

        fn set_format(&mut self, fmt: &mut FrameFormat) -> Result<(), Error> {
            fmt.width = fmt.width.min(self.bounds.width);
            fmt.height = fmt.height.min(self.bounds.height);
            self.format = *fmt;
            Ok(())
        }

        fn try_format(&self, fmt: &mut FrameFormat) -> Result<(), Error> {
            fmt.width = fmt.width.min(self.bounds.width);
            fmt.height = fmt.height.min(self.bounds.height);
            Ok(())
        }
    }

    #[test]
    fn q12_ratios() {
        assert_eq!(scale_ratio(640, 640), UNITY_SCALE);
        assert_eq!(scale_ratio(1280, 640), 2 * UNITY_SCALE);
        assert_eq!(scale_down(1280, 2 * UNITY_SCALE), 640);
        // rounding, not truncation
        assert_eq!(scale_ratio(720, 480), 6144);
    }

    #[test]
    fn initial_negotiation_shrinks_oversized_sensor() {
        let mut sensor = StepSensor::new(4000, 3000, 2);
        let geo = Geometry::negotiate_initial(&mut sensor).unwrap();
        assert!(geo.width <= MAX_WIDTH && geo.height <= MAX_HEIGHT);
        assert_eq!((geo.width, geo.height), (2560, 1920));
    }

    #[test]
    fn crop_subrect_stays_within_sensor_rect() {
        let mut sensor = StepSensor::new(1280, 960, 64);
        let mut geo = Geometry::negotiate_initial(&mut sensor).unwrap();

        let request = Rect::new(100, 60, 630, 470);
        geo.negotiate_crop(&mut sensor, &request).unwrap();

        assert!(geo.rect.contains(&geo.subrect));
        assert!(geo.bounds_ok(&sensor));
    }

    #[test]
    fn crop_matching_request_is_cached_directly() {
        let mut sensor = StepSensor::new(1280, 960, 2);
        let mut geo = Geometry::negotiate_initial(&mut sensor).unwrap();

        let request = Rect::new(64, 32, 640, 480);
        geo.negotiate_crop(&mut sensor, &request).unwrap();
        assert_eq!(geo.subrect, request);
        assert!(geo.rect.contains(&geo.subrect));
    }

    impl Geometry {
        fn bounds_ok<S: Sensor>(&self, sensor: &S) -> bool {
            let cap = sensor.capabilities().unwrap();
            cap.bounds.contains(&self.rect)
        }
    }

    #[test]
    fn output_passthrough_without_subcrop() {
        let mut sensor = StepSensor::new(1280, 960, 2);
        let geo = Geometry::negotiate_initial(&mut sensor).unwrap();
        assert_eq!(geo.output_for_request(640, 480), (640, 480));
    }

    #[test]
    fn output_applies_inverse_scales() {
        let mut sensor = StepSensor::new(1280, 960, 2);
        let mut geo = Geometry::negotiate_initial(&mut sensor).unwrap();
        geo.subrect = Rect::new(0, 0, 640, 480);

        // requesting 320x240 from a 640x480 sub-window halves the full
        // sensor rectangle too
        assert_eq!(geo.output_for_request(320, 240), (640, 480));
    }
}
