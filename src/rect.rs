use std::fmt;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Rectangle within a sensor's pixel array
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Returns a rectangle representation
    ///
    /// # Arguments
    ///
    /// * `left` - Horizontal offset in pixels
    /// * `top` - Vertical offset in lines
    /// * `width` - Width in pixels
    /// * `height` - Height in lines
    ///
    /// # Example
    ///
    /// ```
    /// use vin::Rect;
    /// let rect = Rect::new(0, 0, 640, 480);
    /// ```
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether any dimension of `self` is smaller than the respective one
    /// of `other`
    pub fn is_smaller(&self, other: &Rect) -> bool {
        self.width < other.width || self.height < other.height
    }

    /// Whether `self` fails to cover `other` on any side
    pub fn fails_to_cover(&self, other: &Rect) -> bool {
        self.left > other.left
            || self.top > other.top
            || self.left + (self.width as i32) < other.left + (other.width as i32)
            || self.top + (self.height as i32) < other.top + (other.height as i32)
    }

    /// Whether `other` lies entirely within `self`
    pub fn contains(&self, other: &Rect) -> bool {
        !self.is_smaller(other) && !self.fails_to_cover(other)
    }

    /// Shrink and shift `self` so that it stays within `bounds`.
    ///
    /// The size is reduced only if it does not fit at all; otherwise the
    /// rectangle is moved to the nearest valid edge. It is never enlarged.
    pub fn clamp_within(&mut self, bounds: &Rect) {
        if bounds.width < self.width {
            self.width = bounds.width;
        }
        if bounds.height < self.height {
            self.height = bounds.height;
        }

        if bounds.left > self.left {
            self.left = bounds.left;
        } else if bounds.left + (bounds.width as i32) < self.left + (self.width as i32) {
            self.left = bounds.left + bounds.width as i32 - self.width as i32;
        }

        if bounds.top > self.top {
            self.top = bounds.top;
        } else if bounds.top + (bounds.height as i32) < self.top + (self.height as i32) {
            self.top = bounds.top + bounds.height as i32 - self.height as i32;
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{}:{}",
            self.width, self.height, self.left, self.top
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_predicates() {
        let bounds = Rect::new(0, 0, 1280, 960);
        let inner = Rect::new(100, 100, 640, 480);
        assert!(bounds.contains(&inner));
        assert!(!inner.contains(&bounds));
        assert!(inner.is_smaller(&bounds));
        assert!(inner.fails_to_cover(&bounds));
    }

    #[test]
    fn clamp_shrinks_oversized() {
        let bounds = Rect::new(0, 0, 640, 480);
        let mut sub = Rect::new(0, 0, 1280, 960);
        sub.clamp_within(&bounds);
        assert_eq!(sub, Rect::new(0, 0, 640, 480));
    }

    #[test]
    fn clamp_shifts_not_resizes() {
        let bounds = Rect::new(64, 32, 640, 480);
        let mut sub = Rect::new(0, 0, 320, 240);
        sub.clamp_within(&bounds);
        // moved to the nearest valid edge, size untouched
        assert_eq!(sub, Rect::new(64, 32, 320, 240));

        let mut sub = Rect::new(600, 400, 320, 240);
        sub.clamp_within(&bounds);
        assert_eq!(sub, Rect::new(384, 272, 320, 240));
        assert!(bounds.contains(&sub));
    }
}
