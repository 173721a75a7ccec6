/// Estimated absolute pointer position.
///
/// evdev only reports relative motion for mice, so the position is
/// integrated and clamped to the configured screen. Reports from the overlay
/// (which sees real coordinates while the pointer is over the card)
/// resynchronise it.
#[derive(Debug)]
pub struct PointerTracker {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

/// Screen extent as a clamp bound; never below 1 so `clamp` stays valid.
fn extent(size: u32) -> i32 {
    i32::try_from(size).unwrap_or(i32::MAX).max(1)
}

impl PointerTracker {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (extent(width), extent(height));
        Self {
            x: width / 2,
            y: height / 2,
            width,
            height,
        }
    }

    pub fn set_bounds(&mut self, width: u32, height: u32) {
        self.width = extent(width);
        self.height = extent(height);
        self.x = self.x.clamp(0, self.width - 1);
        self.y = self.y.clamp(0, self.height - 1);
    }

    pub fn apply_delta(&mut self, dx: i32, dy: i32) -> (i32, i32) {
        self.x = self.x.saturating_add(dx).clamp(0, self.width - 1);
        self.y = self.y.saturating_add(dy).clamp(0, self.height - 1);
        (self.x, self.y)
    }

    pub fn sync(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    #[cfg(test)]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}
