use serde::{Deserialize, Serialize};

/// Where the quiz card sits on its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    #[default]
    Center,
    TopRight,
}

/// Screen-space rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        let (px, py) = (i64::from(px), i64::from(py));
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        px >= x
            && px < x + i64::from(self.width)
            && py >= y
            && py < y + i64::from(self.height)
    }
}

/// Compute the card rectangle inside a monitor's available area.
pub fn place_overlay(
    screen: Rect,
    width: u32,
    height: u32,
    position: OverlayPosition,
    margin: i32,
) -> Rect {
    let (w, h) = (width as i32, height as i32);
    let (sw, sh) = (screen.width as i32, screen.height as i32);
    let (x, y) = match position {
        OverlayPosition::Center => (screen.x + (sw - w) / 2, screen.y + (sh - h) / 2),
        OverlayPosition::TopRight => (screen.x + sw - w - margin, screen.y + margin),
    };
    Rect::new(x, y, width, height)
}
