use serde::{Deserialize, Serialize};

/// A 2D point or velocity in world pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Clamp a point into the rectangle. Non-finite coordinates snap to the center.
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        if !p.is_finite() {
            return self.center();
        }
        Vec2::new(
            p.x.clamp(self.min_x, self.max_x),
            p.y.clamp(self.min_y, self.max_y),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_points_inside() {
        let r = Rect::new(0.0, 0.0, 800.0, 600.0);
        assert_eq!(r.clamp(Vec2::new(-10.0, 700.0)), Vec2::new(0.0, 600.0));
        assert_eq!(r.clamp(Vec2::new(10.0, 20.0)), Vec2::new(10.0, 20.0));
    }

    #[test]
    fn clamp_nan_snaps_to_center() {
        let r = Rect::new(0.0, 0.0, 800.0, 600.0);
        assert_eq!(r.clamp(Vec2::new(f32::NAN, 5.0)), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn inverted_rect_is_invalid() {
        assert!(!Rect::new(10.0, 0.0, 0.0, 10.0).is_valid());
        assert!(Rect::new(0.0, 0.0, 0.0, 0.0).is_valid());
    }
}
