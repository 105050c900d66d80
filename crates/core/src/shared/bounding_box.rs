use serde::{Deserialize, Serialize};

/// Axis-aligned face box in integer pixel coordinates.
///
/// Integer coordinates make boxes usable as checkpoint keys: the same
/// detection on the same image always produces an identical key, with no
/// floating-point equality involved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Converts corner coordinates to a box clamped to the frame.
    ///
    /// Returns `None` if nothing of the box remains inside the frame.
    pub fn from_corners(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let left = x1.max(0.0).round() as i32;
        let top = y1.max(0.0).round() as i32;
        let right = (x2.min(frame_width as f64).round() as i32).min(frame_width as i32);
        let bottom = (y2.min(frame_height as f64).round() as i32).min(frame_height as i32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() as f64 + other.area() as f64 - inter;
        inter / union
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BoundingBox::new(10, 10, 100, 100);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = BoundingBox::new(0, 0, 100, 100);
        let b = BoundingBox::new(50, 0, 100, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[rstest]
    #[case::disjoint(BoundingBox::new(0, 0, 50, 50), BoundingBox::new(100, 100, 50, 50))]
    #[case::touching(BoundingBox::new(0, 0, 50, 50), BoundingBox::new(50, 0, 50, 50))]
    #[case::zero_width(BoundingBox::new(0, 0, 0, 100), BoundingBox::new(0, 0, 50, 50))]
    fn test_iou_no_overlap(#[case] a: BoundingBox, #[case] b: BoundingBox) {
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_from_corners_clamps_to_frame() {
        let b = BoundingBox::from_corners(-10.0, -5.0, 50.4, 60.6, 40, 100).unwrap();
        assert_eq!(b, BoundingBox::new(0, 0, 40, 61));
    }

    #[test]
    fn test_from_corners_outside_frame_is_none() {
        assert!(BoundingBox::from_corners(120.0, 10.0, 150.0, 40.0, 100, 100).is_none());
    }

    #[test]
    fn test_usable_as_hash_key() {
        let mut seen = HashSet::new();
        assert!(seen.insert(BoundingBox::new(1, 2, 3, 4)));
        assert!(!seen.insert(BoundingBox::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_serializes_as_object() {
        let json = serde_json::to_string(&BoundingBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"x":1,"y":2,"width":3,"height":4}"#);
    }
}
