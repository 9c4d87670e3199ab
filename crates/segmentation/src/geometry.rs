use std::cmp::Ordering;

use geo_types::Coord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Integer pixel location, origin at the top-left corner.
///
/// Ordered row-major (`y` first, then `x`) so that sorted sets iterate in
/// scanline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub struct PixelPosition {
    pub x: u32,
    pub y: u32,
}

impl PixelPosition {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The position on the next coarser pyramid level.
    pub fn halved(self) -> Self {
        Self::new(self.x / 2, self.y / 2)
    }

    pub fn sqr_distance(self, other: PixelPosition) -> u64 {
        let dx = self.x.abs_diff(other.x) as u64;
        let dy = self.y.abs_diff(other.y) as u64;
        dx * dx + dy * dy
    }

    /// Chebyshev distance (number of 8-connected steps).
    pub fn chebyshev_distance(self, other: PixelPosition) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// True for the eight surrounding positions, false for `self`.
    pub fn is_neighbor8(self, other: PixelPosition) -> bool {
        self != other && self.chebyshev_distance(other) <= 1
    }

    pub fn to_coord(self) -> Coord<f32> {
        Coord {
            x: self.x as f32,
            y: self.y as f32,
        }
    }

    /// Rounds a sub-pixel coordinate; `None` when the pixel lies outside a
    /// `width x height` frame.
    pub fn from_coord_within(coord: Coord<f32>, width: u32, height: u32) -> Option<Self> {
        let x = coord.x.round();
        let y = coord.y.round();
        if x < 0.0 || y < 0.0 || x >= width as f32 || y >= height as f32 {
            return None;
        }
        Some(Self::new(x as u32, y as u32))
    }

    /// Rounds a sub-pixel coordinate to the nearest pixel inside a
    /// `width x height` frame.
    pub fn from_coord_clamped(coord: Coord<f32>, width: u32, height: u32) -> Self {
        let x = coord.x.round().clamp(0.0, width.saturating_sub(1) as f32);
        let y = coord.y.round().clamp(0.0, height.saturating_sub(1) as f32);
        Self::new(x as u32, y as u32)
    }
}

impl PartialOrd for PixelPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PixelPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

/// Inclusive pixel rectangle `[left, right] x [top, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelBoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelBoundingBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        debug_assert!(left <= right && top <= bottom);
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a PixelPosition>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bbox.left = bbox.left.min(p.x);
            bbox.top = bbox.top.min(p.y);
            bbox.right = bbox.right.max(p.x);
            bbox.bottom = bbox.bottom.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    /// False for boxes deserialized with `left > right` or `top > bottom`.
    pub fn is_valid(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }

    pub fn contains(&self, position: PixelPosition) -> bool {
        (self.left..=self.right).contains(&position.x) && (self.top..=self.bottom).contains(&position.y)
    }

    /// Grows the box by `pixels` on every side, clamped to a `width x height` frame.
    pub fn extended(&self, pixels: u32, width: u32, height: u32) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            left: self.left.saturating_sub(pixels),
            top: self.top.saturating_sub(pixels),
            right: self.right.saturating_add(pixels).min(width - 1),
            bottom: self.bottom.saturating_add(pixels).min(height - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_sort_in_scanline_order() {
        let mut positions = vec![
            PixelPosition::new(3, 1),
            PixelPosition::new(0, 2),
            PixelPosition::new(1, 1),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![PixelPosition::new(1, 1), PixelPosition::new(3, 1), PixelPosition::new(0, 2)]
        );
    }

    #[test]
    fn coordinates_outside_the_frame_have_no_pixel() {
        let inside = Coord { x: 3.6, y: -0.4 };
        assert_eq!(PixelPosition::from_coord_within(inside, 5, 5), Some(PixelPosition::new(4, 0)));
        assert_eq!(PixelPosition::from_coord_within(Coord { x: 4.5, y: 1.0 }, 5, 5), None);
        assert_eq!(PixelPosition::from_coord_within(Coord { x: 1.0, y: -0.6 }, 5, 5), None);
    }

    #[test]
    fn neighbor8_excludes_self_and_far_positions() {
        let p = PixelPosition::new(5, 5);
        assert!(p.is_neighbor8(PixelPosition::new(6, 4)));
        assert!(!p.is_neighbor8(p));
        assert!(!p.is_neighbor8(PixelPosition::new(7, 5)));
    }

    #[test]
    fn bounding_box_extension_is_clamped() {
        let positions = [PixelPosition::new(2, 8), PixelPosition::new(6, 3)];
        let bbox = PixelBoundingBox::from_positions(&positions).expect("non-empty");
        assert_eq!(bbox, PixelBoundingBox::new(2, 3, 6, 8));
        assert_eq!(bbox.width(), 5);

        let extended = bbox.extended(4, 9, 10);
        assert_eq!(extended, PixelBoundingBox::new(0, 0, 8, 9));
        assert!(extended.contains(PixelPosition::new(8, 9)));
        assert!(extended.is_valid());

        let inverted = PixelBoundingBox { left: 5, top: 0, right: 2, bottom: 3 };
        assert!(!inverted.is_valid());
    }

    #[test]
    fn empty_positions_have_no_bounding_box() {
        let none: &[PixelPosition] = &[];
        assert_eq!(PixelBoundingBox::from_positions(none), None);
    }

    #[test]
    fn coord_rounding_is_clamped_to_frame() {
        let p = PixelPosition::from_coord_clamped(Coord { x: -3.2, y: 9.6 }, 8, 8);
        assert_eq!(p, PixelPosition::new(0, 7));
    }
}
