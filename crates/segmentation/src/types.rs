use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    contour::PixelContour,
    error::Result,
    frame::Frame,
    mask::{BACKGROUND, OBJECT},
};

/// Result of one contour search on a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationOutcome {
    /// Dense object contour; empty when no object could be separated.
    pub contour: PixelContour,
    /// Original image dimensions
    pub image_width: u32,
    pub image_height: u32,
}

impl SegmentationOutcome {
    pub fn new(contour: PixelContour, image_width: u32, image_height: u32) -> Self {
        Self {
            contour,
            image_width,
            image_height,
        }
    }

    /// False when the segmentation was unavailable for the frame.
    pub fn is_available(&self) -> bool {
        !self.contour.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.contour.area()
    }

    pub fn perimeter(&self) -> f64 {
        self.contour.perimeter()
    }

    /// Centroid of the contour polygon, falling back to the bounding box center
    pub fn centroid(&self) -> Option<[f64; 2]> {
        if let Some(centroid) = self.contour.centroid() {
            return Some([centroid.x, centroid.y]);
        }
        self.contour.bounding_box().map(|b| {
            [
                (b.left + b.right) as f64 / 2.0,
                (b.top + b.bottom) as f64 / 2.0,
            ]
        })
    }

    /// The filled contour as an `OBJECT` / `BACKGROUND` mask.
    pub fn to_mask(&self) -> Result<Frame> {
        self.contour
            .rasterize(self.image_width, self.image_height, OBJECT, BACKGROUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_follow_the_contour() {
        let contour = PixelContour::from_xy(&[(2, 2), (6, 2), (6, 6), (2, 6)]);
        let outcome = SegmentationOutcome::new(contour, 10, 10);

        assert!(outcome.is_available());
        assert_eq!(outcome.area(), 16.0);
        assert_eq!(outcome.perimeter(), 16.0);
        assert_eq!(outcome.centroid(), Some([4.0, 4.0]));
        assert_eq!(outcome.to_mask().expect("mask").count_value(OBJECT), 25);
    }

    #[test]
    fn empty_outcome_is_unavailable() {
        let outcome = SegmentationOutcome::new(PixelContour::default(), 8, 8);
        assert!(!outcome.is_available());
        assert_eq!(outcome.centroid(), None);
        assert_eq!(outcome.to_mask().expect("mask").count_value(OBJECT), 0);
    }
}
