//! Image, mask and contour pyramids.
//!
//! Every level halves width and height (rounding down). Odd trailing rows and
//! columns of the finer level are folded into the last coarse row or column,
//! so every fine pixel has exactly one parent.

use tracing::debug;

use crate::{
    contour::PixelContour,
    error::Result,
    frame::Frame,
    geometry::PixelPosition,
    mask::{BACKGROUND, OBJECT},
};

/// Levels smaller than this in either direction are not built.
pub const MIN_LEVEL_SIZE: u32 = 4;

/// One resolution of the segmentation pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Smoothed image at this resolution.
    pub frame: Frame,
    /// `OBJECT` where the object may be, `BACKGROUND` elsewhere.
    pub candidates: Frame,
    /// Rough outline at this resolution.
    pub contour: PixelContour,
}

impl PyramidLevel {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    /// The next coarser level, or `None` once it would drop below
    /// [`MIN_LEVEL_SIZE`].
    pub fn downsampled(&self) -> Result<Option<Self>> {
        if self.width() / 2 < MIN_LEVEL_SIZE || self.height() / 2 < MIN_LEVEL_SIZE {
            return Ok(None);
        }

        Ok(Some(Self {
            frame: downsample_frame(&self.frame)?,
            candidates: downsample_candidates(&self.candidates)?,
            contour: self.contour.downsampled(),
        }))
    }
}

/// Builds up to `layers` coarser levels on top of `base`; index 0 is `base`.
pub fn build_pyramid(base: PyramidLevel, layers: u32) -> Result<Vec<PyramidLevel>> {
    let mut levels = vec![base];
    for _ in 0..layers {
        let Some(last) = levels.last() else { break };
        match last.downsampled()? {
            Some(next) => levels.push(next),
            None => break,
        }
    }

    debug!(requested = layers, built = levels.len() - 1, "pyramid built");
    Ok(levels)
}

/// 2x2 mean downsampling of every channel.
pub fn downsample_frame(frame: &Frame) -> Result<Frame> {
    let width = frame.width() / 2;
    let height = frame.height() / 2;
    let channels = frame.channels() as usize;
    let mut coarse = Frame::new(width, height, frame.channels(), 0, 0)?;

    for y in 0..height {
        let top = frame.row(2 * y);
        let bottom = frame.row(2 * y + 1);
        let row = coarse.row_mut(y);
        for x in 0..width as usize {
            for c in 0..channels {
                let left = 2 * x * channels + c;
                let right = left + channels;
                let sum = top[left] as u32 + top[right] as u32 + bottom[left] as u32 + bottom[right] as u32;
                row[x * channels + c] = ((sum + 2) / 4) as u8;
            }
        }
    }

    Ok(coarse)
}

/// A coarse pixel is a candidate as soon as one of its children is.
pub fn downsample_candidates(mask: &Frame) -> Result<Frame> {
    let width = (mask.width() / 2).max(1);
    let height = (mask.height() / 2).max(1);
    let mut coarse = Frame::new_mask(width, height, BACKGROUND)?;

    for y in 0..mask.height() {
        for x in 0..mask.width() {
            if mask.value(x, y) == OBJECT {
                let parent = parent_of(PixelPosition::new(x, y), width, height);
                coarse.set_value(parent.x, parent.y, OBJECT);
            }
        }
    }

    Ok(coarse)
}

/// Nearest-neighbor upsampling of a coarse mask onto a `width x height` grid.
pub fn upsample_mask(coarse: &Frame, width: u32, height: u32) -> Result<Frame> {
    let mut fine = Frame::new_mask(width, height, BACKGROUND)?;
    for y in 0..height {
        for x in 0..width {
            let parent = parent_of(PixelPosition::new(x, y), coarse.width(), coarse.height());
            fine.set_value(x, y, coarse.value(parent.x, parent.y));
        }
    }
    Ok(fine)
}

/// Coarse pixels whose 4-neighborhood (self included) holds more than one value.
pub fn non_unique_pixels(mask: &Frame) -> Vec<PixelPosition> {
    let width = mask.width();
    let height = mask.height();
    let mut positions = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let value = mask.value(x, y);
            let differs = (x > 0 && mask.value(x - 1, y) != value)
                || (x + 1 < width && mask.value(x + 1, y) != value)
                || (y > 0 && mask.value(x, y - 1) != value)
                || (y + 1 < height && mask.value(x, y + 1) != value);
            if differs {
                positions.push(PixelPosition::new(x, y));
            }
        }
    }

    positions
}

/// Fine-level children of a coarse pixel, including folded odd rows and columns.
pub fn children_of(
    parent: PixelPosition,
    coarse_width: u32,
    coarse_height: u32,
    fine_width: u32,
    fine_height: u32,
) -> impl Iterator<Item = PixelPosition> {
    let x_end = if parent.x + 1 == coarse_width { fine_width } else { (2 * parent.x + 2).min(fine_width) };
    let y_end = if parent.y + 1 == coarse_height { fine_height } else { (2 * parent.y + 2).min(fine_height) };
    let x_start = 2 * parent.x;
    (2 * parent.y..y_end).flat_map(move |y| (x_start..x_end).map(move |x| PixelPosition::new(x, y)))
}

fn parent_of(child: PixelPosition, coarse_width: u32, coarse_height: u32) -> PixelPosition {
    let halved = child.halved();
    PixelPosition::new(
        halved.x.min(coarse_width.saturating_sub(1)),
        halved.y.min(coarse_height.saturating_sub(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_downsampling_averages_blocks() {
        let mut frame = Frame::new(4, 2, 2, 3, 0).expect("frame");
        frame.pixel_mut(0, 0).expect("in bounds").copy_from_slice(&[10, 1]);
        frame.pixel_mut(1, 0).expect("in bounds").copy_from_slice(&[20, 2]);
        frame.pixel_mut(0, 1).expect("in bounds").copy_from_slice(&[30, 3]);
        frame.pixel_mut(1, 1).expect("in bounds").copy_from_slice(&[41, 4]);

        let coarse = downsample_frame(&frame).expect("downsample");
        assert_eq!((coarse.width(), coarse.height(), coarse.channels()), (2, 1, 2));
        // (101 + 2) / 4 and (10 + 2) / 4
        assert_eq!(coarse.pixel(0, 0), Some(&[25u8, 3][..]));
        assert_eq!(coarse.pixel(1, 0), Some(&[0u8, 0][..]));
    }

    #[test]
    fn any_candidate_child_marks_the_parent() {
        let mut mask = Frame::new_mask(5, 5, BACKGROUND).expect("mask");
        mask.set_value(1, 0, OBJECT);
        mask.set_value(4, 4, OBJECT);

        let coarse = downsample_candidates(&mask).expect("downsample");
        assert_eq!((coarse.width(), coarse.height()), (2, 2));
        assert_eq!(coarse.value(0, 0), OBJECT);
        // the odd last row and column fold into the last coarse pixel
        assert_eq!(coarse.value(1, 1), OBJECT);
        assert_eq!(coarse.value(1, 0), BACKGROUND);
        assert_eq!(coarse.value(0, 1), BACKGROUND);
    }

    #[test]
    fn upsampling_repeats_parents() {
        let mut coarse = Frame::new_mask(2, 2, BACKGROUND).expect("mask");
        coarse.set_value(1, 1, OBJECT);

        let fine = upsample_mask(&coarse, 5, 4).expect("upsample");
        assert_eq!(fine.value(2, 2), OBJECT);
        assert_eq!(fine.value(4, 3), OBJECT);
        assert_eq!(fine.value(1, 3), BACKGROUND);
        assert_eq!(fine.count_value(OBJECT), 6);
    }

    #[test]
    fn children_cover_folded_columns() {
        let children: Vec<_> = children_of(PixelPosition::new(1, 0), 2, 2, 5, 4).collect();
        assert_eq!(children.len(), 6);
        assert!(children.contains(&PixelPosition::new(4, 1)));

        let interior: Vec<_> = children_of(PixelPosition::new(0, 0), 2, 2, 5, 4).collect();
        assert_eq!(interior.len(), 4);
    }

    #[test]
    fn non_unique_pixels_straddle_the_border() {
        let mut mask = Frame::new_mask(6, 6, BACKGROUND).expect("mask");
        for y in 2..4 {
            for x in 2..4 {
                mask.set_value(x, y, OBJECT);
            }
        }

        let positions = non_unique_pixels(&mask);
        // 4 object pixels plus 8 background pixels sharing an edge with them
        assert_eq!(positions.len(), 12);
        assert!(positions.contains(&PixelPosition::new(1, 2)));
        assert!(!positions.contains(&PixelPosition::new(1, 1)));
    }

    #[test]
    fn pyramid_stops_at_minimum_size() {
        let frame = Frame::new(20, 12, 3, 0, 50).expect("frame");
        let candidates = Frame::new_mask(20, 12, OBJECT).expect("mask");
        let contour = PixelContour::from_xy(&[(0, 0), (19, 0), (19, 11), (0, 11)]);
        let base = PyramidLevel { frame, candidates, contour };

        let levels = build_pyramid(base, 5).expect("pyramid");
        // 20x12 -> 10x6; 5x3 would be too small
        assert_eq!(levels.len(), 2);
        assert_eq!((levels[1].width(), levels[1].height()), (10, 6));
        assert_eq!(levels[1].contour.points()[2], PixelPosition::new(9, 5));
        assert_eq!(levels[1].candidates.count_value(OBJECT), 60);
    }
}
