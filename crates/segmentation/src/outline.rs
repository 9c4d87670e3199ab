//! Outer outline of the dominant object region of a mask.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use tracing::debug;

use crate::{
    contour::PixelContour,
    error::Result,
    frame::Frame,
    geometry::PixelPosition,
    mask::OBJECT,
    morphology::{Neighborhood, dilate},
    worker::Worker,
};

/// Dilates the `OBJECT` region and traces the outer border of its largest
/// part as a dense contour.
///
/// `find_contours` follows 8-connected borders; every diagonal step is then
/// split through the object pixel it cuts across, so the outline is
/// 4-connected except across purely diagonal contacts.
///
/// Returns `None` when the mask holds no object or the object is too thin to
/// yield a polygon.
pub fn extract_outline(mask: &Frame, dilation_iterations: u32, worker: Option<&Worker>) -> Result<Option<PixelContour>> {
    let mut grown = mask.try_clone()?;
    if dilation_iterations > 0 {
        let minimum = Neighborhood::Eight.min_frame_size();
        if mask.width() >= minimum && mask.height() >= minimum {
            dilate(&mut grown, Neighborhood::Eight, OBJECT, dilation_iterations, worker)?;
        }
    }

    let binary = GrayImage::from_fn(grown.width(), grown.height(), |x, y| {
        Luma([if grown.value(x, y) == OBJECT { 255 } else { 0 }])
    });

    let outline = find_contours::<u32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| {
            PixelContour::new(c.points.iter().map(|p| PixelPosition::new(p.x, p.y)).collect()).distinct()
        })
        .max_by(|a, b| a.area().total_cmp(&b.area()).then(a.len().cmp(&b.len())));

    let Some(outline) = outline else {
        debug!("mask holds no object region");
        return Ok(None);
    };
    if outline.len() < 3 {
        debug!(points = outline.len(), "object region too small for an outline");
        return Ok(None);
    }

    Ok(Some(four_connected(&outline.dense(), &grown)))
}

fn four_connected(contour: &PixelContour, mask: &Frame) -> PixelContour {
    let points = contour.points();
    let n = points.len();
    let mut steps: Vec<PixelPosition> = Vec::with_capacity(n + n / 2);

    for i in 0..n {
        let current = points[i];
        let next = points[(i + 1) % n];
        steps.push(current);
        if current.x == next.x || current.y == next.y {
            continue;
        }

        let previous = steps.len().checked_sub(2).map_or(points[n - 1], |j| steps[j]);
        let after = points[(i + 2) % n];
        let corner = [PixelPosition::new(next.x, current.y), PixelPosition::new(current.x, next.y)]
            .into_iter()
            .find(|c| mask.value(c.x, c.y) == OBJECT && *c != previous && *c != after);
        if let Some(corner) = corner {
            steps.push(corner);
        }
    }

    PixelContour::new(steps).distinct()
}
