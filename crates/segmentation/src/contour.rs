use geo::{Area, Centroid, Simplify};
use geo_types::{Coord, LineString, Polygon};
use image::{GrayImage, Luma};
use imageproc::point::Point;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    frame::Frame,
    geometry::{PixelBoundingBox, PixelPosition},
};

/// An ordered, implicitly closed polygon of pixel positions.
///
/// A *simplified* contour holds only vertices; a *dense* contour holds one
/// 8-connected step between every pair of consecutive points (including the
/// pair closing the loop).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PixelContour {
    points: Vec<PixelPosition>,
}

impl PixelContour {
    pub fn new(points: Vec<PixelPosition>) -> Self {
        Self { points }
    }

    pub fn from_xy(points: &[(u32, u32)]) -> Self {
        Self::new(points.iter().map(|&(x, y)| PixelPosition::new(x, y)).collect())
    }

    pub fn points(&self) -> &[PixelPosition] {
        &self.points
    }

    pub fn into_points(self) -> Vec<PixelPosition> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at a cyclic index; negative and overflowing indices wrap.
    pub fn cyclic(&self, index: isize) -> PixelPosition {
        let n = self.points.len() as isize;
        self.points[index.rem_euclid(n) as usize]
    }

    /// No position repeats in immediate succession, including the closing pair.
    pub fn is_distinct(&self) -> bool {
        let n = self.points.len();
        if n < 2 {
            return true;
        }
        (0..n).all(|i| self.points[i] != self.points[(i + 1) % n])
    }

    /// Every consecutive pair, including the closing pair, is one 8-connected step apart.
    pub fn is_dense(&self) -> bool {
        let n = self.points.len();
        if n < 2 {
            return false;
        }
        (0..n).all(|i| self.points[i].chebyshev_distance(self.points[(i + 1) % n]) == 1)
    }

    /// Removes duplicates in immediate succession, including a closing point
    /// that repeats the first one.
    pub fn make_distinct(&mut self) {
        self.points.dedup();
        while self.points.len() > 1 && self.points.first() == self.points.last() {
            self.points.pop();
        }
    }

    pub fn distinct(mut self) -> Self {
        self.make_distinct();
        self
    }

    /// Interpolates every edge with 8-connected line steps.
    pub fn dense(&self) -> Self {
        let n = self.points.len();
        if n < 2 {
            return self.clone();
        }

        let mut dense = Vec::with_capacity(n * 2);
        for i in 0..n {
            let start = self.points[i];
            let end = self.points[(i + 1) % n];
            let line = line_positions(start, end);
            dense.extend_from_slice(&line[..line.len() - 1]);
        }

        Self::new(dense).distinct()
    }

    /// Dense contour through the same positions: repeats and single-point
    /// spikes (`a, b, a`) are dropped, gaps are bridged with line steps.
    ///
    /// Unlike [`Self::simplified`] this never moves a position, so one-pixel
    /// jogs along a straight edge stay where they are.
    pub fn equalized(&self) -> Self {
        let bridged = Self::new(without_spikes(self.points.clone())).dense();
        Self::new(without_spikes(bridged.points))
    }

    /// Douglas-Peucker simplification of the closed polygon.
    pub fn simplified(&self, tolerance: f32) -> Self {
        if self.points.len() < 3 {
            return self.clone();
        }

        let mut coords: Vec<Coord<f32>> = self.points.iter().map(|p| p.to_coord()).collect();
        coords.push(coords[0]);
        let simplified = LineString::new(coords).simplify(&tolerance);

        let points = simplified
            .coords()
            .map(|c| PixelPosition::new(c.x.round().max(0.0) as u32, c.y.round().max(0.0) as u32))
            .collect();
        Self::new(points).distinct()
    }

    /// The contour on the next coarser pyramid level.
    pub fn downsampled(&self) -> Self {
        Self::new(self.points.iter().map(|p| p.halved()).collect()).distinct()
    }

    /// Clamps every position into a `width x height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| PixelPosition::new(p.x.min(width.saturating_sub(1)), p.y.min(height.saturating_sub(1))))
            .collect();
        Self::new(points).distinct()
    }

    pub fn bounding_box(&self) -> Option<PixelBoundingBox> {
        PixelBoundingBox::from_positions(&self.points)
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Shoelace area; positive when the interior lies to the left of the
    /// walking direction in (x, y) coordinates.
    pub fn signed_area(&self) -> f64 {
        self.to_polygon().signed_area()
    }

    /// Area of the polygon through the pixel centers.
    pub fn area(&self) -> f64 {
        self.to_polygon().unsigned_area()
    }

    pub fn centroid(&self) -> Option<Coord<f64>> {
        self.to_polygon().centroid().map(|p| p.0)
    }

    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| (self.points[i].sqr_distance(self.points[(i + 1) % n]) as f64).sqrt())
            .sum()
    }

    /// Rasterizes the filled polygon (boundary included) into a new mask.
    pub fn rasterize(&self, width: u32, height: u32, inside: u8, outside: u8) -> Result<Frame> {
        let contour = self.clone().distinct();
        let mut canvas = GrayImage::from_pixel(width, height, Luma([outside]));

        if contour.len() >= 3 {
            let polygon: Vec<Point<i32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x as i32, p.y as i32))
                .collect();
            imageproc::drawing::draw_polygon_mut(&mut canvas, &polygon, Luma([inside]));
        } else {
            for p in contour.dense().points() {
                if p.x < width && p.y < height {
                    canvas.put_pixel(p.x, p.y, Luma([inside]));
                }
            }
        }

        Ok(Frame::from_gray_image(&canvas))
    }
}

impl From<Vec<PixelPosition>> for PixelContour {
    fn from(points: Vec<PixelPosition>) -> Self {
        Self::new(points)
    }
}

/// Removes immediate repeats and the tips of `a, b, a` spikes, across the
/// closing pair as well.
fn without_spikes(points: Vec<PixelPosition>) -> Vec<PixelPosition> {
    let mut kept: Vec<PixelPosition> = Vec::with_capacity(points.len());
    for point in points {
        if kept.last() == Some(&point) {
            continue;
        }
        if kept.len() >= 2 && kept[kept.len() - 2] == point {
            kept.pop();
            continue;
        }
        kept.push(point);
    }

    loop {
        let n = kept.len();
        if n < 3 {
            break;
        }
        if kept[n - 1] == kept[0] || kept[n - 2] == kept[0] {
            kept.pop();
        } else if kept[n - 1] == kept[1] {
            kept.remove(0);
        } else {
            break;
        }
    }
    kept
}

/// 8-connected Bresenham line from `start` to `end`, both included.
pub fn line_positions(start: PixelPosition, end: PixelPosition) -> Vec<PixelPosition> {
    let (mut x, mut y) = (start.x as i64, start.y as i64);
    let (x1, y1) = (end.x as i64, end.y as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut error = dx + dy;

    let mut line = Vec::with_capacity((dx.max(-dy) + 1) as usize);
    loop {
        line.push(PixelPosition::new(x as u32, y as u32));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * error;
        if e2 >= dy {
            error += dy;
            x += sx;
        }
        if e2 <= dx {
            error += dx;
            y += sy;
        }
    }
    line
}
