//! Fingerprint-driven object segmentation over an image pyramid.
//!
//! The rough contour is assumed to enclose the object. Fingerprints sampled
//! just outside it, clear of the smoothing window, describe the background;
//! every pixel inside the contour that resembles enough of them is
//! background, the rest is the object. The
//! full classification only runs on the coarsest level. Finer levels inherit
//! the coarse answer and re-classify just the pixels next to a label change.

use std::collections::HashSet;

use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

use crate::{
    config::SegmentationConfig,
    contour::PixelContour,
    error::{Result, SegmentationError},
    filter::mean_filter,
    fingerprint::{Fingerprint, Thresholds, calibrate_thresholds, count_similar, sample_outside},
    frame::Frame,
    geometry::PixelPosition,
    landmarks::{outward_normals, refine_contour},
    mask::{BACKGROUND, OBJECT},
    morphology::{Neighborhood, open},
    outline::extract_outline,
    pyramid::{PyramidLevel, build_pyramid, children_of, non_unique_pixels, upsample_mask},
    traits::ContourRefiner,
    worker::Worker,
};

/// Computes object masks from a frame and a rough outline.
#[derive(Debug, Clone, Default)]
pub struct PyramidSegmenter {
    config: SegmentationConfig,
}

impl PyramidSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Full-resolution object mask (`OBJECT` / `BACKGROUND`).
    ///
    /// A rough contour that does not enclose any area yields a mask without
    /// object pixels.
    pub fn segment_mask(&self, frame: &Frame, rough: &PixelContour, worker: Option<&Worker>) -> Result<Frame> {
        let filtered = self.prepare(frame, worker)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mask = match frame.channels() {
            1 => self.segment_filtered::<1>(&filtered, rough, worker, &mut rng)?,
            2 => self.segment_filtered::<2>(&filtered, rough, worker, &mut rng)?,
            3 => self.segment_filtered::<3>(&filtered, rough, worker, &mut rng)?,
            4 => self.segment_filtered::<4>(&filtered, rough, worker, &mut rng)?,
            channels => return Err(unsupported_channels(channels)),
        };

        match mask {
            Some(mask) => Ok(mask),
            None => Frame::new_mask(frame.width(), frame.height(), BACKGROUND),
        }
    }

    /// Validates the inputs and smooths the frame.
    pub(crate) fn prepare(&self, frame: &Frame, worker: Option<&Worker>) -> Result<Frame> {
        self.config.validate()?;
        if frame.is_empty() {
            return Err(SegmentationError::invalid("cannot segment an empty frame"));
        }
        if !(1..=4).contains(&frame.channels()) {
            return Err(unsupported_channels(frame.channels()));
        }
        mean_filter(frame, self.config.mean_filter_size, worker)
    }

    /// Segments an already smoothed frame; `None` on degenerate geometry.
    pub(crate) fn segment_filtered<const N: usize>(
        &self,
        filtered: &Frame,
        rough: &PixelContour,
        worker: Option<&Worker>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Frame>> {
        let (width, height) = (filtered.width(), filtered.height());

        let clipped = rough.clamped(width, height);
        if clipped.len() < 3 {
            warn!(points = clipped.len(), "rough contour has fewer than three distinct points");
            return Ok(None);
        }
        let simplified = clipped.simplified(self.config.contour_tolerance);
        if simplified.len() < 3 {
            warn!("rough contour collapsed during simplification");
            return Ok(None);
        }
        let dense = simplified.dense();

        let fingerprints = self.background_fingerprints::<N>(filtered, &dense);
        let thresholds = calibrate_thresholds(&fingerprints, &self.config.clustering, rng)?;

        let candidates = simplified.rasterize(width, height, OBJECT, BACKGROUND)?;
        let base = PyramidLevel {
            frame: filtered.try_clone()?,
            candidates,
            contour: dense,
        };
        let levels = build_pyramid(base, self.config.pyramid_layers)?;

        let Some((coarsest, finer)) = levels.split_last() else {
            return Ok(None);
        };

        let level_fingerprints = self.level_fingerprints::<N>(coarsest, &fingerprints);
        let quorum = self.quorum(level_fingerprints.len());
        let mut mask = coarsest.candidates.try_clone()?;
        classify_mask(&coarsest.frame, &mut mask, &level_fingerprints, &thresholds, quorum)?;

        let minimum = Neighborhood::Eight.min_frame_size();
        if mask.width() >= minimum && mask.height() >= minimum {
            open(&mut mask, Neighborhood::Eight, OBJECT, worker)?;
        }
        cleanup_mask(&mut mask, self.config.single_object)?;
        debug!(
            level = finer.len(),
            width = mask.width(),
            height = mask.height(),
            object = mask.count_value(OBJECT),
            "coarsest level classified"
        );

        for (index, level) in finer.iter().enumerate().rev() {
            let level_fingerprints = self.level_fingerprints::<N>(level, &fingerprints);
            let quorum = self.quorum(level_fingerprints.len());
            mask = refine_level(&mask, level, &level_fingerprints, &thresholds, quorum)?;
            debug!(level = index, object = mask.count_value(OBJECT), "level refined");
        }

        Ok(Some(mask))
    }

    /// Fingerprints `fingerprint_offset` pixels outside a dense contour.
    pub(crate) fn background_fingerprints<const N: usize>(&self, frame: &Frame, contour: &PixelContour) -> Vec<Fingerprint<N>> {
        sample_outside::<N>(
            frame,
            contour.points(),
            &outward_normals(contour),
            self.config.fingerprint_step,
            self.config.fingerprint_offset,
        )
    }

    fn level_fingerprints<const N: usize>(
        &self,
        level: &PyramidLevel,
        fallback: &[Fingerprint<N>],
    ) -> Vec<Fingerprint<N>> {
        let sampled = self.background_fingerprints::<N>(&level.frame, &level.contour);
        if sampled.is_empty() { fallback.to_vec() } else { sampled }
    }

    fn quorum(&self, fingerprints: usize) -> usize {
        self.config.similarity_quorum.min(fingerprints).max(1)
    }
}

fn unsupported_channels(channels: u32) -> SegmentationError {
    SegmentationError::invalid(format!("segmentation supports 1 to 4 channels, got {channels}"))
}

/// Label of one pixel: background unless it is a candidate that resembles
/// fewer than `quorum` background fingerprints.
#[inline]
fn classify_pixel<const N: usize>(
    frame: &Frame,
    candidates: &Frame,
    position: PixelPosition,
    fingerprints: &[Fingerprint<N>],
    thresholds: &Thresholds<N>,
    quorum: usize,
) -> u8 {
    if candidates.value(position.x, position.y) != OBJECT {
        return BACKGROUND;
    }
    let pixel = frame.pixel_unchecked(position.x, position.y);
    if count_similar(fingerprints, pixel, thresholds, quorum) >= quorum {
        BACKGROUND
    } else {
        OBJECT
    }
}

/// Classifies every `OBJECT` pixel of `mask` against the background
/// fingerprints; any other value becomes `BACKGROUND`.
pub fn classify_mask<const N: usize>(
    frame: &Frame,
    mask: &mut Frame,
    fingerprints: &[Fingerprint<N>],
    thresholds: &Thresholds<N>,
    quorum: usize,
) -> Result<()> {
    frame.ensure_same_size(mask)?;
    if mask.channels() != 1 || frame.channels() as usize != N {
        return Err(SegmentationError::invalid(format!(
            "classification needs a {}-channel frame and a single-channel mask",
            N
        )));
    }

    let candidates = mask.try_clone()?;
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let value = classify_pixel(frame, &candidates, PixelPosition::new(x, y), fingerprints, thresholds, quorum);
            mask.set_value(x, y, value);
        }
    }
    Ok(())
}

/// Upsamples `coarse` onto `level` and re-classifies the children of every
/// coarse pixel that borders a label change.
fn refine_level<const N: usize>(
    coarse: &Frame,
    level: &PyramidLevel,
    fingerprints: &[Fingerprint<N>],
    thresholds: &Thresholds<N>,
    quorum: usize,
) -> Result<Frame> {
    let (width, height) = (level.width(), level.height());
    let mut fine = upsample_mask(coarse, width, height)?;

    for parent in non_unique_pixels(coarse) {
        for child in children_of(parent, coarse.width(), coarse.height(), width, height) {
            let value = classify_pixel(&level.frame, &level.candidates, child, fingerprints, thresholds, quorum);
            fine.set_value(child.x, child.y, value);
        }
    }

    Ok(fine)
}

/// Optionally keeps only the largest 4-connected object region, then turns
/// background regions that do not reach the frame border into object.
pub fn cleanup_mask(mask: &mut Frame, single_object: bool) -> Result<()> {
    if mask.channels() != 1 {
        return Err(SegmentationError::invalid("cleanup needs a single-channel mask"));
    }
    if mask.is_empty() {
        return Ok(());
    }

    if single_object {
        keep_largest_object(mask);
    }
    fill_enclosed_background(mask);
    Ok(())
}

fn keep_largest_object(mask: &mut Frame) {
    let labels = connected_components(&mask.to_gray_image(), Connectivity::Four, Luma([BACKGROUND]));

    let mut sizes: Vec<usize> = Vec::new();
    for label in labels.pixels() {
        let label = label[0] as usize;
        if label >= sizes.len() {
            sizes.resize(label + 1, 0);
        }
        sizes[label] += 1;
    }

    let Some(largest) = sizes.iter().enumerate().skip(1).max_by_key(|(_, size)| **size).map(|(label, _)| label)
    else {
        return;
    };

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label != 0 && label != largest {
            mask.set_value(x, y, BACKGROUND);
        }
    }
}

fn fill_enclosed_background(mask: &mut Frame) {
    let labels = connected_components(&mask.to_gray_image(), Connectivity::Four, Luma([OBJECT]));
    let (width, height) = labels.dimensions();

    let mut outer: HashSet<u32> = HashSet::new();
    for x in 0..width {
        outer.insert(labels.get_pixel(x, 0)[0]);
        outer.insert(labels.get_pixel(x, height - 1)[0]);
    }
    for y in 0..height {
        outer.insert(labels.get_pixel(0, y)[0]);
        outer.insert(labels.get_pixel(width - 1, y)[0]);
    }

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label != 0 && !outer.contains(&label) {
            mask.set_value(x, y, OBJECT);
        }
    }
}

/// Turns a rough outline into an accurate object contour: pyramid
/// segmentation, outline tracing, then landmark refinement.
#[derive(Debug, Clone, Default)]
pub struct ContourFinder {
    segmenter: PyramidSegmenter,
}

impl ContourFinder {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            segmenter: PyramidSegmenter::new(config),
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        self.segmenter.config()
    }

    /// Dense object contour, or an empty contour when the object cannot be
    /// separated from the background.
    pub fn find_contour(&self, frame: &Frame, rough: &PixelContour, worker: Option<&Worker>) -> Result<PixelContour> {
        let filtered = self.segmenter.prepare(frame, worker)?;
        let mut rng = StdRng::seed_from_u64(self.config().seed);

        let contour = match frame.channels() {
            1 => self.find_with::<1>(&filtered, rough, worker, &mut rng)?,
            2 => self.find_with::<2>(&filtered, rough, worker, &mut rng)?,
            3 => self.find_with::<3>(&filtered, rough, worker, &mut rng)?,
            4 => self.find_with::<4>(&filtered, rough, worker, &mut rng)?,
            channels => return Err(unsupported_channels(channels)),
        };

        match contour {
            Some(contour) => {
                info!(points = contour.len(), area = contour.area(), "object contour found");
                Ok(contour)
            }
            None => {
                warn!("segmentation unavailable for this frame");
                Ok(PixelContour::default())
            }
        }
    }

    fn find_with<const N: usize>(
        &self,
        filtered: &Frame,
        rough: &PixelContour,
        worker: Option<&Worker>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<PixelContour>> {
        let config = self.config();
        let Some(mask) = self.segmenter.segment_filtered::<N>(filtered, rough, worker, rng)? else {
            return Ok(None);
        };
        let Some(outline) = extract_outline(&mask, config.outline_dilation_iterations, worker)? else {
            return Ok(None);
        };

        Ok(refine_contour::<N>(
            filtered,
            &outline,
            &config.landmarks,
            config.clustering.variance_floor,
            rng,
        ))
    }
}

impl ContourRefiner for ContourFinder {
    fn refine(&self, frame: &Frame, rough: &PixelContour, worker: Option<&Worker>) -> Result<PixelContour> {
        self.find_contour(frame, rough, worker)
    }
}
