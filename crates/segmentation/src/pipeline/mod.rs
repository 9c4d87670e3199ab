pub mod builder;

use tracing::debug;

use crate::{
    contour::PixelContour,
    error::Result,
    frame::Frame,
    mask::{BACKGROUND, OBJECT},
    outline::extract_outline,
    traits::{ContourRefiner, MaskFilter},
    types::SegmentationOutcome,
    worker::Worker,
};

/// A contour refiner followed by optional mask post-processing.
///
/// Without filters the refined contour is returned as is. With filters the
/// contour is rasterized, every filter runs on the object mask in order and
/// the outline is traced again.
pub struct Pipeline {
    refiner: Box<dyn ContourRefiner>,
    filters: Vec<Box<dyn MaskFilter>>,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    /// Create a new pipeline with the given components
    pub fn new(refiner: Box<dyn ContourRefiner>, filters: Vec<Box<dyn MaskFilter>>) -> Self {
        Self { refiner, filters }
    }

    /// Segment the object outlined by `rough` in `frame`
    pub fn process(&self, frame: &Frame, rough: &PixelContour, worker: Option<&Worker>) -> Result<SegmentationOutcome> {
        let (width, height) = (frame.width(), frame.height());
        let contour = self.refiner.refine(frame, rough, worker)?;

        if contour.is_empty() || self.filters.is_empty() {
            return Ok(SegmentationOutcome::new(contour, width, height));
        }

        let mut mask = contour.rasterize(width, height, OBJECT, BACKGROUND)?;
        self.filter_mask(&mut mask, worker)?;
        let contour = extract_outline(&mask, 0, worker)?.unwrap_or_default();

        Ok(SegmentationOutcome::new(contour, width, height))
    }

    /// Run every filter on `mask` in order
    pub fn filter_mask(&self, mask: &mut Frame, worker: Option<&Worker>) -> Result<()> {
        for filter in &self.filters {
            debug!(filter = filter.name(), "applying mask filter");
            filter.apply(mask, worker)?;
        }
        Ok(())
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let names: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        format!("Pipeline: contour refiner, {} mask filters [{}]", names.len(), names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{MorphologyFilter, MorphologyOperation, Neighborhood};

    /// Returns the rough contour unchanged.
    struct Passthrough;

    impl ContourRefiner for Passthrough {
        fn refine(&self, _frame: &Frame, rough: &PixelContour, _worker: Option<&Worker>) -> Result<PixelContour> {
            Ok(rough.dense())
        }
    }

    fn frame() -> Frame {
        Frame::new(32, 32, 3, 0, 0).expect("frame")
    }

    #[test]
    fn without_filters_the_refined_contour_is_kept() {
        let pipeline = Pipeline::builder().set_refiner(Passthrough).build();
        let rough = PixelContour::from_xy(&[(4, 4), (20, 4), (20, 20), (4, 20)]);

        let outcome = pipeline.process(&frame(), &rough, None).expect("outcome");
        assert_eq!(outcome.contour, rough.dense());
        assert_eq!((outcome.image_width, outcome.image_height), (32, 32));
    }

    #[test]
    fn filters_reshape_the_object() {
        let pipeline = Pipeline::builder()
            .set_refiner(Passthrough)
            .add_filter(MorphologyFilter {
                operation: MorphologyOperation::Dilate,
                neighborhood: Neighborhood::Eight,
                mask_value: OBJECT,
                iterations: 2,
            })
            .build();
        let rough = PixelContour::from_xy(&[(4, 4), (20, 4), (20, 20), (4, 20)]);

        let outcome = pipeline.process(&frame(), &rough, None).expect("outcome");
        let bounds = outcome.contour.bounding_box().expect("bounds");
        assert_eq!((bounds.left, bounds.top, bounds.right, bounds.bottom), (2, 2, 22, 22));
        assert_eq!(pipeline.info(), "Pipeline: contour refiner, 1 mask filters [dilate]");
    }
}
