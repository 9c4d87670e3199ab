use crate::{
    config::SegmentationConfig,
    mask::OBJECT,
    morphology::{MorphologyFilter, MorphologyOperation, Neighborhood},
    pipeline::Pipeline,
    segmenter::ContourFinder,
    traits::{ContourRefiner, MaskFilter},
};

/// Builder for creating processing pipelines with a fluent API
pub struct PipelineBuilder {
    refiner: Option<Box<dyn ContourRefiner>>,
    filters: Vec<Box<dyn MaskFilter>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            refiner: None,
            filters: Vec::new(),
        }
    }

    /// Set the contour refiner (replaces any existing one)
    pub fn set_refiner<R>(mut self, refiner: R) -> Self
    where
        R: ContourRefiner + 'static,
    {
        self.refiner = Some(Box::new(refiner));
        self
    }

    /// Use a [`ContourFinder`] with the given configuration
    pub fn with_config(self, config: SegmentationConfig) -> Self {
        self.set_refiner(ContourFinder::new(config))
    }

    /// Add a mask filter to the pipeline
    pub fn add_filter<F>(mut self, filter: F) -> Self
    where
        F: MaskFilter + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// Add a morphology step on the object region
    pub fn with_morphology(self, operation: MorphologyOperation, neighborhood: Neighborhood, iterations: u32) -> Self {
        self.add_filter(MorphologyFilter {
            operation,
            neighborhood,
            mask_value: OBJECT,
            iterations,
        })
    }

    /// Close single-pixel gaps in the object
    pub fn with_hole_closing(self) -> Self {
        self.with_morphology(MorphologyOperation::Close, Neighborhood::Eight, 1)
    }

    /// Build the pipeline with a default [`ContourFinder`] if no refiner was set
    pub fn build(self) -> Pipeline {
        let refiner = self
            .refiner
            .unwrap_or_else(|| Box::new(ContourFinder::default()));
        Pipeline::new(refiner, self.filters)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
