use rand::RngCore;

use crate::{
    contour::PixelContour,
    error::Result,
    frame::Frame,
    inpainting::InpaintingStats,
    worker::Worker,
};

/// Trait for in-place mask filters (morphology and friends)
pub trait MaskFilter: Send + Sync {
    /// Filter the mask in place
    fn apply(&self, mask: &mut Frame, worker: Option<&Worker>) -> Result<()>;

    /// Short, stable name used in logs and pipeline descriptions
    fn name(&self) -> &'static str;
}

/// Trait for hole inpainting strategies
pub trait Inpainter: Send + Sync {
    /// Synthesize content for every hole pixel of `mask` and clear the mask
    fn inpaint(&self, frame: &mut Frame, mask: &mut Frame, rng: &mut dyn RngCore) -> Result<InpaintingStats>;
}

/// Trait for turning a rough outline into an accurate object contour
pub trait ContourRefiner: Send + Sync {
    /// Refine `rough` against `frame`; an empty contour means the
    /// segmentation is unavailable for this frame
    fn refine(&self, frame: &Frame, rough: &PixelContour, worker: Option<&Worker>) -> Result<PixelContour>;
}
