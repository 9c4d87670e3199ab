//! Binary morphology over 8-bit masks.
//!
//! One mask value `V` is the selected value; erosion turns a `V` pixel into
//! `255 - V` unless its whole neighborhood is `V`, dilation turns any other
//! pixel into `V` as soon as one neighbor is `V`. Neighbors outside the frame
//! are mirrored back inside (see [`mirror_index`]).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::trace;

use crate::{
    border::mirror_index,
    error::{Result, SegmentationError},
    frame::Frame,
    traits::MaskFilter,
    worker::{MIN_ROWS_PER_PARTITION, Worker, process_rows},
};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Neighborhood {
    /// 3x3 cross.
    Four,
    /// 3x3 square.
    #[default]
    Eight,
    /// 5x5 square.
    TwentyFour,
}

impl Neighborhood {
    pub fn radius(self) -> u32 {
        match self {
            Self::Four | Self::Eight => 1,
            Self::TwentyFour => 2,
        }
    }

    /// Smallest width and height a frame needs for this kernel.
    pub fn min_frame_size(self) -> u32 {
        match self {
            Self::Four | Self::Eight => 2,
            Self::TwentyFour => 4,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MorphologyOperation {
    Erode,
    Dilate,
    #[default]
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Erode,
    Dilate,
}

/// Erodes the `mask_value` region `iterations` times.
pub fn erode(
    mask: &mut Frame,
    neighborhood: Neighborhood,
    mask_value: u8,
    iterations: u32,
    worker: Option<&Worker>,
) -> Result<()> {
    iterate(mask, neighborhood, mask_value, iterations, Pass::Erode, worker)
}

/// Dilates the `mask_value` region `iterations` times.
pub fn dilate(
    mask: &mut Frame,
    neighborhood: Neighborhood,
    mask_value: u8,
    iterations: u32,
    worker: Option<&Worker>,
) -> Result<()> {
    iterate(mask, neighborhood, mask_value, iterations, Pass::Dilate, worker)
}

/// One erosion followed by one dilation.
pub fn open(mask: &mut Frame, neighborhood: Neighborhood, mask_value: u8, worker: Option<&Worker>) -> Result<()> {
    validate(mask, neighborhood)?;
    let mut scratch = mask.try_clone()?;
    apply_pass(mask, &mut scratch, neighborhood, mask_value, Pass::Erode, worker);
    apply_pass(&scratch, mask, neighborhood, mask_value, Pass::Dilate, worker);
    Ok(())
}

/// One dilation followed by one erosion.
pub fn close(mask: &mut Frame, neighborhood: Neighborhood, mask_value: u8, worker: Option<&Worker>) -> Result<()> {
    validate(mask, neighborhood)?;
    let mut scratch = mask.try_clone()?;
    apply_pass(mask, &mut scratch, neighborhood, mask_value, Pass::Dilate, worker);
    apply_pass(&scratch, mask, neighborhood, mask_value, Pass::Erode, worker);
    Ok(())
}

fn validate(mask: &Frame, neighborhood: Neighborhood) -> Result<()> {
    if mask.channels() != 1 {
        return Err(SegmentationError::invalid(format!(
            "morphology needs a single-channel mask, got {} channels",
            mask.channels()
        )));
    }

    let minimum = neighborhood.min_frame_size();
    if mask.width() < minimum || mask.height() < minimum {
        return Err(SegmentationError::FrameTooSmall {
            width: mask.width(),
            height: mask.height(),
            minimum,
        });
    }
    Ok(())
}

fn iterate(
    mask: &mut Frame,
    neighborhood: Neighborhood,
    mask_value: u8,
    iterations: u32,
    pass: Pass,
    worker: Option<&Worker>,
) -> Result<()> {
    validate(mask, neighborhood)?;
    if iterations == 0 {
        return Ok(());
    }

    trace!(?pass, %neighborhood, iterations, "morphology");

    let mut scratch = mask.try_clone()?;
    for iteration in 0..iterations {
        if iteration % 2 == 0 {
            apply_pass(mask, &mut scratch, neighborhood, mask_value, pass, worker);
        } else {
            apply_pass(&scratch, mask, neighborhood, mask_value, pass, worker);
        }
    }

    if iterations % 2 == 1 {
        std::mem::swap(mask, &mut scratch);
    }
    Ok(())
}

fn apply_pass(
    source: &Frame,
    target: &mut Frame,
    neighborhood: Neighborhood,
    mask_value: u8,
    pass: Pass,
    worker: Option<&Worker>,
) {
    debug_assert!(source.has_same_size(target));

    process_rows(worker, target, MIN_ROWS_PER_PARTITION, |y, row| match neighborhood {
        Neighborhood::Four => cross3_row(source, y, row, mask_value, pass),
        Neighborhood::Eight => square_row::<1>(source, y, row, mask_value, pass),
        Neighborhood::TwentyFour => square_row::<2>(source, y, row, mask_value, pass),
    });
}

#[inline]
fn decide(center: u8, mask_value: u8, pass: Pass, all_match: impl FnOnce() -> bool, any_match: impl FnOnce() -> bool) -> u8 {
    match pass {
        Pass::Erode if center == mask_value && !all_match() => 255 - mask_value,
        Pass::Dilate if center != mask_value && any_match() => mask_value,
        _ => center,
    }
}

fn cross3_row(source: &Frame, y: u32, target: &mut [u8], mask_value: u8, pass: Pass) {
    let width = source.width() as usize;
    let height = source.height() as usize;

    let top = source.row(mirror_index(y as isize - 1, height) as u32);
    let center = source.row(y);
    let bottom = source.row(mirror_index(y as isize + 1, height) as u32);

    for x in 0..width {
        let left = mirror_index(x as isize - 1, width);
        let right = mirror_index(x as isize + 1, width);
        let neighbors = [top[x], center[left], center[right], bottom[x]];

        target[x] = decide(
            center[x],
            mask_value,
            pass,
            || neighbors.iter().all(|&v| v == mask_value),
            || neighbors.iter().any(|&v| v == mask_value),
        );
    }
}

fn square_row<const RADIUS: isize>(source: &Frame, y: u32, target: &mut [u8], mask_value: u8, pass: Pass) {
    let width = source.width() as usize;
    let height = source.height() as usize;

    let span = (2 * RADIUS + 1) as usize;
    let center = source.row(y);

    let mut rows = [center; 5];
    for (row, dy) in rows.iter_mut().zip(-RADIUS..=RADIUS) {
        *row = source.row(mirror_index(y as isize + dy, height) as u32);
    }
    let rows = &rows[..span];

    let mut columns = [0usize; 5];
    let columns = &mut columns[..span];

    for x in 0..width {
        for (slot, dx) in columns.iter_mut().zip(-RADIUS..=RADIUS) {
            *slot = mirror_index(x as isize + dx, width);
        }

        target[x] = decide(
            center[x],
            mask_value,
            pass,
            || rows.iter().all(|row| columns.iter().all(|&c| row[c] == mask_value)),
            || rows.iter().any(|row| columns.iter().any(|&c| row[c] == mask_value)),
        );
    }
}

/// A configured morphology step usable in a [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MorphologyFilter {
    pub operation: MorphologyOperation,
    pub neighborhood: Neighborhood,
    pub mask_value: u8,
    /// Ignored by `open` and `close`, which always run a single pass each.
    pub iterations: u32,
}

impl MaskFilter for MorphologyFilter {
    fn apply(&self, mask: &mut Frame, worker: Option<&Worker>) -> Result<()> {
        match self.operation {
            MorphologyOperation::Erode => erode(mask, self.neighborhood, self.mask_value, self.iterations, worker),
            MorphologyOperation::Dilate => dilate(mask, self.neighborhood, self.mask_value, self.iterations, worker),
            MorphologyOperation::Open => open(mask, self.neighborhood, self.mask_value, worker),
            MorphologyOperation::Close => close(mask, self.neighborhood, self.mask_value, worker),
        }
    }

    fn name(&self) -> &'static str {
        self.operation.into()
    }
}
