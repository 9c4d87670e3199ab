//! Hole inpainting: fills the pixels flagged by a binary mask with a weighted
//! average of their already-known neighbors, shrinking the hole until nothing
//! is left.
//!
//! Two strategies are provided. [`ScanlineInpainter`] sweeps the whole frame
//! repeatedly and only uses values known at the start of a sweep.
//! [`FrontierInpainter`] keeps the set of hole pixels touching known content
//! and resolves them one at a time in random order.

use std::collections::HashSet;

use rand::{Rng, RngCore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::{
    border::{WEIGHTED_NEIGHBORS_4, WEIGHTED_NEIGHBORS_8, offset_within},
    error::{Result, SegmentationError},
    frame::Frame,
    geometry::PixelPosition,
    morphology::Neighborhood,
    traits::Inpainter,
};

/// Mask value of a pixel that still has to be synthesized.
pub const HOLE: u8 = 0x00;
/// Mask value of a pixel with valid content.
pub const KNOWN: u8 = 0xFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InpaintingStats {
    /// Hole pixels that received content.
    pub resolved: usize,
    /// Hole pixels left because no known content could reach them.
    pub remaining: usize,
    /// Full sweeps (scanline strategy) or frontier picks (frontier strategy).
    pub passes: usize,
}

fn validate(frame: &Frame, mask: &Frame) -> Result<()> {
    if mask.channels() != 1 {
        return Err(SegmentationError::invalid("inpainting mask must have a single channel"));
    }
    frame.ensure_same_size(mask)
}

/// Writes the weighted average of the known neighbors of `(x, y)` into
/// `frame`. A neighbor's weight is its mask byte times the offset weight, so
/// hole neighbors contribute nothing. Returns false when no neighbor is known.
fn resolve_pixel(
    frame: &mut Frame,
    known: &Frame,
    x: u32,
    y: u32,
    neighbors: &[(isize, isize, u32)],
    noise: u8,
    sums: &mut [u32],
    rng: &mut dyn RngCore,
) -> bool {
    sums.fill(0);
    let mut total_weight = 0u32;

    for &(dx, dy, factor) in neighbors {
        let Some((nx, ny)) = offset_within(x, y, dx, dy, known.width(), known.height()) else {
            continue;
        };
        let weight = known.value(nx, ny) as u32 * factor;
        if weight == 0 {
            continue;
        }
        total_weight += weight;
        for (sum, &value) in sums.iter_mut().zip(frame.pixel_unchecked(nx, ny)) {
            *sum += value as u32 * weight;
        }
    }

    if total_weight == 0 {
        return false;
    }

    let Some(pixel) = frame.pixel_mut(x, y) else {
        return false;
    };
    for (value, &sum) in pixel.iter_mut().zip(sums.iter()) {
        let mut average = ((sum + total_weight / 2) / total_weight) as i32;
        if noise > 0 {
            average += rng.random_range(-(noise as i32)..=noise as i32);
        }
        *value = average.clamp(0, 255) as u8;
    }
    true
}

/// Deterministic strategy: repeated full-frame sweeps with a double-buffered
/// mask so that a sweep never builds on values it produced itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScanlineInpainter {
    /// `Four` or `Eight`; in the 8-neighborhood axis neighbors weigh twice as
    /// much as diagonal ones.
    pub neighborhood: Neighborhood,
    /// Uniform noise in `[-noise, noise]` added per channel.
    pub noise: u8,
}

impl Default for ScanlineInpainter {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::Eight,
            noise: 0,
        }
    }
}

impl Inpainter for ScanlineInpainter {
    fn inpaint(&self, frame: &mut Frame, mask: &mut Frame, rng: &mut dyn RngCore) -> Result<InpaintingStats> {
        validate(frame, mask)?;
        let neighbors: &[(isize, isize, u32)] = match self.neighborhood {
            Neighborhood::Four => &WEIGHTED_NEIGHBORS_4,
            Neighborhood::Eight => &WEIGHTED_NEIGHBORS_8,
            Neighborhood::TwentyFour => {
                return Err(SegmentationError::invalid(
                    "scanline inpainting supports the 4- and 8-neighborhood only",
                ));
            }
        };

        let mut stats = InpaintingStats::default();
        let mut sums = vec![0u32; frame.channels() as usize];
        let mut snapshot = mask.try_clone()?;

        loop {
            let mut resolved = 0usize;
            for y in 0..mask.height() {
                for x in 0..mask.width() {
                    if snapshot.value(x, y) != HOLE {
                        continue;
                    }
                    if resolve_pixel(frame, &snapshot, x, y, neighbors, self.noise, &mut sums, rng) {
                        mask.set_value(x, y, KNOWN);
                        resolved += 1;
                    }
                }
            }

            if resolved == 0 {
                break;
            }
            stats.resolved += resolved;
            stats.passes += 1;
            snapshot.data_mut().copy_from_slice(mask.data());
        }

        stats.remaining = mask.count_value(HOLE);
        debug!(?stats, "scanline inpainting finished");
        Ok(stats)
    }
}

/// Hole pixels adjacent to known content, with O(1) membership test and O(1)
/// uniform random removal.
#[derive(Debug, Default)]
struct Frontier {
    members: HashSet<PixelPosition>,
    positions: Vec<PixelPosition>,
}

impl Frontier {
    fn insert(&mut self, position: PixelPosition) -> bool {
        if !self.members.insert(position) {
            return false;
        }
        self.positions.push(position);
        true
    }

    fn contains(&self, position: PixelPosition) -> bool {
        self.members.contains(&position)
    }

    fn pop_random(&mut self, rng: &mut dyn RngCore) -> Option<PixelPosition> {
        if self.positions.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.positions.len());
        let position = self.positions.swap_remove(index);
        self.members.remove(&position);
        debug_assert_eq!(self.members.len(), self.positions.len());
        Some(position)
    }
}

fn has_known_neighbor(mask: &Frame, x: u32, y: u32) -> bool {
    WEIGHTED_NEIGHBORS_8.iter().any(|&(dx, dy, _)| {
        offset_within(x, y, dx, dy, mask.width(), mask.height()).is_some_and(|(nx, ny)| mask.value(nx, ny) != HOLE)
    })
}

/// Randomized strategy: resolves frontier pixels in uniformly random order,
/// always with the weighted 8-neighborhood.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrontierInpainter {
    /// Uniform noise in `[-noise, noise]` added per channel.
    pub noise: u8,
}

impl Inpainter for FrontierInpainter {
    fn inpaint(&self, frame: &mut Frame, mask: &mut Frame, rng: &mut dyn RngCore) -> Result<InpaintingStats> {
        validate(frame, mask)?;
        let (width, height) = (mask.width(), mask.height());

        let mut frontier = Frontier::default();
        for y in 0..height {
            for x in 0..width {
                if mask.value(x, y) == HOLE && has_known_neighbor(mask, x, y) {
                    frontier.insert(PixelPosition::new(x, y));
                }
            }
        }

        let mut stats = InpaintingStats::default();
        let mut sums = vec![0u32; frame.channels() as usize];

        while let Some(position) = frontier.pop_random(rng) {
            let (x, y) = (position.x, position.y);
            let resolved = resolve_pixel(frame, mask, x, y, &WEIGHTED_NEIGHBORS_8, self.noise, &mut sums, rng);
            debug_assert!(resolved, "frontier pixel without known neighbor");
            mask.set_value(x, y, KNOWN);
            stats.resolved += 1;
            stats.passes += 1;

            for &(dx, dy, _) in &WEIGHTED_NEIGHBORS_8 {
                let Some((nx, ny)) = offset_within(x, y, dx, dy, width, height) else {
                    continue;
                };
                let neighbor = PixelPosition::new(nx, ny);
                if mask.value(nx, ny) == HOLE && !frontier.contains(neighbor) {
                    frontier.insert(neighbor);
                }
            }
        }

        stats.remaining = mask.count_value(HOLE);
        debug!(?stats, "frontier inpainting finished");
        Ok(stats)
    }
}

/// Selects an inpainting strategy by name, e.g. from a command or the CLI.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InpaintStrategy {
    #[default]
    Scanline,
    Frontier,
}

impl InpaintStrategy {
    /// `neighborhood` only affects the scanline strategy.
    pub fn inpainter(self, neighborhood: Neighborhood, noise: u8) -> Box<dyn Inpainter> {
        match self {
            Self::Scanline => Box::new(ScanlineInpainter { neighborhood, noise }),
            Self::Frontier => Box::new(FrontierInpainter { noise }),
        }
    }
}
