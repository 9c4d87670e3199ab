//! Landmark-driven contour refinement.
//!
//! Probes are sent inward along the outward normal at regularly spaced
//! contour points. Each probe compares the pixels it crosses against
//! fingerprints sampled just outside the contour; where it first enters a
//! run of dissimilar pixels it leaves a landmark. Every contour point is
//! then pulled towards the line through its two nearest landmarks and
//! smoothed with its neighbors.
//!
//! Probes are spaced `step` points apart, closer on short contours so that
//! every round has at least `min_probes` of them. Corners of small objects
//! otherwise fall between two landmarks on different edges and get cut.

use geo_types::Coord;
use rand::{Rng, RngCore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    contour::PixelContour,
    fingerprint::{Fingerprint, Thresholds, local_thresholds},
    frame::Frame,
    geometry::PixelPosition,
};

/// Blend of the landmark target, the current point and the mean of its two
/// contour neighbors. Weights are normalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SmoothingWeights {
    pub target: f32,
    pub current: f32,
    pub neighbors: f32,
}

impl SmoothingWeights {
    pub const REGULAR: Self = Self {
        target: 0.6,
        current: 0.2,
        neighbors: 0.2,
    };

    pub const AGGRESSIVE: Self = Self {
        target: 0.8,
        current: 0.1,
        neighbors: 0.1,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LandmarkParams {
    /// Refinement rounds; the last one uses `final_weights`.
    pub iterations: u32,
    /// Distance in contour points between two probes.
    pub step: usize,
    /// Contours shorter than `step * min_probes` points are probed more
    /// densely, down to every point.
    pub min_probes: usize,
    /// Local fingerprints gathered around each probe.
    pub samples: usize,
    /// Dissimilar fingerprints (out of `samples`) that make a probe step dissimilar.
    pub quorum: usize,
    /// Probes start this many pixels outside the contour.
    pub probe_outside: u32,
    /// Probes end this many pixels inside the contour.
    pub probe_inside: u32,
    /// Consecutive dissimilar steps that confirm an edge.
    pub streak: u32,
    /// Extra steps the landmark is moved back towards the probe start.
    pub offset: u32,
    /// Landmarks closer than this are treated as one.
    pub coincidence_distance: f32,
    /// Minimum dot product of two landmark normals lying on one straight edge.
    /// Only consulted with `tangent_fallback`.
    pub normal_agreement: f32,
    /// When the two nearest landmarks disagree in direction, project onto
    /// the tangent through the nearest one instead of the line through both.
    pub tangent_fallback: bool,
    /// Scale applied to the local deviation, as for calibrated thresholds
    /// of a simple scene.
    pub threshold_scale: f32,
    pub weights: SmoothingWeights,
    pub final_weights: SmoothingWeights,
}

impl Default for LandmarkParams {
    fn default() -> Self {
        Self {
            iterations: 3,
            step: 10,
            min_probes: 40,
            samples: 41,
            quorum: 38,
            probe_outside: 3,
            probe_inside: 7,
            streak: 3,
            offset: 0,
            coincidence_distance: 0.5,
            normal_agreement: 0.9,
            tangent_fallback: false,
            threshold_scale: 2.0,
            weights: SmoothingWeights::REGULAR,
            final_weights: SmoothingWeights::AGGRESSIVE,
        }
    }
}

/// A detected edge position with the outward normal of the probe that found it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub position: Coord<f32>,
    pub normal: Coord<f32>,
}

/// Runs `params.iterations` refinement rounds on a dense contour.
///
/// Returns `None` when a round finds fewer than two landmarks or the contour
/// collapses below three vertices.
pub fn refine_contour<const N: usize>(
    frame: &Frame,
    contour: &PixelContour,
    params: &LandmarkParams,
    variance_floor: f32,
    rng: &mut dyn RngCore,
) -> Option<PixelContour> {
    let mut current = contour.clone();

    for iteration in 0..params.iterations {
        if current.len() < 3 {
            warn!(points = current.len(), "contour collapsed during refinement");
            return None;
        }

        let normals = outward_normals(&current);
        let landmarks = find_landmarks::<N>(frame, &current, &normals, params, variance_floor, rng);
        if landmarks.len() < 2 {
            warn!(iteration, landmarks = landmarks.len(), "not enough landmarks to refine contour");
            return None;
        }

        let weights = if iteration + 1 == params.iterations {
            params.final_weights
        } else {
            params.weights
        };

        // every point moves based on the previous round only
        let moved: Vec<PixelPosition> = (0..current.len())
            .map(|i| {
                let coord = smoothed_point(&current, i, &landmarks, params, weights);
                PixelPosition::from_coord_clamped(coord, frame.width(), frame.height())
            })
            .collect();

        let equalized = PixelContour::new(moved).equalized();
        if equalized.len() < 3 {
            warn!(iteration, "refined contour degenerated");
            return None;
        }
        current = equalized;
        debug!(iteration, landmarks = landmarks.len(), points = current.len(), "refinement round");
    }

    Some(current)
}

/// Unit outward normals from the tangent `p[i + 2] - p[i - 2]`; `None` where
/// the tangent vanishes.
pub fn outward_normals(contour: &PixelContour) -> Vec<Option<Coord<f32>>> {
    let orientation = if contour.signed_area() >= 0.0 { 1.0 } else { -1.0 };

    (0..contour.len() as isize)
        .map(|i| {
            let tangent = contour.cyclic(i + 2).to_coord() - contour.cyclic(i - 2).to_coord();
            let length = dot(tangent, tangent).sqrt();
            if length < f32::EPSILON {
                return None;
            }
            Some(Coord {
                x: orientation * tangent.y / length,
                y: -orientation * tangent.x / length,
            })
        })
        .collect()
}

/// Probes every [`probe_spacing`]-th contour point, starting at a random phase.
pub fn find_landmarks<const N: usize>(
    frame: &Frame,
    contour: &PixelContour,
    normals: &[Option<Coord<f32>>],
    params: &LandmarkParams,
    variance_floor: f32,
    rng: &mut dyn RngCore,
) -> Vec<Landmark> {
    let count = contour.len();
    if count == 0 {
        return Vec::new();
    }

    let step = probe_spacing(count, params);
    let phase = rng.random_range(0..step);
    let half = (params.samples.clamp(1, count) as isize - 1) / 2;
    let outside = params.probe_outside as f32;

    let mut landmarks = Vec::new();
    for index in (phase..count).step_by(step) {
        let Some(normal) = normals[index] else { continue };

        let local: Vec<Fingerprint<N>> = (-half..=half)
            .filter_map(|k| {
                let j = (index as isize + k).rem_euclid(count as isize) as usize;
                let offset = normals[j]?;
                let position = pixel_at(contour.points()[j].to_coord() + offset * outside, frame)?;
                Fingerprint::sample(frame, position)
            })
            .collect();
        if local.is_empty() {
            continue;
        }

        let thresholds = local_thresholds(&local, variance_floor, params.threshold_scale);
        let quorum = scaled_quorum(params.quorum, params.samples, local.len());
        let origin = contour.points()[index].to_coord();

        if let Some(position) = probe(frame, origin, normal, &local, &thresholds, quorum, params) {
            landmarks.push(Landmark { position, normal });
        }
    }

    landmarks
}

/// Walks inward from `origin + probe_outside * normal`, one pixel per step.
///
/// Once `streak` consecutive steps are dissimilar the landmark is placed
/// `streak + offset` steps behind the cursor, which has already moved past
/// the last tested pixel: the first pixel of the run, shifted back towards
/// the start by `offset`.
fn probe<const N: usize>(
    frame: &Frame,
    origin: Coord<f32>,
    normal: Coord<f32>,
    local: &[Fingerprint<N>],
    thresholds: &Thresholds<N>,
    quorum: usize,
    params: &LandmarkParams,
) -> Option<Coord<f32>> {
    let start = origin + normal * params.probe_outside as f32;
    let steps = params.probe_outside + params.probe_inside;
    let streak_needed = params.streak.max(1);
    let mut streak = 0;

    for k in 0..steps {
        let cursor = start - normal * k as f32;
        let dissimilar = pixel_at(cursor, frame)
            .and_then(|p| frame.pixel(p.x, p.y))
            .is_some_and(|pixel| local.iter().filter(|f| !f.is_similar(pixel, thresholds)).count() >= quorum);

        if !dissimilar {
            streak = 0;
            continue;
        }

        streak += 1;
        if streak == streak_needed {
            let walked = (k + 1) as f32;
            let along = walked - (streak_needed + params.offset) as f32;
            let position = start - normal * along;
            return Some(Coord {
                x: position.x.round(),
                y: position.y.round(),
            });
        }
    }

    None
}

/// Probe distance in contour points for a contour of `count` points.
pub fn probe_spacing(count: usize, params: &LandmarkParams) -> usize {
    (count / params.min_probes.max(1)).clamp(1, params.step.max(1))
}

/// `quorum` out of `nominal` rescaled to `available` samples, rounded up.
pub fn scaled_quorum(quorum: usize, nominal: usize, available: usize) -> usize {
    (quorum * available).div_ceil(nominal.max(1)).clamp(1, available.max(1))
}

fn smoothed_point(
    contour: &PixelContour,
    index: usize,
    landmarks: &[Landmark],
    params: &LandmarkParams,
    weights: SmoothingWeights,
) -> Coord<f32> {
    let i = index as isize;
    let point = contour.cyclic(i).to_coord();
    let total = weights.target + weights.current + weights.neighbors;
    if total <= 0.0 {
        return point;
    }

    let target = landmark_target(point, landmarks, params).unwrap_or(point);
    let neighbors = (contour.cyclic(i - 1).to_coord() + contour.cyclic(i + 1).to_coord()) * 0.5;

    (target * weights.target + point * weights.current + neighbors * weights.neighbors) / total
}

/// Where the two nearest landmarks pull `point`: onto the nearest one when
/// the two coincide, otherwise onto the line through both.
pub fn landmark_target(point: Coord<f32>, landmarks: &[Landmark], params: &LandmarkParams) -> Option<Coord<f32>> {
    let mut nearest: Option<(f32, &Landmark)> = None;
    let mut second: Option<(f32, &Landmark)> = None;
    for landmark in landmarks {
        let distance = sqr_length(landmark.position - point);
        if nearest.is_none_or(|(d, _)| distance < d) {
            second = nearest;
            nearest = Some((distance, landmark));
        } else if second.is_none_or(|(d, _)| distance < d) {
            second = Some((distance, landmark));
        }
    }

    let (_, first) = nearest?;
    let Some((_, second)) = second else {
        return Some(first.position);
    };

    let direction = second.position - first.position;
    if sqr_length(direction).sqrt() < params.coincidence_distance {
        return Some(first.position);
    }

    if params.tangent_fallback && dot(first.normal, second.normal) < params.normal_agreement {
        let tangent = Coord {
            x: -first.normal.y,
            y: first.normal.x,
        };
        return Some(project(point, first.position, tangent));
    }
    Some(project(point, first.position, direction))
}

fn project(point: Coord<f32>, origin: Coord<f32>, direction: Coord<f32>) -> Coord<f32> {
    let length = sqr_length(direction);
    if length < f32::EPSILON {
        return origin;
    }
    origin + direction * (dot(point - origin, direction) / length)
}

fn pixel_at(coord: Coord<f32>, frame: &Frame) -> Option<PixelPosition> {
    PixelPosition::from_coord_within(coord, frame.width(), frame.height())
}

#[inline]
fn dot(a: Coord<f32>, b: Coord<f32>) -> f32 {
    a.x * b.x + a.y * b.y
}

#[inline]
fn sqr_length(v: Coord<f32>) -> f32 {
    dot(v, v)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::geometry::PixelBoundingBox;

    fn square(left: u32, top: u32, right: u32, bottom: u32) -> PixelContour {
        PixelContour::from_xy(&[(left, top), (right, top), (right, bottom), (left, bottom)]).dense()
    }

    fn square_frame(size: u32, object: std::ops::Range<u32>, background: u8, foreground: u8) -> Frame {
        let mut frame = Frame::new_mask(size, size, background).expect("frame");
        for y in object.clone() {
            for x in object.clone() {
                frame.set_value(x, y, foreground);
            }
        }
        frame
    }

    fn landmark(x: f32, y: f32, nx: f32, ny: f32) -> Landmark {
        Landmark {
            position: Coord { x, y },
            normal: Coord { x: nx, y: ny },
        }
    }

    #[test]
    fn normals_point_outward_for_both_orientations() {
        let clockwise = square(10, 10, 20, 20);
        let normals = outward_normals(&clockwise);
        let left = clockwise.points().iter().position(|p| *p == PixelPosition::new(10, 15)).expect("on contour");
        assert_eq!(normals[left], Some(Coord { x: -1.0, y: 0.0 }));

        let reversed = PixelContour::new(clockwise.points().iter().rev().copied().collect());
        let normals = outward_normals(&reversed);
        let left = reversed.points().iter().position(|p| *p == PixelPosition::new(10, 15)).expect("on contour");
        assert_eq!(normals[left], Some(Coord { x: -1.0, y: 0.0 }));
    }

    #[test]
    fn quorum_scales_with_available_samples() {
        assert_eq!(scaled_quorum(38, 41, 41), 38);
        assert_eq!(scaled_quorum(38, 41, 3), 3);
        assert_eq!(scaled_quorum(38, 41, 20), 19);
        assert_eq!(scaled_quorum(38, 41, 1), 1);
    }

    #[test]
    fn coinciding_landmarks_are_the_target() {
        let params = LandmarkParams::default();
        let landmarks = [landmark(5.0, 5.0, -1.0, 0.0), landmark(5.2, 5.1, 0.0, -1.0)];
        let target = landmark_target(Coord { x: 2.0, y: 9.0 }, &landmarks, &params).expect("target");
        assert_eq!(target, Coord { x: 5.0, y: 5.0 });
    }

    #[test]
    fn agreeing_landmarks_define_a_line() {
        let params = LandmarkParams::default();
        let landmarks = [
            landmark(10.0, 0.0, -1.0, 0.0),
            landmark(10.0, 20.0, -1.0, 0.0),
            landmark(40.0, 40.0, 0.0, 1.0),
        ];
        let target = landmark_target(Coord { x: 7.0, y: 8.0 }, &landmarks, &params).expect("target");
        assert!((target.x - 10.0).abs() < 1e-5);
        assert!((target.y - 8.0).abs() < 1e-5);
    }

    #[test]
    fn disagreeing_landmarks_still_define_a_line() {
        let params = LandmarkParams::default();
        let landmarks = [landmark(10.0, 12.0, -1.0, 0.0), landmark(14.0, 10.0, 0.0, -1.0)];
        let target = landmark_target(Coord { x: 9.0, y: 9.0 }, &landmarks, &params).expect("target");
        assert!((target.x - 10.4).abs() < 1e-5, "target {target:?}");
        assert!((target.y - 11.8).abs() < 1e-5, "target {target:?}");
    }

    #[test]
    fn tangent_fallback_follows_the_nearest_edge() {
        let params = LandmarkParams {
            tangent_fallback: true,
            ..Default::default()
        };
        let landmarks = [landmark(10.0, 12.0, -1.0, 0.0), landmark(14.0, 10.0, 0.0, -1.0)];
        let target = landmark_target(Coord { x: 9.0, y: 9.0 }, &landmarks, &params).expect("target");
        assert!((target.x - 10.0).abs() < 1e-5 && (target.y - 9.0).abs() < 1e-5, "target {target:?}");

        // agreeing normals keep the line through both landmarks
        let landmarks = [landmark(10.0, 0.0, -1.0, 0.0), landmark(10.0, 20.0, -1.0, 0.0)];
        let target = landmark_target(Coord { x: 7.0, y: 8.0 }, &landmarks, &params).expect("target");
        assert!((target.x - 10.0).abs() < 1e-5 && (target.y - 8.0).abs() < 1e-5);
    }

    #[test]
    fn landmark_spacing_shrinks_on_short_contours() {
        let params = LandmarkParams::default();
        assert_eq!(probe_spacing(1000, &params), 10);
        assert_eq!(probe_spacing(400, &params), 10);
        assert_eq!(probe_spacing(92, &params), 2);
        assert_eq!(probe_spacing(20, &params), 1);
    }

    #[test]
    fn landmarks_lie_on_the_object_edge() {
        let frame = square_frame(40, 10..30, 60, 110);
        let contour = square(8, 8, 31, 31);
        let normals = outward_normals(&contour);
        let params = LandmarkParams::default();
        let mut rng = StdRng::seed_from_u64(4);

        let landmarks = find_landmarks::<1>(&frame, &contour, &normals, &params, 100.0, &mut rng);
        assert!(landmarks.len() >= 40);
        for landmark in &landmarks {
            let on_edge = [10.0, 29.0].contains(&landmark.position.x) || [10.0, 29.0].contains(&landmark.position.y);
            assert!(on_edge, "landmark {landmark:?} is off the object edge");
        }
    }

    #[test]
    fn landmark_is_the_first_pixel_of_the_object_shifted_by_the_offset() {
        let frame = square_frame(40, 10..30, 60, 110);
        let contour = square(8, 8, 31, 31);
        let normals = outward_normals(&contour);

        for (offset, expected) in [(0, 10.0), (1, 9.0), (2, 8.0)] {
            let params = LandmarkParams {
                offset,
                ..Default::default()
            };
            let mut rng = StdRng::seed_from_u64(2);
            let landmarks = find_landmarks::<1>(&frame, &contour, &normals, &params, 100.0, &mut rng);

            let left: Vec<&Landmark> = landmarks.iter().filter(|l| l.normal.x < -0.99).collect();
            let top: Vec<&Landmark> = landmarks.iter().filter(|l| l.normal.y < -0.99).collect();
            assert!(!left.is_empty() && !top.is_empty());
            assert!(left.iter().all(|l| l.position.x == expected), "offset {offset}: {left:?}");
            assert!(top.iter().all(|l| l.position.y == expected), "offset {offset}: {top:?}");
        }
    }

    #[test]
    fn refinement_snaps_to_the_object() {
        let frame = square_frame(40, 10..30, 60, 110);
        let contour = square(8, 8, 31, 31);
        let mut rng = StdRng::seed_from_u64(11);

        let refined = refine_contour::<1>(&frame, &contour, &LandmarkParams::default(), 100.0, &mut rng)
            .expect("refined contour");
        assert!(refined.is_dense());
        assert_eq!(refined.bounding_box(), Some(PixelBoundingBox::new(10, 10, 29, 29)));

        let mask = refined.rasterize(40, 40, 0, 255).expect("rasterize");
        assert_eq!(mask.count_value(0), 400);
    }

    #[test]
    fn contour_one_pixel_too_large_shrinks_to_the_exact_square() {
        let frame = square_frame(40, 10..30, 60, 110);
        let contour = square(9, 9, 30, 30);

        for seed in 0..4 {
            let mut rng = StdRng::seed_from_u64(seed);
            let refined = refine_contour::<1>(&frame, &contour, &LandmarkParams::default(), 100.0, &mut rng)
                .expect("refined contour");
            assert!(refined.is_dense());
            assert_eq!(refined.len(), 76, "seed {seed}");
            assert_eq!(refined.bounding_box(), Some(PixelBoundingBox::new(10, 10, 29, 29)));
            assert_eq!(refined.rasterize(40, 40, 0, 255).expect("rasterize").count_value(0), 400);
        }
    }

    #[test]
    fn uniform_frames_produce_no_landmarks() {
        let frame = Frame::new_mask(40, 40, 80).expect("frame");
        let contour = square(8, 8, 31, 31);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(refine_contour::<1>(&frame, &contour, &LandmarkParams::default(), 100.0, &mut rng).is_none());
    }
}
