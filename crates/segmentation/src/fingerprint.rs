//! Per-pixel color fingerprints and the similarity predicate built on them.
//!
//! Thresholds are calibrated from the fingerprints themselves: a randomized
//! clustering groups them, the largest per-channel cluster variance becomes
//! the base deviation, and the deviation is widened with the number of
//! clusters found.

use std::cell::OnceCell;

use geo_types::Coord;
use rand::{RngCore, seq::SliceRandom};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, SegmentationError},
    frame::Frame,
    geometry::PixelPosition,
};

/// Per-channel upper bound (exclusive) on the absolute channel difference of
/// two similar pixels.
pub type Thresholds<const N: usize> = [u32; N];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint<const N: usize>(pub [u8; N]);

impl<const N: usize> Fingerprint<N> {
    /// Copies the channel values at `position`; `None` outside the frame or
    /// when the frame does not have `N` channels.
    pub fn sample(frame: &Frame, position: PixelPosition) -> Option<Self> {
        if frame.channels() as usize != N {
            return None;
        }
        let pixel = frame.pixel(position.x, position.y)?;
        let mut values = [0u8; N];
        values.copy_from_slice(pixel);
        Some(Self(values))
    }

    /// True iff every channel differs from `candidate` by less than its threshold.
    #[inline]
    pub fn is_similar(&self, candidate: &[u8], thresholds: &Thresholds<N>) -> bool {
        debug_assert!(candidate.len() >= N);
        self.0
            .iter()
            .zip(candidate)
            .zip(thresholds)
            .all(|((&value, &other), &threshold)| (value.abs_diff(other) as u32) < threshold)
    }

    pub fn sqr_distance(&self, center: &[f32; N]) -> f32 {
        self.0
            .iter()
            .zip(center)
            .map(|(&v, &c)| {
                let d = v as f32 - c;
                d * d
            })
            .sum()
    }

    fn to_f32(self) -> [f32; N] {
        self.0.map(f32::from)
    }
}

/// Samples every `step`-th position `distance` pixels along its normal.
///
/// Positions without a normal, or whose shifted sample would leave the
/// frame, are sampled where they are.
pub fn sample_outside<const N: usize>(
    frame: &Frame,
    positions: &[PixelPosition],
    normals: &[Option<Coord<f32>>],
    step: usize,
    distance: u32,
) -> Vec<Fingerprint<N>> {
    positions
        .iter()
        .zip(normals)
        .step_by(step.max(1))
        .filter_map(|(&position, &normal)| {
            let shifted = normal.and_then(|n| {
                PixelPosition::from_coord_within(position.to_coord() + n * distance as f32, frame.width(), frame.height())
            });
            Fingerprint::sample(frame, shifted.unwrap_or(position))
        })
        .collect()
}

/// Number of `fingerprints` similar to `candidate`, counting stops at `quorum`.
#[inline]
pub fn count_similar<const N: usize>(
    fingerprints: &[Fingerprint<N>],
    candidate: &[u8],
    thresholds: &Thresholds<N>,
    quorum: usize,
) -> usize {
    let mut count = 0;
    for fingerprint in fingerprints {
        if fingerprint.is_similar(candidate, thresholds) {
            count += 1;
            if count >= quorum {
                break;
            }
        }
    }
    count
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ClusteringParams {
    /// Independent randomized clustering attempts; the best one wins.
    pub attempts: u32,
    /// Clusters seeded at the start of every attempt.
    pub target_clusters: u32,
    /// A fingerprint joins a cluster when its mean squared channel
    /// difference to the center is at most this deviation squared.
    pub max_channel_deviation: f32,
    /// Score added per cluster, so splitting must pay for itself.
    pub cluster_penalty: f32,
    /// Lower bound for the per-channel variance.
    pub variance_floor: f32,
    /// From this many clusters on, thresholds are widened 4x instead of 2x.
    pub medium_cluster_count: usize,
    /// From this many clusters on, thresholds are widened 8x.
    pub large_cluster_count: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            attempts: 30,
            target_clusters: 5,
            max_channel_deviation: 30.0,
            cluster_penalty: 1000.0,
            variance_floor: 100.0,
            medium_cluster_count: 8,
            large_cluster_count: 16,
        }
    }
}

impl ClusteringParams {
    /// Scene-complexity factor applied to the base deviation.
    pub fn threshold_scale(&self, cluster_count: usize) -> f32 {
        if cluster_count < self.medium_cluster_count {
            2.0
        } else if cluster_count < self.large_cluster_count {
            4.0
        } else {
            8.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cluster<const N: usize> {
    indices: Vec<usize>,
    variance: OnceCell<[f32; N]>,
}

impl<const N: usize> Cluster<N> {
    fn new(indices: Vec<usize>) -> Self {
        Self {
            indices,
            variance: OnceCell::new(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn mean(&self, fingerprints: &[Fingerprint<N>]) -> [f32; N] {
        mean_of(self.indices.iter().map(|&i| &fingerprints[i]))
    }

    /// Per-channel population variance, computed on first use.
    pub fn variance(&self, fingerprints: &[Fingerprint<N>]) -> [f32; N] {
        *self
            .variance
            .get_or_init(|| variance_of(self.indices.iter().map(|&i| &fingerprints[i])))
    }

    fn squared_error(&self, fingerprints: &[Fingerprint<N>]) -> f32 {
        let mean = self.mean(fingerprints);
        self.indices.iter().map(|&i| fingerprints[i].sqr_distance(&mean)).sum()
    }
}

fn mean_of<'a, const N: usize>(fingerprints: impl Iterator<Item = &'a Fingerprint<N>>) -> [f32; N] {
    let mut sums = [0f32; N];
    let mut count = 0usize;
    for fingerprint in fingerprints {
        for (sum, &v) in sums.iter_mut().zip(&fingerprint.0) {
            *sum += v as f32;
        }
        count += 1;
    }
    if count == 0 {
        return sums;
    }
    sums.map(|s| s / count as f32)
}

fn variance_of<'a, const N: usize>(fingerprints: impl Iterator<Item = &'a Fingerprint<N>> + Clone) -> [f32; N] {
    let mean = mean_of(fingerprints.clone());
    let mut sums = [0f32; N];
    let mut count = 0usize;
    for fingerprint in fingerprints {
        for ((sum, &v), &m) in sums.iter_mut().zip(&fingerprint.0).zip(&mean) {
            let d = v as f32 - m;
            *sum += d * d;
        }
        count += 1;
    }
    if count == 0 {
        return sums;
    }
    sums.map(|s| s / count as f32)
}

#[derive(Debug, Clone)]
pub struct Clustering<const N: usize> {
    clusters: Vec<Cluster<N>>,
    score: f32,
}

impl<const N: usize> Clustering<N> {
    pub fn clusters(&self) -> &[Cluster<N>] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Within-cluster squared error plus the per-cluster penalty; lower is better.
    pub fn score(&self) -> f32 {
        self.score
    }
}

fn cluster_attempt<const N: usize>(
    fingerprints: &[Fingerprint<N>],
    params: &ClusteringParams,
    rng: &mut dyn RngCore,
) -> Clustering<N> {
    let mut order: Vec<usize> = (0..fingerprints.len()).collect();
    order.shuffle(rng);

    let seeds = (params.target_clusters.max(1) as usize).min(order.len());
    let mut centers: Vec<[f32; N]> = order[..seeds].iter().map(|&i| fingerprints[i].to_f32()).collect();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); seeds];
    let max_sqr_distance = params.max_channel_deviation * params.max_channel_deviation * N as f32;

    for &index in &order {
        let fingerprint = &fingerprints[index];
        let nearest = centers
            .iter()
            .enumerate()
            .map(|(c, center)| (c, fingerprint.sqr_distance(center)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((c, distance)) if distance <= max_sqr_distance => members[c].push(index),
            _ => {
                centers.push(fingerprint.to_f32());
                members.push(vec![index]);
            }
        }
    }

    let clusters: Vec<Cluster<N>> = members
        .into_iter()
        .filter(|m| !m.is_empty())
        .map(Cluster::new)
        .collect();
    let squared_error: f32 = clusters.iter().map(|c| c.squared_error(fingerprints)).sum();
    let score = squared_error + params.cluster_penalty * clusters.len() as f32;

    Clustering { clusters, score }
}

/// Best of `params.attempts` randomized clusterings.
pub fn cluster_fingerprints<const N: usize>(
    fingerprints: &[Fingerprint<N>],
    params: &ClusteringParams,
    rng: &mut dyn RngCore,
) -> Result<Clustering<N>> {
    if fingerprints.is_empty() {
        return Err(SegmentationError::invalid("clustering needs at least one fingerprint"));
    }

    let mut best: Option<Clustering<N>> = None;
    for _ in 0..params.attempts.max(1) {
        let attempt = cluster_attempt(fingerprints, params, rng);
        if best.as_ref().is_none_or(|b| attempt.score < b.score) {
            best = Some(attempt);
        }
    }

    best.ok_or_else(|| SegmentationError::invalid("no clustering attempt was made"))
}

/// Converts per-channel variances into similarity thresholds.
pub fn variance_to_thresholds<const N: usize>(variance: [f32; N], floor: f32, scale: f32) -> Thresholds<N> {
    variance.map(|v| (v.max(floor).sqrt() * scale).round() as u32)
}

/// Calibrates global similarity thresholds for a set of fingerprints.
pub fn calibrate_thresholds<const N: usize>(
    fingerprints: &[Fingerprint<N>],
    params: &ClusteringParams,
    rng: &mut dyn RngCore,
) -> Result<Thresholds<N>> {
    let clustering = cluster_fingerprints(fingerprints, params, rng)?;

    let mut max_variance = [0f32; N];
    for cluster in clustering.clusters() {
        for (max, v) in max_variance.iter_mut().zip(cluster.variance(fingerprints)) {
            *max = max.max(v);
        }
    }

    let scale = params.threshold_scale(clustering.len());
    let thresholds = variance_to_thresholds(max_variance, params.variance_floor, scale);
    debug!(clusters = clustering.len(), ?thresholds, "calibrated similarity thresholds");
    Ok(thresholds)
}

/// Thresholds derived from the variance of one local fingerprint sample.
pub fn local_thresholds<const N: usize>(fingerprints: &[Fingerprint<N>], floor: f32, scale: f32) -> Thresholds<N> {
    variance_to_thresholds(variance_of(fingerprints.iter()), floor, scale)
}
