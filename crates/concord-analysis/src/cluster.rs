//! Spherical k-means over projected participants, with the cluster count
//! chosen by silhouette score.
//!
//! Distances are cosine distances. Seeding is farthest-first from the
//! lowest-index point and every tie breaks toward the lower index, so the
//! same input always yields the same labels.

use concord_core::config::ClusterConfig;
use tracing::debug;

use crate::{Error, Result};

/// Cosine distances below this are treated as identical directions.
const SAME_DIRECTION: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
  /// One label per input point, numbered in order of first appearance.
  pub labels:         Vec<usize>,
  pub k:              usize,
  pub sizes:          Vec<usize>,
  pub silhouette:     f64,
  /// Silhouette below the configured floor.
  pub low_confidence: bool,
}

/// Try every k in the configured range and keep the best silhouette.
/// Ties keep the smaller k.
pub fn cluster(points: &[Vec<f64>], config: &ClusterConfig) -> Result<Clustering> {
  let units: Vec<Vec<f64>> = points.iter().map(|p| normalized(p)).collect();
  let max_k = config.max_k.min(units.len().saturating_sub(1));

  let mut best: Option<(usize, Vec<usize>, f64)> = None;
  for k in config.min_k.max(2)..=max_k {
    let Some(labels) = spherical_kmeans(&units, k, config.max_iterations) else {
      debug!(k, "no k distinct clusters; skipping");
      continue;
    };
    let score = silhouette(&units, &labels, k);
    debug!(k, silhouette = score, "candidate clustering");
    if best.as_ref().is_none_or(|(_, _, s)| score > *s + 1e-12) {
      best = Some((k, labels, score));
    }
  }

  let (k, labels, silhouette) = best.ok_or_else(|| {
    Error::Numerical(format!(
      "no clustering with {}..={} groups over {} participants",
      config.min_k,
      config.max_k,
      units.len()
    ))
  })?;

  let labels = canonical_labels(&labels, k);
  let mut sizes = vec![0; k];
  for &l in &labels {
    sizes[l] += 1;
  }

  Ok(Clustering {
    labels,
    k,
    sizes,
    silhouette,
    low_confidence: silhouette < config.silhouette_floor,
  })
}

fn normalized(p: &[f64]) -> Vec<f64> {
  let norm = p.iter().map(|x| x * x).sum::<f64>().sqrt();
  if norm > 0.0 { p.iter().map(|x| x / norm).collect() } else { vec![0.0; p.len()] }
}

fn is_zero(u: &[f64]) -> bool { u.iter().all(|x| *x == 0.0) }

/// Cosine distance between unit (or zero) vectors; a zero vector is
/// orthogonal to everything.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
  if is_zero(a) || is_zero(b) {
    return 1.0;
  }
  let d = (1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>()).clamp(0.0, 2.0);
  if d < SAME_DIRECTION { 0.0 } else { d }
}

/// Index of the smallest value; ties go to the lowest index.
fn argmin(values: impl Iterator<Item = f64>) -> usize {
  values
    .enumerate()
    .fold((0, f64::INFINITY), |(bi, bv), (i, v)| if v < bv { (i, v) } else { (bi, bv) })
    .0
}

/// `None` when the points do not support `k` non-empty clusters.
fn spherical_kmeans(units: &[Vec<f64>], k: usize, max_iterations: usize) -> Option<Vec<usize>> {
  let first = units.iter().position(|u| !is_zero(u))?;
  let mut centroids = vec![units[first].clone()];
  while centroids.len() < k {
    let (next, spread) = units
      .iter()
      .enumerate()
      .map(|(i, u)| {
        let nearest = centroids
          .iter()
          .map(|c| cosine_distance(u, c))
          .fold(f64::INFINITY, f64::min);
        (i, nearest)
      })
      .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) });
    if spread <= 0.0 || is_zero(&units[next]) {
      return None;
    }
    centroids.push(units[next].clone());
  }

  let dim = units[first].len();
  let mut labels = vec![usize::MAX; units.len()];
  for _ in 0..max_iterations.max(1) {
    let assigned: Vec<usize> = units
      .iter()
      .map(|u| argmin(centroids.iter().map(|c| cosine_distance(u, c))))
      .collect();
    if assigned == labels {
      break;
    }
    labels = assigned;

    for (c, centroid) in centroids.iter_mut().enumerate() {
      let mut sum = vec![0.0; dim];
      for (u, _) in units.iter().zip(&labels).filter(|(_, l)| **l == c) {
        for (s, x) in sum.iter_mut().zip(u) {
          *s += x;
        }
      }
      let next = normalized(&sum);
      if is_zero(&next) {
        return None;
      }
      *centroid = next;
    }
  }

  let mut seen = vec![false; k];
  for &l in &labels {
    seen[l] = true;
  }
  seen.iter().all(|s| *s).then_some(labels)
}

/// Mean silhouette with cosine distance. Points alone in their cluster
/// score 0.
pub fn silhouette(units: &[Vec<f64>], labels: &[usize], k: usize) -> f64 {
  if units.is_empty() {
    return 0.0;
  }
  let mut sizes = vec![0usize; k];
  for &l in labels {
    sizes[l] += 1;
  }

  let total: f64 = units
    .iter()
    .enumerate()
    .map(|(i, u)| {
      let own = labels[i];
      if sizes[own] <= 1 {
        return 0.0;
      }
      let mut sums = vec![0.0; k];
      for (j, v) in units.iter().enumerate() {
        if j != i {
          sums[labels[j]] += cosine_distance(u, v);
        }
      }
      let a = sums[own] / (sizes[own] - 1) as f64;
      let b = (0..k)
        .filter(|&c| c != own && sizes[c] > 0)
        .map(|c| sums[c] / sizes[c] as f64)
        .fold(f64::INFINITY, f64::min);
      let denom = a.max(b);
      if !b.is_finite() || denom <= 0.0 { 0.0 } else { (b - a) / denom }
    })
    .sum();

  total / units.len() as f64
}

/// Renumber labels by first appearance so label permutations compare equal.
fn canonical_labels(labels: &[usize], k: usize) -> Vec<usize> {
  let mut mapping = vec![usize::MAX; k];
  let mut next = 0;
  labels
    .iter()
    .map(|&l| {
      if mapping[l] == usize::MAX {
        mapping[l] = next;
        next += 1;
      }
      mapping[l]
    })
    .collect()
}
