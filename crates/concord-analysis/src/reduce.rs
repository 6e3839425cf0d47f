//! Principal component projection of the vote matrix.
//!
//! Missing cells are read as 0 for this step only. Each participant's
//! projected position is then scaled by `sqrt(statements / votes cast)` so
//! sparse voters are not pulled toward the origin by their zero-filled
//! cells and mistaken for centrists.
//!
//! The scaling shapes the recorded coordinates only. Clustering compares
//! directions by cosine distance, so a positive scale never changes which
//! group a participant joins.

use nalgebra::{DMatrix, SymmetricEigen};

use concord_core::config::ReducerConfig;

use crate::{Error, Result, matrix::VoteMatrix};

/// Eigenvalues below this fraction of the largest carry no signal.
const RELATIVE_EIGEN_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Projection {
  /// Matrix rows that were projected, in order.
  pub rows:               Vec<usize>,
  /// One point per entry of `rows`, `components` coordinates each.
  pub coords:             Vec<Vec<f64>>,
  pub components:         usize,
  /// Statement loadings of each kept component (unit length).
  pub basis:              Vec<Vec<f64>>,
  /// Share of total variance captured by each kept component.
  pub explained_variance: Vec<f64>,
}

pub fn reduce(matrix: &VoteMatrix, rows: &[usize], config: &ReducerConfig) -> Result<Projection> {
  let n = rows.len();
  let m = matrix.cols();
  if m < 2 {
    return Err(Error::InsufficientData(format!("{m} active statements (need 2)")));
  }
  if n < config.min_participants.max(2) {
    return Err(Error::InsufficientData(format!(
      "{n} qualifying participants (need {})",
      config.min_participants
    )));
  }

  let mut x = DMatrix::from_fn(n, m, |i, j| {
    matrix.get(rows[i], j).map(|v| v.as_f64()).unwrap_or(0.0)
  });
  for j in 0..m {
    let mean = x.column(j).sum() / n as f64;
    x.column_mut(j).add_scalar_mut(-mean);
  }

  let covariance = (x.transpose() * &x) / (n as f64 - 1.0);
  if covariance.iter().any(|v| !v.is_finite()) {
    return Err(Error::Numerical("covariance matrix is not finite".into()));
  }

  let eig = SymmetricEigen::new(covariance);
  let mut order: Vec<usize> = (0..m).collect();
  order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]).then(a.cmp(&b)));

  let largest = eig.eigenvalues[order[0]];
  if !largest.is_finite() || largest <= 0.0 {
    return Err(Error::Numerical("vote matrix has no variance".into()));
  }
  let total_variance: f64 = eig.eigenvalues.iter().filter(|v| **v > 0.0).sum();

  let wanted = config.components.min(config.max_components).min(m).max(1);
  let kept: Vec<usize> = order
    .into_iter()
    .take(wanted)
    .filter(|&i| eig.eigenvalues[i] > largest * RELATIVE_EIGEN_FLOOR)
    .collect();

  // Fix each eigenvector's sign so repeated runs land on the same side.
  let basis: Vec<Vec<f64>> = kept
    .iter()
    .map(|&c| {
      let v = eig.eigenvectors.column(c);
      let pivot = (0..m).fold(0, |best, j| if v[j].abs() > v[best].abs() { j } else { best });
      let sign = if v[pivot] < 0.0 { -1.0 } else { 1.0 };
      v.iter().map(|e| e * sign).collect()
    })
    .collect();

  let coords = rows
    .iter()
    .enumerate()
    .map(|(i, &row)| {
      let scale = sparsity_scale(m, matrix.votes_in_row(row));
      basis
        .iter()
        .map(|v| scale * (0..m).map(|j| x[(i, j)] * v[j]).sum::<f64>())
        .collect::<Vec<f64>>()
    })
    .collect::<Vec<_>>();

  if coords.iter().flatten().any(|c| !c.is_finite()) {
    return Err(Error::Numerical("projection produced non-finite coordinates".into()));
  }

  Ok(Projection {
    rows: rows.to_vec(),
    coords,
    components: kept.len(),
    basis,
    explained_variance: kept.iter().map(|&i| eig.eigenvalues[i] / total_variance).collect(),
  })
}

/// `sqrt(statements / votes)`; a participant who voted on everything keeps
/// their position.
pub fn sparsity_scale(statements: usize, votes: usize) -> f64 {
  (statements as f64 / votes.max(1) as f64).sqrt()
}
