//! Statement ranking from vote tallies alone.
//!
//! Nothing here depends on clustering output. Every sort order breaks ties
//! by statement id ascending so pages are stable between requests.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;

use crate::{Error, config::RankingConfig, statement::Statement, vote::VoteCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
  /// Fewest votes first, spreading participation across the pool.
  #[default]
  Progressive,
  /// Highest Wilson lower bound first.
  Best,
  /// Most evenly split first; low-vote statements are filtered out.
  Controversial,
  /// Newest first.
  Recent,
  /// Most votes first.
  MostVoted,
}

impl std::str::FromStr for SortOrder {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "progressive" => Ok(Self::Progressive),
      "best" => Ok(Self::Best),
      "controversial" => Ok(Self::Controversial),
      "recent" => Ok(Self::Recent),
      "most_voted" | "most-voted" => Ok(Self::MostVoted),
      other => Err(Error::UnknownVariant { field: "sort order", value: other.to_owned() }),
    }
  }
}

// ─── Scores ──────────────────────────────────────────────────────────────────

/// Two-sided standard-normal quantile for a confidence level in (0, 1).
pub fn z_for_confidence(confidence: f64) -> f64 {
  let c = confidence.clamp(1e-6, 1.0 - 1e-12);
  std::f64::consts::SQRT_2 * erf_inv(c)
}

/// Lower bound of the Wilson score interval on the agree proportion.
///
/// Disagree votes are failures; unsure votes are left out of the sample.
/// Returns 0 when there are no agree/disagree votes.
pub fn wilson_lower_bound(agree: u32, disagree: u32, z: f64) -> f64 {
  let n = f64::from(agree) + f64::from(disagree);
  if n == 0.0 {
    return 0.0;
  }
  let p = f64::from(agree) / n;
  let z2 = z * z;
  let centre = p + z2 / (2.0 * n);
  let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
  ((centre - margin) / (1.0 + z2 / n)).max(0.0)
}

/// `1 - |rate - 0.5| * 2` on the agree rate (unsure in the denominator):
/// 0 when unanimous, 1 on a perfect split, 0 with no votes.
pub fn controversy(counts: &VoteCounts) -> f64 {
  counts
    .agree_rate()
    .map(|rate| 1.0 - (rate - 0.5).abs() * 2.0)
    .unwrap_or(0.0)
}

/// Scores computed for one statement, handy for display next to a list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatementScores {
  pub wilson:      f64,
  pub controversy: f64,
}

impl StatementScores {
  pub fn of(counts: &VoteCounts, config: &RankingConfig) -> Self {
    Self {
      wilson:      wilson_lower_bound(
        counts.agree,
        counts.disagree,
        z_for_confidence(config.wilson_confidence),
      ),
      controversy: controversy(counts),
    }
  }
}

// ─── Sorting ─────────────────────────────────────────────────────────────────

/// Order `statements` for display. The controversial order drops statements
/// below the configured vote floor; the others keep every statement.
pub fn rank(
  mut statements: Vec<Statement>,
  order: SortOrder,
  config: &RankingConfig,
) -> Vec<Statement> {
  let z = z_for_confidence(config.wilson_confidence);
  let by_id = |a: &Statement, b: &Statement| a.statement_id.cmp(&b.statement_id);

  match order {
    SortOrder::Progressive => statements.sort_by(|a, b| {
      a.counts.total().cmp(&b.counts.total()).then_with(|| by_id(a, b))
    }),
    SortOrder::MostVoted => statements.sort_by(|a, b| {
      b.counts.total().cmp(&a.counts.total()).then_with(|| by_id(a, b))
    }),
    SortOrder::Recent => statements.sort_by(|a, b| {
      b.created_at.cmp(&a.created_at).then_with(|| by_id(a, b))
    }),
    SortOrder::Best => {
      return sort_by_score_desc(statements, |s| {
        wilson_lower_bound(s.counts.agree, s.counts.disagree, z)
      });
    }
    SortOrder::Controversial => {
      statements.retain(|s| s.counts.total() >= config.controversial_min_votes);
      return sort_by_score_desc(statements, |s| controversy(&s.counts));
    }
  }
  statements
}

/// Score each statement once, then sort descending by score.
fn sort_by_score_desc(
  statements: Vec<Statement>,
  score: impl Fn(&Statement) -> f64,
) -> Vec<Statement> {
  let mut keyed: Vec<(f64, Statement)> =
    statements.into_iter().map(|s| (score(&s), s)).collect();
  keyed.sort_by(|(sa, a), (sb, b)| {
    sb.total_cmp(sa).then_with(|| a.statement_id.cmp(&b.statement_id))
  });
  keyed.into_iter().map(|(_, s)| s).collect()
}
