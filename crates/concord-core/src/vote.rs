//! Votes and the denormalised per-statement tallies they maintain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── VoteValue ───────────────────────────────────────────────────────────────

/// A participant's judgement of one statement.
///
/// `Unsure` is a real vote, not the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteValue {
  Disagree,
  Unsure,
  Agree,
}

impl VoteValue {
  pub fn as_i8(self) -> i8 {
    match self {
      Self::Disagree => -1,
      Self::Unsure => 0,
      Self::Agree => 1,
    }
  }

  pub fn as_f64(self) -> f64 { f64::from(self.as_i8()) }
}

impl TryFrom<i64> for VoteValue {
  type Error = Error;

  fn try_from(raw: i64) -> Result<Self> {
    match raw {
      -1 => Ok(Self::Disagree),
      0 => Ok(Self::Unsure),
      1 => Ok(Self::Agree),
      other => Err(Error::InvalidVoteValue(other)),
    }
  }
}

impl std::str::FromStr for VoteValue {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "agree" => Ok(Self::Agree),
      "disagree" => Ok(Self::Disagree),
      "unsure" | "pass" => Ok(Self::Unsure),
      other => other
        .parse::<i64>()
        .map_err(|_| Error::UnknownVariant { field: "vote", value: other.to_owned() })
        .and_then(Self::try_from),
    }
  }
}

/// Optional self-reported certainty, 1 (low) to 5 (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct VoteConfidence(u8);

impl VoteConfidence {
  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for VoteConfidence {
  type Error = Error;

  fn try_from(raw: i64) -> Result<Self> {
    match raw {
      1..=5 => Ok(Self(raw as u8)),
      other => Err(Error::InvalidConfidence(other)),
    }
  }
}

impl From<VoteConfidence> for i64 {
  fn from(c: VoteConfidence) -> Self { i64::from(c.0) }
}

// ─── VoteCounts ──────────────────────────────────────────────────────────────

/// Per-statement tallies. `total()` always equals the sum of the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteCounts {
  pub agree:    u32,
  pub disagree: u32,
  pub unsure:   u32,
}

impl VoteCounts {
  pub fn new(agree: u32, disagree: u32, unsure: u32) -> Self {
    Self { agree, disagree, unsure }
  }

  pub fn total(&self) -> u32 { self.agree + self.disagree + self.unsure }

  pub fn get(&self, value: VoteValue) -> u32 {
    match value {
      VoteValue::Agree => self.agree,
      VoteValue::Disagree => self.disagree,
      VoteValue::Unsure => self.unsure,
    }
  }

  fn bucket_mut(&mut self, value: VoteValue) -> &mut u32 {
    match value {
      VoteValue::Agree => &mut self.agree,
      VoteValue::Disagree => &mut self.disagree,
      VoteValue::Unsure => &mut self.unsure,
    }
  }

  /// Apply a vote write: a first vote increments one bucket, a changed vote
  /// moves one count between buckets, a repeated vote changes nothing.
  pub fn apply(&mut self, previous: Option<VoteValue>, next: VoteValue) {
    match previous {
      Some(prev) if prev == next => {}
      Some(prev) => {
        let old = self.bucket_mut(prev);
        *old = old.saturating_sub(1);
        *self.bucket_mut(next) += 1;
      }
      None => *self.bucket_mut(next) += 1,
    }
  }

  /// Share of all cast votes that agree; unsure votes count in the
  /// denominator. `None` when nobody has voted.
  pub fn agree_rate(&self) -> Option<f64> {
    match self.total() {
      0 => None,
      n => Some(f64::from(self.agree) / f64::from(n)),
    }
  }
}

// ─── Vote ────────────────────────────────────────────────────────────────────

/// The single current vote of a participant on a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
  pub participant_id: Uuid,
  pub statement_id:   Uuid,
  pub value:          VoteValue,
  pub confidence:     Option<VoteConfidence>,
  pub updated_at:     DateTime<Utc>,
}

/// Input to [`crate::store::DiscussionStore::cast_vote`].
#[derive(Debug, Clone)]
pub struct NewVote {
  pub participant_id: Uuid,
  pub statement_id:   Uuid,
  pub value:          VoteValue,
  pub confidence:     Option<VoteConfidence>,
}

impl NewVote {
  pub fn new(participant_id: Uuid, statement_id: Uuid, value: VoteValue) -> Self {
    Self { participant_id, statement_id, value, confidence: None }
  }
}

/// Outcome of a vote write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResult {
  pub vote:     Vote,
  /// The value this vote replaced, if the participant had voted before.
  pub previous: Option<VoteValue>,
  /// The statement's tallies after the write.
  pub counts:   VoteCounts,
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// A report asking human moderators to review a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
  pub flag_id:      Uuid,
  pub statement_id: Uuid,
  pub reporter_id:  Uuid,
  pub reason:       Option<String>,
  pub recorded_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResult {
  pub statement_id:   Uuid,
  pub flag_count:     u32,
  /// `false` when this reporter had already flagged the statement.
  pub newly_recorded: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vote_value_from_integer() {
    assert_eq!(VoteValue::try_from(-1).unwrap(), VoteValue::Disagree);
    assert_eq!(VoteValue::try_from(0).unwrap(), VoteValue::Unsure);
    assert_eq!(VoteValue::try_from(1).unwrap(), VoteValue::Agree);
    assert!(matches!(VoteValue::try_from(2), Err(Error::InvalidVoteValue(2))));
  }

  #[test]
  fn vote_value_from_str() {
    assert_eq!("agree".parse::<VoteValue>().unwrap(), VoteValue::Agree);
    assert_eq!("-1".parse::<VoteValue>().unwrap(), VoteValue::Disagree);
    assert!(matches!("7".parse::<VoteValue>(), Err(Error::InvalidVoteValue(7))));
    assert!("maybe".parse::<VoteValue>().is_err());
  }

  #[test]
  fn confidence_range() {
    assert!(VoteConfidence::try_from(0).is_err());
    assert_eq!(VoteConfidence::try_from(5).unwrap().get(), 5);
    assert!(VoteConfidence::try_from(6).is_err());
  }

  #[test]
  fn revote_a_b_a_matches_single_vote() {
    let mut once = VoteCounts::default();
    once.apply(None, VoteValue::Agree);

    let mut thrice = VoteCounts::default();
    thrice.apply(None, VoteValue::Agree);
    thrice.apply(Some(VoteValue::Agree), VoteValue::Disagree);
    thrice.apply(Some(VoteValue::Disagree), VoteValue::Agree);

    assert_eq!(once, thrice);
    assert_eq!(thrice.total(), 1);
  }

  #[test]
  fn repeated_vote_is_a_no_op() {
    let mut c = VoteCounts::new(3, 1, 0);
    c.apply(Some(VoteValue::Agree), VoteValue::Agree);
    assert_eq!(c, VoteCounts::new(3, 1, 0));
  }

  #[test]
  fn agree_rate_includes_unsure_in_denominator() {
    assert_eq!(VoteCounts::default().agree_rate(), None);
    assert_eq!(VoteCounts::new(2, 1, 1).agree_rate(), Some(0.5));
  }
}
