//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so they compare correctly as text. UUIDs are stored as hyphenated
//! lowercase strings. Lists are stored as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use concord_core::{
  analysis::{ConsensusAnalysis, StatementStats},
  statement::{Deletion, DeletionReason, ModerationStatus, Statement, StatementKind},
  vote::{Flag, Vote, VoteConfidence, VoteCounts, VoteValue},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Hex SHA-256 of the normalised text, used for duplicate detection.
pub fn text_hash(text: &str) -> String {
  let normalized = concord_core::statement::normalize_text(text);
  hex::encode(Sha256::digest(normalized.as_bytes()))
}

fn unknown(field: &'static str, value: &str) -> Error {
  concord_core::Error::UnknownVariant { field, value: value.to_owned() }.into()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_kind(k: StatementKind) -> &'static str {
  match k {
    StatementKind::Claim => "claim",
    StatementKind::Question => "question",
  }
}

pub fn decode_kind(s: &str) -> Result<StatementKind> {
  match s {
    "claim" => Ok(StatementKind::Claim),
    "question" => Ok(StatementKind::Question),
    other => Err(unknown("statement kind", other)),
  }
}

pub fn encode_moderation(m: ModerationStatus) -> &'static str {
  match m {
    ModerationStatus::Pending => "pending",
    ModerationStatus::Approved => "approved",
    ModerationStatus::Rejected => "rejected",
  }
}

pub fn decode_moderation(s: &str) -> Result<ModerationStatus> {
  match s {
    "pending" => Ok(ModerationStatus::Pending),
    "approved" => Ok(ModerationStatus::Approved),
    "rejected" => Ok(ModerationStatus::Rejected),
    other => Err(unknown("moderation status", other)),
  }
}

pub fn encode_deletion_reason(r: DeletionReason) -> &'static str {
  match r {
    DeletionReason::Moderation => "moderation",
    DeletionReason::Owner => "owner",
  }
}

pub fn decode_deletion_reason(s: &str) -> Result<DeletionReason> {
  match s {
    "moderation" => Ok(DeletionReason::Moderation),
    "owner" => Ok(DeletionReason::Owner),
    other => Err(unknown("deletion reason", other)),
  }
}

/// The counter column a vote value is tallied in.
pub fn counter_column(v: VoteValue) -> &'static str {
  match v {
    VoteValue::Agree => "agree_count",
    VoteValue::Disagree => "disagree_count",
    VoteValue::Unsure => "unsure_count",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawStatement::from_row`].
pub const STATEMENT_COLUMNS: &str = "statement_id, discussion_id, author_id, text, kind,
  created_at, edited_at, moderation, deleted_at, deletion_reason, is_seed,
  flag_count, agree_count, disagree_count, unsure_count";

/// Raw values read directly from a `statements` row.
pub struct RawStatement {
  pub statement_id:    String,
  pub discussion_id:   String,
  pub author_id:       String,
  pub text:            String,
  pub kind:            String,
  pub created_at:      String,
  pub edited_at:       Option<String>,
  pub moderation:      String,
  pub deleted_at:      Option<String>,
  pub deletion_reason: Option<String>,
  pub is_seed:         bool,
  pub flag_count:      u32,
  pub agree:           u32,
  pub disagree:        u32,
  pub unsure:          u32,
}

impl RawStatement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      statement_id:    row.get(0)?,
      discussion_id:   row.get(1)?,
      author_id:       row.get(2)?,
      text:            row.get(3)?,
      kind:            row.get(4)?,
      created_at:      row.get(5)?,
      edited_at:       row.get(6)?,
      moderation:      row.get(7)?,
      deleted_at:      row.get(8)?,
      deletion_reason: row.get(9)?,
      is_seed:         row.get(10)?,
      flag_count:      row.get(11)?,
      agree:           row.get(12)?,
      disagree:        row.get(13)?,
      unsure:          row.get(14)?,
    })
  }

  pub fn into_statement(self) -> Result<Statement> {
    let deletion = match (self.deleted_at, self.deletion_reason) {
      (Some(at), Some(reason)) => Deletion::Deleted {
        reason: decode_deletion_reason(&reason)?,
        at:     decode_dt(&at)?,
      },
      (Some(at), None) => Deletion::Deleted {
        reason: DeletionReason::Moderation,
        at:     decode_dt(&at)?,
      },
      (None, _) => Deletion::Live,
    };

    Ok(Statement {
      statement_id: decode_uuid(&self.statement_id)?,
      discussion_id: decode_uuid(&self.discussion_id)?,
      author_id: decode_uuid(&self.author_id)?,
      text: self.text,
      kind: decode_kind(&self.kind)?,
      created_at: decode_dt(&self.created_at)?,
      edited_at: self.edited_at.as_deref().map(decode_dt).transpose()?,
      moderation: decode_moderation(&self.moderation)?,
      deletion,
      is_seed: self.is_seed,
      flag_count: self.flag_count,
      counts: VoteCounts::new(self.agree, self.disagree, self.unsure),
    })
  }
}

/// Column list matching [`RawVote::from_row`].
pub const VOTE_COLUMNS: &str = "participant_id, statement_id, value, confidence, updated_at";

pub struct RawVote {
  pub participant_id: String,
  pub statement_id:   String,
  pub value:          i64,
  pub confidence:     Option<i64>,
  pub updated_at:     String,
}

impl RawVote {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      participant_id: row.get(0)?,
      statement_id:   row.get(1)?,
      value:          row.get(2)?,
      confidence:     row.get(3)?,
      updated_at:     row.get(4)?,
    })
  }

  pub fn into_vote(self) -> Result<Vote> {
    Ok(Vote {
      participant_id: decode_uuid(&self.participant_id)?,
      statement_id:   decode_uuid(&self.statement_id)?,
      value:          VoteValue::try_from(self.value)?,
      confidence:     self.confidence.map(VoteConfidence::try_from).transpose()?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawFlag::from_row`].
pub const FLAG_COLUMNS: &str = "flag_id, statement_id, reporter_id, reason, recorded_at";

pub struct RawFlag {
  pub flag_id:      String,
  pub statement_id: String,
  pub reporter_id:  String,
  pub reason:       Option<String>,
  pub recorded_at:  String,
}

impl RawFlag {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      flag_id:      row.get(0)?,
      statement_id: row.get(1)?,
      reporter_id:  row.get(2)?,
      reason:       row.get(3)?,
      recorded_at:  row.get(4)?,
    })
  }

  pub fn into_flag(self) -> Result<Flag> {
    Ok(Flag {
      flag_id:      decode_uuid(&self.flag_id)?,
      statement_id: decode_uuid(&self.statement_id)?,
      reporter_id:  decode_uuid(&self.reporter_id)?,
      reason:       self.reason,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}

/// Column list matching [`RawAnalysis::from_row`].
pub const ANALYSIS_COLUMNS: &str = "analysis_id, discussion_id, computed_at, cluster_count,
  cluster_sizes, silhouette, low_confidence, participant_count, consensus_ids,
  bridge_ids, divisive_ids, statement_stats, vote_count";

pub struct RawAnalysis {
  pub analysis_id:       String,
  pub discussion_id:     String,
  pub computed_at:       String,
  pub cluster_count:     i64,
  pub cluster_sizes:     String,
  pub silhouette:        f64,
  pub low_confidence:    bool,
  pub participant_count: i64,
  pub consensus_ids:     String,
  pub bridge_ids:        String,
  pub divisive_ids:      String,
  pub statement_stats:   String,
  pub vote_count:        i64,
}

impl RawAnalysis {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      analysis_id:       row.get(0)?,
      discussion_id:     row.get(1)?,
      computed_at:       row.get(2)?,
      cluster_count:     row.get(3)?,
      cluster_sizes:     row.get(4)?,
      silhouette:        row.get(5)?,
      low_confidence:    row.get(6)?,
      participant_count: row.get(7)?,
      consensus_ids:     row.get(8)?,
      bridge_ids:        row.get(9)?,
      divisive_ids:      row.get(10)?,
      statement_stats:   row.get(11)?,
      vote_count:        row.get(12)?,
    })
  }

  pub fn into_analysis(self) -> Result<ConsensusAnalysis> {
    let statement_stats: Vec<StatementStats> = serde_json::from_str(&self.statement_stats)?;
    Ok(ConsensusAnalysis {
      analysis_id: decode_uuid(&self.analysis_id)?,
      discussion_id: decode_uuid(&self.discussion_id)?,
      computed_at: decode_dt(&self.computed_at)?,
      cluster_count: self.cluster_count as usize,
      cluster_sizes: serde_json::from_str(&self.cluster_sizes)?,
      silhouette: self.silhouette,
      low_confidence: self.low_confidence,
      participant_count: self.participant_count as usize,
      consensus: serde_json::from_str(&self.consensus_ids)?,
      bridges: serde_json::from_str(&self.bridge_ids)?,
      divisive: serde_json::from_str(&self.divisive_ids)?,
      statement_stats,
      vote_count: self.vote_count as u64,
    })
  }
}

/// Encoded column values for inserting an analysis row.
pub struct EncodedAnalysis {
  pub analysis_id:       String,
  pub discussion_id:     String,
  pub computed_at:       String,
  pub cluster_count:     i64,
  pub cluster_sizes:     String,
  pub silhouette:        f64,
  pub low_confidence:    bool,
  pub participant_count: i64,
  pub consensus_ids:     String,
  pub bridge_ids:        String,
  pub divisive_ids:      String,
  pub statement_stats:   String,
  pub vote_count:        i64,
}

impl EncodedAnalysis {
  pub fn encode(a: &ConsensusAnalysis) -> Result<Self> {
    Ok(Self {
      analysis_id:       encode_uuid(a.analysis_id),
      discussion_id:     encode_uuid(a.discussion_id),
      computed_at:       encode_dt(a.computed_at),
      cluster_count:     a.cluster_count as i64,
      cluster_sizes:     serde_json::to_string(&a.cluster_sizes)?,
      silhouette:        a.silhouette,
      low_confidence:    a.low_confidence,
      participant_count: a.participant_count as i64,
      consensus_ids:     serde_json::to_string(&a.consensus)?,
      bridge_ids:        serde_json::to_string(&a.bridges)?,
      divisive_ids:      serde_json::to_string(&a.divisive)?,
      statement_stats:   serde_json::to_string(&a.statement_stats)?,
      vote_count:        a.vote_count as i64,
    })
  }
}
