//! Participant × statement vote matrix.
//!
//! A cell is `None` when the participant never voted on the statement.
//! `Some(VoteValue::Unsure)` is a cast vote and is kept distinct from
//! absence.

use std::collections::{BTreeSet, HashMap};

use concord_core::{analysis::VoteSnapshot, config::MatrixConfig, vote::VoteValue};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VoteMatrix {
  participants: Vec<Uuid>,
  statements:   Vec<Uuid>,
  /// Row-major, `participants.len() * statements.len()` cells.
  cells:        Vec<Option<VoteValue>>,
}

impl VoteMatrix {
  /// Rows are every participant with a vote in the snapshot, ordered by id;
  /// columns follow the snapshot's statement order.
  pub fn from_snapshot(snapshot: &VoteSnapshot) -> Self {
    let statements = snapshot.statement_ids.clone();
    let columns: HashMap<Uuid, usize> =
      statements.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let participants: Vec<Uuid> = snapshot
      .votes
      .iter()
      .filter(|v| columns.contains_key(&v.statement_id))
      .map(|v| v.participant_id)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    let rows: HashMap<Uuid, usize> =
      participants.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let width = statements.len();
    let mut cells = vec![None; participants.len() * width];
    for vote in &snapshot.votes {
      if let (Some(&r), Some(&c)) = (rows.get(&vote.participant_id), columns.get(&vote.statement_id)) {
        cells[r * width + c] = Some(vote.value);
      }
    }

    Self { participants, statements, cells }
  }

  pub fn participants(&self) -> &[Uuid] { &self.participants }

  pub fn statements(&self) -> &[Uuid] { &self.statements }

  pub fn rows(&self) -> usize { self.participants.len() }

  pub fn cols(&self) -> usize { self.statements.len() }

  pub fn get(&self, row: usize, col: usize) -> Option<VoteValue> {
    self.cells[row * self.cols() + col]
  }

  pub fn row(&self, row: usize) -> &[Option<VoteValue>] {
    let width = self.cols();
    &self.cells[row * width..(row + 1) * width]
  }

  /// Cast votes (including unsure) in a row.
  pub fn votes_in_row(&self, row: usize) -> usize {
    self.row(row).iter().filter(|c| c.is_some()).count()
  }

  /// Rows with at least `floor` cast votes, in row order.
  pub fn qualifying_rows(&self, floor: usize) -> Vec<usize> {
    (0..self.rows()).filter(|&r| self.votes_in_row(r) >= floor).collect()
  }
}

/// Votes a participant needs to be clustered: the configured floor, capped
/// at the number of statements so small discussions can still qualify.
pub fn participant_floor(config: &MatrixConfig, statement_count: usize) -> usize {
  config.min_votes_per_participant.min(statement_count).max(1)
}
