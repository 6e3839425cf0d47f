//! Subcommands and their dispatch.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use concord_analysis::{AnalysisCache, RefreshOutcome};
use concord_core::{
  ranking::{SortOrder, StatementScores},
  statement::{ModerationStatus, NewStatement, StatementKind},
  store::{DiscussionStore, StatementQuery},
  vote::{NewVote, VoteConfidence, VoteValue},
};
use concord_store_sqlite::SqliteStore;
use serde_json::{Value, json, to_value};
use uuid::Uuid;

// ─── Arguments ────────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create, edit, show or remove statements.
  #[command(subcommand)]
  Statement(StatementCommand),

  /// Cast or change a vote.
  Vote {
    statement:   Uuid,
    #[arg(long)]
    participant: Uuid,
    /// agree, disagree, unsure (or pass), or 1 / -1 / 0.
    #[arg(allow_hyphen_values = true)]
    value:       VoteValue,
    /// Self-reported certainty, 1 to 5.
    #[arg(long)]
    confidence:  Option<i64>,
  },

  /// List every vote on a statement.
  Votes { statement: Uuid },

  /// Flag a statement for review.
  Flag {
    statement: Uuid,
    #[arg(long)]
    reporter:  Uuid,
    #[arg(long)]
    reason:    Option<String>,
  },

  /// List the flags raised on a statement.
  Flags { statement: Uuid },

  /// Record a moderation decision. Rejecting hides the statement.
  Moderate { statement: Uuid, status: Moderation },

  /// List a discussion's statements in ranked order.
  List {
    discussion:      Uuid,
    /// progressive, best, controversial, recent or most_voted.
    #[arg(long, default_value = "progressive")]
    sort:            SortOrder,
    #[arg(long, default_value_t = 0)]
    page:            usize,
    #[arg(long, default_value_t = 50)]
    per_page:        usize,
    #[arg(long)]
    include_pending: bool,
  },

  /// Show the opinion-group analysis, recomputing it if stale.
  Analyze {
    discussion: Uuid,
    /// Recompute even if the current analysis is fresh.
    #[arg(long)]
    force:      bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum StatementCommand {
  Add {
    #[arg(long)]
    discussion: Uuid,
    #[arg(long)]
    author:     Uuid,
    text:       String,
    /// Record the statement as a question rather than a claim.
    #[arg(long)]
    question:   bool,
    /// Mark as seeded by the discussion's host.
    #[arg(long)]
    seed:       bool,
  },
  Edit {
    statement: Uuid,
    #[arg(long)]
    editor:    Uuid,
    text:      String,
  },
  Remove {
    statement: Uuid,
    #[arg(long)]
    requester: Uuid,
  },
  Show { statement: Uuid },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Moderation {
  Pending,
  Approved,
  Rejected,
}

impl From<Moderation> for ModerationStatus {
  fn from(m: Moderation) -> Self {
    match m {
      Moderation::Pending => Self::Pending,
      Moderation::Approved => Self::Approved,
      Moderation::Rejected => Self::Rejected,
    }
  }
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

pub async fn run(command: Command, cache: &AnalysisCache<SqliteStore>) -> Result<Value> {
  let store = cache.store();

  let out = match command {
    Command::Statement(cmd) => statement(cmd, store).await?,

    Command::Vote { statement, participant, value, confidence } => {
      let mut vote = NewVote::new(participant, statement, value);
      vote.confidence = confidence.map(VoteConfidence::try_from).transpose()?;
      to_value(store.cast_vote(vote).await?)?
    }

    Command::Votes { statement } => to_value(store.votes_for_statement(statement).await?)?,

    Command::Flag { statement, reporter, reason } => {
      to_value(store.flag_statement(statement, reporter, reason).await?)?
    }

    Command::Flags { statement } => to_value(store.flags_for_statement(statement).await?)?,

    Command::Moderate { statement, status } => {
      to_value(store.set_moderation(statement, status.into()).await?)?
    }

    Command::List { discussion, sort, page, per_page, include_pending } => {
      let query = StatementQuery { sort, page, per_page, include_pending };
      let ranking = &cache.config().ranking;
      let listed = store.list_statements(discussion, &query).await?;
      Value::Array(
        listed
          .into_iter()
          .map(|s| {
            let scores = StatementScores::of(&s.counts, ranking);
            json!({ "statement": s, "scores": scores })
          })
          .collect(),
      )
    }

    Command::Analyze { discussion, force } => {
      let analysis = if force {
        match cache.refresh_now(discussion).await? {
          RefreshOutcome::Refreshed(analysis) => Some(analysis),
          RefreshOutcome::Skipped => {
            tracing::warn!(%discussion, "another analysis is running");
            cache.current(discussion).await?
          }
        }
      } else {
        Some(cache.get_or_refresh_analysis(discussion).await?)
      };
      to_value(analysis)?
    }
  };

  Ok(out)
}

async fn statement(cmd: StatementCommand, store: &SqliteStore) -> Result<Value> {
  let out = match cmd {
    StatementCommand::Add { discussion, author, text, question, seed } => {
      let mut input = NewStatement::new(discussion, author, text);
      if question {
        input.kind = StatementKind::Question;
      }
      input.is_seed = seed;
      to_value(store.create_statement(input).await?)?
    }
    StatementCommand::Edit { statement, editor, text } => {
      to_value(store.edit_statement(statement, editor, text).await?)?
    }
    StatementCommand::Remove { statement, requester } => {
      to_value(store.remove_statement(statement, requester).await?)?
    }
    StatementCommand::Show { statement } => to_value(store.get_statement(statement).await?)?,
  };
  Ok(out)
}
