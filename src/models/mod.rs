use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One voter's assessment of one candidate. Unique per
/// (voter_email, candidate_id); a later submission for the same pair
/// overwrites the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: i64,
    pub voter_email: String,
    pub candidate_id: String,
    /// Normalized aspect name -> raw score in [0, 100]. Ignored by
    /// aggregation when `is_abstained` is set, even if present.
    pub aspect_scores: HashMap<String, f64>,
    pub is_abstained: bool,
    pub is_partial: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per voter tracking ballot completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingSession {
    pub id: i64,
    pub voter_email: String,
    pub is_complete: bool,
    pub abstained_candidates: Vec<String>,
    pub total_candidates: i64,
    pub completed_candidates: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session state carried alongside a ballot submission. `is_partial` is
/// applied to every existing vote row of the voter when the session is
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub is_complete: bool,
    #[serde(default)]
    pub abstained_candidates: Vec<String>,
    pub total_candidates: i64,
    pub completed_candidates: i64,
    #[serde(default)]
    pub is_partial: bool,
}

/// One candidate's entry in a ballot submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotEntry {
    pub candidate_id: String,
    #[serde(default)]
    pub aspect_scores: HashMap<String, f64>,
    #[serde(default)]
    pub is_abstained: bool,
    #[serde(default)]
    pub is_partial: bool,
}

/// What a ballot submission persisted.
#[derive(Debug, Clone, Serialize)]
pub struct BallotReceipt {
    pub votes: Vec<VoteRecord>,
    pub session: VotingSession,
}

/// A voter's own stored ballot.
#[derive(Debug, Clone, Serialize)]
pub struct VoterBallot {
    pub votes: Vec<VoteRecord>,
    pub session: Option<VotingSession>,
}

/// A candidate's latest vote from one voter, enriched with the voter's
/// display name.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateVoter {
    #[serde(flatten)]
    pub vote: VoteRecord,
    pub voter_name: String,
}

/// Aggregated results for one candidate. `average_score` is, despite the
/// name, the SUM of the retained per-vote weighted scores; the field name is
/// kept for wire compatibility with the original results page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateStats {
    pub candidate_id: String,
    pub total_votes: u64,
    pub valid_votes: u64,
    pub abstained_votes: u64,
    pub scores: Vec<f64>,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStatistics {
    pub total_voters: u64,
    pub complete_votes: u64,
    pub partial_votes: u64,
    pub candidate_stats: Vec<CandidateStats>,
}

impl VotingStatistics {
    /// The all-zero value returned when the vote table is empty.
    pub fn empty() -> Self {
        Self {
            total_voters: 0,
            complete_votes: 0,
            partial_votes: 0,
            candidate_stats: Vec::new(),
        }
    }
}
