//! Transport-agnostic request surface: the operations the voting pages call,
//! with input validation up front. Validation failures never touch the
//! store; store failures propagate to the caller.

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::HashMap;

use crate::config;
use crate::db::Database;
use crate::error::VoteError;
use crate::models::{
    BallotEntry, BallotReceipt, CandidateVoter, SessionSummary, VoteRecord, Voter, VoterBallot,
    VotingStatistics,
};
use crate::stats;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

fn require_email(email: &str) -> Result<&str, VoteError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(VoteError::validation("email is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(VoteError::validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}

/// Register a voter, or refresh their display name on a repeat registration
/// with the same email.
pub async fn register_voter(
    database: &Database,
    name: &str,
    email: &str,
) -> Result<Voter, VoteError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VoteError::validation("name and email are required"));
    }
    let email = require_email(email)?;

    let voter = database.upsert_voter(name, email).await?;
    info!("registered voter {}", voter.email);
    Ok(voter)
}

/// Normalize an entry's score-mapping keys so aggregation can match them by
/// plain equality later. Rejects out-of-range scores and keys that collapse
/// to the same aspect name.
fn normalize_entry(entry: &BallotEntry) -> Result<BallotEntry, VoteError> {
    let candidate_id = entry.candidate_id.trim();
    if candidate_id.is_empty() {
        return Err(VoteError::validation("candidate id is required"));
    }

    let mut aspect_scores = HashMap::with_capacity(entry.aspect_scores.len());
    for (key, value) in &entry.aspect_scores {
        if !value.is_finite() || *value < 0.0 || *value > 100.0 {
            return Err(VoteError::validation(format!(
                "score {value} for aspect '{key}' is outside [0, 100]"
            )));
        }
        let normalized = config::normalize_aspect(key);
        if aspect_scores.insert(normalized, *value).is_some() {
            return Err(VoteError::validation(format!(
                "duplicate score entry for aspect '{key}'"
            )));
        }
    }

    Ok(BallotEntry {
        candidate_id: candidate_id.to_string(),
        aspect_scores,
        is_abstained: entry.is_abstained,
        is_partial: entry.is_partial,
    })
}

/// Submit or update a voter's ballot: the vote rows, the session row, and
/// the partial-flag alignment are persisted as one transactional unit.
pub async fn submit_ballot(
    database: &Database,
    email: &str,
    entries: &[BallotEntry],
    summary: &SessionSummary,
) -> Result<BallotReceipt, VoteError> {
    let email = require_email(email)?;
    if entries.is_empty() {
        return Err(VoteError::validation("votes and session data are required"));
    }

    let normalized: Vec<BallotEntry> = entries
        .iter()
        .map(normalize_entry)
        .collect::<Result<_, _>>()?;

    let (votes, session) = database.submit_ballot(email, &normalized, summary).await?;
    info!(
        "stored ballot for {} ({} votes, complete={})",
        email,
        votes.len(),
        session.is_complete
    );
    Ok(BallotReceipt { votes, session })
}

/// A voter's own stored votes together with their session, if any.
pub async fn voter_ballot(database: &Database, email: &str) -> Result<VoterBallot, VoteError> {
    let email = require_email(email)?;
    let votes = database.get_voter_votes(email).await?;
    let session = database.get_session(email).await?;
    Ok(VoterBallot { votes, session })
}

pub async fn all_votes(database: &Database) -> Result<Vec<VoteRecord>, VoteError> {
    Ok(database.get_all_votes().await?)
}

pub async fn candidate_votes(
    database: &Database,
    candidate_id: &str,
) -> Result<Vec<VoteRecord>, VoteError> {
    let candidate_id = candidate_id.trim();
    if candidate_id.is_empty() {
        return Err(VoteError::validation("candidate id is required"));
    }
    Ok(database.get_candidate_votes(candidate_id).await?)
}

/// Distinct voters who voted for a candidate: latest vote per voter,
/// enriched with the voter's display name.
pub async fn candidate_voters(
    database: &Database,
    candidate_id: &str,
) -> Result<Vec<CandidateVoter>, VoteError> {
    let candidate_id = candidate_id.trim();
    if candidate_id.is_empty() {
        return Err(VoteError::validation("candidate id is required"));
    }

    let votes = database.get_candidate_votes(candidate_id).await?;
    // All rows share one candidate, so pair-wise dedup reduces to one
    // latest vote per voter.
    let latest = stats::latest_votes(votes);

    let mut voters = Vec::with_capacity(latest.len());
    for vote in latest {
        let voter_name = match database.get_voter(&vote.voter_email).await? {
            Some(voter) => voter.name,
            None => {
                warn!("vote from unregistered voter {}", vote.voter_email);
                "Unknown".to_string()
            }
        };
        voters.push(CandidateVoter { vote, voter_name });
    }
    Ok(voters)
}

pub async fn statistics(database: &Database) -> Result<VotingStatistics, VoteError> {
    Ok(stats::voting_statistics(database).await?)
}
