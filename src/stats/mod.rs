//! Aggregation engine: turns the full, possibly redundant vote log into a
//! ranked candidate leaderboard.
//!
//! Everything here is pure over in-memory rows; `voting_statistics` is the
//! store-backed entry point. An empty vote table yields the all-zero
//! statistics value, while a storage failure propagates as an error, so
//! callers can tell "no data yet" apart from "computation failed".

use log::debug;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::config;
use crate::db::Database;
use crate::error::StoreError;
use crate::models::{CandidateStats, VoteRecord, VotingSession, VotingStatistics};

/// True when `candidate` should replace `kept` under latest-wins
/// resolution: strictly newer `updated_at`, or an exact timestamp tie
/// resolved toward the greater store-assigned row id.
fn supersedes(candidate: &VoteRecord, kept: &VoteRecord) -> bool {
    match candidate.updated_at.cmp(&kept.updated_at) {
        Ordering::Greater => true,
        Ordering::Equal => candidate.id > kept.id,
        Ordering::Less => false,
    }
}

/// Collapse duplicate submissions: group by (voter_email, candidate_id) and
/// keep only the latest row per pair. The result is sorted by
/// (voter_email, candidate_id) so downstream grouping is deterministic.
pub fn latest_votes(votes: Vec<VoteRecord>) -> Vec<VoteRecord> {
    let mut latest: BTreeMap<(String, String), VoteRecord> = BTreeMap::new();
    for vote in votes {
        let key = (vote.voter_email.clone(), vote.candidate_id.clone());
        match latest.get(&key) {
            Some(kept) if !supersedes(&vote, kept) => {}
            _ => {
                latest.insert(key, vote);
            }
        }
    }
    latest.into_values().collect()
}

/// Weighted score of one non-abstained vote: for each configured aspect,
/// the stored raw score (matched by normalized aspect name) contributes
/// `raw * weight / 100`. Aspects missing from the score map contribute
/// nothing, and the sum is NOT renormalized for them, so an incomplete
/// ballot totals lower than a full one.
pub fn weighted_score(vote: &VoteRecord) -> f64 {
    let mut total = 0.0;
    for aspect in &config::ASPECTS {
        let wanted = config::normalize_aspect(aspect.name);
        // Keys are normalized at write time; normalize again here so rows
        // written before that convention still match. Smallest original key
        // wins if several collapse to the same name.
        let matched = vote
            .aspect_scores
            .iter()
            .filter(|(key, _)| config::normalize_aspect(key) == wanted)
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, value)| *value);

        if let Some(raw) = matched {
            let raw = if raw.is_finite() && raw > 0.0 { raw } else { 0.0 };
            total += raw * f64::from(aspect.weight) / 100.0;
        }
    }
    total
}

/// Per-candidate statistics plus voter and session counts over an
/// already-fetched vote log. Candidates come back ranked by descending
/// summed score (absent treated as 0), ties broken by candidate id.
pub fn compute_statistics(
    votes: Vec<VoteRecord>,
    sessions: &[VotingSession],
) -> VotingStatistics {
    if votes.is_empty() {
        return VotingStatistics::empty();
    }

    let valid = latest_votes(votes);

    // A registered voter who cast no vote does not count.
    let voters: HashSet<&str> = valid.iter().map(|vote| vote.voter_email.as_str()).collect();

    let mut per_candidate: BTreeMap<String, CandidateStats> = BTreeMap::new();
    for vote in &valid {
        let stats = per_candidate
            .entry(vote.candidate_id.clone())
            .or_insert_with(|| CandidateStats {
                candidate_id: vote.candidate_id.clone(),
                total_votes: 0,
                valid_votes: 0,
                abstained_votes: 0,
                scores: Vec::new(),
                average_score: None,
            });

        stats.total_votes += 1;
        if vote.is_abstained {
            stats.abstained_votes += 1;
        } else {
            stats.valid_votes += 1;
            let score = weighted_score(vote);
            // Only non-zero per-vote totals are retained.
            if score > 0.0 {
                stats.scores.push(score);
            }
        }
    }

    let mut candidate_stats: Vec<CandidateStats> = per_candidate
        .into_values()
        .map(|mut stats| {
            if !stats.scores.is_empty() {
                stats.average_score = Some(stats.scores.iter().sum());
            }
            stats
        })
        .collect();

    candidate_stats.sort_by(|a, b| {
        let left = b.average_score.unwrap_or(0.0);
        let right = a.average_score.unwrap_or(0.0);
        left.partial_cmp(&right)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    let complete_votes = sessions.iter().filter(|s| s.is_complete).count() as u64;
    let partial_votes = sessions.len() as u64 - complete_votes;

    VotingStatistics {
        total_voters: voters.len() as u64,
        complete_votes,
        partial_votes,
        candidate_stats,
    }
}

/// Read the full vote and session sets from the store and derive the
/// leaderboard.
pub async fn voting_statistics(database: &Database) -> Result<VotingStatistics, StoreError> {
    let votes = database.get_all_votes().await?;
    if votes.is_empty() {
        debug!("no votes recorded yet, returning empty statistics");
        return Ok(VotingStatistics::empty());
    }
    let sessions = database.get_all_sessions().await?;
    Ok(compute_statistics(votes, &sessions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn vote(
        id: i64,
        email: &str,
        candidate: &str,
        scores: &[(&str, f64)],
        abstained: bool,
        at: DateTime<Utc>,
    ) -> VoteRecord {
        let aspect_scores: HashMap<String, f64> = scores
            .iter()
            .map(|(name, value)| (config::normalize_aspect(name), *value))
            .collect();
        VoteRecord {
            id,
            voter_email: email.to_string(),
            candidate_id: candidate.to_string(),
            aspect_scores,
            is_abstained: abstained,
            is_partial: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn full_ballot(value: f64) -> Vec<(&'static str, f64)> {
        config::ASPECTS.iter().map(|a| (a.name, value)).collect()
    }

    fn session(id: i64, email: &str, complete: bool) -> VotingSession {
        VotingSession {
            id,
            voter_email: email.to_string(),
            is_complete: complete,
            abstained_candidates: Vec::new(),
            total_candidates: 24,
            completed_candidates: if complete { 24 } else { 3 },
            created_at: ts(0),
            updated_at: ts(0),
        }
    }

    #[test]
    fn full_perfect_ballot_scores_exactly_one_hundred() {
        let v = vote(1, "a@b.id", "Suherno", &full_ballot(100.0), false, ts(0));
        assert_eq!(weighted_score(&v), 100.0);
    }

    #[test]
    fn missing_aspect_lowers_total_without_renormalization() {
        let full = vote(1, "a@b.id", "Suherno", &full_ballot(80.0), false, ts(0));
        let mut partial_scores = full_ballot(80.0);
        partial_scores.retain(|(name, _)| *name != "Kerjasama");
        let partial = vote(2, "a@b.id", "Suherno", &partial_scores, false, ts(0));

        let full_score = weighted_score(&full);
        let partial_score = weighted_score(&partial);
        assert!(partial_score < full_score);
        // The dropped aspect carries weight 10, so exactly 80 * 0.10 is lost.
        assert!((full_score - partial_score - 8.0).abs() < 1e-9);
    }

    #[test]
    fn mixed_case_keys_score_like_canonical_keys() {
        let mut shouty = HashMap::new();
        shouty.insert("KEJUJURAN".to_string(), 80.0);
        shouty.insert("loyalitas".to_string(), 60.0);
        let v = VoteRecord {
            aspect_scores: shouty,
            ..vote(1, "a@b.id", "Suherno", &[], false, ts(0))
        };
        let canonical = vote(
            2,
            "a@b.id",
            "Suherno",
            &[("Kejujuran", 80.0), ("Loyalitas", 60.0)],
            false,
            ts(0),
        );
        assert_eq!(weighted_score(&v), weighted_score(&canonical));
    }

    #[test]
    fn unknown_aspect_keys_contribute_nothing() {
        let v = vote(
            1,
            "a@b.id",
            "Suherno",
            &[("Kejujuran", 50.0), ("Ketepatan waktu", 90.0)],
            false,
            ts(0),
        );
        assert_eq!(weighted_score(&v), 50.0 * 15.0 / 100.0);
    }

    #[test]
    fn dedup_keeps_latest_row_per_pair() {
        let votes = vec![
            vote(1, "a@b.id", "Suherno", &full_ballot(10.0), false, ts(0)),
            vote(2, "a@b.id", "Suherno", &full_ballot(90.0), false, ts(5)),
            vote(3, "a@b.id", "Roberto", &full_ballot(40.0), false, ts(1)),
        ];
        let kept = latest_votes(votes);
        assert_eq!(kept.len(), 2);
        let suherno = kept.iter().find(|v| v.candidate_id == "Suherno").unwrap();
        assert_eq!(suherno.id, 2);
    }

    #[test]
    fn dedup_timestamp_tie_resolves_to_greater_row_id() {
        let votes = vec![
            vote(7, "a@b.id", "Suherno", &full_ballot(10.0), false, ts(3)),
            vote(4, "a@b.id", "Suherno", &full_ballot(90.0), false, ts(3)),
        ];
        let kept = latest_votes(votes);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 7);
    }

    #[test]
    fn only_abstained_votes_means_no_score() {
        let votes = vec![
            vote(1, "a@b.id", "Ratwi", &[], true, ts(0)),
            vote(2, "c@d.id", "Ratwi", &full_ballot(0.0), true, ts(0)),
        ];
        let stats = compute_statistics(votes, &[]);
        assert_eq!(stats.candidate_stats.len(), 1);
        let ratwi = &stats.candidate_stats[0];
        assert_eq!(ratwi.total_votes, 2);
        assert_eq!(ratwi.abstained_votes, 2);
        assert_eq!(ratwi.valid_votes, 0);
        assert_eq!(ratwi.average_score, None);
    }

    #[test]
    fn abstained_scores_are_ignored_even_when_present() {
        let votes = vec![vote(
            1,
            "a@b.id",
            "Ratwi",
            &full_ballot(100.0),
            true,
            ts(0),
        )];
        let stats = compute_statistics(votes, &[]);
        assert_eq!(stats.candidate_stats[0].average_score, None);
        assert!(stats.candidate_stats[0].scores.is_empty());
    }

    #[test]
    fn average_score_is_a_sum_across_voters() {
        let votes = vec![
            vote(1, "a@b.id", "Suherno", &full_ballot(100.0), false, ts(0)),
            vote(2, "c@d.id", "Suherno", &full_ballot(50.0), false, ts(0)),
        ];
        let stats = compute_statistics(votes, &[]);
        let suherno = &stats.candidate_stats[0];
        assert_eq!(suherno.scores.len(), 2);
        assert_eq!(suherno.average_score, Some(150.0));
    }

    #[test]
    fn ranking_is_descending_with_id_tiebreak() {
        let votes = vec![
            vote(1, "a@b.id", "Roberto", &full_ballot(40.0), false, ts(0)),
            vote(2, "a@b.id", "Suherno", &full_ballot(90.0), false, ts(0)),
            vote(3, "a@b.id", "Lisnawati", &full_ballot(90.0), false, ts(0)),
            vote(4, "a@b.id", "Ratwi", &[], true, ts(0)),
        ];
        let stats = compute_statistics(votes, &[]);
        let order: Vec<&str> = stats
            .candidate_stats
            .iter()
            .map(|s| s.candidate_id.as_str())
            .collect();
        assert_eq!(order, vec!["Lisnawati", "Suherno", "Roberto", "Ratwi"]);
        for pair in stats.candidate_stats.windows(2) {
            assert!(
                pair[0].average_score.unwrap_or(0.0) >= pair[1].average_score.unwrap_or(0.0)
            );
        }
    }

    #[test]
    fn total_voters_counts_distinct_emails_after_dedup() {
        let votes = vec![
            vote(1, "a@b.id", "Suherno", &full_ballot(50.0), false, ts(0)),
            vote(2, "a@b.id", "Suherno", &full_ballot(70.0), false, ts(1)),
            vote(3, "a@b.id", "Roberto", &full_ballot(30.0), false, ts(0)),
            vote(4, "c@d.id", "Suherno", &full_ballot(20.0), false, ts(0)),
        ];
        let stats = compute_statistics(votes, &[]);
        assert_eq!(stats.total_voters, 2);
    }

    #[test]
    fn session_counts_are_independent_of_voter_counts() {
        let votes = vec![vote(
            1,
            "a@b.id",
            "Suherno",
            &full_ballot(50.0),
            false,
            ts(0),
        )];
        let sessions = vec![
            session(1, "a@b.id", true),
            session(2, "x@y.id", false),
            session(3, "z@w.id", false),
        ];
        let stats = compute_statistics(votes, &sessions);
        assert_eq!(stats.total_voters, 1);
        assert_eq!(stats.complete_votes, 1);
        assert_eq!(stats.partial_votes, 2);
    }

    #[test]
    fn empty_vote_log_yields_the_all_zero_value() {
        let stats = compute_statistics(Vec::new(), &[session(1, "a@b.id", true)]);
        assert_eq!(stats, VotingStatistics::empty());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "totalVoters": 0,
                "completeVotes": 0,
                "partialVotes": 0,
                "candidateStats": []
            })
        );
    }

    #[test]
    fn zero_score_ballots_are_not_retained() {
        let votes = vec![vote(
            1,
            "a@b.id",
            "Suherno",
            &full_ballot(0.0),
            false,
            ts(0),
        )];
        let stats = compute_statistics(votes, &[]);
        let suherno = &stats.candidate_stats[0];
        assert_eq!(suherno.valid_votes, 1);
        assert!(suherno.scores.is_empty());
        assert_eq!(suherno.average_score, None);
    }
}
