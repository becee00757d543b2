use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{BallotEntry, SessionSummary, VoteRecord, Voter, VotingSession};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect using `DATABASE_URL` from the environment, or a local file
    /// default.
    pub async fn new() -> Result<Self, StoreError> {
        let db_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:kotak_suara.db".to_string());
        Self::connect(&db_url).await
    }

    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection, since every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                voter_email TEXT NOT NULL,
                candidate_id TEXT NOT NULL,
                aspect_scores TEXT NOT NULL,
                is_abstained BOOLEAN NOT NULL DEFAULT FALSE,
                is_partial BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (voter_email) REFERENCES voters(email) ON DELETE CASCADE,
                UNIQUE(voter_email, candidate_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voting_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                voter_email TEXT NOT NULL,
                is_complete BOOLEAN NOT NULL DEFAULT FALSE,
                abstained_candidates TEXT NOT NULL DEFAULT '[]',
                total_candidates INTEGER NOT NULL DEFAULT 0,
                completed_candidates INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (voter_email) REFERENCES voters(email) ON DELETE CASCADE,
                UNIQUE(voter_email)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Create or update a voter. Email is the conflict key, so a repeat
    /// registration with the same email updates the display name in place.
    pub async fn upsert_voter(&self, name: &str, email: &str) -> Result<Voter, StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_voter_on(&mut conn, name, email).await
    }

    /// Idempotent vote write: overwrites any existing row for the same
    /// (voter_email, candidate_id) pair and bumps `updated_at`, which the
    /// aggregation engine later uses for latest-wins resolution.
    pub async fn upsert_vote(
        &self,
        voter_email: &str,
        candidate_id: &str,
        aspect_scores: &HashMap<String, f64>,
        is_abstained: bool,
        is_partial: bool,
    ) -> Result<VoteRecord, StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_vote_on(
            &mut conn,
            voter_email,
            candidate_id,
            aspect_scores,
            is_abstained,
            is_partial,
        )
        .await
    }

    /// Upsert the voter's session and align the `is_partial` flag on all of
    /// their existing vote rows, in one transaction.
    pub async fn upsert_session(
        &self,
        voter_email: &str,
        summary: &SessionSummary,
    ) -> Result<VotingSession, StoreError> {
        let mut tx = self.pool.begin().await?;
        let session = upsert_session_on(&mut tx, voter_email, summary).await?;
        tx.commit().await?;
        Ok(session)
    }

    /// Persist a full ballot submission: every vote row, the session row,
    /// and the bulk `is_partial` update, as a single transaction. A failure
    /// partway through rolls the whole submission back.
    pub async fn submit_ballot(
        &self,
        voter_email: &str,
        entries: &[BallotEntry],
        summary: &SessionSummary,
    ) -> Result<(Vec<VoteRecord>, VotingSession), StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut votes = Vec::with_capacity(entries.len());
        for entry in entries {
            let vote = upsert_vote_on(
                &mut tx,
                voter_email,
                &entry.candidate_id,
                &entry.aspect_scores,
                entry.is_abstained,
                entry.is_partial,
            )
            .await?;
            votes.push(vote);
        }

        let session = upsert_session_on(&mut tx, voter_email, summary).await?;
        tx.commit().await?;

        // The bulk flag update ran before the vote rows were re-read, so
        // refresh the returned copies.
        for vote in &mut votes {
            vote.is_partial = summary.is_partial;
        }

        Ok((votes, session))
    }

    pub async fn get_voter(&self, email: &str) -> Result<Option<Voter>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM voters
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| voter_from_row(&r)).transpose()
    }

    pub async fn get_voter_votes(&self, voter_email: &str) -> Result<Vec<VoteRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, voter_email, candidate_id, aspect_scores, is_abstained, is_partial, created_at, updated_at
            FROM votes
            WHERE voter_email = ?
            "#,
        )
        .bind(voter_email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    /// Unbounded scan of the whole vote log.
    pub async fn get_all_votes(&self) -> Result<Vec<VoteRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, voter_email, candidate_id, aspect_scores, is_abstained, is_partial, created_at, updated_at
            FROM votes
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    pub async fn get_candidate_votes(
        &self,
        candidate_id: &str,
    ) -> Result<Vec<VoteRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, voter_email, candidate_id, aspect_scores, is_abstained, is_partial, created_at, updated_at
            FROM votes
            WHERE candidate_id = ?
            "#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    pub async fn get_session(
        &self,
        voter_email: &str,
    ) -> Result<Option<VotingSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, voter_email, is_complete, abstained_candidates, total_candidates, completed_candidates, created_at, updated_at
            FROM voting_sessions
            WHERE voter_email = ?
            "#,
        )
        .bind(voter_email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| session_from_row(&r)).transpose()
    }

    pub async fn get_all_sessions(&self) -> Result<Vec<VotingSession>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, voter_email, is_complete, abstained_candidates, total_candidates, completed_candidates, created_at, updated_at
            FROM voting_sessions
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }
}

async fn upsert_voter_on(
    conn: &mut SqliteConnection,
    name: &str,
    email: &str,
) -> Result<Voter, StoreError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO voters (name, email, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(email) DO UPDATE SET
            name = excluded.name,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT id, name, email, created_at, updated_at
        FROM voters
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_one(&mut *conn)
    .await?;

    voter_from_row(&row)
}

async fn upsert_vote_on(
    conn: &mut SqliteConnection,
    voter_email: &str,
    candidate_id: &str,
    aspect_scores: &HashMap<String, f64>,
    is_abstained: bool,
    is_partial: bool,
) -> Result<VoteRecord, StoreError> {
    let now = Utc::now().to_rfc3339();
    let scores_json = serde_json::to_string(aspect_scores)?;

    sqlx::query(
        r#"
        INSERT INTO votes (voter_email, candidate_id, aspect_scores, is_abstained, is_partial, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(voter_email, candidate_id) DO UPDATE SET
            aspect_scores = excluded.aspect_scores,
            is_abstained = excluded.is_abstained,
            is_partial = excluded.is_partial,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(voter_email)
    .bind(candidate_id)
    .bind(&scores_json)
    .bind(is_abstained)
    .bind(is_partial)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT id, voter_email, candidate_id, aspect_scores, is_abstained, is_partial, created_at, updated_at
        FROM votes
        WHERE voter_email = ? AND candidate_id = ?
        "#,
    )
    .bind(voter_email)
    .bind(candidate_id)
    .fetch_one(&mut *conn)
    .await?;

    vote_from_row(&row)
}

async fn upsert_session_on(
    conn: &mut SqliteConnection,
    voter_email: &str,
    summary: &SessionSummary,
) -> Result<VotingSession, StoreError> {
    let now = Utc::now().to_rfc3339();
    let abstained_json = serde_json::to_string(&summary.abstained_candidates)?;

    sqlx::query(
        r#"
        INSERT INTO voting_sessions (voter_email, is_complete, abstained_candidates, total_candidates, completed_candidates, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(voter_email) DO UPDATE SET
            is_complete = excluded.is_complete,
            abstained_candidates = excluded.abstained_candidates,
            total_candidates = excluded.total_candidates,
            completed_candidates = excluded.completed_candidates,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(voter_email)
    .bind(summary.is_complete)
    .bind(&abstained_json)
    .bind(summary.total_candidates)
    .bind(summary.completed_candidates)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    // Keep every existing vote row's partial flag aligned with the session.
    sqlx::query(
        r#"
        UPDATE votes
        SET is_partial = ?
        WHERE voter_email = ?
        "#,
    )
    .bind(summary.is_partial)
    .bind(voter_email)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT id, voter_email, is_complete, abstained_candidates, total_candidates, completed_candidates, created_at, updated_at
        FROM voting_sessions
        WHERE voter_email = ?
        "#,
    )
    .bind(voter_email)
    .fetch_one(&mut *conn)
    .await?;

    session_from_row(&row)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn voter_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Voter, StoreError> {
    Ok(Voter {
        id: row.get::<i64, _>("id"),
        name: row.get::<String, _>("name"),
        email: row.get::<String, _>("email"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn vote_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VoteRecord, StoreError> {
    let scores_json = row.get::<String, _>("aspect_scores");
    Ok(VoteRecord {
        id: row.get::<i64, _>("id"),
        voter_email: row.get::<String, _>("voter_email"),
        candidate_id: row.get::<String, _>("candidate_id"),
        aspect_scores: serde_json::from_str(&scores_json)?,
        is_abstained: row.get::<bool, _>("is_abstained"),
        is_partial: row.get::<bool, _>("is_partial"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VotingSession, StoreError> {
    let abstained_json = row.get::<String, _>("abstained_candidates");
    Ok(VotingSession {
        id: row.get::<i64, _>("id"),
        voter_email: row.get::<String, _>("voter_email"),
        is_complete: row.get::<bool, _>("is_complete"),
        abstained_candidates: serde_json::from_str(&abstained_json)?,
        total_candidates: row.get::<i64, _>("total_candidates"),
        completed_candidates: row.get::<i64, _>("completed_candidates"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}
