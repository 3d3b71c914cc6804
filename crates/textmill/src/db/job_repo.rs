//! Job repository: CRUD and status transitions for the `jobs` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::{truncate_error, JobFilter, JobStatus, ProcessingJob, TransitionMode};

const COLUMNS: &str = "id, original_location, result_location, status, error_message, attempts, \
                       created_at, updated_at";

const DEFAULT_LIMIT: u64 = 100;

/// A status change together with the fields that must change with it.
#[derive(Debug, Clone, Copy)]
pub enum Transition<'a> {
    /// Enter `processing`; clears any previous error.
    Start,
    /// Enter `done` with the location of the output.
    Complete { result_location: &'a str },
    /// Enter `failed`; the message is truncated before storing.
    Fail { error_message: &'a str },
}

impl Transition<'_> {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Processing,
            Transition::Complete { .. } => JobStatus::Done,
            Transition::Fail { .. } => JobStatus::Failed,
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(index: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, reason.into())
}

fn parse_timestamp(index: usize, value: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, format!("bad timestamp '{}': {}", value, e)))
}

fn job_from_row(row: &Row<'_>) -> Result<ProcessingJob, rusqlite::Error> {
    let status: String = row.get(3)?;
    Ok(ProcessingJob {
        id: row.get(0)?,
        original_location: row.get(1)?,
        result_location: row.get(2)?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        error_message: row.get(4)?,
        attempts: row.get(5)?,
        created_at: parse_timestamp(6, row.get(6)?)?,
        updated_at: parse_timestamp(7, row.get(7)?)?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> Result<Option<ProcessingJob>, DatabaseError> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], job_from_row)
        .optional()?)
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &ProcessingJob) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, original_location, result_location, status, error_message,
             attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id,
                job.original_location,
                job.result_location,
                job.status.as_str(),
                job.error_message,
                job.attempts,
                format_timestamp(&job.created_at),
                format_timestamp(&job.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ProcessingJob>, DatabaseError> {
    db.with_conn(|conn| select_by_id(conn, id))
}

/// Applies `transition` to job `id` if its current status allows it.
///
/// Status, error message, result location and `updated_at` are written by a
/// single `UPDATE` guarded on the current status, so concurrent writers can
/// never interleave partial updates. Returns the updated job, or `None` when
/// the job does not exist or is in a status the transition may not leave.
pub fn transition(
    db: &Database,
    id: &str,
    transition: Transition<'_>,
    mode: TransitionMode,
) -> Result<Option<ProcessingJob>, DatabaseError> {
    let target = transition.target();
    let sources = JobStatus::sources(target, mode);
    if sources.is_empty() {
        return Ok(None);
    }

    let (result_location, error_message, attempts_delta): (Option<&str>, Option<String>, u32) =
        match transition {
            Transition::Start => (None, None, 1),
            Transition::Complete { result_location } => (Some(result_location), None, 0),
            Transition::Fail { error_message } => (None, Some(truncate_error(error_message)), 0),
        };

    let placeholders: Vec<String> = (0..sources.len()).map(|i| format!("?{}", i + 7)).collect();
    let sql = format!(
        "UPDATE jobs SET status = ?1, result_location = ?2, error_message = ?3,
         attempts = attempts + ?4, updated_at = ?5
         WHERE id = ?6 AND status IN ({})",
        placeholders.join(", ")
    );

    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
        Box::new(target.as_str()),
        Box::new(result_location.map(str::to_string)),
        Box::new(error_message),
        Box::new(attempts_delta),
        Box::new(format_timestamp(&Utc::now())),
        Box::new(id.to_string()),
    ];
    values.extend(
        sources
            .iter()
            .map(|s| Box::new(s.as_str()) as Box<dyn rusqlite::types::ToSql>),
    );

    db.with_conn(|conn| {
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 {
            return Ok(None);
        }
        select_by_id(conn, id)
    })
}

/// Queries jobs with filters, newest first, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &JobFilter,
) -> Result<(Vec<ProcessingJob>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let (where_clause, status) = match filter.status {
            Some(status) => ("WHERE status = ?1", Some(status.as_str())),
            None => ("", None),
        };

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let total: u64 = conn.query_row(&count_sql, params_from_iter(status.iter()), |r| {
            r.get(0)
        })?;

        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        let next = if status.is_some() { 2 } else { 1 };
        let query_sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
            COLUMNS,
            where_clause,
            next,
            next + 1
        );

        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(status) = status {
            values.push(Box::new(status));
        }
        values.push(Box::new(limit));
        values.push(Box::new(offset));

        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
