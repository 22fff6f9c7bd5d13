use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// Job identifier, BIGSERIAL-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states for a booking.
///
/// `Created` and `Reopened` are entry states: the job exists but has not yet
/// been offered. Opening moves it onto the offer board, acceptance assigns
/// it, and `Ended`/`Cancelled` are terminal. A reopen never resurrects a
/// terminal record; it produces a fresh job in `Reopened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Open,
    Assigned,
    InProgress,
    Ended,
    Cancelled,
    Reopened,
}

impl JobStatus {
    pub const ACTIVE: &'static [JobStatus] = &[
        JobStatus::Created,
        JobStatus::Open,
        JobStatus::Reopened,
        JobStatus::Assigned,
        JobStatus::InProgress,
    ];

    pub const TERMINAL: &'static [JobStatus] = &[JobStatus::Ended, JobStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Open => "open",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Ended => "ended",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Reopened => "reopened",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ended | JobStatus::Cancelled)
    }

    /// Legal single-step transitions. Everything not listed here is rejected
    /// before any write is attempted.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Open) | (Reopened, Open) => true,
            (Open, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Ended) => true,
            // Customer no-show closes an assigned session that never started.
            (Assigned, Ended) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "open" => Ok(JobStatus::Open),
            "assigned" => Ok(JobStatus::Assigned),
            "in_progress" => Ok(JobStatus::InProgress),
            "ended" => Ok(JobStatus::Ended),
            "cancelled" => Ok(JobStatus::Cancelled),
            "reopened" => Ok(JobStatus::Reopened),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source and target language of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

impl LanguagePair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        LanguagePair {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn involves(&self, language: &str) -> bool {
        self.from == language || self.to == language
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

/// When an offer created at `created_at` stops being acceptable.
pub fn offer_expires_at(created_at: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    created_at + Duration::minutes(window_minutes)
}

/// A booking record as the store returns it. Travel metadata
/// (`distance_km`, `travel_time_minutes`) lives in a separate table and is
/// merged in on read.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub customer: UserId,
    /// Set exactly while the job is Assigned or InProgress.
    pub assigned_translator: Option<UserId>,
    /// The translator released by end, no-show or cancellation.
    pub previous_translator: Option<UserId>,
    pub language_pair: LanguagePair,
    pub certified_required: bool,
    pub due: DateTime<Utc>,
    pub duration_minutes: i32,
    pub distance_km: Option<f64>,
    pub travel_time_minutes: Option<i32>,
    pub session_time_minutes: Option<i32>,
    pub customer_no_show: bool,
    pub timed_out: bool,
    pub flagged: bool,
    pub manually_handled: bool,
    pub by_admin: bool,
    pub admin_comments: Option<String>,
    pub reopened_from: Option<JobId>,
    pub expires_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the job can still be accepted at `now`.
    pub fn offer_open(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Open && self.expires_at > now
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.due + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Two sessions collide when their [due, due + duration) windows
    /// intersect.
    pub fn overlaps(&self, other: &Job) -> bool {
        self.due < other.end_time() && other.due < self.end_time()
    }

    pub fn is_assigned_to(&self, translator: UserId) -> bool {
        self.assigned_translator == Some(translator)
    }

    /// Assigned now, or released from this job by end/no-show/cancel.
    pub fn involves_translator(&self, translator: UserId) -> bool {
        self.assigned_translator == Some(translator)
            || self.previous_translator == Some(translator)
    }
}

/// Draft accepted by the store, which assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub status: JobStatus,
    pub customer: UserId,
    pub language_pair: LanguagePair,
    pub certified_required: bool,
    pub due: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reopened_from: Option<JobId>,
    pub expires_at: DateTime<Utc>,
}

/// Travel metadata keyed by job, written only through the distance feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Distance {
    pub distance_km: Option<f64>,
    pub travel_time_minutes: Option<i32>,
}
