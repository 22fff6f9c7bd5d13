pub mod connection;
pub mod memory;
pub mod migrations;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Job, JobId, JobStatus, NewJob, User, UserId};
use crate::error::StoreError;

pub use memory::{MemoryJobStore, MemoryUserDirectory};
pub use postgres::{PgJobStore, PgUserDirectory};

/// Partial update for a job. `None` leaves the column alone; the nested
/// options on clearable fields distinguish "set to NULL" from "leave as is".
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub assigned_translator: Option<Option<UserId>>,
    pub previous_translator: Option<Option<UserId>>,
    pub language_pair: Option<crate::domain::LanguagePair>,
    pub certified_required: Option<bool>,
    pub due: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub session_time_minutes: Option<i32>,
    pub customer_no_show: Option<bool>,
    pub timed_out: Option<bool>,
    pub flagged: Option<bool>,
    pub manually_handled: Option<bool>,
    pub by_admin: Option<bool>,
    pub admin_comments: Option<Option<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// In-memory application, mirroring what the SQL stores do column by
    /// column. `updated_at` is always bumped.
    pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(assigned) = self.assigned_translator {
            job.assigned_translator = assigned;
        }
        if let Some(previous) = self.previous_translator {
            job.previous_translator = previous;
        }
        if let Some(pair) = &self.language_pair {
            job.language_pair = pair.clone();
        }
        if let Some(certified) = self.certified_required {
            job.certified_required = certified;
        }
        if let Some(due) = self.due {
            job.due = due;
        }
        if let Some(duration) = self.duration_minutes {
            job.duration_minutes = duration;
        }
        if let Some(session) = self.session_time_minutes {
            job.session_time_minutes = Some(session);
        }
        if let Some(no_show) = self.customer_no_show {
            job.customer_no_show = no_show;
        }
        if let Some(timed_out) = self.timed_out {
            job.timed_out = timed_out;
        }
        if let Some(flagged) = self.flagged {
            job.flagged = flagged;
        }
        if let Some(manually_handled) = self.manually_handled {
            job.manually_handled = manually_handled;
        }
        if let Some(by_admin) = self.by_admin {
            job.by_admin = by_admin;
        }
        if let Some(comments) = &self.admin_comments {
            job.admin_comments = comments.clone();
        }
        if let Some(started) = self.started_at {
            job.started_at = Some(started);
        }
        if let Some(expires) = self.expires_at {
            job.expires_at = expires;
        }
        job.updated_at = now;
    }
}

/// Result ordering for job queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobOrder {
    /// Soonest session first, id as the tiebreaker.
    #[default]
    DueAsc,
    /// Most recently created first, for history listings.
    NewestFirst,
}

/// Declarative job query. Every field narrows the result set.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub statuses: Option<Vec<JobStatus>>,
    pub customer: Option<UserId>,
    /// Matches jobs the translator is assigned to or was released from.
    pub translator: Option<UserId>,
    /// Matches either side of the language pair.
    pub language: Option<String>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    pub expires_before: Option<DateTime<Utc>>,
    pub order: JobOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    pub fn with_statuses(statuses: &[JobStatus]) -> Self {
        JobFilter {
            statuses: Some(statuses.to_vec()),
            ..Default::default()
        }
    }

    /// Predicate used by the in-memory store. The SQL stores express the
    /// same conditions as WHERE clauses.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&job.status) {
                return false;
            }
        }
        if let Some(customer) = self.customer {
            if job.customer != customer {
                return false;
            }
        }
        if let Some(translator) = self.translator {
            if !job.involves_translator(translator) {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if !job.language_pair.involves(language) {
                return false;
            }
        }
        if let Some(after) = self.due_after {
            if job.due < after {
                return false;
            }
        }
        if let Some(before) = self.due_before {
            if job.due > before {
                return false;
            }
        }
        if let Some(expires) = self.expires_before {
            if job.expires_at >= expires {
                return false;
            }
        }
        true
    }
}

/// Persistence port for bookings.
///
/// `conditional_update` is the only way status moves: it applies the patch
/// atomically when and only when the stored status still equals `expected`,
/// and reports `StoreError::Conflict` otherwise. Concurrent accepts resolve
/// here, first writer wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a draft and returns the stored job with its assigned id.
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Compare-and-swap update keyed on the current status.
    async fn conditional_update(
        &self,
        id: JobId,
        expected: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError>;

    /// Unconditional field update. Callers keep status changes out of the
    /// patch; those go through `conditional_update`.
    async fn update_fields(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError>;

    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;

    /// Writes travel metadata for a job, keeping any previously stored
    /// value whose replacement is absent.
    async fn upsert_distance(
        &self,
        job_id: JobId,
        distance_km: Option<f64>,
        travel_time_minutes: Option<i32>,
    ) -> Result<(), StoreError>;

    /// Records that a translator turned the offer down. Idempotent.
    async fn record_decline(&self, job_id: JobId, translator: UserId) -> Result<(), StoreError>;

    async fn declined_translators(&self, job_id: JobId) -> Result<Vec<UserId>, StoreError>;

    /// Jobs this translator has declined, for filtering offer boards.
    async fn declined_jobs(&self, translator: UserId) -> Result<Vec<JobId>, StoreError>;

    /// Forgets all declines for a job so a resend reaches everyone again.
    async fn clear_declines(&self, job_id: JobId) -> Result<(), StoreError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read-only port for resolving and listing users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Maps an API token to its user, if the token is known.
    async fn resolve(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn list_translators(&self) -> Result<Vec<User>, StoreError>;
}
