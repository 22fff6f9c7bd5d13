use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, QueryBuilder};
use tracing::debug;

use crate::domain::{Job, JobId, JobStatus, LanguagePair, NewJob, Role, User, UserId};
use crate::error::StoreError;

use super::{JobFilter, JobOrder, JobPatch, JobStore, UserDirectory};

/// Job columns as selected by every read, travel metadata joined in.
const JOB_COLUMNS: &str = "j.id, j.status, j.customer_id, j.assigned_translator_id, \
     j.previous_translator_id, j.from_language, j.to_language, j.certified_required, \
     j.due, j.duration_minutes, j.session_time_minutes, j.customer_no_show, j.timed_out, \
     j.flagged, j.manually_handled, j.by_admin, j.admin_comments, j.reopened_from, \
     j.expires_at, j.started_at, j.created_at, j.updated_at, \
     d.distance_km, d.travel_time_minutes";

const JOB_FROM: &str = " FROM jobs j LEFT JOIN distances d ON d.job_id = j.id";

/// Database representation of a job row joined with its travel metadata.
#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    status: String,
    customer_id: i64,
    assigned_translator_id: Option<i64>,
    previous_translator_id: Option<i64>,
    from_language: String,
    to_language: String,
    certified_required: bool,
    due: DateTime<Utc>,
    duration_minutes: i32,
    session_time_minutes: Option<i32>,
    customer_no_show: bool,
    timed_out: bool,
    flagged: bool,
    manually_handled: bool,
    by_admin: bool,
    admin_comments: Option<String>,
    reopened_from: Option<i64>,
    expires_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    distance_km: Option<f64>,
    travel_time_minutes: Option<i32>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StoreError> {
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Backend(format!("job {}: {}", self.id, e)))?;
        Ok(Job {
            id: JobId(self.id),
            status,
            customer: UserId(self.customer_id),
            assigned_translator: self.assigned_translator_id.map(UserId),
            previous_translator: self.previous_translator_id.map(UserId),
            language_pair: LanguagePair::new(self.from_language, self.to_language),
            certified_required: self.certified_required,
            due: self.due,
            duration_minutes: self.duration_minutes,
            distance_km: self.distance_km,
            travel_time_minutes: self.travel_time_minutes,
            session_time_minutes: self.session_time_minutes,
            customer_no_show: self.customer_no_show,
            timed_out: self.timed_out,
            flagged: self.flagged,
            manually_handled: self.manually_handled,
            by_admin: self.by_admin,
            admin_comments: self.admin_comments,
            reopened_from: self.reopened_from.map(JobId),
            expires_at: self.expires_at,
            started_at: self.started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database representation of a directory user.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    role: String,
    languages: Vec<String>,
    certified: bool,
    available: bool,
}

impl UserRow {
    fn into_user(self) -> Result<User, StoreError> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Backend(format!("user {}: {}", self.id, e)))?;
        Ok(User {
            id: UserId(self.id),
            name: self.name,
            email: self.email,
            phone: self.phone,
            role,
            languages: self.languages,
            certified: self.certified,
            available: self.available,
        })
    }
}

/// Appends `, column = $n` fragments for every field the patch sets.
fn push_patch_columns(builder: &mut QueryBuilder<'_, Postgres>, patch: &JobPatch) {
    if let Some(status) = patch.status {
        builder.push(", status = ").push_bind(status.as_str());
    }
    if let Some(assigned) = patch.assigned_translator {
        builder
            .push(", assigned_translator_id = ")
            .push_bind(assigned.map(|u| u.0));
    }
    if let Some(previous) = patch.previous_translator {
        builder
            .push(", previous_translator_id = ")
            .push_bind(previous.map(|u| u.0));
    }
    if let Some(pair) = &patch.language_pair {
        builder.push(", from_language = ").push_bind(pair.from.clone());
        builder.push(", to_language = ").push_bind(pair.to.clone());
    }
    if let Some(certified) = patch.certified_required {
        builder.push(", certified_required = ").push_bind(certified);
    }
    if let Some(due) = patch.due {
        builder.push(", due = ").push_bind(due);
    }
    if let Some(duration) = patch.duration_minutes {
        builder.push(", duration_minutes = ").push_bind(duration);
    }
    if let Some(session) = patch.session_time_minutes {
        builder.push(", session_time_minutes = ").push_bind(session);
    }
    if let Some(no_show) = patch.customer_no_show {
        builder.push(", customer_no_show = ").push_bind(no_show);
    }
    if let Some(timed_out) = patch.timed_out {
        builder.push(", timed_out = ").push_bind(timed_out);
    }
    if let Some(flagged) = patch.flagged {
        builder.push(", flagged = ").push_bind(flagged);
    }
    if let Some(manually_handled) = patch.manually_handled {
        builder.push(", manually_handled = ").push_bind(manually_handled);
    }
    if let Some(by_admin) = patch.by_admin {
        builder.push(", by_admin = ").push_bind(by_admin);
    }
    if let Some(comments) = &patch.admin_comments {
        builder.push(", admin_comments = ").push_bind(comments.clone());
    }
    if let Some(started) = patch.started_at {
        builder.push(", started_at = ").push_bind(started);
    }
    if let Some(expires) = patch.expires_at {
        builder.push(", expires_at = ").push_bind(expires);
    }
}

/// PostgreSQL-backed job store.
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS}{JOB_FROM} WHERE j.id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn job_exists(&self, id: JobId) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM jobs WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        debug!(
            "Creating job: customer={}, pair={}, status={}",
            new_job.customer, new_job.language_pair, new_job.status
        );

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (status, customer_id, from_language, to_language,
                              certified_required, due, duration_minutes,
                              reopened_from, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(new_job.status.as_str())
        .bind(new_job.customer.0)
        .bind(new_job.language_pair.from)
        .bind(new_job.language_pair.to)
        .bind(new_job.certified_required)
        .bind(new_job.due)
        .bind(new_job.duration_minutes)
        .bind(new_job.reopened_from.map(|j| j.0))
        .bind(new_job.expires_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("Job created with id={}", id);
        self.fetch_job(JobId(id))
            .await?
            .ok_or_else(|| StoreError::Backend(format!("job {} vanished after insert", id)))
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.fetch_job(id).await
    }

    async fn conditional_update(
        &self,
        id: JobId,
        expected: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError> {
        let mut builder = QueryBuilder::new("UPDATE jobs SET updated_at = now()");
        push_patch_columns(&mut builder, &patch);
        builder.push(" WHERE id = ").push_bind(id.0);
        builder.push(" AND status = ").push_bind(expected.as_str());

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            // Zero rows means the precondition failed or the row is gone.
            return match self.job_exists(id).await? {
                true => Err(StoreError::Conflict(id)),
                false => Err(StoreError::NotFound),
            };
        }

        debug!("Job {} updated from status {}", id, expected);
        self.fetch_job(id).await?.ok_or(StoreError::NotFound)
    }

    async fn update_fields(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError> {
        let mut builder = QueryBuilder::new("UPDATE jobs SET updated_at = now()");
        push_patch_columns(&mut builder, &patch);
        builder.push(" WHERE id = ").push_bind(id.0);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        self.fetch_job(id).await?.ok_or(StoreError::NotFound)
    }

    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS}{JOB_FROM} WHERE TRUE"));

        if let Some(statuses) = &filter.statuses {
            let values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND j.status = ANY(").push_bind(values).push(")");
        }
        if let Some(customer) = filter.customer {
            builder.push(" AND j.customer_id = ").push_bind(customer.0);
        }
        if let Some(translator) = filter.translator {
            builder
                .push(" AND (j.assigned_translator_id = ")
                .push_bind(translator.0)
                .push(" OR j.previous_translator_id = ")
                .push_bind(translator.0)
                .push(")");
        }
        if let Some(language) = &filter.language {
            builder
                .push(" AND (j.from_language = ")
                .push_bind(language.clone())
                .push(" OR j.to_language = ")
                .push_bind(language.clone())
                .push(")");
        }
        if let Some(after) = filter.due_after {
            builder.push(" AND j.due >= ").push_bind(after);
        }
        if let Some(before) = filter.due_before {
            builder.push(" AND j.due <= ").push_bind(before);
        }
        if let Some(expires) = filter.expires_before {
            builder.push(" AND j.expires_at < ").push_bind(expires);
        }

        match filter.order {
            JobOrder::DueAsc => builder.push(" ORDER BY j.due ASC, j.id ASC"),
            JobOrder::NewestFirst => builder.push(" ORDER BY j.created_at DESC, j.id DESC"),
        };
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ").push_bind(offset);
        }

        let rows: Vec<JobRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn upsert_distance(
        &self,
        job_id: JobId,
        distance_km: Option<f64>,
        travel_time_minutes: Option<i32>,
    ) -> Result<(), StoreError> {
        if !self.job_exists(job_id).await? {
            return Err(StoreError::NotFound);
        }
        sqlx::query(
            r#"
            INSERT INTO distances (job_id, distance_km, travel_time_minutes)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id) DO UPDATE SET
                distance_km = COALESCE(EXCLUDED.distance_km, distances.distance_km),
                travel_time_minutes = COALESCE(EXCLUDED.travel_time_minutes, distances.travel_time_minutes),
                updated_at = now()
            "#,
        )
        .bind(job_id.0)
        .bind(distance_km)
        .bind(travel_time_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_decline(&self, job_id: JobId, translator: UserId) -> Result<(), StoreError> {
        if !self.job_exists(job_id).await? {
            return Err(StoreError::NotFound);
        }
        sqlx::query(
            r#"
            INSERT INTO job_declines (job_id, translator_id)
            VALUES ($1, $2)
            ON CONFLICT (job_id, translator_id) DO NOTHING
            "#,
        )
        .bind(job_id.0)
        .bind(translator.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn declined_translators(&self, job_id: JobId) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT translator_id FROM job_declines WHERE job_id = $1 ORDER BY translator_id",
        )
        .bind(job_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    async fn declined_jobs(&self, translator: UserId) -> Result<Vec<JobId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT job_id FROM job_declines WHERE translator_id = $1 ORDER BY job_id",
        )
        .bind(translator.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(JobId).collect())
    }

    async fn clear_declines(&self, job_id: JobId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM job_declines WHERE job_id = $1")
            .bind(job_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed user directory.
pub struct PgUserDirectory {
    pool: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, name, email, phone, role, languages, certified, available";

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve(&self, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE api_token = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_user).transpose()
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_user).transpose()
    }

    async fn list_translators(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Role::Translator.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UserRow::into_user).collect()
    }
}
