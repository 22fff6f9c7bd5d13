use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::{offer_expires_at, Job, JobId, JobStatus, LanguagePair, NewJob, User, UserId};
use crate::error::{BookingError, StoreError};
use crate::store::{JobPatch, JobStore};

/// Fields a customer supplies when requesting a booking.
#[derive(Debug, Clone)]
pub struct JobDetails {
    pub language_pair: LanguagePair,
    pub certified_required: bool,
    pub due: DateTime<Utc>,
    pub duration_minutes: i32,
}

/// Whitelisted fields for booking updates. Status is deliberately not
/// representable here; it only moves through the transition methods.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub language_pair: Option<LanguagePair>,
    pub certified_required: Option<bool>,
    pub due: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub flagged: Option<bool>,
    pub manually_handled: Option<bool>,
    pub by_admin: Option<bool>,
    /// `Some(None)` clears the comment, `None` leaves it alone.
    pub admin_comments: Option<Option<String>>,
}

impl JobUpdate {
    pub fn touches_schedule(&self) -> bool {
        self.language_pair.is_some()
            || self.certified_required.is_some()
            || self.due.is_some()
            || self.duration_minutes.is_some()
    }

    pub fn touches_admin_fields(&self) -> bool {
        self.flagged.is_some()
            || self.manually_handled.is_some()
            || self.by_admin.is_some()
            || self.admin_comments.is_some()
    }
}

const MAX_DURATION_MINUTES: i32 = 24 * 60;

fn validate_pair(pair: &LanguagePair) -> Result<(), BookingError> {
    if pair.from.trim().is_empty() || pair.to.trim().is_empty() {
        return Err(BookingError::validation("both languages must be given"));
    }
    if pair.from == pair.to {
        return Err(BookingError::validation(
            "source and target language must differ",
        ));
    }
    Ok(())
}

fn validate_due(due: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), BookingError> {
    if due <= now {
        return Err(BookingError::validation("due time must be in the future"));
    }
    Ok(())
}

fn validate_duration(duration_minutes: i32) -> Result<(), BookingError> {
    if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(BookingError::validation(format!(
            "duration must be between 1 and {} minutes",
            MAX_DURATION_MINUTES
        )));
    }
    Ok(())
}

fn validate_details(details: &JobDetails, now: DateTime<Utc>) -> Result<(), BookingError> {
    validate_pair(&details.language_pair)?;
    validate_due(details.due, now)?;
    validate_duration(details.duration_minutes)
}

/// State machine for a single booking. Every status change goes through a
/// compare-and-swap against the persisted status, so two racing writers
/// cannot both win.
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    offer_window_minutes: i64,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn JobStore>, offer_window_minutes: i64) -> Self {
        Self {
            store,
            offer_window_minutes,
        }
    }

    async fn fetch(&self, id: JobId) -> Result<Job, BookingError> {
        self.store
            .get(id)
            .await?
            .ok_or(BookingError::JobNotFound(id))
    }

    async fn cas(
        &self,
        id: JobId,
        expected: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, BookingError> {
        self.store
            .conditional_update(id, expected, patch)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(id) => BookingError::Conflict(id),
                StoreError::NotFound => BookingError::JobNotFound(id),
                other => BookingError::Store(other),
            })
    }

    /// Registers a new booking. The job starts in `Created`; `open` puts it
    /// on the offer board.
    pub async fn create(&self, customer: UserId, details: JobDetails) -> Result<Job, BookingError> {
        let now = Utc::now();
        validate_details(&details, now)?;

        let job = self
            .store
            .create(NewJob {
                status: JobStatus::Created,
                customer,
                language_pair: details.language_pair,
                certified_required: details.certified_required,
                due: details.due,
                duration_minutes: details.duration_minutes,
                reopened_from: None,
                expires_at: offer_expires_at(now, self.offer_window_minutes),
            })
            .await?;

        info!("Lifecycle: job {} created for customer {}", job.id, customer);
        Ok(job)
    }

    /// Puts a job on the offer board with a fresh acceptance window. Jobs in
    /// `Created` or `Reopened` move to `Open`; jobs already `Open` only get
    /// their window renewed.
    pub async fn open(&self, id: JobId) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        let expires_at = offer_expires_at(Utc::now(), self.offer_window_minutes);
        let patch = match job.status {
            JobStatus::Created | JobStatus::Reopened => JobPatch {
                status: Some(JobStatus::Open),
                expires_at: Some(expires_at),
                ..Default::default()
            },
            JobStatus::Open => JobPatch {
                expires_at: Some(expires_at),
                ..Default::default()
            },
            status => {
                return Err(BookingError::InvalidTransition {
                    job: id,
                    status,
                    action: "open",
                })
            }
        };
        let job = self.cas(id, job.status, patch).await?;
        info!("Lifecycle: job {} is open until {}", job.id, job.expires_at);
        Ok(job)
    }

    /// Applies a whitelisted patch. Scheduling fields require a live
    /// booking; administrative fields require an admin but work on any
    /// status, so records can be annotated after the fact.
    pub async fn update(
        &self,
        id: JobId,
        update: JobUpdate,
        acting: &User,
    ) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;

        if !acting.is_admin() && job.customer != acting.id {
            return Err(BookingError::forbidden(
                "only the booking customer or an admin can update this job",
            ));
        }
        if update.touches_admin_fields() && !acting.is_admin() {
            return Err(BookingError::forbidden(
                "administrative fields require an admin",
            ));
        }
        if update.touches_schedule() && job.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "reschedule",
            });
        }

        let now = Utc::now();
        if let Some(pair) = &update.language_pair {
            validate_pair(pair)?;
        }
        if let Some(due) = update.due {
            validate_due(due, now)?;
        }
        if let Some(duration) = update.duration_minutes {
            validate_duration(duration)?;
        }

        let patch = JobPatch {
            language_pair: update.language_pair,
            certified_required: update.certified_required,
            due: update.due,
            duration_minutes: update.duration_minutes,
            flagged: update.flagged,
            manually_handled: update.manually_handled,
            by_admin: update.by_admin,
            admin_comments: update.admin_comments,
            ..Default::default()
        };
        let job = self.store.update_fields(id, patch).await.map_err(|e| match e {
            StoreError::NotFound => BookingError::JobNotFound(id),
            other => BookingError::Store(other),
        })?;

        info!("Lifecycle: job {} updated by user {}", id, acting.id);
        Ok(job)
    }

    /// Marks the session as running. Only the assigned translator (or an
    /// admin) may start it.
    pub async fn start(&self, id: JobId, acting: &User) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        if !acting.is_admin() && !job.is_assigned_to(acting.id) {
            return Err(BookingError::forbidden(
                "only the assigned translator can start this job",
            ));
        }
        if job.status != JobStatus::Assigned {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "start",
            });
        }
        let job = self
            .cas(
                id,
                JobStatus::Assigned,
                JobPatch {
                    status: Some(JobStatus::InProgress),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        info!("Lifecycle: job {} started by user {}", id, acting.id);
        Ok(job)
    }

    /// Completes a running session, records the measured session time and
    /// releases the translator.
    pub async fn end(&self, id: JobId, acting: &User) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        if !acting.is_admin() && !job.is_assigned_to(acting.id) {
            return Err(BookingError::forbidden(
                "only the assigned translator can end this job",
            ));
        }
        if job.status != JobStatus::InProgress {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "end",
            });
        }

        let now = Utc::now();
        let started = job.started_at.unwrap_or(job.due);
        let session_minutes = (now - started).num_minutes().max(0) as i32;

        let job = self
            .cas(
                id,
                JobStatus::InProgress,
                JobPatch {
                    status: Some(JobStatus::Ended),
                    assigned_translator: Some(None),
                    previous_translator: Some(job.assigned_translator),
                    session_time_minutes: Some(session_minutes),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            "Lifecycle: job {} ended, session time {} minutes",
            id, session_minutes
        );
        Ok(job)
    }

    /// Closes an assigned or running session because the customer never
    /// turned up. No session time is recorded.
    pub async fn record_customer_no_show(
        &self,
        id: JobId,
        acting: &User,
    ) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        if !acting.is_admin() && !job.is_assigned_to(acting.id) {
            return Err(BookingError::forbidden(
                "only the assigned translator can report a no-show",
            ));
        }
        if !matches!(job.status, JobStatus::Assigned | JobStatus::InProgress) {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "report a no-show for",
            });
        }

        let job = self
            .cas(
                id,
                job.status,
                JobPatch {
                    status: Some(JobStatus::Ended),
                    customer_no_show: Some(true),
                    assigned_translator: Some(None),
                    previous_translator: Some(job.assigned_translator),
                    ..Default::default()
                },
            )
            .await?;
        info!("Lifecycle: job {} closed as customer no-show", id);
        Ok(job)
    }

    /// Cancels any live booking. A held assignment is released; the caller
    /// is responsible for telling the released translator.
    pub async fn cancel(&self, id: JobId, acting: &User) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        if !acting.is_admin() && job.customer != acting.id {
            return Err(BookingError::forbidden(
                "only the booking customer or an admin can cancel this job",
            ));
        }
        if job.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "cancel",
            });
        }

        let mut patch = JobPatch {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        };
        if job.assigned_translator.is_some() {
            patch.assigned_translator = Some(None);
            patch.previous_translator = Some(job.assigned_translator);
        }

        let job = self.cas(id, job.status, patch).await?;
        info!("Lifecycle: job {} cancelled by user {}", id, acting.id);
        Ok(job)
    }

    /// Clones a terminal booking into a fresh `Reopened` job pointing back
    /// at its origin. The terminal record itself is never touched.
    pub async fn reopen(&self, id: JobId, acting: &User) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        if !acting.is_admin() && job.customer != acting.id {
            return Err(BookingError::forbidden(
                "only the booking customer or an admin can reopen this job",
            ));
        }
        if !job.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "reopen",
            });
        }

        let reopened = self
            .store
            .create(NewJob {
                status: JobStatus::Reopened,
                customer: job.customer,
                language_pair: job.language_pair.clone(),
                certified_required: job.certified_required,
                due: job.due,
                duration_minutes: job.duration_minutes,
                reopened_from: Some(job.id),
                expires_at: offer_expires_at(Utc::now(), self.offer_window_minutes),
            })
            .await?;
        info!("Lifecycle: job {} reopened as job {}", id, reopened.id);
        Ok(reopened)
    }

    /// Offer window length, for callers that schedule around it.
    pub fn offer_window(&self) -> Duration {
        Duration::minutes(self.offer_window_minutes)
    }
}
