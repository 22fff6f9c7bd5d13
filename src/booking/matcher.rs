use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::{Job, JobId, JobStatus, Role, User, UserId};
use crate::error::{BookingError, StoreError};
use crate::store::{JobFilter, JobPatch, JobStore, UserDirectory};

/// Whether a translator can serve a job at all: right role, marked
/// available, speaks both languages, and certified when the booking
/// demands it.
pub fn is_eligible(translator: &User, job: &Job) -> bool {
    translator.role == Role::Translator
        && translator.available
        && translator.speaks(&job.language_pair.from)
        && translator.speaks(&job.language_pair.to)
        && (!job.certified_required || translator.certified)
}

/// Outcome of a successful acceptance.
#[derive(Debug)]
pub struct Accepted {
    pub job: Job,
    /// Eligible translators who did not get the job and had not declined it.
    pub other_candidates: Vec<User>,
}

/// Pairs open jobs with translators. Acceptance is first-come-first-served;
/// the store's compare-and-swap decides the race.
pub struct AssignmentMatcher {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn UserDirectory>,
}

impl AssignmentMatcher {
    pub fn new(store: Arc<dyn JobStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    /// Everyone an offer for `job` should reach.
    pub async fn eligible_translators(&self, job: &Job) -> Result<Vec<User>, BookingError> {
        let translators = self.directory.list_translators().await?;
        Ok(translators
            .into_iter()
            .filter(|translator| is_eligible(translator, job))
            .collect())
    }

    /// Open, unexpired jobs matching the translator that they have not
    /// declined, soonest session first. Recomputed on every call.
    pub async fn potential_jobs_for(&self, translator: &User) -> Result<Vec<Job>, BookingError> {
        let now = Utc::now();
        let open = self
            .store
            .query(&JobFilter::with_statuses(&[JobStatus::Open]))
            .await?;
        let declined: HashSet<JobId> = self
            .store
            .declined_jobs(translator.id)
            .await?
            .into_iter()
            .collect();

        Ok(open
            .into_iter()
            .filter(|job| job.offer_open(now))
            .filter(|job| is_eligible(translator, job))
            .filter(|job| !declined.contains(&job.id))
            .collect())
    }

    /// Claims an open job for the translator. Exactly one concurrent caller
    /// can succeed; everyone else sees `Conflict`. No notification is owed
    /// to losers of the race, that is the caller's concern.
    pub async fn accept_job(&self, id: JobId, translator: &User) -> Result<Accepted, BookingError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(BookingError::JobNotFound(id))?;

        if job.status != JobStatus::Open {
            return Err(BookingError::InvalidTransition {
                job: id,
                status: job.status,
                action: "accept",
            });
        }
        if !is_eligible(translator, &job) {
            return Err(BookingError::forbidden(
                "this job does not match your languages or certification",
            ));
        }

        // No double-booking: reject when the session overlaps one the
        // translator already holds.
        let busy = self
            .store
            .query(&JobFilter {
                statuses: Some(vec![JobStatus::Assigned, JobStatus::InProgress]),
                translator: Some(translator.id),
                ..Default::default()
            })
            .await?;
        if busy.iter().any(|held| held.overlaps(&job)) {
            return Err(BookingError::validation(
                "you already have a booking in that time slot",
            ));
        }

        let updated = self
            .store
            .conditional_update(
                id,
                JobStatus::Open,
                JobPatch {
                    status: Some(JobStatus::Assigned),
                    assigned_translator: Some(Some(translator.id)),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(id) => BookingError::Conflict(id),
                StoreError::NotFound => BookingError::JobNotFound(id),
                other => BookingError::Store(other),
            })?;

        info!("Matcher: job {} assigned to translator {}", id, translator.id);

        // Candidates to stand down, computed only after the swap went
        // through.
        let declined: HashSet<UserId> = self
            .store
            .declined_translators(id)
            .await?
            .into_iter()
            .collect();
        let other_candidates = self
            .eligible_translators(&updated)
            .await?
            .into_iter()
            .filter(|candidate| candidate.id != translator.id && !declined.contains(&candidate.id))
            .collect();

        Ok(Accepted {
            job: updated,
            other_candidates,
        })
    }

    /// Records a decline so the board stops showing this job to the
    /// translator. The job record itself is untouched.
    pub async fn decline_offer(&self, id: JobId, translator: &User) -> Result<(), BookingError> {
        if self.store.get(id).await?.is_none() {
            return Err(BookingError::JobNotFound(id));
        }
        self.store.record_decline(id, translator.id).await?;
        info!("Matcher: translator {} declined job {}", translator.id, id);
        Ok(())
    }
}
