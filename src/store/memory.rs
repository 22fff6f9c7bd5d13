use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{Distance, Job, JobId, JobStatus, NewJob, Role, User, UserId};
use crate::error::StoreError;

use super::{JobFilter, JobOrder, JobPatch, JobStore, UserDirectory};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    distances: HashMap<JobId, Distance>,
    declines: HashMap<JobId, BTreeSet<UserId>>,
    next_id: i64,
}

impl Inner {
    /// Jobs are stored without travel metadata; reads overlay it.
    fn merged(&self, job: &Job) -> Job {
        let mut job = job.clone();
        if let Some(distance) = self.distances.get(&job.id) {
            job.distance_km = distance.distance_km;
            job.travel_time_minutes = distance.travel_time_minutes;
        }
        job
    }
}

/// Single-process store backed by maps behind one lock. Used by the test
/// suites and the `memory` backend for local runs.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: JobId(inner.next_id),
            status: new_job.status,
            customer: new_job.customer,
            assigned_translator: None,
            previous_translator: None,
            language_pair: new_job.language_pair,
            certified_required: new_job.certified_required,
            due: new_job.due,
            duration_minutes: new_job.duration_minutes,
            distance_km: None,
            travel_time_minutes: None,
            session_time_minutes: None,
            customer_no_show: false,
            timed_out: false,
            flagged: false,
            manually_handled: false,
            by_admin: false,
            admin_comments: None,
            reopened_from: new_job.reopened_from,
            expires_at: new_job.expires_at,
            started_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&id).map(|job| inner.merged(job)))
    }

    async fn conditional_update(
        &self,
        id: JobId,
        expected: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        let current_status = match inner.jobs.get(&id) {
            Some(job) => job.status,
            None => return Err(StoreError::NotFound),
        };
        if current_status != expected {
            return Err(StoreError::Conflict(id));
        }
        let now = Utc::now();
        if let Some(job) = inner.jobs.get_mut(&id) {
            patch.apply(job, now);
        }
        let job = inner.jobs.get(&id).cloned().ok_or(StoreError::NotFound)?;
        Ok(inner.merged(&job))
    }

    async fn update_fields(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        if let Some(job) = inner.jobs.get_mut(&id) {
            patch.apply(job, now);
        }
        let job = inner.jobs.get(&id).cloned().ok_or(StoreError::NotFound)?;
        Ok(inner.merged(&job))
    }

    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .map(|job| inner.merged(job))
            .collect();
        match filter.order {
            JobOrder::DueAsc => jobs.sort_by(|a, b| a.due.cmp(&b.due).then(a.id.cmp(&b.id))),
            JobOrder::NewestFirst => {
                jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
        }
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let jobs = jobs.into_iter().skip(offset);
        let jobs = match filter.limit {
            Some(limit) => jobs.take(limit.max(0) as usize).collect(),
            None => jobs.collect(),
        };
        Ok(jobs)
    }

    async fn upsert_distance(
        &self,
        job_id: JobId,
        distance_km: Option<f64>,
        travel_time_minutes: Option<i32>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound);
        }
        let entry = inner.distances.entry(job_id).or_default();
        if distance_km.is_some() {
            entry.distance_km = distance_km;
        }
        if travel_time_minutes.is_some() {
            entry.travel_time_minutes = travel_time_minutes;
        }
        Ok(())
    }

    async fn record_decline(&self, job_id: JobId, translator: UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound);
        }
        inner.declines.entry(job_id).or_default().insert(translator);
        Ok(())
    }

    async fn declined_translators(&self, job_id: JobId) -> Result<Vec<UserId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .declines
            .get(&job_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn declined_jobs(&self, translator: UserId) -> Result<Vec<JobId>, StoreError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<JobId> = inner
            .declines
            .iter()
            .filter(|(_, translators)| translators.contains(&translator))
            .map(|(job_id, _)| *job_id)
            .collect();
        jobs.sort();
        Ok(jobs)
    }

    async fn clear_declines(&self, job_id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.declines.remove(&job_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Token and id lookups over a fixed user set. The `memory` backend seeds
/// this at startup; tests populate it directly.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
    tokens: RwLock<HashMap<String, UserId>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, token: impl Into<String>, user: User) {
        let id = user.id;
        self.users.write().await.insert(id, user);
        self.tokens.write().await.insert(token.into(), id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn resolve(&self, token: &str) -> Result<Option<User>, StoreError> {
        let id = match self.tokens.read().await.get(token) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list_translators(&self) -> Result<Vec<User>, StoreError> {
        let mut translators: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|user| user.role == Role::Translator)
            .cloned()
            .collect();
        translators.sort_by_key(|user| user.id);
        Ok(translators)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::LanguagePair;

    fn draft(due_in_hours: i64) -> NewJob {
        let now = Utc::now();
        NewJob {
            status: JobStatus::Created,
            customer: UserId(1),
            language_pair: LanguagePair::new("sv", "en"),
            certified_required: false,
            due: now + Duration::hours(due_in_hours),
            duration_minutes: 60,
            reopened_from: None,
            expires_at: now + Duration::minutes(90),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = MemoryJobStore::new();
        let first = store.create(draft(1)).await.unwrap();
        let second = store.create(draft(2)).await.unwrap();
        assert_eq!(first.id, JobId(1));
        assert_eq!(second.id, JobId(2));
        assert_eq!(first.status, JobStatus::Created);
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_status() {
        let store = MemoryJobStore::new();
        let job = store.create(draft(1)).await.unwrap();

        let opened = store
            .conditional_update(
                job.id,
                JobStatus::Created,
                JobPatch {
                    status: Some(JobStatus::Open),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(opened.status, JobStatus::Open);

        // Same precondition again: the status has moved on.
        let stale = store
            .conditional_update(
                job.id,
                JobStatus::Created,
                JobPatch {
                    status: Some(JobStatus::Open),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict(id)) if id == job.id));

        let missing = store
            .conditional_update(JobId(99), JobStatus::Open, JobPatch::default())
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn distance_upsert_merges_partial_writes() {
        let store = MemoryJobStore::new();
        let job = store.create(draft(1)).await.unwrap();

        store.upsert_distance(job.id, Some(12.5), None).await.unwrap();
        store.upsert_distance(job.id, None, Some(35)).await.unwrap();

        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.distance_km, Some(12.5));
        assert_eq!(stored.travel_time_minutes, Some(35));

        let unknown = store.upsert_distance(JobId(99), Some(1.0), None).await;
        assert!(matches!(unknown, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn declines_round_trip_and_clear() {
        let store = MemoryJobStore::new();
        let job = store.create(draft(1)).await.unwrap();

        store.record_decline(job.id, UserId(7)).await.unwrap();
        store.record_decline(job.id, UserId(7)).await.unwrap();
        store.record_decline(job.id, UserId(8)).await.unwrap();

        assert_eq!(
            store.declined_translators(job.id).await.unwrap(),
            vec![UserId(7), UserId(8)]
        );
        assert_eq!(store.declined_jobs(UserId(7)).await.unwrap(), vec![job.id]);

        store.clear_declines(job.id).await.unwrap();
        assert!(store.declined_translators(job.id).await.unwrap().is_empty());
        assert!(store.declined_jobs(UserId(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_orders_by_due_then_id() {
        let store = MemoryJobStore::new();
        let late = store.create(draft(5)).await.unwrap();
        let early = store.create(draft(1)).await.unwrap();

        let jobs = store.query(&JobFilter::default()).await.unwrap();
        assert_eq!(jobs[0].id, early.id);
        assert_eq!(jobs[1].id, late.id);

        let limited = store
            .query(&JobFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, late.id);
    }

    #[tokio::test]
    async fn directory_resolves_tokens_and_lists_translators() {
        let directory = MemoryUserDirectory::new();
        directory
            .add_user(
                "tok-1",
                User {
                    id: UserId(1),
                    name: "Anna".to_string(),
                    email: None,
                    phone: None,
                    role: Role::Customer,
                    languages: vec![],
                    certified: false,
                    available: true,
                },
            )
            .await;
        directory
            .add_user(
                "tok-2",
                User {
                    id: UserId(2),
                    name: "Tomas".to_string(),
                    email: None,
                    phone: None,
                    role: Role::Translator,
                    languages: vec!["sv".to_string(), "en".to_string()],
                    certified: true,
                    available: true,
                },
            )
            .await;

        let anna = directory.resolve("tok-1").await.unwrap().unwrap();
        assert_eq!(anna.id, UserId(1));
        assert!(directory.resolve("nope").await.unwrap().is_none());

        let translators = directory.list_translators().await.unwrap();
        assert_eq!(translators.len(), 1);
        assert_eq!(translators[0].id, UserId(2));
    }
}
