use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::domain::{Job, JobId, JobPayload, JobStatus, NotificationEvent, Role, User, UserId};
use crate::error::BookingError;
use crate::notify::{deliver, Channel, NotificationGateway};
use crate::store::{JobFilter, JobOrder, JobPatch, JobStore, UserDirectory};

use super::lifecycle::{JobDetails, JobLifecycle, JobUpdate};
use super::matcher::AssignmentMatcher;

pub const HISTORY_PAGE_SIZE: i64 = 15;
const DEFAULT_LIST_LIMIT: i64 = 100;

/// Tunables threaded in from configuration.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub offer_window_minutes: i64,
    pub notify_timeout: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            offer_window_minutes: 90,
            notify_timeout: Duration::from_secs(2),
        }
    }
}

/// Travel data and admin metadata reported by the operations backoffice.
/// The flag fields arrive as raw strings and are parsed strictly.
#[derive(Debug, Clone)]
pub struct DistanceFeed {
    pub job_id: JobId,
    pub distance_km: Option<f64>,
    pub travel_time_minutes: Option<i32>,
    pub session_time_minutes: Option<i32>,
    pub admin_comments: Option<String>,
    pub flagged: Option<String>,
    pub manually_handled: Option<String>,
    pub by_admin: Option<String>,
}

impl DistanceFeed {
    pub fn travel_only(job_id: JobId, distance_km: Option<f64>, travel_time_minutes: Option<i32>) -> Self {
        DistanceFeed {
            job_id,
            distance_km,
            travel_time_minutes,
            session_time_minutes: None,
            admin_comments: None,
            flagged: None,
            manually_handled: None,
            by_admin: None,
        }
    }
}

/// Parses a reported flag. Only the exact strings `"true"` and `"false"`
/// count; anything else is rejected instead of silently becoming false.
fn parse_flag(field: &str, raw: &str) -> Result<bool, BookingError> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(BookingError::validation(format!(
            "{} must be \"true\" or \"false\", got \"{}\"",
            field, other
        ))),
    }
}

/// Facade over the booking workflow: resolves identity, enforces role
/// gates, drives the lifecycle and matcher, and fans out notifications.
/// Notifications are dispatched only after the state change is committed
/// and their failures never fail the operation.
pub struct BookingService {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn UserDirectory>,
    lifecycle: JobLifecycle,
    matcher: AssignmentMatcher,
    push: Arc<dyn NotificationGateway>,
    sms: Arc<dyn NotificationGateway>,
    notify_timeout: Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn JobStore>,
        directory: Arc<dyn UserDirectory>,
        push: Arc<dyn NotificationGateway>,
        sms: Arc<dyn NotificationGateway>,
        settings: BookingSettings,
    ) -> Self {
        let lifecycle = JobLifecycle::new(Arc::clone(&store), settings.offer_window_minutes);
        let matcher = AssignmentMatcher::new(Arc::clone(&store), Arc::clone(&directory));
        Self {
            store,
            directory,
            lifecycle,
            matcher,
            push,
            sms,
            notify_timeout: settings.notify_timeout,
        }
    }

    /// Maps an API token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<User, BookingError> {
        self.directory
            .resolve(token)
            .await?
            .ok_or(BookingError::Unauthenticated)
    }

    async fn fetch(&self, id: JobId) -> Result<Job, BookingError> {
        self.store
            .get(id)
            .await?
            .ok_or(BookingError::JobNotFound(id))
    }

    fn gateway(&self, channel: Channel) -> &dyn NotificationGateway {
        match channel {
            Channel::Push => self.push.as_ref(),
            Channel::Sms => self.sms.as_ref(),
        }
    }

    async fn fan_out(&self, recipients: &[User], event: &NotificationEvent, channel: Channel) {
        let gateway = self.gateway(channel);
        let sends = recipients
            .iter()
            .map(|recipient| deliver(gateway, recipient, event, self.notify_timeout));
        join_all(sends).await;
    }

    /// Best-effort single delivery by user id. An unknown recipient or a
    /// directory failure costs a log line, nothing more.
    async fn notify_user(&self, user_id: UserId, event: &NotificationEvent, channel: Channel) {
        match self.directory.get(user_id).await {
            Ok(Some(user)) => {
                deliver(self.gateway(channel), &user, event, self.notify_timeout).await
            }
            Ok(None) => warn!("Service: cannot notify unknown user {}", user_id),
            Err(e) => warn!(
                "Service: directory lookup for user {} failed: {}",
                user_id, e
            ),
        }
    }

    async fn offer_to_candidates(&self, job: &Job, channel: Channel) -> Result<usize, BookingError> {
        let candidates = self.matcher.eligible_translators(job).await?;
        let event = NotificationEvent::JobOffered {
            job: JobPayload::from(job),
        };
        self.fan_out(&candidates, &event, channel).await;
        info!(
            "Service: job {} offered to {} translators over {}",
            job.id,
            candidates.len(),
            channel.as_str()
        );
        Ok(candidates.len())
    }

    /// Registers a booking, opens the offer round and pings every matching
    /// translator.
    pub async fn create_job(&self, acting: &User, details: JobDetails) -> Result<Job, BookingError> {
        if acting.role != Role::Customer {
            return Err(BookingError::forbidden("only customers can create bookings"));
        }
        info!("Service: user {} creating a booking", acting.id);
        let job = self.lifecycle.create(acting.id, details).await?;
        let job = self.lifecycle.open(job.id).await?;
        self.offer_to_candidates(&job, Channel::Push).await?;
        Ok(job)
    }

    /// Single booking, visible to its customer, its translators and admins.
    pub async fn get_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        let job = self.fetch(id).await?;
        let allowed =
            acting.is_admin() || job.customer == acting.id || job.involves_translator(acting.id);
        if !allowed {
            return Err(BookingError::forbidden("you are not part of this booking"));
        }
        Ok(job)
    }

    /// Live bookings for one user: everything still moving for a customer,
    /// the held assignments for a translator.
    pub async fn list_jobs_for_user(
        &self,
        acting: &User,
        user_id: UserId,
    ) -> Result<Vec<Job>, BookingError> {
        if !acting.is_admin() && acting.id != user_id {
            return Err(BookingError::forbidden("you can only list your own jobs"));
        }
        let target = self
            .directory
            .get(user_id)
            .await?
            .ok_or(BookingError::UserNotFound(user_id))?;

        let filter = match target.role {
            Role::Customer => JobFilter {
                statuses: Some(JobStatus::ACTIVE.to_vec()),
                customer: Some(user_id),
                ..Default::default()
            },
            Role::Translator => JobFilter {
                statuses: Some(vec![JobStatus::Assigned, JobStatus::InProgress]),
                translator: Some(user_id),
                ..Default::default()
            },
            _ => return Ok(Vec::new()),
        };
        Ok(self.store.query(&filter).await?)
    }

    /// Admin-only listing across all bookings.
    pub async fn list_all_jobs(
        &self,
        acting: &User,
        mut filter: JobFilter,
    ) -> Result<Vec<Job>, BookingError> {
        if !acting.is_admin() {
            return Err(BookingError::forbidden("only admins can list all jobs"));
        }
        if filter.limit.is_none() {
            filter.limit = Some(DEFAULT_LIST_LIMIT);
        }
        Ok(self.store.query(&filter).await?)
    }

    /// Finished bookings for one user, newest first, paged.
    pub async fn job_history_for_user(
        &self,
        acting: &User,
        user_id: UserId,
        page: i64,
    ) -> Result<Vec<Job>, BookingError> {
        if !acting.is_admin() && acting.id != user_id {
            return Err(BookingError::forbidden("you can only view your own history"));
        }
        let target = self
            .directory
            .get(user_id)
            .await?
            .ok_or(BookingError::UserNotFound(user_id))?;

        let page = page.max(1);
        let mut filter = JobFilter {
            statuses: Some(JobStatus::TERMINAL.to_vec()),
            order: JobOrder::NewestFirst,
            limit: Some(HISTORY_PAGE_SIZE),
            offset: Some((page - 1) * HISTORY_PAGE_SIZE),
            ..Default::default()
        };
        match target.role {
            Role::Customer => filter.customer = Some(user_id),
            Role::Translator => filter.translator = Some(user_id),
            _ => return Ok(Vec::new()),
        }
        Ok(self.store.query(&filter).await?)
    }

    /// Applies a whitelisted booking update.
    pub async fn update_job(
        &self,
        acting: &User,
        id: JobId,
        update: JobUpdate,
    ) -> Result<Job, BookingError> {
        self.lifecycle.update(id, update, acting).await
    }

    /// Accepts an open job for the acting translator. On success the winner
    /// and the customer get a confirmation and the remaining candidates are
    /// stood down; a lost race notifies nobody.
    pub async fn accept_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        if acting.role != Role::Translator {
            return Err(BookingError::forbidden("only translators can accept jobs"));
        }
        let accepted = self.matcher.accept_job(id, acting).await?;

        let confirmation = NotificationEvent::AssignmentConfirmed {
            job: JobPayload::from(&accepted.job),
        };
        self.notify_user(accepted.job.customer, &confirmation, Channel::Push)
            .await;
        deliver(self.push.as_ref(), acting, &confirmation, self.notify_timeout).await;

        let stand_down = NotificationEvent::JobNoLongerAvailable {
            job_id: accepted.job.id,
        };
        self.fan_out(&accepted.other_candidates, &stand_down, Channel::Push)
            .await;

        info!("Service: job {} accepted by translator {}", id, acting.id);
        Ok(accepted.job)
    }

    /// Path-parameter variant of `accept_job`; identical contract.
    pub async fn accept_job_with_id(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        self.accept_job(acting, id).await
    }

    /// Takes the job off this translator's board without touching it.
    pub async fn decline_job(&self, acting: &User, id: JobId) -> Result<(), BookingError> {
        if acting.role != Role::Translator {
            return Err(BookingError::forbidden("only translators can decline offers"));
        }
        self.matcher.decline_offer(id, acting).await
    }

    pub async fn start_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        self.lifecycle.start(id, acting).await
    }

    /// Ends a running session and tells both parties.
    pub async fn end_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        let job = self.lifecycle.end(id, acting).await?;
        let event = NotificationEvent::SessionEnded {
            job: JobPayload::from(&job),
        };
        self.notify_user(job.customer, &event, Channel::Push).await;
        if let Some(translator) = job.previous_translator {
            self.notify_user(translator, &event, Channel::Push).await;
        }
        Ok(job)
    }

    /// Closes an assignment the customer never showed up for.
    pub async fn record_no_show(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        self.lifecycle.record_customer_no_show(id, acting).await
    }

    /// Cancels a booking. The translator who held it, if any, is told
    /// exactly once.
    pub async fn cancel_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        let job = self.lifecycle.cancel(id, acting).await?;
        if let Some(translator) = job.previous_translator {
            let event = NotificationEvent::JobCancelled {
                job: JobPayload::from(&job),
            };
            self.notify_user(translator, &event, Channel::Push).await;
        }
        Ok(job)
    }

    /// Clones a terminal booking into a fresh job and runs a new offer
    /// round for it.
    pub async fn reopen_job(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        let reopened = self.lifecycle.reopen(id, acting).await?;
        let job = self.lifecycle.open(reopened.id).await?;
        self.offer_to_candidates(&job, Channel::Push).await?;
        Ok(job)
    }

    /// The acting translator's current offer board.
    pub async fn potential_jobs(&self, acting: &User) -> Result<Vec<Job>, BookingError> {
        if acting.role != Role::Translator {
            return Err(BookingError::forbidden(
                "only translators have an offer board",
            ));
        }
        self.matcher.potential_jobs_for(acting).await
    }

    /// Applies a backoffice report: travel data into the distance record,
    /// admin metadata onto the job. Either part may be absent; all flag
    /// strings are validated before anything is written.
    pub async fn apply_distance_feed(
        &self,
        acting: &User,
        feed: DistanceFeed,
    ) -> Result<(), BookingError> {
        let flagged = feed
            .flagged
            .as_deref()
            .map(|raw| parse_flag("flagged", raw))
            .transpose()?;
        let manually_handled = feed
            .manually_handled
            .as_deref()
            .map(|raw| parse_flag("manually_handled", raw))
            .transpose()?;
        let by_admin = feed
            .by_admin
            .as_deref()
            .map(|raw| parse_flag("by_admin", raw))
            .transpose()?;

        if feed.distance_km.is_some_and(|km| km < 0.0) {
            return Err(BookingError::validation("distance_km must not be negative"));
        }
        if feed.travel_time_minutes.is_some_and(|m| m < 0) {
            return Err(BookingError::validation(
                "travel_time_minutes must not be negative",
            ));
        }
        if feed.session_time_minutes.is_some_and(|m| m < 0) {
            return Err(BookingError::validation(
                "session_time_minutes must not be negative",
            ));
        }

        let job = self.fetch(feed.job_id).await?;

        let touches_travel = feed.distance_km.is_some() || feed.travel_time_minutes.is_some();
        let touches_admin = feed.session_time_minutes.is_some()
            || feed.admin_comments.is_some()
            || flagged.is_some()
            || manually_handled.is_some()
            || by_admin.is_some();

        if touches_admin && !acting.is_admin() {
            return Err(BookingError::forbidden(
                "administrative fields require an admin",
            ));
        }
        if !acting.is_admin() && !job.involves_translator(acting.id) {
            return Err(BookingError::forbidden(
                "only the job's translator or an admin can report travel data",
            ));
        }

        if touches_travel {
            self.store
                .upsert_distance(feed.job_id, feed.distance_km, feed.travel_time_minutes)
                .await?;
        }
        if touches_admin {
            let patch = JobPatch {
                session_time_minutes: feed.session_time_minutes,
                admin_comments: feed
                    .admin_comments
                    .map(|c| if c.is_empty() { None } else { Some(c) }),
                flagged,
                manually_handled,
                by_admin,
                ..Default::default()
            };
            self.store.update_fields(feed.job_id, patch).await?;
        }

        info!("Service: distance feed applied to job {}", feed.job_id);
        Ok(())
    }

    /// Puts the job back on the board and re-offers it over push. Declines
    /// are wiped so the offer reaches everyone again.
    pub async fn resend_notifications(&self, acting: &User, id: JobId) -> Result<Job, BookingError> {
        self.resend(acting, id, Channel::Push).await
    }

    /// SMS variant of `resend_notifications`.
    pub async fn resend_sms_notifications(
        &self,
        acting: &User,
        id: JobId,
    ) -> Result<Job, BookingError> {
        self.resend(acting, id, Channel::Sms).await
    }

    async fn resend(&self, acting: &User, id: JobId, channel: Channel) -> Result<Job, BookingError> {
        if !acting.is_admin() {
            return Err(BookingError::forbidden("only admins can resend offers"));
        }
        let job = self.lifecycle.open(id).await?;
        self.store.clear_declines(id).await?;
        self.offer_to_candidates(&job, channel).await?;
        Ok(job)
    }
}
