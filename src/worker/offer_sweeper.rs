use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::domain::{JobId, JobPayload, JobStatus, NotificationEvent};
use crate::error::StoreError;
use crate::notify::{deliver, NotificationGateway};
use crate::store::{JobFilter, JobPatch, JobStore, UserDirectory};

/// Background worker that retires offers nobody accepted.
///
/// # Architecture
/// - Wakes up on a fixed interval
/// - Queries open jobs whose acceptance window has passed
/// - Cancels each with a compare-and-swap on `Open`, marking it timed out
/// - Tells the customer their booking expired
///
/// A job accepted between the query and the swap makes the swap fail with a
/// conflict; the sweeper skips it and the acceptance stands.
pub struct OfferSweeper {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn UserDirectory>,
    push: Arc<dyn NotificationGateway>,
    interval: Duration,
    notify_timeout: Duration,
}

impl OfferSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        directory: Arc<dyn UserDirectory>,
        push: Arc<dyn NotificationGateway>,
        interval: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            push,
            interval,
            notify_timeout,
        }
    }

    /// Runs until the shutdown channel flips to true.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Offer sweeper started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = sleep(self.interval) => {
                    match self.sweep_once().await {
                        Ok(0) => debug!("Sweep pass found nothing to retire"),
                        Ok(retired) => info!("Sweep pass retired {} expired offers", retired),
                        Err(e) => error!("Sweep pass failed: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Offer sweeper received shutdown signal, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep pass. Returns how many jobs were retired.
    pub async fn sweep_once(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let expired = self
            .store
            .query(&JobFilter {
                statuses: Some(vec![JobStatus::Open]),
                expires_before: Some(now),
                ..Default::default()
            })
            .await?;

        let mut retired = 0;
        for job in expired {
            match self.retire(job.id).await {
                Ok(true) => retired += 1,
                Ok(false) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(retired)
    }

    async fn retire(&self, id: JobId) -> Result<bool, StoreError> {
        let patch = JobPatch {
            status: Some(JobStatus::Cancelled),
            timed_out: Some(true),
            ..Default::default()
        };
        let cancelled = match self.store.conditional_update(id, JobStatus::Open, patch).await {
            Ok(job) => job,
            Err(StoreError::Conflict(_)) => {
                // Someone accepted while we were sweeping; their write wins.
                debug!("Job {} changed during sweep, skipping", id);
                return Ok(false);
            }
            Err(StoreError::NotFound) => {
                debug!("Job {} disappeared during sweep, skipping", id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        info!("Job {} expired with no acceptance, cancelled", id);

        let event = NotificationEvent::BookingExpired {
            job: JobPayload::from(&cancelled),
        };
        match self.directory.get(cancelled.customer).await {
            Ok(Some(customer)) => {
                deliver(self.push.as_ref(), &customer, &event, self.notify_timeout).await
            }
            Ok(None) => debug!("Customer {} not found for expiry notice", cancelled.customer),
            Err(e) => error!(
                "Directory lookup for customer {} failed: {}",
                cancelled.customer, e
            ),
        }

        Ok(true)
    }
}
