use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::{Job, JobId, LanguagePair};

/// Snapshot of the job fields a notification carries. Always derived from
/// the record at dispatch time, never replayed from an earlier state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPayload {
    pub job_id: JobId,
    pub language_pair: LanguagePair,
    pub due: DateTime<Utc>,
    pub duration_minutes: i32,
    pub certified_required: bool,
}

impl From<&Job> for JobPayload {
    fn from(job: &Job) -> Self {
        JobPayload {
            job_id: job.id,
            language_pair: job.language_pair.clone(),
            due: job.due,
            duration_minutes: job.duration_minutes,
            certified_required: job.certified_required,
        }
    }
}

/// Everything the booking flow tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A job is on the board and the recipient matches it.
    JobOffered { job: JobPayload },
    /// Acceptance went through; sent to the winner and the customer.
    AssignmentConfirmed { job: JobPayload },
    /// Someone else took the job; sent to the remaining candidates.
    JobNoLongerAvailable { job_id: JobId },
    /// The booking was cancelled while a translator held it.
    JobCancelled { job: JobPayload },
    /// The session finished and a session time was recorded.
    SessionEnded { job: JobPayload },
    /// Nobody accepted before the offer window closed.
    BookingExpired { job: JobPayload },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::JobOffered { .. } => "job_offered",
            NotificationEvent::AssignmentConfirmed { .. } => "assignment_confirmed",
            NotificationEvent::JobNoLongerAvailable { .. } => "job_no_longer_available",
            NotificationEvent::JobCancelled { .. } => "job_cancelled",
            NotificationEvent::SessionEnded { .. } => "session_ended",
            NotificationEvent::BookingExpired { .. } => "booking_expired",
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            NotificationEvent::JobOffered { job }
            | NotificationEvent::AssignmentConfirmed { job }
            | NotificationEvent::JobCancelled { job }
            | NotificationEvent::SessionEnded { job }
            | NotificationEvent::BookingExpired { job } => job.job_id,
            NotificationEvent::JobNoLongerAvailable { job_id } => *job_id,
        }
    }

    /// Human-readable body used by text-oriented channels.
    pub fn render_text(&self) -> String {
        match self {
            NotificationEvent::JobOffered { job } => format!(
                "New booking #{}: {}{} on {} ({} min). Accept it from your job board.",
                job.job_id,
                job.language_pair,
                if job.certified_required { " (certified)" } else { "" },
                job.due.format("%Y-%m-%d %H:%M"),
                job.duration_minutes,
            ),
            NotificationEvent::AssignmentConfirmed { job } => format!(
                "Booking #{} is confirmed: {} on {}.",
                job.job_id,
                job.language_pair,
                job.due.format("%Y-%m-%d %H:%M"),
            ),
            NotificationEvent::JobNoLongerAvailable { job_id } => {
                format!("Booking #{} has been taken by another translator.", job_id)
            }
            NotificationEvent::JobCancelled { job } => format!(
                "Booking #{} on {} has been cancelled.",
                job.job_id,
                job.due.format("%Y-%m-%d %H:%M"),
            ),
            NotificationEvent::SessionEnded { job } => {
                format!("Booking #{} has ended. Thanks for using our services.", job.job_id)
            }
            NotificationEvent::BookingExpired { job } => format!(
                "Booking #{} expired with no translator accepting it. You can post it again.",
                job.job_id,
            ),
        }
    }
}
