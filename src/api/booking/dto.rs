use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::booking::{DistanceFeed, JobDetails, JobUpdate};
use crate::domain::{Job, JobId, JobStatus, LanguagePair, UserId};
use crate::error::BookingError;
use crate::store::{JobFilter, JobOrder};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(
        min = 2,
        max = 16,
        message = "Source language must be between 2 and 16 characters"
    ))]
    pub from_language: String,
    #[validate(length(
        min = 2,
        max = 16,
        message = "Target language must be between 2 and 16 characters"
    ))]
    pub to_language: String,
    pub due: DateTime<Utc>,
    #[validate(range(
        min = 1,
        max = 1440,
        message = "Duration must be between 1 and 1440 minutes"
    ))]
    pub duration_minutes: i32,
    #[serde(default)]
    pub certified_required: bool,
}

impl CreateJobRequest {
    pub fn into_details(self) -> JobDetails {
        JobDetails {
            language_pair: LanguagePair::new(self.from_language, self.to_language),
            certified_required: self.certified_required,
            due: self.due,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Booking update. Unknown fields are rejected outright so a stray `status`
/// key cannot slip through and silently do nothing.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateJobRequest {
    #[validate(length(
        min = 2,
        max = 16,
        message = "Source language must be between 2 and 16 characters"
    ))]
    pub from_language: Option<String>,
    #[validate(length(
        min = 2,
        max = 16,
        message = "Target language must be between 2 and 16 characters"
    ))]
    pub to_language: Option<String>,
    pub due: Option<DateTime<Utc>>,
    #[validate(range(
        min = 1,
        max = 1440,
        message = "Duration must be between 1 and 1440 minutes"
    ))]
    pub duration_minutes: Option<i32>,
    pub certified_required: Option<bool>,
    pub flagged: Option<bool>,
    pub manually_handled: Option<bool>,
    pub by_admin: Option<bool>,
    /// An empty string clears the stored comment.
    pub admin_comments: Option<String>,
}

impl UpdateJobRequest {
    pub fn into_update(self) -> Result<JobUpdate, BookingError> {
        let language_pair = match (self.from_language, self.to_language) {
            (Some(from), Some(to)) => Some(LanguagePair::new(from, to)),
            (None, None) => None,
            _ => {
                return Err(BookingError::validation(
                    "from_language and to_language must be supplied together",
                ))
            }
        };
        Ok(JobUpdate {
            language_pair,
            certified_required: self.certified_required,
            due: self.due,
            duration_minutes: self.duration_minutes,
            flagged: self.flagged,
            manually_handled: self.manually_handled,
            by_admin: self.by_admin,
            admin_comments: self
                .admin_comments
                .map(|c| if c.is_empty() { None } else { Some(c) }),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptJobRequest {
    #[validate(range(min = 1, message = "job_id must be positive"))]
    pub job_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DistanceFeedRequest {
    #[validate(range(min = 1, message = "job_id must be positive"))]
    pub job_id: i64,
    #[validate(range(min = 0.0, message = "Distance must not be negative"))]
    pub distance_km: Option<f64>,
    #[validate(range(min = 0, message = "Travel time must not be negative"))]
    pub travel_time_minutes: Option<i32>,
    #[validate(range(min = 0, message = "Session time must not be negative"))]
    pub session_time_minutes: Option<i32>,
    /// An empty string clears the stored comment.
    pub admin_comments: Option<String>,
    /// Exactly "true" or "false"; anything else is rejected.
    pub flagged: Option<String>,
    pub manually_handled: Option<String>,
    pub by_admin: Option<String>,
}

impl DistanceFeedRequest {
    pub fn into_feed(self) -> DistanceFeed {
        DistanceFeed {
            job_id: JobId(self.job_id),
            distance_km: self.distance_km,
            travel_time_minutes: self.travel_time_minutes,
            session_time_minutes: self.session_time_minutes,
            admin_comments: self.admin_comments,
            flagged: self.flagged,
            manually_handled: self.manually_handled,
            by_admin: self.by_admin,
        }
    }
}

/// Query parameters for the jobs listing. With `user_id` it is the personal
/// listing; without it an admin-wide search.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub user_id: Option<i64>,
    pub status: Option<String>,
    pub language: Option<String>,
    pub customer_id: Option<i64>,
    pub translator_id: Option<i64>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, BookingError> {
        let statuses = match self.status {
            Some(raw) => Some(vec![raw.parse::<JobStatus>().map_err(BookingError::Validation)?]),
            None => None,
        };
        Ok(JobFilter {
            statuses,
            customer: self.customer_id.map(UserId),
            translator: self.translator_id.map(UserId),
            language: self.language,
            due_after: self.due_after,
            due_before: self.due_before,
            expires_before: None,
            order: JobOrder::DueAsc,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub page: Option<i64>,
}

/// Response for operations returning a single booking
#[derive(Serialize)]
pub struct JobResponse {
    pub message: String,
    pub job: Job,
}

/// Response for listing operations
#[derive(Serialize)]
pub struct JobListResponse {
    pub message: String,
    pub count: usize,
    pub jobs: Vec<Job>,
}

/// Response for operations with nothing else to say
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_requires_both_languages_together() {
        let half = UpdateJobRequest {
            from_language: Some("sv".to_string()),
            to_language: None,
            due: None,
            duration_minutes: None,
            certified_required: None,
            flagged: None,
            manually_handled: None,
            by_admin: None,
            admin_comments: None,
        };
        assert!(matches!(
            half.into_update(),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn empty_comment_clears_the_stored_one() {
        let request = UpdateJobRequest {
            from_language: None,
            to_language: None,
            due: None,
            duration_minutes: None,
            certified_required: None,
            flagged: None,
            manually_handled: None,
            by_admin: None,
            admin_comments: Some(String::new()),
        };
        let update = request.into_update().unwrap();
        assert_eq!(update.admin_comments, Some(None));
    }

    #[test]
    fn list_query_rejects_unknown_status() {
        let query = ListJobsQuery {
            user_id: None,
            status: Some("paused".to_string()),
            language: None,
            customer_id: None,
            translator_id: None,
            due_after: None,
            due_before: None,
            limit: None,
            offset: None,
        };
        assert!(matches!(
            query.into_filter(),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn list_query_maps_onto_a_filter() {
        let query = ListJobsQuery {
            user_id: None,
            status: Some("open".to_string()),
            language: Some("sv".to_string()),
            customer_id: Some(4),
            translator_id: None,
            due_after: None,
            due_before: None,
            limit: Some(10),
            offset: None,
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(filter.statuses, Some(vec![JobStatus::Open]));
        assert_eq!(filter.customer, Some(UserId(4)));
        assert_eq!(filter.language.as_deref(), Some("sv"));
        assert_eq!(filter.limit, Some(10));
    }
}
