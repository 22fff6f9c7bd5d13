pub mod lifecycle;
pub mod matcher;
pub mod service;

pub use lifecycle::{JobDetails, JobLifecycle, JobUpdate};
pub use matcher::{is_eligible, Accepted, AssignmentMatcher};
pub use service::{BookingService, BookingSettings, DistanceFeed, HISTORY_PAGE_SIZE};
