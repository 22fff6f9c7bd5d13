pub mod job;
pub mod notification;
pub mod user;

pub use job::{offer_expires_at, Distance, Job, JobId, JobStatus, LanguagePair, NewJob};
pub use notification::{JobPayload, NotificationEvent};
pub use user::{Role, User, UserId};
