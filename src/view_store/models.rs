use chrono::{DateTime, Utc};

/// A durable "user viewed post" record.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord {
    pub user_id: i64,
    pub post_id: i64,
    pub viewed_at: DateTime<Utc>,
}

impl ViewRecord {
    pub fn new(user_id: i64, post_id: i64, viewed_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            post_id,
            viewed_at,
        }
    }
}
