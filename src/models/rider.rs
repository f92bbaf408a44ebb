use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl Rider {
    pub fn new(name: String, phone: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            phone,
            created_at: Utc::now(),
        }
    }
}
