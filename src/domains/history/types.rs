use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user whose call history is exported.
///
/// `name` is free text and is only used to name the exported artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} ({})", self.id, self.name)
    }
}

/// One row of the `api_calls` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub id: i64,
    pub endpoint: String,
    pub call_timestamp: DateTime<Utc>,
}

impl ApiCallRecord {
    pub fn new(id: i64, endpoint: impl Into<String>, call_timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            call_timestamp,
        }
    }
}
