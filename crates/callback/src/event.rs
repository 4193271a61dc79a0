//! Callback events and their factories.

use chrono::{DateTime, Utc};
use common::{EventId, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Event type for project lifecycle events.
pub const TYPE_PROJECT: &str = "project";
/// Event type for repository lifecycle events.
pub const TYPE_REPOSITORY: &str = "repository";
/// Event type for distributed transaction outcomes.
pub const TYPE_TRANSACTION: &str = "transaction";
/// Event type for compensation notices.
pub const TYPE_COMPENSATION: &str = "compensation";

/// Which service produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    ProjectService,
    GitGateway,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::ProjectService => "project-service",
            EventSource::GitGateway => "git-gateway",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured event delivered to webhook receivers.
///
/// The JSON form of this struct is the callback request body. An event id is
/// only ever paired with one payload; receivers deduplicate on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub source: EventSource,
    pub resource: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub retry_count: u32,
}

impl CallbackEvent {
    /// Creates an event with a fresh id, normalising `resource` to a JSON object.
    pub fn new<R: Serialize + ?Sized>(
        event_type: impl Into<String>,
        action: impl Into<String>,
        source: EventSource,
        project_id: Option<ProjectId>,
        resource: &R,
    ) -> Result<Self> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            action: action.into(),
            timestamp: Utc::now(),
            project_id,
            source,
            resource: to_object(resource)?,
            metadata: Map::new(),
            retry_count: 0,
        })
    }

    /// A project lifecycle event from the project service.
    pub fn project_event<R: Serialize + ?Sized>(
        action: impl Into<String>,
        project_id: ProjectId,
        resource: &R,
    ) -> Result<Self> {
        Self::new(
            TYPE_PROJECT,
            action,
            EventSource::ProjectService,
            Some(project_id),
            resource,
        )
    }

    /// A repository lifecycle event.
    pub fn repository_event<R: Serialize + ?Sized>(
        action: impl Into<String>,
        project_id: ProjectId,
        resource: &R,
        source: EventSource,
    ) -> Result<Self> {
        Self::new(TYPE_REPOSITORY, action, source, Some(project_id), resource)
    }

    /// A distributed transaction outcome.
    pub fn transaction_event<R: Serialize + ?Sized>(
        action: impl Into<String>,
        project_id: ProjectId,
        resource: &R,
    ) -> Result<Self> {
        Self::new(
            TYPE_TRANSACTION,
            action,
            EventSource::ProjectService,
            Some(project_id),
            resource,
        )
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `type.action` key used by event masks.
    pub fn key(&self) -> String {
        format!("{}.{}", self.event_type, self.action)
    }
}

/// Converts any serialisable value into a JSON object.
///
/// Objects pass through, `null` becomes an empty object, and any other value
/// is wrapped as `{"value": ...}`.
fn to_object<R: Serialize + ?Sized>(resource: &R) -> Result<Map<String, Value>> {
    Ok(match serde_json::to_value(resource)? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    })
}
