//! Widget record value object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::foundation::{Timestamp, WidgetId, WorkerId};

/// One registered widget: its rendered document, optional connection
/// token, and ownership metadata.
///
/// Records are upserted whole — re-registering an id replaces the previous
/// record. `widget_id` is globally unique within a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRecord {
    /// Unique widget identifier.
    pub widget_id: WidgetId,

    /// Current rendered HTML document.
    pub html: String,

    /// Optional per-widget secret used to authenticate its live connection.
    pub token: Option<String>,

    /// When the widget was first registered.
    pub created_at: Timestamp,

    /// Worker that registered the widget.
    pub owner_worker_id: Option<WorkerId>,

    /// Open metadata map for collaborating layers.
    pub metadata: Map<String, Value>,
}

impl WidgetRecord {
    /// Creates a new widget record with the given id and document.
    pub fn new(widget_id: WidgetId, html: impl Into<String>) -> Self {
        Self {
            widget_id,
            html: html.into(),
            token: None,
            created_at: Timestamp::now(),
            owner_worker_id: None,
            metadata: Map::new(),
        }
    }

    /// Sets the connection token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the registering worker.
    pub fn with_owner(mut self, worker_id: WorkerId) -> Self {
        self.owner_worker_id = Some(worker_id);
        self
    }

    /// Replaces the metadata map.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
