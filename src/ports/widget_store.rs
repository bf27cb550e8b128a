//! WidgetStore port - CRUD and existence/TTL for widget records.

use async_trait::async_trait;

use crate::domain::{StoreError, WidgetId, WidgetRecord};

/// Port for the shared widget registry.
///
/// Implementations must treat `register` as an upsert (re-registering an
/// id replaces its record) and must never raise for missing ids — reads
/// return `None` and deletes return `false`. The Redis adapter refreshes
/// the record TTL on `update_html`/`update_token` (sliding expiry) so a
/// widget that is actively being updated is never evicted mid-flight.
#[async_trait]
pub trait WidgetStore: Send + Sync {
    /// Registers (or replaces) a widget record.
    async fn register(&self, record: WidgetRecord) -> Result<(), StoreError>;

    /// Fetches the full record for a widget.
    async fn get(&self, widget_id: &WidgetId) -> Result<Option<WidgetRecord>, StoreError>;

    /// Fetches only the rendered document.
    async fn get_html(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError>;

    /// Fetches only the connection token.
    ///
    /// `None` both when the widget is missing and when it has no token.
    async fn get_token(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError>;

    /// Whether the widget exists.
    async fn exists(&self, widget_id: &WidgetId) -> Result<bool, StoreError>;

    /// Replaces the rendered document; `false` if the widget is missing.
    async fn update_html(&self, widget_id: &WidgetId, html: &str) -> Result<bool, StoreError>;

    /// Replaces the connection token; `false` if the widget is missing.
    async fn update_token(&self, widget_id: &WidgetId, token: &str) -> Result<bool, StoreError>;

    /// Deletes the widget; `false` if it did not exist.
    async fn delete(&self, widget_id: &WidgetId) -> Result<bool, StoreError>;

    /// Lists ids of all active widgets.
    async fn list_active(&self) -> Result<Vec<WidgetId>, StoreError>;

    /// Number of active widgets.
    async fn count(&self) -> Result<usize, StoreError>;
}
