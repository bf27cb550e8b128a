//! In-memory widget store for single-worker deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::{StoreError, WidgetId, WidgetRecord};
use crate::ports::WidgetStore;

/// Single-process widget registry.
///
/// One coarse mutex guards the map — operations are O(1) map access, so
/// contention is negligible. Records live until explicitly deleted; there
/// is no TTL in memory mode.
#[derive(Debug, Default)]
pub struct MemoryWidgetStore {
    widgets: Mutex<HashMap<WidgetId, WidgetRecord>>,
}

impl MemoryWidgetStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WidgetStore for MemoryWidgetStore {
    async fn register(&self, record: WidgetRecord) -> Result<(), StoreError> {
        let mut widgets = self.widgets.lock().await;
        tracing::debug!(widget_id = %record.widget_id, "registering widget");
        widgets.insert(record.widget_id.clone(), record);
        Ok(())
    }

    async fn get(&self, widget_id: &WidgetId) -> Result<Option<WidgetRecord>, StoreError> {
        Ok(self.widgets.lock().await.get(widget_id).cloned())
    }

    async fn get_html(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError> {
        Ok(self
            .widgets
            .lock()
            .await
            .get(widget_id)
            .map(|r| r.html.clone()))
    }

    async fn get_token(&self, widget_id: &WidgetId) -> Result<Option<String>, StoreError> {
        Ok(self
            .widgets
            .lock()
            .await
            .get(widget_id)
            .and_then(|r| r.token.clone()))
    }

    async fn exists(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        Ok(self.widgets.lock().await.contains_key(widget_id))
    }

    async fn update_html(&self, widget_id: &WidgetId, html: &str) -> Result<bool, StoreError> {
        let mut widgets = self.widgets.lock().await;
        match widgets.get_mut(widget_id) {
            Some(record) => {
                record.html = html.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_token(&self, widget_id: &WidgetId, token: &str) -> Result<bool, StoreError> {
        let mut widgets = self.widgets.lock().await;
        match widgets.get_mut(widget_id) {
            Some(record) => {
                record.token = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, widget_id: &WidgetId) -> Result<bool, StoreError> {
        Ok(self.widgets.lock().await.remove(widget_id).is_some())
    }

    async fn list_active(&self) -> Result<Vec<WidgetId>, StoreError> {
        Ok(self.widgets.lock().await.keys().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.widgets.lock().await.len())
    }
}
