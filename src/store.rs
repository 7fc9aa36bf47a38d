//! Dashboard state persisted in sled.
//!
//! The whole dashboard (widgets plus theme) is one JSON blob under a fixed
//! key, so every mutation is a read-modify-write of that blob.

use crate::error::StoreError;
use crate::widget::{Theme, WidgetConfig};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const STATE_KEY: &str = "finance-dashboard-state";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardState {
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
    #[serde(default)]
    pub theme: Theme,
}

impl DashboardState {
    pub fn widget(&self, id: &str) -> Option<&WidgetConfig> {
        self.widgets.iter().find(|w| w.id == id)
    }
}

pub struct DashboardStore {
    db: sled::Db,
}

impl DashboardStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        debug!(path = %path.display(), "store_opened");
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    /// Current state, or the default state when nothing was saved yet.
    pub fn load(&self) -> Result<DashboardState, StoreError> {
        match self.db.get(STATE_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(DashboardState::default()),
        }
    }

    pub fn save(&self, state: &DashboardState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        self.db.insert(STATE_KEY, bytes)?;
        // block until the write is stable on disk
        self.db.flush()?;
        Ok(())
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut DashboardState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    pub fn add_widget(&self, widget: WidgetConfig) -> Result<DashboardState, StoreError> {
        info!(widget_id = %widget.id, name = %widget.name, "widget_added");
        self.modify(|state| {
            state.widgets.push(widget);
            Ok(state.clone())
        })
    }

    pub fn remove_widget(&self, id: &str) -> Result<DashboardState, StoreError> {
        self.modify(|state| {
            let before = state.widgets.len();
            state.widgets.retain(|w| w.id != id);
            if state.widgets.len() == before {
                return Err(StoreError::WidgetNotFound(id.to_string()));
            }
            info!(widget_id = %id, "widget_removed");
            Ok(state.clone())
        })
    }

    /// Apply `patch` to one widget and stamp its `last_updated`.
    pub fn update_widget(
        &self,
        id: &str,
        patch: impl FnOnce(&mut WidgetConfig),
    ) -> Result<WidgetConfig, StoreError> {
        self.modify(|state| {
            let widget = state
                .widgets
                .iter_mut()
                .find(|w| w.id == id)
                .ok_or_else(|| StoreError::WidgetNotFound(id.to_string()))?;
            patch(widget);
            widget.last_updated = Some(Utc::now());
            Ok(widget.clone())
        })
    }

    /// Keep exactly the listed widgets, in the listed order.
    pub fn reorder_widgets(&self, ids: &[String]) -> Result<DashboardState, StoreError> {
        self.modify(|state| {
            let mut old = std::mem::take(&mut state.widgets);
            for id in ids {
                if let Some(pos) = old.iter().position(|w| &w.id == id) {
                    state.widgets.push(old.remove(pos));
                }
            }
            Ok(state.clone())
        })
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.modify(|state| {
            state.theme = theme;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{DisplayMode, FieldFormat, ValueType, WidgetField};

    fn store() -> DashboardStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        DashboardStore::from_db(db)
    }

    fn widget(id: &str) -> WidgetConfig {
        let field = WidgetField::new("price.current", "Price", ValueType::Number, None)
            .with_format(FieldFormat::Currency);
        let mut w = WidgetConfig::new("Quote", "https://api.example.com/q", vec![field], DisplayMode::Card);
        w.id = id.to_string();
        w
    }

    #[test]
    fn test_load_empty_store_is_default() {
        assert_eq!(store().load().unwrap(), DashboardState::default());
    }

    #[test]
    fn test_dates_round_trip() {
        let store = store();
        let mut w = widget("widget-1");
        w.last_updated = Some(Utc::now());
        store.add_widget(w.clone()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.widgets[0].created_at, w.created_at);
        assert_eq!(loaded.widgets[0].last_updated, w.last_updated);
        assert_eq!(loaded.widgets[0], w);
    }

    #[test]
    fn test_missing_created_at_defaults_to_now() {
        let store = store();
        let blob = serde_json::json!({
            "widgets": [{
                "id": "widget-7", "name": "Old", "apiUrl": "https://x.test",
                "refreshInterval": 0, "fields": [], "type": "table"
            }],
            "theme": "light"
        });
        store.db.insert(STATE_KEY, serde_json::to_vec(&blob).unwrap()).unwrap();

        let before = Utc::now();
        let state = store.load().unwrap();
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(state.widgets[0].display_mode, DisplayMode::Table);
        assert!(state.widgets[0].created_at >= before);
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let store = store();
        store.db.insert(STATE_KEY, b"not json".to_vec()).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Serde(_))));
    }

    #[test]
    fn test_remove_widget() {
        let store = store();
        store.add_widget(widget("a")).unwrap();
        store.add_widget(widget("b")).unwrap();
        let state = store.remove_widget("a").unwrap();
        assert_eq!(state.widgets.len(), 1);
        assert!(matches!(store.remove_widget("a"), Err(StoreError::WidgetNotFound(_))));
    }

    #[test]
    fn test_update_widget_stamps_last_updated() {
        let store = store();
        store.add_widget(widget("a")).unwrap();
        let updated = store.update_widget("a", |w| w.refresh_interval = 120).unwrap();
        assert_eq!(updated.refresh_interval, 120);
        assert!(updated.last_updated.is_some());
        assert_eq!(store.load().unwrap().widget("a"), Some(&updated));
    }

    #[test]
    fn test_reorder_drops_unlisted() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.add_widget(widget(id)).unwrap();
        }
        let ids = vec!["c".to_string(), "zzz".to_string(), "a".to_string()];
        let state = store.reorder_widgets(&ids).unwrap();
        let order: Vec<&str> = state.widgets.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a"]);
    }

    #[test]
    fn test_set_theme_persists() {
        let store = store();
        store.add_widget(widget("a")).unwrap();
        store.set_theme(Theme::Light).unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(state.widgets.len(), 1);
    }
}
