//! Persisted view configuration.
//!
//! Column layout and the filter snapshot of one listing view live in a
//! single versioned JSON document. It is loaded when the view mounts and
//! saved when it unmounts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ViewConfigError;
use crate::listing::{QueryParams, Resource};

/// Current document version.
pub const VIEW_CONFIG_VERSION: u32 = 1;

/// Width used for columns without a stored width.
pub const DEFAULT_COLUMN_WIDTH: u32 = 150;

/// Smallest width a column may be resized to.
pub const MIN_COLUMN_WIDTH: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub version: u32,

    /// Column width in pixels, by field name.
    #[serde(default)]
    pub column_widths: BTreeMap<String, u32>,

    /// Fields shown, by field name.
    #[serde(default)]
    pub visible_columns: Vec<String>,

    /// Display order of every field.
    #[serde(default)]
    pub column_order: Vec<String>,

    /// Filter and sort parameters, without paging.
    #[serde(default)]
    pub filters: QueryParams,
}

impl ViewConfig {
    /// Default layout: every export column, visible, in declared order.
    pub fn for_resource(resource: Resource) -> Self {
        let columns: Vec<String> = resource
            .spec()
            .export_columns
            .iter()
            .map(|c| c.field.to_string())
            .collect();

        Self {
            version: VIEW_CONFIG_VERSION,
            column_widths: BTreeMap::new(),
            visible_columns: columns.clone(),
            column_order: columns,
            filters: QueryParams::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ViewConfigError> {
        let bytes = std::fs::read(path)?;
        let config: ViewConfig = serde_json::from_slice(&bytes)?;
        if config.version != VIEW_CONFIG_VERSION {
            return Err(ViewConfigError::UnsupportedVersion(config.version));
        }
        Ok(config)
    }

    /// Load `path`, falling back to the resource default when the file is
    /// missing, unreadable or from another version.
    pub fn load_or_default(path: &Path, resource: Resource) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ViewConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::for_resource(resource)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring saved view config");
                Self::for_resource(resource)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ViewConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn column_width(&self, field: &str) -> u32 {
        self.column_widths
            .get(field)
            .copied()
            .unwrap_or(DEFAULT_COLUMN_WIDTH)
    }

    pub fn set_column_width(&mut self, field: &str, width: u32) {
        self.column_widths
            .insert(field.to_string(), width.max(MIN_COLUMN_WIDTH));
    }

    /// Show or hide a column; returns whether it is now visible.
    ///
    /// The last visible column cannot be hidden.
    pub fn toggle_column(&mut self, field: &str) -> bool {
        if let Some(pos) = self.visible_columns.iter().position(|c| c == field) {
            if self.visible_columns.len() > 1 {
                self.visible_columns.remove(pos);
                return false;
            }
            return true;
        }
        self.visible_columns.push(field.to_string());
        true
    }

    /// Move `field` to position `to` in the display order.
    pub fn move_column(&mut self, field: &str, to: usize) {
        if let Some(from) = self.column_order.iter().position(|c| c == field) {
            let column = self.column_order.remove(from);
            let to = to.min(self.column_order.len());
            self.column_order.insert(to, column);
        }
    }

    /// Visible columns in display order.
    pub fn displayed_columns(&self) -> Vec<&str> {
        self.column_order
            .iter()
            .filter(|c| self.visible_columns.contains(*c))
            .map(String::as_str)
            .collect()
    }
}
