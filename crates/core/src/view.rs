//! View definitions and design documents
//!
//! Views are declared individually in configuration and grouped into design
//! documents before they are pushed to the store. Development views live in
//! a design document whose name carries the [`DEV_PREFIX`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix applied to design documents of development views.
pub const DEV_PREFIX: &str = "dev_";

/// Whether a view runs against the development or production index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Unindexed subset, design document name prefixed with `dev_`
    #[default]
    Development,
    /// Fully indexed, unprefixed
    Production,
}

impl ViewMode {
    /// Anything other than `"production"` (including no mode) is development.
    pub fn from_config(mode: Option<&str>) -> Self {
        match mode {
            Some("production") => ViewMode::Production,
            _ => ViewMode::Development,
        }
    }
}

/// A single view as declared by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    /// View name
    pub name: String,
    /// Unprefixed design document name
    pub design_document: String,
    /// Map function source
    pub map: String,
    /// Reduce function source, if any
    pub reduce: Option<String>,
    /// Development or production
    pub mode: ViewMode,
}

impl ViewDefinition {
    /// Design document name as stored, with the development prefix applied.
    pub fn design_document_name(&self) -> String {
        match self.mode {
            ViewMode::Production => self.design_document.clone(),
            ViewMode::Development => format!("{}{}", DEV_PREFIX, self.design_document),
        }
    }
}

/// A view as it appears inside a design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDesign {
    /// View name
    #[serde(skip)]
    pub name: String,
    /// Map function source
    pub map: String,
    /// Reduce function source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// A named group of views pushed to the store as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    /// Design document name (prefixed for development views)
    #[serde(skip)]
    pub name: String,
    /// Views keyed by name
    pub views: BTreeMap<String, ViewDesign>,
}

impl DesignDocument {
    /// Empty design document.
    pub fn new(name: impl Into<String>) -> Self {
        DesignDocument {
            name: name.into(),
            views: BTreeMap::new(),
        }
    }

    /// Add a view, replacing any view of the same name.
    pub fn add_view(&mut self, view: ViewDesign) {
        self.views.insert(view.name.clone(), view);
    }

    /// Look up a view by name.
    pub fn view(&self, name: &str) -> Option<&ViewDesign> {
        self.views.get(name)
    }
}

/// Design documents accumulated from view definitions.
///
/// Built once during provisioning and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesignRegistry {
    documents: BTreeMap<String, DesignDocument>,
}

impl DesignRegistry {
    /// Group view definitions by their (prefixed) design document.
    pub fn build(definitions: impl IntoIterator<Item = ViewDefinition>) -> Self {
        let mut documents: BTreeMap<String, DesignDocument> = BTreeMap::new();
        for def in definitions {
            let doc_name = def.design_document_name();
            documents
                .entry(doc_name.clone())
                .or_insert_with(|| DesignDocument::new(doc_name))
                .add_view(ViewDesign {
                    name: def.name,
                    map: def.map,
                    reduce: def.reduce,
                });
        }
        DesignRegistry { documents }
    }

    /// All design documents, ordered by name.
    pub fn documents(&self) -> impl Iterator<Item = &DesignDocument> {
        self.documents.values()
    }

    /// Look up a design document.
    pub fn get(&self, name: &str) -> Option<&DesignDocument> {
        self.documents.get(name)
    }

    /// Number of design documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when no views were declared
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, ddoc: &str, mode: ViewMode) -> ViewDefinition {
        ViewDefinition {
            name: name.to_string(),
            design_document: ddoc.to_string(),
            map: format!("function (doc, meta) {{ emit(doc.{}, null); }}", name),
            reduce: None,
            mode,
        }
    }

    #[test]
    fn test_mode_from_config() {
        assert_eq!(ViewMode::from_config(Some("production")), ViewMode::Production);
        assert_eq!(ViewMode::from_config(Some("development")), ViewMode::Development);
        assert_eq!(ViewMode::from_config(Some("dev_")), ViewMode::Development);
        assert_eq!(ViewMode::from_config(None), ViewMode::Development);
    }

    #[test]
    fn test_registry_groups_by_prefixed_design_document() {
        let registry = DesignRegistry::build(vec![
            def("by_name", "users", ViewMode::Development),
            def("by_age", "users", ViewMode::Development),
            def("by_email", "users", ViewMode::Production),
        ]);

        assert_eq!(registry.len(), 2);
        let dev = registry.get("dev_users").unwrap();
        assert_eq!(dev.views.len(), 2);
        assert!(dev.view("by_name").is_some());
        let prod = registry.get("users").unwrap();
        assert_eq!(prod.views.len(), 1);
    }

    #[test]
    fn test_registry_replaces_repeated_view() {
        let mut second = def("by_name", "users", ViewMode::Production);
        second.map = "function (doc) { emit(doc.fullName, null); }".to_string();
        let registry = DesignRegistry::build(vec![
            def("by_name", "users", ViewMode::Production),
            second.clone(),
        ]);

        let doc = registry.get("users").unwrap();
        assert_eq!(doc.views.len(), 1);
        assert_eq!(doc.view("by_name").unwrap().map, second.map);
    }

    #[test]
    fn test_design_document_serializes_views() {
        let mut doc = DesignDocument::new("users");
        doc.add_view(ViewDesign {
            name: "count".into(),
            map: "function (doc) { emit(doc.type, 1); }".into(),
            reduce: Some("_count".into()),
        });
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["views"]["count"]["reduce"], "_count");
        assert!(json.get("name").is_none());
    }
}
