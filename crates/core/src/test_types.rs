//! Test types
//!
//! A test owns runs and the configuration that drives their processing.

use crate::pagination::SortDirection;
use crate::types::TestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    /// Test id
    pub id: TestId,
    /// Unique name
    pub name: String,
    /// Folder; `None` is the root folder
    pub folder: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Owning team
    pub owner: Option<String>,
    /// Labels whose values form the dataset fingerprint, in this order
    pub fingerprint_labels: Vec<String>,
}

/// Definition of a test before registration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestDef {
    /// Unique name
    pub name: String,
    /// Folder
    pub folder: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Owning team
    pub owner: Option<String>,
    /// Fingerprint labels
    pub fingerprint_labels: Vec<String>,
}

impl TestDef {
    /// Test in the root folder
    pub fn new(name: impl Into<String>) -> Self {
        TestDef {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Place the test in a folder
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Set the fingerprint labels
    pub fn fingerprint_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fingerprint_labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Kinds of per-test configuration deleted together with the test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    /// Notification actions
    Action,
    /// Change-detection variables
    Variable,
    /// UI views
    View,
    /// Watch subscriptions
    Subscription,
}

/// A named configuration item attached to a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    /// Kind of item
    pub kind: ConfigKind,
    /// Name, unique per kind within the test
    pub name: String,
    /// Opaque body interpreted by the owning collaborator
    pub body: Value,
}

/// Folder selection for test listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FolderFilter {
    /// Every folder (`None` or `"*"`)
    #[default]
    All,
    /// The root folder only (`""`)
    Root,
    /// Exactly this folder
    Named(String),
}

impl FolderFilter {
    /// Interpret a folder query parameter
    pub fn parse(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("*") => FolderFilter::All,
            Some("") => FolderFilter::Root,
            Some(name) => FolderFilter::Named(name.to_string()),
        }
    }

    /// Whether a test in `folder` is selected
    pub fn matches(&self, folder: Option<&str>) -> bool {
        match self {
            FolderFilter::All => true,
            FolderFilter::Root => folder.map_or(true, str::is_empty),
            FolderFilter::Named(name) => folder == Some(name.as_str()),
        }
    }
}

/// Test listing query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestListQuery {
    /// Folder selection
    pub folder: FolderFilter,
    /// Page size; unlimited when absent
    pub limit: Option<usize>,
    /// 1-based page
    pub page: Option<usize>,
    /// Name ordering
    pub direction: SortDirection,
}
