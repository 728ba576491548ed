//! Catalog metadata carried in the `.catalog` section of a rancher-compose
//! document.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::Result;
use crate::raw::CATALOG_KEY;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Question {
    #[serde(deserialize_with = "crate::de::string")]
    pub variable: String,
    #[serde(deserialize_with = "crate::de::string")]
    pub label: String,
    #[serde(deserialize_with = "crate::de::string")]
    pub description: String,
    #[serde(rename = "type", deserialize_with = "crate::de::string")]
    pub kind: String,
    #[serde(deserialize_with = "crate::de::lenient_bool")]
    pub required: bool,
    #[serde(deserialize_with = "crate::de::string")]
    pub default: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogInfo {
    #[serde(deserialize_with = "crate::de::string")]
    pub name: String,
    #[serde(deserialize_with = "crate::de::string")]
    pub version: String,
    #[serde(deserialize_with = "crate::de::string")]
    pub description: String,
    pub questions: Vec<Question>,
}

impl CatalogInfo {
    /// Default answer for every question, keyed by variable.
    pub fn question_defaults(&self) -> IndexMap<String, String> {
        self.questions
            .iter()
            .filter(|q| !q.variable.is_empty())
            .map(|q| (q.variable.clone(), q.default.clone()))
            .collect()
    }
}

/// Reads the catalog section of a rancher-compose document. Documents
/// without one yield an empty [`CatalogInfo`].
pub fn parse_catalog(contents: &str) -> Result<CatalogInfo> {
    if contents.trim().is_empty() {
        return Ok(CatalogInfo::default());
    }
    let document: Option<IndexMap<String, Value>> = serde_yaml::from_str(contents)?;
    match document.and_then(|mut doc| doc.shift_remove(CATALOG_KEY)) {
        Some(section) => Ok(serde_yaml::from_value(section)?),
        None => Ok(CatalogInfo::default()),
    }
}
