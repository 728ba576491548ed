//! Extraction of Kubernetes manifests from multi-document YAML.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::Result;

/// One manifest, named `Kind/metadata.name`.
#[derive(Debug, Clone, PartialEq)]
pub struct KubernetesResource {
    pub kind: String,
    pub name: String,
    pub contents: Value,
}

impl KubernetesResource {
    pub fn combined_name(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Header {
    #[serde(deserialize_with = "crate::de::string")]
    kind: String,
    metadata: Metadata,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Metadata {
    #[serde(deserialize_with = "crate::de::string")]
    name: String,
}

/// Splits `contents` on `---` separator lines. The separator line starts
/// the next document.
pub fn split_documents(contents: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in contents.lines() {
        if line.trim_matches([' ', '\t']) == "---" {
            if !current.is_empty() {
                documents.push(current.join("\n"));
            }
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        documents.push(current.join("\n"));
    }
    documents
}

/// Parses a single document, returning `None` unless it has both a kind and
/// a metadata name.
pub fn get_resource(contents: &str) -> Result<Option<KubernetesResource>> {
    let Some(header) = serde_yaml::from_str::<Option<Header>>(contents).ok().flatten() else {
        return Ok(None);
    };
    if header.kind.is_empty() || header.metadata.name.is_empty() {
        return Ok(None);
    }
    let contents: Value = serde_yaml::from_str(contents)?;
    Ok(Some(KubernetesResource {
        kind: header.kind,
        name: header.metadata.name,
        contents,
    }))
}

/// Every Kubernetes manifest in `contents`, keyed by combined name.
pub fn get_resources(contents: &str) -> Result<IndexMap<String, KubernetesResource>> {
    let mut resources = IndexMap::new();
    for document in split_documents(contents) {
        if let Some(resource) = get_resource(&document)? {
            resources.insert(resource.combined_name(), resource);
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_resource() {
        let resource = get_resource("apiVersion: v1\nkind: Pod\nmetadata:\n  name: test\n")
            .unwrap()
            .unwrap();
        assert_eq!(resource.combined_name(), "Pod/test");
        assert_eq!(resource.contents["apiVersion"], Value::from("v1"));

        assert!(get_resource("s1:\n  image: nginx\n").unwrap().is_none());
        assert!(get_resource("services:\n  s1:\n    image: nginx\n").unwrap().is_none());
    }

    #[test]
    fn test_split_documents() {
        let docs = split_documents("a: 1\n---\nb: 2\n  ---  \nc: 3\n");
        assert_eq!(docs, vec!["a: 1", "---\nb: 2", "  ---  \nc: 3"]);
        assert_eq!(split_documents("---\na: 1").len(), 1);
    }

    #[test]
    fn test_get_resources() {
        let resources = get_resources(
            "kind: Service\nmetadata:\n  name: web\n---\nkind: Deployment\nmetadata:\n  name: web\n---\nweb:\n  image: nginx\n",
        )
        .unwrap();
        let names: Vec<_> = resources.keys().cloned().collect();
        assert_eq!(names, vec!["Service/web", "Deployment/web"]);
    }
}
