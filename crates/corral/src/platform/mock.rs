//! In-memory control plane for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ControlPlane, Filters, PlatformError, PlatformResult};

/// Stores resources as JSON per collection and records every mutating
/// call so tests can assert on them.
pub struct MockControlPlane {
    pub resources: Mutex<HashMap<String, Vec<Value>>>,
    pub creates: Mutex<Vec<(String, Value)>>,
    pub updates: Mutex<Vec<(String, String, Value)>>,
    pub deletes: Mutex<Vec<(String, String)>>,
    pub actions: Mutex<Vec<(String, String, String)>>,
    /// Collections whose create calls are rejected.
    pub reject_creates: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(value: &Value, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| {
        if key == Filters::REMOVED_NULL {
            return value.get("removed").map_or(true, Value::is_null);
        }
        match value.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => expected.is_empty(),
            Some(other) => other.to_string() == expected,
        }
    })
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            reject_creates: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores `value` directly, assigning an id when missing.
    pub fn insert(&self, collection: &str, mut value: Value) -> String {
        let id = match value.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("1{}{}", &collection[..1], self.next_id.fetch_add(1, Ordering::SeqCst));
                value["id"] = json!(id);
                id
            }
        };
        self.resources
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(value);
        id
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.resources
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|items| items.iter().find(|v| v["id"] == id).cloned())
    }

    /// Patches fields of a stored resource.
    pub fn set(&self, collection: &str, id: &str, patch: Value) {
        let mut resources = self.resources.lock().unwrap();
        if let Some(item) = resources
            .get_mut(collection)
            .and_then(|items| items.iter_mut().find(|v| v["id"] == id))
        {
            if let (Some(target), Some(patch)) = (item.as_object_mut(), patch.as_object()) {
                for (k, v) in patch {
                    target.insert(k.clone(), v.clone());
                }
            }
        }
    }

    pub fn count(&self, collection: &str) -> usize {
        self.resources
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Bodies of every create call made on `collection`.
    pub fn created(&self, collection: &str) -> Vec<Value> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Names of every action invoked, in order.
    pub fn action_names(&self) -> Vec<String> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    fn url(&self) -> &str {
        "http://localhost:8080/v3"
    }

    async fn list(&self, collection: &str, filters: &Filters) -> PlatformResult<Vec<Value>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(collection)
            .map(|items| items.iter().filter(|v| matches(v, filters)).cloned().collect())
            .unwrap_or_default())
    }

    async fn by_id(&self, collection: &str, id: &str) -> PlatformResult<Option<Value>> {
        Ok(self.get(collection, id))
    }

    async fn create(&self, collection: &str, mut body: Value) -> PlatformResult<Value> {
        if self.reject_creates.lock().unwrap().iter().any(|c| c == collection) {
            return Err(PlatformError::Api {
                status: 422,
                message: format!("{collection} rejected"),
            });
        }
        self.creates
            .lock()
            .unwrap()
            .push((collection.to_string(), body.clone()));

        if let Some(obj) = body.as_object_mut() {
            let inactive = obj.get("createOnly").and_then(Value::as_bool) == Some(true);
            obj.entry("transitioning").or_insert(json!("no"));
            obj.entry("state")
                .or_insert(json!(if inactive { "inactive" } else { "active" }));
        }
        let id = self.insert(collection, body);
        Ok(self.get(collection, &id).unwrap_or(Value::Null))
    }

    async fn update(&self, collection: &str, id: &str, body: Value) -> PlatformResult<Value> {
        self.updates
            .lock()
            .unwrap()
            .push((collection.to_string(), id.to_string(), body.clone()));
        self.set(collection, id, body);
        Ok(self.get(collection, id).unwrap_or(Value::Null))
    }

    async fn delete(&self, collection: &str, id: &str) -> PlatformResult<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((collection.to_string(), id.to_string()));
        if let Some(items) = self.resources.lock().unwrap().get_mut(collection) {
            items.retain(|v| v["id"] != id);
        }
        Ok(())
    }

    async fn action(
        &self,
        collection: &str,
        id: &str,
        action: &str,
        _body: Option<Value>,
    ) -> PlatformResult<Value> {
        self.actions
            .lock()
            .unwrap()
            .push((collection.to_string(), id.to_string(), action.to_string()));
        match action {
            "upgrade" => Ok(json!({"id": format!("1rev{id}")})),
            _ => {
                self.set(collection, id, json!({"state": "active", "transitioning": "no"}));
                Ok(self.get(collection, id).unwrap_or(Value::Null))
            }
        }
    }
}
