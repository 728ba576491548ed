//! Control plane event handling.
//!
//! Events arrive as newline-delimited JSON. Each one is routed by name to an
//! [`EventHandler`] running on its own task, with at most [`MAX_WORKERS`]
//! handlers in flight.

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::platform::Platform;

pub use handlers::{Ping, StackRemove, StackUp};

pub const MAX_WORKERS: usize = 250;

pub const STACK_CREATE: &str = "stack.create";
pub const STACK_UPDATE: &str = "stack.update";
pub const STACK_REMOVE: &str = "stack.remove";
pub const PING: &str = "ping";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub resource_id: String,
    pub resource_type: String,
    pub reply_to: String,
    pub data: Option<Value>,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        event: &Event,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

pub struct EventRouter {
    platform: Platform,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl EventRouter {
    /// Router with the stack lifecycle handlers registered.
    pub fn new(platform: Platform, cancel: CancellationToken) -> Self {
        Self {
            platform,
            handlers: HashMap::new(),
            workers: Arc::new(Semaphore::new(MAX_WORKERS)),
            cancel,
        }
        .with_handler(STACK_CREATE, StackUp::new("Create Stack"))
        .with_handler(STACK_UPDATE, StackUp::new("Update Stack"))
        .with_handler(STACK_REMOVE, StackRemove)
        .with_handler(PING, Ping)
    }

    pub fn with_handler(mut self, name: &str, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(workers));
        self
    }

    /// Spawns the handler for `event` onto `tasks`, waiting for a free
    /// worker first. Unknown events are dropped.
    pub async fn dispatch(&self, event: Event, tasks: &mut JoinSet<()>) {
        let Some(handler) = self.handlers.get(&event.name).cloned() else {
            log::debug!("No handler for event {} ({})", event.name, event.id);
            return;
        };
        let Ok(permit) = self.workers.clone().acquire_owned().await else {
            return;
        };

        let platform = self.platform.clone();
        let cancel = self.cancel.child_token();
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = handler.handle(&event, &platform, &cancel).await {
                log::debug!("Event {} ({}) returned: {}", event.name, event.id, e);
            }
        });
    }

    /// Reads events line by line until EOF or cancellation, then waits for
    /// the handlers still running.
    pub async fn serve<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<()> {
        let mut lines = reader.lines();
        let mut tasks = JoinSet::new();

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => self.dispatch(event, &mut tasks).await,
                Err(e) => log::warn!("Ignoring malformed event: {}", e),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Event handler panicked: {}", e);
            }
        }
        Ok(())
    }
}
