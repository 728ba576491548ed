use std::collections::HashMap;

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;

use super::wait_for;
use crate::error::{Error, Result};
use crate::platform::{PullTask, PULL_TASK};
use crate::project::Project;

pub const PULL_MODE_ALL: &str = "all";
pub const PULL_MODE_CACHED: &str = "cached";

const STATUS_DONE: &str = "Done";
const STATUS_PULLING: &str = "Pulling";
const IN_PROGRESS: &str = "In Progress";

/// Tracks what has been reported per host for one image pull.
pub struct PullProgress {
    image: String,
    printed: HashMap<String, String>,
}

impl PullProgress {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            printed: HashMap::new(),
        }
    }

    /// Logs status changes and returns whether every host reported done.
    pub fn observe(&mut self, status: &IndexMap<String, Value>) -> bool {
        let mut done = true;

        for (host, value) in status {
            let Some(state) = value.as_str() else {
                continue;
            };
            if state != STATUS_DONE {
                done = false;
            }

            let previous = self.printed.get(host).cloned().unwrap_or_default();
            let next = if previous.is_empty() {
                log::info!("Checking for {} on {}...", self.image, host);
                "start".to_string()
            } else if previous == "start" && state == STATUS_DONE {
                log::info!("Finished {} on {}", self.image, host);
                "done".to_string()
            } else if previous == "start" && state != STATUS_PULLING && state != previous {
                log::info!("Checking for {} on {}: {}", self.image, host, state);
                state.to_string()
            } else {
                previous
            };
            self.printed.insert(host.clone(), next);
        }

        done
    }
}

/// Pulls `image` onto every host matching `labels` and waits for it.
pub async fn pull_image(
    project: &Project,
    image: &str,
    labels: &IndexMap<String, String>,
    cached: bool,
) -> Result<()> {
    let task = PullTask {
        image: image.to_string(),
        mode: if cached { PULL_MODE_CACHED } else { PULL_MODE_ALL }.to_string(),
        labels: labels.clone(),
        ..PullTask::default()
    };
    let platform = &project.platform;
    let task: PullTask = platform.create(PULL_TASK, &task).await?;

    let mut progress = PullProgress::new(image);
    let mut last_message = String::new();
    let task = wait_for(
        &project.cancel,
        task,
        |current: PullTask| async move { Ok::<_, Error>(platform.reload(&current).await?) },
        |current| {
            let message = &current.transitioning_message;
            if !message.is_empty() && message != IN_PROGRESS && *message != last_message {
                progress.observe(&current.status);
                last_message.clone_from(message);
            }
        },
    )
    .await?;

    if !progress.observe(&task.status) {
        return Err(Error::Transition("Pull failed on one of the hosts".to_string()));
    }
    log::info!("Finished pulling {}", image);
    Ok(())
}

/// Pulls the image of `name` and of its sidekicks. Services without an
/// image are skipped.
pub async fn pull_service(project: &Project, name: &str, cached: bool) -> Result<()> {
    let Some(config) = project.config.service_or_container(name) else {
        return Ok(());
    };
    if config.image.is_empty() {
        return Ok(());
    }

    let mut images = vec![config.image.clone()];
    let mut labels = config.labels.clone();
    for sidekick in project.config.sidekick_info.sidekicks_of(name) {
        if let Some(sidekick_config) = project.config.services.get(sidekick) {
            labels.extend(sidekick_config.labels.clone());
            if !sidekick_config.image.is_empty() && !images.contains(&sidekick_config.image) {
                images.push(sidekick_config.image.clone());
            }
        }
    }

    let labels = &labels;
    try_join_all(
        images
            .iter()
            .map(|image| pull_image(project, image, labels, cached)),
    )
    .await?;
    Ok(())
}
