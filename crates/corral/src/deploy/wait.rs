use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::platform::{Platform, Resource, TRANSITIONING_ERROR, TRANSITIONING_YES};

/// Poll interval while a resource is transitioning.
pub const TICK: Duration = Duration::from_millis(150);

/// Polls `resource` until it stops transitioning.
///
/// `on_tick` observes the current state before every check. A resource
/// still transitioning is replaced by `reload`. Resolves to the settled
/// resource; `transitioning: error` fails with the transition message and
/// cancellation fails with [`Error::Timeout`].
pub async fn wait_for<T, R, Fut>(
    cancel: &CancellationToken,
    mut resource: T,
    mut reload: R,
    mut on_tick: impl FnMut(&T),
) -> Result<T>
where
    T: Resource,
    R: FnMut(T) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Timeout(resource.id().to_string()));
            }
            _ = ticker.tick() => {
                on_tick(&resource);
                let state = resource.transitioning().to_string();
                match state.as_str() {
                    TRANSITIONING_YES => resource = reload(resource).await?,
                    TRANSITIONING_ERROR => {
                        return Err(Error::Transition(resource.transitioning_message().to_string()));
                    }
                    _ => return Ok(resource),
                }
            }
        }
    }
}

/// [`wait_for`] reloading from the control plane.
pub async fn wait<T>(platform: &Platform, cancel: &CancellationToken, resource: T) -> Result<T>
where
    T: Resource + DeserializeOwned,
{
    wait_for(
        cancel,
        resource,
        |current: T| async move { Ok::<T, Error>(platform.reload(&current).await?) },
        |_| {},
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockControlPlane;
    use crate::platform::{Service, SERVICE};
    use serde_json::json;
    use std::sync::Arc;

    fn transitioning(id: &str) -> Service {
        Service {
            id: id.into(),
            transitioning: TRANSITIONING_YES.into(),
            ..Service::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_settles_after_reload() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(SERVICE, json!({"id": "1s1", "name": "web", "transitioning": "no", "state": "active"}));
        let platform = Platform::new(mock);

        let settled = wait(&platform, &CancellationToken::new(), transitioning("1s1"))
            .await
            .unwrap();
        assert_eq!(settled.state, "active");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_not_transitioning_returns_immediately() {
        let platform = Platform::new(Arc::new(MockControlPlane::new()));
        let service = Service {
            id: "1s1".into(),
            transitioning: "no".into(),
            ..Service::default()
        };
        assert_eq!(wait(&platform, &CancellationToken::new(), service.clone()).await.unwrap(), service);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_error_carries_message() {
        let mock = Arc::new(MockControlPlane::new());
        mock.insert(
            SERVICE,
            json!({"id": "1s1", "transitioning": "error", "transitioningMessage": "image not found"}),
        );
        let platform = Platform::new(mock);

        let err = wait(&platform, &CancellationToken::new(), transitioning("1s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transition(_)));
        assert_eq!(err.to_string(), "image not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_is_timeout() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(
            &cancel,
            transitioning("1s7"),
            |current: Service| async move { Ok::<_, Error>(current) },
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout. Context canceled for resource 1s7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_tick_sees_every_state() {
        let mut seen = Vec::new();
        let mut remaining = 2;
        wait_for(
            &CancellationToken::new(),
            transitioning("1s1"),
            |mut current: Service| {
                remaining -= 1;
                if remaining == 0 {
                    current.transitioning = "no".into();
                }
                async move { Ok::<_, Error>(current) }
            },
            |current| seen.push(current.transitioning.clone()),
        )
        .await
        .unwrap();
        assert_eq!(seen, ["yes", "yes", "no"]);
    }
}
