use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::WatchEvent;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("timed out after {timeout:?} waiting for pod '{name}' to be running")]
    TimedOut { name: String, timeout: Duration },

    #[error("pod '{name}' terminated unexpectedly with phase {phase}")]
    Failed { name: String, phase: String },

    #[error("could not watch pod '{name}': {source}")]
    Watch {
        name: String,
        source: kube::Error,
    },

    #[error("unexpected watch event for pod '{name}': {detail}")]
    Unexpected { name: String, detail: String },
}

type Result<T> = std::result::Result<T, ReadinessError>;

/// Wait for one watched pod to reach a terminal readiness state.
///
/// The watcher is a small state machine: it stays pending until an event
/// reports a `Running` or `Succeeded` phase (ready), reports a `Failed`
/// phase (failure), the stream misbehaves (failure), or `timeout` elapses.
/// Exactly one resolution is produced and the stream is released on every
/// exit path. Generic over the event stream so tests can feed simulated
/// events.
pub async fn resolve<S>(mut events: S, name: &str, timeout: Duration) -> Result<()>
where
    S: Stream<Item = std::result::Result<WatchEvent<Pod>, kube::Error>> + Unpin,
{
    match tokio::time::timeout(timeout, drive(&mut events, name)).await {
        Ok(resolution) => resolution,
        Err(_) => Err(ReadinessError::TimedOut {
            name: name.to_string(),
            timeout,
        }),
    }
}

async fn drive<S>(events: &mut S, name: &str) -> Result<()>
where
    S: Stream<Item = std::result::Result<WatchEvent<Pod>, kube::Error>> + Unpin,
{
    while let Some(event) = events.next().await {
        let event = event.map_err(|source| ReadinessError::Watch {
            name: name.to_string(),
            source,
        })?;

        match event {
            WatchEvent::Added(pod) | WatchEvent::Modified(pod) | WatchEvent::Deleted(pod) => {
                match pod_phase(&pod) {
                    Some("Running") | Some("Succeeded") => return Ok(()),
                    Some("Failed") => {
                        return Err(ReadinessError::Failed {
                            name: name.to_string(),
                            phase: "Failed".to_string(),
                        })
                    }
                    phase => debug!(?phase, pod = name, "pod not ready yet"),
                }
            }
            WatchEvent::Error(response) => {
                // do not silently loop on a broken watch, it could hang forever
                return Err(ReadinessError::Unexpected {
                    name: name.to_string(),
                    detail: response.message,
                });
            }
            WatchEvent::Bookmark(_) => {
                return Err(ReadinessError::Unexpected {
                    name: name.to_string(),
                    detail: "unsolicited bookmark event".to_string(),
                });
            }
        }
    }

    Err(ReadinessError::Unexpected {
        name: name.to_string(),
        detail: "watch stream closed before the pod became ready".to_string(),
    })
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}
