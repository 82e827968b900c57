use crate::core::attach::{AttachError, AttachOutcome};
use crate::core::client::{is_not_found, PodApi};
use crate::core::readiness::ReadinessError;
use crate::core::session::SessionEvent;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("failed to create pod '{name}': {source}")]
    Creation { name: String, source: kube::Error },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Attach(#[from] AttachError),
}

type Result<T> = std::result::Result<T, LifecycleError>;

/// Terminal outcome of a session whose pod was successfully created.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The remote process ran and exited; carries its reported status.
    Completed { status: Option<Status> },
    /// The session was interrupted locally; the pod was still cleaned up.
    Cancelled,
}

/// Drive one cloned pod through create, await-ready, attach and delete.
///
/// Once creation succeeds the delete runs on every exit path: readiness
/// timeout, terminal pod failure, attach transport failure, and local
/// cancellation all traverse cleanup before the error or outcome is
/// reported. Creation failure short-circuits with nothing to delete.
/// `on_created` fires right after the pod exists, before readiness.
pub async fn run<C, F>(
    cluster: &C,
    pod: &Pod,
    readiness_timeout: Duration,
    events: &UnboundedSender<SessionEvent>,
    cancel: &CancellationToken,
    on_created: F,
) -> Result<SessionOutcome>
where
    C: PodApi + ?Sized,
    F: FnOnce(&str),
{
    let name = pod.metadata.name.clone().unwrap_or_default();

    let _ = events.send(SessionEvent::Creating { name: name.clone() });
    cluster
        .create(pod)
        .await
        .map_err(|source| LifecycleError::Creation {
            name: name.clone(),
            source,
        })?;
    let _ = events.send(SessionEvent::Created { name: name.clone() });
    on_created(&name);

    // the pod exists from here on: whatever the attach phase does, run the delete
    let result = attach_phase(cluster, &name, readiness_timeout, events, cancel).await;

    let _ = events.send(SessionEvent::CleaningUp { name: name.clone() });
    match cluster.delete(&name).await {
        Ok(()) => {
            let _ = events.send(SessionEvent::CleanedUp { name: name.clone() });
        }
        Err(error) if is_not_found(&error) => {
            // cleanup raced an external deletion, nothing left to remove
            let _ = events.send(SessionEvent::CleanedUp { name: name.clone() });
        }
        Err(error) => {
            warn!(pod = %name, %error, "could not remove the cloned pod, remove it manually");
            let _ = events.send(SessionEvent::CleanupFailed {
                name: name.clone(),
                reason: error.to_string(),
            });
        }
    }

    result
}

async fn attach_phase<C>(
    cluster: &C,
    name: &str,
    readiness_timeout: Duration,
    events: &UnboundedSender<SessionEvent>,
    cancel: &CancellationToken,
) -> Result<SessionOutcome>
where
    C: PodApi + ?Sized,
{
    let _ = events.send(SessionEvent::AwaitingReady {
        name: name.to_string(),
    });
    tokio::select! {
        readiness = cluster.await_ready(name, readiness_timeout) => readiness?,
        _ = cancel.cancelled() => return Ok(SessionOutcome::Cancelled),
    }

    let _ = events.send(SessionEvent::Attaching {
        name: name.to_string(),
    });
    match cluster.attach(name, cancel).await? {
        AttachOutcome::Completed(status) => Ok(SessionOutcome::Completed { status }),
        AttachOutcome::Cancelled => Ok(SessionOutcome::Cancelled),
    }
}
