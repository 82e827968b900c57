use crate::core::attach::{self, AttachError, AttachOutcome};
use crate::core::readiness::{self, ReadinessError};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, PostParams, WatchParams};
use kube::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The cluster-side pod operations one session consumes.
///
/// The pipeline only ever talks to this trait; the real implementation is
/// [`Cluster`], tests substitute a mock.
#[async_trait]
pub trait PodApi: Send + Sync {
    async fn get(&self, name: &str) -> Result<Pod, kube::Error>;

    async fn create(&self, pod: &Pod) -> Result<(), kube::Error>;

    async fn delete(&self, name: &str) -> Result<(), kube::Error>;

    async fn await_ready(&self, name: &str, timeout: Duration) -> Result<(), ReadinessError>;

    async fn attach(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<AttachOutcome, AttachError>;
}

/// `Cluster` provides the ability to interact with one namespace of a
/// Kubernetes cluster. The underlying client is cheap to clone and safely
/// shared by every stage of a session.
pub struct Cluster {
    pods: Api<Pod>,
    resize_interval: Duration,
}

impl Cluster {
    pub fn new(client: Client, namespace: &str, resize_interval: Duration) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            resize_interval,
        }
    }
}

#[async_trait]
impl PodApi for Cluster {
    async fn get(&self, name: &str) -> Result<Pod, kube::Error> {
        self.pods.get(name).await
    }

    async fn create(&self, pod: &Pod) -> Result<(), kube::Error> {
        self.pods.create(&PostParams::default(), pod).await.map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        self.pods
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }

    async fn await_ready(&self, name: &str, timeout: Duration) -> Result<(), ReadinessError> {
        let params = WatchParams::default().fields(&format!("metadata.name={name}"));
        let events = self
            .pods
            .watch(&params, "0")
            .await
            .map_err(|source| ReadinessError::Watch {
                name: name.to_string(),
                source,
            })?;

        readiness::resolve(events.boxed(), name, timeout).await
    }

    async fn attach(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<AttachOutcome, AttachError> {
        attach::run_bridge(&self.pods, name, self.resize_interval, cancel).await
    }
}

/// Whether a cluster error is a plain "resource not found".
///
/// Deleting an already-absent pod is a success for cleanup purposes, the
/// removal may race an external deletion.
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

/// Whether a cluster error reports a name conflict on creation.
///
/// The uniqueness token makes collisions improbable, not impossible; a
/// conflict is retryable by regenerating the name.
pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "pods not found".to_string(),
            reason: "NotFound".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_recognized() {
        assert!(is_not_found(&api_error(404)));
    }

    #[test]
    fn other_api_errors_are_not_not_found() {
        assert!(!is_not_found(&api_error(409)));
        assert!(!is_not_found(&api_error(500)));
    }

    #[test]
    fn conflict_is_recognized() {
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(404)));
    }
}
