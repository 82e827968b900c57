//! Shared test doubles for the session pipeline.

use crate::core::attach::{AttachError, AttachOutcome};
use crate::core::client::PodApi;
use crate::core::readiness::ReadinessError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {reason}"),
        reason: reason.to_string(),
        code,
    })
}

/// A pod shaped like the output of the spec cloner.
pub fn cloned_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("prod".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("registry.local/web:1.2".to_string()),
                command: Some(vec!["bash".to_string()]),
                tty: Some(true),
                stdin: Some(true),
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// A pod shaped like a workload fetched from the cluster.
pub fn running_pod(name: &str, namespace: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("registry.local/web:1.2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    }
}

#[derive(Default)]
pub enum ReadyBehavior {
    #[default]
    Ok,
    Fail,
    Hang,
}

#[derive(Default)]
pub enum AttachBehavior {
    #[default]
    Complete,
    Fail,
    WaitForCancel,
}

#[derive(Default)]
pub enum DeleteBehavior {
    #[default]
    Ok,
    NotFound,
    Fail,
}

/// An in-memory stand-in for the cluster recording every pipeline call.
#[derive(Default)]
pub struct MockCluster {
    pub source: Option<Pod>,
    pub fail_create: bool,
    /// How many create calls report a name conflict before one succeeds.
    pub conflicts: Mutex<usize>,
    pub ready: ReadyBehavior,
    pub attach: AttachBehavior,
    pub delete: DeleteBehavior,
    pub recorded: Mutex<Vec<String>>,
}

impl MockCluster {
    pub fn with_source(pod: Pod) -> Self {
        Self {
            source: Some(pod),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with("delete"))
            .count()
    }

    fn record(&self, operation: &str, name: &str) {
        self.recorded
            .lock()
            .unwrap()
            .push(format!("{operation} {name}"));
    }
}

#[async_trait]
impl PodApi for MockCluster {
    async fn get(&self, name: &str) -> Result<Pod, kube::Error> {
        self.record("get", name);
        self.source
            .clone()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create(&self, pod: &Pod) -> Result<(), kube::Error> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.record("create", &name);
        if self.fail_create {
            return Err(api_error(403, "Forbidden"));
        }
        let mut conflicts = self.conflicts.lock().unwrap();
        if *conflicts > 0 {
            *conflicts -= 1;
            return Err(api_error(409, "AlreadyExists"));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        self.record("delete", name);
        match self.delete {
            DeleteBehavior::Ok => Ok(()),
            DeleteBehavior::NotFound => Err(api_error(404, "NotFound")),
            DeleteBehavior::Fail => Err(api_error(500, "InternalError")),
        }
    }

    async fn await_ready(&self, name: &str, _timeout: Duration) -> Result<(), ReadinessError> {
        self.record("ready", name);
        match self.ready {
            ReadyBehavior::Ok => Ok(()),
            ReadyBehavior::Fail => Err(ReadinessError::Failed {
                name: name.to_string(),
                phase: "Failed".to_string(),
            }),
            ReadyBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn attach(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<AttachOutcome, AttachError> {
        self.record("attach", name);
        match self.attach {
            AttachBehavior::Complete => Ok(AttachOutcome::Completed(None)),
            AttachBehavior::Fail => Err(AttachError::Connect {
                name: name.to_string(),
                source: api_error(500, "InternalError"),
            }),
            AttachBehavior::WaitForCancel => {
                cancel.cancelled().await;
                Ok(AttachOutcome::Cancelled)
            }
        }
    }
}
