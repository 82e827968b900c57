use crate::core::audit::{HistoryLog, SessionRecord};
use crate::core::client::{is_conflict, Cluster, PodApi};
use crate::core::clone::{self, CloneError, CloneOptions};
use crate::core::config::Configuration;
use crate::core::lifecycle::{self, LifecycleError, SessionOutcome};
use chrono::Utc;
use k8s_openapi::api::core::v1::{EnvVar, Pod};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to connect to the cluster: {0}")]
    Connection(kube::Error),

    #[error("failed to fetch source pod '{name}' in namespace '{namespace}': {source}")]
    Lookup {
        name: String,
        namespace: String,
        source: kube::Error,
    },

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

type Result<T> = std::result::Result<T, SessionError>;

/// Progress notifications consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connecting,
    FetchingSource { name: String, namespace: String },
    GeneratingSpec,
    Creating { name: String },
    Created { name: String },
    AwaitingReady { name: String },
    Attaching { name: String },
    CleaningUp { name: String },
    CleanedUp { name: String },
    CleanupFailed { name: String, reason: String },
}

/// Everything the caller decided about one session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub source_pod: String,
    pub namespace: String,
    pub command: Vec<String>,
    pub prefix: String,
    pub suffix: String,
    pub labels: BTreeMap<String, String>,
    pub envs: Vec<EnvVar>,
    pub user: String,
    pub env_file: Option<PathBuf>,
}

/// One linear, cancelable interactive session.
///
/// Sequences connect, fetch, clone, create, await-ready, attach and
/// cleanup; any component error aborts the remaining stages except cleanup,
/// which still runs whenever a pod was created. Exactly one terminal result
/// is returned.
pub struct Session {
    params: SessionParams,
    readiness_timeout: Duration,
    resize_interval: Duration,
}

impl Session {
    pub fn new(params: SessionParams, configuration: &Configuration) -> Self {
        Self {
            params,
            readiness_timeout: configuration.readiness_timeout(),
            resize_interval: configuration.resize_interval(),
        }
    }

    pub async fn run(
        &self,
        history: &HistoryLog,
        events: UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let _ = events.send(SessionEvent::Connecting);
        let client = kube::Client::try_default()
            .await
            .map_err(SessionError::Connection)?;
        let cluster = Cluster::new(client, &self.params.namespace, self.resize_interval);

        self.run_with(&cluster, history, events, cancel).await
    }

    pub(crate) async fn run_with(
        &self,
        cluster: &impl PodApi,
        history: &HistoryLog,
        events: UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let _ = events.send(SessionEvent::FetchingSource {
            name: self.params.source_pod.clone(),
            namespace: self.params.namespace.clone(),
        });
        let source =
            cluster
                .get(&self.params.source_pod)
                .await
                .map_err(|source| SessionError::Lookup {
                    name: self.params.source_pod.clone(),
                    namespace: self.params.namespace.clone(),
                    source,
                })?;

        // a name conflict means the uniqueness token collided with another
        // session: regenerate the name once and retry
        match self.launch(cluster, &source, history, &events, &cancel).await {
            Err(SessionError::Lifecycle(LifecycleError::Creation { name, source: cause }))
                if is_conflict(&cause) =>
            {
                debug!(pod = %name, "generated pod name already exists, retrying with a fresh name");
                self.launch(cluster, &source, history, &events, &cancel).await
            }
            result => result,
        }
    }

    async fn launch(
        &self,
        cluster: &impl PodApi,
        source: &Pod,
        history: &HistoryLog,
        events: &UnboundedSender<SessionEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        let _ = events.send(SessionEvent::GeneratingSpec);
        let cloned = clone::clone_pod(source, &self.clone_options(clone::uniqueness_token()))?;

        let outcome = lifecycle::run(
            cluster,
            &cloned,
            self.readiness_timeout,
            events,
            cancel,
            |created| {
                if let Err(error) = history.append(&self.record(created)) {
                    warn!(%error, "could not write the session history entry");
                }
            },
        )
        .await?;

        Ok(outcome)
    }

    pub(crate) fn clone_options(&self, token: String) -> CloneOptions {
        CloneOptions {
            user: self.params.user.clone(),
            command: self.params.command.clone(),
            prefix: self.params.prefix.clone(),
            suffix: self.params.suffix.clone(),
            labels: self.params.labels.clone(),
            env: self.params.envs.clone(),
            token,
        }
    }

    fn record(&self, created: &str) -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            new_pod_name: created.to_string(),
            source_pod: self.params.source_pod.clone(),
            namespace: self.params.namespace.clone(),
            user: self.params.user.clone(),
            command: self.params.command.clone(),
            prefix: self.params.prefix.clone(),
            suffix: self.params.suffix.clone(),
            labels: self.params.labels.clone(),
            env_file: self
                .params
                .env_file
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }
}
