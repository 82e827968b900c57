use crate::cli::Handler;
use crate::core::attach::remote_exit_code;
use crate::core::audit::HistoryLog;
use crate::core::client::{Cluster, PodApi};
use crate::core::clone;
use crate::core::config::Configuration;
use crate::core::identity;
use crate::core::lifecycle::SessionOutcome;
use crate::core::parsing;
use crate::core::session::{Session, SessionEvent, SessionParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use console::style;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Clone a pod and open an interactive session inside the clone.
#[derive(Debug, Args)]
pub struct SessionCommand {
    /// Name of the source pod to clone
    pub source_pod: String,

    /// Command to run inside the cloned pod (defaults to bash)
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Namespace of the source pod
    #[clap(short, long)]
    pub namespace: String,

    /// Prefix for the new pod's name
    #[clap(long, default_value = "")]
    pub prefix: String,

    /// Suffix for the new pod's name
    #[clap(long, default_value = "")]
    pub suffix: String,

    /// Add a label to the new pod (e.g., -l key=value)
    #[clap(short = 'l', long = "label")]
    pub labels: Vec<String>,

    /// Path to a file with environment variables to add to the pod
    #[clap(long)]
    pub env_file: Option<PathBuf>,

    /// Skip appending user identification to the pod name
    #[clap(long)]
    pub skip_identification: bool,

    /// Print the generated pod specification as YAML without creating it
    #[clap(long)]
    pub preview: bool,
}

#[async_trait]
impl Handler for SessionCommand {
    async fn handler(&self) -> Result<()> {
        let configuration = Configuration::load()?;

        // input errors are fatal before any cluster interaction
        let labels = parsing::parse_labels(&self.labels)?;
        let envs = parsing::parse_env_file(self.env_file.as_deref())?;

        let user = if self.skip_identification {
            String::new()
        } else {
            identity::resolve_user()
        };
        let command = if self.command.is_empty() {
            vec!["bash".to_string()]
        } else {
            self.command.clone()
        };

        let session = Session::new(
            SessionParams {
                source_pod: self.source_pod.clone(),
                namespace: self.namespace.clone(),
                command,
                prefix: self.prefix.clone(),
                suffix: self.suffix.clone(),
                labels,
                envs,
                user,
                env_file: self.env_file.clone(),
            },
            &configuration,
        );

        if self.preview {
            return self.preview_spec(&session, &configuration).await;
        }

        let history = HistoryLog::new(configuration.history_path());
        let (events, receiver) = mpsc::unbounded_channel();
        let printer = spawn_printer(receiver);

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        let result = session.run(&history, events, cancel).await;

        interrupt.abort();
        let _ = printer.await;

        match result? {
            SessionOutcome::Completed { status } => {
                match status.as_ref().and_then(remote_exit_code) {
                    Some(code) if code != 0 => println!(
                        "{}",
                        style(format!("Remote command exited with status {code}.")).yellow()
                    ),
                    _ => println!("{}", style("Session finished successfully!").green()),
                }
            }
            SessionOutcome::Cancelled => {
                println!("{}", style("Session cancelled.").dim())
            }
        }
        Ok(())
    }
}

impl SessionCommand {
    /// Emit the cloned pod spec as a YAML document instead of creating it.
    async fn preview_spec(&self, session: &Session, configuration: &Configuration) -> Result<()> {
        let client = kube::Client::try_default()
            .await
            .context("failed to connect to the cluster")?;
        let cluster = Cluster::new(client, &self.namespace, configuration.resize_interval());

        let source = cluster.get(&self.source_pod).await.with_context(|| {
            format!(
                "failed to fetch source pod '{}' in namespace '{}'",
                self.source_pod, self.namespace
            )
        })?;

        let cloned = clone::clone_pod(&source, &session.clone_options(clone::uniqueness_token()))?;
        print!("{}", serde_yaml::to_string(&cloned)?);
        Ok(())
    }
}

/// Render session progress: a spinner while phases are in flight, plain
/// styled lines for milestones, and nothing at all while the terminal is
/// handed over to the remote session.
fn spawn_printer(mut events: mpsc::UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut spinner: Option<ProgressBar> = None;

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Attaching { name } => {
                    clear(&mut spinner);
                    println!(
                        "{}",
                        style(format!("Attaching to pod '{name}'...")).dim()
                    );
                }
                SessionEvent::CleanedUp { name } => {
                    clear(&mut spinner);
                    println!(
                        "{}",
                        style(format!("Pod '{name}' removed successfully.")).green()
                    );
                }
                SessionEvent::CleanupFailed { name, reason } => {
                    clear(&mut spinner);
                    eprintln!(
                        "{}",
                        style(format!(
                            "Warning: could not remove pod '{name}' ({reason}), remove it manually."
                        ))
                        .red()
                    );
                }
                event => update(&mut spinner, describe(&event)),
            }
        }

        clear(&mut spinner);
    })
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connecting => "Connecting to Kubernetes cluster...".to_string(),
        SessionEvent::FetchingSource { name, .. } => {
            format!("Fetching source pod '{name}'...")
        }
        SessionEvent::GeneratingSpec => "Generating new pod specification...".to_string(),
        SessionEvent::Creating { name } => format!("Creating pod '{name}'..."),
        SessionEvent::Created { name } => format!("Pod '{name}' created."),
        SessionEvent::AwaitingReady { name } => {
            format!("Waiting for pod '{name}' to start...")
        }
        SessionEvent::CleaningUp { name } => format!("Cleaning up pod '{name}'..."),
        _ => String::new(),
    }
}

fn update(spinner: &mut Option<ProgressBar>, message: String) {
    match spinner {
        Some(bar) => bar.set_message(message),
        None => {
            let bar = ProgressBar::new_spinner();
            bar.enable_steady_tick(Duration::from_millis(100));
            bar.set_message(message);
            *spinner = Some(bar);
        }
    }
}

fn clear(spinner: &mut Option<ProgressBar>) {
    if let Some(bar) = spinner.take() {
        bar.finish_and_clear();
    }
}
