use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, TerminalSize};
use std::time::Duration;
use thiserror::Error;
use futures::channel::mpsc::Sender;
use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("failed to establish attach stream to pod '{name}': {source}")]
    Connect {
        name: String,
        source: kube::Error,
    },

    #[error("attach stream to pod '{name}' did not expose a {channel} channel")]
    MissingChannel {
        name: String,
        channel: &'static str,
    },

    #[error("failed to configure the local terminal: {0}")]
    Terminal(std::io::Error),

    #[error("attach stream to pod '{name}' failed: {source}")]
    Stream {
        name: String,
        source: kube::Error,
    },
}

type Result<T> = std::result::Result<T, AttachError>;

/// How an attach session ended.
#[derive(Debug)]
pub enum AttachOutcome {
    /// The remote process exited and the stream closed; carries the exit
    /// status reported by the cluster, if any. A non-zero remote exit is a
    /// normal outcome, not a bridge error.
    Completed(Option<Status>),
    /// The session was interrupted locally before the remote process ended.
    Cancelled,
}

/// Puts the local terminal into raw mode and restores it when dropped, so
/// the prior mode comes back on every exit path.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(error) = crossterm::terminal::disable_raw_mode() {
            warn!(%error, "failed to restore the terminal mode");
        }
    }
}

/// Bridge the local terminal and the remote pseudo-terminal of `name`.
///
/// Multiplexes stdin upload and stdout download over the attach stream while
/// a concurrent sampler keeps the remote PTY dimensions in sync with the
/// local viewport. Returns once the remote process exits, the transport
/// fails, or `cancel` fires.
pub async fn run_bridge(
    pods: &Api<Pod>,
    name: &str,
    resize_interval: Duration,
    cancel: &CancellationToken,
) -> Result<AttachOutcome> {
    let mut process = pods
        .attach(name, &AttachParams::interactive_tty())
        .await
        .map_err(|source| AttachError::Connect {
            name: name.to_string(),
            source,
        })?;

    let mut remote_stdin = process
        .stdin()
        .ok_or_else(|| missing(name, "stdin"))?;
    let mut remote_stdout = process
        .stdout()
        .ok_or_else(|| missing(name, "stdout"))?;
    let resize_tx = process
        .terminal_size()
        .ok_or_else(|| missing(name, "resize"))?;
    let status = process.take_status();

    let _raw_mode = RawModeGuard::enable().map_err(AttachError::Terminal)?;

    // the sampler owns the resize sender; aborting it closes the channel,
    // which tells the remote side to stop expecting resize events
    let sampler = tokio::spawn(sample_viewport(resize_tx, resize_interval));

    let stdin_pump = tokio::spawn(async move {
        let mut local_stdin = tokio::io::stdin();
        let _ = tokio::io::copy(&mut local_stdin, &mut remote_stdin).await;
    });
    let mut stdout_pump = tokio::spawn(async move {
        let mut local_stdout = tokio::io::stdout();
        let _ = tokio::io::copy(&mut remote_stdout, &mut local_stdout).await;
        let _ = local_stdout.flush().await;
    });

    let result = tokio::select! {
        status = async { match status { Some(resolved) => resolved.await, None => None } } => {
            // drain whatever the remote side wrote before it exited
            let _ = (&mut stdout_pump).await;
            process
                .join()
                .await
                .map(|_| AttachOutcome::Completed(status))
                .map_err(|source| AttachError::Stream {
                    name: name.to_string(),
                    source: kube::Error::Service(Box::new(source)),
                })
        }
        _ = cancel.cancelled() => {
            debug!(pod = name, "attach interrupted locally");
            Ok(AttachOutcome::Cancelled)
        }
    };

    sampler.abort();
    stdin_pump.abort();
    stdout_pump.abort();

    result
}

/// Push the local viewport size to the remote PTY: once immediately, then on
/// every change observed by a fixed-interval poll. Polling is deliberate, a
/// portable resize interrupt does not exist across host platforms; only the
/// latest size within one interval is delivered.
async fn sample_viewport(mut resize_tx: Sender<TerminalSize>, interval: Duration) {
    let mut last: Option<(u16, u16)> = None;

    if let Ok((width, height)) = crossterm::terminal::size() {
        last = Some((width, height));
        if resize_tx.send(TerminalSize { width, height }).await.is_err() {
            return;
        }
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Ok((width, height)) = crossterm::terminal::size() else {
            continue;
        };
        if last != Some((width, height)) {
            last = Some((width, height));
            if resize_tx.send(TerminalSize { width, height }).await.is_err() {
                return;
            }
        }
    }
}

fn missing(name: &str, channel: &'static str) -> AttachError {
    AttachError::MissingChannel {
        name: name.to_string(),
        channel,
    }
}

/// Extract the remote exit code from the status frame the cluster sends
/// when the attached process terminates, when it is recognizable.
pub fn remote_exit_code(status: &Status) -> Option<i32> {
    if status.status.as_deref() == Some("Success") {
        return Some(0);
    }
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};
    use pretty_assertions::assert_eq;

    #[test]
    fn success_status_maps_to_exit_zero() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };

        assert_eq!(remote_exit_code(&status), Some(0));
    }

    #[test]
    fn non_zero_exit_code_is_extracted_from_causes() {
        let status = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("42".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(remote_exit_code(&status), Some(42));
    }

    #[test]
    fn unrecognizable_status_yields_none() {
        let status = Status {
            status: Some("Failure".to_string()),
            ..Default::default()
        };

        assert_eq!(remote_exit_code(&status), None);
    }
}
