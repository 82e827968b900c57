pub mod history;
pub mod session;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

/// `Handler` is a trait that should be implemented for each of our subcommands.
///
/// It defines the contract & the input / output of a subcommand execution.
#[async_trait]
pub trait Handler {
    /// Executes the subcommand handler.
    ///
    /// Every subcommand should take no argument, as it is built at runtime with the
    /// arguments using Clap. Also, a subcommand must always return a `Result<()>`.
    async fn handler(&self) -> Result<()>;
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone a pod and open an interactive session inside the clone
    Session(session::SessionCommand),
    /// Display the session history
    History(history::HistoryCommand),
}

#[derive(Parser, Debug)]
#[clap(name = "kclone", version, author)]
#[clap(about = "Creates a temporary, interactive pod by cloning an existing one")]
#[clap(
    long_about = "kclone helps in debugging and running one-off tasks in Kubernetes.\n\n\
It copies the specification of an existing pod (environment variables, volumes,\n\
service account) to create a new pod in interactive mode, and removes the pod\n\
once the session ends."
)]
pub struct CommandLineInterface {
    /// The subcommand to apply
    #[clap(subcommand)]
    pub command: Command,
}

impl CommandLineInterface {
    pub fn command(self) -> Box<dyn Handler> {
        match self.command {
            Command::Session(subcommand) => Box::new(subcommand),
            Command::History(subcommand) => Box::new(subcommand),
        }
    }
}
