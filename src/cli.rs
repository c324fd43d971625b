use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::commands::{self, CompletionsCommand, ExportCommand, SourceArgs};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "awscompat",
    version,
    about = "Exchange Google Cloud identity tokens for AWS session credentials",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Print credentials for the AWS credential_process setting (default)")]
    Process,
    #[command(about = "Write credentials to the AWS shared credentials file")]
    Export(ExportCommand),
    #[command(about = "Generate shell completion scripts for awscompat")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command.unwrap_or(Commands::Process) {
            Commands::Process => commands::process::execute(&self.source).await,
            Commands::Export(cmd) => cmd.execute(&self.source).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}
