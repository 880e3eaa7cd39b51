use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "snews-engine", about = "SNEWS coincidence engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the stream runner: subscribe, classify, admit, decide, publish.
    Run,
    /// Print the hard-reset admin payload an operator's transport client
    /// should publish to the observation topic.
    Reset,
    /// Load configuration from the environment and print the resolved values.
    ConfigCheck,
}
