//! Command-line interface

pub mod commands;
pub mod focus;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    AddInputCommand, AddTransformCommand, DeleteCommand, DeleteSessionCommand, ExportCommand, HistoryCommand,
    NewCommand, RunCommand, SessionsCommand, ShowCommand, UseCommand,
};
use std::ffi::OsString;
use std::path::PathBuf;

/// Ad-hoc data transformation pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "datalab")]
#[command(version)]
#[command(about = "Ad-hoc data transformation pipelines: inputs, transform scripts, derived outputs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Session to operate on instead of the focused one
    #[arg(short, long, global = true)]
    pub session: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create a session and focus it
    New(NewCommand),

    /// List sessions
    Sessions(SessionsCommand),

    /// Focus a session
    Use(UseCommand),

    /// Show the focused session's nodes
    Show(ShowCommand),

    /// Add an input node
    AddInput(AddInputCommand),

    /// Scaffold a transform script
    AddTransform(AddTransformCommand),

    /// Run a transform
    Run(RunCommand),

    /// Delete a node and its descendants
    Delete(DeleteCommand),

    /// Delete a session
    DeleteSession(DeleteSessionCommand),

    /// Delete every session
    Clear,

    /// Export a node's artifact
    Export(ExportCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
