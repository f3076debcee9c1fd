//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Create a session and focus it
#[derive(Debug, Args, Clone)]
pub struct NewCommand {
    /// Display name (defaults to the session id)
    pub name: Option<String>,
}

/// List sessions, newest first
#[derive(Debug, Args, Clone)]
pub struct SessionsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Focus a session
#[derive(Debug, Args, Clone)]
pub struct UseCommand {
    /// Session id
    pub session: String,
}

/// Show the focused session's nodes
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Output the metadata document as JSON
    #[arg(long)]
    pub json: bool,
}

/// Add an input node
#[derive(Debug, Args, Clone)]
pub struct AddInputCommand {
    /// Filename inside the session (its suffix decides how it is parsed)
    pub filename: String,

    /// Copy contents from this file instead of starting empty
    #[arg(long)]
    pub from: Option<PathBuf>,
}

/// Scaffold a transform under a node
#[derive(Debug, Args, Clone)]
pub struct AddTransformCommand {
    /// Id of the node to transform
    pub parent: String,
}

/// Run a transform
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Transform node id or filename
    pub node: String,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Delete a node and everything derived from it
#[derive(Debug, Args, Clone)]
pub struct DeleteCommand {
    /// Node id
    pub node: String,
}

/// Delete a session
#[derive(Debug, Args, Clone)]
pub struct DeleteSessionCommand {
    /// Session id
    pub session: String,
}

/// Copy a node's artifact to a local path
#[derive(Debug, Args, Clone)]
pub struct ExportCommand {
    /// Node id
    pub node: String,

    /// Destination path
    pub destination: PathBuf,
}

/// Show recent runs
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Only runs of the focused session
    #[arg(long)]
    pub session_only: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
