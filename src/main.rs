use anyhow::{Context, Result};
use datalab::cli::commands::{
    AddInputCommand, AddTransformCommand, DeleteCommand, DeleteSessionCommand, ExportCommand, HistoryCommand,
    NewCommand, RunCommand, SessionsCommand, ShowCommand, UseCommand,
};
use datalab::cli::output::*;
use datalab::cli::{focus, Cli, Command};
use datalab::core::config::{resolve_program, DatalabConfig};
use datalab::core::{RunState, SessionContext, SessionId};
use datalab::execution::{add_transform, RunError, TransformEngine, TransformRef};
use datalab::persistence::{FsArtifactStore, InMemoryRunHistory, PipelineStore, RunHistory, RunRecord};
use datalab::runtime::{EsbuildCompiler, SubprocessRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status for a run the user cancelled
const EXIT_CANCELLED: i32 = 130;

/// Lines of output shown after a successful run
const PREVIEW_LINES: usize = 20;

/// Everything a command needs
struct App {
    config: DatalabConfig,
    root: PathBuf,
    store: Arc<PipelineStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    let app = open_app(&cli).await?;

    match &cli.command {
        Command::New(cmd) => new_session(&app, cmd).await?,
        Command::Sessions(cmd) => list_sessions(&app, cmd).await?,
        Command::Use(cmd) => use_session(&app, cmd).await?,
        Command::Show(cmd) => show_session(&app, cmd).await?,
        Command::AddInput(cmd) => add_input(&app, cmd).await?,
        Command::AddTransform(cmd) => scaffold_transform(&app, cmd).await?,
        Command::Run(cmd) => run_transform(&app, cmd).await?,
        Command::Delete(cmd) => delete_node(&app, cmd).await?,
        Command::DeleteSession(cmd) => delete_session(&app, cmd).await?,
        Command::Clear => clear_sessions(&app).await?,
        Command::Export(cmd) => export_node(&app, cmd).await?,
        Command::History(cmd) => show_history(&app, cmd).await?,
    }

    Ok(())
}

async fn open_app(cli: &Cli) -> Result<App> {
    let config = DatalabConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let root = config.storage_root();
    let artifacts = FsArtifactStore::new(&root)
        .await
        .with_context(|| format!("Failed to open storage at {}", root.display()))?;

    let active = match &cli.session {
        Some(raw) => Some(SessionId::parse(raw)?),
        None => focus::load(&root).await?,
    };
    debug!("Storage root {}, active session {:?}", root.display(), active);

    let context = Arc::new(SessionContext::new());
    context.set_active(active);
    let store = Arc::new(PipelineStore::new(Arc::new(artifacts), context));

    Ok(App { config, root, store })
}

/// The session commands operate on
fn active_session(app: &App) -> Result<SessionId> {
    app.store
        .context()
        .active()
        .ok_or(RunError::NoActiveSession)
        .context("Create a session with `datalab new` or focus one with `datalab use`")
}

async fn persist_focus(app: &App) -> Result<()> {
    focus::save(&app.root, app.store.context().active().as_ref()).await
}

async fn new_session(app: &App, cmd: &NewCommand) -> Result<()> {
    let session_id = app
        .store
        .create_session(cmd.name.as_deref())
        .await
        .context("Failed to create session")?;
    persist_focus(app).await?;

    println!("{} Created session {}", CHECK, style(&session_id).bold());
    Ok(())
}

async fn list_sessions(app: &App, cmd: &SessionsCommand) -> Result<()> {
    let sessions = app.store.list_sessions().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("{} No sessions yet", INFO);
        return Ok(());
    }

    let active = app.store.context().active();
    for session in &sessions {
        let marker = if active.as_ref() == Some(&session.id) { "*" } else { " " };
        println!(
            "{} {} - {} - {} node(s)",
            style(marker).green(),
            style(&session.id).dim(),
            style(session.display_name()).bold(),
            style(session.nodes.len()).cyan()
        );
    }
    Ok(())
}

async fn use_session(app: &App, cmd: &UseCommand) -> Result<()> {
    let session_id = SessionId::parse(&cmd.session)?;
    app.store
        .set_session(&session_id)
        .await
        .with_context(|| format!("No session '{}'", session_id))?;
    persist_focus(app).await?;

    println!("{} Focused session {}", CHECK, style(&session_id).bold());
    Ok(())
}

async fn show_session(app: &App, cmd: &ShowCommand) -> Result<()> {
    let session_id = active_session(app)?;
    let session = app.store.get_metadata(&session_id).await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!(
        "{} {} ({})",
        INFO,
        style(session.display_name()).bold(),
        style(&session.id).dim()
    );
    if session.nodes.is_empty() {
        println!("  No nodes yet; add one with `datalab add-input`");
    }
    for line in render_tree(&session) {
        println!("  {}", line);
    }
    Ok(())
}

async fn add_input(app: &App, cmd: &AddInputCommand) -> Result<()> {
    let session_id = active_session(app)?;
    let contents = match &cmd.from {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => Vec::new(),
    };

    let node = app
        .store
        .create_input(&session_id, &cmd.filename, &contents)
        .await
        .context("Failed to create input")?;

    println!(
        "{} Added input {} {}",
        CHECK,
        style(&node.filename).bold(),
        style(&node.id).dim()
    );
    Ok(())
}

async fn scaffold_transform(app: &App, cmd: &AddTransformCommand) -> Result<()> {
    let session_id = active_session(app)?;
    let node = add_transform(&app.store, &session_id, &cmd.parent)
        .await
        .context("Failed to create transform")?;

    let root = app.root.join(session_id.as_str()).join(&node.filename);
    println!(
        "{} Added transform {} {}",
        CHECK,
        style(&node.filename).bold(),
        style(&node.id).dim()
    );
    println!("  Edit {}", style(root.display()).underlined());
    Ok(())
}

async fn run_transform(app: &App, cmd: &RunCommand) -> Result<()> {
    let session_id = active_session(app)?;

    let compiler = EsbuildCompiler::new(
        resolve_program(&app.config.compiler.program, "compiler.program")?,
        app.config.compiler.timeout_secs,
    )
    .with_extra_args(app.config.compiler.extra_args.clone());
    let runner = SubprocessRunner::new(
        resolve_program(&app.config.runtime.program, "runtime.program")?,
        app.config.runtime.timeout_secs,
    );
    let engine = TransformEngine::new(app.store.clone(), compiler, runner);

    // Accept either a node id or a filename
    let session = app.store.get_metadata(&session_id).await;
    let transform_id = session
        .node(&cmd.node)
        .or_else(|| session.node_by_filename(&cmd.node))
        .map(|n| n.id.clone());
    let target = match &transform_id {
        Some(id) => TransformRef::Id(id.clone()),
        None => TransformRef::Filename(cmd.node.clone()),
    };

    let spinner = create_spinner("Starting...");
    let progress = spinner.clone();
    engine.add_event_handler(move |event| {
        if let Some(message) = progress_message(&event) {
            progress.set_message(message);
        }
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut state = RunState::new();
    let result = engine
        .run_tracked(&session_id, target, &mut state, &cancel)
        .await;
    ctrl_c.abort();
    spinner.finish_and_clear();

    if state.status.is_terminal() && !cmd.no_history && app.config.history.enabled {
        if let Some(transform_id) = &transform_id {
            let record = RunRecord::from_state(&session_id, transform_id, &state);
            let record = match &result {
                Ok(outcome) => record.with_output(&outcome.output.id),
                Err(e) => record.with_error(e.to_string()),
            };
            record_run(app, &record).await;
        }
    }

    match result {
        Ok(outcome) => {
            let verb = if outcome.created { "Created" } else { "Updated" };
            let elapsed = outcome.state.duration().map(format_duration).unwrap_or_default();
            println!(
                "{} {} {} {}",
                CHECK,
                verb,
                style(&outcome.output.filename).bold(),
                style(elapsed).dim()
            );

            let contents = app
                .store
                .read_artifact(&session_id, &outcome.output.filename)
                .await?;
            println!("{}", format_output(&String::from_utf8_lossy(&contents), PREVIEW_LINES));
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("{} Run cancelled; no output was written", INFO);
            std::process::exit(EXIT_CANCELLED);
        }
        Err(RunError::Compilation(message)) => {
            println!("{} {}", CROSS, style("Compilation failed").red());
            println!("{}", message);
            std::process::exit(1);
        }
        Err(RunError::Runtime(stderr)) => {
            println!("{} {}", CROSS, style("Execution failed").red());
            println!("{}", stderr);
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Run failed"),
    }
}

/// Save a run to history; a broken history database never fails the run
async fn record_run(app: &App, record: &RunRecord) {
    let result = match open_history(&app.config).await {
        Ok(history) => history.record(record).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!("Recorded run {}", record.run_id),
        Err(e) => warn!("Failed to record run history: {:#}", e),
    }
}

#[cfg(feature = "sqlite")]
async fn open_history(config: &DatalabConfig) -> Result<Arc<dyn RunHistory>> {
    let history = datalab::persistence::SqliteRunHistory::new(&config.history_database()).await?;
    Ok(Arc::new(history))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history(_config: &DatalabConfig) -> Result<Arc<dyn RunHistory>> {
    warn!("Built without sqlite support; run history is not persisted");
    Ok(Arc::new(InMemoryRunHistory::new()))
}

async fn delete_node(app: &App, cmd: &DeleteCommand) -> Result<()> {
    let session_id = active_session(app)?;
    let removed = app
        .store
        .delete_node(&session_id, &cmd.node)
        .await
        .context("Failed to delete node")?;

    if removed.is_empty() {
        println!("{} No node '{}' in session", WARN, cmd.node);
        return Ok(());
    }

    println!("{} Deleted {} node(s)", CHECK, style(removed.len()).cyan());
    for node in &removed {
        println!("  {} {}", format_kind(node.kind), style(&node.filename).dim());
    }
    Ok(())
}

async fn delete_session(app: &App, cmd: &DeleteSessionCommand) -> Result<()> {
    let session_id = SessionId::parse(&cmd.session)?;
    app.store
        .delete_session(&session_id)
        .await
        .with_context(|| format!("Failed to delete session '{}'", session_id))?;
    persist_focus(app).await?;

    println!("{} Deleted session {}", CHECK, style(&session_id).bold());
    Ok(())
}

async fn clear_sessions(app: &App) -> Result<()> {
    let count = app.store.clear_sessions().await.context("Failed to clear sessions")?;
    persist_focus(app).await?;

    println!("{} Deleted {} session(s)", CHECK, style(count).cyan());
    Ok(())
}

async fn export_node(app: &App, cmd: &ExportCommand) -> Result<()> {
    let session_id = active_session(app)?;
    let node = app
        .store
        .export_node(&session_id, &cmd.node, &cmd.destination)
        .await
        .context("Failed to export node")?;

    println!(
        "{} Exported {} to {}",
        CHECK,
        style(&node.filename).bold(),
        style(cmd.destination.display()).underlined()
    );
    Ok(())
}

async fn show_history(app: &App, cmd: &HistoryCommand) -> Result<()> {
    let history: Arc<dyn RunHistory> = if app.config.history.enabled {
        open_history(&app.config).await?
    } else {
        Arc::new(InMemoryRunHistory::new())
    };

    let session_filter = if cmd.session_only {
        Some(active_session(app)?)
    } else {
        None
    };
    let runs = history.list_runs(session_filter.as_ref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for record in &runs {
        println!("  {}", format_run_record(record));
    }
    Ok(())
}
