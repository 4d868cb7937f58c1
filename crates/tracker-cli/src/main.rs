//! Contract tracker CLI
//!
//! Trigger and admin surface for the accountability engines: runs the
//! escalation check once or on an interval, and drives the request and red
//! tag lifecycles against a local store.
//!
//! # Usage
//!
//! ```bash
//! # One accountability pass at the current time
//! tracker check
//!
//! # Re-run every 5 minutes until Ctrl-C
//! TRACKER_CHECK_INTERVAL_SECS=300 tracker watch
//!
//! # Seed policies, then create a request
//! tracker policy load policies.toml
//! tracker request create --contract c1 --owner u1 --title "Brand guide" --tag DELIVERABLE --due 2026-05-01
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use accountability::{
    parse_due_date, AccountabilityPolicy, AuditBus, AuditEntry, BlockingEngine, Contract,
    ContractDirectory, EscalationConfig, EscalationEngine, EscalationMode, MemoryStore,
    NewRedTag, NewRequest, PolicyFile, PolicyStore, Priority, RedTagService, RedTagSeverity,
    RedTagState, RedTagUpdate, RequestFilter, RequestService, RequestState, SharedStore,
    TrackerError,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::TrackerConfig;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot file for the memory store (overrides TRACKER_DATA_PATH)
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// Policy TOML applied before the command runs (overrides TRACKER_POLICIES_PATH)
    #[arg(long, global = true)]
    policies: Option<PathBuf>,

    /// single-step or catch-up (overrides TRACKER_ESCALATION_MODE)
    #[arg(long, global = true)]
    escalation_mode: Option<EscalationMode>,

    /// RocksDB directory (overrides TRACKER_STATE_PATH; needs the rocksdb-store feature)
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// User id recorded as the actor of lifecycle changes
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one accountability check
    Check {
        /// Evaluate as of this instant (RFC 3339 or YYYY-MM-DD) instead of now
        #[arg(long)]
        now: Option<String>,
    },
    /// Run the accountability check on an interval until interrupted
    Watch {
        /// Seconds between checks (overrides TRACKER_CHECK_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Manage accountability policies
    #[command(subcommand)]
    Policy(PolicyCommand),
    /// Manage contracts
    #[command(subcommand)]
    Contract(ContractCommand),
    /// Create and move requests
    #[command(subcommand)]
    Request(RequestCommand),
    /// Raise and move red tags
    #[command(subcommand)]
    RedTag(RedTagCommand),
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    List,
    /// Create or replace the thresholds of one client package
    Set {
        client_package: String,
        #[arg(long)]
        reminder_hours: u32,
        #[arg(long)]
        warning_hours: u32,
        #[arg(long)]
        escalation_hours: u32,
    },
    /// Upsert every policy of a TOML file
    Load { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ContractCommand {
    Add {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        client_name: String,
        #[arg(long)]
        package: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum RequestCommand {
    Create {
        #[arg(long)]
        contract: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Move a request to OPEN, IN_PROGRESS, COMPLETED or CANCELLED
    Transition { id: String, state: RequestState },
    Show { id: String },
    List {
        #[arg(long)]
        state: Vec<RequestState>,
        #[arg(long)]
        contract: Option<String>,
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Accountability events, newest first
    Events { id: Option<String> },
}

#[derive(Subcommand, Debug)]
enum RedTagCommand {
    Raise {
        #[arg(long)]
        contract: String,
        #[arg(long)]
        severity: RedTagSeverity,
        #[arg(long)]
        title: String,
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long)]
        request: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Transition {
        id: String,
        state: RedTagState,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        resolved_by: Option<String>,
    },
    List,
}

impl Command {
    fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Policy(PolicyCommand::List)
                | Command::Contract(ContractCommand::List)
                | Command::Request(
                    RequestCommand::Show { .. }
                        | RequestCommand::List { .. }
                        | RequestCommand::Events { .. }
                )
                | Command::RedTag(RedTagCommand::List)
        )
    }
}

/// Store backend plus everything wired on top of it
struct App {
    store: SharedStore,
    /// Memory store and where to write it back; `None` for RocksDB
    snapshot: Option<(Arc<MemoryStore>, PathBuf)>,
    audit: Arc<AuditBus>,
    escalation: EscalationEngine,
    requests: RequestService,
    red_tags: RedTagService,
}

impl App {
    fn open(config: &TrackerConfig) -> Result<Self> {
        let (store, snapshot) = open_store(config)?;
        let audit = AuditBus::new().shared();
        let blocking = Arc::new(BlockingEngine::new(store.clone(), audit.clone()));

        Ok(Self {
            escalation: EscalationEngine::with_config(
                store.clone(),
                audit.clone(),
                EscalationConfig {
                    mode: config.escalation_mode,
                },
            ),
            requests: RequestService::new(store.clone(), audit.clone(), blocking.clone()),
            red_tags: RedTagService::new(store.clone(), audit.clone(), blocking),
            store,
            snapshot,
            audit,
        })
    }

    /// Write the memory store back to its snapshot file
    fn persist(&self) -> Result<()> {
        if let Some((store, path)) = &self.snapshot {
            store
                .save(path)
                .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(feature = "rocksdb-store")]
fn open_store(config: &TrackerConfig) -> Result<(SharedStore, Option<(Arc<MemoryStore>, PathBuf)>)> {
    if let Some(path) = &config.state_path {
        let store = accountability::RocksStore::open(path.clone())
            .with_context(|| format!("Failed to open RocksDB at {}", path.display()))?;
        info!(path = %path.display(), "Using RocksDB store");
        let shared: SharedStore = store.shared();
        return Ok((shared, None));
    }
    open_memory_store(config)
}

#[cfg(not(feature = "rocksdb-store"))]
fn open_store(config: &TrackerConfig) -> Result<(SharedStore, Option<(Arc<MemoryStore>, PathBuf)>)> {
    if let Some(path) = &config.state_path {
        warn!(
            path = %path.display(),
            "State path set but built without rocksdb-store; using snapshot file"
        );
    }
    open_memory_store(config)
}

fn open_memory_store(
    config: &TrackerConfig,
) -> Result<(SharedStore, Option<(Arc<MemoryStore>, PathBuf)>)> {
    let store = MemoryStore::load(&config.data_path)
        .with_context(|| format!("Failed to load snapshot {}", config.data_path.display()))?
        .shared();
    let shared: SharedStore = store.clone();
    Ok((shared, Some((store, config.data_path.clone()))))
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn log_audit(entry: &AuditEntry) {
    info!(
        target: "audit",
        actor = ?entry.actor,
        action = ?entry.action,
        entity = ?entry.entity,
        entity_id = %entry.entity_id,
        details = %entry.details,
        "Audit entry"
    );
}

/// Log whatever the bus has buffered without waiting
fn drain_audit(rx: &mut broadcast::Receiver<AuditEntry>) {
    loop {
        match rx.try_recv() {
            Ok(entry) => log_audit(&entry),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Audit log lagged behind");
            }
            Err(_) => break,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = TrackerConfig::from_env();
    if let Some(path) = cli.data_path.clone() {
        config.data_path = path;
    }
    if let Some(path) = cli.policies.clone() {
        config.policies_path = Some(path);
    }
    if let Some(mode) = cli.escalation_mode {
        config.escalation_mode = mode;
    }
    if let Some(path) = cli.state_path.clone() {
        config.state_path = Some(path);
    }

    let app = App::open(&config)?;
    if let Some(path) = &config.policies_path {
        let file = PolicyFile::load(path)?;
        file.apply(&*app.store)?;
    }

    match run(&app, &config, &cli).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<TrackerError>() {
            Some(rejection) => {
                print_json(&rejection.to_response())?;
                std::process::exit(2);
            }
            None => Err(err),
        },
    }
}

async fn run(app: &App, config: &TrackerConfig, cli: &Cli) -> Result<()> {
    let mut audit_rx = app.audit.subscribe();
    let actor = cli.actor.as_deref();

    let result = match &cli.command {
        Command::Check { now } => {
            let now = match now {
                Some(raw) => parse_due_date(raw)
                    .with_context(|| format!("Invalid --now value: {}", raw))?,
                None => chrono::Utc::now(),
            };
            let summary = app.escalation.run_check(now)?;
            print_json(&summary)
        }
        Command::Watch { interval_secs } => {
            let interval = interval_secs
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(config.check_interval);
            return watch(app, interval, audit_rx).await;
        }
        Command::Policy(cmd) => policy(app, cmd),
        Command::Contract(cmd) => contract(app, cmd),
        Command::Request(cmd) => request(app, cmd, actor),
        Command::RedTag(cmd) => red_tag(app, cmd, actor),
    };

    drain_audit(&mut audit_rx);
    result?;

    if !cli.command.is_read_only() {
        app.persist()?;
    }
    Ok(())
}

async fn watch(
    app: &App,
    interval: Duration,
    mut audit_rx: broadcast::Receiver<AuditEntry>,
) -> Result<()> {
    let audit_task = tokio::spawn(async move {
        loop {
            match audit_rx.recv().await {
                Ok(entry) => log_audit(&entry),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Audit log lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        mode = %app.escalation.config().mode,
        "Accountability watch started"
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed tick is retried on the next one
                match app.escalation.run_check(chrono::Utc::now()) {
                    Ok(_) => {
                        if let Err(e) = app.persist() {
                            warn!("Failed to persist after check: {:#}", e);
                        }
                    }
                    Err(e) => warn!("Accountability check failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                break;
            }
        }
    }

    audit_task.abort();
    Ok(())
}

fn policy(app: &App, cmd: &PolicyCommand) -> Result<()> {
    match cmd {
        PolicyCommand::List => print_json(&app.store.list_policies()?),
        PolicyCommand::Set {
            client_package,
            reminder_hours,
            warning_hours,
            escalation_hours,
        } => {
            if client_package.trim().is_empty() {
                return Err(TrackerError::InvalidInput {
                    message: "client package must not be empty".to_string(),
                }
                .into());
            }
            let policy = app.store.upsert_policy(AccountabilityPolicy::new(
                client_package.trim(),
                *reminder_hours,
                *warning_hours,
                *escalation_hours,
            ))?;
            print_json(&policy)
        }
        PolicyCommand::Load { path } => {
            let count = PolicyFile::load(path)?.apply(&*app.store)?;
            print_json(&serde_json::json!({ "loaded": count }))
        }
    }
}

fn contract(app: &App, cmd: &ContractCommand) -> Result<()> {
    match cmd {
        ContractCommand::Add {
            id,
            name,
            client_name,
            package,
        } => {
            let mut contract = Contract::new(name.as_str(), client_name.as_str(), package.as_str());
            if let Some(id) = id {
                contract = contract.with_id(id.as_str());
            }
            app.store.put_contract(&contract)?;
            print_json(&contract)
        }
        ContractCommand::List => print_json(&app.store.list_contracts()?),
    }
}

fn request(app: &App, cmd: &RequestCommand, actor: Option<&str>) -> Result<()> {
    match cmd {
        RequestCommand::Create {
            contract,
            owner,
            title,
            tag,
            due,
            milestone,
            description,
            priority,
        } => {
            let created = app.requests.create(
                NewRequest {
                    contract_id: contract.clone(),
                    milestone_id: milestone.clone(),
                    owner_id: owner.clone(),
                    title: title.clone(),
                    description: description.clone(),
                    tag: tag.clone(),
                    priority: *priority,
                    due_at: due.clone(),
                },
                actor,
            )?;
            print_json(&created)
        }
        RequestCommand::Transition { id, state } => {
            print_json(&app.requests.transition(id, *state, actor)?)
        }
        RequestCommand::Show { id } => print_json(&app.requests.get(id)?),
        RequestCommand::List {
            state,
            contract,
            milestone,
            tag,
        } => {
            let mut filter = RequestFilter::new();
            if !state.is_empty() {
                filter = filter.states(state);
            }
            if let Some(contract) = contract {
                filter = filter.contract(contract);
            }
            if let Some(milestone) = milestone {
                filter = filter.milestone(milestone);
            }
            if let Some(tag) = tag {
                filter = filter.tag(tag);
            }
            print_json(&app.requests.list(&filter)?)
        }
        RequestCommand::Events { id } => print_json(&app.requests.events(id.as_deref())?),
    }
}

fn red_tag(app: &App, cmd: &RedTagCommand, actor: Option<&str>) -> Result<()> {
    match cmd {
        RedTagCommand::Raise {
            contract,
            severity,
            title,
            milestone,
            request,
            description,
        } => {
            let outcome = app.red_tags.raise(
                NewRedTag {
                    contract_id: contract.clone(),
                    milestone_id: milestone.clone(),
                    request_id: request.clone(),
                    severity: *severity,
                    title: title.clone(),
                    description: description.clone(),
                    created_by_id: None,
                },
                actor,
            )?;
            print_json(&outcome)
        }
        RedTagCommand::Transition {
            id,
            state,
            notes,
            resolved_by,
        } => {
            let update = RedTagUpdate {
                state: *state,
                resolution_notes: notes.clone(),
                resolved_by_id: resolved_by.clone(),
            };
            print_json(&app.red_tags.transition(id, update, actor)?)
        }
        RedTagCommand::List => print_json(&app.red_tags.list()?),
    }
}
