//! media-relay - CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use media_relay::{
    accounts::AccountStore,
    cli::{Args, ModeArg},
    config::{validate_config, Config},
    discover::{Candidate, DiscoverRequest},
    error::{exit_codes, Error, Result},
    events::EngineEvent,
    output::{
        follow_events, print_banner, print_config_summary, print_error, print_info,
        print_queue_stats, print_success, print_warning,
    },
    queue::{spawn_discovery_unit, EphemeralQueueStore, ItemStatus, JsonQueueStore, Orchestrator, QueueItem, QueueStore},
    session::SessionManager,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            match e {
                Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => {
                    ExitCode::from(exit_codes::CONFIG_ERROR as u8)
                }
                Error::Authentication(_)
                | Error::SessionExpired(_)
                | Error::AccountNotFound(_)
                | Error::Browser(_) => ExitCode::from(exit_codes::AUTH_ERROR as u8),
                Error::Download(_)
                | Error::Upload(_)
                | Error::UploadRejected(_)
                | Error::Discovery(_)
                | Error::Queue(_) => ExitCode::from(exit_codes::PIPELINE_ERROR as u8),
                _ => ExitCode::from(exit_codes::UNEXPECTED_ERROR as u8),
            }
        }
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    // Print banner
    print_banner();

    // Load configuration
    let mut config = Config::load(&args.config)?;
    args.merge_into_config(&mut config);
    validate_config(&config)?;

    // Discover accounts
    let accounts = Arc::new(AccountStore::scan(&config.accounts.directory).await?);

    print_config_summary(
        &config.origin.base_url,
        accounts.ids().len(),
        &config.download_directory().display().to_string(),
    );

    // Shared HTTP client
    let client = reqwest::Client::builder()
        .user_agent(&config.origin.user_agent)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

    let config = Arc::new(config);
    let sessions = Arc::new(SessionManager::new(
        client.clone(),
        config.origin.clone(),
        accounts.clone(),
    ));

    let account_id = resolve_account(&args, &accounts)?;

    match args.mode {
        ModeArg::CheckAuth => check_auth(&sessions, &account_id).await,
        ModeArg::Discover => {
            discover_mode(&args, client, config, sessions, &account_id).await
        }
        ModeArg::Upload => upload_mode(&args, client, config, sessions, &account_id).await,
        ModeArg::Run => run_queue(&args, client, config, sessions, &account_id).await,
    }
}

/// Pick the account to act as.
fn resolve_account(args: &Args, accounts: &AccountStore) -> Result<String> {
    if let Some(ref account) = args.account {
        // Fails early when the id is unknown.
        accounts.get(account)?;
        return Ok(account.clone());
    }

    accounts
        .first_active()
        .map(|a| a.id)
        .ok_or_else(|| Error::MissingConfig("account (no active accounts found)".to_string()))
}

async fn check_auth(sessions: &SessionManager, account_id: &str) -> Result<()> {
    print_info(&format!("Validating session for {}...", account_id));

    if sessions.validate(account_id).await {
        print_success("Session is valid");
        Ok(())
    } else {
        Err(Error::Authentication(format!(
            "No valid session for {}",
            account_id
        )))
    }
}

async fn discover_mode(
    args: &Args,
    client: reqwest::Client,
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
    account_id: &str,
) -> Result<()> {
    let cookies = sessions.get_cookies(account_id).await?;

    // Everything already in the queue counts as processed.
    let store = JsonQueueStore::new(config.storage.queue_file.clone());
    let already_processed = store
        .load()?
        .iter()
        .filter_map(|item| item.video.url.clone())
        .collect();

    let request = DiscoverRequest {
        account_id: account_id.to_string(),
        target_count: args.count,
        already_processed,
    };

    let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(64);
    let display = spawn_event_display(events_rx, args.quiet);

    let candidates = spawn_discovery_unit(client, cookies, config.clone(), request, events_tx)
        .await
        .map_err(|e| Error::Discovery(format!("Discovery unit died: {}", e)))??;

    display.await.ok();

    if candidates.is_empty() {
        print_warning("No unprocessed candidates found");
        return Ok(());
    }

    println!();
    for candidate in &candidates {
        let size = candidate
            .size
            .map(|s| format!("{}", indicatif::HumanBytes(s)))
            .unwrap_or_else(|| "?".to_string());
        println!("  {:>10}  {}  {}", size, candidate.title, candidate.url);
    }

    if args.enqueue {
        let mut items = store.load()?;
        let offset = items.len() as u32;
        for (index, candidate) in candidates.iter().enumerate() {
            items.push(QueueItem::from_candidate(
                candidate,
                account_id,
                offset + index as u32,
            ));
        }
        store.save(&items)?;
        print_success(&format!("Enqueued {} item(s)", candidates.len()));
    }

    Ok(())
}

async fn upload_mode(
    args: &Args,
    client: reqwest::Client,
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
    account_id: &str,
) -> Result<()> {
    let file = args
        .file
        .clone()
        .ok_or_else(|| Error::MissingConfig("--file is required in upload mode".to_string()))?;
    if !file.exists() {
        return Err(Error::Upload(format!("No such file: {}", file.display())));
    }

    // Direct uploads run on an ephemeral queue.
    let mut orchestrator = Orchestrator::new(
        config,
        client,
        sessions,
        Box::new(EphemeralQueueStore),
    );
    orchestrator.enqueue(QueueItem::from_local_file(file, account_id, 0));

    drive_queue(orchestrator, args.quiet).await
}

async fn run_queue(
    args: &Args,
    client: reqwest::Client,
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
    account_id: &str,
) -> Result<()> {
    let store = JsonQueueStore::new(config.storage.queue_file.clone());
    let mut orchestrator = Orchestrator::new(config, client, sessions, Box::new(store));

    if let Some(ref source) = args.source {
        let candidate = Candidate {
            url: source.clone(),
            title: title_from_url(source),
            thumbnail: None,
            size: None,
        };
        orchestrator.enqueue(QueueItem::from_candidate(&candidate, account_id, 0));
    }

    drive_queue(orchestrator, args.quiet).await
}

/// Run an orchestrator to drain and report the outcome.
async fn drive_queue(mut orchestrator: Orchestrator, quiet: bool) -> Result<()> {
    orchestrator.exit_when_idle();

    let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(64);
    orchestrator.subscribe(events_tx);
    let display = spawn_event_display(events_rx, quiet);

    // Held open for the whole run; no interactive commands in CLI mode.
    let (_commands_tx, commands_rx) = mpsc::channel(8);
    let items = orchestrator.run(commands_rx).await?;

    display.await.ok();

    print_queue_stats(&items);

    let failed = items
        .iter()
        .filter(|i| i.status == ItemStatus::Failed)
        .count();
    if failed > 0 {
        return Err(Error::Queue(format!("{} item(s) failed", failed)));
    }

    Ok(())
}

/// Render engine events, or silently drain them in quiet mode.
fn spawn_event_display(
    events_rx: mpsc::Receiver<EngineEvent>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    if quiet {
        tokio::spawn(async move {
            let mut events_rx = events_rx;
            while events_rx.recv().await.is_some() {}
        })
    } else {
        tokio::spawn(follow_events(events_rx))
    }
}

/// Derive a display title from a detail-page URL.
fn title_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("video")
        .to_string()
}
