//! Application entry point: AutoVoice clipboard reader.
//!
//! # Startup sequence
//!
//! 1. Parse the command line and initialise logging.
//! 2. Load [`AppConfig`] (defaults on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. Build the engine registry around [`DefaultEngineFactory`].
//! 5. `--diagnose`: switch to the configured engine, print the report, exit.
//! 6. Spawn the hotkey listener thread and the dispatch loop.
//! 7. Switch to the configured engine and, if configured, start listening.
//! 8. Read operator commands from stdin until `quit` or Ctrl+C.
//! 9. Persist the engine settings.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use auto_voice::{
    clipboard::SystemClipboard,
    config::{AppConfig, AppPaths},
    console::{self, ConsoleRequest},
    diagnostics::{self, DiagnosticReport},
    dispatch::{new_shared_status, DispatchCommand, DispatchLoop, ListenState},
    engine::EngineKind,
    hotkey::{HotkeyBinding, HotkeyGate, HotkeyListener},
    registry::{DefaultEngineFactory, EngineRegistry, NoControls},
};

/// Reads short English text from the clipboard aloud.
#[derive(Parser)]
#[command(name = "auto-voice", version, about)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine to start with: native or process
    #[arg(short, long)]
    engine: Option<EngineKind>,

    /// Print a diagnostic report and exit
    #[arg(long)]
    diagnose: bool,

    /// Print diagnostic reports as JSON
    #[arg(long)]
    json: bool,

    /// Do not install the global copy-keystroke hook
    #[arg(long)]
    no_hotkey: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_report(report: &DiagnosticReport, json: bool) {
    if json {
        match report.to_json() {
            Ok(text) => println!("{text}"),
            Err(e) => log::error!("could not serialise report: {e}"),
        }
    } else {
        print!("{report}");
    }
}

fn print_voices(registry: &EngineRegistry) {
    let selected = registry.settings().voice;
    let voices = registry.voices();
    if voices.is_empty() {
        println!("no voices (is an engine ready?)");
    }
    for voice in voices {
        let marker = if voice == selected { "*" } else { " " };
        println!(" {marker} {voice}");
    }
}

async fn run(cli: Cli, mut config: AppConfig, config_path: PathBuf) -> anyhow::Result<()> {
    let factory = Arc::new(DefaultEngineFactory::new(&config.process));
    let registry = EngineRegistry::new(factory, Arc::new(NoControls), config.engine.settings());

    if cli.diagnose {
        if let Err(e) = registry.switch_to(config.engine.kind).await {
            log::warn!("{e}");
        }
        let report = diagnostics::collect(&registry, ListenState::Stopped).await;
        print_report(&report, cli.json);
        registry.shutdown();
        return Ok(());
    }

    // Hotkey listener thread
    let status = new_shared_status(config.listen.status_capacity);
    let gate = HotkeyGate::new();
    let (hotkey_tx, hotkey_rx) = mpsc::channel(16);
    let _hotkey_listener = if config.hotkey.enabled && !cli.no_hotkey {
        match HotkeyBinding::from_config(&config.hotkey)
            .and_then(|binding| HotkeyListener::start(binding, gate.clone(), hotkey_tx))
        {
            Ok(listener) => Some(listener),
            Err(e) => {
                log::warn!("Global hotkey disabled: {e}");
                None
            }
        }
    } else {
        drop(hotkey_tx);
        None
    };

    // Dispatch loop
    let dispatch = DispatchLoop::new(
        registry.clone(),
        Arc::new(SystemClipboard),
        gate,
        &config.listen,
        Arc::clone(&status),
    );
    let (command_tx, command_rx) = mpsc::channel(32);
    let dispatch_handle = tokio::spawn(dispatch.run(hotkey_rx, command_rx));

    command_tx
        .send(DispatchCommand::SwitchEngine(config.engine.kind))
        .await
        .context("dispatch loop exited early")?;
    if config.listen.auto_start {
        command_tx.send(DispatchCommand::Start).await?;
    }
    println!("{}", console::HELP);

    // Operator console
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        let line = tokio::select! {
            line = lines.next_line(), if stdin_open => line,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl+C received, shutting down");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("stdin closed; press Ctrl+C to quit");
                stdin_open = false;
                continue;
            }
            Err(e) => {
                log::warn!("stdin read failed: {e}");
                stdin_open = false;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match console::parse_line(&line) {
            Ok(request) => request,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match request {
            ConsoleRequest::Help => println!("{}", console::HELP),
            ConsoleRequest::Voices => print_voices(&registry),
            ConsoleRequest::Status => {
                let engine = registry.current().map(|e| e.name());
                let text = {
                    let status = status.lock().unwrap_or_else(|p| p.into_inner());
                    console::render_status(&status, engine, 10)
                };
                print!("{text}");
            }
            ConsoleRequest::Diag => {
                let (reply_tx, reply_rx) = oneshot::channel();
                command_tx.send(DispatchCommand::Diagnose(reply_tx)).await?;
                match reply_rx.await {
                    Ok(report) => print_report(&report, cli.json),
                    Err(_) => log::warn!("diagnostics were not produced"),
                }
            }
            ConsoleRequest::Quit => break,
            other => {
                if let Some(command) = other.into_command() {
                    command_tx.send(command).await?;
                }
            }
        }
    }

    // Capture settings before the loop releases the engine.
    let kind = registry.current_kind().unwrap_or(config.engine.kind);
    config.engine.absorb(kind, &registry.settings());

    let _ = command_tx.send(DispatchCommand::Shutdown).await;
    if let Err(e) = dispatch_handle.await {
        log::error!("dispatch loop panicked: {e}");
    }

    if let Err(e) = config.save_to(&config_path) {
        log::warn!("Failed to save settings to {}: {e}", config_path.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Logging
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
    log::info!("AutoVoice starting up");

    // 2. Configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);
    let mut config = AppConfig::load_from(&config_path).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    if let Some(kind) = cli.engine {
        config.engine.kind = kind;
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(cli, config, config_path))
}
