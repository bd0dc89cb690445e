//! Receiver Application
//!
//! Event loop tying the document runtime to the console and the carousel.
//! Input lines, timer ticks and finished module fetches arrive on one
//! channel and are handled strictly one at a time.

use crate::carousel::{Announcement, Carousel};
use crate::html_renderer::HtmlRenderer;
use crate::store::JsonFileStore;
use anyhow::{bail, Context};
use bml_engine::bml_nav::{translate_key, AribKey, KeyModifiers};
use bml_engine::bml_resource::{CachedModule, ComponentId, FetchError, ModuleKey};
use bml_engine::{DocumentRuntime, EventMessage, RuntimeConfig, StatusSink, StubInterpreter};
use smol::channel::Sender;
use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;
use smol::{Timer, Unblock};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler tick period
const TICK: Duration = Duration::from_millis(100);

type Runtime = DocumentRuntime<StubInterpreter, HtmlRenderer>;

/// Startup options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub carousel: PathBuf,
    pub start_document: String,
    pub config: RuntimeConfig,
    pub store_path: PathBuf,
}

impl AppOptions {
    pub fn new(carousel: impl Into<PathBuf>) -> Self {
        Self {
            carousel: carousel.into(),
            start_document: "/40/0000/startup.bml".to_string(),
            config: RuntimeConfig::default(),
            store_path: PathBuf::from("persistent.json"),
        }
    }
}

/// A console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Key(AribKey),
    Launch(String),
    /// Re-read the carousel announcement
    Rescan,
    /// Deliver an immediate event message on a component
    Message { component: ComponentId, message: EventMessage },
    Status,
    Quit,
}

/// Parse one input line
pub fn parse_command(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        bail!("empty command");
    };

    let command = match head {
        "quit" | "q" => Command::Quit,
        "status" => Command::Status,
        "rescan" => Command::Rescan,
        "launch" => match words.next() {
            Some(target) => Command::Launch(target.to_string()),
            None => bail!("usage: launch <reference>"),
        },
        "msg" => {
            let usage = "usage: msg <component> <message-id> <version> [data]";
            let component = words.next().and_then(ComponentId::parse).context(usage)?;
            let id = words.next().and_then(|w| w.parse().ok()).context(usage)?;
            let version = words.next().and_then(|w| w.parse().ok()).context(usage)?;
            let data = words.collect::<Vec<_>>().join(" ");
            Command::Message {
                component,
                message: EventMessage::immediate(id, version, &data),
            }
        }
        key => match translate_key(key, KeyModifiers::default()) {
            Some(key) => Command::Key(key),
            None => bail!("unknown command: {}", key),
        },
    };
    Ok(command)
}

/// Status sink writing to the log
#[derive(Debug, Default)]
pub struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn set_status(&mut self, text: &str) {
        tracing::info!(target: "status", "{}", text.replace('\n', " | "));
    }

    fn record_transition(&mut self, from: Option<&str>, to: &str) {
        tracing::info!(target: "status", "{} -> {}", from.unwrap_or("(none)"), to);
    }
}

enum AppEvent {
    Input(String),
    InputClosed,
    Tick(Duration),
    Fetched(ModuleKey, Result<CachedModule, FetchError>),
}

/// Run the receiver until `quit` or end of input
pub async fn run(options: AppOptions) -> anyhow::Result<()> {
    let carousel = Carousel::new(&options.carousel);
    let store = JsonFileStore::open(&options.store_path)
        .with_context(|| format!("Failed to open {}", options.store_path.display()))?;

    let mut runtime = DocumentRuntime::new(
        options.config,
        StubInterpreter::new(),
        HtmlRenderer::new(),
        Box::new(store),
        Box::new(ConsoleStatus),
    );

    let announcement = carousel
        .scan()
        .await
        .with_context(|| format!("Failed to scan carousel {}", carousel.root().display()))?;
    apply_announcement(&mut runtime, announcement);
    if let Some(program) = carousel.program_info().await? {
        runtime.set_program_info(program);
    }

    let (tx, rx) = smol::channel::unbounded();
    spawn_input(tx.clone());
    spawn_ticker(tx.clone());

    tracing::info!("Starting with {}", options.start_document);
    runtime.launch_document(&options.start_document).await;
    dispatch_fetches(&mut runtime, &carousel, &tx);

    while let Ok(event) = rx.recv().await {
        match event {
            AppEvent::Input(line) => match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => execute(&mut runtime, &carousel, command).await,
                Err(e) => tracing::warn!("{}", e),
            },
            AppEvent::InputClosed => break,
            AppEvent::Tick(delta) => runtime.tick(delta).await,
            AppEvent::Fetched(key, result) => runtime.on_module_fetched(key, result).await,
        }
        dispatch_fetches(&mut runtime, &carousel, &tx);
    }

    tracing::info!("Shutting down");
    Ok(())
}

async fn execute(runtime: &mut Runtime, carousel: &Carousel, command: Command) {
    match command {
        Command::Key(key) => {
            let dispatch = runtime.key_down(key).await;
            tracing::debug!("{:?} -> {:?}", key, dispatch);
            runtime.key_up(key).await;
        }
        Command::Launch(target) => {
            runtime.launch_document(&target).await;
        }
        Command::Rescan => match carousel.scan().await {
            Ok(announcement) => apply_announcement(runtime, announcement),
            Err(e) => tracing::warn!("Rescan failed: {:#}", e),
        },
        Command::Message { component, message } => {
            runtime.on_event_messages(component, &[message]).await;
        }
        Command::Status => print_status(runtime),
        Command::Quit => {}
    }
}

fn apply_announcement(runtime: &mut Runtime, announcement: Announcement) {
    runtime.set_program_map(announcement.components.keys().copied());
    for (component, modules) in announcement.components {
        runtime.update_download_info(component, modules);
    }
}

fn print_status(runtime: &Runtime) {
    let browser = runtime.browser();
    println!("active: {}", runtime.active_document().as_deref().unwrap_or("(none)"));
    for info in browser.get_locked_module_info() {
        println!("locked: {} kind={} status={}", info.module, info.kind, info.status);
    }
    println!("queued events: {}", browser.document().queue.len());
}

/// Start a carousel download for every module the runtime asked for
fn dispatch_fetches(runtime: &mut Runtime, carousel: &Carousel, tx: &Sender<AppEvent>) {
    for request in runtime.take_fetch_requests() {
        let carousel = carousel.clone();
        let tx = tx.clone();
        smol::spawn(async move {
            let result = carousel.fetch(request.key).await;
            let _ = tx.send(AppEvent::Fetched(request.key, result)).await;
        })
        .detach();
    }
}

fn spawn_input(tx: Sender<AppEvent>) {
    smol::spawn(async move {
        let mut lines = BufReader::new(Unblock::new(std::io::stdin())).lines();
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if tx.send(AppEvent::Input(line)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(AppEvent::InputClosed).await;
    })
    .detach();
}

fn spawn_ticker(tx: Sender<AppEvent>) {
    smol::spawn(async move {
        let mut timer = Timer::interval(TICK);
        let mut last = std::time::Instant::now();
        while let Some(now) = timer.next().await {
            let delta = now.saturating_duration_since(last);
            last = now;
            if tx.send(AppEvent::Tick(delta)).await.is_err() {
                break;
            }
        }
    })
    .detach();
}
