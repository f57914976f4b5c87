use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    discovery::resolve_endpoint, indicators::INDICATOR_LIGHTS, sync_watcher, watcher,
    ComeBackOptions, ConnectOptions, IndicatorLight, LiveIndicator, PanelSession, SyncError,
    WatchHandle,
};
use serde_json::Value;
use shared::names;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod hooks;

use config::load_settings;
use hooks::HookRunner;

#[derive(Parser, Debug)]
#[command(about = "Headless control panel for a shared mixing server")]
struct Cli {
    /// `HOST:PORT`, `ws://` URL, or a bare host to look up via SRV.
    #[arg(long, global = true, env = "OBS_URL", default_value = "localhost:4455")]
    url: String,
    #[arg(long, global = true, env = "OBS_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, global = true, default_value = "panel.toml")]
    config: PathBuf,
    /// Per-request timeout in seconds.
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current value of NAME.
    Get { name: String },
    /// Store VALUE under NAME and notify every panel.
    Set { name: String, value: String },
    /// Notify every panel without storing.
    Broadcast { name: String, value: String },
    /// Print every update of the given names until interrupted.
    Watch {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Mute the room and switch to the notes scene.
    Break,
    /// Count down and return to SCENE.
    Back {
        scene: String,
        #[arg(long)]
        jingle: bool,
        #[arg(long)]
        broadcaster: bool,
    },
    /// Switch to a stored preset.
    Preset {
        id: String,
        /// Only print whether the preset is on air.
        #[arg(long)]
        check: bool,
    },
    /// Toggle an indicator light for every panel.
    Indicator {
        #[arg(value_parser = indicator_key)]
        light: String,
    },
    /// Run local hooks (sounds, notes scrolling, window resizing).
    Daemon {
        #[arg(long)]
        broadcaster: bool,
        #[arg(long)]
        no_sound: bool,
    },
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();
}

/// Command-line values are JSON when they parse as JSON, plain strings otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn indicator_key(raw: &str) -> Result<String, String> {
    if IndicatorLight::find(raw).is_some() {
        return Ok(raw.to_string());
    }
    let known: Vec<&str> = INDICATOR_LIGHTS.iter().map(|light| light.key).collect();
    Err(format!("unknown light {raw:?}, expected one of {}", known.join(", ")))
}

/// Panel action failures become a status line; anything else is fatal.
fn status_line(err: &anyhow::Error) -> Option<String> {
    err.downcast_ref::<SyncError>()
        .map(|err| err.status().to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(&cli.config)?;
    let endpoint = resolve_endpoint(&cli.url).await;
    let options = ConnectOptions {
        url: endpoint.ws_url(),
        password: cli.password.clone(),
        request_timeout: Duration::from_secs(cli.timeout),
        ..ConnectOptions::default()
    };
    let mut session = PanelSession::connect(options, settings.layout)
        .await
        .with_context(|| format!("failed to connect to {endpoint}"))?;

    let outcome = run(&mut session, cli.command, settings.hooks).await;
    session.shutdown();
    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match status_line(&err) {
            Some(line) => {
                eprintln!("{line}");
                Ok(ExitCode::FAILURE)
            }
            None => Err(err),
        },
    }
}

async fn run(session: &mut PanelSession, command: Command, hooks: config::HookSettings) -> Result<()> {
    match command {
        Command::Get { name } => {
            let value = session.hub.get(&name).await?;
            println!("{value}");
        }
        Command::Set { name, value } => {
            session.hub.set(&name, parse_value(&value)).await?;
        }
        Command::Broadcast { name, value } => {
            session.hub.broadcast(&name, parse_value(&value)).await?;
        }
        Command::Watch { names } => {
            let mut handles: Vec<WatchHandle> = Vec::with_capacity(names.len());
            for name in names {
                let label = name.clone();
                let print = sync_watcher(move |value| {
                    println!("{label} = {value}");
                    Ok(())
                });
                handles.push(session.hub.watch_init(&name, print).await?);
            }
            wait_for_exit(session).await;
            for handle in &handles {
                session.hub.unwatch(handle);
            }
        }
        Command::Break => {
            session.sequencer.go_to_break().await?;
            session.sequencer.wait_pending().await?;
        }
        Command::Back {
            scene,
            jingle,
            broadcaster,
        } => {
            session.sequencer.come_back(
                &scene,
                ComeBackOptions {
                    jingle,
                    unmute_broadcaster: broadcaster,
                },
            )?;
            session.sequencer.wait_pending().await?;
        }
        Command::Preset { id, check: true } => {
            let state = session.presets().state(&id).await?;
            println!("{state:?}");
        }
        Command::Preset { id, check: false } => {
            session.sequencer.switch_preset(&id).await?;
        }
        Command::Indicator { light } => {
            let Some(light) = IndicatorLight::find(&light) else {
                anyhow::bail!("unknown light {light:?}");
            };
            let on = light.toggle(&session.hub).await?;
            println!("{} {}", light.key, if on { "on" } else { "off" });
        }
        Command::Daemon {
            broadcaster,
            no_sound,
        } => {
            let runner = Arc::new(HookRunner::new(hooks, broadcaster, no_sound));
            install_hooks(session, &runner);
            let _live = follow_live(session).await?;
            println!("connected, waiting...");
            wait_for_exit(session).await;
        }
    }
    Ok(())
}

/// Publishes `mirror-live` from the room microphone, the gallery and the scene.
async fn follow_live(session: &PanelSession) -> Result<Arc<LiveIndicator>> {
    let live = LiveIndicator::new(Arc::clone(&session.hub));
    live.follow_mute(&session.layout.audio_input).await?;
    live.follow_gallery().await?;
    live.follow_scene(Arc::clone(&session.layout)).await?;
    Ok(live)
}

fn install_hooks(session: &PanelSession, runner: &Arc<HookRunner>) {
    let hub = &session.hub;

    let sounds = Arc::clone(runner);
    hub.watch(
        names::PLAYSOUND,
        watcher(move |value| {
            let sounds = Arc::clone(&sounds);
            async move { Ok(sounds.play_sound(&value).await?) }
        }),
    );

    let notes = Arc::clone(runner);
    hub.watch(
        names::NOTES_SCROLL,
        watcher(move |value| {
            let notes = Arc::clone(&notes);
            async move { Ok(notes.scroll_notes(&value).await?) }
        }),
    );

    let auto = Arc::clone(runner);
    hub.watch(
        names::NOTES_SCROLL_AUTO,
        sync_watcher(move |value| {
            auto.auto_scroll(&value);
            Ok(())
        }),
    );

    for name in [names::SCREENSHARE_RESOLUTION, names::MAINWINDOW_RESOLUTION] {
        let resize = Arc::clone(runner);
        hub.watch(
            name,
            watcher(move |value| {
                let resize = Arc::clone(&resize);
                async move { Ok(resize.change_resolution(&value).await?) }
            }),
        );
    }
    info!("hooks installed");
}

async fn wait_for_exit(session: &mut PanelSession) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "cannot listen for interrupt");
            }
        }
        () = session.closed() => warn!("connection to mixing server closed"),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
