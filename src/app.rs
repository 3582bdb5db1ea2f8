use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::commands::Command;
use crate::config::{self, Config};
use crate::devtools::{self, DevToolsClient, DevToolsPage};
use crate::logging;
use crate::navigator::{ActivationState, Navigator, Outcome};
use crate::remote::Listener;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DISPATCH_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config_file: Option<PathBuf>,
}

enum Connection {
    Exit,
    Lost,
}

pub fn run(options: Options) -> Result<()> {
    let default_path = config::default_path();
    let display_path = friendly_path(options.config_file.as_ref().or(default_path.as_ref()));
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file,
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.log);
    info!(version = crate::VERSION, config = %display_path, "tube-remote starting");

    let (command_tx, command_rx) = unbounded();
    let mut listener = Listener::bind(&cfg.remote.listen_addr, command_tx)?;
    info!(addr = %listener.local_addr(), "listening for commands");

    let result = serve(&cfg, &command_rx);
    listener.close();
    info!("tube-remote stopped");
    result
}

fn serve(cfg: &Config, commands: &Receiver<Command>) -> Result<()> {
    loop {
        let should_stop = || drain_until_exit(commands);
        let Some(tab) = devtools::discover(&cfg.devtools, &should_stop)? else {
            return Ok(());
        };
        let ws_url = tab
            .web_socket_debugger_url
            .as_deref()
            .context("video tab has no debugger url")?;

        let client = match DevToolsClient::connect(ws_url, cfg.devtools.connect_timeout) {
            Ok(client) => client,
            Err(err) => {
                warn!(error = ?err, "connecting to the video tab failed");
                if wait_or_exit(commands, RECONNECT_DELAY) {
                    return Ok(());
                }
                continue;
            }
        };
        info!(title = %tab.title, "connected to video tab");

        match drive(cfg, Arc::new(DevToolsPage::new(client)), commands) {
            Connection::Exit => return Ok(()),
            Connection::Lost => {
                warn!(
                    "connection to the browser lost; reconnecting in {}",
                    humantime::format_duration(RECONNECT_DELAY)
                );
                if wait_or_exit(commands, RECONNECT_DELAY) {
                    return Ok(());
                }
            }
        }
    }
}

fn drive(cfg: &Config, page: Arc<DevToolsPage>, commands: &Receiver<Command>) -> Connection {
    let mut navigator = Navigator::new(page.clone(), page.clone(), cfg.navigator.clone());
    let skip_seconds = cfg.player.effective_skip_seconds();

    loop {
        match commands.recv_timeout(DISPATCH_TICK) {
            Ok(Command::Exit) => {
                info!("{}", Command::Exit.status_message(skip_seconds));
                if navigator.state() == ActivationState::Active {
                    if let Err(err) = navigator.deactivate() {
                        warn!(error = ?err, "closing the navigator on exit failed");
                    }
                }
                return Connection::Exit;
            }
            Ok(command) => execute(&mut navigator, page.client(), command, skip_seconds),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Connection::Exit,
        }

        navigator.poll();
        if page.client().is_closed() {
            navigator.reset();
            return Connection::Lost;
        }
    }
}

fn execute(
    navigator: &mut Navigator,
    client: &DevToolsClient,
    command: Command,
    skip_seconds: u32,
) {
    if let Some(nav) = command.navigator() {
        let outcome = navigator.dispatch(nav);
        debug!(%command, ?outcome, "navigator command handled");
        if outcome != Outcome::Ignored {
            info!("{}", command.outcome_message(&outcome, skip_seconds));
        }
        return;
    }

    let Some(expression) = command.player_expression(skip_seconds) else {
        return;
    };
    match client.evaluate(&expression) {
        Ok(_) => info!("{}", command.status_message(skip_seconds)),
        Err(err) => error!(%command, error = ?err, "player command failed"),
    }
}

/// Drops commands that arrive while no tab is connected. True once `exit` shows up.
fn drain_until_exit(commands: &Receiver<Command>) -> bool {
    while let Ok(command) = commands.try_recv() {
        if command == Command::Exit {
            return true;
        }
        warn!(%command, "not connected to a video tab; command dropped");
    }
    false
}

fn wait_or_exit(commands: &Receiver<Command>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match commands.recv_timeout(remaining) {
            Ok(Command::Exit) | Err(RecvTimeoutError::Disconnected) => return true,
            Ok(command) => warn!(%command, "not connected to a video tab; command dropped"),
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/tube-remote/config.yaml".to_string()
    }
}
