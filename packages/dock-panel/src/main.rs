mod config;
mod emitter;
mod input;
mod x11;

use clap::Parser;
use config::{DockConfig, BRIDGE_ENV};
use dock_core::bridge::{BridgeConnection, DockMonitor, MonitorConfig, MonitorExit, PanelEmitter};
use dock_core::plugin::PluginHost;
use dock_core::settings::{JsonFileSettings, SharedSettings};
use dock_core::snapshot::{HeadlessWindowSystem, WindowSystem};
use dock_core::{DisplayMode, DockContext, DockPosition, Panel};
use emitter::JsonLinesEmitter;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// A bridge that ran at least this long before exiting restarts without delay growth
const STABLE_RUN: Duration = Duration::from_secs(30);

/// Bridge restart delay. Doubles on every failed start or short-lived run.
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: INITIAL_BACKOFF,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = std::cmp::min(self.delay * 2, MAX_BACKOFF);
        delay
    }

    /// The bridge exited after running for `uptime`.
    fn bridge_exited(&mut self, uptime: Duration) {
        if uptime >= STABLE_RUN {
            self.delay = INITIAL_BACKOFF;
        }
    }
}

fn parse_kebab<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "dock-panel", about = "Desktop dock: application entries, plugin items and their popups")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/dock-panel/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bridge command line, overriding the config file and DOCK_BRIDGE
    #[arg(long)]
    bridge: Option<String>,

    /// Additional plugin directory (repeatable)
    #[arg(long = "plugin-dir")]
    plugin_dirs: Vec<PathBuf>,

    /// fashion or efficient
    #[arg(long, value_parser = parse_kebab::<DisplayMode>)]
    display_mode: Option<DisplayMode>,

    /// top, bottom, left or right
    #[arg(long, value_parser = parse_kebab::<DockPosition>)]
    position: Option<DockPosition>,

    #[arg(long)]
    icon_size: Option<u32>,

    /// Do not load the trash, network and tray providers
    #[arg(long)]
    no_builtin_plugins: bool,

    /// Run without an X display (no snapshots, no window closing)
    #[arg(long)]
    headless: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut DockConfig) {
        config.override_bridge(self.bridge.as_deref());
        config.plugin_dirs.extend(self.plugin_dirs.iter().cloned());
        if let Some(mode) = self.display_mode {
            config.display_mode = mode;
        }
        if let Some(position) = self.position {
            config.position = position;
        }
        if let Some(size) = self.icon_size {
            config.icon_size = size;
        }
        if self.no_builtin_plugins {
            config.builtin_plugins = false;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn window_system(headless: bool) -> (Rc<dyn WindowSystem>, Option<dock_core::Rect>) {
    if headless {
        return (Rc::new(HeadlessWindowSystem), None);
    }
    match x11::X11WindowSystem::connect() {
        Ok(ws) => {
            let screen = ws.screen();
            (Rc::new(ws), Some(screen))
        }
        Err(e) => {
            tracing::warn!(error = %e, "no X display, running headless");
            (Rc::new(HeadlessWindowSystem), None)
        }
    }
}

fn build_panel(config: &DockConfig, headless: bool) -> Panel {
    let (ws, screen) = window_system(headless);
    let mut ctx = DockContext {
        display_mode: config.display_mode,
        position: config.position,
        icon_size: config.icon_size,
        composite: ws.has_composite(),
        ..Default::default()
    };
    if let Some(screen) = screen {
        ctx.screen = screen;
    }

    let mut dirs = PluginHost::default_dirs();
    dirs.extend(config.plugin_dirs.iter().cloned());
    let mut host = PluginHost::new(dirs, dock_plugins::builtin_factories());
    let builtins = if config.builtin_plugins {
        dock_plugins::builtin_descriptors()
    } else {
        Vec::new()
    };
    host.load_all(&builtins);

    let settings_path = config.settings.clone().unwrap_or_else(JsonFileSettings::default_path);
    let settings: SharedSettings = Rc::new(RefCell::new(JsonFileSettings::open(&settings_path)));

    let panel = Panel::new(ctx, ws, host, settings, Instant::now());
    tracing::info!(plugins = ?panel.plugin_ids(), "panel ready");
    panel
}

/// Start the bridge, retrying with exponential backoff until it comes up.
async fn connect_bridge<E: PanelEmitter>(command: &[String], emitter: &E, backoff: &mut Backoff) -> BridgeConnection {
    loop {
        match BridgeConnection::spawn(command).await {
            Ok(connection) => return connection,
            Err(e) => emitter.emit_error(format!("Failed to start bridge: {}", e)),
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(DockConfig::default_path);
    let mut config = match DockConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "falling back to default configuration");
            DockConfig::default()
        }
    };
    config.override_bridge(std::env::var(BRIDGE_ENV).ok().as_deref());
    cli.apply(&mut config);

    let emitter = JsonLinesEmitter::stdout();
    let panel = build_panel(&config, cli.headless);
    let monitor_config = MonitorConfig {
        bridge_command: config.bridge.clone(),
        emit_interval: config.emit_interval(),
        ..Default::default()
    };

    let mut backoff = Backoff::new();
    let connection = connect_bridge(&monitor_config.bridge_command, &emitter, &mut backoff).await;
    let mut started = Instant::now();
    let (mut monitor, commands) = DockMonitor::new(monitor_config, panel, connection);
    input::spawn_stdin_reader(commands.clone());
    input::spawn_interrupt_handler(commands);

    loop {
        match monitor.run(&emitter).await {
            MonitorExit::Shutdown => break,
            MonitorExit::BridgeClosed => {
                backoff.bridge_exited(started.elapsed());
                let delay = backoff.next_delay();
                tracing::info!(delay_ms = delay.as_millis() as u64, "restarting bridge");
                tokio::time::sleep(delay).await;
                let connection = connect_bridge(&monitor.config().bridge_command, &emitter, &mut backoff).await;
                started = Instant::now();
                monitor.attach(connection);
            }
        }
    }
    tracing::info!("dock-panel exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_across_short_runs() {
        let mut backoff = Backoff::new();
        backoff.bridge_exited(Duration::from_millis(5));
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
        backoff.bridge_exited(Duration::from_millis(5));
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF * 2);
        backoff.bridge_exited(Duration::from_millis(5));
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF * 4);

        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), MAX_BACKOFF);
    }

    #[test]
    fn test_backoff_resets_after_stable_run() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();
        backoff.bridge_exited(STABLE_RUN);
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["dock-panel", "--position", "left", "--icon-size", "32", "--no-builtin-plugins"]);
        let mut config = DockConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.position, DockPosition::Left);
        assert_eq!(config.icon_size, 32);
        assert!(!config.builtin_plugins);
    }
}
