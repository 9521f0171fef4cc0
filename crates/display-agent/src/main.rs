//! Display agent entry point.
//!
//! Loads the config, resolves the control-server endpoint and the device
//! identity, wires the real adapters into an [`Agent`] and runs it on a
//! single-threaded Tokio runtime until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! display-agent [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [env: DISPLAY_AGENT_CONFIG]
//!   --server-url <URL>     ws:// URL of the control server [env: DISPLAY_AGENT_SERVER_URL]
//!   --server-port <PORT>   Port used with the discovered LAN address [env: DISPLAY_AGENT_SERVER_PORT]
//!   --browser <PROGRAM>    Kiosk browser executable [env: DISPLAY_AGENT_BROWSER]
//!   --log-level <LEVEL>    Log level when RUST_LOG is unset [env: DISPLAY_AGENT_LOG]
//! ```
//!
//! Command-line values override the config file.  `RUST_LOG` overrides both
//! for logging.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use display_agent::application::automation::ScriptedLogin;
use display_agent::application::events::AgentEvent;
use display_agent::application::topology::TopologyProvider;
use display_agent::infrastructure::identity::{HostIdentityProvider, IdentityProvider};
use display_agent::infrastructure::local_ip::{best_local_ipv4, server_endpoint};
use display_agent::infrastructure::network::websocket::WebSocketConnector;
use display_agent::infrastructure::network::ConnectionConfig;
use display_agent::infrastructure::screen_info::StaticTopologyProvider;
use display_agent::infrastructure::storage::config::{config_dir, load_config, AgentConfig};
use display_agent::infrastructure::surface::browser::{BrowserConfig, KioskBrowserProvider};
use display_agent::{Agent, AgentSettings, Collaborators};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Shows control-server content full-screen on this machine's displays.
#[derive(Debug, Parser)]
#[command(name = "display-agent", version)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Defaults to `display-agent/config.toml` in the platform config
    /// directory; a missing default file means "all defaults".
    #[arg(long, env = "DISPLAY_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Full ws:// URL of the control server.  Disables address discovery.
    #[arg(long, env = "DISPLAY_AGENT_SERVER_URL")]
    server_url: Option<String>,

    /// Control-server port used together with the discovered LAN address.
    #[arg(long, env = "DISPLAY_AGENT_SERVER_PORT")]
    server_port: Option<u16>,

    /// Kiosk browser executable.
    #[arg(long, env = "DISPLAY_AGENT_BROWSER")]
    browser: Option<String>,

    /// `tracing` level used when `RUST_LOG` is unset.
    #[arg(long, env = "DISPLAY_AGENT_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the file config.
    fn apply(self, mut cfg: AgentConfig) -> AgentConfig {
        if let Some(url) = self.server_url {
            cfg.server.url = Some(url);
        }
        if let Some(port) = self.server_port {
            cfg.server.port = port;
        }
        if let Some(browser) = self.browser {
            cfg.surface.browser = browser;
        }
        if let Some(level) = self.log_level {
            cfg.log_level = level;
        }
        cfg
    }
}

/// The control-server URL: configured, or discovered from the LAN address.
fn resolve_endpoint(cfg: &AgentConfig) -> String {
    match &cfg.server.url {
        Some(url) => url.clone(),
        None => {
            let ip = best_local_ipv4();
            if ip.is_none() {
                warn!("no non-loopback IPv4 address found; using 127.0.0.1");
            }
            server_endpoint(ip, cfg.server.port)
        }
    }
}

fn topology_provider(cfg: &AgentConfig) -> Arc<dyn TopologyProvider> {
    let displays = cfg.static_displays();
    if !displays.is_empty() {
        info!("using {} statically configured display(s)", displays.len());
        return Arc::new(StaticTopologyProvider::new(displays));
    }

    #[cfg(target_os = "linux")]
    {
        Arc::new(display_agent::infrastructure::screen_info::RandrTopologyProvider::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        warn!("no [[displays]] configured and no display enumeration on this platform");
        Arc::new(StaticTopologyProvider::new(Vec::new()))
    }
}

fn profile_root(cfg: &AgentConfig) -> PathBuf {
    cfg.surface.profile_dir.clone().unwrap_or_else(|| match config_dir() {
        Ok(dir) => dir.join("profiles"),
        Err(_) => std::env::temp_dir().join("display-agent-profiles"),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = load_config(cli.config.as_deref()).context("failed to load config")?;
    let cfg = cli.apply(file_config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let endpoint = resolve_endpoint(&cfg);
    let identity = HostIdentityProvider::new(
        cfg.device.id.clone(),
        cfg.device.name.clone(),
        config_dir().ok(),
    )
    .identity()
    .await
    .context("failed to determine device identity")?;

    let agent = Agent::new(
        identity,
        AgentSettings {
            connection: ConnectionConfig {
                endpoint,
                reconnect_delay: cfg.reconnect_delay(),
            },
            watchdog: cfg.watchdog_config(),
        },
        Collaborators {
            connector: Arc::new(WebSocketConnector),
            surfaces: Arc::new(KioskBrowserProvider::new(BrowserConfig {
                program: cfg.surface.browser.clone(),
                extra_args: cfg.surface.extra_args.clone(),
                profile_root: profile_root(&cfg),
            })),
            topology: topology_provider(&cfg),
            automation: Arc::new(ScriptedLogin),
        },
    );

    let events = agent.event_sender();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                let _ = events.send(AgentEvent::Shutdown);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    agent.run().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_keeps_file_config() {
        // Arrange
        let cli = Cli::parse_from(["display-agent"]);
        let file = AgentConfig::default();

        // Act
        let cfg = cli.apply(file.clone());

        // Assert
        assert_eq!(cfg, file);
    }

    #[test]
    fn test_cli_overrides_file_config() {
        let cli = Cli::parse_from([
            "display-agent",
            "--server-url",
            "ws://10.1.1.1:4000",
            "--browser",
            "google-chrome",
            "--log-level",
            "debug",
        ]);

        let cfg = cli.apply(AgentConfig::default());

        assert_eq!(cfg.server.url.as_deref(), Some("ws://10.1.1.1:4000"));
        assert_eq!(cfg.surface.browser, "google-chrome");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(resolve_endpoint(&cfg), "ws://10.1.1.1:4000");
    }

    #[test]
    fn test_static_displays_select_static_provider() {
        let mut cfg = AgentConfig::default();
        cfg.displays = toml::from_str::<AgentConfig>(
            "[[displays]]\nid = 5\nwidth = 1280\nheight = 720\n",
        )
        .expect("parse")
        .displays;

        let topology = topology_provider(&cfg).current_topology().expect("topology");

        assert_eq!(topology.len(), 1);
    }
}
