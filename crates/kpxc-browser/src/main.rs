// ============================================
// File: crates/kpxc-browser/src/main.rs
// ============================================
//! # kpxc-browser Entry Point
//!
//! ## Creation Reason
//! Command-line front end: runs single protocol actions against a local
//! KeePassXC, watches for lock/unlock notifications, or serves as a
//! native-messaging proxy between a browser extension and KeePassXC.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing (stderr)
//! - Configuration loading
//! - Association bootstrap and reuse
//! - Proxy execution
//!
//! ## Usage
//! ```bash
//! # Step 1: Associate once (approve the prompt in KeePassXC)
//! kpxc-browser associate
//!
//! # Step 2: Use it
//! kpxc-browser logins https://example.org
//! kpxc-browser totp 0b1c2d...
//!
//! # Other commands
//! kpxc-browser watch                 # Print lock/unlock notifications
//! kpxc-browser proxy --mitm          # Intercepting native-messaging host
//! kpxc-browser validate              # Validate config file
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `proxy` owns stdout for frames; never print there in proxy mode
//! - The association file is the only long-lived secret-adjacent state
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kpxc_browser::{
    AssociationStore, BrowserConfig, BrowserError, ClientOptions, IdKeySubstitution, Interceptor,
    PassthroughHandler, ProtocolClient, ProxyMode, Server, TracingHook,
};
use kpxc_common::ClientId;
use kpxc_core::crypto::os_random;
use kpxc_core::protocol::SetLoginRequest;
use kpxc_core::Identity;
use kpxc_transport::{Connection, StreamConnection, UnixConnection};

// ============================================
// CLI Definition
// ============================================

/// KeePassXC browser protocol client and proxy
///
/// Quick Start:
///   1. Run: kpxc-browser associate  (approve in KeePassXC)
///   2. Run: kpxc-browser logins <URL>
#[derive(Parser, Debug)]
#[command(name = "kpxc-browser")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "kpxc-browser.toml")]
    config: PathBuf,

    /// KeePassXC socket path (overrides config and discovery)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Log level (RUST_LOG still wins)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Associate with KeePassXC and store the association
    ///
    /// Reuses a stored association when KeePassXC still accepts it.
    Associate {
        /// Create a new association even if the stored one works
        #[arg(long)]
        force: bool,
    },

    /// Show the database hash
    Hash,

    /// Look up logins for a URL
    Logins {
        /// Page URL
        url: String,

        /// Form submit URL
        #[arg(long)]
        submit_url: Option<String>,

        /// Include HTTP auth entries
        #[arg(long)]
        http_auth: bool,
    },

    /// Create or update a login
    SetLogin {
        /// Page URL
        url: String,

        /// Username
        #[arg(long)]
        login: String,

        /// Password
        #[arg(long)]
        password: String,

        /// Existing entry to update
        #[arg(long)]
        uuid: Option<String>,

        /// Target group name
        #[arg(long)]
        group: Option<String>,

        /// Target group uuid
        #[arg(long)]
        group_uuid: Option<String>,
    },

    /// Ask KeePassXC to generate a password (opens its generator)
    GeneratePassword,

    /// Lock the database
    Lock,

    /// List database groups
    Groups,

    /// Create a group (`/`-separated path allowed)
    CreateGroup {
        /// Group name or path
        name: String,
    },

    /// Show the current TOTP of an entry
    Totp {
        /// Entry uuid
        uuid: String,
    },

    /// Print lock/unlock notifications until Ctrl+C
    Watch,

    /// Serve as a native-messaging proxy on stdin/stdout
    Proxy {
        /// Intercept and re-encrypt instead of passing bytes through
        #[arg(long)]
        mitm: bool,
    },

    /// Validate configuration file
    Validate,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration before logging so its level applies
    let config = BrowserConfig::load_or_default(&cli.config).await;
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    let result = match config {
        Ok(mut config) => {
            if let Some(socket) = cli.socket.clone() {
                config.connection.socket_path = Some(socket);
            }
            run(cli, config).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: BrowserConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Associate { force } => cmd_associate(&config, force).await,
        Commands::Hash => {
            let mut client = open_session(&config).await?;
            print_json(&client.get_database_hash().await?)
        }
        Commands::Logins {
            url,
            submit_url,
            http_auth,
        } => {
            let mut client = open_session(&config).await?;
            let logins = client
                .get_logins(&url, submit_url.as_deref(), http_auth)
                .await?;
            print_json(&logins)
        }
        Commands::SetLogin {
            url,
            login,
            password,
            uuid,
            group,
            group_uuid,
        } => {
            let mut client = open_session(&config).await?;
            let request = SetLoginRequest {
                submit_url: url.clone(),
                url,
                login,
                password,
                uuid: uuid.unwrap_or_default(),
                group: group.unwrap_or_default(),
                group_uuid: group_uuid.unwrap_or_default(),
                ..SetLoginRequest::default()
            };
            print_json(&client.set_login(request).await?)
        }
        Commands::GeneratePassword => {
            let mut client = open_session(&config).await?;
            print_json(&client.generate_password().await?)
        }
        Commands::Lock => {
            let mut client = open_session(&config).await?;
            print_json(&client.lock_database().await?)
        }
        Commands::Groups => {
            let mut client = open_session(&config).await?;
            print_json(&client.get_database_groups().await?)
        }
        Commands::CreateGroup { name } => {
            let mut client = open_session(&config).await?;
            print_json(&client.create_new_group(&name).await?)
        }
        Commands::Totp { uuid } => {
            let mut client = open_session(&config).await?;
            print_json(&client.get_totp(&uuid).await?)
        }
        Commands::Watch => cmd_watch(&config).await,
        Commands::Proxy { mitm } => cmd_proxy(&config, mitm).await,
        Commands::Validate => cmd_validate(&cli.config).await,
    }
}

// ============================================
// Commands
// ============================================

/// Associates, reusing the stored association unless `force`.
async fn cmd_associate(config: &BrowserConfig, force: bool) -> anyhow::Result<()> {
    let store = AssociationStore::new(&config.identity.association_file);
    let mut client = connect(config).await?;

    if !force {
        if let Some(record) = store.load().await? {
            client.restore_association(&record)?;
            match client.test_associate().await {
                Ok(()) => {
                    info!("Stored association is still valid");
                    return print_json(&json!({ "associated": true, "id": record.association_id }));
                }
                Err(BrowserError::AssociationRejected { .. }) => {
                    warn!("Stored association was rejected, associating again");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!("Waiting for approval in KeePassXC...");
    let record = client.associate().await?;
    store.save(&record).await?;
    print_json(&json!({ "associated": true, "id": record.association_id }))
}

/// Prints notifications as they arrive.
async fn cmd_watch(config: &BrowserConfig) -> anyhow::Result<()> {
    let mut client = open_session(config).await?;
    info!("Watching for notifications, Ctrl+C to stop");

    tokio::select! {
        result = watch_loop(&mut client) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            Ok(())
        }
    }
}

async fn watch_loop(client: &mut ProtocolClient<UnixConnection>) -> anyhow::Result<()> {
    loop {
        if let Some(notification) = client.poll_notification(None).await? {
            print_json(&json!({ "notification": notification.action().as_str() }))?;
        }
    }
}

/// Runs the native-messaging proxy until the browser side closes.
async fn cmd_proxy(config: &BrowserConfig, mitm: bool) -> anyhow::Result<()> {
    let socket = config.upstream_socket()?;
    let mut upstream = UnixConnection::new();
    upstream.connect(&socket.to_string_lossy()).await?;

    let downstream = StreamConnection::stdio();
    let max = config.connection.max_message_size;
    let receive_timeout = config.connection.receive_timeout();
    let idle = Some(config.proxy.idle_timeout());

    let mode = if mitm { ProxyMode::Mitm } else { config.proxy.mode };
    info!(mode = ?mode, upstream = %socket.display(), "Starting proxy");

    let stats = match mode {
        ProxyMode::Passthrough => {
            let handler = PassthroughHandler::new(upstream, max, receive_timeout);
            Server::new(downstream, handler).with_limits(idle, max).run().await?
        }
        ProxyMode::Mitm => {
            let hook = TracingHook::new(IdKeySubstitution::new());
            let handler = Interceptor::new(upstream, hook, os_random()).with_limits(max, receive_timeout);
            Server::new(downstream, handler).with_limits(idle, max).run().await?
        }
    };

    info!(requests = stats.requests, failures = stats.failures, "Proxy finished");
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &PathBuf) -> anyhow::Result<()> {
    if !config_path.exists() {
        println!("⚠️  Config file not found: {}", config_path.display());
        println!("   Defaults will be used.");
        return Ok(());
    }

    let config = BrowserConfig::load(config_path).await?;

    println!("✅ Configuration is valid");
    println!();
    println!("Connection:");
    match config.client_socket() {
        Ok(socket) => println!("   Socket:      {}", socket.display()),
        Err(e) => println!("   Socket:      ⚠️  {e}"),
    }
    println!("   Max message: {} bytes", config.connection.max_message_size);
    println!();
    println!("Identity:");
    println!("   Association: {}", config.identity.association_file.display());
    println!();
    println!("Proxy:");
    println!("   Mode:        {:?}", config.proxy.mode);
    println!("   Idle:        {}s", config.proxy.idle_timeout_secs);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber on stderr.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

/// Builds a client, connects and exchanges keys.
async fn connect(config: &BrowserConfig) -> anyhow::Result<ProtocolClient<UnixConnection>> {
    let mut rng = rand::rngs::OsRng;
    let client_id = match config.identity.parse_client_id()? {
        Some(id) => id,
        None => ClientId::generate(&mut rng),
    };
    let identity = Identity::generate(client_id, &mut rng);

    let mut client = ProtocolClient::new(UnixConnection::new(), identity, os_random())
        .with_options(ClientOptions::from(&config.connection));

    let socket = config.client_socket()?;
    client
        .connect(&socket.to_string_lossy())
        .await
        .with_context(|| format!("is KeePassXC running with browser integration? ({})", socket.display()))?;
    client.change_public_keys().await?;
    Ok(client)
}

/// Connects and confirms the stored association.
async fn open_session(config: &BrowserConfig) -> anyhow::Result<ProtocolClient<UnixConnection>> {
    let store = AssociationStore::new(&config.identity.association_file);
    let record = store.load().await?.ok_or_else(|| {
        anyhow!(
            "no association stored at {}; run `kpxc-browser associate` first",
            store.path().display()
        )
    })?;

    let mut client = connect(config).await?;
    client.restore_association(&record)?;
    client.test_associate().await?;
    Ok(client)
}

/// Prints `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
