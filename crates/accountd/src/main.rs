use std::env;
use std::fs;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use accountd::{api, auth, db, user};

const APP_NAME: &str = "accountd";

/// Prefix for configuration overrides, e.g. `ACCOUNTD__SERVER__PORT=8080`.
const ENV_PREFIX: &str = "ACCOUNTD";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
        return Ok(());
    }

    let app = App::load(cli.global)?;
    app.init_logging();
    debug!(
        "config file {}, data dir {}",
        app.config_file.display(),
        app.data_dir.display()
    );

    match cli.command {
        Command::Serve(cmd) => app.serve(cmd).await,
        Command::Init { force } => app.init(force),
        Command::Config { command } => app.config_command(command),
        Command::Users { command } => app.users_command(command).await,
        Command::Completions { .. } => Ok(()),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "accountd - user account and site settings service.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct GlobalOpts {
    /// Config file (or a directory containing config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Format for command output
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,
    /// Disable ANSI colors in logs
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Write a default config file with a fresh JWT secret
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Manage user accounts
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    /// Create a user account
    Create {
        /// Login name
        username: String,
        /// Initial password
        #[arg(long, env = "ACCOUNTD_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List user accounts
    List {
        /// Page number (enables pagination)
        #[arg(long)]
        page: Option<i64>,
        /// Page size (enables pagination)
        #[arg(long)]
        page_size: Option<i64>,
    },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    logging: LoggingConfig,
    paths: PathsConfig,
    server: ServerConfig,
    database: DatabaseConfig,
    auth: auth::AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PathsConfig {
    /// Defaults to the platform data directory.
    data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
    /// Per-request timeout in seconds.
    request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: api::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DatabaseConfig {
    /// SQLite file. Defaults to `<data_dir>/accountd.db`.
    path: Option<String>,
}

/// Layer the TOML file (if any) and `ACCOUNTD__*` variables over the defaults.
fn load_config(path: &Path) -> Result<AppConfig> {
    Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .and_then(|built| built.try_deserialize::<AppConfig>())
        .with_context(|| format!("loading configuration from {}", path.display()))
}

/// Write a default config with a freshly generated JWT secret.
fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(auth::AuthConfig::generate_jwt_secret());

    let body = format!(
        "# Configuration for {APP_NAME}\n\n{}",
        toml::to_string_pretty(&config).context("serializing default config")?
    );
    fs::write(path, body).with_context(|| format!("writing config file {}", path.display()))
}

fn expand_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).with_context(|| format!("expanding path {text}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// `$var/accountd`, else the platform directory, else `~/<home_relative>/accountd`.
fn base_dir(var: &str, platform: fn() -> Option<PathBuf>, home_relative: &str) -> Result<PathBuf> {
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(platform)
        .or_else(|| dirs::home_dir().map(|home| home.join(home_relative)))
        .map(|base| base.join(APP_NAME))
        .with_context(|| format!("unable to determine a directory for {var}"))
}

fn render<T: Serialize>(format: OutputFormat, value: &T) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).context("rendering JSON"),
        OutputFormat::Yaml => serde_yaml::to_string(value).context("rendering YAML"),
        OutputFormat::Text => toml::to_string_pretty(value).context("rendering TOML"),
    }
}

// ============================================================================
// Commands
// ============================================================================

struct App {
    opts: GlobalOpts,
    config_file: PathBuf,
    data_dir: PathBuf,
    config: AppConfig,
}

impl App {
    /// Resolve the config file, creating a default one on first run, and load it.
    fn load(opts: GlobalOpts) -> Result<Self> {
        let config_file = match &opts.config {
            Some(path) => {
                let path = expand_path(&path.to_string_lossy())?;
                if path.is_dir() {
                    path.join("config.toml")
                } else {
                    path
                }
            }
            None => base_dir("XDG_CONFIG_HOME", dirs::config_dir, ".config")?.join("config.toml"),
        };

        if !config_file.exists() {
            write_default_config(&config_file)?;
        }
        let config = load_config(&config_file)?;

        let data_dir = match &config.paths.data_dir {
            Some(dir) => expand_path(dir)?,
            None => base_dir("XDG_DATA_HOME", dirs::data_dir, ".local/share")?,
        };

        Ok(Self {
            opts,
            config_file,
            data_dir,
            config,
        })
    }

    fn log_level(&self) -> LevelFilter {
        if self.opts.quiet {
            return LevelFilter::Error;
        }
        match self.opts.verbose {
            0 => self.config.logging.level.parse().unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.log_level().to_string().to_lowercase();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{APP_NAME}={level},tower_http={level},sqlx=warn"))
        });
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.opts.log_format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Text => {
                let color = !self.opts.no_color
                    && env::var_os("NO_COLOR").is_none()
                    && io::stderr().is_terminal();
                registry.with(fmt::layer().with_ansi(color)).try_init()
            }
        };

        // Another subscriber already owns the globals; route `log` records through env_logger.
        if installed.is_err() {
            env_logger::Builder::new()
                .filter_level(self.log_level())
                .try_init()
                .ok();
        }
    }

    fn database_path(&self) -> Result<PathBuf> {
        match &self.config.database.path {
            Some(path) => expand_path(path),
            None => Ok(self.data_dir.join(format!("{APP_NAME}.db"))),
        }
    }

    async fn open_database(&self) -> Result<db::Database> {
        let path = self.database_path()?;
        info!("Database path: {}", path.display());
        db::Database::new(&path).await
    }

    fn init(&self, force: bool) -> Result<()> {
        // `load` already wrote a default file if none existed.
        if force {
            write_default_config(&self.config_file)?;
        } else {
            info!("Config present at {}", self.config_file.display());
        }
        println!("{}", self.config_file.display());
        Ok(())
    }

    fn config_command(&self, command: ConfigCommand) -> Result<()> {
        match command {
            ConfigCommand::Show => println!("{}", render(self.opts.output, &self.config)?),
            ConfigCommand::Path => println!("{}", self.config_file.display()),
            ConfigCommand::Reset => {
                write_default_config(&self.config_file)?;
                info!("Config reset at {}", self.config_file.display());
            }
        }
        Ok(())
    }

    async fn users_command(&self, command: UsersCommand) -> Result<()> {
        let database = self.open_database().await?;
        let users = user::UserService::new(user::UserRepository::new(database.pool().clone()));

        match command {
            UsersCommand::Create { username, password } => {
                let created = user::UserInfo::from(users.create_user(&username, &password).await?);
                match self.opts.output {
                    OutputFormat::Text => {
                        println!("Created user '{}' with id {}", created.username, created.id);
                    }
                    format => println!("{}", render(format, &created)?),
                }
            }
            UsersCommand::List { page, page_size } => {
                let query = user::UserListQuery {
                    page: page.map(|p| p.to_string()),
                    page_size: page_size.map(|s| s.to_string()),
                };
                let listing = users.list_users(query).await?;
                match self.opts.output {
                    OutputFormat::Text => print_user_table(&listing),
                    format => println!("{}", render(format, &listing)?),
                }
            }
        }

        Ok(())
    }

    async fn serve(&self, cmd: ServeCommand) -> Result<()> {
        let auth_config = self.config.auth.clone();
        auth_config
            .validate()
            .context("Invalid auth configuration")?;
        info!(
            "Auth mode: {}",
            if auth_config.dev_mode {
                "development"
            } else {
                "production"
            }
        );

        let database = self.open_database().await?;
        let timeout = Duration::from_secs(self.config.server.request_timeout_secs);
        let state = api::AppState::from_database(&database, auth::AuthState::new(auth_config))
            .with_request_timeout(timeout);
        let app = api::create_router(state);

        let host = cmd.host.as_deref().unwrap_or(&self.config.server.host);
        let port = cmd.port.unwrap_or(self.config.server.port);
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding to {addr}"))?;
        info!("Listening on http://{}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

        database.pool().close().await;
        info!("Shutdown complete");
        Ok(())
    }
}

fn print_user_table(listing: &user::UserListing) {
    println!("{:<8} USERNAME", "ID");
    for item in listing.items() {
        println!("{:<8} {}", item.id, item.username);
    }
    if let user::UserListing::Page {
        total,
        page,
        page_size,
        ..
    } = listing
    {
        println!("\npage {page} (size {page_size}), {total} user(s) total");
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
