use anyhow::{Context, Result, ensure};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub staging_dir: String,
    pub database_url: String,
    pub max_file_size_bytes: u64,
    pub max_chunk_size_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked file-upload API")]
pub struct Args {
    /// Host to bind to (overrides FILE_UPLOADER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_UPLOADER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where in-flight chunks are staged (overrides FILE_UPLOADER_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Database URL (overrides FILE_UPLOADER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum declared file size in bytes (overrides FILE_UPLOADER_MAX_FILE_SIZE_BYTES)
    #[arg(long)]
    pub max_file_size_bytes: Option<u64>,

    /// Maximum chunk size in bytes (overrides FILE_UPLOADER_MAX_CHUNK_SIZE_BYTES)
    #[arg(long)]
    pub max_chunk_size_bytes: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILE_UPLOADER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env_var("FILE_UPLOADER_PORT", 3000)?;
        let env_staging =
            env::var("FILE_UPLOADER_STAGING_DIR").unwrap_or_else(|_| "./data/staging".into());
        let env_db = env::var("FILE_UPLOADER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/file_uploader.db".into());
        let env_max_file = parse_env_var("FILE_UPLOADER_MAX_FILE_SIZE_BYTES", 10_485_760)?;
        let env_max_chunk = parse_env_var("FILE_UPLOADER_MAX_CHUNK_SIZE_BYTES", 1_048_576)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            database_url: args.database_url.unwrap_or(env_db),
            max_file_size_bytes: args.max_file_size_bytes.unwrap_or(env_max_file),
            max_chunk_size_bytes: args.max_chunk_size_bytes.unwrap_or(env_max_chunk),
        };

        ensure!(cfg.max_file_size_bytes > 0, "max file size must be positive");
        ensure!(
            cfg.max_chunk_size_bytes > 0,
            "max chunk size must be positive"
        );

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a numeric environment variable, falling back to `default` when the
/// variable is absent.
fn parse_env_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {}", name)),
    }
}
