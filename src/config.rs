use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_path: PathBuf,
    pub public_dir: PathBuf,
    pub object_store: ObjectStoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    ObjectStore,
    Filesystem,
}

/// Object-store storage zone; selects the management API hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Zone {
    Z0,
    Z1,
    Z2,
    Na0,
    As0,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Z0 => "z0",
            Zone::Z1 => "z1",
            Zone::Z2 => "z2",
            Zone::Na0 => "na0",
            Zone::As0 => "as0",
        }
    }
}

/// Object-store credentials and endpoints.
#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub domain: String,
    pub zone: Zone,
    /// Listing host override (defaults to the zone's `rsf` host).
    pub rsf_host: Option<String>,
    /// Metadata host override (defaults to the zone's `rs` host).
    pub rs_host: Option<String>,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("domain", &self.domain)
            .field("zone", &self.zone)
            .finish()
    }
}

impl ObjectStoreConfig {
    pub fn rsf_host(&self) -> String {
        self.rsf_host
            .clone()
            .unwrap_or_else(|| format!("https://rsf-{}.qiniuapi.com", self.zone.as_str()))
    }

    pub fn rs_host(&self) -> String {
        self.rs_host
            .clone()
            .unwrap_or_else(|| format!("https://rs-{}.qiniuapi.com", self.zone.as_str()))
    }

    /// Names of required environment variables that are unset or empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("QINIU_ACCESS_KEY", &self.access_key),
            ("QINIU_SECRET_KEY", &self.secret_key),
            ("QINIU_BUCKET", &self.bucket),
            ("QINIU_DOMAIN", &self.domain),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Fail early when the object-store backend cannot work.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            bail!("missing object-store configuration: {}", missing.join(", "));
        }
        Ok(())
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File listing and streaming proxy over object storage or local disk")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Local storage root (overrides STORAGE_PATH)
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Directory holding the static entry page (overrides PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Object-store zone (overrides QINIU_ZONE)
    #[arg(long, value_enum)]
    pub zone: Option<Zone>,

    /// Copy every object-store file into the storage root and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading PORT"),
        };
        let env_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => BackendKind::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!("parsing STORAGE_BACKEND value `{}`: {}", value, err))?,
            Err(_) => BackendKind::Filesystem,
        };
        let env_zone = match env::var("QINIU_ZONE") {
            Ok(value) => Zone::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!("parsing QINIU_ZONE value `{}`: {}", value, err))?,
            Err(_) => Zone::Z0,
        };
        let env_storage = env::var("STORAGE_PATH").unwrap_or_else(|_| "./storage".into());
        let env_public = env::var("PUBLIC_DIR").unwrap_or_else(|_| "./public".into());

        let object_store = ObjectStoreConfig {
            access_key: env::var("QINIU_ACCESS_KEY").unwrap_or_default(),
            secret_key: env::var("QINIU_SECRET_KEY").unwrap_or_default(),
            bucket: env::var("QINIU_BUCKET").unwrap_or_default(),
            domain: env::var("QINIU_DOMAIN").unwrap_or_default(),
            zone: args.zone.unwrap_or(env_zone),
            rsf_host: env::var("QINIU_RSF_HOST").ok(),
            rs_host: env::var("QINIU_RS_HOST").ok(),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_path: args.storage_path.unwrap_or_else(|| env_storage.into()),
            public_dir: args.public_dir.unwrap_or_else(|| env_public.into()),
            object_store,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
