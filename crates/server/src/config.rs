//! Service configuration.
//!
//! Built-in defaults, overridden by `IMPVIEW_*` environment variables,
//! overridden by command-line flags.

use clap::{Args, ValueEnum};
use impview_common::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use std::str::FromStr;

/// Default allowed root for log files.
pub const DEFAULT_LOG_ROOT: &str = "log_samples";

/// Default bound on the malformed-content preview, in bytes.
pub const DEFAULT_PREVIEW_BYTES: usize = 120;

/// How a resolved path is tested against an allowed root.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[value(rename_all = "lower")]
pub enum Containment {
    /// The root must be a component-wise ancestor of the path
    #[default]
    Ancestor,
    /// The path string must start with the root string. Also admits
    /// siblings such as `log_samples-evil` next to `log_samples`.
    Prefix,
}

/// Rewrites a leading path prefix of an image reference, e.g.
/// `/home/jbe=/Users/jbe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRewrite {
    /// Prefix to strip.
    pub from: String,
    /// Replacement put in its place.
    pub to: String,
}

impl PrefixRewrite {
    /// The rewritten reference, or `None` when `reference` does not start
    /// with `from`.
    pub fn apply(&self, reference: &str) -> Option<String> {
        reference
            .strip_prefix(&self.from)
            .map(|rest| format!("{}{rest}", self.to))
    }
}

impl FromStr for PrefixRewrite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid rewrite '{s}': expected FROM=TO"))?;
        if from.is_empty() {
            return Err(format!("Invalid rewrite '{s}': FROM cannot be empty"));
        }
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Configuration of the file access service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Allowed root for log files; relative references resolve against it.
    pub log_root: PathBuf,
    /// Second allowed root, for images only.
    pub asset_root: Option<PathBuf>,
    /// How paths are checked against the allowed roots.
    pub containment: Containment,
    /// Prefix rewrites applied to image references.
    pub image_rewrites: Vec<PrefixRewrite>,
    /// `Access-Control-Allow-Origin` sent with every response.
    pub allow_origin: String,
    /// Maximum bytes of file content quoted in parse error previews.
    pub preview_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            asset_root: None,
            containment: Containment::default(),
            image_rewrites: Vec::new(),
            allow_origin: "*".to_string(),
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `IMPVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(host) = lookup("IMPVIEW_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("IMPVIEW_PORT") {
            config.port = port
                .parse()
                .map_err(|e| format!("Invalid IMPVIEW_PORT '{port}': {e}"))?;
        }
        if let Some(root) = lookup("IMPVIEW_LOG_ROOT") {
            config.log_root = PathBuf::from(root);
        }
        if let Some(root) = lookup("IMPVIEW_ASSET_ROOT") {
            config.asset_root = Some(PathBuf::from(root));
        }
        if let Some(mode) = lookup("IMPVIEW_CONTAINMENT") {
            config.containment = <Containment as ValueEnum>::from_str(&mode, true)
                .map_err(|e| format!("Invalid IMPVIEW_CONTAINMENT '{mode}': {e}"))?;
        }
        Ok(config)
    }

    /// Address the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Flags shared by `impview serve` and the `impview-server` binary.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Overrides `IMPVIEW_HOST`.
    #[arg(long, value_name = "HOST", help = "Host to bind [default: 127.0.0.1]")]
    pub host: Option<String>,
    /// Overrides `IMPVIEW_PORT`.
    #[arg(short = 'p', long, value_name = "PORT", help = "Port to bind [default: 3001]")]
    pub port: Option<u16>,
    /// Overrides `IMPVIEW_LOG_ROOT`.
    #[arg(
        long,
        value_name = "DIR",
        help = "Allowed root for log files [default: ./log_samples]"
    )]
    pub log_root: Option<PathBuf>,
    /// Overrides `IMPVIEW_ASSET_ROOT`.
    #[arg(long, value_name = "DIR", help = "Additional allowed root for images")]
    pub asset_root: Option<PathBuf>,
    /// Overrides `IMPVIEW_CONTAINMENT`.
    #[arg(long, value_enum, help = "How paths are checked against the allowed roots")]
    pub containment: Option<Containment>,
    /// Image prefix rewrites, tried in order.
    #[arg(
        long = "rewrite",
        value_name = "FROM=TO",
        help = "Rewrite an image path prefix before resolving it (repeatable)"
    )]
    pub rewrites: Vec<PrefixRewrite>,
    /// CORS origin sent with every response.
    #[arg(long, value_name = "ORIGIN", help = "Access-Control-Allow-Origin value")]
    pub allow_origin: Option<String>,
}

impl ServeArgs {
    /// Environment-derived config with these flags applied on top.
    pub fn into_config(self) -> Result<ServerConfig, String> {
        let base = ServerConfig::from_env()?;
        Ok(self.apply(base))
    }

    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = self.log_root {
            config.log_root = root;
        }
        if let Some(root) = self.asset_root {
            config.asset_root = Some(root);
        }
        if let Some(mode) = self.containment {
            config.containment = mode;
        }
        if !self.rewrites.is_empty() {
            config.image_rewrites = self.rewrites;
        }
        if let Some(origin) = self.allow_origin {
            config.allow_origin = origin;
        }
        config
    }
}
