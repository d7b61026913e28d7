//! impview file access service
//!
//! Serves impostor event log files and the images they reference over HTTP,
//! read-only, confined to configured allowed roots.

pub mod config;
pub mod error;
pub mod files;
pub mod paths;
pub mod server;

pub use config::{Containment, PrefixRewrite, ServeArgs, ServerConfig};
pub use error::AccessError;
pub use files::{FileAccess, ImageFile, LogSnapshot};
pub use server::{router, run_server};
