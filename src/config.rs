//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `PIS_` prefix:
//!
//! - `PIS_HOST`, `PIS_PORT` - bind address of `serve` and `front`
//! - `PIS_STORE_ROOT` - root directory of the image store
//! - `PIS_AUTH_SECRET` - HMAC secret for session tokens
//! - `PIS_UPSTREAM` - address of the image server used by `front`, `upload` and `check`
//! - `PIS_DISK_CACHE`, `PIS_DISK_CACHE_DIR`, `PIS_DISK_CACHE_SYNCHRONIZED`
//! - `PIS_MEMORY_CACHE_SIZE`, `PIS_MEMORY_CACHE_SYNCHRONIZED`
//! - `PIS_IMAGE_DPI`, `PIS_THUMBNAIL_DPI`, `PIS_CROP_MARGIN`, `PIS_COMPOSITE_AXIS`
//! - `PIS_DEFAULT_IMAGE`, `PIS_DEFAULT_THUMBNAIL` - fallback image files
//! - `PIS_CACHE_MAX_AGE`, `PIS_CORS_ORIGINS`
//! - `PIS_SESSION_TOKEN` - session token for `upload`

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::cache::DEFAULT_MEMORY_CACHE_SIZE;
use crate::imaging::StackAxis;
use crate::protocol::{DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_PORT as DEFAULT_IMAGE_SERVER_PORT};
use crate::service::{DEFAULT_CROP_MARGIN, DEFAULT_IMAGE_DPI, DEFAULT_MAX_DPI, DEFAULT_THUMBNAIL_DPI};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port of the HTTP front.
pub const DEFAULT_FRONT_PORT: u16 = 3000;

/// Default image server address for clients.
pub const DEFAULT_UPSTREAM: &str = "127.0.0.1:15555";

pub const DEFAULT_DISK_CACHE_DIR: &str = "./page-image-cache";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default lifetime of minted session tokens (1 hour).
pub const DEFAULT_TOKEN_TTL: u64 = 3600;

/// Default resolution assumed for uploaded page images.
pub const DEFAULT_UPLOAD_DPI: u32 = 300;

// =============================================================================
// CLI
// =============================================================================

/// Page image store: image server, caching HTTP front and client tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "page-image-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the image server on a local store
    Serve(ServeConfig),

    /// Run the caching HTTP front
    Front(FrontConfig),

    /// Mint a session token for uploads
    Sign(SignConfig),

    /// Upload a page image to the image server
    Upload(UploadConfig),

    /// Check whether the image server has a page image
    Check(CheckConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[arg(long, default_value = DEFAULT_HOST, env = "PIS_HOST")]
    pub host: String,

    #[arg(short, long, default_value_t = DEFAULT_IMAGE_SERVER_PORT, env = "PIS_PORT")]
    pub port: u16,

    /// Root directory of the sharded image store.
    #[arg(long, env = "PIS_STORE_ROOT")]
    pub store_root: PathBuf,

    /// Secret used to verify session tokens on upload.
    #[arg(long, env = "PIS_AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,

    /// Largest accepted upload, in bytes of base64 text.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_LEN, env = "PIS_MAX_PAYLOAD")]
    pub max_payload: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_root.as_os_str().is_empty() {
            return Err("Store root is required. Set --store-root or PIS_STORE_ROOT".to_string());
        }
        if self.max_payload == 0 {
            return Err("max_payload must be greater than 0".to_string());
        }
        match &self.auth_secret {
            Some(secret) if !secret.is_empty() => Ok(()),
            _ => Err(
                "No auth secret provided; uploads could never be authenticated. \
                 Set --auth-secret or PIS_AUTH_SECRET"
                    .to_string(),
            ),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Front
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct FrontConfig {
    #[arg(long, default_value = DEFAULT_HOST, env = "PIS_HOST")]
    pub host: String,

    #[arg(short, long, default_value_t = DEFAULT_FRONT_PORT, env = "PIS_PORT")]
    pub port: u16,

    /// Address of the image server.
    #[arg(long, env = "PIS_UPSTREAM", conflicts_with = "store_root")]
    pub upstream: Option<String>,

    /// Serve directly from a local store instead of an image server.
    #[arg(long, env = "PIS_STORE_ROOT")]
    pub store_root: Option<PathBuf>,

    // =========================================================================
    // Caches
    // =========================================================================
    /// Keep fetched images in a local disk cache.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "PIS_DISK_CACHE")]
    pub disk_cache: bool,

    #[arg(long, default_value = DEFAULT_DISK_CACHE_DIR, env = "PIS_DISK_CACHE_DIR")]
    pub disk_cache_dir: PathBuf,

    /// Share one upstream fetch among concurrent disk cache misses.
    #[arg(long, default_value_t = false, env = "PIS_DISK_CACHE_SYNCHRONIZED")]
    pub disk_cache_synchronized: bool,

    /// Number of decoded images kept in memory (0 disables the memory cache).
    #[arg(long, default_value_t = DEFAULT_MEMORY_CACHE_SIZE, env = "PIS_MEMORY_CACHE_SIZE")]
    pub memory_cache_size: usize,

    #[arg(long, default_value_t = false, env = "PIS_MEMORY_CACHE_SYNCHRONIZED")]
    pub memory_cache_synchronized: bool,

    // =========================================================================
    // Rendering
    // =========================================================================
    /// Default resolution of page images (0 = native).
    #[arg(long, default_value_t = DEFAULT_IMAGE_DPI, env = "PIS_IMAGE_DPI")]
    pub image_dpi: u32,

    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_DPI, env = "PIS_THUMBNAIL_DPI")]
    pub thumbnail_dpi: u32,

    /// Highest resolution a request may ask for.
    #[arg(long, default_value_t = DEFAULT_MAX_DPI, env = "PIS_MAX_DPI")]
    pub max_dpi: u32,

    /// Image served when a page image cannot be produced.
    #[arg(long, env = "PIS_DEFAULT_IMAGE")]
    pub default_image: Option<PathBuf>,

    /// Image served when a thumbnail cannot be produced.
    #[arg(long, env = "PIS_DEFAULT_THUMBNAIL")]
    pub default_thumbnail: Option<PathBuf>,

    /// Margin in pixels around crop boxes.
    #[arg(long, default_value_t = DEFAULT_CROP_MARGIN, env = "PIS_CROP_MARGIN")]
    pub crop_margin: u32,

    /// Stacking direction of multi-page composites (vertical or horizontal).
    #[arg(long, default_value_t = StackAxis::Vertical, env = "PIS_COMPOSITE_AXIS")]
    pub composite_axis: StackAxis,

    // =========================================================================
    // HTTP
    // =========================================================================
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PIS_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if not specified.
    #[arg(long, env = "PIS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FrontConfig {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.upstream, &self.store_root) {
            (None, None) => {
                return Err(
                    "No image source. Set --upstream (image server) or --store-root (local store)"
                        .to_string(),
                )
            }
            (Some(upstream), _) if upstream.trim().is_empty() => {
                return Err("Upstream address must not be empty".to_string())
            }
            _ => {}
        }

        if self.uses_disk_cache() && self.disk_cache_dir.as_os_str().is_empty() {
            return Err("Disk cache is enabled but no --disk-cache-dir is set".to_string());
        }

        if self.thumbnail_dpi == 0 {
            return Err("thumbnail_dpi must be greater than 0".to_string());
        }

        if self.image_dpi > self.max_dpi || self.thumbnail_dpi > self.max_dpi {
            return Err(format!(
                "image_dpi and thumbnail_dpi must not exceed max_dpi ({})",
                self.max_dpi
            ));
        }

        if let Some(path) = self.default_image.iter().chain(&self.default_thumbnail).find(|p| !p.is_file()) {
            return Err(format!("Fallback image {} does not exist", path.display()));
        }

        Ok(())
    }

    /// The disk cache only sits in front of a remote image server.
    pub fn uses_disk_cache(&self) -> bool {
        self.disk_cache && self.upstream.is_some()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Sign
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    #[arg(long, env = "PIS_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,

    /// User the session belongs to.
    #[arg(long)]
    pub user: String,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL)]
    pub ttl: u64,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if self.user.is_empty() {
            return Err("User must not be empty".to_string());
        }
        if self.ttl == 0 {
            return Err("TTL must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Upload
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct UploadConfig {
    #[arg(long, default_value = DEFAULT_UPSTREAM, env = "PIS_UPSTREAM")]
    pub upstream: String,

    /// Session token (see the `sign` command).
    #[arg(long, env = "PIS_SESSION_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long)]
    pub doc_id: String,

    #[arg(long)]
    pub page: u32,

    /// Resolution the image was scanned or rendered at.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_DPI)]
    pub dpi: u32,

    /// Image file (PNG or JPEG).
    pub file: PathBuf,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.token.is_empty() {
            return Err("Session token must not be empty".to_string());
        }
        if self.dpi == 0 {
            return Err("dpi must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[arg(long, default_value = DEFAULT_UPSTREAM, env = "PIS_UPSTREAM")]
    pub upstream: String,

    /// Image key, `<doc_id>.<page>`.
    pub key: String,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
