//! Page image store binary: image server, caching HTTP front and client tools.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use page_image_store::{
    auth::SignedSessionAuthority,
    cache::{DiskCache, MemoryCache},
    config::{CheckConfig, Cli, Command, FrontConfig, ServeConfig, SignConfig, UploadConfig},
    imaging::{ImageKey, PageImage},
    protocol::{ImageServer, RemoteImageClient},
    server::{create_router, RouterConfig},
    service::{load_fallback_image, ImageService, ServiceConfig},
    store::{FsImageStore, PageImageSource},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Front(config) => run_front(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Upload(config) => run_upload(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "page_image_store=debug,tower_http=debug"
    } else {
        "page_image_store=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = FsImageStore::new(&config.store_root);
    let authority = SignedSessionAuthority::new(config.auth_secret.as_deref().unwrap_or_default());
    let server = ImageServer::new(Arc::new(store), Arc::new(authority))
        .with_max_payload_len(config.max_payload);

    info!("Configuration:");
    info!("  Store root: {}", config.store_root.display());
    info!("  Max upload: {} bytes", config.max_payload);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    server.run(listener).await;
    ExitCode::SUCCESS
}

// =============================================================================
// Front Command
// =============================================================================

async fn run_front(config: FrontConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    let source: Arc<dyn PageImageSource> = match (&config.upstream, &config.store_root) {
        (Some(upstream), _) => {
            info!("  Image server: {}", upstream);
            let remote: Arc<dyn PageImageSource> = Arc::new(RemoteImageClient::new(upstream));
            if config.uses_disk_cache() {
                info!(
                    "  Disk cache: {} (synchronized: {})",
                    config.disk_cache_dir.display(),
                    config.disk_cache_synchronized
                );
                Arc::new(DiskCache::new(
                    remote,
                    &config.disk_cache_dir,
                    config.disk_cache_synchronized,
                ))
            } else {
                warn!("  Disk cache: disabled");
                remote
            }
        }
        (None, Some(root)) => {
            info!("  Local store: {}", root.display());
            Arc::new(FsImageStore::new(root))
        }
        (None, None) => {
            error!("Configuration error: no image source");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "  Memory cache: {} images (synchronized: {})",
        config.memory_cache_size, config.memory_cache_synchronized
    );
    info!(
        "  Resolution: {} dpi, thumbnails {} dpi",
        config.image_dpi, config.thumbnail_dpi
    );

    let mut service = ImageService::new(
        source,
        MemoryCache::new(config.memory_cache_size, config.memory_cache_synchronized),
        ServiceConfig {
            image_dpi: config.image_dpi,
            thumbnail_dpi: config.thumbnail_dpi,
            crop_margin: config.crop_margin,
            composite_axis: config.composite_axis,
            max_dpi: config.max_dpi,
        },
    );

    if let Some(path) = &config.default_image {
        match load_fallback_image(path).await {
            Ok(png) => service = service.with_default_image(png),
            Err(e) => {
                error!("Failed to load default image: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(path) = &config.default_thumbnail {
        match load_fallback_image(path).await {
            Ok(png) => service = service.with_default_thumbnail(png),
            Err(e) => {
                error!("Failed to load default thumbnail: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);
    if let Some(origins) = &config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    let router = create_router(Arc::new(service), router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("HTTP front listening on http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  open http://{}/images/<doc_id>/1-10", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let authority = SignedSessionAuthority::new(&config.secret);
    println!(
        "{}",
        authority.sign(&config.user, Duration::from_secs(config.ttl))
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Upload Command
// =============================================================================

async fn run_upload(config: UploadConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let key = match ImageKey::new(&config.doc_id, config.page) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let image = match tokio::fs::read(&config.file).await {
        Ok(data) => PageImage::from_image_bytes(&data, config.dpi, None),
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let image = match image {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = RemoteImageClient::new(&config.upstream);
    match client.store(&config.token, &key, &image).await {
        Ok(()) => {
            println!(
                "✓ Stored {} ({}x{} at {} dpi)",
                key,
                image.width(),
                image.height(),
                config.dpi
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("✗ Upload of {} failed: {}", key, e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let key = match ImageKey::parse(&config.key) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = RemoteImageClient::new(&config.upstream);
    match client.check_available(&key).await {
        Ok(true) => {
            println!("✓ {} is available on {}", key, config.upstream);
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("✗ {} is not available on {}", key, config.upstream);
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("✗ Could not reach {}: {}", config.upstream, e);
            ExitCode::FAILURE
        }
    }
}
