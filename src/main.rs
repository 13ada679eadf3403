//! vfswitch daemon entry point

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vfswitch::config::Config;
use vfswitch::router::VirtualStorage;
use vfswitch::wrapper::call_order;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: vfswitch <config.yaml>");
    eprintln!();
    eprintln!("vfswitch - A virtual storage switch routing calls to mounted backends");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  vfswitch /etc/vfswitch/config.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vfswitch starting");
    info!("Loaded configuration from {:?}", config_path);

    let storage = Arc::new(VirtualStorage::new());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    for entry in &config.mounts {
        if let Err(e) = storage.add_mount(entry.clone()) {
            error!("Failed to mount {:?}: {}", entry.mount_point, e);
            continue;
        }
    }

    let mounts = storage.list_mounts();
    if mounts.is_empty() {
        error!("No mounts were added successfully");
        std::process::exit(1);
    }

    for mount in &mounts {
        info!(
            mount_point = %mount.mount_point(),
            mount_point_id = %mount.mount_point_id(),
            driver = %mount.entry().driver,
            wrappers = ?call_order(&mount.entry().wrappers),
            read_only = mount.options().read_only,
            "mounted"
        );
    }
    info!("{} mount(s) active", mounts.len());
    info!("Press Ctrl+C to unmount and exit");

    // Wait for shutdown signal
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    info!("Shutting down");
    storage.unmount_all();
    info!("All mounts removed, exiting");

    Ok(())
}
