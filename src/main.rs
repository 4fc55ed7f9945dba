use std::sync::Arc;

use tracing::{error, info, warn};

use chatrelay::{Config, Dispatcher, Registry, RelayServer, ServerInfo, SessionSettings};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = chatrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        chatrelay::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let server = match RelayServer::bind(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!(
                "Failed to bind {}:{}: {}",
                config.server.host, config.server.port, e
            );
            std::process::exit(1);
        }
    };
    let bound = match server.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to read listener address: {}", e);
            std::process::exit(1);
        }
    };

    let server_info = ServerInfo::from_config(&config.server, bound);
    info!(
        "Advertising SERVER_IP:{} PORT:{} to clients",
        server_info.ip, server_info.port
    );
    if server_info.is_unspecified() {
        warn!(
            "SERVER_IP:{} is not reachable by clients; set server.advertised_host or CHATRELAY_ADVERTISED_HOST",
            server_info.ip
        );
    }

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(Registry::new()), server_info));
    let settings = SessionSettings::from_config(&config.server);

    tokio::select! {
        result = server.serve(dispatcher, settings) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
