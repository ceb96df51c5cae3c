use clap::{Parser, Subcommand};
use trade_gateway::config::GatewayConfig;
use tracing_subscriber::EnvFilter;

/// Trade Gateway — load balancer for the trading platform
#[derive(Parser)]
#[command(name = "trade-gateway", version, about)]
struct Cli {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "gateway.hcl")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file without starting the gateway
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, default_value = "gateway.hcl")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> trade_gateway::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate { config: config_path }) = &cli.command {
        return validate_config(config_path).await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!("Trade Gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if std::path::Path::new(&cli.config).exists() {
        tracing::info!(config = cli.config, "Loading configuration");
        GatewayConfig::from_file(&cli.config).await?
    } else {
        tracing::warn!(config = cli.config, "Config file not found, using defaults");
        GatewayConfig::default()
    };
    config.apply_env_overrides()?;

    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }

    let gateway = trade_gateway::Gateway::new(config)?;
    gateway.start().await?;

    tracing::info!("Gateway ready — press Ctrl+C to stop");
    gateway.wait_for_shutdown().await;

    Ok(())
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> trade_gateway::Result<()> {
    if !std::path::Path::new(path).exists() {
        eprintln!("✗ Config file not found: {}", path);
        std::process::exit(1);
    }

    let mut config = match GatewayConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.apply_env_overrides() {
        eprintln!("✗ Environment override error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    println!("✓ Configuration is valid");
    println!();
    println!("  Listen:      {}", config.listen);
    println!(
        "  Store:       {}",
        config.redis_url.as_deref().unwrap_or("in-process memory")
    );
    println!("  Services:    {}", config.services.len());
    let mut names: Vec<_> = config.services.keys().collect();
    names.sort();
    for name in names {
        let svc = &config.services[name];
        println!(
            "    - {} ({} instances, health: {})",
            name,
            svc.instances.len(),
            svc.health_path
        );
    }
    println!(
        "  Routing:     /api/trading/* → {}, everything else → {}",
        config.routing.trading_service, config.routing.default_service
    );
    println!(
        "  Stream:      {} → {} target(s)",
        config.stream.path,
        config.stream.targets.len()
    );
    println!(
        "  Client key:  {}",
        if config.trust_forwarded_for {
            "X-Forwarded-For (trusted proxy)"
        } else {
            "peer address"
        }
    );
    println!("  Rate limits:");
    let mut policies: Vec<_> = config.policies().into_iter().collect();
    policies.sort_by_key(|(category, _)| category.as_str());
    for (category, policy) in policies {
        println!(
            "    - {} → {} per {}s",
            category.as_str(),
            policy.limit,
            policy.window_secs
        );
    }

    Ok(())
}
