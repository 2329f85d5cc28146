use clap::Parser;
use clinic_gate::cli::{Args, build_config, init_logging, validate_public_origin};
use clinic_gate::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let public_origin = match args.public_origin.as_deref().map(validate_public_origin) {
        Some(None) => std::process::exit(1),
        Some(Some(url)) => Some(url),
        None => None,
    };

    let config = build_config(&args, public_origin);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    info!(
        address = %local_addr,
        backend = %config.backend_url,
        upstream = %config.upstream_url,
        secure_cookies = config.secure_cookies,
        "Listening"
    );

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
