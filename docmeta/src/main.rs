use clap::Parser;
use docmeta::{Application, Config, config::Args, telemetry};

/// Resolve once the process is asked to stop, returning the signal that did it.
async fn stop_requested() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The OTLP exporter's HTTP client needs a rustls crypto provider
    if rustls::crypto::aws_lc_rs::default_provider().install_default().is_err() {
        anyhow::bail!("a rustls crypto provider was already installed");
    }

    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!(
            "{}: valid. Would listen on {}, storing uploads in {} and logging to {}.",
            args.config,
            config.bind_address(),
            config.storage.upload_dir.display(),
            config.logging.log_file().display()
        );
        return Ok(());
    }

    telemetry::init_telemetry(&config.logging, config.enable_otel_export)?;
    tracing::debug!(config_file = %args.config, "Loaded configuration");

    let bind_address = config.bind_address();
    Application::new(config)
        .await?
        .serve(async move {
            let signal = stop_requested().await;
            tracing::info!(%bind_address, "{} received, draining in-flight uploads", signal);
        })
        .await
}
