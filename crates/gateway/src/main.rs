use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use ir_domain::config::{Config, LogFormat, ObservabilityConfig};
use ir_gateway::cli::{Cli, Command, ConfigCommand, ServeArgs};
use ir_gateway::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None => serve(ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(args).await,
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = ir_gateway::cli::load_config()?;
            if !ir_gateway::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = ir_gateway::cli::load_config()?;
            ir_gateway::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("intentrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let (mut config, config_path) = ir_gateway::cli::load_config()
        .context("loading configuration")?;
    args.apply(&mut config);

    let tracer_provider = init_tracing(&config.observability);
    tracing::info!(config = %config_path.display(), "IntentRelay starting");

    for issue in config.validate() {
        tracing::warn!(%issue, "config issue");
    }
    if !config.is_valid() {
        anyhow::bail!("invalid configuration in {}", config_path.display());
    }

    let result = run_server(Arc::new(config)).await;

    // Flush pending spans before exit.
    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }

    result
}

/// Install the global subscriber.
///
/// Log lines go to stdout as JSON (or compact text). When `otlp_endpoint`
/// is set, spans are also exported via OTLP/gRPC; the returned provider
/// must be shut down on exit.
fn init_tracing(
    obs: &ObservabilityConfig,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let (json_layer, compact_layer) = match obs.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact())),
    };

    let tracer_provider = obs.otlp_endpoint.as_ref().and_then(|endpoint| {
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
        {
            Ok(e) => e,
            Err(e) => {
                eprintln!(
                    "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                     starting without OpenTelemetry"
                );
                return None;
            }
        };

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(obs.service_name.clone())
            .build();

        Some(
            opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    obs.sample_rate,
                ))
                .with_resource(resource)
                .build(),
        )
    });

    let otel_layer = tracer_provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("intentrelay")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(compact_layer)
        .with(otel_layer)
        .init();

    tracer_provider
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = AppState::new(config.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "IntentRelay listening");

    ir_gateway::server::serve(listener, state.clone(), shutdown_signal())
        .await
        .context("axum server error")?;

    let stats = state.registry.stats();
    tracing::info!(
        identities = stats.identities,
        bound_sessions = stats.bound_sessions,
        "shutdown complete"
    );

    Ok(())
}

/// Wait for SIGINT or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT only");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
