// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::{Args, Parser, Subcommand};
use dynakube_operator::{
    cluster::{Cluster, KubeCluster},
    constants::{
        DEFAULT_CERTS_DIR, DEFAULT_METRICS_ADDR, DEFAULT_WEBHOOK_ADDR, KIND_DYNAKUBE,
        KIND_EDGE_CONNECT, REQUEUE_FAST_SECS, TLS_CRT_KEY, TLS_KEY_KEY, TOKIO_WORKER_THREADS,
    },
    context::{Context, OperatorConfig},
    crd::{DynaKube, EdgeConnect},
    metrics,
    webhook::{self, WebhookConfig, WebhookState},
};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::ConfigMap,
};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Dynatrace operator and pod-injection webhook.
#[derive(Debug, Parser)]
#[command(name = "dynakube-operator", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the `DynaKube` and `EdgeConnect` controllers
    Operator(OperatorArgs),
    /// Run the mutating admission webhook server
    Webhook(WebhookArgs),
}

#[derive(Debug, Args)]
struct OperatorArgs {
    /// Namespace the operator and its custom resources live in
    #[arg(long, env = "POD_NAMESPACE", default_value = "dynatrace")]
    namespace: String,

    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: SocketAddr,
}

#[derive(Debug, Args)]
struct WebhookArgs {
    /// Namespace the `DynaKube` resources live in
    #[arg(long, env = "POD_NAMESPACE", default_value = "dynatrace")]
    namespace: String,

    #[arg(long, env = "WEBHOOK_ADDR", default_value = DEFAULT_WEBHOOK_ADDR)]
    webhook_addr: SocketAddr,

    /// Directory holding `tls.crt` and `tls.key`
    #[arg(long, env = "CERTS_DIR", default_value = DEFAULT_CERTS_DIR)]
    certs_dir: PathBuf,

    /// UID of the `kube-system` namespace; looked up when not given
    #[arg(long, env = "KUBE_SYSTEM_UUID")]
    cluster_id: Option<String>,

    /// Image of the install init container
    #[arg(long, env = "WEBHOOK_IMAGE")]
    webhook_image: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("dynakube-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Respects RUST_LOG (default "info") and RUST_LOG_FORMAT=json
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    match cli.command {
        Command::Operator(args) => run_operator(args).await,
        Command::Webhook(args) => run_webhook(args).await,
    }
}

async fn run_operator(args: OperatorArgs) -> Result<()> {
    info!(namespace = %args.namespace, "Starting Dynatrace operator");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let ctx = Arc::new(Context::new(
        client.clone(),
        OperatorConfig {
            namespace: args.namespace,
            metrics_addr: args.metrics_addr,
        },
    ));

    info!("Starting all controllers");

    // Controllers should never exit; if one does, the process exits with it
    tokio::select! {
        result = run_dynakube_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: DynaKube controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DynaKube controller exited unexpectedly without error")
        }
        result = run_edge_connect_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: EdgeConnect controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("EdgeConnect controller exited unexpectedly without error")
        }
        result = run_metrics_server(ctx.config.metrics_addr) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        () = shutdown_signal() => {
            info!("Shutdown signal received, stopping operator");
            Ok(())
        }
    }
}

/// Run the `DynaKube` controller
async fn run_dynakube_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting DynaKube controller");

    let namespace = ctx.config.namespace.clone();
    let api = Api::<DynaKube>::namespaced(client.clone(), &namespace);

    Controller::new(api, Config::default())
        .owns(
            Api::<StatefulSet>::namespaced(client.clone(), &namespace),
            Config::default(),
        )
        .owns(
            Api::<ConfigMap>::namespaced(client, &namespace),
            Config::default(),
        )
        .run(reconcile_dynakube_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `EdgeConnect` controller
async fn run_edge_connect_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting EdgeConnect controller");

    let namespace = ctx.config.namespace.clone();
    let api = Api::<EdgeConnect>::namespaced(client.clone(), &namespace);

    Controller::new(api, Config::default())
        .owns(
            Api::<Deployment>::namespaced(client, &namespace),
            Config::default(),
        )
        .run(reconcile_edge_connect_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `DynaKube`
async fn reconcile_dynakube_wrapper(
    dk: Arc<DynaKube>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(name = %dk.name_any(), namespace = ?dk.namespace(), "Reconcile wrapper called for DynaKube");
    let start = Instant::now();

    match ctx.reconcile_dynakube(&dk).await {
        Ok(action) => {
            info!("Successfully reconciled DynaKube: {}", dk.name_any());
            metrics::record_reconciliation_success(KIND_DYNAKUBE, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile DynaKube {}: {:#}", dk.name_any(), e);
            metrics::record_reconciliation_error(KIND_DYNAKUBE, start.elapsed());
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `EdgeConnect`
async fn reconcile_edge_connect_wrapper(
    ec: Arc<EdgeConnect>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    match ctx.reconcile_edge_connect(&ec).await {
        Ok(action) => {
            info!("Successfully reconciled EdgeConnect: {}", ec.name_any());
            metrics::record_reconciliation_success(KIND_EDGE_CONNECT, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile EdgeConnect {}: {:#}", ec.name_any(), e);
            metrics::record_reconciliation_error(KIND_EDGE_CONNECT, start.elapsed());
            Err(e.into())
        }
    }
}

/// Error policy for both controllers
fn error_policy<K>(resource: Arc<K>, err: &ReconcileError, _ctx: Arc<Context>) -> Action
where
    K: kube::Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    warn!(
        kind = %kind,
        name = %resource.meta().name.as_deref().unwrap_or_default(),
        "Reconcile failed, requeueing: {err:#}"
    );
    metrics::record_reconciliation_requeue(&kind, "error");
    Action::requeue(Duration::from_secs(REQUEUE_FAST_SECS))
}

async fn run_metrics_server(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!(%addr, "Serving metrics");
    axum::serve(listener, metrics::router()).await?;
    Ok(())
}

async fn run_webhook(args: WebhookArgs) -> Result<()> {
    info!(namespace = %args.namespace, "Starting Dynatrace webhook");

    let client = Client::try_default().await?;
    let cluster: Arc<dyn Cluster> = Arc::new(KubeCluster::new(client));

    let cluster_id = match args.cluster_id {
        Some(id) if !id.is_empty() => id,
        _ => cluster
            .kube_system_uid()
            .await
            .context("failed to look up the kube-system namespace UID")?,
    };
    debug!(%cluster_id, "Resolved cluster id");

    let state = Arc::new(WebhookState::new(
        cluster,
        WebhookConfig {
            namespace: args.namespace,
            cluster_id,
            webhook_image: args.webhook_image,
        },
    ));

    let tls = load_tls(&args.certs_dir).await?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping webhook");
        shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    info!(addr = %args.webhook_addr, "Serving admission webhook");
    axum_server::bind_rustls(args.webhook_addr, tls)
        .handle(handle)
        .serve(webhook::router(state).into_make_service())
        .await?;

    Ok(())
}

/// Load the serving certificate and key from `certs_dir`.
async fn load_tls(certs_dir: &Path) -> Result<RustlsConfig> {
    RustlsConfig::from_pem_file(certs_dir.join(TLS_CRT_KEY), certs_dir.join(TLS_KEY_KEY))
        .await
        .with_context(|| format!("failed to load TLS material from {}", certs_dir.display()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
