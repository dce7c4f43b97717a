use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryIdentityDirectory, LoggingIntegrationHook, LoggingOutbox};
use crate::routes::with_lifecycle_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use grievance_core::config::AppConfig;
use grievance_core::error::AppError;
use grievance_core::lifecycle::{
    CaseService, LifecycleTaskHandler, MemoryStore, QueueDispatcher, SignalDetector,
    TaskDispatcher,
};
use grievance_core::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

const DIRECTORY_FALLBACK_DOMAIN: &str = "members.invalid";

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;
    let policy = Arc::new(config.lifecycle.load_policy()?);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::with_signal_history(
        config.lifecycle.retain_signal_history,
    ));
    let handler = LifecycleTaskHandler::new(
        Arc::clone(&store),
        SignalDetector::from_policy(&policy),
        Arc::new(InMemoryIdentityDirectory::with_fallback_domain(
            DIRECTORY_FALLBACK_DOMAIN,
        )),
        Arc::new(LoggingOutbox::default()),
        Arc::new(LoggingIntegrationHook::new(
            config.lifecycle.signal_webhook_url.clone(),
        )),
    );
    // the worker lives as long as the dispatcher held by the service
    let (queue, _worker) =
        QueueDispatcher::spawn(Arc::new(handler), config.lifecycle.dispatch_capacity);
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(queue);
    let case_service = Arc::new(CaseService::new(store, policy, dispatcher));

    let app = with_lifecycle_routes(case_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        dispatch_capacity = config.lifecycle.dispatch_capacity,
        "grievance case lifecycle service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
