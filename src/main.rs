use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use chrono::{Datelike, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod db;
mod error;
mod events;
mod idempotency;
mod metrics;
mod models;
mod outbox;
mod services;
mod utils;

use crate::cache::CacheManager;
use crate::cache::ranking_cache::CARRY_OVER_WEIGHT;
use crate::config::AppConfig;
use crate::db::Database;
use crate::events::consumer::{run_consumer_loop, ConsumerLoopConfig, EventHandler};
use crate::events::producer::EventProducer;
use crate::events::topics;
use crate::idempotency::EventHandledStore;
use crate::models::PeriodType;
use crate::outbox::{OutboxRelay, OutboxStore};
use crate::services::batch_rank::BatchRanker;
use crate::services::circuit_breaker::{BreakerConfig, BreakerRegistry};
use crate::services::coupon::CouponService;
use crate::services::like::LikeService;
use crate::services::metrics_consumer::MetricsEventHandler;
use crate::services::order::OrderService;
use crate::services::payment::PaymentService;
use crate::services::pg_client::{PgClient, PgClientConfig, PG_DOWNSTREAM};
use crate::services::product::ProductService;
use crate::services::ranking_consumer::RankingEventHandler;
use crate::services::user::UserService;
use crate::services::workflow::{OrderWorkflowHandler, PaymentWorkflowHandler};

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub cache: Arc<CacheManager>,
    pub user_service: Arc<UserService>,
    pub order_service: Arc<OrderService>,
    pub product_service: Arc<ProductService>,
    pub like_service: Arc<LikeService>,
    pub coupon_service: Arc<CouponService>,
    pub payment_service: Arc<PaymentService>,
    pub batch_ranker: Arc<BatchRanker>,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commerce_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting commerce backend v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    let metrics_handle = metrics::init_metrics();

    // Initialize database
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    // Initialize cache manager (Redis)
    let cache = Arc::new(CacheManager::connect(&config.redis_url).await?);
    if cache.is_available() {
        tracing::info!("Cache manager initialized with Redis at {}", config.redis_url);
    } else {
        tracing::warn!("Cache manager running without Redis (graceful degradation)");
    }

    // Outbox relay: polls PENDING rows and ships them to Kafka
    let producer = Arc::new(EventProducer::new(&config.kafka_bootstrap_servers)?);
    let outbox_store = OutboxStore::new(db.pool.clone());
    let relay = OutboxRelay::new(
        outbox_store.clone(),
        producer.clone(),
        config.outbox_relay_batch_size,
        Duration::from_millis(config.outbox_relay_interval_ms),
    );
    tokio::spawn(relay.run());
    tracing::info!("Outbox relay spawned");

    // Payment gateway client behind a per-downstream circuit breaker
    let breakers = BreakerRegistry::new(BreakerConfig {
        window_size: config.breaker_window_size,
        failure_rate_threshold: config.breaker_failure_rate,
        min_calls: config.breaker_min_calls,
        open_cooldown: Duration::from_millis(config.breaker_open_ms),
    });
    let pg_client = Arc::new(PgClient::new(
        PgClientConfig {
            base_url: config.pg_base_url.clone(),
            timeout: Duration::from_millis(config.pg_timeout_ms),
            max_retries: config.pg_max_retries,
            retry_base: Duration::from_millis(config.pg_retry_base_ms),
        },
        breakers.breaker(PG_DOWNSTREAM),
    )?);
    tracing::info!("Payment gateway client initialized ({})", config.pg_base_url);

    // Core services
    let user_service = Arc::new(UserService::new(db.pool.clone()));
    let order_service = Arc::new(OrderService::new(db.pool.clone()));
    let product_service = Arc::new(ProductService::new(db.pool.clone(), cache.clone()));
    let like_service = Arc::new(LikeService::new(db.pool.clone(), cache.clone()));
    let coupon_service = Arc::new(CouponService::new(db.pool.clone()));
    let payment_service = Arc::new(PaymentService::new(
        db.pool.clone(),
        pg_client.clone(),
        config.pg_callback_url.clone(),
    ));
    let batch_ranker = Arc::new(BatchRanker::new(db.pool.clone(), config.batch_chunk_size));

    // Consumer groups: each runs `consumer_concurrency` worker tasks with
    // batch poll + manual commit; idempotency is tracked per group.
    let read_model_topics = vec![
        topics::ORDER_EVENTS.to_string(),
        topics::LIKE_EVENTS.to_string(),
        topics::PRODUCT_EVENTS.to_string(),
    ];
    let workflow_topics = vec![
        topics::PAYMENT_EVENTS.to_string(),
        topics::COUPON_EVENTS.to_string(),
    ];

    spawn_consumer_group(
        &config,
        &db,
        config.kafka_metrics_group_id.clone(),
        read_model_topics.clone(),
        Arc::new(MetricsEventHandler::new(db.pool.clone())),
    );
    spawn_consumer_group(
        &config,
        &db,
        config.kafka_ranking_group_id.clone(),
        read_model_topics,
        Arc::new(RankingEventHandler::new(cache.clone())),
    );
    spawn_consumer_group(
        &config,
        &db,
        "payment-processor".to_string(),
        workflow_topics.clone(),
        Arc::new(PaymentWorkflowHandler::new(payment_service.clone())),
    );
    spawn_consumer_group(
        &config,
        &db,
        "order-workflow".to_string(),
        workflow_topics,
        Arc::new(OrderWorkflowHandler::new(order_service.clone())),
    );
    tracing::info!("Consumer groups spawned");

    // Payment reconciliation worker: re-queries the gateway for stale
    // PENDING payments that hold a transaction key.
    {
        let payment_service = payment_service.clone();
        let interval = Duration::from_secs(config.payment_reconcile_interval_secs);
        let min_age = chrono::Duration::seconds(config.payment_reconcile_min_age_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match payment_service.reconcile_pending(min_age).await {
                    Ok(0) => {}
                    Ok(resolved) => {
                        tracing::info!(resolved = resolved, "payment reconciliation resolved payments");
                    }
                    Err(e) => tracing::error!("payment reconciliation failed: {e}"),
                }
            }
        });
        tracing::info!("Payment reconciliation worker spawned");
    }

    // Ranking scheduler: on day rollover carry yesterday's scores into the
    // new day, and launch WEEKLY runs on Mondays / MONTHLY runs on the 1st
    // for the just-completed period.
    {
        let batch_ranker = batch_ranker.clone();
        let cache = cache.clone();
        let interval = Duration::from_secs(config.ranking_scheduler_interval_secs);
        tokio::spawn(async move {
            let mut last_date = Utc::now().date_naive();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let today = Utc::now().date_naive();
                if today == last_date {
                    continue;
                }

                if let Err(e) = cache
                    .ranking()
                    .carry_over(last_date, today, CARRY_OVER_WEIGHT)
                    .await
                {
                    tracing::error!("ranking carry-over failed: {e}");
                }

                if today.weekday() == chrono::Weekday::Mon {
                    if let Err(e) = batch_ranker.run(PeriodType::Weekly, last_date).await {
                        tracing::error!("weekly ranking run failed: {e}");
                    }
                }
                if today.day() == 1 {
                    if let Err(e) = batch_ranker.run(PeriodType::Monthly, last_date).await {
                        tracing::error!("monthly ranking run failed: {e}");
                    }
                }

                last_date = today;
            }
        });
        tracing::info!("Ranking scheduler spawned");
    }

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        cache,
        user_service,
        order_service,
        product_service,
        like_service,
        coupon_service,
        payment_service,
        batch_ranker,
        metrics_handle,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_consumer_group(
    config: &AppConfig,
    db: &Database,
    group_id: String,
    topics: Vec<String>,
    handler: Arc<dyn EventHandler>,
) {
    for worker in 0..config.consumer_concurrency {
        let loop_config = ConsumerLoopConfig {
            bootstrap_servers: config.kafka_bootstrap_servers.clone(),
            group_id: group_id.clone(),
            topics: topics.clone(),
            batch_size: config.consumer_batch_size,
            poll_timeout: Duration::from_millis(config.consumer_poll_ms),
        };
        let handled = EventHandledStore::new(db.pool.clone(), &group_id);
        let handler = handler.clone();
        tokio::spawn(async move {
            tracing::debug!(group = %loop_config.group_id, worker = worker, "consumer worker spawning");
            run_consumer_loop(loop_config, handler, handled).await;
        });
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn render_metrics(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> String {
    state.metrics_handle.render()
}
