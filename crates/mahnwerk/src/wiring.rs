use crate::{Args, Command};
use anyhow::Context;
use models::{IdGenerator, RouteThresholds};
use pipeline::{PipelineSettings, ProcessDeps};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) async fn run(args: Args) -> anyhow::Result<()> {
    let pool = ingest_sql::connect(&args.database_url, args.database_pool_size)
        .await
        .context("connecting to postgres")?;
    ingest_sql::MIGRATOR
        .run(&pool)
        .await
        .context("applying database migrations")?;

    let redis = kv::connect_redis(&args.redis_url)
        .await
        .context("connecting to redis")?;
    let queue: Arc<dyn kv::JobQueue> = Arc::new(kv::RedisQueue::new(redis.clone(), &args.queue_name));
    let counter: Arc<dyn kv::Counter> = Arc::new(kv::RedisCounter::new(redis));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("building http client")?;

    let doc: Arc<dyn saga::DocumentStore> = Arc::new(saga::HttpDocumentStore::new(
        http.clone(),
        args.doc_store_url.to_string(),
        args.doc_store_api_key.clone(),
    ));

    let thresholds = RouteThresholds {
        high: args.route_high,
        low: args.route_low,
    };
    thresholds.validate().context("routing thresholds")?;

    // Each process draws its id shard randomly, like its worker token.
    let shard = rand::thread_rng().gen_range(1u16..1024u16);

    let registry = Arc::new(prompts::Registry::new(pool.clone(), shard));
    prompts::ensure_default_templates(&registry, &args.classify_model, &args.vision_model)
        .await
        .context("installing default prompt templates")?;

    let llm_client: Arc<dyn llm::LlmClient> = Arc::new(
        llm::HttpLlmClient::new(
            llm::ClientConfig::new(args.llm_api_key.clone(), args.llm_base_url.to_string())
                .with_timeout(Duration::from_secs(120)),
        )
        .context("building llm client")?,
    );

    let limits = extract::ExtractLimits::default();
    let extract_ctx = extract::ExtractContext {
        llm: llm_client,
        registry,
        breaker: extract::DailyCostBreaker::new(counter, args.daily_cost_cap),
        fetcher: extract::AttachmentFetcher::new(http.clone(), limits.vendor_max_bytes),
        costs: llm::ModelCosts {
            input_per_1k: args.input_cost_per_1k,
            output_per_1k: args.output_cost_per_1k,
        },
        limits,
    };

    let notifier = Arc::new(
        notify::Notifier::new(
            notify::Sender::from_config(
                args.email_api_key.as_deref(),
                args.email_from.clone(),
                http.clone(),
            ),
            args.email_review_to.clone(),
            args.email_admin_to.clone(),
        )
        .context("building notifier")?,
    );

    let matcher: Arc<dyn pipeline::matcher::Matcher> =
        Arc::new(pipeline::matcher::InquiryMatcher::new(pool.clone()));

    let deps = Arc::new(ProcessDeps {
        pool: pool.clone(),
        extract: extract_ctx,
        matcher,
        doc: doc.clone(),
        notifier,
        settings: PipelineSettings {
            thresholds,
            token_budget: args.token_budget,
            ..PipelineSettings::default()
        },
        id_gen: Mutex::new(IdGenerator::new(shard)),
    });

    match args.command {
        Command::Serve { port } => run_server(listen_addr(port), pool, queue, doc, thresholds).await,
        Command::Worker {
            permits,
            reconcile_interval_secs,
            outbox_interval_secs,
        } => {
            run_worker(
                deps,
                queue,
                doc,
                permits,
                Duration::from_secs(reconcile_interval_secs),
                Duration::from_secs(outbox_interval_secs),
            )
            .await
        }
        Command::Reconcile => {
            let report_id = deps.next_id();
            let tallies =
                saga::reconcile(&pool, doc.as_ref(), report_id, &saga::ReconcileConfig::default())
                    .await?;
            tracing::info!(?tallies, %report_id, "reconciliation finished");
            Ok(())
        }
        Command::Rollup => prompts::run_daily_rollup(&pool).await,
    }
}

fn listen_addr(port: u16) -> std::net::SocketAddr {
    std::net::SocketAddr::from(([0, 0, 0, 0], port))
}

async fn run_server(
    addr: std::net::SocketAddr,
    pool: sqlx::PgPool,
    queue: Arc<dyn kv::JobQueue>,
    doc: Arc<dyn saga::DocumentStore>,
    thresholds: RouteThresholds,
) -> anyhow::Result<()> {
    let shard = rand::thread_rng().gen_range(1u16..1024u16);
    let state = Arc::new(serve::AppState {
        pool,
        queue,
        doc,
        thresholds,
        id_gen: Mutex::new(IdGenerator::new(shard)),
    });
    let router = serve::build_router(state);

    tracing::info!(%addr, "http server listening");
    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

/// The worker process: the queue dispatcher plus two periodic loops, the
/// outbox pump and the reconciler. All three stop on the shutdown signal;
/// in-flight tasks drain first.
async fn run_worker(
    deps: Arc<ProcessDeps>,
    queue: Arc<dyn kv::JobQueue>,
    doc: Arc<dyn saga::DocumentStore>,
    permits: u32,
    reconcile_interval: Duration,
    outbox_interval: Duration,
) -> anyhow::Result<()> {
    let config = dispatch::DispatcherConfig {
        permits,
        ..dispatch::DispatcherConfig::default()
    };
    let actor = Arc::new(JobActor {
        deps: deps.clone(),
        visibility: config.visibility,
    });

    let pump_pool = deps.pool.clone();
    let pump_doc = doc.clone();
    let outbox_pump = tokio::spawn(async move {
        let mut tick = tokio::time::interval(outbox_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match saga::process_batch(&pump_pool, pump_doc.as_ref(), 50, false).await {
                Ok((delivered, attempted)) if attempted > 0 => {
                    tracing::debug!(delivered, attempted, "outbox pump sweep");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(?err, "outbox pump sweep failed"),
            }
        }
    });

    let reconcile_pool = deps.pool.clone();
    let reconcile_doc = doc.clone();
    let reconcile_deps = deps.clone();
    let reconciler = tokio::spawn(async move {
        let mut tick = tokio::time::interval(reconcile_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a worker restart
        // storm doesn't trigger a reconciliation stampede.
        tick.tick().await;
        loop {
            tick.tick().await;
            let report_id = reconcile_deps.next_id();
            match saga::reconcile(
                &reconcile_pool,
                reconcile_doc.as_ref(),
                report_id,
                &saga::ReconcileConfig::default(),
            )
            .await
            {
                Ok(tallies) => tracing::info!(?tallies, %report_id, "reconciliation finished"),
                Err(err) => tracing::error!(?err, %report_id, "reconciliation failed"),
            }
        }
    });

    dispatch::serve(queue, actor, config, shutdown_signal()).await;

    outbox_pump.abort();
    reconciler.abort();
    tracing::info!("worker stopped");
    Ok(())
}

/// Bridges the dispatcher to the job pipeline.
struct JobActor {
    deps: Arc<ProcessDeps>,
    visibility: Duration,
}

#[async_trait::async_trait]
impl dispatch::Actor for JobActor {
    async fn handle(
        &self,
        payload: serde_json::Value,
    ) -> Result<(), models::ProcessingError> {
        let parsed: pipeline::actor::JobPayload = serde_json::from_value(payload)
            .map_err(|err| models::ProcessingError::permanent(format!("bad payload: {err}")))?;
        let worker_token = uuid::Uuid::new_v4();
        pipeline::actor::process_job(&self.deps, parsed.job_id, worker_token, self.visibility)
            .await
    }

    async fn on_permanent_failure(&self, payload: serde_json::Value, error: &str) {
        let Ok(parsed) = serde_json::from_value::<pipeline::actor::JobPayload>(payload) else {
            tracing::error!("permanent failure with undecodable payload");
            return;
        };
        pipeline::actor::on_permanent_failure(&self.deps, parsed.job_id, error).await;
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
