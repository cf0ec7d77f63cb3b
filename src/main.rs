// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

mod analysis;
mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::Config;
use crate::services::{
    AnalysisCache, MemoryCache, RedisCache, ReportPipeline, llm_service::client_from_config,
};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ReportPipeline>,
    local_intake_root: Option<PathBuf>,
}

async fn build_cache(config: &Config) -> Arc<dyn AnalysisCache> {
    match &config.redis_url {
        Some(url) => match RedisCache::new(url).await {
            Ok(cache) => {
                info!("Caching analyses in Redis");
                Arc::new(cache)
            }
            Err(e) => {
                warn!("Redis unavailable ({}); falling back to the in-process cache", e);
                Arc::new(MemoryCache::new())
            }
        },
        None => {
            info!("REDIS_URL not set; using the in-process cache");
            Arc::new(MemoryCache::new())
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting DermaScan service...");

    let config = Config::from_env().context("invalid configuration")?;
    let client = client_from_config(&config).context("cannot build inference client")?;
    let cache = build_cache(&config).await;

    info!(
        "Vision provider {} (concurrency {}, call timeout {}s, deadline {}s)",
        client.name(),
        config.pipeline.concurrency,
        config.pipeline.call_timeout.as_secs(),
        config.pipeline.deadline.as_secs()
    );
    if let Some(root) = &config.local_intake_root {
        info!("Local intake enabled under {}", root.display());
    }

    let max_document_bytes = config.pipeline.max_document_bytes;
    let app_state = AppState {
        pipeline: Arc::new(ReportPipeline::new(client, cache, config.pipeline.clone())),
        local_intake_root: config.local_intake_root.clone(),
    };

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(handlers::json_config(max_document_bytes))
            .wrap(middleware::Logger::default())
            .configure(handlers::routes)
            .route("/health", web::get().to(health_check))
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("cannot bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "dermascan",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
