//! Stand-in ad backend for exercising the load generator.
//!
//! Serves `/ads?client_id=...` with a small random service time. Client ids
//! prefixed `boom` always fail with a 500; ids prefixed `limited` share a
//! rate limiter and fail once it is exhausted.

use axum::{
    debug_handler,
    extract::Query,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const LIMITED_TPS: u32 = 50;

pub async fn run(addr: SocketAddr) {
    let app = Router::new().route("/ads", get(ads));

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[derive(Deserialize)]
pub struct AdQuery {
    pub client_id: String,
}

lazy_static! {
    static ref LIMITED: DefaultDirectRateLimiter = rate_limiter(LIMITED_TPS);
}

#[debug_handler]
pub async fn ads(Query(query): Query<AdQuery>) -> Result<Json<Value>, StatusCode> {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);

    let service_time = rand::thread_rng().gen_range(1..=10);
    tokio::time::sleep(Duration::from_millis(service_time)).await;

    if query.client_id.starts_with("boom") {
        debug!(client_id = %query.client_id, "simulated backend failure");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    if query.client_id.starts_with("limited") && LIMITED.check().is_err() {
        debug!(client_id = %query.client_id, "rate limit exhausted");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    Ok(Json(json!({
        "ad_id": format!("ad-for-{}", query.client_id),
        "ad_title": "Sample Ad",
        "ad_text": "You might like this",
        "advertiser_id": "advertiser-1",
    })))
}

pub fn rate_limiter(tps: u32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(NonZeroU32::new(tps).unwrap()))
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.fetch_min(0, Ordering::Relaxed);
        println!("{transactions} TPS");
    }
}
