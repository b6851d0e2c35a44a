//! Sends JSON POST requests to an HTTP endpoint at a fixed rate.
//!
//! Configuration comes from the environment (a `.env` file is honored):
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LOAD_TARGET_URL` | required |
//! | `LOAD_LPS` | `20` |
//! | `LOAD_TIMEOUT_MS` | `500` |
//! | `LOAD_DURATION_MS` | `10000` |

use std::{
    env,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use load_generator::{BoxError, Caller, GeneratorSettings, LoadGenerator, Request, Response};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ENV_TARGET_URL: &str = "LOAD_TARGET_URL";
const ENV_LPS: &str = "LOAD_LPS";
const ENV_TIMEOUT_MS: &str = "LOAD_TIMEOUT_MS";
const ENV_DURATION_MS: &str = "LOAD_DURATION_MS";

struct HttpCaller {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[async_trait]
impl Caller for HttpCaller {
    fn build_req(&self) -> Request {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({ "id": id, "message": "load test" });
        Request::new(id, body.to_string())
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    // Any 2xx with a JSON body counts.
    fn check_resp(&self, _request: &Request, response: &Response) -> bool {
        response
            .payload()
            .is_some_and(|body| serde_json::from_slice::<serde_json::Value>(body).is_ok())
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Debug>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, ?default, "Unparsable value; using default.");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,load_generator=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if dotenvy::dotenv().is_ok() {
        info!(".env file loaded.");
    }

    let url = env::var(ENV_TARGET_URL).map_err(|_| format!("{ENV_TARGET_URL} must be set"))?;
    let settings = GeneratorSettings::builder()
        .lps(env_or(ENV_LPS, 20))
        .timeout(Duration::from_millis(env_or(ENV_TIMEOUT_MS, 500)))
        .duration(Duration::from_millis(env_or(ENV_DURATION_MS, 10_000)))
        .build();

    let caller = HttpCaller {
        client: reqwest::Client::builder().build()?,
        url,
        next_id: AtomicU64::new(0),
    };
    let generator = LoadGenerator::new(caller, settings)?;
    info!(concurrency = generator.concurrency(), ?settings, "Starting HTTP load.");

    generator.start();
    tokio::select! {
        _ = generator.wait() => {}
        _ = tokio::signal::ctrl_c() => generator.stop().await,
    }

    let stats = generator.wait().await.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
