//! Drives an in-process echo service with random latency.
//!
//! ```text
//! RUST_LOG=load_generator=debug cargo run --example echo_load -- 200 50 5000
//! ```
//!
//! Arguments are `lps`, `timeout_ms` and `duration_ms`. Ctrl-C stops the run early.

use std::{
    env,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use load_generator::{BoxError, Caller, GeneratorSettings, LoadGenerator, Request, Response};
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Echoes the payload after a random delay, failing one call in fifty.
#[derive(Default)]
struct JitteryEcho {
    next_id: AtomicU64,
}

#[async_trait]
impl Caller for JitteryEcho {
    fn build_req(&self) -> Request {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Request::new(id, format!("ping {id}"))
    }

    async fn call(&self, payload: Bytes) -> Result<Bytes, BoxError> {
        let (latency_ms, fail) = {
            let mut rng = rand::rng();
            (rng.random_range(5..80), rng.random_ratio(1, 50))
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if fail {
            return Err("echo service hiccup".into());
        }
        Ok(payload)
    }

    fn check_resp(&self, request: &Request, response: &Response) -> bool {
        response.payload() == Some(request.payload())
    }
}

fn arg(position: usize, default: u64) -> u64 {
    env::args()
        .nth(position)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = GeneratorSettings::builder()
        .lps(u32::try_from(arg(1, 100))?)
        .timeout(Duration::from_millis(arg(2, 50)))
        .duration(Duration::from_millis(arg(3, 3_000)))
        .build();

    let generator = LoadGenerator::new(JitteryEcho::default(), settings)?;
    generator.before_exit(Some(Box::new(|| info!("Echo load run draining finished."))));
    generator.start();

    tokio::select! {
        stats = generator.wait() => {
            if stats.is_none() {
                warn!("Generator never started.");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; stopping.");
            generator.stop().await;
        }
    }

    let stats = generator.wait().await.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        calls = generator.call_count(),
        dropped = generator.dropped_results(),
        "Done."
    );
    Ok(())
}
