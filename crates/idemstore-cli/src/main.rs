use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

use idemstore_core::app::{Admission, GcLoop, Operation};
use idemstore_core::{
    GuardConfig, GuardError, GuardOutcome, IdempotencyGuard, IdempotencyKey, IdempotencyStore,
    InMemoryIdempotencyStore, StoreConfig, StoredResponse,
};

type Store = InMemoryIdempotencyStore<IdempotencyKey, StoredResponse>;
type Guard = IdempotencyGuard<Store, IdempotencyKey, StoredResponse>;

/// Fails a fixed number of times, then answers with a greeting.
struct GreetOperation {
    name: String,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

impl GreetOperation {
    fn new(name: &str, failures: u32) -> Self {
        Self {
            name: name.to_string(),
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Operation<StoredResponse> for GreetOperation {
    type Error = String;

    async fn run(&self) -> Result<StoredResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;

        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(format!("intentional failure (left={left})"));
        }

        StoredResponse::json(200, &serde_json::json!({ "hello": self.name }))
            .map_err(|e| format!("json encode: {e}"))
    }
}

/// One line of the demo report.
#[derive(Debug, Serialize)]
struct StepReport {
    step: &'static str,
    key: String,
    outcome: String,
    status: Option<u16>,
    body: Option<String>,
}

impl StepReport {
    fn new(
        step: &'static str,
        key: &str,
        result: &Result<GuardOutcome<StoredResponse>, GuardError<String>>,
    ) -> Self {
        let (outcome, response) = match result {
            Ok(GuardOutcome::Executed(r)) => ("executed".to_string(), Some(r)),
            Ok(GuardOutcome::Replayed(r)) => ("replayed".to_string(), Some(r)),
            Ok(GuardOutcome::Bypassed(r)) => ("bypassed".to_string(), Some(r)),
            Err(e) => (format!("error: {e}"), None),
        };
        Self {
            step,
            key: key.to_string(),
            outcome,
            status: response.map(|r| r.status),
            body: response.map(|r| String::from_utf8_lossy(&r.body).into_owned()),
        }
    }

    fn note(step: &'static str, key: &str, outcome: impl Into<String>) -> Self {
        Self {
            step,
            key: key.to_string(),
            outcome: outcome.into(),
            status: None,
            body: None,
        }
    }

    fn print(&self) -> Result<(), serde_json::Error> {
        println!("{}", serde_json::to_string(self)?);
        Ok(())
    }
}

/// Scenario A: claim, complete, then replay.
async fn replay_scenario(guard: &Guard) -> Result<(), Box<dyn Error>> {
    let op = GreetOperation::new("world", 0);
    let key = IdempotencyKey::new("x");

    for step in ["first", "retry"] {
        let result = guard.execute(&key, &op).await;
        StepReport::new(step, key.as_str(), &result).print()?;
        if let Ok(outcome) = &result {
            let greeting: serde_json::Value = outcome.payload().body_json()?;
            info!(step, replayed = outcome.is_replayed(), %greeting, "decoded response");
        }
    }
    info!(calls = op.calls.load(Ordering::SeqCst), "replay scenario done");
    Ok(())
}

/// Scenario B: a held claim blocks, abandon frees the key.
async fn abandon_scenario(guard: &Guard) -> Result<(), Box<dyn Error>> {
    let op = GreetOperation::new("abandon", 0);
    let key = IdempotencyKey::new("y");

    let Admission::Execute(ticket) = guard.claim(&key) else {
        return Err("key y was not free".into());
    };
    StepReport::note("claim", ticket.key().as_str(), format!("claimed ({})", ticket.claim_id()))
        .print()?;

    let blocked = guard.execute(&key, &op).await;
    StepReport::new("concurrent", key.as_str(), &blocked).print()?;

    ticket.abandon();
    StepReport::note("abandon", key.as_str(), "abandoned").print()?;

    let again = guard.execute(&key, &op).await;
    StepReport::new("after-abandon", key.as_str(), &again).print()?;
    Ok(())
}

/// Many concurrent requests with one key: one execution, the rest rejected or replayed.
async fn burst_scenario(guard: &Arc<Guard>) -> Result<(), Box<dyn Error>> {
    const CALLERS: usize = 8;
    let op = Arc::new(GreetOperation::new("burst", 0));

    let mut tasks = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let guard = Arc::clone(guard);
        let op = Arc::clone(&op);
        tasks.push(tokio::spawn(async move {
            let key = IdempotencyKey::new("burst");
            guard.execute(&key, op.as_ref()).await
        }));
    }

    for task in tasks {
        let result = task.await?;
        StepReport::new("burst", "burst", &result).print()?;
    }
    info!(calls = op.calls.load(Ordering::SeqCst), "burst scenario done");
    Ok(())
}

/// Failures abandon the claim, so the client can retry with the same key.
async fn retry_scenario(guard: &Guard) -> Result<(), Box<dyn Error>> {
    let op = GreetOperation::new("flaky", 2);
    let key = IdempotencyKey::new("flaky");

    for attempt in ["attempt-1", "attempt-2", "attempt-3", "attempt-4"] {
        let result = guard.execute(&key, &op).await;
        StepReport::new(attempt, key.as_str(), &result).print()?;
    }
    Ok(())
}

/// Raw header values, as a transport would pass them.
async fn header_scenario(guard: &Guard) -> Result<(), Box<dyn Error>> {
    let op = GreetOperation::new("header", 0);
    let headers = [
        None,
        Some("7c9e6679-7425-40de-944b-e07fc1f90ae7"),
        Some("7c9e6679-7425-40de-944b-e07fc1f90ae7"),
        Some("not-a-uuid"),
    ];

    for raw in headers {
        let result = guard.execute_raw(raw, || op.run()).await;
        StepReport::new("header", raw.unwrap_or("<none>"), &result).print()?;
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn Error>> {
    let store_config = StoreConfig::from_env()?;
    let guard_config = GuardConfig::from_env()?;
    info!(?store_config, ?guard_config, "starting idempotency demo");

    let store = Arc::new(Store::new(store_config.clone()));
    let guard = Arc::new(IdempotencyGuard::new(Arc::clone(&store), guard_config));

    let gc = store_config
        .sweep_interval
        .map(|interval| {
            GcLoop::<_, IdempotencyKey, StoredResponse>::new(Arc::clone(&store), interval).spawn()
        });

    replay_scenario(&guard).await?;
    abandon_scenario(&guard).await?;
    burst_scenario(&guard).await?;
    retry_scenario(&guard).await?;
    header_scenario(&guard).await?;

    println!("{}", serde_json::to_string(&store.counts())?);

    if let Some(gc) = gc {
        if gc.is_finished() {
            warn!("gc loop exited before shutdown");
        }
        gc.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "demo failed");
            eprintln!("idemstore: error: {e}");
            ExitCode::FAILURE
        }
    }
}
