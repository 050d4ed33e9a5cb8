//! Session Pool Example
//!
//! A small request handler built from effects:
//! - a `Resource` that opens one pooled session per run and closes it at the end
//! - capability traits describing what the handler needs from its environment
//! - a `Ref` counting requests across concurrent branches
//! - `sequence` fan-out, `timeout`, and `bracket` for a per-request scratch buffer
//!
//! Run with: RUST_LOG=millrace=trace,session_pool=debug cargo run --example session_pool

use std::sync::Arc;
use std::time::Duration;

use millrace::effect::prelude::*;
use millrace::{Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

// ==================== Capabilities ====================

trait HasSessions {
    fn sessions(&self) -> &Resource<String, Session>;
}

trait HasCounter {
    fn served(&self) -> &Ref<u32>;
}

#[derive(Debug)]
struct Session {
    id: u32,
}

struct AppEnv {
    sessions: Resource<String, Session>,
    served: Ref<u32>,
}

impl HasSessions for AppEnv {
    fn sessions(&self) -> &Resource<String, Session> {
        &self.sessions
    }
}

impl HasCounter for AppEnv {
    fn served(&self) -> &Ref<u32> {
        &self.served
    }
}

// ==================== Handlers ====================

fn session<R>() -> Effect<R, String, Arc<Session>>
where
    R: HasSessions + Send + Sync + 'static,
{
    environment::<R, String>().and_then(|env| env.sessions().get())
}

fn count_request<R>() -> Effect<R, String, u32>
where
    R: HasCounter + Send + Sync + 'static,
{
    environment::<R, Never>()
        .and_then(|env| env.served().modify(|n| n + 1))
        .widen()
}

fn handle<R>(path: &'static str) -> Effect<R, String, String>
where
    R: HasSessions + HasCounter + Send + Sync + 'static,
{
    let scratch = bracket(
        pure(Vec::<u8>::with_capacity(64)),
        |buf: Vec<u8>| {
            tracing::debug!(capacity = buf.capacity(), "scratch buffer returned");
            pure(())
        },
        move |_buf: &Vec<u8>| pure(path.len()),
    );

    session::<R>()
        .zip(count_request())
        .zip(scratch)
        .and_then(move |((session, nth), bytes)| {
            if path.starts_with("/slow") {
                sleep(Duration::from_millis(200)).map(move |_| String::new())
            } else {
                pure(format!(
                    "#{} {} via session {} ({} bytes)",
                    nth, path, session.id, bytes
                ))
            }
        })
        .named(path)
        .instrument(tracing::info_span!("request", path))
}

fn serve<R>(paths: Vec<&'static str>) -> Effect<R, String, Vec<String>>
where
    R: HasSessions + HasCounter + Send + Sync + 'static,
{
    map_m(paths, |path| {
        timeout(handle(path), Duration::from_millis(50), format!("{} timed out", path))
            .recover(|err| pure(format!("error: {}", err)))
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RuntimeConfig::from_env().worker_threads(2);
    let runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "could not start runtime");
            std::process::exit(1);
        }
    };

    let next_id = Ref::new(100u32);
    let sessions = {
        let next_id = next_id.clone();
        Resource::new(
            "session",
            move || {
                let open = next_id.modify::<(), String, _>(|n| n + 1);
                async move { open.run(()).await.map(|id| Session { id }) }
            },
            |session: Arc<Session>| async move {
                tracing::info!(session = session.id, "closing session");
                Ok::<(), String>(())
            },
        )
    };
    let served = Ref::new(0u32);

    for batch in [vec!["/", "/users", "/slow/report"], vec!["/orders"]] {
        let env = AppEnv {
            sessions: sessions.clone(),
            served: served.clone(),
        };
        let outcome = runtime.block_on_detailed(&serve::<AppEnv>(batch), env);
        match outcome.result {
            Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
            Err(err) => eprintln!("batch failed: {}", err),
        }
        if !outcome.release_errors.is_empty() {
            eprintln!("{}", outcome.release_errors);
        }
    }

    let total = runtime.block_on(&served.get::<(), Never>(), ());
    println!("requests served: {}", total.unwrap_or_default());
}
