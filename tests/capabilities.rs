//! Effects that declare what they need from the environment through traits.
//!
//! Each capability is a trait; an effect is generic over any environment that
//! implements the ones it uses, and the caller picks the concrete type.

use std::sync::{Arc, Mutex};

use millrace::effect::prelude::*;
use millrace::testing::MockEnv;

trait HasClock {
    fn now(&self) -> u64;
}

trait HasConsole {
    fn write_line(&self, line: &str);
}

fn timestamp<R>() -> Effect<R, String, u64>
where
    R: HasClock + Send + Sync + 'static,
{
    asks(|env: &R| env.now())
}

fn say<R>(message: String) -> Effect<R, String, ()>
where
    R: HasConsole + Send + Sync + 'static,
{
    asks(move |env: &R| env.write_line(&message))
}

fn log_with_time<R>(message: &'static str) -> Effect<R, String, u64>
where
    R: HasClock + HasConsole + Send + Sync + 'static,
{
    timestamp::<R>().and_then(move |at| say(format!("[{}] {}", at, message)).map(move |_| at))
}

struct FixedClock(u64);

#[derive(Default, Clone)]
struct CapturedConsole(Arc<Mutex<Vec<String>>>);

impl CapturedConsole {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct TestEnv {
    clock: FixedClock,
    console: CapturedConsole,
}

impl HasClock for TestEnv {
    fn now(&self) -> u64 {
        self.clock.0
    }
}

impl HasConsole for TestEnv {
    fn write_line(&self, line: &str) {
        self.console.0.lock().unwrap().push(line.to_string());
    }
}

impl HasClock for ((), FixedClock) {
    fn now(&self) -> u64 {
        (self.1).0
    }
}

#[tokio::test]
async fn composed_requirements_resolve_against_one_environment() {
    let console = CapturedConsole::default();
    let env = TestEnv {
        clock: FixedClock(1_700),
        console: console.clone(),
    };

    let effect = log_with_time::<TestEnv>("started").zip(log_with_time("stopped"));

    assert_eq!(effect.run(env).await, Ok((1_700, 1_700)));
    assert_eq!(console.lines(), vec!["[1700] started", "[1700] stopped"]);
}

#[tokio::test]
async fn local_narrows_a_larger_environment() {
    struct App {
        clock: u64,
        name: &'static str,
    }

    let effect = timestamp::<FixedClockEnv>()
        .local(|app: &App| FixedClockEnv(app.clock))
        .zip(asks(|app: &App| app.name));

    let result = effect
        .run(App {
            clock: 42,
            name: "mill",
        })
        .await;
    assert_eq!(result, Ok((42, "mill")));
}

struct FixedClockEnv(u64);

impl HasClock for FixedClockEnv {
    fn now(&self) -> u64 {
        self.0
    }
}

#[tokio::test]
async fn mock_env_components_as_capabilities() {
    let env = MockEnv::new().with(|| FixedClock(9)).build();
    assert_eq!(timestamp().run(env).await, Ok(9));
}
