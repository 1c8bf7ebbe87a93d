//! Demo runners wired into the `tsq` binary.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tsq_core::{FnRunner, QueueBuilder, Runner, TaskFailure};

pub const DEMO_TASKS: &[&str] = &["echo", "fail", "ping", "sleep"];

pub fn define_demo_tasks(builder: QueueBuilder) -> QueueBuilder {
    builder
        .define("ping", CommandRunner::new("echo", ["pong"]))
        .define("fail", CommandRunner::new("false", [] as [&str; 0]))
        .define("sleep", SleepRunner)
        .define("echo", FnRunner::new(Ok))
        .expect_tasks(DEMO_TASKS)
}

/// Runs a fixed external command. The result is `{"stdout", "stderr"}`;
/// a non-zero exit is a failure carrying the same map.
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Runner for CommandRunner {
    async fn run(&self, _arguments: Value) -> Result<Value, TaskFailure> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TaskFailure::new(format!("failed to spawn {}: {e}", self.program)))?;

        let result = json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        });
        if output.status.success() {
            Ok(result)
        } else {
            Err(TaskFailure::new(output.status.to_string()).with_result(result))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SleepArgs {
    /// seconds
    duration: f64,
}

/// Sleeps for `{"duration": <seconds>}` and returns what it slept.
pub struct SleepRunner;

#[async_trait]
impl Runner for SleepRunner {
    async fn run(&self, arguments: Value) -> Result<Value, TaskFailure> {
        let args: SleepArgs = serde_json::from_value(arguments)
            .map_err(|e| TaskFailure::new(format!("invalid arguments: {e}")))?;
        let duration = Duration::try_from_secs_f64(args.duration)
            .map_err(|e| TaskFailure::new(format!("invalid duration {}: {e}", args.duration)))?;

        tokio::time::sleep(duration).await;
        Ok(json!({ "slept": args.duration }))
    }
}
