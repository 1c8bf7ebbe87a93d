//! Runner port - タスク実装の抽象化
//!
//! Runner は名前付きで登録され、worker から job の arguments を受け取って実行されます。
//! arguments / result の形はタスク側が決めるもので、キューは検証しません。

use async_trait::async_trait;
use serde_json::Value;

/// Runner はタスク実装
///
/// # 使用例
/// ```ignore
/// struct Ping;
///
/// #[async_trait]
/// impl Runner for Ping {
///     async fn run(&self, _arguments: Value) -> Result<Value, TaskFailure> {
///         Ok(Value::from("pong"))
///     }
/// }
/// ```
///
/// # 実行モデル
/// - worker は run() の完了を待ってから次の job を取る（同時に 1 件のみ）
/// - 長時間ブロックする run() は後続の job をすべて待たせる（タイムアウトなし）
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, arguments: Value) -> Result<Value, TaskFailure>;
}

/// A task-level failure.
///
/// Not a queue error: the worker turns it into a `FAILURE` status. When no
/// explicit `result` is attached, the message becomes the stored result so the
/// reason stays retrievable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
    result: Option<Value>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: None,
        }
    }

    /// Attach a result payload that is stored instead of the message.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The value to persist as the job's result.
    pub fn into_result(self) -> Value {
        self.result.unwrap_or(Value::String(self.message))
    }
}

/// FnRunner は同期クロージャを Runner として扱うアダプタ
pub struct FnRunner<F>(F);

impl<F> FnRunner<F>
where
    F: Fn(Value) -> Result<Value, TaskFailure> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Runner for FnRunner<F>
where
    F: Fn(Value) -> Result<Value, TaskFailure> + Send + Sync,
{
    async fn run(&self, arguments: Value) -> Result<Value, TaskFailure> {
        (self.0)(arguments)
    }
}
