//! Built-in task handlers.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::handler::{HandlerError, HandlerResult, TaskContext, TaskHandler};

/// Handler: succeed immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    fn name(&self) -> &str {
        "noop"
    }

    async fn execute(&self, ctx: &TaskContext) -> HandlerResult {
        tracing::trace!(task_id = %ctx.task_id(), attempt = ctx.attempt(), "noop");
        Ok(())
    }
}

/// Handler: sleep for `payload.millis`, honouring cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepHandler;

#[derive(Debug, Default, Deserialize)]
struct SleepPayload {
    #[serde(default)]
    millis: u64,
}

#[async_trait]
impl TaskHandler for SleepHandler {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn execute(&self, ctx: &TaskContext) -> HandlerResult {
        let payload: SleepPayload = if ctx.payload().is_null() {
            SleepPayload::default()
        } else {
            serde_json::from_value(ctx.payload().clone())?
        };

        ctx.cancellable(tokio::time::sleep(Duration::from_millis(payload.millis)))
            .await
            .ok_or_else(|| HandlerError::new("cancelled"))
    }
}
