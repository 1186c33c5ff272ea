use crate::tools::{Tool, ToolContext};
use crate::tracker::{TxSnapshot, TxTracker};
use async_trait::async_trait;
use eyre::Context as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInput {
    tracking_id: String,
    /// Block until the transaction reaches a terminal state. The registry timeout still applies.
    #[serde(default)]
    wait_for_final: bool,
}

pub struct TransactionStatus {
    tracker: Arc<TxTracker>,
}

impl TransactionStatus {
    pub fn new(tracker: Arc<TxTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Tool for TransactionStatus {
    type Input = StatusInput;
    type Output = TxSnapshot;

    fn input_schema(&self) -> Value {
        json!({
          "type": "object",
          "properties": {
            "trackingId": { "type": "string", "minLength": 1, "description": "Returned by executeSwap or executeBridge" },
            "waitForFinal": { "type": "boolean", "default": false }
          },
          "required": ["trackingId"]
        })
    }

    fn validate(&self, input: &StatusInput) -> Result<(), String> {
        if input.tracking_id.trim().is_empty() {
            return Err("trackingId must not be empty".into());
        }
        Ok(())
    }

    async fn execute(&self, input: StatusInput, _ctx: &ToolContext) -> eyre::Result<TxSnapshot> {
        let id = input.tracking_id.trim();
        if !input.wait_for_final {
            return self
                .tracker
                .snapshot(id)
                .ok_or_else(|| eyre::eyre!("Unknown tracking id: {id}"));
        }
        let mut rx = self
            .tracker
            .subscribe(id)
            .ok_or_else(|| eyre::eyre!("Unknown tracking id: {id}"))?;
        let done = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .context("tracker dropped before the transaction settled")?;
        Ok(done.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{TxKind, TxStatus};
    use serde_json::Map;

    #[tokio::test]
    async fn reports_latest_state() -> eyre::Result<()> {
        let tracker = Arc::new(TxTracker::new());
        let tool = TransactionStatus::new(Arc::clone(&tracker));
        let s = tracker.track(TxKind::Swap, Map::new());
        tracker.advance(&s.tracking_id, TxStatus::Confirmed, Map::new())?;
        let out = tool
            .execute(
                StatusInput {
                    tracking_id: s.tracking_id.clone(),
                    wait_for_final: false,
                },
                &ToolContext::default(),
            )
            .await?;
        assert_eq!(out.status, TxStatus::Confirmed);

        let missing = tool
            .execute(
                StatusInput {
                    tracking_id: "nope".into(),
                    wait_for_final: true,
                },
                &ToolContext::default(),
            )
            .await
            .err()
            .map(|e| e.to_string());
        assert_eq!(missing.as_deref(), Some("Unknown tracking id: nope"));
        Ok(())
    }

    #[tokio::test]
    async fn waiting_returns_the_terminal_snapshot() -> eyre::Result<()> {
        let tracker = Arc::new(TxTracker::new());
        let tool = TransactionStatus::new(Arc::clone(&tracker));
        let s = tracker.track(TxKind::Bridge, Map::new());
        let id = s.tracking_id.clone();
        let bg = Arc::clone(&tracker);
        tokio::spawn(async move {
            let _bridging = bg.advance(&id, TxStatus::Bridging, Map::new());
            let _confirmed = bg.advance(&id, TxStatus::Confirmed, Map::new());
        });
        let out = tool
            .execute(
                StatusInput {
                    tracking_id: s.tracking_id.clone(),
                    wait_for_final: true,
                },
                &ToolContext::default(),
            )
            .await?;
        assert_eq!(out.status, TxStatus::Confirmed);
        Ok(())
    }
}
