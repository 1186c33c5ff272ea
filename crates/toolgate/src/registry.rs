use crate::errors::ToolgateError;
use crate::tools::{
    Category, ErrorKind, ExecutionMetadata, ToolContext, ToolDefinition, ToolExecutionResult,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    tools: HashMap<String, Arc<ToolDefinition>>,
}

impl Inner {
    fn insert(&mut self, def: ToolDefinition) {
        self.order.push(def.meta.id.clone());
        self.tools.insert(def.meta.id.clone(), Arc::new(def));
    }

    fn ordered(&self, mut keep: impl FnMut(&ToolDefinition) -> bool) -> Vec<Arc<ToolDefinition>> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id))
            .filter(|d| keep(d))
            .cloned()
            .collect()
    }
}

/// In-memory tool catalogue with policy-gated execution.
///
/// Registration and lookup take a short-lived lock; execution runs with no lock held, so
/// providers can register tools while other calls are in flight.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            timeout,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a built-in tool. An existing id is an error and the first entry is kept.
    pub fn register(&self, def: ToolDefinition) -> Result<(), ToolgateError> {
        let mut inner = self.write();
        if inner.tools.contains_key(def.id()) {
            return Err(ToolgateError::DuplicateToolId(def.meta.id));
        }
        debug!(tool_id = %def.meta.id, category = %def.meta.category, "registered tool");
        inner.insert(def);
        Ok(())
    }

    /// Atomic check-and-insert. Returns false (and drops `def`) if the id is taken.
    pub fn register_if_absent(&self, def: ToolDefinition) -> bool {
        let mut inner = self.write();
        if inner.tools.contains_key(def.id()) {
            return false;
        }
        inner.insert(def);
        true
    }

    /// Remove a tool; absent ids are ignored.
    pub fn unregister(&self, id: &str) -> bool {
        let mut inner = self.write();
        if inner.tools.remove(id).is_none() {
            return false;
        }
        inner.order.retain(|x| x != id);
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<ToolDefinition>> {
        self.read().tools.get(id).cloned()
    }

    /// Tools in `category`, in registration order.
    pub fn get_by_category(&self, category: Category) -> Vec<Arc<ToolDefinition>> {
        self.read().ordered(|d| d.meta.category == category)
    }

    pub fn get_all(&self) -> Vec<Arc<ToolDefinition>> {
        self.read().ordered(|_| true)
    }

    pub fn len(&self) -> usize {
        self.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.order.clear();
        inner.tools.clear();
    }

    /// Look up, gate, validate and run a tool. Every failure mode comes back as a result.
    ///
    /// Order: unknown id, then the wallet gate, then input parsing, then the bounded run.
    pub async fn execute(&self, id: &str, raw: Value, ctx: &ToolContext) -> ToolExecutionResult {
        let started = Instant::now();

        let Some(def) = self.get(id) else {
            warn!(tool_id = %id, "tool not found");
            return ToolExecutionResult::failure(
                ErrorKind::NotFound,
                format!("Tool with id '{id}' not found"),
            );
        };

        if def.meta.requires_wallet && !ctx.has_wallet() {
            info!(tool_id = %id, "rejected: wallet required");
            return ToolExecutionResult::failure(
                ErrorKind::WalletRequired,
                "This tool requires a connected wallet",
            );
        }

        // A missing argument object parses like `{}`.
        let raw = if raw.is_null() {
            Value::Object(Map::new())
        } else {
            raw
        };
        let call = match def.prepare(raw) {
            Ok(call) => call,
            Err(e) => {
                info!(tool_id = %id, error = %e, "rejected: invalid input");
                return ToolExecutionResult::failure(ErrorKind::Validation, e.0);
            }
        };

        let mut handle = tokio::spawn(call.run(ctx.clone()));
        let outcome = tokio::time::timeout(self.timeout, &mut handle).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Err(_elapsed) => {
                handle.abort();
                warn!(tool_id = %id, elapsed_ms, "tool timed out");
                ToolExecutionResult::failure(
                    ErrorKind::Timeout,
                    format!(
                        "Tool '{id}' timed out after {}ms",
                        self.timeout.as_millis()
                    ),
                )
            }
            Ok(Err(join_err)) => {
                warn!(tool_id = %id, error = %join_err, "tool task aborted");
                let msg = if join_err.is_panic() {
                    format!("Tool '{id}' panicked")
                } else {
                    format!("Tool '{id}' was cancelled")
                };
                ToolExecutionResult::failure(ErrorKind::Execution, msg)
            }
            Ok(Ok(Err(e))) => {
                let msg = format!("{e:#}");
                info!(tool_id = %id, elapsed_ms, error = %msg, "tool failed");
                ToolExecutionResult::failure(ErrorKind::Execution, msg)
            }
            Ok(Ok(Ok(out))) => {
                info!(tool_id = %id, elapsed_ms, "tool succeeded");
                ToolExecutionResult::ok(
                    out.data,
                    ExecutionMetadata {
                        execution_time: elapsed_ms,
                        chain_id: ctx.chain_id,
                        transaction_hash: out.receipt.transaction_hash,
                        gas_used: out.receipt.gas_used,
                    },
                )
            }
        }
    }
}
