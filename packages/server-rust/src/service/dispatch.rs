//! Dispatch of directory `POST` requests by their `op` field.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info_span, Instrument};
use vmctl_core::ConfigDocument;

use super::form::OperationRequest;
use super::operation::{DomainOp, OperationError, OperationOutcome};
use super::proxy::DomainLifecycleProxy;

/// Maps the `op` field to its handler and records every outcome.
///
/// `create` runs on the calling task. `restore` is handed to the restore pool
/// and the calling task only awaits its result.
#[derive(Clone)]
pub struct OperationDispatcher {
    proxy: Arc<DomainLifecycleProxy>,
}

impl OperationDispatcher {
    #[must_use]
    pub fn new(proxy: Arc<DomainLifecycleProxy>) -> Self {
        Self { proxy }
    }

    /// Runs the operation named by the request's `op` field.
    ///
    /// # Errors
    ///
    /// `MissingField` when `op` is absent or repeated, `UnknownOperation` for
    /// names outside [`DomainOp`], otherwise the operation's own error. All of
    /// these are decided before the manager is called.
    pub async fn dispatch(
        &self,
        request: &OperationRequest,
        directory_url: &str,
    ) -> Result<OperationOutcome, OperationError> {
        let name = request.single("op")?;
        let Some(op) = DomainOp::from_name(name) else {
            metrics::counter!("vmctl_operations_total", "op" => "unknown", "outcome" => "unknown_operation")
                .increment(1);
            return Err(OperationError::UnknownOperation {
                name: name.to_string(),
            });
        };

        let span = info_span!(
            "operation",
            op = op.as_str(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = match op {
                DomainOp::Create => self.create(request, directory_url),
                DomainOp::Restore => self.proxy.restore(request, directory_url).await,
            };
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.kind().as_str(),
            };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            metrics::counter!("vmctl_operations_total", "op" => op.as_str(), "outcome" => outcome)
                .increment(1);

            match &result {
                Err(err) if !err.is_client_error() => {
                    tracing::warn!(op = op.as_str(), duration_ms, error = %err, "operation failed");
                }
                _ => tracing::info!(op = op.as_str(), duration_ms, outcome, "operation complete"),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn create(
        &self,
        request: &OperationRequest,
        directory_url: &str,
    ) -> Result<OperationOutcome, OperationError> {
        let config_text = request.single("config")?;
        let config = ConfigDocument::parse(config_text).map_err(|err| {
            OperationError::InvalidConfig {
                message: err.to_string(),
            }
        })?;
        self.proxy.create(&config, config_text, directory_url)
    }
}
