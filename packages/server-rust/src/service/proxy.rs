//! Adapter between the directory's operations and the domain manager.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{info, warn};
use vmctl_core::{validate_domain_name, ConfigDocument, DomainHandle, DomainManager};

use super::config::ServiceConfig;
use super::form::OperationRequest;
use super::operation::{OperationError, OperationOutcome};
use super::restore::{RestorePool, RestoreTicket};

/// Characters escaped in a domain name used as a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'^')
    .add(b'|');

/// Form fields naming the saved-state source of a restore. Either name may be
/// used, but only one value in total.
const RESTORE_SOURCE_FIELDS: [&str; 2] = ["file", "state"];

/// Canonical URL of a domain: the directory URL plus the encoded name.
#[must_use]
pub fn canonical_url(directory_url: &str, name: &str) -> String {
    format!(
        "{}/{}",
        directory_url.trim_end_matches('/'),
        utf8_percent_encode(name, PATH_SEGMENT)
    )
}

/// Invokes the domain manager and translates its results into operation
/// outcomes. Manager errors never escape as anything but a summarized
/// `CreationFailed` or `RestoreFailed`.
pub struct DomainLifecycleProxy {
    manager: Arc<dyn DomainManager>,
    restores: RestorePool,
    restore_timeout: Option<Duration>,
}

impl DomainLifecycleProxy {
    /// Creates the proxy and starts its restore pool. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn new(manager: Arc<dyn DomainManager>, config: &ServiceConfig) -> Self {
        Self {
            restores: RestorePool::start(Arc::clone(&manager), config),
            manager,
            restore_timeout: config.restore_timeout,
        }
    }

    /// Creates a domain on the calling task.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the configured name cannot be a URL path
    /// segment, and `CreationFailed` with the manager's message.
    pub fn create(
        &self,
        config: &ConfigDocument,
        config_text: &str,
        directory_url: &str,
    ) -> Result<OperationOutcome, OperationError> {
        if let Some(name) = config.name() {
            validate_domain_name(name).map_err(|err| OperationError::InvalidConfig {
                message: err.to_string(),
            })?;
        }
        let handle = self.manager.create(config).map_err(|err| {
            warn!(domain = ?config.name(), error = ?err, "domain creation failed");
            OperationError::CreationFailed {
                message: err.to_string(),
            }
        })?;
        info!(domain = %handle.name, domid = handle.domid, "domain created");

        Ok(OperationOutcome::Created {
            location: canonical_url(directory_url, &handle.name),
            handle,
            config_text: config_text.to_string(),
        })
    }

    /// Validates the restore source and queues the restore without waiting.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an absent, repeated, blank, or NUL-bearing
    /// source, and `Overloaded` or `Cancelled` from the pool.
    pub fn submit_restore(
        &self,
        request: &OperationRequest,
    ) -> Result<RestoreTicket, OperationError> {
        let source = restore_source(request)?;
        self.restores.submit(source)
    }

    /// Restores a domain on the restore pool and waits for the result.
    ///
    /// # Errors
    ///
    /// Everything `submit_restore` returns, plus `RestoreFailed`,
    /// `RestoreTimedOut`, and `Cancelled` from the deferred run.
    pub async fn restore(
        &self,
        request: &OperationRequest,
        directory_url: &str,
    ) -> Result<OperationOutcome, OperationError> {
        let ticket = self.submit_restore(request)?;
        let handle = ticket.wait(self.restore_timeout).await?;
        Ok(OperationOutcome::Restored {
            location: canonical_url(directory_url, &handle.name),
            handle,
        })
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<DomainHandle> {
        self.manager.lookup_by_name(name)
    }

    /// All domains in name order, for human-readable listings.
    #[must_use]
    pub fn list_sorted(&self) -> Vec<DomainHandle> {
        self.manager.list_sorted()
    }

    /// Domain names in manager order, for structured listings.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        self.manager.list_names()
    }

    /// Stops the restore pool.
    pub async fn shutdown(&self) {
        self.restores.stop().await;
    }
}

fn restore_source(request: &OperationRequest) -> Result<&str, OperationError> {
    let mut values = RESTORE_SOURCE_FIELDS
        .iter()
        .flat_map(|field| request.values(field));
    let source = match (values.next(), values.next()) {
        (Some(source), None) => source,
        (None, _) => return Err(OperationError::missing_field("file", "required")),
        (Some(_), Some(_)) => {
            return Err(OperationError::missing_field(
                "file",
                "expected exactly one value across 'file' and 'state'",
            ))
        }
    };

    let source = source.trim();
    if source.is_empty() {
        return Err(OperationError::missing_field("file", "must not be blank"));
    }
    if source.contains('\0') {
        return Err(OperationError::missing_field("file", "must not contain NUL"));
    }
    Ok(source)
}
