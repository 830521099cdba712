//! The domain directory resource and its path resolution.

use std::sync::Arc;

use vmctl_core::{DomainHandle, DomainManager};

use super::config::ServiceConfig;
use super::dispatch::OperationDispatcher;
use super::form::OperationRequest;
use super::operation::{OperationError, OperationOutcome};
use super::proxy::DomainLifecycleProxy;

// ---------------------------------------------------------------------------
// ServiceNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceNodeError {
    #[error("child '{segment}' is already registered under '{parent}'")]
    DuplicateChild { parent: String, segment: String },
}

/// A node in the resource namespace with statically registered children.
///
/// Children are added while the tree is assembled at startup and the tree is
/// shared read-only afterwards.
#[derive(Debug)]
pub struct ServiceNode {
    segment: String,
    children: Vec<Arc<ServiceNode>>,
}

impl ServiceNode {
    #[must_use]
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            children: Vec::new(),
        }
    }

    /// Registers `child`. Child segments are unique within a node.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChild` if a child with the same segment exists.
    pub fn add_child(&mut self, child: ServiceNode) -> Result<(), ServiceNodeError> {
        if self.child(&child.segment).is_some() {
            return Err(ServiceNodeError::DuplicateChild {
                parent: self.segment.clone(),
                segment: child.segment,
            });
        }
        self.children.push(Arc::new(child));
        Ok(())
    }

    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    #[must_use]
    pub fn child(&self, segment: &str) -> Option<&Arc<ServiceNode>> {
        self.children.iter().find(|c| c.segment == segment)
    }

    /// Children in registration order.
    #[must_use]
    pub fn children(&self) -> &[Arc<ServiceNode>] {
        &self.children
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// One live domain addressed under the directory. Built fresh on every
/// resolution from the manager's current answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResource {
    handle: DomainHandle,
}

impl DomainResource {
    #[must_use]
    pub fn handle(&self) -> &DomainHandle {
        &self.handle
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.handle.name
    }
}

/// What a path segment under the directory resolved to.
#[derive(Debug, Clone)]
pub enum Resolved {
    Static(Arc<ServiceNode>),
    Domain(DomainResource),
}

// ---------------------------------------------------------------------------
// DomainDirectory
// ---------------------------------------------------------------------------

/// Root resource enumerating all domains.
///
/// Holds no domain state of its own; every answer comes from the injected
/// `DomainManager`.
pub struct DomainDirectory {
    node: ServiceNode,
    proxy: Arc<DomainLifecycleProxy>,
    dispatcher: OperationDispatcher,
}

impl DomainDirectory {
    /// Builds the directory and starts its restore pool. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn new(node: ServiceNode, manager: Arc<dyn DomainManager>, config: &ServiceConfig) -> Self {
        let proxy = Arc::new(DomainLifecycleProxy::new(manager, config));
        Self {
            node,
            dispatcher: OperationDispatcher::new(Arc::clone(&proxy)),
            proxy,
        }
    }

    #[must_use]
    pub fn node(&self) -> &ServiceNode {
        &self.node
    }

    /// Resolves a child segment. Static children take precedence, so a
    /// domain named like a registered child is only reachable through
    /// listings.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when neither a child nor a live domain matches.
    pub fn resolve(&self, segment: &str) -> Result<Resolved, OperationError> {
        if let Some(child) = self.node.child(segment) {
            return Ok(Resolved::Static(Arc::clone(child)));
        }
        self.proxy
            .lookup(segment)
            .map(|handle| Resolved::Domain(DomainResource { handle }))
            .ok_or_else(|| OperationError::NotFound {
                name: segment.to_string(),
            })
    }

    /// Runs the `POST` operation named by the request.
    ///
    /// # Errors
    ///
    /// See [`OperationDispatcher::dispatch`].
    pub async fn perform(
        &self,
        request: &OperationRequest,
        directory_url: &str,
    ) -> Result<OperationOutcome, OperationError> {
        self.dispatcher.dispatch(request, directory_url).await
    }

    #[must_use]
    pub fn list_sorted(&self) -> Vec<DomainHandle> {
        self.proxy.list_sorted()
    }

    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        self.proxy.list_names()
    }

    /// Stops accepting restores and waits for running ones.
    pub async fn shutdown(&self) {
        self.proxy.shutdown().await;
    }
}
