//! Domain directory operations.
//!
//! 1. **Requests** (`form`): merged query and body fields
//! 2. **Dispatch** (`dispatch`): `op` field -> [`DomainOp`] handler
//! 3. **Proxy** (`proxy`): calls into the `DomainManager`, builds Locations
//! 4. **Restores** (`restore`, `worker`): bounded deferred execution
//! 5. **Directory** (`directory`): path resolution under the directory node

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod form;
pub mod operation;
pub mod proxy;
pub mod restore;
pub mod worker;

pub use config::ServiceConfig;
pub use directory::{DomainDirectory, DomainResource, Resolved, ServiceNode, ServiceNodeError};
pub use dispatch::OperationDispatcher;
pub use form::OperationRequest;
pub use operation::{DomainOp, ErrorKind, OperationError, OperationOutcome};
pub use proxy::{canonical_url, DomainLifecycleProxy};
pub use restore::{RestorePool, RestoreTicket};
pub use worker::{BackgroundRunnable, BackgroundWorker, SubmitError};
