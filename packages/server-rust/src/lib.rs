//! vmctl server -- HTTP domain directory in front of a `DomainManager`.
//!
//! Clients list, create, and restore domains under one directory resource.
//! Responses are S-expressions or HTML depending on the request's `Accept`
//! header; restores run on a bounded pool off the request path.

pub mod logging;
pub mod manager;
pub mod network;
pub mod render;
pub mod service;

pub use manager::InMemoryDomainManager;
pub use network::{NetworkConfig, NetworkModule};
pub use service::{DomainDirectory, ServiceConfig, ServiceNode};

#[cfg(test)]
mod test_support;
