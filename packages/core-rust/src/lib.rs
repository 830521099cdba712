//! `vmctl` core — S-expression codec, domain configuration documents, and the
//! domain manager seam.

pub mod config;
pub mod domain;
pub mod sxp;

pub use config::ConfigDocument;
pub use domain::{validate_domain_name, DomainHandle, DomainManager, InvalidDomainName};
pub use sxp::{ParseError, Sxp};
