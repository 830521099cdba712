use crate::config::ConfigDocument;
use crate::sxp::Sxp;

/// Read-only snapshot of a live domain returned by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    /// Unique domain name, also the last segment of its resource URL.
    pub name: String,
    /// Hypervisor-assigned numeric identifier.
    pub domid: u32,
    /// Memory target in MiB.
    pub memory_target: u64,
    /// Security label.
    pub ssidref: u32,
}

impl DomainHandle {
    /// Structured representation, e.g.
    /// `(domain (domid 1) (name test1) (memory 64) (ssidref 0))`.
    #[must_use]
    pub fn to_sxp(&self) -> Sxp {
        Sxp::list([
            Sxp::atom("domain"),
            Sxp::pair("domid", self.domid),
            Sxp::pair("name", &self.name),
            Sxp::pair("memory", self.memory_target),
            Sxp::pair("ssidref", self.ssidref),
        ])
    }
}

/// A name that cannot be the last segment of a domain's URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDomainName {
    #[error("domain name is empty")]
    Empty,
    #[error("domain name must not be '.' or '..'")]
    DotSegment,
    #[error("domain name must not contain control characters")]
    ControlCharacter,
}

/// Checks that `name` survives the round trip through a resource URL.
///
/// # Errors
///
/// Returns the first reason the name is unusable.
pub fn validate_domain_name(name: &str) -> Result<(), InvalidDomainName> {
    if name.is_empty() {
        return Err(InvalidDomainName::Empty);
    }
    if name == "." || name == ".." {
        return Err(InvalidDomainName::DotSegment);
    }
    if name.chars().any(char::is_control) {
        return Err(InvalidDomainName::ControlCharacter);
    }
    Ok(())
}

/// Lifecycle authority for domains.
///
/// Calls block for as long as the hypervisor work takes. Implementations must
/// be safe to call from several threads at once; callers add no locking.
/// Errors are opaque: callers only surface their top-level message.
pub trait DomainManager: Send + Sync {
    /// Creates and starts a domain from a configuration.
    fn create(&self, config: &ConfigDocument) -> anyhow::Result<DomainHandle>;

    /// Restores a suspended domain from a saved-state file.
    fn restore(&self, state_file: &str) -> anyhow::Result<DomainHandle>;

    fn lookup_by_name(&self, name: &str) -> Option<DomainHandle>;

    /// All live domains ordered by name.
    fn list_sorted(&self) -> Vec<DomainHandle>;

    /// Names of all live domains, in no particular order.
    fn list_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_renders_structured_form() {
        let handle = DomainHandle {
            name: "test1".to_string(),
            domid: 4,
            memory_target: 64,
            ssidref: 0,
        };
        let value = handle.to_sxp();
        assert_eq!(value.head(), Some("domain"));
        assert_eq!(value.child_value("name"), Some("test1"));
        assert_eq!(
            value.to_string(),
            "(domain (domid 4) (name test1) (memory 64) (ssidref 0))"
        );
    }

    #[test]
    fn unusable_names_are_rejected() {
        assert_eq!(validate_domain_name(""), Err(InvalidDomainName::Empty));
        assert_eq!(validate_domain_name("."), Err(InvalidDomainName::DotSegment));
        assert_eq!(validate_domain_name(".."), Err(InvalidDomainName::DotSegment));
        assert_eq!(
            validate_domain_name("a\nb"),
            Err(InvalidDomainName::ControlCharacter)
        );
        for name in ["web1", "...", "a b/c", "<x>", "%41"] {
            assert_eq!(validate_domain_name(name), Ok(()), "{name}");
        }
    }
}
