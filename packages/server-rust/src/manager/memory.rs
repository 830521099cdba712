//! In-memory [`DomainManager`] implementation backed by [`DashMap`].
//!
//! Domains are bookkeeping entries only; nothing is started. Used by the test
//! server and for exercising the HTTP surface end to end.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{bail, Context};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use vmctl_core::{validate_domain_name, ConfigDocument, DomainHandle, DomainManager};

/// Memory target in MiB used when a configuration names none.
pub const DEFAULT_MEMORY_MIB: u64 = 128;

/// Domains keyed by name, with domids handed out from 1 upwards.
pub struct InMemoryDomainManager {
    domains: DashMap<String, DomainHandle>,
    next_domid: AtomicU32,
}

impl InMemoryDomainManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            domains: DashMap::new(),
            next_domid: AtomicU32::new(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for InMemoryDomainManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainManager for InMemoryDomainManager {
    fn create(&self, config: &ConfigDocument) -> anyhow::Result<DomainHandle> {
        let Some(name) = config.name() else {
            bail!("configuration has no (name ...) entry");
        };
        validate_domain_name(name)?;

        match self.domains.entry(name.to_string()) {
            Entry::Occupied(_) => bail!("Domain {name} already exists"),
            Entry::Vacant(slot) => {
                let handle = DomainHandle {
                    name: name.to_string(),
                    domid: self.next_domid.fetch_add(1, Ordering::Relaxed),
                    memory_target: config.memory().unwrap_or(DEFAULT_MEMORY_MIB),
                    ssidref: config.ssidref().unwrap_or(0),
                };
                debug!(domain = %handle.name, domid = handle.domid, "domain registered");
                slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    fn restore(&self, state_file: &str) -> anyhow::Result<DomainHandle> {
        let path = Path::new(state_file);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read saved state {}", path.display()))?;
        let config = ConfigDocument::parse(&text)
            .with_context(|| format!("saved state {} is not a configuration", path.display()))?;
        self.create(&config)
    }

    fn lookup_by_name(&self, name: &str) -> Option<DomainHandle> {
        self.domains.get(name).map(|entry| entry.value().clone())
    }

    fn list_sorted(&self) -> Vec<DomainHandle> {
        let mut domains: Vec<_> = self.domains.iter().map(|entry| entry.value().clone()).collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        domains
    }

    fn list_names(&self) -> Vec<String> {
        self.domains.iter().map(|entry| entry.key().clone()).collect()
    }
}
