//! Test doubles shared by the unit tests of this crate.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use vmctl_core::{ConfigDocument, DomainHandle, DomainManager};

/// Blocks `FakeManager::restore` until released.
#[derive(Default)]
struct GateState {
    released: Mutex<bool>,
    cond: Condvar,
    entered: AtomicU32,
}

/// Test-side handle on a gated restore. Releases on drop so a failing test
/// never leaves a blocking thread parked.
pub(crate) struct RestoreGate {
    state: Arc<GateState>,
}

impl RestoreGate {
    pub(crate) fn release(&self) {
        *self.state.released.lock() = true;
        self.state.cond.notify_all();
    }

    /// Waits until `count` restores are parked on the gate.
    pub(crate) async fn wait_until_entered(&self, count: u32) {
        while self.state.entered.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl Drop for RestoreGate {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-process `DomainManager` that records how often it is called.
#[derive(Default)]
pub(crate) struct FakeManager {
    domains: Mutex<Vec<DomainHandle>>,
    next_domid: AtomicU32,
    gate: Option<Arc<GateState>>,
    create_error: Option<String>,
    restore_error: Option<String>,
    pub(crate) create_calls: AtomicU32,
    pub(crate) restore_calls: AtomicU32,
    pub(crate) lookup_calls: AtomicU32,
}

impl FakeManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_restore_gate() -> (Self, RestoreGate) {
        let state = Arc::new(GateState::default());
        let manager = Self {
            gate: Some(Arc::clone(&state)),
            ..Self::default()
        };
        (manager, RestoreGate { state })
    }

    pub(crate) fn with_domains(names: &[&str]) -> Self {
        let manager = Self::new();
        for name in names {
            manager.insert(name, 64);
        }
        manager
    }

    pub(crate) fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub(crate) fn failing_restore(mut self, message: &str) -> Self {
        self.restore_error = Some(message.to_string());
        self
    }

    pub(crate) fn total_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
            + self.restore_calls.load(Ordering::SeqCst)
            + self.lookup_calls.load(Ordering::SeqCst)
    }

    fn insert(&self, name: &str, memory_target: u64) -> DomainHandle {
        let handle = DomainHandle {
            name: name.to_string(),
            domid: self.next_domid.fetch_add(1, Ordering::SeqCst) + 1,
            memory_target,
            ssidref: 0,
        };
        self.domains.lock().push(handle.clone());
        handle
    }
}

impl DomainManager for FakeManager {
    fn create(&self, config: &ConfigDocument) -> anyhow::Result<DomainHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.create_error {
            anyhow::bail!("{message}");
        }
        let name = config
            .name()
            .ok_or_else(|| anyhow::anyhow!("configuration has no name"))?;
        if self.domains.lock().iter().any(|d| d.name == name) {
            anyhow::bail!("Domain {name} already exists");
        }
        Ok(self.insert(name, config.memory().unwrap_or(128)))
    }

    fn restore(&self, state_file: &str) -> anyhow::Result<DomainHandle> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.fetch_add(1, Ordering::SeqCst);
            let mut released = gate.released.lock();
            while !*released {
                gate.cond.wait(&mut released);
            }
        }
        if let Some(message) = &self.restore_error {
            anyhow::bail!("{message}");
        }
        let name = Path::new(state_file)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow::anyhow!("cannot name a domain from {state_file}"))?;
        Ok(self.insert(name, 128))
    }

    fn lookup_by_name(&self, name: &str) -> Option<DomainHandle> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.domains.lock().iter().find(|d| d.name == name).cloned()
    }

    fn list_sorted(&self) -> Vec<DomainHandle> {
        let mut domains = self.domains.lock().clone();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        domains
    }

    fn list_names(&self) -> Vec<String> {
        // Reverse insertion order, to differ from `list_sorted`.
        self.domains
            .lock()
            .iter()
            .rev()
            .map(|d| d.name.clone())
            .collect()
    }
}
