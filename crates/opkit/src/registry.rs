//! Operator domains and the process-wide domain registry.
//!
//! Operators are handed to the engine grouped by domain. Plugin crates either
//! call [`register_domain`] directly or add a registrar to
//! [`DOMAIN_REGISTRARS`] so [`ensure_registered`] picks it up at startup.

use std::collections::HashMap;
use std::sync::{Arc, Once, OnceLock, PoisonError, RwLock};

use crate::error::{OpError, OpResult};
use crate::op::CustomOp;

/// Named group of custom operators.
pub struct OpDomain {
    name: String,
    ops: Vec<Arc<dyn CustomOp>>,
}

impl OpDomain {
    pub fn new(name: impl Into<String>) -> Self {
        OpDomain {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an operator; names must be unique per execution provider.
    pub fn add(&mut self, op: impl CustomOp + 'static) -> OpResult<()> {
        self.add_shared(Arc::new(op))
    }

    pub fn add_shared(&mut self, op: Arc<dyn CustomOp>) -> OpResult<()> {
        let duplicate = self.ops.iter().any(|existing| {
            existing.name() == op.name()
                && existing.execution_provider() == op.execution_provider()
        });
        if duplicate {
            return Err(OpError::registration(format!(
                "domain `{}` already has an operator named `{}` for {}",
                self.name,
                op.name(),
                op.execution_provider()
            )));
        }
        log::debug!("domain {}: added operator {}", self.name, op.name());
        self.ops.push(op);
        Ok(())
    }

    pub fn ops(&self) -> &[Arc<dyn CustomOp>] {
        &self.ops
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn CustomOp>> {
        self.ops.iter().find(|op| op.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl std::fmt::Debug for OpDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.ops.iter().map(|op| op.name()).collect();
        f.debug_struct("OpDomain")
            .field("name", &self.name)
            .field("ops", &names)
            .finish()
    }
}

/// Link-time registrars run by [`ensure_registered`].
#[linkme::distributed_slice]
pub static DOMAIN_REGISTRARS: [fn()] = [..];

struct DomainRegistry {
    domains: RwLock<HashMap<String, Arc<OpDomain>>>,
}

impl DomainRegistry {
    fn new() -> Self {
        Self {
            domains: RwLock::new(HashMap::new()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<DomainRegistry> = OnceLock::new();

fn global_registry() -> &'static DomainRegistry {
    GLOBAL_REGISTRY.get_or_init(DomainRegistry::new)
}

/// Publishes a domain, replacing any earlier domain with the same name.
pub fn register_domain(domain: OpDomain) -> Arc<OpDomain> {
    let domain = Arc::new(domain);
    let previous = global_registry()
        .domains
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(domain.name().to_string(), Arc::clone(&domain));
    if previous.is_some() {
        log::warn!("replaced previously registered domain {}", domain.name());
    } else {
        log::debug!("registered domain {} ({} ops)", domain.name(), domain.len());
    }
    domain
}

pub fn domain(name: &str) -> Option<Arc<OpDomain>> {
    global_registry()
        .domains
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
}

/// Names of every registered domain, sorted.
pub fn list_domains() -> Vec<String> {
    let mut names: Vec<String> = global_registry()
        .domains
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

pub fn find_op(domain_name: &str, op_name: &str) -> Option<Arc<dyn CustomOp>> {
    domain(domain_name)?.find(op_name)
}

/// Runs every link-time registrar once per process.
pub fn ensure_registered() {
    static REGISTERED: Once = Once::new();
    REGISTERED.call_once(|| {
        log::debug!("running {} domain registrars", DOMAIN_REGISTRARS.len());
        for registrar in DOMAIN_REGISTRARS {
            registrar();
        }
    });
}
