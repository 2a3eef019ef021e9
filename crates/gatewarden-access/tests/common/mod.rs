//! Shared fixtures for gatewarden-access integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatewarden_access::{
    AccessConfig, AccessService, Actor, InMemoryAttemptStore, InMemoryAuditStore,
    InMemoryLinkStore, LinkService, RequestOrigin,
};
use gatewarden_actuator::{ActuationError, Actuator};

/// Actuator stand-in that can be switched between healthy and failing.
#[derive(Debug, Default)]
pub struct ScriptedActuator {
    failing: AtomicBool,
    calls: AtomicU32,
}

impl ScriptedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent opens fail as if the retry budget were exhausted.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of open calls received.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Actuator for ScriptedActuator {
    async fn open(&self) -> Result<Duration, ActuationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(ActuationError::RetriesExhausted {
                attempts: 3,
                last: Box::new(ActuationError::Status(503)),
            })
        } else {
            Ok(Duration::from_millis(42))
        }
    }
}

/// Fully wired in-memory stack.
pub struct TestContext {
    pub links: Arc<InMemoryLinkStore>,
    pub attempts: Arc<InMemoryAttemptStore>,
    pub audit: Arc<InMemoryAuditStore>,
    pub actuator: Arc<ScriptedActuator>,
    pub link_service: LinkService,
    pub access: Arc<AccessService>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(AccessConfig::default())
    }

    /// Build the stack with a specific configuration, e.g. cooldown disabled.
    pub fn with_config(config: AccessConfig) -> Self {
        let links = Arc::new(InMemoryLinkStore::new());
        let attempts = Arc::new(InMemoryAttemptStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let actuator = Arc::new(ScriptedActuator::new());

        let link_service = LinkService::new(links.clone(), audit.clone(), config.clone());
        let access = Arc::new(AccessService::new(
            links.clone(),
            attempts.clone(),
            audit.clone(),
            actuator.clone(),
            config,
        ));

        Self {
            links,
            attempts,
            audit,
            actuator,
            link_service,
            access,
        }
    }

    pub fn operator() -> Actor {
        Actor {
            id: "oidc|operator-1".into(),
            name: Some("Front Desk".into()),
        }
    }

    pub fn origin() -> RequestOrigin {
        RequestOrigin {
            ip_address: Some("203.0.113.9".into()),
            user_agent: Some("gatewarden-tests/0.1".into()),
        }
    }
}
