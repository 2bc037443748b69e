//! Module contract and the shared context modules initialize against

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::events::EventBus;
use crate::notify::Notifier;
use crate::router::Router;
use crate::storage::Storage;

/// Optional service a module may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Storage,
    Router,
    Notifier,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Storage => "storage",
            Capability::Router => "router",
            Capability::Notifier => "notifier",
        };
        f.write_str(name)
    }
}

/// The optional services, resolved once at startup
#[derive(Clone, Default)]
pub struct Capabilities {
    pub storage: Option<Arc<Storage>>,
    pub router: Option<Router>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Capabilities {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Storage => self.storage.is_some(),
            Capability::Router => self.router.is_some(),
            Capability::Notifier => self.notifier.is_some(),
        }
    }
}

/// Everything a module sees during `init`
#[derive(Clone)]
pub struct AppContext {
    pub bus: EventBus,
    pub config: Config,
    pub capabilities: Capabilities,
}

impl AppContext {
    pub fn storage(&self) -> eyre::Result<Arc<Storage>> {
        self.capabilities
            .storage
            .clone()
            .ok_or_else(|| eyre::eyre!("storage is not available"))
    }

    pub fn router(&self) -> eyre::Result<Router> {
        self.capabilities
            .router
            .clone()
            .ok_or_else(|| eyre::eyre!("router is not available"))
    }

    pub fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        self.capabilities.notifier.clone()
    }
}

/// A feature module initialized by the bootstrapper
///
/// Modules wire themselves up in `init` (load their data, subscribe to
/// events) and talk to each other only through the bus afterwards.
#[async_trait]
pub trait AppModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Capabilities without which the module is skipped
    fn requires(&self) -> &'static [Capability] {
        &[]
    }

    async fn init(&self, ctx: &AppContext) -> eyre::Result<()>;
}
