use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::client::{ConnectionConfig, ConnectionProvider};
use crate::core::error::Result;
use crate::schema::SchemaRegistry;
use crate::session::Session;

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // one bound session per factory per thread
    static CURRENT: RefCell<HashMap<u64, Session>> = RefCell::new(HashMap::new());
}

/// Opens sessions over connections handed out by a provider.
///
/// `open_session` always opens a fresh session owning its connection.
/// `current_session` binds one session to the calling thread per
/// factory and keeps handing it out until it is closed, after which the
/// next call replaces it.
pub struct SessionFactory {
    factory_id: u64,
    registry: Arc<SchemaRegistry>,
    provider: Arc<dyn ConnectionProvider>,
    config: ConnectionConfig,
    next_session_id: AtomicU64,
}

impl SessionFactory {
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<SchemaRegistry>,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory_id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            provider,
            config,
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// A fresh session owning its own connection.
    pub fn open_session(&self) -> Result<Session> {
        let client = self.provider.acquire()?;
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!("session {id} opened");
        Ok(Session::new(id, Arc::clone(&self.registry), client))
    }

    /// The session bound to the calling thread, opening one if there is
    /// none or the bound one was closed.
    pub fn current_session(&self) -> Result<Session> {
        CURRENT.with(|current| {
            let mut map = current.borrow_mut();
            if let Some(session) = map.get(&self.factory_id) {
                if !session.is_closed() {
                    return Ok(session.clone());
                }
            }
            let session = self.open_session()?;
            map.insert(self.factory_id, session.clone());
            Ok(session)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryDirectory;

    fn factory() -> SessionFactory {
        SessionFactory::new(
            ConnectionConfig::default(),
            Arc::new(SchemaRegistry::new()),
            Arc::new(MemoryDirectory::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_open_session_is_always_new() {
        let factory = factory();
        let a = factory.open_session().unwrap();
        let b = factory.open_session().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_current_session_is_thread_bound() {
        let factory = factory();
        let a = factory.current_session().unwrap();
        let b = factory.current_session().unwrap();
        assert_eq!(a.id(), b.id());

        a.close();
        let c = factory.current_session().unwrap();
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = SessionFactory::new(
            ConnectionConfig::new("http://nope"),
            Arc::new(SchemaRegistry::new()),
            Arc::new(MemoryDirectory::new()),
        );
        assert!(result.is_err());
    }
}
