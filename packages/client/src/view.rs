//! Session view lifecycle.
//!
//! A [`SessionView`] is created when the user enters a session and consumed
//! when they leave. It owns the connection manager, the state store and the
//! action gateway of that session; nothing is shared across views.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{broadcast, watch};

use crate::{
    api::SessionApi,
    config::SyncConfig,
    connection::{ConnectionEvent, ConnectionManager, PushChannel},
    error::ClientError,
    gateway::ActionGateway,
    store::{SessionSnapshot, SessionStore},
};

/// Live state and actions of one mounted session.
pub struct SessionView {
    store: Arc<SessionStore>,
    connection: ConnectionManager,
    gateway: Arc<ActionGateway>,
    mounted: Arc<AtomicBool>,
}

impl SessionView {
    /// Mount the view: connect the push channel and start the initial comment fetch.
    pub fn mount(
        config: SyncConfig,
        api: Arc<dyn SessionApi>,
        session_id: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let session_id = session_id.into();
        tracing::info!("Mounting session view '{}'", session_id);

        let store = Arc::new(SessionStore::new(session_id));
        let push = PushChannel::new();
        let mounted = Arc::new(AtomicBool::new(true));
        let gateway = Arc::new(ActionGateway::new(
            api,
            store.clone(),
            push.clone(),
            mounted.clone(),
        ));

        let mut connection = ConnectionManager::new(config, store.clone(), push);
        connection.connect()?;

        tokio::spawn({
            let gateway = gateway.clone();
            async move {
                match gateway.load_comments().await {
                    Ok(count) => tracing::debug!("Initial fetch returned {} comments", count),
                    Err(ClientError::Unmounted) => {}
                    // Also recorded as `comments_error` in the snapshot.
                    Err(e) => tracing::warn!("Failed to load comments: {}", e),
                }
            }
        });

        Ok(Self {
            store,
            connection,
            gateway,
            mounted,
        })
    }

    pub fn session_id(&self) -> &str {
        self.gateway.session_id()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    /// Receiver that changes whenever the session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    pub fn gateway(&self) -> Arc<ActionGateway> {
        self.gateway.clone()
    }

    /// Manual reconnect trigger, e.g. after retries were exhausted.
    ///
    /// Does nothing while a connection is still active.
    pub fn reconnect(&mut self) -> Result<bool, ClientError> {
        self.connection.connect()
    }

    /// Tear the view down.
    ///
    /// REST calls still running may complete, but their results are no
    /// longer applied.
    pub async fn unmount(mut self) {
        tracing::info!("Unmounting session view '{}'", self.session_id());
        self.mounted.store(false, Ordering::Release);
        self.connection.disconnect().await;
    }
}

impl Drop for SessionView {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::Release);
    }
}
