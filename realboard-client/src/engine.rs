//! Wiring root for the client engine.
//!
//! Owns the store, the user directory, the transport and the two
//! mutation paths (action executor for the local user, reconciler for
//! everyone else). The embedding application starts it, then drives
//! `run()` on its event loop and reads `snapshot()` for rendering.

use std::sync::Arc;

use realboard_core::events::{RoomContext, ServerEvent};
use realboard_core::store::BoardStore;
use realboard_core::types::{BoardSnapshot, UserIdentity};
use tokio::sync::mpsc;

use crate::actions::ActionExecutor;
use crate::api::{ApiError, BoardApi};
use crate::config::ClientConfig;
use crate::directory::UserDirectory;
use crate::loader;
use crate::reconciler::Reconciler;
use crate::transport::{RealtimeTransport, TransportError, TransportEvent};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct BoardEngine<A: BoardApi> {
    api: Arc<A>,
    store: Arc<BoardStore>,
    directory: Arc<UserDirectory>,
    actions: ActionExecutor<A>,
    reconciler: Reconciler<A>,
    transport: RealtimeTransport,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    board_id: String,
    /// Fresh per engine instance; scopes session-addressed broadcasts
    /// (chat, notifications) to this client.
    session_id: String,
}

impl<A: BoardApi> BoardEngine<A> {
    pub fn new(
        api: A,
        config: &ClientConfig,
        board_id: impl Into<String>,
        local_user: UserIdentity,
    ) -> Self {
        let api = Arc::new(api);
        let board_id = board_id.into();
        let store = Arc::new(BoardStore::new(config.move_grace()));
        let directory = Arc::new(UserDirectory::new());
        // The local user never needs a directory round-trip.
        directory.insert(local_user.clone());

        let actions = ActionExecutor::new(
            api.clone(),
            store.clone(),
            directory.clone(),
            board_id.clone(),
            local_user.clone(),
        );
        let reconciler = Reconciler::new(
            api.clone(),
            store.clone(),
            directory.clone(),
            board_id.clone(),
            local_user.id.clone(),
        );
        let mut transport =
            RealtimeTransport::new(config.realtime_url.clone(), config.reconnect_policy());
        let event_rx = transport.take_event_rx();

        Self {
            api,
            store,
            directory,
            actions,
            reconciler,
            transport,
            event_rx,
            board_id,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Connect the realtime transport and perform the initial full load.
    /// The blocking loading indicator is shown only here.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.transport
            .connect(RoomContext {
                board_id: Some(self.board_id.clone()),
                workspace_id: None,
                session_id: Some(self.session_id.clone()),
            })
            .await?;
        loader::load_lanes(self.api.as_ref(), &self.store, &self.board_id).await?;
        loader::load_cards(
            self.api.as_ref(),
            &self.store,
            &self.directory,
            &self.board_id,
            true,
        )
        .await?;
        Ok(())
    }

    /// Consume transport events until the connection closes for good.
    /// Reconnection triggers a catch-up reload (lanes before cards),
    /// since nothing is replayed for the outage window.
    pub async fn run(&mut self) {
        let Some(mut rx) = self.event_rx.take() else {
            log::error!("[engine] run() called twice, event stream already consumed");
            return;
        };
        let mut first_connect = true;
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Connected => {
                    if first_connect {
                        first_connect = false;
                    } else {
                        log::info!("[engine] Reconnected, reloading board");
                        self.reconciler.reload_lanes_then_cards().await;
                    }
                }
                TransportEvent::Disconnected => {
                    log::warn!("[engine] Realtime connection lost");
                }
                TransportEvent::Event(e) => self.reconciler.handle(e).await,
            }
        }
    }

    /// Subscribe to the events the board store does not own (chat
    /// messages, notifications).
    pub fn app_events(&mut self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.reconciler.set_app_channel(tx);
        rx
    }

    /// Action surface for the UI layer.
    pub fn actions(&self) -> &ActionExecutor<A> {
        &self.actions
    }

    pub fn transport(&self) -> &RealtimeTransport {
        &self.transport
    }

    /// Reset session-scoped caches (test/session-boundary hook).
    pub fn reset_directory(&self) {
        self.directory.reset();
    }

    /// Cloned read surface for rendering.
    pub fn snapshot(&self) -> BoardSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }
}
