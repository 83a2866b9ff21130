//! In-memory doubles for connector and credential exchange.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::sync::{Notify, mpsc, oneshot};

use medlink_auth::{
    CredentialRefresher, CredentialStore, ExchangeError, Exchanged, MemoryCredentialStore,
    TokenExchange,
};
use medlink_protocol::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

use crate::manager::ChannelManager;
use crate::transport::{Connector, Inbound, Link, LinkError, Outbound};
use crate::types::ManagerConfig;

/// A JWT-shaped token whose `exp` is `secs` from now.
pub(crate) fn jwt_expiring_in(secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({ "exp": Utc::now().timestamp() + secs });
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{claims}.c2ln")
}

/// Lets spawned tasks run without advancing paused time.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A connection attempt waiting for the test to accept or refuse it.
pub(crate) struct PendingOpen {
    pub(crate) url: String,
    respond: oneshot::Sender<Result<Link, LinkError>>,
}

impl PendingOpen {
    pub(crate) fn accept(self) -> ServerEnd {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.respond.send(Ok(Link {
            sender: out_tx,
            events: in_rx,
        }));
        ServerEnd {
            to_client: in_tx,
            from_client: out_rx,
        }
    }

    pub(crate) fn refuse(self) {
        let _ = self.respond.send(Err(LinkError::Closed));
    }
}

/// The server side of an accepted in-memory link.
pub(crate) struct ServerEnd {
    pub(crate) to_client: mpsc::Sender<Inbound>,
    pub(crate) from_client: mpsc::Receiver<Outbound>,
}

impl ServerEnd {
    pub(crate) async fn text(&self, text: &str) {
        let _ = self.to_client.send(Inbound::Text(text.into())).await;
    }

    pub(crate) async fn close(&self, code: u16) {
        let _ = self.to_client.send(Inbound::Closed { code }).await;
    }
}

/// Connector that hands every attempt to the test.
pub(crate) struct MockConnector {
    pending: mpsc::UnboundedSender<PendingOpen>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: String) -> BoxFuture<'_, Result<Link, LinkError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (respond, rx) = oneshot::channel();
            if self.pending.send(PendingOpen { url, respond }).is_err() {
                return Err(LinkError::Closed);
            }
            rx.await.unwrap_or(Err(LinkError::Closed))
        })
    }
}

/// Exchange double that counts calls and can be held open.
pub(crate) struct FakeExchange {
    calls: AtomicUsize,
    /// Holds the first call only.
    gate: Mutex<Option<Arc<Notify>>>,
    fail_status: Mutex<Option<u16>>,
}

impl FakeExchange {
    /// Succeeds with a token valid for an hour.
    pub(crate) fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
            fail_status: Mutex::new(None),
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        let exchange = Self::ok();
        exchange.fail_with(Some(status));
        exchange
    }

    /// The first call completes once the returned [`Notify`] is signalled.
    pub(crate) fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let exchange = Self::ok();
        *exchange.gate.lock().unwrap() = Some(gate.clone());
        (exchange, gate)
    }

    /// Makes later calls fail with `status`, or succeed again with `None`.
    pub(crate) fn fail_with(&self, status: Option<u16>) {
        *self.fail_status.lock().unwrap() = status;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenExchange for FakeExchange {
    fn exchange<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<Exchanged, ExchangeError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let fail_status = *self.fail_status.lock().unwrap();
            match fail_status {
                Some(status) => Err(ExchangeError::Status {
                    status,
                    body: "denied".into(),
                }),
                None => Ok(Exchanged {
                    access: jwt_expiring_in(3600),
                    refresh: None,
                }),
            }
        })
    }
}

/// A manager wired to in-memory doubles.
pub(crate) struct Harness {
    pub(crate) manager: ChannelManager,
    pub(crate) connector: Arc<MockConnector>,
    pub(crate) pending: mpsc::UnboundedReceiver<PendingOpen>,
    pub(crate) exchange: Arc<FakeExchange>,
    pub(crate) store: Arc<MemoryCredentialStore>,
}

impl Harness {
    pub(crate) fn new(access_token: &str, exchange: FakeExchange) -> Self {
        let store = MemoryCredentialStore::new()
            .with(ACCESS_TOKEN_KEY, access_token)
            .with(REFRESH_TOKEN_KEY, "refresh-1");
        Self::with_store(store, exchange)
    }

    /// Holds a credential that is valid for an hour.
    pub(crate) fn fresh() -> Self {
        Self::new(&jwt_expiring_in(3600), FakeExchange::ok())
    }

    pub(crate) fn without_credentials() -> Self {
        Self::with_store(MemoryCredentialStore::new(), FakeExchange::ok())
    }

    fn with_store(store: MemoryCredentialStore, exchange: FakeExchange) -> Self {
        let store = Arc::new(store);
        let exchange = Arc::new(exchange);
        let (tx, pending) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            pending: tx,
            attempts: AtomicUsize::new(0),
        });
        let refresher = Arc::new(CredentialRefresher::new(store.clone(), exchange.clone()));
        let manager = ChannelManager::new(ManagerConfig::default(), connector.clone(), refresher);
        Self {
            manager,
            connector,
            pending,
            exchange,
            store,
        }
    }

    pub(crate) async fn next_attempt(&mut self) -> PendingOpen {
        self.pending.recv().await.expect("connector dropped")
    }

    pub(crate) fn access_token(&self) -> String {
        self.store.get(ACCESS_TOKEN_KEY).unwrap_or_default()
    }
}
