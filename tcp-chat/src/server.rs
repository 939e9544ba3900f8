//! Accept loop and orderly shutdown.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    notice,
    registry::{ConnectionId, Registry},
    session,
};

/// How long shutdown waits for sessions to flush what is already queued to them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_registry(listener, Arc::new(Registry::new()))
    }

    pub fn with_registry(listener: TcpListener, registry: Arc<Registry>) -> Self {
        Self { listener, registry }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle on the live sessions, mostly useful for observing the server in tests.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves, then winds the sessions down.
    ///
    /// Every live session is sent a shutdown notice and given [`SHUTDOWN_GRACE`]
    /// to write out its queue and close its socket. Sessions still running after
    /// that are aborted.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        let (stop, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = registry.next_connection_id();
                        debug!(%peer, %id, "accepted connection");
                        let registry = Arc::clone(&registry);
                        sessions.spawn(serve(stream, peer, id, registry, stop_rx.clone()));
                    }
                    Err(err) => warn!(error = ?err, "failed to accept connection"),
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_exit(finished);
                }
            }
        }

        drop(listener);
        info!(sessions = sessions.len(), "server shutting down");
        registry.broadcast(&notice::shutting_down(), None).await;
        stop.send_replace(true);

        let drained = timeout(SHUTDOWN_GRACE, async {
            while let Some(finished) = sessions.join_next().await {
                log_session_exit(finished);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = sessions.len(),
                "sessions still running after grace period; aborting"
            );
            sessions.abort_all();
        }

        Ok(())
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    registry: Arc<Registry>,
    stop: watch::Receiver<bool>,
) {
    if let Err(err) = session::handle_connection(stream, id, registry, stop).await {
        warn!(%peer, %id, error = ?err, "client session ended with error");
    }
}

fn log_session_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(err) = finished {
        warn!(error = ?err, "client session task failed");
    }
}
