//! Per-connection lifecycle: read a username, register, relay, clean up.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
    sync::{mpsc, watch},
};
use tracing::{debug, info};

use crate::{
    line::{read_line, write_line},
    notice,
    registry::{ConnectionId, Registry, SessionHandle},
};

/// How the receive loop came to an end.
#[derive(Debug, PartialEq, Eq)]
enum ReceiveEnd {
    /// EOF or a read error from the client.
    Disconnected,
    /// The server is shutting down.
    ShuttingDown,
}

pub async fn handle_connection(
    stream: TcpStream,
    id: ConnectionId,
    registry: Arc<Registry>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    run_session(BufReader::new(reader), writer, id, registry, shutdown).await
}

/// Drives one session over an already-split stream.
///
/// The first line is taken as the username. The receive loop runs on the
/// calling task while the send loop gets a task of its own. After a client
/// disconnects, the send loop finishes on its own once its queue drains.
/// When `shutdown` flips to `true` the session deregisters and waits for the
/// send loop, so anything already queued still reaches the client.
pub async fn run_session<R, W>(
    mut reader: R,
    writer: W,
    id: ConnectionId,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let first_line = select! {
        read = read_line(&mut reader) => read.context("failed to read username")?,
        () = stopping(&mut shutdown) => return Ok(()),
    };
    let Some(username) = first_line else {
        debug!(%id, "connection closed before a username was sent");
        return Ok(());
    };

    let SessionHandle {
        id,
        username,
        outgoing,
    } = registry.add(id, username).await?;

    info!(%id, %username, "client joined");
    registry
        .broadcast(&notice::joined(&username, id), Some(id))
        .await;

    let send_loop = tokio::spawn(run_send_loop(writer, outgoing, id));
    match run_receive_loop(&mut reader, &registry, id, &username, &mut shutdown).await {
        ReceiveEnd::Disconnected => close_session(&registry, id, &username).await,
        ReceiveEnd::ShuttingDown => {
            registry.remove(id).await;
            if let Err(error) = send_loop.await {
                debug!(%id, ?error, "send loop did not finish cleanly");
            }
        }
    }

    Ok(())
}

async fn run_receive_loop<R>(
    reader: &mut R,
    registry: &Registry,
    id: ConnectionId,
    username: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> ReceiveEnd
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let read = select! {
            read = read_line(reader) => read,
            () = stopping(shutdown) => return ReceiveEnd::ShuttingDown,
        };

        match read {
            Ok(Some(message)) => {
                let delivery = registry
                    .broadcast(&notice::chat(username, &message), Some(id))
                    .await;
                if delivery.dropped > 0 {
                    debug!(%id, dropped = delivery.dropped, "slow recipients missed a message");
                }
            }
            Ok(None) => {
                debug!(%id, "client closed the connection");
                return ReceiveEnd::Disconnected;
            }
            Err(error) => {
                debug!(%id, ?error, "failed to read from client");
                return ReceiveEnd::Disconnected;
            }
        }
    }
}

/// Resolves once shutdown is flagged, or once the server side is gone.
async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

async fn run_send_loop<W>(mut writer: W, mut outgoing: mpsc::Receiver<String>, id: ConnectionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outgoing.recv().await {
        if let Err(error) = write_line(&mut writer, &line).await {
            debug!(%id, ?error, "failed to deliver message to client");
            return;
        }
    }

    if let Err(error) = writer.shutdown().await {
        debug!(%id, ?error, "failed to shut down client writer");
    }
}

async fn close_session(registry: &Registry, id: ConnectionId, username: &str) {
    registry
        .broadcast(&notice::left(username, id), Some(id))
        .await;
    if registry.remove(id).await.is_some() {
        info!(%id, %username, "client disconnected");
    }
}
