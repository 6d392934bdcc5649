//! Per-connection handler: join handshake, then the active loop.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Finish the transport handshake (WebSocket upgrade, or nothing)
//!   2. Read the join unit → display name
//!   3. Register the session and announce it
//!   4. Loop: relay inbound units, feed the writer task, probe and time out
//!   5. Evict (idempotent), let the writer drain, release the socket

use std::sync::Arc;
use std::time::Duration;

use paizer_protocol::{Inbound, Message, SessionId, WireCodec, codec_for};
use paizer_session::{Outbound, OutboundReceiver, Outlet, Session};
use paizer_transport::{
    Connection, FrameReader, FrameWriter, Incoming, TransportError, TransportKind,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::{Departure, PaizerError, Relay};

/// How long a departed connection's writer may keep flushing before the
/// socket is dropped outright.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What the read task reports back to the handler.
enum ReadEvent {
    Unit(Vec<u8>),
    Closed,
    Failed(TransportError),
}

/// Handles a single connection from accept to close.
///
/// Returns `Err` only when the join handshake failed; in that case no
/// session was ever created. Once a session exists, every way out of the
/// active loop is a normal departure and yields `Ok(())`.
pub(crate) async fn handle_connection<I: Incoming>(
    incoming: I,
    relay: Arc<Relay>,
) -> Result<(), PaizerError> {
    let peer = incoming.peer_addr();
    let handshake_timeout = relay.config().handshake_timeout;

    let conn = match time::timeout(handshake_timeout, incoming.establish()).await {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(PaizerError::Handshake(
                "timed out during transport handshake".into(),
            ));
        }
    };

    let kind = conn.kind();
    let codec = codec_for(kind);
    let (mut reader, mut writer) = conn.into_split();
    tracing::debug!(%peer, transport = %kind, "connection established");

    let name = match time::timeout(handshake_timeout, read_join(&mut reader, codec.as_ref()))
        .await
    {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            let _ = writer.close().await;
            return Err(e);
        }
        Err(_) => {
            let _ = writer.close().await;
            return Err(PaizerError::Handshake("timed out waiting for join".into()));
        }
    };

    let (outlet, outbox) = Outlet::new(Arc::clone(&codec));
    let address = peer.ip().to_canonical().to_string();
    let session = Arc::new(Session::new(relay.next_id(), name, address, outlet));
    let id = session.id();

    if let Err(e) = relay.admit(Arc::clone(&session)).await {
        let _ = writer.close().await;
        return Err(e);
    }

    let (cause, mut write_task) =
        run_active(&relay, &session, codec.as_ref(), reader, writer, outbox).await;

    relay.evict(id, cause).await;
    // Let the writer flush and close; a peer that stopped reading gets cut off.
    if time::timeout(CLOSE_GRACE, &mut write_task).await.is_err() {
        write_task.abort();
        tracing::debug!(%id, "writer still blocked, connection dropped");
    }
    tracing::debug!(%id, %cause, "connection released");
    Ok(())
}

/// Reads and decodes the first unit on the connection.
async fn read_join<R: FrameReader>(
    reader: &mut R,
    codec: &dyn WireCodec,
) -> Result<String, PaizerError> {
    match reader.recv().await? {
        Some(unit) => codec
            .decode_join(&unit)
            .map_err(|e| PaizerError::Handshake(e.to_string())),
        None => Err(PaizerError::Handshake(
            "connection closed before join".into(),
        )),
    }
}

/// Runs until the session departs and reports why, handing back the
/// writer task so the caller can let it drain after the eviction.
///
/// Reads and writes each happen on their own task. Line reads are not
/// cancel-safe, and a write to a peer that stopped reading can block
/// indefinitely; neither may hold up the timers or an eviction, so the
/// `select!` below only ever waits on channels and timers.
async fn run_active<R: FrameReader, W: FrameWriter>(
    relay: &Relay,
    session: &Session,
    codec: &dyn WireCodec,
    reader: R,
    writer: W,
    mut outbox: OutboundReceiver,
) -> (Departure, JoinHandle<()>) {
    let config = relay.config();
    let id = session.id();

    let (event_tx, mut events) = mpsc::channel(32);
    let read_task = tokio::spawn(read_loop(reader, event_tx));

    let (frames, frame_rx) = mpsc::unbounded_channel();
    let (stalled_tx, mut stalled) = oneshot::channel();
    let write_task = tokio::spawn(write_loop(
        id,
        writer,
        frame_rx,
        config.idle_timeout,
        stalled_tx,
    ));

    // Only raw stream clients are probed and timed out locally. WebSocket
    // clients rely on their own heartbeats and the monitor sweep.
    let raw = session.kind() == TransportKind::RawStream;
    let mut probe = raw.then(|| {
        let mut ticker =
            time::interval_at(Instant::now() + config.probe_interval, config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let idle = time::sleep(config.idle_timeout);
    tokio::pin!(idle);

    let cause = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ReadEvent::Unit(unit)) => {
                    if raw {
                        idle.as_mut().reset(Instant::now() + config.idle_timeout);
                    }
                    on_unit(relay, session, codec, &unit).await;
                }
                Some(ReadEvent::Failed(e)) => {
                    tracing::debug!(%id, error = %e, "read failed");
                    break Departure::ReadFailed;
                }
                Some(ReadEvent::Closed) | None => break Departure::PeerClosed,
            },

            item = outbox.recv() => match item {
                Some(Outbound::Frame(bytes)) => {
                    if frames.send(bytes).is_err() {
                        break Departure::WriteFailed;
                    }
                }
                Some(Outbound::Close) | None => break Departure::Evicted,
            },

            // The writer only ever exits early after a failed write.
            _ = &mut stalled => break Departure::WriteFailed,

            () = maybe_tick(&mut probe) => match codec.encode(&Message::heartbeat()) {
                Ok(bytes) => {
                    if frames.send(bytes).is_err() {
                        break Departure::WriteFailed;
                    }
                }
                Err(e) => {
                    tracing::debug!(%id, error = %e, "heartbeat probe could not be encoded");
                    break Departure::WriteFailed;
                }
            },

            () = &mut idle, if raw => {
                tracing::info!(
                    %id,
                    user = session.name(),
                    ip = %session.short_address(),
                    "heartbeat timeout"
                );
                break Departure::IdleTimeout;
            }
        }
    };

    read_task.abort();
    // Dropping the sender lets the writer drain what is queued, then close.
    drop(frames);
    (cause, write_task)
}

/// Applies one inbound unit from an active session.
async fn on_unit(relay: &Relay, session: &Session, codec: &dyn WireCodec, unit: &[u8]) {
    match codec.decode(unit) {
        Ok(Inbound::Heartbeat) => {
            session.touch();
            tracing::trace!(id = %session.id(), "heartbeat");
        }
        Ok(Inbound::Chat(text)) => {
            session.touch();
            if !text.is_empty() {
                relay.relay_chat(session, &text).await;
            }
        }
        Err(e) => {
            tracing::debug!(id = %session.id(), error = %e, "dropping undecodable unit");
        }
    }
}

/// Ticks the interval if there is one, otherwise never completes.
async fn maybe_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn read_loop<R: FrameReader>(mut reader: R, events: mpsc::Sender<ReadEvent>) {
    loop {
        let event = match reader.recv().await {
            Ok(Some(unit)) => ReadEvent::Unit(unit),
            Ok(None) => ReadEvent::Closed,
            Err(e) => ReadEvent::Failed(e),
        };
        let last = !matches!(event, ReadEvent::Unit(_));
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

/// Writes queued units to the peer until the queue closes, then closes
/// the connection.
///
/// A single write that makes no progress for `stall_limit` counts as a
/// failed write, as does a transport error. Either is reported once on
/// `stalled` and ends the task.
async fn write_loop<W: FrameWriter>(
    id: SessionId,
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    stall_limit: Duration,
    stalled: oneshot::Sender<()>,
) {
    while let Some(bytes) = frames.recv().await {
        match time::timeout(stall_limit, writer.send(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(%id, error = %e, "write failed");
                let _ = stalled.send(());
                return;
            }
            Err(_) => {
                tracing::debug!(%id, ?stall_limit, "write stalled");
                let _ = stalled.send(());
                return;
            }
        }
    }
    if let Err(e) = writer.close().await {
        tracing::trace!(%id, error = %e, "close after departure failed");
    }
}
