//! Acknowledgement related types and functions.
//!
//! Here are the main types:
//!
//! - [`AckSender`]: handed to a message handler when the client expects an acknowledgement.
//!   Only its first use writes an ACK packet.
//! - [`AckFuture`]: a [`Future`] resolving with the data acknowledged by the client for an
//!   event emitted with [`Socket::emit_with_ack_future`].
use std::{
    fmt,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use futures_core::{FusedFuture, Future};
use serde::Serialize;
use socketbus_core::{Value, packet::Packet};
use tokio::{sync::oneshot::Receiver, time::Timeout};

use crate::{
    adapter::{Adapter, LocalAdapter},
    client::Outgoing,
    errors::{AckError, SendError},
    socket::{Socket, into_args},
};

/// A callback registered for an emitted event, consumed by the matching ACK packet.
pub(crate) type BoxedAckCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// Sends the acknowledgement of one received event.
///
/// All the clones of an [`AckSender`] share the same guard: only the first call to
/// [`AckSender::send`] writes an ACK packet, the next ones are no-ops.
pub struct AckSender<A: Adapter = LocalAdapter> {
    socket: Arc<Socket<A>>,
    ack_id: i64,
    sent: Arc<AtomicBool>,
}

impl<A: Adapter> AckSender<A> {
    pub(crate) fn new(socket: Arc<Socket<A>>, ack_id: i64) -> Self {
        Self {
            socket,
            ack_id,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acknowledge the event with the given data.
    ///
    /// A serialized array is sent as positional arguments, any other value as a single argument.
    pub fn send<T: ?Sized + Serialize>(&self, data: &T) -> Result<(), SendError> {
        let data = into_args(data)?;
        if self.sent.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "tracing")]
            tracing::debug!(ack_id = self.ack_id, "ack already sent, ignoring");
            return Ok(());
        }
        let packet = Packet::ack(self.socket.ns.path.clone(), data, self.ack_id);
        self.socket.packet(Outgoing::Packet(packet), false)
    }

    /// The ack id of the event being acknowledged.
    pub fn id(&self) -> i64 {
        self.ack_id
    }

    /// Returns true if the acknowledgement was already sent.
    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

impl<A: Adapter> Clone for AckSender<A> {
    fn clone(&self) -> Self {
        Self {
            socket: self.socket.clone(),
            ack_id: self.ack_id,
            sent: self.sent.clone(),
        }
    }
}

impl<A: Adapter> fmt::Debug for AckSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("sid", &self.socket.id)
            .field("ack_id", &self.ack_id)
            .field("sent", &self.is_sent())
            .finish()
    }
}

pin_project_lite::pin_project! {
    /// A [`Future`] of the data acknowledged by the client.
    ///
    /// It yields an [`AckError::Timeout`] if the client does not answer before the configured
    /// `ack_timeout` and an [`AckError::Closed`] if the socket is disconnected first.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct AckFuture {
        #[pin]
        inner: Timeout<Receiver<Vec<Value>>>,
        done: bool,
    }
}

impl AckFuture {
    pub(crate) fn new(rx: Receiver<Vec<Value>>, timeout: Duration) -> Self {
        Self {
            inner: tokio::time::timeout(timeout, rx),
            done: false,
        }
    }
}

impl Future for AckFuture {
    type Output = Result<Vec<Value>, AckError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let project = self.project();
        match project.inner.poll(cx) {
            Poll::Ready(v) => {
                *project.done = true;
                let v = match v {
                    Ok(Ok(v)) => Ok(v),
                    Ok(Err(_)) => Err(AckError::Closed),
                    Err(_) => Err(AckError::Timeout),
                };
                Poll::Ready(v)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedFuture for AckFuture {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl fmt::Debug for AckFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckFuture").field("done", &self.done).finish()
    }
}
