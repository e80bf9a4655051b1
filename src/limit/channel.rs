//! The priority channel: three input ports merged onto one output stream,
//! biased towards higher classes.

use std::fmt;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::limit::Priority;
use crate::signal::Signal;
use crate::types::{Response, Result};

/// One enqueued unit of work: a thunk performing the inner round trip and
/// a single-use reply channel for its result.
///
/// A caller that gives up (cancellation, limiter close) simply drops its
/// reply receiver; dispatchers detect that through
/// [`oneshot::Sender::is_closed`] and skip the payload without spending a
/// slot on it.
pub(crate) struct RequestPayload {
    pub(crate) responder: BoxFuture<'static, Result<Response>>,
    pub(crate) reply: oneshot::Sender<Result<Response>>,
}

impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPayload")
            .field("abandoned", &self.reply.is_closed())
            .finish_non_exhaustive()
    }
}

/// The input side of a priority channel.
#[derive(Debug, Clone)]
pub(crate) struct PriorityPorts {
    high: mpsc::Sender<RequestPayload>,
    normal: mpsc::Sender<RequestPayload>,
    low: mpsc::Sender<RequestPayload>,
}

impl PriorityPorts {
    pub(crate) fn port(&self, priority: Priority) -> &mpsc::Sender<RequestPayload> {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }
}

/// Create a priority channel whose pump task runs until `close` fires.
///
/// Closing is a signal, not a stream mutation: the ports stay usable for
/// late senders (their items are simply never forwarded), which keeps
/// close free of send-after-close panics.
pub(crate) fn channel(close: Signal) -> (PriorityPorts, mpsc::Receiver<RequestPayload>) {
    let (high_tx, high_rx) = mpsc::channel(1);
    let (normal_tx, normal_rx) = mpsc::channel(1);
    let (low_tx, low_rx) = mpsc::channel(1);
    let (out_tx, out_rx) = mpsc::channel(1);

    tokio::spawn(pump(high_rx, normal_rx, low_rx, out_tx, close));

    let ports = PriorityPorts {
        high: high_tx,
        normal: normal_tx,
        low: low_tx,
    };
    (ports, out_rx)
}

/// Three-phase merge loop with decreasing selectivity.
///
/// Phases 1 and 2 are non-blocking fast paths that keep high-priority
/// items ahead of lower ones when both are ready; phase 3 blocks on all
/// classes so nothing starves when the fast paths come up empty. Tie-break
/// between equally ready classes in phase 3 is whatever `select!` picks.
async fn pump(
    mut high: mpsc::Receiver<RequestPayload>,
    mut normal: mpsc::Receiver<RequestPayload>,
    mut low: mpsc::Receiver<RequestPayload>,
    out: mpsc::Sender<RequestPayload>,
    close: Signal,
) {
    loop {
        if close.is_fired() {
            return;
        }
        // Phase 1: high only.
        if let Ok(item) = high.try_recv() {
            if !forward(&out, &close, item).await {
                return;
            }
        }

        // Phase 2: high or normal.
        let item = high.try_recv().ok().or_else(|| normal.try_recv().ok());
        if let Some(item) = item {
            if !forward(&out, &close, item).await {
                return;
            }
        }

        // Phase 3: any class, blocking.
        let item = tokio::select! {
            () = close.fired() => return,
            item = high.recv() => item,
            item = normal.recv() => item,
            item = low.recv() => item,
        };
        match item {
            Some(item) => {
                if !forward(&out, &close, item).await {
                    return;
                }
            }
            None => return,
        }
    }
}

async fn forward(out: &mpsc::Sender<RequestPayload>, close: &Signal, item: RequestPayload) -> bool {
    tokio::select! {
        sent = out.send(item) => sent.is_ok(),
        () = close.fired() => false,
    }
}
