//! Dispatch strategies: how admitted work is pulled off a group's
//! priority channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::limit::channel::{self, PriorityPorts, RequestPayload};
use crate::signal::Signal;

/// The quota a group dispatcher enforces.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Strategy {
    /// At most one dispatch per `T`, with no cap on overlap.
    Interval(Duration),
    /// At most `N` responders in flight, with no pacing.
    MaxConcurrent(usize),
}

impl Strategy {
    /// Build a priority channel and start this strategy's dispatcher on
    /// it. Everything spawned here exits when `close` fires.
    pub(crate) fn start(self, close: &Signal) -> PriorityPorts {
        let (ports, out) = channel::channel(close.clone());
        match self {
            Self::Interval(period) => spawn_interval_dispatcher(out, close.clone(), period),
            Self::MaxConcurrent(limit) => spawn_workers(out, close.clone(), limit),
        }
        ports
    }
}

/// One non-blocking take per tick: the start rate never exceeds `1/period`
/// regardless of response latency. A tick with no work is forfeited rather
/// than accumulated, and abandoned payloads are skipped without consuming
/// the tick, so a burst of cancellations cannot stall the next live
/// request.
fn spawn_interval_dispatcher(
    mut out: mpsc::Receiver<RequestPayload>,
    close: Signal,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = close.fired() => return,
                _ = ticks.tick() => {}
            }
            loop {
                match out.try_recv() {
                    Ok(payload) if payload.reply.is_closed() => {
                        // Let the pump move the next queued item up.
                        tokio::task::yield_now().await;
                    }
                    Ok(payload) => {
                        tokio::spawn(async move {
                            let result = payload.responder.await;
                            let _ = payload.reply.send(result);
                        });
                        break;
                    }
                    Err(_) => break,
                }
            }
        }
    });
}

/// `limit` workers loop over the shared output port, each running one
/// responder to completion before taking the next: exactly at most `limit`
/// round trips in flight.
fn spawn_workers(out: mpsc::Receiver<RequestPayload>, close: Signal, limit: usize) {
    let out = Arc::new(tokio::sync::Mutex::new(out));
    for _ in 0..limit.max(1) {
        let out = Arc::clone(&out);
        let close = close.clone();
        tokio::spawn(async move {
            loop {
                let payload = {
                    let mut out = out.lock().await;
                    tokio::select! {
                        () = close.fired() => return,
                        payload = out.recv() => match payload {
                            Some(payload) => payload,
                            None => return,
                        },
                    }
                };
                if payload.reply.is_closed() {
                    continue;
                }
                let result = payload.responder.await;
                let _ = payload.reply.send(result);
            }
        });
    }
}
