//! Streaming delivery adapter.
//!
//! Turns a [`Generator::stream`] call into an ordered sequence of
//! [`DeliveryEvent`]s: zero or more `delta`s followed by exactly one
//! terminal `done` or `error`.
//!
//! The generator runs as a spawned producer writing fragments into a
//! bounded channel. The adapter forwards each fragment as a `delta`, then
//! inspects how the producer finished to pick the terminal event. If the
//! consumer goes away, the producer task is aborted, which drops the
//! in-flight provider request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::generation::Generator;

/// Fragments buffered between the generator and the adapter.
pub const FRAGMENT_BUFFER: usize = 32;
/// Events buffered between the adapter and the transport.
pub const EVENT_BUFFER: usize = 32;

/// One unit of a streamed response.
///
/// Serialized as `{"type":"delta","data":"..."}`, `{"type":"done"}`, or
/// `{"type":"error","data":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum DeliveryEvent {
    Delta(String),
    Done,
    Error(String),
}

impl DeliveryEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryEvent::Delta(_))
    }
}

/// Stream `prompt` through `generator`, returning the event receiver.
///
/// Must be called inside a tokio runtime.
pub fn deliver(generator: Arc<dyn Generator>, prompt: String) -> mpsc::Receiver<DeliveryEvent> {
    let (events, receiver) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(run_adapter(generator, prompt, events));
    receiver
}

/// A finished stream carrying a single `delta` and `done`.
pub fn immediate(text: impl Into<String>) -> mpsc::Receiver<DeliveryEvent> {
    let (events, receiver) = mpsc::channel(2);
    // Capacity 2 with a fresh receiver: both sends succeed.
    let _ = events.try_send(DeliveryEvent::Delta(text.into()));
    let _ = events.try_send(DeliveryEvent::Done);
    receiver
}

/// Collect every event up to and including the terminal one.
pub async fn drain(mut receiver: mpsc::Receiver<DeliveryEvent>) -> Vec<DeliveryEvent> {
    let mut out = Vec::new();
    while let Some(event) = receiver.recv().await {
        let terminal = event.is_terminal();
        out.push(event);
        if terminal {
            break;
        }
    }
    out
}

async fn run_adapter(
    generator: Arc<dyn Generator>,
    prompt: String,
    events: mpsc::Sender<DeliveryEvent>,
) {
    let (fragment_tx, mut fragments) = mpsc::channel(FRAGMENT_BUFFER);
    let producer = tokio::spawn(async move { generator.stream(&prompt, fragment_tx).await });

    let mut forwarded = 0usize;
    loop {
        tokio::select! {
            fragment = fragments.recv() => match fragment {
                Some(text) => {
                    if events.send(DeliveryEvent::Delta(text)).await.is_err() {
                        producer.abort();
                        tracing::info!(forwarded, "stream consumer gone, generation cancelled");
                        return;
                    }
                    forwarded += 1;
                }
                None => break,
            },
            _ = events.closed() => {
                producer.abort();
                tracing::info!(forwarded, "stream consumer gone, generation cancelled");
                return;
            }
        }
    }

    let terminal = match producer.await {
        Ok(Ok(())) => DeliveryEvent::Done,
        Ok(Err(e)) => {
            tracing::warn!(forwarded, error = %e, "generation failed mid-stream");
            DeliveryEvent::Error(format!("{:#}", e))
        }
        Err(e) => {
            tracing::error!(forwarded, error = %e, "generation task did not complete");
            DeliveryEvent::Error(format!("generation task failed: {}", e))
        }
    };

    if matches!(terminal, DeliveryEvent::Done) {
        tracing::debug!(forwarded, "stream complete");
    }
    let _ = events.send(terminal).await;
}
