// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Push-notification sink.
//!
//! Push is a best-effort secondary delivery; the realtime channel is
//! primary. Messages go through a bounded channel drained by one task; a
//! saturated channel drops the message and bumps a counter, and a missing
//! provider configuration turns the whole sink into a no-op. Nothing here
//! ever blocks a state transition or propagates an error.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const QUEUE_DEPTH: usize = 1024;

/// One notification to a device token.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    /// Event-specific payload delivered alongside the notification.
    pub data: Value,
}

/// Handle for enqueueing push notifications.
#[derive(Clone)]
pub struct PushSink {
    tx: Option<mpsc::Sender<PushMessage>>,
    dropped: Arc<AtomicU64>,
}

impl PushSink {
    /// No-op sink, used when provider credentials are absent.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the drain task against the provider endpoint.
    pub fn start(api_url: String, api_key: String, deadline: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<PushMessage>(QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(async move {
            let client = match reqwest::Client::builder().timeout(deadline).build() {
                Ok(client) => client,
                Err(err) => {
                    warn!(error = %err, "push client unavailable, sink drains to nowhere");
                    while rx.recv().await.is_some() {}
                    return;
                }
            };
            while let Some(message) = rx.recv().await {
                deliver(&client, &api_url, &api_key, message).await;
            }
        });

        Self {
            tx: Some(tx),
            dropped,
        }
    }

    /// Enqueue a notification. Never blocks; drops on saturation.
    pub fn enqueue(&self, message: PushMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(message).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Messages dropped due to queue saturation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn deliver(client: &reqwest::Client, api_url: &str, api_key: &str, message: PushMessage) {
    let payload = json!({
        "to": message.token,
        "notification": {
            "title": message.title,
            "body": message.body,
        },
        "data": message.data,
    });
    let result = client
        .post(api_url)
        .header("Authorization", format!("key={}", api_key))
        .json(&payload)
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {
            debug!("push delivered");
        }
        Ok(response) => {
            warn!(status = %response.status(), "push provider rejected notification");
        }
        Err(err) => {
            warn!(error = %err, "push send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sink_accepts_and_discards() {
        let sink = PushSink::disabled();
        sink.enqueue(PushMessage {
            token: "tok".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            data: json!({}),
        });
        assert_eq!(sink.dropped_count(), 0);
    }
}
