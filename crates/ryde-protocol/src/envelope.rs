// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame envelope for the realtime channel.
//!
//! Every inbound message is a JSON object `{event, data, ackId?}`. The
//! server acknowledges frames that carry an `ackId` with an `ack` frame
//! echoing the id; outbound events are `{event, data}` objects built from
//! [`crate::events::ServerEvent`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::events::ClientEvent;

/// Decoding errors for inbound frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The text was not a JSON object of the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame named an event outside the closed inbound set.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

/// Raw inbound frame as read off the wire, before event routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Event name.
    pub event: String,
    /// Event payload; defaults to `null` for payload-less events.
    #[serde(default)]
    pub data: Value,
    /// Acknowledgement correlation id, when the client wants a reply.
    #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

impl ClientFrame {
    /// Parse a frame from wire text.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode the frame into the closed inbound event set.
    ///
    /// Rejects unknown event names early, before any handler runs; a known
    /// event with a malformed payload reports the payload error instead.
    pub fn decode(&self) -> Result<ClientEvent, ProtocolError> {
        if !crate::events::is_client_event(&self.event) {
            return Err(ProtocolError::UnknownEvent(self.event.clone()));
        }
        let tagged = json!({ "event": self.event, "data": self.data });
        Ok(serde_json::from_value(tagged)?)
    }
}

/// Acknowledgement payload returned to a frame that carried an `ackId`.
///
/// Always has `success`; carries `message` and event-specific fields
/// (`rideId`, `fare`, `newWalletBalance`, ...) as a flat object.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable outcome description.
    pub message: Option<String>,
    /// Stable error code on failure.
    pub code: Option<String>,
    /// Event-specific fields merged into the ack object.
    pub fields: Map<String, Value>,
}

impl Ack {
    /// Successful ack with no message.
    pub fn ok() -> Self {
        Ack {
            success: true,
            message: None,
            code: None,
            fields: Map::new(),
        }
    }

    /// Successful ack with a message.
    pub fn ok_with(message: impl Into<String>) -> Self {
        Ack {
            success: true,
            message: Some(message.into()),
            code: None,
            fields: Map::new(),
        }
    }

    /// Failed ack with a code and message.
    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Ack {
            success: false,
            message: Some(message.into()),
            code: Some(code.into()),
            fields: Map::new(),
        }
    }

    /// Attach an event-specific field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Serialize as the wire ack frame for `ack_id`.
    pub fn into_frame(self, ack_id: u64) -> String {
        let mut data = Map::new();
        data.insert("success".to_string(), Value::Bool(self.success));
        if let Some(message) = self.message {
            data.insert("message".to_string(), Value::String(message));
        }
        if let Some(code) = self.code {
            data.insert("code".to_string(), Value::String(code));
        }
        for (k, v) in self.fields {
            data.insert(k, v);
        }
        json!({ "event": "ack", "ackId": ack_id, "data": Value::Object(data) }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_with_ack_id() {
        let frame = ClientFrame::parse(r#"{"event":"driverHeartbeat","data":{"driverId":"DRV001"},"ackId":9}"#)
            .unwrap();
        assert_eq!(frame.event, "driverHeartbeat");
        assert_eq!(frame.ack_id, Some(9));
    }

    #[test]
    fn parses_frame_without_data() {
        let frame = ClientFrame::parse(r#"{"event":"getCurrentPrices"}"#).unwrap();
        assert!(frame.data.is_null());
        assert_eq!(frame.ack_id, None);
    }

    #[test]
    fn unknown_event_is_rejected() {
        let frame = ClientFrame::parse(r#"{"event":"orderGroceries","data":{}}"#).unwrap();
        match frame.decode() {
            Err(ProtocolError::UnknownEvent(name)) => assert_eq!(name, "orderGroceries"),
            other => panic!("expected UnknownEvent, got {:?}", other),
        }
    }

    #[test]
    fn ack_frame_shape() {
        let text = Ack::ok_with("Ride booked")
            .field("rideId", "RID000001")
            .field("fare", 81)
            .into_frame(4);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "ack");
        assert_eq!(value["ackId"], 4);
        assert_eq!(value["data"]["success"], true);
        assert_eq!(value["data"]["rideId"], "RID000001");
        assert_eq!(value["data"]["fare"], 81);
    }

    #[test]
    fn failed_ack_carries_code() {
        let text = Ack::fail(crate::codes::RIDE_TAKEN, "Ride not available").into_frame(1);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["code"], "RIDE_TAKEN");
    }
}
