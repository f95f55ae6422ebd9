//! Typed event-bus client over a pluggable pub/sub transport.
//!
//! The core emits `commuter.*` lifecycle events and consumes vehicle queries
//! and pickup notifications. The transport itself is a boundary trait: the
//! in-process implementation backs tests and local runs, while production
//! wires in whatever broker the deployment uses. Transport failures drop the
//! event (counted); the bus never buffers unboundedly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::rfc3339_utc;
use crate::commuter::{Commuter, Direction};
use crate::geo::GeoPoint;

/// Topics emitted by the core.
pub mod topics {
    pub const COMMUTER_SPAWNED: &str = "commuter.spawned";
    pub const COMMUTER_PICKED_UP: &str = "commuter.picked_up";
    pub const COMMUTER_EXPIRED: &str = "commuter.expired";
    pub const COMMUTER_QUERY_RESPONSE: &str = "commuter.query_response";
    /// Consumed: a vehicle asking for nearby commuters.
    pub const VEHICLE_QUERY_COMMUTERS: &str = "vehicle.query_commuters";
    /// Consumed: a vehicle confirming a pickup.
    pub const COMMUTER_PICKUP_NOTIFY: &str = "commuter.pickup_notify";
}

/// One bus message. The event type doubles as the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_type: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug)]
pub enum BusError {
    Transport(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Transport(msg) => write!(f, "bus transport error: {msg}"),
        }
    }
}

/// Boundary contract for the pub/sub transport.
pub trait BusTransport: Send + Sync {
    fn publish(&self, envelope: &Envelope) -> Result<(), BusError>;
    /// Drain inbound messages addressed to the core.
    fn poll(&self) -> Vec<Envelope>;
}

#[derive(Default)]
struct InProcessState {
    inbound: VecDeque<Envelope>,
    published: Vec<Envelope>,
}

/// In-process transport: tests inject inbound messages and observe
/// everything the core published.
#[derive(Clone, Default)]
pub struct InProcessBus {
    state: Arc<Mutex<InProcessState>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the core's next inbound poll.
    pub fn inject(&self, envelope: Envelope) {
        if let Ok(mut state) = self.state.lock() {
            state.inbound.push_back(envelope);
        }
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    /// Published envelopes of one event type.
    pub fn published_of(&self, event_type: &str) -> Vec<Envelope> {
        self.published()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl BusTransport for InProcessBus {
    fn publish(&self, envelope: &Envelope) -> Result<(), BusError> {
        self.state
            .lock()
            .map(|mut state| state.published.push(envelope.clone()))
            .map_err(|_| BusError::Transport("bus state poisoned".to_string()))
    }

    fn poll(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .map(|mut state| state.inbound.drain(..).collect())
            .unwrap_or_default()
    }
}

/// The typed client the reservoirs publish through.
#[derive(Resource)]
pub struct BusClient {
    transport: Box<dyn BusTransport>,
}

impl BusClient {
    pub fn new(transport: Box<dyn BusTransport>) -> Self {
        Self { transport }
    }

    pub fn poll(&self) -> Vec<Envelope> {
        self.transport.poll()
    }

    pub fn emit(
        &self,
        event_type: &str,
        data: Value,
        correlation_id: Option<String>,
        real_ms: i64,
    ) -> Result<(), BusError> {
        let envelope = Envelope {
            event_type: event_type.to_string(),
            timestamp: rfc3339_utc(real_ms),
            data,
            correlation_id,
        };
        self.transport.publish(&envelope)
    }

    pub fn emit_spawned(
        &self,
        commuter: &Commuter,
        queue_size: usize,
        real_ms: i64,
    ) -> Result<(), BusError> {
        self.emit(
            topics::COMMUTER_SPAWNED,
            json!({
                "commuter_id": commuter.id.to_string(),
                "route_id": commuter.route,
                "depot_id": commuter.depot_id,
                "direction": commuter.direction.as_str(),
                "current_location": location_json(commuter.position),
                "destination": location_json(commuter.destination),
                "priority": commuter.priority,
                "trip_purpose": commuter.purpose.as_str(),
                "queue_size": queue_size,
            }),
            None,
            real_ms,
        )
    }

    pub fn emit_picked_up(
        &self,
        commuter_id: &str,
        wait_secs: u64,
        real_ms: i64,
    ) -> Result<(), BusError> {
        self.emit(
            topics::COMMUTER_PICKED_UP,
            json!({
                "commuter_id": commuter_id,
                "wait_secs": wait_secs,
            }),
            None,
            real_ms,
        )
    }

    pub fn emit_expired(&self, commuter_id: &str, real_ms: i64) -> Result<(), BusError> {
        self.emit(
            topics::COMMUTER_EXPIRED,
            json!({ "commuter_id": commuter_id }),
            None,
            real_ms,
        )
    }

    pub fn emit_query_response(
        &self,
        commuters: &[Commuter],
        correlation_id: Option<String>,
        real_ms: i64,
    ) -> Result<(), BusError> {
        let items: Vec<Value> = commuters
            .iter()
            .map(|c| {
                json!({
                    "commuter_id": c.id.to_string(),
                    "current_location": location_json(c.position),
                    "destination": location_json(c.destination),
                    "direction": c.direction.as_str(),
                    "priority": c.priority,
                    "route_id": c.route,
                    "depot_id": c.depot_id,
                })
            })
            .collect();
        self.emit(
            topics::COMMUTER_QUERY_RESPONSE,
            json!({
                "commuters": items,
                "total_count": commuters.len(),
            }),
            correlation_id,
            real_ms,
        )
    }
}

fn location_json(point: GeoPoint) -> Value {
    json!({ "lat": point.lat(), "lon": point.lon() })
}

/// A vehicle's query for pickup candidates, decoded from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct CommuterQuery {
    /// Present for depot-reservoir queries; absent for route queries.
    pub depot_id: Option<String>,
    pub route: String,
    pub vehicle_location: GeoPoint,
    pub direction: Option<Direction>,
    pub max_distance_m: Option<f64>,
    pub max_count: Option<usize>,
    pub correlation_id: Option<String>,
}

/// Inbound messages the core understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    QueryCommuters(CommuterQuery),
    PickupNotify { commuter_id: String },
    /// Well-formed query carrying an out-of-range vehicle location.
    InvalidLocation(String),
    /// Unrecognized or malformed; the reason is logged by the caller.
    Ignored(String),
}

/// Decode one inbound envelope.
pub fn parse_inbound(envelope: &Envelope) -> InboundMessage {
    match envelope.event_type.as_str() {
        topics::VEHICLE_QUERY_COMMUTERS => {
            let data = &envelope.data;
            let Some(route) = data.get("route_id").and_then(Value::as_str) else {
                return InboundMessage::Ignored("query without route_id".to_string());
            };
            let location = data.get("vehicle_location");
            let lat = location.and_then(|l| l.get("lat")).and_then(Value::as_f64);
            let lon = location.and_then(|l| l.get("lon")).and_then(Value::as_f64);
            let (Some(lat), Some(lon)) = (lat, lon) else {
                return InboundMessage::Ignored("query without vehicle_location".to_string());
            };
            let Ok(vehicle_location) = GeoPoint::new(lat, lon) else {
                return InboundMessage::InvalidLocation(format!(
                    "query with invalid vehicle_location ({lat}, {lon})"
                ));
            };
            InboundMessage::QueryCommuters(CommuterQuery {
                depot_id: data
                    .get("depot_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                route: route.to_string(),
                vehicle_location,
                direction: data
                    .get("direction")
                    .and_then(Value::as_str)
                    .map(Direction::from_label),
                max_distance_m: data.get("search_radius").and_then(Value::as_f64),
                max_count: data
                    .get("available_seats")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize),
                correlation_id: envelope.correlation_id.clone(),
            })
        }
        topics::COMMUTER_PICKUP_NOTIFY => {
            match envelope.data.get("commuter_id").and_then(Value::as_str) {
                Some(commuter_id) => InboundMessage::PickupNotify {
                    commuter_id: commuter_id.to_string(),
                },
                None => InboundMessage::Ignored("pickup notify without commuter_id".to_string()),
            }
        }
        other => InboundMessage::Ignored(format!("unhandled event type {other}")),
    }
}
