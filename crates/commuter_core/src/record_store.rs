//! Mirror of reservoir state into the external passenger record store.
//!
//! The in-memory reservoirs are authoritative; the record store is a
//! best-effort mirror. Writes are staged in a bounded queue and flushed by a
//! periodic tick: if the store cannot keep up, the oldest pending write is
//! dropped with a warning counter rather than blocking the service loop.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bevy_ecs::prelude::Resource;
use log::warn;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::json;

use crate::clock::rfc3339_utc;
use crate::commuter::Commuter;
use crate::config::RecordStoreConfig;

/// Errors from the record-store boundary.
#[derive(Debug)]
pub enum RecordStoreError {
    Http(reqwest::Error),
    Status(u16),
}

impl From<reqwest::Error> for RecordStoreError {
    fn from(err: reqwest::Error) -> Self {
        RecordStoreError::Http(err)
    }
}

impl fmt::Display for RecordStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStoreError::Http(err) => write!(f, "http error: {err}"),
            RecordStoreError::Status(code) => write!(f, "record store returned HTTP {code}"),
        }
    }
}

/// Wire body for an active-passenger insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassengerRecord {
    pub passenger_id: String,
    pub route_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depot_id: Option<String>,
    pub direction: String,
    pub latitude: f64,
    pub longitude: f64,
    pub destination_lat: f64,
    pub destination_lon: f64,
    pub destination_name: String,
    /// ISO-8601 UTC.
    pub spawned_at: String,
    /// ISO-8601 UTC.
    pub expires_at: String,
    pub status: String,
    /// 1..=5, mapped from the core's [0, 1] priority.
    pub priority: u8,
}

impl PassengerRecord {
    /// Build the mirrored record for a freshly spawned commuter.
    /// `spawned_real_ms` is the wall-clock spawn time.
    pub fn for_spawn(
        commuter: &Commuter,
        spawned_real_ms: i64,
        destination_name: String,
    ) -> Self {
        let expires_real_ms = spawned_real_ms.saturating_add(commuter.max_wait_ms as i64);
        Self {
            passenger_id: commuter.id.to_string(),
            route_id: commuter.route.clone(),
            depot_id: commuter.depot_id.clone(),
            direction: commuter.direction.as_str().to_string(),
            latitude: commuter.position.lat(),
            longitude: commuter.position.lon(),
            destination_lat: commuter.destination.lat(),
            destination_lon: commuter.destination.lon(),
            destination_name,
            spawned_at: rfc3339_utc(spawned_real_ms),
            expires_at: rfc3339_utc(expires_real_ms),
            status: "WAITING".to_string(),
            priority: priority_level(commuter.priority),
        }
    }
}

/// Map a [0, 1] priority onto the store's 1..=5 integer levels.
pub fn priority_level(priority: f64) -> u8 {
    ((priority.clamp(0.0, 1.0) * 5.0) as u8 + 1).min(5)
}

/// Boundary contract for the passenger record store.
pub trait PassengerRecordStore: Send + Sync {
    fn insert(&self, record: &PassengerRecord) -> Result<(), RecordStoreError>;
    fn mark_boarded(&self, passenger_id: &str) -> Result<(), RecordStoreError>;
    fn mark_alighted(&self, passenger_id: &str) -> Result<(), RecordStoreError>;
    /// Server-side cleanup of everything past `expires_at`.
    fn cleanup_expired(&self) -> Result<(), RecordStoreError>;
    fn near_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        route_id: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, RecordStoreError>;
}

/// Blocking HTTP implementation against `/api/active-passengers`.
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("failed to build record-store client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn check(response: reqwest::blocking::Response) -> Result<(), RecordStoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RecordStoreError::Status(status.as_u16()))
        }
    }
}

impl PassengerRecordStore for HttpRecordStore {
    fn insert(&self, record: &PassengerRecord) -> Result<(), RecordStoreError> {
        let response = self
            .client
            .post(format!("{}/api/active-passengers", self.base_url))
            .json(&json!({ "data": record }))
            .send()?;
        Self::check(response)
    }

    fn mark_boarded(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        let response = self
            .client
            .post(format!(
                "{}/api/active-passengers/mark-boarded/{passenger_id}",
                self.base_url
            ))
            .send()?;
        Self::check(response)
    }

    fn mark_alighted(&self, passenger_id: &str) -> Result<(), RecordStoreError> {
        let response = self
            .client
            .post(format!(
                "{}/api/active-passengers/mark-alighted/{passenger_id}",
                self.base_url
            ))
            .send()?;
        Self::check(response)
    }

    fn cleanup_expired(&self) -> Result<(), RecordStoreError> {
        let response = self
            .client
            .delete(format!(
                "{}/api/active-passengers/cleanup/expired",
                self.base_url
            ))
            .send()?;
        Self::check(response)
    }

    fn near_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        route_id: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, RecordStoreError> {
        let mut params: Vec<(&str, String)> = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("radius", radius_m.to_string()),
        ];
        if let Some(route_id) = route_id {
            params.push(("route_id", route_id.to_string()));
        }
        if let Some(status) = status {
            params.push(("status", status.to_string()));
        }
        let response = self
            .client
            .get(format!(
                "{}/api/active-passengers/near-location",
                self.base_url
            ))
            .query(&params)
            .send()?;
        let status_code = response.status();
        if !status_code.is_success() {
            return Err(RecordStoreError::Status(status_code.as_u16()));
        }
        let body: serde_json::Value = response.json()?;
        Ok(body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

/// One staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Insert(Box<PassengerRecord>),
    MarkBoarded(String),
    MarkAlighted(String),
    CleanupExpired,
}

/// Bounded staging queue for record-store writes.
#[derive(Resource)]
pub struct RecordStoreQueue {
    pending: VecDeque<PendingWrite>,
    capacity: usize,
}

impl RecordStoreQueue {
    pub fn new(config: &RecordStoreConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: config.queue_capacity.max(1),
        }
    }

    /// Stage a write. Returns `true` if an older write had to be dropped to
    /// make room.
    pub fn push(&mut self, write: PendingWrite) -> bool {
        let mut dropped = false;
        if self.pending.len() >= self.capacity {
            self.pending.pop_front();
            warn!("record-store queue full; dropping oldest pending write");
            dropped = true;
        }
        self.pending.push_back(write);
        dropped
    }

    pub fn pop(&mut self) -> Option<PendingWrite> {
        self.pending.pop_front()
    }

    /// Put a write back at the head after a failed flush.
    pub fn push_front(&mut self, write: PendingWrite) {
        self.pending.push_front(write);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The resource wrapping whichever store implementation is wired in.
#[derive(Resource)]
pub struct RecordStoreHandle {
    pub store: Box<dyn PassengerRecordStore>,
}
