//! # Commuter Reservoir Core
//!
//! A passenger-demand simulation engine for a public-transit fleet.
//!
//! ## Overview
//!
//! This crate provides the reservoir subsystem and the spawner that feeds
//! it:
//!
//! - **Event Scheduling**: millisecond-precision event loop with a
//!   real-world epoch, paced against the wall clock in production
//! - **Reservoirs**: depot FIFO queues and grid-indexed route segments
//!   holding every waiting commuter
//! - **Poisson Spawner**: seeded, zone-driven demand generation from
//!   land-use and amenity data
//! - **Collaborator Clients**: fleet data API, passenger record store, and
//!   event bus behind boundary traits
//!
//! ## Key Concepts
//!
//! - **Single Owner**: each commuter lives in exactly one reservoir
//!   container from spawn to its one terminal transition
//! - **Deterministic**: seeded RNG and an ordered event clock make runs
//!   replayable
//! - **Authoritative Memory**: the record store mirrors state; the
//!   reservoirs never block on it
//!
//! ## Example
//!
//! ```rust,no_run
//! use bevy_ecs::prelude::World;
//! use commuter_core::config::ServiceConfig;
//! use commuter_core::data_source::HttpDataSource;
//! use commuter_core::event_bus::InProcessBus;
//! use commuter_core::record_store::HttpRecordStore;
//! use commuter_core::runner::{initialize_service, run_realtime, service_schedule};
//! use commuter_core::service::{build_service, ServiceParams};
//! use std::sync::atomic::AtomicBool;
//!
//! let config = ServiceConfig::from_env();
//! let data_source = Box::new(HttpDataSource::new(&config.data_source));
//! let record_store = Box::new(HttpRecordStore::new(&config.data_source.base_url, 30));
//! let bus = Box::new(InProcessBus::new());
//!
//! let mut world = World::new();
//! build_service(
//!     &mut world,
//!     ServiceParams::default().with_config(config),
//!     data_source,
//!     record_store,
//!     bus,
//! )
//! .expect("startup data load");
//! initialize_service(&mut world);
//!
//! let mut schedule = service_schedule();
//! let shutdown = AtomicBool::new(false);
//! run_realtime(&mut world, &mut schedule, &shutdown);
//! ```

pub mod clock;
pub mod commuter;
pub mod config;
pub mod coordinator;
pub mod data_source;
pub mod event_bus;
pub mod geo;
pub mod patterns;
pub mod record_store;
pub mod reservoir;
pub mod runner;
pub mod service;
pub mod spawner;
pub mod stats;
pub mod systems;
pub mod zones;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
