//! # nextion-bridge - Nextion touch panels driven by live telemetry
//!
//! nextion-bridge keeps one or more Nextion HMI panels in sync with a telemetry data
//! bus. Each panel shows pages of text fields, numbers, pictures, gauges and scrolling
//! waveforms bound to data paths; the bridge renders values as they change, switches
//! day/night themes from the vessel position and turns touches into data bus writes.
//!
//! ## Features
//!
//! - **Panel protocol**: `FF FF FF` terminated Latin-1 command frames, streaming decoder for
//!   page reports, touch events and virtual button presses.
//! - **Rendering pipeline**: per-item formatters, unknown-value fallbacks, gauge hiding and
//!   waveform scaling.
//! - **Day/night themes**: color variables, mode commands and dim levels switched from the
//!   position and an injectable sun-times provider.
//! - **Buttons**: optimistic "changing" pictures while writes are in flight.
//! - **Page scheduler**: automatic page advance that yields to manual page changes.
//! - **Resilient links**: per-device actors that reconnect forever with a constant delay.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nextion_bridge::bus::MemoryBus;
//! use nextion_bridge::config::Config;
//! use nextion_bridge::device::serial::SerialConnector;
//! use nextion_bridge::device::Connector;
//! use nextion_bridge::model::file::ModelFile;
//! use nextion_bridge::server::BridgeServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let model = ModelFile::load(&config.display.model_file).await?;
//!     let sun = Arc::new(config.sun.schedule()?);
//!     let bus = Arc::new(MemoryBus::new());
//!     let server = BridgeServer::start(&config, model, bus, sun, |d| {
//!         Arc::new(SerialConnector::new(&d.port, d.baud_rate)) as Arc<dyn Connector>
//!     })?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`nextion`] - Command builders and the frame codec
//! - [`model`] - Display model: pages, items, buttons, themes, and the TOML model file
//! - [`bus`] - Data bus abstraction and the in-process [`bus::MemoryBus`]
//! - [`session`] - Per-device rendering, mode calculation, buttons and paging
//! - [`device`] - Connection supervisor and device actor
//! - [`server`] - Spawns and tracks one actor per configured panel
//! - [`config`] - `config.toml` loading and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Data Bus     │ ← deltas in, button writes out
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Device Actor   │ ← one per panel: session + supervisor
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Serial Link    │ ← Nextion frames
//! └─────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod device;
pub mod logutil;
pub mod metrics;
pub mod model;
pub mod nextion;
pub mod server;
pub mod session;
