//! # ws-hub
//!
//! Real-time WebSocket connection hub.
//!
//! The hub tracks every live connection, serializes outbound writes per
//! connection, runs inbound frames through an ordered handler pipeline,
//! evicts idle connections, and delivers unicast, broadcast and keyed
//! publish/subscribe messages. A panic while handling one frame or one
//! delivery never takes down the connection or the process.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)            Operators (HTTP)
//!     │                              │
//!     ├── WS upgrade (ws/)           ├── REST handlers (api/)
//!     │                              │
//!     └──────────── Hub (hub/) ──────┘
//!                    │
//!     ├── ConnectionRegistry   ├── MetadataStore
//!     ├── CallbackPipeline     ├── Reader loops
//!     ├── Dispatch             └── Liveness monitor
//!     │
//!     └── Transport (transport/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod hub;
pub mod supervisor;
pub mod transport;
pub mod ws;
