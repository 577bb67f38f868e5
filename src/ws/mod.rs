//! WebSocket layer: the upgrade route and the axum socket adapter.
//!
//! The endpoint (default `/ws`) upgrades the HTTP request and hands the
//! socket to [`crate::hub::Hub::serve`] as a [`crate::transport::Transport`].

pub mod echo;
pub mod handler;
pub mod socket;
