//! Application layer use cases for the streaming server.
//!
//! Everything here depends on traits (`BridgeClient`, `CredentialStore`,
//! `Advertiser`, `TunnelOpener`) and on `huesync_core` domain types.  Concrete
//! sockets and files are injected from the infrastructure layer, which keeps
//! every use case testable with in-memory doubles.
//!
//! # Sub-modules
//!
//! - **`session_store`** – The shared, lock-protected [`Session`] handle.
//!   Only the controller mutates it; the frame adapter only reads it.
//!
//! - **`bridge_client`** – The bridge capability consumed from a bridge
//!   client library, expressed as async traits.
//!
//! - **`bridge_manager`** – Owns the single live bridge connection and
//!   enforces the start/stop handshake, I/O timeouts, and the quiesce
//!   interval after a stream stops.
//!
//! - **`frame_adapter`** – Latest-wins frame channel plus the adapter that
//!   forwards frames to the bridge while the session is streaming.
//!
//! - **`announce`** – Keeps the service advertised (and optionally
//!   tunneled), retrying the whole setup until it succeeds.
//!
//! - **`persistence`** – The credential store capability.
//!
//! - **`controller`** – The session API consumed by the control surface,
//!   plus the uniform [`response::CommandResult`] wrapper.
//!
//! [`Session`]: huesync_core::Session

pub mod announce;
pub mod bridge_client;
pub mod bridge_manager;
pub mod controller;
pub mod frame_adapter;
pub mod persistence;
pub mod response;
pub mod session_store;
