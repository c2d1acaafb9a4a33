//! huesync-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does huesync-server do? (for beginners)
//!
//! The server sits between a colour *producer* (a background process that
//! samples a video signal) and a Hue *bridge* on the local network:
//!
//! 1. Clients drive the session through the [`application::controller`]
//!    API: discover a bridge, register or quick-start, pick an entertainment
//!    area, start and stop streaming.
//! 2. While a stream is active, every producer frame is chunked into RGB
//!    triples and pushed to the bridge by the frame adapter.
//! 3. Independently of any session, the announce supervisor keeps the
//!    service discoverable on the LAN and retries until the network lets it.

/// Application layer: session control, bridge lifecycle, frame forwarding,
/// and announcement supervision.
pub mod application;

/// Infrastructure layer: configuration, credential storage, UDP transports,
/// and the simulated bridge.
pub mod infrastructure;
