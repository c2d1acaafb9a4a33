//! Infrastructure layer for the server.
//!
//! Contains OS-facing adapters: the config and credential files, UDP sockets
//! for the announcer and the producer frame source, and the simulated bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `huesync_core`.  Production code in `application` MUST NOT import it;
//! application tests may use the simulated bridge as a device double.

pub mod bridge;
pub mod network;
pub mod storage;
