//! # huesync-core
//!
//! Shared domain library for Hue HDMI Sync: the streaming session state
//! machine, the frame chunker, and the error taxonomy used at the control
//! boundary.
//!
//! This crate has no dependencies on sockets, file systems, or an async
//! runtime.  Everything that talks to a bridge, a producer, or the network
//! lives in `huesync-server`.
//!
//! # Architecture overview (for beginners)
//!
//! Hue HDMI Sync mirrors the colours of a video source onto a set of lights.
//! A background *producer* samples the picture and emits flat byte frames;
//! the server reshapes them into RGB triples and streams them to a Hue
//! *bridge* while a *session* is active.
//!
//! - **`domain::session`** – The single source of truth for where the session
//!   is in its lifecycle (`not ready → ready → working → idle`, or `error`).
//!   All mutation goes through validated transition methods.
//!
//! - **`domain::frame`** – Turns `[r, g, b, r, g, b, ...]` into
//!   `[(r, g, b), (r, g, b), ...]`, rejecting frames with a dangling channel.
//!
//! - **`domain::error`** – The error taxonomy surfaced to clients, each
//!   variant carrying a stable [`ErrorCode`].
//!
//! - **`domain::clock`** – A tiny time abstraction so timing contracts (the
//!   post-stream quiesce interval) can be tested without sleeping.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `huesync_core::Session` instead of `huesync_core::domain::session::Session`.
pub use domain::clock::{Clock, ManualClock, SystemClock};
pub use domain::error::{ControlError, ErrorCode};
pub use domain::frame::{chunk_frame, ColorTriple, FrameError};
pub use domain::session::{
    BridgeIdentity, Credentials, Session, SessionError, SessionStatus, Transition,
};
