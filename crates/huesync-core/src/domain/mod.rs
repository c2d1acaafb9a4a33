//! Domain entities for Hue HDMI Sync.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  It can be compiled and tested on any platform without a
//! bridge, a network, or a running producer.

/// Time source abstraction used by the quiesce timer.
pub mod clock;

/// Control-boundary error taxonomy and stable error codes.
pub mod error;

/// Frame chunking: flat channel values to RGB triples.
pub mod frame;

/// Streaming session state machine: the core domain concept.
///
/// See [`session::Session`] for the main type.
pub mod session;
