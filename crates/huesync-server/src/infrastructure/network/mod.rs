//! Network infrastructure: UDP service announcer and producer frame listener.

pub mod announcer;
pub mod frame_listener;
