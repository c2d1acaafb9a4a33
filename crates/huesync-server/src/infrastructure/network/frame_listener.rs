//! UDP producer frame source.
//!
//! The producer sends one datagram per frame to a local UDP port.  Each
//! datagram is the frame's raw channel bytes, `r, g, b, r, g, b, ...`, with no
//! header.  The listener publishes every datagram into the frame channel; the
//! channel keeps only the newest frame, so a slow bridge never backs up the
//! producer.
//!
//! The listener runs on a dedicated thread with a blocking socket.  The
//! socket has a 500 ms read timeout; on each timeout the `running` flag is
//! checked so [`FrameListener::stop`] returns promptly.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::frame_adapter::FrameSender;

/// Largest datagram accepted; 21 845 zones of three channels.
const MAX_DATAGRAM: usize = 65_535;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum FrameListenerError {
    /// The UDP socket could not be bound.
    #[error("failed to bind frame socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The socket could not be configured or the thread could not start.
    #[error("frame listener setup failed: {0}")]
    Setup(#[source] std::io::Error),
}

/// Handle to the running listener thread.
pub struct FrameListener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameListener {
    /// Address the socket is bound to (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("frame listener thread panicked");
            }
        }
    }
}

impl Drop for FrameListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Binds `addr` and starts publishing received frames into `frames`.
///
/// # Errors
///
/// Returns [`FrameListenerError::BindFailed`] if the socket cannot be bound.
pub fn start_frame_listener(
    addr: SocketAddr,
    frames: FrameSender,
) -> Result<FrameListener, FrameListenerError> {
    let socket = UdpSocket::bind(addr).map_err(|source| FrameListenerError::BindFailed { addr, source })?;
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(FrameListenerError::Setup)?;
    let local_addr = socket.local_addr().map_err(FrameListenerError::Setup)?;

    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();
    let thread = std::thread::Builder::new()
        .name("huesync-frames".to_string())
        .spawn(move || listen_loop(socket, frames, thread_running))
        .map_err(FrameListenerError::Setup)?;

    info!("frame listener on UDP {local_addr}");
    Ok(FrameListener {
        local_addr,
        running,
        thread: Some(thread),
    })
}

fn listen_loop(socket: UdpSocket, frames: FrameSender, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("frame recv error: {e}");
                continue;
            }
        };

        if !frames.publish(buf[..len].to_vec()) {
            debug!("frame adapter gone; listener exiting");
            break;
        }
        if len % 3 != 0 {
            debug!("frame of {len} bytes from {src} is not a whole number of triples");
        }
    }

    info!("frame listener stopped");
}

fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::frame_adapter::frame_channel;

    #[test]
    fn test_is_timeout_error_recognises_timeouts() {
        assert!(is_timeout_error(&std::io::Error::new(std::io::ErrorKind::TimedOut, "t")));
        assert!(is_timeout_error(&std::io::Error::new(std::io::ErrorKind::WouldBlock, "w")));
        assert!(!is_timeout_error(&std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "r"
        )));
    }

    #[tokio::test]
    async fn test_datagram_is_published_as_frame() {
        // Arrange
        let (tx, mut rx) = frame_channel();
        let listener = start_frame_listener("127.0.0.1:0".parse().unwrap(), tx).unwrap();
        let producer = UdpSocket::bind("127.0.0.1:0").unwrap();

        // Act
        producer.send_to(&[255, 128, 0, 1, 2, 3], listener.local_addr()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("frame within 2s")
            .unwrap();

        // Assert
        assert_eq!(*rx.borrow_and_update(), vec![255, 128, 0, 1, 2, 3]);
        listener.stop();
    }

    #[test]
    fn test_bind_conflict_is_bind_failed() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let (tx, _rx) = frame_channel();

        let result = start_frame_listener(addr, tx);

        assert!(matches!(result, Err(FrameListenerError::BindFailed { .. })));
    }
}
