//! In-memory bridge.
//!
//! `SimulatedBridge` implements [`BridgeClient`] without any network I/O.  It
//! lets the server run headless on a machine without a bridge, and is the
//! device double for the application and integration tests.
//!
//! Clones share one state, so a test keeps a clone to inspect what the server
//! did and to inject faults (`set_fail_open`, `set_fail_stop`,
//! `set_hang_open`, `set_hang_list`, `set_hang_handshake`,
//! `set_link_button`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use huesync_core::{BridgeIdentity, ColorTriple, Credentials};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::bridge_client::{
    BridgeClient, BridgeClientError, BridgeConnection, EntertainmentArea,
};

/// Frames kept for inspection; older ones are discarded.
const FRAME_HISTORY: usize = 256;

struct SimState {
    identity: BridgeIdentity,
    areas: Vec<EntertainmentArea>,
    link_button: bool,
    fail_open: bool,
    fail_stop: bool,
    hang_open: bool,
    hang_list: bool,
    hang_handshake: bool,
    streaming: Option<String>,
    frames: VecDeque<Vec<ColorTriple>>,
    transition_count: usize,
    open_count: usize,
    close_count: usize,
    registered_names: Vec<String>,
}

/// A bridge that lives in memory.
#[derive(Clone)]
pub struct SimulatedBridge {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBridge {
    pub fn new(identity: BridgeIdentity, areas: Vec<EntertainmentArea>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                identity,
                areas,
                link_button: true,
                fail_open: false,
                fail_stop: false,
                hang_open: false,
                hang_list: false,
                hang_handshake: false,
                streaming: None,
                frames: VecDeque::new(),
                transition_count: 0,
                open_count: 0,
                close_count: 0,
                registered_names: Vec::new(),
            })),
        }
    }

    /// Bridge `sim-bridge` on localhost with areas `1` ("TV Area") and
    /// `2` ("Living Room").
    pub fn demo() -> Self {
        Self::new(
            BridgeIdentity::new("sim-bridge", "127.0.0.1"),
            vec![
                EntertainmentArea {
                    id: "1".to_string(),
                    name: "TV Area".to_string(),
                    zone_count: 3,
                },
                EntertainmentArea {
                    id: "2".to_string(),
                    name: "Living Room".to_string(),
                    zone_count: 5,
                },
            ],
        )
    }

    pub fn identity(&self) -> BridgeIdentity {
        self.lock().identity.clone()
    }

    pub fn set_link_button(&self, pressed: bool) {
        self.lock().link_button = pressed;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.lock().fail_stop = fail;
    }

    /// Makes `open` never complete.
    pub fn set_hang_open(&self, hang: bool) {
        self.lock().hang_open = hang;
    }

    /// Makes `list_areas` never complete.
    pub fn set_hang_list(&self, hang: bool) {
        self.lock().hang_list = hang;
    }

    /// Makes the stream `start` and `stop` handshakes never complete.
    pub fn set_hang_handshake(&self, hang: bool) {
        self.lock().hang_handshake = hang;
    }

    /// Area the device is streaming, if any.
    pub fn streaming_area(&self) -> Option<String> {
        self.lock().streaming.clone()
    }

    /// Most recent frames, oldest first.
    pub fn frames(&self) -> Vec<Vec<ColorTriple>> {
        self.lock().frames.iter().cloned().collect()
    }

    pub fn transition_count(&self) -> usize {
        self.lock().transition_count
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Application names that registered successfully.
    pub fn registered_names(&self) -> Vec<String> {
        self.lock().registered_names.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BridgeClient for SimulatedBridge {
    async fn discover(&self) -> Result<Vec<BridgeIdentity>, BridgeClientError> {
        Ok(vec![self.identity()])
    }

    async fn register(&self, address: &str, app_name: &str) -> Result<Credentials, BridgeClientError> {
        let mut state = self.lock();
        if !state.link_button {
            return Err(BridgeClientError::LinkButtonNotPressed);
        }
        state.registered_names.push(app_name.to_string());
        info!("simulated bridge at {address} registered {app_name}");
        Ok(Credentials::new(
            Uuid::new_v4().simple().to_string(),
            Uuid::new_v4().simple().to_string(),
        ))
    }

    async fn open(
        &self,
        identity: &BridgeIdentity,
        credentials: &Credentials,
    ) -> Result<Box<dyn BridgeConnection>, BridgeClientError> {
        let hang = self.lock().hang_open;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        if state.fail_open {
            return Err(BridgeClientError::Unreachable(identity.network_address.clone()));
        }
        if !credentials.is_complete() {
            return Err(BridgeClientError::Unauthorized);
        }
        state.open_count += 1;
        Ok(Box::new(SimulatedConnection {
            bridge: self.clone(),
            owns_stream: false,
        }))
    }
}

struct SimulatedConnection {
    bridge: SimulatedBridge,
    /// Set once this connection started the device stream.
    owns_stream: bool,
}

impl SimulatedConnection {
    async fn handshake_delay(&self) {
        let hang = self.bridge.lock().hang_handshake;
        if hang {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl BridgeConnection for SimulatedConnection {
    async fn list_areas(&self) -> Result<Vec<EntertainmentArea>, BridgeClientError> {
        let hang = self.bridge.lock().hang_list;
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(self.bridge.lock().areas.clone())
    }

    async fn get_area(&self, id: &str) -> Result<EntertainmentArea, BridgeClientError> {
        self.bridge
            .lock()
            .areas
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| BridgeClientError::AreaNotFound(id.to_string()))
    }

    async fn start(&mut self, area: &EntertainmentArea) -> Result<(), BridgeClientError> {
        self.handshake_delay().await;
        let mut state = self.bridge.lock();
        if let Some(current) = &state.streaming {
            return Err(BridgeClientError::AlreadyStreaming(current.clone()));
        }
        state.streaming = Some(area.id.clone());
        self.owns_stream = true;
        debug!("simulated stream started on area {}", area.id);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BridgeClientError> {
        self.handshake_delay().await;
        let mut state = self.bridge.lock();
        if state.fail_stop {
            return Err(BridgeClientError::Stream("stop handshake rejected".to_string()));
        }
        if self.owns_stream {
            state.streaming = None;
            self.owns_stream = false;
        }
        Ok(())
    }

    fn transition(&mut self, colors: &[ColorTriple]) -> Result<(), BridgeClientError> {
        let mut state = self.bridge.lock();
        if state.streaming.is_none() {
            return Err(BridgeClientError::Stream("not streaming".to_string()));
        }
        if state.frames.len() == FRAME_HISTORY {
            state.frames.pop_front();
        }
        state.frames.push_back(colors.to_vec());
        state.transition_count += 1;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.bridge.lock();
        if self.owns_stream {
            state.streaming = None;
            self.owns_stream = false;
        }
        state.close_count += 1;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
