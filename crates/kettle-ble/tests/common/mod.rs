//! Scripted kettle for session tests
//!
//! `MockKettle` plays the device side of the login handshake and the mode
//! config record without a radio. Notifications are delivered synchronously
//! from inside `write`, so every frame is queued before the session starts
//! waiting for it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use uuid::Uuid;

use kettle_ble::{DisconnectHandler, FrameHandler, KettleLink, LinkError, ServiceInfo};
use kettle_core::crypto::compute_device_token;
use kettle_core::{
    derive_session_keys, reassemble_fragments, split_token, KettleConfig, SessionKeys, ACK_READY,
    ACK_SUCCESS, AUTH_INIT_UUID, AUTH_UUID, OP_ALREADY_LOGIN, OP_AUTH_INIT_2, OP_DEV_PREPARE_RAND,
    OP_DEV_PREPARE_TOKEN, OP_PREPARE_RAND, OP_PREPARE_TOKEN, OP_SUCCESS, READ_MODE_CONFIG_UUID,
    REQUIRED_CHARACTERISTICS, SERVICE_AUTH_UUID, SERVICE_BIZ_UUID, WARM_STATUS_UUID,
    WRITE_MODE_CONFIG_UUID,
};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

pub const TOKEN: &str = "00112233445566778899aabbccddeeff";
pub const OTHER_TOKEN: &str = "ffeeddccbbaa99887766554433221100";

/// Mode record with every segment at 40°C
pub const INITIAL_RECORD: [u8; 10] = [40, 0x18, 40, 0x18, 40, 0x18, 40, 0x18, 40, 0x18];

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn test_config() -> KettleConfig {
    KettleConfig::new(TOKEN)
}

/// Status frame in the given activity, mode and temperature
pub fn status_frame(activity: u8, mode: u8, temperature: u8, warm_after_boil: u8) -> Vec<u8> {
    vec![activity, 0, 0, 0, mode, temperature, warm_after_boil, 0x00, 0x78, 0, 0]
}

// ----------------------------------------------------------------------------
// Mock Kettle
// ----------------------------------------------------------------------------

/// Login step at which the scripted device stops cooperating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFault {
    /// No ready ack for the app's prepare-random
    NoPrepareAck,
    /// Announces its random but never sends the tagged fragments
    NoDeviceRandom,
    /// Never announces its token after the random exchange
    NoDevicePrepareToken,
    /// Accepts the app token without acking the last fragment
    NoTokenAck,
    /// Acks the app token but never confirms on auth-init
    NoFinalSuccess,
}

/// Device-side behavior switches
#[derive(Debug, Clone)]
pub struct MockOptions {
    pub name: Option<String>,
    /// Key the device holds; differs from the session's to fail login
    pub device_token: String,
    pub already_logged_in: bool,
    pub missing_characteristic: Option<Uuid>,
    /// Number of initial connect attempts that fail
    pub failing_connects: usize,
    /// Status frame the kettle pushes as soon as status is subscribed
    pub initial_status: Option<Vec<u8>>,
    pub fault: Option<HandshakeFault>,
    pub seed: u64,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            name: Some("MiKetv12".to_string()),
            device_token: TOKEN.to_string(),
            already_logged_in: false,
            missing_characteristic: None,
            failing_connects: 0,
            initial_status: None,
            fault: None,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStep {
    Idle,
    AwaitAppRandom,
    AwaitRandomReady,
    AwaitRandomAck,
    AwaitTokenReady,
    AwaitTokenAck,
    AwaitPrepareToken,
    AwaitFirstFragment,
    AwaitSecondFragment,
    Done,
}

struct DeviceState {
    connected: bool,
    handlers: HashMap<Uuid, FrameHandler>,
    disconnect_handler: Option<DisconnectHandler>,
    writes: Vec<(Uuid, Vec<u8>)>,
    record: Vec<u8>,
    step: AuthStep,
    app_random: Vec<u8>,
    dev_random: [u8; 16],
    keys: Option<SessionKeys>,
    first_fragment: Vec<u8>,
    logins: usize,
}

/// Scripted Mi Kettle Pro
#[derive(Clone)]
pub struct MockKettle {
    options: Arc<MockOptions>,
    state: Arc<Mutex<DeviceState>>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl MockKettle {
    pub fn new() -> Self {
        Self::with_options(MockOptions::default())
    }

    pub fn with_options(options: MockOptions) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut dev_random = [0u8; 16];
        rng.fill_bytes(&mut dev_random);

        Self {
            options: Arc::new(options),
            state: Arc::new(Mutex::new(DeviceState {
                connected: false,
                handlers: HashMap::new(),
                disconnect_handler: None,
                writes: Vec::new(),
                record: INITIAL_RECORD.to_vec(),
                step: AuthStep::Idle,
                app_random: Vec::new(),
                dev_random,
                keys: None,
                first_fragment: Vec::new(),
                logins: 0,
            })),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Push a status notification as the kettle would
    pub fn push_status(&self, frame: Vec<u8>) {
        self.notify(vec![(WARM_STATUS_UUID, frame)]);
    }

    /// Drop the link from the device side
    pub fn drop_link(&self) {
        let handler = {
            let mut state = self.lock();
            state.connected = false;
            state.disconnect_handler.clone()
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn record(&self) -> Vec<u8> {
        self.lock().record.clone()
    }

    pub fn set_record(&self, record: &[u8]) {
        self.lock().record = record.to_vec();
    }

    pub fn is_connected_now(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn completed_logins(&self) -> usize {
        self.lock().logins
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    fn notify(&self, frames: Vec<(Uuid, Vec<u8>)>) {
        for (uuid, frame) in frames {
            let handler = self.lock().handlers.get(&uuid).cloned();
            if let Some(handler) = handler {
                handler(uuid, frame);
            }
        }
    }

    fn faults(&self, fault: HandshakeFault) -> bool {
        self.options.fault == Some(fault)
    }

    /// Device reaction to a write, as notifications to send
    fn respond(&self, state: &mut DeviceState, uuid: Uuid, data: &[u8]) -> Vec<(Uuid, Vec<u8>)> {
        if uuid == AUTH_INIT_UUID {
            if data == OP_AUTH_INIT_2 && self.options.already_logged_in {
                return vec![(AUTH_INIT_UUID, OP_ALREADY_LOGIN.to_vec())];
            }
            return Vec::new();
        }
        if uuid != AUTH_UUID {
            return Vec::new();
        }

        let auth = |frame: &[u8]| (AUTH_UUID, frame.to_vec());
        match (state.step, data) {
            (_, op) if op == OP_PREPARE_RAND => {
                state.step = AuthStep::AwaitAppRandom;
                if self.faults(HandshakeFault::NoPrepareAck) {
                    return Vec::new();
                }
                vec![auth(ACK_READY)]
            }
            (AuthStep::AwaitAppRandom, frame) => {
                state.app_random = reassemble_fragments(&[frame]);
                state.step = AuthStep::AwaitRandomReady;
                vec![auth(ACK_SUCCESS), auth(OP_DEV_PREPARE_RAND)]
            }
            (AuthStep::AwaitRandomReady, ack) if ack == ACK_READY => {
                state.step = AuthStep::AwaitRandomAck;
                if self.faults(HandshakeFault::NoDeviceRandom) {
                    return Vec::new();
                }
                let mut frame = vec![0x01, 0x00];
                frame.extend_from_slice(&state.dev_random);
                vec![auth(&frame)]
            }
            (AuthStep::AwaitRandomAck, ack) if ack == ACK_SUCCESS => {
                let psk = hex::decode(&self.options.device_token).unwrap();
                state.keys =
                    Some(derive_session_keys(&psk, &state.app_random, &state.dev_random).unwrap());
                state.step = AuthStep::AwaitTokenReady;
                if self.faults(HandshakeFault::NoDevicePrepareToken) {
                    return Vec::new();
                }
                vec![auth(OP_DEV_PREPARE_TOKEN)]
            }
            (AuthStep::AwaitTokenReady, ack) if ack == ACK_READY => {
                let keys = state.keys.as_ref().unwrap();
                let token =
                    compute_device_token(&keys.session_key, &state.dev_random, &state.app_random)
                        .unwrap();
                state.step = AuthStep::AwaitTokenAck;
                split_token(&token).into_iter().map(|f| auth(&f)).collect()
            }
            (AuthStep::AwaitTokenAck, ack) if ack == ACK_SUCCESS => {
                state.step = AuthStep::AwaitPrepareToken;
                Vec::new()
            }
            (AuthStep::AwaitPrepareToken, op) if op == OP_PREPARE_TOKEN => {
                state.step = AuthStep::AwaitFirstFragment;
                vec![auth(ACK_READY)]
            }
            (AuthStep::AwaitFirstFragment, frame) => {
                state.first_fragment = frame.to_vec();
                state.step = AuthStep::AwaitSecondFragment;
                Vec::new()
            }
            (AuthStep::AwaitSecondFragment, frame) => {
                let token = reassemble_fragments(&[state.first_fragment.as_slice(), frame]);
                let expected = state.keys.as_ref().map(|keys| keys.app_token.to_vec());
                if Some(token) != expected {
                    state.step = AuthStep::Idle;
                    return Vec::new();
                }
                state.step = AuthStep::Done;
                match self.options.fault {
                    Some(HandshakeFault::NoTokenAck) => vec![(AUTH_INIT_UUID, OP_SUCCESS.to_vec())],
                    Some(HandshakeFault::NoFinalSuccess) => vec![auth(ACK_SUCCESS)],
                    _ => {
                        state.logins += 1;
                        vec![auth(ACK_SUCCESS), (AUTH_INIT_UUID, OP_SUCCESS.to_vec())]
                    }
                }
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl KettleLink for MockKettle {
    async fn connect(&self) -> Result<(), LinkError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.options.failing_connects {
            return Err(LinkError::ConnectionTimeout);
        }
        let mut state = self.lock();
        state.connected = true;
        state.step = AuthStep::Idle;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.connected = false;
        state.handlers.clear();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn local_name(&self) -> Result<Option<String>, LinkError> {
        Ok(self.options.name.clone())
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>, LinkError> {
        let characteristics: Vec<Uuid> = REQUIRED_CHARACTERISTICS
            .into_iter()
            .filter(|uuid| Some(*uuid) != self.options.missing_characteristic)
            .collect();
        let (auth, biz): (Vec<Uuid>, Vec<Uuid>) = characteristics
            .into_iter()
            .partition(|uuid| *uuid == AUTH_INIT_UUID || *uuid == AUTH_UUID);
        Ok(vec![
            ServiceInfo {
                uuid: SERVICE_AUTH_UUID,
                characteristics: auth,
            },
            ServiceInfo {
                uuid: SERVICE_BIZ_UUID,
                characteristics: biz,
            },
        ])
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
        let state = self.lock();
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        if characteristic == READ_MODE_CONFIG_UUID {
            Ok(state.record.clone())
        } else {
            Err(LinkError::CharacteristicNotFound(characteristic))
        }
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        _with_response: bool,
    ) -> Result<(), LinkError> {
        let responses = {
            let mut state = self.lock();
            if !state.connected {
                return Err(LinkError::NotConnected);
            }
            state.writes.push((characteristic, data.to_vec()));
            if characteristic == WRITE_MODE_CONFIG_UUID {
                state.record = data.to_vec();
            }
            self.respond(&mut state, characteristic, data)
        };
        self.notify(responses);
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: FrameHandler,
    ) -> Result<(), LinkError> {
        self.lock().handlers.insert(characteristic, handler);
        if characteristic == WARM_STATUS_UUID {
            if let Some(frame) = self.options.initial_status.clone() {
                self.push_status(frame);
            }
        }
        Ok(())
    }

    fn set_disconnect_handler(&self, handler: DisconnectHandler) {
        self.lock().disconnect_handler = Some(handler);
    }
}
