//! The bridge supervisor: lifecycle state machine, reconnect loop, and
//! dispatcher (§4.7).
//!
//! The only public entry point. Owns the catalogues and the current
//! [`SecureConnection`]; entities reach back into it only through the
//! [`CommandSink`] handle (§9).

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::CommandSink;
use crate::error::Result;
use crate::handshake;
use crate::logger::{LogLevel, Logger, LoggerFn};
use crate::model::{CompId, Component, Device, DeviceId, Room, RoomId, parse_id};
use crate::protocol::{Envelope, MessageType};
use crate::state::catalogue::Catalogue;
use crate::transport::SecureConnection;

/// Bridge lifecycle state (§3). Mutated only by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Closing,
}

/// State shared between the public [`Bridge`] handle and every entity it
/// owns. Never exposed directly — entities see it only through
/// [`CommandSink`].
struct BridgeShared {
    self_weak: Weak<BridgeShared>,
    state: RwLock<LifecycleState>,
    connection: RwLock<Option<Arc<SecureConnection>>>,
    devices: Catalogue<DeviceId, Device>,
    rooms: Catalogue<RoomId, Room>,
    comps: Catalogue<CompId, Component>,
    logger: StdRwLock<Logger>,
}

impl BridgeShared {
    fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            state: RwLock::new(LifecycleState::Uninitialized),
            connection: RwLock::new(None),
            devices: Catalogue::new(),
            rooms: Catalogue::new(),
            comps: Catalogue::new(),
            logger: StdRwLock::new(Logger::default()),
        })
    }

    fn command_sink(&self) -> Weak<dyn CommandSink> {
        self.self_weak.clone()
    }

    fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.logger.read().expect("logger lock poisoned").log(level, message);
    }

    /// Dispatch one inbound envelope (§4.7). Per-item failures are caught
    /// and logged; they never tear down the pump.
    async fn dispatch(&self, envelope: Envelope) {
        match envelope.type_int {
            MessageType::SetDeviceState => self.dispatch_device_state(&envelope.payload).await,
            MessageType::SetStateInfo => self.dispatch_state_info(&envelope.payload).await,
            MessageType::SetAllData => self.dispatch_all_data(&envelope.payload).await,
            other => self.log(LogLevel::Warn, format!("unhandled message type {}", other.to_i64())),
        }
    }

    async fn dispatch_device_state(&self, payload: &Value) {
        let Some(device_id) = payload.get("deviceId").and_then(parse_id).map(DeviceId) else {
            self.log(LogLevel::Warn, "SET_DEVICE_STATE missing deviceId");
            return;
        };
        match self.devices.get(&device_id).await {
            Some(device) => device.apply(payload),
            None => self.log(LogLevel::Trace, format!("SET_DEVICE_STATE for unknown device {device_id}")),
        }
    }

    async fn dispatch_state_info(&self, payload: &Value) {
        let Some(items) = payload.get("item").and_then(Value::as_array) else {
            self.log(LogLevel::Warn, "SET_STATE_INFO missing item array");
            return;
        };
        for item in items {
            if let Some(id) = item.get("deviceId").and_then(parse_id) {
                match self.devices.get(&DeviceId(id)).await {
                    Some(device) => device.apply(item),
                    None => self.log(LogLevel::Trace, format!("SET_STATE_INFO for unknown device {id}")),
                }
            } else if let Some(id) = item.get("roomId").and_then(parse_id) {
                match self.rooms.get(&RoomId(id)).await {
                    Some(room) => room.apply(item),
                    None => self.log(LogLevel::Trace, format!("SET_STATE_INFO for unknown room {id}")),
                }
            } else if let Some(id) = item.get("compId").and_then(parse_id) {
                match self.comps.get(&CompId(id)).await {
                    Some(comp) => comp.apply(item),
                    None => self.log(LogLevel::Trace, format!("SET_STATE_INFO for unknown comp {id}")),
                }
            } else {
                self.log(LogLevel::Warn, "SET_STATE_INFO item carries no deviceId/roomId/compId");
            }
        }
    }

    async fn dispatch_all_data(&self, payload: &Value) {
        if let Some(devices) = payload.get("devices").and_then(Value::as_array) {
            for entry in devices {
                self.upsert_device(entry).await;
            }
        }
        if let Some(comps) = payload.get("comps").and_then(Value::as_array) {
            for entry in comps {
                self.upsert_comp(entry).await;
            }
        }
        if let Some(rooms) = payload.get("rooms").and_then(Value::as_array) {
            for entry in rooms {
                self.upsert_room(entry).await;
            }
        }
        if let Some(room_heating) = payload.get("roomHeating").and_then(Value::as_array) {
            for entry in room_heating {
                self.upsert_room(entry).await;
            }
        }
        if payload.get("lastItem").is_some() {
            *self.state.write().await = LifecycleState::Ready;
            info!("catalogue complete, bridge ready");
        }
    }

    async fn upsert_device(&self, payload: &Value) {
        let Some(id) = payload.get("deviceId").and_then(parse_id) else {
            self.log(LogLevel::Warn, "device entry missing deviceId");
            return;
        };
        let device_id = DeviceId(id);
        let dev_type = payload.get("devType").and_then(Value::as_i64).unwrap_or(-1);
        let name = payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let sink = self.command_sink();
        let device = self
            .devices
            .get_or_insert_with(device_id, || Device::new(device_id, name, dev_type, sink))
            .await;
        device.apply(payload);
    }

    async fn upsert_comp(&self, payload: &Value) {
        let Some(id) = payload.get("compId").and_then(parse_id) else {
            self.log(LogLevel::Warn, "comp entry missing compId");
            return;
        };
        let comp_id = CompId(id);
        let comp_type = payload.get("compType").and_then(Value::as_i64).unwrap_or(-1);
        let name = payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let comp = self.comps.get_or_insert_with(comp_id, || Component::new(comp_id, name, comp_type)).await;
        comp.apply(payload);
    }

    async fn upsert_room(&self, payload: &Value) {
        let Some(id) = payload.get("roomId").and_then(parse_id) else {
            self.log(LogLevel::Warn, "room entry missing roomId");
            return;
        };
        let room_id = RoomId(id);
        let name = payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        let sink = self.command_sink();
        let room = self.rooms.get_or_insert_with(room_id, || Room::new(room_id, name, sink)).await;
        room.apply(payload);
    }
}

#[async_trait]
impl CommandSink for BridgeShared {
    async fn send_message(&self, type_int: MessageType, payload: Value) -> Result<()> {
        let conn = self.connection.read().await.clone();
        match conn {
            Some(conn) => {
                conn.send_message(type_int, payload).await?;
                Ok(())
            }
            None => {
                self.log(LogLevel::Trace, "command dropped: no connection");
                Ok(())
            }
        }
    }
}

/// The public handle to a bridge connection (§4.7, §6 "Public library
/// API").
pub struct Bridge {
    shared: Arc<BridgeShared>,
    ip: String,
    auth_key: String,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(ip: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            shared: BridgeShared::new(),
            ip: ip.into(),
            auth_key: auth_key.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a callback to receive the same events the crate logs
    /// through `tracing`.
    pub fn set_logger(&self, logger: LoggerFn) {
        self.shared.logger.write().expect("logger lock poisoned").set(logger);
    }

    /// Drive the bridge: handshake, dispatch, reconnect-with-backoff,
    /// forever, until [`Self::close`] is called (§4.7).
    ///
    /// May be called at most once concurrently — invoking it while the
    /// bridge is not `Uninitialized` fails with
    /// [`crate::error::BridgeError::InvalidRunState`].
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if *state != LifecycleState::Uninitialized {
                return Err(crate::error::BridgeError::InvalidRunState);
            }
            *state = LifecycleState::Initializing;
        }

        while !self.cancel.is_cancelled() {
            if let Err(e) = self.run_once().await {
                self.shared.log(LogLevel::Error, format!("connection error: {e}"));
            }

            if self.cancel.is_cancelled() {
                break;
            }

            *self.shared.state.write().await = LifecycleState::Initializing;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        *self.shared.state.write().await = LifecycleState::Uninitialized;
        Ok(())
    }

    async fn run_once(&self) -> Result<()> {
        let outcome = handshake::perform(&self.ip, &self.auth_key).await?;
        let connection = Arc::new(outcome.connection);
        *self.shared.connection.write().await = Some(connection.clone());

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let shared = self.shared.clone();
        let dispatch_task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                shared.dispatch(envelope).await;
            }
        });

        let result = connection.pump(outcome.stream, tx, self.cancel.clone()).await;

        *self.shared.connection.write().await = None;
        dispatch_task.abort();
        result
    }

    /// Block until the catalogue is complete (§4.7).
    pub async fn wait_for_initialization(&self) {
        loop {
            if *self.shared.state.read().await == LifecycleState::Ready {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn get_devices(&self) -> HashMap<DeviceId, Arc<Device>> {
        self.wait_for_initialization().await;
        self.shared.devices.snapshot().await
    }

    pub async fn get_rooms(&self) -> HashMap<RoomId, Arc<Room>> {
        self.wait_for_initialization().await;
        self.shared.rooms.snapshot().await
    }

    pub async fn get_comps(&self) -> HashMap<CompId, Arc<Component>> {
        self.wait_for_initialization().await;
        self.shared.comps.snapshot().await
    }

    /// Cooperatively stop the run loop and pump. Catalogue contents and
    /// entity subscriptions survive; they simply stop receiving updates.
    pub async fn close(&self) {
        *self.shared.state.write().await = LifecycleState::Closing;
        self.cancel.cancel();
        warn!("bridge closing");
    }
}
