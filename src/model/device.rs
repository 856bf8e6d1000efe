//! Devices: lights, shades, heaters, RcTouch sensors, and anything else
//! the bridge reports (§3, §4.5, §4.6).

use std::sync::{RwLock as StdRwLock, Weak};

use serde_json::Value;
use tracing::trace;

use crate::command::CommandSink;
use crate::error::Result;
use crate::model::{DeviceId, parse_id};
use crate::protocol::MessageType;
use crate::state::bus::{StateBus, StateSubscription};

/// `dev_type` codes that classify a payload into a [`DeviceKind`] (§3).
mod dev_type {
    pub const LIGHT_SWITCH: i64 = 100;
    pub const LIGHT_DIMMABLE: i64 = 101;
    pub const SHADE: i64 = 102;
    pub const HEATER: i64 = 440;
    pub const RC_TOUCH: i64 = 450;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Light,
    Shade,
    Heater,
    RcTouch,
    Generic,
}

impl DeviceKind {
    /// Classify by `dev_type` alone (§3). Both light codes (100, 101)
    /// yield `Light`; whether a given light is dimmable is a per-device
    /// payload attribute, not implied by which of the two codes it carries
    /// (§4.5, §6 — device entries carry their own `dimmable` field).
    pub fn classify(dev_type: i64) -> Self {
        match dev_type {
            dev_type::LIGHT_SWITCH | dev_type::LIGHT_DIMMABLE => Self::Light,
            dev_type::SHADE => Self::Shade,
            dev_type::HEATER => Self::Heater,
            dev_type::RC_TOUCH => Self::RcTouch,
            _ => Self::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub switch: bool,
    pub dimm_value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RcTouchState {
    pub temperature: f64,
    pub humidity: f64,
}

/// The observable state of a device. Light and RcTouch get a structured
/// projection; shades, heaters and generic devices publish the raw payload
/// verbatim (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    Light(LightState),
    RcTouch(RcTouchState),
    Opaque(Value),
}

/// A single device known to the bridge.
pub struct Device {
    device_id: DeviceId,
    name: StdRwLock<String>,
    dev_type: i64,
    comp_id: StdRwLock<Option<u64>>,
    /// Whether this light dimmable, per the payload's own `dimmable`
    /// field (§3, §6). Meaningless for non-`Light` kinds; defaults to
    /// `false` until a payload carrying the field has been observed.
    dimmable: StdRwLock<bool>,
    kind: DeviceKind,
    bus: StateBus<DeviceState>,
    bridge: Weak<dyn CommandSink>,
}

impl Device {
    pub fn new(device_id: DeviceId, name: String, dev_type: i64, bridge: Weak<dyn CommandSink>) -> Self {
        Self {
            device_id,
            name: StdRwLock::new(name),
            dev_type,
            comp_id: StdRwLock::new(None),
            dimmable: StdRwLock::new(false),
            kind: DeviceKind::classify(dev_type),
            bus: StateBus::new(),
            bridge,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.device_id
    }

    pub fn name(&self) -> String {
        self.name.read().expect("device name lock poisoned").clone()
    }

    pub fn dev_type(&self) -> i64 {
        self.dev_type
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn comp_id(&self) -> Option<u64> {
        *self.comp_id.read().expect("device comp_id lock poisoned")
    }

    pub fn subscribe(&self) -> StateSubscription<DeviceState> {
        self.bus.subscribe()
    }

    pub fn current_state(&self) -> Option<DeviceState> {
        self.bus.current()
    }

    /// Update attributes that may appear on catalogue (§4.7 `SET_ALL_DATA`)
    /// entries but not on later state-only frames, then project `payload`
    /// into a fresh [`DeviceState`] and publish it.
    pub fn apply(&self, payload: &Value) {
        if let Some(name) = payload.get("name").and_then(Value::as_str) {
            *self.name.write().expect("device name lock poisoned") = name.to_string();
        }
        if let Some(comp_id) = payload.get("compId").and_then(parse_id) {
            *self.comp_id.write().expect("device comp_id lock poisoned") = Some(comp_id);
        }
        if let Some(dimmable) = payload.get("dimmable").and_then(Value::as_bool) {
            *self.dimmable.write().expect("device dimmable lock poisoned") = dimmable;
        }
        self.project(payload);
    }

    fn project(&self, payload: &Value) {
        let state = match self.kind {
            DeviceKind::Light => self.project_light(payload),
            DeviceKind::RcTouch => self.project_rc_touch(payload),
            DeviceKind::Shade | DeviceKind::Heater | DeviceKind::Generic => {
                DeviceState::Opaque(payload.clone())
            }
        };
        self.bus.publish(state);
    }

    /// Light projection (§4.5): `dimm_value` is pinned to 99 for non-dimmable
    /// fixtures, read from `dimmvalue` while switched on, and otherwise
    /// carried forward from the last observed state. `dimmable` comes from
    /// the payload's own attribute (§6), not from the 100/101 `dev_type`
    /// code.
    fn project_light(&self, payload: &Value) -> DeviceState {
        let dimmable = *self.dimmable.read().expect("device dimmable lock poisoned");
        let switch = payload.get("switch").and_then(Value::as_bool).unwrap_or(false);
        let previous_dim = match self.bus.current() {
            Some(DeviceState::Light(light)) => light.dimm_value,
            _ => 99,
        };
        let dimm_value = if !dimmable {
            99
        } else if switch {
            payload
                .get("dimmvalue")
                .and_then(Value::as_u64)
                .map(|v| v.min(99) as u8)
                .unwrap_or(99)
        } else {
            previous_dim
        };
        DeviceState::Light(LightState { switch, dimm_value })
    }

    /// RcTouch projection (§4.5): scan `info` for codes `1222`
    /// (temperature) and `1223` (humidity).
    fn project_rc_touch(&self, payload: &Value) -> DeviceState {
        let mut temperature = 0.0;
        let mut humidity = 0.0;
        if let Some(info) = payload.get("info").and_then(Value::as_array) {
            for entry in info {
                let Some(text) = entry.get("text").and_then(Value::as_str) else {
                    continue;
                };
                let value = entry
                    .get("value")
                    .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|n| n.to_string())))
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0);
                match text {
                    "1222" => temperature = value,
                    "1223" => humidity = value,
                    _ => {}
                }
            }
        }
        DeviceState::RcTouch(RcTouchState { temperature, humidity })
    }

    /// `ACTION_SWITCH_DEVICE {deviceId, switch}` (§4.6).
    pub async fn switch(&self, on: bool) -> Result<()> {
        self.send(
            MessageType::ActionSwitchDevice,
            serde_json::json!({ "deviceId": self.device_id.0, "switch": on }),
        )
        .await
    }

    /// `ACTION_SLIDE_DEVICE {deviceId, dimmvalue}`, clamped to [0, 99] (§4.6,
    /// §8).
    pub async fn dim(&self, value: i64) -> Result<()> {
        let clamped = value.clamp(0, 99);
        self.send(
            MessageType::ActionSlideDevice,
            serde_json::json!({ "deviceId": self.device_id.0, "dimmvalue": clamped }),
        )
        .await
    }

    /// `SET_DEVICE_SHADING_STATE {deviceId, state}`; 1 = down, 2 = stop, 3 =
    /// up (§4.6).
    pub async fn move_down(&self) -> Result<()> {
        self.shade(1).await
    }

    pub async fn move_up(&self) -> Result<()> {
        self.shade(3).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.shade(2).await
    }

    async fn shade(&self, state: i64) -> Result<()> {
        self.send(
            MessageType::SetDeviceShadingState,
            serde_json::json!({ "deviceId": self.device_id.0, "state": state }),
        )
        .await
    }

    async fn send(&self, type_int: MessageType, payload: Value) -> Result<()> {
        match self.bridge.upgrade() {
            Some(sink) => sink.send_message(type_int, payload).await,
            None => {
                trace!(device_id = %self.device_id, "command dropped: bridge gone");
                Ok(())
            }
        }
    }
}
