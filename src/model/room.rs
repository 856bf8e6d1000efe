//! Heated rooms: mode, setpoint, and per-mode setpoint memory (§3, §4.5,
//! §4.6).

use std::collections::HashMap;
use std::sync::{RwLock as StdRwLock, Weak};

use serde_json::Value;
use tracing::{trace, warn};

use crate::command::CommandSink;
use crate::error::Result;
use crate::model::RoomId;
use crate::protocol::MessageType;
use crate::state::bus::{StateBus, StateSubscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomMode {
    Cool,
    Eco,
    Comfort,
}

impl RoomMode {
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Cool,
            3 => Self::Comfort,
            _ => Self::Eco,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Cool => 1,
            Self::Eco => 2,
            Self::Comfort => 3,
        }
    }

    /// Admissible setpoint range for this mode (§3).
    pub fn setpoint_range(self) -> (f64, f64) {
        match self {
            Self::Cool => (5.0, 20.0),
            Self::Eco => (10.0, 30.0),
            Self::Comfort => (18.0, 40.0),
        }
    }

    pub fn clamp_setpoint(self, value: f64) -> f64 {
        let (min, max) = self.setpoint_range();
        value.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RctState {
    Idle,
    Active,
}

impl RctState {
    pub fn from_i64(value: i64) -> Self {
        match value {
            2 => Self::Active,
            _ => Self::Idle,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Active => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomState {
    pub setpoint: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub power: f64,
    pub mode: RoomMode,
    pub rct_state: RctState,
}

pub struct Room {
    room_id: RoomId,
    name: StdRwLock<String>,
    bus: StateBus<RoomState>,
    setpoint_memory: StdRwLock<HashMap<RoomMode, f64>>,
    bridge: Weak<dyn CommandSink>,
}

impl Room {
    pub fn new(room_id: RoomId, name: String, bridge: Weak<dyn CommandSink>) -> Self {
        Self {
            room_id,
            name: StdRwLock::new(name),
            bus: StateBus::new(),
            setpoint_memory: StdRwLock::new(HashMap::new()),
            bridge,
        }
    }

    pub fn id(&self) -> RoomId {
        self.room_id
    }

    pub fn name(&self) -> String {
        self.name.read().expect("room name lock poisoned").clone()
    }

    pub fn subscribe(&self) -> StateSubscription<RoomState> {
        self.bus.subscribe()
    }

    pub fn current_state(&self) -> Option<RoomState> {
        self.bus.current()
    }

    /// Project a `rooms`/`roomHeating` payload entry (§4.5). Mode resolves
    /// from `currentMode`, falling back to `mode`, defaulting to Eco; a
    /// `modes` array seeds the per-mode setpoint memory.
    pub fn apply(&self, payload: &Value) {
        if let Some(name) = payload.get("name").and_then(Value::as_str) {
            *self.name.write().expect("room name lock poisoned") = name.to_string();
        }

        let mode = payload
            .get("currentMode")
            .or_else(|| payload.get("mode"))
            .and_then(Value::as_i64)
            .map(RoomMode::from_i64)
            .unwrap_or(RoomMode::Eco);

        let state = RoomState {
            setpoint: payload.get("setpoint").and_then(Value::as_f64),
            temperature: payload.get("temp").and_then(Value::as_f64),
            humidity: payload.get("humidity").and_then(Value::as_f64),
            power: payload.get("power").and_then(Value::as_f64).unwrap_or(0.0),
            mode,
            rct_state: payload.get("state").and_then(Value::as_i64).map(RctState::from_i64).unwrap_or(RctState::Idle),
        };

        if let Some(modes) = payload.get("modes").and_then(Value::as_array) {
            let mut memory = self.setpoint_memory.write().expect("room setpoint memory lock poisoned");
            for entry in modes {
                let (Some(mode), Some(value)) = (
                    entry.get("mode").and_then(Value::as_i64).map(RoomMode::from_i64),
                    entry.get("value").and_then(Value::as_f64),
                ) else {
                    continue;
                };
                memory.insert(mode, value);
            }
        }

        self.bus.publish(state);
    }

    /// `Room.set_target_temperature` (§4.6): requires an observed state,
    /// clamps to the active mode's range, remembers it, and sends
    /// `SET_HEATING_STATE` with `confirmed:false`.
    pub async fn set_target_temperature(&self, setpoint: f64) -> Result<()> {
        let Some(current) = self.bus.current() else {
            trace!(room_id = %self.room_id, "set_target_temperature dropped: no observed state");
            return Ok(());
        };
        let clamped = current.mode.clamp_setpoint(setpoint);
        self.setpoint_memory.write().expect("room setpoint memory lock poisoned").insert(current.mode, clamped);
        self.send(current.mode, current.rct_state, clamped).await
    }

    /// `Room.set_mode` (§4.6): requires an observed state; the setpoint is
    /// recalled from per-mode memory, defaulting to 20.0.
    pub async fn set_mode(&self, mode: RoomMode) -> Result<()> {
        let Some(current) = self.bus.current() else {
            trace!(room_id = %self.room_id, "set_mode dropped: no observed state");
            return Ok(());
        };
        let setpoint = *self.setpoint_memory.read().expect("room setpoint memory lock poisoned").get(&mode).unwrap_or(&20.0);
        self.send(mode, current.rct_state, setpoint).await
    }

    async fn send(&self, mode: RoomMode, rct_state: RctState, setpoint: f64) -> Result<()> {
        let payload = serde_json::json!({
            "roomId": self.room_id.0,
            "mode": mode.to_i64(),
            "state": rct_state.to_i64(),
            "setpoint": setpoint,
            "confirmed": false,
        });
        match self.bridge.upgrade() {
            Some(sink) => sink.send_message(MessageType::SetHeatingState, payload).await,
            None => {
                warn!(room_id = %self.room_id, "command dropped: bridge gone");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullSink;

    #[async_trait::async_trait]
    impl CommandSink for NullSink {
        async fn send_message(&self, _type_int: MessageType, _payload: Value) -> Result<()> {
            Ok(())
        }
    }

    fn inert_sink() -> Weak<dyn CommandSink> {
        let arc: Arc<dyn CommandSink> = Arc::new(NullSink);
        Arc::downgrade(&arc)
    }

    fn room() -> Room {
        Room::new(RoomId(3), "lounge".to_string(), inert_sink())
    }

    #[test]
    fn projects_mode_setpoint_and_records_memory() {
        let r = room();
        r.apply(&serde_json::json!({
            "temp": 21.4,
            "setpoint": 22.0,
            "currentMode": 3,
            "state": 0,
            "modes": [{"mode": 3, "value": 22.0}],
        }));
        let state = r.current_state().unwrap();
        assert_eq!(state.mode, RoomMode::Comfort);
        assert_eq!(state.setpoint, Some(22.0));
        assert_eq!(state.rct_state, RctState::Idle);
    }

    #[test]
    fn mode_without_current_mode_falls_back_to_mode_then_eco() {
        let r = room();
        r.apply(&serde_json::json!({ "mode": 1 }));
        assert_eq!(r.current_state().unwrap().mode, RoomMode::Cool);

        let r2 = room();
        r2.apply(&serde_json::json!({}));
        assert_eq!(r2.current_state().unwrap().mode, RoomMode::Eco);
    }

    #[test]
    fn setpoint_range_clamps_per_mode() {
        assert_eq!(RoomMode::Cool.clamp_setpoint(30.0), 20.0);
        assert_eq!(RoomMode::Eco.clamp_setpoint(5.0), 10.0);
        assert_eq!(RoomMode::Comfort.clamp_setpoint(50.0), 40.0);
    }
}
