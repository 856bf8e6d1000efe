//! Components: named groupings of devices maintained by the bridge (§3).
//! Command-free; state is published verbatim.

use serde_json::Value;
use std::sync::RwLock as StdRwLock;

use crate::model::CompId;
use crate::state::bus::{StateBus, StateSubscription};

pub struct Component {
    comp_id: CompId,
    name: StdRwLock<String>,
    comp_type: StdRwLock<i64>,
    bus: StateBus<Value>,
}

impl Component {
    pub fn new(comp_id: CompId, name: String, comp_type: i64) -> Self {
        Self {
            comp_id,
            name: StdRwLock::new(name),
            comp_type: StdRwLock::new(comp_type),
            bus: StateBus::new(),
        }
    }

    pub fn id(&self) -> CompId {
        self.comp_id
    }

    pub fn name(&self) -> String {
        self.name.read().expect("component name lock poisoned").clone()
    }

    pub fn comp_type(&self) -> i64 {
        *self.comp_type.read().expect("component comp_type lock poisoned")
    }

    pub fn subscribe(&self) -> StateSubscription<Value> {
        self.bus.subscribe()
    }

    pub fn current_state(&self) -> Option<Value> {
        self.bus.current()
    }

    pub fn apply(&self, payload: &Value) {
        if let Some(name) = payload.get("name").and_then(Value::as_str) {
            *self.name.write().expect("component name lock poisoned") = name.to_string();
        }
        if let Some(comp_type) = payload.get("compType").and_then(Value::as_i64) {
            *self.comp_type.write().expect("component comp_type lock poisoned") = comp_type;
        }
        self.bus.publish(payload.clone());
    }
}
