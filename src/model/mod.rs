//! The device/room/component model and its per-entity state projection
//! (§3, §4.5).

pub mod component;
pub mod device;
pub mod room;

pub use component::Component;
pub use device::{Device, DeviceKind, DeviceState, LightState, RcTouchState};
pub use room::{Room, RoomMode, RoomState, RctState};

use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(DeviceId);
id_newtype!(RoomId);
id_newtype!(CompId);

/// Pull an unsigned id out of a JSON value, accepting either a number or a
/// numeric string — the bridge's own payloads use both depending on frame
/// type.
pub(crate) fn parse_id(value: &serde_json::Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value.as_str().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_number_or_string() {
        assert_eq!(parse_id(&serde_json::json!(7)), Some(7));
        assert_eq!(parse_id(&serde_json::json!("7")), Some(7));
        assert_eq!(parse_id(&serde_json::json!("nope")), None);
    }
}
