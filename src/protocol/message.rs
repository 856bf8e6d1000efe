//! The message catalogue: symbolic names for the bridge's numeric
//! `type_int` protocol codes (§4.1).
//!
//! Unknown codes are tolerated on receive — `MessageType` always round-trips
//! through its integer form, falling back to [`MessageType::Other`] for
//! anything not named here, the same way the teacher's `MessageType` enum
//! falls back to an `Unknown` variant for codes outside its known table.

use serde::{Deserialize, Serialize};

/// A protocol message kind. Serializes/deserializes as its bare integer
/// `type_int` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Ack,
    LoginRequest,
    ConnectionHello,
    SecureInit,
    SecureKey,
    SecureReady,
    LoginSubmit,
    LoginAccept,
    TokenValidate,
    TokenRenew,
    TokenRenewed,
    Nack,
    ConnectionDeclined,
    SetDeviceState,
    SetStateInfo,
    SetAllData,
    SetDeviceShadingState,
    SetHeatingState,
    ActionSwitchDevice,
    ActionSlideDevice,
    QuerySessionState,
    QueryCatalogue,
    /// The first server frame of a connection has no named `type_int` of
    /// its own in the spec; the bridge only inspects its payload. Used as
    /// a placeholder when constructing outbound frames is irrelevant.
    Other(i64),
}

impl MessageType {
    pub const ACK: i64 = 1;
    pub const LOGIN_REQUEST: i64 = 2;
    pub const CONNECTION_HELLO: i64 = 11;
    pub const SECURE_INIT: i64 = 14;
    pub const SECURE_KEY: i64 = 16;
    pub const SECURE_READY: i64 = 17;
    pub const LOGIN_SUBMIT: i64 = 30;
    pub const LOGIN_ACCEPT: i64 = 32;
    pub const TOKEN_VALIDATE: i64 = 33;
    pub const TOKEN_RENEW: i64 = 37;
    pub const TOKEN_RENEWED: i64 = 38;
    pub const NACK: i64 = 0;
    pub const CONNECTION_DECLINED: i64 = 12;
    pub const SET_DEVICE_STATE: i64 = 50;
    pub const SET_STATE_INFO: i64 = 51;
    pub const SET_ALL_DATA: i64 = 52;
    pub const SET_DEVICE_SHADING_STATE: i64 = 53;
    pub const SET_HEATING_STATE: i64 = 54;
    pub const ACTION_SWITCH_DEVICE: i64 = 60;
    pub const ACTION_SLIDE_DEVICE: i64 = 61;
    pub const QUERY_SESSION_STATE: i64 = 240;
    pub const QUERY_CATALOGUE: i64 = 242;

    pub fn from_i64(value: i64) -> Self {
        match value {
            Self::ACK => Self::Ack,
            Self::LOGIN_REQUEST => Self::LoginRequest,
            Self::CONNECTION_HELLO => Self::ConnectionHello,
            Self::SECURE_INIT => Self::SecureInit,
            Self::SECURE_KEY => Self::SecureKey,
            Self::SECURE_READY => Self::SecureReady,
            Self::LOGIN_SUBMIT => Self::LoginSubmit,
            Self::LOGIN_ACCEPT => Self::LoginAccept,
            Self::TOKEN_VALIDATE => Self::TokenValidate,
            Self::TOKEN_RENEW => Self::TokenRenew,
            Self::TOKEN_RENEWED => Self::TokenRenewed,
            Self::NACK => Self::Nack,
            Self::CONNECTION_DECLINED => Self::ConnectionDeclined,
            Self::SET_DEVICE_STATE => Self::SetDeviceState,
            Self::SET_STATE_INFO => Self::SetStateInfo,
            Self::SET_ALL_DATA => Self::SetAllData,
            Self::SET_DEVICE_SHADING_STATE => Self::SetDeviceShadingState,
            Self::SET_HEATING_STATE => Self::SetHeatingState,
            Self::ACTION_SWITCH_DEVICE => Self::ActionSwitchDevice,
            Self::ACTION_SLIDE_DEVICE => Self::ActionSlideDevice,
            Self::QUERY_SESSION_STATE => Self::QuerySessionState,
            Self::QUERY_CATALOGUE => Self::QueryCatalogue,
            other => Self::Other(other),
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Ack => Self::ACK,
            Self::LoginRequest => Self::LOGIN_REQUEST,
            Self::ConnectionHello => Self::CONNECTION_HELLO,
            Self::SecureInit => Self::SECURE_INIT,
            Self::SecureKey => Self::SECURE_KEY,
            Self::SecureReady => Self::SECURE_READY,
            Self::LoginSubmit => Self::LOGIN_SUBMIT,
            Self::LoginAccept => Self::LOGIN_ACCEPT,
            Self::TokenValidate => Self::TOKEN_VALIDATE,
            Self::TokenRenew => Self::TOKEN_RENEW,
            Self::TokenRenewed => Self::TOKEN_RENEWED,
            Self::Nack => Self::NACK,
            Self::ConnectionDeclined => Self::CONNECTION_DECLINED,
            Self::SetDeviceState => Self::SET_DEVICE_STATE,
            Self::SetStateInfo => Self::SET_STATE_INFO,
            Self::SetAllData => Self::SET_ALL_DATA,
            Self::SetDeviceShadingState => Self::SET_DEVICE_SHADING_STATE,
            Self::SetHeatingState => Self::SET_HEATING_STATE,
            Self::ActionSwitchDevice => Self::ACTION_SWITCH_DEVICE,
            Self::ActionSlideDevice => Self::ACTION_SLIDE_DEVICE,
            Self::QuerySessionState => Self::QUERY_SESSION_STATE,
            Self::QueryCatalogue => Self::QUERY_CATALOGUE,
            Self::Other(v) => v,
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.to_i64())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Self::from_i64(value))
    }
}
