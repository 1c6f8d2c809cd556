//! Wire payloads exchanged with web clients

use serde::{Deserialize, Serialize};

/// Rotation of the live-view image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    DegMinus90,
    Deg90,
    Deg180,
}

impl Rotation {
    /// Decode the wire value; anything unspecified collapses to 0 degrees.
    pub fn from_wire(raw: i8) -> Self {
        match raw {
            1 => Rotation::DegMinus90,
            2 => Rotation::Deg90,
            3 => Rotation::Deg180,
            _ => Rotation::Deg0,
        }
    }
}

/// Autofocus outcome reported in the live-view header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AfStatus {
    #[default]
    NotActive,
    Fail,
    Success,
}

impl AfStatus {
    pub fn from_wire(raw: i8) -> Self {
        match raw {
            1 => AfStatus::Fail,
            2 => AfStatus::Success,
            _ => AfStatus::NotActive,
        }
    }
}

/// Inbound control message; every field is optional and absent fields
/// leave the corresponding state untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlPayload {
    /// Autofocus cadence in seconds; 0 disables periodic AF
    #[serde(default)]
    pub af_interval: Option<i64>,
    /// Fire one AF drive immediately
    #[serde(default)]
    pub af_focus_now: Option<bool>,
    /// Capture rate limit in frames per second; 0 disables the throttle
    #[serde(default)]
    pub lr_fps: Option<i64>,
    /// ISO sensitivity
    #[serde(default)]
    pub iso: Option<i32>,
    /// f-number as a decimal string, e.g. "5.6"
    #[serde(default, rename = "fn")]
    pub f_number: Option<String>,
}

/// Metadata snapshot broadcast to control clients once per second
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfoPayload {
    pub iso: i32,
    pub isos: Vec<i32>,
    #[serde(rename = "fn")]
    pub f_number: String,
    pub fns: Vec<String>,
    pub af: i64,
    pub lr: i64,
    pub width: i32,
    pub height: i32,
    pub fps: i64,
    /// Latest JPEG, base64-encoded
    pub frame: String,
}
