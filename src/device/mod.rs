//! MTP device gateway contract
//!
//! ## Responsibilities
//!
//! - Typed boundary to the MTP/PTP transport (the transport itself lives
//!   outside this crate and is handed in as a trait object)
//! - Nikon opcode / property-code constants
//! - Property descriptor decoding types
//!
//! The gateway is not thread-safe; callers serialize access through the
//! session's MTP lock.

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

/// Nikon vendor operation codes
pub const OC_NIKON_AF_DRIVE: u16 = 0x90C1;
pub const OC_NIKON_DEVICE_READY: u16 = 0x90C8;
pub const OC_NIKON_START_LIVE_VIEW: u16 = 0x9201;
pub const OC_NIKON_END_LIVE_VIEW: u16 = 0x9202;
pub const OC_NIKON_GET_LIVE_VIEW_IMG: u16 = 0x9203;

/// Device property codes
pub const DPC_FNUMBER: u16 = 0x5007;
pub const DPC_EXPOSURE_INDEX: u16 = 0x500F;
pub const DPC_NIKON_RECORDING_MEDIA: u16 = 0xD10B;
pub const DPC_NIKON_LIVE_VIEW_STATUS: u16 = 0xD1A2;
pub const DPC_NIKON_LIVE_VIEW_PROHIBIT_CONDITION: u16 = 0xD1A4;
pub const DPC_NIKON_RESOLUTION: u16 = 0xD1AC;

/// Nikon response codes branched on by the session
pub const RC_NIKON_INVALID_STATUS: u16 = 0xA004;
pub const RC_NIKON_NOT_LIVE_VIEW: u16 = 0xA00D;

/// Recording media values for `DPC_NIKON_RECORDING_MEDIA`
pub const RECORDING_MEDIA_CARD: u8 = 0;
pub const RECORDING_MEDIA_SDRAM: u8 = 1;

/// Result type for gateway calls
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors surfaced by the transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// The device answered with a non-OK PTP response code
    #[error("response code {0:#06x}")]
    ResponseCode(u16),

    /// The data phase ended with no payload. Some properties (notably
    /// `LiveViewStatus`) signal their state this way.
    #[error("end of data")]
    EndOfData,

    /// Transport-level failure (USB stall, detach, short read)
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeviceError {
    /// True when the camera rejected the operation with `InvalidStatus`
    pub fn is_invalid_status(&self) -> bool {
        matches!(self, DeviceError::ResponseCode(RC_NIKON_INVALID_STATUS))
    }

    /// True when the camera reported live view as inactive
    pub fn is_not_live_view(&self) -> bool {
        matches!(self, DeviceError::ResponseCode(RC_NIKON_NOT_LIVE_VIEW))
    }
}

/// Device identity as reported by the MTP `GetDeviceInfo` handshake
#[derive(Debug, Clone)]
pub struct DeviceId {
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

/// Form flag of a device property descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropForm {
    /// No form; only the current value is meaningful
    None,
    /// Range form (unused by this server, decoded for completeness)
    Range { min: u64, max: u64, step: u64 },
    /// Enumeration form: the raw unsigned choices, in device order
    Enum(Vec<u64>),
}

/// Decoded device property descriptor
#[derive(Debug, Clone)]
pub struct DevicePropDesc {
    /// Current value widened to u64 regardless of wire width
    pub current: u64,
    /// Property form
    pub form: PropForm,
}

impl DevicePropDesc {
    /// Borrow the enum-form choices, or report what was found instead.
    pub fn enum_values(&self) -> DeviceResult<&[u64]> {
        match &self.form {
            PropForm::Enum(values) => Ok(values),
            other => Err(DeviceError::Transport(format!(
                "expected enum form, got {other:?}"
            ))),
        }
    }
}

/// Serialized MTP gateway
///
/// One implementation wraps the USB transport; tests script a mock. All
/// calls are request/response round-trips and must not overlap; the
/// session enforces that with its MTP lock.
#[async_trait]
pub trait MtpDevice: Send + Sync {
    /// Device identity (manufacturer, product, serial)
    async fn id(&self) -> DeviceResult<DeviceId>;

    /// Run an operation that carries no data phase
    async fn run_transaction_no_data(&self, opcode: u16) -> DeviceResult<()>;

    /// Run an operation and collect its data-in phase
    async fn run_transaction_data_in(&self, opcode: u16, params: &[u32]) -> DeviceResult<Vec<u8>>;

    /// Read a raw property value
    async fn get_prop_value(&self, code: u16) -> DeviceResult<Vec<u8>>;

    /// Read a property descriptor (current value + form)
    async fn get_prop_desc(&self, code: u16) -> DeviceResult<DevicePropDesc>;

    /// Write a property value; `payload` is the exact wire serialization
    async fn set_prop_value(&self, code: u16, payload: &[u8]) -> DeviceResult<()>;
}
