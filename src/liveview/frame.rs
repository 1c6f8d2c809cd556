//! Live-view reply decoding
//!
//! A live-view reply is a fixed-size header followed by a raw JPEG stream.
//! Bytes `[0:8]` are an opaque preamble; the region `[8:header_size]`
//! decodes big-endian into the layout below; everything from `header_size`
//! on is the image.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::liveview::types::{AfStatus, Rotation};

// Offsets inside the decoded region (relative to byte 8 of the reply).
const OFF_LV_WIDTH: usize = 0;
const OFF_LV_HEIGHT: usize = 2;
const OFF_WIDTH: usize = 4;
const OFF_HEIGHT: usize = 6;
const OFF_FOCUS_FRAME_WIDTH: usize = 16;
const OFF_FOCUS_FRAME_HEIGHT: usize = 18;
const OFF_FOCUS_X: usize = 20;
const OFF_FOCUS_Y: usize = 22;
const OFF_ROTATION: usize = 29;
const OFF_AUTO_FOCUS: usize = 40;
const OFF_MOVIE_REMAIN_INT: usize = 56;
const OFF_MOVIE_REMAIN_FRAC: usize = 58;
const OFF_RECORDING: usize = 60;
const HEADER_FIELDS_LEN: usize = 61;

/// Decoded live-view frame
#[derive(Debug, Clone, Default)]
pub struct LiveViewFrame {
    pub lv_width: i16,
    pub lv_height: i16,
    pub width: i16,
    pub height: i16,
    pub focus_frame_width: i16,
    pub focus_frame_height: i16,
    pub focus_x: i16,
    pub focus_y: i16,
    pub rotation: Rotation,
    pub auto_focus: AfStatus,
    pub movie_time_remain_int: i16,
    pub movie_time_remain_frac: i16,
    pub recording: bool,
    pub jpeg: Bytes,
}

fn read_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Split a raw reply into the decoded header and the JPEG payload.
///
/// Replies no longer than `header_size` carry no image and are rejected.
pub fn decode_reply(raw: &[u8], header_size: usize) -> Result<LiveViewFrame> {
    if raw.len() <= header_size {
        return Err(Error::InsufficientData);
    }
    if header_size < 8 + HEADER_FIELDS_LEN {
        return Err(Error::Internal(format!(
            "header size {header_size} cannot hold the live view fields"
        )));
    }

    let header = &raw[8..header_size];

    Ok(LiveViewFrame {
        lv_width: read_i16(header, OFF_LV_WIDTH),
        lv_height: read_i16(header, OFF_LV_HEIGHT),
        width: read_i16(header, OFF_WIDTH),
        height: read_i16(header, OFF_HEIGHT),
        focus_frame_width: read_i16(header, OFF_FOCUS_FRAME_WIDTH),
        focus_frame_height: read_i16(header, OFF_FOCUS_FRAME_HEIGHT),
        focus_x: read_i16(header, OFF_FOCUS_X),
        focus_y: read_i16(header, OFF_FOCUS_Y),
        rotation: Rotation::from_wire(header[OFF_ROTATION] as i8),
        auto_focus: AfStatus::from_wire(header[OFF_AUTO_FOCUS] as i8),
        movie_time_remain_int: read_i16(header, OFF_MOVIE_REMAIN_INT),
        movie_time_remain_frac: read_i16(header, OFF_MOVIE_REMAIN_FRAC),
        recording: header[OFF_RECORDING] == 1,
        jpeg: Bytes::copy_from_slice(&raw[header_size..]),
    })
}
