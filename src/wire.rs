//! ColorLight 5a-75 wire format and the precomputed frame plan.
//!
//! Every display refresh sends the same sequence of raw Ethernet frames:
//!
//! | Frame | EtherType | Data length | Notes |
//! |---|---|---|---|
//! | display buffer | `0x0101` | 98 | all zero |
//! | brightness | `0x0AFF` | 63 | bytes 0-2 = `0xFF`, rest zero |
//! | row data | `0x5500 + (row >> 8)` | `pixels * 3 + 7` | 7-byte row header, then pixels |
//!
//! Row header layout:
//!
//! ```text
//!  0        1   2        3   4        5     6
//! ┌────────┬────────────┬────────────┬─────┬─────┐
//! │ row LSB│ pixel off  │ pixel count│ 0x08│ 0x80│
//! │        │ (BE u16)   │ (BE u16)   │     │     │
//! └────────┴────────────┴────────────┴─────┴─────┘
//! ```
//!
//! The last two header bytes have no known meaning; captures from the
//! vendor software always carry them, so they are sent verbatim.
//!
//! Capture reference: a 512-pixel row is split into 497 + 15 pixels, a
//! 128-pixel row goes out in one frame.
//!
//! The plan is built once. Row frames do not own their pixel bytes: they
//! hold a byte range into the [`DeviceFrameBuffer`], so repacking the
//! buffer changes what the next send puts on the wire.

use crate::error::PlanError;
use crate::packer::DeviceFrameBuffer;
use std::ops::Range;

/// Destination address every receiver card listens on.
pub const DEST_MAC: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
/// Source address expected by the receiver cards.
pub const SOURCE_MAC: [u8; 6] = [0x22, 0x22, 0x33, 0x44, 0x55, 0x66];

pub const ETHER_HEADER_LEN: usize = 14;
pub const ROW_HEADER_LEN: usize = 7;

pub const DISPLAY_FRAME_TYPE: u16 = 0x0101;
pub const DISPLAY_FRAME_LEN: usize = 98;

pub const BRIGHTNESS_TYPE: u16 = 0x0AFF;
pub const BRIGHTNESS_LEN: usize = 63;

pub const ROW_TYPE_BASE: u16 = 0x5500;

/// Largest pixel payload in one row frame (497 RGB pixels).
pub const MAX_ROW_PAYLOAD: usize = 497 * 3;
/// Widest row the 16-bit pixel offset can address.
pub const MAX_ROW_PIXELS: usize = u16::MAX as usize;
/// Rows reachable through the EtherType high byte and the sub-header low byte.
pub const MAX_ROWS: usize = 256 * 256;

const ROW_MARKER: [u8; 2] = [0x08, 0x80];

/// Where a frame's payload bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Fixed bytes built with the plan (control frames).
    Owned(Box<[u8]>),
    /// A byte range of the device frame buffer (row frames).
    Device(Range<usize>),
}

/// Fields of a row frame's 7-byte header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowChunk {
    pub row_low: u8,
    pub pixel_offset: u16,
    pub pixel_count: u16,
}

/// One Ethernet frame: fixed header bytes plus a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireFrame {
    header: Box<[u8]>,
    payload: Payload,
}

impl WireFrame {
    fn control(ether_type: u16, payload: Box<[u8]>) -> Self {
        Self {
            header: Box::new(ether_header(ether_type)),
            payload: Payload::Owned(payload),
        }
    }

    fn row_data(row: usize, byte_offset: usize, bytes: Range<usize>) -> Self {
        let pixel_offset = (byte_offset / 3) as u16;
        let pixel_count = (bytes.len() / 3) as u16;
        let ether_type = ROW_TYPE_BASE + (row >> 8) as u16;

        let mut header = Vec::with_capacity(ETHER_HEADER_LEN + ROW_HEADER_LEN);
        header.extend_from_slice(&ether_header(ether_type));
        header.push((row & 0xFF) as u8);
        header.extend_from_slice(&pixel_offset.to_be_bytes());
        header.extend_from_slice(&pixel_count.to_be_bytes());
        header.extend_from_slice(&ROW_MARKER);

        Self {
            header: header.into_boxed_slice(),
            payload: Payload::Device(bytes),
        }
    }

    /// Ethernet header, plus the row header for row frames.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn payload_source(&self) -> &Payload {
        &self.payload
    }

    /// Payload bytes, resolving device ranges against `device`.
    pub fn payload<'a>(&'a self, device: &'a [u8]) -> &'a [u8] {
        match &self.payload {
            Payload::Owned(bytes) => bytes,
            Payload::Device(range) => &device[range.clone()],
        }
    }

    /// Payload length, excluding every header.
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            Payload::Owned(bytes) => bytes.len(),
            Payload::Device(range) => range.len(),
        }
    }

    /// Bytes after the Ethernet header.
    pub fn data_len(&self) -> usize {
        self.header.len() - ETHER_HEADER_LEN + self.payload_len()
    }

    /// Full frame length on the wire (without FCS).
    pub fn wire_len(&self) -> usize {
        self.header.len() + self.payload_len()
    }

    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes([self.header[12], self.header[13]])
    }

    /// Decoded row header, for row frames.
    pub fn row_chunk(&self) -> Option<RowChunk> {
        let h = self.header.get(ETHER_HEADER_LEN..ETHER_HEADER_LEN + ROW_HEADER_LEN)?;
        Some(RowChunk {
            row_low: h[0],
            pixel_offset: u16::from_be_bytes([h[1], h[2]]),
            pixel_count: u16::from_be_bytes([h[3], h[4]]),
        })
    }

    /// Physical row number, reassembled from EtherType and row header.
    pub fn row(&self) -> Option<usize> {
        let chunk = self.row_chunk()?;
        let high = (self.ether_type() - ROW_TYPE_BASE) as usize;
        Some((high << 8) | chunk.row_low as usize)
    }
}

fn ether_header(ether_type: u16) -> [u8; ETHER_HEADER_LEN] {
    let mut header = [0u8; ETHER_HEADER_LEN];
    header[0..6].copy_from_slice(&DEST_MAC);
    header[6..12].copy_from_slice(&SOURCE_MAC);
    header[12..14].copy_from_slice(&ether_type.to_be_bytes());
    header
}

/// The ordered frame list sent every tick.
#[derive(Clone, Debug)]
pub struct WirePacketPlan {
    frames: Vec<WireFrame>,
    rows: usize,
    row_size: usize,
}

impl WirePacketPlan {
    /// Frames needed for `rows` rows of `row_size` bytes.
    pub fn frame_count(rows: usize, row_size: usize) -> usize {
        2 + rows * row_size.div_ceil(MAX_ROW_PAYLOAD)
    }

    /// Check that `rows × row_size` can be addressed on the wire.
    pub fn check_geometry(rows: usize, row_size: usize) -> Result<(), PlanError> {
        if row_size % 3 != 0 {
            return Err(PlanError::PartialPixel(row_size));
        }
        if row_size / 3 > MAX_ROW_PIXELS {
            return Err(PlanError::RowTooWide(row_size / 3));
        }
        if rows > MAX_ROWS {
            return Err(PlanError::TooManyRows(rows));
        }
        Ok(())
    }

    /// Build the plan for a device buffer laid out as `rows × row_size`.
    pub fn build(rows: usize, row_size: usize, device_len: usize) -> Result<Self, PlanError> {
        Self::check_geometry(rows, row_size)?;

        let mut frames = Vec::with_capacity(Self::frame_count(rows, row_size));
        frames.push(WireFrame::control(
            DISPLAY_FRAME_TYPE,
            vec![0u8; DISPLAY_FRAME_LEN].into_boxed_slice(),
        ));

        let mut brightness = vec![0u8; BRIGHTNESS_LEN];
        brightness[0..3].fill(0xFF);
        frames.push(WireFrame::control(
            BRIGHTNESS_TYPE,
            brightness.into_boxed_slice(),
        ));

        for row in 0..rows {
            let row_start = row * row_size;
            let row_end = row_start + row_size;
            if row_end > device_len {
                return Err(PlanError::RowOutOfBounds {
                    row,
                    start: row_start,
                    end: row_end,
                    len: device_len,
                });
            }

            let mut offset = 0;
            while offset < row_size {
                let len = MAX_ROW_PAYLOAD.min(row_size - offset);
                let start = row_start + offset;
                frames.push(WireFrame::row_data(row, offset, start..start + len));
                offset += len;
            }
        }

        tracing::debug!(
            "wire plan: {} frames for {} rows of {} bytes",
            frames.len(),
            rows,
            row_size
        );

        Ok(Self {
            frames,
            rows,
            row_size,
        })
    }

    /// Build the plan for an allocated device buffer.
    pub fn for_buffer(buffer: &DeviceFrameBuffer) -> Result<Self, PlanError> {
        Self::build(buffer.rows(), buffer.row_size(), buffer.len())
    }

    pub fn frames(&self) -> &[WireFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Row frames belonging to physical row `row`, in offset order.
    pub fn row_frames(&self, row: usize) -> impl Iterator<Item = &WireFrame> {
        self.frames.iter().filter(move |f| f.row() == Some(row))
    }
}
