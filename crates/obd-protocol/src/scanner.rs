//! Supported-parameter discovery
//!
//! Each block request `base` (a multiple of 0x20) answers with a 32-bit
//! bitmap. Bit `31 - k` marks `base + k` as supported and bit 0 says the
//! next block exists. [`SupportedScan`] holds the walk state; the engine
//! owns the I/O.

use crate::codec::RawFrame;
use crate::error::ObdError;
use crate::pid::Pid;
use std::collections::BTreeSet;
use tracing::debug;

/// PIDs covered by one bitmap
pub const BLOCK_SIZE: u16 = 0x20;

const CONTINUATION_BIT: u32 = 1;

/// Set of supported PIDs, ordered and free of duplicates
pub type SupportedSet = BTreeSet<Pid>;

/// Decode one bitmap into the PIDs it marks
pub fn decode_bitmap(base: u16, bitmap: u32) -> impl Iterator<Item = Pid> {
    (0..32u16)
        .filter(move |k| bitmap & (1 << (31 - k)) != 0)
        .map(move |k| Pid(base.wrapping_add(k)))
}

/// Block by block walk of one mode's supported PIDs
#[derive(Debug, Clone)]
pub struct SupportedScan {
    /// Next block to request, `None` once finished
    next_base: Option<u16>,
    /// First PID past the mode
    limit: u32,
    supported: SupportedSet,
    blocks: usize,
}

impl SupportedScan {
    pub fn new(mode: u8) -> Self {
        let first = u32::from(mode) * 0x100;
        Self {
            next_base: u16::try_from(first).ok(),
            limit: first + 0x100,
            supported: SupportedSet::new(),
            blocks: 0,
        }
    }

    /// PID of the next block request, or `None` when the walk is over
    pub fn next_request(&self) -> Option<Pid> {
        self.next_base.map(Pid)
    }

    /// Fold in the reply to [`next_request`](Self::next_request)
    ///
    /// The bitmap is read big-endian from payload bytes 2..6.
    pub fn accept(&mut self, frame: &RawFrame) -> Result<(), ObdError> {
        let Some(base) = self.next_base else {
            return Err(ObdError::InvalidRequest("scan already finished".into()));
        };
        let bitmap = frame.dword(2)?;
        let before = self.supported.len();
        self.supported.extend(decode_bitmap(base, bitmap));
        self.blocks += 1;
        debug!(
            "Block {:#06X}: bitmap {:08X}, {} new PIDs",
            base,
            bitmap,
            self.supported.len() - before
        );

        let next = u32::from(base) + u32::from(BLOCK_SIZE);
        self.next_base = if bitmap & CONTINUATION_BIT != 0 && next < self.limit {
            u16::try_from(next).ok()
        } else {
            None
        };
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.next_base.is_none()
    }

    /// Blocks accepted so far
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn finish(self) -> SupportedSet {
        self.supported
    }
}
