//! Reply written by a readiness listener to every accepted probe.
//!
//! Frame: a 4-byte little-endian length followed by the bincode-encoded
//! [`ReadinessReply`]. Probers only need the connect to succeed and may
//! ignore the frame entirely.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_READINESS_REPLY_SIZE;
use crate::error::{BootError, BootResult};
use crate::phase::PhaseState;
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessReply {
    pub role: Role,
    pub state: PhaseState,
}

impl ReadinessReply {
    pub fn encode(&self) -> BootResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|_| BootError::BadReply)?;
        let len = body.len() as u32;
        if len > MAX_READINESS_REPLY_SIZE {
            return Err(BootError::BadReply);
        }
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode a complete frame as produced by [`ReadinessReply::encode`].
    pub fn decode(frame: &[u8]) -> BootResult<Self> {
        if frame.len() < 4 {
            return Err(BootError::BadReply);
        }
        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if len > MAX_READINESS_REPLY_SIZE || frame.len() - 4 != len as usize {
            return Err(BootError::BadReply);
        }
        bincode::deserialize(&frame[4..]).map_err(|_| BootError::BadReply)
    }
}
