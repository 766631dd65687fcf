//! Splitting payloads into addressable segments.

use crate::name::Name;
use serde::{Deserialize, Serialize};

/// Default segment body size: an 8800-byte packet minus header overhead.
pub const DEFAULT_SEGMENT_SIZE: usize = 8800 - 216;

/// One fixed-size chunk of a larger payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Name of the whole payload, without the sequence component.
    pub name: Name,
    pub seq: u64,
    pub payload: Vec<u8>,
    /// Sequence number of the last segment of the payload.
    pub final_block: u64,
}

impl Segment {
    pub fn is_final(&self) -> bool {
        self.seq == self.final_block
    }

    /// Total number of segments in the payload this segment belongs to.
    pub fn segment_count(&self) -> u64 {
        self.final_block + 1
    }

    /// The full name this segment is requested under.
    pub fn full_name(&self) -> Name {
        self.name.with_segment(self.seq)
    }
}

/// A payload split into ordered segments, ready to be published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedPayload {
    name: Name,
    segments: Vec<Segment>,
}

impl PackedPayload {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> u64 {
        self.segments.len() as u64
    }

    pub fn get(&self, seq: u64) -> Option<&Segment> {
        usize::try_from(seq).ok().and_then(|i| self.segments.get(i))
    }

    /// Total payload length in bytes.
    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(|s| s.payload.len()).sum()
    }

    /// Concatenate the segment bodies back into the original payload.
    pub fn reassemble(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|s| s.payload.iter().copied())
            .collect()
    }
}

/// Split `payload` into segments of at most `segment_size` bytes, addressed
/// as `name/<seq>`. An empty payload still yields one (empty, final)
/// segment so every payload has something to request.
pub fn pack(payload: &[u8], name: &Name, segment_size: usize) -> PackedPayload {
    let segment_size = segment_size.max(1);
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(segment_size).collect()
    };
    let final_block = chunks.len() as u64 - 1;

    let segments = chunks
        .into_iter()
        .enumerate()
        .map(|(seq, chunk)| Segment {
            name: name.clone(),
            seq: seq as u64,
            payload: chunk.to_vec(),
            final_block,
        })
        .collect::<Vec<_>>();

    tracing::debug!("packed {} into {} segments", name, segments.len());

    PackedPayload {
        name: name.clone(),
        segments,
    }
}
