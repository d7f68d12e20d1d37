//! Compressed packet representation shared by every source.

use bytes::Bytes;

/// A single compressed packet as produced by an upstream demuxer.
///
/// Payload bytes are reference-counted (`Bytes`) so passing a packet through
/// a `Ring` is a cheap shallow clone, not a deep copy.
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload: Bytes,
    /// Presentation timestamp, in the stream's timebase.
    pub pts: i64,
    /// Decoding timestamp, in the stream's timebase. Equal to `pts` for
    /// codecs/containers with no B-frame reordering.
    pub dts: i64,
    /// Demuxer's own keyframe hint, when it provides one.
    pub keyframe_hint: Option<bool>,
    pub codec: CodecHint,
}

/// Codec family, used by the keyframe detector to select a scan strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecHint {
    H264,
    Other,
}

impl Packet {
    pub fn new(payload: Bytes, pts: i64, dts: i64, codec: CodecHint) -> Self {
        Self {
            payload,
            pts,
            dts,
            keyframe_hint: None,
            codec,
        }
    }

    pub fn with_keyframe_hint(mut self, hint: bool) -> Self {
        self.keyframe_hint = Some(hint);
        self
    }
}
