// crates/kinetoscope-core/src/chunk.rs
//
// Chunk header and chunk index (spec.md §3). A chunk is the unit the
// streaming pipeline fetches and writes to a bank: header, pre-padding,
// audio, frames, post-padding.
//
// Audio and frame payload bytes are format-opaque below this layer (spec.md
// §1 non-goals) — this module only needs to know where the opaque payload
// starts and ends so it can preserve the 256-byte audio alignment.

use std::fmt;

use crate::header::HeaderError;

/// Fixed size of a `ChunkHeader` record on the wire.
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Bytes per decoded audio sample (16-bit stereo PCM — the standard format
/// for this console generation). Not specified explicitly by the wire
/// format, which only carries a sample *count*; resolved here as a fixed
/// assumption, recorded as an open question in DESIGN.md.
pub const BYTES_PER_AUDIO_SAMPLE: u32 = 4;

/// Per-chunk header: sample count, frame count, and the pre/post padding
/// that keeps audio aligned to a 256-byte SRAM boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub sample_count: u32,
    pub frame_count: u32,
    pub pre_padding: u32,
    pub post_padding: u32,
}

/// Byte offsets of each section within one chunk, relative to the start of
/// the chunk (not the whole file).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkOffsets {
    pub audio_offset: u32,
    pub frames_offset: u32,
    pub post_padding_start: u32,
    pub end_offset: u32,
}

impl ChunkHeader {
    /// Parse the fixed 16-byte chunk header. Pure function over the first
    /// `CHUNK_HEADER_SIZE` bytes (spec.md §4.A).
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(HeaderError::TooShort {
                need: CHUNK_HEADER_SIZE,
                got: bytes.len(),
            });
        }
        Ok(Self {
            sample_count: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            frame_count: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
            pre_padding: u32::from_be_bytes(bytes[8..12].try_into().unwrap()),
            post_padding: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        })
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.sample_count.to_be_bytes());
        out[4..8].copy_from_slice(&self.frame_count.to_be_bytes());
        out[8..12].copy_from_slice(&self.pre_padding.to_be_bytes());
        out[12..16].copy_from_slice(&self.post_padding.to_be_bytes());
        out
    }

    /// Slice offsets for audio, frames, and end of chunk, given the total
    /// byte footprint of the chunk (the video's `chunk_size`, a constant
    /// from the outer header — not encoded in the chunk header itself).
    pub fn offsets(&self, chunk_size: u32) -> ChunkOffsets {
        let audio_offset = CHUNK_HEADER_SIZE as u32 + self.pre_padding;
        let audio_len = self.sample_count * BYTES_PER_AUDIO_SAMPLE;
        let frames_offset = audio_offset + audio_len;
        let post_padding_start = chunk_size - self.post_padding;
        ChunkOffsets {
            audio_offset,
            frames_offset,
            post_padding_start,
            end_offset: chunk_size,
        }
    }
}

/// The per-video array of compressed-chunk byte offsets (present only when
/// a video is RLE-compressed). `offsets.len() == total_chunks + 1`; the
/// last entry is the sentinel end offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkIndex {
    pub offsets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndexError {
    TooShort { need: usize, got: usize },
    NotStrictlyIncreasing { at: usize },
}

impl fmt::Display for ChunkIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkIndexError::TooShort { need, got } => {
                write!(f, "chunk index buffer too short: need {need}, got {got}")
            }
            ChunkIndexError::NotStrictlyIncreasing { at } => {
                write!(f, "chunk index offsets not strictly increasing at entry {at}")
            }
        }
    }
}

impl std::error::Error for ChunkIndexError {}

impl ChunkIndex {
    /// Unpadded byte length of `total_chunks + 1` big-endian u32 offsets.
    pub fn raw_len(total_chunks: u32) -> usize {
        (total_chunks as usize + 1) * 4
    }

    /// On-wire byte length, padded up to a multiple of 256 (spec.md §3).
    pub fn padded_len(total_chunks: u32) -> usize {
        crate::helpers::align::align_up(Self::raw_len(total_chunks) as u32, 256) as usize
    }

    /// Parse `total_chunks + 1` big-endian offsets from `bytes`, validating
    /// that they strictly increase.
    pub fn parse(bytes: &[u8], total_chunks: u32) -> Result<Self, ChunkIndexError> {
        let need = Self::raw_len(total_chunks);
        if bytes.len() < need {
            return Err(ChunkIndexError::TooShort {
                need,
                got: bytes.len(),
            });
        }
        let offsets: Vec<u32> = bytes[..need]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
            .collect();
        for (i, w) in offsets.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(ChunkIndexError::NotStrictlyIncreasing { at: i + 1 });
            }
        }
        Ok(Self { offsets })
    }

    /// Serialize back to the padded wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_chunks = (self.offsets.len() - 1) as u32;
        let mut out = vec![0u8; Self::padded_len(total_chunks)];
        for (i, off) in self.offsets.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&off.to_be_bytes());
        }
        out
    }

    /// Compressed byte range `[start, end)` for chunk `n` within the file.
    pub fn chunk_range(&self, n: usize) -> (u32, u32) {
        (self.offsets[n], self.offsets[n + 1])
    }

    pub fn total_chunks(&self) -> usize {
        self.offsets.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_header_round_trips() {
        let h = ChunkHeader {
            sample_count: 2048,
            frame_count: 30,
            pre_padding: 64,
            post_padding: 192,
        };
        assert_eq!(ChunkHeader::parse(&h.to_bytes()).unwrap(), h);
    }

    #[test]
    fn offsets_place_audio_right_after_pre_padding() {
        let h = ChunkHeader {
            sample_count: 100,
            frame_count: 10,
            pre_padding: 16,
            post_padding: 8,
        };
        let off = h.offsets(0x1000);
        assert_eq!(off.audio_offset, CHUNK_HEADER_SIZE as u32 + 16);
        assert_eq!(off.frames_offset, off.audio_offset + 100 * BYTES_PER_AUDIO_SAMPLE);
        assert_eq!(off.post_padding_start, 0x1000 - 8);
        assert_eq!(off.end_offset, 0x1000);
    }

    #[test]
    fn index_round_trips_and_validates_monotonicity() {
        let idx = ChunkIndex {
            offsets: vec![0, 100, 250, 400],
        };
        let bytes = idx.to_bytes();
        let parsed = ChunkIndex::parse(&bytes, 3).unwrap();
        assert_eq!(parsed, idx);
        assert_eq!(parsed.chunk_range(1), (100, 250));
    }

    #[test]
    fn index_rejects_non_increasing_offsets() {
        let mut bytes = Vec::new();
        for off in [0u32, 100, 90, 400] {
            bytes.extend_from_slice(&off.to_be_bytes());
        }
        assert!(ChunkIndex::parse(&bytes, 3).is_err());
    }

    #[test]
    fn padded_len_is_multiple_of_256() {
        for n in [1u32, 5, 127, 4000] {
            assert_eq!(ChunkIndex::padded_len(n) % 256, 0);
            assert!(ChunkIndex::padded_len(n) >= ChunkIndex::raw_len(n));
        }
    }
}
