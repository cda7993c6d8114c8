// crates/kinetoscope-core/src/header.rs
//
// Outer video header: the fixed 8192-byte record at the start of every
// video, and the first 8192 bytes of every catalog entry (spec.md §3).
// All multi-byte integers are big-endian on the wire; parse/to_bytes
// convert to/from host endianness using std's from_be_bytes/to_be_bytes —
// no separate byte-order crate, matching the rest of the workspace.

use std::fmt;

/// Size of one outer header record, in bytes. Also the stride between
/// consecutive catalog entries.
pub const HEADER_SIZE: usize = 8192;

/// The literal magic bytes every valid header begins with.
pub const MAGIC: &[u8; 16] = b"what nintendon't";

/// The only format version this decoder accepts.
pub const CURRENT_FORMAT_VERSION: u16 = 3;

const TITLE_LEN: usize = 128;
const URL_LEN: usize = 128;

// Field byte offsets within the 8192-byte record.
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 16;
const OFF_FRAME_RATE: usize = 18;
const OFF_AUDIO_RATE: usize = 20;
const OFF_TOTAL_FRAMES: usize = 22;
const OFF_TOTAL_SAMPLES: usize = 26;
const OFF_CHUNK_SIZE: usize = 30;
const OFF_TOTAL_CHUNKS: usize = 34;
const OFF_TITLE: usize = 38;
const OFF_URL: usize = OFF_TITLE + TITLE_LEN;
const OFF_COMPRESSION: usize = OFF_URL + URL_LEN;
const OFF_THUMBNAIL: usize = OFF_COMPRESSION + 2;

/// Structural parse failure — wrong magic or version, or a truncated
/// buffer. No I/O involved; these are pure function failures over bytes
/// already in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    TooShort { need: usize, got: usize },
    MagicMismatch,
    UnsupportedVersion(u16),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::TooShort { need, got } => {
                write!(f, "buffer too short: need {need} bytes, got {got}")
            }
            HeaderError::MagicMismatch => write!(f, "magic mismatch"),
            HeaderError::UnsupportedVersion(v) => write!(f, "unsupported format version {v}"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// The outer video header (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoHeader {
    pub format_version: u16,
    pub frame_rate: u16,
    pub audio_sample_rate: u16,
    pub total_frames: u32,
    pub total_audio_samples: u32,
    pub chunk_size: u32,
    pub total_chunk_count: u32,
    pub title: String,
    pub relative_url: String,
    /// 0 = raw, non-zero = RLE. The console never sees this set — the
    /// streaming pipeline clears it before writing the header to SRAM
    /// (spec.md §4.E step 4).
    pub compression: u16,
    /// Padding + the 16x14-tile menu thumbnail. Format-opaque below the
    /// outer header (spec.md §1 non-goals) — carried through unexamined.
    pub thumbnail: Vec<u8>,
}

impl VideoHeader {
    /// Whether `compression` is non-zero, i.e. this video's chunks are
    /// RLE-encoded on the wire.
    pub fn is_compressed(&self) -> bool {
        self.compression != 0
    }

    /// Parse one 8192-byte header record. Does not validate magic/version —
    /// call `validate_header` first, or use `parse_validated`.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort {
                need: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let format_version = u16::from_be_bytes([bytes[OFF_VERSION], bytes[OFF_VERSION + 1]]);
        let frame_rate = u16::from_be_bytes([bytes[OFF_FRAME_RATE], bytes[OFF_FRAME_RATE + 1]]);
        let audio_sample_rate =
            u16::from_be_bytes([bytes[OFF_AUDIO_RATE], bytes[OFF_AUDIO_RATE + 1]]);
        let total_frames = u32::from_be_bytes(bytes[OFF_TOTAL_FRAMES..OFF_TOTAL_FRAMES + 4].try_into().unwrap());
        let total_audio_samples =
            u32::from_be_bytes(bytes[OFF_TOTAL_SAMPLES..OFF_TOTAL_SAMPLES + 4].try_into().unwrap());
        let chunk_size =
            u32::from_be_bytes(bytes[OFF_CHUNK_SIZE..OFF_CHUNK_SIZE + 4].try_into().unwrap());
        let total_chunk_count =
            u32::from_be_bytes(bytes[OFF_TOTAL_CHUNKS..OFF_TOTAL_CHUNKS + 4].try_into().unwrap());
        let title = ascii_field_to_string(&bytes[OFF_TITLE..OFF_TITLE + TITLE_LEN]);
        let relative_url = ascii_field_to_string(&bytes[OFF_URL..OFF_URL + URL_LEN]);
        let compression =
            u16::from_be_bytes([bytes[OFF_COMPRESSION], bytes[OFF_COMPRESSION + 1]]);
        let thumbnail = bytes[OFF_THUMBNAIL..HEADER_SIZE].to_vec();

        Ok(Self {
            format_version,
            frame_rate,
            audio_sample_rate,
            total_frames,
            total_audio_samples,
            chunk_size,
            total_chunk_count,
            title,
            relative_url,
            compression,
            thumbnail,
        })
    }

    /// `parse`, but rejecting a bad magic/version up front.
    pub fn parse_validated(bytes: &[u8]) -> Result<Self, HeaderError> {
        validate_header(bytes)?;
        Self::parse(bytes)
    }

    /// Serialize back to the 8192-byte wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[OFF_MAGIC..OFF_MAGIC + 16].copy_from_slice(MAGIC);
        out[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(&self.format_version.to_be_bytes());
        out[OFF_FRAME_RATE..OFF_FRAME_RATE + 2].copy_from_slice(&self.frame_rate.to_be_bytes());
        out[OFF_AUDIO_RATE..OFF_AUDIO_RATE + 2]
            .copy_from_slice(&self.audio_sample_rate.to_be_bytes());
        out[OFF_TOTAL_FRAMES..OFF_TOTAL_FRAMES + 4]
            .copy_from_slice(&self.total_frames.to_be_bytes());
        out[OFF_TOTAL_SAMPLES..OFF_TOTAL_SAMPLES + 4]
            .copy_from_slice(&self.total_audio_samples.to_be_bytes());
        out[OFF_CHUNK_SIZE..OFF_CHUNK_SIZE + 4].copy_from_slice(&self.chunk_size.to_be_bytes());
        out[OFF_TOTAL_CHUNKS..OFF_TOTAL_CHUNKS + 4]
            .copy_from_slice(&self.total_chunk_count.to_be_bytes());
        write_ascii_field(&mut out[OFF_TITLE..OFF_TITLE + TITLE_LEN], &self.title);
        write_ascii_field(&mut out[OFF_URL..OFF_URL + URL_LEN], &self.relative_url);
        out[OFF_COMPRESSION..OFF_COMPRESSION + 2].copy_from_slice(&self.compression.to_be_bytes());
        let thumb_len = self.thumbnail.len().min(HEADER_SIZE - OFF_THUMBNAIL);
        out[OFF_THUMBNAIL..OFF_THUMBNAIL + thumb_len]
            .copy_from_slice(&self.thumbnail[..thumb_len]);
        out
    }
}

/// Byte offset of the `title` field within a header record — used by
/// `kinetoscope-device` tests that assert on raw SRAM contents without
/// going through `VideoHeader::parse`.
pub const TITLE_OFFSET: usize = OFF_TITLE;

fn ascii_field_to_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_ascii_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
    for b in &mut field[len..] {
        *b = 0;
    }
}

/// Reject on magic mismatch or an unexpected format version. Pure,
/// structural-only — no I/O (spec.md §4.A).
pub fn validate_header(bytes: &[u8]) -> Result<(), HeaderError> {
    if bytes.len() < HEADER_SIZE {
        return Err(HeaderError::TooShort {
            need: HEADER_SIZE,
            got: bytes.len(),
        });
    }
    if &bytes[OFF_MAGIC..OFF_MAGIC + 16] != MAGIC {
        return Err(HeaderError::MagicMismatch);
    }
    let version = u16::from_be_bytes([bytes[OFF_VERSION], bytes[OFF_VERSION + 1]]);
    if version != CURRENT_FORMAT_VERSION {
        return Err(HeaderError::UnsupportedVersion(version));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> VideoHeader {
        VideoHeader {
            format_version: CURRENT_FORMAT_VERSION,
            frame_rate: 30,
            audio_sample_rate: 32000,
            total_frames: 9000,
            total_audio_samples: 9_600_000,
            chunk_size: 0x80000,
            total_chunk_count: 12,
            title: "A".to_string(),
            relative_url: "videos/a.kinvid".to_string(),
            compression: 0,
            thumbnail: vec![0; HEADER_SIZE - OFF_THUMBNAIL],
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let header = sample_header();
        let bytes = header.to_bytes();
        let parsed = VideoHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn title_offset_matches_spec_scenario() {
        // spec.md §8 scenario 3: title begins at byte offset 38.
        assert_eq!(OFF_TITLE, 38);
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes[OFF_TITLE], b'A');
    }

    #[test]
    fn validate_accepts_well_formed_header() {
        let bytes = sample_header().to_bytes();
        assert!(validate_header(&bytes).is_ok());
    }

    #[test]
    fn validate_rejects_any_single_byte_magic_mutation() {
        let bytes = sample_header().to_bytes();
        for i in 0..16 {
            let mut mutated = bytes.clone();
            mutated[i] ^= 0xFF;
            assert!(validate_header(&mutated).is_err(), "byte {i} mutation not rejected");
        }
    }

    #[test]
    fn validate_rejects_any_version_other_than_current() {
        let bytes = sample_header().to_bytes();
        for v in 0u16..8 {
            if v == CURRENT_FORMAT_VERSION {
                continue;
            }
            let mut mutated = bytes.clone();
            mutated[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(&v.to_be_bytes());
            assert!(validate_header(&mutated).is_err(), "version {v} not rejected");
        }
    }

    #[test]
    fn validate_rejects_short_buffer() {
        assert!(validate_header(&[0u8; 10]).is_err());
    }
}
