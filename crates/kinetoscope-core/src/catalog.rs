// crates/kinetoscope-core/src/catalog.rs
//
// The video catalog: a run of outer headers served back-to-back over HTTP,
// terminated by a zero-magic sentinel record or by hitting the 127-entry
// cap (spec.md §3, §4.C).

use crate::header::{HeaderError, VideoHeader, HEADER_SIZE, MAGIC};

/// Hard cap on catalog entries a client will read, independent of how many
/// the server claims to serve (spec.md §4.C).
pub const MAX_CATALOG_ENTRIES: usize = 127;

/// A parsed catalog: zero or more videos, in server order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    pub videos: Vec<VideoHeader>,
}

impl Catalog {
    /// Parse consecutive `HEADER_SIZE` records out of `bytes` until either a
    /// record whose first 16 bytes are not `MAGIC` is seen (the sentinel),
    /// `MAX_CATALOG_ENTRIES` is reached, or the buffer runs out.
    ///
    /// A truncated *trailing* record (fewer than `HEADER_SIZE` bytes left)
    /// ends the catalog without error — the server is assumed to have sent
    /// exactly as many whole records as it has, followed by the sentinel,
    /// and a short tail only occurs if the connection was cut.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let mut videos = Vec::new();
        let mut offset = 0;
        while videos.len() < MAX_CATALOG_ENTRIES {
            let record = match bytes.get(offset..offset + HEADER_SIZE) {
                Some(r) => r,
                None => break,
            };
            if &record[0..16] != MAGIC {
                break;
            }
            videos.push(VideoHeader::parse_validated(record)?);
            offset += HEADER_SIZE;
        }
        Ok(Self { videos })
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}
