// crates/kinetoscope-core/src/error.rs
//
// The error taxonomy from spec §7. Every variant here ends up latched into
// ControlRegisters.error_str by the command processor in kinetoscope-device.
// Kept as a plain matchable enum (not anyhow::Error) because tests assert
// *which* category fired — e.g. the underflow scenario checks the exact
// message, not just that something failed.

use std::fmt;

/// Result alias for fallible kinetoscope-core operations.
pub type Result<T> = std::result::Result<T, KinetoscopeError>;

/// The error taxonomy from spec.md §7, one variant per listed category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KinetoscopeError {
    // ── Protocol ──────────────────────────────────────────────────────────────
    UnrecognizedCommand(u8),

    // ── Network link ─────────────────────────────────────────────────────────
    WifiAssociationFailed,
    DhcpFailed,
    NoLink,

    // ── HTTP ──────────────────────────────────────────────────────────────────
    RangeNotSupported,
    RedirectUnsupported,
    HttpStatus(u16),
    MalformedHeaders,
    TruncatedResponse,

    // ── Streaming ─────────────────────────────────────────────────────────────
    InvalidVideoIndex(u16),
    InvalidCatalogEntry,
    HeaderValidationFailed,
    IndexFetchFailed,
    /// The console asked to flip before the next chunk was ready.
    Underflow,

    // ── Self-test ─────────────────────────────────────────────────────────────
    InvalidMarchPass(u16),
}

impl fmt::Display for KinetoscopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinetoscopeError::UnrecognizedCommand(code) => {
                write!(f, "Unrecognized command 0x{code:02X}!")
            }
            KinetoscopeError::WifiAssociationFailed => write!(f, "Wi-Fi association failed"),
            KinetoscopeError::DhcpFailed => write!(f, "DHCP failed"),
            KinetoscopeError::NoLink => write!(f, "No network link"),
            KinetoscopeError::RangeNotSupported => write!(f, "Range not supported"),
            KinetoscopeError::RedirectUnsupported => write!(f, "Redirects not supported"),
            KinetoscopeError::HttpStatus(code) => write!(f, "HTTP error {code}"),
            KinetoscopeError::MalformedHeaders => write!(f, "Malformed HTTP headers"),
            KinetoscopeError::TruncatedResponse => write!(f, "Truncated HTTP response"),
            KinetoscopeError::InvalidVideoIndex(idx) => write!(f, "Invalid video index {idx}"),
            KinetoscopeError::InvalidCatalogEntry => {
                write!(f, "Invalid catalog entry (no URL terminator)")
            }
            KinetoscopeError::HeaderValidationFailed => write!(f, "Header validation failed"),
            KinetoscopeError::IndexFetchFailed => write!(f, "Chunk index fetch failed"),
            KinetoscopeError::Underflow => write!(f, "Internet too slow?"),
            KinetoscopeError::InvalidMarchPass(pass) => {
                write!(f, "Invalid march test pass {pass}")
            }
        }
    }
}

impl std::error::Error for KinetoscopeError {}
