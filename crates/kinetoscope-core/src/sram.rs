// crates/kinetoscope-core/src/sram.rs
//
// The shared 2 MiB SRAM model: two 1 MiB banks, a write cursor, and the
// cursor-XOR-1 byte-swap quirk the console's 16-bit data bus requires.
//
// Allocated once at construction (2 MiB, never reallocated mid-session) per
// the "static buffers allocated at init" guidance in spec.md §9.

/// Size of one bank, in bytes.
pub const BANK_SIZE: usize = 1024 * 1024;
/// Total size of the shared SRAM, in bytes.
pub const SRAM_SIZE: usize = 2 * BANK_SIZE;

/// One of the two alternately-filled SRAM regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bank {
    Zero,
    One,
}

impl Bank {
    /// Byte offset of this bank's first byte within the shared SRAM.
    pub fn base(self) -> usize {
        match self {
            Bank::Zero => 0,
            Bank::One => BANK_SIZE,
        }
    }

    /// The other bank — used when flipping between console-read and
    /// device-filled regions.
    pub fn other(self) -> Bank {
        match self {
            Bank::Zero => Bank::One,
            Bank::One => Bank::Zero,
        }
    }
}

/// The shared 2 MiB SRAM buffer and its write cursor.
///
/// Invariant: at rest between commands, the cursor always points into the
/// bank that was last filled (spec.md §3).
pub struct Sram {
    buf: Vec<u8>,
    cursor: usize,
}

impl Sram {
    /// Allocate the SRAM buffer. Contents are unspecified until first write,
    /// matching spec.md §3 ("at initialization both banks are unspecified").
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; SRAM_SIZE],
            cursor: 0,
        }
    }

    /// Point the write cursor at the base of `bank`, discarding any
    /// mid-word residue from a prior odd-length write.
    pub fn reset(&mut self, bank: Bank) {
        self.cursor = bank.base();
    }

    /// The bank the write cursor currently lies in.
    pub fn current_bank(&self) -> Bank {
        if self.cursor < BANK_SIZE {
            Bank::Zero
        } else {
            Bank::One
        }
    }

    /// Current absolute write cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Append `bytes` at the cursor, applying the `offset XOR 1` physical
    /// storage quirk to each byte.
    ///
    /// A write that would cross past the end of the bank the cursor is
    /// currently in is a soft error: it is dropped (logged) and the cursor
    /// does not advance, so the other bank is never corrupted by an
    /// over-long write (spec.md §4.C).
    pub fn write(&mut self, bytes: &[u8]) {
        let bank_end = self.current_bank().base() + BANK_SIZE;
        if self.cursor + bytes.len() > bank_end {
            eprintln!(
                "[core] sram write dropped: cursor={} len={} would cross bank boundary at {}",
                self.cursor,
                bytes.len(),
                bank_end
            );
            return;
        }
        for (i, &b) in bytes.iter().enumerate() {
            let physical = (self.cursor + i) ^ 1;
            self.buf[physical] = b;
        }
        self.cursor += bytes.len();
    }

    /// Read `len` logical bytes starting at `offset`, undoing the `XOR 1`
    /// storage quirk the same way `write` applies it. This is what the
    /// console sees when it reads the bus — not the raw physical layout.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.buf[(offset + i) ^ 1]).collect()
    }

    /// The raw physical byte layout, untouched by the XOR-1 quirk. Used by
    /// tests asserting the bit-exact storage contract directly.
    pub fn physical_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for Sram {
    fn default() -> Self {
        Self::new()
    }
}
