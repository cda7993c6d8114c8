// crates/kinetoscope-core/src/rle.rs
//
// Byte-level run-length decoder for the compressed chunk stream. Control
// byte `c`: top bit set = repeat, low 7 bits = count `n`. `n == 0` is a
// no-op literal run; `n == 0` on a repeat still consumes the data byte.
//
// The decoder is stateful across calls so a chunk's compressed bytes can
// arrive split across arbitrarily many network reads — see `pending_repeat`
// and `pending_literals` below. `reset()` must be called before each
// compressed fetch (spec.md §4.B) so state never leaks across an aborted
// transfer.

/// Decoder state carried between calls to `decode`. At most one of the two
/// counters is non-zero between input buffers (spec.md §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RleDecoder {
    /// Count of bytes still owed from a repeat command whose data byte
    /// hasn't arrived yet.
    pending_repeat: usize,
    /// Count of literal bytes still owed from a literal run that ran off
    /// the end of a prior input buffer.
    pending_literals: usize,
}

impl RleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both pending counters. Call before each compressed fetch.
    pub fn reset(&mut self) {
        self.pending_repeat = 0;
        self.pending_literals = 0;
    }

    /// Decode as much of `input` as the current state allows, calling `sink`
    /// once per output byte in order.
    ///
    /// Callable with arbitrarily fragmented input — decoding `buf` across N
    /// calls at any split points produces the same output as one call with
    /// the whole buffer concatenated.
    ///
    /// ```
    /// use kinetoscope_core::rle::RleDecoder;
    /// let mut dec = RleDecoder::new();
    /// let mut out = Vec::new();
    /// dec.decode(&[0x82], &mut |b| out.push(b));
    /// dec.decode(&[0xAB, 0x03, 0x10, 0x20, 0x30], &mut |b| out.push(b));
    /// assert_eq!(out, vec![0xAB, 0xAB, 0x10, 0x20, 0x30]);
    /// ```
    pub fn decode(&mut self, input: &[u8], sink: &mut dyn FnMut(u8)) {
        let mut i = 0usize;

        if self.pending_repeat > 0 {
            if i >= input.len() {
                return; // still no data byte — stay pending
            }
            let data = input[i];
            i += 1;
            for _ in 0..self.pending_repeat {
                sink(data);
            }
            self.pending_repeat = 0;
        }

        if self.pending_literals > 0 {
            let take = self.pending_literals.min(input.len() - i);
            for &b in &input[i..i + take] {
                sink(b);
            }
            i += take;
            self.pending_literals -= take;
            if self.pending_literals > 0 {
                return; // buffer exhausted mid-literal-run
            }
        }

        while i < input.len() {
            let c = input[i];
            i += 1;
            let repeat = c & 0x80 != 0;
            let n = (c & 0x7f) as usize;

            if repeat {
                if i >= input.len() {
                    self.pending_repeat = n;
                    return;
                }
                let data = input[i];
                i += 1;
                for _ in 0..n {
                    sink(data);
                }
            } else {
                let take = n.min(input.len() - i);
                for &b in &input[i..i + take] {
                    sink(b);
                }
                i += take;
                let remaining = n - take;
                if remaining > 0 {
                    self.pending_literals = remaining;
                    return;
                }
            }
        }
    }
}

/// Encode `data` with the same control-byte grammar `decode` understands.
/// Only used by tests and tooling — the real encoder is out of scope
/// (spec.md §1) but a minimal encoder makes round-trip tests possible
/// without hand-writing every fixture by hand.
#[cfg(any(test, feature = "test-support"))]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        // Look for a run of 2+ identical bytes — worth a repeat command.
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 0x7f {
            run += 1;
        }
        if run >= 2 {
            out.push(0x80 | run as u8);
            out.push(data[i]);
            i += run;
        } else {
            // Accumulate a literal run up to the next repeat-worthy run.
            let start = i;
            let mut len = 0usize;
            while i < data.len() && len < 0x7f {
                let mut next_run = 1;
                while i + next_run < data.len() && data[i + next_run] == data[i] && next_run < 0x7f {
                    next_run += 1;
                }
                if next_run >= 2 {
                    break;
                }
                i += 1;
                len += 1;
            }
            out.push(len as u8);
            out.extend_from_slice(&data[start..start + len]);
        }
    }
    out
}
