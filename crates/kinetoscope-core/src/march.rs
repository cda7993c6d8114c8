// crates/kinetoscope-core/src/march.rs
//
// The 22-pass SRAM march self-test (spec.md §4.G): a deterministic pattern
// writer used to validate the SRAM interconnect. The device itself only
// reports that the write completed; the console is the one that reads the
// pattern back and judges pass/fail (spec.md §7).

use crate::error::KinetoscopeError;
use crate::sram::{Bank, Sram, BANK_SIZE};

/// Total number of march test passes (spec.md §4.G).
pub const TOTAL_PASSES: u16 = 22;

/// Prime moduli used by the non-power-of-two passes (20, 21), chosen to
/// defeat aliasing on power-of-two address bits.
const PRIMES: [u32; 8] = [251, 241, 239, 233, 229, 227, 223, 211];

/// Run one pass of the march test: generate the pass's deterministic
/// pattern and write all `BANK_SIZE` bytes into the bank selected by
/// `pass & 1`.
pub fn sram_march_test(sram: &mut Sram, pass: u16) -> Result<(), KinetoscopeError> {
    if pass >= TOTAL_PASSES {
        return Err(KinetoscopeError::InvalidMarchPass(pass));
    }
    let bank = if pass & 1 == 0 { Bank::Zero } else { Bank::One };
    let pattern = generate_pattern(pass);
    sram.reset(bank);
    sram.write(&pattern);
    Ok(())
}

fn generate_pattern(pass: u16) -> Vec<u8> {
    match pass {
        0..=15 => walking_bit_pattern(pass),
        16 | 17 => (0..BANK_SIZE).map(|i| (i & 0xff) as u8).collect(),
        18 | 19 => (0..BANK_SIZE).map(|i| ((i & 0xff) as u8) ^ 0xff).collect(),
        20 | 21 => repeating_prime_pattern(pass),
        _ => unreachable!("pass validated by caller"),
    }
}

/// Passes 0-15: for byte offset `i`, write `1 << ((i + pass/2) mod 8)`.
fn walking_bit_pattern(pass: u16) -> Vec<u8> {
    let shift_bias = (pass / 2) as usize;
    (0..BANK_SIZE)
        .map(|i| 1u8 << ((i + shift_bias) % 8))
        .collect()
}

/// Passes 20-21: a rolling counter through `PRIMES`, restarting the
/// per-prime cycle every `primes[k] * 255` bytes. Bank 0 (pass 20) starts
/// the rolling counter at 0; bank 1 (pass 21) starts at 199, so the two
/// banks are never bit-identical.
fn repeating_prime_pattern(pass: u16) -> Vec<u8> {
    let mut c: u32 = if pass == 20 { 0 } else { 199 };
    let mut k: usize = 0;
    (0..BANK_SIZE)
        .map(|_| {
            if c == PRIMES[k] * 255 {
                k = (k + 1) % PRIMES.len();
                c = 0;
            }
            let out = (c % PRIMES[k]) as u8;
            c += 1;
            out
        })
        .collect()
}
