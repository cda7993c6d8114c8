// crates/kinetoscope-device/src/commands.rs
//
// The command processor (spec.md §4.F): decode (command, arg), dispatch to
// the streaming session or the march test, latch whatever error comes
// back, and hand the token home. Every handler lives here; adding a
// command means one new `Command` variant plus one match arm below.

use std::time::Duration;

use kinetoscope_core::catalog::Catalog;
use kinetoscope_core::header::HEADER_SIZE;
use kinetoscope_core::march;
use kinetoscope_core::registers::Command;
use kinetoscope_core::sram::Bank;
use kinetoscope_core::KinetoscopeError;

use kinetoscope_stream::session::CATALOG_PATH;
use kinetoscope_stream::types::WorkerEvent;

use crate::clock::Clock;
use crate::context::DeviceContext;

/// Decode `(code, arg)`, run the handler, and return the token to the
/// console. `delay` is the simulated processing delay (~100 ms in the
/// emulator, `Duration::ZERO` on real firmware — spec.md §4.F).
pub fn dispatch(ctx: &mut DeviceContext, clock: &dyn Clock, delay: Duration, code: u8, arg: u16) {
    ctx.regs.hand_to_device();
    if !delay.is_zero() {
        clock.sleep(delay);
    }

    match Command::decode(code, arg) {
        Ok(command) => run(ctx, command),
        Err(err) => {
            eprintln!("[device] dispatch({code:#04x}, {arg:#06x}): {err}");
            ctx.regs.latch_error(&err);
        }
    }

    // flip_region is the sole command that never blocks on this path in
    // real hardware, but kinetoscope-device's dispatch is always called
    // synchronously by the harness binary's command loop — the async
    // "don't wait for a reply" behavior lives in how the console driver
    // issues FLIP_REGION, not in this function (spec.md §5).
    ctx.regs.return_to_console();
}

/// Drain any async prefetch result the worker produced since the last
/// command, latching a failure if one occurred. The real console has no
/// way to observe this directly except through the next FLIP_REGION's
/// busy check or a subsequent GET_ERROR — this just makes that surfacing
/// happen as soon as possible rather than only at the next flip.
pub fn drain_worker_events(ctx: &mut DeviceContext) {
    while let Some(event) = ctx.session.poll_worker_event() {
        if let WorkerEvent::ChunkFailed { error } = event {
            ctx.regs.latch_error(&error);
        }
    }
}

fn run(ctx: &mut DeviceContext, command: Command) {
    let result = match command {
        Command::Echo(value) => {
            // spec.md §8 scenario 1: bank 0 byte 0 is the argument's *low*
            // byte, so this one register write is little-endian — distinct
            // from the big-endian wire format used by headers and chunks
            // (spec.md §6).
            let mut guard = ctx.sram.lock().expect("sram mutex poisoned");
            guard.reset(Bank::Zero);
            guard.write(&value.to_le_bytes());
            Ok(())
        }
        Command::ListVideos => handle_list_videos(ctx),
        Command::StartVideo(index) => ctx.session.start_video(index),
        Command::StopVideo => {
            ctx.session.stop_video();
            Ok(())
        }
        Command::FlipRegion => ctx.session.flip_region(),
        Command::GetError => {
            let mut guard = ctx.sram.lock().expect("sram mutex poisoned");
            guard.reset(Bank::Zero);
            guard.write(&ctx.regs.error_str_bytes());
            Ok(())
        }
        Command::ConnectNet => {
            // Idempotent: repeated CONNECT_NET while already up is a no-op
            // (spec.md §4.F). Link establishment never fails in this
            // harness — a genuine Wi-Fi/DHCP failure is a firmware-only
            // code path with no host-side equivalent to simulate.
            ctx.link_up = true;
            Ok(())
        }
        Command::MarchTest(pass) => {
            let mut guard = ctx.sram.lock().expect("sram mutex poisoned");
            march::sram_march_test(&mut guard, pass)
        }
    };

    if let Err(err) = result {
        eprintln!("[device] command handler failed: {err}");
        ctx.regs.latch_error(&err);
    }
}

fn handle_list_videos(ctx: &mut DeviceContext) -> Result<(), KinetoscopeError> {
    let mut bytes = Vec::new();
    ctx.session
        .source_snapshot()
        .fetch_whole(CATALOG_PATH, &mut |chunk| {
            bytes.extend_from_slice(chunk);
            true
        })?;
    // Validate structure before trusting the bytes onto the bus — a
    // malformed catalog should surface as an error, not silent garbage in
    // SRAM (spec.md §7: "invalid catalog entry").
    Catalog::parse(&bytes).map_err(|_| KinetoscopeError::InvalidCatalogEntry)?;

    let mut guard = ctx.sram.lock().expect("sram mutex poisoned");
    guard.reset(Bank::Zero);
    guard.write(&bytes);
    Ok(())
}
