// crates/kinetoscope-device/src/bin/kinetoscope-emu.rs
//
// Text-console harness for the emulator twin (spec.md §1, §9: "dual
// targets — firmware vs. emulator"). Reads one command per line, either
// from stdin or from a script file given as the sole argument, in the form
// `NAME [ARG]`, dispatches it through the same `commands::dispatch` the
// real firmware would call, and prints the resulting register/SRAM state.
// Not a protocol server — a manual probe for exercising the command set
// from a terminal or a canned script.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::time::Duration;

use kinetoscope_device::{dispatch, DeviceContext, SystemClock};
use kinetoscope_stream::fetch::HttpSource;

/// The emulator's simulated processing delay before every dispatch
/// (spec.md §4.F). Real firmware passes `Duration::ZERO` instead — see
/// `commands::dispatch`'s `delay` parameter.
const EMULATED_PROCESSING_DELAY: Duration = Duration::from_millis(100);

fn main() {
    let source = HttpSource::from_env();
    eprintln!(
        "[device] kinetoscope-emu starting, server http://{}:{}/{}",
        source.host, source.port, source.base_path
    );
    let mut ctx = DeviceContext::new(source);
    let clock = SystemClock;

    println!("kinetoscope-emu ready. Commands: ECHO <u16> | LIST_VIDEOS | START_VIDEO <u16> | STOP_VIDEO | FLIP_REGION | GET_ERROR | CONNECT_NET | MARCH_TEST <u16> | QUIT");

    match std::env::args().nth(1) {
        Some(script_path) => match File::open(&script_path) {
            Ok(file) => run_commands(&mut ctx, &clock, BufReader::new(file).lines()),
            Err(e) => {
                eprintln!("[device] could not open script file {script_path:?}: {e}");
                std::process::exit(1);
            }
        },
        None => run_commands(&mut ctx, &clock, io::stdin().lock().lines()),
    }
}

fn run_commands(
    ctx: &mut DeviceContext,
    clock: &SystemClock,
    lines: impl Iterator<Item = io::Result<String>>,
) {
    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("QUIT") {
            break;
        }

        let Some((code, arg)) = parse_command(line) else {
            println!("unrecognized input: {line:?}");
            continue;
        };

        dispatch(ctx, clock, EMULATED_PROCESSING_DELAY, code, arg);
        kinetoscope_device::commands::drain_worker_events(ctx);
        report(ctx);
        io::stdout().flush().ok();
    }
}

fn parse_command(line: &str) -> Option<(u8, u16)> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?.to_ascii_uppercase();
    let arg: u16 = parts.next().map(|a| a.parse().unwrap_or(0)).unwrap_or(0);
    let code = match name.as_str() {
        "ECHO" => kinetoscope_core::registers::Command::ECHO,
        "LIST_VIDEOS" => kinetoscope_core::registers::Command::LIST_VIDEOS,
        "START_VIDEO" => kinetoscope_core::registers::Command::START_VIDEO,
        "STOP_VIDEO" => kinetoscope_core::registers::Command::STOP_VIDEO,
        "FLIP_REGION" => kinetoscope_core::registers::Command::FLIP_REGION,
        "GET_ERROR" => kinetoscope_core::registers::Command::GET_ERROR,
        "CONNECT_NET" => kinetoscope_core::registers::Command::CONNECT_NET,
        "MARCH_TEST" => kinetoscope_core::registers::Command::MARCH_TEST,
        _ => return None,
    };
    Some((code, arg))
}

fn report(ctx: &DeviceContext) {
    if ctx.regs.error_flag() {
        println!("error=1 error_str={:?}", ctx.regs.error_str());
    } else {
        println!("error=0");
    }
}
