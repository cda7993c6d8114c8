// crates/kinetoscope-core/src/registers.rs
//
// The command/token/error register set (spec.md §4.F, §6). Pure state —
// no I/O, no SRAM access. kinetoscope-device's command processor owns one
// `ControlRegisters` value and drives it from the wire-level port reads.

use crate::error::KinetoscopeError;

/// Maximum length of the latched error string, including its nul
/// terminator (spec.md §4.A register description).
pub const ERROR_STR_MAX: usize = 256;

/// The one-bit ownership flag for shared SRAM and the command registers
/// (spec.md §4.A, §5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// The console may write commands/arg and read SRAM.
    Console,
    /// The device may mutate SRAM and is executing a handler.
    Device,
}

impl Token {
    pub fn flip(self) -> Token {
        match self {
            Token::Console => Token::Device,
            Token::Device => Token::Console,
        }
    }
}

/// The 8-bit command code plus its 16-bit argument, decoded into a typed
/// enum (spec.md §4.F).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Echo(u16),
    ListVideos,
    StartVideo(u16),
    StopVideo,
    FlipRegion,
    GetError,
    ConnectNet,
    MarchTest(u16),
}

impl Command {
    pub const ECHO: u8 = 0x00;
    pub const LIST_VIDEOS: u8 = 0x01;
    pub const START_VIDEO: u8 = 0x02;
    pub const STOP_VIDEO: u8 = 0x03;
    pub const FLIP_REGION: u8 = 0x04;
    pub const GET_ERROR: u8 = 0x05;
    pub const CONNECT_NET: u8 = 0x06;
    pub const MARCH_TEST: u8 = 0x07;

    /// Decode the `(command, arg)` register pair. Any code not in the
    /// table latches `UnrecognizedCommand` (spec.md §4.F last row).
    pub fn decode(code: u8, arg: u16) -> Result<Command, KinetoscopeError> {
        match code {
            Self::ECHO => Ok(Command::Echo(arg)),
            Self::LIST_VIDEOS => Ok(Command::ListVideos),
            Self::START_VIDEO => Ok(Command::StartVideo(arg)),
            Self::STOP_VIDEO => Ok(Command::StopVideo),
            Self::FLIP_REGION => Ok(Command::FlipRegion),
            Self::GET_ERROR => Ok(Command::GetError),
            Self::CONNECT_NET => Ok(Command::ConnectNet),
            Self::MARCH_TEST => Ok(Command::MarchTest(arg)),
            other => Err(KinetoscopeError::UnrecognizedCommand(other)),
        }
    }
}

/// The command/token/error register file (spec.md §4.A, §6).
#[derive(Debug)]
pub struct ControlRegisters {
    token: Token,
    error: bool,
    error_str: String,
}

impl ControlRegisters {
    pub fn new() -> Self {
        Self {
            token: Token::Console,
            error: false,
            error_str: String::new(),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Writing any value to the token port transfers it to the device
    /// (spec.md §6). There is no wire representation of "take it back" —
    /// the device returns it explicitly via `return_to_console`.
    pub fn hand_to_device(&mut self) {
        self.token = Token::Device;
    }

    pub fn return_to_console(&mut self) {
        self.token = Token::Console;
    }

    pub fn error_flag(&self) -> bool {
        self.error
    }

    pub fn error_str(&self) -> &str {
        &self.error_str
    }

    /// Latch an error, per spec.md §7's sticky-latch rule: the first error
    /// sets the flag and message; once latched, further errors before the
    /// console clears it are dropped (logged by the caller, not stored).
    /// Returns whether this call actually latched (vs. was dropped).
    pub fn latch_error(&mut self, err: &KinetoscopeError) -> bool {
        if self.error {
            return false;
        }
        self.error = true;
        self.error_str = truncate_error_message(&err.to_string());
        true
    }

    /// The console clears `error` by writing any value to the error port.
    /// `error_str` is left untouched (spec.md §4.F).
    pub fn clear_error(&mut self) {
        self.error = false;
    }

    /// `error_str` as a nul-terminated byte buffer, at most
    /// `ERROR_STR_MAX` bytes including the terminator (spec.md §4.A).
    pub fn error_str_bytes(&self) -> Vec<u8> {
        let mut bytes = self.error_str.as_bytes().to_vec();
        bytes.truncate(ERROR_STR_MAX - 1);
        bytes.push(0);
        bytes
    }
}

impl Default for ControlRegisters {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_error_message(message: &str) -> String {
    let max_bytes = ERROR_STR_MAX - 1;
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_maps_every_known_code() {
        assert_eq!(Command::decode(0x00, 42).unwrap(), Command::Echo(42));
        assert_eq!(Command::decode(0x01, 0).unwrap(), Command::ListVideos);
        assert_eq!(Command::decode(0x02, 3).unwrap(), Command::StartVideo(3));
        assert_eq!(Command::decode(0x03, 0).unwrap(), Command::StopVideo);
        assert_eq!(Command::decode(0x04, 0).unwrap(), Command::FlipRegion);
        assert_eq!(Command::decode(0x05, 0).unwrap(), Command::GetError);
        assert_eq!(Command::decode(0x06, 0).unwrap(), Command::ConnectNet);
        assert_eq!(Command::decode(0x07, 5).unwrap(), Command::MarchTest(5));
    }

    #[test]
    fn decode_rejects_unrecognized_code() {
        let err = Command::decode(0xFF, 0).unwrap_err();
        assert_eq!(err, KinetoscopeError::UnrecognizedCommand(0xFF));
        assert_eq!(err.to_string(), "Unrecognized command 0xFF!");
    }

    #[test]
    fn latch_error_is_sticky_until_cleared() {
        let mut regs = ControlRegisters::new();
        assert!(regs.latch_error(&KinetoscopeError::Underflow));
        assert!(regs.error_flag());
        assert_eq!(regs.error_str(), "Internet too slow?");

        // a second error during the same "handler" is dropped.
        assert!(!regs.latch_error(&KinetoscopeError::NoLink));
        assert_eq!(regs.error_str(), "Internet too slow?");

        regs.clear_error();
        assert!(!regs.error_flag());
        // error_str survives the clear, per spec.md §4.F.
        assert_eq!(regs.error_str(), "Internet too slow?");

        assert!(regs.latch_error(&KinetoscopeError::NoLink));
        assert_eq!(regs.error_str(), "No network link");
    }

    #[test]
    fn error_str_bytes_are_nul_terminated_and_bounded() {
        let mut regs = ControlRegisters::new();
        regs.latch_error(&KinetoscopeError::UnrecognizedCommand(0xFF));
        let bytes = regs.error_str_bytes();
        assert!(bytes.len() <= ERROR_STR_MAX);
        assert_eq!(*bytes.last().unwrap(), 0);
        assert_eq!(
            &bytes[..bytes.len() - 1],
            b"Unrecognized command 0xFF!"
        );
    }

    #[test]
    fn token_flip_round_trips() {
        assert_eq!(Token::Console.flip(), Token::Device);
        assert_eq!(Token::Device.flip(), Token::Console);
    }
}
