// crates/kinetoscope-device/src/context.rs
//
// DeviceContext: the single owned state value the command processor
// drives (spec.md §9 REDESIGN FLAGS — "module-level mutables become
// fields of a single owned session value threaded through handlers").
// Holds the register file, the shared SRAM, the streaming session, and
// the network-link flag CONNECT_NET toggles.

use std::sync::{Arc, Mutex};

use kinetoscope_core::registers::ControlRegisters;
use kinetoscope_core::sram::Sram;

use kinetoscope_stream::fetch::HttpSource;
use kinetoscope_stream::Session;

pub struct DeviceContext {
    pub regs: ControlRegisters,
    pub sram: Arc<Mutex<Sram>>,
    pub session: Session,
    /// CONNECT_NET is idempotent (spec.md §4.F); this is the closest thing
    /// the device has to persistent state, and it resets every power cycle
    /// (spec.md §6: "Persistent state. None").
    pub link_up: bool,
}

impl DeviceContext {
    pub fn new(source: HttpSource) -> Self {
        let sram = Arc::new(Mutex::new(Sram::new()));
        let session = Session::new(source, Arc::clone(&sram));
        Self {
            regs: ControlRegisters::new(),
            sram,
            session,
            link_up: false,
        }
    }
}
