//! Canonical hand-assembled M6809 system.
//!
//! The same machine the reference configuration document describes, built
//! directly from module specs: clock, CPU, multiplexer, 64K of RAM, and
//! optional stop/screen/interrupter devices punched into the top of the
//! address space by multiplexer priority (lower rank wins on overlap).

use wirewrap_core::core::error::SimError;
use wirewrap_core::core::module::ModuleSpec;
use wirewrap_core::core::simulator::Simulator;
use wirewrap_core::cpu::{Cpu, CpuConfig};
use wirewrap_core::device::{
    Clock, Interrupter, InterrupterConfig, Memory, MemoryConfig, MemoryKind, Multiplexer,
    MultiplexerConfig, MultiplexerEntry, Screen, ScreenConfig, Stop, StopConfig,
};

/// Stop device register.
pub const STOP_ADDR: u16 = 0xFF00;
/// Screen buffer base.
pub const SCREEN_ADDR: u16 = 0xF800;
/// Screen buffer size.
pub const SCREEN_SIZE: u32 = 0x400;
/// Interrupter register window.
pub const INTERRUPTER_ADDR: u16 = 0xFF10;

#[derive(Clone, Debug, Default)]
pub struct SystemOptions {
    pub cpu: CpuConfig,
    pub with_stop: bool,
    pub with_screen: bool,
    pub interrupter: Option<InterrupterConfig>,
}

/// Module specs for the canonical system, in load order.
pub fn module_specs(options: SystemOptions) -> Vec<ModuleSpec> {
    let mut entries = vec![MultiplexerEntry {
        module: "ram".to_string(),
        start: 0,
        size: 0x1_0000,
        priority: 10,
    }];
    let mut specs = vec![
        Clock::spec("clock"),
        Cpu::spec("cpu", options.cpu),
    ];

    if options.with_stop {
        entries.push(MultiplexerEntry {
            module: "stop".to_string(),
            start: STOP_ADDR,
            size: 1,
            priority: 0,
        });
        specs.push(Stop::spec(
            "stop",
            StopConfig {
                multiplexer: Some("mux".to_string()),
            },
        ));
    }
    if options.with_screen {
        entries.push(MultiplexerEntry {
            module: "screen".to_string(),
            start: SCREEN_ADDR,
            size: SCREEN_SIZE,
            priority: 1,
        });
        specs.push(Screen::spec(
            "screen",
            ScreenConfig {
                size: SCREEN_SIZE as usize,
                multiplexer: Some("mux".to_string()),
            },
        ));
    }
    if let Some(mut interrupter) = options.interrupter {
        entries.push(MultiplexerEntry {
            module: "interrupter".to_string(),
            start: INTERRUPTER_ADDR,
            size: 3,
            priority: 2,
        });
        interrupter.multiplexer = Some("mux".to_string());
        specs.push(Interrupter::spec("interrupter", interrupter));
    }

    specs.push(Multiplexer::spec("mux", MultiplexerConfig { entries }));
    specs.push(Memory::spec(
        "ram",
        MemoryConfig {
            size: 0x1_0000,
            kind: MemoryKind::Ram,
            multiplexer: Some("mux".to_string()),
        },
    ));
    specs
}

/// Build the canonical system.
pub fn build(options: SystemOptions) -> Result<Simulator, SimError> {
    Simulator::build(module_specs(options))
}
