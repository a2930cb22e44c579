//! The CPU module: wires the M6809 core to the event bus.
//!
//! The core itself (`m6809`) is a pure state machine; this adapter owns
//! the module declaration, feeds bus events into it, and flushes its
//! outbox through the permission-checked channel after every borrow is
//! released.

pub mod m6809;
pub mod registers;

use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;

use crate::core::config::{de_u16, de_u16_vec};
use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::core::module::{BuiltModule, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::Channel;
use m6809::{CpuCore, State};
use registers::Registers;

/// Subcycle of the CPU's start phase.
pub const START_SUBCYCLE: u32 = 0;
/// Subcycle of the CPU's end phase, after device responses at 99.
pub const END_SUBCYCLE: u32 = 100;

fn default_reset_vector() -> u16 {
    0xFFFE
}
fn default_nmi_vector() -> u16 {
    0xFFFC
}
fn default_swi_vector() -> u16 {
    0xFFFA
}
fn default_irq_vector() -> u16 {
    0xFFF8
}
fn default_firq_vector() -> u16 {
    0xFFF6
}
fn default_swi2_vector() -> u16 {
    0xFFF4
}
fn default_swi3_vector() -> u16 {
    0xFFF2
}

/// CPU configuration: interrupt/reset vectors plus the addresses of
/// host-implemented functions (the `customfn` exit points).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuConfig {
    #[serde(deserialize_with = "de_u16")]
    pub reset_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub nmi_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub irq_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub firq_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub swi_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub swi2_vector: u16,
    #[serde(deserialize_with = "de_u16")]
    pub swi3_vector: u16,
    #[serde(deserialize_with = "de_u16_vec")]
    pub functions: Vec<u16>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            reset_vector: default_reset_vector(),
            nmi_vector: default_nmi_vector(),
            irq_vector: default_irq_vector(),
            firq_vector: default_firq_vector(),
            swi_vector: default_swi_vector(),
            swi2_vector: default_swi2_vector(),
            swi3_vector: default_swi3_vector(),
            functions: Vec::new(),
        }
    }
}

pub struct Cpu {
    core: CpuCore,
}

impl Cpu {
    pub fn spec(id: impl Into<String>, config: CpuConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |_id, channel| {
            let cpu = Rc::new(RefCell::new(Cpu {
                core: CpuCore::new(config),
            }));
            let declaration = Self::declaration(&cpu, &channel);
            Ok(BuiltModule {
                declaration,
                instance: cpu,
            })
        })
    }

    pub fn registers(&self) -> Registers {
        self.core.registers()
    }

    pub fn state(&self) -> State {
        self.core.state()
    }

    fn declaration(cpu: &Rc<RefCell<Cpu>>, channel: &Channel) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        declaration.provided = [
            "cpu:registers_update",
            "cpu:register_update",
            "cpu:instruction_begin",
            "cpu:instruction_finish",
            "cpu:reset_finish",
            "cpu:function",
            "memory:read",
            "memory:write",
        ]
        .map(str::to_string)
        .to_vec();

        let feed = |f: fn(&mut CpuCore, &Payload)| {
            let cpu = Rc::clone(cpu);
            Rc::new(move |payload: &Payload, _ctx: &crate::core::event::EventContext| {
                f(&mut cpu.borrow_mut().core, payload);
                Ok(())
            }) as crate::core::module::EventListener
        };

        declaration.required = vec![
            (
                "signal:reset".to_string(),
                feed(|core, _| core.signal_reset()),
            ),
            (
                "memory:read:result".to_string(),
                feed(|core, payload| {
                    if let Payload::Byte { address, data } = payload {
                        core.on_read_result(*address, *data);
                    }
                }),
            ),
            (
                "memory:write:result".to_string(),
                feed(|core, payload| {
                    if let Payload::Byte { address, .. } = payload {
                        core.on_write_result(*address);
                    }
                }),
            ),
        ];
        // Interrupt lines and the debugger bridge may have no driver in a
        // given system.
        declaration.optional = vec![
            ("signal:nmi".to_string(), feed(|core, _| core.signal_nmi())),
            (
                "signal:firq".to_string(),
                feed(|core, _| core.signal_firq()),
            ),
            ("signal:irq".to_string(), feed(|core, _| core.signal_irq())),
            (
                "dbg:register_update".to_string(),
                feed(|core, payload| {
                    if let Payload::Register { name, value } = payload {
                        core.dbg_update(*name, *value);
                    }
                }),
            ),
        ];

        let phase = |end: bool| {
            let cpu = Rc::clone(cpu);
            let channel = channel.clone();
            Rc::new(move |_cycle: u64, _subcycle: u32| -> Result<(), SimError> {
                let outbox = {
                    let mut cpu = cpu.borrow_mut();
                    if end {
                        cpu.core.phase_end()?;
                    } else {
                        cpu.core.phase_start()?;
                    }
                    cpu.core.take_outbox()
                };
                for (name, payload) in outbox {
                    channel.emit(&name, payload)?;
                }
                Ok(())
            }) as crate::core::module::CycleCallback
        };

        declaration.cycles = vec![(phase(false), START_SUBCYCLE), (phase(true), END_SUBCYCLE)];
        declaration
    }
}
