//! Programmable interrupter.
//!
//! Raises its configured signal every `each` cycles (0 disables). In
//! device mode it additionally maps three bytes of register space through
//! a multiplexer: `(each_high, each_low, type)`: so programs can
//! reprogram it. Register responses use this device's own result timing
//! (subcycle 90), earlier than memory's 99.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Deserialize;

use crate::core::config::de_u16;
use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::core::module::{
    BuiltModule, CycleCallback, EventListener, ModuleDeclaration, ModuleSpec,
};
use crate::core::simulator::{Channel, CyclePriority};
use crate::device::io_name;

/// Device-declared result timing.
pub const RESULT_SUBCYCLE: u32 = 90;

/// Subcycle at which the periodic signal fires, after the CPU's start
/// phase so it is observed at the next fetch.
const TICK_SUBCYCLE: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Nmi,
    Irq,
    Firq,
}

impl SignalKind {
    pub fn event(self) -> &'static str {
        match self {
            SignalKind::Nmi => "signal:nmi",
            SignalKind::Irq => "signal:irq",
            SignalKind::Firq => "signal:firq",
        }
    }

    fn from_code(code: u8) -> Self {
        match code % 3 {
            0 => SignalKind::Nmi,
            1 => SignalKind::Irq,
            _ => SignalKind::Firq,
        }
    }

    fn code(self) -> u8 {
        match self {
            SignalKind::Nmi => 0,
            SignalKind::Irq => 1,
            SignalKind::Firq => 2,
        }
    }
}

fn default_kind() -> SignalKind {
    SignalKind::Irq
}

#[derive(Clone, Debug, Deserialize)]
pub struct InterrupterConfig {
    /// Cycles between signals; 0 disables.
    #[serde(default, deserialize_with = "de_u16")]
    pub each: u16,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: SignalKind,
    /// Map the register file through this multiplexer.
    #[serde(default)]
    pub multiplexer: Option<String>,
}

pub struct Interrupter {
    each: u16,
    kind: SignalKind,
    count: u16,
}

impl Interrupter {
    pub fn spec(id: impl Into<String>, config: InterrupterConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let interrupter = Rc::new(RefCell::new(Interrupter {
                each: config.each,
                kind: config.kind,
                count: 0,
            }));
            let declaration = Self::declaration(
                &interrupter,
                &id,
                config.multiplexer.as_deref(),
                &channel,
            );
            Ok(BuiltModule {
                declaration,
                instance: interrupter,
            })
        })
    }

    pub fn each(&self) -> u16 {
        self.each
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    fn read_register(&self, offset: u16) -> Option<u8> {
        match offset {
            0 => Some((self.each >> 8) as u8),
            1 => Some(self.each as u8),
            2 => Some(self.kind.code()),
            _ => None,
        }
    }

    fn write_register(&mut self, offset: u16, data: u8) -> bool {
        match offset {
            0 => self.each = (self.each & 0x00FF) | (u16::from(data) << 8),
            1 => self.each = (self.each & 0xFF00) | u16::from(data),
            2 => self.kind = SignalKind::from_code(data),
            _ => return false,
        }
        true
    }

    fn declaration(
        interrupter: &Rc<RefCell<Interrupter>>,
        id: &str,
        multiplexer: Option<&str>,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        // The type register can select any line at runtime, so all three
        // are declared.
        declaration.provided = vec![
            "signal:nmi".to_string(),
            "signal:irq".to_string(),
            "signal:firq".to_string(),
        ];

        // Periodic signal.
        {
            let interrupter = Rc::clone(interrupter);
            let channel = channel.clone();
            let tick: CycleCallback = Rc::new(move |_cycle, _subcycle| {
                let fire = {
                    let mut interrupter = interrupter.borrow_mut();
                    if interrupter.each == 0 {
                        interrupter.count = 0;
                        None
                    } else {
                        interrupter.count += 1;
                        if interrupter.count >= interrupter.each {
                            interrupter.count = 0;
                            Some(interrupter.kind)
                        } else {
                            None
                        }
                    }
                };
                if let Some(kind) = fire {
                    channel.emit(kind.event(), Payload::None)?;
                }
                Ok(())
            });
            declaration.cycles = vec![(tick, TICK_SUBCYCLE)];
        }

        // Device mode: a three-byte register window.
        if multiplexer.is_some() {
            let out_group = multiplexer.map(str::to_string);
            declaration.provided.extend(
                ["memory:read:result", "memory:write:result"]
                    .iter()
                    .map(|base| io_name(base, out_group.as_deref())),
            );

            {
                let interrupter = Rc::clone(interrupter);
                let channel = channel.clone();
                let name = io_name("memory:read:result", out_group.as_deref());
                let listener: EventListener = Rc::new(move |payload, _ctx| {
                    let Payload::Address(address) = payload else {
                        return Ok(());
                    };
                    let address = *address;
                    let interrupter = Rc::clone(&interrupter);
                    let channel_inner = channel.clone();
                    let name = name.clone();
                    channel.once_cycle(
                        Rc::new(move |_cycle, _subcycle| {
                            let data = {
                                let interrupter = interrupter.borrow();
                                let Some(data) = interrupter.read_register(address) else {
                                    warn!("interrupter read past register file at {address}");
                                    return Ok(());
                                };
                                data
                            };
                            channel_inner.emit(&name, Payload::Byte { address, data })
                        }),
                        CyclePriority::this_cycle(RESULT_SUBCYCLE),
                    )
                });
                declaration
                    .optional
                    .push((io_name("memory:read", Some(id)), listener));
            }

            {
                let interrupter = Rc::clone(interrupter);
                let channel = channel.clone();
                let name = io_name("memory:write:result", out_group.as_deref());
                let listener: EventListener = Rc::new(move |payload, _ctx| {
                    let Payload::Byte { address, data } = payload else {
                        return Ok(());
                    };
                    if !interrupter.borrow_mut().write_register(*address, *data) {
                        warn!("interrupter write past register file at {}", address);
                        return Ok(());
                    }
                    let address = *address;
                    let data = *data;
                    let channel_inner = channel.clone();
                    let name = name.clone();
                    channel.once_cycle(
                        Rc::new(move |_cycle, _subcycle| {
                            channel_inner.emit(&name, Payload::Byte { address, data })
                        }),
                        CyclePriority::this_cycle(RESULT_SUBCYCLE),
                    )
                });
                declaration
                    .optional
                    .push((io_name("memory:write", Some(id)), listener));
            }
        }

        declaration
    }
}
