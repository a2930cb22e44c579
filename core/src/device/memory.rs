//! RAM/ROM memory module.
//!
//! Host-side `ui:memory:*` traffic answers immediately; CPU-side
//! `memory:{read,write}` schedule their results at subcycle 99 of the
//! current cycle, one cycle's latency as seen by the CPU's end phase.
//! Loader writes go through the `ui:` path, so ROM images can be
//! installed; CPU writes to ROM are fatal.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Deserialize;

use crate::core::config::de_usize;
use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::{Channel, CyclePriority};
use crate::device::io_name;

/// Subcycle at which CPU-side results are delivered.
pub const RESULT_SUBCYCLE: u32 = 99;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Ram,
    Rom,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MemoryConfig {
    #[serde(deserialize_with = "de_usize")]
    pub size: usize,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    #[serde(default)]
    pub multiplexer: Option<String>,
}

pub struct Memory {
    id: String,
    kind: MemoryKind,
    data: Vec<u8>,
}

impl Memory {
    pub fn spec(id: impl Into<String>, config: MemoryConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let memory = Rc::new(RefCell::new(Memory {
                id: id.clone(),
                kind: config.kind,
                data: vec![0; config.size],
            }));
            let declaration = Self::declaration(&memory, &id, config.multiplexer.as_deref(), &channel);
            Ok(BuiltModule {
                declaration,
                instance: memory,
            })
        })
    }

    pub fn read(&self, addr: u16) -> Option<u8> {
        self.data.get(usize::from(addr)).copied()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn declaration(
        memory: &Rc<RefCell<Memory>>,
        id: &str,
        multiplexer: Option<&str>,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        // Behind a multiplexer: requests arrive grouped by our own id and
        // results go out grouped by the multiplexer's id.
        let in_group = multiplexer.map(|_| id.to_string());
        let out_group = multiplexer.map(str::to_string);

        declaration.provided = [
            "memory:read:result",
            "memory:write:result",
            "ui:memory:read:result",
            "ui:memory:write:result",
            "ui:memory:bulk:write:result",
        ]
        .iter()
        .map(|base| io_name(base, out_group.as_deref()))
        .collect();

        let listen = |base: &str| io_name(base, in_group.as_deref());

        // ui:memory:read: immediate.
        {
            let memory = Rc::clone(memory);
            let channel = channel.clone();
            let name = io_name("ui:memory:read:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Address(address) = payload else {
                    return Ok(());
                };
                let data = {
                    let memory = memory.borrow();
                    let Some(data) = memory.read(*address) else {
                        warn!("`{}`: ui read past end at {address:#06x}", memory.id);
                        return Ok(());
                    };
                    data
                };
                channel.emit(&name, Payload::Byte {
                    address: *address,
                    data,
                })
            });
            declaration.optional.push((listen("ui:memory:read"), listener));
        }

        // ui:memory:write: immediate, ROM included (loader path).
        {
            let memory = Rc::clone(memory);
            let channel = channel.clone();
            let name = io_name("ui:memory:write:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Byte { address, data } = payload else {
                    return Ok(());
                };
                {
                    let mut memory = memory.borrow_mut();
                    let index = usize::from(*address);
                    if index >= memory.data.len() {
                        warn!("`{}`: ui write past end at {address:#06x}", memory.id);
                        return Ok(());
                    }
                    memory.data[index] = *data;
                }
                channel.emit(&name, Payload::Byte {
                    address: *address,
                    data: *data,
                })
            });
            declaration.optional.push((listen("ui:memory:write"), listener));
        }

        // ui:memory:bulk:write: bounds-checked block store.
        {
            let memory = Rc::clone(memory);
            let channel = channel.clone();
            let name = io_name("ui:memory:bulk:write:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Block { address, bytes } = payload else {
                    return Ok(());
                };
                {
                    let mut memory = memory.borrow_mut();
                    let start = usize::from(*address);
                    let size = memory.data.len();
                    if start + bytes.len() > size {
                        return Err(SimError::BulkWriteOverflow {
                            module: memory.id.clone(),
                            offset: *address,
                            len: bytes.len(),
                            size,
                        });
                    }
                    memory.data[start..start + bytes.len()].copy_from_slice(bytes);
                }
                channel.emit(&name, Payload::Block {
                    address: *address,
                    bytes: bytes.clone(),
                })
            });
            declaration
                .optional
                .push((listen("ui:memory:bulk:write"), listener));
        }

        // ui:memory:clear: zero-fill, no result.
        {
            let memory = Rc::clone(memory);
            let listener: EventListener = Rc::new(move |_payload, _ctx| {
                memory.borrow_mut().data.fill(0);
                Ok(())
            });
            declaration.optional.push((listen("ui:memory:clear"), listener));
        }

        // memory:read: answer at subcycle 99.
        {
            let memory = Rc::clone(memory);
            let channel = channel.clone();
            let name = io_name("memory:read:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Address(address) = payload else {
                    return Ok(());
                };
                let address = *address;
                let memory = Rc::clone(&memory);
                let channel_inner = channel.clone();
                let name = name.clone();
                channel.once_cycle(
                    Rc::new(move |_cycle, _subcycle| {
                        let data = {
                            let memory = memory.borrow();
                            let Some(data) = memory.read(address) else {
                                warn!("`{}`: read past end at {address:#06x}", memory.id);
                                return Ok(());
                            };
                            data
                        };
                        channel_inner.emit(&name, Payload::Byte { address, data })
                    }),
                    CyclePriority::this_cycle(RESULT_SUBCYCLE),
                )
            });
            declaration.optional.push((listen("memory:read"), listener));
        }

        // memory:write: commit now, acknowledge at subcycle 99. ROM is
        // read-only on this path.
        {
            let memory = Rc::clone(memory);
            let channel = channel.clone();
            let name = io_name("memory:write:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Byte { address, data } = payload else {
                    return Ok(());
                };
                {
                    let mut memory = memory.borrow_mut();
                    if memory.kind == MemoryKind::Rom {
                        return Err(SimError::RomWrite {
                            module: memory.id.clone(),
                            offset: *address,
                        });
                    }
                    let index = usize::from(*address);
                    if index >= memory.data.len() {
                        warn!("`{}`: write past end at {address:#06x}", memory.id);
                        return Ok(());
                    }
                    memory.data[index] = *data;
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
            declaration.optional.push((listen("memory:write"), listener));
        }

        declaration
    }
}
