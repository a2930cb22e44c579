//! Write-through display buffer.
//!
//! Programs store characters through the bus; the host inspects the
//! buffer over the `ui:memory:read` path. Always writable, answers
//! CPU-side traffic with memory's timing.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Deserialize;

use crate::core::config::de_usize;
use crate::core::event::Payload;
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::{Channel, CyclePriority};
use crate::device::io_name;
use crate::device::memory::RESULT_SUBCYCLE;

fn default_size() -> usize {
    0x400
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "default_size", deserialize_with = "de_usize")]
    pub size: usize,
    #[serde(default)]
    pub multiplexer: Option<String>,
}

pub struct Screen {
    id: String,
    data: Vec<u8>,
}

impl Screen {
    pub fn spec(id: impl Into<String>, config: ScreenConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let screen = Rc::new(RefCell::new(Screen {
                id: id.clone(),
                data: vec![0; config.size],
            }));
            let declaration =
                Self::declaration(&screen, &id, config.multiplexer.as_deref(), &channel);
            Ok(BuiltModule {
                declaration,
                instance: screen,
            })
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn declaration(
        screen: &Rc<RefCell<Screen>>,
        id: &str,
        multiplexer: Option<&str>,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        let in_group = multiplexer.map(|_| id.to_string());
        let out_group = multiplexer.map(str::to_string);

        declaration.provided = [
            "memory:read:result",
            "memory:write:result",
            "ui:memory:read:result",
        ]
        .iter()
        .map(|base| io_name(base, out_group.as_deref()))
        .collect();

        // ui:memory:read: immediate host inspection.
        {
            let screen = Rc::clone(screen);
            let channel = channel.clone();
            let name = io_name("ui:memory:read:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Address(address) = payload else {
                    return Ok(());
                };
                let data = {
                    let screen = screen.borrow();
                    let Some(data) = screen.data.get(usize::from(*address)).copied() else {
                        warn!("`{}`: ui read past end at {address:#06x}", screen.id);
                        return Ok(());
                    };
                    data
                };
                channel.emit(&name, Payload::Byte {
                    address: *address,
                    data,
                })
            });
            declaration
                .optional
                .push((io_name("ui:memory:read", in_group.as_deref()), listener));
        }

        // memory:read: answer at subcycle 99.
        {
            let screen = Rc::clone(screen);
            let channel = channel.clone();
            let name = io_name("memory:read:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Address(address) = payload else {
                    return Ok(());
                };
                let address = *address;
                let screen = Rc::clone(&screen);
                let channel_inner = channel.clone();
                let name = name.clone();
                channel.once_cycle(
                    Rc::new(move |_cycle, _subcycle| {
                        let data = {
                            let screen = screen.borrow();
                            let Some(data) = screen.data.get(usize::from(address)).copied()
                            else {
                                warn!("`{}`: read past end at {address:#06x}", screen.id);
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
                .push((io_name("memory:read", in_group.as_deref()), listener));
        }

        // memory:write: store, acknowledge at subcycle 99.
        {
            let screen = Rc::clone(screen);
            let channel = channel.clone();
            let name = io_name("memory:write:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Byte { address, data } = payload else {
                    return Ok(());
                };
                {
                    let mut screen = screen.borrow_mut();
                    let index = usize::from(*address);
                    if index >= screen.data.len() {
                        warn!("`{}`: write past end at {address:#06x}", screen.id);
                        return Ok(());
                    }
                    screen.data[index] = *data;
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
                .push((io_name("memory:write", in_group.as_deref()), listener));
        }

        declaration
    }
}
