//! Stop device: a one-byte register programs write to signal completion.
//!
//! Any CPU write raises `stop:finished` (the clock pauses on it) and is
//! acknowledged with memory timing, so the writing instruction still
//! retires cleanly.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;

use crate::core::event::Payload;
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::{Channel, CyclePriority};
use crate::device::io_name;
use crate::device::memory::RESULT_SUBCYCLE;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StopConfig {
    #[serde(default)]
    pub multiplexer: Option<String>,
}

pub struct Stop {
    finished: bool,
    code: u8,
}

impl Stop {
    pub fn spec(id: impl Into<String>, config: StopConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let stop = Rc::new(RefCell::new(Stop {
                finished: false,
                code: 0,
            }));
            let declaration = Self::declaration(&stop, &id, config.multiplexer.as_deref(), &channel);
            Ok(BuiltModule {
                declaration,
                instance: stop,
            })
        })
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Value of the terminating write.
    pub fn code(&self) -> u8 {
        self.code
    }

    fn declaration(
        stop: &Rc<RefCell<Stop>>,
        id: &str,
        multiplexer: Option<&str>,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        let in_group = multiplexer.map(|_| id.to_string());
        let out_group = multiplexer.map(str::to_string);

        let result_name = io_name("memory:write:result", out_group.as_deref());
        declaration.provided = vec!["stop:finished".to_string(), result_name.clone()];

        let stop = Rc::clone(stop);
        let channel = channel.clone();
        let listener: EventListener = Rc::new(move |payload, _ctx| {
            let Payload::Byte { address, data } = payload else {
                return Ok(());
            };
            {
                let mut stop = stop.borrow_mut();
                stop.finished = true;
                stop.code = *data;
            }
            let address = *address;
            let data = *data;
            let channel_inner = channel.clone();
            let name = result_name.clone();
            channel.once_cycle(
                Rc::new(move |_cycle, _subcycle| {
                    channel_inner.emit(&name, Payload::Byte { address, data })
                }),
                CyclePriority::this_cycle(RESULT_SUBCYCLE),
            )?;
            channel.emit("stop:finished", Payload::None)
        });
        declaration
            .optional
            .push((io_name("memory:write", in_group.as_deref()), listener));

        declaration
    }
}
