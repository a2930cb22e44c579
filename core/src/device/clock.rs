//! The cycle initiator.
//!
//! The clock is the one module allowed to drive `perform_cycle`. The host
//! calls [`Clock::run`]; the loop stops early when something pauses the
//! clock (`ui:clock:pause`) or a program signals completion
//! (`stop:finished`). It also owns the reset line.

use std::cell::Cell;
use std::rc::Rc;

use serde::Deserialize;

use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::Channel;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClockConfig {}

pub struct Clock {
    channel: Channel,
    paused: Rc<Cell<bool>>,
}

impl Clock {
    pub fn spec(id: impl Into<String>) -> ModuleSpec {
        ModuleSpec::new(id, move |_id, channel| {
            let paused = Rc::new(Cell::new(false));
            let clock = Rc::new(std::cell::RefCell::new(Clock {
                channel: channel.clone(),
                paused: Rc::clone(&paused),
            }));

            let mut declaration = ModuleDeclaration::new();
            declaration.initiator = true;
            declaration.provided = vec!["signal:reset".to_string()];
            let pause = |flag: &Rc<Cell<bool>>| {
                let flag = Rc::clone(flag);
                Rc::new(move |_: &Payload, _: &crate::core::event::EventContext| {
                    flag.set(true);
                    Ok(())
                }) as EventListener
            };
            declaration.optional = vec![
                ("ui:clock:pause".to_string(), pause(&paused)),
                ("stop:finished".to_string(), pause(&paused)),
            ];

            Ok(BuiltModule {
                declaration,
                instance: clock,
            })
        })
    }

    /// Pulse the reset line.
    pub fn reset(&self) -> Result<(), SimError> {
        self.channel.emit("signal:reset", Payload::None)
    }

    /// Advance up to `cycles` cycles; stops early when paused. Returns the
    /// number of cycles actually performed.
    pub fn run(&self, cycles: u64) -> Result<u64, SimError> {
        self.paused.set(false);
        let mut done = 0;
        while done < cycles {
            self.channel.perform_cycle()?;
            done += 1;
            if self.paused.get() {
                break;
            }
        }
        Ok(done)
    }

    pub fn paused(&self) -> bool {
        self.paused.get()
    }
}
