//! Address-decode router between the bus view and per-device views.
//!
//! Incoming `memory:*`/`ui:memory:*` events carry absolute addresses; the
//! multiplexer picks the covering range entry, rebases the address, and
//! re-emits the event under `<base>/<device-id>`. Device `:result` events
//! come back under `<base>/<multiplexer-id>`, get their absolute address
//! restored from the emitting device's entry, and go upstream as the bare
//! base name.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Deserialize;

use crate::core::config::{de_u16, de_u32};
use crate::core::error::SimError;
use crate::core::event::{EventContext, Payload, grouped};
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::Channel;

/// Bases routed downstream (absolute → device-relative).
const INCOMING: [&str; 6] = [
    "memory:read",
    "memory:write",
    "ui:memory:read",
    "ui:memory:write",
    "ui:memory:bulk:write",
    "ui:memory:clear",
];

/// Bases routed upstream (device-relative → absolute).
const OUTGOING: [&str; 5] = [
    "memory:read:result",
    "memory:write:result",
    "ui:memory:read:result",
    "ui:memory:write:result",
    "ui:memory:bulk:write:result",
];

#[derive(Clone, Debug, Deserialize)]
pub struct MultiplexerEntry {
    pub module: String,
    #[serde(deserialize_with = "de_u16")]
    pub start: u16,
    #[serde(deserialize_with = "de_u32")]
    pub size: u32,
    /// Rank: on overlap the lowest value wins.
    #[serde(default)]
    pub priority: i32,
}

impl MultiplexerEntry {
    fn contains(&self, addr: u16) -> bool {
        let addr = u32::from(addr);
        let start = u32::from(self.start);
        addr >= start && addr < start + self.size
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MultiplexerConfig {
    pub entries: Vec<MultiplexerEntry>,
}

pub struct Multiplexer {
    entries: Vec<MultiplexerEntry>,
}

impl Multiplexer {
    pub fn spec(id: impl Into<String>, config: MultiplexerConfig) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let mux = Rc::new(RefCell::new(Multiplexer {
                entries: config.entries,
            }));
            let declaration = Self::declaration(&mux, &id, &channel);
            Ok(BuiltModule {
                declaration,
                instance: mux,
            })
        })
    }

    pub fn entries(&self) -> &[MultiplexerEntry] {
        &self.entries
    }

    /// Entry covering `addr` with the lowest priority value.
    fn route(&self, addr: u16) -> Option<&MultiplexerEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.contains(addr))
            .min_by_key(|entry| entry.priority)
    }

    /// First entry owned by `module` (result path).
    fn entry_for(&self, module: &str) -> Option<&MultiplexerEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.module == module)
            .min_by_key(|entry| entry.priority)
    }

    fn declaration(
        mux: &Rc<RefCell<Multiplexer>>,
        id: &str,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();

        let modules: Vec<String> = {
            let mux = mux.borrow();
            let mut seen = Vec::new();
            for entry in &mux.entries {
                if !seen.contains(&entry.module) {
                    seen.push(entry.module.clone());
                }
            }
            seen
        };
        for base in INCOMING {
            for module in &modules {
                declaration.provided.push(grouped(base, module));
            }
        }
        declaration
            .provided
            .extend(OUTGOING.iter().map(|base| (*base).to_string()));

        // Downstream: rebase the address, re-emit under the device group.
        for base in INCOMING {
            let mux = Rc::clone(mux);
            let channel = channel.clone();
            let listener: EventListener =
                Rc::new(move |payload: &Payload, _ctx: &EventContext| {
                    route_down(&mux.borrow(), &channel, base, payload)
                });
            declaration.optional.push((base.to_string(), listener));
        }

        // Upstream: restore the absolute address, re-emit the bare base.
        for base in OUTGOING {
            let mux = Rc::clone(mux);
            let channel = channel.clone();
            let listener: EventListener =
                Rc::new(move |payload: &Payload, ctx: &EventContext| {
                    route_up(&mux.borrow(), &channel, base, payload, ctx)
                });
            declaration.optional.push((grouped(base, id), listener));
        }

        declaration
    }
}

fn rebase(payload: &Payload, f: impl Fn(u16) -> u16) -> Payload {
    match payload {
        Payload::Address(address) => Payload::Address(f(*address)),
        Payload::Byte { address, data } => Payload::Byte {
            address: f(*address),
            data: *data,
        },
        Payload::Block { address, bytes } => Payload::Block {
            address: f(*address),
            bytes: bytes.clone(),
        },
        other => other.clone(),
    }
}

fn payload_address(payload: &Payload) -> Option<u16> {
    match payload {
        Payload::Address(address)
        | Payload::Byte { address, .. }
        | Payload::Block { address, .. } => Some(*address),
        _ => None,
    }
}

fn route_down(
    mux: &Multiplexer,
    channel: &Channel,
    base: &str,
    payload: &Payload,
) -> Result<(), SimError> {
    let Some(addr) = payload_address(payload) else {
        // Address-free events (ui:memory:clear) fan out to every device.
        let mut seen: Vec<&str> = Vec::new();
        for entry in &mux.entries {
            if seen.contains(&entry.module.as_str()) {
                continue;
            }
            seen.push(&entry.module);
            channel.emit(&grouped(base, &entry.module), payload.clone())?;
        }
        return Ok(());
    };
    let Some(entry) = mux.route(addr) else {
        warn!("{base}: no range covers {addr:#06x}, dropping");
        return Ok(());
    };
    let start = entry.start;
    channel.emit(
        &grouped(base, &entry.module),
        rebase(payload, |a| a.wrapping_sub(start)),
    )
}

fn route_up(
    mux: &Multiplexer,
    channel: &Channel,
    base: &str,
    payload: &Payload,
    ctx: &EventContext,
) -> Result<(), SimError> {
    let Some(entry) = mux.entry_for(&ctx.emitter) else {
        warn!("{base}: result from unmapped device `{}`, dropping", ctx.emitter);
        return Ok(());
    };
    let start = entry.start;
    channel.emit(base, rebase(payload, |a| a.wrapping_add(start)))
}
