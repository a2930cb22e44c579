//! Module-kind registry.
//!
//! Each constructible module kind self-registers via [`inventory::submit!`]
//! with a name and a factory. Configuration entries name their kind
//! through the stem of the `url`'s last path segment (`…/memory.js` →
//! `memory`), so documents written for the hosted simulator resolve here
//! without translation.

use serde_json::Value;

use wirewrap_core::core::error::ConfigError;
use wirewrap_core::core::module::ModuleSpec;
use wirewrap_core::cpu::{Cpu, CpuConfig};
use wirewrap_core::device::{
    Clock, Interrupter, InterrupterConfig, Memory, MemoryConfig, Multiplexer, MultiplexerConfig,
    Pia6820, Pia6820Config, Screen, ScreenConfig, Stop, StopConfig,
};

/// A constructible module kind.
pub struct ModuleKind {
    pub name: &'static str,
    /// Factory: validate the raw config and produce a module spec.
    pub create: fn(&str, Value) -> Result<ModuleSpec, ConfigError>,
}

impl ModuleKind {
    pub const fn new(
        name: &'static str,
        create: fn(&str, Value) -> Result<ModuleSpec, ConfigError>,
    ) -> Self {
        Self { name, create }
    }
}

inventory::collect!(ModuleKind);

/// Look up a kind by name.
pub fn find(name: &str) -> Option<&'static ModuleKind> {
    inventory::iter::<ModuleKind>
        .into_iter()
        .find(|kind| kind.name == name)
}

/// All registered kinds, sorted by name.
pub fn all() -> Vec<&'static ModuleKind> {
    let mut kinds: Vec<_> = inventory::iter::<ModuleKind>.into_iter().collect();
    kinds.sort_by_key(|kind| kind.name);
    kinds
}

/// Kind name embedded in a module url: the stem of its last path segment.
pub fn kind_from_url(url: &str) -> &str {
    let segment = url.rsplit(['/', '\\']).next().unwrap_or(url);
    segment.split_once('.').map_or(segment, |(stem, _)| stem)
}

fn bad_config(kind: &str, err: serde_json::Error) -> ConfigError {
    ConfigError::BadField {
        field: "config",
        reason: format!("{kind}: {err}"),
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: &'static str, config: Value) -> Result<T, ConfigError> {
    serde_json::from_value(config).map_err(|err| bad_config(kind, err))
}

inventory::submit! {
    ModuleKind::new("clock", |id, _config| Ok(Clock::spec(id)))
}

inventory::submit! {
    ModuleKind::new("cpu", |id, config| {
        let config: CpuConfig = parse("cpu", config)?;
        Ok(Cpu::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("multiplexer", |id, config| {
        let config: MultiplexerConfig = parse("multiplexer", config)?;
        Ok(Multiplexer::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("memory", |id, config| {
        let config: MemoryConfig = parse("memory", config)?;
        Ok(Memory::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("interrupter", |id, config| {
        let config: InterrupterConfig = parse("interrupter", config)?;
        Ok(Interrupter::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("pia6820", |id, config| {
        let config: Pia6820Config = parse("pia6820", config)?;
        Ok(Pia6820::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("screen", |id, config| {
        let config: ScreenConfig = parse("screen", config)?;
        Ok(Screen::spec(id, config))
    })
}

inventory::submit! {
    ModuleKind::new("stop", |id, config| {
        let config: StopConfig = parse("stop", config)?;
        Ok(Stop::spec(id, config))
    })
}
