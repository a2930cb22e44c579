use crate::cpu::registers::{RegisterName, Registers};

/// An event name is a base name, optionally qualified by a `/group` suffix
/// (`memory:read` vs `memory:read/ram0`). The base defines the payload
/// shape; the group disambiguates otherwise identical events from
/// different devices on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventName {
    pub base: String,
    pub group: Option<String>,
}

impl EventName {
    /// Split a full name into base and group. Total: any string parses.
    pub fn split(name: &str) -> Self {
        match name.split_once('/') {
            Some((base, group)) => Self {
                base: base.to_string(),
                group: Some(group.to_string()),
            },
            None => Self {
                base: name.to_string(),
                group: None,
            },
        }
    }

    /// Rebuild the full name.
    pub fn join(&self) -> String {
        match &self.group {
            Some(group) => format!("{}/{}", self.base, group),
            None => self.base.clone(),
        }
    }
}

/// Join a base name with a group suffix.
pub fn grouped(base: &str, group: &str) -> String {
    format!("{base}/{group}")
}

/// Base name of a full event name (the part before any `/`).
pub fn base_of(name: &str) -> &str {
    name.split_once('/').map_or(name, |(base, _)| base)
}

/// Group suffix of a full event name, if any.
pub fn group_of(name: &str) -> Option<&str> {
    name.split_once('/').map(|(_, group)| group)
}

/// Emission metadata delivered to every subscriber after the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    /// Id of the emitting module (`*` for kernel-internal emissions).
    pub emitter: String,
    pub cycle: u64,
    pub subcycle: u32,
}

/// Typed payloads for the closed set of base event names. The base name
/// alone determines which variant travels with it.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// `signal:*`, `ui:memory:clear`, `ui:clock:pause`, `stop:finished`,
    /// `system:load_finish`.
    None,
    /// `memory:read`, `ui:memory:read`.
    Address(u16),
    /// `memory:{read:result,write,write:result}` and `ui:` variants.
    Byte { address: u16, data: u8 },
    /// `ui:memory:bulk:write` and its result.
    Block { address: u16, bytes: Vec<u8> },
    /// `cpu:{registers_update,reset_finish,instruction_begin,
    /// instruction_finish,function}`.
    Registers(Registers),
    /// `cpu:register_update`, `dbg:register_update`.
    Register { name: RegisterName, value: u16 },
    /// `pia6820:{ca,cb}`: control line number (1 or 2) and level.
    Control { line: u8, state: bool },
    /// `pia6820:{data_a,data_b}`: port input byte.
    Data(u8),
    /// `ui:message:status`, `gui:panel_created`, `dbg:{program:load,
    /// symbols:load,symbol:add}`.
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_bare_name() {
        let name = EventName::split("memory:read");
        assert_eq!(name.base, "memory:read");
        assert_eq!(name.group, None);
        assert_eq!(name.join(), "memory:read");
    }

    #[test]
    fn split_grouped_name() {
        let name = EventName::split("memory:read/ram0");
        assert_eq!(name.base, "memory:read");
        assert_eq!(name.group.as_deref(), Some("ram0"));
        assert_eq!(name.join(), "memory:read/ram0");
    }

    #[test]
    fn base_and_group_accessors() {
        assert_eq!(base_of("memory:write:result/mux"), "memory:write:result");
        assert_eq!(group_of("memory:write:result/mux"), Some("mux"));
        assert_eq!(group_of("signal:reset"), None);
        assert_eq!(grouped("memory:read", "ram0"), "memory:read/ram0");
    }
}
