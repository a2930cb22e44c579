use thiserror::Error;

/// Fatal simulator errors. Decode failures and routing misses are absorbed
/// where they occur (CPU `fail` state, multiplexer drop) and never surface
/// here.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("duplicate module id `{0}`")]
    DuplicateModule(String),

    #[error("event `{event}` required by `{module}` is not provided by any module")]
    UnprovidedEvent { module: String, event: String },

    #[error("expected exactly one cycle initiator, found {0}")]
    InitiatorCount(usize),

    #[error("module `{module}` emitted `{event}` without declaring it as provided")]
    EmitDenied { module: String, event: String },

    #[error("module `{module}` subscribed to `{event}` without declaring it as a listener")]
    ListenDenied { module: String, event: String },

    #[error("`{0}` called perform_cycle but is not the initiator")]
    NotInitiator(String),

    #[error(
        "callback scheduled at past time ({cycle}, {subcycle}); \
         scheduler is at ({now_cycle}, {now_subcycle})"
    )]
    SchedulePast {
        cycle: u64,
        subcycle: u32,
        now_cycle: u64,
        now_subcycle: i64,
    },

    #[error("stack {op} out of range at {addr:#06x}")]
    StackViolation { op: &'static str, addr: u32 },

    #[error("write to read-only memory `{module}` at offset {offset:#06x}")]
    RomWrite { module: String, offset: u16 },

    #[error("bulk write of {len} bytes at offset {offset:#06x} exceeds `{module}` size {size}")]
    BulkWriteOverflow {
        module: String,
        offset: u16,
        len: usize,
        size: usize,
    },

    #[error("unknown module id `{0}`")]
    UnknownModule(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration validation failures. Fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}`: {reason}")]
    BadField { field: &'static str, reason: String },

    #[error("value {value:#x} out of range for `{field}` (max {max:#x})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid integer literal `{0}`")]
    BadInt(String),

    #[error("unknown module kind `{0}`")]
    UnknownKind(String),

    #[error("malformed configuration document: {0}")]
    Document(String),
}
