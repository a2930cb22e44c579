pub mod clock;
pub mod interrupter;
pub mod memory;
pub mod multiplexer;
pub mod pia6820;
pub mod screen;
pub mod stop;

pub use clock::{Clock, ClockConfig};
pub use interrupter::{Interrupter, InterrupterConfig, SignalKind};
pub use memory::{Memory, MemoryConfig, MemoryKind};
pub use multiplexer::{Multiplexer, MultiplexerConfig, MultiplexerEntry};
pub use pia6820::{Pia6820, Pia6820Config};
pub use screen::{Screen, ScreenConfig};
pub use stop::{Stop, StopConfig};

use crate::core::event::grouped;

/// Join a base event name with an optional device group. Devices behind a
/// multiplexer listen and answer under grouped names; standalone devices
/// use the bare base.
pub(crate) fn io_name(base: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => grouped(base, group),
        None => base.to_string(),
    }
}
