pub mod bits;
pub mod config;
pub mod error;
pub mod event;
pub mod module;
pub mod queue;
pub mod simulator;

pub use error::{ConfigError, SimError};
pub use event::{EventContext, EventName, Payload};
pub use module::{BuiltModule, ModuleDeclaration, ModuleSpec};
pub use simulator::{Channel, CyclePriority, Simulator};
