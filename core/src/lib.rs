pub mod core;
pub mod cpu;
pub mod device;

pub mod prelude {
    pub use crate::core::simulator::{Channel, CyclePriority, Simulator};
    pub use crate::core::{ModuleDeclaration, ModuleSpec, Payload, SimError};
    pub use crate::cpu::Cpu;
    pub use crate::cpu::registers::{CcFlag, RegisterName, Registers};
    pub use crate::device::{Clock, Interrupter, Memory, Multiplexer, Pia6820, Screen, Stop};
}
