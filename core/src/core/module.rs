use std::any::Any;
use std::rc::Rc;

use crate::core::error::SimError;
use crate::core::event::{EventContext, Payload};
use crate::core::simulator::Channel;

/// Callback invoked on event delivery. Errors abort the current cycle and
/// propagate to the `perform_cycle` caller.
pub type EventListener = Rc<dyn Fn(&Payload, &EventContext) -> Result<(), SimError>>;

/// Predicate gating a `once` subscription: the listener only fires (and
/// unsubscribes) when this returns true.
pub type EventPredicate = Rc<dyn Fn(&Payload) -> bool>;

/// Callback invoked by the cycle scheduler with `(cycle, subcycle)`.
pub type CycleCallback = Rc<dyn Fn(u64, u32) -> Result<(), SimError>>;

/// Everything the kernel needs to know about a module, fixed at
/// construction: which events it emits, which it listens to, its permanent
/// per-cycle work, and whether it drives the clock.
pub struct ModuleDeclaration {
    /// Full event names this module is allowed to emit.
    pub provided: Vec<String>,
    /// Listeners that must resolve to a provider (`system:` names are
    /// provided by the kernel itself).
    pub required: Vec<(String, EventListener)>,
    /// Listeners installed only when some module provides the name.
    pub optional: Vec<(String, EventListener)>,
    /// Re-arming cycle listeners, one per subcycle slot.
    pub cycles: Vec<(CycleCallback, u32)>,
    /// Exactly one module per simulator sets this.
    pub initiator: bool,
}

impl ModuleDeclaration {
    pub fn new() -> Self {
        Self {
            provided: Vec::new(),
            required: Vec::new(),
            optional: Vec::new(),
            cycles: Vec::new(),
            initiator: false,
        }
    }
}

impl Default for ModuleDeclaration {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of constructing a module: its declaration plus the instance,
/// type-erased so the kernel can own a heterogeneous table. Hosts get a
/// concrete handle back through [`crate::core::simulator::Simulator::module`].
pub struct BuiltModule {
    pub declaration: ModuleDeclaration,
    pub instance: Rc<dyn Any>,
}

/// Constructor passed to the kernel: invoked with the module's id and its
/// permission-checked channel facade.
pub type ModuleCtor = Box<dyn FnOnce(String, Channel) -> Result<BuiltModule, SimError>>;

/// One entry in the ordered module list handed to `Simulator::build`.
pub struct ModuleSpec {
    pub id: String,
    pub construct: ModuleCtor,
}

impl ModuleSpec {
    pub fn new(
        id: impl Into<String>,
        construct: impl FnOnce(String, Channel) -> Result<BuiltModule, SimError> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            construct: Box::new(construct),
        }
    }
}
