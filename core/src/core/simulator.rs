use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};

use crate::core::error::SimError;
use crate::core::event::{EventContext, Payload};
use crate::core::module::{
    CycleCallback, EventListener, EventPredicate, ModuleSpec,
};
use crate::core::queue::PriorityQueue;

/// Caller id for kernel-internal and host/test emissions. Bypasses
/// permission checks; never assigned to a module.
const PRIVILEGED_ID: &str = "*";

/// Names with this prefix are provided by the kernel itself and are exempt
/// from the provider check.
const SYSTEM_PREFIX: &str = "system:";

/// Scheduling target for cycle callbacks. `cycle` wins over `offset`;
/// with neither, the callback lands one cycle ahead at subcycle 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct CyclePriority {
    pub cycle: Option<u64>,
    pub offset: Option<u64>,
    pub subcycle: u32,
}

impl CyclePriority {
    /// Same cycle (offset 0) at the given subcycle. Used by devices that
    /// answer within the cycle that addressed them.
    pub fn this_cycle(subcycle: u32) -> Self {
        Self {
            cycle: None,
            offset: Some(0),
            subcycle,
        }
    }

    /// Next cycle at the given subcycle.
    pub fn next_cycle(subcycle: u32) -> Self {
        Self {
            cycle: None,
            offset: Some(1),
            subcycle,
        }
    }

    pub fn at_cycle(cycle: u64, subcycle: u32) -> Self {
        Self {
            cycle: Some(cycle),
            offset: None,
            subcycle,
        }
    }
}

struct CycleEntry {
    owner: String,
    cycle: u64,
    subcycle: u32,
    seq: u64,
    callback: CycleCallback,
    /// Re-arming entries reinstall themselves one cycle ahead after firing.
    rearm: bool,
}

fn entry_cmp(a: &CycleEntry, b: &CycleEntry) -> Ordering {
    a.cycle
        .cmp(&b.cycle)
        .then(a.subcycle.cmp(&b.subcycle))
        .then(a.seq.cmp(&b.seq))
}

struct Subscription {
    id: u64,
    #[allow(dead_code)]
    owner: String,
    listener: EventListener,
    once: bool,
    when: Option<EventPredicate>,
}

struct ModuleEntry {
    provided: HashSet<String>,
    listened: HashSet<String>,
    initiator: bool,
    instance: Rc<dyn Any>,
}

struct KernelInner {
    cycle: Cell<u64>,
    /// Subcycle low-water mark: -1 at cycle start, i64::MAX while idle so
    /// that scheduling into a finished cycle is rejected as "past".
    current_subcycle: Cell<i64>,
    seq: Cell<u64>,
    next_sub_id: Cell<u64>,
    queue: RefCell<PriorityQueue<CycleEntry>>,
    subscribers: RefCell<HashMap<String, Vec<Rc<Subscription>>>>,
    modules: RefCell<HashMap<String, ModuleEntry>>,
    initiator: RefCell<String>,
}

impl KernelInner {
    fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    fn next_sub_id(&self) -> u64 {
        let id = self.next_sub_id.get();
        self.next_sub_id.set(id + 1);
        id
    }

    fn check_emit(&self, owner: &str, name: &str) -> Result<(), SimError> {
        if owner == PRIVILEGED_ID {
            return Ok(());
        }
        let modules = self.modules.borrow();
        let allowed = modules
            .get(owner)
            .is_some_and(|entry| entry.provided.contains(name));
        if allowed {
            Ok(())
        } else {
            Err(SimError::EmitDenied {
                module: owner.to_string(),
                event: name.to_string(),
            })
        }
    }

    fn check_listen(&self, owner: &str, name: &str) -> Result<(), SimError> {
        if owner == PRIVILEGED_ID {
            return Ok(());
        }
        let modules = self.modules.borrow();
        let allowed = modules
            .get(owner)
            .is_some_and(|entry| entry.listened.contains(name));
        if allowed {
            Ok(())
        } else {
            Err(SimError::ListenDenied {
                module: owner.to_string(),
                event: name.to_string(),
            })
        }
    }

    fn subscribe(
        &self,
        owner: &str,
        name: &str,
        listener: EventListener,
        once: bool,
        when: Option<EventPredicate>,
    ) {
        let sub = Rc::new(Subscription {
            id: self.next_sub_id(),
            owner: owner.to_string(),
            listener,
            once,
            when,
        });
        let mut subscribers = self.subscribers.borrow_mut();
        let list = subscribers.entry(name.to_string()).or_default();
        // One-shot listeners take precedence over previously installed
        // permanent ones.
        if once {
            list.insert(0, sub);
        } else {
            list.push(sub);
        }
    }

    /// Remove a subscription by id. Returns false when it was already gone
    /// (fired by a nested emission).
    fn unsubscribe(&self, name: &str, id: u64) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let Some(list) = subscribers.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|sub| sub.id != id);
        list.len() != before
    }

    /// Synchronous fan-out in subscription order. The subscriber list is
    /// snapshotted first: listeners installed during this emission do not
    /// observe it. Nested emissions run depth-first.
    fn emit(&self, owner: &str, name: &str, payload: &Payload) -> Result<(), SimError> {
        self.check_emit(owner, name)?;
        let now_subcycle = self.current_subcycle.get();
        let ctx = EventContext {
            emitter: owner.to_string(),
            cycle: self.cycle.get(),
            // Emissions from outside the drain loop carry subcycle 0.
            subcycle: u32::try_from(now_subcycle).unwrap_or(0),
        };
        trace!("emit {name} from {owner} at ({}, {})", ctx.cycle, ctx.subcycle);
        let snapshot: Vec<Rc<Subscription>> = self
            .subscribers
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default();
        for sub in snapshot {
            if sub.once {
                if let Some(when) = &sub.when {
                    if !when(payload) {
                        continue;
                    }
                }
                // Remove before invoking so the listener fires exactly once
                // even if it re-emits the same event.
                if !self.unsubscribe(name, sub.id) {
                    continue;
                }
            }
            (sub.listener)(payload, &ctx)?;
        }
        Ok(())
    }

    fn schedule(
        &self,
        owner: &str,
        callback: CycleCallback,
        priority: CyclePriority,
        rearm: bool,
    ) -> Result<(), SimError> {
        let now_cycle = self.cycle.get();
        let now_subcycle = self.current_subcycle.get();
        let cycle = match priority.cycle {
            Some(cycle) => cycle,
            None => {
                let offset = priority.offset.unwrap_or(1);
                // Between cycles, "this cycle" can only mean the upcoming
                // one.
                if offset == 0 && now_subcycle == i64::MAX {
                    now_cycle + 1
                } else {
                    now_cycle + offset
                }
            }
        };
        let subcycle = priority.subcycle;
        if cycle < now_cycle || (cycle == now_cycle && i64::from(subcycle) <= now_subcycle) {
            return Err(SimError::SchedulePast {
                cycle,
                subcycle,
                now_cycle,
                now_subcycle,
            });
        }
        self.queue.borrow_mut().enqueue(CycleEntry {
            owner: owner.to_string(),
            cycle,
            subcycle,
            seq: self.next_seq(),
            callback,
            rearm,
        });
        Ok(())
    }

    /// Advance the clock by one cycle: bump the counter, then drain every
    /// entry scheduled for it in (subcycle, enqueue-order).
    fn perform_cycle(&self, caller: &str) -> Result<(), SimError> {
        if caller != PRIVILEGED_ID && *self.initiator.borrow() != caller {
            return Err(SimError::NotInitiator(caller.to_string()));
        }
        let current = self.cycle.get() + 1;
        self.cycle.set(current);
        self.current_subcycle.set(-1);

        loop {
            let ready = {
                let queue = self.queue.borrow();
                queue.peek().is_some_and(|top| top.cycle == current)
            };
            if !ready {
                break;
            }
            let entry = self.queue.borrow_mut().dequeue();
            let Some(entry) = entry else { break };
            self.current_subcycle.set(i64::from(entry.subcycle));
            (entry.callback)(current, entry.subcycle)?;
            if entry.rearm {
                self.queue.borrow_mut().enqueue(CycleEntry {
                    owner: entry.owner.clone(),
                    cycle: current + 1,
                    subcycle: entry.subcycle,
                    seq: self.next_seq(),
                    callback: entry.callback,
                    rearm: true,
                });
            }
        }

        // The cycle is over; anything still aimed at it is in the past.
        self.current_subcycle.set(i64::MAX);
        Ok(())
    }
}

/// Per-module view of the kernel. Every call is tagged with the owning
/// module's id and checked against its declaration.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<KernelInner>,
    owner: String,
}

impl Channel {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cycle(&self) -> u64 {
        self.inner.cycle.get()
    }

    /// Emit an event. Fan-out is synchronous and depth-first.
    pub fn emit(&self, name: &str, payload: Payload) -> Result<(), SimError> {
        self.inner.emit(&self.owner, name, &payload)
    }

    /// Permanent subscription, appended to the delivery order.
    pub fn on(&self, name: &str, listener: EventListener) -> Result<(), SimError> {
        self.inner.check_listen(&self.owner, name)?;
        self.inner.subscribe(&self.owner, name, listener, false, None);
        Ok(())
    }

    /// One-shot subscription, prepended to the delivery order. With a
    /// `when` predicate the listener stays installed until it matches.
    pub fn once(
        &self,
        name: &str,
        when: Option<EventPredicate>,
        listener: EventListener,
    ) -> Result<(), SimError> {
        self.inner.check_listen(&self.owner, name)?;
        self.inner.subscribe(&self.owner, name, listener, true, when);
        Ok(())
    }

    /// Install a one-shot listener for `listened`, then emit `emitted`.
    /// The listener is in place before the emission, so a synchronous
    /// response cannot be missed.
    pub fn emit_and_wait(
        &self,
        listened: &str,
        when: Option<EventPredicate>,
        listener: EventListener,
        emitted: &str,
        payload: Payload,
    ) -> Result<(), SimError> {
        self.inner.check_listen(&self.owner, listened)?;
        self.inner.check_emit(&self.owner, emitted)?;
        self.inner
            .subscribe(&self.owner, listened, listener, true, when);
        self.inner.emit(&self.owner, emitted, &payload)
    }

    /// Schedule a one-shot cycle callback. Default priority is the next
    /// cycle at subcycle 0; scheduling into the past is an error.
    pub fn once_cycle(
        &self,
        callback: CycleCallback,
        priority: CyclePriority,
    ) -> Result<(), SimError> {
        self.inner.schedule(&self.owner, callback, priority, false)
    }

    /// Re-arming cycle callback: fires every cycle at the given subcycle,
    /// starting next cycle.
    pub fn on_cycle(&self, callback: CycleCallback, subcycle: u32) -> Result<(), SimError> {
        self.inner
            .schedule(&self.owner, callback, CyclePriority::next_cycle(subcycle), true)
    }

    /// Advance the simulation one cycle. Only the initiator may call this.
    pub fn perform_cycle(&self) -> Result<(), SimError> {
        self.inner.perform_cycle(&self.owner)
    }
}

/// The simulation kernel: owns the module table, the subscriber table and
/// the cycle queue. Built once from an ordered module list; modules talk
/// to each other only through their [`Channel`]s afterwards.
pub struct Simulator {
    inner: Rc<KernelInner>,
}

impl Simulator {
    /// Instantiate every module in order, verify the event graph, install
    /// all declared listeners, and announce `system:load_finish`.
    pub fn build(specs: Vec<ModuleSpec>) -> Result<Self, SimError> {
        let inner = Rc::new(KernelInner {
            cycle: Cell::new(0),
            current_subcycle: Cell::new(i64::MAX),
            seq: Cell::new(0),
            next_sub_id: Cell::new(0),
            queue: RefCell::new(PriorityQueue::new(entry_cmp)),
            subscribers: RefCell::new(HashMap::new()),
            modules: RefCell::new(HashMap::new()),
            initiator: RefCell::new(String::new()),
        });

        let mut declarations = Vec::new();
        let mut all_provided: HashSet<String> = HashSet::new();

        for spec in specs {
            if spec.id == PRIVILEGED_ID {
                return Err(SimError::DuplicateModule(spec.id));
            }
            if inner.modules.borrow().contains_key(&spec.id) {
                return Err(SimError::DuplicateModule(spec.id));
            }
            let channel = Channel {
                inner: Rc::clone(&inner),
                owner: spec.id.clone(),
            };
            let built = (spec.construct)(spec.id.clone(), channel)?;
            debug!("module `{}` constructed", spec.id);

            let mut listened: HashSet<String> = HashSet::new();
            for (name, _) in built
                .declaration
                .required
                .iter()
                .chain(built.declaration.optional.iter())
            {
                listened.insert(name.clone());
            }
            all_provided.extend(built.declaration.provided.iter().cloned());
            inner.modules.borrow_mut().insert(
                spec.id.clone(),
                ModuleEntry {
                    provided: built.declaration.provided.iter().cloned().collect(),
                    listened,
                    initiator: built.declaration.initiator,
                    instance: built.instance,
                },
            );
            declarations.push((spec.id, built.declaration));
        }

        // Every required name must have a provider; the kernel provides
        // the system: namespace itself.
        for (id, declaration) in &declarations {
            for (name, _) in &declaration.required {
                if !name.starts_with(SYSTEM_PREFIX) && !all_provided.contains(name) {
                    return Err(SimError::UnprovidedEvent {
                        module: id.clone(),
                        event: name.clone(),
                    });
                }
            }
        }

        let initiators: Vec<&String> = declarations
            .iter()
            .filter(|(_, d)| d.initiator)
            .map(|(id, _)| id)
            .collect();
        if initiators.len() != 1 {
            return Err(SimError::InitiatorCount(initiators.len()));
        }
        *inner.initiator.borrow_mut() = initiators[0].clone();

        for (id, declaration) in declarations {
            for (name, listener) in declaration.required {
                inner.subscribe(&id, &name, listener, false, None);
            }
            for (name, listener) in declaration.optional {
                inner.subscribe(&id, &name, listener, false, None);
            }
            for (callback, subcycle) in declaration.cycles {
                inner.schedule(&id, callback, CyclePriority::next_cycle(subcycle), true)?;
            }
        }

        inner.emit(PRIVILEGED_ID, "system:load_finish", &Payload::None)?;
        Ok(Self { inner })
    }

    pub fn cycle(&self) -> u64 {
        self.inner.cycle.get()
    }

    /// Privileged channel for the host and tests. Not reachable from
    /// module code.
    pub fn channel(&self) -> Channel {
        Channel {
            inner: Rc::clone(&self.inner),
            owner: PRIVILEGED_ID.to_string(),
        }
    }

    /// Fetch a module instance back out by id, downcast to its concrete
    /// cell type.
    pub fn module<T: 'static>(&self, id: &str) -> Option<Rc<RefCell<T>>> {
        let modules = self.inner.modules.borrow();
        let entry = modules.get(id)?;
        Rc::clone(&entry.instance).downcast::<RefCell<T>>().ok()
    }
}
