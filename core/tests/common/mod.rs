use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wirewrap_core::core::event::Payload;
use wirewrap_core::core::module::ModuleSpec;
use wirewrap_core::core::simulator::Simulator;
use wirewrap_core::cpu::m6809::State;
use wirewrap_core::cpu::registers::{RegisterName, Registers};
use wirewrap_core::cpu::{Cpu, CpuConfig};
use wirewrap_core::device::{
    Clock, Memory, MemoryConfig, MemoryKind, Multiplexer, MultiplexerConfig, MultiplexerEntry,
};

/// Minimal system for CPU tests: clock + CPU + multiplexer + 64K RAM.
/// The RAM covers the whole address space, vectors included.
pub struct TestSystem {
    pub sim: Simulator,
    finishes: Rc<Cell<u64>>,
}

#[allow(dead_code)]
impl TestSystem {
    pub fn new() -> Self {
        Self::with_cpu_config(CpuConfig::default())
    }

    pub fn with_cpu_config(config: CpuConfig) -> Self {
        let mut specs = vec![Clock::spec("clock"), Cpu::spec("cpu", config)];
        specs.extend(Self::bus_specs());
        Self::build(specs)
    }

    /// Standard bus: one multiplexer and one 64K RAM behind it.
    pub fn bus_specs() -> Vec<ModuleSpec> {
        vec![
            Multiplexer::spec(
                "mux",
                MultiplexerConfig {
                    entries: vec![MultiplexerEntry {
                        module: "ram".to_string(),
                        start: 0,
                        size: 0x1_0000,
                        priority: 0,
                    }],
                },
            ),
            Memory::spec(
                "ram",
                MemoryConfig {
                    size: 0x1_0000,
                    kind: MemoryKind::Ram,
                    multiplexer: Some("mux".to_string()),
                },
            ),
        ]
    }

    pub fn build(specs: Vec<ModuleSpec>) -> Self {
        let sim = Simulator::build(specs).expect("system builds");
        let finishes = Rc::new(Cell::new(0));
        {
            let finishes = Rc::clone(&finishes);
            sim.channel()
                .on(
                    "cpu:instruction_finish",
                    Rc::new(move |_payload, _ctx| {
                        finishes.set(finishes.get() + 1);
                        Ok(())
                    }),
                )
                .expect("privileged subscription");
        }
        Self { sim, finishes }
    }

    /// Write bytes into the address space over the loader path.
    pub fn load(&self, addr: u16, bytes: &[u8]) {
        self.sim
            .channel()
            .emit(
                "ui:memory:bulk:write",
                Payload::Block {
                    address: addr,
                    bytes: bytes.to_vec(),
                },
            )
            .expect("bulk write");
    }

    /// Point the reset vector at `pc` and run the 7-cycle reset sequence.
    pub fn reset_to(&self, pc: u16) {
        self.load(0xFFFE, &[(pc >> 8) as u8, pc as u8]);
        self.run(7);
        assert_eq!(self.cpu_state(), State::Fetch, "reset should land in fetch");
        assert_eq!(self.regs().pc, pc);
    }

    pub fn run(&self, cycles: u64) -> u64 {
        let clock = self.sim.module::<Clock>("clock").expect("clock module");
        let clock = clock.borrow();
        clock.run(cycles).expect("cycles run")
    }

    /// Run until the next `cpu:instruction_finish`, returning the cycles
    /// consumed.
    pub fn run_instruction(&self) -> u64 {
        let before = self.finishes.get();
        let mut cycles = 0;
        while self.finishes.get() == before {
            self.run(1);
            cycles += 1;
            assert!(cycles < 1000, "instruction never finished");
        }
        cycles
    }

    pub fn regs(&self) -> Registers {
        let cpu = self.sim.module::<Cpu>("cpu").expect("cpu module");
        let regs = cpu.borrow().registers();
        regs
    }

    pub fn cpu_state(&self) -> State {
        let cpu = self.sim.module::<Cpu>("cpu").expect("cpu module");
        let state = cpu.borrow().state();
        state
    }

    /// Stage a register through the debugger bridge.
    pub fn set_reg(&self, name: RegisterName, value: u16) {
        self.sim
            .channel()
            .emit("dbg:register_update", Payload::Register { name, value })
            .expect("register update");
    }

    /// Read one byte back over the host introspection path.
    pub fn read_mem(&self, addr: u16) -> u8 {
        let result = Rc::new(RefCell::new(None));
        {
            let result = Rc::clone(&result);
            self.sim
                .channel()
                .once(
                    "ui:memory:read:result",
                    None,
                    Rc::new(move |payload, _ctx| {
                        if let Payload::Byte { data, .. } = payload {
                            *result.borrow_mut() = Some(*data);
                        }
                        Ok(())
                    }),
                )
                .expect("privileged subscription");
        }
        self.sim
            .channel()
            .emit("ui:memory:read", Payload::Address(addr))
            .expect("ui read");
        let value = result.borrow().expect("memory answered");
        value
    }

    /// Record every emission of `name` for later inspection.
    pub fn capture(&self, name: &str) -> Rc<RefCell<Vec<Payload>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            self.sim
                .channel()
                .on(
                    name,
                    Rc::new(move |payload, _ctx| {
                        seen.borrow_mut().push(payload.clone());
                        Ok(())
                    }),
                )
                .expect("privileged subscription");
        }
        seen
    }

    /// Raise an interrupt line.
    pub fn signal(&self, name: &str) {
        self.sim
            .channel()
            .emit(name, Payload::None)
            .expect("signal");
    }
}
