//! M6809 core: the two-phase per-cycle state machine.
//!
//! Every simulation cycle the CPU runs a `start` phase at subcycle 0 and
//! an `end` phase at subcycle 100. `start` may issue memory queries and
//! never transitions; `end` consumes completed memory actions, updates the
//! staged registers, and either stays in the current state or moves to a
//! new one. Memory queries issued in a `start` are answered by the bus at
//! subcycle 99 of the same cycle, so the paired `end` observes them.

pub mod alu;
mod execute;
pub mod indexed;
pub mod instructions;
pub mod stack;

use log::error;

use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::cpu::CpuConfig;
use crate::cpu::registers::{CcFlag, RegisterName, Registers};
use indexed::{ParsedPostbyte, PostbyteAction, parse_postbyte};
use instructions::{Instruction, Mode, lookup};

/// Reset sequence length in cycles.
const RESET_TICKS: u32 = 7;
/// IRQ/NMI/SWI entry length in cycles (19 with the dispatching fetch).
const IRQNMI_TICKS: u32 = 18;
/// FIRQ entry length in cycles (10 with the dispatching fetch).
const FIRQ_TICKS: u32 = 9;

/// Interrupt kinds serviced by the `irqnmi` entry sequence, plus FIRQ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntKind {
    Nmi,
    Irq,
    Firq,
    Swi,
    Swi2,
    Swi3,
}

impl IntKind {
    /// Condition-code mask bits written just before the vector fetch.
    fn mask_bits(self) -> u8 {
        match self {
            IntKind::Nmi | IntKind::Swi | IntKind::Firq => CcFlag::I as u8 | CcFlag::F as u8,
            IntKind::Irq => CcFlag::I as u8,
            IntKind::Swi2 | IntKind::Swi3 => 0,
        }
    }
}

/// CPU state tags. Per-state context lives in [`ExecScratch`] and the
/// addressing record; `irqnmi` carries its resolved kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Terminal sink after a decode failure.
    Fail,
    Resetting,
    Fetch,
    Direct,
    Extended,
    Relative,
    IndexedPostbyte,
    IndexedMain,
    IndexedIndirect,
    Execute,
    IrqNmi(IntKind),
    Firq,
    CustomFn,
}

/// Addressing record built by the addressing states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addressing {
    Inherent,
    Immediate,
    Direct { addr: u16 },
    Extended { addr: u16 },
    Indexed { address: u16, postbyte: ParsedPostbyte },
    Relative { addr: u16, offset: i16 },
}

impl Addressing {
    /// Effective operand address, when one exists.
    pub fn address(&self) -> Option<u16> {
        match self {
            Addressing::Direct { addr }
            | Addressing::Extended { addr }
            | Addressing::Relative { addr, .. } => Some(*addr),
            Addressing::Indexed { address, .. } => Some(*address),
            Addressing::Inherent | Addressing::Immediate => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemDir {
    Read,
    Write,
}

/// One in-flight memory request. Byte events go out per address; results
/// are reassembled big-endian as they come back at subcycle 99.
#[derive(Clone, Copy, Debug)]
pub struct MemoryAction {
    pending: bool,
    addr: u16,
    size: u8,
    dir: MemDir,
    value: u16,
    received: u8,
}

/// Per-instruction scratch, cleared on every state transition that starts
/// a new sequence.
#[derive(Default)]
pub(crate) struct ExecScratch {
    /// Byte values still to push, in push order.
    bytes: Vec<u8>,
    /// Register slots still to pull, in pull order.
    slots: Vec<(RegisterName, bool)>,
    index: usize,
    /// Sequencing step for multi-stage templates (RMW, CWAI).
    step: u8,
    value: u16,
    /// Template finished its work; padding cycles may remain.
    done: bool,
}

pub struct CpuCore {
    config: CpuConfig,
    /// Committed registers, published on every commit.
    regs: Registers,
    /// Working copy; all state-machine reads and writes go here.
    staged: Registers,
    state: State,
    ticks_on_state: u32,
    addressing: Addressing,
    instruction: Option<&'static Instruction>,
    prefix: u8,
    /// Cycles consumed since the fetch that started this instruction.
    instr_cycles: u32,
    /// Documented total for this instruction, extras included.
    instr_target: u32,
    action: Option<MemoryAction>,
    pending_nmi: bool,
    pending_firq: bool,
    pending_irq: bool,
    dispatch: Option<IntKind>,
    custom_dispatch: bool,
    ex: ExecScratch,
    /// Events produced by this phase, emitted by the module adapter after
    /// the core borrow is released.
    outbox: Vec<(String, Payload)>,
    dbg_dirty: bool,
}

impl CpuCore {
    pub fn new(config: CpuConfig) -> Self {
        Self {
            config,
            regs: Registers::default(),
            staged: Registers::default(),
            state: State::Resetting,
            ticks_on_state: 0,
            addressing: Addressing::Inherent,
            instruction: None,
            prefix: 0,
            instr_cycles: 0,
            instr_target: 0,
            action: None,
            pending_nmi: false,
            pending_firq: false,
            pending_irq: false,
            dispatch: None,
            custom_dispatch: false,
            ex: ExecScratch::default(),
            outbox: Vec::new(),
            dbg_dirty: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Committed register snapshot.
    pub fn registers(&self) -> Registers {
        self.regs
    }

    pub fn take_outbox(&mut self) -> Vec<(String, Payload)> {
        std::mem::take(&mut self.outbox)
    }

    // --- Signal and bus feeds (event listeners) ---

    pub fn signal_reset(&mut self) {
        self.pending_nmi = false;
        self.pending_firq = false;
        self.pending_irq = false;
        self.action = None;
        self.enter(State::Resetting);
    }

    pub fn signal_nmi(&mut self) {
        self.pending_nmi = true;
    }

    pub fn signal_firq(&mut self) {
        self.pending_firq = true;
    }

    pub fn signal_irq(&mut self) {
        self.pending_irq = true;
    }

    /// `memory:read:result` feed.
    pub fn on_read_result(&mut self, addr: u16, data: u8) {
        let Some(action) = &mut self.action else {
            return;
        };
        if !action.pending || action.dir != MemDir::Read {
            return;
        }
        let offset = addr.wrapping_sub(action.addr);
        if offset >= u16::from(action.size) {
            return;
        }
        let shift = 8 * (u16::from(action.size) - 1 - offset);
        action.value |= u16::from(data) << shift;
        action.received += 1;
        if action.received == action.size {
            action.pending = false;
        }
    }

    /// `memory:write:result` feed.
    pub fn on_write_result(&mut self, addr: u16) {
        let Some(action) = &mut self.action else {
            return;
        };
        if !action.pending || action.dir != MemDir::Write {
            return;
        }
        let offset = addr.wrapping_sub(action.addr);
        if offset >= u16::from(action.size) {
            return;
        }
        action.received += 1;
        if action.received == action.size {
            action.pending = false;
        }
    }

    /// `dbg:register_update` feed: stage the value; it publishes with the
    /// next end phase.
    pub fn dbg_update(&mut self, name: RegisterName, value: u16) {
        self.staged.set(name, value);
        self.dbg_dirty = true;
    }

    // --- Memory queries ---

    /// Arm a read. With `From the program counter` semantics use
    /// [`Self::query_read_pc`].
    fn query_read(&mut self, addr: u16, size: u8) {
        self.action = Some(MemoryAction {
            pending: true,
            addr,
            size,
            dir: MemDir::Read,
            value: 0,
            received: 0,
        });
        for i in 0..u16::from(size) {
            self.outbox.push((
                "memory:read".to_string(),
                Payload::Address(addr.wrapping_add(i)),
            ));
        }
    }

    /// Read at the program counter; the counter advances immediately.
    fn query_read_pc(&mut self, size: u8) {
        let addr = self.staged.pc;
        self.staged.pc = self.staged.pc.wrapping_add(u16::from(size));
        self.query_read(addr, size);
    }

    /// Arm a write of `bytes` starting at `addr` (ascending addresses).
    fn query_write(&mut self, addr: u16, bytes: &[u8]) {
        self.action = Some(MemoryAction {
            pending: true,
            addr,
            size: bytes.len() as u8,
            dir: MemDir::Write,
            value: 0,
            received: 0,
        });
        for (i, &data) in bytes.iter().enumerate() {
            self.outbox.push((
                "memory:write".to_string(),
                Payload::Byte {
                    address: addr.wrapping_add(i as u16),
                    data,
                },
            ));
        }
    }

    /// Completed read value, if the armed read has fully resolved.
    fn take_read(&mut self) -> Option<u16> {
        match self.action {
            Some(action) if action.dir == MemDir::Read && !action.pending => {
                self.action = None;
                Some(action.value)
            }
            _ => None,
        }
    }

    /// True once the armed write has been acknowledged for every byte.
    fn write_done(&mut self) -> bool {
        match self.action {
            Some(action) if action.dir == MemDir::Write && !action.pending => {
                self.action = None;
                true
            }
            _ => false,
        }
    }

    // --- Register commit ---

    /// Publish the staged registers atomically: one `cpu:registers_update`
    /// with the full snapshot, then `cpu:register_update` per changed
    /// physical register.
    fn commit(&mut self) {
        let old = self.regs;
        self.regs = self.staged;
        self.outbox
            .push(("cpu:registers_update".to_string(), Payload::Registers(self.regs)));
        for name in RegisterName::PHYSICAL {
            let value = self.regs.get(name);
            if old.get(name) != value {
                self.outbox.push((
                    "cpu:register_update".to_string(),
                    Payload::Register { name, value },
                ));
            }
        }
    }

    // --- State transitions ---

    fn enter(&mut self, state: State) {
        self.state = state;
        self.ticks_on_state = 0;
        self.ex = ExecScratch::default();
        if state == State::Fetch {
            self.instruction = None;
            self.prefix = 0;
            self.instr_cycles = 0;
            self.instr_target = 0;
            self.addressing = Addressing::Inherent;
            self.dispatch = None;
            self.custom_dispatch = false;
        }
    }

    fn fail_decode(&mut self, what: &str) {
        error!("decode failure at pc {:#06x}: {what}", self.staged.pc);
        self.enter(State::Fail);
    }

    // --- Phases ---

    /// Subcycle-0 phase: issue memory queries, never transition.
    pub fn phase_start(&mut self) -> Result<(), SimError> {
        let tick = self.ticks_on_state;
        match self.state {
            State::Fail => {}
            State::Resetting => {
                if tick == RESET_TICKS - 1 {
                    self.query_read(self.config.reset_vector, 2);
                }
            }
            State::Fetch => {
                self.instr_cycles += 1;
                if tick == 0 {
                    if self.pending_nmi {
                        self.dispatch = Some(IntKind::Nmi);
                    } else if self.pending_firq && !self.staged.flag(CcFlag::F) {
                        self.dispatch = Some(IntKind::Firq);
                    } else if self.pending_irq && !self.staged.flag(CcFlag::I) {
                        self.dispatch = Some(IntKind::Irq);
                    } else if self.config.functions.contains(&self.staged.pc) {
                        self.custom_dispatch = true;
                    } else {
                        self.query_read_pc(1);
                    }
                } else if tick == 1 && self.prefix != 0 {
                    // Second opcode byte after an 0x10/0x11 prefix.
                    self.query_read_pc(1);
                }
            }
            State::Direct => {
                self.instr_cycles += 1;
                if tick == 0 {
                    self.query_read_pc(1);
                }
            }
            State::Extended => {
                self.instr_cycles += 1;
                if tick == 0 {
                    self.query_read_pc(2);
                }
            }
            State::Relative => {
                self.instr_cycles += 1;
                if tick == 0 {
                    let long = self.instruction.is_some_and(|i| i.long_branch);
                    self.query_read_pc(if long { 2 } else { 1 });
                }
            }
            State::IndexedPostbyte => {
                self.instr_cycles += 1;
                if tick == 0 {
                    self.query_read_pc(1);
                }
            }
            State::IndexedMain => {
                self.instr_cycles += 1;
                if tick == 0 {
                    if let Addressing::Indexed { postbyte, .. } = self.addressing {
                        if postbyte.extra_bytes > 0 {
                            self.query_read_pc(postbyte.extra_bytes);
                        }
                    }
                }
            }
            State::IndexedIndirect => {
                self.instr_cycles += 1;
                if tick == 0 {
                    if let Addressing::Indexed { address, .. } = self.addressing {
                        self.query_read(address, 2);
                    }
                }
            }
            State::Execute => {
                self.instr_cycles += 1;
                self.exec_start(tick)?;
            }
            State::IrqNmi(kind) => match tick {
                2..=13 => {
                    let index = self.ex.index;
                    if index < self.ex.bytes.len() {
                        let sp = stack::push_addr(self.staged.s)?;
                        self.staged.s = sp;
                        let byte = self.ex.bytes[index];
                        self.query_write(sp, &[byte]);
                    }
                }
                15 => {
                    self.staged.cc |= kind.mask_bits();
                    self.query_read(self.vector(kind), 2);
                }
                _ => {}
            },
            State::Firq => match tick {
                2..=4 => {
                    let index = self.ex.index;
                    if index < self.ex.bytes.len() {
                        let sp = stack::push_addr(self.staged.s)?;
                        self.staged.s = sp;
                        let byte = self.ex.bytes[index];
                        self.query_write(sp, &[byte]);
                    }
                }
                5 => {
                    self.staged.cc |= IntKind::Firq.mask_bits();
                }
                6 => {
                    self.query_read(self.config.firq_vector, 2);
                }
                _ => {}
            },
            State::CustomFn => {
                if tick == 0 {
                    self.outbox
                        .push(("cpu:function".to_string(), Payload::Registers(self.regs)));
                }
            }
        }
        Ok(())
    }

    /// Subcycle-100 phase: consume memory results, update staged state,
    /// transition or stay.
    pub fn phase_end(&mut self) -> Result<(), SimError> {
        let next = self.end_state()?;
        match next {
            Some(state) => self.enter(state),
            None => self.ticks_on_state += 1,
        }
        if self.dbg_dirty {
            self.commit();
            self.dbg_dirty = false;
        }
        Ok(())
    }

    fn end_state(&mut self) -> Result<Option<State>, SimError> {
        let tick = self.ticks_on_state;
        match self.state {
            State::Fail => Ok(None),
            State::Resetting => {
                if tick == RESET_TICKS - 1 {
                    let Some(vector) = self.take_read() else {
                        return Ok(None);
                    };
                    self.staged = Registers::default();
                    self.staged.pc = vector;
                    self.commit();
                    self.outbox
                        .push(("cpu:reset_finish".to_string(), Payload::Registers(self.regs)));
                    Ok(Some(State::Fetch))
                } else {
                    Ok(None)
                }
            }
            State::Fetch => self.end_fetch(),
            State::Direct => {
                let Some(low) = self.take_read() else {
                    return Ok(None);
                };
                let addr = (u16::from(self.staged.dp) << 8) | low;
                self.addressing = Addressing::Direct { addr };
                Ok(Some(State::Execute))
            }
            State::Extended => {
                let Some(addr) = self.take_read() else {
                    return Ok(None);
                };
                self.addressing = Addressing::Extended { addr };
                Ok(Some(State::Execute))
            }
            State::Relative => {
                let Some(raw) = self.take_read() else {
                    return Ok(None);
                };
                let long = self.instruction.is_some_and(|i| i.long_branch);
                let offset = if long {
                    raw as i16
                } else {
                    i16::from(raw as u8 as i8)
                };
                let addr = self.staged.pc.wrapping_add(offset as u16);
                self.addressing = Addressing::Relative { addr, offset };
                Ok(Some(State::Execute))
            }
            State::IndexedPostbyte => self.end_indexed_postbyte(),
            State::IndexedMain => self.end_indexed_main(tick),
            State::IndexedIndirect => {
                if tick == 0 {
                    if let Some(pointer) = self.take_read() {
                        if let Addressing::Indexed { address, .. } = &mut self.addressing {
                            *address = pointer;
                        }
                    }
                    Ok(None)
                } else if tick == 2 {
                    Ok(Some(State::Execute))
                } else {
                    Ok(None)
                }
            }
            State::Execute => {
                let done = self.exec_end(tick)?;
                if done {
                    self.ex.done = true;
                }
                if self.ex.done && self.instr_cycles >= self.instr_target {
                    self.commit();
                    self.outbox.push((
                        "cpu:instruction_finish".to_string(),
                        Payload::Registers(self.regs),
                    ));
                    Ok(Some(State::Fetch))
                } else {
                    Ok(None)
                }
            }
            State::IrqNmi(kind) => self.end_irqnmi(kind, tick),
            State::Firq => self.end_firq(tick),
            State::CustomFn => {
                self.commit();
                Ok(Some(State::Fetch))
            }
        }
    }

    fn end_fetch(&mut self) -> Result<Option<State>, SimError> {
        if let Some(kind) = self.dispatch {
            return Ok(Some(match kind {
                IntKind::Firq => State::Firq,
                other => State::IrqNmi(other),
            }));
        }
        if self.custom_dispatch {
            return Ok(Some(State::CustomFn));
        }
        let Some(byte) = self.take_read() else {
            return Ok(None);
        };
        let byte = byte as u8;
        if self.prefix == 0 && (byte == 0x10 || byte == 0x11) {
            self.prefix = byte;
            return Ok(None);
        }
        let opcode = if self.prefix != 0 {
            u16::from(self.prefix) << 8 | u16::from(byte)
        } else {
            u16::from(byte)
        };
        let Some(instruction) = lookup(opcode) else {
            self.fail_decode(&format!("unknown opcode {opcode:#06x}"));
            return Ok(None);
        };
        self.instruction = Some(instruction);
        self.instr_target = u32::from(instruction.cycles);
        self.outbox.push((
            "cpu:instruction_begin".to_string(),
            Payload::Registers(self.regs),
        ));
        if instruction.swi_level > 0 {
            let kind = match instruction.swi_level {
                1 => IntKind::Swi,
                2 => IntKind::Swi2,
                _ => IntKind::Swi3,
            };
            return Ok(Some(State::IrqNmi(kind)));
        }
        Ok(Some(match instruction.mode {
            Mode::Inherent | Mode::Immediate => State::Execute,
            Mode::Direct => State::Direct,
            Mode::Extended => State::Extended,
            Mode::Relative => State::Relative,
            Mode::Indexed => State::IndexedPostbyte,
        }))
    }

    fn end_indexed_postbyte(&mut self) -> Result<Option<State>, SimError> {
        let Some(byte) = self.take_read() else {
            return Ok(None);
        };
        let Some(postbyte) = parse_postbyte(byte as u8) else {
            self.fail_decode(&format!("invalid indexed postbyte {byte:#04x}"));
            return Ok(None);
        };
        self.instr_target += u32::from(postbyte.extra_cycles);

        let reg = postbyte.reg.register();
        let base = self.staged.get(reg);
        let address = match postbyte.action {
            PostbyteAction::Offset5(offset) => base.wrapping_add(offset as u16),
            PostbyteAction::PostInc1 => {
                self.staged.set(reg, base.wrapping_add(1));
                base
            }
            PostbyteAction::PostInc2 => {
                self.staged.set(reg, base.wrapping_add(2));
                base
            }
            PostbyteAction::PreDec1 => {
                let addr = base.wrapping_sub(1);
                self.staged.set(reg, addr);
                addr
            }
            PostbyteAction::PreDec2 => {
                let addr = base.wrapping_sub(2);
                self.staged.set(reg, addr);
                addr
            }
            PostbyteAction::Zero => base,
            PostbyteAction::OffsetA => base.wrapping_add(self.staged.a as i8 as u16),
            PostbyteAction::OffsetB => base.wrapping_add(self.staged.b as i8 as u16),
            PostbyteAction::OffsetD => base.wrapping_add(self.staged.d()),
            // Offset lives in the program stream; indexed_main fills it in.
            PostbyteAction::Offset8
            | PostbyteAction::Offset16
            | PostbyteAction::Pcr8
            | PostbyteAction::Pcr16
            | PostbyteAction::ExtendedIndirect => 0,
        };
        self.addressing = Addressing::Indexed { address, postbyte };

        Ok(Some(if postbyte.main_ticks > 0 {
            State::IndexedMain
        } else if postbyte.indirect {
            State::IndexedIndirect
        } else {
            State::Execute
        }))
    }

    fn end_indexed_main(&mut self, tick: u32) -> Result<Option<State>, SimError> {
        let Addressing::Indexed { postbyte, .. } = self.addressing else {
            return Ok(None);
        };
        if tick == 0 && postbyte.extra_bytes > 0 {
            let Some(raw) = self.take_read() else {
                return Ok(None);
            };
            let base = self.staged.get(postbyte.reg.register());
            let address = match postbyte.action {
                PostbyteAction::Offset8 => base.wrapping_add(i16::from(raw as u8 as i8) as u16),
                PostbyteAction::Offset16 => base.wrapping_add(raw),
                PostbyteAction::Pcr8 => {
                    self.staged.pc.wrapping_add(i16::from(raw as u8 as i8) as u16)
                }
                PostbyteAction::Pcr16 => self.staged.pc.wrapping_add(raw),
                PostbyteAction::ExtendedIndirect => raw,
                _ => return Ok(None),
            };
            if let Addressing::Indexed { address: slot, .. } = &mut self.addressing {
                *slot = address;
            }
        }
        if tick + 1 >= u32::from(postbyte.main_ticks) {
            Ok(Some(if postbyte.indirect {
                State::IndexedIndirect
            } else {
                State::Execute
            }))
        } else {
            Ok(None)
        }
    }

    fn vector(&self, kind: IntKind) -> u16 {
        match kind {
            IntKind::Nmi => self.config.nmi_vector,
            IntKind::Irq => self.config.irq_vector,
            IntKind::Firq => self.config.firq_vector,
            IntKind::Swi => self.config.swi_vector,
            IntKind::Swi2 => self.config.swi2_vector,
            IntKind::Swi3 => self.config.swi3_vector,
        }
    }

    fn end_irqnmi(&mut self, kind: IntKind, tick: u32) -> Result<Option<State>, SimError> {
        match tick {
            0 => {
                self.staged.set_flag(CcFlag::E, true);
                match kind {
                    IntKind::Nmi => self.pending_nmi = false,
                    IntKind::Irq => self.pending_irq = false,
                    _ => {}
                }
                self.ex.bytes = stack::push_sequence(&self.staged, stack::FULL_FRAME, false);
                self.ex.index = 0;
                Ok(None)
            }
            2..=13 => {
                if self.write_done() {
                    self.ex.index += 1;
                }
                Ok(None)
            }
            15 => {
                if let Some(vector) = self.take_read() {
                    self.ex.value = vector;
                }
                Ok(None)
            }
            t if t == IRQNMI_TICKS - 1 => {
                self.staged.pc = self.ex.value;
                self.commit();
                Ok(Some(State::Fetch))
            }
            _ => Ok(None),
        }
    }

    fn end_firq(&mut self, tick: u32) -> Result<Option<State>, SimError> {
        match tick {
            0 => {
                self.staged.set_flag(CcFlag::E, false);
                self.pending_firq = false;
                self.ex.bytes = stack::push_sequence(&self.staged, stack::FIRQ_FRAME, false);
                self.ex.index = 0;
                Ok(None)
            }
            2..=4 => {
                if self.write_done() {
                    self.ex.index += 1;
                }
                Ok(None)
            }
            6 => {
                if let Some(vector) = self.take_read() {
                    self.ex.value = vector;
                }
                Ok(None)
            }
            t if t == FIRQ_TICKS - 1 => {
                self.staged.pc = self.ex.value;
                self.commit();
                Ok(Some(State::Fetch))
            }
            _ => Ok(None),
        }
    }
}
