//! Instruction execution templates.
//!
//! The `execute` state runs one template per instruction: the start phase
//! issues memory queries, the end phase consumes results and updates the
//! staged registers. A template reports completion through its return
//! value; the state machine holds the CPU in `execute` past that point
//! until the documented cycle count has been consumed.

use crate::core::error::SimError;
use crate::cpu::m6809::alu;
use crate::cpu::m6809::instructions::{Cond, Exec};
use crate::cpu::m6809::stack;
use crate::cpu::m6809::{Addressing, CpuCore, IntKind};
use crate::cpu::registers::{CcFlag, RegisterName, Registers};

/// Loads, stores and LEA set N and Z from the moved value and clear V.
fn load_flags8(regs: &mut Registers, value: u8) {
    regs.set_flag(CcFlag::N, value & 0x80 != 0);
    regs.set_flag(CcFlag::Z, value == 0);
    regs.set_flag(CcFlag::V, false);
}

fn load_flags16(regs: &mut Registers, value: u16) {
    regs.set_flag(CcFlag::N, value & 0x8000 != 0);
    regs.set_flag(CcFlag::Z, value == 0);
    regs.set_flag(CcFlag::V, false);
}

impl CpuCore {
    fn exec_addr(&self) -> u16 {
        self.addressing.address().unwrap_or(0)
    }

    fn immediate(&self) -> bool {
        matches!(self.addressing, Addressing::Immediate | Addressing::Inherent)
    }

    /// Issue the operand read for a value-consuming template.
    fn query_operand(&mut self, size: u8) {
        if self.immediate() {
            self.query_read_pc(size);
        } else {
            let addr = self.exec_addr();
            self.query_read(addr, size);
        }
    }

    fn push_byte_cycle(&mut self) -> Result<(), SimError> {
        if self.ex.index < self.ex.bytes.len() {
            let sp_reg = if self.ex.step != 0 {
                RegisterName::U
            } else {
                RegisterName::S
            };
            let sp = stack::push_addr(self.staged.get(sp_reg))?;
            self.staged.set(sp_reg, sp);
            let byte = self.ex.bytes[self.ex.index];
            self.query_write(sp, &[byte]);
        }
        Ok(())
    }

    pub(crate) fn exec_start(&mut self, tick: u32) -> Result<(), SimError> {
        let Some(instruction) = self.instruction else {
            return Ok(());
        };
        match instruction.exec {
            Exec::Load8(_) | Exec::Alu8(..) => {
                if tick == 0 {
                    self.query_operand(1);
                }
            }
            Exec::Load16(_) | Exec::Alu16(..) => {
                if tick == 0 {
                    self.query_operand(2);
                }
            }
            Exec::Store8(reg) => {
                if tick == 0 {
                    let value = self.staged.get(reg) as u8;
                    let addr = self.exec_addr();
                    self.query_write(addr, &[value]);
                }
            }
            Exec::Store16(reg) => {
                if tick == 0 {
                    let value = self.staged.get(reg);
                    let addr = self.exec_addr();
                    self.query_write(addr, &[(value >> 8) as u8, value as u8]);
                }
            }
            Exec::Rmw(_) => {
                if tick == 0 {
                    let addr = self.exec_addr();
                    self.query_read(addr, 1);
                } else if tick == 1 && self.ex.step == 1 {
                    let addr = self.exec_addr();
                    let byte = self.ex.value as u8;
                    self.query_write(addr, &[byte]);
                }
            }
            Exec::Bsr | Exec::Jsr => {
                if tick == 0 {
                    let ret = self.staged.pc;
                    let sp = stack::push_addr(stack::push_addr(self.staged.s)?)?;
                    self.staged.s = sp;
                    self.query_write(sp, &[(ret >> 8) as u8, ret as u8]);
                }
            }
            Exec::Rts => {
                if tick == 0 {
                    let sp = self.staged.s;
                    self.query_read(sp, 2);
                }
            }
            Exec::Rti => {
                if tick == 0 || self.ex.index < self.ex.slots.len() {
                    let sp = self.staged.s;
                    self.query_read(sp, 1);
                }
            }
            Exec::Push { .. } | Exec::Pull { .. } | Exec::Tfr | Exec::Exg => {
                if tick == 0 {
                    // Postbyte.
                    self.query_read_pc(1);
                } else {
                    match instruction.exec {
                        Exec::Push { .. } => self.push_byte_cycle()?,
                        Exec::Pull { .. } => {
                            if self.ex.index < self.ex.slots.len() {
                                let sp_reg = if self.ex.step != 0 {
                                    RegisterName::U
                                } else {
                                    RegisterName::S
                                };
                                let sp = self.staged.get(sp_reg);
                                self.query_read(sp, 1);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Exec::AndCc | Exec::OrCc => {
                if tick == 0 {
                    self.query_read_pc(1);
                }
            }
            Exec::Cwai => {
                if tick == 0 {
                    self.query_read_pc(1);
                } else if self.ex.step == 0 {
                    self.push_byte_cycle()?;
                } else if self.ex.step == 2 {
                    let vector = self.ex.value;
                    self.query_read(vector, 2);
                    self.ex.step = 3;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn exec_end(&mut self, tick: u32) -> Result<bool, SimError> {
        let Some(instruction) = self.instruction else {
            return Ok(true);
        };
        if self.ex.done {
            return Ok(true);
        }
        match instruction.exec {
            Exec::Load8(reg) => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.set(reg, value);
                load_flags8(&mut self.staged, value as u8);
                Ok(true)
            }
            Exec::Load16(reg) => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.set(reg, value);
                load_flags16(&mut self.staged, value);
                Ok(true)
            }
            Exec::Store8(reg) => {
                if !self.write_done() {
                    return Ok(false);
                }
                let value = self.staged.get(reg) as u8;
                load_flags8(&mut self.staged, value);
                Ok(true)
            }
            Exec::Store16(reg) => {
                if !self.write_done() {
                    return Ok(false);
                }
                let value = self.staged.get(reg);
                load_flags16(&mut self.staged, value);
                Ok(true)
            }
            Exec::Alu8(op, reg) => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                alu::alu8(&mut self.staged, op, reg, value as u8);
                Ok(true)
            }
            Exec::Alu16(op, reg) => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                alu::alu16(&mut self.staged, op, reg, value);
                Ok(true)
            }
            Exec::Rmw(op) => {
                if tick == 0 {
                    let Some(value) = self.take_read() else {
                        return Ok(false);
                    };
                    match alu::rmw(&mut self.staged, op, value as u8) {
                        Some(result) => {
                            self.ex.value = u16::from(result);
                            self.ex.step = 1;
                            Ok(false)
                        }
                        // TST: nothing to write back.
                        None => Ok(true),
                    }
                } else {
                    Ok(self.write_done())
                }
            }
            Exec::RmwReg(op, reg) => {
                let value = self.staged.get(reg) as u8;
                if let Some(result) = alu::rmw(&mut self.staged, op, value) {
                    self.staged.set(reg, u16::from(result));
                }
                Ok(true)
            }
            Exec::Branch(cond) => {
                let taken = alu::test_cond(&self.staged, cond);
                if taken {
                    self.staged.pc = self.exec_addr();
                    if instruction.long_branch && cond != Cond::Always {
                        self.instr_target += 1;
                    }
                }
                Ok(true)
            }
            Exec::Bsr | Exec::Jsr => {
                if !self.write_done() {
                    return Ok(false);
                }
                self.staged.pc = self.exec_addr();
                Ok(true)
            }
            Exec::Jmp => {
                self.staged.pc = self.exec_addr();
                Ok(true)
            }
            Exec::Rts => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.pc = value;
                self.staged.s = stack::pull_step(stack::pull_step(self.staged.s)?)?;
                Ok(true)
            }
            Exec::Rti => self.end_rti(tick),
            Exec::Push { user } => self.end_push(tick, user),
            Exec::Pull { user } => self.end_pull(tick, user),
            Exec::Lea(reg) => {
                let address = self.exec_addr();
                self.staged.set(reg, address);
                if matches!(reg, RegisterName::X | RegisterName::Y) {
                    self.staged.set_flag(CcFlag::Z, address == 0);
                }
                Ok(true)
            }
            Exec::Tfr => {
                let Some(postbyte) = self.take_read() else {
                    return Ok(false);
                };
                let postbyte = postbyte as u8;
                let (Some(src), Some(dst)) = (
                    alu::transfer_register(postbyte >> 4),
                    alu::transfer_register(postbyte),
                ) else {
                    self.fail_decode(&format!("invalid TFR postbyte {postbyte:#04x}"));
                    return Ok(false);
                };
                let value = alu::transfer_value(&self.staged, src, dst);
                self.staged.set(dst, value);
                Ok(true)
            }
            Exec::Exg => {
                let Some(postbyte) = self.take_read() else {
                    return Ok(false);
                };
                let postbyte = postbyte as u8;
                let (Some(first), Some(second)) = (
                    alu::transfer_register(postbyte >> 4),
                    alu::transfer_register(postbyte),
                ) else {
                    self.fail_decode(&format!("invalid EXG postbyte {postbyte:#04x}"));
                    return Ok(false);
                };
                let to_second = alu::transfer_value(&self.staged, first, second);
                let to_first = alu::transfer_value(&self.staged, second, first);
                self.staged.set(second, to_second);
                self.staged.set(first, to_first);
                Ok(true)
            }
            Exec::Mul => {
                alu::mul(&mut self.staged);
                Ok(true)
            }
            Exec::Daa => {
                alu::daa(&mut self.staged);
                Ok(true)
            }
            Exec::Sex => {
                alu::sex(&mut self.staged);
                Ok(true)
            }
            Exec::Nop => Ok(true),
            Exec::Abx => {
                self.staged.x = self.staged.x.wrapping_add(u16::from(self.staged.b));
                Ok(true)
            }
            Exec::AndCc => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.cc &= value as u8;
                Ok(true)
            }
            Exec::OrCc => {
                let Some(value) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.cc |= value as u8;
                Ok(true)
            }
            Exec::Cwai => self.end_cwai(tick),
            Exec::Sync => self.end_sync(tick),
            // SWI never executes; fetch enters the interrupt state directly.
            Exec::Swi => Ok(true),
        }
    }

    fn end_rti(&mut self, tick: u32) -> Result<bool, SimError> {
        if tick == 0 {
            let Some(value) = self.take_read() else {
                return Ok(false);
            };
            self.staged.cc = value as u8;
            self.staged.s = stack::pull_step(self.staged.s)?;
            if self.staged.flag(CcFlag::E) {
                // Entire frame: A, B, DP, X, Y, U, PC follow.
                self.ex.slots = stack::pull_sequence(0xFE, false);
                self.instr_target = 15;
            } else {
                self.ex.slots = stack::pull_sequence(0x80, false);
            }
            self.ex.index = 0;
            return Ok(false);
        }
        if self.ex.index < self.ex.slots.len() {
            let Some(value) = self.take_read() else {
                return Ok(false);
            };
            let (reg, high) = self.ex.slots[self.ex.index];
            stack::apply_pull(&mut self.staged, reg, high, value as u8);
            self.staged.s = stack::pull_step(self.staged.s)?;
            self.ex.index += 1;
        }
        Ok(self.ex.index >= self.ex.slots.len())
    }

    fn end_push(&mut self, tick: u32, user: bool) -> Result<bool, SimError> {
        if tick == 0 {
            let Some(mask) = self.take_read() else {
                return Ok(false);
            };
            self.ex.bytes = stack::push_sequence(&self.staged, mask as u8, user);
            self.ex.index = 0;
            self.ex.step = u8::from(user);
            self.instr_target += self.ex.bytes.len() as u32;
            return Ok(false);
        }
        if self.ex.index < self.ex.bytes.len() {
            if self.write_done() {
                self.ex.index += 1;
            }
        }
        Ok(self.ex.index >= self.ex.bytes.len())
    }

    fn end_pull(&mut self, tick: u32, user: bool) -> Result<bool, SimError> {
        if tick == 0 {
            let Some(mask) = self.take_read() else {
                return Ok(false);
            };
            self.ex.slots = stack::pull_sequence(mask as u8, user);
            self.ex.index = 0;
            self.ex.step = u8::from(user);
            self.instr_target += self.ex.slots.len() as u32;
            return Ok(false);
        }
        if self.ex.index < self.ex.slots.len() {
            let Some(value) = self.take_read() else {
                return Ok(false);
            };
            let (reg, high) = self.ex.slots[self.ex.index];
            stack::apply_pull(&mut self.staged, reg, high, value as u8);
            let sp_reg = if user { RegisterName::U } else { RegisterName::S };
            let sp = stack::pull_step(self.staged.get(sp_reg))?;
            self.staged.set(sp_reg, sp);
            self.ex.index += 1;
        }
        Ok(self.ex.index >= self.ex.slots.len())
    }

    fn end_cwai(&mut self, _tick: u32) -> Result<bool, SimError> {
        match self.ex.step {
            0 => {
                if self.ex.bytes.is_empty() && self.ex.index == 0 {
                    // Postbyte not yet consumed: AND the mask into CC, set
                    // E, and stage the full frame.
                    let Some(mask) = self.take_read() else {
                        return Ok(false);
                    };
                    self.staged.cc &= mask as u8;
                    self.staged.set_flag(CcFlag::E, true);
                    self.ex.bytes = stack::push_sequence(&self.staged, stack::FULL_FRAME, false);
                    return Ok(false);
                }
                if self.ex.index < self.ex.bytes.len() {
                    if self.write_done() {
                        self.ex.index += 1;
                    }
                    if self.ex.index >= self.ex.bytes.len() {
                        self.ex.step = 1;
                    }
                }
                Ok(false)
            }
            1 => {
                // Frame is stacked; wait for a serviceable interrupt.
                let kind = if self.pending_nmi {
                    Some(IntKind::Nmi)
                } else if self.pending_firq && !self.staged.flag(CcFlag::F) {
                    Some(IntKind::Firq)
                } else if self.pending_irq && !self.staged.flag(CcFlag::I) {
                    Some(IntKind::Irq)
                } else {
                    None
                };
                if let Some(kind) = kind {
                    match kind {
                        IntKind::Nmi => self.pending_nmi = false,
                        IntKind::Firq => self.pending_firq = false,
                        IntKind::Irq => self.pending_irq = false,
                        _ => {}
                    }
                    self.staged.cc |= kind.mask_bits();
                    self.ex.value = self.vector(kind);
                    self.ex.step = 2;
                }
                Ok(false)
            }
            _ => {
                let Some(vector) = self.take_read() else {
                    return Ok(false);
                };
                self.staged.pc = vector;
                Ok(true)
            }
        }
    }

    fn end_sync(&mut self, tick: u32) -> Result<bool, SimError> {
        if tick == 0 {
            return Ok(false);
        }
        if self.pending_nmi || (self.pending_firq && !self.staged.flag(CcFlag::F)) {
            // Serviceable: leave the flag set, fetch dispatches it.
            return Ok(true);
        }
        if self.pending_irq && !self.staged.flag(CcFlag::I) {
            return Ok(true);
        }
        if self.pending_firq {
            // Masked signal: wake and continue.
            self.pending_firq = false;
            return Ok(true);
        }
        if self.pending_irq {
            self.pending_irq = false;
            return Ok(true);
        }
        Ok(false)
    }
}
