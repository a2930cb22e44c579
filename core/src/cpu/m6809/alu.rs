//! ALU operations and condition-code bookkeeping.
//!
//! Pure register-file transforms: the state machine resolves operands and
//! timing, these functions compute results and flags on the staged
//! registers.

use crate::cpu::m6809::instructions::{Alu8Op, Alu16Op, Cond, RmwOp};
use crate::cpu::registers::{CcFlag, RegisterName, Registers};

fn set_flags_logical(regs: &mut Registers, result: u8) {
    regs.set_flag(CcFlag::N, result & 0x80 != 0);
    regs.set_flag(CcFlag::Z, result == 0);
    regs.set_flag(CcFlag::V, false);
}

fn add8(regs: &mut Registers, value: u8, operand: u8, carry_in: bool) -> u8 {
    let carry = u16::from(carry_in);
    let sum = u16::from(value) + u16::from(operand) + carry;
    let result = sum as u8;
    let half = (value & 0x0F) + (operand & 0x0F) + carry as u8 > 0x0F;
    let overflow = ((value ^ result) & (operand ^ result) & 0x80) != 0;
    regs.set_flag(CcFlag::H, half);
    regs.set_flag(CcFlag::N, result & 0x80 != 0);
    regs.set_flag(CcFlag::Z, result == 0);
    regs.set_flag(CcFlag::V, overflow);
    regs.set_flag(CcFlag::C, sum > 0xFF);
    result
}

fn sub8(regs: &mut Registers, value: u8, operand: u8, carry_in: bool) -> u8 {
    let borrow = u16::from(carry_in);
    let diff = u16::from(value)
        .wrapping_sub(u16::from(operand))
        .wrapping_sub(borrow);
    let result = diff as u8;
    let overflow = ((value ^ operand) & (value ^ result) & 0x80) != 0;
    regs.set_flag(CcFlag::N, result & 0x80 != 0);
    regs.set_flag(CcFlag::Z, result == 0);
    regs.set_flag(CcFlag::V, overflow);
    regs.set_flag(CcFlag::C, diff > 0xFF);
    result
}

fn add16(regs: &mut Registers, value: u16, operand: u16) -> u16 {
    let sum = u32::from(value) + u32::from(operand);
    let result = sum as u16;
    let overflow = ((value ^ result) & (operand ^ result) & 0x8000) != 0;
    regs.set_flag(CcFlag::N, result & 0x8000 != 0);
    regs.set_flag(CcFlag::Z, result == 0);
    regs.set_flag(CcFlag::V, overflow);
    regs.set_flag(CcFlag::C, sum > 0xFFFF);
    result
}

fn sub16(regs: &mut Registers, value: u16, operand: u16) -> u16 {
    let diff = u32::from(value).wrapping_sub(u32::from(operand));
    let result = diff as u16;
    let overflow = ((value ^ operand) & (value ^ result) & 0x8000) != 0;
    regs.set_flag(CcFlag::N, result & 0x8000 != 0);
    regs.set_flag(CcFlag::Z, result == 0);
    regs.set_flag(CcFlag::V, overflow);
    regs.set_flag(CcFlag::C, diff > 0xFFFF);
    result
}

/// Apply an 8-bit two-operand ALU operation to the named accumulator.
/// CMP and BIT discard the result.
pub fn alu8(regs: &mut Registers, op: Alu8Op, reg: RegisterName, operand: u8) {
    let value = regs.get(reg) as u8;
    match op {
        Alu8Op::Sub => {
            let result = sub8(regs, value, operand, false);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::Cmp => {
            sub8(regs, value, operand, false);
        }
        Alu8Op::Sbc => {
            let carry = regs.flag(CcFlag::C);
            let result = sub8(regs, value, operand, carry);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::And => {
            let result = value & operand;
            set_flags_logical(regs, result);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::Bit => {
            set_flags_logical(regs, value & operand);
        }
        Alu8Op::Eor => {
            let result = value ^ operand;
            set_flags_logical(regs, result);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::Adc => {
            let carry = regs.flag(CcFlag::C);
            let result = add8(regs, value, operand, carry);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::Or => {
            let result = value | operand;
            set_flags_logical(regs, result);
            regs.set(reg, u16::from(result));
        }
        Alu8Op::Add => {
            let result = add8(regs, value, operand, false);
            regs.set(reg, u16::from(result));
        }
    }
}

/// Apply a 16-bit ALU operation against the named register.
pub fn alu16(regs: &mut Registers, op: Alu16Op, reg: RegisterName, operand: u16) {
    let value = regs.get(reg);
    match op {
        Alu16Op::Sub => {
            let result = sub16(regs, value, operand);
            regs.set(reg, result);
        }
        Alu16Op::Add => {
            let result = add16(regs, value, operand);
            regs.set(reg, result);
        }
        Alu16Op::Cmp => {
            sub16(regs, value, operand);
        }
    }
}

/// Apply a read-modify-write operation. Returns the byte to write back,
/// or `None` when the operation only tests (TST).
pub fn rmw(regs: &mut Registers, op: RmwOp, value: u8) -> Option<u8> {
    match op {
        RmwOp::Neg => {
            let result = (0u8).wrapping_sub(value);
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, value == 0x80);
            regs.set_flag(CcFlag::C, value != 0);
            Some(result)
        }
        RmwOp::Com => {
            let result = !value;
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, false);
            regs.set_flag(CcFlag::C, true);
            Some(result)
        }
        RmwOp::Lsr => {
            let result = value >> 1;
            regs.set_flag(CcFlag::N, false);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::C, value & 0x01 != 0);
            Some(result)
        }
        RmwOp::Ror => {
            let carry_in = u8::from(regs.flag(CcFlag::C)) << 7;
            let result = (value >> 1) | carry_in;
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::C, value & 0x01 != 0);
            Some(result)
        }
        RmwOp::Asr => {
            let result = (value >> 1) | (value & 0x80);
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::C, value & 0x01 != 0);
            Some(result)
        }
        RmwOp::Asl => {
            let result = value << 1;
            let carry = value & 0x80 != 0;
            let n = result & 0x80 != 0;
            regs.set_flag(CcFlag::N, n);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, n ^ carry);
            regs.set_flag(CcFlag::C, carry);
            Some(result)
        }
        RmwOp::Rol => {
            let result = (value << 1) | u8::from(regs.flag(CcFlag::C));
            let carry = value & 0x80 != 0;
            let n = result & 0x80 != 0;
            regs.set_flag(CcFlag::N, n);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, n ^ carry);
            regs.set_flag(CcFlag::C, carry);
            Some(result)
        }
        RmwOp::Dec => {
            let result = value.wrapping_sub(1);
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, value == 0x80);
            Some(result)
        }
        RmwOp::Inc => {
            let result = value.wrapping_add(1);
            regs.set_flag(CcFlag::N, result & 0x80 != 0);
            regs.set_flag(CcFlag::Z, result == 0);
            regs.set_flag(CcFlag::V, value == 0x7F);
            Some(result)
        }
        RmwOp::Tst => {
            set_flags_logical(regs, value);
            None
        }
        RmwOp::Clr => {
            regs.set_flag(CcFlag::N, false);
            regs.set_flag(CcFlag::Z, true);
            regs.set_flag(CcFlag::V, false);
            regs.set_flag(CcFlag::C, false);
            Some(0)
        }
    }
}

/// Evaluate a branch condition against the current condition codes.
pub fn test_cond(regs: &Registers, cond: Cond) -> bool {
    let c = regs.flag(CcFlag::C);
    let z = regs.flag(CcFlag::Z);
    let n = regs.flag(CcFlag::N);
    let v = regs.flag(CcFlag::V);
    match cond {
        Cond::Always => true,
        Cond::Never => false,
        Cond::Hi => !c && !z,
        Cond::Ls => c || z,
        Cond::Cc => !c,
        Cond::Cs => c,
        Cond::Ne => !z,
        Cond::Eq => z,
        Cond::Vc => !v,
        Cond::Vs => v,
        Cond::Pl => !n,
        Cond::Mi => n,
        Cond::Ge => n == v,
        Cond::Lt => n != v,
        Cond::Gt => !z && n == v,
        Cond::Le => z || n != v,
    }
}

/// MUL: D ← A × B. Z from the 16-bit product, C from product bit 7.
pub fn mul(regs: &mut Registers) {
    let product = u16::from(regs.a) * u16::from(regs.b);
    regs.set_d(product);
    regs.set_flag(CcFlag::Z, product == 0);
    regs.set_flag(CcFlag::C, product & 0x80 != 0);
}

/// SEX: sign-extend B into D.
pub fn sex(regs: &mut Registers) {
    regs.a = if regs.b & 0x80 != 0 { 0xFF } else { 0x00 };
    regs.set_flag(CcFlag::N, regs.b & 0x80 != 0);
    regs.set_flag(CcFlag::Z, regs.d() == 0);
}

/// DAA: decimal-adjust A after a BCD addition.
pub fn daa(regs: &mut Registers) {
    let mut correction = 0u8;
    let high = regs.a >> 4;
    let low = regs.a & 0x0F;
    if regs.flag(CcFlag::H) || low > 9 {
        correction |= 0x06;
    }
    if regs.flag(CcFlag::C) || high > 9 || (high > 8 && low > 9) {
        correction |= 0x60;
    }
    let sum = u16::from(regs.a) + u16::from(correction);
    regs.a = sum as u8;
    regs.set_flag(CcFlag::N, regs.a & 0x80 != 0);
    regs.set_flag(CcFlag::Z, regs.a == 0);
    if sum > 0xFF {
        regs.set_flag(CcFlag::C, true);
    }
}

/// TFR/EXG postbyte nibble → register.
pub fn transfer_register(code: u8) -> Option<RegisterName> {
    match code & 0x0F {
        0x0 => Some(RegisterName::D),
        0x1 => Some(RegisterName::X),
        0x2 => Some(RegisterName::Y),
        0x3 => Some(RegisterName::U),
        0x4 => Some(RegisterName::S),
        0x5 => Some(RegisterName::Pc),
        0x8 => Some(RegisterName::A),
        0x9 => Some(RegisterName::B),
        0xA => Some(RegisterName::Cc),
        0xB => Some(RegisterName::Dp),
        _ => None,
    }
}

fn is_wide(name: RegisterName) -> bool {
    matches!(
        name,
        RegisterName::D
            | RegisterName::X
            | RegisterName::Y
            | RegisterName::U
            | RegisterName::S
            | RegisterName::Pc
    )
}

/// Value of a register as seen by TFR/EXG: an 8-bit source feeding a
/// 16-bit destination reads with a high byte of 0xFF.
pub fn transfer_value(regs: &Registers, from: RegisterName, to: RegisterName) -> u16 {
    let value = regs.get(from);
    if !is_wide(from) && is_wide(to) {
        value | 0xFF00
    } else {
        value
    }
}
