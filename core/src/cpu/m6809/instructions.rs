//! The M6809 opcode table.
//!
//! Every opcode is keyed by its 1- or 2-byte numeric value (2-byte opcodes
//! carry an `0x10` or `0x11` prefix in the high byte). Each entry records
//! the addressing mode, the documented cycle count and an execution
//! template; the `execute` state drives the template's start/end phases
//! until the documented cycles are consumed.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::cpu::registers::RegisterName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Inherent,
    Immediate,
    Direct,
    Indexed,
    Extended,
    Relative,
}

/// Two-operand 8-bit ALU operations (A or B against memory/immediate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alu8Op {
    Sub,
    Cmp,
    Sbc,
    And,
    Bit,
    Eor,
    Adc,
    Or,
    Add,
}

/// 16-bit ALU operations against a double-byte operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alu16Op {
    Sub,
    Add,
    Cmp,
}

/// Read-modify-write operations, applied to memory or to A/B inherently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RmwOp {
    Neg,
    Com,
    Lsr,
    Ror,
    Asr,
    Asl,
    Rol,
    Dec,
    Inc,
    Tst,
    Clr,
}

/// Branch conditions, short and long forms alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Always,
    Never,
    Hi,
    Ls,
    Cc,
    Cs,
    Ne,
    Eq,
    Vc,
    Vs,
    Pl,
    Mi,
    Ge,
    Lt,
    Gt,
    Le,
}

/// Execution template. The execute state machine dispatches its start/end
/// phases on this tag; the table stays data-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exec {
    Load8(RegisterName),
    Load16(RegisterName),
    Store8(RegisterName),
    Store16(RegisterName),
    Alu8(Alu8Op, RegisterName),
    Alu16(Alu16Op, RegisterName),
    Rmw(RmwOp),
    RmwReg(RmwOp, RegisterName),
    Branch(Cond),
    Bsr,
    Jsr,
    Jmp,
    Rts,
    Rti,
    Push { user: bool },
    Pull { user: bool },
    Lea(RegisterName),
    Tfr,
    Exg,
    Mul,
    Daa,
    Sex,
    Nop,
    Abx,
    AndCc,
    OrCc,
    Cwai,
    Sync,
    /// SWI/SWI2/SWI3: never executes; fetch routes straight into the
    /// interrupt entry state.
    Swi,
}

#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub opcode: u16,
    pub mode: Mode,
    /// Documented cycle count. Indexed modes add the postbyte's extra
    /// cycles; taken long conditional branches add one; stack transfers
    /// add one per byte moved.
    pub cycles: u8,
    pub exec: Exec,
    /// Long (16-bit displacement) relative form.
    pub long_branch: bool,
    /// 1..=3 for SWI/SWI2/SWI3, 0 otherwise.
    pub swi_level: u8,
}

impl Instruction {
    const fn new(mnemonic: &'static str, opcode: u16, mode: Mode, cycles: u8, exec: Exec) -> Self {
        Self {
            mnemonic,
            opcode,
            mode,
            cycles,
            exec,
            long_branch: false,
            swi_level: 0,
        }
    }
}

/// Add the immediate/direct/indexed/extended quartet for one operation.
/// Cycle counts follow the uniform documented deltas (+2 direct, +2
/// indexed-base, +3 extended over immediate).
fn quartet(
    table: &mut Vec<Instruction>,
    mnemonic: &'static str,
    imm_opcode: u16,
    imm_cycles: u8,
    exec: Exec,
) {
    table.push(Instruction::new(
        mnemonic,
        imm_opcode,
        Mode::Immediate,
        imm_cycles,
        exec,
    ));
    table.push(Instruction::new(
        mnemonic,
        imm_opcode + 0x10,
        Mode::Direct,
        imm_cycles + 2,
        exec,
    ));
    table.push(Instruction::new(
        mnemonic,
        imm_opcode + 0x20,
        Mode::Indexed,
        imm_cycles + 2,
        exec,
    ));
    table.push(Instruction::new(
        mnemonic,
        imm_opcode + 0x30,
        Mode::Extended,
        imm_cycles + 3,
        exec,
    ));
}

/// Direct/indexed/extended triplet for stores (no immediate form).
/// `dir_opcode` is the direct-page opcode; indexed and extended follow at
/// +0x10 and +0x20.
fn store_triplet(
    table: &mut Vec<Instruction>,
    mnemonic: &'static str,
    dir_opcode: u16,
    dir_cycles: u8,
    exec: Exec,
) {
    table.push(Instruction::new(
        mnemonic,
        dir_opcode,
        Mode::Direct,
        dir_cycles,
        exec,
    ));
    table.push(Instruction::new(
        mnemonic,
        dir_opcode + 0x10,
        Mode::Indexed,
        dir_cycles,
        exec,
    ));
    table.push(Instruction::new(
        mnemonic,
        dir_opcode + 0x20,
        Mode::Extended,
        dir_cycles + 1,
        exec,
    ));
}

/// Direct (0x00+n), indexed (0x60+n), extended (0x70+n) and the inherent
/// A (0x40+n) / B (0x50+n) forms of a read-modify-write operation.
fn rmw_family(table: &mut Vec<Instruction>, mnemonic: &'static str, low: u16, op: RmwOp) {
    table.push(Instruction::new(mnemonic, low, Mode::Direct, 6, Exec::Rmw(op)));
    table.push(Instruction::new(
        mnemonic,
        0x60 + low,
        Mode::Indexed,
        6,
        Exec::Rmw(op),
    ));
    table.push(Instruction::new(
        mnemonic,
        0x70 + low,
        Mode::Extended,
        7,
        Exec::Rmw(op),
    ));
    table.push(Instruction::new(
        mnemonic,
        0x40 + low,
        Mode::Inherent,
        2,
        Exec::RmwReg(op, RegisterName::A),
    ));
    table.push(Instruction::new(
        mnemonic,
        0x50 + low,
        Mode::Inherent,
        2,
        Exec::RmwReg(op, RegisterName::B),
    ));
}

const SHORT_BRANCHES: [(&str, Cond); 16] = [
    ("BRA", Cond::Always),
    ("BRN", Cond::Never),
    ("BHI", Cond::Hi),
    ("BLS", Cond::Ls),
    ("BCC", Cond::Cc),
    ("BCS", Cond::Cs),
    ("BNE", Cond::Ne),
    ("BEQ", Cond::Eq),
    ("BVC", Cond::Vc),
    ("BVS", Cond::Vs),
    ("BPL", Cond::Pl),
    ("BMI", Cond::Mi),
    ("BGE", Cond::Ge),
    ("BLT", Cond::Lt),
    ("BGT", Cond::Gt),
    ("BLE", Cond::Le),
];

const LONG_BRANCHES: [(&str, Cond); 15] = [
    ("LBRN", Cond::Never),
    ("LBHI", Cond::Hi),
    ("LBLS", Cond::Ls),
    ("LBCC", Cond::Cc),
    ("LBCS", Cond::Cs),
    ("LBNE", Cond::Ne),
    ("LBEQ", Cond::Eq),
    ("LBVC", Cond::Vc),
    ("LBVS", Cond::Vs),
    ("LBPL", Cond::Pl),
    ("LBMI", Cond::Mi),
    ("LBGE", Cond::Ge),
    ("LBLT", Cond::Lt),
    ("LBGT", Cond::Gt),
    ("LBLE", Cond::Le),
];

fn build_table() -> HashMap<u16, Instruction> {
    use RegisterName::{A, B, D, S, U, X, Y};

    let mut t: Vec<Instruction> = Vec::with_capacity(300);

    // Memory/inherent read-modify-write.
    rmw_family(&mut t, "NEG", 0x00, RmwOp::Neg);
    rmw_family(&mut t, "COM", 0x03, RmwOp::Com);
    rmw_family(&mut t, "LSR", 0x04, RmwOp::Lsr);
    rmw_family(&mut t, "ROR", 0x06, RmwOp::Ror);
    rmw_family(&mut t, "ASR", 0x07, RmwOp::Asr);
    rmw_family(&mut t, "ASL", 0x08, RmwOp::Asl);
    rmw_family(&mut t, "ROL", 0x09, RmwOp::Rol);
    rmw_family(&mut t, "DEC", 0x0A, RmwOp::Dec);
    rmw_family(&mut t, "INC", 0x0C, RmwOp::Inc);
    rmw_family(&mut t, "TST", 0x0D, RmwOp::Tst);
    rmw_family(&mut t, "CLR", 0x0F, RmwOp::Clr);

    // Jumps and subroutine calls.
    t.push(Instruction::new("JMP", 0x0E, Mode::Direct, 3, Exec::Jmp));
    t.push(Instruction::new("JMP", 0x6E, Mode::Indexed, 3, Exec::Jmp));
    t.push(Instruction::new("JMP", 0x7E, Mode::Extended, 4, Exec::Jmp));
    t.push(Instruction::new("JSR", 0x9D, Mode::Direct, 7, Exec::Jsr));
    t.push(Instruction::new("JSR", 0xAD, Mode::Indexed, 7, Exec::Jsr));
    t.push(Instruction::new("JSR", 0xBD, Mode::Extended, 8, Exec::Jsr));
    t.push(Instruction::new("BSR", 0x8D, Mode::Relative, 7, Exec::Bsr));
    t.push(Instruction {
        long_branch: true,
        ..Instruction::new("LBSR", 0x17, Mode::Relative, 9, Exec::Bsr)
    });
    t.push(Instruction::new("RTS", 0x39, Mode::Inherent, 5, Exec::Rts));
    t.push(Instruction::new("RTI", 0x3B, Mode::Inherent, 6, Exec::Rti));

    // Misc inherent / immediate.
    t.push(Instruction::new("NOP", 0x12, Mode::Inherent, 2, Exec::Nop));
    t.push(Instruction::new("SYNC", 0x13, Mode::Inherent, 4, Exec::Sync));
    t.push(Instruction::new("DAA", 0x19, Mode::Inherent, 2, Exec::Daa));
    t.push(Instruction::new("ORCC", 0x1A, Mode::Immediate, 3, Exec::OrCc));
    t.push(Instruction::new("ANDCC", 0x1C, Mode::Immediate, 3, Exec::AndCc));
    t.push(Instruction::new("SEX", 0x1D, Mode::Inherent, 2, Exec::Sex));
    t.push(Instruction::new("EXG", 0x1E, Mode::Immediate, 8, Exec::Exg));
    t.push(Instruction::new("TFR", 0x1F, Mode::Immediate, 6, Exec::Tfr));
    t.push(Instruction::new("ABX", 0x3A, Mode::Inherent, 3, Exec::Abx));
    t.push(Instruction::new("MUL", 0x3D, Mode::Inherent, 11, Exec::Mul));
    t.push(Instruction::new("CWAI", 0x3C, Mode::Immediate, 20, Exec::Cwai));

    // Software interrupts.
    t.push(Instruction {
        swi_level: 1,
        ..Instruction::new("SWI", 0x3F, Mode::Inherent, 19, Exec::Swi)
    });
    t.push(Instruction {
        swi_level: 2,
        ..Instruction::new("SWI2", 0x103F, Mode::Inherent, 20, Exec::Swi)
    });
    t.push(Instruction {
        swi_level: 3,
        ..Instruction::new("SWI3", 0x113F, Mode::Inherent, 20, Exec::Swi)
    });

    // Branches.
    t.push(Instruction {
        long_branch: true,
        ..Instruction::new("LBRA", 0x16, Mode::Relative, 5, Exec::Branch(Cond::Always))
    });
    for (i, (mnemonic, cond)) in SHORT_BRANCHES.iter().enumerate() {
        t.push(Instruction::new(
            mnemonic,
            0x20 + i as u16,
            Mode::Relative,
            3,
            Exec::Branch(*cond),
        ));
    }
    for (i, (mnemonic, cond)) in LONG_BRANCHES.iter().enumerate() {
        t.push(Instruction {
            long_branch: true,
            ..Instruction::new(
                mnemonic,
                0x1021 + i as u16,
                Mode::Relative,
                5,
                Exec::Branch(*cond),
            )
        });
    }

    // Load effective address.
    t.push(Instruction::new("LEAX", 0x30, Mode::Indexed, 4, Exec::Lea(X)));
    t.push(Instruction::new("LEAY", 0x31, Mode::Indexed, 4, Exec::Lea(Y)));
    t.push(Instruction::new("LEAS", 0x32, Mode::Indexed, 4, Exec::Lea(S)));
    t.push(Instruction::new("LEAU", 0x33, Mode::Indexed, 4, Exec::Lea(U)));

    // Stack transfers.
    t.push(Instruction::new("PSHS", 0x34, Mode::Immediate, 5, Exec::Push { user: false }));
    t.push(Instruction::new("PULS", 0x35, Mode::Immediate, 5, Exec::Pull { user: false }));
    t.push(Instruction::new("PSHU", 0x36, Mode::Immediate, 5, Exec::Push { user: true }));
    t.push(Instruction::new("PULU", 0x37, Mode::Immediate, 5, Exec::Pull { user: true }));

    // 8-bit ALU, accumulator A.
    quartet(&mut t, "SUBA", 0x80, 2, Exec::Alu8(Alu8Op::Sub, A));
    quartet(&mut t, "CMPA", 0x81, 2, Exec::Alu8(Alu8Op::Cmp, A));
    quartet(&mut t, "SBCA", 0x82, 2, Exec::Alu8(Alu8Op::Sbc, A));
    quartet(&mut t, "ANDA", 0x84, 2, Exec::Alu8(Alu8Op::And, A));
    quartet(&mut t, "BITA", 0x85, 2, Exec::Alu8(Alu8Op::Bit, A));
    quartet(&mut t, "LDA", 0x86, 2, Exec::Load8(A));
    quartet(&mut t, "EORA", 0x88, 2, Exec::Alu8(Alu8Op::Eor, A));
    quartet(&mut t, "ADCA", 0x89, 2, Exec::Alu8(Alu8Op::Adc, A));
    quartet(&mut t, "ORA", 0x8A, 2, Exec::Alu8(Alu8Op::Or, A));
    quartet(&mut t, "ADDA", 0x8B, 2, Exec::Alu8(Alu8Op::Add, A));
    store_triplet(&mut t, "STA", 0x97, 4, Exec::Store8(A));

    // 8-bit ALU, accumulator B.
    quartet(&mut t, "SUBB", 0xC0, 2, Exec::Alu8(Alu8Op::Sub, B));
    quartet(&mut t, "CMPB", 0xC1, 2, Exec::Alu8(Alu8Op::Cmp, B));
    quartet(&mut t, "SBCB", 0xC2, 2, Exec::Alu8(Alu8Op::Sbc, B));
    quartet(&mut t, "ANDB", 0xC4, 2, Exec::Alu8(Alu8Op::And, B));
    quartet(&mut t, "BITB", 0xC5, 2, Exec::Alu8(Alu8Op::Bit, B));
    quartet(&mut t, "LDB", 0xC6, 2, Exec::Load8(B));
    quartet(&mut t, "EORB", 0xC8, 2, Exec::Alu8(Alu8Op::Eor, B));
    quartet(&mut t, "ADCB", 0xC9, 2, Exec::Alu8(Alu8Op::Adc, B));
    quartet(&mut t, "ORB", 0xCA, 2, Exec::Alu8(Alu8Op::Or, B));
    quartet(&mut t, "ADDB", 0xCB, 2, Exec::Alu8(Alu8Op::Add, B));
    store_triplet(&mut t, "STB", 0xD7, 4, Exec::Store8(B));

    // 16-bit ALU.
    quartet(&mut t, "SUBD", 0x83, 4, Exec::Alu16(Alu16Op::Sub, D));
    quartet(&mut t, "ADDD", 0xC3, 4, Exec::Alu16(Alu16Op::Add, D));
    quartet(&mut t, "CMPX", 0x8C, 4, Exec::Alu16(Alu16Op::Cmp, X));
    quartet(&mut t, "CMPD", 0x1083, 5, Exec::Alu16(Alu16Op::Cmp, D));
    quartet(&mut t, "CMPY", 0x108C, 5, Exec::Alu16(Alu16Op::Cmp, Y));
    quartet(&mut t, "CMPU", 0x1183, 5, Exec::Alu16(Alu16Op::Cmp, U));
    quartet(&mut t, "CMPS", 0x118C, 5, Exec::Alu16(Alu16Op::Cmp, S));

    // 16-bit loads and stores.
    quartet(&mut t, "LDX", 0x8E, 3, Exec::Load16(X));
    store_triplet(&mut t, "STX", 0x9F, 5, Exec::Store16(X));
    quartet(&mut t, "LDD", 0xCC, 3, Exec::Load16(D));
    store_triplet(&mut t, "STD", 0xDD, 5, Exec::Store16(D));
    quartet(&mut t, "LDU", 0xCE, 3, Exec::Load16(U));
    store_triplet(&mut t, "STU", 0xDF, 5, Exec::Store16(U));
    quartet(&mut t, "LDY", 0x108E, 4, Exec::Load16(Y));
    store_triplet(&mut t, "STY", 0x109F, 6, Exec::Store16(Y));
    quartet(&mut t, "LDS", 0x10CE, 4, Exec::Load16(S));
    store_triplet(&mut t, "STS", 0x10DF, 6, Exec::Store16(S));

    t.into_iter().map(|i| (i.opcode, i)).collect()
}

static TABLE: LazyLock<HashMap<u16, Instruction>> = LazyLock::new(build_table);

/// Look up an instruction by its full (possibly prefixed) opcode.
pub fn lookup(opcode: u16) -> Option<&'static Instruction> {
    TABLE.get(&opcode)
}
