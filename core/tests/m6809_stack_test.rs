mod common;

use common::TestSystem;
use wirewrap_core::cpu::registers::RegisterName;
use wirewrap_core::device::Clock;

fn with_registers() -> TestSystem {
    let sys = TestSystem::new();
    sys.reset_to(0x1000);
    sys.set_reg(RegisterName::A, 0x11);
    sys.set_reg(RegisterName::B, 0x22);
    sys.set_reg(RegisterName::Dp, 0x33);
    sys.set_reg(RegisterName::X, 0x4455);
    sys.set_reg(RegisterName::Y, 0x6677);
    sys.set_reg(RegisterName::U, 0x8899);
    sys.set_reg(RegisterName::S, 0x8000);
    sys.set_reg(RegisterName::Cc, 0xC5);
    sys
}

// ============================================================
// PSHS / PULS
// ============================================================

#[test]
fn test_pshs_full_mask() {
    // PSHS with postbyte 0xFF moves 12 bytes; the last byte pushed
    // (lowest address) is CC.
    let sys = with_registers();
    sys.load(0x1000, &[0x34, 0xFF]);
    assert_eq!(sys.run_instruction(), 17); // 5 + 12
    let regs = sys.regs();
    assert_eq!(regs.s, 0x8000 - 12);
    assert_eq!(sys.read_mem(0x7FF4), 0xC5); // CC at the bottom
    assert_eq!(sys.read_mem(0x7FF5), 0x11); // A
    assert_eq!(sys.read_mem(0x7FF6), 0x22); // B
    assert_eq!(sys.read_mem(0x7FF7), 0x33); // DP
    assert_eq!(sys.read_mem(0x7FF8), 0x44); // X high
    assert_eq!(sys.read_mem(0x7FF9), 0x55); // X low
    assert_eq!(sys.read_mem(0x7FFA), 0x66); // Y high
    assert_eq!(sys.read_mem(0x7FFB), 0x77); // Y low
    assert_eq!(sys.read_mem(0x7FFC), 0x88); // U high
    assert_eq!(sys.read_mem(0x7FFD), 0x99); // U low
    assert_eq!(sys.read_mem(0x7FFE), 0x10); // PC high (0x1002 after operand)
    assert_eq!(sys.read_mem(0x7FFF), 0x02); // PC low
}

#[test]
fn test_pshs_single_register() {
    let sys = with_registers();
    sys.load(0x1000, &[0x34, 0x02]); // PSHS A
    assert_eq!(sys.run_instruction(), 6); // 5 + 1
    assert_eq!(sys.regs().s, 0x7FFF);
    assert_eq!(sys.read_mem(0x7FFF), 0x11);
}

#[test]
fn test_puls_restores_registers() {
    // Push A, B, X, then clobber and pull back.
    let sys = with_registers();
    sys.load(0x1000, &[0x34, 0x16, 0x4F, 0x5F, 0x35, 0x16]);
    sys.run_instruction(); // PSHS A,B,X
    assert_eq!(sys.regs().s, 0x8000 - 4);
    sys.run_instruction(); // CLRA
    sys.run_instruction(); // CLRB
    assert_eq!(sys.run_instruction(), 9); // PULS A,B,X: 5 + 4
    let regs = sys.regs();
    assert_eq!(regs.a, 0x11);
    assert_eq!(regs.b, 0x22);
    assert_eq!(regs.x, 0x4455);
    assert_eq!(regs.s, 0x8000);
}

#[test]
fn test_puls_pc_acts_as_return() {
    let sys = with_registers();
    sys.load(0x7FFE, &[0x30, 0x00]); // a return address on the stack
    sys.load(0x1000, &[0x35, 0x80]); // PULS PC
    sys.set_reg(RegisterName::S, 0x7FFE);
    assert_eq!(sys.run_instruction(), 7); // 5 + 2
    assert_eq!(sys.regs().pc, 0x3000);
    assert_eq!(sys.regs().s, 0x8000);
}

// ============================================================
// PSHU / PULU
// ============================================================

#[test]
fn test_pshu_uses_user_stack() {
    let sys = with_registers();
    sys.load(0x1000, &[0x36, 0x06]); // PSHU A,B
    sys.set_reg(RegisterName::U, 0x6000);
    assert_eq!(sys.run_instruction(), 7); // 5 + 2
    let regs = sys.regs();
    assert_eq!(regs.u, 0x5FFE);
    assert_eq!(regs.s, 0x8000); // S untouched
    assert_eq!(sys.read_mem(0x5FFE), 0x11);
    assert_eq!(sys.read_mem(0x5FFF), 0x22);
}

#[test]
fn test_pshu_partner_is_s() {
    // On the U stack, bit 6 names S.
    let sys = with_registers();
    sys.load(0x1000, &[0x36, 0x40]); // PSHU S
    sys.set_reg(RegisterName::U, 0x6000);
    sys.run_instruction();
    assert_eq!(sys.read_mem(0x5FFE), 0x80);
    assert_eq!(sys.read_mem(0x5FFF), 0x00);
}

#[test]
fn test_pulu_roundtrip() {
    let sys = with_registers();
    sys.load(0x1000, &[0x36, 0x30, 0x37, 0x30]); // PSHU X,Y; PULU X,Y
    sys.set_reg(RegisterName::U, 0x6000);
    sys.run_instruction();
    sys.set_reg(RegisterName::X, 0);
    sys.set_reg(RegisterName::Y, 0);
    sys.run_instruction();
    assert_eq!(sys.regs().x, 0x4455);
    assert_eq!(sys.regs().y, 0x6677);
    assert_eq!(sys.regs().u, 0x6000);
}

// ============================================================
// Range violations
// ============================================================

#[test]
fn test_push_underflow_is_fatal() {
    let sys = with_registers();
    sys.load(0x1000, &[0x34, 0x02]); // PSHS A with S=0
    sys.set_reg(RegisterName::S, 0x0000);
    let clock = sys.sim.module::<Clock>("clock").expect("clock");
    let clock = clock.borrow();
    let result = clock.run(10);
    assert!(result.is_err(), "push below zero must be fatal");
}

#[test]
fn test_pull_overflow_is_fatal() {
    let sys = with_registers();
    sys.load(0x1000, &[0x35, 0x02]); // PULS A with S=0xFFFF
    sys.set_reg(RegisterName::S, 0xFFFF);
    let clock = sys.sim.module::<Clock>("clock").expect("clock");
    let clock = clock.borrow();
    let result = clock.run(10);
    assert!(result.is_err(), "pull above 0xFFFF must be fatal");
}
