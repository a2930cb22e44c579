mod common;

use common::TestSystem;
use wirewrap_core::cpu::registers::{CcFlag, RegisterName};

fn run_one(program: &[u8]) -> TestSystem {
    let sys = TestSystem::new();
    sys.load(0x1000, program);
    sys.reset_to(0x1000);
    sys
}

// ============================================================
// ADDD / SUBD
// ============================================================

#[test]
fn test_addd_immediate() {
    let sys = run_one(&[0xCC, 0x12, 0x00, 0xC3, 0x00, 0x34]);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 4);
    assert_eq!(sys.regs().d(), 0x1234);
}

#[test]
fn test_addd_carry() {
    let sys = run_one(&[0xCC, 0xFF, 0xFF, 0xC3, 0x00, 0x01]);
    sys.run_instruction();
    sys.run_instruction();
    let regs = sys.regs();
    assert_eq!(regs.d(), 0x0000);
    assert!(regs.flag(CcFlag::C));
    assert!(regs.flag(CcFlag::Z));
}

#[test]
fn test_subd_immediate() {
    let sys = run_one(&[0xCC, 0x80, 0x00, 0x83, 0x00, 0x01]);
    sys.run_instruction();
    sys.run_instruction();
    let regs = sys.regs();
    assert_eq!(regs.d(), 0x7FFF);
    assert!(regs.flag(CcFlag::V)); // 0x8000 - 1 crosses the sign boundary
}

#[test]
fn test_subd_direct() {
    let sys = TestSystem::new();
    sys.load(0x0020, &[0x00, 0x10]);
    sys.load(0x1000, &[0xCC, 0x00, 0x30, 0x93, 0x20]);
    sys.reset_to(0x1000);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 6);
    assert_eq!(sys.regs().d(), 0x0020);
}

// ============================================================
// 16-bit compares
// ============================================================

#[test]
fn test_cmpx_immediate_equal() {
    let sys = run_one(&[0x8E, 0x20, 0x00, 0x8C, 0x20, 0x00]);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 4);
    assert!(sys.regs().flag(CcFlag::Z));
    assert_eq!(sys.regs().x, 0x2000);
}

#[test]
fn test_cmpd_prefixed_immediate() {
    let sys = run_one(&[0xCC, 0x10, 0x00, 0x10, 0x83, 0x20, 0x00]);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 5);
    assert!(sys.regs().flag(CcFlag::C)); // 0x1000 < 0x2000 unsigned
    assert!(sys.regs().flag(CcFlag::N));
}

#[test]
fn test_cmpy_immediate() {
    let sys = run_one(&[0x10, 0x8E, 0x05, 0x00, 0x10, 0x8C, 0x05, 0x00]);
    sys.run_instruction();
    sys.run_instruction();
    assert!(sys.regs().flag(CcFlag::Z));
}

#[test]
fn test_cmpu_page3() {
    let sys = run_one(&[0xCE, 0x40, 0x00, 0x11, 0x83, 0x3F, 0xFF]);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 5);
    assert!(!sys.regs().flag(CcFlag::C));
    assert!(!sys.regs().flag(CcFlag::Z));
}

// ============================================================
// MUL / SEX / DAA / ABX
// ============================================================

#[test]
fn test_mul() {
    let sys = run_one(&[0x86, 0x0C, 0xC6, 0x0B, 0x3D]); // 12 * 11 = 132
    sys.run_instruction();
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 11);
    let regs = sys.regs();
    assert_eq!(regs.d(), 132);
    assert!(!regs.flag(CcFlag::Z));
    assert!(regs.flag(CcFlag::C)); // product bit 7 set (132 = 0x84)
}

#[test]
fn test_mul_zero() {
    let sys = run_one(&[0x86, 0x00, 0xC6, 0x45, 0x3D]);
    sys.run_instruction();
    sys.run_instruction();
    sys.run_instruction();
    assert!(sys.regs().flag(CcFlag::Z));
    assert_eq!(sys.regs().d(), 0);
}

#[test]
fn test_sex_negative() {
    let sys = run_one(&[0xC6, 0x80, 0x1D]);
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 2);
    assert_eq!(sys.regs().a, 0xFF);
    assert!(sys.regs().flag(CcFlag::N));
}

#[test]
fn test_sex_positive() {
    let sys = run_one(&[0xC6, 0x7F, 0x1D]);
    sys.run_instruction();
    sys.run_instruction();
    assert_eq!(sys.regs().a, 0x00);
    assert_eq!(sys.regs().d(), 0x007F);
}

#[test]
fn test_daa_adjusts_bcd_sum() {
    // 0x19 + 0x28 = 0x41 binary; DAA corrects to 0x47.
    let sys = run_one(&[0x86, 0x19, 0x8B, 0x28, 0x19]);
    sys.run_instruction();
    sys.run_instruction();
    assert_eq!(sys.run_instruction(), 2);
    assert_eq!(sys.regs().a, 0x47);
}

#[test]
fn test_daa_sets_carry_past_99() {
    // 0x91 + 0x10 = 0xA1; DAA corrects to 0x01 with carry.
    let sys = run_one(&[0x86, 0x91, 0x8B, 0x10, 0x19]);
    sys.run_instruction();
    sys.run_instruction();
    sys.run_instruction();
    assert_eq!(sys.regs().a, 0x01);
    assert!(sys.regs().flag(CcFlag::C));
}

#[test]
fn test_abx_is_unsigned() {
    let sys = run_one(&[0x3A]);
    sys.set_reg(RegisterName::X, 0x1000);
    sys.set_reg(RegisterName::B, 0xFF); // +255, not -1
    assert_eq!(sys.run_instruction(), 3);
    assert_eq!(sys.regs().x, 0x10FF);
}

#[test]
fn test_nop_two_cycles() {
    let sys = run_one(&[0x12]);
    assert_eq!(sys.run_instruction(), 2);
    assert_eq!(sys.regs().pc, 0x1001);
}
