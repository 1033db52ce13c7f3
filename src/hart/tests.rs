use proptest::prelude::*;
use rstest::rstest;

use super::*;
use crate::encode::{btype_named, itype, itype_named, rstype};

/// Hart with the default configuration running the given program
/// from address 0
fn boot(program: &[u32]) -> Hart {
    Hart::new(&HartConfig::default(), &BootImage::from_words(program)).unwrap()
}

/// Program followed by a data area. The data words start at 0x40.
fn with_data(program: &[u32], data: &[u32]) -> Vec<u32> {
    let mut words = program.to_vec();
    assert!(words.len() <= 16, "program overlaps the data area");
    words.resize(16, 0);
    words.extend_from_slice(data);
    words
}

#[test]
fn check_two_addis() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x1, x0, 3), addi!(x2, x1, 5)]);
    let fault = hart.run(1000).unwrap();
    assert_eq!(fault, Fault::IllegalInstruction { insn: 0 });
    assert_eq!(hart.x(1), 3);
    assert_eq!(hart.x(2), 8);
    assert_eq!(hart.written(), vec![1, 2]);
    assert_eq!(hart.pc(), 8);
    assert_eq!(hart.retired(), 2);
    Ok(())
}

#[test]
fn check_addi_takes_seven_steps() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x1, x0, 3)]);
    assert_eq!(hart.step(), Status::Running);
    assert_eq!(hart.state(), State::FetchWait);
    assert_eq!(hart.step_instruction(), Status::Running);
    assert_eq!(hart.state(), State::FetchRequest);
    assert_eq!(hart.cycles(), 7);
    assert_eq!(hart.retired(), 1);
    assert_eq!(hart.x(1), 3);
    Ok(())
}

#[test]
fn check_write_back_visible_next_step() -> Result<(), &'static str> {
    let mut hart = boot(&[lui!(x3, 0x12345)]);
    while hart.state() != State::Decode {
        hart.step();
    }
    hart.step();
    // The write scheduled by decode has landed by the next fetch
    assert_eq!(hart.state(), State::FetchRequest);
    assert_eq!(hart.x(3), 0x1234_5000);
    Ok(())
}

#[rstest]
#[case(0x0000_0000)]
#[case(0xffff_ffff)]
#[case(0x1234_0000)]
fn check_blank_word_is_illegal(#[case] word: u32) {
    let mut hart = boot(&[word]);
    assert_eq!(
        hart.run(100),
        Ok(Fault::IllegalInstruction { insn: word })
    );
    assert_eq!(hart.fault_code(), FaultCode::IllegalInstruction);
    assert_eq!(hart.fault_instruction(), word);
    assert_eq!(hart.pc(), 0);
}

#[rstest]
#[case::slli_with_funct7(itype(0x400 | 1, 1, FUNCT3_SLLI, 1, OP_IMM))]
#[case::srli_with_odd_funct7(itype(0x020 | 1, 1, FUNCT3_SRLI, 1, OP_IMM))]
#[case::mul(rstype(1, 2, 1, FUNCT3_ADD, 3, OP))]
#[case::xor_with_sub_funct7(rstype(FUNCT7_SUB, 2, 1, FUNCT3_XOR, 3, OP))]
#[case::ld(itype(0, 0, 0b011, 1, OP_LOAD))]
#[case::lwu(itype(0, 0, 0b110, 1, OP_LOAD))]
#[case::sd(rstype(0, 1, 0, 0b011, 0, OP_STORE))]
#[case::branch_funct3_2(rstype(0, 0, 0, 0b010, 0, OP_BRANCH))]
#[case::csrrw(itype(0x300, 1, 0b001, 0, OP_SYSTEM))]
#[case::system_imm_2(itype(2, 0, FUNCT3_PRIV, 0, OP_SYSTEM))]
#[case::fence_i(itype(0, 0, 0b001, 0, OP_MISC_MEM))]
#[case::addw(rstype(0, 2, 1, 0, 3, 0b0111011))]
#[case::compressed(0x0000_4501)]
fn check_illegal_instruction(#[case] word: u32) {
    let mut hart = boot(&[word]);
    assert_eq!(
        hart.run(100),
        Ok(Fault::IllegalInstruction { insn: word })
    );
    assert_eq!(hart.pc(), 0);
    assert!(hart.written().is_empty());
}

#[test]
fn check_misaligned_jalr_faults_when_resolved() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x5, x0, 6), jalr!(ra, x5, 0)]);
    hart.step_instruction();
    while !matches!(hart.state(), State::JalrResolve(_)) {
        assert_eq!(hart.step(), Status::Running);
    }
    assert_eq!(
        hart.step(),
        Status::Faulted(Fault::PcMisaligned { target: 6 })
    );
    assert_eq!(hart.fault_code(), FaultCode::PcMisaligned);
    assert_eq!(hart.fault_instruction(), 0);
    // pc stays on the jump and the link register is not written
    assert_eq!(hart.pc(), 4);
    assert_eq!(hart.x(1), 0xffff_ffff);
    Ok(())
}

#[test]
fn check_jalr_clears_bit_zero() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x5, x0, 9), jalr!(ra, x5, 3), 0, addi!(x6, x0, 1)]);
    let fault = hart.run(1000).unwrap();
    // (9 + 3) & !1 = 12
    assert_eq!(fault, Fault::IllegalInstruction { insn: 0 });
    assert_eq!(hart.x(1), 8);
    assert_eq!(hart.x(6), 1);
    assert_eq!(hart.pc(), 16);
    Ok(())
}

#[test]
fn check_ret_from_entry_faults() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(a0, zero, 1), jalr!(zero, ra, 0)]);
    assert_eq!(
        hart.run(1000),
        Ok(Fault::PcMisaligned {
            target: 0xffff_fffe
        })
    );
    assert_eq!(hart.x(10), 1);
    Ok(())
}

#[test]
fn check_jal_links_and_jumps() -> Result<(), &'static str> {
    let mut hart = boot(&[jal!(ra, 8), 0, addi!(x5, x0, 1)]);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(1), 4);
    assert_eq!(hart.x(5), 1);
    assert_eq!(hart.pc(), 12);
    Ok(())
}

#[test]
fn check_misaligned_jal_faults() -> Result<(), &'static str> {
    let mut hart = boot(&[jal!(ra, 6)]);
    assert_eq!(hart.run(1000), Ok(Fault::PcMisaligned { target: 6 }));
    assert_eq!(hart.pc(), 0);
    assert!(hart.written().is_empty());
    Ok(())
}

#[test]
fn check_branch_loop() -> Result<(), &'static str> {
    let mut hart = boot(&[
        addi!(x1, x0, 0),
        addi!(x2, x0, 5),
        addi!(x1, x1, 1),
        bne!(x1, x2, -4),
        addi!(x3, x0, 7),
    ]);
    assert_eq!(hart.run(10_000), Ok(Fault::IllegalInstruction { insn: 0 }));
    assert_eq!(hart.x(1), 5);
    assert_eq!(hart.x(3), 7);
    assert_eq!(hart.pc(), 20);
    Ok(())
}

#[rstest]
#[case::beq(FUNCT3_BEQ, 1, 1, true)]
#[case::bne(FUNCT3_BNE, 1, 1, false)]
#[case::blt(FUNCT3_BLT, 0xffff_ffff, 0, true)]
#[case::bltu(FUNCT3_BLTU, 0xffff_ffff, 0, false)]
#[case::bge(FUNCT3_BGE, 0, 0xffff_ffff, true)]
#[case::bgeu(FUNCT3_BGEU, 0, 0xffff_ffff, false)]
fn check_branch_conditions(
    #[case] funct3: u32,
    #[case] a: u32,
    #[case] b: u32,
    #[case] taken: bool,
) {
    let branch = btype_named("x1", "x2", 8, funct3).unwrap();
    let config = HartConfig::default().reg(1, a).reg(2, b);
    let mut hart = Hart::new(&config, &BootImage::from_words(&[branch])).unwrap();
    hart.step_instruction();
    assert_eq!(hart.pc(), if taken { 8 } else { 4 });
}

#[test]
fn check_taken_misaligned_branch_faults() -> Result<(), &'static str> {
    let mut hart = boot(&[beq!(x0, x0, 6)]);
    assert_eq!(hart.run(1000), Ok(Fault::PcMisaligned { target: 6 }));
    assert_eq!(hart.pc(), 0);
    Ok(())
}

#[test]
fn check_untaken_misaligned_branch_falls_through() -> Result<(), &'static str> {
    let mut hart = boot(&[bne!(x0, x0, 6)]);
    assert_eq!(hart.run(1000), Ok(Fault::IllegalInstruction { insn: 0 }));
    assert_eq!(hart.pc(), 4);
    Ok(())
}

#[test]
fn check_lui_and_auipc() -> Result<(), &'static str> {
    let mut hart = boot(&[lui!(x5, 0xfffff), addi!(x0, x0, 0), auipc!(x6, 1)]);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(5), 0xffff_f000);
    assert_eq!(hart.x(6), 0x1008);
    Ok(())
}

#[test]
fn check_alu_program() -> Result<(), &'static str> {
    let mut hart = boot(&[
        addi!(x1, x0, -8),
        srai!(x2, x1, 1),
        srli!(x3, x1, 28),
        slli!(x4, x1, 4),
        sltiu!(x5, x1, 1),
        slti!(x6, x1, 1),
        xori!(x7, x1, -1),
        ori!(x8, x0, 0x0f0),
        andi!(x9, x8, 0x03c),
        sub!(x10, x0, x1),
        sra!(x11, x1, x10),
        sltu!(x12, x0, x1),
        and!(x13, x8, x1),
        or!(x14, x9, x10),
        xor!(x15, x14, x8),
        sll!(x16, x10, x10),
        srl!(x17, x1, x10),
        slt!(x18, x1, x0),
        add!(x19, x1, x10),
    ]);
    hart.run(10_000).unwrap();
    let expected: [(u8, u32); 19] = [
        (1, 0xffff_fff8),
        (2, 0xffff_fffc),
        (3, 0xf),
        (4, 0xffff_ff80),
        (5, 0),
        (6, 1),
        (7, 7),
        (8, 0xf0),
        (9, 0x30),
        (10, 8),
        (11, 0xffff_ffff),
        (12, 1),
        (13, 0xf0),
        (14, 0x38),
        (15, 0xc8),
        (16, 0x800),
        (17, 0x00ff_ffff),
        (18, 1),
        (19, 0),
    ];
    for (reg, value) in expected {
        assert_eq!(hart.x(reg), value, "x{reg}");
    }
    Ok(())
}

#[test]
fn check_x0_writes_discarded() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x0, x0, 5), lui!(zero, 1), jal!(zero, 4)]);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(0), 0);
    assert!(hart.written().is_empty());
    Ok(())
}

#[test]
fn check_loads_extend() -> Result<(), &'static str> {
    let program = with_data(
        &[
            lw!(x1, x0, 0x40),
            lh!(x2, x0, 0x40),
            lhu!(x3, x0, 0x40),
            lb!(x4, x0, 0x40),
            lbu!(x5, x0, 0x40),
            lb!(x6, x0, 0x41),
            lh!(x7, x0, 0x41),
            lw!(x8, x0, 0x41),
            lw!(x9, x0, 0x43),
        ],
        &[0x8001_80ff, 0x4433_2211],
    );
    let mut hart = boot(&program);
    hart.run(10_000).unwrap();
    assert_eq!(hart.x(1), 0x8001_80ff);
    assert_eq!(hart.x(2), 0xffff_80ff);
    assert_eq!(hart.x(3), 0x80ff);
    assert_eq!(hart.x(4), 0xffff_ffff);
    assert_eq!(hart.x(5), 0xff);
    assert_eq!(hart.x(6), 0xffff_ff80);
    assert_eq!(hart.x(7), 0x0180);
    assert_eq!(hart.x(8), 0x1180_0180);
    assert_eq!(hart.x(9), 0x3322_1180);
    Ok(())
}

#[test]
fn check_stores_any_alignment() -> Result<(), &'static str> {
    let mut hart = boot(&[
        lui!(a1, 0x12345),
        addi!(a1, a1, 0x678),
        sw!(a1, zero, 0x81),
        lw!(a2, zero, 0x81),
        sh!(a1, zero, 0x87),
        lhu!(a3, zero, 0x87),
        sb!(a1, zero, 0x8b),
        lbu!(a4, zero, 0x8b),
    ]);
    hart.run(10_000).unwrap();
    assert_eq!(hart.x(12), 0x1234_5678);
    assert_eq!(hart.x(13), 0x5678);
    assert_eq!(hart.x(14), 0x78);
    let memory = hart.memory();
    assert_eq!(memory.read_byte(0x80), 0);
    assert_eq!(memory.read_byte(0x81), 0x78);
    assert_eq!(memory.read_byte(0x84), 0x12);
    assert_eq!(memory.read_byte(0x85), 0);
    assert_eq!(memory.read_byte(0x87), 0x78);
    assert_eq!(memory.read_byte(0x88), 0x56);
    assert_eq!(memory.read_byte(0x8b), 0x78);
    assert_eq!(memory.read_byte(0x8c), 0);
    Ok(())
}

#[test]
fn check_store_lands_before_next_fetch() -> Result<(), &'static str> {
    let patch = addi!(x7, x0, 9);
    let mut hart = boot(&[
        lui!(a1, (patch >> 12) as i32),
        addi!(a1, a1, (patch & 0xfff) as i32),
        sw!(a1, zero, 16),
        addi!(x0, x0, 0),
        0,
    ]);
    assert_eq!(hart.run(10_000), Ok(Fault::IllegalInstruction { insn: 0 }));
    assert_eq!(hart.x(7), 9);
    assert_eq!(hart.pc(), 20);
    Ok(())
}

#[test]
fn check_ecall_and_ebreak_markers() -> Result<(), &'static str> {
    let mut hart = boot(&[ecall!()]);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(1), ECALL_SENTINEL);

    let mut hart = boot(&[fence!(), ebreak!()]);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(1), EBREAK_SENTINEL);
    Ok(())
}

#[test]
fn check_uart_output() -> Result<(), &'static str> {
    let mut hart = boot(&[
        lui!(a0, 0x10),
        addi!(a1, zero, 'h' as i32),
        sb!(a1, a0, 0),
        addi!(a1, zero, 'i' as i32),
        sb!(a1, a0, 0),
    ]);
    hart.run(10_000).unwrap();
    assert_eq!(hart.uart_mut().flush_string(), "hi");
    Ok(())
}

#[test]
fn check_uart_echo() -> Result<(), &'static str> {
    let program = [
        lui!(a0, 0x10),
        lbu!(a1, a0, 0),
        beq!(a1, zero, 12),
        sb!(a1, a0, 0),
        jal!(zero, -12),
    ];
    let mut hart = Hart::with_uart(
        &HartConfig::default(),
        &BootImage::from_words(&program),
        BufferedUart::with_input(b"echo"),
    )
    .unwrap();
    assert_eq!(hart.run(10_000), Ok(Fault::IllegalInstruction { insn: 0 }));
    assert_eq!(hart.uart_mut().flush_string(), "echo");
    assert_eq!(hart.pc(), 20);
    Ok(())
}

#[test]
fn check_faulted_is_terminal() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x5, x0, 7), sw!(x5, zero, 0x40), 0]);
    let fault = hart.run(1000).unwrap();
    let pc = hart.pc();
    let registers = hart.registers().clone();
    let memory = hart.memory().clone();
    let cycles = hart.cycles();
    for _ in 0..50 {
        assert_eq!(hart.step(), Status::Faulted(fault));
    }
    assert_eq!(hart.pc(), pc);
    assert_eq!(hart.registers(), &registers);
    assert_eq!(hart.memory(), &memory);
    assert_eq!(hart.cycles(), cycles);
    assert_eq!(hart.state(), State::Faulted);
    Ok(())
}

#[test]
fn check_reset_restarts_from_zero() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x5, x5, 7), sw!(x5, zero, 0x40), 0]);
    hart.run(1000).unwrap();
    hart.reset();
    assert_eq!(hart.status(), Status::Running);
    assert_eq!(hart.fault_code(), FaultCode::Unset);
    assert_eq!(hart.fault_instruction(), 0);
    assert_eq!(hart.pc(), 0);
    assert_eq!(hart.state(), State::FetchRequest);
    assert_eq!(hart.cycles(), 0);
    // Registers and memory are storage and survive reset
    assert_eq!(hart.x(5), 7);
    assert!(hart.written().is_empty());
    assert_eq!(hart.memory().read_byte(0x40), 7);
    hart.run(1000).unwrap();
    assert_eq!(hart.x(5), 14);
    Ok(())
}

#[test]
fn check_run_cycle_limit() -> Result<(), &'static str> {
    let mut hart = boot(&[jal!(zero, 0)]);
    assert_eq!(hart.run(500), Err(RunError::CycleLimit(500)));
    assert_eq!(hart.status(), Status::Running);
    assert_eq!(hart.cycles(), 500);
    Ok(())
}

#[test]
fn check_construction_errors() {
    let image = BootImage::from_words(&[0; 8]);
    assert!(matches!(
        Hart::new(&HartConfig::default().memory_bytes(3), &image),
        Err(HartError::Config(ConfigError::OddMemory(3)))
    ));
    assert!(matches!(
        Hart::new(&HartConfig::default().memory_bytes(16), &image),
        Err(HartError::Image(ImageError::TooLarge { .. }))
    ));
}

#[test]
fn check_default_stack_pointer() {
    let hart = Hart::new(
        &HartConfig::default().memory_bytes(1024),
        &BootImage::default(),
    )
    .unwrap();
    assert_eq!(hart.x(2), 1024);
    assert_eq!(hart.x(1), 0xffff_ffff);
}

#[test]
fn check_display() -> Result<(), &'static str> {
    let mut hart = boot(&[addi!(x1, x0, 3)]);
    hart.run(1000).unwrap();
    let text = hart.to_string();
    assert!(text.contains("state: FAULTED"));
    assert!(text.contains("ILLEGAL_INSTRUCTION"));
    assert!(text.contains("x1: 0x00000003"));
    Ok(())
}

proptest! {
    #[test]
    fn invariants_hold_for_arbitrary_programs(
        words in prop::collection::vec(any::<u32>(), 1..32),
    ) {
        let config = HartConfig::default().memory_bytes(256);
        let mut hart = Hart::new(&config, &BootImage::from_words(&words)).unwrap();
        let mut faulted = None;
        for _ in 0..2000 {
            let status = hart.step();
            prop_assert_eq!(hart.x(0), 0);
            match status {
                Status::Running => prop_assert_eq!(hart.pc() % 4, 0),
                Status::Faulted(fault) => {
                    faulted = Some(fault);
                    break;
                }
            }
        }
        if let Some(fault) = faulted {
            let pc = hart.pc();
            let registers = hart.registers().clone();
            let memory = hart.memory().clone();
            for _ in 0..10 {
                prop_assert_eq!(hart.step(), Status::Faulted(fault));
            }
            prop_assert_eq!(hart.pc(), pc);
            prop_assert_eq!(hart.registers(), &registers);
            prop_assert_eq!(hart.memory(), &memory);
        }
    }

    #[test]
    fn addi_chain_sums(imms in prop::collection::vec(-2048i32..2048, 1..12)) {
        let program: Vec<u32> = imms
            .iter()
            .map(|&imm| itype_named("x5", "x5", imm, FUNCT3_ADDI, OP_IMM))
            .collect::<Result<_, _>>()
            .unwrap();
        let mut hart = boot(&program);
        prop_assert_eq!(hart.run(10_000), Ok(Fault::IllegalInstruction { insn: 0 }));
        let sum = imms.iter().fold(0u32, |acc, &imm| acc.wrapping_add(imm as u32));
        prop_assert_eq!(hart.x(5), sum);
        prop_assert_eq!(hart.retired(), imms.len() as u64);
    }
}
