//! CPU execution engine.
//!
//! Implements the single-cycle fetch-decode-execute loop. Each call to
//! [`Cpu::step`] retires exactly one instruction or reports why it could not.

use crate::cpu::alu::{self, AluOp};
use crate::cpu::decode::{self, AccessWidth, BranchCondition, Instruction, Opcode};
use crate::cpu::memory::MemoryError;
use crate::cpu::program::{Program, ProgramError};
use crate::cpu::{Memory, Registers};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// The PC ran off the end of the loaded program.
    Halted,
    /// A fetch fell outside the instruction buffer.
    FetchFault,
    /// A load or store fell outside data memory.
    MemoryFault,
}

/// Whether a retired instruction did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// The instruction is implemented and was carried out.
    Applied,
    /// Unknown opcode, unmatched ALU combination, unimplemented branch
    /// condition or access width. Only the PC moved.
    NoOp,
}

/// Record of one retired instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executed {
    /// Address the instruction was fetched from.
    pub pc: u32,
    pub word: u32,
    pub instruction: Instruction,
    pub effect: Effect,
}

/// Why [`Cpu::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfProgram,
    CycleLimit,
    FetchFault,
    MemoryFault,
}

/// Outcome of [`Cpu::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Instructions retired during this run.
    pub cycles: u64,
    pub stop: StopReason,
    /// PC after the last retired instruction.
    pub pc: u32,
}

/// The RV32 subset CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Register file and program counter.
    pub regs: Registers,
    /// Data memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Retired instruction count.
    pub cycles: u64,
    /// Last retired instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU with zeroed registers and memory.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset the CPU to its initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Current program counter.
    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    /// Execute a single instruction fetched from `program`.
    ///
    /// On a fetch or memory bounds violation the instruction has no effect,
    /// the PC stays put and the CPU moves to a fault state; further calls
    /// return [`CpuError::NotRunning`].
    pub fn step(&mut self, program: &Program) -> Result<Executed, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch
        let pc = self.regs.pc;
        let word = match program.fetch(pc) {
            Ok(word) => word,
            Err(e) => {
                warn!(pc, "{}", e);
                self.state = CpuState::FetchFault;
                return Err(CpuError::Fetch(e));
            }
        };

        // Decode
        let instr = decode::decode(word);

        // Execute
        let (next_pc, effect) = match self.execute(pc, &instr) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(pc, "{}", e);
                self.state = CpuState::MemoryFault;
                return Err(e);
            }
        };

        self.regs.clear_zero();
        self.regs.jump(next_pc);

        self.cycles += 1;
        self.last_instr = Some(instr);
        debug!(pc = format_args!("{pc:#06x}"), ?effect, "{}", instr);

        Ok(Executed {
            pc,
            word,
            instruction: instr,
            effect,
        })
    }

    /// Run until the PC leaves the loaded program or a fault occurs.
    ///
    /// With `max_cycles` set, also stop once that many instructions have
    /// retired. Without it a program that never leaves its code never returns.
    pub fn run(&mut self, program: &Program, max_cycles: Option<u64>) -> RunSummary {
        let start_cycles = self.cycles;

        let stop = loop {
            match self.state {
                CpuState::Running => {}
                CpuState::Halted => break StopReason::EndOfProgram,
                CpuState::FetchFault => break StopReason::FetchFault,
                CpuState::MemoryFault => break StopReason::MemoryFault,
            }

            if self.regs.pc as usize >= program.len() {
                self.state = CpuState::Halted;
                break StopReason::EndOfProgram;
            }

            if max_cycles.is_some_and(|limit| self.cycles - start_cycles >= limit) {
                break StopReason::CycleLimit;
            }

            if let Err(e) = self.step(program) {
                debug!(%e, state = ?self.state, "step failed, stopping");
            }
        };

        let summary = RunSummary {
            cycles: self.cycles - start_cycles,
            stop,
            pc: self.regs.pc,
        };
        info!(cycles = summary.cycles, pc = summary.pc, stop = ?summary.stop, "run finished");
        summary
    }

    /// Execute a decoded instruction at `pc`.
    ///
    /// Returns the next PC. Nothing is written when an error is returned.
    fn execute(&mut self, pc: u32, instr: &Instruction) -> Result<(u32, Effect), CpuError> {
        let mut next_pc = pc.wrapping_add(4);

        let effect = match instr.opcode {
            Opcode::Lui => {
                self.regs.write(instr.rd, instr.imm);
                Effect::Applied
            }

            Opcode::Jal => {
                self.regs.write(instr.rd, pc.wrapping_add(4) as i32);
                next_pc = pc.wrapping_add(instr.imm as u32);
                Effect::Applied
            }

            Opcode::Branch => {
                let lhs = self.regs.read(instr.rs1);
                let rhs = self.regs.read(instr.rs2);
                match branch_taken(instr.branch_condition(), lhs, rhs) {
                    Some(true) => {
                        next_pc = pc.wrapping_add(instr.imm as u32);
                        Effect::Applied
                    }
                    Some(false) => Effect::Applied,
                    None => Effect::NoOp,
                }
            }

            Opcode::Load => {
                let addr = self.regs.read(instr.rs1).wrapping_add(instr.imm);
                self.mem.check(addr, 1)?;
                match instr.access_width() {
                    Some(AccessWidth::Byte) => {
                        let byte = self.mem.read_byte(addr)?;
                        self.regs.write(instr.rd, byte as i8 as i32);
                        Effect::Applied
                    }
                    Some(AccessWidth::Word) => {
                        let word = self.mem.read_word(addr)?;
                        self.regs.write(instr.rd, word as i32);
                        Effect::Applied
                    }
                    _ => Effect::NoOp,
                }
            }

            Opcode::Store => {
                let addr = self.regs.read(instr.rs1).wrapping_add(instr.imm);
                self.mem.check(addr, 1)?;
                let value = self.regs.read(instr.rs2);
                match instr.access_width() {
                    Some(AccessWidth::Byte) => {
                        self.mem.write_byte(addr, value as u8)?;
                        Effect::Applied
                    }
                    Some(AccessWidth::Word) => {
                        self.mem.write_word(addr, value as u32)?;
                        Effect::Applied
                    }
                    _ => Effect::NoOp,
                }
            }

            Opcode::Op | Opcode::OpImm | Opcode::Unknown(_) => {
                let op = AluOp::from_opcode(instr.opcode);
                let control = alu::select(op, instr.funct3, instr.funct7);
                let lhs = self.regs.read(instr.rs1);
                let rhs = match op {
                    AluOp::RType => self.regs.read(instr.rs2),
                    AluOp::IType | AluOp::None => instr.imm,
                };
                match alu::apply(control, lhs, rhs) {
                    Some(result) => {
                        self.regs.write(instr.rd, result);
                        Effect::Applied
                    }
                    None => Effect::NoOp,
                }
            }
        };

        Ok((next_pc, effect))
    }

    /// Get the last retired instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU ran off the end of its program.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

/// Evaluate a branch condition. `None` means the condition is not
/// implemented and the branch is treated as a no-op.
fn branch_taken(condition: Option<BranchCondition>, lhs: i32, rhs: i32) -> Option<bool> {
    match condition {
        Some(BranchCondition::Eq) => Some(lhs == rhs),
        Some(BranchCondition::Ne)
        | Some(BranchCondition::Lt)
        | Some(BranchCondition::Ge)
        | Some(BranchCondition::Ltu)
        | Some(BranchCondition::Geu)
        | None => None,
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("fetch error: {0}")]
    Fetch(#[from] ProgramError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode_b, encode_i, encode_j, encode_r, encode_s, encode_u};
    use crate::cpu::memory::MEMORY_SIZE;
    use crate::cpu::program::INSTRUCTION_MEMORY_SIZE;

    fn program(words: &[u32]) -> Program {
        Program::from_words(words).unwrap()
    }

    fn addi_like(funct3: u8, rd: u8, rs1: u8, imm: i32) -> u32 {
        encode_i(Opcode::OP_IMM, funct3, rd, rs1, imm)
    }

    #[test]
    fn test_lui_then_self_loop() {
        let prog = program(&[
            encode_u(Opcode::LUI, 10, 0x1000),
            encode_j(Opcode::JAL, 0, 0),
        ]);
        let mut cpu = Cpu::new();

        cpu.step(&prog).unwrap();
        assert_eq!(cpu.regs.read(10), 4096);
        assert_eq!(cpu.regs.read(0), 0);
        assert_eq!(cpu.pc(), 4);

        // jal x0, 0 stays put and never writes x0
        cpu.step(&prog).unwrap();
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.regs.read(0), 0);
    }

    #[test]
    fn test_jal_links_and_jumps() {
        let mut prog_words = vec![0u32; 8];
        // at 0x10: jal ra, -8
        prog_words[4] = encode_j(Opcode::JAL, 1, -8);
        // at 0x00: jal ra, 16
        prog_words[0] = encode_j(Opcode::JAL, 1, 16);
        let prog = program(&prog_words);
        let mut cpu = Cpu::new();

        cpu.step(&prog).unwrap();
        assert_eq!(cpu.regs.read(1), 4);
        assert_eq!(cpu.pc(), 16);

        cpu.step(&prog).unwrap();
        assert_eq!(cpu.regs.read(1), 20);
        assert_eq!(cpu.pc(), 8);
    }

    #[test]
    fn test_beq_taken_and_not_taken() {
        let prog = program(&[encode_b(Opcode::BRANCH, 0, 1, 2, 12)]);

        let mut cpu = Cpu::new();
        cpu.regs.write(1, -5);
        cpu.regs.write(2, -5);
        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.effect, Effect::Applied);
        assert_eq!(cpu.pc(), 12);

        let mut cpu = Cpu::new();
        cpu.regs.write(1, 5);
        cpu.regs.write(2, -5);
        cpu.step(&prog).unwrap();
        assert_eq!(cpu.pc(), 4);
    }

    #[test]
    fn test_unimplemented_branch_is_noop() {
        // bne x1, x2, 12 with unequal operands still falls through
        let prog = program(&[encode_b(Opcode::BRANCH, 1, 1, 2, 12)]);
        let mut cpu = Cpu::new();
        cpu.regs.write(1, 1);

        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.effect, Effect::NoOp);
        assert_eq!(cpu.pc(), 4);
    }

    #[test]
    fn test_store_and_load_signed_byte() {
        let prog = program(&[
            addi_like(6, 5, 0, 0x7F),                             // ori t0, zero, 0x7f
            encode_s(Opcode::STORE, AccessWidth::BYTE, 0, 5, 0),  // sb t0, 0(zero)
            encode_i(Opcode::LOAD, AccessWidth::BYTE, 10, 0, 0),  // lb a0, 0(zero)
            addi_like(6, 6, 0, 0xFF),                             // ori t1, zero, 0xff
            encode_s(Opcode::STORE, AccessWidth::BYTE, 0, 6, 1),  // sb t1, 1(zero)
            encode_i(Opcode::LOAD, AccessWidth::BYTE, 11, 0, 1),  // lb a1, 1(zero)
        ]);
        let mut cpu = Cpu::new();

        let summary = cpu.run(&prog, None);
        assert_eq!(summary.stop, StopReason::EndOfProgram);
        assert_eq!(cpu.regs.a0(), 127);
        assert_eq!(cpu.regs.a1(), -1);
    }

    #[test]
    fn test_word_store_load() {
        let prog = program(&[
            encode_u(Opcode::LUI, 5, 0x1234_5000),
            encode_s(Opcode::STORE, AccessWidth::WORD, 0, 5, 100),
            encode_i(Opcode::LOAD, AccessWidth::WORD, 10, 0, 100),
        ]);
        let mut cpu = Cpu::new();

        cpu.run(&prog, None);
        assert_eq!(cpu.regs.a0(), 0x1234_5000);
        assert_eq!(cpu.mem.dump(100, 4), &[0x00, 0x50, 0x34, 0x12]);
    }

    #[test]
    fn test_out_of_bounds_store_halts_run() {
        let prog = program(&[
            addi_like(6, 5, 0, 0x7FF),                            // ori t0, zero, 2047
            addi_like(6, 10, 0, 1),                               // ori a0, zero, 1
            encode_s(Opcode::STORE, AccessWidth::WORD, 5, 10, 2047), // sw a0, 2047(t0) -> 4094
            addi_like(6, 11, 0, 2),                               // never reached
        ]);
        let mut cpu = Cpu::new();

        let summary = cpu.run(&prog, None);
        assert_eq!(summary.stop, StopReason::MemoryFault);
        assert_eq!(summary.cycles, 2);
        assert_eq!(cpu.pc(), 8);
        assert_eq!(cpu.state, CpuState::MemoryFault);
        assert_eq!(cpu.regs.a1(), 0);
        assert!(cpu.mem.dump(0, MEMORY_SIZE).iter().all(|b| *b == 0));

        assert!(matches!(cpu.step(&prog), Err(CpuError::NotRunning(CpuState::MemoryFault))));
    }

    #[test]
    fn test_out_of_bounds_load_leaves_register() {
        // lw a0, -4(zero)
        let prog = program(&[encode_i(Opcode::LOAD, AccessWidth::WORD, 10, 0, -4)]);
        let mut cpu = Cpu::new();
        cpu.regs.write(10, 77);

        let err = cpu.step(&prog).unwrap_err();
        assert!(matches!(
            err,
            CpuError::Memory(MemoryError::OutOfBounds { addr: -4, width: 1 })
        ));
        assert_eq!(cpu.regs.a0(), 77);
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn test_unsupported_load_width_checks_address_first() {
        // lh a0, 0(zero) is in bounds but not implemented
        let prog = program(&[encode_i(Opcode::LOAD, AccessWidth::HALF, 10, 0, 0)]);
        let mut cpu = Cpu::new();
        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.effect, Effect::NoOp);

        // lh a0, -1(zero) is rejected before the width is looked at
        let prog = program(&[encode_i(Opcode::LOAD, AccessWidth::HALF, 10, 0, -1)]);
        let mut cpu = Cpu::new();
        assert!(cpu.step(&prog).is_err());
    }

    #[test]
    fn test_alu_ops() {
        let prog = program(&[
            addi_like(6, 1, 0, 12),                  // ori x1, x0, 12
            addi_like(6, 2, 0, 10),                  // ori x2, x0, 10
            encode_r(Opcode::OP, 0, 0, 3, 1, 2),     // add x3, x1, x2
            encode_r(Opcode::OP, 4, 0, 4, 1, 2),     // xor x4, x1, x2
            addi_like(6, 5, 0, -16),                 // ori x5, x0, -16
            addi_like(5, 6, 5, 0x400 | 2),           // srai x6, x5, 2
        ]);
        let mut cpu = Cpu::new();
        cpu.run(&prog, None);

        assert_eq!(cpu.regs.read(3), 22);
        assert_eq!(cpu.regs.read(4), 6);
        assert_eq!(cpu.regs.read(5), -16);
        assert_eq!(cpu.regs.read(6), -4);
    }

    #[test]
    fn test_unmatched_alu_is_noop() {
        // sub x3, x1, x2 is not in the ALU table
        let prog = program(&[encode_r(Opcode::OP, 0, 0x20, 3, 1, 2)]);
        let mut cpu = Cpu::new();
        cpu.regs.write(1, 9);
        cpu.regs.write(3, 42);

        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.effect, Effect::NoOp);
        assert_eq!(cpu.regs.read(3), 42);
        assert_eq!(cpu.pc(), 4);
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let prog = program(&[0x0000_0073]);
        let mut cpu = Cpu::new();
        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.instruction.opcode, Opcode::Unknown(0x73));
        assert_eq!(executed.effect, Effect::NoOp);
    }

    #[test]
    fn test_step_reports_raw_word_and_pc() {
        let prog = program(&[encode_u(Opcode::LUI, 10, 0x1000), 0x0000_0073]);
        let mut cpu = Cpu::new();
        cpu.step(&prog).unwrap();

        let executed = cpu.step(&prog).unwrap();
        assert_eq!(executed.pc, 4);
        assert_eq!(executed.word, 0x0000_0073);
        assert_eq!(executed.instruction, decode::decode(executed.word));
        assert_eq!(cpu.last_instruction(), Some(executed.instruction));
    }

    #[test]
    fn test_x0_stays_zero() {
        let prog = program(&[
            encode_u(Opcode::LUI, 0, 0x7FFF_F000),
            addi_like(6, 0, 0, -1),
            encode_i(Opcode::LOAD, AccessWidth::WORD, 0, 0, 0),
        ]);
        let mut cpu = Cpu::new();
        for _ in 0..3 {
            cpu.step(&prog).unwrap();
            assert_eq!(cpu.regs.read(0), 0);
        }
    }

    #[test]
    fn test_cycle_limit() {
        let prog = program(&[encode_j(Opcode::JAL, 0, 0)]);
        let mut cpu = Cpu::new();
        let summary = cpu.run(&prog, Some(25));
        assert_eq!(summary.stop, StopReason::CycleLimit);
        assert_eq!(summary.cycles, 25);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_empty_program_halts_immediately() {
        let mut cpu = Cpu::new();
        let summary = cpu.run(&Program::new(), None);
        assert_eq!(summary.stop, StopReason::EndOfProgram);
        assert_eq!(summary.cycles, 0);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_fetch_fault() {
        let prog = program(&[0]);
        let mut cpu = Cpu::new();
        cpu.regs.pc = 4094;
        assert!(matches!(cpu.step(&prog), Err(CpuError::Fetch(_))));
        assert_eq!(cpu.state, CpuState::FetchFault);
        assert_eq!(cpu.pc(), 4094);
    }

    #[test]
    fn test_run_stops_on_fetch_fault() {
        // a full buffer, so the jump target is still inside the program
        let mut words = vec![0u32; INSTRUCTION_MEMORY_SIZE / 4];
        words[0] = encode_j(Opcode::JAL, 0, 4094);
        let prog = program(&words);
        let mut cpu = Cpu::new();

        let summary = cpu.run(&prog, None);
        assert_eq!(summary.stop, StopReason::FetchFault);
        assert_eq!(summary.pc, 4094);
        assert_eq!(summary.cycles, 1);
        assert_eq!(cpu.state, CpuState::FetchFault);
    }

    #[test]
    fn test_run_without_limit_finishes_long_loop() {
        // counts a0 up to 0x4000 one at a time
        let prog = program(&[
            encode_i(Opcode::OP_IMM, 6, 11, 0, 1),
            encode_u(Opcode::LUI, 7, 0x4000),
            encode_b(Opcode::BRANCH, 0, 10, 7, 12),
            encode_r(Opcode::OP, 0, 0, 10, 10, 11),
            encode_j(Opcode::JAL, 0, -8),
        ]);
        let mut cpu = Cpu::new();

        let summary = cpu.run(&prog, None);
        assert_eq!(summary.stop, StopReason::EndOfProgram);
        assert_eq!((cpu.regs.a0(), cpu.regs.a1()), (16384, 1));
        assert_eq!(summary.cycles, 2 + 3 * 16384 + 1);
    }

    #[test]
    fn test_reset() {
        let prog = program(&[encode_u(Opcode::LUI, 10, 0x1000)]);
        let mut cpu = Cpu::new();
        cpu.run(&prog, None);
        assert!(cpu.is_halted());

        cpu.reset();
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.a0(), 0);
        assert_eq!(cpu.cycles, 0);
        assert!(cpu.last_instruction().is_none());
    }
}
