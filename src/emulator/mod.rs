/*!

  The emulator: a register file, four condition flags, and a flat memory,
  driven by a fetch/decode/execute loop that stops when it fetches the halt
  word. Decoding is delegated to `isa`; this module owns the semantics of
  every variant — flag updates, shifts, addressing modes, and the program
  counter discipline (branches mutate the PC themselves, everything else is
  advanced by the loop).

  `step_instruction` exposes exactly one cycle of the same loop so that a
  debugger can single-step and notice the halt, and the accessors below it
  expose the machine state for inspection windows.

*/

pub mod memory;
pub mod pstate;
pub mod registers;

use std::io::{self, Write};

use prettytable::{format as table_format, Table};

use crate::error::{Error, Result};
use crate::isa::{try_decode, Instruction, LogicOp, ShiftKind, WideOp, Word, HALT};

pub use memory::{Memory, MEMORY_SIZE};
pub use pstate::PState;
pub use registers::{RegisterFile, GENERAL_REGISTER_COUNT, ZERO_REGISTER};

lazy_static! {
  // Shared layout for the debugger's state tables.
  static ref TABLE_DISPLAY_FORMAT: table_format::TableFormat =
    table_format::FormatBuilder::new()
      .column_separator('│')
      .separators(
        &[table_format::LinePosition::Title],
        table_format::LineSeparator::new('─', '┼', '├', '┤'),
      )
      .padding(1, 1)
      .build();
}

/// Outcome of one fetch/decode/execute cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
  Continue,
  /// The halt word was fetched; nothing was executed.
  Halt,
}

pub struct Emulator {
  registers : RegisterFile,
  memory    : Memory,
  pstate    : PState,
}

impl Default for Emulator {
  fn default() -> Emulator {
    Emulator::new()
  }
}

impl Emulator {

  pub fn new() -> Emulator {
    Emulator {
      registers: RegisterFile::new(),
      memory:    Memory::new(),
      pstate:    PState::new(),
    }
  }

  // region Loading

  /// Loads a binary image at address 0, as read from disk.
  pub fn load_image(&mut self, image: &[u8]) -> Result<()> {
    self.memory.load_image(image)
  }

  /// Loads assembled words directly, bypassing the on-disk form. This is how
  /// a debugger composes the assembler's output straight into the machine.
  pub fn load_words(&mut self, words: &[Word]) -> Result<()> {
    for (index, &word) in words.iter().enumerate() {
      self.memory.store32(index as Word * 4, word)?;
    }
    Ok(())
  }

  // endregion

  // region Run loop

  /// Runs until the halt word is fetched.
  pub fn run(&mut self) -> Result<()> {
    loop {
      if self.step_instruction()? == Step::Halt {
        return Ok(());
      }
    }
  }

  /**
    One cycle: fetch at PC, stop if the halt word, otherwise decode, execute,
    and advance the PC past any non-branch instruction. The PC is left
    pointing at the halt word when `Step::Halt` is returned, so the final
    dump shows its address.
  */
  pub fn step_instruction(&mut self) -> Result<Step> {
    let pc   = self.registers.pc();
    let word = self.memory.load32(pc as Word)?;

    if word == HALT {
      return Ok(Step::Halt);
    }

    let instruction =
      try_decode(word).ok_or(Error::UnknownInstruction { word, pc })?;

    #[cfg(feature = "trace_execution")]
    println!("FETCH: 0x{:08x} | PC: 0x{:06x} | {}", word, pc, instruction);

    self.execute(&instruction)?;

    if !instruction.is_branch() {
      self.registers.advance_pc();
    }

    #[cfg(feature = "trace_execution")]
    println!("       PSTATE: {}", self.pstate);

    Ok(Step::Continue)
  }

  // endregion

  // region Execution

  fn execute(&mut self, instruction: &Instruction) -> Result<()> {
    use Instruction::*;

    match *instruction {

      ImmArith { sf, set_flags, subtract, sh, imm12, rn, rd } => {
        let op2 = (imm12 as u64) << if sh { 12 } else { 0 };
        match sf {
          true => {
            let a = self.registers.read64(rn)?;
            let result = self.arithmetic64(a, op2, subtract, set_flags);
            self.registers.write(rd, result)
          }
          false => {
            let a = self.registers.read32(rn)?;
            let result = self.arithmetic32(a, op2 as u32, subtract, set_flags);
            self.registers.write(rd, result as u64)
          }
        }
      }

      RegArith { sf, set_flags, subtract, shift, rm, amount, rn, rd } => match sf {
        true => {
          let op2 = apply_shift64(self.registers.read64(rm)?, shift, amount);
          let a = self.registers.read64(rn)?;
          let result = self.arithmetic64(a, op2, subtract, set_flags);
          self.registers.write(rd, result)
        }
        false => {
          let op2 = apply_shift32(self.registers.read32(rm)?, shift, amount);
          let a = self.registers.read32(rn)?;
          let result = self.arithmetic32(a, op2, subtract, set_flags);
          self.registers.write(rd, result as u64)
        }
      },

      RegLogic { sf, op, negate, shift, rm, amount, rn, rd } => match sf {
        true => {
          let mut op2 = apply_shift64(self.registers.read64(rm)?, shift, amount);
          if negate {
            op2 = !op2;
          }
          let a = self.registers.read64(rn)?;
          let result = match op {
            LogicOp::And | LogicOp::Ands => a & op2,
            LogicOp::Orr                 => a | op2,
            LogicOp::Eor                 => a ^ op2,
          };
          if op == LogicOp::Ands {
            self.pstate = PState {
              negative: (result as i64) < 0,
              zero:     result == 0,
              carry:    false,
              overflow: false,
            };
          }
          self.registers.write(rd, result)
        }
        false => {
          let mut op2 = apply_shift32(self.registers.read32(rm)?, shift, amount);
          if negate {
            op2 = !op2;
          }
          let a = self.registers.read32(rn)?;
          let result = match op {
            LogicOp::And | LogicOp::Ands => a & op2,
            LogicOp::Orr                 => a | op2,
            LogicOp::Eor                 => a ^ op2,
          };
          if op == LogicOp::Ands {
            self.pstate = PState {
              negative: (result as i32) < 0,
              zero:     result == 0,
              carry:    false,
              overflow: false,
            };
          }
          self.registers.write(rd, result as u64)
        }
      },

      RegMultiply { sf, subtract, rm, ra, rn, rd } => match sf {
        true => {
          let product = self.registers.read64(rn)?.wrapping_mul(self.registers.read64(rm)?);
          let accumulator = self.registers.read64(ra)?;
          let result = match subtract {
            true  => accumulator.wrapping_sub(product),
            false => accumulator.wrapping_add(product),
          };
          self.registers.write(rd, result)
        }
        false => {
          let product = self.registers.read32(rn)?.wrapping_mul(self.registers.read32(rm)?);
          let accumulator = self.registers.read32(ra)?;
          let result = match subtract {
            true  => accumulator.wrapping_sub(product),
            false => accumulator.wrapping_add(product),
          };
          self.registers.write(rd, result as u64)
        }
      },

      ImmWide { sf, op, hw, imm16, rd } => {
        let position = 16 * hw as u32;
        let value = match op {
          WideOp::Movz => (imm16 as u64) << position,
          WideOp::Movn => !((imm16 as u64) << position),
          WideOp::Movk => {
            // Patch the selected 16 bits, leave the rest of rd alone.
            let current = self.registers.read64(rd)?;
            (current & !(0xFFFFu64 << position)) | ((imm16 as u64) << position)
          }
        };
        let value = match sf {
          true  => value,
          false => value & 0xFFFF_FFFF,
        };
        self.registers.write(rd, value)
      }

      DtImmOffset { sf, load, imm12, xn, rt } => {
        let scale: u64 = if sf { 8 } else { 4 };
        let address =
          self.registers.read64(xn)?.wrapping_add(imm12 as u64 * scale) as Word;
        self.transfer(sf, load, address, rt)
      }

      DtRegOffset { sf, load, xm, xn, rt } => {
        let address =
          self.registers.read64(xn)?.wrapping_add(self.registers.read64(xm)?) as Word;
        self.transfer(sf, load, address, rt)
      }

      DtLoadLiteral { sf, simm19, rt } => {
        let address =
          self.registers.pc().wrapping_add((simm19 as i64 * 4) as u64) as Word;
        self.transfer(sf, true, address, rt)
      }

      DtIndexed { sf, load, pre, simm9, xn, rt } => {
        let base   = self.registers.read64(xn)?;
        let offset = simm9 as i64 as u64;
        match pre {
          true => {
            // Write-back happens before the access.
            let address = base.wrapping_add(offset) as Word;
            self.registers.write(xn, address as u64)?;
            self.transfer(sf, load, address, rt)
          }
          false => {
            let address = base as Word;
            self.transfer(sf, load, address, rt)?;
            self.registers.write(xn, (address as u64).wrapping_add(offset))
          }
        }
      }

      BranchUncond { simm26 } => {
        self.registers.add_pc_offset(simm26 as i64 * 4);
        Ok(())
      }

      BranchCond { cond, simm19 } => {
        match self.pstate.satisfies(cond) {
          true  => self.registers.add_pc_offset(simm19 as i64 * 4),
          false => self.registers.advance_pc(),
        }
        Ok(())
      }

      BranchReg { xn } => {
        let target = self.registers.read64(xn)?;
        self.registers.set_pc(target);
        Ok(())
      }
    }
  }

  fn arithmetic64(&mut self, a: u64, b: u64, subtract: bool, set_flags: bool) -> u64 {
    let result = match subtract {
      true  => a.wrapping_sub(b),
      false => a.wrapping_add(b),
    };
    if set_flags {
      self.pstate.negative = (result as i64) < 0;
      self.pstate.zero     = result == 0;
      // Subtraction carries when no borrow occurs.
      self.pstate.carry = match subtract {
        true  => a >= b,
        false => a.overflowing_add(b).1,
      };
      self.pstate.overflow = match subtract {
        true  => (a as i64).overflowing_sub(b as i64).1,
        false => (a as i64).overflowing_add(b as i64).1,
      };
    }
    result
  }

  fn arithmetic32(&mut self, a: u32, b: u32, subtract: bool, set_flags: bool) -> u32 {
    let result = match subtract {
      true  => a.wrapping_sub(b),
      false => a.wrapping_add(b),
    };
    if set_flags {
      self.pstate.negative = (result as i32) < 0;
      self.pstate.zero     = result == 0;
      self.pstate.carry = match subtract {
        true  => a >= b,
        false => a.overflowing_add(b).1,
      };
      self.pstate.overflow = match subtract {
        true  => (a as i32).overflowing_sub(b as i32).1,
        false => (a as i32).overflowing_add(b as i32).1,
      };
    }
    result
  }

  /// One memory access at the width selected by `sf`. Loads zero-extend into
  /// `rt`; stores take the low half of `rt` in 32-bit mode.
  fn transfer(&mut self, sf: bool, load: bool, address: Word, rt: u8) -> Result<()> {
    match (sf, load) {
      (true, true) => {
        let value = self.memory.load64(address)?;
        self.registers.write(rt, value)
      }
      (true, false) => self.memory.store64(address, self.registers.read64(rt)?),
      (false, true) => {
        let value = self.memory.load32(address)?;
        self.registers.write(rt, value as u64)
      }
      (false, false) => self.memory.store32(address, self.registers.read32(rt)?),
    }
  }

  // endregion

  // region State access and display

  pub fn registers(&self) -> &RegisterFile {
    &self.registers
  }

  pub fn registers_mut(&mut self) -> &mut RegisterFile {
    &mut self.registers
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  pub fn pstate(&self) -> PState {
    self.pstate
  }

  /**
    The final state dump: registers, PSTATE, then every non-zero memory
    word. The format is compared textually by the test suite.
  */
  pub fn write_state<W: Write>(&self, out: &mut W) -> io::Result<()> {
    self.registers.write_registers(out)?;
    writeln!(out, "PSTATE : {}", self.pstate)?;
    self.memory.write_nonzero(out)
  }

  /// The register file, PC and PSTATE as a display table for a debugger's
  /// state window.
  pub fn register_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for index in 0..GENERAL_REGISTER_COUNT as u8 {
      let value = self.registers.read64(index).unwrap_or(0);
      table.add_row(row![r->format!("X{:02} =", index), format!("{:016x}", value)]);
    }
    table.add_row(row![r->"PC =", format!("{:016x}", self.registers.pc())]);
    table.add_row(row![r->"PSTATE =", format!("{}", self.pstate)]);
    table
  }

  // endregion
}

fn apply_shift64(operand: u64, shift: ShiftKind, amount: u8) -> u64 {
  let amount = amount as u32;
  match shift {
    ShiftKind::Lsl => operand.wrapping_shl(amount),
    ShiftKind::Lsr => operand.wrapping_shr(amount),
    // Signed-domain shift preserves the sign bit.
    ShiftKind::Asr => ((operand as i64).wrapping_shr(amount)) as u64,
    ShiftKind::Ror => operand.rotate_right(amount % 64),
  }
}

fn apply_shift32(operand: u32, shift: ShiftKind, amount: u8) -> u32 {
  let amount = amount as u32;
  match shift {
    ShiftKind::Lsl => operand.wrapping_shl(amount),
    ShiftKind::Lsr => operand.wrapping_shr(amount),
    ShiftKind::Asr => ((operand as i32).wrapping_shr(amount)) as u32,
    ShiftKind::Ror => operand.rotate_right(amount % 32),
  }
}
