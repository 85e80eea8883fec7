/*!

  The assembler back-end: feeds each source line through the grammar in
  `parser`, rewrites aliases, and encodes one machine word per statement,
  consulting (and mutating) the symbol table for label displacements. Label
  references may point forward; `SymbolTable::define` rewrites the affected
  words in place once the definition arrives, and `finish` rejects anything
  still unresolved.

  Alongside the words the assembler keeps an address ↔ source-line map, which
  is how a debugger front-end ties the program counter back to the line being
  executed and turns a line breakpoint into an address.

*/

pub(crate) mod aliases;
pub mod parser;

use std::str::FromStr;

use bimap::BiMap;
use either::Either;
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::error::{Error, Result};
use crate::isa::{
  Condition, Instruction, LogicOp, ShiftKind, WideOp, Word, INSTRUCTION_SIZE,
};
use crate::symboltable::SymbolTable;

use parser::{Line, MemOperand, Operand, Register};

/// Every canonical and alias mnemonic the assembler accepts. `b.<cond>` is
/// recognised before this lookup, so the condition suffixes never appear
/// here.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString,
  Clone,        Copy,          Eq,         PartialEq, Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Mnemonic {
  Add, Adds, Sub, Subs,
  Neg, Negs, Cmp, Cmn,
  Madd, Msub, Mul, Mneg,
  And, Ands, Bic, Bics,
  Eor, Eon, Orr, Orn,
  Tst, Mvn, Mov,
  Movn, Movz, Movk,
  Ldr, Str,
  B, Br,
}

pub struct Assembler {
  instructions    : Vec<Word>,
  symbols         : SymbolTable,
  // Emit address ↔ 1-based source line, for the debugger.
  line_map        : BiMap<Word, u32>,
  current_address : Word,
}

impl Default for Assembler {
  fn default() -> Assembler {
    Assembler::new()
  }
}

impl Assembler {

  pub fn new() -> Assembler {
    Assembler {
      instructions:    Vec::new(),
      symbols:         SymbolTable::new(),
      line_map:        BiMap::new(),
      current_address: 0,
    }
  }

  /// Assembles a whole source text in one pass over its lines.
  pub fn assemble_source(source: &str) -> Result<Vec<Word>> {
    let mut assembler = Assembler::new();
    for (index, line) in source.lines().enumerate() {
      assembler.assemble_line(line, index as u32 + 1)?;
    }
    assembler.finish()
  }

  /**
    Assembles one source line. Statements emit exactly one word at the
    current address and record the address against `line_number`; label
    definitions and blank lines emit nothing.
  */
  pub fn assemble_line(&mut self, source: &str, line_number: u32) -> Result<()> {
    let line = parser::parse_line(source).ok_or_else(|| Error::MalformedLine {
      line: line_number,
      text: source.trim().to_string(),
    })?;

    match line {

      Line::Blank => Ok(()),

      Line::Label(name) => {
        self.symbols.define(&mut self.instructions, self.current_address, name)
      }

      Line::Statement { mnemonic, operands } => {
        let word = self.encode_statement(&mnemonic, operands, line_number)?;
        self.line_map.insert(self.current_address, line_number);
        self.instructions.push(word);
        self.current_address += INSTRUCTION_SIZE;
        Ok(())
      }
    }
  }

  /// Validates that every referenced label was defined and yields the words.
  pub fn finish(self) -> Result<Vec<Word>> {
    let unresolved = self.symbols.unresolved();
    match unresolved.is_empty() {
      true  => Ok(self.instructions),
      false => Err(Error::UnresolvedLabels { labels: unresolved }),
    }
  }

  /// The words emitted so far, in emission order.
  pub fn instructions(&self) -> &[Word] {
    &self.instructions
  }

  pub fn line_for_address(&self, address: Word) -> Option<u32> {
    self.line_map.get_by_left(&address).copied()
  }

  pub fn address_for_line(&self, line: u32) -> Option<Word> {
    self.line_map.get_by_right(&line).copied()
  }

  // region Per-group encoders

  fn encode_statement(
    &mut self,
    mnemonic : &str,
    operands : Vec<Operand>,
    line     : u32,
  ) -> Result<Word> {
    if let Some(directive) = mnemonic.strip_prefix('.') {
      return self.encode_directive(directive, &operands, line);
    }
    if let Some(suffix) = mnemonic.strip_prefix("b.") {
      return self.encode_branch_cond(suffix, &operands, line);
    }

    let parsed = Mnemonic::from_str(mnemonic).map_err(|_| Error::UnknownMnemonic {
      line,
      token: mnemonic.to_string(),
    })?;

    let mut operands = operands;
    let canonical = aliases::expand(parsed, &mut operands);

    use Mnemonic::*;
    match canonical {
      Add | Adds | Sub | Subs => self.encode_add_sub(canonical, &operands, line),
      Madd | Msub             => self.encode_multiply(canonical, &operands, line),

      And | Ands | Bic | Bics | Eor | Eon | Orr | Orn => {
        self.encode_logic(canonical, &operands, line)
      }

      Movn | Movz | Movk      => self.encode_wide_move(canonical, &operands, line),
      Ldr | Str               => self.encode_load_store(canonical, &operands, line),
      B                       => self.encode_branch(&operands, line),
      Br                      => self.encode_branch_reg(&operands, line),

      // `aliases::expand` only returns canonical mnemonics.
      Neg | Negs | Cmp | Cmn | Tst | Mvn | Mov | Mul | Mneg => {
        unreachable!("alias `{}` survived expansion", canonical)
      }
    }
  }

  /// `.int <imm>` emits its 32-bit value verbatim; no other directive exists.
  fn encode_directive(
    &self,
    directive : &str,
    operands  : &[Operand],
    line      : u32,
  ) -> Result<Word> {
    if directive != "int" {
      return Err(Error::UnknownDirective {
        line,
        token: format!(".{}", directive),
      });
    }
    require_operands(".int", operands, 1, line)?;
    Ok(immediate_at(operands, 0, line)? as Word)
  }

  fn encode_add_sub(
    &self,
    mnemonic : Mnemonic,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    require_operands(mnemonic.into(), operands, 3, line)?;

    let rd = register_at(operands, 0, line)?;
    let rn = register_at(operands, 1, line)?;
    let sf = bit_mode(rd, rn);
    let subtract  = matches!(mnemonic, Mnemonic::Sub | Mnemonic::Subs);
    let set_flags = matches!(mnemonic, Mnemonic::Adds | Mnemonic::Subs);

    let instruction = match operand2(operands, 2, line)? {

      Either::Left(imm) => {
        // The shifted-immediate form is marked by a non-zero `lsl #12`.
        let sh = matches!(
          operands.get(3),
          Some(Operand::Shift { amount, .. }) if *amount != 0
        );
        Instruction::ImmArith {
          sf, set_flags, subtract, sh,
          imm12: imm as u16,
          rn:    rn.index,
          rd:    rd.index,
        }
      }

      Either::Right(rm) => {
        let (shift, amount) = shift_suffix(operands, 3, line)?;
        Instruction::RegArith {
          sf, set_flags, subtract, shift,
          rm:     rm.index,
          amount,
          rn:     rn.index,
          rd:     rd.index,
        }
      }
    };

    Ok(instruction.encode())
  }

  fn encode_multiply(
    &self,
    mnemonic : Mnemonic,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    require_operands(mnemonic.into(), operands, 4, line)?;

    let rd = register_at(operands, 0, line)?;
    let rn = register_at(operands, 1, line)?;
    let rm = register_at(operands, 2, line)?;
    let ra = register_at(operands, 3, line)?;

    Ok(
      Instruction::RegMultiply {
        sf:       rd.is_64_bit(),
        subtract: mnemonic == Mnemonic::Msub,
        rm: rm.index,
        ra: ra.index,
        rn: rn.index,
        rd: rd.index,
      }
      .encode(),
    )
  }

  fn encode_logic(
    &self,
    mnemonic : Mnemonic,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    require_operands(mnemonic.into(), operands, 3, line)?;

    let rd = register_at(operands, 0, line)?;
    let rn = register_at(operands, 1, line)?;
    let rm = register_at(operands, 2, line)?;
    let (shift, amount) = shift_suffix(operands, 3, line)?;

    use Mnemonic::*;
    let (op, negate) = match mnemonic {
      And  => (LogicOp::And, false),
      Bic  => (LogicOp::And, true),
      Orr  => (LogicOp::Orr, false),
      Orn  => (LogicOp::Orr, true),
      Eor  => (LogicOp::Eor, false),
      Eon  => (LogicOp::Eor, true),
      Ands => (LogicOp::Ands, false),
      Bics => (LogicOp::Ands, true),
      _    => unreachable!("not a logic mnemonic: {}", mnemonic),
    };

    Ok(
      Instruction::RegLogic {
        sf: bit_mode(rd, rn),
        op, negate, shift,
        rm:     rm.index,
        amount,
        rn:     rn.index,
        rd:     rd.index,
      }
      .encode(),
    )
  }

  fn encode_wide_move(
    &self,
    mnemonic : Mnemonic,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    require_operands(mnemonic.into(), operands, 2, line)?;

    let rd    = register_at(operands, 0, line)?;
    let imm16 = immediate_at(operands, 1, line)?;

    let op = match mnemonic {
      Mnemonic::Movn => WideOp::Movn,
      Mnemonic::Movz => WideOp::Movz,
      Mnemonic::Movk => WideOp::Movk,
      _              => unreachable!("not a wide move mnemonic: {}", mnemonic),
    };

    let hw = match operands.get(2) {
      Some(Operand::Shift { amount, .. }) => (amount / 16) as u8,
      None                                => 0,
      Some(other) => return Err(bad_operand(other, line)),
    };

    Ok(
      Instruction::ImmWide {
        sf:    rd.is_64_bit(),
        op, hw,
        imm16: imm16 as u16,
        rd:    rd.index,
      }
      .encode(),
    )
  }

  fn encode_load_store(
    &mut self,
    mnemonic : Mnemonic,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    require_operands(mnemonic.into(), operands, 2, line)?;

    let rt   = register_at(operands, 0, line)?;
    let sf   = rt.is_64_bit();
    let load = mnemonic == Mnemonic::Ldr;
    let rt   = rt.index;

    let instruction = match &operands[1] {

      // The PC-relative literal forms exist only for loads.
      Operand::Label(name) if load => Instruction::DtLoadLiteral {
        sf,
        simm19: self.symbols.lookup_or_defer(self.current_address, name.clone()),
        rt,
      },

      Operand::Immediate(imm) if load => Instruction::DtLoadLiteral {
        sf,
        simm19: (imm / INSTRUCTION_SIZE as i64) as i32,
        rt,
      },

      Operand::Mem(address) => match *address {
        MemOperand::Base { xn } => {
          Instruction::DtImmOffset { sf, load, imm12: 0, xn, rt }
        }

        MemOperand::UnsignedOffset { xn, imm } => {
          let scale: i64 = if sf { 8 } else { 4 };
          Instruction::DtImmOffset { sf, load, imm12: (imm / scale) as u16, xn, rt }
        }

        MemOperand::PreIndex { xn, simm } => {
          Instruction::DtIndexed { sf, load, pre: true, simm9: simm as i16, xn, rt }
        }

        MemOperand::PostIndex { xn, simm } => {
          Instruction::DtIndexed { sf, load, pre: false, simm9: simm as i16, xn, rt }
        }

        MemOperand::RegOffset { xn, xm } => {
          Instruction::DtRegOffset { sf, load, xm, xn, rt }
        }
      },

      other => return Err(bad_operand(other, line)),
    };

    Ok(instruction.encode())
  }

  fn encode_branch(&mut self, operands: &[Operand], line: u32) -> Result<Word> {
    require_operands("b", operands, 1, line)?;
    let name = label_at(operands, 0, line)?;
    let simm26 = self.symbols.lookup_or_defer(self.current_address, name);
    Ok(Instruction::BranchUncond { simm26 }.encode())
  }

  fn encode_branch_cond(
    &mut self,
    suffix   : &str,
    operands : &[Operand],
    line     : u32,
  ) -> Result<Word> {
    let cond = Condition::from_str(suffix).map_err(|_| Error::UnknownMnemonic {
      line,
      token: format!("b.{}", suffix),
    })?;
    require_operands("b.cond", operands, 1, line)?;
    let name = label_at(operands, 0, line)?;
    let simm19 = self.symbols.lookup_or_defer(self.current_address, name);
    Ok(Instruction::BranchCond { cond, simm19 }.encode())
  }

  fn encode_branch_reg(&self, operands: &[Operand], line: u32) -> Result<Word> {
    require_operands("br", operands, 1, line)?;
    let xn = register_at(operands, 0, line)?;
    Ok(Instruction::BranchReg { xn: xn.index }.encode())
  }

  // endregion
}

// region Operand accessors

fn require_operands(
  mnemonic : &str,
  operands : &[Operand],
  required : usize,
  line     : u32,
) -> Result<()> {
  match operands.len() {
    found if found < required => Err(Error::WrongOperandCount {
      line,
      mnemonic: mnemonic.to_string(),
      required,
      found,
    }),
    _ => Ok(()),
  }
}

fn bad_operand(operand: &Operand, line: u32) -> Error {
  Error::BadOperand { line, token: operand.to_string() }
}

fn register_at(operands: &[Operand], index: usize, line: u32) -> Result<Register> {
  match &operands[index] {
    Operand::Register(register) => Ok(*register),
    other                       => Err(bad_operand(other, line)),
  }
}

fn immediate_at(operands: &[Operand], index: usize, line: u32) -> Result<i64> {
  match &operands[index] {
    Operand::Immediate(imm) => Ok(*imm),
    other                   => Err(bad_operand(other, line)),
  }
}

fn label_at(
  operands : &[Operand],
  index    : usize,
  line     : u32,
) -> Result<string_cache::DefaultAtom> {
  match &operands[index] {
    Operand::Label(name) => Ok(name.clone()),
    other                => Err(bad_operand(other, line)),
  }
}

/// The second operand of arithmetic is an immediate or a shifted register.
fn operand2(operands: &[Operand], index: usize, line: u32) -> Result<Either<i64, Register>> {
  match &operands[index] {
    Operand::Immediate(imm)     => Ok(Either::Left(*imm)),
    Operand::Register(register) => Ok(Either::Right(*register)),
    other                       => Err(bad_operand(other, line)),
  }
}

fn shift_suffix(operands: &[Operand], index: usize, line: u32) -> Result<(ShiftKind, u8)> {
  match operands.get(index) {
    Some(Operand::Shift { kind, amount }) => Ok((*kind, *amount as u8)),
    None                                  => Ok((ShiftKind::Lsl, 0)),
    Some(other)                           => Err(bad_operand(other, line)),
  }
}

/**
  Operand-size flag for a data-processing statement: normally the width of
  the destination's register name, but the mode-neutral `rzr` defers to the
  second register operand.
*/
fn bit_mode(first: Register, second: Register) -> bool {
  match first.width {
    Some(width) => width == parser::RegWidth::X,
    None        => second.is_64_bit(),
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::isa::try_decode;

  fn assemble(source: &str) -> Vec<Word> {
    Assembler::assemble_source(source).unwrap()
  }

  fn first_instruction(source: &str) -> Instruction {
    try_decode(assemble(source)[0]).unwrap()
  }

  #[test]
  fn aliases_encode_to_their_canonical_forms() {
    assert_eq!(assemble("mov x1, x2"), assemble("orr x1, rzr, x2"));
    assert_eq!(assemble("cmp w3, w4"), assemble("subs rzr, w3, w4"));
    assert_eq!(assemble("tst x1, x2"), assemble("ands rzr, x1, x2"));
    assert_eq!(assemble("mul x0, x1, x2"), assemble("madd x0, x1, x2, rzr"));
    assert_eq!(
      assemble("neg x9, x2, lsl #3"),
      assemble("sub x9, rzr, x2, lsl #3")
    );
  }

  #[test]
  fn halt_is_and_x0_x0_x0() {
    assert_eq!(assemble("and x0, x0, x0"), vec![crate::isa::HALT]);
  }

  #[test]
  fn zero_register_defers_bit_mode() {
    // `rzr` carries no width, so the second register decides.
    let inst = first_instruction("cmp w1, w2");
    assert_eq!(
      inst,
      Instruction::RegArith {
        sf: false, set_flags: true, subtract: true,
        shift: ShiftKind::Lsl, rm: 2, amount: 0, rn: 1, rd: 31,
      }
    );
  }

  #[test]
  fn shifted_immediate_arithmetic() {
    let inst = first_instruction("add x0, x1, #5, lsl #12");
    assert_eq!(
      inst,
      Instruction::ImmArith {
        sf: true, set_flags: false, subtract: false, sh: true,
        imm12: 5, rn: 1, rd: 0,
      }
    );

    // `lsl #0` leaves the immediate unshifted.
    let inst = first_instruction("add x0, x1, #5, lsl #0");
    assert!(matches!(inst, Instruction::ImmArith { sh: false, .. }));
  }

  #[test]
  fn wide_move_halfword_selection() {
    let inst = first_instruction("movk x7, #0xBEEF, lsl #48");
    assert_eq!(
      inst,
      Instruction::ImmWide { sf: true, op: WideOp::Movk, hw: 3, imm16: 0xBEEF, rd: 7 }
    );
  }

  #[test]
  fn unsigned_offsets_scale_with_the_transfer_size() {
    assert_eq!(
      first_instruction("ldr x0, [x1, #16]"),
      Instruction::DtImmOffset { sf: true, load: true, imm12: 2, xn: 1, rt: 0 }
    );
    assert_eq!(
      first_instruction("ldr w0, [x1, #16]"),
      Instruction::DtImmOffset { sf: false, load: true, imm12: 4, xn: 1, rt: 0 }
    );
  }

  #[test]
  fn load_literal_takes_labels_and_immediates() {
    let words = assemble("ldr x0, data\nand x0, x0, x0\ndata:\n.int 0xDEADBEEF");
    assert_eq!(
      try_decode(words[0]),
      Some(Instruction::DtLoadLiteral { sf: true, simm19: 2, rt: 0 })
    );
    assert_eq!(words[2], 0xDEAD_BEEF);

    assert_eq!(
      first_instruction("ldr x1, #8\nand x0, x0, x0"),
      Instruction::DtLoadLiteral { sf: true, simm19: 2, rt: 1 }
    );
  }

  #[test]
  fn forward_branches_are_patched() {
    let words = assemble("b end\nmovz x0, #7\nend:\nand x0, x0, x0");
    assert_eq!(try_decode(words[0]), Some(Instruction::BranchUncond { simm26: 2 }));
  }

  #[test]
  fn conditional_branch_conditions() {
    let words = assemble("loop:\nb.ne loop\nb.al loop");
    assert_eq!(
      try_decode(words[0]),
      Some(Instruction::BranchCond { cond: Condition::Ne, simm19: 0 })
    );
    assert_eq!(
      try_decode(words[1]),
      Some(Instruction::BranchCond { cond: Condition::Al, simm19: -1 })
    );
  }

  #[test]
  fn assembling_twice_is_bit_identical() {
    let source = "movz x1, #1\nloop:\nadds x1, x1, #1\nb.ne loop\nstr x1, [x2], #8\nand x0, x0, x0";
    assert_eq!(assemble(source), assemble(source));
  }

  #[test]
  fn encoding_errors_name_the_offender() {
    let error = Assembler::assemble_source("frobnicate x0").unwrap_err();
    assert!(matches!(error, Error::UnknownMnemonic { line: 1, .. }));

    let error = Assembler::assemble_source(".quad 9").unwrap_err();
    assert!(matches!(error, Error::UnknownDirective { line: 1, .. }));

    let error = Assembler::assemble_source("add x0, x1").unwrap_err();
    assert!(matches!(
      error,
      Error::WrongOperandCount { required: 3, found: 2, .. }
    ));

    let error = Assembler::assemble_source("b.hs somewhere").unwrap_err();
    assert!(matches!(error, Error::UnknownMnemonic { .. }));

    let error = Assembler::assemble_source("b #12").unwrap_err();
    assert!(matches!(error, Error::BadOperand { .. }));

    let error = Assembler::assemble_source("ldr x0, [x1, #8").unwrap_err();
    assert!(matches!(error, Error::MalformedLine { .. }));
  }

  #[test]
  fn unresolved_and_duplicate_labels_are_rejected() {
    let error = Assembler::assemble_source("b nowhere").unwrap_err();
    assert!(matches!(error, Error::UnresolvedLabels { .. }));

    let error = Assembler::assemble_source("here:\nhere:").unwrap_err();
    assert!(matches!(error, Error::DuplicateLabel { .. }));
  }

  #[test]
  fn line_map_tracks_emitting_lines_only() {
    let mut assembler = Assembler::new();
    let source = ["movz x0, #1", "skip:", "", "add x0, x0, #1"];
    for (index, line) in source.iter().enumerate() {
      assembler.assemble_line(line, index as u32 + 1).unwrap();
    }
    assert_eq!(assembler.line_for_address(0), Some(1));
    assert_eq!(assembler.line_for_address(4), Some(4));
    assert_eq!(assembler.address_for_line(4), Some(4));
    assert_eq!(assembler.line_for_address(8), None);
    assert_eq!(assembler.instructions().len(), 2);
  }
}
