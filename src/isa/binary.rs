/*!
  This module is responsible for the encoding and decoding of binary
  instructions. It is the only place that knows where each field lives inside
  a word; everything else works with the `Instruction` enum.

  Group selector bits, with the remaining selectors per group:

  | bits        | value | group                                        |
  |-------------|-------|----------------------------------------------|
  | `[28:26]`   | `101` | branch (`id` at `[31:30]`: 0 b, 1 b.cond, 3 br) |
  | `[28:26]`   | `100` | DP immediate (`opi` at `[25:23]`: 2 arith, 5 wide move) |
  | `[27:25]`   | `101` | DP register (`M` at 28: multiply; else `id` at 24: 1 arith, 0 logic) |
  | bit 27 = 1, bit 25 = 0 | | data transfer (bit 31 = 0: literal; `U` at 24: imm offset; `id2` at 21: reg offset; `I` at 11: pre/post) |
*/

use std::convert::TryFrom;

use super::instruction::{Condition, Instruction, LogicOp, ShiftKind, WideOp, Word};
use super::sign_extend;

// Fixed selector patterns, named after the group they identify.
const DP_IMM_GROUP     : Word = 0b100 << 26;
const DP_REG_GROUP     : Word = 0b101 << 25;
const BRANCH_GROUP     : Word = 0b101 << 26;
const OPI_ARITH        : Word = 0b010 << 23;
const OPI_WIDE_MOVE    : Word = 0b101 << 23;
// Data transfers other than load-literal share bits 31, 29, 28 and 27.
const DT_COMMON        : Word = (1 << 31) | (1 << 29) | (1 << 28) | (1 << 27);
const DT_LITERAL       : Word = (1 << 28) | (1 << 27);
const DT_UNSIGNED      : Word = 1 << 24;
const DT_REG_PATTERN   : Word = 0b011010 << 10;
const DT_INDEX_MARK    : Word = 1 << 10;
const BR_REG_PATTERN   : Word = 0b10_0001_1111 << 16;

const fn bit(word: Word, index: u32) -> bool {
  (word >> index) & 1 == 1
}

const fn field(word: Word, low: u32, width: u32) -> Word {
  (word >> low) & ((1 << width) - 1)
}

impl Instruction {

  /// Encodes the instruction into its machine word.
  pub fn encode(&self) -> Word {
    use Instruction::*;
    match *self {

      ImmArith { sf, set_flags, subtract, sh, imm12, rn, rd } => {
        ((sf as Word) << 31)
          | ((subtract as Word) << 30)
          | ((set_flags as Word) << 29)
          | DP_IMM_GROUP
          | OPI_ARITH
          | ((sh as Word) << 22)
          | ((imm12 as Word & 0xFFF) << 10)
          | ((rn as Word & 0x1F) << 5)
          | (rd as Word & 0x1F)
      }

      ImmWide { sf, op, hw, imm16, rd } => {
        ((sf as Word) << 31)
          | ((u8::from(op) as Word) << 29)
          | DP_IMM_GROUP
          | OPI_WIDE_MOVE
          | ((hw as Word & 0x3) << 21)
          | ((imm16 as Word) << 5)
          | (rd as Word & 0x1F)
      }

      RegArith { sf, set_flags, subtract, shift, rm, amount, rn, rd } => {
        ((sf as Word) << 31)
          | ((subtract as Word) << 30)
          | ((set_flags as Word) << 29)
          | DP_REG_GROUP
          | (1 << 24)
          | ((u8::from(shift) as Word) << 22)
          | ((rm as Word & 0x1F) << 16)
          | ((amount as Word & 0x3F) << 10)
          | ((rn as Word & 0x1F) << 5)
          | (rd as Word & 0x1F)
      }

      RegLogic { sf, op, negate, shift, rm, amount, rn, rd } => {
        ((sf as Word) << 31)
          | ((u8::from(op) as Word) << 29)
          | DP_REG_GROUP
          | ((u8::from(shift) as Word) << 22)
          | ((negate as Word) << 21)
          | ((rm as Word & 0x1F) << 16)
          | ((amount as Word & 0x3F) << 10)
          | ((rn as Word & 0x1F) << 5)
          | (rd as Word & 0x1F)
      }

      RegMultiply { sf, subtract, rm, ra, rn, rd } => {
        ((sf as Word) << 31)
          | (1 << 28)
          | DP_REG_GROUP
          | (1 << 24)
          | ((rm as Word & 0x1F) << 16)
          | ((subtract as Word) << 15)
          | ((ra as Word & 0x1F) << 10)
          | ((rn as Word & 0x1F) << 5)
          | (rd as Word & 0x1F)
      }

      DtImmOffset { sf, load, imm12, xn, rt } => {
        DT_COMMON
          | ((sf as Word) << 30)
          | DT_UNSIGNED
          | ((load as Word) << 22)
          | ((imm12 as Word & 0xFFF) << 10)
          | ((xn as Word & 0x1F) << 5)
          | (rt as Word & 0x1F)
      }

      DtRegOffset { sf, load, xm, xn, rt } => {
        DT_COMMON
          | ((sf as Word) << 30)
          | ((load as Word) << 22)
          | (1 << 21)
          | ((xm as Word & 0x1F) << 16)
          | DT_REG_PATTERN
          | ((xn as Word & 0x1F) << 5)
          | (rt as Word & 0x1F)
      }

      DtLoadLiteral { sf, simm19, rt } => {
        DT_LITERAL
          | ((sf as Word) << 30)
          | ((simm19 as Word & 0x7FFFF) << 5)
          | (rt as Word & 0x1F)
      }

      DtIndexed { sf, load, pre, simm9, xn, rt } => {
        DT_COMMON
          | ((sf as Word) << 30)
          | ((load as Word) << 22)
          | ((simm9 as Word & 0x1FF) << 12)
          | ((pre as Word) << 11)
          | DT_INDEX_MARK
          | ((xn as Word & 0x1F) << 5)
          | (rt as Word & 0x1F)
      }

      BranchUncond { simm26 } => BRANCH_GROUP | (simm26 as Word & 0x3FF_FFFF),

      BranchCond { cond, simm19 } => {
        (0b01 << 30)
          | BRANCH_GROUP
          | ((simm19 as Word & 0x7FFFF) << 5)
          | (u8::from(cond) as Word)
      }

      BranchReg { xn } => {
        (0b11 << 30) | BRANCH_GROUP | BR_REG_PATTERN | ((xn as Word & 0x1F) << 5)
      }
    }
  }
}

/**
  Decodes a machine word into its `Instruction` variant. Returns `None` for
  any word outside the supported subset; the caller attaches the word and the
  program counter to the resulting error.
*/
pub fn try_decode(word: Word) -> Option<Instruction> {
  let sf = bit(word, 31);

  // Branch group.
  if field(word, 26, 3) == 0b101 {
    return match field(word, 30, 2) {
      0b00 => Some(Instruction::BranchUncond {
        simm26: sign_extend(field(word, 0, 26) as u64, 26) as i32,
      }),
      0b01 => Some(Instruction::BranchCond {
        cond:   Condition::try_from(field(word, 0, 4) as u8).ok()?,
        simm19: sign_extend(field(word, 5, 19) as u64, 19) as i32,
      }),
      0b11 => Some(Instruction::BranchReg { xn: field(word, 5, 5) as u8 }),
      _    => None,
    };
  }

  // Data processing, immediate operand.
  if field(word, 26, 3) == 0b100 {
    return match field(word, 23, 3) {
      0b010 => Some(Instruction::ImmArith {
        sf,
        subtract:  bit(word, 30),
        set_flags: bit(word, 29),
        sh:        bit(word, 22),
        imm12:     field(word, 10, 12) as u16,
        rn:        field(word, 5, 5) as u8,
        rd:        field(word, 0, 5) as u8,
      }),
      0b101 => Some(Instruction::ImmWide {
        sf,
        op:    WideOp::try_from(field(word, 29, 2) as u8).ok()?,
        hw:    field(word, 21, 2) as u8,
        imm16: field(word, 5, 16) as u16,
        rd:    field(word, 0, 5) as u8,
      }),
      _ => None,
    };
  }

  // Data processing, register operand.
  if field(word, 25, 3) == 0b101 {
    if bit(word, 28) {
      return Some(Instruction::RegMultiply {
        sf,
        subtract: bit(word, 15),
        rm:       field(word, 16, 5) as u8,
        ra:       field(word, 10, 5) as u8,
        rn:       field(word, 5, 5) as u8,
        rd:       field(word, 0, 5) as u8,
      });
    }
    let shift  = ShiftKind::try_from(field(word, 22, 2) as u8).ok()?;
    let rm     = field(word, 16, 5) as u8;
    let amount = field(word, 10, 6) as u8;
    let rn     = field(word, 5, 5) as u8;
    let rd     = field(word, 0, 5) as u8;
    return match bit(word, 24) {
      true => Some(Instruction::RegArith {
        sf,
        subtract:  bit(word, 30),
        set_flags: bit(word, 29),
        shift, rm, amount, rn, rd,
      }),
      false => Some(Instruction::RegLogic {
        sf,
        op:     LogicOp::try_from(field(word, 29, 2) as u8).ok()?,
        negate: bit(word, 21),
        shift, rm, amount, rn, rd,
      }),
    };
  }

  // Data transfers.
  if bit(word, 27) && !bit(word, 25) {
    let rt = field(word, 0, 5) as u8;

    if !bit(word, 31) {
      return Some(Instruction::DtLoadLiteral {
        sf:     bit(word, 30),
        simm19: sign_extend(field(word, 5, 19) as u64, 19) as i32,
        rt,
      });
    }

    let sf   = bit(word, 30);
    let load = bit(word, 22);
    let xn   = field(word, 5, 5) as u8;

    if bit(word, 24) {
      return Some(Instruction::DtImmOffset {
        sf, load,
        imm12: field(word, 10, 12) as u16,
        xn, rt,
      });
    }
    if bit(word, 21) {
      return Some(Instruction::DtRegOffset {
        sf, load,
        xm: field(word, 16, 5) as u8,
        xn, rt,
      });
    }
    return Some(Instruction::DtIndexed {
      sf, load,
      pre:   bit(word, 11),
      simm9: sign_extend(field(word, 12, 9) as u64, 9) as i16,
      xn, rt,
    });
  }

  None
}

/**
  Rewrites the label displacement field of an already-emitted word. Only the
  three encodings that can carry a label — unconditional branch, conditional
  branch, and load-literal — have such a field; any other word is `None`,
  which the symbol table treats as an internal error.
*/
pub fn patch_displacement(word: Word, offset_words: i32) -> Option<Word> {
  if field(word, 26, 3) == 0b101 {
    return match field(word, 30, 2) {
      0b00 => Some((word & !0x3FF_FFFF) | (offset_words as Word & 0x3FF_FFFF)),
      0b01 => Some((word & !(0x7FFFF << 5)) | ((offset_words as Word & 0x7FFFF) << 5)),
      _    => None,
    };
  }
  if bit(word, 27) && !bit(word, 25) && !bit(word, 31) {
    return Some((word & !(0x7FFFF << 5)) | ((offset_words as Word & 0x7FFFF) << 5));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::isa::HALT;

  #[test]
  fn known_words() {
    // Golden encodings cross-checked against a reference assembler.
    let movz = Instruction::ImmWide {
      sf: true, op: WideOp::Movz, hw: 0, imm16: 5, rd: 0,
    };
    assert_eq!(movz.encode(), 0xD280_00A0);

    let add = Instruction::ImmArith {
      sf: true, set_flags: false, subtract: false, sh: false,
      imm12: 40, rn: 1, rd: 3,
    };
    assert_eq!(add.encode(), 0x9100_A023);

    let halt = Instruction::RegLogic {
      sf: true, op: LogicOp::And, negate: false, shift: ShiftKind::Lsl,
      rm: 0, amount: 0, rn: 0, rd: 0,
    };
    assert_eq!(halt.encode(), HALT);

    let b = Instruction::BranchUncond { simm26: 2 };
    assert_eq!(b.encode(), 0x1400_0002);

    let ldr_lit = Instruction::DtLoadLiteral { sf: true, simm19: 2, rt: 0 };
    assert_eq!(ldr_lit.encode(), 0x5800_0040);
  }

  #[test]
  fn decode_inverts_encode() {
    let samples = [
      Instruction::ImmArith {
        sf: false, set_flags: true, subtract: true, sh: true,
        imm12: 0xABC, rn: 30, rd: 31,
      },
      Instruction::ImmWide { sf: true, op: WideOp::Movk, hw: 3, imm16: 0xBEEF, rd: 7 },
      Instruction::RegArith {
        sf: true, set_flags: false, subtract: false, shift: ShiftKind::Asr,
        rm: 5, amount: 63, rn: 6, rd: 7,
      },
      Instruction::RegLogic {
        sf: false, op: LogicOp::Eor, negate: true, shift: ShiftKind::Ror,
        rm: 1, amount: 12, rn: 2, rd: 3,
      },
      Instruction::RegMultiply { sf: true, subtract: true, rm: 4, ra: 31, rn: 2, rd: 1 },
      Instruction::DtImmOffset { sf: true, load: true, imm12: 17, xn: 9, rt: 10 },
      Instruction::DtRegOffset { sf: false, load: false, xm: 11, xn: 12, rt: 13 },
      Instruction::DtLoadLiteral { sf: true, simm19: -4, rt: 0 },
      Instruction::DtIndexed { sf: true, load: false, pre: true, simm9: -256, xn: 1, rt: 0 },
      Instruction::DtIndexed { sf: false, load: true, pre: false, simm9: 255, xn: 1, rt: 0 },
      Instruction::BranchUncond { simm26: -1 },
      Instruction::BranchCond { cond: Condition::Le, simm19: -20 },
      Instruction::BranchReg { xn: 30 },
    ];
    for inst in samples {
      let word = inst.encode();
      assert_eq!(try_decode(word), Some(inst), "word 0x{:08x}", word);
      // And re-encoding the decoded form reproduces the word exactly.
      assert_eq!(try_decode(word).unwrap().encode(), word);
    }
  }

  #[test]
  fn rejects_words_outside_the_subset() {
    assert_eq!(try_decode(0x0000_0000), None);
    // Wide move with the unused opc value 01.
    let bad_wide = DP_IMM_GROUP | OPI_WIDE_MOVE | (0b01 << 29);
    assert_eq!(try_decode(bad_wide), None);
    // Branch with id 10.
    assert_eq!(try_decode((0b10 << 30) | BRANCH_GROUP), None);
    // Conditional branch with an unknown condition nibble.
    assert_eq!(try_decode((0b01 << 30) | BRANCH_GROUP | 0x2), None);
  }

  #[test]
  fn patches_only_label_carriers() {
    let b = Instruction::BranchUncond { simm26: 0 }.encode();
    assert_eq!(
      try_decode(patch_displacement(b, -3).unwrap()),
      Some(Instruction::BranchUncond { simm26: -3 })
    );

    let bc = Instruction::BranchCond { cond: Condition::Ne, simm19: 0 }.encode();
    assert_eq!(
      try_decode(patch_displacement(bc, 9).unwrap()),
      Some(Instruction::BranchCond { cond: Condition::Ne, simm19: 9 })
    );

    let lit = Instruction::DtLoadLiteral { sf: false, simm19: 0, rt: 3 }.encode();
    assert_eq!(
      try_decode(patch_displacement(lit, 5).unwrap()),
      Some(Instruction::DtLoadLiteral { sf: false, simm19: 5, rt: 3 })
    );

    let add = Instruction::ImmArith {
      sf: true, set_flags: false, subtract: false, sh: false,
      imm12: 1, rn: 0, rd: 0,
    };
    assert_eq!(patch_displacement(add.encode(), 1), None);
  }
}
