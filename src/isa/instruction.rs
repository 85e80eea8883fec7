/*!
  Representation of instructions abstractly, as a tagged enum over the
  supported encoding variants.
*/

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

// If you change this you must also change the encode and decode tables in
// `binary` and the back-patching in `symboltable`.
pub type Word = u32;

/**
  Shift applied to the register operand of arithmetic and logical
  instructions. `Lsl`/`Lsr` are logical, `Asr` preserves the sign, `Ror`
  rotates by the amount modulo the operand width.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq,        Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ShiftKind {
  Lsl = 0,
  Lsr = 1,
  Asr = 2,
  Ror = 3,
}

/// Wide-move flavour, as encoded in the `opc` field. The gap at 1 is real:
/// that encoding is not part of the supported subset.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq,        Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum WideOp {
  Movn = 0,
  Movz = 2,
  Movk = 3,
}

/// Bitwise operation selected by the `opc` field of a register-logic word.
/// `Ands` is `And` that additionally sets the N and Z flags and clears C, V.
#[derive(
  StrumDisplay, IntoStaticStr, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,               PartialEq,    Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum LogicOp {
  And  = 0,
  Orr  = 1,
  Eor  = 2,
  Ands = 3,
}

/**
  Condition tested by `b.<cond>` against the processor state:

  | cond | holds when           |
  |------|----------------------|
  | eq   | Z                    |
  | ne   | ¬Z                   |
  | ge   | N = V                |
  | lt   | N ≠ V                |
  | gt   | ¬Z ∧ N = V           |
  | le   | ¬(¬Z ∧ N = V)        |
  | al   | always               |

  The numeric values are the 4-bit encodings in the instruction word.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq,        Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Condition {
  Eq = 0,
  Ne = 1,
  Ge = 10,
  Lt = 11,
  Gt = 12,
  Le = 13,
  Al = 14,
}

/**
  Holds the unencoded components of an instruction. Each variant corresponds
  to one bit layout; `binary::try_decode` picks the variant from the selector
  bits of a word and `encode` reassembles the identical word.

  The `sf` field selects the operand width everywhere it appears (false: 32
  bits, true: 64 bits). Register fields are 5-bit indices; index 31 is the
  zero register.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// `add|adds|sub|subs rd, rn, #imm12 {, lsl #12}`
  ImmArith {
    sf        : bool,
    set_flags : bool,
    subtract  : bool,
    sh        : bool,
    imm12     : u16,
    rn        : u8,
    rd        : u8,
  },

  /// `movn|movz|movk rd, #imm16 {, lsl #(hw*16)}`
  ImmWide {
    sf    : bool,
    op    : WideOp,
    hw    : u8,
    imm16 : u16,
    rd    : u8,
  },

  /// `add|adds|sub|subs rd, rn, rm {, <shift> #amount}`
  RegArith {
    sf        : bool,
    set_flags : bool,
    subtract  : bool,
    shift     : ShiftKind,
    rm        : u8,
    amount    : u8,
    rn        : u8,
    rd        : u8,
  },

  /// `and|ands|bic|bics|orr|orn|eor|eon rd, rn, rm {, <shift> #amount}`;
  /// `negate` complements the shifted second operand.
  RegLogic {
    sf     : bool,
    op     : LogicOp,
    negate : bool,
    shift  : ShiftKind,
    rm     : u8,
    amount : u8,
    rn     : u8,
    rd     : u8,
  },

  /// `madd|msub rd, rn, rm, ra`; an absent accumulator is the zero register.
  RegMultiply {
    sf       : bool,
    subtract : bool,
    rm       : u8,
    ra       : u8,
    rn       : u8,
    rd       : u8,
  },

  /// `ldr|str rt, [xn {, #imm}]` with an unsigned, scaled offset.
  DtImmOffset {
    sf    : bool,
    load  : bool,
    imm12 : u16,
    xn    : u8,
    rt    : u8,
  },

  /// `ldr|str rt, [xn, xm]`
  DtRegOffset {
    sf   : bool,
    load : bool,
    xm   : u8,
    xn   : u8,
    rt   : u8,
  },

  /// `ldr rt, <label|#imm>` — PC-relative load, displacement in words.
  DtLoadLiteral {
    sf     : bool,
    simm19 : i32,
    rt     : u8,
  },

  /// `ldr|str rt, [xn, #simm]!` (pre) and `ldr|str rt, [xn], #simm` (post).
  /// Both write the updated address back to `xn`.
  DtIndexed {
    sf    : bool,
    load  : bool,
    pre   : bool,
    simm9 : i16,
    xn    : u8,
    rt    : u8,
  },

  /// `b <label>` — displacement in words.
  BranchUncond { simm26: i32 },

  /// `b.<cond> <label>` — displacement in words.
  BranchCond { cond: Condition, simm19: i32 },

  /// `br xn`
  BranchReg { xn: u8 },
}

impl Instruction {
  /**
    True for the three branch variants. The run loop uses this to decide
    whether to advance the program counter after execution: branches are
    wholly responsible for their own PC mutation, including the fall-through
    `+4` of an untaken conditional branch.
  */
  pub fn is_branch(&self) -> bool {
    matches!(
      self,
      Instruction::BranchUncond { .. }
        | Instruction::BranchCond { .. }
        | Instruction::BranchReg { .. }
    )
  }
}

/// Register name at the width selected by `sf`, e.g. `x3`, `w3`, `xzr`.
fn reg(sf: bool, index: u8) -> String {
  let prefix = if sf { 'x' } else { 'w' };
  match index {
    31 => format!("{}zr", prefix),
    _  => format!("{}{}", prefix, index),
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    use Instruction::*;
    match self {

      ImmArith { sf, set_flags, subtract, sh, imm12, rn, rd } => {
        let name = match (subtract, set_flags) {
          (false, false) => "add",
          (false, true)  => "adds",
          (true, false)  => "sub",
          (true, true)   => "subs",
        };
        write!(f, "{} {}, {}, #{}", name, reg(*sf, *rd), reg(*sf, *rn), imm12)?;
        match sh {
          true  => write!(f, ", lsl #12"),
          false => Ok(()),
        }
      }

      ImmWide { sf, op, hw, imm16, rd } => {
        write!(f, "{} {}, #{}", op, reg(*sf, *rd), imm16)?;
        match hw {
          0 => Ok(()),
          _ => write!(f, ", lsl #{}", (*hw as u32) * 16),
        }
      }

      RegArith { sf, set_flags, subtract, shift, rm, amount, rn, rd } => {
        let name = match (subtract, set_flags) {
          (false, false) => "add",
          (false, true)  => "adds",
          (true, false)  => "sub",
          (true, true)   => "subs",
        };
        write!(f, "{} {}, {}, {}", name, reg(*sf, *rd), reg(*sf, *rn), reg(*sf, *rm))?;
        match amount {
          0 => Ok(()),
          _ => write!(f, ", {} #{}", shift, amount),
        }
      }

      RegLogic { sf, op, negate, shift, rm, amount, rn, rd } => {
        let name = match (op, negate) {
          (LogicOp::And, false)  => "and",
          (LogicOp::And, true)   => "bic",
          (LogicOp::Orr, false)  => "orr",
          (LogicOp::Orr, true)   => "orn",
          (LogicOp::Eor, false)  => "eor",
          (LogicOp::Eor, true)   => "eon",
          (LogicOp::Ands, false) => "ands",
          (LogicOp::Ands, true)  => "bics",
        };
        write!(f, "{} {}, {}, {}", name, reg(*sf, *rd), reg(*sf, *rn), reg(*sf, *rm))?;
        match amount {
          0 => Ok(()),
          _ => write!(f, ", {} #{}", shift, amount),
        }
      }

      RegMultiply { sf, subtract, rm, ra, rn, rd } => {
        let name = if *subtract { "msub" } else { "madd" };
        write!(
          f, "{} {}, {}, {}, {}",
          name, reg(*sf, *rd), reg(*sf, *rn), reg(*sf, *rm), reg(*sf, *ra)
        )
      }

      DtImmOffset { sf, load, imm12, xn, rt } => {
        let name = if *load { "ldr" } else { "str" };
        let scale: u32 = if *sf { 8 } else { 4 };
        write!(
          f, "{} {}, [{}, #{}]",
          name, reg(*sf, *rt), reg(true, *xn), (*imm12 as u32) * scale
        )
      }

      DtRegOffset { sf, load, xm, xn, rt } => {
        let name = if *load { "ldr" } else { "str" };
        write!(f, "{} {}, [{}, {}]", name, reg(*sf, *rt), reg(true, *xn), reg(true, *xm))
      }

      DtLoadLiteral { sf, simm19, rt } => {
        write!(f, "ldr {}, #{}", reg(*sf, *rt), simm19 * 4)
      }

      DtIndexed { sf, load, pre, simm9, xn, rt } => {
        let name = if *load { "ldr" } else { "str" };
        match pre {
          true  => write!(f, "{} {}, [{}, #{}]!", name, reg(*sf, *rt), reg(true, *xn), simm9),
          false => write!(f, "{} {}, [{}], #{}", name, reg(*sf, *rt), reg(true, *xn), simm9),
        }
      }

      BranchUncond { simm26 }     => write!(f, "b #{}", simm26 * 4),
      BranchCond { cond, simm19 } => write!(f, "b.{} #{}", cond, simm19 * 4),
      BranchReg { xn }            => write!(f, "br {}", reg(true, *xn)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;

  #[test]
  fn condition_names_round_trip() {
    for name in ["eq", "ne", "ge", "lt", "gt", "le", "al"] {
      let cond = Condition::from_str(name).unwrap();
      assert_eq!(cond.to_string(), name);
    }
    assert!(Condition::from_str("hs").is_err());
  }

  #[test]
  fn condition_encodings() {
    assert_eq!(u8::from(Condition::Eq), 0);
    assert_eq!(u8::from(Condition::Ge), 10);
    assert_eq!(u8::from(Condition::Al), 14);
    assert_eq!(Condition::try_from(13u8).unwrap(), Condition::Le);
    assert!(Condition::try_from(2u8).is_err());
  }

  #[test]
  fn display_reads_like_assembly() {
    let inst = Instruction::ImmArith {
      sf: true, set_flags: true, subtract: false, sh: false,
      imm12: 40, rn: 1, rd: 2,
    };
    assert_eq!(inst.to_string(), "adds x2, x1, #40");

    let inst = Instruction::DtIndexed {
      sf: false, load: false, pre: true, simm9: -8, xn: 3, rt: 31,
    };
    assert_eq!(inst.to_string(), "str wzr, [x3, #-8]!");
  }
}
