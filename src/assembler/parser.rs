/*!

  The lexical grammar of one source line. A line is a label definition
  (`name:`), a statement (mnemonic followed by comma/whitespace separated
  operands), or blank; anything from `/` to the end of the line is a comment.

  Operands parse into a structured form here so that the per-group encoders
  never look at text again:

    * Registers: `x0`–`x30`, `w0`–`w30`, and the zero register spellings
      `xzr`/`wzr`/`rzr` (index 31; `rzr` leaves the width unspecified).
    * Immediates: optional `#`, optional minus, decimal or `0x` hex.
    * Shift suffixes: `lsl|lsr|asr|ror #amount`, one operand.
    * Address operands: `[xn]`, `[xn, #imm]`, `[xn, #imm]!`, `[xn], #imm`,
      and `[xn, xm]`.
    * Labels: `[A-Za-z_.][A-Za-z0-9$_.]*`, anything that is none of the above.

*/

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{tag, take_while, take_while1, take_while_m_n},
  character::complete::{char as one_char, digit1, hex_digit1, satisfy, space0, space1},
  combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
  error::Error as NomError,
  multi::separated_list1,
  sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
  IResult,
};
use string_cache::DefaultAtom;

use crate::isa::ShiftKind;

/// Width selector carried by a register name's prefix letter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegWidth {
  W,
  X,
}

/// A register operand. `width` is `None` only for the mode-neutral zero
/// register `rzr`, whose bit mode is taken from a neighbouring operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Register {
  pub index : u8,
  pub width : Option<RegWidth>,
}

impl Register {
  pub const ZERO: Register = Register { index: 31, width: None };

  pub fn is_64_bit(&self) -> bool {
    self.width == Some(RegWidth::X)
  }
}

/// The bracketed address forms of `ldr`/`str`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemOperand {
  /// `[xn]`
  Base { xn: u8 },
  /// `[xn, #imm]`
  UnsignedOffset { xn: u8, imm: i64 },
  /// `[xn, #simm]!`
  PreIndex { xn: u8, simm: i64 },
  /// `[xn], #simm`
  PostIndex { xn: u8, simm: i64 },
  /// `[xn, xm]`
  RegOffset { xn: u8, xm: u8 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
  Register(Register),
  Immediate(i64),
  Shift { kind: ShiftKind, amount: i64 },
  Mem(MemOperand),
  Label(DefaultAtom),
}

impl Display for Register {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match (self.width, self.index) {
      (None, _)               => write!(f, "rzr"),
      (Some(RegWidth::X), 31) => write!(f, "xzr"),
      (Some(RegWidth::W), 31) => write!(f, "wzr"),
      (Some(RegWidth::X), i)  => write!(f, "x{}", i),
      (Some(RegWidth::W), i)  => write!(f, "w{}", i),
    }
  }
}

impl Display for MemOperand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      MemOperand::Base { xn }                 => write!(f, "[x{}]", xn),
      MemOperand::UnsignedOffset { xn, imm }  => write!(f, "[x{}, #{}]", xn, imm),
      MemOperand::PreIndex { xn, simm }       => write!(f, "[x{}, #{}]!", xn, simm),
      MemOperand::PostIndex { xn, simm }      => write!(f, "[x{}], #{}", xn, simm),
      MemOperand::RegOffset { xn, xm }        => write!(f, "[x{}, x{}]", xn, xm),
    }
  }
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operand::Register(register)    => write!(f, "{}", register),
      Operand::Immediate(imm)        => write!(f, "#{}", imm),
      Operand::Shift { kind, amount } => write!(f, "{} #{}", kind, amount),
      Operand::Mem(address)          => write!(f, "{}", address),
      Operand::Label(name)           => write!(f, "{}", name),
    }
  }
}

/// One parsed source line.
#[derive(Clone, Debug, PartialEq)]
pub enum Line {
  Blank,
  Label(DefaultAtom),
  Statement {
    mnemonic : String,
    operands : Vec<Operand>,
  },
}

/**
  Parses a raw source line. Returns `None` when the line is not valid under
  the grammar; the caller owns the diagnostic, since only it knows the line
  number.
*/
pub fn parse_line(source: &str) -> Option<Line> {
  // Everything from the comment character onwards is ignored.
  let code = source.split('/').next().unwrap_or("").trim();
  if code.is_empty() {
    return Some(Line::Blank);
  }

  // A label definition ignores the remainder of the line.
  if let Ok((_, name)) = label_definition(code) {
    return Some(Line::Label(name));
  }

  match all_consuming(statement)(code) {
    Ok((_, line)) => Some(line),
    Err(_)        => None,
  }
}

fn is_label_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_label_continue(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '$' || c == '_' || c == '.'
}

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    take_while_m_n(1, 1, is_label_start),
    take_while(is_label_continue),
  ))(input)
}

fn label_definition(input: &str) -> IResult<&str, DefaultAtom> {
  map(terminated(identifier, one_char(':')), DefaultAtom::from)(input)
}

fn statement(input: &str) -> IResult<&str, Line> {
  map(
    pair(
      mnemonic,
      opt(preceded(space1, separated_list1(operand_separator, operand))),
    ),
    |(mnemonic, operands)| Line::Statement {
      mnemonic: mnemonic.to_string(),
      operands: operands.unwrap_or_default(),
    },
  )(input)
}

fn mnemonic(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.')(input)
}

// Operands are separated by a comma (with optional spaces) or by bare spaces.
fn operand_separator(input: &str) -> IResult<&str, ()> {
  alt((
    value((), delimited(space0, one_char(','), space0)),
    value((), space1),
  ))(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
  alt((
    map(memory_operand, Operand::Mem),
    shift_operand,
    map(register, Operand::Register),
    map(immediate, Operand::Immediate),
    map(identifier, |name| Operand::Label(DefaultAtom::from(name))),
  ))(input)
}

/// A register name, rejected if it runs straight into more identifier
/// characters (`x1abc` is a label, not a register followed by junk).
fn register(input: &str) -> IResult<&str, Register> {
  terminated(register_name, not(satisfy(is_label_continue)))(input)
}

fn register_name(input: &str) -> IResult<&str, Register> {
  alt((
    value(Register { index: 31, width: Some(RegWidth::X) }, tag("xzr")),
    value(Register { index: 31, width: Some(RegWidth::W) }, tag("wzr")),
    value(Register::ZERO, tag("rzr")),
    map(
      pair(
        alt((
          value(RegWidth::X, one_char('x')),
          value(RegWidth::W, one_char('w')),
        )),
        verify(map_res(digit1, str::parse::<u8>), |&index| index <= 30),
      ),
      |(width, index)| Register { index, width: Some(width) },
    ),
  ))(input)
}

fn immediate(input: &str) -> IResult<&str, i64> {
  let (input, _) = opt(one_char('#'))(input)?;
  let (input, negative) = map(opt(one_char('-')), |sign| sign.is_some())(input)?;
  let (input, magnitude) = alt((
    map_res(preceded(tag("0x"), hex_digit1), |digits| {
      i64::from_str_radix(digits, 16)
    }),
    map_res(digit1, str::parse::<i64>),
  ))(input)?;
  Ok((input, if negative { -magnitude } else { magnitude }))
}

fn shift_operand(input: &str) -> IResult<&str, Operand> {
  map(
    separated_pair(
      map_res(
        take_while_m_n(3, 3, |c: char| c.is_ascii_alphabetic()),
        ShiftKind::from_str,
      ),
      space1,
      immediate,
    ),
    |(kind, amount)| Operand::Shift { kind, amount },
  )(input)
}

fn memory_operand(input: &str) -> IResult<&str, MemOperand> {
  let (rest, xn) = preceded(pair(one_char('['), space0), base_register)(input)?;
  let (rest, _) = space0(rest)?;

  // `[xn]` closed immediately: either a plain base or a post-index.
  if let Ok((rest, _)) = one_char::<_, NomError<&str>>(']')(rest) {
    let post: IResult<&str, i64> =
      preceded(tuple((space0, one_char(','), space0)), immediate)(rest);
    return match post {
      Ok((rest, simm)) => Ok((rest, MemOperand::PostIndex { xn, simm })),
      Err(_)           => Ok((rest, MemOperand::Base { xn })),
    };
  }

  // `[xn, …`: a register offset or an immediate, then the closing bracket.
  let (rest, _) = pair(one_char(','), space0)(rest)?;

  if let Ok((rest, xm)) = base_register(rest) {
    let (rest, _) = pair(space0, one_char(']'))(rest)?;
    return Ok((rest, MemOperand::RegOffset { xn, xm }));
  }

  let (rest, imm) = immediate(rest)?;
  let (rest, _) = pair(space0, one_char(']'))(rest)?;
  match one_char::<_, NomError<&str>>('!')(rest) {
    Ok((rest, _)) => Ok((rest, MemOperand::PreIndex { xn, simm: imm })),
    Err(_)        => Ok((rest, MemOperand::UnsignedOffset { xn, imm })),
  }
}

/// The base (and offset) registers of an address operand are always 64-bit.
fn base_register(input: &str) -> IResult<&str, u8> {
  map(
    verify(register, |register| register.width == Some(RegWidth::X)),
    |register| register.index,
  )(input)
}
