/*!

  A symbol table maps label names to the absolute byte address at which they
  were defined. A label may be referenced before it is defined: the reference
  site emits a zero displacement and records its own address under the label,
  and the eventual definition back-patches every recorded word in place. Each
  label is therefore in one of two states — `pending` (referenced, address
  unknown) or `defined` — and never in both at once.

  Words and the table refer to each other only by index (`address / 4`), so
  there are no owning cycles to manage.

*/

use std::collections::HashMap;

use string_cache::DefaultAtom;

use crate::error::{Error, Result};
use crate::isa::{binary, Word, INSTRUCTION_SIZE};

#[derive(Debug, Default)]
pub struct SymbolTable {
  defined : HashMap<DefaultAtom, Word>,
  pending : HashMap<DefaultAtom, Vec<Word>>,
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  /**
    Defines `name` at `address` and resolves every pending reference to it by
    rewriting the displacement field of the referring words inside
    `instructions`. Redefinition is an error.
  */
  pub fn define(
    &mut self,
    instructions : &mut [Word],
    address      : Word,
    name         : DefaultAtom,
  ) -> Result<()> {
    if let Some(&first) = self.defined.get(&name) {
      return Err(Error::DuplicateLabel {
        label:  name.to_string(),
        first,
        second: address,
      });
    }

    if let Some(references) = self.pending.remove(&name) {
      for reference in references {
        let index  = (reference / INSTRUCTION_SIZE) as usize;
        let offset = Self::word_offset(address, reference);
        instructions[index] = binary::patch_displacement(instructions[index], offset)
          .ok_or(Error::BadPatchSite { word: instructions[index], address: reference })?;
      }
    }

    self.defined.insert(name, address);
    Ok(())
  }

  /**
    Returns the displacement, in words, from `current_address` to `name`. If
    `name` has no definition yet, records `current_address` as a pending
    reference and returns 0; the word emitted at `current_address` must carry
    a zero displacement until `define` rewrites it.
  */
  pub fn lookup_or_defer(&mut self, current_address: Word, name: DefaultAtom) -> i32 {
    match self.defined.get(&name) {
      Some(&address) => Self::word_offset(address, current_address),
      None => {
        self.pending.entry(name).or_default().push(current_address);
        0
      }
    }
  }

  /// Labels that were referenced but never defined. Non-empty after the whole
  /// input has been consumed means the program cannot be linked.
  pub fn unresolved(&self) -> Vec<String> {
    let mut labels: Vec<String> = self.pending.keys().map(|l| l.to_string()).collect();
    labels.sort();
    labels
  }

  fn word_offset(target: Word, from: Word) -> i32 {
    (target as i32 - from as i32) / INSTRUCTION_SIZE as i32
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::isa::{try_decode, Condition, Instruction};

  fn atom(name: &str) -> DefaultAtom {
    DefaultAtom::from(name)
  }

  #[test]
  fn backward_reference_resolves_immediately() {
    let mut table = SymbolTable::new();
    let mut instructions: Vec<Word> = vec![];

    table.define(&mut instructions, 0, atom("loop")).unwrap();
    // Referenced from address 12, three words past the definition.
    assert_eq!(table.lookup_or_defer(12, atom("loop")), -3);
    assert!(table.unresolved().is_empty());
  }

  #[test]
  fn forward_reference_is_back_patched() {
    let mut table = SymbolTable::new();
    let mut instructions = vec![
      Instruction::BranchUncond { simm26: 0 }.encode(),
      Instruction::BranchCond { cond: Condition::Eq, simm19: 0 }.encode(),
      Instruction::DtLoadLiteral { sf: true, simm19: 0, rt: 1 }.encode(),
    ];

    assert_eq!(table.lookup_or_defer(0, atom("end")), 0);
    assert_eq!(table.lookup_or_defer(4, atom("end")), 0);
    assert_eq!(table.lookup_or_defer(8, atom("end")), 0);
    assert_eq!(table.unresolved(), vec!["end".to_string()]);

    table.define(&mut instructions, 12, atom("end")).unwrap();

    assert_eq!(
      try_decode(instructions[0]),
      Some(Instruction::BranchUncond { simm26: 3 })
    );
    assert_eq!(
      try_decode(instructions[1]),
      Some(Instruction::BranchCond { cond: Condition::Eq, simm19: 2 })
    );
    assert_eq!(
      try_decode(instructions[2]),
      Some(Instruction::DtLoadLiteral { sf: true, simm19: 1, rt: 1 })
    );
    assert!(table.unresolved().is_empty());
  }

  #[test]
  fn duplicate_definition_is_rejected() {
    let mut table = SymbolTable::new();
    let mut instructions: Vec<Word> = vec![];

    table.define(&mut instructions, 0, atom("here")).unwrap();
    let error = table.define(&mut instructions, 8, atom("here")).unwrap_err();
    assert!(matches!(error, Error::DuplicateLabel { .. }));
  }

  #[test]
  fn patching_a_non_label_word_is_an_internal_error() {
    let mut table = SymbolTable::new();
    let mut instructions = vec![
      Instruction::RegMultiply { sf: true, subtract: false, rm: 1, ra: 31, rn: 2, rd: 3 }
        .encode(),
    ];
    table.lookup_or_defer(0, atom("x"));
    let error = table.define(&mut instructions, 4, atom("x")).unwrap_err();
    assert!(matches!(error, Error::BadPatchSite { .. }));
  }
}
