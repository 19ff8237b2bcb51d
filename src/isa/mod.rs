//! ISA semantics: per-architecture operand classification and register
//! identity. Register aliasing tables are ISA data, not code — each
//! concrete implementation owns a static lookup table, never logic that
//! special-cases individual register names.

mod aarch64;
mod x86_att;

pub use aarch64::Aarch64Semantics;
pub use x86_att::X86AttSemantics;

use std::collections::BTreeSet;

use crate::common::{Isa, RegisterType};
use crate::kernel::{Flag, InstructionForm, Operands};
use crate::operand::{Operand, Register};

/// Per-operand read/write flags for one instruction form, as an ISA-level
/// DB entry would describe it. `(true, true)` means the operand is both
/// read and written (`src_dst`).
pub type OperandRwFlags = Vec<(bool, bool)>;

/// Per-ISA query surface consumed by [`crate::arch::ArchSemantics`] and
/// [`crate::depgraph::KernelDg`].
pub trait IsaSemantics {
    fn isa(&self) -> Isa;

    /// Looks up an explicit per-operand read/write description for
    /// `mnemonic`, if the ISA semantics DB carries an irregular entry for
    /// it. Returns `None` to signal "apply the default rule".
    fn operand_rw_flags(&self, mnemonic: &str, operand_count: usize) -> Option<OperandRwFlags>;

    /// True iff `a` and `b` name the same architectural register
    /// (post-aliasing), ignoring width/alias distinctions, masks, and
    /// lane selectors — the analyzer is latency-oriented and partial-write
    /// micro-ops are out of scope.
    fn is_reg_dependent_of(&self, a: &Register, b: &Register) -> bool;

    /// The architectural class of `reg` (integer / floating / vector /
    /// predicate), used for DB shape matching and the memory->register
    /// fallback.
    fn get_reg_type(&self, reg: &Register) -> RegisterType;

    /// Builds the synthetic register substituted for a `Memory` operand
    /// during the memory->register fallback (§4.3 step 4), ISA-specific:
    /// `{name: reg_type + "0"}` on x86, `{prefix: reg_type, name: "0"}` on
    /// AArch64.
    fn synthetic_register(&self, reg_type: RegisterType) -> Register;
}

/// Classifies `form`'s operands into source / destination / src_dst and
/// sets the `HasLoad` / `HasStore` flags, per §4.2.
///
/// A no-op if `form` carries no operands (label/comment/directive line).
/// Idempotent: re-running on an already-classified form reproduces the
/// same `Operands` and flags.
pub fn assign_src_dst(form: &mut InstructionForm, isa: &dyn IsaSemantics) {
    let raw = match &form.raw_operands {
        Some(ops) => ops.clone(),
        None => return,
    };

    let mnemonic = form.mnemonic.as_deref().unwrap_or_default();
    let mut source = Vec::new();
    let mut destination = Vec::new();
    let mut src_dst = Vec::new();

    match isa.operand_rw_flags(mnemonic, raw.len()) {
        Some(rw) if rw.len() == raw.len() => {
            for (operand, (read, write)) in raw.iter().zip(rw.into_iter()) {
                match (read, write) {
                    (true, true) => src_dst.push(operand.clone()),
                    (true, false) => source.push(operand.clone()),
                    (false, true) => destination.push(operand.clone()),
                    (false, false) => {}
                }
            }
        }
        _ => apply_default_rule(isa.isa(), &raw, &mut source, &mut destination),
    }

    if has_memory_operand(source.iter().chain(src_dst.iter())) {
        form.flags.insert(Flag::HasLoad);
    } else {
        form.flags.remove(&Flag::HasLoad);
    }
    if has_memory_operand(destination.iter().chain(src_dst.iter())) {
        form.flags.insert(Flag::HasStore);
    } else {
        form.flags.remove(&Flag::HasStore);
    }

    form.operands = Some(Operands {
        source,
        destination,
        src_dst,
        operand_list: raw,
    });
}

fn has_memory_operand<'a>(mut operands: impl Iterator<Item = &'a Operand>) -> bool {
    operands.any(|op| op.is_memory())
}

/// The x86-AT&T / AArch64 default operand-classification rule: last
/// operand is the destination on x86-AT&T, first operand is the
/// destination on AArch64; all others are source; `src_dst` is always
/// empty under the default rule.
fn apply_default_rule(
    isa: Isa,
    operands: &[Operand],
    source: &mut Vec<Operand>,
    destination: &mut Vec<Operand>,
) {
    if operands.is_empty() {
        return;
    }
    match isa {
        Isa::X86Att => {
            let (rest, last) = operands.split_at(operands.len() - 1);
            source.extend_from_slice(rest);
            destination.extend_from_slice(last);
        }
        Isa::Aarch64 => {
            let (first, rest) = operands.split_at(1);
            destination.extend_from_slice(first);
            source.extend_from_slice(rest);
        }
    }
}
