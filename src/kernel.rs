//! The kernel: the owned sequence of [`InstructionForm`]s annotated in
//! place by [`crate::arch::ArchSemantics`] and consumed by
//! [`crate::depgraph::KernelDg`].

use std::collections::BTreeSet;

use crate::operand::Operand;

/// Semantic tags attached to an instruction form during annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// No throughput entry was found for this form (after the
    /// memory->register fallback was attempted).
    TpUnknown,
    /// No latency entry was found for this form.
    LtUnknown,
    /// Port pressure sums to zero although throughput is known: the
    /// instruction isn't bound to a specific port.
    NotBound,
    /// This load's port pressure was zeroed because an adjacent store
    /// covers its issue on a hidden-load architecture. Implies `HasLoad`.
    HiddenLoad,
    /// At least one source or src/dst operand is a memory reference.
    HasLoad,
    /// At least one destination or src/dst operand is a memory reference.
    HasStore,
    /// Shorthand set alongside `HasLoad` once throughput/latency have
    /// been assigned.
    Load,
}

/// Operands of one instruction form, classified by read/write role.
///
/// `source`, `destination`, and `src_dst` partition-with-overlap
/// `operand_list`: each position appears in exactly one of the three.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operands {
    pub source: Vec<Operand>,
    pub destination: Vec<Operand>,
    pub src_dst: Vec<Operand>,
    pub operand_list: Vec<Operand>,
}

/// One line of a kernel: either a real instruction (mnemonic present) or a
/// label/comment/directive line (mnemonic absent).
///
/// Lifecycle: constructed by the parser with all annotation fields at
/// their zero/empty defaults (`RAW`), then `operands` is populated by
/// `assign_src_dst` (`CLASSIFIED`), then the timing fields are populated by
/// `assign_tp_lt` (`TIMED`), and finally (on hidden-load architectures)
/// `HiddenLoad` may be added to `flags` (`HIDDEN_APPLIED`). Re-running a
/// pass at the same stage is idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionForm {
    pub line_number: u32,
    pub mnemonic: Option<String>,
    /// The operand list as delivered by the parser, in positional order.
    /// `None` for label/comment/directive lines. Untouched by annotation.
    pub raw_operands: Option<Vec<Operand>>,
    /// `None` until `assign_src_dst` has run.
    pub operands: Option<Operands>,
    pub comment: Option<String>,
    pub label_name: Option<String>,
    pub flags: BTreeSet<Flag>,
    pub throughput: f64,
    pub latency: f64,
    pub latency_wo_load: f64,
    pub port_pressure: Vec<f64>,
    pub latency_cp: f64,
    pub latency_lcd: f64,
}

impl InstructionForm {
    /// Builds a fresh, unannotated (`RAW`) instruction form as the parser
    /// would deliver it.
    pub fn new(line_number: u32, mnemonic: Option<String>, operands: Option<Vec<Operand>>) -> Self {
        InstructionForm {
            line_number,
            mnemonic,
            raw_operands: operands,
            operands: None,
            comment: None,
            label_name: None,
            flags: BTreeSet::new(),
            throughput: 0.0,
            latency: 0.0,
            latency_wo_load: 0.0,
            port_pressure: Vec::new(),
            latency_cp: 0.0,
            latency_lcd: 0.0,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn label(line_number: u32, name: impl Into<String>) -> Self {
        let mut form = InstructionForm::new(line_number, None, None);
        form.label_name = Some(name.into());
        form
    }

    /// A label/comment/directive line: no mnemonic to classify or time.
    pub fn is_pseudo(&self) -> bool {
        self.mnemonic.is_none()
    }
}
