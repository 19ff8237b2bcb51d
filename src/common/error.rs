use crate::common::Isa;

/// The crate's single public error type.
///
/// Per the error handling design, recoverable conditions (DB shape
/// mismatch, ambiguous load type, unknown instruction) never produce an
/// `AnalysisError` — they degrade the affected instruction form's
/// annotation in place and are reported through `log::warn!`. Only the
/// conditions below are ever returned to a caller.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Raised at `ArchSemantics::new` when the supplied `IsaSemantics`
    /// implementation doesn't describe the machine model's own ISA. A
    /// straight-line kernel can't be annotated without a matching ISA
    /// semantics description, so this is fatal rather than a degraded
    /// annotation.
    #[error("machine model targets {model_isa:?} but ISA semantics describes {semantics_isa:?}")]
    MissingIsaSemantics {
        model_isa: Isa,
        semantics_isa: Isa,
    },

    /// The single-kernel dependency graph was found to be cyclic when
    /// computing the critical path or loop-carried dependencies. Per §7
    /// this must never occur for a straight-line kernel; surfaced as a
    /// typed error rather than panicking so a caller can report it as a
    /// malformed-input condition.
    #[error("kernel dependency graph is cyclic, cannot compute {0}")]
    CyclicDependencyGraph(&'static str),
}
