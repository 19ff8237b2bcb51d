/// Instruction set architecture a [`crate::model::MachineModel`] and
/// [`crate::isa::IsaSemantics`] implementation are written for.
///
/// The core ships a default operand-classification rule and a register
/// aliasing table for exactly these two, per the Design Notes: register
/// aliasing tables are ISA data, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isa {
    X86Att,
    Aarch64,
}

/// Architectural register class, used to pick a compatible DB entry and to
/// select the right synthetic register in the memory->register fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    Integer,
    FloatingPoint,
    Vector,
    Predicate,
}

impl RegisterType {
    /// The prefix OSACA-style ISA data uses to name a register type, e.g.
    /// the synthetic `{reg_type}0` register built during the memory->register
    /// fallback on x86.
    pub fn as_str(self) -> &'static str {
        match self {
            RegisterType::Integer => "gpr",
            RegisterType::FloatingPoint => "fp",
            RegisterType::Vector => "vector",
            RegisterType::Predicate => "predicate",
        }
    }
}
