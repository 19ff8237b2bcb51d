use std::collections::HashMap;

use crate::common::{Isa, RegisterType};
use crate::isa::{IsaSemantics, OperandRwFlags};
use crate::operand::Register;

/// x86-AT&T ISA semantics: default operand-classification rule ("last
/// operand is destination") and the sub-register aliasing table (`rax` /
/// `eax` / `ax` / `al` / `ah` all name one architectural resource, etc).
pub struct X86AttSemantics {
    /// Maps a normalized (lowercase) register name to its canonical
    /// resource id. Two registers alias iff they map to the same id.
    canonical: HashMap<String, String>,
    /// Explicit per-mnemonic operand read/write overrides, for the
    /// instructions whose default rule doesn't apply. Empty unless
    /// populated via `with_override` — full ISA-semantics-YAML loading is
    /// out of scope for this crate.
    overrides: HashMap<String, OperandRwFlags>,
}

impl Default for X86AttSemantics {
    fn default() -> Self {
        Self::new()
    }
}

impl X86AttSemantics {
    pub fn new() -> Self {
        X86AttSemantics {
            canonical: build_canonical_table(),
            overrides: HashMap::new(),
        }
    }

    /// Registers an explicit per-operand read/write description for
    /// `mnemonic`, overriding the default last-operand-is-destination rule.
    pub fn with_override(mut self, mnemonic: impl Into<String>, flags: OperandRwFlags) -> Self {
        self.overrides.insert(mnemonic.into().to_lowercase(), flags);
        self
    }

    fn normalize(name: &str) -> String {
        name.trim_start_matches('%').to_lowercase()
    }

    fn canonical_id(&self, name: &str) -> String {
        let normalized = Self::normalize(name);
        self.canonical.get(&normalized).cloned().unwrap_or(normalized)
    }
}

impl IsaSemantics for X86AttSemantics {
    fn isa(&self) -> Isa {
        Isa::X86Att
    }

    fn operand_rw_flags(&self, mnemonic: &str, operand_count: usize) -> Option<OperandRwFlags> {
        let flags = self.overrides.get(&mnemonic.to_lowercase())?;
        if flags.len() == operand_count {
            Some(flags.clone())
        } else {
            None
        }
    }

    fn is_reg_dependent_of(&self, a: &Register, b: &Register) -> bool {
        self.canonical_id(&a.name) == self.canonical_id(&b.name)
    }

    fn get_reg_type(&self, reg: &Register) -> RegisterType {
        if let Some(synthetic) = synthetic_reg_type(reg) {
            return synthetic;
        }
        let id = self.canonical_id(&reg.name);
        if id.starts_with('v') {
            RegisterType::Vector
        } else if id.starts_with('k') {
            RegisterType::Predicate
        } else if id.starts_with("st") || id.starts_with("mm") {
            RegisterType::FloatingPoint
        } else {
            RegisterType::Integer
        }
    }

    fn synthetic_register(&self, reg_type: RegisterType) -> Register {
        Register::new(format!("{}0", reg_type.as_str()))
    }
}

/// Recognizes the synthetic register built by `synthetic_register`
/// (`{reg_type}0`, with no prefix) so the memory->register fallback's
/// substituted operand classifies back to the type it was built from.
fn synthetic_reg_type(reg: &Register) -> Option<RegisterType> {
    if reg.prefix.is_some() {
        return None;
    }
    for ty in [
        RegisterType::Integer,
        RegisterType::FloatingPoint,
        RegisterType::Vector,
        RegisterType::Predicate,
    ] {
        if reg.name == format!("{}0", ty.as_str()) {
            return Some(ty);
        }
    }
    None
}

fn build_canonical_table() -> HashMap<String, String> {
    let mut table = HashMap::new();
    let gprs: &[(&str, &[&str])] = &[
        ("rax", &["rax", "eax", "ax", "al", "ah"]),
        ("rbx", &["rbx", "ebx", "bx", "bl", "bh"]),
        ("rcx", &["rcx", "ecx", "cx", "cl", "ch"]),
        ("rdx", &["rdx", "edx", "dx", "dl", "dh"]),
        ("rsi", &["rsi", "esi", "si", "sil"]),
        ("rdi", &["rdi", "edi", "di", "dil"]),
        ("rbp", &["rbp", "ebp", "bp", "bpl"]),
        ("rsp", &["rsp", "esp", "sp", "spl"]),
    ];
    for (canonical, aliases) in gprs {
        for alias in *aliases {
            table.insert(alias.to_string(), canonical.to_string());
        }
    }
    for i in 8..=15 {
        let canonical = format!("r{i}");
        for suffix in ["", "d", "w", "b"] {
            table.insert(format!("r{i}{suffix}"), canonical.clone());
        }
    }
    for i in 0..=31 {
        let canonical = format!("v{i}");
        for bank in ["xmm", "ymm", "zmm"] {
            table.insert(format!("{bank}{i}"), canonical.clone());
        }
    }
    for i in 0..=7 {
        table.insert(format!("k{i}"), format!("k{i}"));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_registers_alias() {
        let isa = X86AttSemantics::new();
        assert!(isa.is_reg_dependent_of(&Register::new("rax"), &Register::new("eax")));
        assert!(isa.is_reg_dependent_of(&Register::new("al"), &Register::new("ah")));
        assert!(!isa.is_reg_dependent_of(&Register::new("rax"), &Register::new("rbx")));
    }

    #[test]
    fn vector_registers_alias_across_widths() {
        let isa = X86AttSemantics::new();
        assert!(isa.is_reg_dependent_of(&Register::new("xmm3"), &Register::new("ymm3")));
        assert_eq!(isa.get_reg_type(&Register::new("zmm0")), RegisterType::Vector);
    }

    #[test]
    fn synthetic_register_roundtrips_its_type() {
        let isa = X86AttSemantics::new();
        let synth = isa.synthetic_register(RegisterType::Integer);
        assert_eq!(isa.get_reg_type(&synth), RegisterType::Integer);
    }
}
