use std::collections::HashMap;

use crate::common::{Isa, RegisterType};
use crate::isa::{IsaSemantics, OperandRwFlags};
use crate::operand::Register;

/// AArch64 ISA semantics: default operand-classification rule ("first
/// operand is destination") and the sub-register aliasing table (`x0`/`w0`
/// alias; `v0`/`q0`/`d0`/`s0`/`h0`/`b0` alias).
pub struct Aarch64Semantics {
    canonical: HashMap<String, String>,
    overrides: HashMap<String, OperandRwFlags>,
}

impl Default for Aarch64Semantics {
    fn default() -> Self {
        Self::new()
    }
}

impl Aarch64Semantics {
    pub fn new() -> Self {
        Aarch64Semantics {
            canonical: build_canonical_table(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, mnemonic: impl Into<String>, flags: OperandRwFlags) -> Self {
        self.overrides.insert(mnemonic.into().to_lowercase(), flags);
        self
    }

    fn normalize(name: &str) -> String {
        name.to_lowercase()
    }

    fn canonical_id(&self, name: &str) -> String {
        let normalized = Self::normalize(name);
        self.canonical.get(&normalized).cloned().unwrap_or(normalized)
    }
}

impl IsaSemantics for Aarch64Semantics {
    fn isa(&self) -> Isa {
        Isa::Aarch64
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
        // A bare `name` is the AT&T convention; AArch64 operands split the
        // bank into `prefix` (x/w/v/...) + numeric `name`, so compare the
        // combined form.
        self.canonical_id(&full_name(a)) == self.canonical_id(&full_name(b))
    }

    fn get_reg_type(&self, reg: &Register) -> RegisterType {
        if let Some(synthetic) = synthetic_reg_type(reg) {
            return synthetic;
        }
        let id = self.canonical_id(&full_name(reg));
        if id.starts_with('x') {
            RegisterType::Integer
        } else if id.starts_with('v') {
            RegisterType::Vector
        } else if id.starts_with('p') {
            RegisterType::Predicate
        } else {
            RegisterType::Integer
        }
    }

    fn synthetic_register(&self, reg_type: RegisterType) -> Register {
        Register::new("0").with_prefix(reg_type.as_str())
    }
}

fn full_name(reg: &Register) -> String {
    match &reg.prefix {
        Some(prefix) => format!("{prefix}{}", reg.name),
        None => reg.name.clone(),
    }
}

/// Recognizes the synthetic register built by `synthetic_register`
/// (`prefix: reg_type, name: "0"`).
fn synthetic_reg_type(reg: &Register) -> Option<RegisterType> {
    let prefix = reg.prefix.as_deref()?;
    if reg.name != "0" {
        return None;
    }
    for ty in [
        RegisterType::Integer,
        RegisterType::FloatingPoint,
        RegisterType::Vector,
        RegisterType::Predicate,
    ] {
        if prefix == ty.as_str() {
            return Some(ty);
        }
    }
    None
}

fn build_canonical_table() -> HashMap<String, String> {
    let mut table = HashMap::new();
    for i in 0..=30 {
        let canonical = format!("x{i}");
        table.insert(format!("x{i}"), canonical.clone());
        table.insert(format!("w{i}"), canonical);
    }
    table.insert("sp".to_string(), "sp".to_string());
    table.insert("xzr".to_string(), "xzr".to_string());
    table.insert("wzr".to_string(), "xzr".to_string());
    for i in 0..=31 {
        let canonical = format!("v{i}");
        for bank in ["v", "q", "d", "s", "h", "b"] {
            table.insert(format!("{bank}{i}"), canonical.clone());
        }
    }
    for i in 0..=15 {
        table.insert(format!("p{i}"), format!("p{i}"));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_and_w_alias() {
        let isa = Aarch64Semantics::new();
        let x0 = Register::new("0").with_prefix("x");
        let w0 = Register::new("0").with_prefix("w");
        assert!(isa.is_reg_dependent_of(&x0, &w0));
        assert_eq!(isa.get_reg_type(&x0), RegisterType::Integer);
    }

    #[test]
    fn vector_bank_letters_alias() {
        let isa = Aarch64Semantics::new();
        let v0 = Register::new("0").with_prefix("v");
        let d0 = Register::new("0").with_prefix("d");
        let q0 = Register::new("0").with_prefix("q");
        assert!(isa.is_reg_dependent_of(&v0, &d0));
        assert!(isa.is_reg_dependent_of(&d0, &q0));
    }

    #[test]
    fn different_indices_do_not_alias() {
        let isa = Aarch64Semantics::new();
        let x0 = Register::new("0").with_prefix("x");
        let x1 = Register::new("1").with_prefix("x");
        assert!(!isa.is_reg_dependent_of(&x0, &x1));
    }

    #[test]
    fn synthetic_register_roundtrips_its_type() {
        let isa = Aarch64Semantics::new();
        let synth = isa.synthetic_register(RegisterType::Vector);
        assert_eq!(isa.get_reg_type(&synth), RegisterType::Vector);
    }
}
