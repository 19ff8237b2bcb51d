use std::rc::Rc;

use crate::common::{Isa, RegisterType};
use crate::isa::IsaSemantics;
use crate::model::{InstructionEntry, MachineModel, OperandShape, PortPressureDb};
use crate::operand::{Memory, Operand};

struct LoadThroughputEntry {
    base_reg_type: RegisterType,
    index_reg_type: Option<RegisterType>,
    port_pressure: PortPressureDb,
}

/// A simple in-memory [`MachineModel`] built by hand, rather than loaded
/// from YAML (YAML loading is out of scope for this crate — see §6). This
/// is the reference collaborator used by this crate's own tests; a real
/// driver would load its data from the machine-model YAML file and
/// implement `MachineModel` itself, likely with a similar internal shape.
pub struct StaticMachineModel {
    isa_semantics: Rc<dyn IsaSemantics>,
    ports: Vec<String>,
    data_ports: Vec<String>,
    has_hidden_loads: bool,
    instructions: Vec<(String, Vec<OperandShape>, InstructionEntry)>,
    load_throughput: Vec<LoadThroughputEntry>,
    load_latency: Vec<(RegisterType, f64)>,
    load_throughput_multiplier: Vec<(RegisterType, f64)>,
}

impl StaticMachineModel {
    pub fn new(
        isa_semantics: Rc<dyn IsaSemantics>,
        ports: Vec<String>,
        data_ports: Vec<String>,
        has_hidden_loads: bool,
    ) -> Self {
        StaticMachineModel {
            isa_semantics,
            ports,
            data_ports,
            has_hidden_loads,
            instructions: Vec::new(),
            load_throughput: Vec::new(),
            load_latency: Vec::new(),
            load_throughput_multiplier: Vec::new(),
        }
    }

    pub fn with_instruction(
        mut self,
        mnemonic: impl Into<String>,
        shapes: Vec<OperandShape>,
        entry: InstructionEntry,
    ) -> Self {
        self.instructions.push((mnemonic.into(), shapes, entry));
        self
    }

    pub fn with_load_throughput(
        mut self,
        base_reg_type: RegisterType,
        index_reg_type: Option<RegisterType>,
        port_pressure: PortPressureDb,
    ) -> Self {
        self.load_throughput.push(LoadThroughputEntry {
            base_reg_type,
            index_reg_type,
            port_pressure,
        });
        self
    }

    pub fn with_load_latency(mut self, reg_type: RegisterType, cycles: f64) -> Self {
        self.load_latency.push((reg_type, cycles));
        self
    }

    pub fn with_load_throughput_multiplier(mut self, reg_type: RegisterType, multiplier: f64) -> Self {
        self.load_throughput_multiplier.push((reg_type, multiplier));
        self
    }

    fn shape_matches(&self, shape: &OperandShape, operand: &Operand) -> bool {
        match (shape, operand) {
            (OperandShape::Register { reg_type, width }, Operand::Register(r)) => {
                self.isa_semantics.get_reg_type(r) == *reg_type && width_compatible(*width, r.width)
            }
            (OperandShape::Memory, Operand::Memory(_)) => true,
            (OperandShape::Immediate, Operand::Immediate(_)) => true,
            _ => false,
        }
    }
}

/// A DB entry with no required width matches any operand width; one with
/// a required width matches an operand that either agrees or doesn't
/// specify a width of its own.
fn width_compatible(required: Option<u32>, actual: Option<u32>) -> bool {
    match (required, actual) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(r), Some(a)) => r == a,
    }
}

impl MachineModel for StaticMachineModel {
    fn isa(&self) -> Isa {
        self.isa_semantics.isa()
    }

    fn ports(&self) -> &[String] {
        &self.ports
    }

    fn data_ports(&self) -> &[String] {
        &self.data_ports
    }

    fn has_hidden_loads(&self) -> bool {
        self.has_hidden_loads
    }

    fn get_instruction(&self, mnemonic: &str, operands: &[Operand]) -> Option<&InstructionEntry> {
        self.instructions
            .iter()
            .find(|(name, shapes, _)| {
                name.eq_ignore_ascii_case(mnemonic)
                    && shapes.len() == operands.len()
                    && shapes.iter().zip(operands).all(|(s, o)| self.shape_matches(s, o))
            })
            .map(|(_, _, entry)| entry)
    }

    fn get_load_throughput(&self, memory: &Memory) -> PortPressureDb {
        let base_type = memory.base.as_ref().map(|r| self.isa_semantics.get_reg_type(r));
        let index_type = memory.index.as_ref().map(|r| self.isa_semantics.get_reg_type(r));
        self.load_throughput
            .iter()
            .find(|entry| {
                Some(entry.base_reg_type) == base_type
                    && (entry.index_reg_type.is_none() || entry.index_reg_type == index_type)
            })
            .map(|entry| entry.port_pressure.clone())
            .unwrap_or_default()
    }

    fn get_load_latency(&self, reg_type: RegisterType) -> f64 {
        self.load_latency
            .iter()
            .find(|(ty, _)| *ty == reg_type)
            .map(|(_, cycles)| *cycles)
            .unwrap_or(0.0)
    }

    fn load_throughput_multiplier(&self, reg_type: RegisterType) -> Option<f64> {
        self.load_throughput_multiplier
            .iter()
            .find(|(ty, _)| *ty == reg_type)
            .map(|(_, mult)| *mult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::X86AttSemantics;
    use crate::model::PortPressureSpec;

    fn model() -> StaticMachineModel {
        StaticMachineModel::new(
            Rc::new(X86AttSemantics::new()),
            vec!["p0".into(), "p1".into(), "p2".into(), "p3".into()],
            vec!["p2".into(), "p3".into()],
            false,
        )
    }

    #[test]
    fn average_port_pressure_splits_alternatives_evenly() {
        let model = model();
        let entry = vec![PortPressureSpec::Alternatives { ports: vec![0, 1], cycles: 1.0 }];
        assert_eq!(model.average_port_pressure(&entry), vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn unknown_instruction_returns_none() {
        let model = model();
        assert!(model.get_instruction("nop", &[]).is_none());
    }
}
