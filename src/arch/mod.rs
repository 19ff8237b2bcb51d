//! Arch semantics: combines an [`IsaSemantics`] implementation with a
//! [`MachineModel`] to annotate each instruction form with throughput,
//! latency, and port pressure, then applies the hidden-load pass.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::common::{AnalysisError, RegisterType};
use crate::isa::{assign_src_dst, IsaSemantics};
use crate::kernel::{Flag, InstructionForm, Operands};
use crate::model::MachineModel;
use crate::operand::{Memory, Operand, Register};

/// Annotates a kernel in place with throughput/latency/port-pressure data,
/// per §4.3 and §4.4.
pub struct ArchSemantics {
    machine_model: Rc<dyn MachineModel>,
    isa_semantics: Rc<dyn IsaSemantics>,
}

struct FallbackResult {
    throughput: f64,
    latency: f64,
    latency_wo_load: f64,
    port_pressure: Vec<f64>,
}

impl ArchSemantics {
    /// Fails with `AnalysisError::MissingIsaSemantics` if `isa_semantics`
    /// doesn't describe `machine_model`'s own ISA — a kernel can't be
    /// annotated without a matching ISA semantics description (§7).
    pub fn new(
        machine_model: Rc<dyn MachineModel>,
        isa_semantics: Rc<dyn IsaSemantics>,
    ) -> Result<Self, AnalysisError> {
        if machine_model.isa() != isa_semantics.isa() {
            return Err(AnalysisError::MissingIsaSemantics {
                model_isa: machine_model.isa(),
                semantics_isa: isa_semantics.isa(),
            });
        }
        Ok(ArchSemantics { machine_model, isa_semantics })
    }

    /// Summary function: classifies and times every form in `kernel`, then
    /// runs the hidden-load pass if the machine model calls for it.
    pub fn add_semantics(&self, kernel: &mut [InstructionForm]) {
        for form in kernel.iter_mut() {
            assign_src_dst(form, self.isa_semantics.as_ref());
            self.assign_tp_lt(form);
        }
        self.apply_hidden_loads(kernel);
    }

    /// Assigns `throughput`, `latency`, `latency_wo_load`, and
    /// `port_pressure` to `form`, per §4.3. Idempotent given an
    /// unmodified machine model: re-running reproduces identical values.
    pub fn assign_tp_lt(&self, form: &mut InstructionForm) {
        let port_count = self.machine_model.ports().len();

        if form.is_pseudo() {
            form.throughput = 0.0;
            form.latency = 0.0;
            form.latency_wo_load = 0.0;
            form.port_pressure = vec![0.0; port_count];
            form.latency_cp = 0.0;
            form.latency_lcd = 0.0;
            return;
        }

        let mnemonic = form.mnemonic.clone().unwrap_or_default();
        let operands = form.operands.clone().unwrap_or_default();

        if let Some(entry) = self.machine_model.get_instruction(&mnemonic, &operands.operand_list) {
            let mut port_pressure = self.machine_model.average_port_pressure(&entry.port_pressure);
            if port_pressure.len() != port_count {
                log::warn!(
                    "port pressure could not be imported correctly from database for '{mnemonic}' \
                     (expected {port_count} entries, got {}); falling back to zero vector",
                    port_pressure.len()
                );
                port_pressure = vec![0.0; port_count];
                form.flags.insert(Flag::TpUnknown);
            } else if port_pressure.iter().sum::<f64>() == 0.0 && entry.throughput.is_some() {
                form.flags.insert(Flag::NotBound);
            }

            let throughput = entry.throughput.unwrap_or_else(|| {
                form.flags.insert(Flag::TpUnknown);
                0.0
            });
            let latency = entry.latency.unwrap_or_else(|| {
                form.flags.insert(Flag::LtUnknown);
                0.0
            });

            form.throughput = throughput;
            form.latency = latency;
            form.latency_wo_load = latency;
            form.port_pressure = port_pressure;
            if form.flags.contains(&Flag::HasLoad) {
                form.flags.insert(Flag::Load);
            }
        } else if form.flags.contains(&Flag::HasLoad) {
            match self.memory_register_fallback(&mnemonic, &operands) {
                Some(result) => {
                    form.throughput = result.throughput;
                    form.latency = result.latency;
                    form.latency_wo_load = result.latency_wo_load;
                    form.port_pressure = result.port_pressure;
                    form.flags.insert(Flag::Load);
                }
                None => self.mark_unknown(form, port_count),
            }
        } else {
            self.mark_unknown(form, port_count);
        }

        form.latency_cp = 0.0;
        form.latency_lcd = 0.0;
    }

    fn mark_unknown(&self, form: &mut InstructionForm, port_count: usize) {
        form.throughput = 0.0;
        form.latency = 0.0;
        form.latency_wo_load = 0.0;
        form.port_pressure = vec![0.0; port_count];
        form.flags.insert(Flag::TpUnknown);
        form.flags.insert(Flag::LtUnknown);
    }

    /// Folds a memory-operand load into the equivalent register-form
    /// instruction, per §4.3 step 4. Returns `None` when the DB has no
    /// register-form entry either (truly unknown instruction).
    fn memory_register_fallback(&self, mnemonic: &str, operands: &Operands) -> Option<FallbackResult> {
        let registers: Vec<&Register> =
            operands.operand_list.iter().filter_map(Operand::as_register).collect();
        let reg_type = if registers.is_empty() {
            log::warn!("no register operand found to determine load type for '{mnemonic}', assuming integer");
            RegisterType::Integer
        } else {
            let types: Vec<RegisterType> =
                registers.iter().map(|r| self.isa_semantics.get_reg_type(r)).collect();
            let first = types[0];
            if types.iter().any(|t| *t != first) {
                log::warn!("load type could not be identified clearly for '{mnemonic}'");
            }
            first
        };

        let substituted: Vec<Operand> = operands
            .operand_list
            .iter()
            .map(|operand| match operand {
                Operand::Memory(_) => Operand::Register(self.isa_semantics.synthetic_register(reg_type)),
                other => other.clone(),
            })
            .collect();

        let entry_reg = self.machine_model.get_instruction(mnemonic, &substituted)?;
        let memory_source = first_memory_source(operands)?;

        let mut load_pp = self
            .machine_model
            .average_port_pressure(&self.machine_model.get_load_throughput(memory_source));
        if let Some(multiplier) = self.machine_model.load_throughput_multiplier(reg_type) {
            for value in load_pp.iter_mut() {
                *value *= multiplier;
            }
        }
        let reg_pp = self.machine_model.average_port_pressure(&entry_reg.port_pressure);
        let port_pressure: Vec<f64> = load_pp.iter().zip(reg_pp.iter()).map(|(a, b)| a + b).collect();

        let max_load = load_pp.iter().cloned().fold(0.0_f64, f64::max);
        let throughput = max_load.max(entry_reg.throughput.unwrap_or(0.0));
        let latency = self.machine_model.get_load_latency(reg_type) + entry_reg.latency.unwrap_or(0.0);
        let latency_wo_load = entry_reg.latency.unwrap_or(0.0);

        Some(FallbackResult { throughput, latency, latency_wo_load, port_pressure })
    }

    /// Hides loads covered by stores on hidden-load architectures, per
    /// §4.4. A no-op unless `machine_model.has_hidden_loads()`.
    pub fn apply_hidden_loads(&self, kernel: &mut [InstructionForm]) {
        if !self.machine_model.has_hidden_loads() {
            return;
        }

        let mut loads = Vec::new();
        let mut stores = Vec::new();
        for (index, form) in kernel.iter().enumerate() {
            let has_load = form.flags.contains(&Flag::HasLoad);
            let has_store = form.flags.contains(&Flag::HasStore);
            if has_load && !has_store {
                loads.push(index);
            } else if has_store && !has_load {
                stores.push(index);
            }
        }
        if loads.is_empty() || stores.is_empty() {
            return;
        }

        let data_ports = self.data_port_indices();
        if loads.len() <= stores.len() {
            for index in loads {
                hide_load(&mut kernel[index], &data_ports);
            }
            return;
        }

        let mut hidden: BTreeSet<usize> = BTreeSet::new();
        for store in stores {
            let store_line = kernel[store].line_number as i64;
            let candidate = loads
                .iter()
                .filter(|index| !hidden.contains(index))
                .min_by_key(|&&index| {
                    let load_line = kernel[index].line_number as i64;
                    ((load_line - store_line).abs(), load_line)
                })
                .copied();
            if let Some(index) = candidate {
                hidden.insert(index);
                hide_load(&mut kernel[index], &data_ports);
            }
        }
    }

    fn data_port_indices(&self) -> Vec<usize> {
        let ports = self.machine_model.ports();
        self.machine_model
            .data_ports()
            .iter()
            .filter_map(|data_port| ports.iter().position(|port| port == data_port))
            .collect()
    }

    /// Elementwise sum of `kernel`'s port pressure vectors, rounded to 2
    /// decimals, per §6's downstream interface.
    pub fn throughput_sum(kernel: &[InstructionForm]) -> Vec<f64> {
        let width = kernel.iter().map(|form| form.port_pressure.len()).max().unwrap_or(0);
        let mut sum = vec![0.0; width];
        for form in kernel {
            for (slot, value) in sum.iter_mut().zip(form.port_pressure.iter()) {
                *slot += value;
            }
        }
        sum.into_iter().map(|v| (v * 100.0).round() / 100.0).collect()
    }
}

/// The first memory operand in `source ∪ src_dst`, in positional order —
/// this crate's resolution of the Open Question in §9 about which memory
/// source feeds the fallback's load cost when a form reads more than one.
fn first_memory_source(operands: &Operands) -> Option<&Memory> {
    operands.operand_list.iter().find_map(|operand| match operand {
        Operand::Memory(memory) => {
            let is_source = operands.source.contains(operand) || operands.src_dst.contains(operand);
            is_source.then_some(memory)
        }
        _ => None,
    })
}

fn hide_load(form: &mut InstructionForm, data_ports: &[usize]) {
    form.flags.insert(Flag::HiddenLoad);
    for &index in data_ports {
        if let Some(slot) = form.port_pressure.get_mut(index) {
            *slot = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::X86AttSemantics;
    use crate::model::{InstructionEntry, OperandShape, PortPressureSpec, StaticMachineModel};

    fn x86_model(has_hidden_loads: bool) -> Rc<StaticMachineModel> {
        Rc::new(
            StaticMachineModel::new(
                Rc::new(X86AttSemantics::new()),
                vec!["p0".into(), "p1".into(), "p_ld".into(), "p_st".into()],
                vec!["p_ld".into(), "p_st".into()],
                has_hidden_loads,
            )
            .with_instruction(
                "movq",
                vec![
                    OperandShape::Register { reg_type: RegisterType::Integer, width: None },
                    OperandShape::Register { reg_type: RegisterType::Integer, width: None },
                ],
                InstructionEntry {
                    throughput: Some(0.5),
                    latency: Some(1.0),
                    port_pressure: vec![
                        PortPressureSpec::Port { port: 0, cycles: 0.5 },
                        PortPressureSpec::Port { port: 1, cycles: 0.5 },
                    ],
                },
            )
            .with_load_throughput(
                RegisterType::Integer,
                None,
                vec![
                    PortPressureSpec::Port { port: 2, cycles: 0.5 },
                    PortPressureSpec::Port { port: 3, cycles: 0.5 },
                ],
            )
            .with_load_latency(RegisterType::Integer, 4.0),
        )
    }

    fn arch(machine_model: Rc<dyn MachineModel>) -> ArchSemantics {
        ArchSemantics::new(machine_model, Rc::new(X86AttSemantics::new())).unwrap()
    }

    #[test]
    fn memory_register_fallback_folds_load_into_register_form() {
        // movq (%rcx), %rax -- no memory-form DB entry, register form exists.
        let model = x86_model(false);
        let arch = arch(model);
        let mut form = InstructionForm::new(
            1,
            Some("movq".into()),
            Some(vec![
                Operand::Memory(Memory::with_base(Register::new("rcx"))),
                Operand::Register(Register::new("rax")),
            ]),
        );
        arch.add_semantics(std::slice::from_mut(&mut form));

        assert_eq!(form.throughput, 0.5);
        assert_eq!(form.latency, 5.0);
        assert_eq!(form.latency_wo_load, 1.0);
        assert_eq!(form.port_pressure, vec![0.5, 0.5, 0.5, 0.5]);
        assert!(form.flags.contains(&Flag::HasLoad));
        assert!(form.flags.contains(&Flag::Load));
    }

    #[test]
    fn unknown_instruction_sets_both_unknown_flags() {
        let model = x86_model(false);
        let arch = arch(model);
        let mut form = InstructionForm::new(
            1,
            Some("vfmadd".into()),
            Some(vec![Operand::Register(Register::new("rax")), Operand::Register(Register::new("rbx"))]),
        );
        arch.add_semantics(std::slice::from_mut(&mut form));
        assert!(form.flags.contains(&Flag::TpUnknown));
        assert!(form.flags.contains(&Flag::LtUnknown));
        assert_eq!(form.throughput, 0.0);
        assert_eq!(form.latency, 0.0);
    }

    #[test]
    fn assign_tp_lt_is_idempotent() {
        let model = x86_model(false);
        let arch = arch(model);
        let mut form = InstructionForm::new(
            1,
            Some("movq".into()),
            Some(vec![Operand::Register(Register::new("rdx")), Operand::Register(Register::new("rax"))]),
        );
        arch.add_semantics(std::slice::from_mut(&mut form));
        let first = (form.throughput, form.latency, form.port_pressure.clone(), form.flags.clone());
        arch.assign_tp_lt(&mut form);
        let second = (form.throughput, form.latency, form.port_pressure.clone(), form.flags.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn hidden_load_pass_hides_all_loads_when_loads_le_stores() {
        // ports=[p0,p1,p_ld,p_st], 1 load (ld <= 2 stores would be le) ->
        // construct 1 load + 2 stores so loads.len() <= stores.len().
        let model = x86_model(true);
        let arch = arch(model);
        let mut kernel = vec![
            InstructionForm::new(
                10,
                Some("movq".into()),
                Some(vec![
                    Operand::Memory(Memory::with_base(Register::new("rcx"))),
                    Operand::Register(Register::new("rax")),
                ]),
            ),
            InstructionForm::new(
                15,
                Some("movq".into()),
                Some(vec![
                    Operand::Register(Register::new("rbx")),
                    Operand::Memory(Memory::with_base(Register::new("rdi"))),
                ]),
            ),
            InstructionForm::new(
                25,
                Some("movq".into()),
                Some(vec![
                    Operand::Register(Register::new("rbx")),
                    Operand::Memory(Memory::with_base(Register::new("rdi"))),
                ]),
            ),
        ];
        arch.add_semantics(&mut kernel);
        assert!(kernel[0].flags.contains(&Flag::HiddenLoad));
        assert_eq!(kernel[0].port_pressure[2], 0.0);
        assert_eq!(kernel[0].port_pressure[3], 0.0);
    }

    #[test]
    fn hidden_load_pass_pairs_each_store_with_its_nearest_load_when_loads_exceed_stores() {
        // 3 pure loads at lines 10, 20, 30 and 2 pure stores at 15, 25:
        // store 15 pairs with load 10, store 25 pairs with load 20, load
        // 30 stays visible.
        let model = x86_model(true);
        let arch = arch(model);
        let load = |line: u32| {
            InstructionForm::new(
                line,
                Some("movq".into()),
                Some(vec![
                    Operand::Memory(Memory::with_base(Register::new("rcx"))),
                    Operand::Register(Register::new("rax")),
                ]),
            )
        };
        let store = |line: u32| {
            InstructionForm::new(
                line,
                Some("movq".into()),
                Some(vec![
                    Operand::Register(Register::new("rbx")),
                    Operand::Memory(Memory::with_base(Register::new("rdi"))),
                ]),
            )
        };
        let mut kernel = vec![load(10), store(15), load(20), store(25), load(30)];
        arch.add_semantics(&mut kernel);

        let hidden_lines: Vec<u32> = kernel
            .iter()
            .filter(|f| f.flags.contains(&Flag::HiddenLoad))
            .map(|f| f.line_number)
            .collect();
        assert_eq!(hidden_lines, vec![10, 20]);

        let load_30 = kernel.iter().find(|f| f.line_number == 30).unwrap();
        assert!(!load_30.flags.contains(&Flag::HiddenLoad));
        assert_ne!(load_30.port_pressure[2], 0.0);
    }
}
