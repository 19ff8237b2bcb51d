//! The machine model: a read-only query surface over a per-CPU
//! instruction database. Keyed lookups return owned copies or immutable
//! views; nothing here mutates.

mod static_model;

pub use static_model::StaticMachineModel;

use crate::common::{Isa, RegisterType};
use crate::operand::{Memory, Operand};

/// A DB representation of an instruction's port pressure, which may list
/// alternative port sets (e.g. "1 cycle on `{p0|p1}`") before
/// [`MachineModel::average_port_pressure`] collapses it into a
/// length-`P` vector.
#[derive(Debug, Clone, PartialEq)]
pub enum PortPressureSpec {
    /// A fixed number of cycles charged to one port, by index into
    /// [`MachineModel::ports`].
    Port { port: usize, cycles: f64 },
    /// A number of cycles distributed evenly across any of the listed
    /// ports (by index).
    Alternatives { ports: Vec<usize>, cycles: f64 },
}

/// The DB-native port pressure representation for one instruction or load
/// entry, before collapsing.
pub type PortPressureDb = Vec<PortPressureSpec>;

/// One instruction DB entry: throughput/latency may be absent (`None`),
/// which the caller treats as "unknown" per §7.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionEntry {
    pub throughput: Option<f64>,
    pub latency: Option<f64>,
    pub port_pressure: PortPressureDb,
}

/// The shape an instruction DB entry's operand is matched against:
/// variant tag plus, for registers, the register-type class and an
/// optional required width.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandShape {
    Register { reg_type: RegisterType, width: Option<u32> },
    Memory,
    Immediate,
}

/// Read-only query surface over a per-CPU instruction database, per §4.1.
pub trait MachineModel {
    fn isa(&self) -> Isa;
    fn ports(&self) -> &[String];
    fn data_ports(&self) -> &[String];
    fn has_hidden_loads(&self) -> bool;

    /// Looks up the DB entry whose mnemonic matches case-insensitively and
    /// whose operand shapes match `operands` positionally (variant tag,
    /// plus register-type/width compatibility for registers; immediates
    /// match any immediate; memory matches memory irrespective of inner
    /// register types).
    fn get_instruction(&self, mnemonic: &str, operands: &[Operand]) -> Option<&InstructionEntry>;

    /// Returns the port-pressure vector for a bare load of `memory`'s
    /// addressing mode, in DB form (pre-collapse).
    fn get_load_throughput(&self, memory: &Memory) -> PortPressureDb;

    /// The added latency of a bare load into a register of `reg_type`.
    fn get_load_latency(&self, reg_type: RegisterType) -> f64;

    /// An optional elementwise scale factor applied to a bare load's port
    /// pressure during the memory->register fallback, keyed by the
    /// register type being loaded into.
    fn load_throughput_multiplier(&self, reg_type: RegisterType) -> Option<f64>;

    /// Collapses a DB port-pressure representation into a length-`P`
    /// vector by even distribution across alternative port sets.
    fn average_port_pressure(&self, entry: &PortPressureDb) -> Vec<f64> {
        let mut out = vec![0.0; self.ports().len()];
        for spec in entry {
            match spec {
                PortPressureSpec::Port { port, cycles } => {
                    if let Some(slot) = out.get_mut(*port) {
                        *slot += cycles;
                    }
                }
                PortPressureSpec::Alternatives { ports, cycles } => {
                    if ports.is_empty() {
                        continue;
                    }
                    let share = cycles / ports.len() as f64;
                    for port in ports {
                        if let Some(slot) = out.get_mut(*port) {
                            *slot += share;
                        }
                    }
                }
            }
        }
        out
    }
}
