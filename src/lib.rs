//! Static micro-architectural throughput/latency analysis core for
//! straight-line assembly kernels: given a parsed kernel, a machine model,
//! and an ISA semantics description, annotate each instruction form with
//! its throughput/latency/port-pressure, then compute the kernel's
//! critical path and loop-carried dependencies.
//!
//! This crate owns the analysis core only: parsing assembly text into
//! [`kernel::InstructionForm`]s and loading machine-model/ISA-semantics
//! data from on-disk databases are driver concerns, left to callers.

pub mod arch;
pub mod common;
pub mod depgraph;
pub mod isa;
pub mod kernel;
pub mod model;
pub mod operand;

pub use arch::ArchSemantics;
pub use common::{AnalysisError, Isa, RegisterType};
pub use depgraph::{KernelDg, LoopCarriedDependency};
pub use isa::{Aarch64Semantics, IsaSemantics, X86AttSemantics};
pub use kernel::{Flag, InstructionForm, Operands};
pub use model::{InstructionEntry, MachineModel, OperandShape, PortPressureDb, PortPressureSpec, StaticMachineModel};
pub use operand::{Identifier, Immediate, ImmediateValue, Memory, Operand, Register};
