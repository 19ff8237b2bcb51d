//! The kernel dependency graph: builds a DAG over a kernel's instruction
//! forms (an edge `a -> b` means `b` reads a register `a` writes before
//! anything else overwrites it) and exposes the critical path and
//! loop-carried dependencies computed over it, per §5.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use crate::common::AnalysisError;
use crate::isa::IsaSemantics;
use crate::kernel::InstructionForm;
use crate::operand::{Operand, Register};

/// A loop-carried dependency chain rooted at `root_line`: the line numbers
/// (in original, unmultiplied kernel order) a second iteration of the
/// kernel would need to wait on before `root_line` could itself start.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopCarriedDependency {
    pub root_line: u32,
    pub dependency_lines: Vec<u32>,
}

type EdgeMap = HashMap<u32, Vec<(u32, f64)>>;

/// Owns an annotated kernel plus the DAG built over it. Built once per
/// kernel; `critical_path` and `loop_carried_dependencies` are read-only
/// queries over the same graph.
pub struct KernelDg {
    kernel: Vec<InstructionForm>,
    isa_semantics: Rc<dyn IsaSemantics>,
    edges: EdgeMap,
}

impl KernelDg {
    /// Builds the dependency graph over `kernel`. `kernel` must already be
    /// annotated (`operands` populated by `assign_src_dst`) and ordered by
    /// ascending `line_number`, as a parser would deliver it.
    ///
    /// Fails with `AnalysisError::CyclicDependencyGraph` if the graph isn't
    /// a DAG — this should never happen for a straight-line kernel with
    /// distinct ascending line numbers, but is checked rather than assumed.
    pub fn new(kernel: Vec<InstructionForm>, isa_semantics: Rc<dyn IsaSemantics>) -> Result<Self, AnalysisError> {
        let edges = build_edges(&kernel, isa_semantics.as_ref());
        ensure_acyclic(&kernel, &edges, "construction")?;
        Ok(KernelDg { kernel, isa_semantics, edges })
    }

    pub fn kernel(&self) -> &[InstructionForm] {
        &self.kernel
    }

    /// Line numbers of the instruction forms that directly depend on the
    /// form at `line_number` (its successors in the DAG).
    pub fn dependent_instruction_forms(&self, line_number: u32) -> Vec<u32> {
        self.edges
            .get(&line_number)
            .map(|out| out.iter().map(|(dst, _)| *dst).collect())
            .unwrap_or_default()
    }

    /// The longest latency-weighted path through the DAG, per §5.2.
    ///
    /// Ties are broken deterministically: when more than one predecessor
    /// gives a node the same best length, the predecessor with the smaller
    /// line number wins; when more than one node gives the same best
    /// overall path length, the node with the smaller line number is the
    /// chosen path end.
    pub fn critical_path(&self) -> Result<Vec<&InstructionForm>, AnalysisError> {
        ensure_acyclic(&self.kernel, &self.edges, "critical path")?;

        let mut predecessors: HashMap<u32, Vec<(u32, f64)>> = HashMap::new();
        for (&src, out) in &self.edges {
            for &(dst, weight) in out {
                predecessors.entry(dst).or_default().push((src, weight));
            }
        }
        for preds in predecessors.values_mut() {
            preds.sort_unstable_by_key(|(line, _)| *line);
        }

        // `self.kernel` is in ascending line-number order, which is also a
        // valid topological order since every edge goes from an earlier
        // form to a later one.
        let mut best_len: HashMap<u32, f64> = HashMap::new();
        let mut best_pred: HashMap<u32, Option<u32>> = HashMap::new();
        for form in &self.kernel {
            let line = form.line_number;
            let mut len = 0.0;
            let mut pred = None;
            if let Some(preds) = predecessors.get(&line) {
                for &(p, weight) in preds {
                    let candidate = best_len.get(&p).copied().unwrap_or(0.0) + weight;
                    if candidate > len {
                        len = candidate;
                        pred = Some(p);
                    }
                }
            }
            best_len.insert(line, len);
            best_pred.insert(line, pred);
        }

        let mut end = self.kernel[0].line_number;
        let mut max_len = f64::MIN;
        for form in &self.kernel {
            let len = best_len[&form.line_number];
            if len > max_len {
                max_len = len;
                end = form.line_number;
            }
        }

        let mut path_lines = Vec::new();
        let mut current = Some(end);
        while let Some(line) = current {
            path_lines.push(line);
            current = best_pred[&line];
        }
        path_lines.reverse();

        Ok(path_lines
            .into_iter()
            .filter_map(|line| self.kernel.iter().find(|form| form.line_number == line))
            .collect())
    }

    /// Loop-carried dependencies via the doubled-kernel technique (§5.3):
    /// a second copy of the kernel is appended with each line number
    /// scaled by `M = |kernel| + 1`, and a dependency chain from a node
    /// `n` to `n * M` in the combined graph witnesses a cross-iteration
    /// dependency rooted at `n`.
    ///
    /// Where more than one such chain exists, this returns one
    /// representative (shortest by edge count, smallest-line-number tie
    /// break) rather than every simple path, so the result is
    /// reproducible independent of traversal order.
    pub fn loop_carried_dependencies(&self) -> Result<BTreeMap<u32, LoopCarriedDependency>, AnalysisError> {
        if self.kernel.is_empty() {
            return Ok(BTreeMap::new());
        }

        let multiplier = self.kernel.len() as u32 + 1;
        let first_line = self.kernel[0].line_number;

        let mut doubled = self.kernel.clone();
        for form in &self.kernel {
            let mut copy = form.clone();
            copy.line_number = form.line_number * multiplier;
            doubled.push(copy);
        }

        let edges = build_edges(&doubled, self.isa_semantics.as_ref());
        ensure_acyclic(&doubled, &edges, "loop-carried dependencies")?;

        let mut result = BTreeMap::new();
        for form in &self.kernel {
            let root = form.line_number;
            let target = root * multiplier;
            if let Some(path) = shortest_path(&edges, root, target) {
                let dependency_lines: Vec<u32> = path
                    .into_iter()
                    .filter(|&line| line >= first_line * multiplier)
                    .map(|line| line / multiplier)
                    .collect();
                if !dependency_lines.is_empty() {
                    result.insert(root, LoopCarriedDependency { root_line: root, dependency_lines });
                }
            }
        }
        Ok(result)
    }
}

fn build_edges(kernel: &[InstructionForm], isa: &dyn IsaSemantics) -> EdgeMap {
    let mut edges: EdgeMap = HashMap::new();
    for (i, form) in kernel.iter().enumerate() {
        let entry = edges.entry(form.line_number).or_default();
        for dep_line in find_depending(isa, form, &kernel[i + 1..]) {
            // `find_depending` may yield the same successor once per
            // distinct written register it consumes; the graph itself
            // only ever has one edge between a given pair of nodes.
            if !entry.iter().any(|(dst, _)| *dst == dep_line) {
                entry.push((dep_line, form.latency));
            }
        }
    }
    edges
}

/// For each destination operand of `form`, scans `rest` (the forms after
/// it in program order) for the next read of that register before it's
/// overwritten, per §5.1.
fn find_depending(isa: &dyn IsaSemantics, form: &InstructionForm, rest: &[InstructionForm]) -> Vec<u32> {
    let mut deps = Vec::new();
    let operands = match &form.operands {
        Some(o) => o,
        None => return deps,
    };

    for dst in operands.destination.iter().chain(operands.src_dst.iter()) {
        let tracked = match dst {
            Operand::Register(reg) => Some(reg),
            Operand::Memory(mem) if mem.pre_indexed || mem.post_indexed => mem.base.as_ref(),
            _ => None,
        };
        let Some(reg) = tracked else { continue };

        for candidate in rest {
            if is_read(isa, reg, candidate) {
                deps.push(candidate.line_number);
                if is_written(isa, reg, candidate) {
                    break;
                }
            } else if is_written(isa, reg, candidate) {
                break;
            }
        }
    }
    deps
}

/// True iff `form` reads `register`, directly as a source operand or as a
/// base/index register of any memory operand (source, destination, or
/// both — addressing always reads).
fn is_read(isa: &dyn IsaSemantics, register: &Register, form: &InstructionForm) -> bool {
    let operands = match &form.operands {
        Some(o) => o,
        None => return false,
    };
    let mut read = false;
    for op in operands.source.iter().chain(operands.src_dst.iter()) {
        match op {
            Operand::Register(r) => read |= isa.is_reg_dependent_of(register, r),
            Operand::Memory(m) => {
                if let Some(base) = &m.base {
                    read |= isa.is_reg_dependent_of(register, base);
                }
                if let Some(index) = &m.index {
                    read |= isa.is_reg_dependent_of(register, index);
                }
            }
            _ => {}
        }
    }
    for op in operands.destination.iter().chain(operands.src_dst.iter()) {
        if let Operand::Memory(m) = op {
            if let Some(base) = &m.base {
                read |= isa.is_reg_dependent_of(register, base);
            }
            if let Some(index) = &m.index {
                read |= isa.is_reg_dependent_of(register, index);
            }
        }
    }
    read
}

/// True iff `form` writes `register`, directly as a destination operand or
/// as the base register of a pre-/post-indexed memory operand (writeback).
fn is_written(isa: &dyn IsaSemantics, register: &Register, form: &InstructionForm) -> bool {
    let operands = match &form.operands {
        Some(o) => o,
        None => return false,
    };
    let mut written = false;
    for op in operands.destination.iter().chain(operands.src_dst.iter()) {
        match op {
            Operand::Register(r) => written |= isa.is_reg_dependent_of(register, r),
            Operand::Memory(m) if m.pre_indexed || m.post_indexed => {
                if let Some(base) = &m.base {
                    written |= isa.is_reg_dependent_of(register, base);
                }
            }
            _ => {}
        }
    }
    for op in operands.source.iter().chain(operands.src_dst.iter()) {
        if let Operand::Memory(m) = op {
            if m.pre_indexed || m.post_indexed {
                if let Some(base) = &m.base {
                    written |= isa.is_reg_dependent_of(register, base);
                }
            }
        }
    }
    written
}

fn ensure_acyclic(kernel: &[InstructionForm], edges: &EdgeMap, what: &'static str) -> Result<(), AnalysisError> {
    let mut indegree: HashMap<u32, usize> = kernel.iter().map(|f| (f.line_number, 0)).collect();
    for out in edges.values() {
        for (dst, _) in out {
            *indegree.entry(*dst).or_insert(0) += 1;
        }
    }
    let mut queue: VecDeque<u32> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let total = indegree.len();
    let mut visited = 0;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(out) = edges.get(&node) {
            for (dst, _) in out {
                if let Some(degree) = indegree.get_mut(dst) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dst);
                    }
                }
            }
        }
    }
    if visited == total {
        Ok(())
    } else {
        Err(AnalysisError::CyclicDependencyGraph(what))
    }
}

fn shortest_path(edges: &EdgeMap, start: u32, goal: u32) -> Option<Vec<u32>> {
    let mut visited: BTreeSet<u32> = BTreeSet::new();
    let mut queue = VecDeque::new();
    let mut parent: HashMap<u32, u32> = HashMap::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        if node == goal {
            let mut path = vec![goal];
            let mut current = goal;
            while let Some(&p) = parent.get(&current) {
                path.push(p);
                current = p;
            }
            path.reverse();
            return Some(path);
        }
        if let Some(out) = edges.get(&node) {
            let mut neighbors: Vec<u32> = out.iter().map(|(dst, _)| *dst).collect();
            neighbors.sort_unstable();
            for next in neighbors {
                if visited.insert(next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{assign_src_dst, X86AttSemantics};
    use crate::operand::Register;

    fn reg(name: &str) -> Operand {
        Operand::Register(Register::new(name))
    }

    fn form(line: u32, mnemonic: &str, operands: Vec<Operand>, latency: f64) -> InstructionForm {
        let isa = X86AttSemantics::new();
        let mut f = InstructionForm::new(line, Some(mnemonic.into()), Some(operands));
        assign_src_dst(&mut f, &isa);
        f.latency = latency;
        f
    }

    #[test]
    fn critical_path_follows_the_longest_dependency_chain() {
        // line1: movq %rax, %rbx   (writes rbx)     latency 2.0
        // line2: movq %rbx, %rcx   (reads rbx)       latency 3.0, depends on line1
        // line3: movq %rdx, %rsi   (independent)      latency 10.0
        let kernel = vec![
            form(1, "movq", vec![reg("rax"), reg("rbx")], 2.0),
            form(2, "movq", vec![reg("rbx"), reg("rcx")], 3.0),
            form(3, "movq", vec![reg("rdx"), reg("rsi")], 10.0),
        ];
        let dg = KernelDg::new(kernel, Rc::new(X86AttSemantics::new())).unwrap();
        let path = dg.critical_path().unwrap();
        let lines: Vec<u32> = path.iter().map(|f| f.line_number).collect();
        assert_eq!(lines, vec![1, 2]);
    }

    #[test]
    fn dependent_instruction_forms_reports_the_direct_successor() {
        let kernel = vec![
            form(1, "movq", vec![reg("rax"), reg("rbx")], 1.0),
            form(2, "movq", vec![reg("rbx"), reg("rcx")], 1.0),
        ];
        let dg = KernelDg::new(kernel, Rc::new(X86AttSemantics::new())).unwrap();
        assert_eq!(dg.dependent_instruction_forms(1), vec![2]);
        assert!(dg.dependent_instruction_forms(2).is_empty());
    }

    #[test]
    fn edges_are_deduplicated_when_a_successor_reads_two_registers_the_same_form_writes() {
        // line1 writes both rax and rbx (e.g. a paired-load-style form);
        // line2 reads both. find_depending walks rax's and rbx's write
        // separately and yields line2 twice -- the graph must collapse
        // that into a single edge.
        let isa = X86AttSemantics::new()
            .with_override("pairmov", vec![(false, true), (false, true)])
            .with_override("pairuse", vec![(true, false), (true, false)]);
        let mut writer = InstructionForm::new(1, Some("pairmov".into()), Some(vec![reg("rax"), reg("rbx")]));
        assign_src_dst(&mut writer, &isa);
        writer.latency = 2.0;

        let mut reader = InstructionForm::new(2, Some("pairuse".into()), Some(vec![reg("rax"), reg("rbx")]));
        assign_src_dst(&mut reader, &isa);
        reader.latency = 1.0;

        let dg = KernelDg::new(vec![writer, reader], Rc::new(isa)).unwrap();
        assert_eq!(dg.dependent_instruction_forms(1), vec![2]);
    }

    #[test]
    fn loop_carried_dependency_round_trips_through_doubled_kernel() {
        // line1: movq %rax, %rbx   (writes rbx, reads rax)
        // line2: addq %rbx, %rax   (writes rax, reads rbx)
        // Each iteration's line1 depends on the previous iteration's line2.
        let kernel = vec![
            form(1, "movq", vec![reg("rax"), reg("rbx")], 1.0),
            form(2, "addq", vec![reg("rbx"), reg("rax")], 1.0),
        ];
        let dg = KernelDg::new(kernel, Rc::new(X86AttSemantics::new())).unwrap();
        let deps = dg.loop_carried_dependencies().unwrap();

        assert_eq!(deps[&1].dependency_lines, vec![1]);
        assert_eq!(deps[&2].dependency_lines, vec![1, 2]);
    }

    #[test]
    fn acyclic_single_instruction_kernel_has_no_loop_carried_dependency() {
        let kernel = vec![form(1, "nop", vec![], 1.0)];
        let dg = KernelDg::new(kernel, Rc::new(X86AttSemantics::new())).unwrap();
        assert!(dg.loop_carried_dependencies().unwrap().is_empty());
    }
}
