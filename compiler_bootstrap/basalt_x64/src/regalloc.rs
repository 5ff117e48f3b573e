//! Register analysis
//!
//! Three passes run per machine function, in order: a linear scan assigns
//! every instruction a position and produces live ranges for each register
//! it sees; a linear-scan allocator maps virtual ranges onto free physical
//! registers; and a callsite analysis wraps every call in push/pop pairs
//! for the live caller-saved registers.

use crate::mach::{MachFunction, MachInst, MachOperand, Segment, X64Mnemonic, X64Size};
use crate::register::{Register, RegisterClass, X64Register};
use basalt_common::{BasaltError, BasaltResult, Diagnostics, Span};

/// The range of instruction positions over which a register is live.
#[derive(Debug, Clone, Copy)]
pub struct LiveRange {
    /// The register this range tracks; physical ranges keep the physical
    /// register here.
    pub reg: Register,
    /// The physical register allocated over this range.
    pub alloc: Register,
    pub start: u32,
    pub end: u32,
    pub class: RegisterClass,
    /// A killed range is closed and never extended again.
    pub killed: bool,
}

impl LiveRange {
    /// Test if this range overlaps a single position, exclusively of its
    /// endpoints.
    pub fn overlaps(&self, pos: u32) -> bool {
        self.start < pos && pos < self.end
    }

    /// Test if this range overlaps the extent `[start, end]`.
    pub fn overlaps_extent(&self, start: u32, end: u32) -> bool {
        self.start < end && self.end > start
    }
}

/// Allocatable physical registers per class. Only caller-saved registers
/// are handed out: the emitted prologue preserves nothing else.
const GP_POOL: [X64Register; 9] = [
    X64Register::R10,
    X64Register::R11,
    X64Register::R9,
    X64Register::R8,
    X64Register::Rcx,
    X64Register::Rdx,
    X64Register::Rsi,
    X64Register::Rdi,
    X64Register::Rax,
];

const FP_POOL: [X64Register; 15] = [
    X64Register::Xmm1,
    X64Register::Xmm2,
    X64Register::Xmm3,
    X64Register::Xmm4,
    X64Register::Xmm5,
    X64Register::Xmm6,
    X64Register::Xmm7,
    X64Register::Xmm8,
    X64Register::Xmm9,
    X64Register::Xmm10,
    X64Register::Xmm11,
    X64Register::Xmm12,
    X64Register::Xmm13,
    X64Register::Xmm14,
    X64Register::Xmm15,
];

/// Walks every label in order, assigning monotonically increasing
/// positions and growing live ranges for every register operand.
struct LinearScan<'f> {
    func: &'f MachFunction,
    ranges: Vec<LiveRange>,
    pos: u32,
}

impl<'f> LinearScan<'f> {
    fn new(func: &'f MachFunction) -> Self {
        Self { func, ranges: Vec::new(), pos: 0 }
    }

    /// Extend the live range for `reg` to `pos`, creating it if no live
    /// range exists.
    fn update_range(&mut self, reg: Register, class: RegisterClass, pos: u32) -> &mut LiveRange {
        let found = self
            .ranges
            .iter()
            .position(|range| !range.killed && range.reg == reg);

        if let Some(index) = found {
            let range = &mut self.ranges[index];
            range.end = pos;
            return &mut self.ranges[index];
        }

        let alloc = if reg.is_physical() { reg } else { Register::none() };
        self.ranges.push(LiveRange {
            reg,
            alloc,
            start: pos,
            end: pos,
            class,
            killed: false,
        });

        self.ranges.last_mut().unwrap()
    }

    fn process_inst(&mut self, inst: &MachInst) {
        for operand in &inst.operands {
            // Registers appear directly or as memory bases.
            let reg = match operand {
                MachOperand::Reg { reg, .. } => *reg,
                MachOperand::Mem { base, .. } => *base,
                _ => continue,
            };

            let class = if reg.is_physical() {
                reg.physical().class()
            } else {
                self.func
                    .registers
                    .get(&reg.id())
                    .expect("virtual register missing from the register table")
                    .class
            };

            let pos = self.pos;
            let range = self.update_range(reg, class, pos);

            if operand.is_reg() && (operand.is_kill() || operand.is_dead()) {
                // The register dies here; close the range off.
                range.end = pos;
                range.killed = true;
            }
        }
    }

    fn run(mut self) -> Vec<LiveRange> {
        let func = self.func;
        for label in &func.labels {
            for inst in &label.insts {
                self.process_inst(inst);
                self.pos += 1;
            }
        }

        self.ranges
    }
}

/// Linear-scan allocation over live ranges sorted by start position.
struct RegisterAllocator<'r> {
    ranges: &'r mut [LiveRange],
    active: Vec<LiveRange>,
}

impl<'r> RegisterAllocator<'r> {
    fn new(ranges: &'r mut [LiveRange]) -> Self {
        Self { ranges, active: Vec::new() }
    }

    fn active_contains(&self, reg: Register) -> bool {
        self.active.iter().any(|range| range.alloc == reg)
    }

    /// A register is available when no physical live range overlapping the
    /// candidate extent already claims it.
    fn is_available(ranges: &[LiveRange], reg: Register, start: u32, end: u32) -> bool {
        !ranges.iter().any(|range| {
            range.reg.is_physical() && range.reg == reg && range.overlaps_extent(start, end)
        })
    }

    fn expire_intervals(&mut self, start: u32) {
        self.active.retain(|range| range.end >= start);
    }

    fn run(mut self) -> BasaltResult<()> {
        let mut order: Vec<usize> = (0..self.ranges.len()).collect();
        order.sort_by_key(|&i| self.ranges[i].start);

        for index in order {
            let current = self.ranges[index];
            self.expire_intervals(current.start);

            // Physical ranges claim themselves.
            if current.reg.is_physical() {
                self.active.push(current);
                continue;
            }

            let pool: &[X64Register] = match current.class {
                RegisterClass::GeneralPurpose => &GP_POOL,
                RegisterClass::FloatingPoint => &FP_POOL,
            };

            let chosen = pool.iter().copied().map(Register::from).find(|&reg| {
                !self.active_contains(reg)
                    && Self::is_available(self.ranges, reg, current.start, current.end)
            });

            let chosen = match chosen {
                Some(reg) => reg,
                // Spilling is unimplemented; running out of registers is a
                // hard stop.
                None => {
                    return Err(BasaltError::codegen(
                        "register allocation ran out of physical registers",
                    ))
                }
            };

            self.ranges[index].alloc = chosen;
            let mut active = current;
            active.alloc = chosen;
            self.active.push(active);
        }

        Ok(())
    }
}

/// Inserts push/pop pairs around calls for every live caller-saved
/// register.
struct CallsiteAnalysis<'f, 'r> {
    func: &'f mut MachFunction,
    ranges: &'r [LiveRange],
    pos: u32,
}

impl<'f, 'r> CallsiteAnalysis<'f, 'r> {
    fn new(func: &'f mut MachFunction, ranges: &'r [LiveRange]) -> Self {
        Self { func, ranges, pos: 0 }
    }

    fn run(mut self) {
        for label_index in 0..self.func.labels.len() {
            let old_insts = std::mem::take(&mut self.func.labels[label_index].insts);
            let mut insts = Vec::with_capacity(old_insts.len());

            for inst in old_insts {
                if inst.op != X64Mnemonic::Call {
                    insts.push(inst);
                    self.pos += 1;
                    continue;
                }

                // Live caller-saved registers must survive the call.
                let mut to_spill: Vec<X64Register> = Vec::new();
                for range in self.ranges {
                    if !range.overlaps(self.pos) {
                        continue;
                    }

                    let alloc = match X64Register::from_id(range.alloc.id()) {
                        Some(alloc) => alloc,
                        None => continue,
                    };

                    if alloc.is_caller_saved() && !to_spill.contains(&alloc) {
                        to_spill.push(alloc);
                    }
                }

                for &reg in &to_spill {
                    insts.push(
                        MachInst::new(X64Mnemonic::Push, X64Size::Quad).add_reg(reg, 8, false),
                    );
                }

                insts.push(inst);
                self.pos += 1;

                for &reg in to_spill.iter().rev() {
                    insts.push(
                        MachInst::new(X64Mnemonic::Pop, X64Size::Quad).add_reg(reg, 8, true),
                    );
                }
            }

            self.func.labels[label_index].insts = insts;
        }
    }
}

/// The whole-segment register analysis entry point.
pub struct RegisterAnalysis;

impl RegisterAnalysis {
    pub fn run(
        segment: &mut Segment,
        diagnostics: &mut Diagnostics,
        filename: &str,
    ) -> BasaltResult<()> {
        for func in &mut segment.functions {
            let mut ranges = LinearScan::new(func).run();

            if let Err(error) = RegisterAllocator::new(&mut ranges).run() {
                return Err(diagnostics.fatal(error, filename, Span::default()));
            }

            // Propagate allocations into the function's register table.
            for range in &ranges {
                if range.reg.is_physical() {
                    continue;
                }

                if let Some(vreg) = func.registers.get_mut(&range.reg.id()) {
                    vreg.alloc = range.alloc;
                }
            }

            CallsiteAnalysis::new(func, &ranges).run();
        }

        Ok(())
    }

    /// Compute the live ranges of one machine function, for analyses and
    /// tests that inspect liveness without allocating.
    pub fn live_ranges(func: &MachFunction) -> Vec<LiveRange> {
        LinearScan::new(func).run()
    }
}
