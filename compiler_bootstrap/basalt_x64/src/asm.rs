//! Assembly writer
//!
//! Emits AT&T-syntax GNU assembler text for the Linux target: globals into
//! `.data`/`.rodata`, per-function constant pools into merged rodata
//! sections, and one label per basic block. Virtual registers are resolved
//! against the allocation table on the way out; register-to-same-register
//! moves left over from allocation are elided. Every `ret` expands into the
//! frame epilogue.

use crate::mach::{MachFunction, MachInst, MachOperand, Segment, X64Mnemonic};
use crate::register::{Register, X64Register};
use basalt_ir::{Cfg, Const, Linkage};
use std::fmt::Write;

pub struct AsmWriter<'c> {
    cfg: &'c Cfg,
    out: String,
}

impl<'c> AsmWriter<'c> {
    pub fn new(cfg: &'c Cfg) -> Self {
        Self { cfg, out: String::new() }
    }

    /// Render the whole segment into assembler text.
    pub fn run(mut self, segment: &Segment) -> String {
        let _ = writeln!(self.out, "\t.file\t\"{}\"", self.cfg.filename);

        for (_, global) in self.cfg.globals() {
            self.emit_global(global);
        }

        for (index, func) in segment.functions.iter().enumerate() {
            self.emit_function(index, func);
        }

        self.out
    }

    /// Resolve a register operand against the function's allocation table.
    fn map_register(reg: Register, func: &MachFunction) -> X64Register {
        let resolved = if reg.is_virtual() {
            func.registers
                .get(&reg.id())
                .expect("virtual register missing from the register table")
                .alloc
        } else {
            reg
        };

        X64Register::from_id(resolved.id()).expect("unallocated virtual register")
    }

    /// A MOV between the same physical register and sub-register does
    /// nothing once allocation has collapsed its operands.
    fn is_redundant_move(func: &MachFunction, inst: &MachInst) -> bool {
        if inst.op != X64Mnemonic::Mov && inst.op != X64Mnemonic::Movs {
            return false;
        }

        let explicit: Vec<&MachOperand> = inst.explicit_operands().collect();
        if explicit.len() != 2 || !explicit[0].is_reg() || !explicit[1].is_reg() {
            return false;
        }

        let left = Self::map_register(explicit[0].get_reg(), func);
        let right = Self::map_register(explicit[1].get_reg(), func);
        left == right && explicit[0].get_subreg() == explicit[1].get_subreg()
    }

    fn emit_operand(&mut self, index: usize, func: &MachFunction, operand: &MachOperand) {
        match operand {
            MachOperand::Reg { reg, subreg, .. } => {
                let reg = Self::map_register(*reg, func);
                let _ = write!(self.out, "%{}", reg.name(*subreg));
            }

            MachOperand::Mem { base, disp } => {
                if *disp != 0 {
                    let _ = write!(self.out, "{}", disp);
                }

                let base = Self::map_register(*base, func);
                let _ = write!(self.out, "(%{})", base.name(8));
            }

            MachOperand::Stack(slot) => {
                // The stack grows down from %rbp.
                let entry = &func.stack.entries[*slot as usize];
                let _ = write!(self.out, "{}(%rbp)", -entry.offset - entry.size as i32);
            }

            MachOperand::Imm(value) => {
                let _ = write!(self.out, "${}", value);
            }

            MachOperand::Label(position) => {
                let _ = write!(self.out, ".L{}_{}", index, position);
            }

            MachOperand::Constant(pool_index) => {
                let _ = write!(self.out, ".LCPI{}_{}(%rip)", index, pool_index);
            }

            MachOperand::Symbol(symbol) => {
                let _ = write!(self.out, "{}", symbol);
            }
        }
    }

    fn emit_inst(&mut self, index: usize, func: &MachFunction, inst: &MachInst) {
        if Self::is_redundant_move(func, inst) {
            return;
        }

        // Returns expand into the frame epilogue.
        if inst.op == X64Mnemonic::Ret {
            let _ = writeln!(
                self.out,
                "\taddq\t${}, %rsp\n\tpopq\t%rbp\n\tret",
                func.stack.alignment()
            );
            return;
        }

        let _ = write!(self.out, "\t{}{}\t", inst.op.as_str(), inst.size.suffix());

        let explicit: Vec<&MachOperand> = inst.explicit_operands().collect();
        for (i, operand) in explicit.iter().enumerate() {
            self.emit_operand(index, func, operand);
            if i + 1 != explicit.len() {
                let _ = write!(self.out, ", ");
            }
        }

        let _ = writeln!(self.out);
    }

    fn emit_constant(&mut self, constant: &Const) {
        match constant {
            Const::Int { ty, value } => {
                let directive = match self.cfg.machine.size_of(&self.cfg.types, *ty) {
                    1 => "byte",
                    2 => "word",
                    4 => "long",
                    _ => "quad",
                };

                let _ = writeln!(self.out, "\t.{}\t{}", directive, value);
            }

            Const::Float { ty, bits } => {
                let value = f64::from_bits(*bits);
                if self.cfg.machine.size_of(&self.cfg.types, *ty) == 4 {
                    let _ = writeln!(self.out, "\t.long\t0x{:x}", (value as f32).to_bits());
                } else {
                    let _ = writeln!(self.out, "\t.quad\t0x{:x}", bits);
                }
            }

            Const::Null { .. } => {
                let _ = writeln!(self.out, "\t.quad\t0x0");
            }

            Const::Str { value, .. } => {
                let _ = write!(self.out, "\t.string\t\"");
                for c in value.chars() {
                    match c {
                        '\\' => self.out.push_str("\\\\"),
                        '\'' => self.out.push_str("\\'"),
                        '"' => self.out.push_str("\\\""),
                        '\n' => self.out.push_str("\\n"),
                        '\t' => self.out.push_str("\\t"),
                        '\r' => self.out.push_str("\\r"),
                        '\0' => self.out.push_str("\\0"),
                        c => self.out.push(c),
                    }
                }

                let _ = writeln!(self.out, "\"");
            }
        }
    }

    fn emit_global(&mut self, global: &basalt_ir::Global) {
        if global.read_only {
            let _ = writeln!(self.out, "\t.section\t.rodata");
        } else {
            let _ = writeln!(self.out, "\t.data");
        }

        if global.linkage == Linkage::External {
            let _ = writeln!(self.out, "\t.global\t{}", global.name);
        }

        let size = self.cfg.machine.size_of(&self.cfg.types, global.ty);
        let align = self.cfg.machine.align_of(&self.cfg.types, global.ty);

        let _ = writeln!(self.out, "\t.align\t{}", align);
        let _ = writeln!(self.out, "\t.type\t{}, @object", global.name);
        let _ = writeln!(self.out, "\t.size\t{}, {}", global.name, size);
        let _ = writeln!(self.out, "{}:", global.name);

        match global.init {
            Some(init) => {
                let constant = self.cfg.consts.get(init).clone();
                self.emit_constant(&constant);
            }
            None => {
                let _ = writeln!(self.out, "\t.zero\t{}", size);
            }
        }
    }

    fn emit_function(&mut self, index: usize, func: &MachFunction) {
        // The function's constant pool lands in size-merged rodata
        // sections ahead of its text.
        let mut last_size = 0u32;
        for (pool_index, &(constant, _)) in func.pool.entries.iter().enumerate() {
            let constant = self.cfg.consts.get(constant).clone();
            let size = self.cfg.machine.size_of(&self.cfg.types, constant.ty()).max(1);

            if size != last_size {
                let _ = writeln!(
                    self.out,
                    "\t.section\t.rodata.cst{},\"aM\",@progbits,{}",
                    size, size
                );
                let _ = writeln!(self.out, "\t.p2align\t{},0x0", size.trailing_zeros());
                last_size = size;
            }

            let _ = writeln!(self.out, ".LCPI{}_{}:", index, pool_index);
            self.emit_constant(&constant);
        }

        let _ = writeln!(self.out, "\t.text");

        let mir_func = self.cfg.func(func.func);
        if mir_func.linkage == Linkage::External {
            let _ = writeln!(self.out, "\t.global\t{}", func.name);
        }

        let _ = writeln!(self.out, "\t.type\t{}, @function", func.name);
        let _ = writeln!(self.out, "{}:", func.name);
        let _ = writeln!(
            self.out,
            "\tpushq\t%rbp\n\tmovq\t%rsp, %rbp\n\tsubq\t${}, %rsp",
            func.stack.alignment()
        );

        for (position, label) in func.labels.iter().enumerate() {
            let _ = writeln!(self.out, ".L{}_{}:", index, position);
            for inst in &label.insts {
                self.emit_inst(index, func, inst);
            }
        }

        let _ = writeln!(self.out, ".LFE{}:\n\t.size\t{}, .-{}\n", index, func.name, func.name);
    }
}
