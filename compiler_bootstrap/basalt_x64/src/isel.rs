//! Instruction selection
//!
//! Lowers one MIR function at a time into machine instructions over
//! virtual registers. Each defining MIR instruction gets a fresh virtual
//! register; block arguments get virtual registers that predecessors move
//! into just before branching (phi elimination by copies). Floating-point
//! constants are materialized out of the per-function constant pool, and
//! the System-V argument registers are enforced at call boundaries.

use crate::mach::{
    MachFunction, MachInst, MachLabel, MachOperand, StackEntry, VirtualRegister, X64Mnemonic,
    X64Size,
};
use crate::register::{Register, RegisterClass, X64Register};
use basalt_common::{BasaltError, BasaltResult, Diagnostics, Span};
use basalt_ir::{
    BlockId, Cfg, Const, FuncId, Inst, InstId, MirType, MirTypeId, Opcode, Predicate, Value,
};
use hashbrown::HashMap;

/// Integer argument registers, by index.
const INT_ARG_REGS: [X64Register; 6] = [
    X64Register::Rdi,
    X64Register::Rsi,
    X64Register::Rdx,
    X64Register::Rcx,
    X64Register::R8,
    X64Register::R9,
];

/// Floating-point argument registers, by index.
const FLOAT_ARG_REGS: [X64Register; 6] = [
    X64Register::Xmm0,
    X64Register::Xmm1,
    X64Register::Xmm2,
    X64Register::Xmm3,
    X64Register::Xmm4,
    X64Register::Xmm5,
];

/// The SETCC mnemonic for a comparison predicate.
fn to_setcc(predicate: Predicate) -> X64Mnemonic {
    match predicate {
        Predicate::IEq | Predicate::Oeq => X64Mnemonic::Sete,
        Predicate::INe | Predicate::One => X64Mnemonic::Setne,
        Predicate::Slt => X64Mnemonic::Setl,
        Predicate::Sle => X64Mnemonic::Setle,
        Predicate::Sgt => X64Mnemonic::Setg,
        Predicate::Sge => X64Mnemonic::Setge,
        Predicate::Ult | Predicate::Olt => X64Mnemonic::Setb,
        Predicate::Ule | Predicate::Ole => X64Mnemonic::Setbe,
        Predicate::Ugt | Predicate::Ogt => X64Mnemonic::Seta,
        Predicate::Uge | Predicate::Oge => X64Mnemonic::Setae,
    }
}

/// Mirror a SETCC across swapped operands.
fn flip_setcc(setcc: X64Mnemonic) -> X64Mnemonic {
    match setcc {
        X64Mnemonic::Sete | X64Mnemonic::Setne => setcc,
        X64Mnemonic::Setl => X64Mnemonic::Setg,
        X64Mnemonic::Setle => X64Mnemonic::Setge,
        X64Mnemonic::Setg => X64Mnemonic::Setl,
        X64Mnemonic::Setge => X64Mnemonic::Setle,
        X64Mnemonic::Seta => X64Mnemonic::Setb,
        X64Mnemonic::Setae => X64Mnemonic::Setbe,
        X64Mnemonic::Setb => X64Mnemonic::Seta,
        X64Mnemonic::Setbe => X64Mnemonic::Setae,
        _ => panic!("cannot flip a non-setcc mnemonic"),
    }
}

/// Per-function instruction selector.
pub struct InstSelector<'c, 'd> {
    cfg: &'c mut Cfg,
    diagnostics: &'d mut Diagnostics,
    func: FuncId,
    mach: MachFunction,

    /// Current insertion label.
    insert: usize,

    /// MIR def id to virtual register.
    regs: HashMap<u32, Register>,
    /// Aggregate-returning call defs to the stack slot holding their
    /// hidden result.
    aggregates: HashMap<u32, u32>,
    /// Block argument to virtual register.
    args: HashMap<(BlockId, u32), Register>,
    /// MIR local to stack frame index.
    locals: HashMap<basalt_ir::LocalId, u32>,
}

impl<'c, 'd> InstSelector<'c, 'd> {
    pub fn new(cfg: &'c mut Cfg, diagnostics: &'d mut Diagnostics, func: FuncId) -> Self {
        let name = cfg.func(func).name.clone();

        Self {
            cfg,
            diagnostics,
            func,
            mach: MachFunction::new(name, func),
            insert: 0,
            regs: HashMap::new(),
            aggregates: HashMap::new(),
            args: HashMap::new(),
            locals: HashMap::new(),
        }
    }

    fn fatal(&mut self, message: impl Into<String>) -> BasaltError {
        self.diagnostics.fatal(
            BasaltError::codegen(message.into()),
            &self.cfg.filename,
            Span::default(),
        )
    }

    /// Run selection over the whole function, producing its machine
    /// function.
    pub fn run(mut self) -> BasaltResult<MachFunction> {
        // Reserve a stack slot per local, in definition order.
        let mut stack_offset = 0i32;
        let locals: Vec<_> = self
            .cfg
            .func(self.func)
            .locals()
            .map(|(id, local)| (id, local.ty, local.align))
            .collect();

        for (index, (id, ty, align)) in locals.into_iter().enumerate() {
            let size = self.cfg.machine.size_of(&self.cfg.types, ty);

            self.mach.stack.entries.push(StackEntry {
                offset: stack_offset,
                size,
                align,
                local: Some(id),
            });

            stack_offset += size as i32;
            self.locals.insert(id, index as u32);
        }

        // One label per appended block, created up front so branches can
        // reference blocks that lower later.
        let order = self.cfg.func(self.func).block_order.clone();
        for &block in &order {
            self.mach.labels.push(MachLabel::new(block));
        }

        for (position, &block) in order.iter().enumerate() {
            self.insert = position;

            let insts = self.cfg.func(self.func).block(block).insts.clone();
            for inst in insts {
                self.select(inst)?;
            }
        }

        Ok(self.mach)
    }

    fn emit(&mut self, inst: MachInst) {
        self.mach.labels[self.insert].insts.push(inst);
    }

    /// The size tag for a scalar type.
    fn as_size(&self, ty: MirTypeId) -> X64Size {
        let bytes = self.cfg.machine.size_of(&self.cfg.types, ty);

        if self.cfg.types.is_float(ty) {
            match bytes {
                4 => X64Size::Single,
                8 => X64Size::Double,
                _ => X64Size::None,
            }
        } else {
            match bytes {
                1 => X64Size::Byte,
                2 => X64Size::Word,
                4 => X64Size::Long,
                8 => X64Size::Quad,
                _ => X64Size::None,
            }
        }
    }

    fn subreg(&self, ty: MirTypeId) -> u16 {
        match self.cfg.machine.size_of(&self.cfg.types, ty) {
            1 => 1,
            2 => 2,
            4 => 4,
            8 => 8,
            _ => 0,
        }
    }

    /// Allocate a fresh virtual register of the given class.
    fn get_temporary(&mut self, class: RegisterClass) -> Register {
        let id = Register::VIRTUAL_BARRIER + self.mach.registers.len() as u32;
        self.mach
            .registers
            .insert(id, VirtualRegister { class, alloc: Register::none() });
        Register(id)
    }

    /// The destination virtual register of a defining instruction.
    fn as_register(&mut self, inst: InstId) -> Register {
        let (def, ty) = {
            let inst = self.cfg.func(self.func).inst(inst);
            debug_assert!(inst.is_def(), "instruction defines no value");
            (inst.def, inst.ty)
        };

        let class = if self.cfg.types.is_float(ty) {
            RegisterClass::FloatingPoint
        } else {
            RegisterClass::GeneralPurpose
        };

        let vreg = self.get_temporary(class);
        self.regs.insert(def, vreg);
        vreg
    }

    fn value_type(&mut self, value: Value) -> MirTypeId {
        self.cfg.value_type(self.func, value)
    }

    /// Translate a MIR value into a machine operand, materializing pooled
    /// float constants on the way.
    fn as_operand(&mut self, value: Value) -> BasaltResult<MachOperand> {
        match value {
            Value::Const(id) => match self.cfg.consts.get(id).clone() {
                Const::Int { value, .. } => Ok(MachOperand::Imm(value)),
                Const::Null { .. } => Ok(MachOperand::Imm(0)),
                Const::Float { ty, .. } => {
                    let align = self.cfg.machine.align_of(&self.cfg.types, ty);
                    let index = self.mach.pool.get_or_create(id, align);

                    let reg = self.get_temporary(RegisterClass::FloatingPoint);
                    let size = self.as_size(ty);
                    self.emit(
                        MachInst::new(X64Mnemonic::Movs, size)
                            .add_constant(index)
                            .add_reg(reg, 0, true),
                    );

                    Ok(MachOperand::reg(reg, 0, false))
                }
                Const::Str { .. } => {
                    Err(self.fatal("string constants only materialize through string ops"))
                }
            },

            Value::Arg(index) => self.as_argument(value, index),

            Value::BlockArg(block, index) => {
                let ty = self.value_type(value);
                let subreg = self.subreg(ty);

                if let Some(&vreg) = self.args.get(&(block, index)) {
                    return Ok(MachOperand::reg(vreg, subreg, true));
                }

                let class = if self.cfg.types.is_float(ty) {
                    RegisterClass::FloatingPoint
                } else {
                    RegisterClass::GeneralPurpose
                };

                let vreg = self.get_temporary(class);
                self.args.insert((block, index), vreg);
                Ok(MachOperand::reg(vreg, subreg, false))
            }

            Value::Inst(id) => {
                let def = self.cfg.func(self.func).inst(id).def;

                // An aggregate call result lives in its hidden stack slot.
                if let Some(&slot) = self.aggregates.get(&def) {
                    return Ok(MachOperand::Stack(slot));
                }

                let vreg = match self.regs.get(&def) {
                    Some(&vreg) => vreg,
                    None => return Err(self.fatal("instruction result used before selection")),
                };

                let ty = self.value_type(value);
                let subreg = self.subreg(ty);
                Ok(MachOperand::reg(vreg, subreg, false))
            }

            Value::Local(id) => Ok(MachOperand::Stack(self.locals[&id])),

            Value::Global(id) => Ok(MachOperand::Symbol(self.cfg.global(id).name.clone())),

            Value::Func(id) => Ok(MachOperand::Symbol(self.cfg.func(id).name.clone())),

            Value::Block(block) => {
                let position = self
                    .mach
                    .label_position(block)
                    .expect("branch to a detached block");
                Ok(MachOperand::Label(position))
            }
        }
    }

    /// The ABI register operand for argument `index` of the value's class.
    fn as_argument(&mut self, value: Value, index: u32) -> BasaltResult<MachOperand> {
        if index >= 6 {
            // Stack passing of arguments beyond the register file is not
            // implemented.
            return Err(self.fatal("cannot pass more than 6 arguments"));
        }

        let ty = self.value_type(value);
        let reg = if self.cfg.types.is_float(ty) {
            FLOAT_ARG_REGS[index as usize]
        } else {
            INT_ARG_REGS[index as usize]
        };

        Ok(MachOperand::reg(reg, self.subreg(ty), true))
    }

    fn select(&mut self, id: InstId) -> BasaltResult<()> {
        let op = self.cfg.func(self.func).inst(id).op;

        match op {
            Opcode::Abort | Opcode::Unreachable => {
                self.emit(MachInst::new(X64Mnemonic::Ud2, X64Size::None));
                Ok(())
            }

            Opcode::Load | Opcode::Store => self.select_load_store(id),
            Opcode::PointerWalk => self.select_pwalk(id),
            Opcode::Access => self.select_access(id),
            Opcode::Index => self.select_index(id),
            Opcode::Extract => self.select_extract(id),
            Opcode::String => self.select_string(id),
            Opcode::Call => self.select_call(id),
            Opcode::Cmp(pred) => self.select_comparison(id, pred),
            Opcode::CondJump => self.select_conditional_jump(id),
            Opcode::Jump => self.select_jump(id),
            Opcode::Ret => self.select_return(id),

            Opcode::IAdd => self.select_iadd(id),
            Opcode::ISub => self.select_isub(id),
            Opcode::IMul => self.select_imul(id),
            Opcode::SDiv | Opcode::UDiv | Opcode::SMod | Opcode::UMod => self.select_division(id),
            Opcode::FAdd => self.select_fadd(id),
            Opcode::FSub => self.select_fsub(id),
            Opcode::FMul | Opcode::FDiv => self.select_float_mul_div(id),

            Opcode::And | Opcode::Or | Opcode::Xor => self.select_logic(id),
            Opcode::Shl | Opcode::Shr | Opcode::Sar => self.select_shift(id),
            Opcode::Not => self.select_not(id),
            Opcode::INeg => self.select_ineg(id),
            Opcode::FNeg => self.select_fneg(id),

            Opcode::SExt | Opcode::ZExt | Opcode::FExt => self.select_extension(id),
            Opcode::ITrunc | Opcode::FTrunc => self.select_truncation(id),
            Opcode::S2F | Opcode::U2F => self.select_cast_i2f(id),
            Opcode::F2S | Opcode::F2U => self.select_cast_f2i(id),
            Opcode::P2I => self.select_cast_p2i(id),
            Opcode::I2P | Opcode::Reint => self.select_cast_move(id),
        }
    }

    fn inst(&self, id: InstId) -> &Inst {
        self.cfg.func(self.func).inst(id)
    }

    fn select_load_store(&mut self, id: InstId) -> BasaltResult<()> {
        let (op, ty, first, second) = {
            let inst = self.inst(id);
            let first = inst.operands[0];
            let second = inst.operands.get(1).copied();
            (inst.op, inst.ty, first, second)
        };

        let ty = if op == Opcode::Load { ty } else { self.value_type(first) };

        let mut source = self.as_operand(first)?;
        if op == Opcode::Load && source.is_reg() {
            // The address is in a register; dereference it through a memory
            // operand.
            source = MachOperand::Mem { base: source.get_reg(), disp: 0 };
        }

        let mov = if self.cfg.types.is_float(ty) { X64Mnemonic::Movs } else { X64Mnemonic::Mov };
        let size = self.as_size(ty);

        if op == Opcode::Store {
            if source.is_reg() && source.get_reg().is_physical() {
                source.set_is_use();
                source.set_is_kill();
            } else if matches!(
                source,
                MachOperand::Symbol(_)
                    | MachOperand::Mem { .. }
                    | MachOperand::Stack(_)
                    | MachOperand::Constant(_)
            ) {
                // Both sides would be memory references; stage the source
                // address through %rax.
                let tmp = MachOperand::reg(X64Register::Rax, self.subreg(ty), true);
                self.emit(
                    MachInst::new(X64Mnemonic::Lea, X64Size::Quad)
                        .add_operand(source)
                        .add_operand(tmp.clone()),
                );

                source = tmp;
                source.set_is_use();
                source.set_is_kill();
            }

            let mut dest = self.as_operand(second.expect("store has a destination"))?;
            if dest.is_reg() {
                dest = MachOperand::Mem { base: dest.get_reg(), disp: 0 };
            }

            self.emit(MachInst::new(mov, size).add_operand(source).add_operand(dest));
        } else {
            let dst = self.as_register(id);
            let subreg = self.subreg(ty);
            self.emit(MachInst::new(mov, size).add_operand(source).add_reg(dst, subreg, true));
        }

        Ok(())
    }

    /// Separate a pointer walk's index list into a constant accumulated
    /// offset and dynamic scaled indices, then emit the base move plus the
    /// scaled additions.
    fn select_pwalk(&mut self, id: InstId) -> BasaltResult<()> {
        let (base, indices) = {
            let inst = self.inst(id);
            (inst.operands[0], inst.operands[1..].to_vec())
        };

        let source = self.as_operand(base)?;
        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, 8, true);

        // Stack slots and symbols contribute their address; registers move.
        let base_move = if source.is_reg() { X64Mnemonic::Mov } else { X64Mnemonic::Lea };
        self.emit(
            MachInst::new(base_move, X64Size::Quad)
                .add_operand(source)
                .add_operand(dest.clone()),
        );

        let mut offset: i64 = 0;
        let mut dynamics: Vec<(Value, i64)> = Vec::new();
        let mut curr = self.value_type(base);

        for index in indices {
            let const_index = match index {
                Value::Const(c) => self.cfg.consts.as_int(c),
                _ => None,
            };

            match self.cfg.types.get(curr).clone() {
                MirType::Pointer { pointee } => {
                    let scale = self.cfg.machine.size_of(&self.cfg.types, pointee) as i64;
                    match const_index {
                        Some(value) => offset += scale * value,
                        None => dynamics.push((index, scale)),
                    }

                    curr = pointee;
                }

                MirType::Array { element, .. } => {
                    let scale = self.cfg.machine.size_of(&self.cfg.types, element) as i64;
                    match const_index {
                        Some(value) => offset += scale * value,
                        None => dynamics.push((index, scale)),
                    }

                    curr = element;
                }

                MirType::Struct { .. } => {
                    let field = match const_index {
                        Some(value) => value as u32,
                        None => {
                            return Err(self.fatal("struct walk steps require constant indices"))
                        }
                    };

                    offset +=
                        self.cfg.machine.field_offset(&self.cfg.types, curr, field) as i64;
                    curr = self.cfg.types.fields_of(curr)[field as usize];
                }

                _ => return Err(self.fatal("invalid pointer walk step type")),
            }
        }

        for (index, scale) in dynamics {
            let index = self.as_operand(index)?;

            if scale != 1 {
                self.emit(
                    MachInst::new(X64Mnemonic::Imul, X64Size::Quad)
                        .add_imm(scale)
                        .add_operand(index.clone()),
                );
            }

            self.emit(
                MachInst::new(X64Mnemonic::Add, X64Size::Quad)
                    .add_operand(index)
                    .add_operand(dest.clone()),
            );
        }

        if offset != 0 {
            self.emit(
                MachInst::new(X64Mnemonic::Add, X64Size::Quad)
                    .add_imm(offset)
                    .add_operand(dest),
            );
        }

        Ok(())
    }

    /// A struct field access by constant index: base move plus one constant
    /// offset addition.
    fn select_access(&mut self, id: InstId) -> BasaltResult<()> {
        let (base, index) = {
            let inst = self.inst(id);
            (inst.operands[0], inst.operands[1])
        };

        let field = match index {
            Value::Const(c) => self.cfg.consts.as_int(c),
            _ => None,
        };
        let field = match field {
            Some(field) => field as u32,
            None => return Err(self.fatal("field access requires a constant index")),
        };

        let base_ty = self.value_type(base);
        let struct_ty = match self.cfg.types.pointee(base_ty) {
            Some(pointee) => pointee,
            None => return Err(self.fatal("field access base must be a pointer")),
        };

        let offset = self.cfg.machine.field_offset(&self.cfg.types, struct_ty, field) as i64;

        let source = self.as_operand(base)?;
        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, 8, true);

        let base_move = if source.is_reg() { X64Mnemonic::Mov } else { X64Mnemonic::Lea };
        self.emit(
            MachInst::new(base_move, X64Size::Quad)
                .add_operand(source)
                .add_operand(dest.clone()),
        );

        if offset != 0 {
            self.emit(
                MachInst::new(X64Mnemonic::Add, X64Size::Quad)
                    .add_imm(offset)
                    .add_operand(dest),
            );
        }

        Ok(())
    }

    /// Pointer arithmetic by a lone index scaled by the pointee size.
    fn select_index(&mut self, id: InstId) -> BasaltResult<()> {
        let (base, index) = {
            let inst = self.inst(id);
            (inst.operands[0], inst.operands[1])
        };

        let base_ty = self.value_type(base);
        let scale = match self.cfg.types.pointee(base_ty) {
            Some(pointee) => self.cfg.machine.size_of(&self.cfg.types, pointee) as i64,
            None => return Err(self.fatal("index base must be a pointer")),
        };

        let source = self.as_operand(base)?;
        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, 8, true);

        let base_move = if source.is_reg() { X64Mnemonic::Mov } else { X64Mnemonic::Lea };
        self.emit(
            MachInst::new(base_move, X64Size::Quad)
                .add_operand(source)
                .add_operand(dest.clone()),
        );

        if let Value::Const(c) = index {
            if let Some(value) = self.cfg.consts.as_int(c) {
                if scale * value != 0 {
                    self.emit(
                        MachInst::new(X64Mnemonic::Add, X64Size::Quad)
                            .add_imm(scale * value)
                            .add_operand(dest),
                    );
                }

                return Ok(());
            }
        }

        let index = self.as_operand(index)?;
        if scale != 1 {
            self.emit(
                MachInst::new(X64Mnemonic::Imul, X64Size::Quad)
                    .add_imm(scale)
                    .add_operand(index.clone()),
            );
        }

        self.emit(
            MachInst::new(X64Mnemonic::Add, X64Size::Quad)
                .add_operand(index)
                .add_operand(dest),
        );

        Ok(())
    }

    /// Read an element out of a valued aggregate by constant index: take
    /// the address of the aggregate's storage, then load through it at the
    /// element's offset.
    fn select_extract(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, base, index) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0], inst.operands[1])
        };

        let field = match index {
            Value::Const(c) => self.cfg.consts.as_int(c),
            _ => None,
        };
        let field = match field {
            Some(field) => field as u32,
            None => return Err(self.fatal("extraction requires a constant index")),
        };

        let base_ty = self.value_type(base);
        let offset = match self.cfg.types.get(base_ty).clone() {
            MirType::Struct { .. } => {
                self.cfg.machine.field_offset(&self.cfg.types, base_ty, field)
            }
            MirType::Array { element, .. } => {
                self.cfg.machine.size_of(&self.cfg.types, element) * field
            }
            _ => return Err(self.fatal("extraction base must be an aggregate")),
        };

        let source = self.as_operand(base)?;
        if source.is_reg() {
            return Err(self.fatal("extraction base must reside in memory"));
        }

        let addr = self.get_temporary(RegisterClass::GeneralPurpose);
        self.emit(
            MachInst::new(X64Mnemonic::Lea, X64Size::Quad)
                .add_operand(source)
                .add_reg(addr, 8, true),
        );

        let mov = if self.cfg.types.is_float(ty) { X64Mnemonic::Movs } else { X64Mnemonic::Mov };
        let size = self.as_size(ty);
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mov, size)
                .add_mem(addr, offset as i32)
                .add_reg(dst, self.subreg(ty), true),
        );

        Ok(())
    }

    fn select_string(&mut self, id: InstId) -> BasaltResult<()> {
        let constant = match self.inst(id).operands[0] {
            Value::Const(c) => c,
            _ => return Err(self.fatal("string op requires a pooled constant")),
        };

        let index = self.mach.pool.get_or_create(constant, 1);
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(X64Mnemonic::Lea, X64Size::Quad)
                .add_constant(index)
                .add_reg(dst, 8, true),
        );

        Ok(())
    }

    fn select_comparison(&mut self, id: InstId, pred: Predicate) -> BasaltResult<()> {
        let (lhs_value, rhs_value) = {
            let inst = self.inst(id);
            (inst.operands[0], inst.operands[1])
        };

        let mut lhs = self.as_operand(lhs_value)?;
        let mut rhs = self.as_operand(rhs_value)?;
        let mut setcc = to_setcc(pred);

        // Immediates can only appear on the left in AT&T order; swapping
        // the compare flips the predicate.
        if rhs.is_imm() {
            std::mem::swap(&mut lhs, &mut rhs);
        } else {
            setcc = flip_setcc(setcc);
        }

        let lhs_ty = self.value_type(lhs_value);
        let size = self.as_size(lhs_ty);
        self.emit(MachInst::new(X64Mnemonic::Cmp, size).add_operand(lhs).add_operand(rhs));

        let dst = self.as_register(id);
        self.emit(MachInst::new(setcc, X64Size::Byte).add_reg(dst, 1, true));
        Ok(())
    }

    /// Moves for the block arguments of an outgoing edge.
    fn emit_edge_moves(&mut self, dest: BlockId, args: &[Value]) -> BasaltResult<()> {
        for (i, &arg) in args.iter().enumerate() {
            let ty = self.value_type(arg);
            let mov = if self.cfg.types.is_float(ty) { X64Mnemonic::Movs } else { X64Mnemonic::Mov };

            let source = self.as_operand(arg)?;
            let target = self.as_operand(Value::BlockArg(dest, i as u32))?;

            let size = self.as_size(ty);
            self.emit(MachInst::new(mov, size).add_operand(source).add_operand(target));
        }

        Ok(())
    }

    fn select_conditional_jump(&mut self, id: InstId) -> BasaltResult<()> {
        let operands = self.inst(id).operands.clone();

        // Operand layout: cond, true-dest, true-args..., false-dest,
        // false-args...
        let block_positions: Vec<usize> = operands
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v, Value::Block(_)))
            .map(|(i, _)| i)
            .collect();
        debug_assert_eq!(block_positions.len(), 2, "jif carries two destinations");

        let (true_at, false_at) = (block_positions[0], block_positions[1]);
        let true_dest = match operands[true_at] {
            Value::Block(block) => block,
            _ => unreachable!(),
        };
        let false_dest = match operands[false_at] {
            Value::Block(block) => block,
            _ => unreachable!(),
        };

        let mut cond = self.as_operand(operands[0])?;
        cond.set_subreg(1);

        self.emit(
            MachInst::new(X64Mnemonic::Cmp, X64Size::Byte)
                .add_imm(0)
                .add_operand(cond),
        );

        self.emit_edge_moves(true_dest, &operands[true_at + 1..false_at])?;
        let true_label = self.as_operand(Value::Block(true_dest))?;
        self.emit(MachInst::new(X64Mnemonic::Jne, X64Size::None).add_operand(true_label));

        self.emit_edge_moves(false_dest, &operands[false_at + 1..])?;
        let false_label = self.as_operand(Value::Block(false_dest))?;
        self.emit(MachInst::new(X64Mnemonic::Jmp, X64Size::None).add_operand(false_label));

        Ok(())
    }

    fn select_jump(&mut self, id: InstId) -> BasaltResult<()> {
        let operands = self.inst(id).operands.clone();
        let dest = match operands[0] {
            Value::Block(block) => block,
            _ => return Err(self.fatal("jump target must be a block address")),
        };

        self.emit_edge_moves(dest, &operands[1..])?;

        let label = self.as_operand(Value::Block(dest))?;
        self.emit(MachInst::new(X64Mnemonic::Jmp, X64Size::None).add_operand(label));
        Ok(())
    }

    fn select_return(&mut self, id: InstId) -> BasaltResult<()> {
        let value = self.inst(id).operands.first().copied();

        let mut ret_reg = None;
        if let Some(value) = value {
            let ty = self.value_type(value);

            let (reg, subreg, mov) = if self.cfg.types.is_float(ty) {
                (X64Register::Xmm0, 0, X64Mnemonic::Movs)
            } else {
                (X64Register::Rax, self.subreg(ty), X64Mnemonic::Mov)
            };

            let source = self.as_operand(value)?;
            let size = self.as_size(ty);
            self.emit(
                MachInst::new(mov, size)
                    .add_operand(source)
                    .add_reg(reg, subreg, false),
            );

            ret_reg = Some((reg, subreg));
        }

        let mut ret = MachInst::new(X64Mnemonic::Ret, X64Size::None);
        if let Some((reg, subreg)) = ret_reg {
            // Keep the return register live up to the return.
            ret = ret.add_implicit_reg(reg, subreg, false);
        }

        self.emit(ret);
        Ok(())
    }

    fn select_call(&mut self, id: InstId) -> BasaltResult<()> {
        let (callee, args, is_def, result_ty) = {
            let inst = self.inst(id);
            (
                inst.operands[0],
                inst.operands[1..].to_vec(),
                inst.is_def(),
                inst.ty,
            )
        };

        // A non-scalar result travels through a hidden slot whose address
        // becomes the first argument; the slot is a frame entry with no
        // backing local, and the explicit arguments shift up one register.
        let returns_aggregate =
            is_def && !self.cfg.machine.is_scalar(&self.cfg.types, result_ty);

        let (aret_slot, arg_shift) = if returns_aggregate {
            let size = self.cfg.machine.size_of(&self.cfg.types, result_ty);
            let align = self.cfg.machine.align_of(&self.cfg.types, result_ty);
            let offset = self.mach.stack.size() as i32;
            let slot = self.mach.stack.entries.len() as u32;
            self.mach.stack.entries.push(StackEntry { offset, size, align, local: None });
            (Some(slot), 1u32)
        } else {
            (None, 0)
        };

        // Move arguments into their ABI registers, in reverse index order.
        let mut arg_regs = Vec::with_capacity(args.len() + 1);
        for (i, &arg) in args.iter().enumerate().rev() {
            let source = self.as_operand(arg)?;
            let mut dest = self.as_argument(arg, i as u32 + arg_shift)?;
            dest.set_is_def();
            arg_regs.push(dest.get_reg());

            // Stack references contribute their address: locals, and the
            // result slots of aggregate-returning calls.
            let op = if matches!(source, MachOperand::Stack(_)) {
                X64Mnemonic::Lea
            } else {
                X64Mnemonic::Mov
            };
            let ty = self.value_type(arg);
            let size = if op == X64Mnemonic::Lea { X64Size::Quad } else { self.as_size(ty) };
            self.emit(MachInst::new(op, size).add_operand(source).add_operand(dest));
        }

        if let Some(slot) = aret_slot {
            let dest = MachOperand::reg(INT_ARG_REGS[0], 8, true);
            arg_regs.push(dest.get_reg());
            self.emit(
                MachInst::new(X64Mnemonic::Lea, X64Size::Quad)
                    .add_stack(slot)
                    .add_operand(dest),
            );
        }

        let symbol = match callee {
            Value::Func(func) => self.cfg.func(func).name.clone(),
            _ => return Err(self.fatal("call target is not a function symbol")),
        };

        let mut call = MachInst::new(X64Mnemonic::Call, X64Size::None).add_symbol(symbol);

        // Argument registers are implicit uses that die at the call.
        for reg in arg_regs {
            call = call.add_operand(
                MachOperand::reg(reg, 8, false).with_implicit().with_kill_or_dead(),
            );
        }

        if let Some(slot) = aret_slot {
            // The callee fills the slot; uses of the call's def resolve to
            // it, so there is no result register to move.
            let def = self.inst(id).def;
            self.aggregates.insert(def, slot);
            self.emit(call);
        } else if is_def {
            let is_float = self.cfg.types.is_float(result_ty);
            let (ret_reg, subreg) = if is_float {
                (X64Register::Xmm0, 0)
            } else {
                (X64Register::Rax, self.subreg(result_ty))
            };

            // The return register is an implicit def of the call itself.
            call = call.add_implicit_reg(ret_reg, subreg, true);
            self.emit(call);

            let mov = if is_float { X64Mnemonic::Movs } else { X64Mnemonic::Mov };
            let dst = self.as_register(id);
            let size = self.as_size(result_ty);
            self.emit(
                MachInst::new(mov, size)
                    .add_operand(
                        MachOperand::reg(ret_reg, subreg, false).with_kill_or_dead(),
                    )
                    .add_reg(dst, subreg, true),
            );
        } else {
            self.emit(call);
        }

        Ok(())
    }

    fn binary_operands(&mut self, id: InstId) -> BasaltResult<(MachOperand, MachOperand)> {
        let (lhs, rhs) = {
            let inst = self.inst(id);
            (inst.operands[0], inst.operands[1])
        };

        Ok((self.as_operand(lhs)?, self.as_operand(rhs)?))
    }

    fn select_iadd(&mut self, id: InstId) -> BasaltResult<()> {
        let (mut lhs, mut rhs) = self.binary_operands(id)?;

        // Only the left operand may be an immediate in AT&T order.
        if rhs.is_imm() {
            std::mem::swap(&mut lhs, &mut rhs);
        }

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        self.emit(MachInst::new(X64Mnemonic::Add, size).add_operand(lhs).add_operand(rhs.clone()));

        let dst = self.as_register(id);
        let subreg = self.subreg(ty);
        self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(rhs).add_reg(dst, subreg, true));
        Ok(())
    }

    fn select_fadd(&mut self, id: InstId) -> BasaltResult<()> {
        let (mut lhs, mut rhs) = self.binary_operands(id)?;

        if rhs.is_imm() {
            std::mem::swap(&mut lhs, &mut rhs);
        }

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        self.emit(MachInst::new(X64Mnemonic::Adds, size).add_operand(lhs).add_operand(rhs.clone()));

        let dst = self.as_register(id);
        let subreg = self.subreg(ty);
        self.emit(MachInst::new(X64Mnemonic::Movs, size).add_operand(rhs).add_reg(dst, subreg, true));
        Ok(())
    }

    fn select_isub(&mut self, id: InstId) -> BasaltResult<()> {
        let (lhs, rhs) = self.binary_operands(id)?;

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        let subreg = self.subreg(ty);
        let dst = self.as_register(id);

        if lhs.is_imm() {
            let dest = MachOperand::reg(dst, subreg, true);
            self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(lhs).add_operand(dest.clone()));
            self.emit(MachInst::new(X64Mnemonic::Sub, size).add_operand(rhs).add_operand(dest));
        } else {
            // Subtract into the left operand, then name the result.
            self.emit(
                MachInst::new(X64Mnemonic::Sub, size)
                    .add_operand(rhs)
                    .add_operand(lhs.clone()),
            );
            self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(lhs).add_reg(dst, subreg, true));
        }

        Ok(())
    }

    fn select_fsub(&mut self, id: InstId) -> BasaltResult<()> {
        let (lhs, rhs) = self.binary_operands(id)?;

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        let subreg = self.subreg(ty);
        let dst = self.as_register(id);

        if lhs.is_imm() {
            let dest = MachOperand::reg(dst, subreg, true);
            self.emit(MachInst::new(X64Mnemonic::Movs, size).add_operand(lhs).add_operand(dest.clone()));
            self.emit(MachInst::new(X64Mnemonic::Subs, size).add_operand(rhs).add_operand(dest));
        } else {
            self.emit(
                MachInst::new(X64Mnemonic::Subs, size)
                    .add_operand(rhs)
                    .add_operand(lhs.clone()),
            );
            self.emit(MachInst::new(X64Mnemonic::Movs, size).add_operand(lhs).add_reg(dst, subreg, true));
        }

        Ok(())
    }

    fn select_imul(&mut self, id: InstId) -> BasaltResult<()> {
        let (mut lhs, mut rhs) = self.binary_operands(id)?;

        if rhs.is_imm() {
            std::mem::swap(&mut lhs, &mut rhs);
        }

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        let subreg = self.subreg(ty);
        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, subreg, true);

        self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(lhs).add_operand(dest.clone()));
        self.emit(MachInst::new(X64Mnemonic::Imul, size).add_operand(rhs).add_operand(dest));
        Ok(())
    }

    /// Integer division and remainder through the fixed %rax/%rdx pair.
    fn select_division(&mut self, id: InstId) -> BasaltResult<()> {
        let (op, ty, lhs_value, rhs_value) = {
            let inst = self.inst(id);
            (inst.op, inst.ty, inst.operands[0], inst.operands[1])
        };

        let size = self.as_size(ty);
        let is_mod = matches!(op, Opcode::SMod | Opcode::UMod);
        let is_signed = matches!(op, Opcode::SDiv | Opcode::SMod);

        let lhs = self.as_operand(lhs_value)?;
        let rhs = self.as_operand(rhs_value)?;

        let lhs_ty = self.value_type(lhs_value);
        self.emit(
            MachInst::new(X64Mnemonic::Mov, size)
                .add_operand(lhs)
                .add_reg(X64Register::Rax, self.subreg(lhs_ty), true),
        );

        let subreg = self.subreg(ty);
        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, subreg, true);

        // The divisor cannot be an immediate; stage it in the destination.
        self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(rhs).add_operand(dest.clone()));

        if is_signed {
            // Sign-extend %rax into %rdx.
            self.emit(
                MachInst::new(X64Mnemonic::Cqo, X64Size::None)
                    .add_implicit_reg(X64Register::Rax, 8, true)
                    .add_implicit_reg(X64Register::Rdx, 8, true)
                    .add_implicit_reg(X64Register::Rax, 8, false),
            );

            let mut idiv = MachInst::new(X64Mnemonic::Idiv, size).add_operand(dest.clone());
            idiv = self.add_division_implicits(idiv, is_mod);
            self.emit(idiv);
        } else {
            // Zero the upper half of the dividend pair.
            self.emit(
                MachInst::new(X64Mnemonic::Mov, X64Size::Long)
                    .add_imm(0)
                    .add_operand(
                        MachOperand::reg(X64Register::Rdx, 4, true).with_kill_or_dead(),
                    )
                    .add_implicit_reg(X64Register::Rdx, 8, true),
            );

            let mut div = MachInst::new(X64Mnemonic::Div, size).add_operand(dest.clone());
            div = self.add_division_implicits(div, is_mod);
            self.emit(div);
        }

        // The quotient lands in %rax, the remainder in %rdx.
        let result = if is_mod { X64Register::Rdx } else { X64Register::Rax };
        self.emit(
            MachInst::new(X64Mnemonic::Mov, size)
                .add_operand(MachOperand::reg(result, subreg, false).with_kill_or_dead())
                .add_operand(dest),
        );

        Ok(())
    }

    fn add_division_implicits(&self, inst: MachInst, is_mod: bool) -> MachInst {
        let rax_def = MachOperand::reg(X64Register::Rax, 8, true).with_implicit();
        let rdx_def = MachOperand::reg(X64Register::Rdx, 8, true).with_implicit();

        let rax_def = if is_mod { rax_def.with_kill_or_dead() } else { rax_def };
        let rdx_def = if !is_mod { rdx_def.with_kill_or_dead() } else { rdx_def };

        inst.add_operand(rax_def)
            .add_operand(rdx_def)
            .add_operand(MachOperand::reg(X64Register::Rax, 8, false).with_implicit())
            .add_operand(
                MachOperand::reg(X64Register::Rdx, 8, false)
                    .with_implicit()
                    .with_kill_or_dead(),
            )
    }

    fn select_float_mul_div(&mut self, id: InstId) -> BasaltResult<()> {
        let (op, ty) = {
            let inst = self.inst(id);
            (inst.op, inst.ty)
        };

        let (mut lhs, rhs) = self.binary_operands(id)?;
        let size = self.as_size(ty);

        let mnemonic = match op {
            Opcode::FMul => X64Mnemonic::Muls,
            Opcode::FDiv => X64Mnemonic::Divs,
            _ => unreachable!(),
        };

        if lhs.is_constant() {
            // Pool references cannot be written; stage through %xmm0.
            let tmp = MachOperand::reg(X64Register::Xmm0, 0, true);
            self.emit(MachInst::new(X64Mnemonic::Movs, size).add_operand(lhs).add_operand(tmp.clone()));

            lhs = tmp;
            lhs.set_is_use();
            lhs.set_is_kill();
        }

        self.emit(MachInst::new(mnemonic, size).add_operand(rhs).add_operand(lhs.clone()));

        let dst = self.as_register(id);
        self.emit(MachInst::new(X64Mnemonic::Movs, size).add_operand(lhs).add_reg(dst, 8, true));
        Ok(())
    }

    fn select_logic(&mut self, id: InstId) -> BasaltResult<()> {
        let op = match self.inst(id).op {
            Opcode::And => X64Mnemonic::And,
            Opcode::Or => X64Mnemonic::Or,
            Opcode::Xor => X64Mnemonic::Xor,
            _ => unreachable!(),
        };

        let (mut lhs, mut rhs) = self.binary_operands(id)?;
        if rhs.is_imm() {
            std::mem::swap(&mut lhs, &mut rhs);
        }

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        self.emit(MachInst::new(op, size).add_operand(lhs).add_operand(rhs.clone()));

        let dst = self.as_register(id);
        let subreg = self.subreg(ty);
        self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(rhs).add_reg(dst, subreg, true));
        Ok(())
    }

    fn select_shift(&mut self, id: InstId) -> BasaltResult<()> {
        let op = match self.inst(id).op {
            Opcode::Shl => X64Mnemonic::Shl,
            Opcode::Shr => X64Mnemonic::Shr,
            Opcode::Sar => X64Mnemonic::Sar,
            _ => unreachable!(),
        };

        let (lhs, mut rhs) = self.binary_operands(id)?;

        let ty = self.inst(id).ty;
        let subreg = self.subreg(ty);
        let dst = self.as_register(id);
        let mut dest = MachOperand::reg(dst, subreg, true);

        let size = self.as_size(ty);
        self.emit(MachInst::new(X64Mnemonic::Mov, size).add_operand(lhs).add_operand(dest.clone()));

        dest.set_is_use();

        if rhs.is_imm() {
            self.emit(MachInst::new(op, size).add_operand(rhs).add_operand(dest));
        } else {
            // Dynamic shift counts travel through %cl.
            let cl = MachOperand::reg(X64Register::Rcx, 1, true);
            if rhs.is_reg() {
                rhs.set_subreg(1);
            }

            self.emit(MachInst::new(X64Mnemonic::Mov, X64Size::Byte).add_operand(rhs).add_operand(cl.clone()));

            let mut count = cl;
            count.set_is_use();
            self.emit(MachInst::new(op, size).add_operand(count).add_operand(dest));
        }

        Ok(())
    }

    fn select_not(&mut self, id: InstId) -> BasaltResult<()> {
        let source = {
            let operand = self.inst(id).operands[0];
            self.as_operand(operand)?
        };

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        self.emit(MachInst::new(X64Mnemonic::Not, size).add_operand(source.clone()));

        let dst = self.as_register(id);
        self.emit(
            MachInst::new(X64Mnemonic::Mov, size)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }

    fn select_ineg(&mut self, id: InstId) -> BasaltResult<()> {
        let source = {
            let operand = self.inst(id).operands[0];
            self.as_operand(operand)?
        };

        let ty = self.inst(id).ty;
        let size = self.as_size(ty);
        self.emit(MachInst::new(X64Mnemonic::Neg, size).add_operand(source.clone()));

        let dst = self.as_register(id);
        self.emit(
            MachInst::new(X64Mnemonic::Mov, size)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }

    /// Float negation as a subtraction from zero; there is no dedicated
    /// negate in scalar SSE.
    fn select_fneg(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, operand) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0])
        };

        let size = self.as_size(ty);
        let zero = self.cfg.consts.float(ty, 0.0);
        let align = self.cfg.machine.align_of(&self.cfg.types, ty);
        let pool_index = self.mach.pool.get_or_create(zero, align);

        let dst = self.as_register(id);
        let dest = MachOperand::reg(dst, 8, true);
        self.emit(
            MachInst::new(X64Mnemonic::Movs, size)
                .add_constant(pool_index)
                .add_operand(dest.clone()),
        );

        let source = self.as_operand(operand)?;
        self.emit(MachInst::new(X64Mnemonic::Subs, size).add_operand(source).add_operand(dest));
        Ok(())
    }

    fn select_extension(&mut self, id: InstId) -> BasaltResult<()> {
        let (op, ty, operand) = {
            let inst = self.inst(id);
            (inst.op, inst.ty, inst.operands[0])
        };

        let source_ty = self.value_type(operand);
        let source_size = self.cfg.machine.size_of(&self.cfg.types, source_ty);
        let dest_size = self.cfg.machine.size_of(&self.cfg.types, ty);
        let mut dest_subreg = self.subreg(ty);

        let mnemonic = match op {
            Opcode::SExt => {
                if source_size == 4 && dest_size == 8 {
                    X64Mnemonic::Movsxd
                } else {
                    X64Mnemonic::Movsx
                }
            }
            Opcode::ZExt => {
                if source_size == 4 && dest_size == 8 {
                    // A 32-bit move zeroes the upper half.
                    dest_subreg = 4;
                    X64Mnemonic::Mov
                } else {
                    X64Mnemonic::Movzx
                }
            }
            Opcode::FExt => X64Mnemonic::Cvtss2sd,
            _ => unreachable!(),
        };

        let source = self.as_operand(operand)?;
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mnemonic, X64Size::None)
                .add_operand(source)
                .add_reg(dst, dest_subreg, true),
        );
        Ok(())
    }

    fn select_truncation(&mut self, id: InstId) -> BasaltResult<()> {
        let (op, ty, operand) = {
            let inst = self.inst(id);
            (inst.op, inst.ty, inst.operands[0])
        };

        let dest_subreg = self.subreg(ty);
        let mut source = self.as_operand(operand)?;

        let mnemonic = match op {
            Opcode::ITrunc => {
                // Truncation renames the narrow sub-register.
                if source.is_reg() {
                    source.set_subreg(dest_subreg);
                }

                X64Mnemonic::Mov
            }
            Opcode::FTrunc => X64Mnemonic::Cvtsd2ss,
            _ => unreachable!(),
        };

        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mnemonic, X64Size::None)
                .add_operand(source)
                .add_reg(dst, dest_subreg, true),
        );
        Ok(())
    }

    fn select_cast_i2f(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, operand) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0])
        };

        let mnemonic = if self.cfg.types.is_float_width(ty, 32) {
            X64Mnemonic::Cvtsi2ss
        } else {
            X64Mnemonic::Cvtsi2sd
        };

        let source = self.as_operand(operand)?;
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mnemonic, X64Size::None)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }

    fn select_cast_f2i(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, operand) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0])
        };

        let source_ty = self.value_type(operand);
        let mnemonic = if self.cfg.types.is_float_width(source_ty, 32) {
            X64Mnemonic::Cvttss2si
        } else {
            X64Mnemonic::Cvttsd2si
        };

        let source = self.as_operand(operand)?;
        let dst = self.as_register(id);
        let size = self.as_size(ty);
        self.emit(
            MachInst::new(mnemonic, size)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }

    fn select_cast_p2i(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, operand) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0])
        };

        // A stack local's "pointer value" is its address.
        let mnemonic = if matches!(operand, Value::Local(_)) { X64Mnemonic::Lea } else { X64Mnemonic::Mov };

        let source = self.as_operand(operand)?;
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mnemonic, X64Size::Quad)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }

    /// I2P and Reint preserve the 64-bit pattern.
    fn select_cast_move(&mut self, id: InstId) -> BasaltResult<()> {
        let (ty, operand) = {
            let inst = self.inst(id);
            (inst.ty, inst.operands[0])
        };

        let mnemonic = if matches!(operand, Value::Local(_)) { X64Mnemonic::Lea } else { X64Mnemonic::Mov };

        let source = self.as_operand(operand)?;
        let dst = self.as_register(id);
        self.emit(
            MachInst::new(mnemonic, X64Size::Quad)
                .add_operand(source)
                .add_reg(dst, self.subreg(ty), true),
        );
        Ok(())
    }
}
