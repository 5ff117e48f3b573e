//! Instruction builder
//!
//! Emits instructions at an insertion point inside one function. Jump
//! builders keep predecessor/successor lists in sync. Emission into a block
//! that already terminates is dropped, so a block always holds exactly one
//! terminator and it is the last instruction.

use crate::constant::ConstId;
use crate::graph::{BlockId, Cfg, FuncId, Inst, Opcode, Predicate, Value};
use crate::types::MirTypeId;
use smallvec::SmallVec;

#[derive(Debug, Default)]
pub struct Builder {
    func: Option<FuncId>,
    insert: Option<BlockId>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_insert(&mut self, func: FuncId, block: BlockId) {
        self.func = Some(func);
        self.insert = Some(block);
    }

    pub fn clear_insert(&mut self) {
        self.func = None;
        self.insert = None;
    }

    pub fn func(&self) -> FuncId {
        self.func.expect("no insertion function set")
    }

    pub fn insert_block(&self) -> BlockId {
        self.insert.expect("no insertion point set")
    }

    /// Test if the current insertion block already ends in a terminator.
    pub fn terminated(&self, cfg: &Cfg) -> bool {
        cfg.func(self.func()).block_terminates(self.insert_block())
    }

    fn insert(
        &mut self,
        cfg: &mut Cfg,
        op: Opcode,
        def: u32,
        ty: MirTypeId,
        operands: SmallVec<[Value; 4]>,
        align: u32,
    ) -> Value {
        let func = self.func();
        let block = self.insert_block();

        let inst = cfg
            .func_mut(func)
            .add_inst(Inst { op, ty, def, operands, align });

        // Anything after a terminator is unreachable; drop it rather than
        // violate the one-terminator invariant.
        if !cfg.func(func).block_terminates(block) {
            cfg.func_mut(func).block_mut(block).insts.push(inst);
        }

        Value::Inst(inst)
    }

    /// Record the control-flow edge from the insertion block to `dest`.
    fn add_edge(&mut self, cfg: &mut Cfg, dest: BlockId) {
        let func = self.func();
        let block = self.insert_block();

        cfg.func_mut(func).block_mut(block).succs.push(dest);
        cfg.func_mut(func).block_mut(dest).preds.push(block);
    }

    pub fn build_string(&mut self, cfg: &mut Cfg, string: ConstId) -> Value {
        let ty = cfg.consts.get(string).ty();
        let def = cfg.def_id();
        self.insert(cfg, Opcode::String, def, ty, SmallVec::from_slice(&[Value::Const(string)]), 0)
    }

    pub fn build_load(&mut self, cfg: &mut Cfg, ty: MirTypeId, source: Value) -> Value {
        debug_assert!({
            let source_ty = cfg.value_type(self.func(), source);
            cfg.types.is_pointer(source_ty)
        }, "load source must be a pointer");

        let align = cfg.machine.align_of(&cfg.types, ty);
        let def = cfg.def_id();
        self.insert(cfg, Opcode::Load, def, ty, SmallVec::from_slice(&[source]), align)
    }

    pub fn build_store(&mut self, cfg: &mut Cfg, value: Value, dest: Value) {
        debug_assert!({
            let dest_ty = cfg.value_type(self.func(), dest);
            cfg.types.is_pointer(dest_ty)
        }, "store destination must be a pointer");

        let value_ty = cfg.value_type(self.func(), value);
        let align = cfg.machine.align_of(&cfg.types, value_ty);
        let void = cfg.types.void();
        self.insert(cfg, Opcode::Store, 0, void, SmallVec::from_slice(&[value, dest]), align);
    }

    /// Scaled pointer arithmetic descending through array, pointer and
    /// struct types; `ty` is the resulting pointer type.
    pub fn build_pwalk(
        &mut self,
        cfg: &mut Cfg,
        ty: MirTypeId,
        source: Value,
        indices: &[Value],
    ) -> Value {
        debug_assert!(cfg.types.is_pointer(ty), "pwalk result must be a pointer");
        debug_assert!(!indices.is_empty(), "pwalk needs at least one index");
        debug_assert!({
            let source_ty = cfg.value_type(self.func(), source);
            cfg.types.is_pointer(source_ty)
        }, "pwalk source must be a pointer");

        let mut operands = SmallVec::with_capacity(indices.len() + 1);
        operands.push(source);
        operands.extend_from_slice(indices);

        let def = cfg.def_id();
        self.insert(cfg, Opcode::PointerWalk, def, ty, operands, 0)
    }

    /// Pointer to a struct field by constant index; `ty` is the resulting
    /// pointer type.
    pub fn build_access(&mut self, cfg: &mut Cfg, ty: MirTypeId, base: Value, index: Value) -> Value {
        let def = cfg.def_id();
        self.insert(cfg, Opcode::Access, def, ty, SmallVec::from_slice(&[base, index]), 0)
    }

    /// Pointer arithmetic on a base pointer by a lone index.
    pub fn build_index(&mut self, cfg: &mut Cfg, ty: MirTypeId, base: Value, index: Value) -> Value {
        let def = cfg.def_id();
        self.insert(cfg, Opcode::Index, def, ty, SmallVec::from_slice(&[base, index]), 0)
    }

    /// Extract an element of a valued aggregate by constant index.
    pub fn build_extract(&mut self, cfg: &mut Cfg, ty: MirTypeId, base: Value, index: Value) -> Value {
        let def = cfg.def_id();
        self.insert(cfg, Opcode::Extract, def, ty, SmallVec::from_slice(&[base, index]), 0)
    }

    pub fn build_jif(
        &mut self,
        cfg: &mut Cfg,
        cond: Value,
        true_dest: BlockId,
        true_args: &[Value],
        false_dest: BlockId,
        false_args: &[Value],
    ) {
        debug_assert!({
            let cond_ty = cfg.value_type(self.func(), cond);
            cfg.types.is_integer_width(cond_ty, 1)
        }, "conditional jump condition must be a boolean");
        debug_assert_eq!(
            cfg.func(self.func()).block(true_dest).args.len(),
            true_args.len(),
            "argument count mismatch on true edge"
        );
        debug_assert_eq!(
            cfg.func(self.func()).block(false_dest).args.len(),
            false_args.len(),
            "argument count mismatch on false edge"
        );

        if self.terminated(cfg) {
            return;
        }

        self.add_edge(cfg, true_dest);
        self.add_edge(cfg, false_dest);

        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(cond);
        operands.push(Value::Block(true_dest));
        operands.extend_from_slice(true_args);
        operands.push(Value::Block(false_dest));
        operands.extend_from_slice(false_args);

        let void = cfg.types.void();
        self.insert(cfg, Opcode::CondJump, 0, void, operands, 0);
    }

    pub fn build_jmp(&mut self, cfg: &mut Cfg, dest: BlockId, args: &[Value]) {
        debug_assert_eq!(
            cfg.func(self.func()).block(dest).args.len(),
            args.len(),
            "argument count mismatch on jump edge"
        );

        if self.terminated(cfg) {
            return;
        }

        self.add_edge(cfg, dest);

        let mut operands: SmallVec<[Value; 4]> = SmallVec::new();
        operands.push(Value::Block(dest));
        operands.extend_from_slice(args);

        let void = cfg.types.void();
        self.insert(cfg, Opcode::Jump, 0, void, operands, 0);
    }

    pub fn build_ret(&mut self, cfg: &mut Cfg, value: Option<Value>) {
        let operands = match value {
            Some(value) => SmallVec::from_slice(&[value]),
            None => SmallVec::new(),
        };

        let void = cfg.types.void();
        self.insert(cfg, Opcode::Ret, 0, void, operands, 0);
    }

    pub fn build_abort(&mut self, cfg: &mut Cfg) {
        let void = cfg.types.void();
        self.insert(cfg, Opcode::Abort, 0, void, SmallVec::new(), 0);
    }

    pub fn build_unreachable(&mut self, cfg: &mut Cfg) {
        let void = cfg.types.void();
        self.insert(cfg, Opcode::Unreachable, 0, void, SmallVec::new(), 0);
    }

    /// A call; returns the result value when the callee produces one.
    pub fn build_call(
        &mut self,
        cfg: &mut Cfg,
        fn_ty: MirTypeId,
        callee: Value,
        args: &[Value],
    ) -> Option<Value> {
        let ret = cfg.types.fn_ret(fn_ty).expect("call requires a function type");

        let mut operands = SmallVec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);

        let def = if cfg.types.is_void(ret) { 0 } else { cfg.def_id() };
        let value = self.insert(cfg, Opcode::Call, def, ret, operands, 0);
        (def != 0).then_some(value)
    }

    pub fn build_cmp(&mut self, cfg: &mut Cfg, pred: Predicate, lhs: Value, rhs: Value) -> Value {
        debug_assert!({
            let lhs_ty = cfg.value_type(self.func(), lhs);
            let rhs_ty = cfg.value_type(self.func(), rhs);
            lhs_ty == rhs_ty
        }, "comparison operands must have the same type");

        let i1 = cfg.types.i1();
        let def = cfg.def_id();
        self.insert(cfg, Opcode::Cmp(pred), def, i1, SmallVec::from_slice(&[lhs, rhs]), 0)
    }

    fn build_binop(&mut self, cfg: &mut Cfg, op: Opcode, lhs: Value, rhs: Value) -> Value {
        debug_assert!({
            let lhs_ty = cfg.value_type(self.func(), lhs);
            let rhs_ty = cfg.value_type(self.func(), rhs);
            lhs_ty == rhs_ty
        }, "binary operands must have the same type");

        let ty = cfg.value_type(self.func(), lhs);
        let def = cfg.def_id();
        self.insert(cfg, op, def, ty, SmallVec::from_slice(&[lhs, rhs]), 0)
    }

    pub fn build_iadd(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::IAdd, lhs, rhs)
    }

    pub fn build_isub(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::ISub, lhs, rhs)
    }

    pub fn build_imul(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::IMul, lhs, rhs)
    }

    pub fn build_sdiv(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::SDiv, lhs, rhs)
    }

    pub fn build_udiv(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::UDiv, lhs, rhs)
    }

    pub fn build_smod(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::SMod, lhs, rhs)
    }

    pub fn build_umod(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::UMod, lhs, rhs)
    }

    pub fn build_fadd(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::FAdd, lhs, rhs)
    }

    pub fn build_fsub(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::FSub, lhs, rhs)
    }

    pub fn build_fmul(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::FMul, lhs, rhs)
    }

    pub fn build_fdiv(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::FDiv, lhs, rhs)
    }

    pub fn build_and(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::And, lhs, rhs)
    }

    pub fn build_or(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::Or, lhs, rhs)
    }

    pub fn build_xor(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::Xor, lhs, rhs)
    }

    pub fn build_shl(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::Shl, lhs, rhs)
    }

    pub fn build_shr(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::Shr, lhs, rhs)
    }

    pub fn build_sar(&mut self, cfg: &mut Cfg, lhs: Value, rhs: Value) -> Value {
        self.build_binop(cfg, Opcode::Sar, lhs, rhs)
    }

    fn build_unop(&mut self, cfg: &mut Cfg, op: Opcode, value: Value) -> Value {
        let ty = cfg.value_type(self.func(), value);
        let def = cfg.def_id();
        self.insert(cfg, op, def, ty, SmallVec::from_slice(&[value]), 0)
    }

    pub fn build_not(&mut self, cfg: &mut Cfg, value: Value) -> Value {
        self.build_unop(cfg, Opcode::Not, value)
    }

    pub fn build_ineg(&mut self, cfg: &mut Cfg, value: Value) -> Value {
        self.build_unop(cfg, Opcode::INeg, value)
    }

    pub fn build_fneg(&mut self, cfg: &mut Cfg, value: Value) -> Value {
        self.build_unop(cfg, Opcode::FNeg, value)
    }

    /// Emit a cast instruction; `op` must be one of the cast opcodes and
    /// `ty` the destination type.
    pub fn build_cast(&mut self, cfg: &mut Cfg, op: Opcode, ty: MirTypeId, value: Value) -> Value {
        debug_assert!(matches!(
            op,
            Opcode::SExt
                | Opcode::ZExt
                | Opcode::FExt
                | Opcode::ITrunc
                | Opcode::FTrunc
                | Opcode::S2F
                | Opcode::U2F
                | Opcode::F2S
                | Opcode::F2U
                | Opcode::P2I
                | Opcode::I2P
                | Opcode::Reint
        ), "not a cast opcode");

        let def = cfg.def_id();
        self.insert(cfg, op, def, ty, SmallVec::from_slice(&[value]), 0)
    }
}
