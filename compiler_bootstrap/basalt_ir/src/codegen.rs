//! AST to MIR lowering
//!
//! A structural walk over the type-checked AST in two phases: `Declare`
//! creates empty globals, function shells and named struct types so that
//! forward references resolve; `Define` fills in function bodies, global
//! initializers and struct field lists.
//!
//! Expression lowering threads a value context: `addressed` lowering yields
//! the storage location of an expression, `valued` lowering additionally
//! loads from it. Aggregate moves go through the external `__copy`
//! intrinsic; short-circuit operators become explicit control flow merging
//! into a block with a single 1-bit block argument.

use crate::builder::Builder;
use crate::graph::{BlockId, Cfg, FuncArg, FuncId, Function, Global, Linkage, LocalId, Opcode, Predicate, Value};
use crate::types::MirTypeId;
use basalt_common::{BasaltError, BasaltResult, Diagnostics, Span};
use basalt_parser::{
    BinOp, DefnId, DefnKind, ExprId, ExprKind, QualType, Rune, StmtId, StmtKind, Type, UnOp, Unit,
};
use hashbrown::HashMap;

pub struct Codegen<'d> {
    diagnostics: &'d mut Diagnostics,
    builder: Builder,
    func: Option<FuncId>,

    /// Condition and merge blocks of the innermost loop, for restart/stop.
    parent_cond: Option<BlockId>,
    parent_merge: Option<BlockId>,

    /// AST variable/parameter definitions to their stack locals, per
    /// function.
    locals: HashMap<DefnId, LocalId>,
}

impl<'d> Codegen<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            diagnostics,
            builder: Builder::new(),
            func: None,
            parent_cond: None,
            parent_merge: None,
            locals: HashMap::new(),
        }
    }

    /// Lower a whole unit: declare everything, then define everything.
    pub fn run(cfg: &mut Cfg, unit: &Unit, diagnostics: &'d mut Diagnostics) -> BasaltResult<()> {
        let mut codegen = Codegen::new(diagnostics);
        codegen.declare(cfg, unit)?;
        codegen.define(cfg, unit)
    }

    /// The `Declare` phase over one unit.
    pub fn declare(&mut self, cfg: &mut Cfg, unit: &Unit) -> BasaltResult<()> {
        for &defn in &unit.top {
            match &unit.defn(defn).kind {
                DefnKind::Function { .. } => self.declare_function(cfg, unit, defn),
                DefnKind::Struct { .. } => self.declare_struct(cfg, unit, defn),
                DefnKind::Var { global: true, .. } => self.declare_global(cfg, unit, defn),
                _ => {}
            }
        }

        Ok(())
    }

    /// The `Define` phase over one unit.
    pub fn define(&mut self, cfg: &mut Cfg, unit: &Unit) -> BasaltResult<()> {
        for &defn in &unit.top {
            match &unit.defn(defn).kind {
                DefnKind::Function { .. } => self.define_function(cfg, unit, defn)?,
                DefnKind::Struct { .. } => self.define_struct(cfg, unit, defn),
                DefnKind::Var { global: true, .. } => self.define_global(cfg, unit, defn)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn fatal(&mut self, unit: &Unit, message: String, span: Span) -> BasaltError {
        self.diagnostics.fatal(BasaltError::codegen(message), &unit.file, span)
    }

    /// Lower a surface type to its MIR equivalent. Aliases and enums
    /// dissolve into their underlying types; booleans and chars become
    /// 8-bit integers.
    fn lower_type(cfg: &mut Cfg, unit: &Unit, ty: QualType) -> MirTypeId {
        match unit.types.get(ty.ty).clone() {
            Type::Alias { underlying, .. } => Self::lower_type(cfg, unit, underlying),

            Type::Enum { name, underlying } => {
                // The interned enum still holds the parse-time underlying
                // handle; the resolved handle lives on the defining node.
                let underlying = if unit.types.is_deferred(underlying.ty) {
                    let defn = unit
                        .scopes
                        .lookup(unit.root_scope, &name)
                        .expect("enum types have a defining node");

                    match &unit.defn(defn).kind {
                        DefnKind::Enum { underlying, .. } => *underlying,
                        _ => underlying,
                    }
                } else {
                    underlying
                };

                Self::lower_type(cfg, unit, underlying)
            }

            Type::Void => cfg.types.void(),
            Type::Bool | Type::Char | Type::Int8 | Type::UInt8 => cfg.types.i8(),
            Type::Int16 | Type::UInt16 => cfg.types.i16(),
            Type::Int32 | Type::UInt32 => cfg.types.i32(),
            Type::Int64 | Type::UInt64 => cfg.types.i64(),
            Type::Float32 => cfg.types.f32(),
            Type::Float64 => cfg.types.f64(),

            Type::Pointer { pointee } => {
                let pointee = Self::lower_type(cfg, unit, pointee);
                cfg.types.pointer(pointee)
            }

            Type::Array { element, len } => {
                let element = Self::lower_type(cfg, unit, element);
                cfg.types.array(element, len)
            }

            Type::Struct { name } => cfg
                .types
                .struct_by_name(&name)
                .expect("struct type used before declaration"),

            Type::Function { params, ret } => {
                let ret = Self::lower_type(cfg, unit, ret);
                let params = params
                    .into_iter()
                    .map(|p| Self::lower_type(cfg, unit, p))
                    .collect();

                cfg.types.function(params, ret)
            }

            Type::Deferred { .. } => unreachable!("deferred type survived symbol analysis"),
        }
    }

    /// Fetch or declare an external intrinsic such as `__copy`.
    fn get_intrinsic(
        cfg: &mut Cfg,
        name: &str,
        ret: MirTypeId,
        params: Vec<MirTypeId>,
    ) -> FuncId {
        if let Some(func) = cfg.function_by_name(name) {
            return func;
        }

        let args = params
            .iter()
            .map(|&ty| FuncArg { name: String::new(), ty })
            .collect();

        let ty = cfg.types.function(params, ret);
        cfg.create_function(Function::new(name, Linkage::External, ty, args))
            .expect("intrinsic name collision")
    }

    /// Emit `__copy(dest, source, size)` for an aggregate move.
    fn build_copy(&mut self, cfg: &mut Cfg, dest: Value, source: Value, ty: MirTypeId) {
        let void = cfg.types.void();
        let void_ptr = cfg.types.void_pointer();
        let i64 = cfg.types.i64();
        let copy = Self::get_intrinsic(cfg, "__copy", void, vec![void_ptr, void_ptr, i64]);

        let size = cfg.machine.size_of(&cfg.types, ty);
        let size = Value::Const(cfg.consts.int(i64, size as i64));
        let copy_ty = cfg.func(copy).ty;
        self.builder.build_call(cfg, copy_ty, Value::Func(copy), &[dest, source, size]);
    }

    // Declarations

    fn linkage_of(unit: &Unit, defn: DefnId) -> Linkage {
        if unit.has_rune(defn, Rune::Public) {
            Linkage::External
        } else {
            Linkage::Internal
        }
    }

    fn declare_function(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) {
        let (name, ty, params) = match &unit.defn(defn).kind {
            DefnKind::Function { name, ty, params, .. } => (name.clone(), *ty, params.clone()),
            _ => unreachable!(),
        };

        // Declarations may be repeated across units; the first wins and
        // later bodies fill it in.
        if cfg.function_by_name(&name).is_some() {
            return;
        }

        let linkage = Self::linkage_of(unit, defn);
        let fn_ty = Self::lower_type(cfg, unit, ty);

        let args = params
            .iter()
            .map(|&param| {
                let (param_name, param_ty) = match &unit.defn(param).kind {
                    DefnKind::Param { name, ty } => (name.clone(), *ty),
                    _ => unreachable!(),
                };

                let name = if param_name == "_" { String::new() } else { param_name };
                FuncArg { name, ty: Self::lower_type(cfg, unit, param_ty) }
            })
            .collect();

        cfg.create_function(Function::new(name, linkage, fn_ty, args));
    }

    fn declare_struct(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) {
        if let DefnKind::Struct { name, .. } = &unit.defn(defn).kind {
            cfg.types.create_struct(name);
        }
    }

    fn declare_global(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) {
        let (name, ty) = match &unit.defn(defn).kind {
            DefnKind::Var { name, ty, .. } => (name.clone(), *ty),
            _ => unreachable!(),
        };

        if cfg.global_by_name(&name).is_some() {
            return;
        }

        let linkage = Self::linkage_of(unit, defn);
        let ty = Self::lower_type(cfg, unit, ty);

        // Globals stay writable even without `mut`: an immutable array of
        // mutable elements must not land in read-only data.
        cfg.create_global(Global { name, ty, linkage, read_only: false, init: None });
    }

    // Definitions

    fn define_struct(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) {
        let (name, fields) = match &unit.defn(defn).kind {
            DefnKind::Struct { name, fields, .. } => (name.clone(), fields.clone()),
            _ => unreachable!(),
        };

        let ty = cfg.types.struct_by_name(&name).expect("struct was declared");
        if !cfg.types.fields_of(ty).is_empty() {
            return;
        }

        for field in fields {
            let field_ty = unit.defn_type(field).expect("fields are typed");
            let lowered = Self::lower_type(cfg, unit, field_ty);
            cfg.types.append_field(&name, lowered);
        }
    }

    fn define_global(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) -> BasaltResult<()> {
        let (name, init) = match &unit.defn(defn).kind {
            DefnKind::Var { name, init, .. } => (name.clone(), *init),
            _ => unreachable!(),
        };

        let init = match init {
            Some(init) => init,
            None => return Ok(()),
        };

        let constant = match self.codegen_constant(cfg, unit, init) {
            Some(constant) => constant,
            None => {
                let span = unit.expr(init).span;
                return Err(self.fatal(
                    unit,
                    "global is not initialized with a constant".to_string(),
                    span,
                ));
            }
        };

        let global = cfg.global_by_name(&name).expect("global was declared");
        cfg.global_mut(global).init = Some(constant);
        Ok(())
    }

    fn define_function(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) -> BasaltResult<()> {
        let (name, params, body, span) = match &unit.defn(defn).kind {
            DefnKind::Function { name, params, body, .. } => {
                (name.clone(), params.clone(), *body, unit.defn(defn).span)
            }
            _ => unreachable!(),
        };

        let body = match body {
            Some(body) => body,
            None => return Ok(()),
        };

        let func = cfg.function_by_name(&name).expect("function was declared");
        self.func = Some(func);
        self.locals.clear();

        let entry = cfg.func_mut(func).create_block(Vec::new());
        cfg.func_mut(func).append_block(entry);
        self.builder.set_insert(func, entry);

        // Spill every argument into a stack local so that parameter
        // references have storage.
        for (i, &param) in params.iter().enumerate() {
            let arg_ty = cfg.func(func).args[i].ty;
            let arg_name = cfg.func(func).args[i].name.clone();
            let align = cfg.machine.align_of(&cfg.types, arg_ty);

            let local = cfg.func_mut(func).create_local(&arg_name, arg_ty, align);
            self.locals.insert(param, local);
            self.builder.build_store(cfg, Value::Arg(i as u32), Value::Local(local));
        }

        self.codegen_statement(cfg, unit, body)?;

        if !self.builder.terminated(cfg) {
            let ret = cfg.types.fn_ret(cfg.func(func).ty).expect("function type");
            if cfg.types.is_void(ret) {
                self.builder.build_ret(cfg, None);
            } else {
                self.diagnostics
                    .warn("function does not always return", &unit.file, span);
            }
        }

        self.func = None;
        self.builder.clear_insert();
        Ok(())
    }

    fn codegen_local_variable(&mut self, cfg: &mut Cfg, unit: &Unit, defn: DefnId) -> BasaltResult<()> {
        let (name, var_ty, init) = match &unit.defn(defn).kind {
            DefnKind::Var { name, ty, init, .. } => (name.clone(), *ty, *init),
            _ => unreachable!(),
        };

        let func = self.func.expect("local outside of a function");
        let ty = Self::lower_type(cfg, unit, var_ty);
        let align = cfg.machine.align_of(&cfg.types, ty);
        let local = cfg.func_mut(func).create_local(&name, ty, align);
        self.locals.insert(defn, local);

        let init = match init {
            Some(init) => init,
            None => return Ok(()),
        };

        if cfg.machine.is_scalar(&cfg.types, ty) {
            let value = self.valued(cfg, unit, init)?;
            self.builder.build_store(cfg, value, Value::Local(local));
        } else if let Some(value) = self.codegen_addressed(cfg, unit, init)? {
            self.build_copy(cfg, Value::Local(local), value, ty);
        }

        Ok(())
    }

    // Statements

    fn codegen_statement(&mut self, cfg: &mut Cfg, unit: &Unit, id: StmtId) -> BasaltResult<()> {
        match unit.stmt(id).kind.clone() {
            StmtKind::Block { stmts, .. } => {
                for stmt in stmts {
                    self.codegen_statement(cfg, unit, stmt)?;
                }

                Ok(())
            }

            StmtKind::Local(defn) => self.codegen_local_variable(cfg, unit, defn),

            StmtKind::Expr(expr) => {
                self.codegen_valued(cfg, unit, expr)?;
                Ok(())
            }

            StmtKind::If { cond, then, els } => self.codegen_if(cfg, unit, cond, then, els),

            StmtKind::Until { cond, body } => self.codegen_until(cfg, unit, cond, body),

            StmtKind::Ret(expr) => self.codegen_return(cfg, unit, id, expr),

            StmtKind::Stop => {
                if !self.builder.terminated(cfg) {
                    let merge = self.parent_merge.expect("no merge block to stop to");
                    self.builder.build_jmp(cfg, merge, &[]);
                }

                Ok(())
            }

            StmtKind::Restart => {
                if !self.builder.terminated(cfg) {
                    let cond = self.parent_cond.expect("no condition block to restart to");
                    self.builder.build_jmp(cfg, cond, &[]);
                }

                Ok(())
            }

            StmtKind::Rune(rune) => {
                match rune {
                    Rune::Abort => self.builder.build_abort(cfg),
                    Rune::Unreachable => self.builder.build_unreachable(cfg),
                    Rune::Public => unreachable!("$public is not a statement"),
                }

                Ok(())
            }
        }
    }

    fn codegen_if(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        cond: ExprId,
        then: StmtId,
        els: Option<StmtId>,
    ) -> BasaltResult<()> {
        let func = self.func.expect("statement outside of a function");

        let condition = self.valued(cfg, unit, cond)?;
        let condition = self.inject_bool_comparison(cfg, unit, condition, unit.expr(cond).span)?;

        let then_bb = cfg.func_mut(func).create_block(Vec::new());
        cfg.func_mut(func).append_block(then_bb);
        let merge_bb = cfg.func_mut(func).create_block(Vec::new());

        let else_bb = if els.is_some() {
            let else_bb = cfg.func_mut(func).create_block(Vec::new());
            self.builder.build_jif(cfg, condition, then_bb, &[], else_bb, &[]);
            Some(else_bb)
        } else {
            self.builder.build_jif(cfg, condition, then_bb, &[], merge_bb, &[]);
            None
        };

        self.builder.set_insert(func, then_bb);
        self.codegen_statement(cfg, unit, then)?;

        if !self.builder.terminated(cfg) {
            self.builder.build_jmp(cfg, merge_bb, &[]);
        }

        if let (Some(els), Some(else_bb)) = (els, else_bb) {
            cfg.func_mut(func).append_block(else_bb);
            self.builder.set_insert(func, else_bb);
            self.codegen_statement(cfg, unit, els)?;

            if !self.builder.terminated(cfg) {
                self.builder.build_jmp(cfg, merge_bb, &[]);
            }
        }

        // Append the merge block only if some arm falls through to it.
        if !cfg.func(func).block(merge_bb).preds.is_empty() {
            cfg.func_mut(func).append_block(merge_bb);
            self.builder.set_insert(func, merge_bb);
        }

        Ok(())
    }

    fn codegen_until(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        cond: ExprId,
        body: Option<StmtId>,
    ) -> BasaltResult<()> {
        let func = self.func.expect("statement outside of a function");

        let cond_bb = cfg.func_mut(func).create_block(Vec::new());
        cfg.func_mut(func).append_block(cond_bb);
        let merge_bb = cfg.func_mut(func).create_block(Vec::new());

        self.builder.build_jmp(cfg, cond_bb, &[]);

        self.builder.set_insert(func, cond_bb);
        let condition = self.valued(cfg, unit, cond)?;
        let condition = self.inject_bool_comparison(cfg, unit, condition, unit.expr(cond).span)?;

        if let Some(body) = body {
            let body_bb = cfg.func_mut(func).create_block(Vec::new());
            cfg.func_mut(func).append_block(body_bb);

            // The loop exits once the condition holds.
            self.builder.build_jif(cfg, condition, merge_bb, &[], body_bb, &[]);

            self.builder.set_insert(func, body_bb);

            let prev_cond = self.parent_cond.take();
            let prev_merge = self.parent_merge.take();
            self.parent_cond = Some(cond_bb);
            self.parent_merge = Some(merge_bb);

            self.codegen_statement(cfg, unit, body)?;

            if !self.builder.terminated(cfg) {
                self.builder.build_jmp(cfg, cond_bb, &[]);
            }

            self.parent_cond = prev_cond;
            self.parent_merge = prev_merge;
        } else {
            // A bodiless loop spins on its own condition block.
            self.builder.build_jif(cfg, condition, merge_bb, &[], cond_bb, &[]);
        }

        cfg.func_mut(func).append_block(merge_bb);
        self.builder.set_insert(func, merge_bb);
        Ok(())
    }

    fn codegen_return(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        stmt: StmtId,
        expr: Option<ExprId>,
    ) -> BasaltResult<()> {
        let expr = match expr {
            Some(expr) => expr,
            None => {
                self.builder.build_ret(cfg, None);
                return Ok(());
            }
        };

        let ty = Self::lower_type(cfg, unit, unit.expr_type(expr));
        if cfg.machine.is_scalar(&cfg.types, ty) {
            let value = self.valued(cfg, unit, expr)?;
            self.builder.build_ret(cfg, Some(value));
            Ok(())
        } else {
            // The hidden return-pointer convention is not wired through
            // function definitions.
            let span = unit.stmt(stmt).span;
            Err(self.fatal(
                unit,
                "cannot return a non-scalar value from a function body".to_string(),
                span,
            ))
        }
    }

    // Expressions, valued context

    /// Lower `expr` for its value, failing if it produces none.
    fn valued(&mut self, cfg: &mut Cfg, unit: &Unit, expr: ExprId) -> BasaltResult<Value> {
        match self.codegen_valued(cfg, unit, expr)? {
            Some(value) => Ok(value),
            None => {
                let span = unit.expr(expr).span;
                Err(self.fatal(unit, "expression does not produce a value".to_string(), span))
            }
        }
    }

    /// Lower `expr` for its address, failing if it has none.
    fn addressed(&mut self, cfg: &mut Cfg, unit: &Unit, expr: ExprId) -> BasaltResult<Value> {
        match self.codegen_addressed(cfg, unit, expr)? {
            Some(value) => Ok(value),
            None => {
                let span = unit.expr(expr).span;
                Err(self.fatal(unit, "expression does not designate storage".to_string(), span))
            }
        }
    }

    fn codegen_valued(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
    ) -> BasaltResult<Option<Value>> {
        let span = unit.expr(id).span;

        match unit.expr(id).kind.clone() {
            ExprKind::Bool(value) => {
                let i8 = cfg.types.i8();
                Ok(Some(Value::Const(cfg.consts.int(i8, value as i64))))
            }

            ExprKind::Int(value) => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(Value::Const(cfg.consts.int(ty, value))))
            }

            ExprKind::Char(value) => {
                let i8 = cfg.types.i8();
                Ok(Some(Value::Const(cfg.consts.int(i8, value as i64))))
            }

            ExprKind::Float(value) => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(Value::Const(cfg.consts.float(ty, value))))
            }

            ExprKind::Null => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(Value::Const(cfg.consts.null(ty))))
            }

            ExprKind::Str(value) => {
                let i8 = cfg.types.i8();
                let ptr = cfg.types.pointer(i8);
                let constant = cfg.consts.string(ptr, &value);
                Ok(Some(self.builder.build_string(cfg, constant)))
            }

            ExprKind::Sizeof { target } => {
                let target = Self::lower_type(cfg, unit, target);
                let size = cfg.machine.size_of(&cfg.types, target);
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(Value::Const(cfg.consts.int(ty, size as i64))))
            }

            ExprKind::Ref { defn, .. } => {
                let defn = defn.expect("reference left unresolved");

                match &unit.defn(defn).kind {
                    DefnKind::Param { .. } | DefnKind::Var { .. } => {
                        let ptr = self.addressed(cfg, unit, id)?;
                        let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                        Ok(Some(self.builder.build_load(cfg, ty, ptr)))
                    }

                    DefnKind::Variant { value, .. } => {
                        let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                        Ok(Some(Value::Const(cfg.consts.int(ty, *value))))
                    }

                    _ => Err(self.fatal(
                        unit,
                        "unable to generate valued reference".to_string(),
                        span,
                    )),
                }
            }

            ExprKind::Access { .. } => {
                let ptr = self.addressed(cfg, unit, id)?;
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(self.builder.build_load(cfg, ty, ptr)))
            }

            ExprKind::Subscript { .. } => {
                let ptr = self.addressed(cfg, unit, id)?;
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Ok(Some(self.builder.build_load(cfg, ty, ptr)))
            }

            ExprKind::Unary { op, expr } => match op {
                UnOp::Negate => self.codegen_negation(cfg, unit, expr).map(Some),
                UnOp::Not => self.codegen_bitwise_not(cfg, unit, expr, span).map(Some),
                UnOp::LogicNot => self.codegen_logical_not(cfg, unit, expr, span).map(Some),
                UnOp::AddressOf => self.addressed(cfg, unit, expr).map(Some),
                UnOp::Deref => {
                    let ptr = self.valued(cfg, unit, expr)?;
                    let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                    Ok(Some(self.builder.build_load(cfg, ty, ptr)))
                }
            },

            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::Assign => self.codegen_assignment(cfg, unit, lhs, rhs),
                BinOp::Add | BinOp::Sub => {
                    self.codegen_addition(cfg, unit, op, lhs, rhs, span).map(Some)
                }
                BinOp::Mul => self.codegen_multiply(cfg, unit, lhs, rhs, span).map(Some),
                BinOp::Div | BinOp::Mod => {
                    self.codegen_division(cfg, unit, op, lhs, rhs, span).map(Some)
                }
                BinOp::And | BinOp::Or | BinOp::Xor => {
                    self.codegen_bitwise(cfg, unit, op, lhs, rhs).map(Some)
                }
                BinOp::Shl | BinOp::Shr => {
                    self.codegen_shift(cfg, unit, op, lhs, rhs).map(Some)
                }
                BinOp::LogicAnd => self.codegen_logical_and(cfg, unit, lhs, rhs).map(Some),
                BinOp::LogicOr => self.codegen_logical_or(cfg, unit, lhs, rhs).map(Some),
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    self.codegen_comparison(cfg, unit, op, lhs, rhs, span).map(Some)
                }
            },

            ExprKind::Call { callee, args } => self.codegen_call(cfg, unit, callee, &args),

            ExprKind::Cast { expr } => self.codegen_cast(cfg, unit, id, expr).map(Some),

            ExprKind::Paren(inner) => self.codegen_valued(cfg, unit, inner),
        }
    }

    // Expressions, addressed context

    fn codegen_addressed(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
    ) -> BasaltResult<Option<Value>> {
        match unit.expr(id).kind.clone() {
            ExprKind::Unary { op: UnOp::Deref, expr } => {
                self.valued(cfg, unit, expr).map(Some)
            }

            ExprKind::Access { base, field, .. } => {
                self.codegen_addressed_access(cfg, unit, id, base, field).map(Some)
            }

            ExprKind::Ref { defn, .. } => {
                self.codegen_addressed_reference(cfg, unit, id, defn).map(Some)
            }

            ExprKind::Subscript { base, index } => {
                self.codegen_addressed_subscript(cfg, unit, id, base, index).map(Some)
            }

            ExprKind::Paren(inner) => self.codegen_addressed(cfg, unit, inner),

            // An aggregate-returning call's def stands in for its result;
            // instruction selection gives it a stack slot and resolves uses
            // of the def to that slot's address. Scalar calls have no
            // address.
            ExprKind::Call { callee, args } => {
                let result = Self::lower_type(cfg, unit, unit.expr_type(id));
                if cfg.machine.is_scalar(&cfg.types, result) {
                    Ok(None)
                } else {
                    self.codegen_call(cfg, unit, callee, &args)
                }
            }

            _ => Ok(None),
        }
    }

    fn codegen_addressed_reference(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
        defn: Option<DefnId>,
    ) -> BasaltResult<Value> {
        let span = unit.expr(id).span;
        let defn = defn.expect("reference left unresolved");

        match &unit.defn(defn).kind {
            DefnKind::Function { name, .. } => {
                let func = cfg
                    .function_by_name(name)
                    .expect("function was declared");
                Ok(Value::Func(func))
            }

            DefnKind::Param { .. } => match self.locals.get(&defn) {
                Some(&local) => Ok(Value::Local(local)),
                None => Err(self.fatal(unit, "parameter has no storage".to_string(), span)),
            },

            DefnKind::Var { name, global, .. } => {
                if *global {
                    let global = cfg.global_by_name(name).expect("global was declared");
                    Ok(Value::Global(global))
                } else {
                    match self.locals.get(&defn) {
                        Some(&local) => Ok(Value::Local(local)),
                        None => {
                            Err(self.fatal(unit, "local has no storage".to_string(), span))
                        }
                    }
                }
            }

            _ => Err(self.fatal(unit, "unable to generate address reference".to_string(), span)),
        }
    }

    fn codegen_addressed_access(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
        base: ExprId,
        field: Option<DefnId>,
    ) -> BasaltResult<Value> {
        let span = unit.expr(id).span;
        let base_type = unit.expr_type(base);

        // Pointer bases behave like a C arrow access: the pointer value is
        // the struct address. Struct bases contribute their own address.
        let ptr = if unit.types.is_pointer(base_type.ty) {
            self.valued(cfg, unit, base)?
        } else if unit.types.is_struct(base_type.ty) {
            self.addressed(cfg, unit, base)?
        } else {
            return Err(self.fatal(
                unit,
                format!("bad type operand to '.': {}", unit.types.display(base_type)),
                span,
            ));
        };

        let index = match &unit.defn(field.expect("field access left unresolved")).kind {
            DefnKind::Field { index, .. } => *index,
            _ => unreachable!("access resolves to a field"),
        };

        let field_ty = Self::lower_type(cfg, unit, unit.expr_type(id));
        let result = cfg.types.pointer(field_ty);

        let i32 = cfg.types.i32();
        let zero = Value::Const(cfg.consts.int(i32, 0));
        let index = Value::Const(cfg.consts.int(i32, index as i64));
        Ok(self.builder.build_pwalk(cfg, result, ptr, &[zero, index]))
    }

    fn codegen_addressed_subscript(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
        base: ExprId,
        index: ExprId,
    ) -> BasaltResult<Value> {
        let span = unit.expr(id).span;
        let base_type = unit.expr_type(base);

        let element_ty = Self::lower_type(cfg, unit, unit.expr_type(id));
        let result = cfg.types.pointer(element_ty);

        let index = self.valued(cfg, unit, index)?;

        if unit.types.is_array(base_type.ty) {
            // The base address points at the whole array; step through the
            // pointer first, then scale within the array.
            let ptr = self.addressed(cfg, unit, base)?;
            let i32 = cfg.types.i32();
            let zero = Value::Const(cfg.consts.int(i32, 0));
            Ok(self.builder.build_pwalk(cfg, result, ptr, &[zero, index]))
        } else if unit.types.is_pointer(base_type.ty) {
            let ptr = self.valued(cfg, unit, base)?;
            Ok(self.builder.build_pwalk(cfg, result, ptr, &[index]))
        } else {
            Err(self.fatal(
                unit,
                format!("bad type operand to '[]': {}", unit.types.display(base_type)),
                span,
            ))
        }
    }

    // Operators

    /// Constant payloads of a value, when it is an interned constant.
    fn as_const_int(cfg: &Cfg, value: Value) -> Option<(MirTypeId, i64)> {
        match value {
            Value::Const(id) => match cfg.consts.get(id) {
                crate::constant::Const::Int { ty, value } => Some((*ty, *value)),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_const_float(cfg: &Cfg, value: Value) -> Option<(MirTypeId, f64)> {
        match value {
            Value::Const(id) => match cfg.consts.get(id) {
                crate::constant::Const::Float { ty, bits } => Some((*ty, f64::from_bits(*bits))),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_null_const(cfg: &Cfg, value: Value) -> bool {
        matches!(value, Value::Const(id) if cfg.consts.is_null(id))
    }

    fn value_type(&self, cfg: &mut Cfg, value: Value) -> MirTypeId {
        cfg.value_type(self.func.expect("expression outside of a function"), value)
    }

    fn codegen_assignment(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        lhs: ExprId,
        rhs: ExprId,
    ) -> BasaltResult<Option<Value>> {
        let ty = Self::lower_type(cfg, unit, unit.expr_type(rhs));

        // The right operand evaluates before the left's storage location.
        if cfg.machine.is_scalar(&cfg.types, ty) {
            let value = self.valued(cfg, unit, rhs)?;
            let lval = self.addressed(cfg, unit, lhs)?;
            self.builder.build_store(cfg, value, lval);

            // The right operand is the value of the assignment.
            Ok(Some(value))
        } else {
            let value = self.codegen_addressed(cfg, unit, rhs)?;
            let lval = self.addressed(cfg, unit, lhs)?;
            if let Some(value) = value {
                self.build_copy(cfg, lval, value, ty);
            }

            // Aggregate assignment results are not reusable.
            Ok(None)
        }
    }

    fn codegen_addition(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let mut rhs_value = self.valued(cfg, unit, rhs)?;

        let lhs_ty = self.value_type(cfg, lhs_value);
        let rhs_ty = self.value_type(cfg, rhs_value);

        if cfg.types.is_pointer(lhs_ty) && cfg.types.is_integer(rhs_ty) {
            // Pointer arithmetic; subtraction negates the index.
            if op == BinOp::Sub {
                rhs_value = match Self::as_const_int(cfg, rhs_value) {
                    Some((ty, value)) => Value::Const(cfg.consts.int(ty, -value)),
                    None => self.builder.build_ineg(cfg, rhs_value),
                };
            }

            return Ok(self.builder.build_pwalk(cfg, lhs_ty, lhs_value, &[rhs_value]));
        }

        if cfg.types.is_integer(lhs_ty) && cfg.types.is_integer(rhs_ty) {
            let folded = Self::as_const_int(cfg, lhs_value)
                .zip(Self::as_const_int(cfg, rhs_value));

            if let Some(((ty, a), (_, b))) = folded {
                let value = if op == BinOp::Add { a.wrapping_add(b) } else { a.wrapping_sub(b) };
                return Ok(Value::Const(cfg.consts.int(ty, value)));
            }

            return Ok(if op == BinOp::Add {
                self.builder.build_iadd(cfg, lhs_value, rhs_value)
            } else {
                self.builder.build_isub(cfg, lhs_value, rhs_value)
            });
        }

        if cfg.types.is_float(lhs_ty) && cfg.types.is_float(rhs_ty) {
            let folded = Self::as_const_float(cfg, lhs_value)
                .zip(Self::as_const_float(cfg, rhs_value));

            if let Some(((ty, a), (_, b))) = folded {
                let value = if op == BinOp::Add { a + b } else { a - b };
                return Ok(Value::Const(cfg.consts.float(ty, value)));
            }

            return Ok(if op == BinOp::Add {
                self.builder.build_fadd(cfg, lhs_value, rhs_value)
            } else {
                self.builder.build_fsub(cfg, lhs_value, rhs_value)
            });
        }

        Err(self.fatal(unit, "invalid add/sub operation".to_string(), span))
    }

    fn codegen_multiply(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let rhs_value = self.valued(cfg, unit, rhs)?;

        let lhs_ty = self.value_type(cfg, lhs_value);
        let rhs_ty = self.value_type(cfg, rhs_value);

        if cfg.types.is_integer(lhs_ty) && cfg.types.is_integer(rhs_ty) {
            if let Some(((ty, a), (_, b))) =
                Self::as_const_int(cfg, lhs_value).zip(Self::as_const_int(cfg, rhs_value))
            {
                return Ok(Value::Const(cfg.consts.int(ty, a.wrapping_mul(b))));
            }

            return Ok(self.builder.build_imul(cfg, lhs_value, rhs_value));
        }

        if cfg.types.is_float(lhs_ty) && cfg.types.is_float(rhs_ty) {
            if let Some(((ty, a), (_, b))) =
                Self::as_const_float(cfg, lhs_value).zip(Self::as_const_float(cfg, rhs_value))
            {
                return Ok(Value::Const(cfg.consts.float(ty, a * b)));
            }

            return Ok(self.builder.build_fmul(cfg, lhs_value, rhs_value));
        }

        Err(self.fatal(unit, "invalid mul operation".to_string(), span))
    }

    fn codegen_division(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let rhs_value = self.valued(cfg, unit, rhs)?;

        let lhs_ty = self.value_type(cfg, lhs_value);
        let rhs_ty = self.value_type(cfg, rhs_value);

        if cfg.types.is_integer(lhs_ty) && cfg.types.is_integer(rhs_ty) {
            if let Some(((ty, a), (_, b))) =
                Self::as_const_int(cfg, lhs_value).zip(Self::as_const_int(cfg, rhs_value))
            {
                if b == 0 {
                    return Err(self.fatal(unit, "division by constant zero".to_string(), span));
                }

                let value = if op == BinOp::Div { a.wrapping_div(b) } else { a.wrapping_rem(b) };
                return Ok(Value::Const(cfg.consts.int(ty, value)));
            }

            // Signedness comes from the surface type of the left operand.
            let signed = unit.types.is_signed_integer(unit.expr_type(lhs).ty)
                || unit.types.is_enum(unit.expr_type(lhs).ty);

            return Ok(match (op, signed) {
                (BinOp::Div, true) => self.builder.build_sdiv(cfg, lhs_value, rhs_value),
                (BinOp::Div, false) => self.builder.build_udiv(cfg, lhs_value, rhs_value),
                (BinOp::Mod, true) => self.builder.build_smod(cfg, lhs_value, rhs_value),
                (BinOp::Mod, false) => self.builder.build_umod(cfg, lhs_value, rhs_value),
                _ => unreachable!(),
            });
        }

        if cfg.types.is_float(lhs_ty) && cfg.types.is_float(rhs_ty) {
            if op == BinOp::Mod {
                return Err(self.fatal(unit, "float remainder is unsupported".to_string(), span));
            }

            if let Some(((ty, a), (_, b))) =
                Self::as_const_float(cfg, lhs_value).zip(Self::as_const_float(cfg, rhs_value))
            {
                return Ok(Value::Const(cfg.consts.float(ty, a / b)));
            }

            return Ok(self.builder.build_fdiv(cfg, lhs_value, rhs_value));
        }

        Err(self.fatal(unit, "invalid div/mod operation".to_string(), span))
    }

    fn codegen_bitwise(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let rhs_value = self.valued(cfg, unit, rhs)?;

        if let Some(((ty, a), (_, b))) =
            Self::as_const_int(cfg, lhs_value).zip(Self::as_const_int(cfg, rhs_value))
        {
            let value = match op {
                BinOp::And => a & b,
                BinOp::Or => a | b,
                BinOp::Xor => a ^ b,
                _ => unreachable!(),
            };

            return Ok(Value::Const(cfg.consts.int(ty, value)));
        }

        Ok(match op {
            BinOp::And => self.builder.build_and(cfg, lhs_value, rhs_value),
            BinOp::Or => self.builder.build_or(cfg, lhs_value, rhs_value),
            BinOp::Xor => self.builder.build_xor(cfg, lhs_value, rhs_value),
            _ => unreachable!(),
        })
    }

    fn codegen_shift(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let rhs_value = self.valued(cfg, unit, rhs)?;

        let signed = unit.types.is_signed_integer(unit.expr_type(lhs).ty);

        if let Some(((ty, a), (_, b))) =
            Self::as_const_int(cfg, lhs_value).zip(Self::as_const_int(cfg, rhs_value))
        {
            let value = match op {
                BinOp::Shl => a.wrapping_shl(b as u32),
                BinOp::Shr if signed => a.wrapping_shr(b as u32),
                BinOp::Shr => ((a as u64).wrapping_shr(b as u32)) as i64,
                _ => unreachable!(),
            };

            return Ok(Value::Const(cfg.consts.int(ty, value)));
        }

        Ok(match op {
            BinOp::Shl => self.builder.build_shl(cfg, lhs_value, rhs_value),
            // Arithmetic shifts for signed left operands.
            BinOp::Shr if signed => self.builder.build_sar(cfg, lhs_value, rhs_value),
            BinOp::Shr => self.builder.build_shr(cfg, lhs_value, rhs_value),
            _ => unreachable!(),
        })
    }

    fn codegen_comparison(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let lhs_value = self.valued(cfg, unit, lhs)?;
        let rhs_value = self.valued(cfg, unit, rhs)?;

        let ty = unit.expr_type(lhs);
        let is_int = unit.types.is_integer(ty.ty)
            || unit.types.is_pointer(ty.ty)
            || unit.types.is_enum(ty.ty);
        let signed = unit.types.is_signed_integer(ty.ty)
            || unit.types.is_pointer(ty.ty)
            || unit.types.is_enum(ty.ty);
        let float = unit.types.is_float(ty.ty);

        let pred = match op {
            BinOp::Eq if is_int => Predicate::IEq,
            BinOp::Eq if float => Predicate::Oeq,
            BinOp::Ne if is_int => Predicate::INe,
            BinOp::Ne if float => Predicate::One,
            BinOp::Lt if signed => Predicate::Slt,
            BinOp::Lt if is_int => Predicate::Ult,
            BinOp::Lt if float => Predicate::Olt,
            BinOp::Le if signed => Predicate::Sle,
            BinOp::Le if is_int => Predicate::Ule,
            BinOp::Le if float => Predicate::Ole,
            BinOp::Gt if signed => Predicate::Sgt,
            BinOp::Gt if is_int => Predicate::Ugt,
            BinOp::Gt if float => Predicate::Ogt,
            BinOp::Ge if signed => Predicate::Sge,
            BinOp::Ge if is_int => Predicate::Uge,
            BinOp::Ge if float => Predicate::Oge,
            _ => {
                return Err(self.fatal(
                    unit,
                    format!("invalid '{}' comparison operands", op.spelling()),
                    span,
                ))
            }
        };

        Ok(self.builder.build_cmp(cfg, pred, lhs_value, rhs_value))
    }

    fn codegen_logical_and(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        lhs: ExprId,
        rhs: ExprId,
    ) -> BasaltResult<Value> {
        let func = self.func.expect("expression outside of a function");

        let i1 = cfg.types.i1();
        let right_bb = cfg.func_mut(func).create_block(Vec::new());
        let merge_bb = cfg.func_mut(func).create_block(vec![i1]);

        let lhs_value = self.valued(cfg, unit, lhs)?;
        let lhs_bool = self.inject_bool_comparison(cfg, unit, lhs_value, unit.expr(lhs).span)?;

        let false_const = Value::Const(cfg.consts.int(i1, 0));
        self.builder.build_jif(cfg, lhs_bool, right_bb, &[], merge_bb, &[false_const]);

        cfg.func_mut(func).append_block(right_bb);
        self.builder.set_insert(func, right_bb);

        let rhs_value = self.valued(cfg, unit, rhs)?;
        let rhs_bool = self.inject_bool_comparison(cfg, unit, rhs_value, unit.expr(rhs).span)?;
        self.builder.build_jmp(cfg, merge_bb, &[rhs_bool]);

        cfg.func_mut(func).append_block(merge_bb);
        self.builder.set_insert(func, merge_bb);
        Ok(Value::BlockArg(merge_bb, 0))
    }

    fn codegen_logical_or(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        lhs: ExprId,
        rhs: ExprId,
    ) -> BasaltResult<Value> {
        let func = self.func.expect("expression outside of a function");

        let i1 = cfg.types.i1();
        let right_bb = cfg.func_mut(func).create_block(Vec::new());
        let merge_bb = cfg.func_mut(func).create_block(vec![i1]);

        let lhs_value = self.valued(cfg, unit, lhs)?;
        let lhs_bool = self.inject_bool_comparison(cfg, unit, lhs_value, unit.expr(lhs).span)?;

        let true_const = Value::Const(cfg.consts.int(i1, 1));
        self.builder.build_jif(cfg, lhs_bool, merge_bb, &[true_const], right_bb, &[]);

        cfg.func_mut(func).append_block(right_bb);
        self.builder.set_insert(func, right_bb);

        let rhs_value = self.valued(cfg, unit, rhs)?;
        let rhs_bool = self.inject_bool_comparison(cfg, unit, rhs_value, unit.expr(rhs).span)?;
        self.builder.build_jmp(cfg, merge_bb, &[rhs_bool]);

        cfg.func_mut(func).append_block(merge_bb);
        self.builder.set_insert(func, merge_bb);
        Ok(Value::BlockArg(merge_bb, 0))
    }

    fn codegen_negation(&mut self, cfg: &mut Cfg, unit: &Unit, expr: ExprId) -> BasaltResult<Value> {
        let value = self.valued(cfg, unit, expr)?;

        if let Some((ty, v)) = Self::as_const_int(cfg, value) {
            return Ok(Value::Const(cfg.consts.int(ty, v.wrapping_neg())));
        }

        if let Some((ty, v)) = Self::as_const_float(cfg, value) {
            return Ok(Value::Const(cfg.consts.float(ty, -v)));
        }

        let ty = self.value_type(cfg, value);
        Ok(if cfg.types.is_float(ty) {
            self.builder.build_fneg(cfg, value)
        } else {
            self.builder.build_ineg(cfg, value)
        })
    }

    fn codegen_bitwise_not(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        expr: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let value = self.valued(cfg, unit, expr)?;

        if let Some((ty, v)) = Self::as_const_int(cfg, value) {
            return Ok(Value::Const(cfg.consts.int(ty, !v)));
        }

        let ty = self.value_type(cfg, value);
        if !cfg.types.is_integer(ty) {
            return Err(self.fatal(unit, "invalid bitwise not operation".to_string(), span));
        }

        Ok(self.builder.build_not(cfg, value))
    }

    fn codegen_logical_not(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        expr: ExprId,
        span: Span,
    ) -> BasaltResult<Value> {
        let value = self.valued(cfg, unit, expr)?;
        let ty = self.value_type(cfg, value);
        let i1 = cfg.types.i1();

        if cfg.types.is_integer(ty) {
            if let Some((_, v)) = Self::as_const_int(cfg, value) {
                return Ok(Value::Const(cfg.consts.int(i1, (v == 0) as i64)));
            }

            let zero = Value::Const(cfg.consts.int(ty, 0));
            return Ok(self.builder.build_cmp(cfg, Predicate::IEq, value, zero));
        }

        if cfg.types.is_float(ty) {
            if let Some((_, v)) = Self::as_const_float(cfg, value) {
                return Ok(Value::Const(cfg.consts.int(i1, (v == 0.0) as i64)));
            }

            let zero = Value::Const(cfg.consts.float(ty, 0.0));
            return Ok(self.builder.build_cmp(cfg, Predicate::Oeq, value, zero));
        }

        if cfg.types.is_pointer(ty) {
            if Self::is_null_const(cfg, value) {
                return Ok(Value::Const(cfg.consts.int(i1, 1)));
            }

            let null = Value::Const(cfg.consts.null(ty));
            return Ok(self.builder.build_cmp(cfg, Predicate::IEq, value, null));
        }

        Err(self.fatal(unit, "invalid logical not operation".to_string(), span))
    }

    /// The boolean projection: pass 1-bit values through, compare anything
    /// else against its zero.
    fn inject_bool_comparison(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        value: Value,
        span: Span,
    ) -> BasaltResult<Value> {
        let ty = self.value_type(cfg, value);

        if cfg.types.is_integer_width(ty, 1) {
            return Ok(value);
        }

        if cfg.types.is_integer(ty) {
            let zero = Value::Const(cfg.consts.int(ty, 0));
            return Ok(self.builder.build_cmp(cfg, Predicate::INe, value, zero));
        }

        if cfg.types.is_float(ty) {
            let zero = Value::Const(cfg.consts.float(ty, 0.0));
            return Ok(self.builder.build_cmp(cfg, Predicate::One, value, zero));
        }

        if cfg.types.is_pointer(ty) {
            let null = Value::Const(cfg.consts.null(ty));
            return Ok(self.builder.build_cmp(cfg, Predicate::INe, value, null));
        }

        Err(self.fatal(unit, "value cannot be reduced to a boolean".to_string(), span))
    }

    /// Calls lower uniformly: the call instruction carries the callee's
    /// real result type, aggregate or not. The hidden result-slot
    /// convention for non-scalar results is an instruction-selection
    /// concern, not a MIR one.
    fn codegen_call(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        callee: ExprId,
        args: &[ExprId],
    ) -> BasaltResult<Option<Value>> {
        let callee_value = self.addressed(cfg, unit, callee)?;

        let mut call_args = Vec::with_capacity(args.len());
        for &arg in args {
            let arg_ty = Self::lower_type(cfg, unit, unit.expr_type(arg));
            let value = if cfg.machine.is_scalar(&cfg.types, arg_ty) {
                self.valued(cfg, unit, arg)?
            } else {
                // Aggregates are passed by address.
                self.addressed(cfg, unit, arg)?
            };

            call_args.push(value);
        }

        let fn_ty = Self::lower_type(cfg, unit, unit.expr_type(callee));
        Ok(self.builder.build_call(cfg, fn_ty, callee_value, &call_args))
    }

    fn codegen_cast(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
        inner: ExprId,
    ) -> BasaltResult<Value> {
        let span = unit.expr(id).span;
        let source_ast = unit.expr_type(inner);
        let dest_ast = unit.expr_type(id);

        let dest = Self::lower_type(cfg, unit, dest_ast);

        // Array-to-pointer decay reinterprets the array's address.
        if unit.types.is_array(source_ast.ty) && unit.types.is_pointer(dest_ast.ty) {
            let addr = self.addressed(cfg, unit, inner)?;
            return Ok(self.builder.build_cast(cfg, Opcode::Reint, dest, addr));
        }

        let value = self.valued(cfg, unit, inner)?;
        let source = self.value_type(cfg, value);

        if cfg.types.is_integer(source) {
            if cfg.types.is_integer(dest) {
                if let Some((_, v)) = Self::as_const_int(cfg, value) {
                    return Ok(Value::Const(cfg.consts.int(dest, v)));
                }

                let source_size = cfg.machine.size_of(&cfg.types, source);
                let dest_size = cfg.machine.size_of(&cfg.types, dest);

                return Ok(if source_size == dest_size {
                    value
                } else if source_size > dest_size {
                    self.builder.build_cast(cfg, Opcode::ITrunc, dest, value)
                } else if unit.types.is_signed_integer(source_ast.ty)
                    || unit.types.is_enum(source_ast.ty)
                {
                    self.builder.build_cast(cfg, Opcode::SExt, dest, value)
                } else {
                    self.builder.build_cast(cfg, Opcode::ZExt, dest, value)
                });
            }

            if cfg.types.is_float(dest) {
                if let Some((_, v)) = Self::as_const_int(cfg, value) {
                    return Ok(Value::Const(cfg.consts.float(dest, v as f64)));
                }

                return Ok(if unit.types.is_signed_integer(source_ast.ty) {
                    self.builder.build_cast(cfg, Opcode::S2F, dest, value)
                } else {
                    self.builder.build_cast(cfg, Opcode::U2F, dest, value)
                });
            }

            if cfg.types.is_pointer(dest) {
                // Fold a zero literal into the null of the target type.
                if let Some((_, 0)) = Self::as_const_int(cfg, value) {
                    return Ok(Value::Const(cfg.consts.null(dest)));
                }

                return Ok(self.builder.build_cast(cfg, Opcode::I2P, dest, value));
            }
        } else if cfg.types.is_float(source) {
            if cfg.types.is_integer(dest) {
                if let Some((_, v)) = Self::as_const_float(cfg, value) {
                    return Ok(Value::Const(cfg.consts.int(dest, v as i64)));
                }

                return Ok(if unit.types.is_signed_integer(dest_ast.ty) {
                    self.builder.build_cast(cfg, Opcode::F2S, dest, value)
                } else {
                    self.builder.build_cast(cfg, Opcode::F2U, dest, value)
                });
            }

            if cfg.types.is_float(dest) {
                if let Some((_, v)) = Self::as_const_float(cfg, value) {
                    return Ok(Value::Const(cfg.consts.float(dest, v)));
                }

                let source_size = cfg.machine.size_of(&cfg.types, source);
                let dest_size = cfg.machine.size_of(&cfg.types, dest);

                return Ok(if source_size == dest_size {
                    value
                } else if source_size > dest_size {
                    self.builder.build_cast(cfg, Opcode::FTrunc, dest, value)
                } else {
                    self.builder.build_cast(cfg, Opcode::FExt, dest, value)
                });
            }
        } else if cfg.types.is_pointer(source) {
            if cfg.types.is_integer(dest) {
                if Self::is_null_const(cfg, value) {
                    return Ok(Value::Const(cfg.consts.int(dest, 0)));
                }

                return Ok(self.builder.build_cast(cfg, Opcode::P2I, dest, value));
            }

            if cfg.types.is_pointer(dest) {
                if Self::is_null_const(cfg, value) {
                    return Ok(Value::Const(cfg.consts.null(dest)));
                }

                return Ok(self.builder.build_cast(cfg, Opcode::Reint, dest, value));
            }
        }

        Err(self.fatal(unit, "unsupported type cast".to_string(), span))
    }

    /// Evaluate a constant initializer without emitting instructions.
    /// Returns `None` for anything that is not a compile-time constant.
    fn codegen_constant(
        &mut self,
        cfg: &mut Cfg,
        unit: &Unit,
        id: ExprId,
    ) -> Option<crate::constant::ConstId> {
        match unit.expr(id).kind.clone() {
            ExprKind::Bool(value) => {
                let i8 = cfg.types.i8();
                Some(cfg.consts.int(i8, value as i64))
            }

            ExprKind::Int(value) => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Some(cfg.consts.int(ty, value))
            }

            ExprKind::Char(value) => {
                let i8 = cfg.types.i8();
                Some(cfg.consts.int(i8, value as i64))
            }

            ExprKind::Float(value) => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Some(cfg.consts.float(ty, value))
            }

            ExprKind::Null => {
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Some(cfg.consts.null(ty))
            }

            ExprKind::Sizeof { target } => {
                let target = Self::lower_type(cfg, unit, target);
                let size = cfg.machine.size_of(&cfg.types, target);
                let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                Some(cfg.consts.int(ty, size as i64))
            }

            ExprKind::Ref { defn, .. } => match &unit.defn(defn?).kind {
                DefnKind::Variant { value, .. } => {
                    let ty = Self::lower_type(cfg, unit, unit.expr_type(id));
                    Some(cfg.consts.int(ty, *value))
                }
                _ => None,
            },

            ExprKind::Paren(inner) => self.codegen_constant(cfg, unit, inner),

            ExprKind::Unary { op: UnOp::Negate, expr } => {
                let inner = self.codegen_constant(cfg, unit, expr)?;
                match cfg.consts.get(inner).clone() {
                    crate::constant::Const::Int { ty, value } => {
                        Some(cfg.consts.int(ty, value.wrapping_neg()))
                    }
                    crate::constant::Const::Float { ty, bits } => {
                        Some(cfg.consts.float(ty, -f64::from_bits(bits)))
                    }
                    _ => None,
                }
            }

            ExprKind::Unary { op: UnOp::Not, expr } => {
                let inner = self.codegen_constant(cfg, unit, expr)?;
                match cfg.consts.get(inner).clone() {
                    crate::constant::Const::Int { ty, value } => Some(cfg.consts.int(ty, !value)),
                    _ => None,
                }
            }

            ExprKind::Cast { expr } => {
                let inner = self.codegen_constant(cfg, unit, expr)?;
                let dest = Self::lower_type(cfg, unit, unit.expr_type(id));

                match cfg.consts.get(inner).clone() {
                    crate::constant::Const::Int { value, .. } => {
                        if cfg.types.is_float(dest) {
                            Some(cfg.consts.float(dest, value as f64))
                        } else if cfg.types.is_pointer(dest) {
                            (value == 0).then(|| cfg.consts.null(dest))
                        } else {
                            Some(cfg.consts.int(dest, value))
                        }
                    }
                    crate::constant::Const::Float { bits, .. } => {
                        let value = f64::from_bits(bits);
                        if cfg.types.is_integer(dest) {
                            Some(cfg.consts.int(dest, value as i64))
                        } else {
                            Some(cfg.consts.float(dest, value))
                        }
                    }
                    crate::constant::Const::Null { .. } => {
                        if cfg.types.is_integer(dest) {
                            Some(cfg.consts.int(dest, 0))
                        } else {
                            Some(cfg.consts.null(dest))
                        }
                    }
                    crate::constant::Const::Str { .. } => None,
                }
            }

            _ => None,
        }
    }
}
