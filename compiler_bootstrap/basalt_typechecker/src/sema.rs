//! Semantic analysis
//!
//! The second visitor over a symbol-resolved unit. Type-checks every node,
//! inserts implicit cast nodes where the check downgrades to a cast,
//! enforces mutability at assignment sites, and validates control-flow
//! context (`stop`/`restart` inside loops, `ret` inside functions).

use basalt_common::{BasaltError, BasaltResult, Diagnostics, Span};
use basalt_parser::{
    BinOp, DefnId, DefnKind, Expr, ExprId, ExprKind, QualType, Rune, StmtId, StmtKind, UnOp, Unit,
};

/// How strict a type check is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheckMode {
    /// Types must be structurally equal.
    Explicit,
    /// Additionally accepts pointer/integer operand pairs, for the
    /// arithmetic operators that support pointer arithmetic.
    Loose,
    /// Accepts implicit casts.
    AllowImplicit,
}

/// The outcome of a type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheckResult {
    Match,
    /// Compatible through an implicit cast; the checked node is wrapped.
    Cast,
    Mismatch,
}

pub struct SemanticAnalysis<'d> {
    diagnostics: &'d mut Diagnostics,
    /// The function currently being analyzed.
    function: Option<DefnId>,
    loop_depth: u32,
}

impl<'d> SemanticAnalysis<'d> {
    /// Run semantic analysis over `unit`. Non-fatal errors (the `main`
    /// signature checks) are recorded in `diagnostics`; callers must test
    /// `has_errors` afterwards.
    pub fn run(unit: &mut Unit, diagnostics: &'d mut Diagnostics) -> BasaltResult<()> {
        let mut pass = SemanticAnalysis { diagnostics, function: None, loop_depth: 0 };

        for defn in unit.top.clone() {
            pass.visit_defn(unit, defn)?;
        }

        Ok(())
    }

    fn fatal(&mut self, unit: &Unit, error: BasaltError, span: Span) -> BasaltError {
        self.diagnostics.fatal(error, &unit.file, span)
    }

    /// The core type-check procedure.
    pub fn type_check(
        unit: &Unit,
        actual: QualType,
        expected: QualType,
        mode: TypeCheckMode,
    ) -> TypeCheckResult {
        if unit.types.compare(actual, expected) {
            return TypeCheckResult::Match;
        }

        match mode {
            TypeCheckMode::Explicit => TypeCheckResult::Mismatch,

            TypeCheckMode::AllowImplicit => {
                if unit.types.can_cast_implicit(actual, expected) {
                    TypeCheckResult::Cast
                } else {
                    TypeCheckResult::Mismatch
                }
            }

            TypeCheckMode::Loose => {
                if unit.types.can_cast_implicit(actual, expected) {
                    return TypeCheckResult::Cast;
                }

                let ptr_int = unit.types.is_pointer(actual.ty) && unit.types.is_integer(expected.ty);
                let int_ptr = unit.types.is_integer(actual.ty) && unit.types.is_pointer(expected.ty);
                if ptr_int || int_ptr {
                    TypeCheckResult::Match
                } else {
                    TypeCheckResult::Mismatch
                }
            }
        }
    }

    /// Wrap `expr` in a cast node to `target` and return the wrapper's id.
    fn insert_cast(unit: &mut Unit, expr: ExprId, target: QualType) -> ExprId {
        let span = unit.expr(expr).span;
        unit.add_expr(Expr { kind: ExprKind::Cast { expr }, span, ty: Some(target) })
    }

    /// Test if a type can drive a conditional branch, either trivially or
    /// through an injected comparison against zero.
    fn is_boolean_evaluable(unit: &Unit, ty: QualType) -> bool {
        unit.types.is_integer(ty.ty) || unit.types.is_float(ty.ty) || unit.types.is_pointer(ty.ty)
    }

    fn visit_defn(&mut self, unit: &mut Unit, id: DefnId) -> BasaltResult<()> {
        match unit.defn(id).kind.clone() {
            DefnKind::Var { .. } => self.visit_var(unit, id),

            DefnKind::Function { name, ty, body, .. } => {
                let span = unit.defn(id).span;

                if name == "main" {
                    if !unit.has_rune(id, Rune::Public) {
                        self.diagnostics.error(
                            "'main' must be marked with $public",
                            &unit.file,
                            span,
                        );
                    }

                    let ret = match unit.types.get(ty.ty) {
                        basalt_parser::Type::Function { ret, .. } => *ret,
                        _ => unreachable!("functions carry function types"),
                    };

                    if !unit.types.compare_types(ret.ty, unit.types.s64()) {
                        self.diagnostics.error("'main' must return 's64'", &unit.file, span);
                    }
                }

                if let Some(body) = body {
                    self.function = Some(id);
                    self.visit_stmt(unit, body)?;
                    self.function = None;
                }

                Ok(())
            }

            _ => Ok(()),
        }
    }

    fn visit_var(&mut self, unit: &mut Unit, id: DefnId) -> BasaltResult<()> {
        let (ty, init, global) = match &unit.defn(id).kind {
            DefnKind::Var { ty, init, global, .. } => (*ty, *init, *global),
            _ => unreachable!("visit_var on a non-variable"),
        };

        let init = match init {
            Some(init) => init,
            None => return Ok(()),
        };

        self.visit_expr(unit, init)?;

        let span = unit.defn(id).span;
        if global && !unit.is_constant(init) {
            return Err(self.fatal(
                unit,
                BasaltError::ty("globals cannot be initialized with non-constants"),
                span,
            ));
        }

        let actual = unit.expr_type(init);
        match Self::type_check(unit, actual, ty, TypeCheckMode::AllowImplicit) {
            TypeCheckResult::Match => Ok(()),
            TypeCheckResult::Cast => {
                let cast = Self::insert_cast(unit, init, ty.clear_quals());
                if let DefnKind::Var { init, .. } = &mut unit.defn_mut(id).kind {
                    *init = Some(cast);
                }

                Ok(())
            }
            TypeCheckResult::Mismatch => Err(self.fatal(
                unit,
                BasaltError::ty(format!(
                    "initializer type mismatch; got {}, but expected {}",
                    unit.types.display(actual),
                    unit.types.display(ty),
                )),
                span,
            )),
        }
    }

    fn visit_stmt(&mut self, unit: &mut Unit, id: StmtId) -> BasaltResult<()> {
        let span = unit.stmt(id).span;

        match unit.stmt(id).kind.clone() {
            StmtKind::Block { stmts, .. } => {
                for stmt in stmts {
                    self.visit_stmt(unit, stmt)?;
                }

                Ok(())
            }

            StmtKind::Local(defn) => self.visit_var(unit, defn),

            StmtKind::Expr(expr) => self.visit_expr(unit, expr),

            StmtKind::If { cond, then, els } => {
                self.visit_expr(unit, cond)?;

                let cond_type = unit.expr_type(cond);
                if !Self::is_boolean_evaluable(unit, cond_type) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty("'if' condition must be a boolean"),
                        unit.expr(cond).span,
                    ));
                }

                self.visit_stmt(unit, then)?;
                if let Some(els) = els {
                    self.visit_stmt(unit, els)?;
                }

                Ok(())
            }

            StmtKind::Until { cond, body } => {
                self.visit_expr(unit, cond)?;

                let cond_type = unit.expr_type(cond);
                if !Self::is_boolean_evaluable(unit, cond_type) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty("'until' condition must be a boolean"),
                        unit.expr(cond).span,
                    ));
                }

                if let Some(body) = body {
                    self.loop_depth += 1;
                    self.visit_stmt(unit, body)?;
                    self.loop_depth -= 1;
                }

                Ok(())
            }

            StmtKind::Stop => {
                if self.loop_depth == 0 {
                    return Err(self.fatal(
                        unit,
                        BasaltError::control("'stop' outside of loop"),
                        span,
                    ));
                }

                Ok(())
            }

            StmtKind::Restart => {
                if self.loop_depth == 0 {
                    return Err(self.fatal(
                        unit,
                        BasaltError::control("'restart' outside of loop"),
                        span,
                    ));
                }

                Ok(())
            }

            StmtKind::Ret(expr) => {
                let function = match self.function {
                    Some(function) => function,
                    None => {
                        return Err(self.fatal(
                            unit,
                            BasaltError::control("'ret' outside of function"),
                            span,
                        ))
                    }
                };

                let ret_type = match unit.types.get(unit.defn_type(function).unwrap().ty) {
                    basalt_parser::Type::Function { ret, .. } => *ret,
                    _ => unreachable!("functions carry function types"),
                };

                let expr = match expr {
                    Some(expr) => expr,
                    None => {
                        if !unit.types.is_void(ret_type.ty) {
                            return Err(self.fatal(
                                unit,
                                BasaltError::ty("function does not return 'void'"),
                                span,
                            ));
                        }

                        return Ok(());
                    }
                };

                self.visit_expr(unit, expr)?;

                let actual = unit.expr_type(expr);
                match Self::type_check(unit, actual, ret_type, TypeCheckMode::AllowImplicit) {
                    TypeCheckResult::Match => Ok(()),
                    TypeCheckResult::Cast => {
                        let cast = Self::insert_cast(unit, expr, ret_type.clear_quals());
                        if let StmtKind::Ret(slot) = &mut unit.stmt_mut(id).kind {
                            *slot = Some(cast);
                        }

                        Ok(())
                    }
                    TypeCheckResult::Mismatch => Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "return type mismatch; got {}",
                            unit.types.display(actual),
                        )),
                        span,
                    )),
                }
            }

            StmtKind::Rune(_) => Ok(()),
        }
    }

    fn visit_expr(&mut self, unit: &mut Unit, id: ExprId) -> BasaltResult<()> {
        let span = unit.expr(id).span;

        match unit.expr(id).kind.clone() {
            ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Char(_)
            | ExprKind::Str(_)
            | ExprKind::Null
            | ExprKind::Sizeof { .. } => Ok(()),

            // Resolved by symbol analysis.
            ExprKind::Ref { .. } | ExprKind::Access { .. } => Ok(()),

            ExprKind::Paren(inner) => {
                self.visit_expr(unit, inner)?;
                unit.expr_mut(id).ty = Some(unit.expr_type(inner));
                Ok(())
            }

            ExprKind::Subscript { base, index } => {
                self.visit_expr(unit, base)?;
                self.visit_expr(unit, index)?;

                let base_type = unit.expr_type(base);
                let element = if let Some((element, _)) = unit.types.element(base_type.ty) {
                    element
                } else if let Some(pointee) = unit.types.pointee(base_type.ty) {
                    pointee
                } else {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "invalid argument type to '[]' operator: {}",
                            unit.types.display(base_type),
                        )),
                        span,
                    ));
                };

                unit.expr_mut(id).ty = Some(element);
                Ok(())
            }

            ExprKind::Call { callee, args } => self.visit_call(unit, id, callee, args, span),

            ExprKind::Cast { expr } => {
                self.visit_expr(unit, expr)?;

                let from = unit.expr_type(expr);
                let to = unit.expr_type(id);
                if !unit.types.can_cast_explicit(from, to) {
                    return Err(self.fatal(unit, BasaltError::ty("unsupported cast"), span));
                }

                Ok(())
            }

            ExprKind::Unary { op, expr } => self.visit_unary(unit, id, op, expr, span),

            ExprKind::Binary { op, lhs, rhs } => self.visit_binary(unit, id, op, lhs, rhs, span),
        }
    }

    fn visit_call(
        &mut self,
        unit: &mut Unit,
        id: ExprId,
        callee: ExprId,
        args: Vec<ExprId>,
        span: Span,
    ) -> BasaltResult<()> {
        self.visit_expr(unit, callee)?;

        let callee_type = unit.expr_type(callee);
        let (params, ret) = match unit.types.get(callee_type.ty) {
            basalt_parser::Type::Function { params, ret } => (params.clone(), *ret),
            _ => {
                return Err(self.fatal(
                    unit,
                    BasaltError::ty("function call target is not a function"),
                    span,
                ))
            }
        };

        unit.expr_mut(id).ty = Some(ret);

        if args.len() != params.len() {
            return Err(self.fatal(
                unit,
                BasaltError::ty(format!("argument count mismatch, expected {}", params.len())),
                span,
            ));
        }

        for (i, (&arg, &expected)) in args.iter().zip(&params).enumerate() {
            self.visit_expr(unit, arg)?;

            let actual = unit.expr_type(arg);
            match Self::type_check(unit, actual, expected, TypeCheckMode::AllowImplicit) {
                TypeCheckResult::Match => {}
                TypeCheckResult::Cast => {
                    let cast = Self::insert_cast(unit, arg, expected.clear_quals());
                    if let ExprKind::Call { args, .. } = &mut unit.expr_mut(id).kind {
                        args[i] = cast;
                    }
                }
                TypeCheckResult::Mismatch => {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "argument type mismatch; got {}",
                            unit.types.display(actual),
                        )),
                        span,
                    ))
                }
            }
        }

        Ok(())
    }

    fn visit_unary(
        &mut self,
        unit: &mut Unit,
        id: ExprId,
        op: UnOp,
        expr: ExprId,
        span: Span,
    ) -> BasaltResult<()> {
        self.visit_expr(unit, expr)?;
        let ty = unit.expr_type(expr);

        match op {
            UnOp::Negate => {
                if !unit.types.is_integer(ty.ty) && !unit.types.is_float(ty.ty) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "'-' operator incompatible with {}",
                            unit.types.display(ty),
                        )),
                        span,
                    ));
                }

                unit.expr_mut(id).ty = Some(ty);
            }

            UnOp::Not => {
                if !unit.types.is_integer(ty.ty) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "'~' operator incompatible with {}",
                            unit.types.display(ty),
                        )),
                        span,
                    ));
                }

                unit.expr_mut(id).ty = Some(ty);
            }

            UnOp::LogicNot => {
                if !Self::is_boolean_evaluable(unit, ty) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty(format!(
                            "'!' operator incompatible with {}",
                            unit.types.display(ty),
                        )),
                        span,
                    ));
                }

                unit.expr_mut(id).ty = Some(QualType::new(unit.types.bool_()));
            }

            UnOp::AddressOf => {
                if !unit.is_lvalue(expr) {
                    return Err(self.fatal(
                        unit,
                        BasaltError::ty("'&' base must be an lvalue"),
                        span,
                    ));
                }

                let pointer = unit.types.pointer(ty);
                unit.expr_mut(id).ty = Some(QualType::new(pointer));
            }

            UnOp::Deref => {
                let pointee = match unit.types.pointee(ty.ty) {
                    Some(pointee) => pointee,
                    None => {
                        return Err(self.fatal(
                            unit,
                            BasaltError::ty(format!(
                                "'*' operator incompatible with {}",
                                unit.types.display(ty),
                            )),
                            span,
                        ))
                    }
                };

                unit.expr_mut(id).ty = Some(pointee);
            }
        }

        Ok(())
    }

    fn visit_binary(
        &mut self,
        unit: &mut Unit,
        id: ExprId,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> BasaltResult<()> {
        self.visit_expr(unit, lhs)?;
        self.visit_expr(unit, rhs)?;

        let lhs_type = unit.expr_type(lhs);
        let rhs_type = unit.expr_type(rhs);

        // '+' and '-' additionally accept pointer/integer operand pairs.
        let supports_ptr_arith = op == BinOp::Add || op == BinOp::Sub;
        let mode = if supports_ptr_arith { TypeCheckMode::Loose } else { TypeCheckMode::AllowImplicit };

        match Self::type_check(unit, rhs_type, lhs_type, mode) {
            TypeCheckResult::Match => {}
            TypeCheckResult::Cast => {
                let cast = Self::insert_cast(unit, rhs, lhs_type.clear_quals());
                if let ExprKind::Binary { rhs, .. } = &mut unit.expr_mut(id).kind {
                    *rhs = cast;
                }
            }
            TypeCheckResult::Mismatch => {
                return Err(self.fatal(
                    unit,
                    BasaltError::ty(format!(
                        "operand type mismatch; got {}",
                        unit.types.display(rhs_type),
                    )),
                    span,
                ))
            }
        }

        // Comparisons and the short-circuit operators produce a boolean.
        if op.is_comparison() || matches!(op, BinOp::LogicAnd | BinOp::LogicOr) {
            unit.expr_mut(id).ty = Some(QualType::new(unit.types.bool_()));
            return Ok(());
        }

        unit.expr_mut(id).ty = Some(lhs_type);

        if op.is_assignment() {
            if !unit.is_lvalue(lhs) {
                return Err(self.fatal(
                    unit,
                    BasaltError::ty("left hand operand must be an lvalue"),
                    span,
                ));
            }

            if !lhs_type.is_mut() {
                return Err(self.fatal(
                    unit,
                    BasaltError::ty("left hand operand must be mutable"),
                    span,
                ));
            }
        }

        Ok(())
    }
}
