//! Symbol analysis
//!
//! Walks the AST with a scope pointer that follows the lexical scope tree
//! built by the parser. Resolves deferred type placeholders by rebuilding
//! interned type handles (the pool itself is never mutated), links reference
//! expressions to their defining nodes, and resolves field accesses against
//! struct definitions.

use basalt_common::{BasaltError, BasaltResult, Diagnostics, Span};
use basalt_parser::{
    DefnId, DefnKind, ExprId, ExprKind, QualType, ScopeId, StmtId, StmtKind, Type, Unit,
};

pub struct SymbolAnalysis<'d> {
    diagnostics: &'d mut Diagnostics,
    scope: ScopeId,
}

impl<'d> SymbolAnalysis<'d> {
    /// Run symbol analysis over `unit`.
    pub fn run(unit: &mut Unit, diagnostics: &'d mut Diagnostics) -> BasaltResult<()> {
        let mut pass = SymbolAnalysis { diagnostics, scope: unit.root_scope };

        for defn in unit.top.clone() {
            pass.visit_defn(unit, defn)?;
        }

        Ok(())
    }

    fn fatal(&mut self, unit: &Unit, message: String, span: Span) -> BasaltError {
        self.diagnostics.fatal(BasaltError::name(message), &unit.file, span)
    }

    /// Resolve every deferred placeholder reachable from `ty`, returning the
    /// resolved handle. Composite types are re-interned around their
    /// resolved components.
    fn resolve_type(&mut self, unit: &mut Unit, ty: QualType, span: Span) -> BasaltResult<QualType> {
        let resolved = match unit.types.get(ty.ty).clone() {
            Type::Deferred { name } => {
                let defn = match unit.scopes.lookup(self.scope, &name) {
                    Some(defn) => defn,
                    None => {
                        return Err(self.fatal(unit, format!("unresolved type: {}", name), span))
                    }
                };

                match &unit.defn(defn).kind {
                    DefnKind::Struct { ty, .. }
                    | DefnKind::Enum { ty, .. }
                    | DefnKind::Alias { ty, .. } => ty.ty,
                    _ => {
                        return Err(self.fatal(
                            unit,
                            format!("'{}' does not name a type", name),
                            span,
                        ))
                    }
                }
            }

            Type::Pointer { pointee } => {
                let pointee = self.resolve_type(unit, pointee, span)?;
                unit.types.pointer(pointee)
            }

            Type::Array { element, len } => {
                let element = self.resolve_type(unit, element, span)?;
                unit.types.array(element, len)
            }

            Type::Function { params, ret } => {
                let ret = self.resolve_type(unit, ret, span)?;
                let params = params
                    .into_iter()
                    .map(|p| self.resolve_type(unit, p, span))
                    .collect::<BasaltResult<Vec<_>>>()?;

                unit.types.function(params, ret)
            }

            _ => ty.ty,
        };

        Ok(QualType { ty: resolved, quals: ty.quals })
    }

    fn visit_defn(&mut self, unit: &mut Unit, id: DefnId) -> BasaltResult<()> {
        let span = unit.defn(id).span;

        match unit.defn(id).kind.clone() {
            DefnKind::Load { .. } => Ok(()),

            DefnKind::Var { ty, init, .. } => {
                let resolved = self.resolve_type(unit, ty, span)?;
                if let DefnKind::Var { ty, .. } = &mut unit.defn_mut(id).kind {
                    *ty = resolved;
                }

                if let Some(init) = init {
                    self.visit_expr(unit, init)?;
                }

                Ok(())
            }

            DefnKind::Function { ty, scope, params, body, .. } => {
                let resolved = self.resolve_type(unit, ty, span)?;
                if let DefnKind::Function { ty, .. } = &mut unit.defn_mut(id).kind {
                    *ty = resolved;
                }

                for param in params {
                    let param_span = unit.defn(param).span;
                    if let DefnKind::Param { ty, .. } = unit.defn(param).kind.clone() {
                        let resolved = self.resolve_type(unit, ty, param_span)?;
                        if let DefnKind::Param { ty, .. } = &mut unit.defn_mut(param).kind {
                            *ty = resolved;
                        }
                    }
                }

                if let Some(body) = body {
                    let prev = self.scope;
                    self.scope = scope;
                    self.visit_stmt(unit, body)?;
                    self.scope = prev;
                }

                Ok(())
            }

            DefnKind::Struct { fields, .. } => {
                for field in fields {
                    let field_span = unit.defn(field).span;
                    if let DefnKind::Field { ty, .. } = unit.defn(field).kind.clone() {
                        let resolved = self.resolve_type(unit, ty, field_span)?;
                        if let DefnKind::Field { ty, .. } = &mut unit.defn_mut(field).kind {
                            *ty = resolved;
                        }
                    }
                }

                Ok(())
            }

            DefnKind::Enum { underlying, .. } => {
                let resolved = self.resolve_type(unit, underlying, span)?;
                if let DefnKind::Enum { underlying, .. } = &mut unit.defn_mut(id).kind {
                    *underlying = resolved;
                }

                Ok(())
            }

            DefnKind::Alias { underlying, .. } => {
                let resolved = self.resolve_type(unit, underlying, span)?;
                if let DefnKind::Alias { underlying, .. } = &mut unit.defn_mut(id).kind {
                    *underlying = resolved;
                }

                Ok(())
            }

            DefnKind::Param { .. } | DefnKind::Field { .. } | DefnKind::Variant { .. } => Ok(()),
        }
    }

    fn visit_stmt(&mut self, unit: &mut Unit, id: StmtId) -> BasaltResult<()> {
        match unit.stmt(id).kind.clone() {
            StmtKind::Block { scope, stmts } => {
                let prev = self.scope;
                self.scope = scope;

                for stmt in stmts {
                    self.visit_stmt(unit, stmt)?;
                }

                self.scope = prev;
                Ok(())
            }

            StmtKind::Local(defn) => self.visit_defn(unit, defn),

            StmtKind::Expr(expr) => self.visit_expr(unit, expr),

            StmtKind::If { cond, then, els } => {
                self.visit_expr(unit, cond)?;
                self.visit_stmt(unit, then)?;

                if let Some(els) = els {
                    self.visit_stmt(unit, els)?;
                }

                Ok(())
            }

            StmtKind::Until { cond, body } => {
                self.visit_expr(unit, cond)?;

                if let Some(body) = body {
                    self.visit_stmt(unit, body)?;
                }

                Ok(())
            }

            StmtKind::Ret(expr) => {
                if let Some(expr) = expr {
                    self.visit_expr(unit, expr)?;
                }

                Ok(())
            }

            StmtKind::Stop | StmtKind::Restart | StmtKind::Rune(_) => Ok(()),
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
            | ExprKind::Null => Ok(()),

            ExprKind::Ref { name, .. } => {
                let defn = match unit.scopes.lookup(self.scope, &name) {
                    Some(defn) => defn,
                    None => {
                        return Err(self.fatal(unit, format!("unresolved reference: {}", name), span))
                    }
                };

                if !unit.is_value_defn(defn) {
                    return Err(self.fatal(unit, format!("invalid reference: {}", name), span));
                }

                let ty = unit.defn_type(defn);
                let expr = unit.expr_mut(id);
                expr.ty = ty;
                if let ExprKind::Ref { defn: slot, .. } = &mut expr.kind {
                    *slot = Some(defn);
                }

                Ok(())
            }

            ExprKind::Access { base, name, .. } => {
                self.visit_expr(unit, base)?;

                // The base must be a struct, or a pointer to one.
                let base_type = match unit.expr(base).ty {
                    Some(ty) => ty,
                    None => {
                        return Err(self.fatal(
                            unit,
                            "'.' base must be a struct or a pointer to one".to_string(),
                            span,
                        ))
                    }
                };

                let struct_ty = match unit.types.get(base_type.ty) {
                    Type::Pointer { pointee } => pointee.ty,
                    _ => base_type.ty,
                };

                let struct_name = match unit.types.get(struct_ty) {
                    Type::Struct { name } => name.clone(),
                    _ => {
                        return Err(self.fatal(
                            unit,
                            "'.' base must be a struct or a pointer to one".to_string(),
                            span,
                        ))
                    }
                };

                let struct_defn = unit
                    .scopes
                    .lookup(self.scope, &struct_name)
                    .expect("struct types always have a defining node");

                let fields = match &unit.defn(struct_defn).kind {
                    DefnKind::Struct { fields, .. } => fields.clone(),
                    _ => {
                        return Err(self.fatal(
                            unit,
                            format!("'{}' does not name a struct", struct_name),
                            span,
                        ))
                    }
                };

                let field = fields
                    .iter()
                    .copied()
                    .find(|&f| unit.defn_name(f) == Some(name.as_str()));

                let field = match field {
                    Some(field) => field,
                    None => {
                        return Err(self.fatal(unit, format!("field '{}' does not exist", name), span))
                    }
                };

                let ty = unit.defn_type(field);
                let expr = unit.expr_mut(id);
                expr.ty = ty;
                if let ExprKind::Access { field: slot, .. } = &mut expr.kind {
                    *slot = Some(field);
                }

                Ok(())
            }

            ExprKind::Subscript { base, index } => {
                self.visit_expr(unit, base)?;
                self.visit_expr(unit, index)
            }

            ExprKind::Call { callee, args } => {
                self.visit_expr(unit, callee)?;

                for arg in args {
                    self.visit_expr(unit, arg)?;
                }

                Ok(())
            }

            ExprKind::Unary { expr, .. } => self.visit_expr(unit, expr),

            ExprKind::Binary { lhs, rhs, .. } => {
                self.visit_expr(unit, lhs)?;
                self.visit_expr(unit, rhs)
            }

            ExprKind::Cast { expr } => {
                self.visit_expr(unit, expr)?;

                let target = unit.expr(id).ty.expect("cast nodes carry their target type");
                let resolved = self.resolve_type(unit, target, span)?;
                unit.expr_mut(id).ty = Some(resolved);
                Ok(())
            }

            ExprKind::Paren(inner) => self.visit_expr(unit, inner),

            ExprKind::Sizeof { target } => {
                let resolved = self.resolve_type(unit, target, span)?;
                if let ExprKind::Sizeof { target } = &mut unit.expr_mut(id).kind {
                    *target = resolved;
                }

                Ok(())
            }
        }
    }
}

/// Deref helper used by tests and downstream passes: true if any deferred
/// type remains reachable from the unit's definitions.
pub fn has_deferred_types(unit: &Unit) -> bool {
    fn qual_type_is_deferred(unit: &Unit, ty: QualType) -> bool {
        match unit.types.get(ty.ty) {
            Type::Deferred { .. } => true,
            Type::Pointer { pointee } => qual_type_is_deferred(unit, *pointee),
            Type::Array { element, .. } => qual_type_is_deferred(unit, *element),
            Type::Function { params, ret } => {
                qual_type_is_deferred(unit, *ret)
                    || params.iter().any(|p| qual_type_is_deferred(unit, *p))
            }
            _ => false,
        }
    }

    (0..unit.num_defns() as DefnId).any(|defn| {
        unit.defn_type_slots(defn)
            .into_iter()
            .any(|ty| qual_type_is_deferred(unit, ty))
    })
}
