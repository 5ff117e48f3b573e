//! Abstract syntax tree for the Basalt language
//!
//! All nodes live in arenas owned by the translation [`Unit`] and refer to
//! each other by index handles. Expressions carry a qualified type slot that
//! symbol and semantic analysis fill in.

use crate::scope::{ScopeId, Scopes};
use crate::types::{QualType, TypeCtx};
use basalt_common::Span;
use serde::{Deserialize, Serialize};

pub type DefnId = u32;
pub type StmtId = u32;
pub type ExprId = u32;

/// A `$name` decorator attached to a definition or used as a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rune {
    /// External linkage for the definition.
    Public,
    /// Trap immediately.
    Abort,
    /// Undefined control flow; lowered to a trap.
    Unreachable,
}

impl Rune {
    pub fn from_name(name: &str) -> Option<Rune> {
        match name {
            "public" => Some(Rune::Public),
            "abort" => Some(Rune::Abort),
            "unreachable" => Some(Rune::Unreachable),
            _ => None,
        }
    }
}

/// A definition node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defn {
    pub kind: DefnKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DefnKind {
    /// `load "path"` import.
    Load { path: String },

    /// A variable, either a top-level global or a function local.
    Var {
        name: String,
        runes: Vec<Rune>,
        ty: QualType,
        init: Option<ExprId>,
        global: bool,
    },

    /// A function parameter.
    Param { name: String, ty: QualType },

    /// A function; `body` is absent for external declarations.
    Function {
        name: String,
        runes: Vec<Rune>,
        /// The function's signature type.
        ty: QualType,
        /// Scope holding the parameters; the body block opens a child.
        scope: ScopeId,
        params: Vec<DefnId>,
        body: Option<StmtId>,
    },

    /// A field inside a struct definition.
    Field { name: String, ty: QualType, index: u32 },

    /// A struct type definition.
    Struct {
        name: String,
        runes: Vec<Rune>,
        /// The interned struct type.
        ty: QualType,
        fields: Vec<DefnId>,
    },

    /// A variant inside an enum definition; `ty` is the enum type.
    Variant { name: String, ty: QualType, value: i64 },

    /// An enum type definition.
    Enum {
        name: String,
        runes: Vec<Rune>,
        ty: QualType,
        underlying: QualType,
        variants: Vec<DefnId>,
    },

    /// A named type alias. No surface syntax produces one today; the kind
    /// exists so the type system's alias types have a defining node.
    Alias { name: String, ty: QualType, underlying: QualType },
}

/// A statement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Block { scope: ScopeId, stmts: Vec<StmtId> },
    /// A `let` binding adapted into statement position.
    Local(DefnId),
    /// An expression evaluated for effect.
    Expr(ExprId),
    If { cond: ExprId, then: StmtId, els: Option<StmtId> },
    Until { cond: ExprId, body: Option<StmtId> },
    Ret(Option<ExprId>),
    Stop,
    Restart,
    /// `$abort;` or `$unreachable;`.
    Rune(Rune),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LogicAnd,
    LogicOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_assignment(self) -> bool {
        self == BinOp::Assign
    }

    pub fn spelling(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::LogicAnd => "&&",
            BinOp::LogicOr => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Negate,
    Not,
    LogicNot,
    AddressOf,
    Deref,
}

impl UnOp {
    pub fn spelling(self) -> &'static str {
        match self {
            UnOp::Negate => "-",
            UnOp::Not => "~",
            UnOp::LogicNot => "!",
            UnOp::AddressOf => "&",
            UnOp::Deref => "*",
        }
    }
}

/// An expression node. The `ty` slot is filled by symbol and semantic
/// analysis; literals carry their type from the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<QualType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Null,

    /// A named reference; `defn` is resolved by symbol analysis.
    Ref { name: String, defn: Option<DefnId> },

    /// Struct field access; `field` is resolved by symbol analysis.
    Access { base: ExprId, name: String, field: Option<DefnId> },

    Subscript { base: ExprId, index: ExprId },

    Call { callee: ExprId, args: Vec<ExprId> },

    Unary { op: UnOp, expr: ExprId },

    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },

    /// A cast to the node's own type, explicit or inserted by sema.
    Cast { expr: ExprId },

    Paren(ExprId),

    /// `sizeof<T>`; the node's type is `u64`.
    Sizeof { target: QualType },
}

/// The top-level container for a single compilation input. Owns the type
/// interning context, the scope tree, and every AST node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub file: String,
    pub types: TypeCtx,
    pub scopes: Scopes,
    pub root_scope: ScopeId,

    defns: Vec<Defn>,
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,

    /// Top-level definitions in source order.
    pub top: Vec<DefnId>,
}

impl Unit {
    pub fn new(file: impl Into<String>) -> Self {
        let mut scopes = Scopes::new();
        let root_scope = scopes.alloc(None);

        Self {
            file: file.into(),
            types: TypeCtx::new(),
            scopes,
            root_scope,
            defns: Vec::new(),
            stmts: Vec::new(),
            exprs: Vec::new(),
            top: Vec::new(),
        }
    }

    pub fn add_defn(&mut self, defn: Defn) -> DefnId {
        let id = self.defns.len() as DefnId;
        self.defns.push(defn);
        id
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = self.stmts.len() as StmtId;
        self.stmts.push(stmt);
        id
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = self.exprs.len() as ExprId;
        self.exprs.push(expr);
        id
    }

    pub fn defn(&self, id: DefnId) -> &Defn {
        &self.defns[id as usize]
    }

    pub fn defn_mut(&mut self, id: DefnId) -> &mut Defn {
        &mut self.defns[id as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id as usize]
    }

    pub fn num_defns(&self) -> usize {
        self.defns.len()
    }

    /// The resolved type of an expression. Panics if analysis has not run
    /// over this node yet.
    pub fn expr_type(&self, id: ExprId) -> QualType {
        self.expr(id).ty.expect("expression type not yet resolved")
    }

    /// The name a definition binds, if it binds one.
    pub fn defn_name(&self, id: DefnId) -> Option<&str> {
        match &self.defn(id).kind {
            DefnKind::Load { .. } => None,
            DefnKind::Var { name, .. }
            | DefnKind::Param { name, .. }
            | DefnKind::Function { name, .. }
            | DefnKind::Field { name, .. }
            | DefnKind::Struct { name, .. }
            | DefnKind::Variant { name, .. }
            | DefnKind::Enum { name, .. }
            | DefnKind::Alias { name, .. } => Some(name),
        }
    }

    /// The value type of a definition, for definitions that produce values.
    pub fn defn_type(&self, id: DefnId) -> Option<QualType> {
        match &self.defn(id).kind {
            DefnKind::Var { ty, .. }
            | DefnKind::Param { ty, .. }
            | DefnKind::Function { ty, .. }
            | DefnKind::Field { ty, .. }
            | DefnKind::Variant { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Test if a definition defines a type rather than a value.
    pub fn is_type_defn(&self, id: DefnId) -> bool {
        matches!(
            self.defn(id).kind,
            DefnKind::Struct { .. } | DefnKind::Enum { .. } | DefnKind::Alias { .. }
        )
    }

    /// Test if a definition produces a value when referenced.
    pub fn is_value_defn(&self, id: DefnId) -> bool {
        matches!(
            self.defn(id).kind,
            DefnKind::Var { .. }
                | DefnKind::Param { .. }
                | DefnKind::Function { .. }
                | DefnKind::Field { .. }
                | DefnKind::Variant { .. }
        )
    }

    pub fn defn_runes(&self, id: DefnId) -> &[Rune] {
        match &self.defn(id).kind {
            DefnKind::Var { runes, .. }
            | DefnKind::Function { runes, .. }
            | DefnKind::Struct { runes, .. }
            | DefnKind::Enum { runes, .. } => runes,
            _ => &[],
        }
    }

    pub fn has_rune(&self, id: DefnId, rune: Rune) -> bool {
        self.defn_runes(id).contains(&rune)
    }

    /// Test if an expression designates a storage location.
    pub fn is_lvalue(&self, id: ExprId) -> bool {
        match &self.expr(id).kind {
            ExprKind::Ref { defn, .. } => match defn {
                Some(defn) => matches!(
                    self.defn(*defn).kind,
                    DefnKind::Var { .. } | DefnKind::Param { .. }
                ),
                None => false,
            },
            ExprKind::Access { .. } | ExprKind::Subscript { .. } => true,
            ExprKind::Unary { op: UnOp::Deref, .. } => true,
            ExprKind::Paren(inner) => self.is_lvalue(*inner),
            _ => false,
        }
    }

    /// Test if an expression is a constant expression, as required of global
    /// initializers.
    pub fn is_constant(&self, id: ExprId) -> bool {
        match &self.expr(id).kind {
            ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Char(_)
            | ExprKind::Str(_)
            | ExprKind::Null
            | ExprKind::Sizeof { .. } => true,
            ExprKind::Ref { defn: Some(defn), .. } => {
                matches!(self.defn(*defn).kind, DefnKind::Variant { .. })
            }
            ExprKind::Unary { op: UnOp::Negate | UnOp::Not, expr } => self.is_constant(*expr),
            ExprKind::Paren(inner) | ExprKind::Cast { expr: inner } => self.is_constant(*inner),
            _ => false,
        }
    }

    /// Iterate over every qualified-type slot stored in definitions. Used by
    /// analyses that need to prove no deferred type remains reachable.
    pub fn defn_type_slots(&self, id: DefnId) -> Vec<QualType> {
        match &self.defn(id).kind {
            DefnKind::Var { ty, .. } | DefnKind::Param { ty, .. } => vec![*ty],
            DefnKind::Function { ty, .. } => vec![*ty],
            DefnKind::Field { ty, .. } => vec![*ty],
            DefnKind::Struct { ty, fields, .. } => {
                let mut slots = vec![*ty];
                for field in fields {
                    slots.extend(self.defn_type_slots(*field));
                }
                slots
            }
            DefnKind::Enum { ty, underlying, variants, .. } => {
                let mut slots = vec![*ty, *underlying];
                for variant in variants {
                    slots.extend(self.defn_type_slots(*variant));
                }
                slots
            }
            DefnKind::Variant { ty, .. } => vec![*ty],
            DefnKind::Alias { ty, underlying, .. } => vec![*ty, *underlying],
            DefnKind::Load { .. } => vec![],
        }
    }
}
