//! The Basalt type system and its per-unit interning context
//!
//! Every type in a translation unit lives in one [`TypeCtx`] arena and is
//! referred to by a [`TypeId`] handle. Interning guarantees that two
//! `TypeId`s pointing at structurally identical composite types are equal
//! for the shapes the context dedupes, but type equality is always decided
//! through [`TypeCtx::compare`], never through raw handle comparison.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Handle into the type arena of a [`TypeCtx`].
pub type TypeId = u32;

/// Qualifier bit for `mut`.
pub const QUAL_MUT: u8 = 1 << 0;

/// The use of a type together with its qualifiers.
///
/// Only one qualifier exists (`mut`). Qualifiers never participate in type
/// equality; they are consulted only at assignment sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualType {
    pub ty: TypeId,
    pub quals: u8,
}

impl QualType {
    pub fn new(ty: TypeId) -> Self {
        Self { ty, quals: 0 }
    }

    pub fn with_mut(mut self) -> Self {
        self.quals |= QUAL_MUT;
        self
    }

    pub fn is_mut(&self) -> bool {
        self.quals & QUAL_MUT != 0
    }

    pub fn is_qualified(&self) -> bool {
        self.quals != 0
    }

    pub fn clear_quals(mut self) -> Self {
        self.quals = 0;
        self
    }
}

/// The closed set of type kinds in the Basalt language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Pointer { pointee: QualType },
    Array { element: QualType, len: u32 },
    /// Named struct; the field list lives on the defining AST node.
    Struct { name: String },
    /// Named enum over an underlying integer type.
    Enum { name: String, underlying: QualType },
    /// Transparent named alias.
    Alias { name: String, underlying: QualType },
    /// Placeholder for a name that was not yet known at parse time.
    /// Symbol analysis replaces every reachable handle to one of these.
    Deferred { name: String },
    Function { params: Vec<QualType>, ret: QualType },
}

/// Per-translation-unit type interning context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeCtx {
    arena: Vec<Type>,

    builtins: Vec<TypeId>,
    pointers: HashMap<QualType, TypeId>,
    arrays: HashMap<(QualType, u32), TypeId>,
    deferred: HashMap<String, TypeId>,
    named: HashMap<String, TypeId>,
    functions: HashMap<(Vec<QualType>, QualType), TypeId>,
}

/// Index order of the pre-interned builtin types.
const BUILTINS: [Type; 13] = [
    Type::Void,
    Type::Bool,
    Type::Char,
    Type::Int8,
    Type::Int16,
    Type::Int32,
    Type::Int64,
    Type::UInt8,
    Type::UInt16,
    Type::UInt32,
    Type::UInt64,
    Type::Float32,
    Type::Float64,
];

impl TypeCtx {
    pub fn new() -> Self {
        let mut ctx = Self::default();
        for ty in BUILTINS {
            let id = ctx.alloc(ty);
            ctx.builtins.push(id);
        }

        ctx
    }

    fn alloc(&mut self, ty: Type) -> TypeId {
        let id = self.arena.len() as TypeId;
        self.arena.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.arena[id as usize]
    }

    /// Look a builtin up by its surface spelling.
    pub fn builtin_by_name(&self, name: &str) -> Option<TypeId> {
        let index = BUILTINS.iter().position(|ty| builtin_spelling(ty) == Some(name))?;
        Some(self.builtins[index])
    }

    pub fn void(&self) -> TypeId {
        self.builtins[0]
    }

    pub fn bool_(&self) -> TypeId {
        self.builtins[1]
    }

    pub fn char_(&self) -> TypeId {
        self.builtins[2]
    }

    pub fn s8(&self) -> TypeId {
        self.builtins[3]
    }

    pub fn s16(&self) -> TypeId {
        self.builtins[4]
    }

    pub fn s32(&self) -> TypeId {
        self.builtins[5]
    }

    pub fn s64(&self) -> TypeId {
        self.builtins[6]
    }

    pub fn u8(&self) -> TypeId {
        self.builtins[7]
    }

    pub fn u16(&self) -> TypeId {
        self.builtins[8]
    }

    pub fn u32(&self) -> TypeId {
        self.builtins[9]
    }

    pub fn u64(&self) -> TypeId {
        self.builtins[10]
    }

    pub fn f32(&self) -> TypeId {
        self.builtins[11]
    }

    pub fn f64(&self) -> TypeId {
        self.builtins[12]
    }

    pub fn pointer(&mut self, pointee: QualType) -> TypeId {
        if let Some(&id) = self.pointers.get(&pointee) {
            return id;
        }

        let id = self.alloc(Type::Pointer { pointee });
        self.pointers.insert(pointee, id);
        id
    }

    pub fn array(&mut self, element: QualType, len: u32) -> TypeId {
        if let Some(&id) = self.arrays.get(&(element, len)) {
            return id;
        }

        let id = self.alloc(Type::Array { element, len });
        self.arrays.insert((element, len), id);
        id
    }

    pub fn deferred(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.deferred.get(name) {
            return id;
        }

        let id = self.alloc(Type::Deferred { name: name.to_string() });
        self.deferred.insert(name.to_string(), id);
        id
    }

    pub fn function(&mut self, params: Vec<QualType>, ret: QualType) -> TypeId {
        if let Some(&id) = self.functions.get(&(params.clone(), ret)) {
            return id;
        }

        let id = self.alloc(Type::Function { params: params.clone(), ret });
        self.functions.insert((params, ret), id);
        id
    }

    /// Create a named struct type. Returns `None` if the name is taken.
    pub fn create_struct(&mut self, name: &str) -> Option<TypeId> {
        if self.named.contains_key(name) {
            return None;
        }

        let id = self.alloc(Type::Struct { name: name.to_string() });
        self.named.insert(name.to_string(), id);
        Some(id)
    }

    /// Create a named enum type. Returns `None` if the name is taken.
    pub fn create_enum(&mut self, name: &str, underlying: QualType) -> Option<TypeId> {
        if self.named.contains_key(name) {
            return None;
        }

        let id = self.alloc(Type::Enum { name: name.to_string(), underlying });
        self.named.insert(name.to_string(), id);
        Some(id)
    }

    /// Create a named alias type. Returns `None` if the name is taken.
    pub fn create_alias(&mut self, name: &str, underlying: QualType) -> Option<TypeId> {
        if self.named.contains_key(name) {
            return None;
        }

        let id = self.alloc(Type::Alias { name: name.to_string(), underlying });
        self.named.insert(name.to_string(), id);
        Some(id)
    }

    /// Look a named struct/enum/alias type up.
    pub fn named(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    // Type predicates. Aliases are not transparent here; sizing and
    // lowering strip them explicitly.

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Void)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Bool
                | Type::Char
                | Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
        )
    }

    pub fn is_signed_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Bool | Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64
        )
    }

    pub fn is_unsigned_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Char | Type::UInt8 | Type::UInt16 | Type::UInt32 | Type::UInt64
        )
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Float32 | Type::Float64)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer { .. })
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Array { .. })
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct { .. })
    }

    pub fn is_enum(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Enum { .. })
    }

    pub fn is_deferred(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Deferred { .. })
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Function { .. })
    }

    /// Width in bits of an integer type, counting `bool` as 1.
    pub fn integer_width(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Bool => Some(1),
            Type::Char | Type::Int8 | Type::UInt8 => Some(8),
            Type::Int16 | Type::UInt16 => Some(16),
            Type::Int32 | Type::UInt32 => Some(32),
            Type::Int64 | Type::UInt64 => Some(64),
            _ => None,
        }
    }

    pub fn float_width(&self, id: TypeId) -> Option<u32> {
        match self.get(id) {
            Type::Float32 => Some(32),
            Type::Float64 => Some(64),
            _ => None,
        }
    }

    pub fn pointee(&self, id: TypeId) -> Option<QualType> {
        match self.get(id) {
            Type::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn element(&self, id: TypeId) -> Option<(QualType, u32)> {
        match self.get(id) {
            Type::Array { element, len } => Some((*element, *len)),
            _ => None,
        }
    }

    /// Compare two type uses for equality. Qualifiers never participate.
    pub fn compare(&self, a: QualType, b: QualType) -> bool {
        self.compare_types(a.ty, b.ty)
    }

    pub fn compare_types(&self, a: TypeId, b: TypeId) -> bool {
        match (self.get(a), self.get(b)) {
            (Type::Pointer { pointee: pa }, Type::Pointer { pointee: pb }) => {
                self.compare(*pa, *pb)
            }

            (
                Type::Array { element: ea, len: la },
                Type::Array { element: eb, len: lb },
            ) => la == lb && self.compare(*ea, *eb),

            (
                Type::Function { params: pa, ret: ra },
                Type::Function { params: pb, ret: rb },
            ) => {
                pa.len() == pb.len()
                    && self.compare(*ra, *rb)
                    && pa.iter().zip(pb).all(|(x, y)| self.compare(*x, *y))
            }

            (Type::Struct { name: na }, Type::Struct { name: nb }) => na == nb,
            (Type::Enum { name: na, .. }, Type::Enum { name: nb, .. }) => na == nb,
            (Type::Alias { name: na, .. }, Type::Alias { name: nb, .. }) => na == nb,

            (ta, tb) => ta == tb,
        }
    }

    /// Test if `from` can be cast to `to` under the implicit cast rules.
    pub fn can_cast_implicit(&self, from: QualType, to: QualType) -> bool {
        match (self.get(from.ty), self.get(to.ty)) {
            // Anything may be discarded into void.
            (_, Type::Void) => true,
            (Type::Void, _) => false,

            // Transparent aliases delegate to their underlying type.
            (Type::Alias { underlying, .. }, _) => self.can_cast_implicit(*underlying, to),
            (_, Type::Alias { underlying, .. }) => self.can_cast_implicit(from, *underlying),

            // Enums cast to any integer.
            (Type::Enum { .. }, _) => self.is_integer(to.ty),

            // Array of T decays to pointer to T.
            (Type::Array { element, .. }, Type::Pointer { pointee }) => {
                self.compare(*element, *pointee)
            }

            // *void converts to and from any pointer.
            (Type::Pointer { pointee }, Type::Pointer { pointee: to_pointee }) => {
                self.is_void(pointee.ty) || self.is_void(to_pointee.ty)
            }

            _ if self.is_integer(from.ty) && self.is_integer(to.ty) => {
                let from_width = self.integer_width(from.ty).unwrap();
                let to_width = self.integer_width(to.ty).unwrap();

                // Equal width converts across signedness; otherwise only
                // widening within the same signedness.
                from_width == to_width
                    || (from_width < to_width
                        && self.is_signed_integer(from.ty) == self.is_signed_integer(to.ty))
            }

            _ if self.is_integer(from.ty) && self.is_float(to.ty) => true,

            _ if self.is_float(from.ty) && self.is_float(to.ty) => {
                self.float_width(from.ty).unwrap() < self.float_width(to.ty).unwrap()
            }

            _ => false,
        }
    }

    /// Test if `from` can be cast to `to` under the explicit cast rules, a
    /// superset of the implicit rules.
    pub fn can_cast_explicit(&self, from: QualType, to: QualType) -> bool {
        if self.can_cast_implicit(from, to) {
            return true;
        }

        match (self.get(from.ty), self.get(to.ty)) {
            (Type::Alias { underlying, .. }, _) => self.can_cast_explicit(*underlying, to),
            (_, Type::Alias { underlying, .. }) => self.can_cast_explicit(from, *underlying),

            (Type::Pointer { .. }, Type::Pointer { .. }) => true,
            (Type::Pointer { .. }, _) => self.is_integer(to.ty),
            (_, Type::Pointer { .. }) => self.is_integer(from.ty),

            _ => {
                // Narrowing, float/integer conversions in either direction.
                let from_numeric = self.is_integer(from.ty) || self.is_float(from.ty);
                let to_numeric = self.is_integer(to.ty) || self.is_float(to.ty);
                from_numeric && to_numeric
            }
        }
    }

    /// Render the surface syntax of a type use.
    pub fn display(&self, ty: QualType) -> String {
        let mut out = String::new();
        if ty.is_mut() {
            out.push_str("mut ");
        }

        out + &self.display_type(ty.ty)
    }

    pub fn display_type(&self, id: TypeId) -> String {
        let ty = self.get(id);
        if let Some(spelling) = builtin_spelling(ty) {
            return spelling.to_string();
        }

        match ty {
            Type::Pointer { pointee } => format!("*{}", self.display(*pointee)),
            Type::Array { element, len } => format!("[{}]{}", len, self.display(*element)),
            Type::Struct { name }
            | Type::Enum { name, .. }
            | Type::Alias { name, .. }
            | Type::Deferred { name } => name.clone(),
            Type::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.display(*p))
                    .collect::<Vec<_>>()
                    .join(", ");

                format!("({}) -> {}", params, self.display(*ret))
            }
            _ => unreachable!("builtin handled above"),
        }
    }
}

fn builtin_spelling(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Void => Some("void"),
        Type::Bool => Some("bool"),
        Type::Char => Some("char"),
        Type::Int8 => Some("s8"),
        Type::Int16 => Some("s16"),
        Type::Int32 => Some("s32"),
        Type::Int64 => Some("s64"),
        Type::UInt8 => Some("u8"),
        Type::UInt16 => Some("u16"),
        Type::UInt32 => Some("u32"),
        Type::UInt64 => Some("u64"),
        Type::Float32 => Some("f32"),
        Type::Float64 => Some("f64"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_dedupes_composites() {
        let mut ctx = TypeCtx::new();
        let p1 = ctx.pointer(QualType::new(ctx.s64()));
        let p2 = ctx.pointer(QualType::new(ctx.s64()));
        assert_eq!(p1, p2);

        let a1 = ctx.array(QualType::new(ctx.u8()), 4);
        let a2 = ctx.array(QualType::new(ctx.u8()), 4);
        let a3 = ctx.array(QualType::new(ctx.u8()), 8);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
    }

    #[test]
    fn compare_ignores_mutability() {
        let ctx = TypeCtx::new();
        let a = QualType::new(ctx.s32());
        let b = QualType::new(ctx.s32()).with_mut();
        assert!(ctx.compare(a, b));
    }

    #[test]
    fn compare_is_structural_for_pointers() {
        let mut ctx = TypeCtx::new();
        let s64 = QualType::new(ctx.s64());
        let p1 = QualType::new(ctx.pointer(s64));
        let p2 = QualType::new(ctx.pointer(QualType::new(ctx.s64()).with_mut()));
        let p3 = QualType::new(ctx.pointer(QualType::new(ctx.u64())));

        assert!(ctx.compare(p1, p2));
        assert!(!ctx.compare(p1, p3));
    }

    #[test]
    fn implicit_casts_widen_only() {
        let ctx = TypeCtx::new();
        let s8 = QualType::new(ctx.s8());
        let s64 = QualType::new(ctx.s64());
        let u8 = QualType::new(ctx.u8());
        let u64 = QualType::new(ctx.u64());
        let f32 = QualType::new(ctx.f32());
        let f64 = QualType::new(ctx.f64());

        assert!(ctx.can_cast_implicit(s8, s64));
        assert!(!ctx.can_cast_implicit(s64, s8));
        assert!(ctx.can_cast_implicit(s8, u8)); // equal width, any signedness
        assert!(!ctx.can_cast_implicit(s8, u64)); // widening across signedness
        assert!(ctx.can_cast_implicit(s64, f32));
        assert!(ctx.can_cast_implicit(f32, f64));
        assert!(!ctx.can_cast_implicit(f64, f32));
        assert!(!ctx.can_cast_implicit(f32, s32_of(&ctx)));
    }

    fn s32_of(ctx: &TypeCtx) -> QualType {
        QualType::new(ctx.s32())
    }

    #[test]
    fn void_pointers_convert_implicitly() {
        let mut ctx = TypeCtx::new();
        let void_ptr = QualType::new(ctx.pointer(QualType::new(ctx.void())));
        let s64_ptr = QualType::new(ctx.pointer(QualType::new(ctx.s64())));

        assert!(ctx.can_cast_implicit(void_ptr, s64_ptr));
        assert!(ctx.can_cast_implicit(s64_ptr, void_ptr));
    }

    #[test]
    fn array_decays_to_element_pointer() {
        let mut ctx = TypeCtx::new();
        let arr = QualType::new(ctx.array(QualType::new(ctx.char_()), 16));
        let char_ptr = QualType::new(ctx.pointer(QualType::new(ctx.char_())));
        let s64_ptr = QualType::new(ctx.pointer(QualType::new(ctx.s64())));

        assert!(ctx.can_cast_implicit(arr, char_ptr));
        assert!(!ctx.can_cast_implicit(arr, s64_ptr));
    }

    #[test]
    fn explicit_casts_are_a_superset() {
        let mut ctx = TypeCtx::new();
        let s64 = QualType::new(ctx.s64());
        let s8 = QualType::new(ctx.s8());
        let f64 = QualType::new(ctx.f64());
        let s64_ptr = QualType::new(ctx.pointer(s64));
        let u8_ptr = QualType::new(ctx.pointer(QualType::new(ctx.u8())));

        assert!(ctx.can_cast_explicit(s64, s8));
        assert!(ctx.can_cast_explicit(f64, s8));
        assert!(ctx.can_cast_explicit(s64, s64_ptr));
        assert!(ctx.can_cast_explicit(s64_ptr, s64));
        assert!(ctx.can_cast_explicit(s64_ptr, u8_ptr));
        assert!(!ctx.can_cast_explicit(QualType::new(ctx.void()), s64));
    }

    #[test]
    fn display_renders_surface_syntax() {
        let mut ctx = TypeCtx::new();
        let inner = QualType::new(ctx.s32()).with_mut();
        let ptr = ctx.pointer(inner);
        let arr = ctx.array(QualType::new(ptr), 3);

        assert_eq!(ctx.display_type(arr), "[3]*mut s32");

        let f = ctx.function(
            vec![QualType::new(ctx.s64()), QualType::new(ctx.f64())],
            QualType::new(ctx.bool_()),
        );
        assert_eq!(ctx.display_type(f), "(s64, f64) -> bool");
    }
}
