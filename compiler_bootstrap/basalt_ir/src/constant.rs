//! Interned MIR constants
//!
//! Integer constants are interned per (type, value) pair, floats per
//! (type, bit pattern), nulls per type, and string literals per byte
//! content. Handle equality therefore implies constant equality.

use crate::types::MirTypeId;
use hashbrown::HashMap;

/// Handle into a [`ConstPool`].
pub type ConstId = u32;

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int { ty: MirTypeId, value: i64 },
    /// The payload is the f64 bit pattern; the type decides whether the
    /// constant materializes as a single or a double.
    Float { ty: MirTypeId, bits: u64 },
    Null { ty: MirTypeId },
    /// A pooled string body; the value type is pointer-to-i8.
    Str { ty: MirTypeId, value: String },
}

impl Const {
    pub fn ty(&self) -> MirTypeId {
        match self {
            Const::Int { ty, .. }
            | Const::Float { ty, .. }
            | Const::Null { ty }
            | Const::Str { ty, .. } => *ty,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstPool {
    arena: Vec<Const>,

    ints: HashMap<(MirTypeId, i64), ConstId>,
    floats: HashMap<(MirTypeId, u64), ConstId>,
    nulls: HashMap<MirTypeId, ConstId>,
    strings: HashMap<String, ConstId>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, constant: Const) -> ConstId {
        let id = self.arena.len() as ConstId;
        self.arena.push(constant);
        id
    }

    pub fn get(&self, id: ConstId) -> &Const {
        &self.arena[id as usize]
    }

    pub fn int(&mut self, ty: MirTypeId, value: i64) -> ConstId {
        if let Some(&id) = self.ints.get(&(ty, value)) {
            return id;
        }

        let id = self.alloc(Const::Int { ty, value });
        self.ints.insert((ty, value), id);
        id
    }

    pub fn float(&mut self, ty: MirTypeId, value: f64) -> ConstId {
        let bits = value.to_bits();
        if let Some(&id) = self.floats.get(&(ty, bits)) {
            return id;
        }

        let id = self.alloc(Const::Float { ty, bits });
        self.floats.insert((ty, bits), id);
        id
    }

    pub fn null(&mut self, ty: MirTypeId) -> ConstId {
        if let Some(&id) = self.nulls.get(&ty) {
            return id;
        }

        let id = self.alloc(Const::Null { ty });
        self.nulls.insert(ty, id);
        id
    }

    pub fn string(&mut self, ty: MirTypeId, value: &str) -> ConstId {
        if let Some(&id) = self.strings.get(value) {
            return id;
        }

        let id = self.alloc(Const::Str { ty, value: value.to_string() });
        self.strings.insert(value.to_string(), id);
        id
    }

    /// The integer payload of a constant, if it is an integer.
    pub fn as_int(&self, id: ConstId) -> Option<i64> {
        match self.get(id) {
            Const::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self, id: ConstId) -> Option<f64> {
        match self.get(id) {
            Const::Float { bits, .. } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn is_null(&self, id: ConstId) -> bool {
        matches!(self.get(id), Const::Null { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypePool;
    use pretty_assertions::assert_eq;

    #[test]
    fn integers_intern_per_type_and_value() {
        let mut types = TypePool::new();
        let mut pool = ConstPool::new();
        let i64 = types.i64();
        let i32 = types.i32();

        assert_eq!(pool.int(i64, 42), pool.int(i64, 42));
        assert_ne!(pool.int(i64, 42), pool.int(i64, 43));
        assert_ne!(pool.int(i64, 42), pool.int(i32, 42));
    }

    #[test]
    fn floats_intern_by_bit_pattern() {
        let mut types = TypePool::new();
        let mut pool = ConstPool::new();
        let f64 = types.f64();

        assert_eq!(pool.float(f64, 1.5), pool.float(f64, 1.5));
        assert_ne!(pool.float(f64, 0.0), pool.float(f64, -0.0));
    }

    #[test]
    fn strings_intern_by_content() {
        let mut types = TypePool::new();
        let mut pool = ConstPool::new();
        let i8 = types.i8();
        let ptr = types.pointer(i8);

        assert_eq!(pool.string(ptr, "hi"), pool.string(ptr, "hi"));
        assert_ne!(pool.string(ptr, "hi"), pool.string(ptr, "ho"));
    }
}
