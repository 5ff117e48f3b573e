//! Target layout model
//!
//! Pure layout queries over MIR types for the supported x86-64 Linux
//! target: sizes, alignments, struct field offsets, and the scalar test
//! that decides whether a value travels in a register or through the
//! `__copy` aggregate path. The register file and ABI save classification
//! live with the machine IR crate.

use crate::types::{MirType, MirTypeId, TypePool};

/// Align `offset` up to `align` (a power of two).
pub fn align_to(offset: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// The target machine description.
#[derive(Debug, Clone)]
pub struct Machine {
    pointer_size: u32,
    pointer_align: u32,
    little_endian: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self { pointer_size: 8, pointer_align: 8, little_endian: true }
    }

    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    pub fn pointer_align(&self) -> u32 {
        self.pointer_align
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// The size of a type in bytes.
    pub fn size_of(&self, pool: &TypePool, ty: MirTypeId) -> u32 {
        match pool.get(ty) {
            MirType::Void => 0,
            MirType::Int { width } => (width / 8).max(1),
            MirType::Float { width } => width / 8,
            MirType::Pointer { .. } | MirType::Function { .. } => self.pointer_size,
            MirType::Array { element, len } => self.size_of(pool, *element) * len,
            MirType::Struct { .. } => {
                let mut offset = 0;
                for &field in pool.fields_of(ty) {
                    offset = align_to(offset, self.align_of(pool, field));
                    offset += self.size_of(pool, field);
                }

                align_to(offset, self.align_of(pool, ty))
            }
        }
    }

    /// The required alignment of a type in bytes.
    pub fn align_of(&self, pool: &TypePool, ty: MirTypeId) -> u32 {
        match pool.get(ty) {
            MirType::Void => 0,
            MirType::Int { width } => (width / 8).max(1),
            MirType::Float { width } => width / 8,
            MirType::Pointer { .. } | MirType::Function { .. } => self.pointer_align,
            MirType::Array { element, .. } => self.align_of(pool, *element),
            MirType::Struct { .. } => {
                let mut max_align = 1;
                for &field in pool.fields_of(ty) {
                    max_align = max_align.max(self.align_of(pool, field));
                }

                max_align
            }
        }
    }

    /// The cumulative aligned offset of field `i` inside a struct type.
    pub fn field_offset(&self, pool: &TypePool, ty: MirTypeId, i: u32) -> u32 {
        let fields = pool.fields_of(ty);
        let mut offset = 0;
        for &field in &fields[..i as usize] {
            offset = align_to(offset, self.align_of(pool, field));
            offset += self.size_of(pool, field);
        }

        align_to(offset, self.align_of(pool, fields[i as usize]))
    }

    /// Test if values of this type travel directly in registers.
    pub fn is_scalar(&self, pool: &TypePool, ty: MirTypeId) -> bool {
        matches!(
            pool.get(ty),
            MirType::Void | MirType::Int { .. } | MirType::Float { .. } | MirType::Pointer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_sizes() {
        let mut pool = TypePool::new();
        let mach = Machine::new();

        let void = pool.void();
        let i1 = pool.i1();
        let i8 = pool.i8();
        let i32 = pool.i32();
        let f64 = pool.f64();
        let ptr = pool.void_pointer();

        assert_eq!(mach.size_of(&pool, void), 0);
        assert_eq!(mach.size_of(&pool, i1), 1);
        assert_eq!(mach.size_of(&pool, i8), 1);
        assert_eq!(mach.size_of(&pool, i32), 4);
        assert_eq!(mach.size_of(&pool, f64), 8);
        assert_eq!(mach.size_of(&pool, ptr), 8);
    }

    #[test]
    fn array_size_scales_by_length() {
        let mut pool = TypePool::new();
        let mach = Machine::new();

        let i32 = pool.i32();
        let arr = pool.array(i32, 5);
        assert_eq!(mach.size_of(&pool, arr), 20);
        assert_eq!(mach.align_of(&pool, arr), 4);
    }

    #[test]
    fn struct_layout_pads_between_fields() {
        let mut pool = TypePool::new();
        let mach = Machine::new();

        // { i8, i64, i8 } -> offsets 0, 8, 16; size 24 after tail padding.
        let ty = pool.create_struct("Mixed");
        let i8 = pool.i8();
        let i64 = pool.i64();
        pool.append_field("Mixed", i8);
        pool.append_field("Mixed", i64);
        pool.append_field("Mixed", i8);

        assert_eq!(mach.field_offset(&pool, ty, 0), 0);
        assert_eq!(mach.field_offset(&pool, ty, 1), 8);
        assert_eq!(mach.field_offset(&pool, ty, 2), 16);
        assert_eq!(mach.size_of(&pool, ty), 24);
        assert_eq!(mach.align_of(&pool, ty), 8);
    }

    #[test]
    fn scalar_classification() {
        let mut pool = TypePool::new();
        let mach = Machine::new();

        let i64 = pool.i64();
        let ptr = pool.pointer(i64);
        let arr = pool.array(i64, 2);
        let s = pool.create_struct("S");

        assert!(mach.is_scalar(&pool, i64));
        assert!(mach.is_scalar(&pool, ptr));
        assert!(!mach.is_scalar(&pool, arr));
        assert!(!mach.is_scalar(&pool, s));
    }
}
