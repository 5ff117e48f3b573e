//! MIR types and the per-graph type pool
//!
//! MIR types are lower level than the surface type system: booleans become
//! 1-bit integers, chars become 8-bit integers, enums dissolve into their
//! underlying integer type. Struct types are named; their field lists are
//! filled in during the Define phase of lowering.

use hashbrown::HashMap;

/// Handle into a [`TypePool`].
pub type MirTypeId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MirType {
    Void,
    /// Integer of the given bit width; 1 is the boolean width.
    Int { width: u32 },
    Float { width: u32 },
    Pointer { pointee: MirTypeId },
    Array { element: MirTypeId, len: u32 },
    /// Named struct; field types live in the pool and are appended during
    /// the Define lowering phase.
    Struct { name: String },
    Function { params: Vec<MirTypeId>, ret: MirTypeId },
}

/// Interning pool for MIR types, owned by the control-flow graph.
#[derive(Debug, Clone, Default)]
pub struct TypePool {
    arena: Vec<MirType>,

    void: Option<MirTypeId>,
    ints: HashMap<u32, MirTypeId>,
    floats: HashMap<u32, MirTypeId>,
    pointers: HashMap<MirTypeId, MirTypeId>,
    arrays: HashMap<(MirTypeId, u32), MirTypeId>,
    functions: HashMap<(Vec<MirTypeId>, MirTypeId), MirTypeId>,
    structs: HashMap<String, MirTypeId>,
    struct_fields: HashMap<String, Vec<MirTypeId>>,
}

impl TypePool {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, ty: MirType) -> MirTypeId {
        let id = self.arena.len() as MirTypeId;
        self.arena.push(ty);
        id
    }

    pub fn get(&self, id: MirTypeId) -> &MirType {
        &self.arena[id as usize]
    }

    pub fn void(&mut self) -> MirTypeId {
        if let Some(id) = self.void {
            return id;
        }

        let id = self.alloc(MirType::Void);
        self.void = Some(id);
        id
    }

    pub fn int(&mut self, width: u32) -> MirTypeId {
        debug_assert!(matches!(width, 1 | 8 | 16 | 32 | 64), "bad integer width");

        if let Some(&id) = self.ints.get(&width) {
            return id;
        }

        let id = self.alloc(MirType::Int { width });
        self.ints.insert(width, id);
        id
    }

    pub fn i1(&mut self) -> MirTypeId {
        self.int(1)
    }

    pub fn i8(&mut self) -> MirTypeId {
        self.int(8)
    }

    pub fn i16(&mut self) -> MirTypeId {
        self.int(16)
    }

    pub fn i32(&mut self) -> MirTypeId {
        self.int(32)
    }

    pub fn i64(&mut self) -> MirTypeId {
        self.int(64)
    }

    pub fn float(&mut self, width: u32) -> MirTypeId {
        debug_assert!(matches!(width, 32 | 64), "bad float width");

        if let Some(&id) = self.floats.get(&width) {
            return id;
        }

        let id = self.alloc(MirType::Float { width });
        self.floats.insert(width, id);
        id
    }

    pub fn f32(&mut self) -> MirTypeId {
        self.float(32)
    }

    pub fn f64(&mut self) -> MirTypeId {
        self.float(64)
    }

    pub fn pointer(&mut self, pointee: MirTypeId) -> MirTypeId {
        if let Some(&id) = self.pointers.get(&pointee) {
            return id;
        }

        let id = self.alloc(MirType::Pointer { pointee });
        self.pointers.insert(pointee, id);
        id
    }

    pub fn void_pointer(&mut self) -> MirTypeId {
        let void = self.void();
        self.pointer(void)
    }

    pub fn array(&mut self, element: MirTypeId, len: u32) -> MirTypeId {
        if let Some(&id) = self.arrays.get(&(element, len)) {
            return id;
        }

        let id = self.alloc(MirType::Array { element, len });
        self.arrays.insert((element, len), id);
        id
    }

    pub fn function(&mut self, params: Vec<MirTypeId>, ret: MirTypeId) -> MirTypeId {
        if let Some(&id) = self.functions.get(&(params.clone(), ret)) {
            return id;
        }

        let id = self.alloc(MirType::Function { params: params.clone(), ret });
        self.functions.insert((params, ret), id);
        id
    }

    /// Create a named struct type with an empty field list. Returns the
    /// existing id if the name is already present.
    pub fn create_struct(&mut self, name: &str) -> MirTypeId {
        if let Some(&id) = self.structs.get(name) {
            return id;
        }

        let id = self.alloc(MirType::Struct { name: name.to_string() });
        self.structs.insert(name.to_string(), id);
        self.struct_fields.insert(name.to_string(), Vec::new());
        id
    }

    pub fn struct_by_name(&self, name: &str) -> Option<MirTypeId> {
        self.structs.get(name).copied()
    }

    pub fn append_field(&mut self, name: &str, field: MirTypeId) {
        self.struct_fields
            .get_mut(name)
            .expect("appending a field to an unknown struct")
            .push(field);
    }

    pub fn fields_of(&self, id: MirTypeId) -> &[MirTypeId] {
        match self.get(id) {
            MirType::Struct { name } => &self.struct_fields[name],
            _ => panic!("fields_of on a non-struct type"),
        }
    }

    pub fn is_void(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Void)
    }

    pub fn is_integer(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Int { .. })
    }

    pub fn is_integer_width(&self, id: MirTypeId, width: u32) -> bool {
        matches!(self.get(id), MirType::Int { width: w } if *w == width)
    }

    pub fn is_float(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Float { .. })
    }

    pub fn is_float_width(&self, id: MirTypeId, width: u32) -> bool {
        matches!(self.get(id), MirType::Float { width: w } if *w == width)
    }

    pub fn is_pointer(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Pointer { .. })
    }

    pub fn is_array(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Array { .. })
    }

    pub fn is_struct(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Struct { .. })
    }

    pub fn is_function(&self, id: MirTypeId) -> bool {
        matches!(self.get(id), MirType::Function { .. })
    }

    pub fn pointee(&self, id: MirTypeId) -> Option<MirTypeId> {
        match self.get(id) {
            MirType::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn fn_ret(&self, id: MirTypeId) -> Option<MirTypeId> {
        match self.get(id) {
            MirType::Function { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Render a type for IR dumps and diagnostics.
    pub fn display(&self, id: MirTypeId) -> String {
        match self.get(id) {
            MirType::Void => "void".to_string(),
            MirType::Int { width } => format!("i{}", width),
            MirType::Float { width } => format!("f{}", width),
            MirType::Pointer { pointee } => format!("*{}", self.display(*pointee)),
            MirType::Array { element, len } => format!("[{}]{}", len, self.display(*element)),
            MirType::Struct { name } => name.clone(),
            MirType::Function { params, ret } => {
                let params = params
                    .iter()
                    .map(|&p| self.display(p))
                    .collect::<Vec<_>>()
                    .join(", ");

                format!("({}) -> {}", params, self.display(*ret))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integers_are_interned_per_width() {
        let mut pool = TypePool::new();
        assert_eq!(pool.i64(), pool.i64());
        assert_ne!(pool.i32(), pool.i64());
    }

    #[test]
    fn struct_fields_append_in_order() {
        let mut pool = TypePool::new();
        let s = pool.create_struct("Box");
        let i32 = pool.i32();
        pool.append_field("Box", i32);
        pool.append_field("Box", i32);

        assert_eq!(pool.fields_of(s), &[i32, i32]);
    }
}
