//! The MIR control-flow graph
//!
//! A [`Cfg`] owns globals, functions, the interned type pool and the
//! interned constant pool for one lowering of a program. Functions own
//! arenas of basic blocks and instructions; blocks hold ordered instruction
//! lists and typed block-argument lists. All cross-references are index
//! handles into the owning container.

use crate::constant::{ConstId, ConstPool};
use crate::machine::Machine;
use crate::types::{MirTypeId, TypePool};
use hashbrown::HashMap;
use smallvec::SmallVec;

pub type FuncId = u32;
pub type BlockId = u32;
pub type InstId = u32;
pub type LocalId = u32;
pub type GlobalId = u32;

/// A reference to an SSA value or symbol, as used in instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// An interned constant.
    Const(ConstId),
    /// The n-th argument of the containing function.
    Arg(u32),
    /// The n-th argument of a basic block.
    BlockArg(BlockId, u32),
    /// The result of a defining instruction.
    Inst(InstId),
    /// The address of a stack local; the value type is a pointer to the
    /// local's allocated type.
    Local(LocalId),
    /// The address of a global; likewise pointer-typed.
    Global(GlobalId),
    /// A function symbol.
    Func(FuncId),
    /// A block address, used only in control-flow operand positions.
    Block(BlockId),
}

/// Comparison predicates. The `o`-prefixed forms are ordered float
/// comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    IEq,
    INe,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl Predicate {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Predicate::Oeq
                | Predicate::One
                | Predicate::Olt
                | Predicate::Ole
                | Predicate::Ogt
                | Predicate::Oge
        )
    }
}

/// MIR opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Memory
    Load,
    Store,
    PointerWalk,
    Access,
    Extract,
    Index,

    // Control
    Jump,
    CondJump,
    Ret,
    Abort,
    Unreachable,

    // Integer arithmetic
    IAdd,
    ISub,
    IMul,
    SDiv,
    UDiv,
    SMod,
    UMod,
    INeg,

    // Float arithmetic
    FAdd,
    FSub,
    FMul,
    FDiv,
    FNeg,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Not,

    Cmp(Predicate),

    // Casts
    SExt,
    ZExt,
    FExt,
    ITrunc,
    FTrunc,
    S2F,
    U2F,
    F2S,
    F2U,
    P2I,
    I2P,
    Reint,

    Call,

    /// Materialize a pooled string constant as a pointer-to-char.
    String,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::CondJump | Opcode::Ret | Opcode::Abort | Opcode::Unreachable
        )
    }
}

/// A single MIR instruction.
#[derive(Debug, Clone)]
pub struct Inst {
    pub op: Opcode,
    /// The result type; void for instructions that define nothing.
    pub ty: MirTypeId,
    /// SSA def id; 0 means the instruction produces no value.
    pub def: u32,
    pub operands: SmallVec<[Value; 4]>,
    /// Access alignment for loads and stores.
    pub align: u32,
}

impl Inst {
    pub fn is_def(&self) -> bool {
        self.def != 0
    }

    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }
}

/// A basic block: typed block arguments plus an ordered instruction list.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub args: Vec<MirTypeId>,
    pub insts: Vec<InstId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    External,
}

#[derive(Debug, Clone)]
pub struct FuncArg {
    pub name: String,
    pub ty: MirTypeId,
}

/// A stack slot owned by a function. The value type of a local reference is
/// a pointer to `ty`.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    /// The allocated type.
    pub ty: MirTypeId,
    pub align: u32,
}

/// A MIR function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    /// The function's signature type.
    pub ty: MirTypeId,
    pub args: Vec<FuncArg>,

    blocks: Vec<Block>,
    /// Blocks in layout order; blocks are created detached and appended
    /// once control flow reaches them.
    pub block_order: Vec<BlockId>,
    insts: Vec<Inst>,
    locals: Vec<Local>,
    local_names: HashMap<String, LocalId>,
}

impl Function {
    pub fn new(name: impl Into<String>, linkage: Linkage, ty: MirTypeId, args: Vec<FuncArg>) -> Self {
        Self {
            name: name.into(),
            linkage,
            ty,
            args,
            blocks: Vec::new(),
            block_order: Vec::new(),
            insts: Vec::new(),
            locals: Vec::new(),
            local_names: HashMap::new(),
        }
    }

    /// Test if this function has any body blocks.
    pub fn is_declaration(&self) -> bool {
        self.block_order.is_empty()
    }

    /// Create a detached block; call [`Function::append_block`] to place it.
    pub fn create_block(&mut self, args: Vec<MirTypeId>) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(Block { args, ..Block::default() });
        id
    }

    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(
            !self.block_order.contains(&block),
            "block appended twice"
        );

        self.block_order.push(block);
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id as usize]
    }

    /// The layout position of a block, used for label naming.
    pub fn block_position(&self, id: BlockId) -> Option<u32> {
        self.block_order.iter().position(|&b| b == id).map(|p| p as u32)
    }

    pub fn add_inst(&mut self, inst: Inst) -> InstId {
        let id = self.insts.len() as InstId;
        self.insts.push(inst);
        id
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id as usize]
    }

    /// Reserve a stack slot. Shadowed names are uniquified so the name
    /// table stays one-to-one.
    pub fn create_local(&mut self, name: &str, ty: MirTypeId, align: u32) -> LocalId {
        let id = self.locals.len() as LocalId;

        let mut unique = name.to_string();
        let mut suffix = 0;
        while unique.is_empty() || self.local_names.contains_key(&unique) {
            suffix += 1;
            unique = format!("{}.{}", name, suffix);
        }

        self.local_names.insert(unique.clone(), id);
        self.locals.push(Local { name: unique, ty, align });
        id
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id as usize]
    }

    pub fn local_by_name(&self, name: &str) -> Option<LocalId> {
        self.local_names.get(name).copied()
    }

    pub fn locals(&self) -> impl Iterator<Item = (LocalId, &Local)> {
        self.locals.iter().enumerate().map(|(i, l)| (i as LocalId, l))
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// Test if a block ends in a terminator.
    pub fn block_terminates(&self, block: BlockId) -> bool {
        self.block(block)
            .insts
            .last()
            .map(|&inst| self.inst(inst).is_terminator())
            .unwrap_or(false)
    }

    /// The terminator instruction of a block, if it has one.
    pub fn terminator(&self, block: BlockId) -> Option<&Inst> {
        let &last = self.block(block).insts.last()?;
        let inst = self.inst(last);
        inst.is_terminator().then_some(inst)
    }
}

/// A global variable.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    /// The allocated type; a global reference's value type is a pointer to
    /// this.
    pub ty: MirTypeId,
    pub linkage: Linkage,
    pub read_only: bool,
    pub init: Option<ConstId>,
}

/// The control-flow graph for one lowered program.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub filename: String,
    pub machine: Machine,
    pub types: TypePool,
    pub consts: ConstPool,

    functions: Vec<Function>,
    function_names: HashMap<String, FuncId>,
    globals: Vec<Global>,
    global_names: HashMap<String, GlobalId>,

    next_def: u32,
}

impl Cfg {
    pub fn new(machine: Machine, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            machine,
            types: TypePool::new(),
            consts: ConstPool::new(),
            functions: Vec::new(),
            function_names: HashMap::new(),
            globals: Vec::new(),
            global_names: HashMap::new(),
            next_def: 1,
        }
    }

    /// Hand out a fresh SSA def id; def ids are unique across the graph.
    pub fn def_id(&mut self) -> u32 {
        let id = self.next_def;
        self.next_def += 1;
        id
    }

    /// Add a function to the graph. Returns `None` if the name is taken.
    pub fn create_function(&mut self, function: Function) -> Option<FuncId> {
        if self.function_names.contains_key(&function.name) {
            return None;
        }

        let id = self.functions.len() as FuncId;
        self.function_names.insert(function.name.clone(), id);
        self.functions.push(function);
        Some(id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_names.get(name).copied()
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id as usize]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter().enumerate().map(|(i, f)| (i as FuncId, f))
    }

    /// Add a global to the graph. Returns `None` if the name is taken.
    pub fn create_global(&mut self, global: Global) -> Option<GlobalId> {
        if self.global_names.contains_key(&global.name) {
            return None;
        }

        let id = self.globals.len() as GlobalId;
        self.global_names.insert(global.name.clone(), id);
        self.globals.push(global);
        Some(id)
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.global_names.get(name).copied()
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id as usize]
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut Global {
        &mut self.globals[id as usize]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals.iter().enumerate().map(|(i, g)| (i as GlobalId, g))
    }

    /// The MIR type of a value as an operand of `func`.
    pub fn value_type(&mut self, func: FuncId, value: Value) -> MirTypeId {
        match value {
            Value::Const(id) => self.consts.get(id).ty(),
            Value::Arg(i) => self.func(func).args[i as usize].ty,
            Value::BlockArg(block, i) => self.func(func).block(block).args[i as usize],
            Value::Inst(id) => self.func(func).inst(id).ty,
            Value::Local(id) => {
                let ty = self.func(func).local(id).ty;
                self.types.pointer(ty)
            }
            Value::Global(id) => {
                let ty = self.global(id).ty;
                self.types.pointer(ty)
            }
            Value::Func(id) => self.func(id).ty,
            Value::Block(_) => panic!("block addresses have no value type"),
        }
    }
}
