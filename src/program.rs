//! Scheduled program graph handed to the backend.
//!
//! A [`Program`] is already optimized and scheduled: the entry computation's
//! instruction order is fixed by its [`Schedule`]. The backend never reorders
//! or rewrites it; it only reads shapes, opcodes and the order.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config::ModuleConfig;
use crate::shape::{PrimitiveType, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub usize);

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Parameter(u32),
    Constant,
    Fusion,
    Copy,
    Tuple,
    GetTupleElement(usize),
    Conditional,
    While,
    AllReduce,
    AllGather,
    ReduceScatter,
    CollectivePermute,
    CustomCall(String),
}

impl Opcode {
    pub fn is_collective(&self) -> bool {
        matches!(
            self,
            Opcode::AllReduce | Opcode::AllGather | Opcode::ReduceScatter | Opcode::CollectivePermute
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub id: InstructionId,
    pub name: String,
    pub opcode: Opcode,
    pub shape: Shape,
    pub operands: Vec<InstructionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Computation {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub root: InstructionId,
}

impl Computation {
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.iter().find(|inst| inst.id == id)
    }

    pub fn root_instruction(&self) -> Option<&Instruction> {
        self.instruction(self.root)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|inst| matches!(inst.opcode, Opcode::Parameter(_)))
    }
}

/// Fixed execution order of the entry computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Schedule {
    pub sequence: Vec<InstructionId>,
}

/// Ordering derived from a [`Schedule`]; the position in the sequence is the
/// only notion of "before" the buffer assigner may rely on.
#[derive(Debug, Clone)]
pub struct SequentialOrdering {
    sequence: Vec<InstructionId>,
}

impl SequentialOrdering {
    pub fn new(schedule: &Schedule) -> Self {
        Self { sequence: schedule.sequence.clone() }
    }

    pub fn position(&self, id: InstructionId) -> Option<usize> {
        self.sequence.iter().position(|i| *i == id)
    }

    pub fn executes_before(&self, a: InstructionId, b: InstructionId) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa < pb,
            _ => false,
        }
    }

    pub fn sequence(&self) -> &[InstructionId] {
        &self.sequence
    }
}

/// The scheduled, optimized computation being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    name: String,
    computations: Vec<Computation>,
    entry: usize,
    schedule: Schedule,
    config: ModuleConfig,
}

impl Program {
    /// Create a program whose entry is `computations[entry]`.
    ///
    /// Panics if `entry` is out of range.
    pub fn new(
        name: impl Into<String>,
        computations: Vec<Computation>,
        entry: usize,
        schedule: Schedule,
        config: ModuleConfig,
    ) -> Self {
        assert!(entry < computations.len(), "entry computation index out of range");
        Self {
            name: name.into(),
            computations,
            entry,
            schedule,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn computations(&self) -> &[Computation] {
        &self.computations
    }

    pub fn entry_computation(&self) -> &Computation {
        &self.computations[self.entry]
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ModuleConfig {
        &mut self.config
    }

    /// Shape of the entry computation's root, or an empty tuple if the root is missing.
    pub fn result_shape(&self) -> Shape {
        self.entry_computation()
            .root_instruction()
            .map(|root| root.shape.clone())
            .unwrap_or_else(|| Shape::tuple(Vec::new()))
    }

    /// Whether any instruction produces an 8-bit float value.
    pub fn has_fp8(&self) -> bool {
        const F8_TYPES: [PrimitiveType; 5] = [
            PrimitiveType::F8E5M2,
            PrimitiveType::F8E5M2FNUZ,
            PrimitiveType::F8E4M3FN,
            PrimitiveType::F8E4M3B11FNUZ,
            PrimitiveType::F8E4M3FNUZ,
        ];
        self.computations.iter().any(|comp| {
            comp.instructions
                .iter()
                .any(|inst| F8_TYPES.iter().any(|ty| inst.shape.has_primitive_type(*ty)))
        })
    }

    /// Deterministic 128-bit fingerprint of the program structure.
    pub fn fingerprint128(&self) -> u128 {
        let mut lo = DefaultHasher::new();
        self.name.hash(&mut lo);
        self.computations.hash(&mut lo);
        self.schedule.hash(&mut lo);

        let mut hi = DefaultHasher::new();
        0x9e37_79b9_u32.hash(&mut hi);
        self.computations.hash(&mut hi);
        self.entry.hash(&mut hi);

        ((hi.finish() as u128) << 64) | lo.finish() as u128
    }
}

/// Incremental construction of a single-computation [`Program`].
///
/// Instructions are scheduled in the order they are added.
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    instructions: Vec<Instruction>,
    config: ModuleConfig,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            config: ModuleConfig::default(),
        }
    }

    pub fn config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add(
        &mut self,
        name: &str,
        opcode: Opcode,
        shape: Shape,
        operands: &[InstructionId],
    ) -> InstructionId {
        let id = InstructionId(self.instructions.len());
        self.instructions.push(Instruction {
            id,
            name: name.to_string(),
            opcode,
            shape,
            operands: operands.to_vec(),
        });
        id
    }

    /// Finish with the last added instruction as the entry root.
    pub fn build(self) -> Program {
        let root = InstructionId(self.instructions.len().saturating_sub(1));
        let schedule = Schedule {
            sequence: self.instructions.iter().map(|inst| inst.id).collect(),
        };
        let entry = Computation {
            name: format!("{}.entry", self.name),
            instructions: self.instructions,
            root,
        };
        Program::new(self.name, vec![entry], 0, schedule, self.config)
    }
}
