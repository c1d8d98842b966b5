//! SPIR-V interface reflection.
//!
//! Walks the instruction stream of a compiled shader module and recovers the
//! pieces the pipeline setup needs without a shader compiler: the execution
//! stage, which descriptor bindings of set 0 are used and by what kind of
//! resource, the compute workgroup size, and whether push constants are read.
//!
//! # Module layout
//!
//! ```text
//! word 0      magic (0x07230203)
//! word 1      version
//! word 2      generator
//! word 3      id bound
//! word 4      reserved
//! word 5..    instructions, first word = (word_count << 16) | opcode
//! ```
//!
//! The scan is a single forward pass that stops at the first `OpEntryPoint`.
//! Resource variables are then resolved against the id table built so far.
//! Compilers such as glslc emit the entry point ahead of every decoration,
//! type and variable, so for their output the layout comes back empty and
//! only the stage is recovered.
//!
//! # Example
//!
//! ```no_run
//! use minivk_rhi::spirv::reflect;
//!
//! # fn example(words: &[u32]) -> Result<(), minivk_rhi::spirv::ReflectError> {
//! let reflection = reflect(words)?;
//! println!("{} stage, bindings {:#034b}", reflection.stage, reflection.layout.resource_mask);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

use crate::shader::ShaderStage;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Number of binding slots tracked per module.
pub const MAX_BINDINGS: usize = 32;

const HEADER_WORDS: usize = 5;
const BOUND_WORD: usize = 3;

mod op {
    pub const ENTRY_POINT: u16 = 15;
    pub const EXECUTION_MODE: u16 = 16;
    pub const TYPE_IMAGE: u16 = 25;
    pub const TYPE_SAMPLER: u16 = 26;
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    pub const TYPE_STRUCT: u16 = 30;
    pub const TYPE_POINTER: u16 = 32;
    pub const VARIABLE: u16 = 59;
    pub const DECORATE: u16 = 71;
}

mod decoration {
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
}

mod execution_mode {
    pub const LOCAL_SIZE: u32 = 17;
}

mod storage_class {
    pub const UNIFORM_CONSTANT: u32 = 0;
    pub const UNIFORM: u32 = 2;
    pub const PUSH_CONSTANT: u32 = 9;
    pub const STORAGE_BUFFER: u32 = 12;
}

mod execution_model {
    pub const VERTEX: u32 = 0;
    pub const FRAGMENT: u32 = 4;
    pub const GL_COMPUTE: u32 = 5;
}

/// Errors raised while reflecting a module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReflectError {
    #[error("module is {0} words long, shorter than the 5-word header")]
    TooShort(usize),

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("instruction at word {offset} has a zero word count")]
    ZeroWordCount { offset: usize },

    #[error("instruction at word {offset} ({word_count} words) overruns a {len}-word module")]
    Truncated {
        offset: usize,
        word_count: usize,
        len: usize,
    },

    #[error("opcode {opcode} at word {offset} is missing operands")]
    MissingOperands { opcode: u16, offset: usize },

    #[error("id bound {bound} exceeds the module length of {len} words")]
    BoundTooLarge { bound: u32, len: usize },

    #[error("id {id} is outside the module bound {bound}")]
    IdOutOfBounds { id: u32, bound: u32 },

    #[error("id {id} is defined twice")]
    Redefinition { id: u32 },

    #[error("module has no entry point")]
    MissingEntryPoint,

    #[error("unsupported execution model {0}")]
    UnsupportedExecutionModel(u32),

    #[error("variable {id} uses descriptor set {set}, only set 0 is supported")]
    UnsupportedSet { id: u32, set: u32 },

    #[error("variable {id} uses binding {binding}, slots end at 31")]
    BindingOutOfRange { id: u32, binding: u32 },

    #[error("binding {binding} is claimed by more than one resource")]
    DuplicateBinding { binding: u32 },

    #[error("variable {id} has a type that is not a pointer")]
    NotAPointer { id: u32 },

    #[error("variable {id} points to unsupported type (opcode {opcode})")]
    UnknownResourceType { id: u32, opcode: u16 },
}

/// What a descriptor binding holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StorageBuffer,
    StorageImage,
    Sampler,
    CombinedImageSampler,
}

/// Resource interface of one shader module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderLayout {
    /// Bit `n` is set when binding `n` of set 0 is used.
    pub resource_mask: u32,
    /// Kind of the resource at each used binding.
    pub resources: [Option<ResourceKind>; MAX_BINDINGS],
    /// Compute workgroup size, `[0; 3]` for other stages.
    pub local_size: [u32; 3],
    pub uses_push_constants: bool,
}

impl Default for ShaderLayout {
    fn default() -> Self {
        Self {
            resource_mask: 0,
            resources: [None; MAX_BINDINGS],
            local_size: [0; 3],
            uses_push_constants: false,
        }
    }
}

impl ShaderLayout {
    /// Iterates `(binding, kind)` for every used binding in ascending order.
    pub fn bindings(&self) -> impl Iterator<Item = (u32, ResourceKind)> + '_ {
        self.resources
            .iter()
            .enumerate()
            .filter_map(|(slot, kind)| kind.map(|kind| (slot as u32, kind)))
    }

    /// Number of used bindings.
    pub fn resource_count(&self) -> u32 {
        self.resource_mask.count_ones()
    }
}

/// Result of [`reflect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reflection {
    pub stage: ShaderStage,
    pub layout: ShaderLayout,
}

/// Per-id record filled while scanning.
#[derive(Clone, Copy, Debug, Default)]
struct Token {
    /// Defining opcode, 0 while undefined.
    opcode: u16,
    type_id: u32,
    storage_class: u32,
    binding: u32,
    set: u32,
}

struct TokenTable {
    tokens: Vec<Token>,
}

impl TokenTable {
    fn new(bound: u32) -> Self {
        Self {
            tokens: vec![Token::default(); bound as usize],
        }
    }

    fn bound(&self) -> u32 {
        self.tokens.len() as u32
    }

    fn get(&self, id: u32) -> Result<&Token, ReflectError> {
        self.tokens
            .get(id as usize)
            .ok_or(ReflectError::IdOutOfBounds {
                id,
                bound: self.bound(),
            })
    }

    fn get_mut(&mut self, id: u32) -> Result<&mut Token, ReflectError> {
        let bound = self.bound();
        self.tokens
            .get_mut(id as usize)
            .ok_or(ReflectError::IdOutOfBounds { id, bound })
    }

    fn define(&mut self, id: u32, opcode: u16) -> Result<&mut Token, ReflectError> {
        let token = self.get_mut(id)?;
        if token.opcode != 0 {
            return Err(ReflectError::Redefinition { id });
        }
        token.opcode = opcode;
        Ok(token)
    }
}

/// Reflects a SPIR-V module given as little-endian words.
///
/// # Errors
///
/// Any malformed or unsupported construct is reported as a [`ReflectError`];
/// there is no partial result.
pub fn reflect(words: &[u32]) -> Result<Reflection, ReflectError> {
    if words.len() < HEADER_WORDS {
        return Err(ReflectError::TooShort(words.len()));
    }
    if words[0] != SPIRV_MAGIC {
        return Err(ReflectError::BadMagic(words[0]));
    }

    // Every id needs at least one word to be defined
    let bound = words[BOUND_WORD];
    if bound as usize > words.len() {
        return Err(ReflectError::BoundTooLarge {
            bound,
            len: words.len(),
        });
    }

    let mut table = TokenTable::new(bound);
    let mut layout = ShaderLayout::default();

    let stage = scan(words, &mut table, &mut layout)?;
    resolve_variables(&table, &mut layout)?;

    Ok(Reflection { stage, layout })
}

/// Forward pass up to the first entry point.
fn scan(
    words: &[u32],
    table: &mut TokenTable,
    layout: &mut ShaderLayout,
) -> Result<ShaderStage, ReflectError> {
    let mut offset = HEADER_WORDS;

    while offset < words.len() {
        let word_count = (words[offset] >> 16) as usize;
        let opcode = (words[offset] & 0xffff) as u16;

        if word_count == 0 {
            return Err(ReflectError::ZeroWordCount { offset });
        }
        if offset + word_count > words.len() {
            return Err(ReflectError::Truncated {
                offset,
                word_count,
                len: words.len(),
            });
        }

        let inst = &words[offset..offset + word_count];
        let operand = |index: usize| {
            inst.get(index)
                .copied()
                .ok_or(ReflectError::MissingOperands { opcode, offset })
        };

        match opcode {
            op::ENTRY_POINT => return stage_for_model(operand(1)?),
            op::EXECUTION_MODE => {
                if operand(2)? == execution_mode::LOCAL_SIZE {
                    layout.local_size = [operand(3)?, operand(4)?, operand(5)?];
                }
            }
            op::DECORATE => {
                let target = operand(1)?;
                match operand(2)? {
                    decoration::DESCRIPTOR_SET => table.get_mut(target)?.set = operand(3)?,
                    decoration::BINDING => table.get_mut(target)?.binding = operand(3)?,
                    _ => {}
                }
            }
            op::TYPE_STRUCT | op::TYPE_IMAGE | op::TYPE_SAMPLER | op::TYPE_SAMPLED_IMAGE => {
                table.define(operand(1)?, opcode)?;
            }
            op::TYPE_POINTER => {
                let (id, class, pointee) = (operand(1)?, operand(2)?, operand(3)?);
                let token = table.define(id, opcode)?;
                token.storage_class = class;
                token.type_id = pointee;
            }
            op::VARIABLE => {
                let (type_id, id, class) = (operand(1)?, operand(2)?, operand(3)?);
                let token = table.define(id, opcode)?;
                token.type_id = type_id;
                token.storage_class = class;
            }
            _ => {}
        }

        offset += word_count;
    }

    Err(ReflectError::MissingEntryPoint)
}

fn stage_for_model(model: u32) -> Result<ShaderStage, ReflectError> {
    match model {
        execution_model::VERTEX => Ok(ShaderStage::Vertex),
        execution_model::FRAGMENT => Ok(ShaderStage::Fragment),
        execution_model::GL_COMPUTE => Ok(ShaderStage::Compute),
        other => Err(ReflectError::UnsupportedExecutionModel(other)),
    }
}

/// Classifies every descriptor-backed variable recorded in `table`.
fn resolve_variables(table: &TokenTable, layout: &mut ShaderLayout) -> Result<(), ReflectError> {
    for (id, token) in table.tokens.iter().enumerate() {
        if token.opcode != op::VARIABLE {
            continue;
        }
        let id = id as u32;

        match token.storage_class {
            storage_class::PUSH_CONSTANT => layout.uses_push_constants = true,
            storage_class::UNIFORM | storage_class::UNIFORM_CONSTANT | storage_class::STORAGE_BUFFER => {
                if token.set != 0 {
                    return Err(ReflectError::UnsupportedSet { id, set: token.set });
                }
                if token.binding as usize >= MAX_BINDINGS {
                    return Err(ReflectError::BindingOutOfRange {
                        id,
                        binding: token.binding,
                    });
                }

                let pointer = table.get(token.type_id)?;
                if pointer.opcode != op::TYPE_POINTER {
                    return Err(ReflectError::NotAPointer { id });
                }
                let pointee = table.get(pointer.type_id)?;
                let kind = match pointee.opcode {
                    op::TYPE_STRUCT => ResourceKind::StorageBuffer,
                    op::TYPE_IMAGE => ResourceKind::StorageImage,
                    op::TYPE_SAMPLER => ResourceKind::Sampler,
                    op::TYPE_SAMPLED_IMAGE => ResourceKind::CombinedImageSampler,
                    opcode => return Err(ReflectError::UnknownResourceType { id, opcode }),
                };

                let bit = 1u32 << token.binding;
                if layout.resource_mask & bit != 0 {
                    return Err(ReflectError::DuplicateBinding {
                        binding: token.binding,
                    });
                }
                layout.resource_mask |= bit;
                layout.resources[token.binding as usize] = Some(kind);
            }
            _ => {}
        }
    }

    Ok(())
}
