pub mod assemble;
pub mod class_builder;
pub mod codegen;
pub mod disasm;
pub mod peephole;

use thiserror::Error;

use crate::code_attribute::{EncodeError, InstructionError, MethodCode};
use crate::constant_info::PoolError;
use crate::ir::ClassModel;

pub use self::assemble::{assemble, max_locals, max_stack, AssembledCode};
pub use self::class_builder::build_class;
pub use self::codegen::lower_method;
pub use self::disasm::disassemble;
pub use self::peephole::PeepholeOptimizer;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unsupported IR: {0}")]
    UnsupportedIr(String),
    #[error("instruction {index}: {source}")]
    Instruction {
        index: usize,
        #[source]
        source: InstructionError,
    },
    #[error("instruction {index} at offset {offset}: {source}")]
    Encode {
        index: usize,
        offset: u32,
        #[source]
        source: EncodeError,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("writing classfile: {0}")]
    Write(#[from] binrw::Error),
    #[error("method {name}{descriptor}: {source}")]
    InMethod {
        name: String,
        descriptor: String,
        #[source]
        source: Box<CompileError>,
    },
    #[error("class {class}: {source}")]
    InClass {
        class: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        CompileError::UnsupportedIr(message.into())
    }

    pub(crate) fn in_method(self, name: &str, descriptor: &str) -> Self {
        CompileError::InMethod {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_class(self, class: &str) -> Self {
        CompileError::InClass {
            class: class.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past any class/method context.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::InMethod { source, .. } | CompileError::InClass { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Classfile format version written to the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClassVersion {
    /// 49.0: the newest version loadable without a StackMapTable.
    pub const JAVA_5: ClassVersion = ClassVersion { major: 49, minor: 0 };
}

impl Default for ClassVersion {
    fn default() -> Self {
        ClassVersion::JAVA_5
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OptimizerKind {
    #[default]
    Peephole,
    None,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Binary,
    /// Human-readable listing; not meant to be stable.
    Disassembly,
}

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    pub version: ClassVersion,
    pub optimizer: OptimizerKind,
    pub output: OutputMode,
}

/// Rewrites a lowered method body. Implementations must keep the
/// behaviour of the code and the handler ranges intact.
pub trait Optimizer {
    fn optimize(&self, code: MethodCode) -> MethodCode;
}

/// Leaves code untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopOptimizer;

impl Optimizer for NoopOptimizer {
    fn optimize(&self, code: MethodCode) -> MethodCode {
        code
    }
}

/// Compile `model` with the optimizer named in `options`.
///
/// The result is the classfile bytes, or a UTF-8 listing when
/// `options.output` is [`OutputMode::Disassembly`].
pub fn compile_class(model: &ClassModel, options: &CompileOptions) -> Result<Vec<u8>, CompileError> {
    match options.optimizer {
        OptimizerKind::Peephole => compile_class_with(model, options, &PeepholeOptimizer),
        OptimizerKind::None => compile_class_with(model, options, &NoopOptimizer),
    }
}

/// Compile `model`, running every method body through `optimizer`.
pub fn compile_class_with(
    model: &ClassModel,
    options: &CompileOptions,
    optimizer: &dyn Optimizer,
) -> Result<Vec<u8>, CompileError> {
    let class_file = build_class(model, options.version, optimizer)?;
    match options.output {
        OutputMode::Binary => Ok(class_file.to_bytes()?),
        OutputMode::Disassembly => Ok(disassemble(&class_file).into_bytes()),
    }
}
