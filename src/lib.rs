//! A compiler backend for [Java Classfiles](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html)
//!
//! A typed [`ir::ClassModel`] is lowered to instructions, optionally run
//! through a peephole optimizer, assembled against a deduplicated constant
//! pool and written out as classfile bytes.

use std::io::{prelude::*, BufReader};

use log::warn;

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code_attribute;
pub mod compile;
pub mod descriptor;
pub mod ir;

pub mod parser;
pub mod types;

pub use compile::{compile_class, compile_class_with, CompileError, CompileOptions, Optimizer};
pub use parser::class_parser;
pub use types::*;

/// Compile `model` and write the result to `writer`.
///
/// ```rust
/// use classfile_assembler::descriptor::ClassType;
/// use classfile_assembler::ir::ClassModel;
///
/// let model = ClassModel::new(ClassType::from_internal("Empty"), Some(ClassType::object()));
/// let mut out = Vec::new();
/// classfile_assembler::write_class(&model, &Default::default(), &mut out).unwrap();
/// assert_eq!(&out[..4], &[0xca, 0xfe, 0xba, 0xbe]);
/// ```
pub fn write_class<W: Write>(model: &ir::ClassModel, options: &CompileOptions, writer: &mut W) -> Result<(), CompileError> {
    let bytes = compile_class(model, options)?;
    writer
        .write_all(&bytes)
        .map_err(|e| CompileError::Write(binrw::Error::Io(e)))
}

/// Read emitted classfile bytes back into the binary record.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// let result = classfile_assembler::parse_class_from_reader(&mut reader);
/// assert!(result.is_err());
/// ```
pub fn parse_class_from_reader<T: Read>(reader: &mut T) -> Result<ClassFile, String> {
    let mut class_bytes = Vec::new();
    BufReader::new(reader)
        .read_to_end(&mut class_bytes)
        .map_err(|e| format!("Failed to read classfile: {}", e))?;

    match class_parser(&class_bytes) {
        Ok((rest, class)) => {
            if !rest.is_empty() {
                warn!("{} trailing bytes after classfile", rest.len());
            }
            Ok(class)
        }
        Err(e) => Err(format!("Failed to parse classfile: {}", e)),
    }
}
