//! Text listing of a built classfile, in the spirit of `javap -c -v`.
//!
//! The format is for people; nothing parses it back.

use crate::attribute_info::*;
use crate::code_attribute::opcodes::*;
use crate::constant_info::ConstantInfo;
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
use crate::types::ClassFile;

const INDENT: &str = "  ";
const MALFORMED_DESCRIPTOR: &str = " <malformed descriptor>";

/// Render `class` as text.
pub fn disassemble(class: &ClassFile) -> String {
    let mut disassembler = Disassembler {
        class,
        output: String::new(),
        indent_level: 0,
    };
    disassembler.render();
    disassembler.output
}

struct Disassembler<'a> {
    class: &'a ClassFile,
    output: String,
    indent_level: usize,
}

impl<'a> Disassembler<'a> {
    fn render(&mut self) {
        let class = self.class;
        let mut header = format!("class {}", self.class_ref(class.this_class));
        if class.super_class != 0 {
            header.push_str(&format!(" extends {}", self.class_ref(class.super_class)));
        }
        self.writeln(&header);
        self.indent_level += 1;
        self.writeln(&format!("version {}.{}", class.major_version, class.minor_version));
        self.writeln(&format!("flags 0x{:04x}", class.access_flags.bits()));
        if !class.interfaces.is_empty() {
            let names: Vec<String> = class.interfaces.iter().map(|&i| self.class_ref(i)).collect();
            self.writeln(&format!("implements {}", names.join(", ")));
        }
        self.indent_level -= 1;

        self.writeln("constant pool:");
        self.indent_level += 1;
        for (position, info) in class.const_pool.iter().enumerate() {
            if matches!(info, ConstantInfo::Unusable) {
                continue;
            }
            self.writeln(&format!("#{} = {}", position + 1, self.describe_entry(info)));
        }
        self.indent_level -= 1;

        if !class.fields.is_empty() {
            self.writeln("fields:");
            self.indent_level += 1;
            for field in &class.fields {
                let descriptor = self.utf8(field.descriptor_index);
                let mut line = format!(
                    "{} {} flags 0x{:04x}",
                    self.utf8(field.name_index),
                    descriptor,
                    field.access_flags.bits()
                );
                if parse_field_descriptor(&descriptor).is_err() {
                    line.push_str(MALFORMED_DESCRIPTOR);
                }
                self.writeln(&line);
                self.indent_level += 1;
                self.render_attributes(&field.attributes);
                self.indent_level -= 1;
            }
            self.indent_level -= 1;
        }

        if !class.methods.is_empty() {
            self.writeln("methods:");
            self.indent_level += 1;
            for method in &class.methods {
                let descriptor = self.utf8(method.descriptor_index);
                let mut line = format!(
                    "{} {} flags 0x{:04x}",
                    self.utf8(method.name_index),
                    descriptor,
                    method.access_flags.bits()
                );
                if parse_method_descriptor(&descriptor).is_err() {
                    line.push_str(MALFORMED_DESCRIPTOR);
                }
                self.writeln(&line);
                self.indent_level += 1;
                self.render_attributes(&method.attributes);
                self.indent_level -= 1;
            }
            self.indent_level -= 1;
        }

        self.render_attributes(&class.attributes);
    }

    fn render_attributes(&mut self, attributes: &[AttributeInfo]) {
        for attribute in attributes {
            let name = self.utf8(attribute.attribute_name_index);
            let info = attribute.info.as_slice();
            let rendered = match name.as_str() {
                "Code" => CodeAttribute::from_bytes(info).ok().map(|code| self.render_code(&code)),
                "ConstantValue" => ConstantValueAttribute::from_bytes(info)
                    .ok()
                    .map(|value| self.writeln(&format!("ConstantValue: {}", self.summary(value.constantvalue_index)))),
                "Exceptions" => ExceptionsAttribute::from_bytes(info).ok().map(|exceptions| {
                    let names: Vec<String> = exceptions.exception_table.iter().map(|&i| self.class_ref(i)).collect();
                    self.writeln(&format!("Exceptions: {}", names.join(", ")))
                }),
                "Signature" => SignatureAttribute::from_bytes(info)
                    .ok()
                    .map(|signature| self.writeln(&format!("Signature: {}", self.utf8(signature.signature_index)))),
                "SourceFile" => SourceFileAttribute::from_bytes(info)
                    .ok()
                    .map(|source| self.writeln(&format!("SourceFile: {}", self.utf8(source.sourcefile_index)))),
                "InnerClasses" => InnerClassesAttribute::from_bytes(info)
                    .ok()
                    .map(|inner| self.render_inner_classes(&inner)),
                _ => Some(self.writeln(&format!("{}: {} bytes", name, info.len()))),
            };
            if rendered.is_none() {
                self.writeln(&format!("{}: malformed", name));
            }
        }
    }

    fn render_code(&mut self, code: &CodeAttribute) {
        self.writeln(&format!(
            "Code: max_stack={}, max_locals={}",
            code.max_stack, code.max_locals
        ));
        self.indent_level += 1;
        for line in self.code_lines(&code.code) {
            self.writeln(&line);
        }
        if !code.exception_table.is_empty() {
            self.writeln("exception table:");
            self.indent_level += 1;
            for entry in &code.exception_table {
                let catch_type = match entry.catch_type {
                    0 => "any".to_string(),
                    index => self.class_ref(index),
                };
                self.writeln(&format!(
                    "{} {} {} {}",
                    entry.start_pc, entry.end_pc, entry.handler_pc, catch_type
                ));
            }
            self.indent_level -= 1;
        }
        self.indent_level -= 1;
    }

    fn render_inner_classes(&mut self, inner: &InnerClassesAttribute) {
        self.writeln("InnerClasses:");
        self.indent_level += 1;
        for class in &inner.classes {
            let outer = match class.outer_class_info_index {
                0 => "-".to_string(),
                index => self.class_ref(index),
            };
            let name = match class.inner_name_index {
                0 => "-".to_string(),
                index => self.utf8(index),
            };
            self.writeln(&format!(
                "{} {} {} flags 0x{:04x}",
                self.class_ref(class.inner_class_info_index),
                outer,
                name,
                class.inner_class_access_flags.bits()
            ));
        }
        self.indent_level -= 1;
    }

    /// One line per instruction; switch cases follow their opcode, indented.
    fn code_lines(&self, code: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut reader = CodeReader { code, pos: 0 };
        while reader.pos < code.len() {
            let offset = reader.pos;
            match self.decode(&mut reader, offset) {
                Some((text, cases)) => {
                    lines.push(format!("{}: {}", offset, text));
                    lines.extend(cases.into_iter().map(|case| format!("{}{}", INDENT, case)));
                }
                None => {
                    lines.push(format!("{}: <malformed>", offset));
                    break;
                }
            }
        }
        lines
    }

    fn decode(&self, reader: &mut CodeReader, offset: usize) -> Option<(String, Vec<String>)> {
        let opcode = reader.u8()?;
        let name = mnemonic(opcode)?;
        let target = |delta: i32| (offset as i64 + i64::from(delta)).to_string();
        let mut cases = Vec::new();
        let operands = match opcode {
            BIPUSH => reader.i8()?.to_string(),
            SIPUSH => reader.i16()?.to_string(),
            LDC => self.pool_operand(u16::from(reader.u8()?)),
            LDC_W | LDC2_W | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                self.pool_operand(reader.u16()?)
            }
            // loads, stores and ret
            ILOAD..=0x19 | ISTORE..=0x3a | 0xa9 => reader.u8()?.to_string(),
            IINC => format!("{}, {}", reader.u8()?, reader.i8()?),
            IFEQ..=0xa8 | IFNULL | IFNONNULL => target(i32::from(reader.i16()?)),
            GOTO_W => target(reader.i32()?),
            INVOKEINTERFACE => {
                let index = reader.u16()?;
                let count = reader.u8()?;
                reader.u8()?;
                format!("{}, {}", self.pool_operand(index), count)
            }
            // invokedynamic
            0xba => {
                let index = reader.u16()?;
                reader.u16()?;
                self.pool_operand(index)
            }
            NEWARRAY => array_type_name(reader.u8()?)?.to_string(),
            MULTIANEWARRAY => {
                let index = reader.u16()?;
                format!("{}, {}", self.pool_operand(index), reader.u8()?)
            }
            WIDE => {
                let inner = reader.u8()?;
                let slot = reader.u16()?;
                match inner {
                    IINC => format!("iinc {}, {}", slot, reader.i16()?),
                    ILOAD..=0x19 | ISTORE..=0x3a | 0xa9 => format!("{} {}", mnemonic(inner)?, slot),
                    _ => return None,
                }
            }
            TABLESWITCH => {
                reader.align();
                let default = reader.i32()?;
                let low = reader.i32()?;
                let high = reader.i32()?;
                if high < low || i64::from(high) - i64::from(low) >= 65536 {
                    return None;
                }
                for key in low..=high {
                    cases.push(format!("{}: {}", key, target(reader.i32()?)));
                }
                cases.push(format!("default: {}", target(default)));
                format!("{} to {}", low, high)
            }
            LOOKUPSWITCH => {
                reader.align();
                let default = reader.i32()?;
                let pairs = reader.i32()?;
                if !(0..65536).contains(&pairs) {
                    return None;
                }
                for _ in 0..pairs {
                    let key = reader.i32()?;
                    cases.push(format!("{}: {}", key, target(reader.i32()?)));
                }
                cases.push(format!("default: {}", target(default)));
                format!("{} pairs", pairs)
            }
            _ => String::new(),
        };
        let text = if operands.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, operands)
        };
        Some((text, cases))
    }

    fn pool_operand(&self, index: u16) -> String {
        format!("#{} // {}", index, self.summary(index))
    }

    fn describe_entry(&self, info: &ConstantInfo) -> String {
        match info {
            ConstantInfo::Utf8(utf8) => format!("Utf8 {}", utf8.text()),
            ConstantInfo::Integer(c) => format!("Integer {}", c.value),
            ConstantInfo::Float(c) => format!("Float {}f", c.value),
            ConstantInfo::Long(c) => format!("Long {}l", c.value),
            ConstantInfo::Double(c) => format!("Double {}d", c.value),
            ConstantInfo::Class(c) => format!("Class #{} // {}", c.name_index, self.utf8(c.name_index)),
            ConstantInfo::String(c) => format!("String #{} // {:?}", c.string_index, self.utf8(c.string_index)),
            ConstantInfo::FieldRef(r) => format!(
                "Fieldref #{}.#{} // {}",
                r.class_index,
                r.name_and_type_index,
                self.member(r.class_index, r.name_and_type_index)
            ),
            ConstantInfo::MethodRef(r) => format!(
                "Methodref #{}.#{} // {}",
                r.class_index,
                r.name_and_type_index,
                self.member(r.class_index, r.name_and_type_index)
            ),
            ConstantInfo::InterfaceMethodRef(r) => format!(
                "InterfaceMethodref #{}.#{} // {}",
                r.class_index,
                r.name_and_type_index,
                self.member(r.class_index, r.name_and_type_index)
            ),
            ConstantInfo::NameAndType(nt) => format!(
                "NameAndType #{}:#{} // {}:{}",
                nt.name_index,
                nt.descriptor_index,
                self.utf8(nt.name_index),
                self.utf8(nt.descriptor_index)
            ),
            ConstantInfo::Unusable => String::new(),
        }
    }

    /// Short form of the entry at `index`, as shown after `//`.
    fn summary(&self, index: u16) -> String {
        match self.class.constant(index) {
            Some(ConstantInfo::Utf8(utf8)) => utf8.text(),
            Some(ConstantInfo::Integer(c)) => c.value.to_string(),
            Some(ConstantInfo::Float(c)) => format!("{}f", c.value),
            Some(ConstantInfo::Long(c)) => format!("{}l", c.value),
            Some(ConstantInfo::Double(c)) => format!("{}d", c.value),
            Some(ConstantInfo::Class(c)) => self.utf8(c.name_index),
            Some(ConstantInfo::String(c)) => format!("{:?}", self.utf8(c.string_index)),
            Some(ConstantInfo::FieldRef(r)) => self.member(r.class_index, r.name_and_type_index),
            Some(ConstantInfo::MethodRef(r)) => self.member(r.class_index, r.name_and_type_index),
            Some(ConstantInfo::InterfaceMethodRef(r)) => self.member(r.class_index, r.name_and_type_index),
            Some(ConstantInfo::NameAndType(nt)) => {
                format!("{}:{}", self.utf8(nt.name_index), self.utf8(nt.descriptor_index))
            }
            Some(ConstantInfo::Unusable) | None => "<invalid>".to_string(),
        }
    }

    fn member(&self, class_index: u16, name_and_type_index: u16) -> String {
        format!("{}.{}", self.class_ref(class_index), self.summary(name_and_type_index))
    }

    fn utf8(&self, index: u16) -> String {
        self.class.utf8(index).unwrap_or_else(|| format!("<#{}>", index))
    }

    fn class_ref(&self, index: u16) -> String {
        self.class.class_name(index).unwrap_or_else(|| format!("<#{}>", index))
    }

    fn writeln(&mut self, text: &str) {
        for _ in 0..self.indent_level {
            self.output.push_str(INDENT);
        }
        self.output.push_str(text);
        self.output.push('\n');
    }
}

fn array_type_name(atype: u8) -> Option<&'static str> {
    Some(match atype {
        4 => "boolean",
        5 => "char",
        6 => "float",
        7 => "double",
        8 => "byte",
        9 => "short",
        10 => "int",
        11 => "long",
        _ => return None,
    })
}

/// Big-endian cursor over method code; every read is bounds checked.
struct CodeReader<'b> {
    code: &'b [u8],
    pos: usize,
}

impl CodeReader<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.code.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn i8(&mut self) -> Option<i8> {
        self.take::<1>().map(i8::from_be_bytes)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_be_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    /// Skip switch padding up to the next multiple of four.
    fn align(&mut self) {
        self.pos = (self.pos + 3) & !3;
    }
}
