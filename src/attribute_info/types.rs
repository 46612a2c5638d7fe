use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult, BinWrite};

/// A raw attribute: name index plus an opaque, already serialized body.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length as usize)]
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(attribute_name_index: u16, info: Vec<u8>) -> Self {
        AttributeInfo {
            attribute_name_index,
            attribute_length: info.len() as u32,
            info,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class entry of the caught type; 0 catches everything.
    pub catch_type: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    #[br(count = code_length as usize)]
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct ExceptionsAttribute {
    pub exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct SignatureAttribute {
    pub signature_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct ConstantValueAttribute {
    pub constantvalue_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct InnerClassesAttribute {
    pub number_of_classes: u16,
    #[br(count = number_of_classes)]
    pub classes: Vec<InnerClassInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct InnerClassInfo {
    pub inner_class_info_index: u16,
    /// 0 when the inner class is local or anonymous.
    pub outer_class_info_index: u16,
    /// 0 when the inner class is anonymous.
    pub inner_name_index: u16,
    pub inner_class_access_flags: InnerClassAccessFlags,
}

/// Flags of a nested class as recorded in its outer class, which may
/// differ from the nested class's own header flags.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[binrw]
pub struct InnerClassAccessFlags(u16);

bitflags! {
    impl InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

macro_rules! attribute_body {
    ($($body:ty),* $(,)?) => {
        $(
            impl $body {
                /// Serialize this body so it can be wrapped in an [`AttributeInfo`].
                pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
                    let mut cursor = Cursor::new(Vec::new());
                    self.write(&mut cursor)?;
                    Ok(cursor.into_inner())
                }

                /// Decode this body from the `info` of an [`AttributeInfo`].
                /// Bytes left over after the body are an error.
                pub fn from_bytes(info: &[u8]) -> BinResult<Self> {
                    let mut cursor = Cursor::new(info);
                    let body = Self::read(&mut cursor)?;
                    let pos = cursor.position();
                    if pos != info.len() as u64 {
                        return Err(binrw::Error::AssertFail {
                            pos,
                            message: format!("{} trailing bytes", info.len() as u64 - pos),
                        });
                    }
                    Ok(body)
                }
            }
        )*
    };
}

attribute_body!(
    CodeAttribute,
    ExceptionsAttribute,
    SignatureAttribute,
    SourceFileAttribute,
    ConstantValueAttribute,
    InnerClassesAttribute,
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_code_body_round_trip() {
        let body = CodeAttribute {
            max_stack: 2,
            max_locals: 1,
            code_length: 2,
            code: vec![0x04, 0xac],
            exception_table_length: 1,
            exception_table: vec![ExceptionEntry {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: 0,
            }],
            attributes_count: 0,
            attributes: Vec::new(),
        };
        let bytes = body.to_bytes().unwrap();
        assert_eq!(CodeAttribute::from_bytes(&bytes).unwrap(), body);
    }

    #[test]
    fn test_truncated_body_fails() {
        assert!(CodeAttribute::from_bytes(&[0x00, 0x01, 0x00]).is_err());
        assert!(ExceptionsAttribute::from_bytes(&[0x00, 0x02, 0x00, 0x05]).is_err());
    }

    #[test]
    fn test_trailing_bytes_fail() {
        assert_eq!(
            SourceFileAttribute::from_bytes(&[0x00, 0x07]).unwrap(),
            SourceFileAttribute { sourcefile_index: 7 }
        );
        assert!(SourceFileAttribute::from_bytes(&[0x00, 0x07, 0x00]).is_err());
    }
}
