use std::io::Cursor;

use crate::attribute_info::AttributeInfo;
use crate::constant_info::{const_pool_parser, ConstantInfo};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

use binrw::{binrw, BinResult, BinWrite};

/// The binary classfile record. Counts are stored explicitly so the
/// record written is exactly the record read back by [`crate::class_parser`].
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = const_pool_parser, args(const_pool_size))]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Entry at a 1-based pool index; `None` for index 0 and out of range.
    pub fn constant(&self, index: u16) -> Option<&ConstantInfo> {
        let index = usize::from(index);
        if index == 0 {
            return None;
        }
        self.const_pool.get(index - 1)
    }

    /// Text of the Utf8 entry at `index`.
    pub fn utf8(&self, index: u16) -> Option<String> {
        match self.constant(index)? {
            ConstantInfo::Utf8(utf8) => Some(utf8.text()),
            _ => None,
        }
    }

    /// Internal name behind the Class entry at `index`.
    pub fn class_name(&self, index: u16) -> Option<String> {
        match self.constant(index)? {
            ConstantInfo::Class(class) => self.utf8(class.name_index),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[binrw]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        /// Always set by the builder; selects modern `invokespecial` lookup.
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}
