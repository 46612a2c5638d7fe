use binrw::binrw;

use super::PoolError;

/// One constant pool record as laid out in the classfile.
///
/// `Unusable` stands in for the slot following a Long or Double; it
/// writes nothing.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[br(pre_assert(false))]
    Unusable,
}

impl ConstantInfo {
    /// Long and Double take two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }
}

/// Utf8 body, stored in the VM's modified UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct Utf8Constant {
    pub length: u16,
    #[br(count = length)]
    pub bytes: Vec<u8>,
}

impl Utf8Constant {
    pub fn new(text: &str) -> Result<Self, PoolError> {
        let bytes = cesu8::to_java_cesu8(text).into_owned();
        let length = u16::try_from(bytes.len()).map_err(|_| PoolError::Utf8TooLong(bytes.len()))?;
        Ok(Utf8Constant { length, bytes })
    }

    /// Decode back to a Rust string; invalid sequences are replaced.
    pub fn text(&self) -> String {
        match cesu8::from_java_cesu8(&self.bytes) {
            Ok(text) => text.into_owned(),
            Err(_) => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}
