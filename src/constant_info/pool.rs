use std::hash::{Hash, Hasher};

use log::trace;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::types::*;
use crate::descriptor::{class_entry_name, Type};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum PoolError {
    #[error("constant pool overflow: index {0} exceeds 65534")]
    Overflow(u32),
    #[error("constant pool has no entry for {0}")]
    Missing(PoolEntry),
    #[error("utf8 constant too long ({0} bytes)")]
    Utf8TooLong(usize),
}

/// A field or method reference: owner class, member name and erased descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Class entry name of the owner (internal name, or array descriptor).
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MemberRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// A pool entry identified by its content rather than by indices.
///
/// Equality and hashing are structural; floating values compare by bit
/// pattern so `-0.0` and `0.0` stay distinct and NaN deduplicates.
#[derive(Clone, Debug)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    FieldRef(MemberRef),
    MethodRef(MemberRef),
    InterfaceMethodRef(MemberRef),
    NameAndType { name: String, descriptor: String },
}

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        use PoolEntry::*;
        match (self, other) {
            (Utf8(a), Utf8(b)) | (String(a), String(b)) | (Class(a), Class(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (FieldRef(a), FieldRef(b))
            | (MethodRef(a), MethodRef(b))
            | (InterfaceMethodRef(a), InterfaceMethodRef(b)) => a == b,
            (
                NameAndType { name, descriptor },
                NameAndType {
                    name: other_name,
                    descriptor: other_descriptor,
                },
            ) => name == other_name && descriptor == other_descriptor,
            _ => false,
        }
    }
}

impl Eq for PoolEntry {}

impl Hash for PoolEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PoolEntry::Utf8(s) | PoolEntry::String(s) | PoolEntry::Class(s) => s.hash(state),
            PoolEntry::Integer(v) => v.hash(state),
            PoolEntry::Long(v) => v.hash(state),
            PoolEntry::Float(v) => v.to_bits().hash(state),
            PoolEntry::Double(v) => v.to_bits().hash(state),
            PoolEntry::FieldRef(m) | PoolEntry::MethodRef(m) | PoolEntry::InterfaceMethodRef(m) => {
                m.hash(state)
            }
            PoolEntry::NameAndType { name, descriptor } => {
                name.hash(state);
                descriptor.hash(state);
            }
        }
    }
}

impl std::fmt::Display for PoolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolEntry::Utf8(s) => write!(f, "Utf8 {}", s),
            PoolEntry::Integer(v) => write!(f, "Integer {}", v),
            PoolEntry::Float(v) => write!(f, "Float {}f", v),
            PoolEntry::Long(v) => write!(f, "Long {}l", v),
            PoolEntry::Double(v) => write!(f, "Double {}d", v),
            PoolEntry::String(s) => write!(f, "String {:?}", s),
            PoolEntry::Class(name) => write!(f, "Class {}", name),
            PoolEntry::FieldRef(m) => write!(f, "Fieldref {}.{}:{}", m.owner, m.name, m.descriptor),
            PoolEntry::MethodRef(m) => write!(f, "Methodref {}.{}:{}", m.owner, m.name, m.descriptor),
            PoolEntry::InterfaceMethodRef(m) => {
                write!(f, "InterfaceMethodref {}.{}:{}", m.owner, m.name, m.descriptor)
            }
            PoolEntry::NameAndType { name, descriptor } => write!(f, "NameAndType {}:{}", name, descriptor),
        }
    }
}

impl PoolEntry {
    pub fn utf8(text: &str) -> Self {
        PoolEntry::Utf8(text.to_string())
    }

    /// Class entry for a type: arrays keep their descriptor, other
    /// reference types use the internal name.
    pub fn class_for(ty: &Type) -> Self {
        PoolEntry::Class(class_entry_name(ty))
    }

    pub fn name_and_type(name: &str, descriptor: &str) -> Self {
        PoolEntry::NameAndType {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Number of pool slots this entry occupies.
    pub fn width(&self) -> u16 {
        match self {
            PoolEntry::Long(_) | PoolEntry::Double(_) => 2,
            _ => 1,
        }
    }

    /// Entries this one refers to, in registration order.
    pub fn children(&self) -> Vec<PoolEntry> {
        match self {
            PoolEntry::String(s) | PoolEntry::Class(s) => vec![PoolEntry::Utf8(s.clone())],
            PoolEntry::NameAndType { name, descriptor } => {
                vec![PoolEntry::Utf8(name.clone()), PoolEntry::Utf8(descriptor.clone())]
            }
            PoolEntry::FieldRef(m) | PoolEntry::MethodRef(m) | PoolEntry::InterfaceMethodRef(m) => vec![
                PoolEntry::Class(m.owner.clone()),
                PoolEntry::name_and_type(&m.name, &m.descriptor),
            ],
            PoolEntry::Utf8(_)
            | PoolEntry::Integer(_)
            | PoolEntry::Float(_)
            | PoolEntry::Long(_)
            | PoolEntry::Double(_) => Vec::new(),
        }
    }
}

/// Deduplicating constant pool under construction.
///
/// Index 0 is reserved; a Long/Double at index `i` also claims `i + 1`.
#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<(u16, PoolEntry)>,
    indices: FxHashMap<PoolEntry, u16>,
    next_index: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool {
            entries: Vec::new(),
            indices: FxHashMap::default(),
            next_index: 1,
        }
    }

    /// Register `entry` (children first) and return its index. A structurally
    /// equal entry that is already present keeps its index.
    pub fn apply(&mut self, entry: PoolEntry) -> Result<u16, PoolError> {
        if let Some(&index) = self.indices.get(&entry) {
            return Ok(index);
        }
        for child in entry.children() {
            self.apply(child)?;
        }
        let index = self.next_index;
        let next = u32::from(index) + u32::from(entry.width());
        if next > u32::from(u16::MAX) {
            return Err(PoolError::Overflow(next - 1));
        }
        trace!("pool #{} = {}", index, entry);
        self.next_index = next as u16;
        self.indices.insert(entry.clone(), index);
        self.entries.push((index, entry));
        Ok(index)
    }

    pub fn add_utf8(&mut self, text: &str) -> Result<u16, PoolError> {
        self.apply(PoolEntry::utf8(text))
    }

    pub fn add_class(&mut self, ty: &Type) -> Result<u16, PoolError> {
        self.apply(PoolEntry::class_for(ty))
    }

    /// Number of registered entries (not slots).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &PoolEntry) -> bool {
        self.indices.contains_key(entry)
    }

    /// Stop accepting entries; the result is read-only.
    pub fn freeze(self) -> FrozenPool {
        FrozenPool {
            entries: self.entries,
            indices: self.indices,
            count: self.next_index,
        }
    }
}

/// The final, read-only pool consulted during emission.
#[derive(Debug)]
pub struct FrozenPool {
    entries: Vec<(u16, PoolEntry)>,
    indices: FxHashMap<PoolEntry, u16>,
    count: u16,
}

impl FrozenPool {
    /// The `constant_pool_count` field: highest index + 1.
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn index_of(&self, entry: &PoolEntry) -> Result<u16, PoolError> {
        self.indices
            .get(entry)
            .copied()
            .ok_or_else(|| PoolError::Missing(entry.clone()))
    }

    pub fn utf8_index(&self, text: &str) -> Result<u16, PoolError> {
        self.index_of(&PoolEntry::utf8(text))
    }

    pub fn class_index(&self, ty: &Type) -> Result<u16, PoolError> {
        self.index_of(&PoolEntry::class_for(ty))
    }

    /// Look up by index. The phantom slot after a Long/Double, and index 0,
    /// are never addressable.
    pub fn get(&self, index: u16) -> Option<&PoolEntry> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Entries in index order.
    pub fn entries(&self) -> impl Iterator<Item = (u16, &PoolEntry)> {
        self.entries.iter().map(|(i, e)| (*i, e))
    }

    /// Lower every entry to its binary record, children resolved to indices.
    pub fn to_constant_info(&self) -> Result<Vec<ConstantInfo>, PoolError> {
        let mut out = Vec::with_capacity(self.count as usize);
        for (_, entry) in &self.entries {
            let info = self.lower(entry)?;
            let wide = info.is_wide();
            out.push(info);
            if wide {
                out.push(ConstantInfo::Unusable);
            }
        }
        Ok(out)
    }

    fn lower(&self, entry: &PoolEntry) -> Result<ConstantInfo, PoolError> {
        Ok(match entry {
            PoolEntry::Utf8(s) => ConstantInfo::Utf8(Utf8Constant::new(s)?),
            PoolEntry::Integer(value) => ConstantInfo::Integer(IntegerConstant { value: *value }),
            PoolEntry::Float(value) => ConstantInfo::Float(FloatConstant { value: *value }),
            PoolEntry::Long(value) => ConstantInfo::Long(LongConstant { value: *value }),
            PoolEntry::Double(value) => ConstantInfo::Double(DoubleConstant { value: *value }),
            PoolEntry::String(s) => ConstantInfo::String(StringConstant {
                string_index: self.utf8_index(s)?,
            }),
            PoolEntry::Class(name) => ConstantInfo::Class(ClassConstant {
                name_index: self.utf8_index(name)?,
            }),
            PoolEntry::NameAndType { name, descriptor } => ConstantInfo::NameAndType(NameAndTypeConstant {
                name_index: self.utf8_index(name)?,
                descriptor_index: self.utf8_index(descriptor)?,
            }),
            PoolEntry::FieldRef(m) => {
                let (class_index, name_and_type_index) = self.member_indices(m)?;
                ConstantInfo::FieldRef(FieldRefConstant {
                    class_index,
                    name_and_type_index,
                })
            }
            PoolEntry::MethodRef(m) => {
                let (class_index, name_and_type_index) = self.member_indices(m)?;
                ConstantInfo::MethodRef(MethodRefConstant {
                    class_index,
                    name_and_type_index,
                })
            }
            PoolEntry::InterfaceMethodRef(m) => {
                let (class_index, name_and_type_index) = self.member_indices(m)?;
                ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                    class_index,
                    name_and_type_index,
                })
            }
        })
    }

    fn member_indices(&self, m: &MemberRef) -> Result<(u16, u16), PoolError> {
        let class_index = self.index_of(&PoolEntry::Class(m.owner.clone()))?;
        let nat_index = self.index_of(&PoolEntry::name_and_type(&m.name, &m.descriptor))?;
        Ok((class_index, nat_index))
    }
}
