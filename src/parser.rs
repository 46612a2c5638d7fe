use std::io::Cursor;

use binrw::{BinRead, BinResult};

use crate::types::ClassFile;

/// Decode a complete classfile, returning the bytes that follow it.
pub fn class_parser(input: &[u8]) -> BinResult<(&[u8], ClassFile)> {
    let mut cursor = Cursor::new(input);
    let class = ClassFile::read(&mut cursor)?;
    let consumed = cursor.position() as usize;
    Ok((&input[consumed..], class))
}
