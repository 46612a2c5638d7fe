use binrw::{BinRead, BinResult};

use super::types::*;

/// Read `const_pool_size - 1` slots worth of entries. The slot after each
/// Long/Double is filled with `ConstantInfo::Unusable`.
#[binrw::parser(reader, endian)]
pub fn const_pool_parser(const_pool_size: u16) -> BinResult<Vec<ConstantInfo>> {
    let slots = usize::from(const_pool_size.saturating_sub(1));
    let mut pool = Vec::with_capacity(slots);
    while pool.len() < slots {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        pool.push(entry);
        if wide {
            pool.push(ConstantInfo::Unusable);
        }
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::Endian;
    use std::io::Cursor;

    fn read_pool(bytes: &[u8], size: u16) -> BinResult<Vec<ConstantInfo>> {
        const_pool_parser(&mut Cursor::new(bytes), Endian::Big, (size,))
    }

    #[test]
    fn test_wide_entry_fills_next_slot() {
        let bytes = [0x05, 0, 0, 0, 0, 0, 0, 0, 0x2a, 0x03, 0, 0, 0, 0x07];
        let pool = read_pool(&bytes, 4).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(matches!(pool[0], ConstantInfo::Long(LongConstant { value: 42 })));
        assert!(matches!(pool[1], ConstantInfo::Unusable));
        assert!(matches!(pool[2], ConstantInfo::Integer(IntegerConstant { value: 7 })));
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        assert!(read_pool(&[0x02, 0x00, 0x00], 2).is_err());
    }
}
