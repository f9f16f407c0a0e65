//! Byte addressable memory.

use std::collections::BTreeMap;

/// Initial value of `ESP`. The first `PUSH` writes just below this address.
pub const STACK_TOP: u32 = 0xFFFF_FFF0;

/// Lowest address the stack may grow to.
pub const STACK_BASE: u32 = 0xFF00_0000;

/// Trait for implementing the memory of the emulated machine.
///
/// Memory is total: every address can be read, and addresses that were never written read
/// as zero. Word accesses are little-endian and wrap around at the end of the address space.
pub trait Memory {
    /// Returns the byte stored at `addr`, or zero if nothing is stored there.
    fn read_byte(&self, addr: u32) -> u8;

    /// Stores `value` at `addr`.
    fn write_byte(&mut self, addr: u32, value: u8);

    /// Forgets the byte stored at `addr`, so that it reads as zero again.
    fn erase(&mut self, addr: u32);

    /// Forgets every stored byte.
    fn clear(&mut self);

    /// All bytes that have been written, ordered by address.
    fn snapshot(&self) -> BTreeMap<u32, u8>;

    /// Reads the little-endian word at `addr..addr+4`.
    fn read_word(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_byte(addr.wrapping_add(i as u32));
        }

        u32::from_le_bytes(bytes)
    }

    /// Writes `value` as a little-endian word to `addr..addr+4`.
    fn write_word(&mut self, addr: u32, value: u32) {
        for (i, byte) in value.to_le_bytes().iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), *byte);
        }
    }

    /// Writes the bytes of `text` starting at `addr`, followed by a zero terminator.
    ///
    /// # Returns
    /// The number of bytes written, terminator included.
    fn write_text(&mut self, addr: u32, text: &str) -> usize {
        let mut offset: u32 = 0;

        for byte in text.bytes() {
            self.write_byte(addr.wrapping_add(offset), byte);
            offset += 1;
        }

        self.write_byte(addr.wrapping_add(offset), 0);

        offset as usize + 1
    }

    /// Reads `len` consecutive bytes starting at `addr`.
    fn preview(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| self.read_byte(addr.wrapping_add(i)))
            .collect()
    }
}

/// A [Memory] that only stores the bytes that have been written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SparseMemory {
    bytes: BTreeMap<u32, u8>,
}

impl SparseMemory {
    pub fn new() -> SparseMemory {
        SparseMemory::default()
    }

    /// Number of bytes currently stored.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True if a byte has been written to `addr` and not erased since.
    pub fn contains(&self, addr: u32) -> bool {
        self.bytes.contains_key(&addr)
    }
}

impl Memory for SparseMemory {
    fn read_byte(&self, addr: u32) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }

    fn write_byte(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }

    fn erase(&mut self, addr: u32) {
        self.bytes.remove(&addr);
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }

    fn snapshot(&self) -> BTreeMap<u32, u8> {
        self.bytes.clone()
    }
}

#[test]
fn test_unwritten_memory_reads_zero() {
    let memory = SparseMemory::new();

    assert_eq!(memory.read_byte(0x1234), 0);
    assert_eq!(memory.read_word(0xFFFF_FFFE), 0);
    assert!(memory.is_empty());
}

#[test]
fn test_word_is_little_endian() {
    let mut memory = SparseMemory::new();
    memory.write_word(0x100, 0x1122_3344);

    assert_eq!(memory.read_byte(0x100), 0x44);
    assert_eq!(memory.read_byte(0x101), 0x33);
    assert_eq!(memory.read_byte(0x102), 0x22);
    assert_eq!(memory.read_byte(0x103), 0x11);
    assert_eq!(memory.read_word(0x100), 0x1122_3344);
    assert_eq!(memory.read_word(0x101), 0x0011_2233);
}

#[test]
fn test_word_wraps_around_address_space() {
    let mut memory = SparseMemory::new();
    memory.write_word(0xFFFF_FFFE, 0xAABB_CCDD);

    assert_eq!(memory.read_byte(0xFFFF_FFFE), 0xDD);
    assert_eq!(memory.read_byte(0xFFFF_FFFF), 0xCC);
    assert_eq!(memory.read_byte(0x0000_0000), 0xBB);
    assert_eq!(memory.read_byte(0x0000_0001), 0xAA);
    assert_eq!(memory.read_word(0xFFFF_FFFE), 0xAABB_CCDD);
}

#[test]
fn test_erase_and_clear() {
    let mut memory = SparseMemory::new();
    memory.write_word(0x10, 0xFFFF_FFFF);

    memory.erase(0x11);
    assert!(!memory.contains(0x11));
    assert_eq!(memory.read_word(0x10), 0xFFFF_00FF);

    memory.clear();
    assert!(memory.is_empty());
}

#[test]
fn test_write_text_terminates() {
    let mut memory = SparseMemory::new();
    memory.write_byte(0x203, 0x7F);

    let written = memory.write_text(0x200, "Hi!");

    assert_eq!(written, 4);
    assert_eq!(memory.preview(0x200, 5), vec![b'H', b'i', b'!', 0, 0]);
    assert!(memory.contains(0x203));
    assert!(!memory.contains(0x204));
}
