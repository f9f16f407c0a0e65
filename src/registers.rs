//! The register bank and its aliasing rules.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

use crate::error::ExecError;
use crate::memory::STACK_TOP;
use crate::utils::closest_match;

/// Address at which the first instruction of the history is placed.
pub const PROGRAM_BASE: u32 = 0x1000;

/// Zero flag bit of the FLAGS register.
pub const ZF: u32 = 0x40;

/// Sign flag bit of the FLAGS register.
pub const SF: u32 = 0x80;

/// Overflow flag bit of the FLAGS register.
pub const OF: u32 = 0x800;

/// One 32-bit storage cell of the register bank.
///
/// Every [Register] is a view into exactly one cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    A,
    B,
    C,
    D,
    Si,
    Di,
    Sp,
    Bp,
    Cs,
    Ds,
    Ss,
    Es,
    Ip,
    Flags,
}

impl Cell {
    const COUNT: usize = 14;

    fn index(self) -> usize {
        self as usize
    }
}

/// The bits of a [Cell] a register name refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum View {
    /// All 32 bits.
    Full,

    /// Bits `[15:0]`.
    Low16,

    /// Bits `[15:8]`.
    High8,

    /// Bits `[7:0]`.
    Low8,
}

impl View {
    fn mask(self) -> u32 {
        match self {
            View::Full => 0xFFFF_FFFF,
            View::Low16 => 0x0000_FFFF,
            View::High8 => 0x0000_FF00,
            View::Low8 => 0x0000_00FF,
        }
    }

    fn shift(self) -> u32 {
        match self {
            View::High8 => 8,
            _ => 0,
        }
    }

    fn extract(self, cell: u32) -> u32 {
        (cell & self.mask()) >> self.shift()
    }

    fn merge(self, cell: u32, value: u32) -> u32 {
        (cell & !self.mask()) | ((value << self.shift()) & self.mask())
    }
}

macro_rules! registers {
    ( $( $variant:ident => $name:literal, $cell:ident, $view:ident; )* ) => {
        /// Every register name the bank knows about.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Register {
            $( $variant, )*
        }

        impl Register {
            /// All registers in display order.
            pub const ALL: &'static [Register] = &[ $( Register::$variant, )* ];

            /// The canonical upper-case name of the register.
            pub fn name(self) -> &'static str {
                match self {
                    $( Register::$variant => $name, )*
                }
            }

            /// The storage cell this register is a view into.
            pub fn cell(self) -> Cell {
                match self {
                    $( Register::$variant => Cell::$cell, )*
                }
            }

            /// Which bits of the storage cell this register covers.
            pub fn view(self) -> View {
                match self {
                    $( Register::$variant => View::$view, )*
                }
            }
        }
    };
}

registers! {
    EAX => "EAX", A, Full;
    EBX => "EBX", B, Full;
    ECX => "ECX", C, Full;
    EDX => "EDX", D, Full;
    ESI => "ESI", Si, Full;
    EDI => "EDI", Di, Full;
    ESP => "ESP", Sp, Full;
    EBP => "EBP", Bp, Full;

    AX => "AX", A, Low16;
    BX => "BX", B, Low16;
    CX => "CX", C, Low16;
    DX => "DX", D, Low16;
    SI => "SI", Si, Low16;
    DI => "DI", Di, Low16;
    SP => "SP", Sp, Low16;
    BP => "BP", Bp, Low16;

    AH => "AH", A, High8;
    AL => "AL", A, Low8;
    BH => "BH", B, High8;
    BL => "BL", B, Low8;
    CH => "CH", C, High8;
    CL => "CL", C, Low8;
    DH => "DH", D, High8;
    DL => "DL", D, Low8;

    CS => "CS", Cs, Low16;
    DS => "DS", Ds, Low16;
    SS => "SS", Ss, Low16;
    ES => "ES", Es, Low16;

    EIP => "EIP", Ip, Full;
    FLAGS => "FLAGS", Flags, Full;
}

lazy_static! {
    static ref REGISTERS_BY_NAME: HashMap<&'static str, Register> = Register::ALL
        .iter()
        .map(|reg| (reg.name(), *reg))
        .collect();
}

impl Register {
    /// True for the eight 8-bit registers `AH`, `AL`, ..., `DL`.
    pub fn is_byte(self) -> bool {
        match self.view() {
            View::High8 | View::Low8 => true,
            _ => false,
        }
    }

    /// Looks up a register by name, ignoring case.
    pub fn lookup(name: &str) -> Option<Register> {
        REGISTERS_BY_NAME.get(name.to_uppercase().as_str()).copied()
    }
}

impl FromStr for Register {
    type Err = ExecError;

    fn from_str(name: &str) -> Result<Register, ExecError> {
        Register::lookup(name).ok_or_else(|| ExecError::UnknownRegister {
            name: name.to_uppercase(),
            suggestion: closest_match(name, Register::ALL.iter().map(|r| r.name()), 1),
        })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Storage for all registers.
///
/// Only the fourteen 32-bit cells are stored. Every alias is computed from its cell when it
/// is read and merged into its cell when it is written, so the views can never disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterBank {
    cells: [u32; Cell::COUNT],
}

impl Default for RegisterBank {
    fn default() -> RegisterBank {
        RegisterBank::new()
    }
}

impl RegisterBank {
    /// Creates a register bank in its power-on state: everything zero except `ESP`, which
    /// points at the stack top, and `EIP`, which points at the program base.
    pub fn new() -> RegisterBank {
        let mut bank = RegisterBank { cells: [0; Cell::COUNT] };
        bank.reset();
        bank
    }

    /// Returns the bank to its power-on state.
    pub fn reset(&mut self) {
        self.cells = [0; Cell::COUNT];
        self.cells[Cell::Sp.index()] = STACK_TOP;
        self.cells[Cell::Ip.index()] = PROGRAM_BASE;
    }

    /// Zeroes every cell except the instruction pointer.
    pub fn clear(&mut self) {
        let eip = self.eip();
        self.cells = [0; Cell::COUNT];
        self.cells[Cell::Ip.index()] = eip;
    }

    pub fn get(&self, register: Register) -> u32 {
        register.view().extract(self.cells[register.cell().index()])
    }

    /// Writes `value` into `register`.
    ///
    /// Bits of `value` that do not fit into the register are dropped. The other views of the
    /// same cell observe the change immediately.
    pub fn set(&mut self, register: Register, value: u32) {
        let cell = &mut self.cells[register.cell().index()];
        *cell = register.view().merge(*cell, value);
    }

    /// Looks up a register by name and returns its value.
    pub fn get_by_name(&self, name: &str) -> Result<u32, ExecError> {
        Ok(self.get(name.parse()?))
    }

    /// Looks up a register by name and writes `value` into it.
    pub fn set_by_name(&mut self, name: &str, value: u32) -> Result<(), ExecError> {
        self.set(name.parse()?, value);
        Ok(())
    }

    /// Snapshot of every register in display order.
    pub fn all(&self) -> Vec<(Register, u32)> {
        Register::ALL
            .iter()
            .map(|reg| (*reg, self.get(*reg)))
            .collect()
    }

    pub fn eip(&self) -> u32 {
        self.get(Register::EIP)
    }

    pub fn esp(&self) -> u32 {
        self.get(Register::ESP)
    }

    pub fn flags(&self) -> u32 {
        self.get(Register::FLAGS)
    }

    pub fn flag(&self, flag: u32) -> bool {
        self.flags() & flag != 0
    }
}

#[test]
fn test_full_write_updates_aliases() {
    let groups = [
        (Register::EAX, Register::AX, Register::AH, Register::AL),
        (Register::EBX, Register::BX, Register::BH, Register::BL),
        (Register::ECX, Register::CX, Register::CH, Register::CL),
        (Register::EDX, Register::DX, Register::DH, Register::DL),
    ];

    for &(full, word, high, low) in groups.iter() {
        let mut bank = RegisterBank::new();
        bank.set(full, 0x1234_5678);

        assert_eq!(bank.get(full), 0x1234_5678);
        assert_eq!(bank.get(word), 0x5678);
        assert_eq!(bank.get(high), 0x56);
        assert_eq!(bank.get(low), 0x78);
    }
}

#[test]
fn test_sub_register_write_only_touches_its_bits() {
    let mut bank = RegisterBank::new();
    bank.set(Register::ECX, 0xAABB_CCDD);

    bank.set(Register::CL, 0x11);
    assert_eq!(bank.get(Register::ECX), 0xAABB_CC11);

    bank.set(Register::CH, 0x22);
    assert_eq!(bank.get(Register::ECX), 0xAABB_2211);
    assert_eq!(bank.get(Register::CX), 0x2211);

    bank.set(Register::CX, 0x1_FFFF);
    assert_eq!(bank.get(Register::ECX), 0xAABB_FFFF);
    assert_eq!(bank.get(Register::CH), 0xFF);
}

#[test]
fn test_pointer_and_index_aliases() {
    let mut bank = RegisterBank::new();
    assert_eq!(bank.get(Register::SP), STACK_TOP & 0xFFFF);

    bank.set(Register::SI, 0xBEEF);
    bank.set(Register::EDI, 0xDEAD_0001);

    assert_eq!(bank.get(Register::ESI), 0xBEEF);
    assert_eq!(bank.get(Register::DI), 0x0001);
}

#[test]
fn test_control_registers_are_verbatim() {
    let mut bank = RegisterBank::new();
    bank.set(Register::FLAGS, 0xFFFF_FFFF);
    bank.set(Register::EIP, 0x8000_0004);

    assert_eq!(bank.flags(), 0xFFFF_FFFF);
    assert_eq!(bank.eip(), 0x8000_0004);
}

#[test]
fn test_segment_registers_are_16_bits() {
    let mut bank = RegisterBank::new();
    bank.set(Register::DS, 0x12_3456);
    assert_eq!(bank.get(Register::DS), 0x3456);
}

#[test]
fn test_lookup_is_case_insensitive() {
    assert_eq!("eax".parse::<Register>(), Ok(Register::EAX));
    assert_eq!("Al".parse::<Register>(), Ok(Register::AL));
    assert_eq!("flags".parse::<Register>(), Ok(Register::FLAGS));

    match "eaz".parse::<Register>() {
        Err(ExecError::UnknownRegister { name, suggestion }) => {
            assert_eq!(name, "EAZ");
            assert!(suggestion.is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_power_on_state() {
    let bank = RegisterBank::new();

    for (reg, value) in bank.all() {
        match reg.cell() {
            Cell::Sp | Cell::Ip => assert_ne!(value, 0, "{}", reg),
            _ => assert_eq!(value, 0, "{}", reg),
        }
    }

    assert_eq!(bank.esp(), STACK_TOP);
    assert_eq!(bank.eip(), PROGRAM_BASE);
}

#[test]
fn test_clear_keeps_instruction_pointer() {
    let mut bank = RegisterBank::new();
    bank.set(Register::EAX, 7);
    bank.set(Register::EIP, 0x1010);
    bank.set(Register::FLAGS, 0x40);

    bank.clear();

    assert_eq!(bank.get(Register::EAX), 0);
    assert_eq!(bank.esp(), 0);
    assert_eq!(bank.flags(), 0);
    assert_eq!(bank.eip(), 0x1010);
}

#[test]
fn test_access_by_name() {
    let mut bank = RegisterBank::new();

    bank.set_by_name("ax", 0xBEEF).unwrap();
    assert_eq!(bank.get_by_name("EAX"), Ok(0xBEEF));
    assert_eq!(bank.get_by_name("ah"), Ok(0xBE));

    assert_eq!(
        bank.set_by_name("EAXX", 1),
        Err(ExecError::UnknownRegister { name: "EAXX".into(), suggestion: Some("EAX") }),
    );
    assert_eq!(
        bank.get_by_name("R1"),
        Err(ExecError::UnknownRegister { name: "R1".into(), suggestion: None }),
    );
    assert_eq!(bank.get(Register::EAX), 0xBEEF);
}
