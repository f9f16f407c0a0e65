//! Classification and resolution of instruction operands.
//!
//! An operand is one whitespace-delimited word of an instruction line. It is either
//! - a register name (`EAX`, `al`, ...),
//! - a hexadecimal immediate (`1F`, `0x1000`), or
//! - a memory reference in brackets (`[EBX]`, `[EBP-8]`, `[ESI+10]`, `[2000]`).
//!
//! Resolution never modifies the emulator state.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, one_of},
    combinator::{all_consuming, opt},
    sequence::{delimited, pair},
};

use crate::error::{ExecError, HexError};
use crate::registers::{Register, RegisterBank};

/// Parses an unsigned base-16 number with an optional `0x` prefix.
pub fn parse_hex(token: &str) -> Result<u32, HexError> {
    let digits = if token.starts_with("0x") || token.starts_with("0X") {
        &token[2..]
    } else {
        token
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HexError::NotHex);
    }

    u32::from_str_radix(digits, 16).map_err(|_| HexError::OutOfRange)
}

/// Like [parse_hex], but reports failures as [ExecError::InvalidImmediate].
pub fn parse_immediate(token: &str) -> Result<u32, ExecError> {
    parse_hex(token).map_err(|reason| ExecError::InvalidImmediate {
        token: token.to_string(),
        reason,
    })
}

/// Direction of the offset in a `[REG±HEX]` reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

/// Syntactic form of a bracketed memory reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryReference {
    /// `[HEX]`
    Absolute(u32),

    /// `[REG]`, `[REG+HEX]` or `[REG-HEX]`
    Relative {
        base: Register,
        sign: Sign,
        offset: u32,
    },
}

impl MemoryReference {
    /// Computes the effective address against the current register values.
    pub fn effective_address(&self, registers: &RegisterBank) -> u32 {
        match *self {
            MemoryReference::Absolute(addr) => addr,
            MemoryReference::Relative { base, sign: Sign::Plus, offset } =>
                registers.get(base).wrapping_add(offset),
            MemoryReference::Relative { base, sign: Sign::Minus, offset } =>
                registers.get(base).wrapping_sub(offset),
        }
    }
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

fn bracketed(input: &str) -> IResult<&str, (&str, Option<(char, &str)>)> {
    all_consuming(delimited(
        char('['),
        pair(word, opt(pair(one_of("+-"), word))),
        char(']'),
    ))(input)
}

/// Parses a bracketed memory reference.
///
/// A register name inside the brackets takes precedence over a hex literal. An offset is only
/// allowed after a register.
pub fn parse_memory_reference(token: &str) -> Result<MemoryReference, ExecError> {
    let invalid = || ExecError::InvalidAddressSyntax { token: token.to_string() };

    let (_, (inner, offset)) = bracketed(token).map_err(|_| invalid())?;

    match (Register::lookup(inner), offset) {
        (Some(base), None) => Ok(MemoryReference::Relative {
            base,
            sign: Sign::Plus,
            offset: 0,
        }),
        (Some(base), Some((sign, offset))) => Ok(MemoryReference::Relative {
            base,
            sign: if sign == '-' { Sign::Minus } else { Sign::Plus },
            offset: parse_hex(offset).map_err(|_| invalid())?,
        }),
        (None, None) => parse_hex(inner)
            .map(MemoryReference::Absolute)
            .map_err(|_| invalid()),
        (None, Some(_)) => Err(invalid()),
    }
}

/// A classified operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Immediate(u32),
    Memory(MemoryReference),
}

impl Operand {
    /// Classifies `token`.
    ///
    /// Register names win over hex literals, bracketed words are memory references and
    /// everything else must be a valid immediate.
    pub fn parse(token: &str) -> Result<Operand, ExecError> {
        if token.starts_with('[') {
            return parse_memory_reference(token).map(Operand::Memory);
        }

        if let Some(register) = Register::lookup(token) {
            return Ok(Operand::Register(register));
        }

        parse_immediate(token).map(Operand::Immediate)
    }

    /// Classifies a token that has to name a place that can be written to.
    ///
    /// Unlike [Operand::parse], a bare word that is not a register is reported as an unknown
    /// register instead of an invalid immediate.
    pub fn parse_destination(token: &str) -> Result<Operand, ExecError> {
        if token.starts_with('[') {
            return parse_memory_reference(token).map(Operand::Memory);
        }

        token.parse().map(Operand::Register)
    }

    /// Resolves the operand against the register bank.
    pub fn resolve(&self, registers: &RegisterBank) -> Resolved {
        match self {
            Operand::Register(reg) => Resolved::Register(*reg),
            Operand::Immediate(value) => Resolved::Immediate(*value),
            Operand::Memory(reference) => Resolved::Address(reference.effective_address(registers)),
        }
    }
}

/// An operand after effective address computation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    Register(Register),
    Immediate(u32),
    Address(u32),
}

#[test]
fn test_parse_hex() {
    assert_eq!(parse_hex("1F"), Ok(0x1F));
    assert_eq!(parse_hex("ff"), Ok(0xFF));
    assert_eq!(parse_hex("0x1000"), Ok(0x1000));
    assert_eq!(parse_hex("FFFFFFFF"), Ok(0xFFFF_FFFF));
    assert_eq!(parse_hex("100000000"), Err(HexError::OutOfRange));
    assert_eq!(parse_hex("12zz"), Err(HexError::NotHex));
    assert_eq!(parse_hex("-5"), Err(HexError::NotHex));
    assert_eq!(parse_hex(""), Err(HexError::NotHex));
    assert_eq!(parse_hex("0x"), Err(HexError::NotHex));
}

#[test]
fn test_classify_operands() {
    assert_eq!(Operand::parse("ebx"), Ok(Operand::Register(Register::EBX)));
    assert_eq!(Operand::parse("2A"), Ok(Operand::Immediate(0x2A)));
    assert_eq!(
        Operand::parse("[2000]"),
        Ok(Operand::Memory(MemoryReference::Absolute(0x2000))),
    );

    match Operand::parse("foo") {
        Err(ExecError::InvalidImmediate { reason: HexError::NotHex, .. }) => (),
        other => panic!("unexpected {:?}", other),
    }

    match Operand::parse_destination("foo") {
        Err(ExecError::UnknownRegister { .. }) => (),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_memory_reference_forms() {
    assert_eq!(
        parse_memory_reference("[esi+10]"),
        Ok(MemoryReference::Relative { base: Register::ESI, sign: Sign::Plus, offset: 0x10 }),
    );
    assert_eq!(
        parse_memory_reference("[EBP-8]"),
        Ok(MemoryReference::Relative { base: Register::EBP, sign: Sign::Minus, offset: 8 }),
    );
    assert_eq!(
        parse_memory_reference("[EBX]"),
        Ok(MemoryReference::Relative { base: Register::EBX, sign: Sign::Plus, offset: 0 }),
    );

    for bad in &["[]", "[EAX", "EAX]", "[EAX+]", "[EAX+G]", "[FOO]", "[FOO+4]", "[EAX]x", "[EAX*2]"] {
        match parse_memory_reference(bad) {
            Err(ExecError::InvalidAddressSyntax { .. }) => (),
            other => panic!("{} gave {:?}", bad, other),
        }
    }
}

#[test]
fn test_effective_address_wraps() {
    let mut registers = RegisterBank::new();
    registers.set(Register::EBX, 4);

    let below = parse_memory_reference("[EBX-8]").unwrap();
    assert_eq!(below.effective_address(&registers), 0xFFFF_FFFC);

    registers.set(Register::EBX, 0xFFFF_FFFF);
    let above = parse_memory_reference("[EBX+2]").unwrap();
    assert_eq!(above.effective_address(&registers), 1);
}
