//! Error types for instruction parsing and execution.
//!
//! None of these errors are fatal. The [Emulator](crate::emulator::Emulator) catches every
//! one of them at the instruction boundary and turns it into a status line.

use std::fmt::{self, Display};

/// Reason why a token could not be read as a base-16 number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HexError {
    /// The token is empty or contains a character that is not a hex digit.
    NotHex,

    /// The token is valid hex but does not fit into 32 bits.
    OutOfRange,
}

impl Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HexError::NotHex => write!(f, "not a hexadecimal number"),
            HexError::OutOfRange => write!(f, "does not fit in 32 bits"),
        }
    }
}

/// Error produced while resolving or executing a single instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// The name is not one of the registers of the register bank.
    UnknownRegister {
        name: String,
        /// Closest known register name, if one is close enough to be a likely typo.
        suggestion: Option<&'static str>,
    },

    /// An immediate or address operand is not a valid hex literal.
    InvalidImmediate {
        token: String,
        reason: HexError,
    },

    /// A memory reference operand is malformed.
    InvalidAddressSyntax {
        token: String,
    },

    /// The instruction needs an operand which was not given.
    MissingOperand {
        /// Human readable name of the missing operand, eg. `"source"`.
        operand: &'static str,
    },

    /// A byte-sized instruction was given a value larger than `0xFF`.
    ByteOverflow {
        value: u32,
    },

    /// A byte-sized instruction was given a register that is not one of the 8-bit registers.
    NotByteRegister {
        name: String,
    },

    /// The operand kinds are not a supported combination for the instruction.
    UnsupportedOperands {
        detail: &'static str,
    },

    /// `PUSH` with the stack pointer at or below the stack base.
    StackUnderflow {
        esp: u32,
    },

    /// `POP` with nothing left between the stack pointer and the stack top.
    StackOverflow {
        esp: u32,
    },

    /// `CLEAR` was given a subsystem it does not know.
    InvalidClearTarget {
        target: String,
    },

    /// The first word of the line is not a known opcode.
    UnknownOpcode {
        word: String,
    },

    /// `RUN` with an empty history.
    NoHistory,

    /// A replay executed more steps than the configured bound.
    StepLimitExceeded {
        limit: usize,
    },
}

impl Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::UnknownRegister { name, suggestion: Some(s) } =>
                write!(f, "unknown register '{}' (did you mean {}?)", name, s),
            ExecError::UnknownRegister { name, suggestion: None } =>
                write!(f, "unknown register '{}'", name),
            ExecError::InvalidImmediate { token, reason } =>
                write!(f, "invalid value '{}': {}", token, reason),
            ExecError::InvalidAddressSyntax { token } =>
                write!(f, "invalid memory address '{}'", token),
            ExecError::MissingOperand { operand } =>
                write!(f, "missing {}", operand),
            ExecError::ByteOverflow { value } =>
                write!(f, "value {:X} exceeds byte size", value),
            ExecError::NotByteRegister { name } =>
                write!(f, "{} is not a byte register", name),
            ExecError::UnsupportedOperands { detail } =>
                write!(f, "unsupported operands: {}", detail),
            ExecError::StackUnderflow { esp } =>
                write!(f, "ESP={:08X} <= STACK_BASE", esp),
            ExecError::StackOverflow { esp } =>
                write!(f, "ESP={:08X}, stack empty", esp),
            ExecError::InvalidClearTarget { target } =>
                write!(f, "unknown target '{}', expected ALL, REGS, STACK or HISTORY", target),
            ExecError::UnknownOpcode { word } =>
                write!(f, "unknown opcode '{}'", word),
            ExecError::NoHistory =>
                write!(f, "no history"),
            ExecError::StepLimitExceeded { limit } =>
                write!(f, "step limit of {} exceeded", limit),
        }
    }
}

impl std::error::Error for ExecError {}
