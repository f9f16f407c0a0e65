//! types for representing instructions and their parts

use std::fmt;

use crate::registers::{OF, SF, ZF};
use crate::token::split_line;
use crate::utils::closest_match;

/// Describes the predicate of a conditional jump instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JumpCondition {
    /// Jump if the zero flag is set. (`JE`, `JZ`)
    Equal,

    /// Jump if the zero flag is clear. (`JNE`, `JNZ`)
    NotEqual,

    /// Jump if the zero flag is clear and the sign flag equals the overflow flag. (`JG`)
    Greater,

    /// Jump if the sign flag differs from the overflow flag. (`JL`)
    Less,

    /// Jump if the sign flag equals the overflow flag. (`JGE`)
    GreaterOrEqual,

    /// Jump if the zero flag is set or the sign flag differs from the overflow flag. (`JLE`)
    LessOrEqual,
}

impl JumpCondition {
    /// Evaluates the condition against the value of the FLAGS register.
    pub fn holds(self, flags: u32) -> bool {
        let zf = flags & ZF != 0;
        let sf = flags & SF != 0;
        let of = flags & OF != 0;

        match self {
            JumpCondition::Equal => zf,
            JumpCondition::NotEqual => !zf,
            JumpCondition::Greater => !zf && sf == of,
            JumpCondition::Less => sf != of,
            JumpCondition::GreaterOrEqual => sf == of,
            JumpCondition::LessOrEqual => zf || sf != of,
        }
    }
}

/// Instructions understood by the emulator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    /// Copies a 32-bit value between registers, memory and immediates.
    Move,

    /// Copies a single byte.
    MoveByte,

    /// Adds the second operand to the first.
    Add,

    /// Subtracts the second operand from the first.
    Subtract,

    /// Bitwise exclusive or of the two operands, stored into the first.
    Xor,

    /// Subtracts the second operand from the first and only updates the flags.
    Compare,

    /// Pushes a register onto the stack.
    Push,

    /// Pops the top of the stack into a register.
    Pop,

    /// Moves the instruction pointer if the condition holds.
    Jump(JumpCondition),

    /// Replays the history as a program.
    Run,

    /// Resets registers, memory and/or history.
    Clear,

    /// Moves the memory view window.
    MemSet,

    /// Shows a few bytes of memory and moves the memory view window.
    MemView,

    /// Writes a zero terminated string to memory.
    SetText,

    /// Shows the usage text.
    Help,

    /// Asks the caller to stop.
    Quit,

    /// The opcode word was not recognized.
    Unknown,
}

const MNEMONICS: &[(&str, OpCode)] = &[
    ("MOV", OpCode::Move),
    ("MOVB", OpCode::MoveByte),
    ("ADD", OpCode::Add),
    ("SUB", OpCode::Subtract),
    ("XOR", OpCode::Xor),
    ("CMP", OpCode::Compare),
    ("PUSH", OpCode::Push),
    ("POP", OpCode::Pop),
    ("JE", OpCode::Jump(JumpCondition::Equal)),
    ("JZ", OpCode::Jump(JumpCondition::Equal)),
    ("JNE", OpCode::Jump(JumpCondition::NotEqual)),
    ("JNZ", OpCode::Jump(JumpCondition::NotEqual)),
    ("JG", OpCode::Jump(JumpCondition::Greater)),
    ("JL", OpCode::Jump(JumpCondition::Less)),
    ("JGE", OpCode::Jump(JumpCondition::GreaterOrEqual)),
    ("JLE", OpCode::Jump(JumpCondition::LessOrEqual)),
    ("RUN", OpCode::Run),
    ("CLEAR", OpCode::Clear),
    ("MEMSET", OpCode::MemSet),
    ("MEMVIEW", OpCode::MemView),
    ("SETTEXT", OpCode::SetText),
    ("HELP", OpCode::Help),
    ("QUIT", OpCode::Quit),
];

impl OpCode {
    /// Maps an opcode word to an [OpCode], ignoring case.
    ///
    /// Words that are not mnemonics map to [OpCode::Unknown].
    pub fn from_mnemonic(word: &str) -> OpCode {
        let word = word.to_uppercase();

        MNEMONICS
            .iter()
            .find(|(mnemonic, _)| *mnemonic == word)
            .map(|(_, opcode)| *opcode)
            .unwrap_or(OpCode::Unknown)
    }

    /// Returns the mnemonic closest to a misspelled opcode word.
    pub fn suggest(word: &str) -> Option<&'static str> {
        closest_match(word, MNEMONICS.iter().map(|(mnemonic, _)| *mnemonic), 2)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mnemonic = MNEMONICS
            .iter()
            .find(|(_, opcode)| opcode == self)
            .map(|(mnemonic, _)| *mnemonic)
            .unwrap_or("???");

        write!(f, "{}", mnemonic)
    }
}

/// Subsystem reset by a `CLEAR` instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClearTarget {
    /// Registers, memory, history and the instruction pointer.
    All,

    /// Every register except the instruction pointer.
    Registers,

    /// Memory and the stack pointer.
    Stack,

    /// The instruction history.
    History,
}

impl ClearTarget {
    pub fn from_word(word: &str) -> Option<ClearTarget> {
        match word.to_uppercase().as_str() {
            "ALL" => Some(ClearTarget::All),
            "REGS" => Some(ClearTarget::Registers),
            "STACK" => Some(ClearTarget::Stack),
            "HISTORY" => Some(ClearTarget::History),
            _ => None,
        }
    }
}

impl fmt::Display for ClearTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            ClearTarget::All => "ALL",
            ClearTarget::Registers => "REGS",
            ClearTarget::Stack => "STACK",
            ClearTarget::History => "HISTORY",
        })
    }
}

/// A tokenized instruction line.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction<'a> {
    /// The decoded opcode.
    pub opcode: OpCode,

    /// The opcode word as typed.
    pub mnemonic: &'a str,

    /// Operand words following the opcode.
    pub operands: Vec<&'a str>,

    /// The first double quoted literal on the line.
    pub text: Option<&'a str>,
}

impl<'a> Instruction<'a> {
    /// Tokenizes a line. Returns `None` for a line without any words.
    pub fn parse(line: &'a str) -> Option<Instruction<'a>> {
        let (mut words, text) = split_line(line);

        if words.is_empty() {
            return None;
        }

        let mnemonic = words.remove(0);

        Some(Instruction {
            opcode: OpCode::from_mnemonic(mnemonic),
            mnemonic,
            operands: words,
            text,
        })
    }

    /// Returns the `index`th operand word, if present.
    pub fn operand(&self, index: usize) -> Option<&'a str> {
        self.operands.get(index).copied()
    }
}

#[test]
fn test_mnemonics_are_case_insensitive() {
    assert_eq!(OpCode::from_mnemonic("mov"), OpCode::Move);
    assert_eq!(OpCode::from_mnemonic("MovB"), OpCode::MoveByte);
    assert_eq!(OpCode::from_mnemonic("jz"), OpCode::Jump(JumpCondition::Equal));
    assert_eq!(OpCode::from_mnemonic("JNZ"), OpCode::Jump(JumpCondition::NotEqual));
    assert_eq!(OpCode::from_mnemonic("LOAD"), OpCode::Unknown);
}

#[test]
fn test_display_uses_canonical_mnemonic() {
    assert_eq!(OpCode::from_mnemonic("jz").to_string(), "JE");
    assert_eq!(OpCode::Subtract.to_string(), "SUB");
}

#[test]
fn test_suggest() {
    assert_eq!(OpCode::suggest("mvo"), Some("MOV"));
    assert_eq!(OpCode::suggest("PUHS"), Some("PUSH"));
    assert_eq!(OpCode::suggest("FROBNICATE"), None);
}

#[test]
fn test_jump_conditions() {
    use JumpCondition::*;

    let cases: &[(u32, [bool; 6])] = &[
        //          JE     JNE    JG     JL     JGE    JLE
        (0,       [false, true,  true,  false, true,  false]),
        (ZF,      [true,  false, false, false, true,  true ]),
        (SF,      [false, true,  false, true,  false, true ]),
        (SF | OF, [false, true,  true,  false, true,  false]),
        (OF,      [false, true,  false, true,  false, true ]),
    ];

    for (flags, expected) in cases {
        let conditions = [Equal, NotEqual, Greater, Less, GreaterOrEqual, LessOrEqual];

        for (condition, expected) in conditions.iter().zip(expected.iter()) {
            assert_eq!(condition.holds(*flags), *expected, "{:?} with flags {:x}", condition, flags);
        }
    }
}

#[test]
fn test_parse_instruction() {
    let ins = Instruction::parse("movb [EBX+1] 41").unwrap();

    assert_eq!(ins.opcode, OpCode::MoveByte);
    assert_eq!(ins.mnemonic, "movb");
    assert_eq!(ins.operand(0), Some("[EBX+1]"));
    assert_eq!(ins.operand(1), Some("41"));
    assert_eq!(ins.operand(2), None);

    assert_eq!(Instruction::parse("   "), None);
}
