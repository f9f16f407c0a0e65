//! A crate for experimenting with a small subset of the 32-bit x86 instruction set, one line
//! at a time.
//!
//! Currently this crate provides the functionality to:
//! - Execute `MOV`, `MOVB`, `ADD`, `SUB`, `XOR`, `CMP`, `PUSH`, `POP` and the conditional
//!   jumps against a register bank with the usual x86 aliasing (`EAX`/`AX`/`AH`/`AL`, ...).
//! - Read and write a sparse, byte addressable 32-bit memory with a downward growing stack.
//! - Record every accepted instruction and replay the recorded history as a program with `RUN`.
//! - Observe every state change through [event listeners](event::EventListener).
//!
//! Every instruction is executed by [Emulator::execute](emulator::Emulator::execute), which
//! never fails: errors are reported in the returned status string and leave the emulator
//! untouched.
//!
//! # Example
//! ```
//! use edux86::emulator::Emulator;
//! use edux86::registers::Register;
//!
//! let mut emulator = Emulator::new();
//!
//! // Count EAX up to three.
//! emulator.execute("ADD EAX 1");
//! emulator.execute("CMP EAX 3");
//! emulator.execute("JNE 1000");
//!
//! assert_eq!(emulator.registers.get(Register::EAX), 1);
//!
//! // Replay the three instructions above as a loop.
//! assert_eq!(emulator.execute("RUN"), "RUN completed");
//! assert_eq!(emulator.registers.get(Register::EAX), 3);
//! ```
//!
//! # Executables
//!
//! ## `edux86repl`
//!
//! The `edux86repl` provides a Read-Execute-Print-Loop for typing instructions. Lines starting
//! with a dot are commands of the REPL itself.
//!
//! ```text
//! 00001000> MOV EAX 5
//! MOV EAX <- 00000005
//! 00001004> PUSH EAX
//! Pushed 00000005 to FFFFFFEC, new ESP=FFFFFFEC
//! 00001008> .reg esp
//! ESP = FFFFFFEC
//! 00001008> QUIT
//! QUIT
//! ```
//!
//! ## `edux86run`
//!
//! Executes a file of instruction lines as if they were typed into the REPL.

pub mod config;
pub mod emulator;
pub mod error;
pub mod event;
pub mod instruction;
pub mod memory;
pub mod operand;
pub mod registers;
pub mod token;
pub mod utils;

pub use emulator::Emulator;
pub use memory::{Memory, SparseMemory};
