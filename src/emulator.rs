//! [Emulator] for executing instruction lines and replaying them as programs.

use std::collections::BTreeMap;
use std::thread;

use itertools::Itertools;
use slog::{debug, o, trace, warn, Discard, Logger};

use crate::config::Config;
use crate::error::ExecError;
use crate::event::{Event, EventDispatcher, EventListener};
use crate::instruction::{ClearTarget, Instruction, JumpCondition, OpCode};
use crate::memory::{Memory, SparseMemory, STACK_BASE, STACK_TOP};
use crate::operand::{parse_immediate, Operand, Resolved};
use crate::registers::{Register, RegisterBank, OF, PROGRAM_BASE, SF, ZF};

/// Address distance between two consecutive instructions of the history.
pub const SLOT_WIDTH: u32 = 4;

/// Number of bytes shown by `MEMSET`, `MEMVIEW` and `SETTEXT`.
const PREVIEW_LENGTH: usize = 6;

/// Status returned by `QUIT`. Callers stop their input loop when they see it.
pub const QUIT_STATUS: &str = "QUIT";

pub const HELP_TEXT: &str = "Commands: \
    MOV Rn Rm/val/[Rm+off] or [Rm+off]/[addr] Rn/val, \
    MOVB R8 [Rm+off]/[addr]/val/R8 or [Rm+off]/[addr] val/R8, \
    ADD/XOR/SUB/CMP Rn Rm/val or [Rm+off]/[addr] Rn, \
    PUSH Rn, POP Rn, \
    JE/JZ addr, JNE/JNZ addr, JG addr, JL addr, JGE addr, JLE addr, \
    RUN, CLEAR [ALL/REGS/STACK/HISTORY], MEMSET addr, MEMVIEW addr, SETTEXT addr \"text\", \
    HELP, QUIT";

/// Whether instructions are typed by the user or replayed from the history.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Executed instructions are appended to the history.
    Interactive,

    /// A `RUN` is in progress. The history is read-only and the replay loop owns `EIP`.
    Replaying,
}

/// One accepted instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Value of `EIP` when the instruction was executed.
    pub address: u32,

    /// The instruction exactly as typed.
    pub line: String,
}

/// What has to happen to `EIP` and the history after an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Flow {
    /// Record the instruction and move to the next slot.
    Advance,

    /// Record the instruction. `EIP` has already been positioned by the instruction.
    Positioned,

    /// The history was truncated. Record the instruction in the first slot.
    Restart,

    /// Everything was reset, including `EIP`. Nothing is recorded.
    Reset,

    /// Record the instruction and ask the caller to stop.
    Halt,

    /// A replay was stopped by a `QUIT` in the history. Nothing is recorded.
    Interrupted,

    /// The instruction failed and changed nothing.
    Failed,
}

struct Outcome {
    status: String,
    flow: Flow,
}

impl Outcome {
    fn new<S: Into<String>>(status: S, flow: Flow) -> Outcome {
        Outcome {
            status: status.into(),
            flow,
        }
    }

    fn advance<S: Into<String>>(status: S) -> Outcome {
        Outcome::new(status, Flow::Advance)
    }
}

/// Arithmetic and logic operations that update the flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Subtract,
    Xor,
    Compare,
}

impl AluOp {
    fn symbol(self) -> char {
        match self {
            AluOp::Add => '+',
            AluOp::Subtract | AluOp::Compare => '-',
            AluOp::Xor => '^',
        }
    }

    /// Computes `a op b` with 32-bit two's complement semantics.
    ///
    /// # Returns
    /// The result and the complete new value of the FLAGS register.
    pub fn apply(self, a: u32, b: u32) -> (u32, u32) {
        let (result, overflow) = match self {
            AluOp::Add => {
                let (result, overflow) = (a as i32).overflowing_add(b as i32);
                (result as u32, overflow)
            }
            AluOp::Subtract | AluOp::Compare => {
                let (result, overflow) = (a as i32).overflowing_sub(b as i32);
                (result as u32, overflow)
            }
            AluOp::Xor => (a ^ b, false),
        };

        let mut flags = 0;

        if result == 0 {
            flags |= ZF;
        }

        if result & 0x8000_0000 != 0 {
            flags |= SF;
        }

        if overflow {
            flags |= OF;
        }

        (result, flags)
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).join(" ")
}

fn describe(operand: Resolved) -> String {
    match operand {
        Resolved::Register(reg) => reg.to_string(),
        Resolved::Address(addr) => format!("[{:08X}]", addr),
        Resolved::Immediate(value) => format!("{:08X}", value),
    }
}

/// Utility struct for implementing methods in the context of emulating a single instruction.
struct InstructionEmulationContext<'e, 'i, 'l, M> {
    /// The emulator in whose context the instruction is being emulated.
    emulator: &'e mut Emulator<M>,

    /// The instruction that we are currently emulating.
    instruction: &'i Instruction<'l>,
}

impl<'e, 'i, 'l, M> InstructionEmulationContext<'e, 'i, 'l, M>
    where M: Memory,
{
    /// Returns the operand word at `index` or a [ExecError::MissingOperand].
    fn word(&self, index: usize, name: &'static str) -> Result<&'l str, ExecError> {
        self.instruction
            .operand(index)
            .ok_or(ExecError::MissingOperand { operand: name })
    }

    /// Parses the first operand as a writable place and resolves it.
    fn destination(&self) -> Result<Resolved, ExecError> {
        let operand = Operand::parse_destination(self.word(0, "destination")?)?;
        Ok(operand.resolve(&self.emulator.registers))
    }

    /// Parses the second operand and resolves it.
    fn source(&self) -> Result<Resolved, ExecError> {
        let operand = Operand::parse(self.word(1, "source")?)?;
        Ok(operand.resolve(&self.emulator.registers))
    }

    fn register(&self) -> Result<Register, ExecError> {
        self.word(0, "register")?.parse()
    }

    fn address(&self, name: &'static str) -> Result<u32, ExecError> {
        parse_immediate(self.word(0, name)?)
    }

    /// Reads the 32-bit value of a resolved operand.
    fn value(&self, operand: Resolved) -> u32 {
        match operand {
            Resolved::Register(reg) => self.emulator.registers.get(reg),
            Resolved::Immediate(value) => value,
            Resolved::Address(addr) => self.emulator.memory.read_word(addr),
        }
    }

    fn store(&mut self, operand: Resolved, value: u32) {
        match operand {
            Resolved::Register(reg) => self.emulator.set_register(reg, value),
            Resolved::Address(addr) => self.emulator.write_word(addr, value),
            Resolved::Immediate(_) => unreachable!("destinations are never immediates"),
        }
    }

    fn mov(&mut self) -> Result<Outcome, ExecError> {
        let dst = self.destination()?;
        let src = self.source()?;

        if let (Resolved::Address(_), Resolved::Address(_)) = (dst, src) {
            return Err(ExecError::UnsupportedOperands {
                detail: "memory to memory moves are not supported",
            });
        }

        let value = self.value(src);
        self.store(dst, value);

        let status = match (dst, src) {
            (Resolved::Register(reg), Resolved::Address(addr)) =>
                format!("MOV {} <- [{:08X}] = {:08X}", reg, addr, value),
            (dst, _) =>
                format!("MOV {} <- {:08X}", describe(dst), value),
        };

        Ok(Outcome::advance(status))
    }

    fn movb(&mut self) -> Result<Outcome, ExecError> {
        let dst = self.destination()?;

        if let Resolved::Register(reg) = dst {
            if !reg.is_byte() {
                return Err(ExecError::NotByteRegister { name: reg.to_string() });
            }
        }

        let src = self.source()?;

        let value = match src {
            Resolved::Register(reg) if !reg.is_byte() => {
                return Err(ExecError::NotByteRegister { name: reg.to_string() });
            }
            Resolved::Register(reg) => self.emulator.registers.get(reg),
            Resolved::Immediate(value) if value > 0xFF => {
                return Err(ExecError::ByteOverflow { value });
            }
            Resolved::Immediate(value) => value,
            Resolved::Address(addr) => match dst {
                Resolved::Address(_) => return Err(ExecError::UnsupportedOperands {
                    detail: "memory to memory moves are not supported",
                }),
                _ => self.emulator.memory.read_byte(addr) as u32,
            },
        };

        let status = match dst {
            Resolved::Address(addr) => {
                self.emulator.write_byte(addr, value as u8);
                format!("MOVB [{:08X}] <- {:02X}", addr, value)
            }
            Resolved::Register(reg) => {
                self.emulator.set_register(reg, value);

                match src {
                    Resolved::Address(addr) => format!("MOVB {} <- [{:08X}] = {:02X}", reg, addr, value),
                    _ => format!("MOVB {} <- {:02X}", reg, value),
                }
            }
            Resolved::Immediate(_) => unreachable!("destinations are never immediates"),
        };

        Ok(Outcome::advance(status))
    }

    fn alu(&mut self, op: AluOp) -> Result<Outcome, ExecError> {
        let dst = self.destination()?;
        let src = self.source()?;

        match (dst, src) {
            (Resolved::Register(_), Resolved::Address(_)) => {
                return Err(ExecError::UnsupportedOperands {
                    detail: "source must be a register or an immediate",
                });
            }
            (Resolved::Address(_), Resolved::Immediate(_))
            | (Resolved::Address(_), Resolved::Address(_)) => {
                return Err(ExecError::UnsupportedOperands {
                    detail: "a memory operand must be paired with a register",
                });
            }
            _ => (),
        }

        let a = self.value(dst);
        let b = self.value(src);
        let (result, flags) = op.apply(a, b);

        self.emulator.set_register(Register::FLAGS, flags);

        let mnemonic = self.instruction.opcode;

        if op == AluOp::Compare {
            return Ok(Outcome::advance(format!(
                "CMP {} - {:08X}: ZF={} SF={} OF={} FLAGS={:X}",
                describe(dst),
                b,
                (flags & ZF != 0) as u8,
                (flags & SF != 0) as u8,
                (flags & OF != 0) as u8,
                flags,
            )));
        }

        self.store(dst, result);

        Ok(Outcome::advance(format!(
            "{} {}: {:08X} {} {:08X} = {:08X}",
            mnemonic,
            describe(dst),
            a,
            op.symbol(),
            b,
            result,
        )))
    }

    fn push(&mut self) -> Result<Outcome, ExecError> {
        let reg = self.register()?;
        let esp = self.emulator.registers.esp();

        if esp <= STACK_BASE {
            return Err(ExecError::StackUnderflow { esp });
        }

        let value = self.emulator.registers.get(reg);
        let esp = esp - 4;

        self.emulator.write_word(esp, value);
        self.emulator.set_register(Register::ESP, esp);

        Ok(Outcome::advance(format!("Pushed {:08X} to {:08X}, new ESP={:08X}", value, esp, esp)))
    }

    fn pop(&mut self) -> Result<Outcome, ExecError> {
        let reg = self.register()?;
        let esp = self.emulator.registers.esp();

        if esp > STACK_TOP - 4 {
            return Err(ExecError::StackOverflow { esp });
        }

        let value = self.emulator.memory.read_word(esp);

        for i in 0..4 {
            self.emulator.memory.erase(esp + i);
        }
        self.emulator.notify(Event::MemoryChange { address: esp, length: 4 });

        self.emulator.set_register(Register::ESP, esp + 4);
        self.emulator.set_register(reg, value);

        Ok(Outcome::advance(format!(
            "POP {}: {:08X} from {:08X}, new ESP={:08X}",
            reg,
            value,
            esp,
            esp + 4,
        )))
    }

    fn jump(&mut self, condition: JumpCondition) -> Result<Outcome, ExecError> {
        let target = self.address("target address")?;
        let origin = self.emulator.registers.eip();
        let mnemonic = self.instruction.mnemonic.to_uppercase();

        let status = if condition.holds(self.emulator.registers.flags()) {
            self.emulator.set_register(Register::EIP, target);
            format!("{} jumped to {:08X}", mnemonic, target)
        } else {
            self.emulator.set_register(Register::EIP, origin.wrapping_add(SLOT_WIDTH));
            format!("{} no jump", mnemonic)
        };

        Ok(Outcome::new(status, Flow::Positioned))
    }

    fn clear(&mut self) -> Result<Outcome, ExecError> {
        let word = self.instruction.operand(0).unwrap_or("ALL");
        let target = ClearTarget::from_word(word)
            .ok_or_else(|| ExecError::InvalidClearTarget { target: word.to_uppercase() })?;

        let status = format!("CLEAR {} executed", target);

        let flow = match target {
            ClearTarget::All => {
                self.emulator.registers.reset();
                self.emulator.clear_memory();
                if self.emulator.mode == Mode::Interactive {
                    self.emulator.clear_history();
                }
                self.emulator.announce_registers();
                Flow::Reset
            }
            ClearTarget::Registers => {
                self.emulator.registers.clear();
                self.emulator.announce_registers();
                Flow::Advance
            }
            ClearTarget::Stack => {
                self.emulator.clear_memory();
                self.emulator.set_register(Register::ESP, STACK_TOP);
                Flow::Advance
            }
            ClearTarget::History => match self.emulator.mode {
                Mode::Interactive => {
                    self.emulator.clear_history();
                    Flow::Restart
                }
                Mode::Replaying => Flow::Advance,
            },
        };

        Ok(Outcome::new(status, flow))
    }

    fn memset(&mut self) -> Result<Outcome, ExecError> {
        let addr = self.address("address")?;
        self.emulator.move_view(addr);

        let bytes = self.emulator.memory.preview(addr, PREVIEW_LENGTH);
        Ok(Outcome::advance(format!("MEMSET: Set to {:08X}: [{}]", addr, hex_bytes(&bytes))))
    }

    fn memview(&mut self) -> Result<Outcome, ExecError> {
        let addr = self.address("address")?;
        self.emulator.move_view(addr);

        let bytes = self.emulator.memory.preview(addr, PREVIEW_LENGTH);
        Ok(Outcome::advance(format!("MEMVIEW: View set to {:08X}: [{}]", addr, hex_bytes(&bytes))))
    }

    fn settext(&mut self) -> Result<Outcome, ExecError> {
        let addr = self.address("address")?;
        let text = self.instruction
            .text
            .ok_or(ExecError::MissingOperand { operand: "quoted text" })?;

        let length = self.emulator.memory.write_text(addr, text);
        self.emulator.notify(Event::MemoryChange { address: addr, length: length as u32 });

        let bytes = self.emulator.memory.preview(addr, PREVIEW_LENGTH);
        Ok(Outcome::advance(format!(
            "SETTEXT: Wrote \"{}\" at {:08X}: [{}]",
            text,
            addr,
            hex_bytes(&bytes),
        )))
    }

    /// Execute the instruction.
    fn emulate(&mut self) -> Result<Outcome, ExecError> {
        match self.instruction.opcode {
            OpCode::Move => self.mov(),
            OpCode::MoveByte => self.movb(),
            OpCode::Add => self.alu(AluOp::Add),
            OpCode::Subtract => self.alu(AluOp::Subtract),
            OpCode::Xor => self.alu(AluOp::Xor),
            OpCode::Compare => self.alu(AluOp::Compare),
            OpCode::Push => self.push(),
            OpCode::Pop => self.pop(),
            OpCode::Jump(condition) => self.jump(condition),
            OpCode::Run => self.emulator.replay(),
            OpCode::Clear => self.clear(),
            OpCode::MemSet => self.memset(),
            OpCode::MemView => self.memview(),
            OpCode::SetText => self.settext(),
            OpCode::Help => Ok(Outcome::advance(HELP_TEXT)),
            OpCode::Quit => Ok(Outcome::new(QUIT_STATUS, Flow::Halt)),
            OpCode::Unknown => Err(ExecError::UnknownOpcode {
                word: self.instruction.mnemonic.to_string(),
            }),
        }
    }
}

/// The emulator contains the registers, the memory and the instruction history of a session.
///
/// Instructions are submitted one line at a time with [Emulator::execute]. Every accepted
/// instruction is recorded in the history, which `RUN` replays as a program whose `n`th
/// instruction lives at `PROGRAM_BASE + 4 * n`.
#[derive(Debug)]
pub struct Emulator<M = SparseMemory> {
    /// The register bank.
    pub registers: RegisterBank,

    /// The memory of the emulated machine. Implements [Memory].
    pub memory: M,

    history: Vec<HistoryEntry>,
    mode: Mode,
    view_origin: u32,
    config: Config,
    logger: Logger,
    events: EventDispatcher,
}

impl Emulator<SparseMemory> {
    /// Create a new emulator with empty memory and the default configuration.
    pub fn new() -> Emulator<SparseMemory> {
        Emulator::with_memory(SparseMemory::new())
    }
}

impl Default for Emulator<SparseMemory> {
    fn default() -> Emulator<SparseMemory> {
        Emulator::new()
    }
}

impl<M> Emulator<M> where M: Memory {
    /// Create a new emulator.
    ///
    /// # Parameters
    /// - `memory`: A [Memory] object, usually empty.
    pub fn with_memory(memory: M) -> Emulator<M> {
        Emulator::with_config(memory, Config::default())
    }

    /// Create a new emulator with the provided settings.
    pub fn with_config(memory: M, config: Config) -> Emulator<M> {
        Emulator {
            registers: RegisterBank::new(),
            memory,
            history: Vec::new(),
            mode: Mode::Interactive,
            view_origin: config.view_origin,
            config,
            logger: Logger::root(Discard, o!()),
            events: EventDispatcher::new(),
        }
    }

    /// Create a new emulator which logs into `logger`.
    pub fn with_logger(memory: M, logger: Logger) -> Emulator<M> {
        let mut emulator = Emulator::with_memory(memory);
        emulator.set_logger(logger);
        emulator
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger.new(o!("component" => "emulator"));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a listener that is notified of every state change.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.events.add_listener(listener);
    }

    /// The accepted instructions, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Address the memory view window should start at.
    pub fn view_origin(&self) -> u32 {
        self.view_origin
    }

    /// Executes a single instruction line.
    ///
    /// Errors never escape this function. A failing instruction produces a status of the
    /// form `"<OPCODE> failed: <reason>"` and leaves the state untouched. This includes a
    /// `RUN` that hits the step limit, which rolls back everything the partial replay did.
    /// A line that does not start with a known opcode produces `"Unknown command: <line>"`,
    /// and a blank line is ignored and produces an empty status.
    ///
    /// # Returns
    /// A human readable description of what happened. [QUIT_STATUS] signals that the caller
    /// should stop.
    pub fn execute(&mut self, line: &str) -> String {
        let origin = self.registers.eip();

        match self.perform(line) {
            Some(outcome) => {
                if self.mode == Mode::Interactive {
                    self.complete(origin, line, outcome.flow);
                }

                outcome.status
            }
            None => String::new(),
        }
    }

    /// Executes a line without touching the history or advancing `EIP` for the next slot.
    fn perform(&mut self, line: &str) -> Option<Outcome> {
        if line.trim().is_empty() {
            return None;
        }

        let instruction = match Instruction::parse(line) {
            Some(instruction) => instruction,
            None => return Some(Outcome::new(format!("Unknown command: {}", line), Flow::Failed)),
        };
        let logger = self.logger.new(o!("eip" => format!("{:08X}", self.registers.eip())));

        trace!(logger, "dispatching"; "line" => line, "mode" => ?self.mode);

        let result = InstructionEmulationContext {
            emulator: self,
            instruction: &instruction,
        }.emulate();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(ExecError::UnknownOpcode { word }) => {
                debug!(logger, "unknown opcode"; "word" => word);
                Outcome::new(format!("Unknown command: {}", line), Flow::Failed)
            }
            Err(err) => {
                debug!(logger, "instruction failed"; "error" => %err);
                Outcome::new(format!("{} failed: {}", instruction.opcode, err), Flow::Failed)
            }
        };

        Some(outcome)
    }

    /// Records an interactively executed instruction and moves `EIP` to the next slot.
    fn complete(&mut self, origin: u32, line: &str, flow: Flow) {
        match flow {
            Flow::Advance | Flow::Halt => {
                self.record(origin, line);
                self.set_register(Register::EIP, origin.wrapping_add(SLOT_WIDTH));
            }
            Flow::Positioned => self.record(origin, line),
            Flow::Restart => {
                self.record(PROGRAM_BASE, line);
                self.set_register(Register::EIP, PROGRAM_BASE + SLOT_WIDTH);
            }
            Flow::Reset | Flow::Interrupted | Flow::Failed => (),
        }
    }

    fn record(&mut self, address: u32, line: &str) {
        debug!(self.logger, "history append"; "address" => format!("{:08X}", address), "line" => line);

        self.history.push(HistoryEntry {
            address,
            line: line.to_string(),
        });

        self.notify(Event::HistoryAppend {
            address,
            line: line.to_string(),
        });
    }

    /// Replays the history from the first slot.
    ///
    /// Every slot is executed in order, except that jumps reposition `EIP`. The replay
    /// stops when `EIP` leaves the program image or a `QUIT` is reached.
    fn replay(&mut self) -> Result<Outcome, ExecError> {
        if self.mode == Mode::Replaying {
            return Ok(Outcome::advance("RUN skipped: replay already active"));
        }

        if self.history.is_empty() {
            return Err(ExecError::NoHistory);
        }

        let origin = self.registers.eip();
        let program_end = PROGRAM_BASE.wrapping_add(SLOT_WIDTH * self.history.len() as u32);
        let logger = self.logger.new(o!("replay" => format!("{:08X}..{:08X}", PROGRAM_BASE, program_end)));

        debug!(logger, "replay started"; "origin" => format!("{:08X}", origin));

        let saved_registers = self.registers.clone();
        let saved_memory = self.memory.snapshot();
        let saved_view = self.view_origin;

        self.mode = Mode::Replaying;
        self.set_register(Register::EIP, PROGRAM_BASE);
        self.notify(Event::ReplayStarted { program_end });

        let mut steps = 0;

        let result = loop {
            let eip = self.registers.eip();

            if eip < PROGRAM_BASE || eip >= program_end {
                break Ok(false);
            }

            let slot = ((eip - PROGRAM_BASE) / SLOT_WIDTH) as usize;

            let line = match self.history.get(slot) {
                Some(entry) => entry.line.clone(),
                None => break Ok(false),
            };

            if steps == self.config.max_replay_steps {
                break Err(ExecError::StepLimitExceeded { limit: steps });
            }

            steps += 1;

            let outcome = match self.perform(&line) {
                Some(outcome) => outcome,
                None => Outcome::advance(""),
            };

            trace!(logger, "replayed"; "slot" => slot, "status" => &outcome.status);

            if outcome.flow == Flow::Failed {
                warn!(logger, "replayed instruction failed"; "line" => &line, "status" => &outcome.status);
            }

            self.notify(Event::ReplayStep {
                address: eip,
                status: outcome.status,
            });

            match outcome.flow {
                Flow::Halt | Flow::Interrupted => break Ok(true),
                Flow::Positioned => (),
                _ => {
                    let eip = self.registers.eip().wrapping_add(SLOT_WIDTH);
                    self.set_register(Register::EIP, eip);
                }
            }

            if self.config.step_delay.as_nanos() > 0 {
                thread::sleep(self.config.step_delay);
            }
        };

        self.mode = Mode::Interactive;

        match result {
            Ok(halted) => {
                debug!(logger, "replay finished"; "steps" => steps, "halted" => halted);
                self.notify(Event::ReplayFinished { halted });

                if halted {
                    Ok(Outcome::new(QUIT_STATUS, Flow::Interrupted))
                } else {
                    Ok(Outcome::advance("RUN completed"))
                }
            }
            Err(err) => {
                warn!(logger, "replay aborted, rolling back"; "error" => %err);
                self.restore(saved_registers, saved_memory, saved_view);
                self.notify(Event::ReplayFinished { halted: false });
                Err(err)
            }
        }
    }

    /// Puts back the state captured before a replay.
    fn restore(&mut self, registers: RegisterBank, memory: BTreeMap<u32, u8>, view_origin: u32) {
        self.registers = registers;
        self.announce_registers();

        self.clear_memory();
        for (address, byte) in memory {
            self.write_byte(address, byte);
        }

        if self.view_origin != view_origin {
            self.move_view(view_origin);
        }
    }

    fn notify(&mut self, event: Event) {
        if !self.events.is_empty() {
            self.events.dispatch(event);
        }
    }

    fn set_register(&mut self, register: Register, value: u32) {
        self.registers.set(register, value);

        let data = self.registers.get(register);
        self.notify(Event::RegisterChange { register, data });
    }

    /// Sends a [Event::RegisterChange] for every register name.
    fn announce_registers(&mut self) {
        if self.events.is_empty() {
            return;
        }

        for (register, data) in self.registers.all() {
            self.notify(Event::RegisterChange { register, data });
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        self.memory.write_word(address, value);
        self.notify(Event::MemoryChange { address, length: 4 });
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        self.memory.write_byte(address, value);
        self.notify(Event::MemoryChange { address, length: 1 });
    }

    fn clear_memory(&mut self) {
        self.memory.clear();
        self.notify(Event::MemoryCleared);
    }

    fn clear_history(&mut self) {
        self.history.clear();
        self.notify(Event::HistoryCleared);
    }

    fn move_view(&mut self, origin: u32) {
        self.view_origin = origin;
        self.notify(Event::ViewMoved { origin });
    }
}

#[test]
fn test_mov_records_and_advances() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("MOV EAX 2A"), "MOV EAX <- 0000002A");
    assert_eq!(emulator.registers.get(Register::EAX), 0x2A);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 4);
    assert_eq!(emulator.history(), &[HistoryEntry { address: PROGRAM_BASE, line: "MOV EAX 2A".into() }]);
}

#[test]
fn test_mov_between_memory_and_registers() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EBX 2000");
    assert_eq!(emulator.execute("MOV [EBX+4] 11223344"), "MOV [00002004] <- 11223344");
    assert_eq!(emulator.memory.read_byte(0x2004), 0x44);
    assert_eq!(emulator.execute("MOV ECX [2004]"), "MOV ECX <- [00002004] = 11223344");

    let status = emulator.execute("MOV [2000] [2004]");
    assert!(status.starts_with("MOV failed: "), "{}", status);
    assert_eq!(emulator.history().len(), 3);
}

#[test]
fn test_empty_line_is_ignored() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("   "), "");
    assert!(emulator.history().is_empty());
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE);
}

#[test]
fn test_unknown_opcode() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("FOO EAX"), "Unknown command: FOO EAX");
    assert_eq!(emulator.execute("\"hello\""), "Unknown command: \"hello\"");
    assert_eq!(emulator.execute(",,"), "Unknown command: ,,");
    assert!(emulator.history().is_empty());
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE);
}

#[test]
fn test_failure_changes_nothing() {
    let mut emulator = Emulator::new();
    emulator.execute("MOV EAX 1");

    let registers = emulator.registers.clone();
    let memory = emulator.memory.clone();

    for line in &["MOV EXX 1", "MOV EAX zz", "ADD EAX [2000]", "MOVB EAX 1", "CLEAR FOO", "PUSH"] {
        let status = emulator.execute(line);
        assert!(status.contains(" failed: "), "{}", status);
    }

    assert_eq!(emulator.registers, registers);
    assert_eq!(emulator.memory, memory);
    assert_eq!(emulator.history().len(), 1);
}

#[test]
fn test_error_message_suggests_register() {
    let mut emulator = Emulator::new();

    assert_eq!(
        emulator.execute("MOV EAXX 1"),
        "MOV failed: unknown register 'EAXX' (did you mean EAX?)",
    );
}

#[test]
fn test_alu_flags() {
    assert_eq!(AluOp::Add.apply(0x7FFF_FFFF, 1), (0x8000_0000, SF | OF));
    assert_eq!(AluOp::Add.apply(0xFFFF_FFFF, 1), (0, ZF));
    assert_eq!(AluOp::Subtract.apply(5, 5), (0, ZF));
    assert_eq!(AluOp::Subtract.apply(0x8000_0000, 1), (0x7FFF_FFFF, OF));
    assert_eq!(AluOp::Compare.apply(3, 5), (0xFFFF_FFFE, SF));
    assert_eq!(AluOp::Xor.apply(0x8000_0000, 0), (0x8000_0000, SF));
}

#[test]
fn test_add_and_compare_status() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 3");
    assert_eq!(emulator.execute("ADD EAX 2"), "ADD EAX: 00000003 + 00000002 = 00000005");
    assert_eq!(emulator.execute("CMP EAX 6"), "CMP EAX - 00000006: ZF=0 SF=1 OF=0 FLAGS=80");
    assert_eq!(emulator.registers.get(Register::EAX), 5);

    emulator.execute("MOV [3000] 1");
    assert_eq!(emulator.execute("SUB [3000] EAX"), "SUB [00003000]: 00000001 - 00000005 = FFFFFFFC");
    assert_eq!(emulator.memory.read_word(0x3000), 0xFFFF_FFFC);
}

#[test]
fn test_xor_clears_overflow() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 7FFFFFFF");
    emulator.execute("ADD EAX 1");
    assert!(emulator.registers.flag(OF));

    emulator.execute("XOR EAX EAX");
    assert_eq!(emulator.registers.flags(), ZF);
}

#[test]
fn test_movb() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("MOVB AH 12"), "MOVB AH <- 12");
    assert_eq!(emulator.registers.get(Register::EAX), 0x1200);
    assert_eq!(emulator.execute("MOVB [2000] AH"), "MOVB [00002000] <- 12");
    assert_eq!(emulator.memory.read_word(0x2000), 0x12);
    assert_eq!(emulator.execute("MOVB BL [2000]"), "MOVB BL <- [00002000] = 12");

    assert_eq!(emulator.execute("MOVB AL 100"), "MOVB failed: value 100 exceeds byte size");
}

#[test]
fn test_movb_overflow_keeps_register() {
    let mut emulator = Emulator::new();

    emulator.execute("MOVB AL 7F");
    assert_eq!(emulator.execute("MOVB AL 1FF"), "MOVB failed: value 1FF exceeds byte size");
    assert_eq!(emulator.registers.get(Register::AL), 0x7F);
    assert_eq!(emulator.history().len(), 1);
}

#[test]
fn test_push_pop() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 2A");
    assert_eq!(emulator.execute("PUSH EAX"), "Pushed 0000002A to FFFFFFEC, new ESP=FFFFFFEC");
    assert_eq!(emulator.execute("POP EBX"), "POP EBX: 0000002A from FFFFFFEC, new ESP=FFFFFFF0");
    assert_eq!(emulator.registers.get(Register::EBX), 0x2A);
    assert!(emulator.memory.is_empty());

    let status = emulator.execute("POP EBX");
    assert!(status.starts_with("POP failed: "), "{}", status);
}

#[test]
fn test_push_at_stack_base() {
    let mut emulator = Emulator::new();
    emulator.registers.set(Register::ESP, STACK_BASE);

    assert_eq!(emulator.execute("PUSH EAX"), "PUSH failed: ESP=FF000000 <= STACK_BASE");
}

#[test]
fn test_jumps_position_eip() {
    let mut emulator = Emulator::new();

    emulator.execute("XOR EAX EAX");
    assert_eq!(emulator.execute("JNE 1000"), "JNE no jump");
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 8);

    assert_eq!(emulator.execute("jz 1000"), "JZ jumped to 00001000");
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE);
    assert_eq!(emulator.history().len(), 3);
    assert_eq!(emulator.history()[2].address, PROGRAM_BASE + 8);
}

#[test]
fn test_clear_all() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 1");
    emulator.execute("PUSH EAX");

    assert_eq!(emulator.execute("CLEAR"), "CLEAR ALL executed");
    assert_eq!(emulator.registers, RegisterBank::new());
    assert!(emulator.memory.is_empty());
    assert!(emulator.history().is_empty());
}

#[test]
fn test_clear_regs_and_stack() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 1");
    emulator.execute("PUSH EAX");

    assert_eq!(emulator.execute("clear regs"), "CLEAR REGS executed");
    assert_eq!(emulator.registers.get(Register::EAX), 0);
    assert_eq!(emulator.registers.esp(), 0);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 12);

    assert_eq!(emulator.execute("CLEAR STACK"), "CLEAR STACK executed");
    assert!(emulator.memory.is_empty());
    assert_eq!(emulator.registers.esp(), STACK_TOP);
    assert_eq!(emulator.history().len(), 4);
}

#[test]
fn test_clear_history_restarts_program() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 1");
    emulator.execute("MOV EBX 2");
    emulator.execute("CLEAR HISTORY");

    assert_eq!(emulator.history(), &[HistoryEntry { address: PROGRAM_BASE, line: "CLEAR HISTORY".into() }]);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 4);
    assert_eq!(emulator.registers.get(Register::EBX), 2);
}

#[test]
fn test_memory_view() {
    let mut emulator = Emulator::new();

    assert_eq!(
        emulator.execute("SETTEXT 2000 \"Hi\""),
        "SETTEXT: Wrote \"Hi\" at 00002000: [48 69 00 00 00 00]",
    );
    assert_eq!(emulator.view_origin(), crate::config::DEFAULT_VIEW_ORIGIN);

    assert_eq!(emulator.execute("MEMVIEW 2001"), "MEMVIEW: View set to 00002001: [69 00 00 00 00 00]");
    assert_eq!(emulator.view_origin(), 0x2001);

    assert_eq!(emulator.execute("MEMSET 0x10"), "MEMSET: Set to 00000010: [00 00 00 00 00 00]");
    assert_eq!(emulator.view_origin(), 0x10);
}

#[test]
fn test_quit_is_recorded() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("QUIT"), QUIT_STATUS);
    assert_eq!(emulator.history().len(), 1);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 4);
}

#[test]
fn test_run_without_history() {
    let mut emulator = Emulator::new();

    assert_eq!(emulator.execute("RUN"), "RUN failed: no history");
    assert!(emulator.history().is_empty());
}

#[test]
fn test_run_loops_until_condition() {
    let mut emulator = Emulator::new();

    emulator.execute("ADD EAX 1");
    emulator.execute("CMP EAX 1");
    emulator.execute("JNE 1000");

    emulator.registers.set(Register::EAX, 0xFFFF_FFFD);

    assert_eq!(emulator.execute("RUN"), "RUN completed");
    assert_eq!(emulator.registers.get(Register::EAX), 1);
    assert_eq!(emulator.mode(), Mode::Interactive);
    assert_eq!(emulator.history()[3], HistoryEntry { address: PROGRAM_BASE + 12, line: "RUN".into() });
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 16);
}

#[test]
fn test_run_stops_at_quit() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 1");
    emulator.execute("QUIT");
    emulator.execute("MOV EAX 2");

    emulator.registers.set(Register::EAX, 0);

    assert_eq!(emulator.execute("RUN"), QUIT_STATUS);
    assert_eq!(emulator.registers.get(Register::EAX), 1);
    assert_eq!(emulator.history().len(), 3);
    assert_eq!(emulator.mode(), Mode::Interactive);
}

#[test]
fn test_nested_run_is_skipped() {
    let mut emulator = Emulator::new();

    emulator.execute("ADD EAX 1");
    assert_eq!(emulator.execute("RUN"), "RUN completed");
    assert_eq!(emulator.registers.get(Register::EAX), 2);

    assert_eq!(emulator.execute("RUN"), "RUN completed");
    assert_eq!(emulator.registers.get(Register::EAX), 3);
    assert_eq!(emulator.history().len(), 3);
}

#[test]
fn test_replay_failures_advance() {
    let mut emulator = Emulator::new();

    emulator.execute("ADD EAX 1");
    emulator.execute("PUSH EAX");
    emulator.execute("POP EBX");
    emulator.execute("ADD EAX 1");
    assert_eq!(emulator.history().len(), 4);

    emulator.registers.set(Register::ESP, STACK_BASE);

    assert_eq!(emulator.execute("RUN"), "RUN completed");
    assert_eq!(emulator.registers.get(Register::EAX), 4);
    assert_eq!(emulator.registers.get(Register::EBX), 0);
    assert_eq!(emulator.registers.esp(), STACK_BASE + 4);
}

#[test]
fn test_step_limit() {
    let config = Config {
        max_replay_steps: 50,
        ..Config::default()
    };

    let mut emulator = Emulator::with_config(SparseMemory::new(), config);

    emulator.execute("XOR EAX EAX");
    emulator.execute("JE 1004");
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 4);

    assert_eq!(emulator.execute("RUN"), "RUN failed: step limit of 50 exceeded");
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 4);
    assert_eq!(emulator.mode(), Mode::Interactive);
    assert_eq!(emulator.history().len(), 2);
}

#[test]
fn test_step_limit_rolls_back() {
    let config = Config {
        max_replay_steps: 7,
        ..Config::default()
    };

    let mut emulator = Emulator::with_config(SparseMemory::new(), config);

    for line in &["ADD EAX 1", "MOV [2000] EAX", "JE 1000", "XOR EBX EBX", "JE 1000"] {
        emulator.execute(line);
    }

    emulator.execute("MEMVIEW 3000");
    emulator.execute("MOVB [4000] 1");

    let registers = emulator.registers.clone();
    let memory = emulator.memory.clone();

    assert_eq!(emulator.execute("RUN"), "RUN failed: step limit of 7 exceeded");
    assert_eq!(emulator.registers, registers);
    assert_eq!(emulator.memory, memory);
    assert_eq!(emulator.registers.get(Register::EAX), 1);
    assert_eq!(emulator.memory.read_word(0x2000), 1);
    assert_eq!(emulator.view_origin(), 0x3000);
}

#[test]
fn test_events() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut emulator = Emulator::new();

    {
        let events = events.clone();
        emulator.add_listener(move |event: &Event| events.borrow_mut().push(event.clone()));
    }

    emulator.execute("MOV EAX 5");

    assert_eq!(&*events.borrow(), &[
        Event::RegisterChange { register: Register::EAX, data: 5 },
        Event::HistoryAppend { address: PROGRAM_BASE, line: "MOV EAX 5".into() },
        Event::RegisterChange { register: Register::EIP, data: PROGRAM_BASE + 4 },
    ]);
}
