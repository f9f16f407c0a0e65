use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::time::Duration;

use clap::{value_t, App, Arg, ArgMatches};
use slog::{debug, o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use edux86::{
    config::Config,
    emulator::{Emulator, QUIT_STATUS},
    error::ExecError,
    event::Event,
    instruction::{Instruction, OpCode},
    memory::{Memory, SparseMemory, STACK_TOP},
    operand::parse_immediate,
    registers::Register,
};

/// Bytes shown per row by `.mem`.
const ROW_WIDTH: u32 = 16;

/// Rows shown by `.mem`.
const ROWS: u32 = 4;

/// Words shown by `.stack`.
const STACK_WORDS: u32 = 16;

const DISPLAYED_REGISTERS: &[Register] = &[
    Register::EAX, Register::EBX, Register::ECX, Register::EDX,
    Register::ESI, Register::EDI, Register::ESP, Register::EBP,
    Register::CS, Register::DS, Register::SS, Register::ES,
    Register::EIP, Register::FLAGS,
];

#[derive(Debug)]
enum CommandError {
    InvalidFormat,
    UnknownCommand(String),
    Exec(ExecError),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommandError::InvalidFormat => write!(f, "invalid format"),
            CommandError::UnknownCommand(cmd) => write!(f, "unknown command '.{}', try .help", cmd),
            CommandError::Exec(err) => write!(f, "{}", err),
        }
    }
}

impl From<ExecError> for CommandError {
    fn from(err: ExecError) -> CommandError {
        CommandError::Exec(err)
    }
}

struct REPL {
    emulator: Emulator<SparseMemory>,
    changed: Rc<RefCell<Vec<Register>>>,
    logger: Logger,
}

impl REPL {
    fn new(config: Config) -> REPL {
        let mut emulator = Emulator::with_config(SparseMemory::new(), config);
        let changed = Rc::new(RefCell::new(Vec::new()));

        {
            let changed = changed.clone();

            emulator.add_listener(move |event: &Event| {
                if let Event::RegisterChange { register, .. } = event {
                    let mut changed = changed.borrow_mut();

                    if *register != Register::EIP && !changed.contains(register) {
                        changed.push(*register);
                    }
                }
            });
        }

        REPL {
            emulator,
            changed,
            logger: Logger::root(Discard, o!()),
        }
    }

    fn set_logger(&mut self, logger: Logger) {
        self.logger = logger.clone();
        self.emulator.set_logger(logger);
    }

    fn print_registers(&self) {
        for row in DISPLAYED_REGISTERS.chunks(4) {
            let line: Vec<_> = row
                .iter()
                .map(|reg| format!("{:>5} = {:08X}", reg.name(), self.emulator.registers.get(*reg)))
                .collect();

            println!("{}", line.join("   "));
        }
    }

    fn print_memory(&self, origin: u32) {
        for row in 0..ROWS {
            let addr = origin.wrapping_add(row * ROW_WIDTH);
            let bytes = self.emulator.memory.preview(addr, ROW_WIDTH as usize);

            let hex: Vec<_> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            let text: String = bytes
                .iter()
                .map(|b| if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '.' })
                .collect();

            println!("{:08X}  {}  {}", addr, hex.join(" "), text);
        }
    }

    fn print_stack(&self) {
        let esp = self.emulator.registers.esp();

        if esp >= STACK_TOP {
            println!("Stack is empty");
            return;
        }

        let mut addr = esp;

        for _ in 0..STACK_WORDS {
            if addr >= STACK_TOP {
                break;
            }

            let marker = if addr == esp { "<- ESP" } else { "" };
            println!("{:08X}  {:08X} {}", addr, self.emulator.memory.read_word(addr), marker);

            addr += 4;
        }
    }

    fn handle_command(&mut self, command: &str) -> Result<(), CommandError> {
        let mut words = command.split_whitespace();
        let cmd = words.next().ok_or(CommandError::InvalidFormat)?;
        let args: Vec<_> = words.collect();

        match (cmd, args.as_slice()) {
            ("help", _) => {
                println!("Available commands:");
                println!("  .regs, .registers          List all registers and their values");
                println!("  .reg <name>                Print the value of a register");
                println!("  .mem [addr]                Dump memory at addr or at the view origin");
                println!("  .stack                     List the words between ESP and the stack top");
                println!("  .history                   List the recorded instructions");
                println!("  .help                      Print this text");
                println!("Type HELP for the list of instructions.");
            }
            ("regs", _) | ("registers", _) => self.print_registers(),
            ("reg", [name]) | ("register", [name]) => {
                let register: Register = name.parse()?;
                println!("{} = {:08X}", register, self.emulator.registers.get(register));
            }
            ("mem", []) => self.print_memory(self.emulator.view_origin()),
            ("mem", [addr]) => self.print_memory(parse_immediate(addr)?),
            ("stack", _) => self.print_stack(),
            ("history", _) => {
                if self.emulator.history().is_empty() {
                    println!("History is empty");
                }

                for entry in self.emulator.history() {
                    println!("{:08X}  {}", entry.address, entry.line);
                }
            }
            ("reg", _) | ("register", _) | ("mem", _) => return Err(CommandError::InvalidFormat),
            (cmd, _) => return Err(CommandError::UnknownCommand(cmd.to_string())),
        }

        Ok(())
    }

    /// Executes one line of input.
    ///
    /// # Returns
    /// `false` if the REPL should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        if line.starts_with('.') {
            if let Err(err) = self.handle_command(&line[1..]) {
                eprintln!("Error: {}", err);
            }

            return true;
        }

        self.changed.borrow_mut().clear();

        let status = self.emulator.execute(line);

        debug!(self.logger, "executed"; "line" => line, "status" => &status);

        if !status.is_empty() {
            println!("{}", status);
        }

        if let Some(ins) = Instruction::parse(line) {
            if ins.opcode == OpCode::Unknown {
                if let Some(suggestion) = OpCode::suggest(ins.mnemonic) {
                    println!("Did you mean {}?", suggestion);
                }
            }
        }

        for register in self.changed.borrow().iter() {
            println!("  {} = {:08X}", register, self.emulator.registers.get(*register));
        }

        status != QUIT_STATUS
    }

    fn run(&mut self) {
        println!("Type .help for a list of all available commands or start typing instructions");

        let stdin = std::io::stdin();
        let mut input = stdin.lock();

        loop {
            print!("{:08X}> ", self.emulator.registers.eip());
            let _ = std::io::stdout().flush();

            let mut line = String::new();

            match input.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => (),
                Err(err) => {
                    eprintln!("Error: {}", err);
                    break;
                }
            }

            if !self.handle_line(line.trim_end()) {
                break;
            }
        }
    }
}

fn parse_args() -> ArgMatches<'static> {
    App::new("edux86repl")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mitja Karhusaari <mitja@karhusaari>")
        .about("Read-Evaluate-Print-Loop for a subset of x86")
        .arg(
            Arg::with_name("verbose")
                .help("Enables verbose logging")
                .long("verbose")
                .short("v"),
        )
        .arg(
            Arg::with_name("delay")
                .help("Pause between replayed instructions in milliseconds")
                .long("delay")
                .short("d")
                .value_name("MS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max-steps")
                .help("Maximum number of instructions a single RUN may execute")
                .long("max-steps")
                .value_name("N")
                .takes_value(true),
        )
        .get_matches()
}

fn main() {
    let args = parse_args();

    let mut config = Config::default();

    if args.is_present("delay") {
        let delay = value_t!(args, "delay", u64).unwrap_or_else(|e| e.exit());
        config.step_delay = Duration::from_millis(delay);
    }

    if args.is_present("max-steps") {
        config.max_replay_steps = value_t!(args, "max-steps", usize).unwrap_or_else(|e| e.exit());
    }

    let mut repl = REPL::new(config);

    if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        repl.set_logger(Logger::root(drain, o!()));
    }

    repl.run();
}
