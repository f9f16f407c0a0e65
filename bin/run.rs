use std::time::Duration;

use clap::{value_t, App, Arg, ArgMatches};
use slog::{info, o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

use edux86::{
    config::Config,
    emulator::{Emulator, QUIT_STATUS},
    memory::{Memory, SparseMemory},
    registers::{Register, View},
};

enum Error {
    IO(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("edux86run")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mitja Karhusaari <mitja@karhusaari.me>")
        .about("Executes a file of x86 instruction lines")
        .arg(Arg::with_name("source")
             .help("File containing one instruction per line")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("run")
             .help("Replays the whole file as a program after executing it")
             .long("run")
             .short("r"))
        .arg(Arg::with_name("dump")
             .help("Prints the registers and the written memory at the end")
             .long("dump"))
        .arg(Arg::with_name("quiet")
             .help("Only prints the statuses of failed instructions")
             .long("quiet")
             .short("q"))
        .arg(Arg::with_name("verbose")
             .help("Enables verbose logging")
             .long("verbose")
             .short("v"))
        .arg(Arg::with_name("delay")
             .help("Pause between replayed instructions in milliseconds")
             .long("delay")
             .value_name("MS")
             .takes_value(true))
        .get_matches()
}

fn main() {
    let args = parse_arguments();

    let mut config = Config::default();

    if args.is_present("delay") {
        let delay = value_t!(args, "delay", u64).unwrap_or_else(|e| e.exit());
        config.step_delay = Duration::from_millis(delay);
    }

    let logger = if args.is_present("verbose") {
        let decorator = TermDecorator::new().build();
        let drain = FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    } else {
        Logger::root(Discard, o!())
    };

    let mut emulator = Emulator::with_config(SparseMemory::new(), config);
    emulator.set_logger(logger.clone());

    let file_path = args.value_of("source").unwrap_or_default();

    match run(&mut emulator, file_path, &args, &logger) {
        Ok(()) => (),
        Err(Error::IO(io)) => {
            eprintln!("IO error: {}", io);
            std::process::exit(1);
        }
    }

    if args.is_present("dump") {
        dump(&emulator);
    }
}

/// Lines that are empty or start with `;` are comments.
fn is_instruction(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with(';')
}

fn run(emulator: &mut Emulator, file_path: &str, args: &ArgMatches, logger: &Logger) -> Result<(), Error> {
    let source = std::fs::read_to_string(file_path)?;
    let quiet = args.is_present("quiet");

    let mut lines: Vec<&str> = source.lines().filter(|line| is_instruction(line)).collect();

    if args.is_present("run") {
        lines.push("RUN");
    }

    info!(logger, "executing";
        "file" => file_path,
        "lines" => lines.len(),
        "max_replay_steps" => emulator.config().max_replay_steps);

    for line in lines {
        let status = emulator.execute(line.trim());

        if !quiet || status.contains(" failed: ") || status.starts_with("Unknown command") {
            println!("{:08X}  {:<32} {}", emulator.registers.eip(), line.trim(), status);
        }

        if status == QUIT_STATUS {
            break;
        }
    }

    Ok(())
}

fn dump(emulator: &Emulator) {
    for register in Register::ALL.iter().filter(|r| r.view() == View::Full) {
        println!("{:>5} = {:08X}", register.name(), emulator.registers.get(*register));
    }

    println!("{} bytes of memory written", emulator.memory.len());

    for (addr, byte) in emulator.memory.snapshot() {
        println!("[{:08X}] = {:02X}", addr, byte);
    }
}
