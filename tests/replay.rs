use edux86::{
    emulator::{Emulator, Mode, QUIT_STATUS},
    memory::{Memory, SparseMemory, STACK_TOP},
    registers::{Register, PROGRAM_BASE},
};

use slog::{Logger, Drain, o};
use slog_term::{TermDecorator, FullFormat};

fn logger() -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn source_lines(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
}

fn registers_without_eip(emulator: &Emulator) -> Vec<(Register, u32)> {
    emulator.registers
        .all()
        .into_iter()
        .filter(|(reg, _)| *reg != Register::EIP)
        .collect()
}

#[test]
fn test_countdown() {
    let mut emulator = Emulator::with_logger(SparseMemory::new(), logger());

    for line in source_lines(include_str!("countdown.x86")) {
        let status = emulator.execute(line);
        println!("{:<16} {}", line, status);
        assert!(!status.contains("failed"), "{}", status);
    }

    assert_eq!(emulator.registers.get(Register::EAX), 5);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 12);

    assert_eq!(emulator.execute("RUN"), "RUN completed");

    assert_eq!(emulator.registers.get(Register::EAX), 15);
    assert_eq!(emulator.registers.get(Register::ECX), 0);
    assert_eq!(emulator.registers.esp(), STACK_TOP - 20);

    for (i, expected) in (1..=5).enumerate() {
        assert_eq!(emulator.memory.read_word(STACK_TOP - 20 + 4 * i as u32), expected);
    }

    let last = emulator.history().last().unwrap();
    assert_eq!(last.line, "RUN");
    assert_eq!(last.address, PROGRAM_BASE + 12);
    assert_eq!(emulator.registers.eip(), PROGRAM_BASE + 16);
    assert_eq!(emulator.mode(), Mode::Interactive);
}

#[test]
fn test_replay_reproduces_interactive_state() {
    let program = [
        "CLEAR REGS",
        "CLEAR STACK",
        "MOV EAX 10",
        "MOV EBX 3",
        "ADD EAX EBX",
        "PUSH EAX",
        "MOVB [2000] 41",
        "SETTEXT 3000 \"abc\"",
        "SUB EBX 1",
        "MOVB CH [3001]",
        "XOR EDX EDX",
        "MOV [EBX+2000] EAX",
        "POP EDX",
        "PUSH EBX",
        "CMP EDX EAX",
        "MEMVIEW 3000",
    ];

    let mut emulator = Emulator::new();

    for line in program.iter() {
        let status = emulator.execute(line);
        assert!(!status.contains("failed"), "{}: {}", line, status);
    }

    let registers = registers_without_eip(&emulator);
    let memory = emulator.memory.snapshot();

    assert_eq!(emulator.history().len(), program.len());

    // Scramble everything the program initializes.
    emulator.registers.set(Register::EAX, 0xDEAD_BEEF);
    emulator.registers.set(Register::ESP, 0xFF00_1000);
    emulator.memory.write_word(0x2000, 0xFFFF_FFFF);

    assert_eq!(emulator.execute("RUN"), "RUN completed");

    assert_eq!(registers_without_eip(&emulator), registers);
    assert_eq!(emulator.memory.snapshot(), memory);
}

#[test]
fn test_replay_of_cleared_machine_is_cleared() {
    let mut emulator = Emulator::new();

    for line in &["MOV EAX 1", "PUSH EAX", "CLEAR REGS", "CLEAR STACK"] {
        emulator.execute(line);
    }

    emulator.execute("RUN");

    assert!(emulator.memory.is_empty());
    assert_eq!(emulator.registers.get(Register::EAX), 0);
    assert_eq!(emulator.registers.esp(), STACK_TOP);
}

#[test]
fn test_quit_stops_replay() {
    let mut emulator = Emulator::new();

    emulator.execute("ADD EAX 1");
    assert_eq!(emulator.execute("QUIT"), QUIT_STATUS);
    emulator.execute("ADD EAX 10");

    assert_eq!(emulator.registers.get(Register::EAX), 0x11);
    assert_eq!(emulator.execute("RUN"), QUIT_STATUS);
    assert_eq!(emulator.registers.get(Register::EAX), 0x12);
    assert_eq!(emulator.history().len(), 3);
    assert_eq!(emulator.mode(), Mode::Interactive);
}

#[test]
fn test_events_during_replay() {
    use edux86::event::Event;
    use std::cell::RefCell;
    use std::rc::Rc;

    let steps = Rc::new(RefCell::new(Vec::new()));
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 1");
    emulator.execute("FOO");
    emulator.execute("ADD EAX EAX");

    {
        let steps = steps.clone();

        emulator.add_listener(move |event: &Event| match event {
            Event::ReplayStarted { program_end } => steps.borrow_mut().push(format!("start {:X}", program_end)),
            Event::ReplayStep { address, status } => steps.borrow_mut().push(format!("{:X} {}", address, status)),
            Event::ReplayFinished { halted } => steps.borrow_mut().push(format!("finish {}", halted)),
            _ => (),
        });
    }

    emulator.execute("RUN");

    assert_eq!(&*steps.borrow(), &[
        "start 1008",
        "1000 MOV EAX <- 00000001",
        "1004 ADD EAX: 00000001 + 00000001 = 00000002",
        "finish false",
    ]);
}

#[test]
fn test_jump_over_quit_completes() {
    let mut emulator = Emulator::new();

    emulator.execute("ADD EAX 1");
    emulator.execute("CMP EAX 1");
    assert_eq!(emulator.execute("JNE 1010"), "JNE no jump");
    assert_eq!(emulator.execute("QUIT"), QUIT_STATUS);
    emulator.execute("ADD EAX 1");

    assert_eq!(emulator.registers.get(Register::EAX), 2);

    assert_eq!(emulator.execute("RUN"), "RUN completed");
    assert_eq!(emulator.registers.get(Register::EAX), 4);
    assert_eq!(emulator.history().len(), 6);
}
