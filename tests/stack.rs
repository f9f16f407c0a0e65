use edux86::{
    emulator::Emulator,
    memory::{Memory, STACK_BASE, STACK_TOP},
    registers::Register,
};

#[test]
fn test_registers_pop_in_reverse_order() {
    let mut emulator = Emulator::new();

    for (reg, value) in &[("EAX", 1), ("EBX", 2), ("ECX", 3)] {
        emulator.execute(&format!("MOV {} {:X}", reg, value));
        emulator.execute(&format!("PUSH {}", reg));
    }

    assert_eq!(emulator.registers.esp(), STACK_TOP - 12);
    assert_eq!(emulator.memory.read_word(STACK_TOP - 12), 3);

    emulator.execute("POP EAX");
    emulator.execute("POP EBX");
    emulator.execute("POP ECX");

    assert_eq!(emulator.registers.get(Register::EAX), 3);
    assert_eq!(emulator.registers.get(Register::EBX), 2);
    assert_eq!(emulator.registers.get(Register::ECX), 1);
    assert_eq!(emulator.registers.esp(), STACK_TOP);
    assert!(emulator.memory.is_empty());
}

#[test]
fn test_push_pop_round_trip_restores_state() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EDX 1234");
    emulator.execute("SETTEXT 2000 \"keep\"");

    let registers = emulator.registers.clone();
    let memory = emulator.memory.clone();

    emulator.execute("PUSH EDX");
    emulator.execute("POP EDX");

    emulator.registers.set(Register::EIP, registers.eip());
    assert_eq!(emulator.registers, registers);
    assert_eq!(emulator.memory, memory);
}

#[test]
fn test_stack_bounds() {
    let mut emulator = Emulator::new();

    let status = emulator.execute("POP EAX");
    assert_eq!(status, "POP failed: ESP=FFFFFFF0, stack empty");

    emulator.registers.set(Register::ESP, STACK_BASE + 4);
    assert_eq!(emulator.execute("PUSH EAX"), "Pushed 00000000 to FF000000, new ESP=FF000000");

    let memory = emulator.memory.snapshot();

    assert_eq!(emulator.execute("PUSH EAX"), "PUSH failed: ESP=FF000000 <= STACK_BASE");
    assert_eq!(emulator.registers.esp(), STACK_BASE);
    assert_eq!(emulator.memory.snapshot(), memory);
    assert_eq!(emulator.memory.len(), 4);
}

#[test]
fn test_clear_stack() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 5");
    emulator.execute("PUSH EAX");
    emulator.execute("PUSH EAX");
    emulator.execute("MOV [2000] 1");

    assert_eq!(emulator.execute("CLEAR STACK"), "CLEAR STACK executed");
    assert!(emulator.memory.is_empty());
    assert_eq!(emulator.registers.esp(), STACK_TOP);
    assert_eq!(emulator.registers.get(Register::EAX), 5);
}

#[test]
fn test_text_and_byte_access() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV ESI 3000");
    emulator.execute("SETTEXT 3000 \"Hey\"");
    emulator.execute("MOVB AL [ESI]");
    emulator.execute("MOVB AH [ESI+1]");

    assert_eq!(emulator.registers.get(Register::AX), 0x6548);
    assert_eq!(emulator.memory.read_byte(0x3003), 0);

    emulator.execute("MOVB [ESI+2] AL");
    assert_eq!(emulator.memory.preview(0x3000, 4), vec![b'H', b'e', b'H', 0]);

    emulator.execute("MOV EDI 3004");
    emulator.execute("MOV EAX [EDI-4]");
    assert_eq!(emulator.registers.get(Register::EAX), 0x0048_6548);
}
