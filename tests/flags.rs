use edux86::{
    emulator::Emulator,
    registers::{Register, OF, SF, ZF},
};

const JUMPS: [&str; 6] = ["JE", "JNE", "JG", "JL", "JGE", "JLE"];

/// Compares `a` with `b` and returns which of the jumps in [JUMPS] are taken.
fn taken(a: u32, b: u32) -> Vec<bool> {
    JUMPS
        .iter()
        .map(|jump| {
            let mut emulator = Emulator::new();

            emulator.execute(&format!("MOV EAX {:X}", a));
            emulator.execute(&format!("CMP EAX {:X}", b));

            let status = emulator.execute(&format!("{} 2000", jump));

            if status == format!("{} jumped to 00002000", jump) {
                assert_eq!(emulator.registers.eip(), 0x2000);
                true
            } else {
                assert_eq!(status, format!("{} no jump", jump));
                assert_eq!(emulator.registers.eip(), 0x1000 + 12);
                false
            }
        })
        .collect()
}

#[test]
fn test_signed_comparisons() {
    let cases: &[(u32, u32, [bool; 6])] = &[
        //                         JE     JNE    JG     JL     JGE    JLE
        (5,           3,          [false, true,  true,  false, true,  false]),
        (3,           5,          [false, true,  false, true,  false, true ]),
        (5,           5,          [true,  false, false, false, true,  true ]),
        (0xFFFF_FFFF, 1,          [false, true,  false, true,  false, true ]),
        (0x8000_0000, 1,          [false, true,  false, true,  false, true ]),
        (0x7FFF_FFFF, 0xFFFF_FFFF, [false, true,  true,  false, true,  false]),
    ];

    for (a, b, expected) in cases {
        assert_eq!(taken(*a, *b), expected.to_vec(), "CMP {:X} {:X}", a, b);
    }
}

#[test]
fn test_flags_are_recomputed() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 7FFFFFFF");
    emulator.execute("ADD EAX 1");
    assert_eq!(emulator.registers.flags(), SF | OF);

    emulator.execute("SUB EAX 80000000");
    assert_eq!(emulator.registers.flags(), ZF);

    emulator.execute("MOV EBX 1");
    emulator.execute("ADD EBX 1");
    assert_eq!(emulator.registers.flags(), 0);
}

#[test]
fn test_compare_leaves_operands() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 3");
    emulator.execute("MOV [2000] 3");
    assert_eq!(
        emulator.execute("CMP [2000] EAX"),
        "CMP [00002000] - 00000003: ZF=1 SF=0 OF=0 FLAGS=40",
    );

    assert_eq!(emulator.registers.get(Register::EAX), 3);
    assert!(emulator.registers.flag(ZF));
}

#[test]
fn test_sub_registers_in_arithmetic() {
    let mut emulator = Emulator::new();

    emulator.execute("MOV EAX 12345678");
    emulator.execute("ADD AL 88");
    assert_eq!(emulator.registers.get(Register::EAX), 0x1234_5600);

    emulator.execute("XOR AH AH");
    assert_eq!(emulator.registers.get(Register::EAX), 0x1234_0000);
}
