use polyasm::assemble_program;

#[test]
fn test_repeat() {
    let program_text = include_str!("../programs/repeat.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :03000000010101FA
    :00000001FF
    "###);
}

#[test]
fn test_locals() {
    let program_text = include_str!("../programs/locals.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :0400000001010203F5
    :00000001FF
    "###);
}

#[test]
fn test_macros() {
    let program_text = include_str!("../programs/macros.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :0400000005010703EC
    :00000001FF
    "###);
}

#[test]
fn test_switch() {
    let program_text = include_str!("../programs/switch.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :0200000022FFDD
    :00000001FF
    "###);
}

#[test]
fn test_conditional() {
    let program_text = include_str!("../programs/conditional.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :020000000203F9
    :00000001FF
    "###);
}

#[test]
fn test_chain() {
    let program_text = include_str!("../programs/chain.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :0400000000000000FC
    :00000001FF
    "###);
}

#[test]
fn test_mixed_processors() {
    let program_text = include_str!("../programs/mixed.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :020000003E05BB
    :0200080001E015
    :00000001FF
    "###);
}

#[test]
fn test_org() {
    let program_text = include_str!("../programs/origin.asm");
    let assembled = assemble_program(program_text).unwrap();

    insta::assert_snapshot!(assembled.trim_end(), @r###"
    :040100000100800278
    :00000001FF
    "###);
}

#[test]
fn test_failure_lists_diagnostics() {
    let err = assemble_program("  db 1\n  db nowhere\n  frobnicate").unwrap_err();

    insta::assert_snapshot!(err.to_string(), @r###"
    program.asm:2: error: undefined label: nowhere
    program.asm:3: error: unknown opcode: frobnicate
    "###);
}
