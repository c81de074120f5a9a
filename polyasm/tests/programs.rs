use std::fs;

use anyhow::Result;
use polyasm::{
    assemble_source, AsmConfig, Assembler, FileSources, MemorySources, Outcome, Severity,
};

fn messages(assembly: &polyasm::Assembly) -> Vec<String> {
    assembly.diagnostics.iter().map(|d| d.to_string()).collect()
}

#[test]
fn test_repeat_replays_body() -> Result<()> {
    let program_text = include_str!("../programs/repeat.asm");
    let assembly = assemble_source("repeat.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded());
    assert_eq!(assembly.image("code"), [1, 1, 1]);
    Ok(())
}

#[test]
fn test_repeat_errors_blame_the_original_line() -> Result<()> {
    let source = "        rept 2\n        db nowhere\n        endr";
    let assembly = assemble_source("r.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!(
        messages(&assembly),
        [
            "r.asm:2: error: undefined label: nowhere",
            "r.asm:2: error: undefined label: nowhere"
        ]
    );
    Ok(())
}

#[test]
fn test_conditionals() -> Result<()> {
    let program_text = include_str!("../programs/conditional.asm");
    let assembly = assemble_source("cond.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.image("code"), [2, 3]);
    Ok(())
}

#[test]
fn test_second_else_is_an_error() -> Result<()> {
    let source = "\
        if 1
        db 1
        else
        db 2
        else
        db 3
        endif";
    let assembly = assemble_source("else.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!(messages(&assembly), ["else.asm:5: error: multiple else"]);
    assert_eq!(assembly.image("code"), [1]);
    Ok(())
}

#[test]
fn test_unterminated_conditional_reported_once() -> Result<()> {
    let source = "        if 0\n        if 1\n        db 1";
    let assembly = assemble_source("open.asm", source, AsmConfig::default())?;
    assert_eq!(
        messages(&assembly),
        ["open.asm:1: error: unterminated conditional"]
    );
    assert!(assembly.image("code").is_empty());
    Ok(())
}

#[test]
fn test_local_labels_follow_the_enclosing_label() -> Result<()> {
    let program_text = include_str!("../programs/locals.asm");
    let assembly = assemble_source("locals.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.labels.value("first@loop"), Some(1));
    assert_eq!(assembly.labels.value("second@loop"), Some(3));
    assert_eq!(assembly.image("code"), [1, 1, 2, 3]);
    Ok(())
}

#[test]
fn test_macro_locals_are_unique_per_expansion() -> Result<()> {
    let program_text = include_str!("../programs/macros.asm");
    let assembly = assemble_source("macros.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.passes, 2);
    assert_eq!(assembly.labels.value("start@1@wait"), Some(1));
    assert_eq!(assembly.labels.value("start@2@wait"), Some(3));
    assert_eq!(assembly.image("code"), [5, 1, 7, 3]);
    Ok(())
}

#[test]
fn test_runaway_macro_hits_the_nesting_limit() -> Result<()> {
    let source = "\
again   macro
        again
        endm
        again";
    let config = AsmConfig {
        max_nesting: 4,
        ..AsmConfig::default()
    };
    let assembly = assemble_source("nest.asm", source, config)?;
    assert_eq!(messages(&assembly), ["nest.asm:4: error: macro nesting too deep"]);
    Ok(())
}

#[test]
fn test_switch_takes_matching_case() -> Result<()> {
    let program_text = include_str!("../programs/switch.asm");
    let assembly = assemble_source("switch.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.image("code"), [0x22, 0xFF]);
    Ok(())
}

#[test]
fn test_include_from_search_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("defs.inc"), "VALUE   equ 9\n")?;
    let main = dir.path().join("main.asm");
    fs::write(&main, "        include \"defs.inc\"\n        db VALUE\n")?;

    let sources = FileSources::new(vec![dir.path().to_path_buf()]);
    let mut assembler = Assembler::new(AsmConfig::default(), Box::new(sources));
    let assembly = assembler.assemble(&main.to_string_lossy())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.image("code"), [9]);
    Ok(())
}

#[test]
fn test_missing_include() -> Result<()> {
    let assembly = assemble_source(
        "inc.asm",
        "        include \"missing.inc\"",
        AsmConfig::default(),
    )?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert!(assembly.diagnostics[0]
        .to_string()
        .starts_with("inc.asm:1: error: cannot open include file missing.inc"));
    Ok(())
}

#[test]
fn test_recursive_include_is_cut_off() -> Result<()> {
    let sources = MemorySources::new().with("self.asm", "        include \"self.asm\"");
    let config = AsmConfig {
        max_include_depth: 4,
        ..AsmConfig::default()
    };
    let assembly = Assembler::new(config, Box::new(sources)).assemble("self.asm")?;
    assert_eq!(assembly.errors, 1);
    assert!(assembly.diagnostics[0].message.contains("nested deeper than 4"));
    Ok(())
}

#[test]
fn test_uninitialized_segment_warns() -> Result<()> {
    let source = "        seg.u vars\n        db 1";
    let assembly = assemble_source("u.asm", source, AsmConfig::default())?;
    assert!(assembly.succeeded());
    assert_eq!(
        messages(&assembly),
        ["u.asm:2: warning: initialized data in uninitialized segment ignored"]
    );

    let strict = AsmConfig {
        warnings_as_errors: true,
        ..AsmConfig::default()
    };
    let assembly = assemble_source("u.asm", source, strict)?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    Ok(())
}

#[test]
fn test_org_and_rorg() -> Result<()> {
    let program_text = include_str!("../programs/origin.asm");
    let assembly = assemble_source("origin.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.labels.value("start"), Some(0x100));
    assert_eq!(assembly.labels.value("here"), Some(0x8000));
    assert_eq!(assembly.labels.value("after"), Some(0x103));
    assert_eq!(assembly.image("code"), [0x01, 0x00, 0x80, 0x02]);
    Ok(())
}

#[test]
fn test_processor_switch_scales_addresses() -> Result<()> {
    let program_text = include_str!("../programs/mixed.asm");
    let assembly = assemble_source("mixed.asm", program_text, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.labels.value("here"), Some(4));
    assert_eq!(
        assembly.image("code"),
        [0x3E, 0x05, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0xE0]
    );
    Ok(())
}

#[test]
fn test_user_messages() -> Result<()> {
    let source = "\
        warning \"check this\"
        if 0
        error \"never\"
        endif
        error \"stop here\"";
    let assembly = assemble_source("msg.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!((assembly.errors, assembly.warnings), (1, 1));
    assert_eq!(
        messages(&assembly),
        [
            "msg.asm:1: warning: check this",
            "msg.asm:5: error: stop here"
        ]
    );
    Ok(())
}

#[test]
fn test_constants_cannot_change_but_sets_can() -> Result<()> {
    let assembly = assemble_source("c.asm", "five    equ 5\nfive    equ 6", AsmConfig::default())?;
    assert_eq!(
        messages(&assembly),
        ["c.asm:2: error: label redefinition: five already has the value 5"]
    );

    let source = "\
count   set 1
        db count
count   set count + 1
        db count";
    let assembly = assemble_source("s.asm", source, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.image("code"), [1, 2]);
    Ok(())
}

#[test]
fn test_unknown_opcode() -> Result<()> {
    let assembly = assemble_source("x.asm", "        frobnicate 1", AsmConfig::default())?;
    let diagnostic = &assembly.diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.to_string(), "x.asm:1: error: unknown opcode: frobnicate");
    Ok(())
}

#[test]
fn test_data_at_the_top_of_memory_is_an_error() -> Result<()> {
    let source = "        org 0xFFFFFFFF\n        db 1";
    let assembly = assemble_source("top.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!(
        messages(&assembly),
        ["top.asm:2: error: value out of range: program counter overflow"]
    );
    assert!(assembly.image("code").is_empty());
    Ok(())
}

#[test]
fn test_wide_characters_are_truncated_with_a_warning() -> Result<()> {
    let assembly = assemble_source("wide.asm", "        db \"a€\"", AsmConfig::default())?;
    assert!(assembly.succeeded());
    assert_eq!(
        messages(&assembly),
        ["wide.asm:1: warning: value 8364 truncated to a byte"]
    );
    assert_eq!(assembly.image("code"), [b'a', 0xAC]);
    Ok(())
}

#[test]
fn test_filled_space_spans_pages() -> Result<()> {
    let assembly = assemble_source("fill.asm", "        ds 300, 0xAA\nend_:", AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert_eq!(assembly.labels.value("end_"), Some(300));
    assert_eq!(assembly.image("code"), [0xAA; 300]);

    let source = "        seg.u vars\n        ds 600, 1";
    let assembly = assemble_source("fill.asm", source, AsmConfig::default())?;
    assert_eq!(
        messages(&assembly),
        ["fill.asm:2: warning: initialized data in uninitialized segment ignored"]
    );
    Ok(())
}

#[test]
fn test_bad_repeat_counts_are_treated_as_zero() -> Result<()> {
    let source = "        rept -1\n        db 1\n        endr";
    let assembly = assemble_source("r.asm", source, AsmConfig::default())?;
    assert!(assembly.succeeded());
    assert_eq!(messages(&assembly), ["r.asm:1: warning: repeat count -1 treated as 0"]);
    assert!(assembly.image("code").is_empty());

    let source = "        rept missing\n        db 1\n        endr";
    let assembly = assemble_source("r.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!(
        messages(&assembly),
        [
            "r.asm:1: error: undefined label: missing",
            "r.asm:1: warning: repeat count unresolved treated as 0"
        ]
    );
    assert!(assembly.image("code").is_empty());
    Ok(())
}

#[test]
fn test_unterminated_blocks() -> Result<()> {
    for (source, message) in [
        ("m       macro\n        db 1", "unterminated macro"),
        ("        rept 2\n        db 1", "unterminated repeat"),
        ("        switch 1\n        case 1\n        db 1", "unterminated switch"),
    ] {
        let assembly = assemble_source("open.asm", source, AsmConfig::default())?;
        assert_eq!(assembly.outcome, Outcome::Errors, "{}", message);
        assert_eq!(messages(&assembly), [format!("open.asm:1: error: {}", message)]);
    }
    Ok(())
}

#[test]
fn test_macro_redefinition_keeps_the_first() -> Result<()> {
    let source = "\
m       macro
        db 1
        endm
m       macro
        db 2
        endm
        m";
    let assembly = assemble_source("redef.asm", source, AsmConfig::default())?;
    assert_eq!(assembly.outcome, Outcome::Errors);
    assert_eq!(messages(&assembly), ["redef.asm:4: error: macro redefinition: m"]);
    assert_eq!(assembly.image("code"), [1]);
    Ok(())
}

#[test]
fn test_purged_macro_is_gone() -> Result<()> {
    let source = "\
m       macro
        db 1
        endm
        m
        purgem m
        m";
    let assembly = assemble_source("purge.asm", source, AsmConfig::default())?;
    assert_eq!(messages(&assembly), ["purge.asm:6: error: unknown opcode: m"]);
    assert_eq!(assembly.image("code"), [1]);

    let assembly = assemble_source("purge.asm", "        purgem x", AsmConfig::default())?;
    assert_eq!(messages(&assembly), ["purge.asm:1: error: no macro named x"]);
    Ok(())
}

#[test]
fn test_segment_output_setting_mismatch_warns() -> Result<()> {
    let source = "        seg.u data\n        seg data\n        seg.u data";
    let assembly = assemble_source("seg.asm", source, AsmConfig::default())?;
    assert!(assembly.succeeded());
    assert_eq!(
        messages(&assembly),
        ["seg.asm:2: warning: segment data was declared with a different output setting"]
    );
    Ok(())
}

#[test]
fn test_stray_terminators_only_matter_in_active_code() -> Result<()> {
    let source = "\
        if 0
        endm
        endr
        endif
        db 1";
    let assembly = assemble_source("stray.asm", source, AsmConfig::default())?;
    assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
    assert!(assembly.diagnostics.is_empty());
    assert_eq!(assembly.image("code"), [1]);

    let assembly = assemble_source("stray.asm", "        endm\n        endr", AsmConfig::default())?;
    assert_eq!(
        messages(&assembly),
        [
            "stray.asm:1: error: endm without macro",
            "stray.asm:2: error: endr without repeat"
        ]
    );
    Ok(())
}
