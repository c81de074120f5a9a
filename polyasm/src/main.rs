use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use polyasm::{expr::parse_number, find_writer, AsmConfig, Assembler, FileSources};

#[derive(Parser, Debug)]
#[command(version, about = "Multi-pass assembler for several processor families")]
struct Args {
    /// Source file to assemble
    input: PathBuf,

    /// Output file stem (default: the input without its extension)
    #[arg(short, long, env = "POLYASM_OUTPUT")]
    output: Option<PathBuf>,

    /// Output formats, comma separated: hex, bin, sym, json
    #[arg(short, long, env = "POLYASM_FORMATS", value_delimiter = ',', default_value = "hex")]
    formats: Vec<String>,

    /// Search directories for included files
    #[arg(short = 'I', long = "include", env = "POLYASM_INCLUDE", value_delimiter = ',')]
    include: Vec<PathBuf>,

    /// Predefined constants, NAME or NAME=value
    #[arg(short = 'D', long = "define", value_name = "NAME[=value]", value_parser = parse_define)]
    defines: Vec<(String, i64)>,

    /// Processor selected before the first line
    #[arg(long, env = "POLYASM_CPU")]
    cpu: Option<String>,

    #[arg(long, env = "POLYASM_PASS_LIMIT", default_value_t = 32)]
    pass_limit: u32,

    #[arg(long, env = "POLYASM_MAX_INCLUDE_DEPTH", default_value_t = 16)]
    max_include_depth: usize,

    #[arg(long, env = "POLYASM_MAX_NESTING", default_value_t = 32)]
    max_nesting: usize,

    /// Treat warnings as errors
    #[arg(short = 'W', long, env = "POLYASM_WERROR")]
    warnings_as_errors: bool,
}

fn parse_define(text: &str) -> Result<(String, i64)> {
    match text.split_once('=') {
        Some((name, value)) => {
            let value = parse_number(value.trim())
                .with_context(|| format!("Bad value for {}", name))?;
            Ok((name.trim().to_owned(), value))
        }
        None => Ok((text.trim().to_owned(), 1)),
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let writers = args
        .formats
        .iter()
        .map(|format| {
            find_writer(format.trim())
                .ok_or_else(|| anyhow::Error::msg(format!("Unknown output format {}", format)))
        })
        .collect::<Result<Vec<_>>>()?;

    let config = AsmConfig {
        pass_limit: args.pass_limit,
        max_include_depth: args.max_include_depth,
        max_nesting: args.max_nesting,
        defines: args.defines,
        cpu: args.cpu,
        warnings_as_errors: args.warnings_as_errors,
    };

    let mut sources = FileSources::new(args.include);
    if let Some(parent) = args.input.parent() {
        sources.add_include_path(parent);
    }

    let root = args.input.to_string_lossy();
    let assembly = Assembler::new(config, Box::new(sources)).assemble(&root)?;
    for diagnostic in &assembly.diagnostics {
        eprintln!("{}", diagnostic);
    }
    if !assembly.succeeded() {
        eprintln!("{}: {}", root, assembly.outcome);
    }

    let stem = args.output.unwrap_or_else(|| args.input.with_extension(""));
    for writer in writers {
        let path = stem.with_extension(writer.extension());
        let file = File::create(&path)
            .with_context(|| format!("Couldn't create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writer.write(&assembly, &mut out)?;
        out.flush()?;
        log::info!("wrote {}", path.display());
    }

    Ok(assembly.succeeded())
}
