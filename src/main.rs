use anyhow::{anyhow, Context as _};
use clap::Parser;
use log::LevelFilter;

use maru_lang::pkg::DirProvider;
use maru_lang::session::Session;
use maru_lang::signature;
use maru_lang::target::{Arch, Bits, Os, Target};

/// Compiler front-end for the Maru programming language.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Directory of the package to compile.
    #[arg(default_value = ".")]
    path: std::path::PathBuf,

    /// Target operating system.
    #[arg(long, value_enum, default_value = "linux")]
    os: Os,

    /// Target CPU family.
    #[arg(long, value_enum, default_value = "x86")]
    cpu: Arch,

    /// Target data model.
    #[arg(long, value_enum, default_value = "lp64")]
    bits: Bits,

    /// Compile with the debug flag set.
    #[arg(long)]
    debug: bool,

    /// User build flags, as in `use … if "name"`.
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Allow $-prefixed test names.
    #[arg(long)]
    test: bool,

    /// Print the program signature on success.
    #[arg(long)]
    signature: bool,

    /// Dump the typed program as JSON on success.
    #[arg(long)]
    dump_ast: bool,

    /// Log more; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("couldn't install the logger")?;

    let mut target = Target::new(args.os, args.cpu, args.bits, args.debug);

    for flag in &args.defines {
        target
            .define(flag)
            .map_err(|e| anyhow!("{e}"))?;
    }

    let mut session = Session::new(target);
    if args.test {
        session = session.with_test_symbols();
    }

    let provider = DirProvider::new(&args.path);
    let result = maru_lang::compile(&mut session, &provider, ".");

    if session.reporter.has_errors() {
        eprintln!("{}", session.reporter.render_all(&session.sources));
        return Err(anyhow!(
            "compilation failed with {} errors",
            session.reporter.error_count()
        ));
    }

    let compiled = result.map_err(|()| anyhow!("compilation failed"))?;

    if args.signature {
        println!("{}", signature::to_hex(&compiled.signature));
    }

    if args.dump_ast {
        println!("{}", serde_json::to_string_pretty(&compiled.program)?);
    }

    Ok(())
}
