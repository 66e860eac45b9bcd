use dhuka::{run, Reporter, StderrReporter, Vm};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::env;
use std::fs;
use std::process::ExitCode;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "dhuka - a small bytecode-compiled scripting language\n\n\
Usage:\n  \
dhuka                 start an interactive REPL\n  \
dhuka <path>          run a script file\n  \
dhuka --version       print the interpreter version\n  \
dhuka --help          print this message\n";

/// CLI driver: REPL-or-file dispatch, grounded on the teacher's
/// `قتام/src/main.rs` (`run_repl`/`run_line`/`run_file` split, one `Vm`
/// reused across REPL lines) but trimmed of its `--untrusted` sandboxing
/// flag, which belongs to the module-loading surface this crate leaves
/// out of scope.
fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--version") | Some("-v") => {
            println!("dhuka {VERSION}");
            ExitCode::from(exitcode::OK as u8)
        }
        Some("--help") | Some("-h") => {
            print!("{HELP}");
            ExitCode::from(exitcode::OK as u8)
        }
        Some(path) => run_file(path),
        None => run_repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("dhuka: couldn't read '{path}': {err}");
            return ExitCode::from(exitcode::NOINPUT as u8);
        }
    };

    let mut vm = Vm::new();
    let mut reporter = StderrReporter;
    match run(&source, &mut vm, &mut reporter) {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(dhuka::Phase::Compile) => ExitCode::from(exitcode::DATAERR as u8),
        Err(dhuka::Phase::Runtime) => ExitCode::from(exitcode::SOFTWARE as u8),
    }
}

fn run_repl() -> ExitCode {
    let mut vm = Vm::new();
    let mut reporter = StderrReporter;
    let mut editor = Editor::<()>::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                editor.add_history_entry(line.as_str());
                let _ = run(&line, &mut vm, &mut reporter);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                reporter.error(dhuka::Report::new(
                    dhuka::Phase::Runtime,
                    format!("readline error: {err}"),
                    None,
                ));
                return ExitCode::from(exitcode::SOFTWARE as u8);
            }
        }
    }

    ExitCode::from(exitcode::OK as u8)
}
