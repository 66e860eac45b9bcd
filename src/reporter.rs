use std::fmt;

/// Which stage of the pipeline produced a diagnostic. The teacher
/// distinguishes `Tokenizing`/`Parsing`/`Runtime`; since this compiler
/// folds scanning into the same pass as parsing (there is no separate
/// tokenizing phase the caller ever observes), `Tokenizing` and
/// `Parsing` collapse into a single `Compile` phase here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Runtime,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Compile => write!(f, "compile error"),
            Phase::Runtime => write!(f, "runtime error"),
        }
    }
}

/// A single diagnostic. `line` is `None` for errors with no useful
/// source position (e.g. an I/O failure reading the input file).
#[derive(Debug, Clone)]
pub struct Report {
    pub phase: Phase,
    pub message: String,
    pub line: Option<usize>,
}

impl Report {
    pub fn new(phase: Phase, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            phase,
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[line {line}] {}: {}", self.phase, self.message),
            None => write!(f, "{}: {}", self.phase, self.message),
        }
    }
}

/// Sink for diagnostics produced while compiling and running a chunk.
/// Grounded on the teacher's `Reporter` trait (`reporter.rs`): kept the
/// warning/error split, dropped the Arabic-language report bodies and
/// `Phase::Tokenizing` (see `Phase` above).
pub trait Reporter {
    fn warning(&mut self, report: Report);
    fn error(&mut self, report: Report);
}

/// A `Reporter` that prints to stderr, used by the CLI driver. Grounded
/// on the teacher's `cli_reporter.rs`.
#[derive(Default)]
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn warning(&mut self, report: Report) {
        eprintln!("warning: {report}");
    }

    fn error(&mut self, report: Report) {
        eprintln!("{report}");
    }
}
