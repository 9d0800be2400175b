mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use log::{debug, info};

use sequence::{CompiledScript, DiagnosticError, RunReport, Sandbox, compile_source};

use crate::config::ScriptConfig;

const SUBCOMMANDS: &[&str] = &["run", "check", "dump", "test", "help"];

#[derive(Parser)]
#[command(name = "mscript", version, about = "Mission script compiler and runner")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// TOML file with extra command keywords, solver types and loop limits
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile, initialize and run a script
    Run(FileArgs),

    /// Compile a script without running it (exit 0 if valid)
    Check(FileArgs),

    /// Print the compiled mission sequence
    Dump(DumpArgs),

    /// Run .test.script test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct FileArgs {
    /// Script file
    file: String,
}

#[derive(clap::Args)]
struct DumpArgs {
    /// Script file
    file: String,

    /// Show each command's arena slot
    #[arg(long = "addr")]
    show_addr: bool,

    /// Show each command's generating string
    #[arg(long = "gen")]
    show_gen: bool,

    /// Indentation; spaces also indent nested branches
    #[arg(long, default_value = "  ")]
    indent: String,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.script file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn init_logging() {
    if pretty_env_logger::try_init_custom_env("MSCRIPT_LOG").is_err() {
        debug!("logger already installed");
    }
}

fn main() {
    init_logging();

    // `mscript file.script` is shorthand for `mscript run file.script`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = first_positional(&args) {
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(pos, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    let settings = match &cli.config {
        Some(path) => match ScriptConfig::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => ScriptConfig::default(),
    };

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Run(file) => do_run(&file.file, &settings, color_choice),
        Command::Check(file) => {
            let session = Session::open(&file.file, color_choice);
            let script = session.compile(&settings);
            eprintln!(
                "ok: {} compiled to {} command(s)",
                file.file,
                script.arena.live_count()
            );
        }
        Command::Dump(dump) => {
            let session = Session::open(&dump.file, color_choice);
            let sandbox = Sandbox::new(session.compile(&settings), settings.run_options());
            print!("{}", sandbox.command_seq_string(dump.show_addr, dump.show_gen, &dump.indent));
        }
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code =
                test_runner::run_tests(path, cli.no_color, &test_args.category, &settings);
            process::exit(exit_code);
        }
    }
}

/// Index of the first argument that is neither an option nor an option's
/// value.
fn first_positional(args: &[String]) -> Option<usize> {
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            arg if arg.starts_with('-') => i += 1,
            _ => return Some(i),
        }
    }
    None
}

/// One script file registered with codespan for diagnostics.
struct Session {
    files: SimpleFiles<String, String>,
    file_id: usize,
    writer: StandardStream,
    config: term::Config,
}

impl Session {
    fn open(path: &str, color_choice: ColorChoice) -> Self {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read '{}': {}", path, e);
                process::exit(1);
            }
        };
        let mut files = SimpleFiles::new();
        let file_id = files.add(path.to_string(), source);
        Session {
            files,
            file_id,
            writer: StandardStream::stderr(color_choice),
            config: term::Config::default(),
        }
    }

    fn source(&self) -> &str {
        self.files.get(self.file_id).map(|f| f.source().as_str()).unwrap_or("")
    }

    /// Compile the file or exit after reporting every error.
    fn compile(&self, settings: &ScriptConfig) -> CompiledScript {
        match compile_source(self.source(), self.file_id, &settings.registry()) {
            Ok(script) => {
                debug!("compiled {} command(s)", script.arena.live_count());
                script
            }
            Err(errors) => {
                self.emit_all(&errors);
                eprintln!("error: could not compile due to {} error(s)", errors.len());
                process::exit(1);
            }
        }
    }

    fn emit(&self, error: &DiagnosticError) {
        emit_diagnostic_error(&self.writer, &self.config, &self.files, error);
    }

    fn emit_all(&self, errors: &[DiagnosticError]) {
        for error in errors {
            self.emit(error);
        }
    }
}

fn do_run(path: &str, settings: &ScriptConfig, color_choice: ColorChoice) {
    let session = Session::open(path, color_choice);
    let mut sandbox = Sandbox::new(session.compile(settings), settings.run_options());

    match sandbox.execute() {
        Ok(report) => {
            session.emit_all(&report.warnings);
            info!("{} command(s) executed", report.commands_executed);
            print_results(&report);
        }
        Err(error) => {
            session.emit(&error);
            process::exit(1);
        }
    }
}

fn print_results(report: &RunReport) {
    for (solver, results) in &report.solver_results {
        println!("{}:", solver);
        if results.is_empty() {
            println!("  (no results)");
        }
        for result in results {
            let value = result
                .value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<24} {:<16} {} ({} report(s))",
                result.name,
                result.kind.to_string(),
                value,
                result.reports
            );
        }
    }
}

fn emit_diagnostic_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    let severity = if error.is_warning {
        Severity::Warning
    } else {
        Severity::Error
    };
    let mut notes = Vec::new();
    if let sequence::SequenceError::Parse(parse) = &error.error {
        notes.extend(parse.notes.iter().cloned());
    }
    match &error.span {
        Some(span) => {
            let diagnostic = Diagnostic::new(severity)
                .with_message(error.to_string())
                .with_labels(vec![Label::primary(error.source_id, span.clone())])
                .with_notes(notes);
            let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
        }
        None => {
            let prefix = if error.is_warning { "warning" } else { "error" };
            eprintln!("{}: {}", prefix, error);
        }
    }
}
