#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

use strata_core::{compile_module, inspect, render_diagnostic, CompilerContext, InspectFlags};
use strata_ir::{disassemble_module, Value};
use strata_vm::{Principal, Vm};

#[derive(Parser)]
#[command(name = "strata", version, about = "Strata language toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the token stream as JSON.
    Tokenize { file: PathBuf },
    /// Print the parsed module as JSON.
    Parse { file: PathBuf },
    /// Register the module and run version + security validation.
    Check { file: PathBuf },
    /// Compile to bytecode; JSON by default, `--disasm` for a listing.
    Compile {
        file: PathBuf,
        #[arg(long)]
        disasm: bool,
    },
    /// Compile and execute `name:version`.
    Run {
        file: PathBuf,
        /// Function to execute, e.g. `main:v1`.
        entry: String,
        /// Integer or string arguments.
        args: Vec<String>,
        /// Principal as `id:role1,role2`.
        #[arg(long, default_value = "cli:")]
        principal: String,
    },
    /// Report registered versions, security state and diagnostics.
    Inspect {
        file: PathBuf,
        #[arg(long)]
        versions: bool,
        #[arg(long)]
        security: bool,
        #[arg(long)]
        diagnostics: bool,
    },
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Tokenize { file } => {
            let source = read(&file)?;
            let tokens = strata_lex::tokenize(&source);
            println!(
                "{}",
                serde_json::to_string_pretty(&tokens).into_diagnostic()?
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Parse { file } => {
            let source = read(&file)?;
            let module = strata_parse::parse_source(&source)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&module).into_diagnostic()?
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { file } => {
            let source = read(&file)?;
            let module = strata_parse::parse_source(&source)?;
            let mut ctx = CompilerContext::new();
            ctx.register_module(&module);
            ctx.analyze_security();
            for diag in ctx.diagnostics.iter() {
                eprint!("{}", render_diagnostic(diag, &source));
            }
            if ctx.diagnostics.has_errors() {
                Ok(ExitCode::FAILURE)
            } else {
                println!("ok: module '{}' validates", module.name);
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Compile { file, disasm } => {
            let source = read(&file)?;
            let module = strata_parse::parse_source(&source)?;
            let bytecode = compile_module(&module)?;
            if disasm {
                print!("{}", disassemble_module(&bytecode));
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&bytecode).into_diagnostic()?
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            file,
            entry,
            args,
            principal,
        } => {
            let source = read(&file)?;
            let module = strata_parse::parse_source(&source)?;
            let bytecode = compile_module(&module)?;
            let principal = parse_principal(&principal);
            let args = args.iter().map(|a| parse_arg(a)).collect();
            let mut vm = Vm::new();
            let result = vm.execute(&bytecode, &entry, args, &principal)?;
            println!("{result}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect {
            file,
            versions,
            security,
            diagnostics,
        } => {
            let source = read(&file)?;
            let module = strata_parse::parse_source(&source)?;
            let mut ctx = CompilerContext::new();
            ctx.register_module(&module);
            ctx.analyze_security();
            let flags = if versions || security || diagnostics {
                InspectFlags {
                    versions,
                    security,
                    diagnostics,
                }
            } else {
                InspectFlags::all()
            };
            print!("{}", inspect(&ctx, &source, flags));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read(path: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(path).into_diagnostic()
}

/// `id:role1,role2` — roles optional.
fn parse_principal(spec: &str) -> Principal {
    let (id, roles) = spec.split_once(':').unwrap_or((spec, ""));
    let roles: Vec<String> = roles
        .split(',')
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    Principal::new(id, roles)
}

/// Integers, booleans and bare strings.
fn parse_arg(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = text.parse::<f64>() {
        return Value::Float(x);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(text.to_string()),
    }
}
