//! raftpm CLI - Package Compiler Front End
//!
//! Commands: develop pkg-compile, info
//! Outputs JSON to stdout, logs to stderr (filtered by RUST_LOG)
//! Returns 2 on compile/validation failure

use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use raftpm_core::{compile_template, inspect_package, sha256_hex, CompileError};

#[derive(Parser)]
#[command(name = "raftpm")]
#[command(version, about = "raftpm - portable package manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Package development tools
    Develop {
        #[command(subcommand)]
        command: DevelopCommands,
    },

    /// Describe a compiled package
    Info {
        /// Path to the package archive
        #[arg(short, long)]
        package: PathBuf,
    },
}

#[derive(Subcommand)]
enum DevelopCommands {
    /// Compile a package template into a package archive
    PkgCompile {
        /// Path to the package template
        #[arg(short, long)]
        src: PathBuf,

        /// Output path of the new package
        #[arg(short, long, default_value = "pkg.raftpm")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Develop {
            command: DevelopCommands::PkgCompile { src, out },
        } => pkg_compile(&src, &out),
        Commands::Info { package } => info_command(&package),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn pkg_compile(src: &Path, out: &Path) -> ExitCode {
    let file = match File::create(out) {
        Ok(file) => file,
        Err(e) => {
            print_failure(&format!("Couldn't create `{}`: {}", out.display(), e));
            return ExitCode::FAILURE;
        }
    };

    let mut sink = BufWriter::new(file);
    let result = compile_template(src, &mut sink).and_then(|()| {
        sink.flush().map_err(|source| CompileError::Io {
            path: out.to_path_buf(),
            source,
        })
    });
    drop(sink);

    if let Err(e) = result {
        error!(error = %e, "compilation failed");
        if let Err(rm) = fs::remove_file(out) {
            error!(error = %rm, path = %out.display(), "couldn't remove partial package");
        }
        print_failure(&e.to_string());
        return ExitCode::from(2);
    }

    let digest = match fs::read(out) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(e) => {
            print_failure(&format!("Couldn't read back `{}`: {}", out.display(), e));
            return ExitCode::FAILURE;
        }
    };

    info!(path = %out.display(), sha256 = %digest, "package written");
    let output = serde_json::json!({
        "success": true,
        "output": out.display().to_string(),
        "sha256": digest,
    });
    println!("{}", output);
    ExitCode::SUCCESS
}

fn info_command(package: &Path) -> ExitCode {
    let file = match File::open(package) {
        Ok(file) => file,
        Err(e) => {
            print_failure(&format!("Couldn't open `{}`: {}", package.display(), e));
            return ExitCode::FAILURE;
        }
    };

    match inspect_package(file) {
        Ok(info) => match serde_json::to_string_pretty(&info) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_failure(&e.to_string());
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            print_failure(&e.to_string());
            ExitCode::from(2)
        }
    }
}

fn print_failure(message: &str) {
    let output = serde_json::json!({
        "success": false,
        "error": message,
    });
    println!("{}", output);
}
