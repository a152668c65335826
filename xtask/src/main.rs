//! Developer tasks for the connpool workspace.
//!
//! ```bash
//! cargo xtask ci                      # fmt check, clippy, tests, docs
//! cargo xtask test --repeat 20        # hunt timing flakes in the usage tests
//! cargo xtask example                 # TCP checkout demo
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Developer tasks for connpool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format check, clippy, tests and docs, stopping at the first failure
    Ci,
    /// Check formatting, or apply it with --fix
    Fmt {
        #[arg(long)]
        fix: bool,
    },
    /// Clippy over every target with warnings denied
    Clippy,
    /// Run the test suite
    Test {
        /// Only test this package
        #[arg(short, long)]
        package: Option<String>,
        /// Run the suite this many times in a row
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Build API docs with rustdoc warnings denied
    Doc,
    /// Run the TCP checkout example
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .context("xtask is not inside a workspace")?;
    sh.change_dir(root);

    match cli.command {
        Command::Ci => {
            fmt(&sh, false)?;
            clippy(&sh)?;
            test(&sh, None, 1)?;
            doc(&sh)?;
            println!("ci: all steps passed");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { package, repeat } => test(&sh, package.as_deref(), repeat)?,
        Command::Doc => doc(&sh)?,
        Command::Example => cmd!(sh, "cargo run -p connpool --example checkout").run()?,
    }
    Ok(())
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        cmd!(sh, "cargo fmt --all").run()?;
    } else {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>, repeat: u32) -> Result<()> {
    if repeat == 0 {
        bail!("--repeat must be at least 1");
    }

    let scope = match package {
        Some(pkg) => vec!["-p", pkg],
        None => vec!["--workspace"],
    };
    let scope = &scope;

    for round in 1..=repeat {
        if repeat > 1 {
            println!("test round {round}/{repeat}");
        }
        cmd!(sh, "cargo test {scope...}").run()?;
    }
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    let _rustdocflags = sh.push_env("RUSTDOCFLAGS", "-D warnings");
    cmd!(sh, "cargo doc --workspace --no-deps").run()?;
    Ok(())
}
