#![allow(clippy::cargo_common_metadata)]

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Fmt,
    /// Check the workspace, then the browser build of the library
    Check,
    Clippy,
    /// Start the signaling relay
    Run(RelayArgs),
    Test {
        /// Skip the `wasm-pack` browser runs
        #[arg(long)]
        native: bool,
    },
    Doc,
    PreCommit,
}

/// Relay settings, passed on as `GANT_MEET_*` variables.
#[derive(Args, Debug, Default, PartialEq, Eq)]
struct RelayArgs {
    /// Listen address, e.g. 0.0.0.0:9001
    #[arg(long)]
    address: Option<String>,
    /// off, error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
    /// Joins must carry this secret
    #[arg(long)]
    secret: Option<String>,
    /// Refuse joins into rooms with this many members
    #[arg(long)]
    capacity: Option<usize>,
}

impl RelayArgs {
    fn env(&self) -> Vec<(&'static str, String)> {
        [
            ("GANT_MEET_ADDRESS", self.address.clone()),
            ("GANT_MEET_LOG_LEVEL", self.log_level.clone()),
            ("GANT_MEET_ACCESS_SECRET", self.secret.clone()),
            ("GANT_MEET_ROOM_CAPACITY", self.capacity.map(|capacity| capacity.to_string())),
        ]
        .into_iter()
        .filter_map(|(name, value)| Some((name, value?)))
        .collect()
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match &cli.command {
        Command::Fmt => fmt(&sh)?,
        Command::Check => check(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Run(relay) => run(&sh, relay)?,
        Command::Test { native } => test(&sh, *native)?,
        Command::Doc => doc(&sh)?,
        Command::PreCommit => pre_commit(&sh)?,
    };

    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo +nightly fmt").run()?)
}

fn check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo check --all-targets --all-features --workspace").run()?;
    // the web platform only exists on wasm32
    cmd!(sh, "cargo check --package gant-meet --target wasm32-unknown-unknown").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo clippy --all-targets --all-features --workspace").run()?)
}

fn run(sh: &Shell, relay: &RelayArgs) -> Result<()> {
    for (name, value) in relay.env() {
        sh.set_var(name, value);
    }
    Ok(cmd!(sh, "cargo run --package gant-meet-signaling-server").run()?)
}

fn test(sh: &Shell, native: bool) -> Result<()> {
    cmd!(sh, "cargo test --workspace").run()?;
    if native {
        return Ok(());
    }

    let _library = sh.push_dir(project_root::get_project_root()?.join("library/"));
    cmd!(sh, "wasm-pack test --headless --firefox").run()?;
    cmd!(sh, "wasm-pack test --headless --chrome").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo doc --no-deps --all-features").run()?)
}

fn pre_commit(sh: &Shell) -> Result<()> {
    fmt(sh)?;
    check(sh)?;
    test(sh, false)?;
    doc(sh)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_options_become_relay_environment() {
        let cli = Cli::try_parse_from([
            "xtask",
            "run",
            "--address",
            "0.0.0.0:9001",
            "--secret",
            "aula",
            "--capacity",
            "2",
        ])
        .unwrap();
        let Command::Run(relay) = cli.command else {
            panic!("expected the run command");
        };

        assert_eq!(
            relay.env(),
            vec![
                ("GANT_MEET_ADDRESS", "0.0.0.0:9001".to_owned()),
                ("GANT_MEET_ACCESS_SECRET", "aula".to_owned()),
                ("GANT_MEET_ROOM_CAPACITY", "2".to_owned()),
            ]
        );
    }

    #[test]
    fn bare_run_leaves_relay_defaults_alone() {
        let cli = Cli::try_parse_from(["xtask", "run"]).unwrap();
        let Command::Run(relay) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(relay, RelayArgs::default());
        assert!(relay.env().is_empty());
    }
}
