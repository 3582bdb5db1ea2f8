use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tube_remote::commands::Command;

enum Invocation {
    Done,
    Daemon(tube_remote::Options),
    Send {
        config_file: Option<PathBuf>,
        command: String,
    },
}

fn main() {
    let invocation = match handle_cli_flags(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("error: {err:?}\n\nRun `tube-remote --help` for usage.");
            std::process::exit(2);
        }
    };

    let result = match invocation {
        Invocation::Done => return,
        Invocation::Daemon(options) => tube_remote::run(options),
        Invocation::Send {
            config_file,
            command,
        } => send_once(config_file, &command),
    };
    if let Err(err) = result {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(mut args: impl Iterator<Item = String>) -> Result<Invocation> {
    let mut config_file = None;
    let mut send = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("tube-remote {}", tube_remote::VERSION);
                return Ok(Invocation::Done);
            }
            "--help" | "-h" => {
                println!(
                    "tube-remote - Drive a YouTube watch page from key bindings.\n\nUsage:\n  tube-remote [--config <path>]                 Run the daemon\n  tube-remote [--config <path>] send <command>  Send one command to the daemon\n\n  --config <path>      Read configuration from <path>\n  --commands           List the command names and exit\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                return Ok(Invocation::Done);
            }
            "--commands" => {
                for command in Command::ALL {
                    println!("{command}");
                }
                return Ok(Invocation::Done);
            }
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_file = Some(PathBuf::from(path));
            }
            "send" => {
                let name = args.next().context("send needs a command name")?;
                send = Some(name);
            }
            other => bail!("unexpected argument {other:?}"),
        }
    }

    Ok(match send {
        Some(command) => Invocation::Send {
            config_file,
            command,
        },
        None => Invocation::Daemon(tube_remote::Options { config_file }),
    })
}

fn send_once(config_file: Option<PathBuf>, name: &str) -> Result<()> {
    let command: Command = name.parse()?;
    let cfg = tube_remote::config::load(tube_remote::config::LoadOptions {
        config_file,
        env_prefix: None,
    })
    .context("load config")?;
    tube_remote::remote::send(&cfg.remote.listen_addr, command)?;
    println!("sent {command}");
    Ok(())
}
