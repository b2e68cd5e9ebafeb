use std::path::{Path, PathBuf};
use std::process::ExitCode;

use zorkwright::driver::{report_crash, Driver, TerminalIoChannel};
use zorkwright::{InterpreterConfig, Interpreter, Memory, Vm};

fn usage(program: &str) -> String {
    format!("usage: {program} [--seed N] <story-file>")
}

struct Args {
    story_path: PathBuf,
    seed: Option<u64>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "zorkwright".to_string());
    let mut story_path = None;
    let mut seed = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--seed requires a value\n{}", usage(&program)))?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("--seed value must be a number\n{}", usage(&program)))?,
                );
            }
            "-h" | "--help" => return Err(usage(&program)),
            _ if story_path.is_none() => story_path = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument: {arg}\n{}", usage(&program))),
        }
    }
    let story_path = story_path.ok_or_else(|| usage(&program))?;
    Ok(Args { story_path, seed })
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(64); // EX_USAGE
        }
    };

    let bytes = match std::fs::read(&args.story_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read {}: {e}", args.story_path.display());
            return ExitCode::from(66); // EX_NOINPUT
        }
    };

    let memory = match Memory::new(bytes) {
        Ok(memory) => memory,
        Err(e) => {
            eprintln!("cannot load story file: {e}");
            return ExitCode::from(65); // EX_DATAERR
        }
    };

    let config = InterpreterConfig {
        rng_seed: args.seed,
        ..InterpreterConfig::default()
    };
    let vm = Vm::new(memory, &config);
    let interpreter = Interpreter::new(vm, TerminalIoChannel::new());
    let save_dir = save_dir_for(&args.story_path);
    let mut driver = Driver::new(interpreter, save_dir);

    match driver.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_crash(&e, &driver);
            ExitCode::from(70) // EX_SOFTWARE
        }
    }
}

fn save_dir_for(story_path: &Path) -> PathBuf {
    story_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
