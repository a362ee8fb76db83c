use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use mapcore::Int2;
use mapctl::{run, CommandKind, CommonOptions, CATALOGUE_ENV_VAR, DEFAULT_CATALOGUE_PATH};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = CommonOptions::default().with_catalogue_env(env::var(CATALOGUE_ENV_VAR).ok());
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--catalogue" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --catalogue".to_string())?;
                options.catalogue = PathBuf::from(value);
                index += 2;
            }
            "--log-filter" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --log-filter".to_string())?;
                options.log_filter = Some(value.clone());
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "info" => CommandKind::Info {
            map: single_path(command, command_args)?,
        },
        "groups" => CommandKind::Groups {
            path: single_path(command, command_args)?,
        },
        "resave" => {
            let (map, rest) = split_path(command, command_args)?;
            CommandKind::Resave {
                map,
                output: parse_output(command, rest)?,
            }
        }
        "resize" => {
            let (map, rest) = split_path(command, command_args)?;
            let [width, height, tail @ ..] = rest else {
                return Err("resize requires <map> <width> <height>".to_string());
            };
            CommandKind::Resize {
                map,
                size: Int2::new(parse_i32("width", width)?, parse_i32("height", height)?),
                output: parse_output(command, tail)?,
            }
        }
        "pick" => {
            let (map, rest) = split_path(command, command_args)?;
            let [x, y] = rest else {
                return Err("pick requires <map> <x> <y>".to_string());
            };
            CommandKind::Pick {
                map,
                point: Int2::new(parse_i32("x", x)?, parse_i32("y", y)?),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    init_tracing(options.log_filter.as_deref());
    run(kind, &options, &mut io::stdout())
}

fn init_tracing(log_filter: Option<&str>) {
    let filter = match log_filter {
        Some(value) => EnvFilter::new(value),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn single_path(command: &str, args: &[String]) -> Result<PathBuf, String> {
    match args {
        [path] => Ok(PathBuf::from(path)),
        _ => Err(format!("{command} requires exactly one file path")),
    }
}

fn split_path<'a>(command: &str, args: &'a [String]) -> Result<(PathBuf, &'a [String]), String> {
    match args {
        [path, rest @ ..] => Ok((PathBuf::from(path), rest)),
        [] => Err(format!("{command} requires a map path")),
    }
}

fn parse_output(command: &str, args: &[String]) -> Result<Option<PathBuf>, String> {
    match args {
        [] => Ok(None),
        [flag, path] if flag == "--output" => Ok(Some(PathBuf::from(path))),
        _ => Err(format!(
            "unknown {command} arguments '{}' (expected --output <file>)",
            args.join(" ")
        )),
    }
}

fn parse_i32(name: &str, value: &str) -> Result<i32, String> {
    value
        .parse::<i32>()
        .map_err(|_| format!("invalid {name} value '{value}' (expected i32)"))
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    let catalogue_default = format!("  --catalogue {DEFAULT_CATALOGUE_PATH} (or ${CATALOGUE_ENV_VAR})");
    [
        "mapctl - tile map inspection and maintenance",
        "",
        "Usage:",
        "  mapctl [--catalogue <file>] [--log-filter <filter>] info <map>",
        "  mapctl [--catalogue <file>] [--log-filter <filter>] resave <map> [--output <file>]",
        "  mapctl [--catalogue <file>] [--log-filter <filter>] resize <map> <width> <height> [--output <file>]",
        "  mapctl [--catalogue <file>] [--log-filter <filter>] groups <groups-file>",
        "  mapctl [--catalogue <file>] [--log-filter <filter>] pick <map> <x> <y>",
        "",
        "Defaults:",
        catalogue_default.as_str(),
        "  --log-filter from RUST_LOG, else info",
    ]
    .join("\n")
}
