use libtest_mimic::{Arguments, Failed, Trial};
use serde::Deserialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process;
use walkdir::WalkDir;

fn main() {
    let args = Arguments::from_args();

    let tests = find_source_files("tests/input").map(extract_test).collect();

    libtest_mimic::run(&args, tests).exit();
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "kebab-case")]
struct Config {
    #[serde(default = "DEFAULT_IGNORE")]
    ignore: bool,
    /// The subcommand and its options. The input file is appended.
    #[serde(default = "DEFAULT_ARGS")]
    args: Vec<String>,
    #[serde(default = "DEFAULT_EXIT_CODE")]
    exit_code: i32,
    #[serde(default)]
    stdout_contains: Vec<String>,
    #[serde(default)]
    stderr_contains: Vec<String>,
}

const DEFAULT_IGNORE: fn() -> bool = || false;
const DEFAULT_ARGS: fn() -> Vec<String> = || vec!["check".to_owned()];
const DEFAULT_EXIT_CODE: fn() -> i32 = || 0;

struct TestFailure {
    name: &'static str,
    details: Vec<(&'static str, String)>,
}

/// Recursively walk over test files under a file path.
fn find_source_files(root: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matches!(entry.path().extension(), Some(ext) if ext == "eqn"))
        .map(|entry| entry.into_path())
}

fn extract_test(path: PathBuf) -> Trial {
    let name = path.display().to_string();
    let config = read_config(&path);
    let is_ignored = matches!(&config, Ok(config) if config.ignore);

    Trial::test(name, move || run_test(&path, config)).with_ignored_flag(is_ignored)
}

fn read_config(path: &Path) -> Result<Config, TestFailure> {
    use itertools::Itertools;

    const CONFIG_COMMENT_START: &str = "//~";

    let input_source = std::fs::read_to_string(path).map_err(|error| TestFailure {
        name: "unreadable test input",
        details: vec![("std::io::Error", error.to_string())],
    })?;
    // Collect the lines with CONFIG_COMMENT_START prefix, stripping the prefix in the process
    let config_source = input_source
        .lines()
        .filter_map(|line| line.split(CONFIG_COMMENT_START).nth(1))
        .join("\n");

    // Parse those lines as TOML
    toml::from_str::<Config>(&config_source).map_err(|error| TestFailure {
        name: "config parse error",
        details: vec![("toml::de::Error", error.to_string())],
    })
}

fn run_test(input_file: &Path, config: Result<Config, TestFailure>) -> Result<(), Failed> {
    let config = match config {
        Ok(config) => config,
        Err(failure) => return failures_to_outcome(&[failure]),
    };

    let mut exe = process::Command::new(env!("CARGO_BIN_EXE_equations"));
    exe.args(&config.args);
    exe.arg(input_file);

    let output = match exe.output() {
        Ok(output) => output,
        Err(error) => {
            return failures_to_outcome(&[TestFailure {
                name: "unexpected command error",
                details: vec![("std::io::Error", error.to_string())],
            }]);
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut failures = Vec::new();
    if output.status.code() != Some(config.exit_code) {
        failures.push(TestFailure {
            name: "unexpected exit status",
            details: vec![
                ("command", format!("{exe:?}")),
                ("status", output.status.to_string()),
                ("stdout", stdout.to_string()),
                ("stderr", stderr.to_string()),
            ],
        });
    }
    for expected in &config.stdout_contains {
        if !stdout.contains(expected.as_str()) {
            failures.push(TestFailure {
                name: "missing stdout",
                details: vec![("expected", expected.clone()), ("stdout", stdout.to_string())],
            });
        }
    }
    for expected in &config.stderr_contains {
        if !stderr.contains(expected.as_str()) {
            failures.push(TestFailure {
                name: "missing stderr",
                details: vec![("expected", expected.clone()), ("stderr", stderr.to_string())],
            });
        }
    }

    failures_to_outcome(&failures)
}

fn failures_to_outcome(failures: &[TestFailure]) -> Result<(), Failed> {
    if failures.is_empty() {
        return Ok(());
    }

    let mut msg = String::new();

    writeln!(msg).unwrap();
    for failure in failures {
        writeln!(msg, "    {}:", failure.name).unwrap();
        for (name, data) in &failure.details {
            writeln!(msg, "        ---- {name} ----").unwrap();
            for line in data.lines() {
                writeln!(msg, "        {line}").unwrap();
            }
        }
        writeln!(msg).unwrap();
    }
    writeln!(msg).unwrap();
    writeln!(msg, "    failures:").unwrap();
    for failure in failures {
        writeln!(msg, "        {}", failure.name).unwrap();
    }

    Err(msg.into())
}
