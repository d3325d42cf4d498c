use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use arcadia_core::runtime::{ArcadiaVM, Clock};
use arcadia_core::telemetry::CollectionEvent;
use arcadia_core::{ArcadiaError, ArcadiaResult, AtomKind, Process, ProcessGuard, RuntimeConfig, Status, Value};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Arcadia object runtime driver
#[derive(Parser, Debug)]
#[command(name = "arcadia", version)]
struct Opts {
    /// JSON runtime configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Intern byte strings and report the atom table
    Intern {
        /// Require qualified dotted names
        #[arg(long)]
        name: bool,
        words: Vec<String>,
    },
    /// Allocate garbage and run the collector to its fixed point
    Collect {
        #[arg(long, default_value_t = 16)]
        objects: usize,
        /// Number of lists kept pinned
        #[arg(long, default_value_t = 0)]
        keep: usize,
        /// Ticks to advance the clock before collecting
        #[arg(long, default_value_t = 0)]
        advance: u64,
        #[arg(long)]
        purge: bool,
    },
    /// Build a map from key=value pairs
    Map { pairs: Vec<String> },
}

#[derive(Serialize, Debug)]
struct AtomReport {
    text: String,
    hash: u64,
}

#[derive(Serialize, Debug)]
struct InternReport {
    atoms: Vec<AtomReport>,
    size: usize,
    capacity: usize,
}

#[derive(Serialize, Debug)]
struct CollectReport {
    allocated: usize,
    destroyed: u64,
    live: usize,
    events: Vec<CollectionEvent>,
}

#[derive(Serialize, Debug)]
struct MapReport {
    entries: Vec<(String, String)>,
    capacity: usize,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Report {
    Intern(InternReport),
    Collect(CollectReport),
    Map(MapReport),
}

fn load_config(path: Option<&Path>) -> ArcadiaResult<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| ArcadiaError::environment_failed(format!("reading {}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| ArcadiaError::environment_failed(format!("parsing {}: {}", path.display(), e)))
}

fn intern(vm: &mut ArcadiaVM, name: bool, words: &[String]) -> ArcadiaResult<InternReport> {
    let kind = if name { AtomKind::Name } else { AtomKind::Bytes };
    let mut atoms = Vec::with_capacity(words.len());
    for word in words {
        let atom = vm.get_or_create_atom(kind, word.as_bytes())?;
        atoms.push(AtomReport {
            text: vm.atom_to_str(atom)?.to_string(),
            hash: vm.atom_hash(atom)?,
        });
    }
    Ok(InternReport {
        atoms,
        size: vm.atom_table_size()?,
        capacity: vm.atom_table_capacity()?,
    })
}

/// Each collected object is a list plus its atom.
fn allocation_count(objects: usize) -> usize {
    objects.saturating_mul(2)
}

fn collect(vm: &mut ArcadiaVM, objects: usize, keep: usize, advance: u64, purge: bool) -> ArcadiaResult<CollectReport> {
    let events = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = events.clone();
    vm.set_telemetry_sink(Box::new(move |event: &CollectionEvent| sink.borrow_mut().push(*event)));
    vm.set_clock(Clock::manual(0));

    for i in 0..objects {
        let atom = vm.get_or_create_atom_str(&format!("object-{}", i))?;
        let list = vm.allocate_list_from([Value::from(atom), Value::from(i)])?;
        if i < keep {
            vm.lock(list)?;
        }
    }
    vm.advance_clock(advance)?;
    let stats = vm.run_arms(purge)?;
    vm.clear_telemetry_sink();

    let events = events.borrow().clone();
    Ok(CollectReport {
        allocated: allocation_count(objects),
        destroyed: stats.destroyed,
        live: vm.heap().len(),
        events,
    })
}

fn build_map(vm: &mut ArcadiaVM, pairs: &[String]) -> ArcadiaResult<MapReport> {
    let map = vm.allocate_map()?;
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ArcadiaError::argument_value_invalid(format!("expected key=value, got '{}'", pair)))?;
        let key = vm.get_or_create_atom_str(key)?;
        let value = vm.get_or_create_atom_str(value)?;
        vm.map_set(map, Value::from(key), Value::from(value))?;
    }

    let pairs: Vec<(Value, Value)> = vm.with_map(map, |map, _| map.entries().collect())?;
    let mut entries = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        entries.push((
            vm.atom_to_str(key.get_atom()?)?.to_string(),
            vm.atom_to_str(value.get_atom()?)?.to_string(),
        ));
    }
    entries.sort();
    Ok(MapReport {
        entries,
        capacity: vm.with_map(map, |map, _| map.capacity())?,
    })
}

fn print<T: Serialize + std::fmt::Debug>(json: bool, report: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{:#?}", report);
    }
    Ok(())
}

fn execute(vm: &mut ArcadiaVM, command: &Command) -> ArcadiaResult<Report> {
    match command {
        Command::Intern { name, words } => intern(vm, *name, words).map(Report::Intern),
        Command::Collect {
            objects,
            keep,
            advance,
            purge,
        } => collect(vm, *objects, *keep, *advance, *purge).map(Report::Collect),
        Command::Map { pairs } => build_map(vm, pairs).map(Report::Map),
    }
}

/// Runs `command` under a jump target. A caught failure is reported and
/// becomes the process exit status.
fn dispatch(process: &Process, command: &Command) -> anyhow::Result<Result<Report, i32>> {
    let outcome = process.with_runtime(|vm| vm.protect(|vm| execute(vm, command)))?;
    Ok(outcome.map_err(|error| {
        eprintln!("error: {}", error);
        process.exit_code()
    }))
}

fn run(opts: Opts) -> anyhow::Result<i32> {
    let config = load_config(opts.config.as_deref())?;
    let process = ProcessGuard::with_config(config).context("starting process")?;
    tracing::debug!(command = ?opts.command, "running");

    match dispatch(&process, &opts.command)? {
        Ok(report) => {
            print(opts.json, &report)?;
            Ok(process.exit_code())
        }
        Err(code) => Ok(code),
    }
}

/// Status for failures raised outside the process, such as a bad config.
fn exit_status(error: &anyhow::Error) -> Status {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ArcadiaError>())
        .map(ArcadiaError::status)
        .unwrap_or(Status::EnvironmentFailed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let code = match run(opts) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {:#}", error);
            exit_status(&error).exit_code()
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_intern() {
        let opts = Opts::try_parse_from(["arcadia", "intern", "--name", "Foo.Bar", "Baz"]).unwrap();
        assert_eq!(
            opts.command,
            Command::Intern {
                name: true,
                words: vec!["Foo.Bar".to_string(), "Baz".to_string()],
            }
        );
        assert!(!opts.json);
    }

    #[test]
    fn parses_collect_defaults() {
        let opts = Opts::try_parse_from(["arcadia", "--json", "collect", "--purge"]).unwrap();
        assert!(opts.json);
        assert_eq!(
            opts.command,
            Command::Collect {
                objects: 16,
                keep: 0,
                advance: 0,
                purge: true,
            }
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(Opts::try_parse_from(["arcadia", "compile"]).is_err());
    }

    #[test]
    fn pinned_lists_survive_collection() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.atoms_startup().unwrap();
        let report = collect(&mut vm, 4, 1, 0, true).unwrap();
        // One pinned list and its atom remain.
        assert_eq!(report.live, 2);
        assert_eq!(report.destroyed, 6);
        assert_eq!(report.events.last().map(|e| e.destroyed), Some(0));
    }

    #[test]
    fn map_pairs_need_a_separator() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.atoms_startup().unwrap();
        let error = build_map(&mut vm, &["width".to_string()]).unwrap_err();
        assert_eq!(error.status, Status::ArgumentValueInvalid);
        let report = build_map(&mut vm, &["w=640".to_string(), "h=480".to_string(), "w=800".to_string()]).unwrap();
        assert_eq!(
            report.entries,
            vec![("h".to_string(), "480".to_string()), ("w".to_string(), "800".to_string())]
        );
    }

    #[test]
    fn failed_commands_set_the_process_exit_code() {
        let process = ProcessGuard::new().unwrap();
        let bad = Command::Map {
            pairs: vec!["width".to_string()],
        };
        let code = dispatch(&process, &bad).unwrap().unwrap_err();
        assert_eq!(code, Status::ArgumentValueInvalid.exit_code());
        assert_eq!(process.exit_code(), code);
    }

    #[test]
    fn successful_commands_exit_with_zero() {
        let process = ProcessGuard::new().unwrap();
        let intern = Command::Intern {
            name: true,
            words: vec!["Scene.Node".to_string()],
        };
        assert!(dispatch(&process, &intern).unwrap().is_ok());
        assert_eq!(process.exit_code(), 0);
    }

    #[test]
    fn allocation_count_saturates() {
        assert_eq!(allocation_count(3), 6);
        assert_eq!(allocation_count(usize::MAX), usize::MAX);
        assert_eq!(allocation_count(usize::MAX / 2 + 1), usize::MAX);
    }

    #[test]
    fn exit_status_comes_from_the_runtime_error() {
        let error = anyhow::Error::new(ArcadiaError::type_exists("Foo")).context("while registering");
        assert_eq!(exit_status(&error), Status::TypeExists);
        assert_eq!(exit_status(&anyhow::anyhow!("other")), Status::EnvironmentFailed);
    }
}
