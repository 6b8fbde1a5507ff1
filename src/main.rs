//! Interactive front end: a line REPL on stdin plus the optional HTTP
//! listener, both feeding the same executor.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use liveload::error::{LiveloadError, Result};
use liveload::orchestrator::Control;
use liveload::server::RemoteControl;
use liveload::settings::Settings;
use liveload::{EngineHandle, Executor, Orchestrator, Runtime, ScriptEvaluator, UnitOutcome, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONTINUATION_PROMPT: &str = "...> ";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("liveload: {e}");
            ExitCode::FAILURE
        }
    }
}

fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args
                    .next()
                    .ok_or_else(|| LiveloadError::Config("--config needs a path".into()))?;
                path = Some(PathBuf::from(value));
            }
            other => {
                return Err(LiveloadError::Config(format!("unknown argument '{other}'")));
            }
        }
    }
    Ok(path)
}

fn run() -> Result<()> {
    let settings = Settings::load(config_path()?.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let runtime = Runtime::new(settings.module_path.clone());
    let mut orchestrator = Orchestrator::new(Box::new(ScriptEvaluator::new()), runtime);
    orchestrator.set_trace(settings.trace);
    let executor = Executor::spawn(orchestrator)?;
    let engine = executor.handle();

    // the REPL thread stays outside the runtime so it can block on replies
    let io_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let remote = RemoteControl::new(engine.clone());
    if settings.remote.listen_on_start {
        let addr = io_runtime.block_on(remote.start(&settings.remote.host, settings.remote.port))?;
        println!("listening on http://{addr}");
    }

    repl(&engine, &remote, &io_runtime, &settings)?;

    io_runtime.block_on(remote.stop());
    drop(executor);
    info!("bye");
    Ok(())
}

fn repl(
    engine: &EngineHandle,
    remote: &RemoteControl,
    io_runtime: &tokio::runtime::Runtime,
    settings: &Settings,
) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        let context = engine.status_blocking()?.context;
        let Some(unit) = read_unit(&mut input, &format!("{context}> "))? else {
            break;
        };
        let line = unit.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_whitespace().next().unwrap_or_default() {
            "%quit" | "%exit" => break,
            "%status" => {
                let status = engine.status_blocking()?;
                match serde_json::to_string_pretty(&status) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!(error = %e, "cannot render status"),
                }
            }
            "%listen" => {
                let arg = line.trim_start_matches("%listen").trim();
                match listen_address(arg, settings) {
                    Some((host, port)) => match io_runtime.block_on(remote.start(&host, port)) {
                        Ok(addr) => println!("listening on http://{addr}"),
                        Err(e) => eprintln!("{e}"),
                    },
                    None => eprintln!("usage: %listen [host:port | port]"),
                }
            }
            _ => match engine.submit_blocking(unit.as_str(), None) {
                Ok(outcome) => show(&outcome),
                Err(LiveloadError::Eval(e)) => eprintln!("{}", e.formatted()),
                Err(LiveloadError::ExecutorGone) => return Err(LiveloadError::ExecutorGone),
                Err(e) => eprintln!("{e}"),
            },
        }
    }
    Ok(())
}

// Reads one unit: a single line, or several while brackets remain open.
// Returns None at end of input.
fn read_unit(input: &mut impl BufRead, prompt: &str) -> Result<Option<String>> {
    let mut unit = String::new();
    let mut depth: i64 = 0;
    loop {
        print!("{}", if unit.is_empty() { prompt } else { CONTINUATION_PROMPT });
        io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok((!unit.is_empty()).then_some(unit));
        }
        depth += open_brackets(&line);
        unit.push_str(&line);
        if depth <= 0 {
            return Ok(Some(unit));
        }
    }
}

fn open_brackets(line: &str) -> i64 {
    let mut depth = 0;
    let mut quote = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => break,
                '"' | '\'' => quote = Some(c),
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => depth -= 1,
                _ => (),
            },
        }
    }
    depth
}

fn listen_address(arg: &str, settings: &Settings) -> Option<(String, u16)> {
    let remote = &settings.remote;
    if arg.is_empty() {
        return Some((remote.host.clone(), remote.port));
    }
    if let Ok(port) = arg.parse::<u16>() {
        return Some((remote.host.clone(), port));
    }
    let (host, port) = arg.rsplit_once(':')?;
    Some((host.to_owned(), port.parse().ok()?))
}

fn show(outcome: &UnitOutcome) {
    if outcome.traced {
        for line in outcome.trace_lines() {
            println!("# {line}");
        }
    }
    match &outcome.control {
        Some(Control::Trace(on)) => println!("trace {}", if *on { "on" } else { "off" }),
        Some(Control::Switched(_)) | None => (),
    }
    if !matches!(outcome.value, Value::Nil) {
        println!("{}", outcome.value.repr());
    }
}
