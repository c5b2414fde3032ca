use anyhow::Result;
use colored::Colorize;
use metronome::prelude::*;
use metronome::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());
    println!("{}", "-----------------------------------------------------------------".dimmed());
    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());
    println!("{}", "-----------------------------------------------------------------".dimmed());
}

/// Spawns a task that prints lifecycle events while `verbose` is set.
fn spawn_event_listener(scheduler: &Scheduler, verbose: Arc<AtomicBool>) {
    let mut events = scheduler.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if verbose.load(Ordering::Relaxed) {
                println!("\n<-- [SCHEDULER EVENT] {:?}\n>> ", event);
            }
        }
    });
}

/// A metronome that prints roughly once per second.
fn printing_metronome(label: &'static str, per_second: u64) -> SharedTarget {
    let ticks = AtomicU64::new(0);
    tick_fn(move |event| {
        let count = ticks.fetch_add(1, Ordering::Relaxed);
        if count % per_second == 0 {
            println!(
                "<-- [{}] tick #{} at {}ms",
                label,
                count + 1,
                event.relative_time(TimeUnit::Milliseconds)
            );
        }
    })
}

fn parse_millis(arg: Option<&&str>) -> Option<i64> {
    arg.and_then(|s| s.parse::<i64>().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let scheduler = Scheduler::from_config_file(env::args().nth(1).as_deref())?;
    let per_second = (1_000 / scheduler.update_period(TimeUnit::Milliseconds).max(1)).max(1) as u64;

    let verbose = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&scheduler, verbose.clone());
    info!(
        "{} ready: period {}ms, {} workers.",
        ENGINE_NAME.cyan(),
        scheduler.update_period(TimeUnit::Milliseconds),
        scheduler.concurrency_capacity()
    );

    // The shell's state management variables.
    let mut handles: BTreeMap<usize, EntryId> = BTreeMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!("Type 'help' for commands or 'exit' to quit.");

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting metroshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "add" => {
                let id = match (args.get(1).copied(), parse_millis(args.get(2))) {
                    (Some("metronome"), _) => {
                        Some(scheduler.schedule_recurring(printing_metronome("METRONOME", per_second)))
                    }
                    (Some("alarm"), Some(ms)) => Some(scheduler.schedule_alarm_only(
                        alarm_fn(move |event| {
                            println!(
                                "<-- [ALARM] {}ms alarm fired at {}ms",
                                ms,
                                event.relative_time(TimeUnit::Milliseconds)
                            )
                        }),
                        ms,
                        TimeUnit::Milliseconds,
                    )),
                    (Some("delayed"), Some(ms)) => Some(scheduler.schedule_delayed_recurring(
                        printing_metronome("DELAYED", per_second),
                        ms,
                        TimeUnit::Milliseconds,
                    )),
                    _ => {
                        println!("Usage: add metronome | add alarm <MS> | add delayed <MS>");
                        None
                    }
                };
                if let Some(id) = id {
                    handles.insert(next_handle, id);
                    println!("--> Added entry with handle: #{}", next_handle);
                    next_handle += 1;
                }
            }
            "remove" => match args.get(1).and_then(|s| s.parse::<usize>().ok()) {
                Some(handle) => match handles.remove(&handle) {
                    Some(id) if scheduler.unschedule(id) => {
                        println!("--> Entry #{} removed.", handle)
                    }
                    Some(_) => println!("--> Error: Entry not found in scheduler."),
                    None => println!(
                        "Error: Invalid handle #{}. Use 'list' to see entries.",
                        handle
                    ),
                },
                None => println!("Usage: remove <HANDLE>"),
            },
            "list" => {
                let kinds: BTreeMap<_, _> = scheduler.entries().into_iter().collect();
                println!("Entries:");
                for (handle, id) in &handles {
                    if let Some(kind) = kinds.get(id) {
                        println!("  Handle #{}: {:?}", handle, kind);
                    }
                }
            }
            "start" => match scheduler.start() {
                Ok(()) => println!("--> Scheduler running."),
                Err(e) => println!("--> Error: {}", e),
            },
            "stop" => {
                let start_instant = scheduler.stop();
                if start_instant == 0 {
                    println!("--> Scheduler was not running.");
                } else {
                    println!("--> Stopped. Run start instant: {}ns", start_instant);
                }
            }
            "events" => {
                let on = !verbose.load(Ordering::Relaxed);
                verbose.store(on, Ordering::Relaxed);
                println!("--> Event printing {}.", if on { "on" } else { "off" });
            }
            "help" => {
                println!("Available commands:");
                println!("  add metronome         - Adds a metronome ticking every period.");
                println!("  add alarm <MS>        - Adds an alarm firing MS after start.");
                println!("  add delayed <MS>      - Adds a metronome starting MS after start.");
                println!("  list                  - Shows entries and their handles.");
                println!("  remove <H>            - Removes an entry by its handle.");
                println!("  start                 - Starts the scheduler.");
                println!("  stop                  - Stops it and prints the start instant.");
                println!("  events                - Toggles printing of scheduler events.");
                println!("  exit                  - Quits the shell.");
            }
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    scheduler.stop();
    Ok(())
}
