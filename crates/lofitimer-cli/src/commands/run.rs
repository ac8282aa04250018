//! Interactive terminal view over the process-wide engine.
//!
//! Progress is redrawn on stderr at the visual cadence; line commands are
//! read from stdin. `status` prints the current progress as JSON on stdout.

use std::io::Write;
use std::time::Duration;

use clap::Args;
use lofitimer_core::timer::init_global;
use lofitimer_core::{
    Config, Dial, EngineHandle, Event, Progress, ServiceOptions, TimeField, TimerPhase,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::duration::parse_duration;

const BAR_WIDTH: usize = 20;

const HELP: &str = "\
commands: start | pause | toggle | stop | preset | set <HH:MM:SS>
          +h -h +m -m +s -s [count] | track | untrack | status | help | quit";

#[derive(Args)]
pub struct RunArgs {
    /// Session length (SECS or HH:MM:SS), saved as the new default
    #[arg(long)]
    duration: Option<String>,
    /// Do not count sessions from this run in the stats
    #[arg(long)]
    untracked: bool,
    /// Start counting down right away
    #[arg(long)]
    start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    Start,
    Pause,
    Toggle,
    Stop,
    Preset,
    Set(u32),
    Adjust(TimeField, i32),
    Track(bool),
    Status,
    Help,
    Quit,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(session(config, args));
    // A pending stdin read cannot be cancelled; don't wait on it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn session(config: Config, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let handle = init_global(|| ServiceOptions::from_config(&config))?;

    if let Some(value) = &args.duration {
        let dial = Dial::from_secs(u64::from(parse_duration(value)?));
        handle
            .configure(dial.hours, dial.minutes, dial.seconds)
            .await?;
    }
    if args.untracked {
        handle.set_counting(false).await?;
    }

    let mut view = handle.attach().await?;
    let mut events = handle.subscribe();
    if args.start {
        handle.start().await?;
    }

    eprintln!("{HELP}");
    let mut status = StatusLine::default();
    status.draw(&view.current());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(Some(ViewCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        status.clear();
                        execute(handle, command, &line).await?;
                    }
                    Ok(None) => {}
                    Err(message) => {
                        status.clear();
                        eprintln!("{message}");
                    }
                }
            }
            progress = view.changed() => {
                status.draw(&progress?);
            }
            event = events.recv() => match event {
                Ok(Event::SessionCompleted { duration_secs, counted, persisted, today, .. }) => {
                    status.clear();
                    report_completion(duration_secs, counted, persisted, today.as_ref());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    status.clear();
    drop(view);
    Ok(())
}

async fn execute(
    handle: &EngineHandle,
    command: ViewCommand,
    line: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let event = match command {
        ViewCommand::Start => handle.start().await?,
        ViewCommand::Pause => handle.pause().await?,
        ViewCommand::Toggle => handle.toggle().await?,
        ViewCommand::Stop => handle.stop().await?,
        ViewCommand::Preset => handle.toggle_preset().await?,
        ViewCommand::Set(secs) => {
            let dial = Dial::from_secs(u64::from(secs));
            handle
                .configure(dial.hours, dial.minutes, dial.seconds)
                .await?
        }
        ViewCommand::Adjust(field, delta) => handle.adjust(field, delta).await?,
        ViewCommand::Track(enabled) => handle.set_counting(enabled).await?,
        ViewCommand::Status => {
            let progress = handle.progress().await?;
            println!("{}", serde_json::to_string(&progress)?);
            return Ok(());
        }
        ViewCommand::Help | ViewCommand::Quit => {
            eprintln!("{HELP}");
            return Ok(());
        }
    };
    if event.is_none() {
        let phase = handle.query(|engine| engine.phase()).await?;
        eprintln!("'{}' ignored while {phase:?}", line.trim());
    }
    Ok(())
}

fn report_completion(
    duration_secs: u64,
    counted: bool,
    persisted: bool,
    today: Option<&lofitimer_core::DailyUsageRecord>,
) {
    let length = Dial::from_secs(duration_secs);
    match today {
        Some(record) if counted => eprintln!(
            "session complete ({length}), today: {} min in {} sessions{}",
            record.total_minutes,
            record.session_count,
            if persisted { "" } else { " (not saved)" }
        ),
        _ => eprintln!("session complete ({length}), not counted"),
    }
}

/// Parse one line of input. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ViewCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head.to_ascii_lowercase().as_str() {
        "start" | "resume" => ViewCommand::Start,
        "pause" => ViewCommand::Pause,
        "toggle" | "p" => ViewCommand::Toggle,
        "stop" | "reset" => ViewCommand::Stop,
        "preset" => ViewCommand::Preset,
        "track" => ViewCommand::Track(true),
        "untrack" => ViewCommand::Track(false),
        "status" => ViewCommand::Status,
        "help" | "?" => ViewCommand::Help,
        "quit" | "q" | "exit" => ViewCommand::Quit,
        "set" => {
            let value = words.next().ok_or("usage: set <SECS|HH:MM:SS>")?;
            ViewCommand::Set(parse_duration(value)?)
        }
        other => {
            let (sign, field) = match other.split_at_checked(1) {
                Some(("+", field)) => (1, field),
                Some(("-", field)) => (-1, field),
                _ => return Err(format!("unknown command '{head}', try 'help'")),
            };
            let field = field.parse::<TimeField>()?;
            let count = match words.next() {
                Some(n) => n
                    .parse::<i32>()
                    .map_err(|_| format!("invalid count '{n}'"))?,
                None => 1,
            };
            let delta = count
                .checked_mul(sign)
                .ok_or_else(|| format!("invalid count '{count}'"))?;
            ViewCommand::Adjust(field, delta)
        }
    };
    Ok(Some(command))
}

/// One-line rendering of `progress`.
pub fn render(progress: &Progress) -> String {
    let marker = match progress.phase {
        TimerPhase::Running => '>',
        TimerPhase::Paused => '=',
        TimerPhase::Configuring => ' ',
    };
    let fraction = progress.fraction_elapsed.clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    let mut line = format!(
        "{marker} {} [{}{}] {:>3}%  today {} min / {}",
        progress.label,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (fraction * 100.0).round() as u32,
        progress.today.total_minutes,
        progress.today.session_count,
    );
    if progress.preset_active {
        line.push_str("  preset");
    }
    if !progress.countable {
        line.push_str("  untracked");
    }
    line
}

/// The redrawn status line on stderr.
#[derive(Default)]
struct StatusLine {
    shown: Option<String>,
}

impl StatusLine {
    fn draw(&mut self, progress: &Progress) {
        let line = render(progress);
        if self.shown.as_deref() == Some(line.as_str()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K{line}");
        let _ = err.flush();
        self.shown = Some(line);
    }

    fn clear(&mut self) {
        if self.shown.take().is_some() {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\r\x1b[2K");
            let _ = err.flush();
        }
    }
}
