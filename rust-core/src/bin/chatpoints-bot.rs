// Stand-alone host for the scripts: reads chat lines from stdin, keeps balances
// in memory and prints every outgoing message on stdout.
//
// Input lines:
//   <user>: <message>            stream chat
//   /w <user>: <message>         stream whisper
//   /d <user>: <message>         discord chat
//   /dw <user>: <message>        discord DM
//   :points <user> <amount>      register a viewer with a starting balance
//   :grant <user> <permission>   grant a permission level
//   :live on|off                 toggle stream live status
//   :reload <script> <json>      reload a script's settings from JSON
//   :save                        persist all settings

use chatpoints_core::command::{ChatCommand, Platform};
use chatpoints_core::host::{Channel, MemoryHost};
use chatpoints_core::scripts::{DonateScript, GiveScript, RaffleScript, ScriptRunner, TopScript};
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

enum Input {
    Line(String),
    Tick,
    Eof,
}

struct Options {
    scripts_dir: PathBuf,
    currency: String,
    tick_ms: u64,
    overlay_addr: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("chatpoints-bot: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn parse_args() -> Result<Options, String> {
    let mut opts = Options {
        scripts_dir: PathBuf::from("scripts"),
        currency: "points".to_string(),
        tick_ms: 1_000,
        overlay_addr: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || args.next().ok_or_else(|| format!("missing value for {}", arg));
        match arg.as_str() {
            "--scripts-dir" => opts.scripts_dir = PathBuf::from(value()?),
            "--currency" => opts.currency = value()?,
            "--tick-ms" => {
                opts.tick_ms = value()?
                    .parse()
                    .map_err(|_| "--tick-ms expects milliseconds".to_string())?
            }
            "--overlay" => opts.overlay_addr = Some(value()?),
            _ => return Err(format!("unknown arg {}", arg)),
        }
    }
    Ok(opts)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn run() -> Result<(), String> {
    let opts = parse_args()?;
    let mut host = MemoryHost::new(opts.currency.clone());
    host.set_now_ms(now_ms());

    if let Some(addr) = &opts.overlay_addr {
        attach_overlay(addr, &mut host)?;
    }

    let mut runner = ScriptRunner::new();
    runner.add(Box::new(GiveScript::from_dir(opts.scripts_dir.join("give"))));
    runner.add(Box::new(DonateScript::from_dir(opts.scripts_dir.join("donate"))));
    runner.add(Box::new(TopScript::from_dir(opts.scripts_dir.join("top10"))));
    runner.add(Box::new(RaffleScript::from_dir(opts.scripts_dir.join("raffle"))));

    let (tx, rx) = mpsc::channel();
    let tx_tick = tx.clone();
    let tick = Duration::from_millis(opts.tick_ms.max(10));
    thread::spawn(move || loop {
        thread::sleep(tick);
        if tx_tick.send(Input::Tick).is_err() {
            break;
        }
    });
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(Input::Eof);
    });

    for input in rx {
        host.set_now_ms(now_ms());
        match input {
            Input::Tick => runner.tick(&mut host),
            Input::Line(line) => handle_line(line.trim(), &mut runner, &mut host),
            Input::Eof => break,
        }
        flush_outbox(&mut host);
    }

    runner.save_all(&mut host);
    Ok(())
}

#[cfg(feature = "overlay")]
fn attach_overlay(addr: &str, host: &mut MemoryHost) -> Result<(), String> {
    use chatpoints_core::overlay::{start_overlay_server, OverlayBoard};
    let board = OverlayBoard::new();
    host.set_event_listener(board.listener());
    let bound = start_overlay_server(addr, board).map_err(|e| format!("overlay bind {}: {}", addr, e))?;
    eprintln!("overlay on http://{}/events", bound);
    Ok(())
}

#[cfg(not(feature = "overlay"))]
fn attach_overlay(_addr: &str, _host: &mut MemoryHost) -> Result<(), String> {
    Err("built without the overlay feature".into())
}

fn handle_line(line: &str, runner: &mut ScriptRunner, host: &mut MemoryHost) {
    if line.is_empty() {
        return;
    }
    if let Some(control) = line.strip_prefix(':') {
        handle_control(control, runner, host);
        return;
    }

    let (platform, is_whisper, rest) = if let Some(rest) = line.strip_prefix("/dw ") {
        (Platform::Discord, true, rest)
    } else if let Some(rest) = line.strip_prefix("/d ") {
        (Platform::Discord, false, rest)
    } else if let Some(rest) = line.strip_prefix("/w ") {
        (Platform::Stream, true, rest)
    } else {
        (Platform::Stream, false, line)
    };

    let Some((user, message)) = rest.split_once(':') else {
        eprintln!("expected `<user>: <message>`");
        return;
    };
    let user = user.trim();
    if user.is_empty() {
        return;
    }
    // anyone who chats is an active viewer
    host.register(user, 0);
    let cmd = ChatCommand::parse(user, message, platform, is_whisper);
    runner.execute(&cmd, host);
}

fn handle_control(control: &str, runner: &mut ScriptRunner, host: &mut MemoryHost) {
    let mut parts = control.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("points"), Some(user), Some(amount)) => match amount.trim().parse::<i64>() {
            Ok(amount) => host.register(user, amount),
            Err(_) => eprintln!("bad amount {}", amount),
        },
        (Some("grant"), Some(user), Some(permission)) => host.grant(user, permission.trim()),
        (Some("live"), Some(flag), None) => host.set_live(flag == "on"),
        (Some("reload"), Some(script), Some(json)) => {
            if !runner.reload_settings(script, json, host) {
                eprintln!("no script named {} (loaded: {:?})", script, runner.names());
            }
        }
        (Some("save"), None, None) => runner.save_all(host),
        _ => eprintln!("unknown control line :{}", control),
    }
}

fn flush_outbox(host: &mut MemoryHost) {
    for msg in host.drain_outbox() {
        let label = match msg.channel {
            Channel::StreamChat => "stream".to_string(),
            Channel::DiscordChat => "discord".to_string(),
            Channel::StreamWhisper => format!("whisper@{}", msg.to.unwrap_or_default()),
            Channel::DiscordWhisper => format!("dm@{}", msg.to.unwrap_or_default()),
        };
        for line in msg.text.lines() {
            println!("[{}] {}", label, line);
        }
    }
}
