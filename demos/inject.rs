use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use shelltrace::{memory, Capabilities, Config, ProcessInfo, RegisterBlob, State, Tracer};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Executable to spawn. The payload is written over its entry point.
    #[structopt(short, long, default_value = "/bin/true")]
    exe: PathBuf,

    /// Redeliver unexpected signals to the tracee.
    #[structopt(short, long)]
    pass_signals: bool,

    /// Maximum number of stops to observe before detaching.
    #[structopt(short, long, default_value = "16")]
    max_stops: usize,

    /// Payload machine code, as hex.
    payload: String,
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s: String = s.trim_start_matches("0x").split_whitespace().collect();

    if s.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits");
    }

    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair).ok().filter(|d| d.is_ascii());
            let digits = digits.with_context(|| format!("not a hex byte: {:?}", pair))?;
            Ok(u8::from_str_radix(digits, 16)?)
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    let payload = parse_hex(&opt.payload)?;
    let config = Config::new().forward_signals(opt.pass_signals);

    let exe = File::open(&opt.exe).with_context(|| format!("opening {}", opt.exe.display()))?;
    let mut tracer = Tracer::spawn(&exe)?;
    let mut info = ProcessInfo::new(tracer.pid(), Capabilities::new());

    tracer.peek(&mut info)?;
    let pc = info.program_counter().context("no program counter")?;

    println!("pid = {}, injecting {} bytes at {:x}", tracer.pid(), payload.len(), pc);
    memory::write(tracer.pid(), pc, &payload)?;

    for _ in 0..opt.max_stops {
        // A forwarded signal has already continued the tracee.
        if tracer.state() != State::Running {
            tracer.resume(&mut info)?;
        }

        let stop = tracer.wait_for_stop(&mut info, &config)?;

        println!("{:?}, pc = {:x?}", stop, info.program_counter());
        print_changes(&info.registers, &info.previous_registers);

        if stop.is_terminal() {
            break;
        }
    }

    match tracer.state() {
        State::Exited => {},
        State::Running => {
            // Killed by `PTRACE_O_EXITKILL` when we exit.
            println!("tracee still running after {} stops", opt.max_stops);
            return Ok(());
        },
        _ => tracer.detach(&mut info)?,
    }

    match (info.exit_code, info.last_signal) {
        (Some(code), _) => println!("exited: {}", code),
        (None, Some(signal)) => println!("exited on signal: {:?}", signal),
        (None, None) => println!("exit status unknown"),
    }

    Ok(())
}

fn print_changes(current: &RegisterBlob, previous: &RegisterBlob) {
    for (offset, old, new) in current.changed_words(previous) {
        println!("  +{:<4x} {:016x} -> {:016x}", offset, old, new);
    }
}
