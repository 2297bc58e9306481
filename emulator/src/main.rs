mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use session::{DEFAULT_VDD_MV, Session, TranscriptProfile};

const USAGE: &str = "Usage: holdup-emulator [--profile <console|steady|short-outage|cutoff|running>] [--vdd <mv>]";

struct Options {
    profile: TranscriptProfile,
    vdd_mv: u32,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile, options.vdd_mv)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Hold-up Controller Emulator ready (vdd={}mV). Type `help` for commands or `exit` to quit.",
        options.vdd_mv
    )?;

    // Scenario profiles start from their recorded script.
    for command in options.profile.script() {
        writeln!(writer, "> {command}")?;
        for response in session.handle_command(command)? {
            writeln!(writer, "{response}")?;
        }
    }

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    let state = session
        .last_outcome()
        .map_or("powered-normal", |outcome| outcome.state.as_str());
    writeln!(
        writer,
        "Session closed (state={state}, output={}).",
        if session.output_on() { "on" } else { "off" }
    )?;
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        profile: TranscriptProfile::Console,
        vdd_mv: DEFAULT_VDD_MV,
    };

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            options.profile = TranscriptProfile::from_tag(value)?;
        } else if arg == "--profile" {
            let value = args.next().ok_or("Expected value after --profile")?;
            options.profile = TranscriptProfile::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--vdd=") {
            options.vdd_mv = parse_vdd(value)?;
        } else if arg == "--vdd" {
            let value = args.next().ok_or("Expected value after --vdd")?;
            options.vdd_mv = parse_vdd(&value)?;
        } else {
            options.profile = TranscriptProfile::from_tag(&arg)?;
        }
    }

    Ok(options)
}

fn parse_vdd(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(millivolts) if millivolts > 0 => Ok(millivolts),
        _ => Err(format!("Invalid supply voltage `{value}` (millivolts)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_to_console_profile() {
        let options = parse(&[]).unwrap();
        assert_eq!(options.profile, TranscriptProfile::Console);
        assert_eq!(options.vdd_mv, DEFAULT_VDD_MV);
    }

    #[test]
    fn accepts_profile_and_vdd_forms() {
        let options = parse(&["--profile", "cutoff", "--vdd=3300"]).unwrap();
        assert_eq!(options.profile, TranscriptProfile::Cutoff);
        assert_eq!(options.vdd_mv, 3_300);

        let options = parse(&["running", "--vdd", "4800"]).unwrap();
        assert_eq!(options.profile, TranscriptProfile::Running);
        assert_eq!(options.vdd_mv, 4_800);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--profile"]).is_err());
        assert!(parse(&["--vdd", "0"]).is_err());
        assert!(parse(&["--vdd=abc"]).is_err());
        assert!(parse(&["reboot"]).is_err());
    }
}
