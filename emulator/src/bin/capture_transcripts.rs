use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{DEFAULT_VDD_MV, Session, TranscriptProfile};

fn main() -> io::Result<()> {
    for profile in TranscriptProfile::SCENARIOS {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile, DEFAULT_VDD_MV)?;
    for command in profile.script() {
        let _ = session.handle_command(command)?;
    }

    println!(
        "{}: {} (output {})",
        profile.log_path().display(),
        session
            .last_outcome()
            .map_or("powered-normal", |outcome| outcome.state.as_str()),
        if session.output_on() { "on" } else { "off" }
    );
    Ok(())
}
