use std::cell::Cell;
use std::convert::Infallible;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant as HostInstant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use holdup_core::config::ControllerConfig;
use holdup_core::controller::{PollOutcome, PowerController};
use holdup_core::countdown::{CountdownTimer, SharedCountdown, TickCounter};
use holdup_core::handlers::{self, ChangeGate, DispatchOutcome, PendingInterrupts};
use holdup_core::sampler::{DelaySampler, LadderRange, ReferenceLadder, SampleTrace};
use holdup_core::signals::SignalError;
use holdup_core::telemetry::{PowerEvent, TelemetryRecorder};

/// Supply voltage of the reference board.
pub const DEFAULT_VDD_MV: u32 = 5_000;
/// Control voltage the potentiometer starts at (threshold 6 on a 5 V rail).
pub const DEFAULT_POT_MV: u32 = 1_900;

const EVIDENCE_DIR: &str = "evidence";

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "loss",
        "loss on|off                  - set the utility power-loss input",
    ),
    (
        "running",
        "running yes|no               - set the device-running input",
    ),
    (
        "pot",
        "pot <mv>                     - move the grace-period potentiometer",
    ),
    (
        "tick",
        "tick [n]                     - advance the countdown by n periods",
    ),
    (
        "poll",
        "poll                         - run one control loop iteration",
    ),
    (
        "status",
        "status                       - display controller state",
    ),
    (
        "events",
        "events                       - list recorded telemetry",
    ),
    (
        "help",
        "help [topic]                 - show help for a command",
    ),
];

/// Named scenario a session is recorded under.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Console,
    Steady,
    ShortOutage,
    Cutoff,
    Running,
}

impl TranscriptProfile {
    pub const SCENARIOS: [TranscriptProfile; 4] = [
        TranscriptProfile::Steady,
        TranscriptProfile::ShortOutage,
        TranscriptProfile::Cutoff,
        TranscriptProfile::Running,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TranscriptProfile::Console => "console",
            TranscriptProfile::Steady => "steady",
            TranscriptProfile::ShortOutage => "short-outage",
            TranscriptProfile::Cutoff => "cutoff",
            TranscriptProfile::Running => "running",
        }
    }

    pub fn log_path(self) -> PathBuf {
        PathBuf::from(EVIDENCE_DIR).join(format!("emulator-{}.log", self.tag()))
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Console => "Hold-up Controller Emulator console transcript",
            TranscriptProfile::Steady => "Hold-up Controller Emulator utility power present",
            TranscriptProfile::ShortOutage => {
                "Hold-up Controller Emulator outage shorter than the grace period"
            }
            TranscriptProfile::Cutoff => {
                "Hold-up Controller Emulator outage longer than the grace period"
            }
            TranscriptProfile::Running => {
                "Hold-up Controller Emulator device keeps running on backup"
            }
        }
    }

    /// Commands replayed when capturing this profile's transcript.
    pub fn script(self) -> &'static [&'static str] {
        match self {
            TranscriptProfile::Console => &[],
            TranscriptProfile::Steady => STEADY_SCRIPT,
            TranscriptProfile::ShortOutage => SHORT_OUTAGE_SCRIPT,
            TranscriptProfile::Cutoff => CUTOFF_SCRIPT,
            TranscriptProfile::Running => RUNNING_SCRIPT,
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        [TranscriptProfile::Console]
            .into_iter()
            .chain(Self::SCENARIOS)
            .find(|profile| tag.eq_ignore_ascii_case(profile.tag()))
            .ok_or_else(|| format!("Unknown transcript profile `{tag}`"))
    }
}

/// Utility power stays up while the device stops and starts.
const STEADY_SCRIPT: &[&str] = &[
    "pot 1800",
    "running no",
    "tick 8",
    "running yes",
    "tick 2",
    "status",
];

/// Power returns after three ticks, three short of the cut on the sixth.
const SHORT_OUTAGE_SCRIPT: &[&str] = &[
    "pot 1800",
    "loss on",
    "running no",
    "tick 3",
    "status",
    "loss off",
    "tick 4",
    "status",
    "events",
];

/// Power stays away; the device is cut on the sixth tick.
const CUTOFF_SCRIPT: &[&str] = &[
    "pot 1800",
    "loss on",
    "running no",
    "tick 5",
    "status",
    "tick",
    "status",
    "loss off",
    "status",
    "events",
];

/// The device keeps running on backup, then stops.
const RUNNING_SCRIPT: &[&str] = &[
    "pot 1800",
    "loss on",
    "tick 12",
    "status",
    "running no",
    "tick 6",
    "status",
    "events",
];

/// Output line shared between the simulated pin and the session.
#[derive(Clone, Default)]
struct SimPin {
    high: Rc<Cell<bool>>,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SimCounter {
    restarts: Rc<Cell<u32>>,
}

impl TickCounter for SimCounter {
    fn restart(&mut self) {
        self.restarts.set(self.restarts.get() + 1);
    }
}

struct SimLadder {
    level: Rc<Cell<u8>>,
}

impl ReferenceLadder for SimLadder {
    fn select(&mut self, level: u8) {
        self.level.set(level);
    }
}

/// Comparator whose output goes high once the ladder voltage rises above
/// the potentiometer.
struct SimComparator {
    level: Rc<Cell<u8>>,
    control_mv: Rc<Cell<u32>>,
    vdd_mv: u32,
}

impl ErrorType for SimComparator {
    type Error = Infallible;
}

impl InputPin for SimComparator {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let reference = LadderRange::High.reference_millivolts(self.level.get(), self.vdd_mv);
        Ok(reference > self.control_mv.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Settle waits cost nothing on the host; the total is kept for `status`.
#[derive(Clone, Default)]
struct SimDelay {
    total_ns: Rc<Cell<u64>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.set(self.total_ns.get() + u64::from(ns));
    }
}

type SimCountdown = SharedCountdown<SimCounter, SimPin>;
type SimSampler = DelaySampler<SimLadder, SimComparator, SimDelay>;

pub struct Session {
    config: ControllerConfig,
    countdown: SimCountdown,
    gate: ChangeGate,
    controller: PowerController<SimPin>,
    sampler: SimSampler,
    power_output: Rc<Cell<bool>>,
    diagnostic: Rc<Cell<bool>>,
    control_mv: Rc<Cell<u32>>,
    restarts: Rc<Cell<u32>>,
    settle_ns: Rc<Cell<u64>>,
    vdd_mv: u32,
    power_lost: bool,
    device_running: bool,
    last_threshold: Option<u8>,
    last_trace: Option<SampleTrace>,
    last_outcome: Option<PollOutcome>,
    telemetry: TelemetryRecorder<Duration>,
    /// Simulated time since power-up, advanced by settle waits and ticks.
    clock: Duration,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

impl Session {
    /// Opens a session that records to the profile's evidence log.
    pub fn new(profile: TranscriptProfile, vdd_mv: u32) -> io::Result<Self> {
        let transcript = TranscriptLogger::create(profile)?;
        Self::with_transcript(transcript, vdd_mv)
    }

    /// Opens a session whose transcript is discarded.
    #[cfg(test)]
    pub fn detached(vdd_mv: u32) -> io::Result<Self> {
        Self::with_transcript(TranscriptLogger::discard(), vdd_mv)
    }

    fn with_transcript(transcript: TranscriptLogger, vdd_mv: u32) -> io::Result<Self> {
        let config = ControllerConfig::DEFAULT;
        let power_output = SimPin::default();
        let diagnostic = SimPin::default();
        let counter = SimCounter::default();
        let level = Rc::new(Cell::new(0));
        let control_mv = Rc::new(Cell::new(DEFAULT_POT_MV));
        let delay = SimDelay::default();

        let outputs = (
            Rc::clone(&power_output.high),
            Rc::clone(&diagnostic.high),
            Rc::clone(&counter.restarts),
            Rc::clone(&delay.total_ns),
        );

        let ladder = SimLadder {
            level: Rc::clone(&level),
        };
        let comparator = SimComparator {
            level,
            control_mv: Rc::clone(&control_mv),
            vdd_mv,
        };

        let controller = PowerController::new(power_output)
            .map_err(|err| io::Error::other(signal_error(err)))?;
        let countdown = SharedCountdown::with_timer(CountdownTimer::new(counter, diagnostic));

        let mut session = Self {
            config,
            countdown,
            gate: ChangeGate::new(),
            controller,
            sampler: DelaySampler::with_config(ladder, comparator, delay, &config),
            power_output: outputs.0,
            diagnostic: outputs.1,
            control_mv,
            restarts: outputs.2,
            settle_ns: outputs.3,
            vdd_mv,
            power_lost: false,
            device_running: true,
            last_threshold: None,
            last_trace: None,
            last_outcome: None,
            telemetry: TelemetryRecorder::new(),
            clock: Duration::ZERO,
            transcript,
            started_at: HostInstant::now(),
        };

        session.clock += config.startup_settle;
        session.gate.arm();
        Ok(session)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        let extra = words.next();

        let result = match (command.as_str(), argument, extra) {
            (_, _, Some(unexpected)) => Err(format!("ERR syntax unexpected `{unexpected}`")),
            ("help", topic, None) => Ok(help_lines(topic)),
            ("loss", Some(value), None) => match parse_switch(value, "on", "off") {
                Some(lost) => self.set_power_lost(lost),
                None => Err(format!("ERR syntax expected on|off, got `{value}`")),
            },
            ("running", Some(value), None) => match parse_switch(value, "yes", "no") {
                Some(running) => self.set_device_running(running),
                None => Err(format!("ERR syntax expected yes|no, got `{value}`")),
            },
            ("pot", Some(value), None) => match value.parse::<u32>() {
                Ok(millivolts) => self.set_pot(millivolts),
                Err(_) => Err(format!("ERR syntax expected millivolts, got `{value}`")),
            },
            ("tick", count, None) => match count.map_or(Ok(1), str::parse::<u32>) {
                Ok(count) => self.tick(count),
                Err(_) => Err("ERR syntax expected tick count".to_string()),
            },
            ("poll", None, None) => self.poll(),
            ("status", None, None) => Ok(self.status_lines()),
            ("events", None, None) => Ok(self.event_lines()),
            ("loss" | "running" | "pot", None, None) => {
                Err(format!("ERR syntax `{command}` needs an argument"))
            }
            _ => Err(format!("ERR unknown command `{trimmed}` (try `help`)")),
        };

        let lines = result.unwrap_or_else(|message| vec![message]);
        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn set_power_lost(&mut self, lost: bool) -> Result<Vec<String>, String> {
        self.power_lost = lost;
        let mut lines = vec![format!("power-loss={}", if lost { "on" } else { "off" })];
        lines.extend(self.iterate()?);
        Ok(lines)
    }

    /// Changes the device-running input. Only an actual level change raises
    /// the change interrupt.
    fn set_device_running(&mut self, running: bool) -> Result<Vec<String>, String> {
        let mut lines = vec![format!("device={}", running_label(running))];
        if running != self.device_running {
            self.device_running = running;
            let pending = PendingInterrupts {
                signal_change: true,
                timer_overflow: false,
            };
            lines.extend(self.service(pending)?);
        }
        lines.extend(self.iterate()?);
        Ok(lines)
    }

    fn set_pot(&mut self, millivolts: u32) -> Result<Vec<String>, String> {
        self.control_mv.set(millivolts);
        let mut lines = vec![format!("pot={millivolts}mV")];
        lines.extend(self.iterate()?);
        Ok(lines)
    }

    fn tick(&mut self, count: u32) -> Result<Vec<String>, String> {
        let mut lines = Vec::new();
        for _ in 0..count {
            self.clock += self.config.tick_period;
            let pending = PendingInterrupts {
                signal_change: false,
                timer_overflow: true,
            };
            lines.extend(self.service(pending)?);
            lines.extend(self.iterate()?);
        }
        if lines.is_empty() {
            lines.push(format!("idle elapsed={}", self.countdown.elapsed()));
        }
        Ok(lines)
    }

    fn poll(&mut self) -> Result<Vec<String>, String> {
        let mut lines = self.iterate()?;
        if lines.is_empty() {
            lines.push(format!(
                "state={} output={}",
                self.controller.state().as_str(),
                self.controller.level()
            ));
        }
        Ok(lines)
    }

    fn service(&mut self, pending: PendingInterrupts) -> Result<Vec<String>, String> {
        let DispatchOutcome { edge, tick } = handlers::dispatch(
            pending,
            &self.gate,
            self.power_lost,
            self.device_running,
            &self.countdown,
        )
        .map_err(signal_error)?;

        let mut lines = Vec::new();
        if let Some(outcome) = edge {
            lines.push(self.record(PowerEvent::from_edge(outcome)));
        }
        if let Some(tick) = tick {
            lines.push(self.record(PowerEvent::from_tick(tick)));
        }
        Ok(lines)
    }

    /// One pass of the foreground loop: sample, then let the controller decide.
    fn iterate(&mut self) -> Result<Vec<String>, String> {
        let mut lines = Vec::new();

        let trace = self.sampler.sample_traced().map_err(signal_error)?;
        let threshold = trace.level;
        self.last_trace = Some(trace);
        self.clock += self.config.max_sample_duration();
        if self.last_threshold != Some(threshold.get()) {
            let event = PowerEvent::ThresholdChanged {
                from: self.last_threshold,
                to: threshold.get(),
            };
            self.last_threshold = Some(threshold.get());
            lines.push(self.record(event));
        }

        let outcome = self
            .controller
            .poll(self.power_lost, threshold, &self.countdown)
            .map_err(signal_error)?;
        if let Some(event) = PowerEvent::from_poll(&outcome) {
            lines.push(self.record(event));
        }
        self.last_outcome = Some(outcome);
        Ok(lines)
    }

    fn record(&mut self, event: PowerEvent) -> String {
        let id = self.telemetry.record(event, self.clock);
        format!("event #{id} {event}")
    }

    fn status_lines(&self) -> Vec<String> {
        let threshold = self.last_threshold.unwrap_or_default();
        let sweep = self.last_trace.map_or_else(
            || "ladder=- crossed=-".to_string(),
            |trace| {
                format!(
                    "ladder={} crossed={}",
                    trace.last_reference,
                    if trace.crossed { "yes" } else { "no" }
                )
            },
        );
        vec![
            format!(
                "state={} output={} power-loss={} device={}",
                self.controller.state().as_str(),
                self.controller.level(),
                if self.power_lost { "on" } else { "off" },
                running_label(self.device_running),
            ),
            format!(
                "countdown={} elapsed={} diagnostic={} restarts={}",
                self.countdown.phase().as_str(),
                self.countdown.elapsed(),
                if self.diagnostic.get() { "high" } else { "low" },
                self.restarts.get(),
            ),
            format!(
                "pot={}mV vdd={}mV threshold={} grace={}ms {}",
                self.control_mv.get(),
                self.vdd_mv,
                threshold,
                self.config.grace_period(threshold).as_millis(),
                sweep,
            ),
            format!(
                "clock={}ms settle-total={}us events={}",
                self.clock.as_millis(),
                self.settle_ns.get() / 1_000,
                self.telemetry.len(),
            ),
        ]
    }

    fn event_lines(&self) -> Vec<String> {
        if self.telemetry.is_empty() {
            return vec!["no events recorded".to_string()];
        }
        self.telemetry
            .oldest_first()
            .map(|record| {
                let delta = record
                    .since_previous
                    .map(|delta| format!(" (+{}ms)", delta.as_millis()))
                    .unwrap_or_default();
                format!(
                    "#{:<3} t={:>7}ms {}{}",
                    record.id,
                    record.timestamp.as_millis(),
                    record.event,
                    delta
                )
            })
            .collect()
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }

    pub fn output_on(&self) -> bool {
        self.power_output.get()
    }

    pub fn last_outcome(&self) -> Option<PollOutcome> {
        self.last_outcome
    }
}

fn signal_error(err: SignalError) -> String {
    format!("ERR signal {err}")
}

fn parse_switch(value: &str, yes: &str, no: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case(yes) {
        Some(true)
    } else if value.eq_ignore_ascii_case(no) {
        Some(false)
    } else {
        None
    }
}

fn running_label(running: bool) -> &'static str {
    if running { "running" } else { "stopped" }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => {
            let mut lines = vec![format!("Available commands: {}", help_topic_list())];
            lines.extend(HELP_TOPICS.iter().map(|(_, text)| (*text).to_string()));
            lines
        }
        Some(topic) => HELP_TOPICS
            .iter()
            .find(|(name, _)| topic.eq_ignore_ascii_case(name))
            .map_or_else(
                || vec![format!("ERR unknown help topic `{topic}`")],
                |(_, text)| vec![(*text).to_string()],
            ),
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<Box<dyn Write>>,
}

impl TranscriptLogger {
    fn create(profile: TranscriptProfile) -> io::Result<Self> {
        let path = profile.log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut logger = Self {
            writer: BufWriter::new(Box::new(file)),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    #[cfg(test)]
    fn discard() -> Self {
        Self {
            writer: BufWriter::new(Box::new(io::sink())),
        }
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
