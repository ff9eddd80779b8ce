use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{unbounded, Receiver};
use env_logger::Env;
use log::{info, warn};
use pulse_lib::{
    acquisition::SampleSource,
    config::PulseConfig,
    io::{history::HistoryStore, text as text_io},
    measurement::{analyze_session, read_peak_log, unix_now, write_peak_log},
    metrics::hrv::hrv_time,
    presenter::Presenter,
    remote::AnalysisRequest,
    session::{replay, Session, SessionMode, SessionOutcome},
    signal::PpiSeries,
    simulate::{SyntheticConfig, SyntheticPpg},
    sink::{LogDisplay, MeasurementSink},
};
use serde_json::{json, Value};
use std::{
    io::{self, BufRead, Read},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "PPG heart-rate and HRV measurement tools"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Live,
    Basic,
    Remote,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Live => SessionMode::Live,
            ModeArg::Basic => SessionMode::Basic,
            ModeArg::Remote => SessionMode::Remote,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Time-domain HRV from newline-delimited intervals (ms) or a peak-log CSV
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Result timestamp (unix seconds); defaults to now
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Run the beat detector over recorded raw samples
    Replay {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ModeArg::Basic)]
        mode: ModeArg,
        #[arg(long)]
        sample_rate: Option<f64>,
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Export accepted peaks as CSV
        #[arg(long)]
        peaks_out: Option<PathBuf>,
        /// Append the basic analysis result to this history file
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Write a synthetic PPG recording, one raw sample per line
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 40.0)]
        seconds: f64,
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 250.0)]
        sample_rate: f64,
        #[arg(long, default_value_t = 0.0)]
        artifact_rate: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Threaded real-time session against a synthetic sensor
    Live {
        #[arg(long, value_enum, default_value_t = ModeArg::Live)]
        mode: ModeArg,
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Request a stop after this long; otherwise press Enter to stop
        #[arg(long)]
        stop_after_ms: Option<u64>,
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// List stored measurements, newest first
    History {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    let config = PulseConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Hrv { input, timestamp } => cmd_hrv(input.as_deref(), timestamp)?,
        Commands::Replay {
            input,
            mode,
            sample_rate,
            deadline_ms,
            peaks_out,
            history,
        } => cmd_replay(
            config,
            input.as_deref(),
            mode.into(),
            sample_rate,
            deadline_ms,
            peaks_out.as_deref(),
            history,
        )?,
        Commands::Simulate {
            out,
            seconds,
            bpm,
            sample_rate,
            artifact_rate,
            seed,
        } => {
            let synthetic = SyntheticConfig {
                sample_rate_hz: sample_rate,
                bpm,
                artifact_rate,
                seed,
                ..SyntheticConfig::default()
            };
            cmd_simulate(&out, seconds, synthetic)?
        }
        Commands::Live {
            mode,
            deadline_ms,
            stop_after_ms,
            bpm,
            history,
        } => cmd_live(config, mode.into(), deadline_ms, stop_after_ms, bpm, history)?,
        Commands::History { path, limit } => cmd_history(&config, path, limit)?,
    }
    Ok(())
}

fn read_input_text(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn cmd_hrv(input: Option<&Path>, timestamp: Option<u64>) -> Result<()> {
    let ppi = match input {
        Some(path) if path.extension().is_some_and(|ext| ext == "csv") => {
            PpiSeries::from_peaks(&read_peak_log(path)?)
        }
        _ => PpiSeries {
            ppi: text_io::parse_intervals(&read_input_text(input)?)?,
        },
    };
    let result = hrv_time(&ppi, timestamp.unwrap_or_else(unix_now))?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn history_for(config: &PulseConfig, path: Option<PathBuf>) -> HistoryStore {
    match path {
        Some(path) => HistoryStore::new(path, config.history.max_entries),
        None => config.history_store(),
    }
}

/// Turn a finished session into the printed summary, running local analysis
/// for basic sessions.
fn summarize(
    config: &PulseConfig,
    outcome: &SessionOutcome,
    mut history: Option<HistoryStore>,
) -> Value {
    let report = outcome.report();
    let mut summary = json!({ "outcome": outcome });
    if !outcome.is_recorded() {
        summary["message"] = json!("Not enough data");
        return summary;
    }
    match report.mode {
        SessionMode::Live => {}
        SessionMode::Basic => {
            let mut sinks: Vec<&mut dyn MeasurementSink> = Vec::new();
            if let Some(store) = history.as_mut() {
                sinks.push(store);
            }
            match analyze_session(report, unix_now(), &mut sinks) {
                Ok(result) => summary["hrv"] = json!(result),
                Err(err) => {
                    warn!("analysis failed: {err}");
                    summary["message"] = json!(err.to_string());
                }
            }
        }
        SessionMode::Remote => {
            warn!("no analysis service connected, printing the request instead");
            let request = AnalysisRequest::rri(
                unix_now(),
                &report.intervals(),
                &config.remote.analysis_type,
            );
            summary["request"] = json!(request);
        }
    }
    summary
}

fn cmd_replay(
    mut config: PulseConfig,
    input: Option<&Path>,
    mode: SessionMode,
    sample_rate: Option<f64>,
    deadline_ms: Option<u64>,
    peaks_out: Option<&Path>,
    history: Option<PathBuf>,
) -> Result<()> {
    if let Some(rate) = sample_rate {
        config.detector.sample_rate_hz = rate;
    }
    if let Some(deadline) = deadline_ms {
        config.session.deadline_ms = deadline;
    }
    let samples = text_io::parse_samples(&read_input_text(input)?)?;
    info!("replaying {} samples in {} mode", samples.len(), mode.as_str());
    let outcome = replay(&config.session_settings(mode), &samples)?;
    if let Some(path) = peaks_out {
        write_peak_log(path, &outcome.report().peaks)?;
    }
    let history = history.map(|path| history_for(&config, Some(path)));
    println!("{}", serde_json::to_string(&summarize(&config, &outcome, history))?);
    Ok(())
}

fn cmd_simulate(out: &Path, seconds: f64, synthetic: SyntheticConfig) -> Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("--seconds must be positive, got {seconds}");
    }
    let n = (seconds * synthetic.sample_rate_hz).round() as usize;
    let samples = SyntheticPpg::new(synthetic).render(n);
    text_io::write_samples(out, &samples)?;
    println!(
        "{}",
        json!({ "path": out.display().to_string(), "samples": n, "config": synthetic })
    );
    Ok(())
}

/// Stop requests from Enter on stdin and an optional timer.
fn stop_requests(stop_after_ms: Option<u64>) -> Receiver<()> {
    let (tx, rx) = unbounded();
    if let Some(ms) = stop_after_ms {
        let tx = tx.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            let _ = tx.send(());
        });
    }
    std::thread::spawn(move || {
        let mut line = String::new();
        // EOF means no terminal is attached; only a real line counts.
        if let Ok(n) = io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                let _ = tx.send(());
            }
        }
    });
    rx
}

fn cmd_live(
    mut config: PulseConfig,
    mode: SessionMode,
    deadline_ms: Option<u64>,
    stop_after_ms: Option<u64>,
    bpm: f64,
    history: Option<PathBuf>,
) -> Result<()> {
    if let Some(deadline) = deadline_ms {
        config.session.deadline_ms = deadline;
    }
    if !mode.is_timed() && stop_after_ms.is_none() {
        eprintln!("live session running, press Enter to stop");
    }
    let rate = config.detector.sample_rate_hz;
    let sensor = SyntheticPpg::new(SyntheticConfig {
        sample_rate_hz: rate,
        bpm,
        ..SyntheticConfig::default()
    });
    let source = SampleSource::new(sensor, rate, config.session.queue_capacity)?;
    let session = Session::start(config.session_settings(mode), source)?;

    let mut presenter = Presenter::new(
        LogDisplay::default(),
        stop_requests(stop_after_ms),
        mode,
        config.session.deadline_ms,
    )
    .with_frame_period(Duration::from_millis(config.session.frame_period_ms.max(1)));
    let reason = presenter.run(&session.stop_handle());
    info!("presenter finished after {} frames: {reason:?}", presenter.frames());

    let (outcome, _source) = session.finish()?;
    let history = Some(history_for(&config, history));
    println!("{}", serde_json::to_string(&summarize(&config, &outcome, history))?);
    Ok(())
}

fn cmd_history(config: &PulseConfig, path: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let store = history_for(config, path);
    let mut records = store.load()?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    println!("{}", serde_json::to_string(&records)?);
    Ok(())
}
