use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;
use tokio::sync::{mpsc, watch};

use plotq_core::error::{Result, report_failure};
use plotq_core::naming::NameConvention;
use plotq_core::queue_sim::{SimulatedQueue, demo_payloads, spawn_drainer};
use plotq_core::{
    DetailLevel, DeviceGuard, DrainOutcome, ProgressTracker, QueueProvider, Reconciler, Remainder, SessionConfig,
    TrackerSettings, wait_for_drain,
};

use crate::presentation::cli::{BatchSpec, Mode};

/// Bytes the simulated plotter consumes per drainer tick.
const PLOT_BYTES_PER_TICK: u64 = 256;

pub struct SimulateArgs {
    pub config: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub batches: Vec<BatchSpec>,
    pub drain: usize,
    pub steps: usize,
    pub step_ms: u64,
    pub detail: DetailLevel,
    pub track: bool,
    pub clear_at: Option<usize>,
    pub wait: bool,
}

fn load_config(path: Option<PathBuf>) -> Result<SessionConfig> {
    match path {
        Some(p) => SessionConfig::load(&p),
        None => Ok(SessionConfig::default()),
    }
}

pub fn handle_name(raws: Vec<String>, delimiter: Option<char>, field: Option<usize>) -> Result<()> {
    let defaults = NameConvention::default();
    let naming = NameConvention::new(
        delimiter.unwrap_or(defaults.delimiter),
        field.unwrap_or(defaults.field),
    );
    SessionConfig {
        naming,
        ..Default::default()
    }
    .validate()?;
    for raw in &raws {
        match naming.length_suffix(raw) {
            Some(len) => println!("{raw} -> {} ({len} bytes)", naming.canonical(raw)),
            None => println!("{raw} -> {}", naming.canonical(raw)),
        }
    }
    Ok(())
}

pub fn handle_settings(config: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

/// Print the queue view; a failing query is reported and the session goes on.
fn show(reconciler: &mut Reconciler, level: DetailLevel) {
    match reconciler.query(level) {
        Ok(report) => print!("{report}"),
        Err(e) => report_failure("query", &e),
    }
}

/// What a scripted session left behind.
#[derive(Debug)]
pub struct SessionOutcome {
    pub batches: Vec<(String, u64, u64)>,
    pub remainder: Option<Remainder>,
    pub device_open: bool,
    pub closing: String,
}

fn submit_batch(reconciler: &mut Reconciler, sim: &SimulatedQueue, spec: &BatchSpec, seed: u64) -> Result<()> {
    let handle = reconciler.submit(&spec.name)?;
    let written = match sim.write_batch(&spec.name, &demo_payloads(spec.count, seed)) {
        Ok(w) => w,
        Err(e) => {
            reconciler.withdraw(&handle);
            return Err(e);
        }
    };
    reconciler.reconcile()?;
    let size: u64 = written.iter().map(|f| f.length).sum();
    println!("{} [{}] [{}]", spec.name, written.len(), size);
    Ok(())
}

/// Keeps the terminal in raw mode so a lone Esc reaches `event::poll`
/// without waiting for Enter. Restores cooked mode on drop.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        terminal::disable_raw_mode().ok();
    }
}

fn escape_pressed() -> bool {
    match event::poll(Duration::ZERO) {
        Ok(true) => matches!(event::read(), Ok(Event::Key(k)) if k.code == KeyCode::Esc),
        _ => false,
    }
}

pub fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let outcome = run_simulation(args)?;
    println!("{}", outcome.closing);
    Ok(())
}

pub fn run_simulation(args: SimulateArgs) -> Result<SessionOutcome> {
    let mut cfg = load_config(args.config)?;
    if let Some(mode) = args.mode {
        cfg.capability = mode.into();
    }
    cfg.track_progress |= args.track;
    cfg.validate()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let _rt_guard = rt.enter();

    let sim = Arc::new(SimulatedQueue::new(cfg.capability, cfg.naming));
    let device = DeviceGuard::new(sim.clone());
    let mut reconciler = Reconciler::new(device.provider().clone(), &cfg);
    println!("Device: simulated {}", sim.capability());

    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
    let printer = rt.spawn(async move {
        while let Some(line) = lines_rx.recv().await {
            println!("{line}");
        }
    });
    let tracker = ProgressTracker::spawn(
        device.provider().clone(),
        TrackerSettings::new(cfg.capability, cfg.tracker_interval()),
        reconciler.plot_clock(),
        cfg.track_progress,
        lines_tx,
    );

    for (seed, spec) in args.batches.iter().enumerate() {
        if let Err(e) = submit_batch(&mut reconciler, &sim, spec, seed as u64) {
            report_failure("submit", &e);
            continue;
        }
        show(&mut reconciler, args.detail);
    }

    for step in 1..=args.steps {
        if args.step_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.step_ms));
        }
        match sim.drain(args.drain) {
            Ok(n) => println!("-- step {step}: {n} entries completed"),
            Err(e) => report_failure("drain", &e),
        }
        show(&mut reconciler, args.detail);

        if args.clear_at == Some(step) {
            if let Err(e) = sim.clear() {
                report_failure("clear", &e);
            }
            reconciler.clear();
            println!("-- queue cleared");
            show(&mut reconciler, args.detail);
        }
    }

    if args.wait {
        let (stop_tx, stop_rx) = watch::channel(false);
        let drainer = spawn_drainer(
            sim.clone(),
            args.drain.max(1),
            PLOT_BYTES_PER_TICK,
            cfg.drain_interval(),
            stop_rx,
        );
        println!("Waiting for the plotter buffer to empty (Esc cancels)");
        let raw = match RawMode::enable() {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::warn!(error = %e, "no raw terminal; Esc needs Enter to register");
                None
            }
        };
        let outcome = wait_for_drain(sim.as_ref(), cfg.drain_interval(), escape_pressed, |bytes| {
            // Raw mode does not translate '\n' into a carriage return.
            print!("  bytes in plotter buffer: [{bytes:>4}]\r\n")
        });
        drop(raw);
        stop_tx.send_replace(true);
        if let Err(e) = rt.block_on(drainer) {
            tracing::warn!(error = %e, "simulated drainer did not stop cleanly");
        }
        match outcome {
            Ok(DrainOutcome::Drained) => println!("Plotter buffer empty"),
            Ok(DrainOutcome::Cancelled) => println!("Wait cancelled"),
            Err(e) => report_failure("wait", &e),
        }
        show(&mut reconciler, args.detail);
    }

    let closing = rt.block_on(tracker.shutdown());
    if let Err(e) = rt.block_on(printer) {
        tracing::warn!(error = %e, "status printer did not stop cleanly");
    }
    drop(device);
    if reconciler.duplicate_count() > 0 {
        tracing::warn!(
            duplicates = reconciler.duplicate_count(),
            "device listed duplicate entry names"
        );
    }
    Ok(SessionOutcome {
        batches: reconciler
            .batches()
            .iter()
            .map(|b| (b.name.clone(), b.fragment_count(), b.declared_size))
            .collect(),
        remainder: reconciler.remainder().cloned(),
        device_open: sim.is_open(),
        closing: closing?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: Mode) -> SimulateArgs {
        SimulateArgs {
            config: None,
            mode: Some(mode),
            batches: vec![
                BatchSpec {
                    name: "Tri".into(),
                    count: 2,
                },
                BatchSpec {
                    name: "Sq".into(),
                    count: 1,
                },
            ],
            drain: 1,
            steps: 4,
            step_ms: 0,
            detail: DetailLevel::DetailWithPayload,
            track: false,
            clear_at: Some(2),
            wait: false,
        }
    }

    fn payload_len(count: usize, seed: u64, part: usize) -> u64 {
        demo_payloads(count, seed)[part].len() as u64
    }

    #[test]
    fn counted_session_leaves_a_remainder_on_the_head_batch() {
        let outcome = run_simulation(SimulateArgs {
            steps: 1,
            clear_at: None,
            ..args(Mode::Counted)
        })
        .unwrap();
        let sq = payload_len(1, 1, 0);
        assert_eq!(
            outcome.batches,
            vec![
                ("Tri".to_string(), 2, payload_len(2, 0, 0) + payload_len(2, 0, 1)),
                ("Sq".to_string(), 1, sq),
            ]
        );
        assert_eq!(
            outcome.remainder,
            Some(Remainder {
                batch_name: "Tri".into(),
                remaining_count: 1,
                remaining_size: payload_len(2, 0, 1),
            })
        );
        assert!(!outcome.device_open);
        assert_eq!(outcome.closing, "Closing progress-tracker");
    }

    #[test]
    fn spooler_session_rebuilds_from_the_listing() {
        let outcome = run_simulation(SimulateArgs {
            steps: 1,
            clear_at: None,
            ..args(Mode::Spooler)
        })
        .unwrap();
        assert_eq!(
            outcome.batches,
            vec![
                ("Tri".to_string(), 1, payload_len(2, 0, 1)),
                ("Sq".to_string(), 1, payload_len(1, 1, 0)),
            ]
        );
        assert_eq!(outcome.remainder, None);
        assert!(!outcome.device_open);
    }

    #[test]
    fn cleared_session_ends_empty() {
        for mode in [Mode::Counted, Mode::Spooler] {
            let outcome = run_simulation(args(mode)).unwrap();
            assert!(outcome.batches.is_empty());
            assert_eq!(outcome.remainder, None);
            assert!(!outcome.device_open);
        }
    }

    #[test]
    fn raw_mode_is_restored_on_drop() {
        // Only meaningful on a terminal; elsewhere enabling fails cleanly.
        if let Ok(raw) = RawMode::enable() {
            assert!(terminal::is_raw_mode_enabled().unwrap());
            drop(raw);
        }
        assert!(!terminal::is_raw_mode_enabled().unwrap_or(false));
    }

    #[test]
    fn settings_come_from_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"capability":"named-spooler","preview_width":12}"#).unwrap();
        let cfg = load_config(Some(path.clone())).unwrap();
        assert_eq!(cfg.preview_width, 12);
        handle_settings(Some(path)).unwrap();
    }

    #[test]
    fn name_rejects_alphanumeric_delimiter() {
        assert!(handle_name(vec!["Tri_1_t_1_010".into()], Some('x'), None).is_err());
        handle_name(vec!["Tri_1_t_1_010".into()], None, Some(1)).unwrap();
    }
}
