//! Demo of the `word-spinlock` crate.
//!
//! Runs two pseudo-threads of five protected increments each against one
//! counter (expecting 10), then repeats the exercise on real threads, and
//! finally lets a simulated timer interrupt fire inside a masked critical
//! section.
//!
//! Log output goes to stderr; set `SPIN_LOG` to `trace`, `debug`, `info`,
//! `warn`, `error` or `off` (default `info`).

use std::io::Write;
use std::process::ExitCode;

use log::{LevelFilter, Log, Metadata, Record};
use word_spinlock::{
    ContextId, ExecutionContext, Harness, HarnessError, IrqSource, RawSpinLock, RunReport,
    SharedCounter, SimulatedInterrupts, SpinLock,
};

/// Writes `[LEVEL] message` lines to stderr.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(
                std::io::stderr().lock(),
                "[{:>5}] {}",
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = std::env::var("SPIN_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn pseudo_threads() -> Result<u64, HarnessError> {
    let lock = RawSpinLock::new();
    let counter = SharedCounter::new(&lock);
    let contexts: Vec<_> = (1..=2)
        .filter_map(ContextId::new)
        .map(|id| ExecutionContext::new(id, 5))
        .collect();

    Harness::new(&contexts).run_sequential(&counter).verify()
}

fn threads() -> Result<u64, HarnessError> {
    let counter = SpinLock::new(0u64);
    let contexts: Vec<_> = (1..=16)
        .filter_map(ContextId::new)
        .map(|id| ExecutionContext::new(id, 100_000))
        .collect();

    Harness::new(&contexts).run_threaded(&counter).verify()
}

fn masked_timer() -> Result<u64, HarnessError> {
    let counter = SpinLock::new(0u64);
    let handler = |_: IrqSource| *counter.lock() += 1;
    let irq = SimulatedInterrupts::new();
    irq.set_handler(IrqSource::MachineTimer, &handler);

    for _ in 0..5 {
        let mut guard = counter.lock_masked(&irq, IrqSource::MachineTimer);
        irq.raise(IrqSource::MachineTimer);
        *guard += 1;
    }

    let report = RunReport {
        expected: 10,
        observed: *counter.lock(),
    };
    log::info!("timer interrupts delivered: {}", irq.delivered());
    report.verify()
}

fn main() -> ExitCode {
    init_logging();

    let runs: [(&str, fn() -> Result<u64, HarnessError>); 3] = [
        ("pseudo-threads", pseudo_threads),
        ("threads", threads),
        ("masked timer", masked_timer),
    ];

    let mut ok = true;
    for (name, run) in runs {
        match run() {
            Ok(value) => println!("{}: final counter value {}", name, value),
            Err(e) => {
                eprintln!("{}: {}", name, e);
                ok = false;
            }
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
