mod common;

use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use mace_trainer::{
    averaging::{AnnealStrategy, SwaContainer, SwaLr},
    logger::MetricsRecord,
};

use common::{LinearLoss, RecordingCheckpoints, config, initial_state, loader, trainer};

/// Keeps the message of every info record.
struct CapturingLogger {
    messages: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.messages.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    messages: Mutex::new(Vec::new()),
};

#[test]
fn swa_switch_is_announced_once() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    let trainer = trainer(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], config(6, 10));
    let scheduler = SwaLr::new(trainer.transform(), 0.5, 1, AnnealStrategy::Cos);
    let mut trainer = trainer.with_swa(SwaContainer::new(scheduler, 1, LinearLoss { scale: 2.0 }));

    let outcome = trainer
        .train(
            initial_state(),
            &mut loader(),
            &mut loader(),
            &mut RecordingCheckpoints::default(),
            &mut Vec::<MetricsRecord>::new(),
        )
        .unwrap();

    assert!(outcome.swa_active);
    assert_eq!(trainer.swa().unwrap().averaged.n_averaged(), 5);

    let messages = LOGGER.messages.lock().unwrap();
    let switches = messages
        .iter()
        .filter(|m| m.as_str() == "Changing loss based on SWA")
        .count();

    assert_eq!(switches, 1);
    assert_eq!(messages.last().map(String::as_str), Some("Training complete"));
}
