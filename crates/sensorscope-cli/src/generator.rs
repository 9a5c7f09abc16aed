//! Demo sample producer.
//!
//! Picks a random sensor from a fixed catalogue on every tick and emits a
//! reading for it, occasionally pushed past a threshold (or set to a failure
//! value) so the failure paths of the dashboard get exercised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use sensorscope_core::{Sample, Value};

/// How a sensor's readings are drawn.
#[derive(Debug, Clone, Copy)]
pub enum ReadingKind {
    Double {
        min: f64,
        max: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    },
    Integer {
        min: i64,
        max: i64,
        lower: Option<i64>,
        upper: Option<i64>,
    },
    Text {
        options: &'static [&'static str],
        failures: &'static [&'static str],
    },
    Flag {
        true_probability: f64,
        failing: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SensorDefinition {
    pub path: &'static [&'static str],
    pub kind: ReadingKind,
    /// Chance that a reading is forced into its failure range.
    pub failure_probability: f64,
}

/// The demo catalogue.
pub const DEFINITIONS: &[SensorDefinition] = &[
    SensorDefinition {
        path: &["Server01", "CPU", "Core0", "Temperature"],
        kind: ReadingKind::Double {
            min: 35.0,
            max: 65.0,
            lower: Some(32.0),
            upper: Some(72.0),
        },
        failure_probability: 0.1,
    },
    SensorDefinition {
        path: &["Server01", "CPU", "Core0", "Voltage"],
        kind: ReadingKind::Double {
            min: 1.0,
            max: 1.2,
            lower: Some(0.9),
            upper: Some(1.25),
        },
        failure_probability: 0.08,
    },
    SensorDefinition {
        path: &["Server01", "CPU", "Core0", "FanRPM"],
        kind: ReadingKind::Integer {
            min: 1200,
            max: 2400,
            lower: Some(1000),
            upper: Some(2600),
        },
        failure_probability: 0.12,
    },
    SensorDefinition {
        path: &["Server01", "CPU", "Core1", "Temperature"],
        kind: ReadingKind::Double {
            min: 35.0,
            max: 65.0,
            lower: Some(32.0),
            upper: Some(72.0),
        },
        failure_probability: 0.1,
    },
    SensorDefinition {
        path: &["Server01", "GPU", "Temperature"],
        kind: ReadingKind::Double {
            min: 45.0,
            max: 80.0,
            lower: Some(40.0),
            upper: Some(85.0),
        },
        failure_probability: 0.12,
    },
    SensorDefinition {
        path: &["Server01", "GPU", "Status"],
        kind: ReadingKind::Text {
            options: &["Running", "Idle", "Throttled"],
            failures: &["Throttled"],
        },
        failure_probability: 0.15,
    },
    SensorDefinition {
        path: &["Server02", "CPU", "Temperature"],
        kind: ReadingKind::Double {
            min: 32.0,
            max: 60.0,
            lower: Some(28.0),
            upper: Some(68.0),
        },
        failure_probability: 0.1,
    },
    SensorDefinition {
        path: &["Server02", "CPU", "LoadPercent"],
        kind: ReadingKind::Integer {
            min: 0,
            max: 100,
            lower: Some(0),
            upper: Some(95),
        },
        failure_probability: 0.1,
    },
    SensorDefinition {
        path: &["Server02", "Status"],
        kind: ReadingKind::Text {
            options: &["Online", "Maintenance", "Offline"],
            failures: &["Offline"],
        },
        failure_probability: 0.2,
    },
    SensorDefinition {
        path: &["Network", "Router01", "Port1", "Throughput"],
        kind: ReadingKind::Integer {
            min: 1000,
            max: 10000,
            lower: Some(1500),
            upper: Some(9000),
        },
        failure_probability: 0.1,
    },
    SensorDefinition {
        path: &["Network", "Router01", "Port1", "LinkStatus"],
        kind: ReadingKind::Text {
            options: &["Up", "Down", "Flapping"],
            failures: &["Down", "Flapping"],
        },
        failure_probability: 0.25,
    },
    SensorDefinition {
        path: &["Network", "Router01", "Port2", "LinkStatus"],
        kind: ReadingKind::Text {
            options: &["Up", "Down"],
            failures: &["Down"],
        },
        failure_probability: 0.2,
    },
    SensorDefinition {
        path: &["Server01", "Power", "IsRedundant"],
        kind: ReadingKind::Flag {
            true_probability: 0.85,
            failing: false,
        },
        failure_probability: 0.05,
    },
    SensorDefinition {
        path: &["Network", "Firewall", "FailoverActive"],
        kind: ReadingKind::Flag {
            true_probability: 0.1,
            failing: true,
        },
        failure_probability: 0.1,
    },
];

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct SampleGenerator {
    rng: StdRng,
    definitions: &'static [SensorDefinition],
}

impl SampleGenerator {
    /// Seeded generators replay the same sequence; `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_definitions(seed, DEFINITIONS)
    }

    pub fn with_definitions(seed: Option<u64>, definitions: &'static [SensorDefinition]) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { rng, definitions }
    }

    /// Next reading, or `None` for an empty catalogue.
    pub fn generate(&mut self) -> Option<Sample> {
        let def = *self.definitions.choose(&mut self.rng)?;
        let induce = self.rng.random_bool(def.failure_probability.clamp(0.0, 1.0));

        let sample = match def.kind {
            ReadingKind::Double {
                min,
                max,
                lower,
                upper,
            } => {
                let mut value = self.rng.random_range(min..=max);
                if induce {
                    let offset = (max - min).max(1.0) * 0.2;
                    match self.failure_side(lower, upper) {
                        Some(Side::Below(l)) => value = l - offset,
                        Some(Side::Above(u)) => value = u + offset,
                        None => {}
                    }
                }
                let failed = lower.is_some_and(|l| value < l) || upper.is_some_and(|u| value > u);
                Sample::new(def.path.iter().copied(), value)
                    .with_thresholds(lower.map(Value::from), upper.map(Value::from))
                    .with_failed(failed)
            }
            ReadingKind::Integer {
                min,
                max,
                lower,
                upper,
            } => {
                let mut value = self.rng.random_range(min..=max);
                if induce {
                    let offset = ((max - min).max(1) / 5).max(1);
                    match self.failure_side(lower, upper) {
                        Some(Side::Below(l)) => value = l - offset,
                        Some(Side::Above(u)) => value = u + offset,
                        None => {}
                    }
                }
                let failed = lower.is_some_and(|l| value < l) || upper.is_some_and(|u| value > u);
                Sample::new(def.path.iter().copied(), value)
                    .with_thresholds(lower.map(Value::from), upper.map(Value::from))
                    .with_failed(failed)
            }
            ReadingKind::Text { options, failures } => {
                let pool = if induce && !failures.is_empty() {
                    failures
                } else {
                    options
                };
                let chosen = *pool.choose(&mut self.rng)?;
                Sample::new(def.path.iter().copied(), chosen).with_failed(failures.contains(&chosen))
            }
            ReadingKind::Flag {
                true_probability,
                failing,
            } => {
                let value = if induce {
                    failing
                } else {
                    self.rng.random_bool(true_probability.clamp(0.0, 1.0))
                };
                Sample::new(def.path.iter().copied(), value).with_failed(value == failing)
            }
        };
        Some(sample)
    }

    /// Which threshold a forced failure crosses; `None` without thresholds.
    fn failure_side<T: Copy>(&mut self, lower: Option<T>, upper: Option<T>) -> Option<Side<T>> {
        match (lower, upper) {
            (Some(l), None) => Some(Side::Below(l)),
            (Some(l), Some(_)) if self.rng.random_bool(0.5) => Some(Side::Below(l)),
            (_, Some(u)) => Some(Side::Above(u)),
            (None, None) => None,
        }
    }
}

enum Side<T> {
    Below(T),
    Above(T),
}

// ---------------------------------------------------------------------------
// Producer thread
// ---------------------------------------------------------------------------

/// What the producer thread sends to the consumer.
#[derive(Debug, Clone)]
pub enum ProducerEvent {
    Connected(bool),
    Sample(Sample),
}

/// Start the producer thread. Samples are stamped on creation.
///
/// `active` pauses generation without tearing the thread down; clearing
/// `running` stops it after the current tick. The thread also exits once the
/// receiver is dropped.
pub fn spawn_producer(
    interval: Duration,
    seed: Option<u64>,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) -> (Receiver<ProducerEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || produce(tx, interval, seed, &active, &running));
    (rx, handle)
}

fn produce(
    tx: Sender<ProducerEvent>,
    interval: Duration,
    seed: Option<u64>,
    active: &AtomicBool,
    running: &AtomicBool,
) {
    let mut generator = SampleGenerator::new(seed);
    if tx.send(ProducerEvent::Connected(true)).is_err() {
        return;
    }
    log::info!("demo producer started ({}ms interval)", interval.as_millis());

    while running.load(Ordering::SeqCst) {
        if active.load(Ordering::SeqCst)
            && let Some(sample) = generator.generate()
            && tx
                .send(ProducerEvent::Sample(sample.at(Instant::now())))
                .is_err()
        {
            log::debug!("consumer went away, stopping producer");
            return;
        }
        thread::sleep(interval);
    }

    let _ = tx.send(ProducerEvent::Connected(false));
    log::info!("demo producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_def(path: &[String]) -> &'static SensorDefinition {
        DEFINITIONS
            .iter()
            .find(|d| d.path.iter().copied().eq(path.iter().map(String::as_str)))
            .unwrap()
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = SampleGenerator::new(Some(7));
        let mut b = SampleGenerator::new(Some(7));
        for _ in 0..50 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn test_samples_come_from_catalogue() {
        let mut generator = SampleGenerator::new(Some(1));
        for _ in 0..200 {
            let sample = generator.generate().unwrap();
            let def = find_def(&sample.path);
            match def.kind {
                ReadingKind::Double { .. } => assert!(sample.value.is_double()),
                ReadingKind::Integer { .. } => assert!(sample.value.is_integer()),
                ReadingKind::Text { .. } => assert!(sample.value.is_string()),
                ReadingKind::Flag { .. } => assert!(sample.value.is_boolean()),
            }
        }
    }

    #[test]
    fn test_failed_flag_matches_thresholds() {
        let mut generator = SampleGenerator::new(Some(42));
        for _ in 0..500 {
            let sample = generator.generate().unwrap();
            if !sample.value.is_numeric() {
                continue;
            }
            let v = sample.value.as_numeric().unwrap();
            let below = sample
                .lower_threshold
                .as_ref()
                .is_some_and(|l| v < l.as_numeric().unwrap());
            let above = sample
                .upper_threshold
                .as_ref()
                .is_some_and(|u| v > u.as_numeric().unwrap());
            assert_eq!(sample.failed, below || above, "{}", sample.display_path());
        }
    }

    #[test]
    fn test_text_failures_use_failure_list() {
        let mut generator = SampleGenerator::new(Some(3));
        for _ in 0..500 {
            let sample = generator.generate().unwrap();
            let def = find_def(&sample.path);
            if let ReadingKind::Text { failures, .. } = def.kind {
                let text = sample.value.as_str().unwrap();
                assert_eq!(sample.failed, failures.contains(&text));
            }
        }
    }

    #[test]
    fn test_forced_failure_lands_outside_thresholds() {
        static ALWAYS_FAIL: &[SensorDefinition] = &[SensorDefinition {
            path: &["Rack", "Temp"],
            kind: ReadingKind::Double {
                min: 10.0,
                max: 20.0,
                lower: Some(5.0),
                upper: Some(25.0),
            },
            failure_probability: 1.0,
        }];
        let mut generator = SampleGenerator::with_definitions(Some(9), ALWAYS_FAIL);
        for _ in 0..20 {
            let sample = generator.generate().unwrap();
            let v = sample.value.as_double().unwrap();
            assert!(v == 3.0 || v == 27.0, "unexpected {v}");
            assert!(sample.failed);
        }
    }

    #[test]
    fn test_empty_catalogue_yields_nothing() {
        static EMPTY: &[SensorDefinition] = &[];
        let mut generator = SampleGenerator::with_definitions(Some(1), EMPTY);
        assert!(generator.generate().is_none());
    }

    #[test]
    fn test_producer_announces_connection() {
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::new(AtomicBool::new(true));
        let (rx, handle) =
            spawn_producer(Duration::from_millis(1), Some(5), active, running.clone());
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(ProducerEvent::Connected(true))
        ));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(ProducerEvent::Sample(_))
        ));
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
