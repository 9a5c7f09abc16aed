//! `sensorscope record`: run the demo producer headless and log every sample.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use sensorscope_core::{RecorderConfig, SampleRecorder, SensorModel};

use super::parse_duration;
use crate::generator::{ProducerEvent, spawn_producer};

/// Run the record command.
pub fn run(duration: Option<&str>, log_dir: &str, seed: Option<u64>, sample_interval_ms: u64) {
    let max_duration = duration.map(|d| {
        parse_duration(d).unwrap_or_else(|| {
            eprintln!("Invalid duration: {d}");
            std::process::exit(1);
        })
    });

    let config = RecorderConfig {
        output_dir: PathBuf::from(log_dir),
    };
    let mut recorder = match SampleRecorder::new(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error creating sample log: {e}");
            std::process::exit(1);
        }
    };

    // Ctrl+C stops the loop; the log is still closed properly.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let interval = Duration::from_millis(sample_interval_ms.max(1));
    println!("Recording demo sensors");
    match max_duration {
        Some(d) => println!("  Duration:  {:.1}s", d.as_secs_f64()),
        None => println!("  Duration:  until Ctrl+C"),
    }
    println!("  Interval:  {}ms", interval.as_millis());
    if let Some(seed) = seed {
        println!("  Seed:      {seed}");
    }
    println!("  Output:    {}", recorder.path().display());
    println!();

    let producer_active = Arc::new(AtomicBool::new(true));
    let (rx, handle) = spawn_producer(interval, seed, producer_active, running.clone());

    let mut model = SensorModel::new();
    let mut failed_samples = 0u64;
    let mut had_write_error = false;
    let start = Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(max) = max_duration
            && start.elapsed() >= max
        {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(ProducerEvent::Sample(sample)) => {
                if let Err(e) = model.add_sample(&sample) {
                    log::warn!("dropping sample for {}: {e}", sample.display_path());
                    continue;
                }
                if sample.failed {
                    failed_samples += 1;
                }
                if let Err(e) = recorder.record(&sample) {
                    eprintln!("\nError writing sample: {e}");
                    had_write_error = true;
                    break;
                }
            }
            Ok(ProducerEvent::Connected(connected)) => {
                log::info!("producer connected: {connected}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        print!(
            "\r  Samples: {:<8} Failed: {failed_samples:<6} Nodes: {:<4} Elapsed: {:.1}s",
            recorder.total_samples(),
            model.tree().len(),
            start.elapsed().as_secs_f64()
        );
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }

    running.store(false, Ordering::SeqCst);
    drop(rx);
    if handle.join().is_err() {
        log::warn!("producer thread panicked");
    }

    println!();
    println!();

    if had_write_error {
        eprintln!("Recording stopped due to write error.");
    }

    let total = recorder.total_samples();
    match recorder.finish() {
        Ok(path) => {
            println!("Sample log saved to {}", path.display());
            println!("  {total} samples, {failed_samples} flagged failed");
            println!("  Replay with: sensorscope inspect {}", path.display());
        }
        Err(e) => {
            eprintln!("Error finalizing sample log: {e}");
            std::process::exit(1);
        }
    }
}
