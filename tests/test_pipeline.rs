use ring_pipeline::{
    run_source, PipelineBuilder, PipelineConfig, PipelineError, Result as PipelineResult, Stage,
};
use std::io::{BufReader, Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn collect(running: &ring_pipeline::RunningPipeline<i64>, want: usize, within: Duration) -> Vec<i64> {
    let deadline = Instant::now() + within;
    let mut seen = Vec::new();
    while seen.len() < want {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if let Some(v) = running.recv_timeout(deadline - now) {
            seen.push(v);
        }
    }
    seen
}

#[test]
fn test_no_stages_error() {
    let result = PipelineBuilder::<i64>::new().build();
    assert!(matches!(result, Err(PipelineError::NoStages)));
}

#[test]
fn test_invalid_buffer_rejected_at_build() {
    let result = PipelineBuilder::<i64>::new()
        .buffer("buffer", 0, Duration::from_secs(1))
        .build();
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[test]
fn test_standard_stage_order() {
    let pipeline = PipelineBuilder::from_config(&PipelineConfig::default())
        .build()
        .expect("Pipeline build failed");
    assert_eq!(
        pipeline.stage_names(),
        vec!["positive", "not_multiple_of_three", "buffer"]
    );
}

#[test]
fn test_end_to_end_batch() {
    // Spare link slots keep a mid-burst flush from stalling the sends below.
    let config = PipelineConfig::default()
        .with_flush_interval(Duration::from_millis(300))
        .with_link_capacity(16);
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    for v in [5, -2, 9, 4, 6, 7] {
        running.send(v).expect("Send failed");
    }

    let seen = collect(&running, 3, Duration::from_secs(3));
    assert_eq!(seen, vec![5, 4, 7]);

    let buffer_metrics = running.stage_metrics(2).expect("Metrics not found").clone();
    running.wait().expect("Wait failed");

    assert_eq!(buffer_metrics.total_received(), 3);
    assert_eq!(buffer_metrics.total_forwarded(), 3);
}

#[test]
fn test_overflow_delivers_newest() {
    let config = PipelineConfig::default()
        .with_ring_capacity(3)
        .with_flush_interval(Duration::from_millis(400))
        .with_link_capacity(16);
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    // None of these are filtered out.
    for v in [1, 2, 4, 5, 7] {
        running.send(v).expect("Send failed");
    }

    let seen = collect(&running, 3, Duration::from_secs(3));
    assert_eq!(seen, vec![4, 5, 7]);
    running.wait().expect("Wait failed");
}

#[test]
fn test_order_preserved_across_flushes() {
    // Output is only read at the end, so the links need room for everything.
    let config = PipelineConfig::default()
        .with_flush_interval(Duration::from_millis(50))
        .with_link_capacity(64);
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    let input: Vec<i64> = vec![1, -1, 2, 3, 4, 0, 5, 6, 7, 8, 9, 10];
    let expected: Vec<i64> = input.iter().copied().filter(|v| *v > 0 && v % 3 != 0).collect();

    for v in &input {
        running.send(*v).expect("Send failed");
        // Slower than the flush period, so the ring never overflows.
        thread::sleep(Duration::from_millis(80));
    }

    let seen = collect(&running, expected.len(), Duration::from_secs(3));
    assert_eq!(seen, expected);
    running.wait().expect("Wait failed");
}

#[test]
fn test_cancel_drops_buffered_values() {
    let config = PipelineConfig::default().with_flush_interval(Duration::from_secs(60));
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    running.send(1).expect("Send failed");
    running.send(2).expect("Send failed");

    let buffer_metrics = running.stage_metrics(2).expect("Metrics not found").clone();
    let deadline = Instant::now() + Duration::from_secs(2);
    while buffer_metrics.total_received() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(buffer_metrics.total_received(), 2);

    let token = running.cancel_token();
    running.stop();
    assert!(token.is_cancelled());
    assert_eq!(running.recv(), None);

    let start = Instant::now();
    running.wait().expect("Wait failed");
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(buffer_metrics.total_forwarded(), 0);
    assert_eq!(buffer_metrics.total_discarded(), 2);
}

#[test]
fn test_producer_on_another_thread() {
    let config = PipelineConfig::default().with_flush_interval(Duration::from_millis(100));
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");
    let producer = running.take_producer().expect("Producer already taken");

    let feeder = thread::spawn(move || {
        for v in [10, 11, 12] {
            producer.send(v).expect("Send failed");
        }
        // Let one flush happen before shutting down.
        thread::sleep(Duration::from_millis(400));
        producer.stop();
    });

    let mut seen = Vec::new();
    while let Some(v) = running.recv() {
        seen.push(v);
    }
    feeder.join().unwrap();

    assert_eq!(seen, vec![10, 11]);
    running.wait().expect("Wait failed");
}

#[test]
fn test_source_feeds_pipeline() {
    let config = PipelineConfig::default().with_flush_interval(Duration::from_millis(100));
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");
    let producer = running.take_producer().expect("Producer already taken");

    let output = running.output().clone();
    let reader = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Ok(v) = output.recv_timeout(Duration::from_secs(2)) {
            seen.push(v);
            if seen.len() == 2 {
                break;
            }
        }
        seen
    });

    // No stop command: the gate keeps the input open until the output has been read.
    let (gate_tx, gate_rx) = crossbeam::channel::bounded::<()>(0);
    let input = BufReader::new(Cursor::new("5\nabc\n\n-2\n4\n").chain(GateReader(gate_rx)));
    let source = thread::spawn(move || run_source(input, producer));

    let seen = reader.join().unwrap();
    assert_eq!(seen, vec![5, 4]);

    drop(gate_tx);
    let summary = source.join().unwrap().expect("Source failed");
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected, 1);
    assert!(running.is_cancelled());
    running.wait().expect("Wait failed");
}

/// A reader that blocks until its gate channel is closed, then reports EOF.
struct GateReader(crossbeam::channel::Receiver<()>);

impl Read for GateReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

#[test]
fn test_source_stop_command() {
    let mut running = PipelineBuilder::from_config(&PipelineConfig::default())
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");
    let producer = running.take_producer().expect("Producer already taken");

    let input = Cursor::new("1\nExit\n2\n");
    let summary = run_source(input, producer).expect("Source failed");
    assert_eq!(summary.accepted, 1);
    assert!(running.is_cancelled());
    assert_eq!(running.recv(), None);
    running.wait().expect("Wait failed");
}

#[test]
fn test_custom_stage() {
    struct Doubler {
        count: Arc<AtomicUsize>,
        shut_down: Arc<AtomicBool>,
    }

    impl Stage<i64> for Doubler {
        fn process(&mut self, input: i64) -> PipelineResult<Vec<i64>> {
            self.count.fetch_add(1, Ordering::Relaxed);
            Ok(vec![input, input])
        }

        fn on_shutdown(&mut self) -> PipelineResult<()> {
            self.shut_down.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn name(&self) -> &str {
            "doubler"
        }
    }

    let count = Arc::new(AtomicUsize::new(0));
    let shut_down = Arc::new(AtomicBool::new(false));
    let mut running = PipelineBuilder::new()
        .filter("even", |v: &i64| v % 2 == 0)
        .add_stage(Doubler {
            count: Arc::clone(&count),
            shut_down: Arc::clone(&shut_down),
        })
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");
    let producer = running.take_producer().expect("Producer already taken");

    let feeder = thread::spawn(move || {
        for v in 1..=4 {
            producer.send(v).expect("Send failed");
        }
        producer
    });

    let seen = collect(&running, 4, Duration::from_secs(2));
    assert_eq!(seen, vec![2, 2, 4, 4]);
    assert_eq!(count.load(Ordering::Relaxed), 2);

    assert!(!shut_down.load(Ordering::Relaxed));

    feeder.join().unwrap().stop();
    running.wait().expect("Wait failed");
    assert!(shut_down.load(Ordering::Relaxed));
}

#[test]
fn test_flushed_batch_lost_on_stop_is_counted() {
    // Nobody reads the output, so the first flush blocks on the last link.
    let config = PipelineConfig::default().with_flush_interval(Duration::from_millis(200));
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    for v in [1, 2, 4] {
        running.send(v).expect("Send failed");
    }
    let buffer_metrics = running.stage_metrics(2).expect("Metrics not found").clone();

    thread::sleep(Duration::from_millis(500));
    assert_eq!(buffer_metrics.total_flushes(), 1);

    running.wait().expect("Wait failed");
    assert_eq!(buffer_metrics.total_received(), 3);
    assert_eq!(buffer_metrics.total_forwarded(), 0);
    assert_eq!(buffer_metrics.total_discarded(), 3);
}

#[test]
fn test_flush_cadence_not_reset_by_arrivals() {
    let interval = Duration::from_millis(200);
    let config = PipelineConfig::default().with_flush_interval(interval);
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");
    let producer = running.take_producer().expect("Producer already taken");

    let start = Instant::now();
    let feeder = thread::spawn(move || {
        // One value every quarter interval for several intervals.
        for v in [1, 2, 4, 5, 7, 8, 10, 11, 13, 14, 16, 17, 19, 20, 22, 23] {
            producer.send(v).expect("Send failed");
            thread::sleep(interval / 4);
        }
        producer
    });

    let first = running.recv_timeout(Duration::from_secs(2));
    let first_at = start.elapsed();
    assert_eq!(first, Some(1));
    assert!(
        first_at < interval * 3 / 2,
        "first output after {first_at:?}, flush period {interval:?}"
    );

    // Keep reading until the feeder is done so it never blocks.
    loop {
        let got = running.recv_timeout(Duration::from_millis(300)).is_some();
        if !got && feeder.is_finished() {
            break;
        }
    }
    feeder.join().expect("Feeder panicked").stop();
    running.wait().expect("Wait failed");
}

#[test]
fn test_slow_consumer_delays_flush_without_loss() {
    let config = PipelineConfig::default().with_flush_interval(Duration::from_millis(100));
    let mut running = PipelineBuilder::from_config(&config)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    running.send(1).expect("Send failed");
    running.send(2).expect("Send failed");

    // Stall past several ticks before reading anything.
    thread::sleep(Duration::from_millis(350));

    let seen = collect(&running, 2, Duration::from_secs(2));
    assert_eq!(seen, vec![1, 2]);

    let buffer_metrics = running.stage_metrics(2).expect("Metrics not found").clone();
    running.wait().expect("Wait failed");
    assert_eq!(buffer_metrics.total_forwarded(), 2);
    assert_eq!(buffer_metrics.total_discarded(), 0);
}

#[test]
fn test_start_hook_failure_reported_by_wait() {
    struct Unready;

    impl Stage<i64> for Unready {
        fn process(&mut self, input: i64) -> PipelineResult<Vec<i64>> {
            Ok(vec![input])
        }

        fn on_start(&mut self) -> PipelineResult<()> {
            Err(PipelineError::StageError("device not ready".into()))
        }

        fn name(&self) -> &str {
            "unready"
        }
    }

    let running = PipelineBuilder::new()
        .filter("positive", |v: &i64| *v > 0)
        .add_stage(Unready)
        .build()
        .expect("Pipeline build failed")
        .start()
        .expect("Pipeline start failed");

    let result = running.wait();
    assert!(matches!(result, Err(PipelineError::StageError(msg)) if msg == "device not ready"));
}
