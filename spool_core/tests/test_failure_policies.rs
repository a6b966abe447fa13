use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use common::{CollectingSink, FailingSink, FlakySink, event_lines, test_options};
use spool_core::{
    DecodeError, DecodeFailurePolicy, Pipeline, PipelineError, RetryPolicy, SinkError,
    SinkFailurePolicy,
};
use tokio_util::sync::CancellationToken;

mod common;

fn input_with_bad_second_line() -> String {
    let mut input = String::from("{\"seq\":0}\n{\"time\": 17\n");
    input.push_str(&event_lines(50));
    input
}

#[tokio::test]
async fn test_skip_policy_delivers_the_other_lines() {
    let sink = Arc::new(CollectingSink::default());
    let input = input_with_bad_second_line();

    let report = Pipeline::new(test_options(), sink.clone())
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.reader.decode_errors, 1);
    assert_eq!(report.reader.accepted, 51);
    assert_eq!(sink.records(), 51);
}

#[tokio::test]
async fn test_fail_fast_policy_stops_before_later_lines_are_flushed() {
    let sink = Arc::new(CollectingSink::default());
    let input = input_with_bad_second_line();

    let options = test_options().with_decode_failure(DecodeFailurePolicy::FailFast);
    let err = Pipeline::new(options, sink.clone())
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Decode {
            line_number: 2,
            source: DecodeError::InvalidJson { .. }
        }
    ));
    // Only the first line can have reached a sink; it carries seq 0.
    assert!(sink.sorted_sequences().iter().all(|seq| *seq == 0));
    assert!(sink.records() <= 1);
}

#[tokio::test]
async fn test_fatal_sink_failure_ends_the_run() {
    let sink = Arc::new(FailingSink::default());
    let input = event_lines(2000);

    let err = Pipeline::new(test_options(), sink.clone())
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Sink {
            source: SinkError::Unavailable { .. },
            ..
        }
    ));
    assert!(sink.calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_drop_policy_keeps_reading_after_failures() {
    let sink = Arc::new(FailingSink::default());
    let input = event_lines(300);

    let options = test_options().with_sink_failure(SinkFailurePolicy::Drop);
    let report = Pipeline::new(options, sink)
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.reader.accepted, 300);
    assert_eq!(report.records_delivered, 0);
    assert_eq!(report.records_dropped, 300);
    assert_eq!(report.residual_queue_len, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_recovers_transient_failures() {
    let sink = Arc::new(FlakySink::new(2));
    let input = event_lines(5);

    let options = test_options()
        .with_worker_count(1)
        .with_batch_size(100)
        .with_sink_retry(Some(RetryPolicy::new(3, Duration::from_millis(100))));
    let report = Pipeline::new(options, sink.clone())
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.records_delivered, 5);
    assert_eq!(sink.calls(), 3);
    assert_eq!(sink.inner.sorted_sequences(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_fatal() {
    let sink = Arc::new(FailingSink::default());
    let input = event_lines(5);

    let options = test_options()
        .with_worker_count(1)
        .with_sink_retry(Some(RetryPolicy::new(2, Duration::from_millis(10))));
    let err = Pipeline::new(options, sink.clone())
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Sink {
            source: SinkError::RetriesExhausted { attempts: 2, .. },
            ..
        }
    ));
}

#[test]
fn test_invalid_options_are_rejected_before_running() {
    let invalid = [
        test_options().with_batch_size(0),
        test_options().with_worker_count(usize::MAX),
        test_options().with_queue_capacity(usize::MAX),
    ];

    for options in invalid {
        let err = Pipeline::new(options, Arc::new(CollectingSink::default()))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }
}
