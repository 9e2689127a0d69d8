use std::time::Duration;

use dmlink_client::{CameraWorker, ClientError};
use dmlink_core::CameraGeometry;
use dmlink_sim::{pattern, SimOptions};

use crate::*;

#[tokio::test]
async fn test_worker_acquires_from_async_code() {
    let host = sim(SimOptions::default().with_chunks(2));
    let (handle, thread) = CameraWorker::spawn(connect(&host)).unwrap();

    let image = handle
        .acquire(CameraGeometry::full_frame(128, 64, 1))
        .await
        .unwrap();
    assert_eq!(image.shape(), (64, 128));
    assert_eq!(image.pixels(), pattern(128 * 64).as_slice());

    let reply = handle.execute_script("Exit(4.0)").await.unwrap();
    assert_eq!(reply.value, 4.0);

    drop(handle);
    let client = thread.join().unwrap();
    assert!(client.is_connected());
}

/// Requests from several tasks are served one at a time on one connection.
#[tokio::test]
async fn test_worker_serializes_concurrent_callers() {
    let host = sim(SimOptions::default());
    let (handle, _thread) = CameraWorker::spawn(connect(&host)).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.execute_script(format!("Exit({i})")).await })
        })
        .collect();
    let mut values = Vec::new();
    for task in tasks {
        values.push(task.await.unwrap().unwrap().value);
    }
    values.sort_by(f64::total_cmp);
    assert_eq!(values, (0..8).map(f64::from).collect::<Vec<_>>());
    assert_eq!(host.stats().connections, 1);
}

/// A timed-out job poisons the connection; the next job gets a fresh one.
#[tokio::test]
async fn test_timeout_reconnects_before_next_job() {
    let host = sim(SimOptions::default());
    let (handle, _thread) = CameraWorker::spawn(connect(&host)).unwrap();

    let err = handle
        .call_with_timeout(Duration::from_millis(20), |client| {
            std::thread::sleep(Duration::from_millis(200));
            client.dm_version()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)), "unexpected error: {err}");
    assert!(handle.is_poisoned());

    assert_eq!(handle.dm_version().await.unwrap(), 40300);
    assert!(!handle.is_poisoned());
    assert_eq!(host.stats().connections, 2);
}
