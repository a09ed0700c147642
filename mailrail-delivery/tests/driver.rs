use std::{sync::Arc, time::Duration};

use mailrail_common::Signal;
use mailrail_delivery::{
    DeliveryConfig, Driver, DriverStats, JobProcessor, Mangler, ProcessMode, Recipient,
    SPEC_ATTRIBUTE, Spec,
};
use mailrail_queue::{JobName, JobStage, MemoryQueue, Queue, TestQueue};
use mailrail_ses::{MockService, ServiceError, TransmissionService};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

fn spec(addr: &str) -> Spec {
    Spec {
        from_addr: "johndoe@example.com".to_string(),
        subject: "Hello".to_string(),
        text: "Hello".to_string(),
        recipients: vec![Recipient {
            addr: addr.to_string(),
            ..Recipient::default()
        }],
        ..Spec::default()
    }
}

async fn enqueue(queue: &dyn Queue, addr: &str) -> JobName {
    let job = queue.create_job("driver").await.expect("create");
    job.set(SPEC_ATTRIBUTE, &spec(addr).to_bytes().expect("encode"))
        .await
        .expect("set spec");
    job.submit().await.expect("submit");
    job.name().clone()
}

fn driver(queue: Arc<dyn Queue>, service: &Arc<MockService>) -> Driver {
    let service: Arc<dyn TransmissionService> = Arc::clone(service) as _;
    let config = DeliveryConfig::default();
    Driver::new(
        queue,
        JobProcessor::new(service, Mangler::PassThrough, &config),
        Duration::from_millis(100),
    )
}

#[tokio::test(start_paused = true)]
async fn test_one_mode_processes_a_single_job() {
    let queue = MemoryQueue::new();
    let first = enqueue(&queue, "a@example.com").await;
    let second = enqueue(&queue, "b@example.com").await;
    let service = Arc::new(MockService::new());
    let (_tx, rx) = broadcast::channel(4);

    let stats = driver(Arc::new(queue.clone()), &service)
        .run(ProcessMode::One, rx)
        .await
        .expect("run");

    assert_eq!(stats.finished, 1);
    assert_eq!(stats.processed(), 1);
    assert_eq!(queue.stage(&first), Some(JobStage::Done));
    assert_eq!(queue.stage(&second), Some(JobStage::Queued));
}

#[tokio::test(start_paused = true)]
async fn test_one_mode_with_empty_queue() {
    let queue = MemoryQueue::new();
    let service = Arc::new(MockService::new());
    let (_tx, rx) = broadcast::channel(4);

    let stats = driver(Arc::new(queue), &service)
        .run(ProcessMode::One, rx)
        .await
        .expect("run");

    assert_eq!(stats, DriverStats::default());
}

#[tokio::test(start_paused = true)]
async fn test_all_mode_drains_the_queue() {
    let queue = MemoryQueue::new();
    for addr in ["a@example.com", "b@example.com", "c@example.com"] {
        enqueue(&queue, addr).await;
    }
    let service = Arc::new(MockService::new());
    // The second job fails outright
    service.then_succeed();
    service.then_fail(ServiceError::api("MessageRejected", "rejected"));
    let (_tx, rx) = broadcast::channel(4);

    let stats = driver(Arc::new(queue.clone()), &service)
        .run(ProcessMode::All, rx)
        .await
        .expect("run");

    assert_eq!(stats.finished, 2);
    assert_eq!(stats.failed, 1);
    assert!(queue.jobs_in(JobStage::Queued).is_empty());
    assert_eq!(queue.jobs_in(JobStage::Done).len(), 2);
    assert_eq!(queue.jobs_in(JobStage::Failed).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rescues_abandoned_jobs_before_taking() {
    let crashed = MemoryQueue::new();
    let name = enqueue(&crashed, "a@example.com").await;
    let _abandoned = crashed.take().await.expect("take").expect("job");
    assert_eq!(crashed.stage(&name), Some(JobStage::Running));

    let restarted = crashed.restart();
    let service = Arc::new(MockService::new());
    let (_tx, rx) = broadcast::channel(4);

    let stats = driver(Arc::new(restarted.clone()), &service)
        .run(ProcessMode::All, rx)
        .await
        .expect("run");

    assert_eq!(stats.rescued, 1);
    assert_eq!(stats.finished, 1);
    assert_eq!(restarted.stage(&name), Some(JobStage::Done));
}

#[tokio::test(start_paused = true)]
async fn test_forever_mode_polls_until_shutdown() {
    let queue = TestQueue::new();
    let service = Arc::new(MockService::new());
    let (tx, rx) = broadcast::channel(4);

    let worker = tokio::spawn({
        let driver = driver(Arc::new(queue.clone()), &service);
        async move {
            driver
                .run(ProcessMode::Forever, rx)
                .await
        }
    });

    // Jobs submitted while the driver is idle are picked up on the next poll
    tokio::time::sleep(Duration::from_millis(250)).await;
    enqueue(&queue, "a@example.com").await;
    enqueue(&queue, "b@example.com").await;
    queue
        .wait_for_stage_count(JobStage::Done, 2, Duration::from_secs(5))
        .await
        .expect("jobs finished");

    tx.send(Signal::Shutdown).expect("signal");
    let stats = worker.await.expect("join").expect("run");

    assert_eq!(stats.finished, 2);
    assert_eq!(service.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start_takes_nothing() {
    let queue = MemoryQueue::new();
    let name = enqueue(&queue, "a@example.com").await;
    let service = Arc::new(MockService::new());
    let (tx, rx) = broadcast::channel(4);
    tx.send(Signal::Shutdown).expect("signal");

    let stats = driver(Arc::new(queue.clone()), &service)
        .run(ProcessMode::Forever, rx)
        .await
        .expect("run");

    assert_eq!(stats.processed(), 0);
    assert_eq!(queue.stage(&name), Some(JobStage::Queued));
}

#[tokio::test(start_paused = true)]
async fn test_all_mode_attempts_a_resubmitted_job_once() {
    let queue = MemoryQueue::new();
    let first = enqueue(&queue, "a@example.com").await;
    let second = enqueue(&queue, "b@example.com").await;
    let service = Arc::new(
        MockService::new().with_quota_error(ServiceError::api("ServiceUnavailable", "")),
    );
    let (_tx, rx) = broadcast::channel(4);

    let start = tokio::time::Instant::now();
    let stats = driver(Arc::new(queue.clone()), &service)
        .run(ProcessMode::All, rx)
        .await
        .expect("run");

    // Each job is attempted once, with a poll interval after each resubmit
    assert_eq!(stats.resubmitted, 2);
    assert_eq!(service.quota_queries(), 2);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(queue.stage(&first), Some(JobStage::Queued));
    assert_eq!(queue.stage(&second), Some(JobStage::Queued));
}

#[tokio::test(start_paused = true)]
async fn test_forever_mode_waits_between_resubmits() {
    let queue = TestQueue::new();
    let name = enqueue(&queue, "a@example.com").await;
    let service = Arc::new(
        MockService::new().with_quota_error(ServiceError::api("ServiceUnavailable", "")),
    );
    let (tx, rx) = broadcast::channel(4);

    let worker = tokio::spawn({
        let driver = driver(Arc::new(queue.clone()), &service);
        async move { driver.run(ProcessMode::Forever, rx).await }
    });

    tokio::time::sleep(Duration::from_millis(1050)).await;
    tx.send(Signal::Shutdown).expect("signal");
    let stats = worker.await.expect("join").expect("run");

    // One attempt every 100ms, not a busy loop
    assert!((10..=12).contains(&stats.resubmitted), "{stats}");
    assert_eq!(service.quota_queries(), stats.resubmitted);
    assert_eq!(queue.inner().stage(&name), Some(JobStage::Queued));
}
