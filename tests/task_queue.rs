//! Concurrency bounds of the background task queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_test::assert_ok;

use ai_research_workflow::queue::{AsyncTaskQueue, TaskStatus};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_running_tasks_never_exceed_worker_count() {
    const MAX: usize = 3;
    let queue: Arc<AsyncTaskQueue<usize>> = Arc::new(AsyncTaskQueue::new(MAX));
    let gate = Arc::new(Semaphore::new(0));
    queue.start_workers();

    let ids: Vec<String> = (0..=MAX)
        .map(|n| {
            let gate = Arc::clone(&gate);
            assert_ok!(queue.submit_task(format!("task-{n}"), async move {
                let _permit = gate.acquire().await.expect("gate stays open");
                Ok(n)
            }))
        })
        .collect();

    wait_until(|| queue.running_count() == MAX).await;
    // Give a would-be extra worker time to misbehave.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let running = ids
        .iter()
        .filter(|id| queue.get_task_status(id) == TaskStatus::Running)
        .count();
    assert_eq!(running, MAX);
    assert_eq!(queue.pending_count(), 1);

    gate.add_permits(MAX + 1);
    wait_until(|| {
        ids.iter()
            .all(|id| queue.get_task_status(id) == TaskStatus::Completed)
    })
    .await;

    assert_eq!(queue.get_task_result("task-2"), Some(2));
    assert_eq!(queue.running_count(), 0);
    queue.stop_workers().await;
}

async fn explode() -> anyhow::Result<()> {
    panic!("kaboom")
}

#[tokio::test]
async fn test_panicking_task_is_recorded_as_failed() {
    let queue: AsyncTaskQueue<()> = AsyncTaskQueue::new(1);
    queue.start_workers();

    assert_ok!(queue.submit_task("explodes", explode()));
    assert_ok!(queue.submit_task("after", async { Ok(()) }));

    wait_until(|| queue.get_task_status("after") == TaskStatus::Completed).await;
    assert_eq!(queue.get_task_status("explodes"), TaskStatus::Failed);
    assert!(queue.get_task_error("explodes").is_some());
    queue.stop_workers().await;
}

#[tokio::test]
async fn test_stop_waits_for_running_task() {
    let queue: AsyncTaskQueue<&'static str> = AsyncTaskQueue::new(2);
    queue.start_workers();

    assert_ok!(queue.submit_task("slow", async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok("done")
    }));
    wait_until(|| queue.get_task_status("slow") == TaskStatus::Running).await;

    queue.stop_workers().await;
    assert_eq!(queue.get_task_status("slow"), TaskStatus::Completed);
    assert_eq!(queue.get_task_result("slow"), Some("done"));
}
