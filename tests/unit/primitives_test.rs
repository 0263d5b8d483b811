//! Tests for the synchronization primitives

use std::time::Duration;

use tasklet::{sleep, spawn, AsyncResult, Event, Hub, Lock, SchedulerError, Semaphore};

#[test]
fn test_semaphore_fifo_admission() {
    let hub = Hub::new().unwrap();
    let sem = Semaphore::new(1);
    hub.block_on(async {
        let held = sem.try_acquire().unwrap();
        let waiter = {
            let sem = sem.clone();
            spawn(async move {
                let permit = sem.acquire(Some(Duration::from_secs(1))).await;
                Ok::<_, anyhow::Error>(permit.is_some())
            })
        };
        sleep(Duration::ZERO).await;
        assert_eq!(sem.waiting(), 1);
        // A queued waiter blocks the fast path even once a permit frees up.
        drop(held);
        assert!(sem.try_acquire().is_none());
        assert!(waiter.get(Some(Duration::from_secs(1))).await.unwrap());
        assert_eq!(sem.available(), 1);
    });
}

#[test]
fn test_semaphore_acquire_times_out() {
    let hub = Hub::new().unwrap();
    let sem = Semaphore::new(0);
    let permit = hub.block_on(sem.acquire(Some(Duration::from_millis(10))));
    assert!(permit.is_none());
    assert_eq!(sem.waiting(), 0);
}

#[test]
fn test_bounded_semaphore_over_release() {
    let sem = Semaphore::bounded(2);
    assert!(matches!(
        sem.release(),
        Err(SchedulerError::SemaphoreOverRelease)
    ));

    let permit = sem.try_acquire().unwrap();
    permit.forget();
    assert_eq!(sem.available(), 1);
    assert!(sem.release().is_ok());
    assert_eq!(sem.available(), 2);
}

#[test]
fn test_lock_is_exclusive() {
    let hub = Hub::new().unwrap();
    let lock = Lock::new();
    hub.block_on(async {
        let guard = lock.lock().await;
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        assert!(lock.lock_timeout(Duration::from_millis(5)).await.is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    });
}

#[test]
fn test_event_clear_and_rewait() {
    let hub = Hub::new().unwrap();
    let event = Event::new();
    hub.block_on(async {
        event.set();
        assert!(event.wait(None).await);
        event.clear();
        assert!(!event.is_set());
        assert!(!event.wait(Some(Duration::from_millis(5))).await);
    });
}

#[test]
fn test_async_result_exception_reaches_every_getter() {
    let hub = Hub::new().unwrap();
    let result: AsyncResult<u32> = AsyncResult::new();
    hub.block_on(async {
        let getters: Vec<_> = (0..3)
            .map(|_| {
                let result = result.clone();
                spawn(async move {
                    let outcome = result.get(Some(Duration::from_secs(1))).await;
                    Ok::<_, anyhow::Error>(matches!(outcome, Err(SchedulerError::Failed(_))))
                })
            })
            .collect();
        sleep(Duration::ZERO).await;
        result.set_exception(anyhow::anyhow!("upstream gone")).unwrap();
        for getter in &getters {
            assert!(getter.get(Some(Duration::from_secs(1))).await.unwrap());
        }
    });
    assert!(result.ready());
    assert!(!result.successful());
    assert!(result.exception().is_some());
}
