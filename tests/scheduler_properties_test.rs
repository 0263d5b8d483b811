//! Behavioral properties of the cooperative scheduler and its primitives.
//!
//! Each test drives a fresh [`Hub`] and checks one observable guarantee:
//! pool capacity, queue ordering, broadcast wakeups, single resolution,
//! deadline races and the concurrency of sleeping units.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rand::Rng;
use tasklet::{
    current_task_id, init_tracing, join_all, run, sleep, spawn, spawn_later, AsyncResult, Event, Hub,
    JoinOptions, JoinableQueue, LifoQueue, Pool, PriorityQueue, Queue, SchedulerError, TaskBuilder,
    TaskState, Timeout,
};

const LONG: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_pool_never_exceeds_capacity() {
    let hub = Hub::new().unwrap();
    let pool = Pool::new(3).unwrap();
    let running = Rc::new(Cell::new(0_usize));
    let peak = Rc::new(Cell::new(0_usize));

    hub.block_on(async {
        let mut rng = rand::rng();
        for _ in 0..12 {
            let jitter = Duration::from_millis(rng.random_range(1..6));
            let running = Rc::clone(&running);
            let peak = Rc::clone(&peak);
            pool.spawn(async move {
                running.set(running.get() + 1);
                peak.set(peak.get().max(running.get()));
                sleep(jitter).await;
                running.set(running.get() - 1);
                Ok::<_, anyhow::Error>(())
            })
            .unwrap();
            assert!(pool.len() - pool.stats().queued_tasks <= 3);
        }
        assert!(pool.join(LONG).await);
    });

    assert_eq!(peak.get(), 3);
    assert_eq!(pool.stats().completed_tasks, 12);
}

#[test]
fn test_queued_pool_members_start_in_submission_order() {
    let hub = Hub::new().unwrap();
    let pool = Pool::new(1).unwrap();
    let order: Queue<usize> = Queue::new();

    hub.block_on(async {
        for i in 0..5 {
            let order = order.clone();
            pool.spawn(async move {
                order.put_nowait(i).map_err(|_| anyhow::anyhow!("order log full"))?;
                sleep(Duration::from_millis(1)).await;
                Ok::<_, anyhow::Error>(())
            })
            .unwrap();
        }
        assert!(pool.join(LONG).await);
    });

    let started: Vec<_> = std::iter::from_fn(|| order.get_nowait().ok()).collect();
    assert_eq!(started, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_fifo_queue_preserves_put_order() {
    let hub = Hub::new().unwrap();
    let queue: Queue<&str> = Queue::bounded(3);
    let received = hub.block_on(async {
        let producer = {
            let queue = queue.clone();
            spawn(async move {
                for item in ["a", "b", "c", "d", "e"] {
                    queue.put(item, None).await.map_err(|_| anyhow::anyhow!("full"))?;
                }
                Ok::<_, anyhow::Error>(())
            })
        };
        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(queue.get(LONG).await.unwrap());
        }
        assert!(producer.join(LONG).await);
        assert!(producer.successful());
        received
    });
    assert_eq!(received, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_lifo_queue_returns_newest_first() {
    let queue: LifoQueue<u8> = LifoQueue::new();
    for i in 1..=3 {
        queue.put_nowait(i).unwrap();
    }
    assert_eq!(queue.get_nowait().unwrap(), 3);
    assert_eq!(queue.get_nowait().unwrap(), 2);
    assert_eq!(queue.get_nowait().unwrap(), 1);
    assert!(matches!(queue.get_nowait(), Err(SchedulerError::QueueEmpty)));
}

#[test]
fn test_priority_queue_returns_lowest_first() {
    let queue: PriorityQueue<u8, &str> = PriorityQueue::new();
    queue.put_nowait((3, "low")).unwrap();
    queue.put_nowait((1, "urgent")).unwrap();
    queue.put_nowait((2, "normal")).unwrap();
    queue.put_nowait((1, "urgent-later")).unwrap();

    let drained: Vec<_> = std::iter::from_fn(|| queue.get_nowait().ok())
        .map(|(_, v)| v)
        .collect();
    assert_eq!(drained, vec!["urgent", "urgent-later", "normal", "low"]);
}

#[test]
fn test_bounded_queue_rejects_when_full() {
    let hub = Hub::new().unwrap();
    let queue: Queue<u32> = Queue::bounded(1);
    queue.put_nowait(1).unwrap();
    assert!(queue.is_full());

    let rejected = queue.put_nowait(2).unwrap_err();
    assert_eq!(rejected.into_inner(), 2);

    let timed = hub.block_on(queue.put(3, Some(Duration::from_millis(10))));
    assert_eq!(timed.unwrap_err().into_inner(), 3);
    assert_eq!(queue.qsize(), 1);
}

#[test]
fn test_event_set_wakes_every_waiter() {
    let hub = Hub::new().unwrap();
    let event = Event::new();
    let woken = hub.block_on(async {
        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let event = event.clone();
                spawn(async move { Ok::<_, anyhow::Error>(event.wait(None).await) })
            })
            .collect();
        sleep(Duration::ZERO).await;
        assert!(waiters.iter().all(|w| !w.ready()));

        event.set();
        let done = join_all(&waiters, JoinOptions::new().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        done.iter().filter(|w| w.value().unwrap()).count()
    });
    assert_eq!(woken, 5);
}

#[test]
fn test_async_result_resolves_once() {
    let hub = Hub::new().unwrap();
    let result: AsyncResult<&str> = AsyncResult::new();
    assert!(matches!(result.get_nowait(), Err(SchedulerError::NotReady)));

    result.set("first").unwrap();
    assert!(matches!(
        result.set("second"),
        Err(SchedulerError::AlreadyResolved)
    ));
    assert!(matches!(
        result.set_exception(anyhow::anyhow!("late")),
        Err(SchedulerError::AlreadyResolved)
    ));

    let value = hub.block_on(result.get(None)).unwrap();
    assert_eq!(value, "first");
    assert!(result.successful());
}

#[test]
fn test_completion_on_deadline_pass_wins() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let timeout = Timeout::new(Duration::ZERO);
        assert_eq!(timeout.run(async { 42 }).await.unwrap(), 42);

        let slow = Timeout::new(Duration::from_millis(5));
        let expired = slow.run(sleep(Duration::from_secs(5))).await.unwrap_err();
        assert!(expired.is(&slow));
    });
}

#[test]
fn test_nested_timeouts_report_the_scope_that_fired() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let outer = Timeout::new(Duration::from_secs(5));
        let inner = Timeout::new(Duration::from_millis(5));
        let res = outer.run(inner.run(sleep(Duration::from_secs(5)))).await;
        match res {
            Ok(Err(expired)) => {
                assert!(expired.is(&inner));
                assert!(!expired.is(&outer));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    });
}

#[test]
fn test_joinable_queue_join_waits_for_task_done() {
    let hub = Hub::new().unwrap();
    let queue: JoinableQueue<u64> = JoinableQueue::new();
    let total = Rc::new(Cell::new(0_u64));

    hub.block_on(async {
        for _ in 0..2 {
            let queue = queue.clone();
            let total = Rc::clone(&total);
            spawn(async move {
                while let Ok(item) = queue.get(None).await {
                    sleep(Duration::from_millis(1)).await;
                    total.set(total.get() + item);
                    queue.task_done()?;
                }
                Ok::<_, anyhow::Error>(())
            });
        }
        for i in 1..=10 {
            queue.put(i, None).await.unwrap();
        }
        assert_eq!(queue.unfinished_tasks(), 10);
        assert!(queue.join(LONG).await);
    });

    assert_eq!(total.get(), 55);
    assert_eq!(queue.unfinished_tasks(), 0);
    assert!(matches!(
        queue.task_done(),
        Err(SchedulerError::TaskDoneUnderflow)
    ));
}

#[test]
fn test_map_keeps_input_order() {
    let hub = Hub::new().unwrap();
    let pool = Pool::new(4).unwrap();
    let values = hub
        .block_on(pool.map(0..8_u64, |n| async move {
            sleep(Duration::from_millis((8 - n) * 2)).await;
            Ok(n * 10)
        }))
        .unwrap();
    assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
}

#[test]
fn test_kill_is_idempotent() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let unit = spawn(async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, anyhow::Error>(1)
        });
        sleep(Duration::ZERO).await;
        unit.kill();
        unit.kill();
        assert!(unit.kill_and_join(LONG).await);
        assert_eq!(unit.state(), TaskState::Cancelled);
        assert!(unit.get(None).await.unwrap_err().is_cancelled());

        unit.kill();
        assert_eq!(unit.state(), TaskState::Cancelled);
    });
}

#[test]
fn test_killing_finished_unit_keeps_outcome() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let unit = spawn(async { Ok::<_, anyhow::Error>("done") });
        assert!(unit.join(LONG).await);
        unit.kill();
        assert_eq!(unit.state(), TaskState::Completed);
        assert_eq!(unit.value().unwrap(), "done");
    });
}

#[test]
fn test_sleeping_units_overlap() {
    let hub = Hub::new().unwrap();
    let started = Instant::now();
    hub.block_on(async {
        let units: Vec<_> = [40_u64, 60, 80]
            .into_iter()
            .map(|ms| {
                spawn(async move {
                    sleep(Duration::from_millis(ms)).await;
                    Ok::<_, anyhow::Error>(ms)
                })
            })
            .collect();
        let done = join_all(&units, JoinOptions::new()).await.unwrap();
        assert_eq!(done.len(), 3);
    });
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_millis(170), "elapsed {elapsed:?}");
}

#[test]
fn test_spawn_later_waits_for_delay() {
    let hub = Hub::new().unwrap();
    let started = Instant::now();
    let value = hub
        .block_on(async {
            spawn_later(Duration::from_millis(20), async { Ok::<_, anyhow::Error>(Instant::now()) })
                .get(LONG)
                .await
        })
        .unwrap();
    assert!(value.duration_since(started) >= Duration::from_millis(20));
}

#[test]
fn test_current_task_id_inside_unit() {
    let hub = Hub::new().unwrap();
    assert_eq!(current_task_id(), None);
    hub.block_on(async {
        let unit = spawn(async { Ok::<_, anyhow::Error>(current_task_id()) });
        assert_eq!(unit.get(LONG).await.unwrap(), Some(unit.id()));
    });
}

#[test]
fn test_panicking_unit_fails_without_poisoning_hub() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let unit = spawn(async {
            if current_task_id().is_some() {
                panic!("boom");
            }
            Ok::<_, anyhow::Error>(())
        });
        assert!(unit.join(LONG).await);
        assert_eq!(unit.state(), TaskState::Failed);
        assert!(matches!(
            unit.error(),
            Some(SchedulerError::TaskFailed { .. })
        ));

        let next = spawn(async { Ok::<_, anyhow::Error>(7) });
        assert_eq!(next.get(LONG).await.unwrap(), 7);
    });
}

#[test]
fn test_link_runs_after_finish() {
    let hub = Hub::new().unwrap();
    let linked = Event::new();
    hub.block_on(async {
        let unit = spawn(async { Ok::<_, anyhow::Error>(3_u32) });
        let signal = linked.clone();
        unit.link(move |handle| {
            if handle.successful() {
                signal.set();
            }
        });
        assert!(linked.wait(LONG).await);
    });
}

#[test]
fn test_join_all_raises_first_failure() {
    let hub = Hub::new().unwrap();
    let err = hub
        .block_on(async {
            let units = vec![
                spawn(async {
                    sleep(Duration::from_millis(20)).await;
                    Ok::<_, anyhow::Error>(1)
                }),
                spawn(async { Err::<i32, _>(anyhow::anyhow!("bad input")) }),
            ];
            join_all(&units, JoinOptions::new().with_raise_on_error(true)).await
        })
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TaskFailed { .. }));
}

#[test]
fn test_join_all_timeout_returns_finished_subset() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let fast = spawn(async { Ok::<_, anyhow::Error>(0) });
        let slow = spawn(async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, anyhow::Error>(1)
        });
        let units = vec![fast.clone(), slow.clone()];
        let done = join_all(&units, JoinOptions::new().with_timeout(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id(), fast.id());
        slow.kill();
    });
}

#[test]
fn test_units_spawned_before_driving_run_on_block_on() {
    init_tracing();
    let hub = Hub::new().unwrap();
    let plain = hub.spawn(async { Ok::<_, anyhow::Error>(1) });
    let named = TaskBuilder::new()
        .name("reporter")
        .spawn_on(&hub, async { Ok::<_, anyhow::Error>(2) });
    assert_eq!(named.name(), Some("reporter"));
    assert!(!plain.ready());

    let sum = hub.block_on(async {
        Ok::<_, SchedulerError>(plain.get(LONG).await? + named.get(LONG).await?)
    });
    assert_eq!(sum.unwrap(), 3);
    assert_eq!(named.state(), TaskState::Completed);
}

#[test]
fn test_child_records_parent() {
    let hub = Hub::new().unwrap();
    hub.block_on(async {
        let parent = spawn(async {
            let child = spawn(async { Ok::<_, anyhow::Error>(()) });
            child.join(LONG).await;
            Ok::<_, anyhow::Error>(child.parent())
        });
        assert_eq!(parent.get(LONG).await.unwrap(), Some(parent.id()));
    });
}

#[test]
fn test_spawn_outside_hub_runs_on_default_hub() {
    let unit = spawn(async { Ok::<_, anyhow::Error>(5) });
    assert_eq!(unit.state(), TaskState::Created);
    let value = run(unit.get(LONG)).unwrap().unwrap();
    assert_eq!(value, 5);
    assert!(unit.successful());
}

#[test]
fn test_joinable_join_blocks_until_last_task_done() {
    let hub = Hub::new().unwrap();
    let queue: JoinableQueue<u8> = JoinableQueue::new();
    hub.block_on(async {
        for i in 0..5 {
            queue.put_nowait(i).unwrap();
        }
        for _ in 0..4 {
            queue.get_nowait().unwrap();
            queue.task_done().unwrap();
        }
        assert_eq!(queue.unfinished_tasks(), 1);
        assert!(!queue.join(Some(Duration::from_millis(10))).await);

        queue.get_nowait().unwrap();
        queue.task_done().unwrap();
        assert!(queue.join(Some(Duration::from_millis(10))).await);
    });
}

#[test]
fn test_async_result_value_seen_by_every_getter() {
    let hub = Hub::new().unwrap();
    let result: AsyncResult<String> = AsyncResult::new();
    let seen = hub.block_on(async {
        let getters: Vec<_> = (0..6)
            .map(|_| {
                let result = result.clone();
                spawn(async move { Ok::<_, anyhow::Error>(result.get(None).await?) })
            })
            .collect();
        sleep(Duration::ZERO).await;
        assert!(getters.iter().all(|g| !g.ready()));

        result.set("resolved".to_string()).unwrap();
        let mut seen = Vec::new();
        for getter in &getters {
            seen.push(getter.get(LONG).await.unwrap());
        }
        seen
    });
    assert_eq!(seen.len(), 6);
    assert!(seen.iter().all(|value| value == "resolved"));
}

#[test]
fn test_unit_spawned_outside_hub_waits_for_default_hub() {
    let unit = spawn(async { Ok::<_, anyhow::Error>("deferred") });

    let other = Hub::new().unwrap();
    assert!(!other.block_on(unit.join(Some(Duration::from_millis(10)))));
    assert_eq!(unit.state(), TaskState::Created);

    assert_eq!(run(unit.get(LONG)).unwrap().unwrap(), "deferred");
}
