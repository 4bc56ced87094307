//! Integration Tests
//!
//! 스케줄러, MockClock, 워커 풀 통합 테스트

#[cfg(test)]
mod integration_tests {
    use crate::clock::MockClock;
    use crate::logging;
    use crate::scheduler::{Handle, Scheduler, SchedulerOptions, State};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Weak};
    use std::thread;
    use std::time::{Duration, UNIX_EPOCH};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn scheduler_with(clock: &Arc<MockClock>, num_workers: u16) -> Scheduler {
        logging::init_test();
        Scheduler::new(
            SchedulerOptions::new()
                .with_num_workers(num_workers)
                .with_clock(clock.clone())
                .with_start_now(true),
        )
        .unwrap()
    }

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl FnMut() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 테스트 1: due time 순서대로 실행 (56초, 34초)
    #[test]
    fn test_runs_in_due_time_order() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        scheduler.schedule_at(move || o.lock().push("late"), UNIX_EPOCH + secs(56));
        let o = Arc::clone(&order);
        scheduler.schedule_at(move || o.lock().push("early"), UNIX_EPOCH + secs(34));

        scheduler.wait_until_all_workers_asleep().unwrap();
        assert!(order.lock().is_empty());

        clock.set_time(UNIX_EPOCH + secs(50));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(*order.lock(), vec!["early"]);

        clock.set_time(UNIX_EPOCH + secs(56));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(*order.lock(), vec!["early", "late"]);
        assert_eq!(scheduler.num_pending(), 0);
    }

    /// 테스트 2: 실행 전 취소는 true, 두 번째 취소는 false (56초 작업을 34초에 취소)
    #[test]
    fn test_cancel_pending_task() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule_at(counter_callback(&counter), UNIX_EPOCH + secs(56));
        clock.set_time(UNIX_EPOCH + secs(34));
        scheduler.wait_until_all_workers_asleep().unwrap();

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        clock.set_time(UNIX_EPOCH + secs(100));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.num_pending(), 0);
    }

    /// 테스트 3: 실행 중인 작업의 non-blocking 취소는 false, 콜백은 끝까지 실행
    #[test]
    fn test_cancel_running_task() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&finished);
        let handle = scheduler.schedule_in(
            move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                f.store(true, Ordering::SeqCst);
            },
            secs(34),
        );

        clock.advance_time(secs(34));
        started_rx.recv().unwrap();

        assert!(!scheduler.cancel(handle));
        assert!(!finished.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(scheduler.num_pending(), 0);
    }

    /// 테스트 4: blocking 취소는 실행 중인 콜백이 끝날 때까지 대기
    #[test]
    fn test_blocking_cancel_waits_for_running_task() {
        let clock = Arc::new(MockClock::new());
        let scheduler = Arc::new(scheduler_with(&clock, 2));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&finished);
        let handle = scheduler.schedule_now(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            f.store(true, Ordering::SeqCst);
        });
        started_rx.recv().unwrap();

        let canceller = {
            let scheduler = Arc::clone(&scheduler);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let cancelled = scheduler.blocking_cancel(handle);
                // 반환 시점에는 콜백이 이미 끝나 있어야 함
                (cancelled, finished.load(Ordering::SeqCst))
            })
        };

        release_tx.send(()).unwrap();
        let (cancelled, finished_at_return) = canceller.join().unwrap();
        assert!(!cancelled);
        assert!(finished_at_return);
        assert_eq!(scheduler.num_pending(), 0);
    }

    /// 테스트 5: 주기 작업의 catch-up (T + 10P 로 점프하면 한 번만 실행)
    #[test]
    fn test_periodic_catch_up() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let start = UNIX_EPOCH + secs(100);
        let period = secs(10);

        scheduler.schedule_recurring_at(counter_callback(&counter), start, period);

        clock.set_time(start);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // 10 주기를 한 번에 건너뜀
        clock.set_time(start + period * 11);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        clock.set_time(start + period * 12 - secs(1));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        clock.set_time(start + period * 12);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    /// 테스트 6: 첫 실행 시각이 T 인 작업이 T + 10P 에서 처음 실행되면 다음은 T + 11P
    #[test]
    fn test_periodic_first_run_late() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 1);
        let counter = Arc::new(AtomicUsize::new(0));
        let start = UNIX_EPOCH + secs(100);
        let period = secs(10);

        scheduler.schedule_recurring_at(counter_callback(&counter), start, period);
        clock.set_time(start + period * 10);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        clock.set_time(start + period * 11 - Duration::from_millis(1));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        clock.set_time(start + period * 11);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    /// 테스트 7: 실행 중 취소된 주기 작업은 재스케줄되지 않음
    #[test]
    fn test_cancelled_periodic_task_is_not_rescheduled() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&runs);
        let handle = scheduler.schedule_recurring(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            },
            secs(5),
        );
        started_rx.recv().unwrap();
        assert!(!scheduler.cancel(handle));
        release_tx.send(()).unwrap();

        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(scheduler.num_pending(), 0);

        clock.advance_time(secs(60));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    /// 테스트 8: 대기 중 더 이른 작업이 들어오면 먼저 실행
    #[test]
    fn test_earlier_task_preempts_wait() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        scheduler.schedule_at(move || o.lock().push(100), UNIX_EPOCH + secs(100));
        scheduler.wait_until_all_workers_asleep().unwrap();

        let o = Arc::clone(&order);
        scheduler.schedule_at(move || o.lock().push(10), UNIX_EPOCH + secs(10));
        scheduler.wait_until_all_workers_asleep().unwrap();

        clock.set_time(UNIX_EPOCH + secs(10));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(*order.lock(), vec![10]);

        clock.set_time(UNIX_EPOCH + secs(100));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(*order.lock(), vec![10, 100]);
    }

    /// 테스트 9: 콜백 안에서 스케줄러를 다시 호출해도 데드락 없음
    #[test]
    fn test_callback_can_reschedule() {
        let clock = Arc::new(MockClock::new());
        let scheduler = Arc::new(scheduler_with(&clock, 2));
        let counter = Arc::new(AtomicUsize::new(0));

        let weak: Weak<Scheduler> = Arc::downgrade(&scheduler);
        let c = Arc::clone(&counter);
        scheduler.schedule_now(move || {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(scheduler) = weak.upgrade() {
                let c = Arc::clone(&c);
                scheduler.schedule_now(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        scheduler.stop();
    }

    /// 테스트 10: 여러 워커가 많은 작업을 모두 처리
    #[test]
    fn test_many_tasks_many_workers() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 4);
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..200u64 {
            scheduler.schedule_in(counter_callback(&counter), Duration::from_millis(i % 7));
        }
        clock.advance_time(secs(1));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 200);
        assert_eq!(scheduler.num_pending(), 0);
    }

    /// 테스트 11: 동시에 start / stop 을 호출해도 한 번만 전이
    #[test]
    fn test_concurrent_start_stop() {
        let clock = Arc::new(MockClock::new());
        let scheduler = Arc::new(
            Scheduler::new(SchedulerOptions::new().with_clock(clock.clone())).unwrap(),
        );

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        scheduler.start().unwrap();
                    } else {
                        scheduler.stop();
                        assert_eq!(scheduler.state(), State::Stopped);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        scheduler.stop();
        assert_eq!(scheduler.state(), State::Stopped);
    }

    /// 테스트 12: stop 은 대기 중인 작업을 폐기하고 캡처된 자원을 해제
    #[test]
    fn test_stop_discards_pending_tasks() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let resource = Arc::new(());

        let captured = Arc::clone(&resource);
        let handle: Handle = scheduler.schedule_in(
            move || {
                assert!(Arc::strong_count(&captured) >= 1);
            },
            secs(3600),
        );
        assert_eq!(Arc::strong_count(&resource), 2);

        scheduler.stop();
        assert_eq!(scheduler.state(), State::Stopped);
        assert_eq!(scheduler.num_pending(), 0);
        assert_eq!(Arc::strong_count(&resource), 1);
        assert!(!scheduler.cancel(handle));
    }

    /// 테스트 13: 콜백 패닉은 해당 워커만 교체하고 다른 작업은 계속 실행
    #[test]
    fn test_panicking_callback_does_not_poison_scheduler() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        let panicking = scheduler.schedule_now(|| panic!("callback failure"));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert!(!scheduler.cancel(panicking));
        assert_eq!(scheduler.num_pending(), 0);

        scheduler.schedule_in(counter_callback(&counter), secs(1));
        clock.advance_time(secs(1));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.num_live_workers(), 2);

        scheduler.stop();
        assert_eq!(scheduler.state(), State::Stopped);
        assert_eq!(scheduler.num_live_workers(), 0);
    }

    /// 테스트 14: Drop 은 stop 과 동일
    #[test]
    fn test_drop_stops_workers() {
        let clock = Arc::new(MockClock::new());
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = scheduler_with(&clock, 3);
            scheduler.schedule_in(counter_callback(&counter), secs(10));
        }
        assert_eq!(Arc::strong_count(&counter), 1);
        assert_eq!(clock.num_listeners(), 0);
    }

    /// 테스트 15: 워커가 하나뿐일 때 패닉이 반복돼도 풀은 유지됨
    #[test]
    fn test_single_worker_survives_panics() {
        let clock = Arc::new(MockClock::new());
        let scheduler = scheduler_with(&clock, 1);
        let ran = Arc::new(AtomicBool::new(false));

        for _ in 0..3 {
            scheduler.schedule_now(|| panic!("callback failure"));
            scheduler.wait_until_all_workers_asleep().unwrap();
            assert_eq!(scheduler.num_live_workers(), 1);
        }

        let r = Arc::clone(&ran);
        scheduler.schedule_now(move || r.store(true, Ordering::SeqCst));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(scheduler.state(), State::Started);
        assert_eq!(scheduler.num_pending(), 0);

        scheduler.stop();
        assert_eq!(scheduler.num_live_workers(), 0);
    }

    /// 테스트 16: 동시에 start 를 호출해도 워커 풀은 하나만 생성
    #[test]
    fn test_concurrent_start_spawns_one_pool() {
        let clock = Arc::new(MockClock::new());
        let scheduler = Arc::new(
            Scheduler::new(
                SchedulerOptions::new()
                    .with_num_workers(3)
                    .with_clock(clock.clone()),
            )
            .unwrap(),
        );

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || scheduler.start().unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(scheduler.state(), State::Started);
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(scheduler.num_live_workers(), 3);

        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule_now(counter_callback(&counter));
        scheduler.wait_until_all_workers_asleep().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// 서로 다른 due time 의 작업은 due time 순서로 실행
        #[test]
        fn prop_distinct_due_times_run_in_order(
            due_secs in prop::collection::hash_set(1u64..10_000, 1..40),
            step in 500u64..3_000,
        ) {
            let clock = Arc::new(MockClock::new());
            let scheduler = scheduler_with(&clock, 1);
            let order = Arc::new(Mutex::new(Vec::new()));

            // HashSet 순회 순서로 스케줄 (정렬되지 않은 순서)
            for &due in &due_secs {
                let o = Arc::clone(&order);
                scheduler.schedule_at(move || o.lock().push(due), UNIX_EPOCH + secs(due));
            }

            let mut now = 0;
            while now < 10_000 {
                now += step;
                clock.set_time(UNIX_EPOCH + secs(now));
                scheduler.wait_until_all_workers_asleep().unwrap();
            }

            let mut expected: Vec<u64> = due_secs.iter().copied().collect();
            expected.sort_unstable();
            prop_assert_eq!(&*order.lock(), &expected);
            prop_assert_eq!(scheduler.num_pending(), 0);
        }
    }
}
