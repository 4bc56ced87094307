//! # TSDB2 Common — 시계열 데이터베이스 공통 인프라
//!
//! 시계열 데이터베이스의 여러 계층이 공유하는 기반 컴포넌트입니다.
//! 핵심은 주입 가능한 시계(Clock) 위에서 동작하는 스레드 풀 기반 작업 스케줄러입니다.
//!
//! ## 주요 특징
//!
//! - **Task Scheduler**: 고정 워커 풀, due time 최소 힙, O(log n) 스케줄/취소
//! - **주기 작업**: 놓친 주기는 몰아서 실행하지 않고 건너뜀 (catch-up)
//! - **경쟁 조건에 안전한 취소**: blocking / non-blocking 두 가지
//! - **Mockable Clock**: `MockClock`으로 벽시계 없이 결정적인 테스트
//!
//! ## 빠른 시작
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use tsdb_common::clock::MockClock;
//! use tsdb_common::scheduler::{Scheduler, SchedulerOptions};
//!
//! # fn main() -> tsdb_common::CommonResult<()> {
//! let clock = Arc::new(MockClock::new());
//! let scheduler = Scheduler::new(
//!     SchedulerOptions::new()
//!         .with_num_workers(2)
//!         .with_clock(clock.clone())
//!         .with_start_now(true),
//! )?;
//!
//! // 10초마다 실행되는 주기 작업
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&ticks);
//! let handle = scheduler.schedule_recurring_in(
//!     move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     },
//!     Duration::from_secs(10),
//!     Duration::from_secs(10),
//! );
//!
//! clock.advance_time(Duration::from_secs(10));
//! scheduler.wait_until_all_workers_asleep()?;
//! assert_eq!(ticks.load(Ordering::SeqCst), 1);
//!
//! assert!(scheduler.cancel(handle));
//! scheduler.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`scheduler`] — 작업 스케줄러 ([`Scheduler`])
//! - [`periodic`] — 전용 스레드 주기 실행기 ([`PeriodicThread`])
//! - [`clock`] — `Clock` 트레이트, `RealClock`, `MockClock`
//! - [`sync`] — Mutex + Condvar 모니터
//! - [`sequence`] — 원자적 시퀀스 번호 생성기
//! - [`error`] — 에러 타입

pub mod clock;
pub mod error;
pub mod periodic;
pub mod scheduler;
pub mod sequence;
pub mod sync;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use clock::{Clock, MockClock, RealClock, Timestamp};
pub use error::{CommonError, CommonResult};
pub use periodic::{PeriodicOptions, PeriodicThread};
pub use scheduler::{Handle, Scheduler, SchedulerConfig, SchedulerOptions, State};
