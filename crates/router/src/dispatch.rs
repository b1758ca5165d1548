//! 디스패처 — 싱크 앞의 바운디드 백프레셔 큐
//!
//! 파이프라인 출력(envelope)을 외부 싱크로 넘기는 유일한 공유 가변
//! 자원입니다. 수락(admission)부터 전달 완료까지 최대 `capacity`개의
//! envelope만 존재하도록 세마포어 퍼밋을 envelope과 함께 큐로 운반하고,
//! 전달이 끝난 뒤에야 퍼밋을 반환합니다.
//!
//! # 수락 정책
//! - 버퍼가 가득 차면 `submit`은 자리가 날 때까지 **블록**합니다.
//!   느린 다운스트림이 업스트림 수신을 조절하는 의도된 백프레셔입니다.
//!   드롭도, 무제한 버퍼링도 없습니다.
//! - 종료 신호 이후의 제출은 조용히 버려지지 않고 즉시
//!   [`DispatchError::ShutdownInProgress`]로 실패합니다.
//! - 이미 큐에 들어간 envelope은 드레인 태스크가 싱크로 모두 내보낸 뒤
//!   종료합니다.
//!
//! 싱크의 일시 장애는 드레인 태스크가 상한이 있는 지수 백오프로
//! 재시도하며 복구합니다. 제출자에게는 노출되지 않습니다 (버퍼가 차서
//! 블록되는 것으로만 관측됩니다).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use signpost_core::metrics as metric_names;
use signpost_core::pipeline::HealthStatus;
use signpost_core::record::DispatchEnvelope;

use crate::error::DispatchError;
use crate::sink::Sink;

/// 재시도 초기 백오프
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// 재시도 백오프 상한
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 종료 드레인 중 envelope당 최대 전달 시도 횟수
///
/// 평상시에는 무한 재시도가 백프레셔로 이어지지만, 드레인 중에는
/// 죽은 브로커 때문에 종료가 영원히 막히지 않도록 상한을 둡니다.
/// 포기한 envelope은 로그와 카운터로 가시화됩니다.
const SHUTDOWN_DRAIN_MAX_ATTEMPTS: u32 = 3;

/// 큐를 통과하는 내부 단위 — envelope과 그 버퍼 슬롯 퍼밋
struct QueuedEnvelope {
    envelope: DispatchEnvelope,
    /// 전달 완료 시 drop되어 슬롯을 반환
    _permit: OwnedSemaphorePermit,
}

/// 디스패처 누적 통계
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    /// 현재 통계의 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// 상태 엔드포인트로 노출되는 통계 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    /// 수락된 제출 수
    pub submitted: u64,
    /// 종료 이후 거부된 제출 수
    pub rejected: u64,
    /// 전달 완료 수
    pub delivered: u64,
    /// 재시도 수
    pub retries: u64,
    /// 포기(유실 처리) 수
    pub failed: u64,
}

/// 디스패처 — 제출 핸들
///
/// 커넥션 워커마다 clone하여 사용합니다. 모든 clone이 drop되고 큐가
/// 비면 드레인 태스크가 종료합니다.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<QueuedEnvelope>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    capacity: usize,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// 새 디스패처와 드레인 큐를 생성합니다.
    ///
    /// `capacity`는 설정의 `global.kafka.buffer`이며 하드 캡입니다.
    pub fn new(capacity: usize, cancel: CancellationToken) -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slots = Arc::new(Semaphore::new(capacity));
        let stats = Arc::new(DispatchStats::default());

        let dispatcher = Self {
            tx,
            slots: Arc::clone(&slots),
            cancel: cancel.clone(),
            capacity,
            stats: Arc::clone(&stats),
        };
        let queue = DispatchQueue {
            rx,
            slots,
            capacity,
            cancel,
            stats,
        };
        (dispatcher, queue)
    }

    /// envelope을 제출합니다.
    ///
    /// 버퍼가 가득 차면 자리가 날 때까지 블록합니다. 종료 신호 이후에는
    /// (블록 중이던 호출 포함) 즉시 실패합니다.
    pub async fn submit(&self, envelope: DispatchEnvelope) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(self.reject());
        }

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.reject()),
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| DispatchError::Closed)?
            }
        };

        self.tx
            .send(QueuedEnvelope {
                envelope,
                _permit: permit,
            })
            .map_err(|_| DispatchError::Closed)?;

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        counter!(metric_names::DISPATCH_SUBMITTED_TOTAL).increment(1);
        gauge!(metric_names::DISPATCH_QUEUE_DEPTH).set(self.queue_depth() as f64);
        Ok(())
    }

    fn reject(&self) -> DispatchError {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        counter!(metric_names::DISPATCH_REJECTED_TOTAL).increment(1);
        DispatchError::ShutdownInProgress
    }

    /// 수락되었지만 아직 전달이 끝나지 않은 envelope 수를 반환합니다.
    pub fn queue_depth(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// 버퍼 용량을 반환합니다.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 누적 통계를 반환합니다.
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// 디스패처 헬스 상태를 반환합니다.
    pub fn health_check(&self) -> HealthStatus {
        if self.cancel.is_cancelled() {
            return HealthStatus::Unhealthy("shutdown in progress".to_owned());
        }
        let depth = self.queue_depth();
        if depth * 10 >= self.capacity * 9 {
            HealthStatus::Degraded(format!(
                "dispatch buffer nearly full: {depth}/{}",
                self.capacity
            ))
        } else {
            HealthStatus::Healthy
        }
    }
}

/// 드레인 큐 — 싱크를 소유하는 소비자 측
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<QueuedEnvelope>,
    slots: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
    stats: Arc<DispatchStats>,
}

impl DispatchQueue {
    /// 드레인 태스크를 스폰합니다.
    ///
    /// 모든 [`Dispatcher`] clone이 drop되고 큐가 비면 태스크가
    /// 종료합니다. 큐에 남은 envelope은 종료 전에 모두 전달을
    /// 시도합니다.
    pub fn spawn_drain<S: Sink>(self, sink: S) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(sink))
    }

    async fn run<S: Sink>(mut self, sink: S) {
        tracing::info!(
            sink = sink.name(),
            capacity = self.capacity,
            "dispatch drain task started"
        );

        while let Some(queued) = self.rx.recv().await {
            self.deliver_with_retry(&sink, &queued.envelope).await;
            drop(queued); // 슬롯 반환
            gauge!(metric_names::DISPATCH_QUEUE_DEPTH)
                .set((self.capacity - self.slots.available_permits()) as f64);
        }

        tracing::info!("dispatch queue drained, drain task exiting");
    }

    /// 한 건의 envelope을 전달합니다. 실패 시 상한이 있는 지수 백오프로
    /// 재시도합니다.
    async fn deliver_with_retry<S: Sink>(&self, sink: &S, envelope: &DispatchEnvelope) {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts: u32 = 0;

        loop {
            match sink.deliver(envelope).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    counter!(
                        metric_names::DISPATCH_DELIVERED_TOTAL,
                        metric_names::LABEL_TOPIC => envelope.topic.clone()
                    )
                    .increment(1);
                    return;
                }
                Err(e) => {
                    attempts += 1;

                    if self.cancel.is_cancelled() && attempts >= SHUTDOWN_DRAIN_MAX_ATTEMPTS {
                        tracing::error!(
                            %envelope,
                            error = %e,
                            attempts,
                            "abandoning envelope during shutdown drain"
                        );
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        counter!(metric_names::DISPATCH_FAILED_TOTAL).increment(1);
                        return;
                    }

                    tracing::warn!(
                        %envelope,
                        error = %e,
                        attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "sink delivery failed, backing off"
                    );
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    counter!(metric_names::DISPATCH_RETRIES_TOTAL).increment(1);

                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// 게이트 세마포어로 일시정지를 흉내내는 테스트 싱크.
    /// `fail_first`가 0이 될 때까지 전달을 실패시킵니다.
    struct TestSink {
        gate: Arc<Semaphore>,
        delivered: Arc<AtomicUsize>,
        fail_first: Arc<AtomicUsize>,
    }

    impl TestSink {
        fn paused() -> (Self, Arc<Semaphore>, Arc<AtomicUsize>) {
            let gate = Arc::new(Semaphore::new(0));
            let delivered = Arc::new(AtomicUsize::new(0));
            let sink = Self {
                gate: Arc::clone(&gate),
                delivered: Arc::clone(&delivered),
                fail_first: Arc::new(AtomicUsize::new(0)),
            };
            (sink, gate, delivered)
        }

        fn open() -> (Self, Arc<AtomicUsize>) {
            let (sink, gate, delivered) = Self::paused();
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
            (sink, delivered)
        }

        fn failing(times: usize) -> (Self, Arc<AtomicUsize>) {
            let (sink, gate, delivered) = Self::paused();
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
            sink.fail_first.store(times, Ordering::Relaxed);
            (sink, delivered)
        }
    }

    impl Sink for TestSink {
        fn name(&self) -> &str {
            "test"
        }

        async fn deliver(&self, envelope: &DispatchEnvelope) -> Result<(), SinkError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| SinkError::Delivery {
                    topic: envelope.topic.clone(),
                    reason: "gate closed".to_owned(),
                })?;
            permit.forget();

            let remaining = self.fail_first.load(Ordering::Relaxed);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::Relaxed);
                return Err(SinkError::Delivery {
                    topic: envelope.topic.clone(),
                    reason: "transient failure".to_owned(),
                });
            }

            self.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn envelope(n: usize) -> DispatchEnvelope {
        DispatchEnvelope {
            topic: "logs-test".to_owned(),
            payload: Bytes::from(format!("payload-{n}")),
        }
    }

    async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(deadline, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met before deadline");
    }

    #[tokio::test]
    async fn submits_are_delivered() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(8, cancel);
        let (sink, delivered) = TestSink::open();
        let drain = queue.spawn_drain(sink);

        for n in 0..3 {
            dispatcher.submit(envelope(n)).await.unwrap();
        }

        wait_until(Duration::from_secs(5), || {
            delivered.load(Ordering::Relaxed) == 3
        })
        .await;

        assert_eq!(dispatcher.stats().snapshot().submitted, 3);
        assert_eq!(dispatcher.stats().snapshot().delivered, 3);

        drop(dispatcher);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn buffer_cap_blocks_third_submission_until_sink_resumes() {
        // buffer = 2, 싱크 일시정지 상태에서 동시 제출 3건:
        // 처음 두 건은 즉시 수락, 세 번째는 슬롯이 빌 때까지 블록
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(2, cancel);
        let (sink, gate, delivered) = TestSink::paused();
        let _drain = queue.spawn_drain(sink);

        tokio::time::timeout(Duration::from_secs(1), dispatcher.submit(envelope(0)))
            .await
            .expect("first submit must not block")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), dispatcher.submit(envelope(1)))
            .await
            .expect("second submit must not block")
            .unwrap();

        assert_eq!(dispatcher.queue_depth(), 2);

        let blocked = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.submit(envelope(2)).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "third submit must block while full");
        // 버퍼는 절대 용량을 초과하지 않음
        assert_eq!(dispatcher.queue_depth(), 2);

        // 싱크 재개: 한 건 전달되면 슬롯이 비어 세 번째 제출이 진행됨
        gate.add_permits(1);
        blocked.await.unwrap().unwrap();
        assert_eq!(dispatcher.queue_depth(), 2);

        gate.add_permits(8);
        wait_until(Duration::from_secs(5), || {
            delivered.load(Ordering::Relaxed) == 3
        })
        .await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_immediately() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(4, cancel.clone());
        let (sink, _delivered) = TestSink::open();
        let _drain = queue.spawn_drain(sink);

        cancel.cancel();

        let err = dispatcher.submit(envelope(0)).await.unwrap_err();
        assert_eq!(err, DispatchError::ShutdownInProgress);
        assert_eq!(dispatcher.stats().snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn blocked_submit_fails_on_shutdown_instead_of_hanging() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(1, cancel.clone());
        let (sink, _gate, _delivered) = TestSink::paused();
        let _drain = queue.spawn_drain(sink);

        dispatcher.submit(envelope(0)).await.unwrap();

        let blocked = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.submit(envelope(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("blocked submit must resolve on shutdown")
            .unwrap();
        assert_eq!(result.unwrap_err(), DispatchError::ShutdownInProgress);
    }

    #[tokio::test]
    async fn queued_envelopes_are_drained_after_shutdown() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(4, cancel.clone());
        let (sink, gate, delivered) = TestSink::paused();
        let drain = queue.spawn_drain(sink);

        dispatcher.submit(envelope(0)).await.unwrap();
        dispatcher.submit(envelope(1)).await.unwrap();

        cancel.cancel();
        drop(dispatcher);

        // 종료 후에도 큐에 들어간 것은 모두 전달됨
        gate.add_permits(8);
        drain.await.unwrap();
        assert_eq!(delivered.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn transient_sink_failure_is_retried() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(4, cancel);
        let (sink, delivered) = TestSink::failing(2);
        let drain = queue.spawn_drain(sink);

        dispatcher.submit(envelope(0)).await.unwrap();

        wait_until(Duration::from_secs(5), || {
            delivered.load(Ordering::Relaxed) == 1
        })
        .await;

        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 0);

        drop(dispatcher);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn health_reflects_queue_pressure() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(1, cancel.clone());
        let (sink, _gate, _delivered) = TestSink::paused();
        let _drain = queue.spawn_drain(sink);

        assert!(dispatcher.health_check().is_healthy());

        dispatcher.submit(envelope(0)).await.unwrap();
        assert!(matches!(
            dispatcher.health_check(),
            HealthStatus::Degraded(_)
        ));

        cancel.cancel();
        assert!(dispatcher.health_check().is_unhealthy());
    }

    #[tokio::test]
    async fn queue_depth_tracks_permits() {
        let cancel = CancellationToken::new();
        let (dispatcher, queue) = Dispatcher::new(4, cancel);
        let (sink, gate, delivered) = TestSink::paused();
        let _drain = queue.spawn_drain(sink);

        assert_eq!(dispatcher.queue_depth(), 0);
        dispatcher.submit(envelope(0)).await.unwrap();
        assert_eq!(dispatcher.queue_depth(), 1);

        gate.add_permits(1);
        wait_until(Duration::from_secs(5), || {
            delivered.load(Ordering::Relaxed) == 1
        })
        .await;
        wait_until(Duration::from_secs(5), || dispatcher.queue_depth() == 0).await;
    }
}
