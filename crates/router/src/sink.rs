//! 싱크 — 외부 전달 계층 추상화와 Kafka 구현
//!
//! [`Sink`]는 디스패처 드레인 태스크가 envelope을 내보내는 단일
//! 논리 세션입니다. 커넥션 수준의 일시 장애 복구(재시도/백오프)는
//! 드레인 태스크가 담당하므로 구현체는 한 번의 전달 시도만 표현하면
//! 됩니다.

use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use signpost_core::record::DispatchEnvelope;

use crate::error::SinkError;

/// 외부 전달 싱크 trait
///
/// 테스트에서는 mock 구현으로 대체합니다.
pub trait Sink: Send + Sync + 'static {
    /// 싱크 이름 (로깅용)
    fn name(&self) -> &str;

    /// envelope 한 건의 전달을 시도합니다.
    fn deliver(
        &self,
        envelope: &DispatchEnvelope,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Kafka 싱크
///
/// `global.kafka.conf`의 클라이언트 설정을 rdkafka에 그대로 전달하여
/// [`FutureProducer`]를 만듭니다. 브로커 재연결은 클라이언트가 내부에서
/// 수행하므로 호출자에게 커넥션 수준 에러가 노출되지 않습니다.
pub struct KafkaSink {
    /// rdkafka 비동기 프로듀서
    producer: FutureProducer,
    /// 전송당 딜리버리 타임아웃
    timeout: Duration,
}

impl KafkaSink {
    /// 클라이언트 설정 passthrough로 Kafka 싱크를 생성합니다.
    pub fn from_conf(
        conf: &BTreeMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, SinkError> {
        let mut client_config = ClientConfig::new();
        for (key, value) in conf {
            client_config.set(key.as_str(), value.as_str());
        }

        let producer: FutureProducer =
            client_config.create().map_err(|e| SinkError::Config {
                reason: e.to_string(),
            })?;

        Ok(Self {
            producer,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

impl Sink for KafkaSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn deliver(&self, envelope: &DispatchEnvelope) -> Result<(), SinkError> {
        let record: FutureRecord<'_, (), [u8]> =
            FutureRecord::to(&envelope.topic).payload(envelope.payload.as_ref());

        match self.producer.send(record, self.timeout).await {
            Ok((partition, offset)) => {
                tracing::trace!(
                    topic = %envelope.topic,
                    partition,
                    offset,
                    "envelope delivered"
                );
                Ok(())
            }
            Err((err, _message)) => Err(SinkError::Delivery {
                topic: envelope.topic.clone(),
                reason: err.to_string(),
            }),
        }
    }
}
