use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use metrics::gauge;
use tokio_util::sync::CancellationToken;

use signpost_core::config::Settings;
use signpost_core::pipeline::RecordParser;
use signpost_core::record::Record;
use signpost_daemon::cli::DaemonCli;
use signpost_daemon::{logging, statsd, status};
use signpost_router::dispatch::Dispatcher;
use signpost_router::listener::Listener;
use signpost_router::parser::SyslogParser;
use signpost_router::rule::RuleSet;
use signpost_router::rule::loader::RuleLoader;
use signpost_router::sink::KafkaSink;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (환경변수 오버라이드 포함) + CLI 오버라이드
    let mut settings = Settings::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config '{}': {}", cli.config.display(), e))?;
    if let Some(level) = &cli.log_level {
        settings.global.log.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        settings.global.log.format = format.clone();
    }
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    logging::init_tracing(&settings.global.log)?;
    tracing::info!(config = %cli.config.display(), "signpost-daemon starting");

    // 규칙 컴파일 -- 유효하지 않은 표현식은 여기서 기동을 거부한다
    let ruleset = Arc::new(
        RuleLoader::from_settings(&settings)
            .map_err(|e| anyhow::anyhow!("failed to compile rules: {}", e))?,
    );
    tracing::info!(rules = ruleset.rule_count(), "rule set ready");

    if cli.validate {
        println!(
            "configuration OK: {} rules, default topic '{}'",
            ruleset.rule_count(),
            ruleset.default_topic()
        );
        return Ok(());
    }

    if let Some(test_file) = &cli.test {
        return test_rules(test_file, &ruleset).await;
    }

    // 메트릭 레코더 설치 (statsd 주소가 설정된 경우에만)
    if let Some(statsd_addr) = &settings.global.metrics.statsd {
        statsd::install_metrics_recorder(statsd_addr)?;
        gauge!(
            signpost_core::metrics::DAEMON_BUILD_INFO,
            "version" => env!("CARGO_PKG_VERSION")
        )
        .set(1.0);
    }

    let cancel = CancellationToken::new();

    // Kafka 싱크 + 디스패처
    let sink = KafkaSink::from_conf(
        &settings.global.kafka.conf,
        settings.global.kafka.timeout_ms,
    )
    .map_err(|e| anyhow::anyhow!("failed to create kafka producer: {}", e))?;
    let (dispatcher, queue) = Dispatcher::new(settings.global.kafka.buffer, cancel.clone());
    let drain = queue.spawn_drain(sink);
    tracing::info!(
        buffer = settings.global.kafka.buffer,
        default_topic = %settings.global.kafka.topic,
        "dispatcher ready"
    );

    // 리스너
    let listener = Listener::new(
        settings.global.listen.clone(),
        Arc::clone(&ruleset),
        dispatcher.clone(),
        cancel.clone(),
    );
    let listener_stats = listener.stats();
    let bound = listener
        .bind()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start listener: {}", e))?;
    let listen_addr = bound.local_addr()?;
    let listener_task = tokio::spawn(bound.run());

    // 상태 엔드포인트
    let state = status::AppState::new(
        Arc::clone(&ruleset),
        listener_stats,
        dispatcher.clone(),
        cancel.clone(),
    );
    let status_task = tokio::spawn(status::serve(
        settings.global.status.clone(),
        state,
        cancel.clone(),
    ));

    // 가동 시간 게이지 갱신 태스크
    let uptime_task = tokio::spawn(uptime_loop(cancel.clone()));

    tracing::info!(listen_addr = %listen_addr, "signpost-daemon running");

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // 우아한 종료: 수락 중단 -> 워커 정리 -> 큐 드레인
    cancel.cancel();

    match listener_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "listener exited with error"),
        Err(e) => tracing::error!(error = %e, "listener task panicked"),
    }

    if let Err(e) = status_task.await.unwrap_or_else(|e| Err(e.into())) {
        tracing::error!(error = %e, "status endpoint exited with error");
    }
    let _ = uptime_task.await;

    // 마지막 제출 핸들을 놓아야 드레인 태스크가 큐를 비우고 종료한다
    drop(dispatcher);
    if let Err(e) = drain.await {
        tracing::error!(error = %e, "drain task panicked");
    }

    tracing::info!("signpost-daemon shut down");
    Ok(())
}

/// 가동 시간 게이지를 주기적으로 갱신합니다.
async fn uptime_loop(cancel: CancellationToken) {
    let started = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                gauge!(signpost_core::metrics::DAEMON_UPTIME_SECONDS)
                    .set(started.elapsed().as_secs() as f64);
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// 로그 파일의 각 라인을 규칙에 대해 드라이런 평가합니다.
///
/// 매칭된 규칙 인덱스(설정 순서 기준)를 stdout으로 출력합니다.
/// 액션은 적용하지 않습니다.
async fn test_rules(path: &Path, ruleset: &RuleSet) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read test file '{}': {}", path.display(), e))?;

    let parser = SyslogParser::new();
    let mut matched_lines: u64 = 0;

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let mut record = match RecordParser::parse(&parser, line.as_bytes()) {
            Ok(record) => record,
            Err(_) => Record::from_line(line),
        };

        let matches = ruleset.matching_rules(&mut record);
        if matches.is_empty() {
            println!("line {}: no match", number + 1);
        } else {
            matched_lines += 1;
            println!("line {} matches rules: {:?}", number + 1, matches);
        }
    }

    println!("{matched_lines} line(s) matched at least one rule");
    Ok(())
}
