//! TCP/TLS 리스너 — 인바운드 레코드 소스
//!
//! newline framing의 RFC 5424 syslog 스트림을 TCP 소켓으로 수신합니다.
//! 각 TCP 연결은 별도의 tokio 태스크(워커)에서 처리되며, 워커는 수신한
//! 라인마다 파싱 -> 규칙 평가 -> 디스패처 제출을 인라인으로 수행합니다.
//! 컴파일된 RuleSet은 모든 워커가 `Arc`로 공유합니다.
//!
//! `global.listen.tls`가 설정되면 rustls로 TLS 종단을 수행하고, 없으면
//! 평문으로 수신합니다. CancellationToken을 통해 graceful shutdown을
//! 지원합니다.

use std::io::BufReader as StdBufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use signpost_core::config::{ListenConfig, TlsConfig};
use signpost_core::metrics as metric_names;
use signpost_core::pipeline::RecordParser;
use signpost_core::record::Record;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, RouterError};
use crate::parser::SyslogParser;
use crate::rule::RuleSet;

/// 리스너 누적 통계
#[derive(Debug, Default)]
pub struct ListenerStats {
    connections_total: AtomicU64,
    active_connections: AtomicU64,
    lines_total: AtomicU64,
    parse_fallbacks: AtomicU64,
    records_lost: AtomicU64,
}

impl ListenerStats {
    /// 현재 통계의 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            lines_total: self.lines_total.load(Ordering::Relaxed),
            parse_fallbacks: self.parse_fallbacks.load(Ordering::Relaxed),
            records_lost: self.records_lost.load(Ordering::Relaxed),
        }
    }
}

/// 상태 엔드포인트로 노출되는 리스너 통계 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerSnapshot {
    /// 수락한 전체 연결 수
    pub connections_total: u64,
    /// 현재 활성 연결 수
    pub active_connections: u64,
    /// 수신한 전체 라인 수
    pub lines_total: u64,
    /// syslog 파싱 실패로 msg-only 강등된 레코드 수
    pub parse_fallbacks: u64,
    /// 종료 이후 제출로 유실된 레코드 수
    pub records_lost: u64,
}

/// TCP/TLS 리스너
pub struct Listener {
    /// 리스너 설정
    config: ListenConfig,
    /// 공유 규칙 세트
    ruleset: Arc<RuleSet>,
    /// 디스패처 제출 핸들
    dispatcher: Dispatcher,
    /// graceful shutdown 토큰
    cancel: CancellationToken,
    /// 누적 통계
    stats: Arc<ListenerStats>,
}

impl Listener {
    /// 새 리스너를 생성합니다.
    pub fn new(
        config: ListenConfig,
        ruleset: Arc<RuleSet>,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            ruleset,
            dispatcher,
            cancel,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// 누적 통계 핸들을 반환합니다.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// 소켓에 바인드하고 실행 준비가 된 리스너를 반환합니다.
    ///
    /// TLS 설정이 있으면 인증서/키를 여기서 로드합니다. 로드 실패는
    /// 기동 거부로 이어집니다.
    pub async fn bind(self) -> Result<BoundListener, RouterError> {
        let tls_acceptor = match &self.config.tls {
            Some(tls) => Some(load_tls_acceptor(tls)?),
            None => None,
        };

        let bind_addr = format!("{}:{}", self.config.address, self.config.port);
        let tcp = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RouterError::Listener {
                reason: format!("failed to bind to {bind_addr}: {e}"),
            })?;

        info!(
            bind_addr = %bind_addr,
            tls = tls_acceptor.is_some(),
            max_connections = self.config.max_connections,
            "listener bound"
        );

        Ok(BoundListener {
            tcp,
            tls_acceptor,
            inner: self,
        })
    }
}

/// 바인드가 끝난 리스너 — 수락 루프 실행 단계
pub struct BoundListener {
    tcp: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    inner: Listener,
}

impl BoundListener {
    /// 실제 바인드된 주소를 반환합니다 (포트 0 바인드 시 사용).
    pub fn local_addr(&self) -> Result<SocketAddr, RouterError> {
        self.tcp.local_addr().map_err(RouterError::Io)
    }

    /// 연결 수락 루프를 실행합니다.
    ///
    /// CancellationToken이 취소되면 새 연결 수락을 멈추고 반환합니다.
    /// 이미 수락된 연결의 워커는 각자 종료 신호를 받고 내려갑니다.
    pub async fn run(self) -> Result<(), RouterError> {
        let connection_semaphore = Arc::new(Semaphore::new(self.inner.config.max_connections));

        loop {
            tokio::select! {
                result = self.tcp.accept() => {
                    let (stream, peer) = result.map_err(|e| RouterError::Listener {
                        reason: format!("accept error: {e}"),
                    })?;

                    let permit = match Arc::clone(&connection_semaphore).try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            warn!(%peer, "max connections reached, rejecting connection");
                            continue;
                        }
                    };

                    self.spawn_worker(stream, peer, permit);
                }
                _ = self.inner.cancel.cancelled() => {
                    info!("listener received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// 연결 하나를 처리하는 워커 태스크를 스폰합니다.
    fn spawn_worker(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let stats = Arc::clone(&self.inner.stats);
        stats.connections_total.fetch_add(1, Ordering::Relaxed);
        let active = stats.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        counter!(metric_names::LISTENER_CONNECTIONS_TOTAL).increment(1);
        gauge!(metric_names::LISTENER_CONNECTIONS_ACTIVE).set(active as f64);

        let conn_id = uuid::Uuid::new_v4();
        debug!(%conn_id, %peer, "accepted connection");

        let ctx = ConnectionContext {
            ruleset: Arc::clone(&self.inner.ruleset),
            dispatcher: self.inner.dispatcher.clone(),
            cancel: self.inner.cancel.clone(),
            stats: Arc::clone(&stats),
            max_line_bytes: self.inner.config.max_line_bytes,
            peer: peer.to_string(),
            conn_id: conn_id.to_string(),
        };
        let tls_acceptor = self.tls_acceptor.clone();

        tokio::spawn(async move {
            let result = match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => handle_connection(tls_stream, ctx).await,
                    Err(e) => {
                        warn!(%peer, error = %e, "TLS handshake failed");
                        Ok(())
                    }
                },
                None => handle_connection(stream, ctx).await,
            };

            if let Err(e) = result {
                error!(%peer, error = %e, "connection handler error");
            }

            let active = stats.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
            gauge!(metric_names::LISTENER_CONNECTIONS_ACTIVE).set(active as f64);
            drop(permit); // 연결 종료 시 세마포어 반환
        });
    }
}

/// 연결 워커가 들고 다니는 컨텍스트
struct ConnectionContext {
    ruleset: Arc<RuleSet>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    stats: Arc<ListenerStats>,
    max_line_bytes: usize,
    peer: String,
    conn_id: String,
}

/// 단일 연결을 처리합니다: 라인 수신 -> 파싱 -> 평가 -> 제출.
async fn handle_connection<S>(stream: S, ctx: ConnectionContext) -> Result<(), RouterError>
where
    S: AsyncRead + Unpin,
{
    let parser = SyslogParser::new().with_max_input_size(ctx.max_line_bytes);
    let mut reader = BufReader::new(stream);
    let mut line_buffer = String::new();

    loop {
        line_buffer.clear();

        tokio::select! {
            result = reader.read_line(&mut line_buffer) => {
                match result {
                    Ok(0) => {
                        // EOF - 연결 종료
                        debug!(conn_id = %ctx.conn_id, peer = %ctx.peer, "connection closed by peer");
                        break;
                    }
                    Ok(_) => {
                        if line_buffer.len() > ctx.max_line_bytes {
                            warn!(
                                peer = %ctx.peer,
                                bytes = line_buffer.len(),
                                max = ctx.max_line_bytes,
                                "line exceeds max size, closing connection"
                            );
                            break;
                        }

                        let line = line_buffer.trim_end();
                        if line.trim().is_empty() {
                            continue;
                        }

                        ctx.stats.lines_total.fetch_add(1, Ordering::Relaxed);
                        counter!(metric_names::LISTENER_LINES_TOTAL).increment(1);

                        if !process_line(&parser, line, &ctx).await? {
                            break;
                        }
                    }
                    Err(e) => {
                        return Err(RouterError::Listener {
                            reason: format!("read error from {}: {e}", ctx.peer),
                        });
                    }
                }
            }
            _ = ctx.cancel.cancelled() => {
                debug!(conn_id = %ctx.conn_id, peer = %ctx.peer, "connection handler received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

/// 라인 한 건을 레코드로 만들어 파이프라인에 통과시킵니다.
///
/// 반환값이 `false`면 연결을 닫아야 합니다 (종료 진행 중).
async fn process_line(
    parser: &SyslogParser,
    line: &str,
    ctx: &ConnectionContext,
) -> Result<bool, RouterError> {
    let record = match RecordParser::parse(parser, line.as_bytes()) {
        Ok(record) => record,
        Err(e) => {
            // syslog가 아닌 입력은 라인 전체를 msg로 갖는 레코드로 강등
            debug!(peer = %ctx.peer, error = %e, "syslog parse failed, demoting to msg-only record");
            ctx.stats.parse_fallbacks.fetch_add(1, Ordering::Relaxed);
            counter!(metric_names::ROUTER_PARSE_FALLBACKS_TOTAL).increment(1);
            Record::from_line(line)
        }
    };

    let envelope = ctx.ruleset.route(record);

    match ctx.dispatcher.submit(envelope).await {
        Ok(()) => Ok(true),
        Err(DispatchError::ShutdownInProgress) => {
            ctx.stats.records_lost.fetch_add(1, Ordering::Relaxed);
            warn!(
                peer = %ctx.peer,
                "record lost: submitted after shutdown signal"
            );
            Ok(false)
        }
        Err(DispatchError::Closed) => Err(RouterError::Channel(
            "dispatch queue closed".to_owned(),
        )),
    }
}

/// TLS 설정에서 rustls acceptor를 만듭니다.
///
/// PEM 인증서 체인과 개인키를 로드합니다. 실패는 기동 거부로 이어집니다.
fn load_tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, RouterError> {
    let cert_file = std::fs::File::open(&tls.cert).map_err(|e| RouterError::Listener {
        reason: format!("failed to open TLS cert '{}': {e}", tls.cert),
    })?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut StdBufReader::new(cert_file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RouterError::Listener {
                reason: format!("failed to read TLS cert '{}': {e}", tls.cert),
            })?;

    let key_file = std::fs::File::open(&tls.key).map_err(|e| RouterError::Listener {
        reason: format!("failed to open TLS key '{}': {e}", tls.key),
    })?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut StdBufReader::new(key_file))
            .map_err(|e| RouterError::Listener {
                reason: format!("failed to read TLS key '{}': {e}", tls.key),
            })?
            .ok_or_else(|| RouterError::Listener {
                reason: format!("no private key found in '{}'", tls.key),
            })?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| RouterError::Listener {
            reason: format!("invalid TLS material: {e}"),
        })?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
