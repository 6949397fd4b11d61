//! SMTP reachability validation
//!
//! Every MX host is probed on every configured port at once and the first
//! endpoint that answers like a mail server wins. When no dialogue gets that
//! far a connect-only race on the fallback port is tried, and after that the
//! presence of MX records alone decides the outcome.

pub mod session;
pub mod tls;

use crate::dns::elapsed_ms;
use crate::providers::is_trusted_provider;
use crate::race::race;
use crate::types::{MxRecord, SmtpValidationResult, ValidationResult};
use session::{converse, Dialogue, Progress};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub const SMTP_WEIGHT: u32 = 20;

/// Score for a dialogue that reached the server but did not confirm the mailbox
const UNCONFIRMED_SCORE: u32 = 15;
/// Score for a bare TCP connection on the fallback port
const CONNECT_ONLY_SCORE: u32 = 15;
/// Score when nothing answered but MX records exist
const ASSUMED_SCORE: u32 = 12;

pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Probe behaviour, usually taken from [`crate::EngineConfig`]
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub dial_timeout: Duration,
    pub exchange_timeout: Duration,
    pub ports: Vec<u16>,
    pub fallback_port: u16,
    /// Port where the dialogue starts after a TLS handshake
    pub implicit_tls_port: u16,
    pub helo_domain: String,
    pub mail_from: String,
    pub assume_reachable_with_mx: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(5),
            exchange_timeout: Duration::from_secs(10),
            ports: vec![25, 587, 465, 2525],
            fallback_port: 25,
            implicit_tls_port: IMPLICIT_TLS_PORT,
            helo_domain: "mailscope.local".to_string(),
            mail_from: "probe@mailscope.local".to_string(),
            assume_reachable_with_mx: true,
        }
    }
}

/// Successful probe of one endpoint
#[derive(Debug, Clone)]
struct Reached {
    host: String,
    port: u16,
    score: u32,
    reason: String,
    server_response: String,
    tls_supported: bool,
}

pub struct SmtpValidator {
    settings: Arc<SmtpSettings>,
    tls: TlsConnector,
}

impl SmtpValidator {
    pub fn new(settings: SmtpSettings) -> anyhow::Result<Self> {
        Ok(Self {
            settings: Arc::new(settings),
            tls: tls::probe_connector()?,
        })
    }

    #[instrument(skip(self, email, mx_records), fields(mx = mx_records.len()))]
    pub async fn validate(&self, email: &str, mx_records: &[MxRecord]) -> SmtpValidationResult {
        let started = Instant::now();

        if mx_records.is_empty() {
            return SmtpValidationResult {
                reachable: ValidationResult::fail(SMTP_WEIGHT, "No MX records to probe", "no_mx"),
                ..Default::default()
            };
        }

        let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or_default();
        if is_trusted_provider(domain) {
            debug!("Skipping SMTP probe for trusted provider {}", domain);
            return SmtpValidationResult {
                reachable: ValidationResult::pass(
                    SMTP_WEIGHT,
                    "Trusted provider accepts mail",
                    "trusted_provider",
                ),
                ..Default::default()
            };
        }

        let hosts: Vec<String> = mx_records.iter().map(|mx| mx.host.clone()).collect();
        let token = CancellationToken::new();

        if let Some(reached) = self.race_dialogues(&hosts, email, &token).await {
            debug!(
                "SMTP probe won by {}:{} with score {}",
                reached.host, reached.port, reached.score
            );
            return self.reached(reached, started);
        }

        if let Some(reached) = self.race_connect(&hosts, &token).await {
            debug!("SMTP fallback connected to {}:{}", reached.host, reached.port);
            return self.reached(reached, started);
        }

        let reachable = if self.settings.assume_reachable_with_mx {
            ValidationResult::partial(
                ASSUMED_SCORE,
                SMTP_WEIGHT,
                "Assumed reachable because MX records exist",
                "assumed_mx",
            )
        } else {
            ValidationResult::fail(SMTP_WEIGHT, "No MX host answered on any port", "unreachable")
        };
        SmtpValidationResult {
            reachable,
            response_time_ms: elapsed_ms(started),
            ..Default::default()
        }
    }

    async fn race_dialogues(
        &self,
        hosts: &[String],
        email: &str,
        token: &CancellationToken,
    ) -> Option<Reached> {
        let candidates: Vec<(String, u16)> = hosts
            .iter()
            .flat_map(|host| self.settings.ports.iter().map(move |port| (host.clone(), *port)))
            .collect();
        let settings = Arc::clone(&self.settings);
        let tls = self.tls.clone();
        let recipient = email.to_string();

        race(candidates, token, move |(host, port)| {
            let settings = Arc::clone(&settings);
            let tls = tls.clone();
            let recipient = recipient.clone();
            async move { probe_endpoint(&settings, &tls, host, port, &recipient).await }
        })
        .await
    }

    async fn race_connect(&self, hosts: &[String], token: &CancellationToken) -> Option<Reached> {
        let port = self.settings.fallback_port;
        let dial_timeout = self.settings.dial_timeout;

        race(hosts.to_vec(), token, move |host| async move {
            let _stream = dial(&host, port, dial_timeout).await?;
            Some(Reached {
                reason: format!("TCP connection established on port {}", port),
                server_response: String::new(),
                host,
                port,
                score: CONNECT_ONLY_SCORE,
                tls_supported: false,
            })
        })
        .await
    }

    fn reached(&self, reached: Reached, started: Instant) -> SmtpValidationResult {
        let raw_signal = format!("{}:{}", reached.host, reached.port);
        SmtpValidationResult {
            reachable: ValidationResult::partial(reached.score, SMTP_WEIGHT, reached.reason, raw_signal),
            response_time_ms: elapsed_ms(started),
            server_response: reached.server_response,
            port: reached.port,
            tls_supported: reached.tls_supported,
        }
    }
}

async fn dial(host: &str, port: u16, timeout: Duration) -> Option<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Some(stream),
        Ok(Err(e)) => {
            debug!("Connect to {}:{} failed: {}", host, port, e);
            None
        }
        Err(_) => {
            debug!("Connect to {}:{} timed out", host, port);
            None
        }
    }
}

/// Dial one endpoint and run the probe dialogue under the exchange deadline
async fn probe_endpoint(
    settings: &SmtpSettings,
    tls: &TlsConnector,
    host: String,
    port: u16,
    recipient: &str,
) -> Option<Reached> {
    let stream = dial(&host, port, settings.dial_timeout).await?;
    let dialogue = Dialogue {
        helo_domain: &settings.helo_domain,
        mail_from: &settings.mail_from,
        recipient,
    };
    let mut progress = Progress::default();
    let implicit_tls = port == settings.implicit_tls_port;

    let outcome = tokio::time::timeout(settings.exchange_timeout, async {
        if implicit_tls {
            let name = tls::server_name(&host).map_err(std::io::Error::other)?;
            let stream = tls.connect(name, stream).await?;
            converse(stream, &dialogue, &mut progress).await
        } else {
            converse(stream, &dialogue, &mut progress).await
        }
    })
    .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("SMTP dialogue with {}:{} ended early: {}", host, port, e),
        Err(_) => debug!("SMTP dialogue with {}:{} hit the exchange deadline", host, port),
    }

    grade(host, port, implicit_tls, &progress)
}

/// Map dialogue progress onto a score tier
fn grade(host: String, port: u16, implicit_tls: bool, progress: &Progress) -> Option<Reached> {
    let banner = progress.banner.as_ref()?;
    if banner.code != 220 {
        debug!("{}:{} refused service: {}", host, port, banner.summary());
        return None;
    }

    let (score, reason) = match &progress.rcpt {
        Some(rcpt) if rcpt.accepts_recipient() => (SMTP_WEIGHT, "Mailbox accepted by RCPT TO".to_string()),
        Some(rcpt) => (
            UNCONFIRMED_SCORE,
            format!("Server reachable, mailbox not confirmed ({})", rcpt.code),
        ),
        None if progress.greeted => (
            UNCONFIRMED_SCORE,
            "Server reachable, handshake did not reach RCPT TO".to_string(),
        ),
        None => (UNCONFIRMED_SCORE, "Server sent a banner, dialogue abandoned".to_string()),
    };

    Some(Reached {
        server_response: progress
            .last_reply()
            .map(|reply| reply.summary())
            .unwrap_or_default(),
        tls_supported: implicit_tls || progress.starttls,
        host,
        port,
        score,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckStatus;
    use pretty_assertions::assert_eq;
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    /// How the fake server behaves after accepting a connection
    #[derive(Clone, Copy)]
    enum Script {
        /// Full dialogue, RCPT answered with the given code
        Answer(u16),
        /// Banner, then silence
        Hang,
    }

    /// Loopback SMTP server; returns its port and a connection counter
    async fn fake_server(script: Script) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, script));
            }
        });

        (port, accepted)
    }

    async fn serve<S>(stream: S, script: Script)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"220 fake.test ESMTP\r\n").await.unwrap();
        write.flush().await.unwrap();
        let rcpt_code = match script {
            Script::Answer(code) => code,
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                return;
            }
        };

        while let Ok(Some(line)) = lines.next_line().await {
            let upper = line.to_ascii_uppercase();
            let reply = if upper.starts_with("EHLO") {
                "250-fake.test\r\n250-STARTTLS\r\n250 8BITMIME\r\n".to_string()
            } else if upper.starts_with("MAIL FROM") {
                "250 Ok\r\n".to_string()
            } else if upper.starts_with("RCPT TO") {
                format!("{} recipient\r\n", rcpt_code)
            } else if upper.starts_with("QUIT") {
                let _ = write.write_all(b"221 Bye\r\n").await;
                let _ = write.flush().await;
                return;
            } else {
                "500 Unknown\r\n".to_string()
            };
            if write.write_all(reply.as_bytes()).await.is_err() || write.flush().await.is_err() {
                return;
            }
        }
    }

    /// Self-signed acceptor for loopback implicit-TLS servers
    fn test_acceptor() -> TlsAcceptor {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        let cert_chain: Vec<CertificateDer<'static>> = vec![cert.der().clone()];
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .unwrap();

        TlsAcceptor::from(Arc::new(config))
    }

    /// Loopback SMTP server that speaks only after a TLS handshake
    async fn fake_tls_server(script: Script) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handshakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handshakes);
        let acceptor = test_acceptor();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let acceptor = acceptor.clone();
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    if let Ok(stream) = acceptor.accept(stream).await {
                        counter.fetch_add(1, Ordering::SeqCst);
                        serve(stream, script).await;
                    }
                });
            }
        });

        (port, handshakes)
    }

    fn tls_validator(port: u16) -> SmtpValidator {
        SmtpValidator::new(SmtpSettings {
            dial_timeout: Duration::from_millis(500),
            exchange_timeout: Duration::from_secs(2),
            ports: vec![port],
            fallback_port: port,
            implicit_tls_port: port,
            helo_domain: "probe.test".to_string(),
            mail_from: "probe@probe.test".to_string(),
            assume_reachable_with_mx: true,
        })
        .unwrap()
    }

    /// A port nothing listens on
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn validator(ports: Vec<u16>, fallback_port: u16) -> SmtpValidator {
        SmtpValidator::new(SmtpSettings {
            dial_timeout: Duration::from_millis(500),
            exchange_timeout: Duration::from_millis(500),
            ports,
            fallback_port,
            implicit_tls_port: IMPLICIT_TLS_PORT,
            helo_domain: "probe.test".to_string(),
            mail_from: "probe@probe.test".to_string(),
            assume_reachable_with_mx: true,
        })
        .unwrap()
    }

    fn loopback_mx() -> Vec<MxRecord> {
        vec![MxRecord::new(10, "127.0.0.1")]
    }

    #[tokio::test]
    async fn test_accepted_recipient_scores_full() {
        let (port, _) = fake_server(Script::Answer(250)).await;

        let result = validator(vec![port], port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.status, CheckStatus::Pass);
        assert_eq!(result.reachable.score, 20);
        assert_eq!(result.port, port);
        assert!(result.tls_supported);
        assert_eq!(result.server_response, "250 recipient");
    }

    #[tokio::test]
    async fn test_rejected_recipient_scores_unconfirmed() {
        let (port, _) = fake_server(Script::Answer(550)).await;

        let result = validator(vec![port], port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 15);
        assert_eq!(result.reachable.weight, 20);
        assert_eq!(result.server_response, "550 recipient");
    }

    #[tokio::test]
    async fn test_banner_then_silence_scores_unconfirmed() {
        let (port, _) = fake_server(Script::Hang).await;

        let result = validator(vec![port], port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 15);
        assert_eq!(result.server_response, "220 fake.test ESMTP");
        assert!(!result.tls_supported);
    }

    #[tokio::test]
    async fn test_implicit_tls_dialogue_accepted() {
        let (port, handshakes) = fake_tls_server(Script::Answer(250)).await;

        let result = tls_validator(port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.status, CheckStatus::Pass);
        assert_eq!(result.reachable.score, 20);
        assert_eq!(result.port, port);
        assert!(result.tls_supported);
        assert_eq!(result.server_response, "250 recipient");
        assert_eq!(handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_implicit_tls_banner_only_is_tls_supported() {
        let (port, _) = fake_tls_server(Script::Hang).await;

        let result = tls_validator(port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 15);
        assert!(result.tls_supported);
        assert_eq!(result.server_response, "220 fake.test ESMTP");
    }

    #[tokio::test]
    async fn test_plain_server_on_tls_port_is_not_a_dialogue() {
        // Plain-text banner where a handshake is expected; only the connect fallback applies
        let (port, _) = fake_server(Script::Answer(250)).await;

        let result = tls_validator(port)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 15);
        assert_eq!(result.reachable.reason, format!("TCP connection established on port {}", port));
        assert!(!result.tls_supported);
    }

    #[tokio::test]
    async fn test_race_finds_the_one_working_port() {
        let dead_a = closed_port().await;
        let dead_b = closed_port().await;
        let (live, _) = fake_server(Script::Answer(250)).await;

        let result = validator(vec![dead_a, live, dead_b], dead_a)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.port, live);
        assert_eq!(result.reachable.score, 20);
    }

    #[tokio::test]
    async fn test_connect_only_fallback() {
        let dead = closed_port().await;
        // Accepts connections but never speaks
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let result = validator(vec![dead, silent], silent)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 15);
        assert_eq!(result.port, silent);
        assert_eq!(result.reachable.raw_signal, format!("127.0.0.1:{}", silent));
    }

    #[tokio::test]
    async fn test_nothing_answers_assumes_reachable() {
        let dead = closed_port().await;

        let result = validator(vec![dead], dead)
            .validate("user@corp.example", &loopback_mx())
            .await;

        assert_eq!(result.reachable.status, CheckStatus::Pass);
        assert_eq!(result.reachable.score, 12);
        assert_eq!(result.reachable.raw_signal, "assumed_mx");
        assert_eq!(result.port, 0);
    }

    #[tokio::test]
    async fn test_nothing_answers_fails_without_assumption() {
        let dead = closed_port().await;
        let validator = SmtpValidator::new(SmtpSettings {
            dial_timeout: Duration::from_millis(500),
            ports: vec![dead],
            fallback_port: dead,
            assume_reachable_with_mx: false,
            ..Default::default()
        })
        .unwrap();

        let result = validator.validate("user@corp.example", &loopback_mx()).await;

        assert_eq!(result.reachable.status, CheckStatus::Fail);
        assert_eq!(result.reachable.score, 0);
        assert_eq!(result.reachable.weight, 20);
    }

    #[tokio::test]
    async fn test_trusted_provider_opens_no_sockets() {
        let (port, accepted) = fake_server(Script::Answer(250)).await;

        let result = validator(vec![port], port)
            .validate("someone@gmail.com", &loopback_mx())
            .await;

        assert_eq!(result.reachable.score, 20);
        assert_eq!(result.reachable.raw_signal, "trusted_provider");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_mx_fails() {
        let result = validator(vec![25], 25).validate("user@corp.example", &[]).await;

        assert_eq!(result.reachable.status, CheckStatus::Fail);
        assert_eq!(result.reachable.weight, 20);
        assert_eq!(result.response_time_ms, 0);
    }
}
