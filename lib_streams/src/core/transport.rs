//! # Transport
//!
//! Dials a venue endpoint and owns the write half of the resulting socket.
//!
//! ## Dial
//! 1. Parse the endpoint with `url` (only `ws`/`wss`).
//! 2. Pick an HTTP proxy from the standard environment variables unless the
//!    host is loopback or listed in `NO_PROXY`.
//! 3. Resolve with `lookup_host` and try IPv4 addresses before IPv6.
//! 4. Tunnel through the proxy with `CONNECT` when one applies.
//! 5. Run the TLS and WebSocket handshake.
//!
//! The whole sequence is bounded by the channel's handshake timeout.
//!
//! ## Connection handle
//! A dedicated writer task owns the sink. Everything else talks to it through
//! a cloneable [`ConnectionHandle`], which enqueues messages and exposes the
//! connection's lifetime token. Cancelling that token (explicit close, write
//! error, failed probe, read fault) is the one teardown signal every task of
//! the connection listens to.

use std::net::SocketAddr;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use crate::core::errors::{StreamError, StreamResult};

/// The socket type produced by [`dial`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MAX_PROXY_RESPONSE: usize = 8192;

/// Opens a WebSocket to `endpoint`, bounded by `timeout`.
pub async fn dial(endpoint: &str, timeout: Duration) -> StreamResult<WsStream> {
    let target = parse_endpoint(endpoint)?;
    let proxy = proxy_for(&target, |key| std::env::var(key).ok());

    match tokio::time::timeout(timeout, dial_inner(&target, proxy)).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::HandshakeTimeout(timeout)),
    }
}

async fn dial_inner(target: &Url, proxy: Option<Url>) -> StreamResult<WsStream> {
    let host = host_name(target)?;
    let port = target
        .port_or_known_default()
        .ok_or_else(|| StreamError::InvalidUrl(format!("no port for {}", target)))?;

    let tcp = match proxy {
        Some(proxy) => {
            let proxy_host = host_name(&proxy)?;
            let proxy_port = proxy.port_or_known_default().unwrap_or(80);
            log::debug!("Dialing {}:{} via proxy {}:{}", host, port, proxy_host, proxy_port);
            let mut tcp = connect_tcp(&proxy_host, proxy_port).await?;
            tunnel(&mut tcp, &host, port, proxy_authorization(&proxy).as_deref()).await?;
            tcp
        }
        None => connect_tcp(&host, port).await?,
    };

    let (ws, _response) = client_async_tls_with_config(target.as_str(), tcp, None, None).await?;
    Ok(ws)
}

/// Parses and validates a `ws://` or `wss://` endpoint.
pub fn parse_endpoint(endpoint: &str) -> StreamResult<Url> {
    let url = Url::parse(endpoint).map_err(|e| StreamError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(StreamError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, endpoint
            )))
        }
    }
    if url.host().is_none() {
        return Err(StreamError::InvalidUrl(format!("missing host in {}", endpoint)));
    }
    Ok(url)
}

fn host_name(url: &Url) -> StreamResult<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(StreamError::InvalidUrl(format!("missing host in {}", url))),
    }
}

/// Resolves `host` and connects, trying every IPv4 address before any IPv6 one.
async fn connect_tcp(host: &str, port: u16) -> StreamResult<TcpStream> {
    let addrs = prefer_ipv4(lookup_host((host, port)).await?.collect());

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("TCP connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(match last_err {
        Some(e) => StreamError::Io(e),
        None => StreamError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses for {}", host),
        )),
    })
}

/// Stable reorder: IPv4 first, resolver order kept within each family.
pub fn prefer_ipv4(mut addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    addrs.sort_by_key(|addr| !addr.is_ipv4());
    addrs
}

/// Selects the proxy for `target` from environment variables read via `env`.
///
/// `wss` targets use `HTTPS_PROXY`, `ws` targets `HTTP_PROXY`, both falling
/// back to `ALL_PROXY`; upper case wins over lower case. Loopback hosts and
/// hosts matched by `NO_PROXY` are dialed directly.
pub fn proxy_for(target: &Url, env: impl Fn(&str) -> Option<String>) -> Option<Url> {
    let host = host_name(target).ok()?;
    if is_loopback(&host) {
        return None;
    }

    let no_proxy = env("NO_PROXY").or_else(|| env("no_proxy")).unwrap_or_default();
    if bypasses_proxy(&host, &no_proxy) {
        return None;
    }

    let keys: &[&str] = if target.scheme() == "wss" {
        &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]
    } else {
        &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
    };
    let raw = keys
        .iter()
        .filter_map(|key| env(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())?;

    let with_scheme = if raw.contains("://") { raw } else { format!("http://{}", raw) };
    match Url::parse(&with_scheme) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            log::warn!("Ignoring unsupported proxy scheme '{}'", url.scheme());
            None
        }
        Err(e) => {
            log::warn!("Ignoring unparseable proxy '{}': {}", with_scheme, e);
            None
        }
    }
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn bypasses_proxy(host: &str, no_proxy: &str) -> bool {
    let host = host.to_ascii_lowercase();
    no_proxy
        .split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry == "*" {
                return true;
            }
            let suffix = entry.trim_start_matches('.');
            host == suffix || host.ends_with(&format!(".{}", suffix))
        })
}

fn proxy_authorization(proxy: &Url) -> Option<String> {
    if proxy.username().is_empty() {
        return None;
    }
    let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
    Some(format!("Basic {}", general_purpose::STANDARD.encode(credentials)))
}

/// Issues `CONNECT host:port` on `stream` and waits for a 2xx answer.
async fn tunnel(stream: &mut TcpStream, host: &str, port: u16, auth: Option<&str>) -> StreamResult<()> {
    let authority = if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", authority);
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte by byte so nothing past the header is consumed.
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_PROXY_RESPONSE {
            return Err(StreamError::Proxy("response header too large".to_string()));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(StreamError::Proxy("connection closed during CONNECT".to_string()));
        }
        response.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default().to_string();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status.starts_with('2') {
        Ok(())
    } else {
        Err(StreamError::Proxy(format!("CONNECT refused: {}", status_line)))
    }
}

/// Cloneable reference to one live connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: u64,
    channel: String,
    tx: mpsc::UnboundedSender<Message>,
    lifetime: CancellationToken,
}

impl ConnectionHandle {
    /// Spawns the writer task for `sink` and returns a handle to it.
    pub fn spawn(channel: &str, id: u64, sink: SplitSink<WsStream, Message>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let lifetime = CancellationToken::new();
        tokio::spawn(write_loop(channel.to_string(), id, sink, rx, lifetime.clone()));
        Self {
            id,
            channel: channel.to_string(),
            tx,
            lifetime,
        }
    }

    /// A handle with no socket behind it; frames land in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(channel: &str, id: u64) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            channel: channel.to_string(),
            tx,
            lifetime: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueues a text frame for the writer task.
    pub fn send_text(&self, text: String) -> StreamResult<()> {
        if self.lifetime.is_cancelled() {
            return Err(StreamError::NotConnected(self.channel.clone()));
        }
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| StreamError::NotConnected(self.channel.clone()))
    }

    /// Tears the connection down. Safe to call any number of times.
    pub fn close(&self) {
        self.lifetime.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// The token cancelled when this connection ends, for any reason.
    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }
}

async fn write_loop(
    channel: String,
    id: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    lifetime: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = lifetime.cancelled() => break,
            next = rx.recv() => match next {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        log::warn!("[{}] write failed on connection #{}: {}", channel, id, e);
                        lifetime.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    lifetime.cancel();
    let _ = sink.close().await;
    log::trace!("[{}] writer for connection #{} finished", channel, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_endpoint_rejects_other_schemes() {
        assert!(parse_endpoint("wss://ws.example.com/ws/market").is_ok());
        assert!(matches!(parse_endpoint("https://example.com"), Err(StreamError::InvalidUrl(_))));
        assert!(matches!(parse_endpoint("not a url"), Err(StreamError::InvalidUrl(_))));
    }

    #[test]
    fn test_proxy_selected_by_scheme() {
        let env = env_of(&[("HTTPS_PROXY", "proxy.corp:3128"), ("HTTP_PROXY", "http://plain:8080")]);
        let secure = proxy_for(&Url::parse("wss://venue.example/ws").unwrap(), &env).unwrap();
        assert_eq!(secure.host_str(), Some("proxy.corp"));
        assert_eq!(secure.port_or_known_default(), Some(3128));
        let plain = proxy_for(&Url::parse("ws://venue.example/ws").unwrap(), &env).unwrap();
        assert_eq!(plain.host_str(), Some("plain"));
    }

    #[test]
    fn test_all_proxy_fallback_and_lowercase() {
        let env = env_of(&[("all_proxy", "http://fallback:9000")]);
        let proxy = proxy_for(&Url::parse("wss://venue.example/ws").unwrap(), &env).unwrap();
        assert_eq!(proxy.host_str(), Some("fallback"));
    }

    #[test]
    fn test_no_proxy_and_loopback_bypass() {
        let env = env_of(&[("HTTPS_PROXY", "http://p:1"), ("HTTP_PROXY", "http://p:1"), ("NO_PROXY", ".internal, venue.example")]);
        assert!(proxy_for(&Url::parse("wss://venue.example/ws").unwrap(), &env).is_none());
        assert!(proxy_for(&Url::parse("wss://api.venue.example/ws").unwrap(), &env).is_none());
        assert!(proxy_for(&Url::parse("wss://feed.internal/ws").unwrap(), &env).is_none());
        assert!(proxy_for(&Url::parse("ws://127.0.0.1:9000/").unwrap(), &env).is_none());
        assert!(proxy_for(&Url::parse("ws://localhost:9000/").unwrap(), &env).is_none());
        assert!(proxy_for(&Url::parse("wss://other.example/ws").unwrap(), &env).is_some());
    }

    #[test]
    fn test_socks_proxy_is_ignored() {
        let env = env_of(&[("ALL_PROXY", "socks5://p:1080")]);
        assert!(proxy_for(&Url::parse("wss://venue.example/ws").unwrap(), &env).is_none());
    }

    #[test]
    fn test_prefer_ipv4_is_stable() {
        let addrs: Vec<SocketAddr> = vec![
            "[::1]:1".parse().unwrap(),
            "10.0.0.2:1".parse().unwrap(),
            "[::2]:1".parse().unwrap(),
            "10.0.0.1:1".parse().unwrap(),
        ];
        let ordered = prefer_ipv4(addrs);
        let rendered: Vec<String> = ordered.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["10.0.0.2:1", "10.0.0.1:1", "[::1]:1", "[::2]:1"]);
    }

    #[test]
    fn test_proxy_authorization_header() {
        let proxy = Url::parse("http://user:secret@p:1").unwrap();
        assert_eq!(
            proxy_authorization(&proxy).as_deref(),
            Some("Basic dXNlcjpzZWNyZXQ=")
        );
        assert!(proxy_authorization(&Url::parse("http://p:1").unwrap()).is_none());
    }

    async fn fake_proxy(reply: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (port, task)
    }

    #[tokio::test]
    async fn test_tunnel_accepts_2xx_and_sends_auth() {
        let (port, task) = fake_proxy("HTTP/1.1 200 Connection established\r\n\r\n").await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        tunnel(&mut stream, "venue.example", 443, Some("Basic abc")).await.unwrap();
        let request = task.await.unwrap();
        assert!(request.starts_with("CONNECT venue.example:443 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Authorization: Basic abc\r\n"));
    }

    #[tokio::test]
    async fn test_tunnel_rejects_non_2xx() {
        let (port, _task) = fake_proxy("HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let err = tunnel(&mut stream, "venue.example", 443, None).await.unwrap_err();
        assert!(matches!(err, StreamError::Proxy(ref m) if m.contains("407")));
    }

    #[tokio::test]
    async fn test_dial_refused_is_io_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = dial(&format!("ws://127.0.0.1:{}/", port), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
    }

    #[tokio::test]
    async fn test_dial_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let err = dial(&format!("ws://127.0.0.1:{}/", port), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::HandshakeTimeout(_)));
    }
}
