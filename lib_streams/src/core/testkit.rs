//! In-process WebSocket venue for engine and channel tests.
//!
//! Every inbound text frame is reported as `(connection index, text)`.
//! Tests push frames to a given connection or drop it without a close
//! handshake to simulate a network fault.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT: Duration = Duration::from_secs(5);

enum Command {
    Send(String),
    Drop,
}

pub struct MockServer {
    pub url: String,
    frames: mpsc::UnboundedReceiver<(usize, String)>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>>,
    probes: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>> = Arc::default();
        let probes = Arc::new(AtomicUsize::new(0));

        let accept_peers = peers.clone();
        let accept_probes = probes.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = accept_async(tcp).await else { continue };
                let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
                let idx = {
                    let mut peers = accept_peers.lock().unwrap();
                    peers.push(cmd_tx);
                    peers.len() - 1
                };
                let frames_tx = frames_tx.clone();
                let probes = accept_probes.clone();
                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            cmd = cmd_rx.recv() => match cmd {
                                Some(Command::Send(text)) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Command::Drop) | None => break,
                            },
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let text = text.as_str().to_string();
                                    if text == "\"PING\"" || text == "PING" {
                                        probes.fetch_add(1, Ordering::SeqCst);
                                        let _ = write.send(Message::Text("PONG".into())).await;
                                    } else {
                                        let _ = frames_tx.send((idx, text));
                                    }
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            url,
            frames,
            peers,
            probes,
        }
    }

    /// Sends `text` to connection `idx`.
    pub fn send(&self, idx: usize, text: &str) {
        if let Some(peer) = self.peers.lock().unwrap().get(idx) {
            let _ = peer.send(Command::Send(text.to_string()));
        }
    }

    /// Closes connection `idx` at the TCP level.
    pub fn drop_connection(&self, idx: usize) {
        if let Some(peer) = self.peers.lock().unwrap().get(idx) {
            let _ = peer.send(Command::Drop);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// The next non-probe frame from any connection.
    pub async fn next_frame(&mut self) -> (usize, String) {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("mock server stopped")
    }

    /// Parses the next frame as JSON.
    pub async fn next_json(&mut self) -> (usize, serde_json::Value) {
        let (idx, text) = self.next_frame().await;
        (idx, serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Asserts that no frame arrives within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.frames.recv()).await {
            panic!("unexpected client frame: {:?}", frame);
        }
    }
}

/// Polls `condition` every 10 ms until it holds or the wait expires.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
