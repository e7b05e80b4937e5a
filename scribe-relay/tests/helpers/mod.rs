//! Test Helper Utilities
//!
//! Shared fakes for exercising the relay without live services: a
//! scripted websocket transport, canned token source, recording task
//! board, and an in-memory media store.

#![allow(dead_code)]

use async_trait::async_trait;
use scribe_common::{Error, Result};
use scribe_relay::extract::{ExtractionStrategy, TaskFact};
use scribe_relay::services::{CardRef, MediaStore, TaskBoard};
use scribe_relay::stream::{EventSink, MeetingEvent, StreamReader, StreamTransport, StreamWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Waiting
// ============================================================================

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Token source
// ============================================================================

/// Token source that always hands out the same credential
pub struct StaticTokens;

#[async_trait]
impl scribe_relay::auth::TokenSource for StaticTokens {
    async fn get_token(&self) -> Result<String> {
        Ok("test-token".to_string())
    }
}

/// Token source whose endpoint is permanently down
pub struct FailingTokens;

#[async_trait]
impl scribe_relay::auth::TokenSource for FailingTokens {
    async fn get_token(&self) -> Result<String> {
        Err(Error::Auth("token endpoint unreachable".to_string()))
    }
}

// ============================================================================
// Scripted websocket transport
// ============================================================================

struct FakeTransportInner {
    /// Handshake attempts that fail before connections start succeeding
    fail_first: u32,
    attempts: AtomicU32,
    /// Successful connections over the transport's lifetime
    conn_count: AtomicU32,
    /// Senders feeding currently-scripted connections. Dropping a sender
    /// closes that connection from the remote side.
    senders: Mutex<Vec<mpsc::UnboundedSender<Result<String>>>>,
    /// Frames the manager wrote (heartbeat probes)
    sent: Mutex<Vec<String>>,
}

/// Transport whose connection outcomes are scripted by the test
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<FakeTransportInner>,
}

impl FakeTransport {
    pub fn new(fail_first: u32) -> Self {
        Self {
            inner: Arc::new(FakeTransportInner {
                fail_first,
                attempts: AtomicU32::new(0),
                conn_count: AtomicU32::new(0),
                senders: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Total handshake attempts so far
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Successful connections so far
    pub fn connections(&self) -> u32 {
        self.inner.conn_count.load(Ordering::SeqCst)
    }

    /// Sender feeding the most recent connection
    pub fn latest_sender(&self) -> Option<mpsc::UnboundedSender<Result<String>>> {
        self.inner.senders.lock().unwrap().last().cloned()
    }

    /// Close the current connection from the remote side
    pub fn drop_connection(&self) {
        self.inner.senders.lock().unwrap().clear();
    }

    /// Frames written by the manager
    pub fn sent_frames(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<(Box<dyn StreamReader>, Box<dyn StreamWriter>)> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.inner.fail_first {
            return Err(Error::Connection("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.conn_count.fetch_add(1, Ordering::SeqCst);
        self.inner.senders.lock().unwrap().push(tx);
        Ok((
            Box::new(FakeReader { rx }),
            Box::new(FakeWriter {
                inner: self.inner.clone(),
            }),
        ))
    }
}

struct FakeReader {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl StreamReader for FakeReader {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

struct FakeWriter {
    inner: Arc<FakeTransportInner>,
}

#[async_trait]
impl StreamWriter for FakeWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Event sink
// ============================================================================

/// Sink that records every forwarded domain event
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub events: Arc<Mutex<Vec<MeetingEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn handle_event(&self, event: MeetingEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Task board
// ============================================================================

/// Board that records operations in call order
#[derive(Default)]
pub struct FakeBoard {
    pub ops: Mutex<Vec<String>>,
    /// Character whose operations all fail with a dispatch error
    pub fail_for: Option<String>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(character: &str) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            fail_for: Some(character.to_string()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskBoard for FakeBoard {
    async fn find_or_create_card(&self, name: &str) -> Result<CardRef> {
        if self.fail_for.as_deref() == Some(name) {
            return Err(Error::Dispatch(format!("board rejected card '{}'", name)));
        }
        self.ops.lock().unwrap().push(format!("card:{}", name));
        Ok(CardRef {
            id: name.to_lowercase(),
            name: name.to_string(),
        })
    }

    async fn add_note(&self, card: &CardRef, text: &str) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("note:{}:{}", card.id, text.lines().next().unwrap_or("")));
        Ok(())
    }

    async fn add_checklist(&self, card: &CardRef, title: &str, items: &[String]) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("checklist:{}:{}:{}", card.id, title, items.join("|")));
        Ok(())
    }
}

// ============================================================================
// Media store
// ============================================================================

/// In-memory media store recording fetch/cleanup traffic
#[derive(Default)]
pub struct FakeMediaStore {
    pub fetched: Mutex<Vec<String>>,
    pub cleaned: Mutex<Vec<PathBuf>>,
    pub fail_fetch: bool,
}

impl FakeMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn cleaned_paths(&self) -> Vec<PathBuf> {
        self.cleaned.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn fetch(&self, url: &str, _token: Option<&str>) -> Result<PathBuf> {
        if self.fail_fetch {
            return Err(Error::Internal("download failed".to_string()));
        }
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(PathBuf::from("/tmp/scribe-test/recording.m4a"))
    }

    async fn convert(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    async fn cleanup(&self, paths: &[PathBuf]) {
        self.cleaned.lock().unwrap().extend(paths.iter().cloned());
    }
}

// ============================================================================
// Extraction strategies
// ============================================================================

/// Strategy that returns a fixed fact list
pub struct FixedStrategy {
    pub facts: Vec<TaskFact>,
}

#[async_trait]
impl ExtractionStrategy for FixedStrategy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn extract(&self, _media_path: &Path) -> Result<Vec<TaskFact>> {
        Ok(self.facts.clone())
    }
}

/// Strategy that always fails
pub struct BrokenStrategy;

#[async_trait]
impl ExtractionStrategy for BrokenStrategy {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn extract(&self, _media_path: &Path) -> Result<Vec<TaskFact>> {
        Err(Error::Internal("no extraction credentials".to_string()))
    }
}

/// Build a task fact with the shared test defaults
pub fn fact(character: &str, task: &str) -> TaskFact {
    TaskFact {
        project: "Campaign".to_string(),
        character: character.to_string(),
        task: task.to_string(),
        context: String::new(),
        confidence: 0.9,
    }
}
