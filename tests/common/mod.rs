#![allow(dead_code)]

use async_trait::async_trait;
use rask_logs_agent::collector::{Receiver, ReceiverError};
use rask_logs_agent::domain::LogEvent;
use rask_logs_agent::sender::{LogService, LogServiceError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCall {
    pub group: String,
    pub stream: String,
    pub token: Option<String>,
    pub messages: Vec<String>,
}

#[derive(Default)]
struct State {
    puts: Vec<PutCall>,
    scripted: VecDeque<Result<Option<String>, LogServiceError>>,
    created_groups: Vec<String>,
    created_streams: Vec<(String, String)>,
    describe_calls: usize,
    describe_token: Option<String>,
    issued: usize,
}

/// In-memory Logs API that records every call.
///
/// `put_log_events` answers from the script first, then succeeds with
/// `token-1`, `token-2`, ...
#[derive(Default)]
pub struct RecordingLogService {
    state: Mutex<State>,
    put_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingLogService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_put_delay(put_delay: Duration) -> Self {
        Self {
            put_delay,
            ..Self::default()
        }
    }

    pub fn script(&self, response: Result<Option<String>, LogServiceError>) {
        self.state.lock().unwrap().scripted.push_back(response);
    }

    pub fn set_describe_token(&self, token: &str) {
        self.state.lock().unwrap().describe_token = Some(token.to_string());
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn uploaded_messages(&self) -> Vec<String> {
        self.puts().into_iter().flat_map(|call| call.messages).collect()
    }

    pub fn created_groups(&self) -> Vec<String> {
        self.state.lock().unwrap().created_groups.clone()
    }

    pub fn created_streams(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_streams.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogService for RecordingLogService {
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<String>,
        events: &[LogEvent],
    ) -> Result<Option<String>, LogServiceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        let response = {
            let mut state = self.state.lock().unwrap();
            state.puts.push(PutCall {
                group: group.to_string(),
                stream: stream.to_string(),
                token: sequence_token,
                messages: events.iter().map(|e| e.message.clone()).collect(),
            });
            match state.scripted.pop_front() {
                Some(response) => response,
                None => {
                    state.issued += 1;
                    Ok(Some(format!("token-{}", state.issued)))
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn create_log_group(&self, group: &str) -> Result<(), LogServiceError> {
        self.state
            .lock()
            .unwrap()
            .created_groups
            .push(group.to_string());
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), LogServiceError> {
        self.state
            .lock()
            .unwrap()
            .created_streams
            .push((group.to_string(), stream.to_string()));
        Ok(())
    }

    async fn describe_upload_token(
        &self,
        _group: &str,
        _stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        Ok(state.describe_token.clone())
    }
}

/// Test-side handle that pushes lines into a [`ChannelReceiver`].
#[derive(Clone)]
pub struct LineFeed {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl LineFeed {
    pub fn send(&self, line: &str) -> bool {
        match self.tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(line.to_string()).is_ok(),
            None => false,
        }
    }
}

/// Receiver backed by a channel instead of a socket.
pub struct ChannelReceiver {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    rx: Option<mpsc::UnboundedReceiver<String>>,
    fail_listen: bool,
    pub closed: Arc<Mutex<bool>>,
}

impl ChannelReceiver {
    pub fn new() -> (Self, LineFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let receiver = Self {
            tx: tx.clone(),
            rx: Some(rx),
            fail_listen: false,
            closed: Arc::new(Mutex::new(false)),
        };
        (receiver, LineFeed { tx })
    }

    pub fn failing() -> Self {
        let (mut receiver, _feed) = Self::new();
        receiver.fail_listen = true;
        receiver
    }
}

#[async_trait]
impl Receiver for ChannelReceiver {
    async fn listen(&mut self) -> Result<(), ReceiverError> {
        if self.fail_listen {
            return Err(ReceiverError::Bind {
                address: "test".to_string(),
                error: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            });
        }
        Ok(())
    }

    fn receive(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.rx.take()
    }

    fn close(&mut self) {
        self.tx.lock().unwrap().take();
        *self.closed.lock().unwrap() = true;
    }
}

pub fn events(messages: &[(&str, i64)]) -> Vec<LogEvent> {
    messages
        .iter()
        .map(|(message, timestamp)| LogEvent::new(*message, *timestamp))
        .collect()
}
