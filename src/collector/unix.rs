use super::{MAX_DATAGRAM_SIZE, ReadBackoff, Receiver, ReceiverError, decode_datagram};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::net::UnixDatagram;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reads datagrams from a Unix socket such as `/dev/log`.
///
/// The socket file is created by `listen` and removed by `close`.
pub struct UnixDatagramReceiver {
    path: PathBuf,
    lines: Option<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
    listening: bool,
}

impl UnixDatagramReceiver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
            cancel: CancellationToken::new(),
            listening: false,
        }
    }
}

#[async_trait]
impl Receiver for UnixDatagramReceiver {
    async fn listen(&mut self) -> Result<(), ReceiverError> {
        if self.listening {
            return Err(ReceiverError::AlreadyListening);
        }

        let socket = UnixDatagram::bind(&self.path).map_err(|error| ReceiverError::Bind {
            address: self.path.display().to_string(),
            error,
        })?;
        info!("Listening on unixgram://{}", self.path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        self.lines = Some(rx);
        self.listening = true;

        let cancel = self.cancel.clone();
        let source = format!("unixgram://{}", self.path.display());
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let mut backoff = ReadBackoff::default();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv(&mut buf) => match result {
                        Ok(len) => {
                            backoff.on_success(&source);
                            if let Some(line) = decode_datagram(&buf[..len])
                                && tx.send(line).is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            let Some(pause) = backoff.on_error(&source, &e) else {
                                break;
                            };
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(pause) => {}
                            }
                        }
                    },
                }
            }
            debug!("{} reader stopped", source);
        });

        Ok(())
    }

    fn receive(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.lines.take()
    }

    fn close(&mut self) {
        self.cancel.cancel();
        if !self.listening {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_receives_and_removes_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.sock");

        let mut receiver = UnixDatagramReceiver::new(&path);
        receiver.listen().await.unwrap();
        assert!(path.exists());
        let mut lines = receiver.receive().unwrap();

        let client = UnixDatagram::unbound().unwrap();
        client.send_to(b"<30>hello\r\n", &path).await.unwrap();
        assert_eq!(lines.recv().await.as_deref(), Some("<30>hello"));

        receiver.close();
        assert_eq!(lines.recv().await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_existing_path_fails_to_bind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taken");
        std::fs::write(&path, b"").unwrap();

        let mut receiver = UnixDatagramReceiver::new(&path);
        assert!(matches!(
            receiver.listen().await,
            Err(ReceiverError::Bind { .. })
        ));
        receiver.close();
        assert!(path.exists());
    }
}
