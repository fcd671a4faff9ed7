use super::{MAX_DATAGRAM_SIZE, ReadBackoff, Receiver, ReceiverError, decode_datagram};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads syslog datagrams from a UDP socket.
pub struct UdpReceiver {
    address: String,
    local_addr: Option<SocketAddr>,
    lines: Option<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
    listening: bool,
}

impl UdpReceiver {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            local_addr: None,
            lines: None,
            cancel: CancellationToken::new(),
            listening: false,
        }
    }

    #[cfg(test)]
    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl Receiver for UdpReceiver {
    async fn listen(&mut self) -> Result<(), ReceiverError> {
        if self.listening {
            return Err(ReceiverError::AlreadyListening);
        }

        let socket = UdpSocket::bind(&self.address)
            .await
            .map_err(|error| ReceiverError::Bind {
                address: self.address.clone(),
                error,
            })?;
        self.local_addr = socket.local_addr().ok();
        match self.local_addr {
            Some(bound) => info!("Listening on udp://{} ({})", self.address, bound),
            None => info!("Listening on udp://{}", self.address),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.lines = Some(rx);
        self.listening = true;

        let cancel = self.cancel.clone();
        let source = format!("udp://{}", self.address);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let mut backoff = ReadBackoff::default();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((len, _peer)) => {
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
    }
}
