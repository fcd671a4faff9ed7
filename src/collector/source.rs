use super::ReceiverError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Where a flow reads its lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `udp://host:port`
    Udp(String),
    /// `unixgram:///path/to/socket`
    UnixDatagram(PathBuf),
}

impl FromStr for Source {
    type Err = ReceiverError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ReceiverError::InvalidSource {
            input: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "udp" => {
                let host = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| invalid("missing host".to_string()))?;
                let port = url.port().ok_or_else(|| invalid("missing port".to_string()))?;
                Ok(Source::Udp(format!("{host}:{port}")))
            }
            "unixgram" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(invalid("missing socket path".to_string()));
                }
                Ok(Source::UnixDatagram(PathBuf::from(url.path())))
            }
            other => Err(ReceiverError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Udp(address) => write!(f, "udp://{address}"),
            Source::UnixDatagram(path) => write!(f, "unixgram://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_udp() {
        let source: Source = "udp://127.0.0.1:5514".parse().unwrap();
        assert_eq!(source, Source::Udp("127.0.0.1:5514".to_string()));
        assert_eq!(source.to_string(), "udp://127.0.0.1:5514");
    }

    #[test]
    fn test_parse_udp_ipv6() {
        let source: Source = "udp://[::1]:514".parse().unwrap();
        assert_eq!(source, Source::Udp("[::1]:514".to_string()));
    }

    #[test]
    fn test_parse_unixgram() {
        let source: Source = "unixgram:///dev/log".parse().unwrap();
        assert_eq!(source, Source::UnixDatagram(PathBuf::from("/dev/log")));
        assert_eq!(source.to_string(), "unixgram:///dev/log");
    }

    #[test]
    fn test_udp_requires_port() {
        let err = "udp://127.0.0.1".parse::<Source>().unwrap_err();
        assert!(matches!(err, ReceiverError::InvalidSource { .. }));
    }

    #[test]
    fn test_unixgram_requires_path() {
        assert!("unixgram://".parse::<Source>().is_err());
    }

    #[test]
    fn test_unknown_scheme() {
        let err = "tcp://127.0.0.1:514".parse::<Source>().unwrap_err();
        assert!(matches!(err, ReceiverError::UnsupportedScheme(scheme) if scheme == "tcp"));
    }

    #[test]
    fn test_not_a_url() {
        assert!("127.0.0.1:514".parse::<Source>().is_err());
    }
}
