/// Runtime settings read from the environment (after `.env` is loaded).

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use lorachunk::{DEFAULT_MAX_MESSAGE_LEN, TransferConfig};

/// Which physical link carries the messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// One datagram per message, e.g. towards a radio bridge.
    Udp { bind: SocketAddr, peer: SocketAddr },
    /// Newline-delimited messages over a character device.
    Device { path: PathBuf },
}

impl FromStr for Link {
    type Err = anyhow::Error;

    /// Only the kind is parsed here; addresses and paths come from their own variables.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Link::Udp {
                bind: default_udp_bind(),
                peer: default_udp_peer(),
            }),
            "device" | "serial" => Ok(Link::Device {
                path: PathBuf::from(DEFAULT_DEVICE),
            }),
            other => bail!("unknown link kind '{}' (expected udp or device)", other),
        }
    }
}

/// How file bytes map to the transferred payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Raw,
    /// Payload is the base64 text of the file.
    Base64,
}

impl FromStr for PayloadEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(PayloadEncoding::Raw),
            "base64" => Ok(PayloadEncoding::Base64),
            other => bail!("unknown payload encoding '{}' (expected raw or base64)", other),
        }
    }
}

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

fn default_udp_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7400))
}

fn default_udp_peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7401))
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub transfer: TransferConfig,
    pub max_message_len: usize,
    pub link: Link,
    pub encoding: PayloadEncoding,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TransferConfig::default();

        let chunk_size = parse_or(&lookup, "LORACHUNK_CHUNK_SIZE", defaults.chunk_size)?;
        let ack_timeout = millis_or(&lookup, "LORACHUNK_ACK_TIMEOUT_MS", defaults.ack_timeout)?;
        let max_retries = parse_or(&lookup, "LORACHUNK_MAX_RETRIES", defaults.max_retries)?;
        let poll_interval =
            millis_or(&lookup, "LORACHUNK_POLL_INTERVAL_MS", defaults.poll_interval)?;
        // 0 or unset means wait forever.
        let idle_timeout = match lookup("LORACHUNK_IDLE_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = parse_value("LORACHUNK_IDLE_TIMEOUT_MS", &raw)?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => None,
        };
        let max_message_len =
            parse_or(&lookup, "LORACHUNK_MAX_MESSAGE_LEN", DEFAULT_MAX_MESSAGE_LEN)?;

        let link = match parse_or(&lookup, "LORACHUNK_LINK", Link::Udp {
            bind: default_udp_bind(),
            peer: default_udp_peer(),
        })? {
            Link::Udp { bind, peer } => Link::Udp {
                bind: parse_or(&lookup, "LORACHUNK_UDP_BIND", bind)?,
                peer: parse_or(&lookup, "LORACHUNK_UDP_PEER", peer)?,
            },
            Link::Device { path } => Link::Device {
                path: lookup("LORACHUNK_DEVICE").map(PathBuf::from).unwrap_or(path),
            },
        };

        let encoding = parse_or(&lookup, "LORACHUNK_PAYLOAD_ENCODING", PayloadEncoding::Raw)?;

        let transfer = TransferConfig {
            chunk_size,
            ack_timeout,
            max_retries,
            poll_interval,
            idle_timeout,
        };
        transfer
            .validate(max_message_len)
            .context("invalid transfer settings")?;

        Ok(Self {
            transfer,
            max_message_len,
            link,
            encoding,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value::<u64>(key, &raw).map(Duration::from_millis),
        None => Ok(default),
    }
}
