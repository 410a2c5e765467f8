//! Twitch chat over plain IRC.
//!
//! The transport connects lazily on the first `receive` and again after any
//! disconnect. Without a token it joins anonymously as a `justinfan` user,
//! which is read-only but enough to follow a channel's chat.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{self, Duration, Instant};

use super::{ChatMessage, ChatTransport, TransportError};
use crate::utils::time::deadline_after;

pub const DEFAULT_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_IRC_PORT: u16 = 6667;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IrcConfig {
    pub host: String,
    pub port: u16,
    pub nick: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub channels: Vec<String>,
    /// Bound on DNS, TCP connect and the login write together
    pub connect_timeout_ms: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_IRC_HOST.to_string(),
            port: DEFAULT_IRC_PORT,
            nick: None,
            token: None,
            channels: Vec::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    Ping(String),
    Privmsg {
        author: Option<String>,
        channel: String,
        text: String,
    },
    Reconnect,
    LoginFailed(String),
    Other,
}

/// Parses one raw IRC line, with or without an IRCv3 tags prefix.
pub fn parse_line(raw: &str) -> IrcLine {
    let mut rest = raw.trim_end_matches(['\r', '\n']);

    if let Some(tagged) = rest.strip_prefix('@') {
        rest = match tagged.split_once(' ') {
            Some((_, remainder)) => remainder,
            None => return IrcLine::Other,
        };
    }

    let mut source = None;
    if let Some(prefixed) = rest.strip_prefix(':') {
        let Some((prefix, remainder)) = prefixed.split_once(' ') else {
            return IrcLine::Other;
        };
        source = Some(prefix);
        rest = remainder;
    }

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };
    let mut params = head.split_whitespace();
    let Some(command) = params.next() else {
        return IrcLine::Other;
    };

    match command {
        "PING" => IrcLine::Ping(
            trailing
                .or_else(|| params.next())
                .unwrap_or("tmi.twitch.tv")
                .to_string(),
        ),
        "PRIVMSG" => match (params.next(), trailing) {
            (Some(channel), Some(text)) => IrcLine::Privmsg {
                author: source
                    .and_then(|s| s.split('!').next())
                    .filter(|nick| !nick.is_empty())
                    .map(str::to_string),
                channel: channel.to_string(),
                text: text.to_string(),
            },
            _ => IrcLine::Other,
        },
        "RECONNECT" => IrcLine::Reconnect,
        "NOTICE" => match trailing {
            Some(text)
                if text.contains("Login authentication failed")
                    || text.contains("Improperly formatted auth") =>
            {
                IrcLine::LoginFailed(text.to_string())
            }
            _ => IrcLine::Other,
        },
        _ => IrcLine::Other,
    }
}

fn normalize_channel(channel: &str) -> String {
    let name = channel.trim().trim_start_matches('#').to_lowercase();
    format!("#{name}")
}

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

pub struct TwitchIrcTransport {
    config: IrcConfig,
    connection: Option<Connection>,
}

impl TwitchIrcTransport {
    pub fn new(config: IrcConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    fn credentials(&self) -> (String, String) {
        match &self.config.token {
            Some(token) => {
                let pass = if token.starts_with("oauth:") {
                    token.clone()
                } else {
                    format!("oauth:{token}")
                };
                let nick = self
                    .config
                    .nick
                    .clone()
                    .unwrap_or_else(|| "clipwatch".to_string())
                    .to_lowercase();
                (pass, nick)
            }
            None => {
                let suffix = uuid::Uuid::new_v4().as_u128() % 100_000;
                ("SCHMOOPIIE".to_string(), format!("justinfan{suffix}"))
            }
        }
    }

    async fn connect(&self) -> Result<Connection, TransportError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|err| TransportError::Disconnected(format!("connect to {address}: {err}")))?;
        let (reader, mut writer) = stream.into_split();

        let (pass, nick) = self.credentials();
        let mut login = format!("PASS {pass}\r\nNICK {nick}\r\n");
        for channel in &self.config.channels {
            login.push_str(&format!("JOIN {}\r\n", normalize_channel(channel)));
        }
        writer
            .write_all(login.as_bytes())
            .await
            .map_err(|err| TransportError::Disconnected(format!("login write failed: {err}")))?;

        info!(
            "connected to {address} as {nick}, joined {:?}",
            self.config.channels
        );
        Ok(Connection {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }
}

#[async_trait]
impl ChatTransport for TwitchIrcTransport {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<ChatMessage>, TransportError> {
        if self.config.channels.is_empty() {
            return Err(TransportError::Fatal("no channels configured".into()));
        }

        if self.connection.is_none() {
            let limit = Duration::from_millis(self.config.connect_timeout_ms);
            let connection = match time::timeout(limit, self.connect()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "connecting to {}:{} timed out after {limit:?}",
                        self.config.host, self.config.port
                    );
                    return Err(TransportError::Disconnected(format!(
                        "connect timed out after {limit:?}"
                    )));
                }
            };
            self.connection = Some(connection);
        }

        let deadline = deadline_after(timeout);

        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Ok(None);
            };

            let next = time::timeout_at(deadline, connection.lines.next_line()).await;
            let line = match next {
                Err(_) => return Ok(None),
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    self.connection = None;
                    return Err(TransportError::Disconnected("server closed the connection".into()));
                }
                Ok(Err(err)) => {
                    self.connection = None;
                    return Err(TransportError::Disconnected(err.to_string()));
                }
            };

            match parse_line(&line) {
                IrcLine::Ping(token) => {
                    debug!("answering PING {token}");
                    let pong = format!("PONG :{token}\r\n");
                    let written = connection.writer.write_all(pong.as_bytes()).await;
                    if let Err(err) = written {
                        self.connection = None;
                        return Err(TransportError::Disconnected(format!("PONG failed: {err}")));
                    }
                }
                IrcLine::Privmsg {
                    author,
                    channel,
                    text,
                } => {
                    let mut message = ChatMessage::new(text, Instant::now());
                    message.author = author;
                    message.channel = Some(channel);
                    return Ok(Some(message));
                }
                IrcLine::Reconnect => {
                    warn!("server requested reconnect");
                    self.connection = None;
                    return Err(TransportError::Disconnected("server requested reconnect".into()));
                }
                IrcLine::LoginFailed(reason) => {
                    self.connection = None;
                    return Err(TransportError::Fatal(reason));
                }
                IrcLine::Other => {}
            }
        }
    }

    fn name(&self) -> &str {
        "twitch-irc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn parses_tagged_privmsg() {
        let line = "@badge-info=;color=#1E90FF;display-name=Viewer :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #streamer :that was insane!!\r\n";
        assert_eq!(
            parse_line(line),
            IrcLine::Privmsg {
                author: Some("viewer".into()),
                channel: "#streamer".into(),
                text: "that was insane!!".into(),
            }
        );
    }

    #[test]
    fn keeps_colons_inside_message_text() {
        let line = ":a!a@a PRIVMSG #chan :time: 12:30";
        match parse_line(line) {
            IrcLine::Privmsg { text, .. } => assert_eq!(text, "time: 12:30"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_control_lines() {
        assert_eq!(parse_line("PING :tmi.twitch.tv"), IrcLine::Ping("tmi.twitch.tv".into()));
        assert_eq!(parse_line(":tmi.twitch.tv RECONNECT"), IrcLine::Reconnect);
        assert!(matches!(
            parse_line(":tmi.twitch.tv NOTICE * :Login authentication failed"),
            IrcLine::LoginFailed(_)
        ));
        assert_eq!(parse_line(":tmi.twitch.tv 001 justinfan1 :Welcome, GLHF!"), IrcLine::Other);
        assert_eq!(parse_line(""), IrcLine::Other);
    }

    #[test]
    fn normalizes_channel_names() {
        assert_eq!(normalize_channel("Streamer"), "#streamer");
        assert_eq!(normalize_channel("#already"), "#already");
    }

    #[tokio::test]
    async fn logs_in_answers_ping_and_reads_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            let mut login = Vec::new();
            for _ in 0..3 {
                login.push(lines.next_line().await.unwrap().unwrap());
            }
            writer.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
            let pong = lines.next_line().await.unwrap().unwrap();
            writer
                .write_all(b":fan!fan@fan.tmi.twitch.tv PRIVMSG #streamer :poggers\r\n")
                .await
                .unwrap();
            (login, pong)
        });

        let mut transport = TwitchIrcTransport::new(IrcConfig {
            host: "127.0.0.1".into(),
            port,
            channels: vec!["Streamer".into()],
            ..IrcConfig::default()
        });

        let message = transport
            .receive(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.text, "poggers");
        assert_eq!(message.author.as_deref(), Some("fan"));
        assert_eq!(message.channel.as_deref(), Some("#streamer"));

        let (login, pong) = server.await.unwrap();
        assert!(login[0].starts_with("PASS "));
        assert!(login[1].starts_with("NICK justinfan"));
        assert_eq!(login[2], "JOIN #streamer");
        assert_eq!(pong, "PONG :tmi.twitch.tv");

        assert!(matches!(
            transport.receive(Duration::from_secs(5)).await,
            Err(TransportError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn stalled_connect_is_a_disconnect() {
        // non-routable address: either the connect hangs until the timeout or
        // the network refuses it outright
        let mut transport = TwitchIrcTransport::new(IrcConfig {
            host: "10.255.255.1".into(),
            channels: vec!["streamer".into()],
            connect_timeout_ms: 100,
            ..IrcConfig::default()
        });

        let started = std::time::Instant::now();
        assert!(matches!(
            transport.receive(Duration::from_millis(10)).await,
            Err(TransportError::Disconnected(_))
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn connect_timeout_defaults_when_omitted() {
        let config: IrcConfig = serde_json::from_str(r#"{ "channels": ["a"] }"#).unwrap();
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    }

    #[tokio::test]
    async fn empty_channel_list_is_fatal() {
        let mut transport = TwitchIrcTransport::new(IrcConfig::default());
        assert!(matches!(
            transport.receive(Duration::from_millis(10)).await,
            Err(TransportError::Fatal(_))
        ));
    }
}
