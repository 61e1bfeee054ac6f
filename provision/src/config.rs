use anyhow::{Result, anyhow};
use dotenv::dotenv;
use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};
use url::Url;

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeKind {
    Http,
    InMem,
}

impl FromStr for BridgeKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(BridgeKind::Http),
            "inmem" => Ok(BridgeKind::InMem),
            _ => Err(()),
        }
    }
}

impl BridgeKind {
    fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Http => "http",
            BridgeKind::InMem => "inmem",
        }
    }
}

impl Display for BridgeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    Provision,
    Monitor,
    AutoScenes,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provision" => Ok(Mode::Provision),
            "monitor" => Ok(Mode::Monitor),
            "auto-scenes" => Ok(Mode::AutoScenes),
            _ => Err(()),
        }
    }
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Provision => "provision",
            Mode::Monitor => "monitor",
            Mode::AutoScenes => "auto-scenes",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bridge: BridgeKind,
    pub hue: HueConfig,
    pub prefix: String,
    pub topology: PathBuf,
    pub mode: Mode,
    pub monitor_room: Option<String>,
    pub monitor_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeKind::Http,
            hue: HueConfig::default(),
            prefix: "hrm".to_string(),
            topology: PathBuf::from("topology.json"),
            mode: Mode::Provision,
            monitor_room: None,
            monitor_interval: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let mut c = Self::default();
        if let Ok(s) = std::env::var("HUE_BRIDGE") {
            c.bridge = BridgeKind::from_str(&s).map_err(|_| anyhow!("unknown HUE_BRIDGE {s:?}"))?;
        }
        if let Ok(conn) = std::env::var("HUE_URL") {
            c.hue = HueConfig::from_connection_string(&conn)?;
        }
        if let Ok(s) = std::env::var("HUE_HOST") {
            c.hue.host = s;
        }
        if let Ok(s) = std::env::var("HUE_PORT") {
            c.hue.port = Some(s.parse()?);
        }
        if let Ok(s) = std::env::var("HUE_USERNAME") {
            c.hue.username = s;
        }
        if let Ok(s) = std::env::var("HUE_PREFIX") {
            c.prefix = s;
        }
        if let Ok(s) = std::env::var("HUE_TOPOLOGY") {
            c.topology = PathBuf::from(s);
        }
        if let Ok(s) = std::env::var("HUE_MODE") {
            c.mode = Mode::from_str(&s).map_err(|_| anyhow!("unknown HUE_MODE {s:?}"))?;
        }
        if let Ok(s) = std::env::var("HUE_MONITOR_ROOM") {
            c.monitor_room = Some(s);
        }
        if let Ok(s) = std::env::var("HUE_MONITOR_INTERVAL_SECS") {
            c.monitor_interval = Duration::from_secs(s.parse()?);
        }
        if c.prefix.is_empty() {
            anyhow::bail!("HUE_PREFIX must not be empty");
        }
        Ok(c)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HueConfig {
    pub https: bool,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self { https: false, host: "127.0.0.1".to_string(), port: None, username: String::new() }
    }
}

impl HueConfig {
    /// Bridge root, without the api path.
    pub fn base_url(&self) -> Result<Url> {
        let scheme = if self.https { "https" } else { "http" };
        let base = match self.port {
            Some(port) => format!("{scheme}://{}:{port}/", self.host),
            None => format!("{scheme}://{}/", self.host),
        };
        Ok(Url::parse(&base)?)
    }

    /// `http://<username>@<host>[:port]`
    fn from_connection_string(conn: &str) -> Result<Self> {
        let url = Url::parse(conn)?;
        let https = match url.scheme() {
            "http" => false,
            "https" => true,
            other => anyhow::bail!("unsupported bridge url scheme: {other}"),
        };

        let host = url.host_str().ok_or_else(|| anyhow!("bridge url missing host"))?.to_string();
        let username = url.username().to_string();
        if username.is_empty() {
            anyhow::bail!("bridge url missing username");
        }

        Ok(Self { https, host, port: url.port(), username })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_splits_user_and_host() {
        let hue = HueConfig::from_connection_string("http://abc123@192.168.1.2:8080").unwrap();
        assert_eq!(hue.username, "abc123");
        assert_eq!(hue.port, Some(8080));
        assert_eq!(hue.base_url().unwrap().as_str(), "http://192.168.1.2:8080/");
    }

    #[test]
    fn connection_string_needs_a_username() {
        assert!(HueConfig::from_connection_string("http://192.168.1.2").is_err());
        assert!(HueConfig::from_connection_string("mqtt://u@192.168.1.2").is_err());
    }

    #[test]
    fn default_bridge_is_local_http() {
        let url = HueConfig::default().base_url().unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1/");
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(BridgeKind::from_str("InMem"), Ok(BridgeKind::InMem));
        assert_eq!(Mode::from_str("MONITOR"), Ok(Mode::Monitor));
        assert!(Mode::from_str("watch").is_err());
        assert_eq!(Mode::from_str("Auto-Scenes"), Ok(Mode::AutoScenes));
        assert_eq!(Mode::AutoScenes.to_string(), "auto-scenes");
        assert_eq!(BridgeKind::Http.to_string(), "http");
    }
}
