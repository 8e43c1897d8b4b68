use anyhow::{bail, Context, Result};
use clap::Parser;
use ltail_core::connection::DEFAULT_KEEPALIVE;
use ltail_core::{ClientConfig, Location};
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/tail";
pub const DEFAULT_MAX_LINES: usize = 2000;

#[derive(Parser, Debug)]
#[command(name = "ltail", about = "Live tail of server log files")]
pub struct Args {
    /// Server endpoint; a `#path?mask=...` fragment selects the initial file.
    #[arg(long, default_value = "")]
    pub url: String,
    #[arg(long)]
    pub keepalive_ms: Option<u64>,
    #[arg(long, default_value_t = 10)]
    pub scroll_debounce_ms: u64,
    #[arg(long)]
    pub mask: Option<String>,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = DEFAULT_MAX_LINES)]
    pub max_lines: usize,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Endpoint without the navigation fragment.
    pub server_url: Url,
    pub initial: Location,
    pub client: ClientConfig,
    pub max_lines: usize,
    pub log_dir: String,
    pub log_stdout: bool,
}

pub fn load_config(args: Args) -> Result<RuntimeConfig> {
    let url = resolve_url(&args.url, std::env::var("LTAIL_URL").ok().as_deref())?;
    let mut initial = Location::from_url(&url).context("initial location")?;
    if let Some(mask) = args.mask {
        initial = initial.with_mask(mask);
    }
    let mut server_url = url;
    server_url.set_fragment(None);

    let keepalive = resolve_keepalive(
        args.keepalive_ms,
        std::env::var("LTAIL_KEEPALIVE_MS").ok().as_deref(),
    );
    let log_dir = resolve_log_dir(&args.log_dir, std::env::var("LTAIL_LOG_DIR").ok().as_deref());
    let log_stdout = std::env::var("LTAIL_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);

    Ok(RuntimeConfig {
        server_url,
        initial,
        client: ClientConfig {
            keepalive,
            scroll_debounce: Duration::from_millis(args.scroll_debounce_ms),
            ..ClientConfig::default()
        },
        max_lines: args.max_lines.max(1),
        log_dir,
        log_stdout,
    })
}

fn resolve_url(arg: &str, env_value: Option<&str>) -> Result<Url> {
    let raw = [Some(arg), env_value]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_URL);
    let raw = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("ws://{raw}")
    };
    let url = Url::parse(&raw).with_context(|| format!("invalid server url '{raw}'"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => bail!("unsupported url scheme '{other}', expected ws or wss"),
    }
}

fn resolve_keepalive(arg: Option<u64>, env_value: Option<&str>) -> Duration {
    arg.or_else(|| env_value.and_then(|value| value.trim().parse().ok()))
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_KEEPALIVE)
}

fn resolve_log_dir(arg: &str, env_value: Option<&str>) -> String {
    if !arg.trim().is_empty() {
        return arg.trim().to_string();
    }
    env_value.map(str::trim).unwrap_or("").to_string()
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltail_core::Channel;

    #[test]
    fn url_prefers_flag_then_env_then_default() {
        assert_eq!(
            resolve_url("ws://a:1/tail", Some("ws://b:2/tail"))
                .expect("url")
                .as_str(),
            "ws://a:1/tail"
        );
        assert_eq!(
            resolve_url("", Some("ws://b:2/tail")).expect("url").as_str(),
            "ws://b:2/tail"
        );
        assert_eq!(resolve_url("  ", None).expect("url").as_str(), DEFAULT_URL);
    }

    #[test]
    fn bare_host_gets_ws_scheme() {
        let url = resolve_url("logs.local:8080/tail", None).expect("url");
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("logs.local"));
    }

    #[test]
    fn http_scheme_is_rejected() {
        assert!(resolve_url("http://a/tail", None).is_err());
    }

    #[test]
    fn keepalive_falls_back_on_bad_values() {
        assert_eq!(resolve_keepalive(Some(250), Some("900")), Duration::from_millis(250));
        assert_eq!(resolve_keepalive(None, Some("900")), Duration::from_millis(900));
        assert_eq!(resolve_keepalive(None, Some("soon")), DEFAULT_KEEPALIVE);
        assert_eq!(resolve_keepalive(Some(0), None), DEFAULT_KEEPALIVE);
    }

    #[test]
    fn parse_bool_flag_accepts_common_values() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(" off "), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn fragment_becomes_initial_location() {
        let args = Args {
            url: "ws://h:1/tail#app.log?mask=WARN".to_string(),
            keepalive_ms: Some(1000),
            scroll_debounce_ms: 10,
            mask: None,
            log_dir: String::new(),
            max_lines: 0,
        };
        let config = load_config(args).expect("config");
        assert_eq!(config.server_url.as_str(), "ws://h:1/tail");
        assert_eq!(config.initial.channel(), &Channel::file("app.log"));
        assert_eq!(config.initial.mask(), Some("WARN"));
        assert_eq!(config.client.keepalive, Duration::from_millis(1000));
        assert_eq!(config.max_lines, 1);
    }

    #[test]
    fn mask_flag_overrides_url_mask() {
        let args = Args {
            url: "ws://h:1/tail#app.log?mask=WARN".to_string(),
            keepalive_ms: None,
            scroll_debounce_ms: 10,
            mask: Some("ERROR".to_string()),
            log_dir: "/tmp/ltail".to_string(),
            max_lines: 50,
        };
        let config = load_config(args).expect("config");
        assert_eq!(config.initial.mask(), Some("ERROR"));
        assert_eq!(config.log_dir, "/tmp/ltail");
    }
}
