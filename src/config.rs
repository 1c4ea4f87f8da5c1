// Environment variables read by `NotifyConfig::from_env`.
pub const ENV_HOST: &str = "ntfy_instance_address";
pub const ENV_TOPIC: &str = "ntfy_topic";
pub const ENV_USERNAME: &str = "ntfy_username";
pub const ENV_PASSWORD: &str = "ntfy_password";
pub const ENV_BEARER: &str = "ntfy_bearer";

const DEFAULT_HOST: &str = "ntfy.sh";
const DEFAULT_TOPIC: &str = "spiders";

/// How to launch the crawler. `{job}` in `args` is replaced with the job name.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub command: String,
    pub args: Vec<String>,
}

/// Push-notification target and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub host: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            command: "scrapy".to_string(),
            // INFO is enough to get the stats dump and keeps the buffer small.
            args: vec![
                "crawl".to_string(),
                "{job}".to_string(),
                "-L".to_string(),
                "INFO".to_string(),
            ],
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            username: None,
            password: None,
            bearer: None,
        }
    }
}

impl NotifyConfig {
    /// Read the notification settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            host: get(ENV_HOST).unwrap_or(defaults.host),
            topic: get(ENV_TOPIC).unwrap_or(defaults.topic),
            username: get(ENV_USERNAME),
            password: get(ENV_PASSWORD),
            bearer: get(ENV_BEARER),
        }
    }

    /// Target URL: `https://{host}/{topic}`.
    ///
    /// A host that already carries a scheme (a self-hosted instance served over
    /// plain HTTP, say) is used as the base as-is.
    pub fn url(&self) -> String {
        let topic = self.topic.trim_start_matches('/');
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}/{}", self.host.trim_end_matches('/'), topic)
        } else {
            format!("https://{}/{}", self.host.trim_end_matches('/'), topic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = NotifyConfig::from_lookup(|_| None);
        assert_eq!(config, NotifyConfig::default());
        assert_eq!(config.url(), "https://ntfy.sh/spiders");
    }

    #[test]
    fn test_reads_all_variables() {
        let config = NotifyConfig::from_lookup(lookup_from(&[
            (ENV_HOST, "push.example.org"),
            (ENV_TOPIC, "crawls"),
            (ENV_USERNAME, "alice"),
            (ENV_PASSWORD, "s3cret"),
            (ENV_BEARER, "tk_abc"),
        ]));
        assert_eq!(config.host, "push.example.org");
        assert_eq!(config.topic, "crawls");
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert_eq!(config.bearer.as_deref(), Some("tk_abc"));
        assert_eq!(config.url(), "https://push.example.org/crawls");
    }

    #[test]
    fn test_empty_values_fall_back() {
        let config = NotifyConfig::from_lookup(lookup_from(&[
            (ENV_HOST, ""),
            (ENV_TOPIC, ""),
            (ENV_BEARER, ""),
        ]));
        assert_eq!(config.host, "ntfy.sh");
        assert_eq!(config.topic, "spiders");
        assert_eq!(config.bearer, None);
    }

    #[test]
    fn test_url_keeps_explicit_scheme() {
        let config = NotifyConfig {
            host: "http://127.0.0.1:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url(), "http://127.0.0.1:8080/spiders");
    }

    #[test]
    fn test_default_crawler_command() {
        let crawler = CrawlerConfig::default();
        assert_eq!(crawler.command, "scrapy");
        assert_eq!(crawler.args, vec!["crawl", "{job}", "-L", "INFO"]);
    }
}
