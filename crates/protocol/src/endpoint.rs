use al_domain::error::{Error, Result};

const USER_AUTH_TOKENS_PATH: &str = "/user/auth/tokens";

/// API origin with the scheme stripped; `tls` picks `wss`/`https` over
/// `ws`/`http` when URIs are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    host: String,
    tls: bool,
}

impl ApiEndpoint {
    /// Parse `https://host[:port]`, `http://…`, `wss://…`, `ws://…` or a bare
    /// `host[:port]` (TLS).  A trailing `/` is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim().trim_end_matches('/');
        let (tls, host) = match raw.split_once("://") {
            Some(("https" | "wss", rest)) => (true, rest),
            Some(("http" | "ws", rest)) => (false, rest),
            Some((scheme, _)) => {
                return Err(Error::Config(format!("unsupported API scheme: {scheme}")));
            }
            None => (true, raw),
        };
        if host.is_empty() {
            return Err(Error::InvalidArgument("API endpoint has no host".into()));
        }
        Ok(Self {
            host: host.to_owned(),
            tls,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn uses_tls(&self) -> bool {
        self.tls
    }

    /// `{ws|wss}://{host}/user/agents/{agent_id}/ws?token={access_token}`
    pub fn agent_ws_uri(&self, agent_id: &str, access_token: &str) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}/user/agents/{agent_id}/ws?token={access_token}",
            self.host
        )
    }

    /// `{http|https}://{host}/user/auth/tokens`
    pub fn token_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}{USER_AUTH_TOKENS_PATH}", self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_endpoint_builds_secure_uris() {
        let ep = ApiEndpoint::parse("https://api.example.com").unwrap();
        assert!(ep.uses_tls());
        assert_eq!(
            ep.agent_ws_uri("agent-1", "tok"),
            "wss://api.example.com/user/agents/agent-1/ws?token=tok"
        );
        assert_eq!(ep.token_url(), "https://api.example.com/user/auth/tokens");
    }

    #[test]
    fn plaintext_endpoint_with_port() {
        let ep = ApiEndpoint::parse("http://127.0.0.1:8080/").unwrap();
        assert!(!ep.uses_tls());
        assert_eq!(ep.host(), "127.0.0.1:8080");
        assert_eq!(
            ep.agent_ws_uri("a", "t"),
            "ws://127.0.0.1:8080/user/agents/a/ws?token=t"
        );
        assert_eq!(ep.token_url(), "http://127.0.0.1:8080/user/auth/tokens");
    }

    #[test]
    fn bare_host_defaults_to_tls() {
        let ep = ApiEndpoint::parse("api.example.com").unwrap();
        assert!(ep.uses_tls());
        assert_eq!(ep.host(), "api.example.com");
    }

    #[test]
    fn unknown_scheme_and_empty_host_rejected() {
        assert!(matches!(
            ApiEndpoint::parse("ftp://x"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ApiEndpoint::parse("https://"),
            Err(Error::InvalidArgument(_))
        ));
    }
}
