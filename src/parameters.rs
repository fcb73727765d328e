use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use http::Method;
use url::Url;

use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::http::config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpConfig, ProxyConfig, ProxyError,
};

pub const DEFAULT_STORE_DIR: &str = "./.tms-auth";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Signs in and stores the session in the store directory.
    Login {
        #[arg(long, short, env = "TMS_USERNAME")]
        username: String,

        #[arg(long, short, env = "TMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Removes the stored session.
    Logout,
    /// Shows whether the stored session grants access, and when its access token expires.
    Status,
    /// Sends an authenticated request and prints the JSON response.
    ///
    /// Expired access tokens are refreshed on the fly; an unrecoverable session is signed out.
    Request {
        #[arg(value_enum, ignore_case = true)]
        method: HttpMethod,

        /// Path relative to the base url, e.g. `vehicles/`
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum HttpMethod {
    #[value(name = "GET")]
    Get,
    #[value(name = "POST")]
    Post,
    #[value(name = "PUT")]
    Put,
    #[value(name = "PATCH")]
    Patch,
    #[value(name = "DELETE")]
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Base url of the TMS API
    #[arg(long, global = true, env = "TMS_API_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: Url,

    /// Directory holding the stored session
    #[arg(long, global = true, env = "TMS_AUTH_STORE_DIR", default_value = DEFAULT_STORE_DIR)]
    pub store_dir: PathBuf,

    /// Seconds to wait for a credential refresh, 0 waits as long as it takes
    #[arg(long, global = true, default_value_t = 30)]
    pub refresh_timeout: u64,

    /// Proxy for API requests. Defaults to HTTPS_PROXY or HTTP_PROXY
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl ConnectionArgs {
    pub fn client_config(&self) -> Result<ClientConfig, ProxyError> {
        let proxy = ProxyConfig::new(self.proxy.as_deref().unwrap_or_default())?
            .try_with_url_from_env()?;
        let refresh_timeout = match self.refresh_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(ClientConfig::new(self.base_url.to_owned())
            .with_refresh_timeout(refresh_timeout)
            .with_http(HttpConfig::new(
                DEFAULT_REQUEST_TIMEOUT,
                DEFAULT_CONNECT_TIMEOUT,
                proxy,
            )))
    }
}
