use crate::config::Settings;
use crate::errors::DrPilotError;
use crate::structs::error_message;
use colorful::Color;
use colorful::Colorful;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

/// Dr Pilot backend client. Used by every controller to talk to the REST API.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    /// Backend base URL without a trailing slash, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Whether the client should print progress lines to the console.
    pub debug: bool,
    http: reqwest::Client,
}

/// Client options. Pass this into the `new()` function of the Client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Backend base URL, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Whether the client should print progress lines to the console.
    pub debug: bool,
}

impl Client {
    /// Creates a new client.
    pub fn new(options: ClientOptions) -> Result<Self, DrPilotError> {
        // Verify that the base URL is usable before any request goes out
        let parsed = url::Url::parse(&options.base_url)
            .map_err(|e| DrPilotError::InvalidBaseUrl(format!("{}: {}", options.base_url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DrPilotError::InvalidBaseUrl(options.base_url));
        }

        Ok(Self {
            base_url: options.base_url.trim_end_matches('/').to_string(),
            debug: options.debug,
            http: reqwest::Client::new(),
        })
    }

    /// Creates a client from loaded settings, resolving the backend URL.
    pub fn from_settings(settings: &Settings) -> Result<Self, DrPilotError> {
        Self::new(ClientOptions {
            base_url: settings.base_url(),
            debug: settings.debug,
        })
    }

    /// Full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        // Append a / to path if it does not start with one
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Query an endpoint of the backend and return the whole JSON body.
    ///
    /// Non-2xx answers become errors carrying the backend's `error`/`message`
    /// field, or `fallback` when the body has neither (`Erro <status>` without one).
    pub async fn api_call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
        fallback: Option<&str>,
    ) -> Result<Value, DrPilotError> {
        let url = self.url(path);
        debug!(%method, %url, authenticated = token.is_some(), "backend request");

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "backend unreachable");
            DrPilotError::RequestFailed(e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await?;

        // Error bodies may be empty or not JSON at all
        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => Value::Null,
                Err(e) => return Err(DrPilotError::FailedToDecode(e.to_string())),
            }
        };

        if !status.is_success() {
            let message = error_message(&data).unwrap_or_else(|| match fallback {
                Some(fallback) => fallback.to_string(),
                None => format!("Erro {}", status.as_u16()),
            });
            warn!(%method, %url, status = status.as_u16(), %message, "backend rejected request");

            return match status {
                StatusCode::UNAUTHORIZED => Err(DrPilotError::Unauthorized(message)),
                _ => Err(DrPilotError::Backend {
                    status: status.as_u16(),
                    message,
                }),
            };
        }

        debug!(%method, %url, status = status.as_u16(), "backend answered");
        Ok(data)
    }

    /// Downloads a plain-text document, e.g. a published list.
    pub async fn fetch_text(&self, url: &str) -> Result<String, DrPilotError> {
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DrPilotError::Backend {
                status: response.status().as_u16(),
                message: format!("Failed to download {}", url),
            });
        }

        Ok(response.text().await?)
    }

    /// Prints a progress line without a newline, so the result can overwrite it.
    pub(crate) fn debug_progress(&self, line: &str) {
        if !self.debug {
            return;
        }

        #[cfg(windows)]
        print!("{}", line);

        #[cfg(not(windows))]
        print!(
            "{}",
            line.gradient_with_color(Color::Cyan, Color::SpringGreen4)
        );
    }

    /// Prints a finished status line, overwriting any pending progress line.
    pub(crate) fn debug_line(&self, line: &str) {
        if !self.debug {
            return;
        }

        #[cfg(windows)]
        println!("\r{}", line);

        #[cfg(not(windows))]
        println!(
            "\r{}",
            line.gradient_with_color(Color::Cyan, Color::SpringGreen4)
        );
    }

    /// Prints a failure status line.
    pub(crate) fn debug_failure(&self, tag: &str, err: &DrPilotError) {
        if !self.debug {
            return;
        }

        #[cfg(windows)]
        println!("\r{} Failed: {}", tag, err);

        #[cfg(not(windows))]
        println!(
            "\r{} {}",
            tag.gradient_with_color(Color::Cyan, Color::SpringGreen4),
            format!("Failed: {}", err).color(Color::Red)
        );
    }
}
