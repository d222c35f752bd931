//! Anti-forgery token lookup.
//!
//! Sources are tried in order (cookie, page metadata, form field) and the
//! first non-empty token wins.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use tracing::warn;
use url::Url;

/// One place an anti-forgery token may be found.
pub trait TokenSource {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    /// The token, if this source has one.
    fn lookup(&self) -> Option<String>;
}

/// Reads a named cookie from the HTTP client's cookie jar.
pub struct CookieTokenSource {
    jar: Arc<Jar>,
    url: Url,
    cookie: String,
}

impl CookieTokenSource {
    /// Look for `cookie` among the cookies the jar would send to `url`.
    #[must_use]
    pub fn new(jar: Arc<Jar>, url: Url, cookie: impl Into<String>) -> Self {
        Self {
            jar,
            url,
            cookie: cookie.into(),
        }
    }
}

impl TokenSource for CookieTokenSource {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn lookup(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie).then(|| value.to_string())
        })
    }
}

/// Token published by the page in its metadata (`<meta name="csrf-token">`).
pub struct MetaTagTokenSource(pub Option<String>);

impl TokenSource for MetaTagTokenSource {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn lookup(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token embedded in a hidden form field (`csrfmiddlewaretoken`).
pub struct FormFieldTokenSource(pub Option<String>);

impl TokenSource for FormFieldTokenSource {
    fn name(&self) -> &'static str {
        "form"
    }

    fn lookup(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Ordered chain of token sources.
#[derive(Default)]
pub struct CsrfResolver {
    sources: Vec<Box<dyn TokenSource>>,
}

impl CsrfResolver {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source at the end of the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl TokenSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// First non-empty token, or an empty string when nothing matches.
    #[must_use]
    pub fn resolve(&self) -> String {
        for source in &self.sources {
            if let Some(token) = source.lookup().filter(|t| !t.is_empty()) {
                tracing::trace!("CSRF token resolved from {}", source.name());
                return token;
            }
        }
        warn!("CSRF token not found");
        String::new()
    }
}
