//! HTTP client that resolves symbolic service URLs before sending.

use reqwest::{Client, Method, RequestBuilder};
use url::Url;

use crate::resolver::{ResolveResult, Resolver};

/// A `reqwest::Client` whose request URLs go through a [`Resolver`] first.
///
/// `http://web.billing.service/status` becomes a request to the published
/// host and port of one `web` instance; concrete URLs are sent unchanged.
#[derive(Debug, Clone)]
pub struct ResolvingClient {
    http: Client,
    resolver: Resolver,
}

impl ResolvingClient {
    pub fn new(resolver: Resolver) -> Self {
        Self::with_client(Client::new(), resolver)
    }

    pub fn with_client(http: Client, resolver: Resolver) -> Self {
        Self { http, resolver }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve `url` and start a request to the concrete address.
    pub async fn request(&self, method: Method, url: &str) -> ResolveResult<RequestBuilder> {
        let resolved = self.resolve(url).await?;
        Ok(self.http.request(method, resolved))
    }

    pub async fn get(&self, url: &str) -> ResolveResult<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    pub async fn put(&self, url: &str) -> ResolveResult<RequestBuilder> {
        self.request(Method::PUT, url).await
    }

    pub async fn post(&self, url: &str) -> ResolveResult<RequestBuilder> {
        self.request(Method::POST, url).await
    }

    pub async fn delete(&self, url: &str) -> ResolveResult<RequestBuilder> {
        self.request(Method::DELETE, url).await
    }

    async fn resolve(&self, url: &str) -> ResolveResult<Url> {
        let resolved = self.resolver.resolve_url(url).await?;
        if resolved.as_str() != url {
            tracing::debug!(url, resolved = %resolved, "Rewrote request URL");
        }
        Ok(resolved)
    }
}
