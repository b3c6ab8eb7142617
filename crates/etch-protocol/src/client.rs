//! HTTP client for a remote authority.

use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use crate::request::EncodeOptions;
use crate::{Error, Facts, RequestState, Resolver, Response, Result, RunReport, Signer};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Talks to an authority's `files` and `results` endpoints.
#[derive(Debug)]
pub struct HttpResolver {
    files_url: Url,
    results_url: Url,
    client: Client,
    signer: Signer,
    debug: bool,
    tag: Option<String>,
}

impl HttpResolver {
    pub fn new(server: &str, signer: Signer) -> Result<Self> {
        let base = server.trim_end_matches('/');
        let endpoint = |name: &str| {
            let raw = format!("{base}/{name}");
            Url::parse(&raw).map_err(|e| Error::InvalidUrl {
                url: raw,
                message: e.to_string(),
            })
        };
        // Transport defaults govern timeouts.
        let client = Client::builder()
            .user_agent(concat!("etch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| Error::Transport {
                url: server.to_string(),
                source,
            })?;

        Ok(Self {
            files_url: endpoint("files")?,
            results_url: endpoint("results")?,
            client,
            signer,
            debug: false,
            tag: None,
        })
    }

    /// Ask the authority for verbose generation output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    fn post(&self, url: &Url, body: &str) -> Result<String> {
        let (body, authorization) = self.signer.seal(body, Utc::now())?;

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }

        tracing::debug!(%url, signed = self.signer.is_signing(), "Posting to authority");
        let response = request.send().map_err(|source| Error::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let text = response.text().map_err(|source| Error::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

impl Resolver for HttpResolver {
    fn resolve(&self, facts: &Facts, request: &RequestState) -> Result<Response> {
        let body = request.encode(
            facts,
            &EncodeOptions {
                debug: self.debug,
                tag: self.tag.as_deref(),
            },
        );
        let text = self.post(&self.files_url, &body)?;
        Response::parse(&text)
    }

    fn report(&self, report: &RunReport) -> Result<()> {
        self.post(&self.results_url, &report.encode())?;
        Ok(())
    }
}
