//! The `http` task: one outbound fetch, response body as the result.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Context;
use pipestep_core::config::EngineConfig;
use pipestep_core::convert::to_bool;
use pipestep_core::{Environment, NativeValue};
use reqwest::redirect::{Attempt, Policy};
use reqwest::{Method, Url};

use super::interpolate;
use super::TaskError;
use crate::resolver::HttpOptions;

const MAX_REDIRECTS: usize = 10;

/// One client per network policy. The guarded client refuses redirects into
/// restricted addresses; the open one follows any redirect.
#[derive(Clone)]
pub struct Clients {
    guarded: reqwest::Client,
    open: reqwest::Client,
    max_response_bytes: usize,
}

impl Clients {
    pub fn new(settings: &EngineConfig) -> anyhow::Result<Self> {
        let build = |policy: Policy| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.http_timeout_secs))
                .user_agent(settings.user_agent.clone())
                .redirect(policy)
                .build()
                .context("failed to build http client")
        };
        Ok(Self {
            guarded: build(Policy::custom(guarded_redirect))?,
            open: build(Policy::limited(MAX_REDIRECTS))?,
            max_response_bytes: settings.http_max_response_bytes,
        })
    }
}

fn guarded_redirect(attempt: Attempt) -> reqwest::redirect::Action {
    if attempt.previous().len() >= MAX_REDIRECTS {
        attempt.error(format!("more than {MAX_REDIRECTS} redirects"))
    } else if is_restricted(attempt.url()) {
        let msg = format!(
            "redirect to local address {} refused; set allowUnrestrictedNetworkAccess to follow it",
            attempt.url().host_str().unwrap_or_default()
        );
        attempt.error(msg)
    } else {
        attempt.follow()
    }
}

pub async fn fetch(
    clients: &Clients,
    opts: &HttpOptions,
    env: &Environment,
) -> Result<NativeValue, TaskError> {
    let max_response_bytes = clients.max_response_bytes;
    let method = match opts.method.trim() {
        "" => Method::GET,
        m => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| TaskError::InvalidInput(format!("invalid method {m:?}")))?,
    };

    let url = interpolate::value(&opts.url, env)?
        .ok_or_else(|| TaskError::MissingOption("url".to_string()))?
        .to_string();
    let url = Url::parse(&url).map_err(|e| TaskError::InvalidInput(format!("invalid url {url:?}: {e}")))?;

    let unrestricted = match opts.allow_unrestricted_network_access.trim() {
        "" => false,
        s => to_bool(s).map_err(|e| TaskError::InvalidInput(e.to_string()))?,
    };
    if !unrestricted && is_restricted(&url) {
        return Err(TaskError::Http(format!(
            "{} is a local address; set allowUnrestrictedNetworkAccess to reach it",
            url.host_str().unwrap_or_default()
        )));
    }

    let client = if unrestricted { &clients.open } else { &clients.guarded };
    let mut request = client.request(method.clone(), url.clone());
    for (name, value) in headers(&opts.headers, env)? {
        request = request.header(name, value);
    }
    if let Some(body) = interpolate::json(&opts.request_data, env)? {
        request = request.json(&body.to_json());
    }

    tracing::debug!(%method, %url, "http task request");

    let mut response = request
        .send()
        .await
        .map_err(|e| TaskError::Http(format!("request to {url} failed: {e}")))?;
    let status = response.status();

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TaskError::Http(format!("reading response from {url} failed: {e}")))?
    {
        if body.len() + chunk.len() > max_response_bytes {
            return Err(TaskError::Http(format!(
                "response from {url} exceeds {max_response_bytes} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    let body = String::from_utf8_lossy(&body).into_owned();

    if !status.is_success() {
        return Err(TaskError::Http(format!("{url} returned {status}: {body}")));
    }
    Ok(NativeValue::String(body))
}

/// Header pairs from a JSON object or a flat `[name, value, ...]` array.
fn headers(raw: &str, env: &Environment) -> Result<Vec<(String, String)>, TaskError> {
    let text = |v: &NativeValue| v.as_text().map(str::to_string).unwrap_or_else(|| v.to_string());
    match interpolate::json(raw, env)? {
        None => Ok(Vec::new()),
        Some(NativeValue::Map(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), text(v))).collect()),
        Some(NativeValue::Array(items)) if items.len() % 2 == 0 => Ok(items
            .chunks(2)
            .map(|pair| (text(&pair[0]), text(&pair[1])))
            .collect()),
        Some(_) => Err(TaskError::InvalidInput(
            "headers must be an object or an even-length array".to_string(),
        )),
    }
}

/// Loopback, private and link-local targets need explicit permission.
/// Only literal addresses and `localhost` are checked; names are not resolved.
fn is_restricted(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return true;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) => restricted_ip(ip),
        Err(_) => host.eq_ignore_ascii_case("localhost") || host.ends_with(".localhost"),
    }
}

fn restricted_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return restricted_ip(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
