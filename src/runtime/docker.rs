//! Docker Engine HTTP API client.

use std::collections::BTreeMap;
use std::io::{BufRead as _, BufReader, Read as _};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use super::types::{ContainerDetails, ContainerSummary, CreateOptions, ListFilter};
use super::ContainerRuntime;
use crate::error::{BentoError, Result};

/// Image pulls stream for as long as the download takes.
const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct DockerEngine {
    client: Client,
    base: Url,
    request_timeout: Duration,
}

impl DockerEngine {
    /// `address` accepts `tcp://host:port`, `http(s)://host:port` or a bare `host:port`.
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self> {
        let base = normalize_address(address)?;
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| BentoError::config(format!("Invalid engine path {}: {}", path, e)))
    }

    fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response> {
        request.send().map_err(|e| {
            log::debug!("Engine request {} failed: {}", endpoint, e);
            BentoError::from(e)
        })
    }

    /// `send` with the per-request timeout clipped to `limit`. Running out of
    /// time is reported as Timeout rather than Network.
    fn send_within(
        &self,
        endpoint: &str,
        request: RequestBuilder,
        limit: Option<Duration>,
    ) -> Result<Response> {
        let Some(limit) = limit else {
            return self.send(endpoint, request);
        };
        let limit = limit.min(self.request_timeout);
        request.timeout(limit).send().map_err(|e| {
            log::debug!("Engine request {} failed within {:?}: {}", endpoint, limit, e);
            if e.is_timeout() {
                BentoError::request_timeout(endpoint, limit)
            } else {
                BentoError::from(e)
            }
        })
    }

    /// Engine error body is `{"message": "..."}`; fall back to raw text.
    fn failure(endpoint: &str, resp: Response) -> BentoError {
        let status = resp.status().as_u16();
        let text = resp.text().unwrap_or_default();
        let message = serde_json::from_str::<EngineMessage>(&text)
            .map(|m| m.message)
            .unwrap_or(text);
        BentoError::runtime_status(endpoint, status, message.trim())
    }

    /// Calls that only succeed or fail; 304 means the engine had nothing to do.
    fn container_action(&self, id: &str, endpoint: &str, request: RequestBuilder) -> Result<()> {
        let resp = self.send(endpoint, request)?;
        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_MODIFIED => Ok(()),
            StatusCode::NOT_FOUND => Err(BentoError::not_found(id)),
            _ => Err(Self::failure(endpoint, resp)),
        }
    }
}

impl ContainerRuntime for DockerEngine {
    fn create(&self, image: &str, name: &str, options: &CreateOptions) -> Result<String> {
        let mut url = self.url("containers/create")?;
        url.query_pairs_mut().append_pair("name", name);

        let body = serde_json::json!({
            "Image": image,
            "Hostname": options.hostname,
            "Labels": options.labels,
        });
        let resp = self.send("containers/create", self.client.post(url).json(&body))?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let created: CreatedContainer = resp.json()?;
                for warning in created.warnings.iter().flatten() {
                    log::warn!("Engine warning creating {}: {}", name, warning);
                }
                Ok(created.id)
            }
            StatusCode::NOT_FOUND => Err(BentoError::image_not_found(image)),
            StatusCode::CONFLICT => Err(BentoError::already_exists(name)),
            _ => Err(Self::failure("containers/create", resp)),
        }
    }

    fn start(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("containers/{}/start", id))?;
        self.container_action(id, "containers/start", self.client.post(url))
    }

    fn stop(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("containers/{}/stop", id))?;
        self.container_action(id, "containers/stop", self.client.post(url))
    }

    fn remove(&self, id: &str) -> Result<()> {
        let mut url = self.url(&format!("containers/{}", id))?;
        url.query_pairs_mut().append_pair("v", "1");
        self.container_action(id, "containers/delete", self.client.delete(url))
    }

    fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        self.inspect_within(id, None)
    }

    fn inspect_within(&self, id: &str, limit: Option<Duration>) -> Result<ContainerDetails> {
        let url = self.url(&format!("containers/{}/json", id))?;
        let resp = self.send_within("containers/inspect", self.client.get(url), limit)?;
        match resp.status() {
            StatusCode::OK => parse_inspect(resp.json()?),
            StatusCode::NOT_FOUND => Err(BentoError::not_found(id)),
            _ => Err(Self::failure("containers/inspect", resp)),
        }
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        let filters = serde_json::json!({ "label": [filter.label] });
        let mut url = self.url("containers/json")?;
        url.query_pairs_mut()
            .append_pair("all", if filter.all { "1" } else { "0" })
            .append_pair("filters", &filters.to_string());

        let resp = self.send("containers/list", self.client.get(url))?;
        if !resp.status().is_success() {
            return Err(Self::failure("containers/list", resp));
        }
        let entries: Vec<ListedContainer> = resp.json()?;
        Ok(entries.into_iter().map(ContainerSummary::from).collect())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        let url = self.url(&format!("images/{}/json", image))?;
        let resp = self.send("images/inspect", self.client.get(url))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::failure("images/inspect", resp)),
        }
    }

    fn pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<()> {
        let (repository, tag) = split_image_ref(image);
        let mut url = self.url("images/create")?;
        url.query_pairs_mut()
            .append_pair("fromImage", repository)
            .append_pair("tag", tag);

        let request = self.client.post(url).timeout(PULL_TIMEOUT);
        let resp = self.send("images/create", request)?;
        if !resp.status().is_success() {
            return Err(Self::failure("images/create", resp));
        }

        // The body is a stream of JSON objects, one per line.
        for line in BufReader::new(resp).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_pull_line(&line) {
                PullLine::Progress(message) => progress(&message),
                PullLine::Error(message) => {
                    return Err(BentoError::runtime_status("images/create", 200, message));
                }
                PullLine::Ignored => {}
            }
        }
        Ok(())
    }

    fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let mut url = self.url(&format!("containers/{}/logs", id))?;
        url.query_pairs_mut()
            .append_pair("stdout", "1")
            .append_pair("stderr", "1");
        let mut resp = self.send("containers/logs", self.client.get(url))?;
        match resp.status() {
            StatusCode::OK => {
                let mut raw = Vec::new();
                resp.read_to_end(&mut raw)?;
                Ok(demultiplex(&raw))
            }
            StatusCode::NOT_FOUND => Err(BentoError::not_found(id)),
            _ => Err(Self::failure("containers/logs", resp)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EngineMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedContainer {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<ListedContainer> for ContainerSummary {
    fn from(c: ListedContainer) -> Self {
        // Old engines report only the human readable Status ("Up 3 minutes").
        let running = match c.state.as_deref() {
            Some(state) => state == "running",
            None => c.status.as_deref().is_some_and(|s| s.starts_with("Up")),
        };
        Self {
            id: c.id,
            names: c.names,
            image: c.image,
            running,
            labels: c.labels.unwrap_or_default(),
        }
    }
}

fn normalize_address(address: &str) -> Result<Url> {
    let address = address.trim();
    let with_scheme = if let Some(rest) = address.strip_prefix("tcp://") {
        format!("http://{}", rest)
    } else if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else if address.starts_with("unix://") {
        return Err(BentoError::config(format!(
            "Unix socket engine addresses are not supported: {}",
            address
        )));
    } else {
        format!("http://{}", address)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| BentoError::config(format!("Invalid engine address {}: {}", address, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `repo[:tag]` split at the last colon that follows the last slash.
fn split_image_ref(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn str_at<'a>(doc: &'a Value, pointer: &str) -> &'a str {
    doc.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn parse_inspect(doc: Value) -> Result<ContainerDetails> {
    let id = str_at(&doc, "/Id").to_string();
    if id.is_empty() {
        return Err(BentoError::runtime("Inspect response without container id"));
    }

    // Containers on user-defined networks only report per-network addresses.
    let mut ip_address = str_at(&doc, "/NetworkSettings/IPAddress").to_string();
    if ip_address.is_empty() {
        if let Some(networks) = doc
            .pointer("/NetworkSettings/Networks")
            .and_then(Value::as_object)
        {
            ip_address = networks
                .values()
                .filter_map(|n| n.get("IPAddress").and_then(Value::as_str))
                .find(|a| !a.is_empty())
                .unwrap_or_default()
                .to_string();
        }
    }

    let labels = doc
        .pointer("/Config/Labels")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let created_at = DateTime::parse_from_rfc3339(str_at(&doc, "/Created"))
        .ok()
        .map(|t| t.with_timezone(&Utc));

    Ok(ContainerDetails {
        id,
        name: str_at(&doc, "/Name").trim_start_matches('/').to_string(),
        image: str_at(&doc, "/Config/Image").to_string(),
        running: doc
            .pointer("/State/Running")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        hostname: str_at(&doc, "/Config/Hostname").to_string(),
        ip_address,
        labels,
        created_at,
        raw: doc,
    })
}

#[derive(Debug, PartialEq, Eq)]
enum PullLine {
    Progress(String),
    Error(String),
    Ignored,
}

fn parse_pull_line(line: &str) -> PullLine {
    let Ok(doc) = serde_json::from_str::<Value>(line) else {
        return PullLine::Progress(line.trim().to_string());
    };
    if let Some(err) = doc.get("error").and_then(Value::as_str) {
        return PullLine::Error(err.to_string());
    }
    if let Some(stream) = doc.get("stream").and_then(Value::as_str) {
        return PullLine::Progress(stream.trim_end().to_string());
    }
    let status = doc.get("status").and_then(Value::as_str);
    let id = doc.get("id").and_then(Value::as_str);
    let detail = doc.get("progress").and_then(Value::as_str);
    match (status, id, detail) {
        (Some(s), Some(id), Some(p)) => PullLine::Progress(format!("{}: {} {}", id, s, p)),
        (Some(s), Some(id), None) => PullLine::Progress(format!("{}: {}", id, s)),
        (Some(s), None, _) => PullLine::Progress(s.to_string()),
        _ => PullLine::Ignored,
    }
}

/// Strip the 8-byte stream frame headers the engine adds when the container
/// has no TTY. Output that does not look framed is returned as-is.
fn demultiplex(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while !rest.is_empty() {
        if rest.len() < 8 || rest[0] > 2 || rest[1..4] != [0, 0, 0] {
            return raw.to_vec();
        }
        let size = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let Some(frame) = rest.get(8..8 + size) else {
            return raw.to_vec();
        };
        out.extend_from_slice(frame);
        rest = &rest[8 + size..];
    }
    out
}
