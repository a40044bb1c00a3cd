//! Readiness signal from the process supervisor running inside a bento.
//!
//! The bento image runs supervisord with its XML-RPC interface on port 9001.
//! A bento is ready when every required program is in its expected state.

use std::time::Duration;

use reqwest::blocking::Client;
use roxmltree::{Document, Node};

use crate::config::{RequiredService, ServiceExpectation};
use crate::error::{BentoError, Result};

const GET_ALL_PROCESS_INFO: &str = "<?xml version=\"1.0\"?>\
<methodCall><methodName>supervisor.getAllProcessInfo</methodName><params></params></methodCall>";

/// Live readiness query against a running container.
pub trait ServiceSupervisor: Send + Sync {
    /// True when all required services are up. An unreachable supervisor is
    /// not an error, just not ready yet.
    ///
    /// `limit` bounds the query; poll loops pass what is left of their budget.
    fn services_ready(&self, address: &str, limit: Option<Duration>) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub statename: String,
    pub exitstatus: i32,
}

impl ProcessInfo {
    fn satisfies(&self, expect: ServiceExpectation) -> bool {
        match expect {
            ServiceExpectation::Running => self.statename == "RUNNING",
            ServiceExpectation::Exited { exit_status } => {
                self.statename == "EXITED" && self.exitstatus == exit_status
            }
        }
    }
}

/// Logical AND over `required`; a service missing from `processes` is down.
pub fn all_satisfied(processes: &[ProcessInfo], required: &[RequiredService]) -> bool {
    required.iter().all(|service| {
        processes
            .iter()
            .find(|p| p.name == service.name)
            .is_some_and(|p| p.satisfies(service.expect))
    })
}

pub struct SupervisordClient {
    client: Client,
    port: u16,
    required: Vec<RequiredService>,
    request_timeout: Duration,
}

impl SupervisordClient {
    pub fn new(port: u16, required: Vec<RequiredService>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            port,
            required,
            request_timeout,
        })
    }

    /// Call `supervisor.getAllProcessInfo` on the bento at `address`, giving
    /// up after `limit` or the client's request timeout, whichever is shorter.
    pub fn process_info(&self, address: &str, limit: Option<Duration>) -> Result<Vec<ProcessInfo>> {
        let url = format!("http://{}:{}/RPC2", address, self.port);
        let timeout = limit.map_or(self.request_timeout, |l| l.min(self.request_timeout));
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(GET_ALL_PROCESS_INFO)
            .timeout(timeout)
            .send()?;
        if !resp.status().is_success() {
            return Err(BentoError::supervisor(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }
        parse_process_info(&resp.text()?)
    }
}

impl ServiceSupervisor for SupervisordClient {
    fn services_ready(&self, address: &str, limit: Option<Duration>) -> Result<bool> {
        if address.is_empty() {
            return Ok(false);
        }
        match self.process_info(address, limit) {
            Ok(processes) => Ok(all_satisfied(&processes, &self.required)),
            Err(e) if e.kind() == crate::error::ErrorKind::Network => {
                log::debug!("Supervisor at {} not reachable yet: {}", address, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

/// Scalar inside a `<value>`: typed child element or bare text.
fn scalar(value: Node<'_, '_>) -> Option<String> {
    match value.first_element_child() {
        Some(typed) => Some(typed.text().unwrap_or_default().to_string()),
        None => value.text().map(str::to_string),
    }
}

fn struct_member(strukt: Node<'_, '_>, name: &str) -> Option<String> {
    strukt
        .children()
        .filter(|n| n.has_tag_name("member"))
        .find(|m| child(*m, "name").and_then(|n| n.text()) == Some(name))
        .and_then(|m| child(m, "value"))
        .and_then(scalar)
}

pub fn parse_process_info(body: &str) -> Result<Vec<ProcessInfo>> {
    let doc = Document::parse(body)
        .map_err(|e| BentoError::supervisor(format!("Malformed XML-RPC response: {}", e)))?;
    let response = doc.root_element();
    if !response.has_tag_name("methodResponse") {
        return Err(BentoError::supervisor("Missing methodResponse element"));
    }

    if let Some(fault) = child(response, "fault") {
        let detail = child(fault, "value")
            .and_then(|v| child(v, "struct"))
            .and_then(|s| struct_member(s, "faultString"))
            .unwrap_or_default();
        return Err(BentoError::supervisor(format!("Fault: {}", detail)));
    }

    let data = child(response, "params")
        .and_then(|n| child(n, "param"))
        .and_then(|n| child(n, "value"))
        .and_then(|n| child(n, "array"))
        .and_then(|n| child(n, "data"))
        .ok_or_else(|| BentoError::supervisor("Response is not an array"))?;

    let mut processes = Vec::new();
    for value in data.children().filter(|n| n.has_tag_name("value")) {
        let Some(strukt) = child(value, "struct") else {
            continue;
        };
        let name = struct_member(strukt, "name").unwrap_or_default();
        let statename = struct_member(strukt, "statename").unwrap_or_default();
        let exitstatus = struct_member(strukt, "exitstatus")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        processes.push(ProcessInfo {
            name,
            statename,
            exitstatus,
        });
    }
    Ok(processes)
}
