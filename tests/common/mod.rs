//! In-memory runtime and supervisor fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bento_cluster::events::RecordingSink;
use bento_cluster::hosts::{HostsFileSynchronizer, HostsWriter, PrivilegedHostsWriter, WriteOutcome};
use bento_cluster::runtime::{
    ContainerDetails, ContainerRuntime, ContainerSummary, CreateOptions, ListFilter,
};
use bento_cluster::{BentoContext, BentoError, BentoSystem, Result, ServiceSupervisor, Settings};
use tempfile::TempDir;

pub const IMAGE: &str = "kijiproject/bento-cluster:cdh5.0.3";

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub hostname: String,
    pub ip_address: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    images: BTreeSet<String>,
    calls: Vec<String>,
    next_id: u32,
    ignore_stop: bool,
    inspect_limits: Vec<Option<Duration>>,
}

impl FakeState {
    fn find_mut(&mut self, id: &str) -> Option<&mut FakeContainer> {
        self.containers
            .values_mut()
            .find(|c| c.id == id || c.name == id)
    }
}

/// Engine stand-in. Containers get an address when started and keep it.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    /// Register a container directly, bypassing `create`.
    pub fn insert(&self, container: FakeContainer) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(container.name.clone(), container);
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn set_running(&self, name: &str, running: bool) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.running = running;
        }
    }

    /// Make `stop` a no-op, as if the container ignored the signal.
    pub fn ignore_stop(&self) {
        self.state.lock().unwrap().ignore_stop = true;
    }

    /// Limits passed to `inspect_within`, in call order.
    pub fn inspect_limits(&self) -> Vec<Option<Duration>> {
        self.state.lock().unwrap().inspect_limits.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create(&self, image: &str, name: &str, options: &CreateOptions) -> Result<String> {
        self.record(format!("create:{}", name));
        let mut state = self.state.lock().unwrap();
        if !state.images.contains(image) {
            return Err(BentoError::image_not_found(image));
        }
        if state.containers.contains_key(name) {
            return Err(BentoError::already_exists(name));
        }
        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                image: image.to_string(),
                running: false,
                hostname: options.hostname.clone(),
                ip_address: String::new(),
                labels: options.labels.clone(),
            },
        );
        Ok(id)
    }

    fn start(&self, id: &str) -> Result<()> {
        self.record(format!("start:{}", id));
        let mut state = self.state.lock().unwrap();
        let n = state.containers.len() + 1;
        let c = state.find_mut(id).ok_or_else(|| BentoError::not_found(id))?;
        c.running = true;
        if c.ip_address.is_empty() {
            c.ip_address = format!("172.17.0.{}", n);
        }
        Ok(())
    }

    fn stop(&self, id: &str) -> Result<()> {
        self.record(format!("stop:{}", id));
        let mut state = self.state.lock().unwrap();
        let ignore = state.ignore_stop;
        let c = state.find_mut(id).ok_or_else(|| BentoError::not_found(id))?;
        if !ignore {
            c.running = false;
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.record(format!("remove:{}", id));
        let mut state = self.state.lock().unwrap();
        let name = state
            .find_mut(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| BentoError::not_found(id))?;
        state.containers.remove(&name);
        Ok(())
    }

    fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let mut state = self.state.lock().unwrap();
        let c = state.find_mut(id).ok_or_else(|| BentoError::not_found(id))?;
        Ok(ContainerDetails {
            id: c.id.clone(),
            name: c.name.clone(),
            image: c.image.clone(),
            running: c.running,
            hostname: c.hostname.clone(),
            ip_address: c.ip_address.clone(),
            labels: c.labels.clone(),
            created_at: None,
            raw: serde_json::json!({ "Id": c.id, "Name": format!("/{}", c.name) }),
        })
    }

    fn inspect_within(&self, id: &str, limit: Option<Duration>) -> Result<ContainerDetails> {
        self.state.lock().unwrap().inspect_limits.push(limit);
        self.inspect(id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>> {
        let (key, value) = filter.label.split_once('=').unwrap_or((filter.label.as_str(), ""));
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|c| filter.all || c.running)
            .filter(|c| c.labels.get(key).is_some_and(|v| value.is_empty() || v == value))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.image.clone(),
                running: c.running,
                labels: c.labels.clone(),
            })
            .collect())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    fn pull(&self, image: &str, progress: &mut dyn FnMut(&str)) -> Result<()> {
        self.record(format!("pull:{}", image));
        progress("Pulling fs layer");
        progress("Download complete");
        self.state.lock().unwrap().images.insert(image.to_string());
        Ok(())
    }

    fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        let c = state.find_mut(id).ok_or_else(|| BentoError::not_found(id))?;
        Ok(format!("supervisord started in {}\n", c.name).into_bytes())
    }
}

/// Supervisor whose services come up at a fixed instant.
#[derive(Default)]
pub struct FakeSupervisor {
    ready_at: Mutex<Option<Instant>>,
    queries: AtomicUsize,
    limits: Mutex<Vec<Option<Duration>>>,
}

impl FakeSupervisor {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn always() -> Self {
        let supervisor = Self::default();
        supervisor.ready_after(Duration::ZERO);
        supervisor
    }

    pub fn ready_after(&self, delay: Duration) {
        *self.ready_at.lock().unwrap() = Some(Instant::now() + delay);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn limits(&self) -> Vec<Option<Duration>> {
        self.limits.lock().unwrap().clone()
    }
}

impl ServiceSupervisor for FakeSupervisor {
    fn services_ready(&self, _address: &str, limit: Option<Duration>) -> Result<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        Ok(self
            .ready_at
            .lock()
            .unwrap()
            .is_some_and(|at| Instant::now() >= at))
    }
}

pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub supervisor: Arc<FakeSupervisor>,
    pub sink: Arc<RecordingSink>,
    pub system: BentoSystem,
    pub dir: TempDir,
}

impl Harness {
    pub fn hosts_path(&self) -> std::path::PathBuf {
        self.dir.path().join("hosts")
    }

    pub fn config_root(&self) -> std::path::PathBuf {
        self.dir.path().join("conf")
    }
}

/// Hosts writer without write access: everything goes through the helper.
pub struct HelperOnly(pub PrivilegedHostsWriter);

impl HostsWriter for HelperOnly {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<WriteOutcome> {
        self.0.delegate(path, contents)
    }
}

pub fn harness(supervisor: FakeSupervisor) -> Harness {
    harness_with_hosts(supervisor, HostsFileSynchronizer::default())
}

pub fn harness_with_hosts(supervisor: FakeSupervisor, hosts: HostsFileSynchronizer) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        hosts_file: Some(dir.path().join("hosts")),
        client_config_root: Some(dir.path().join("conf")),
        poll_interval_ms: 10,
        timeout_ms: 500,
        ..Settings::default()
    };

    let runtime = Arc::new(FakeRuntime::new().with_image(IMAGE));
    let supervisor = Arc::new(supervisor);
    let sink = Arc::new(RecordingSink::new());
    let context = BentoContext::new(
        settings,
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        Arc::clone(&supervisor) as Arc<dyn ServiceSupervisor>,
        Arc::clone(&sink) as Arc<dyn bento_cluster::EventSink>,
        hosts,
    )
    .unwrap();

    Harness {
        runtime,
        supervisor,
        sink,
        system: BentoSystem::new(context),
        dir,
    }
}

pub fn container(name: &str, running: bool) -> FakeContainer {
    FakeContainer {
        id: format!("id-{}", name),
        name: name.to_string(),
        image: IMAGE.to_string(),
        running,
        hostname: name.to_string(),
        ip_address: if running { "172.17.0.40".to_string() } else { String::new() },
        labels: BTreeMap::from([
            ("org.kiji.bento.managed".to_string(), "true".to_string()),
            ("org.kiji.bento.platform-version".to_string(), "cdh5.0.3".to_string()),
        ]),
    }
}

/// A container the user runs for something else: same engine, no bento label.
pub fn unmanaged(name: &str, image: &str) -> FakeContainer {
    FakeContainer {
        id: format!("id-{}", name),
        name: name.to_string(),
        image: image.to_string(),
        running: true,
        hostname: name.to_string(),
        ip_address: "172.17.0.50".to_string(),
        labels: BTreeMap::new(),
    }
}
