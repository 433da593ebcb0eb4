//! In-memory runtime with scripted container behaviour, for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Error, LogConfig, Result, Runtime, RuntimeContainer};

pub(crate) const FAKE_PID: u32 = 4242;

#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    defined: Mutex<Vec<(PathBuf, String)>>,
    created: Mutex<Vec<Arc<FakeState>>>,
    logging: Mutex<Vec<LogConfig>>,
}

impl FakeRuntime {
    pub(crate) fn define(&self, path: impl Into<PathBuf>, name: &str) {
        self.defined
            .lock()
            .unwrap()
            .push((path.into(), name.to_owned()));
    }

    /// Every container object handed out so far, in creation order.
    pub(crate) fn created(&self) -> Vec<Arc<FakeState>> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn logging(&self) -> Vec<LogConfig> {
        self.logging.lock().unwrap().clone()
    }
}

impl Runtime for FakeRuntime {
    fn version(&self) -> String {
        String::from("fake-1.0")
    }

    fn list_defined_containers(&self, path: &Path) -> Vec<Box<dyn RuntimeContainer>> {
        let defined = self.defined.lock().unwrap();
        let mut created = self.created.lock().unwrap();
        defined
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, name)| {
                let state = FakeState::new(name);
                created.push(Arc::clone(&state));
                Box::new(FakeContainer(state)) as Box<dyn RuntimeContainer>
            })
            .collect()
    }

    fn init_logging(&self, config: LogConfig) -> Result<()> {
        self.logging.lock().unwrap().push(config);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub(crate) name: String,
    pub(crate) refs: AtomicUsize,
    pub(crate) config: Mutex<Vec<(String, String)>>,
    pub(crate) running_config: Mutex<HashMap<String, String>>,
    pub(crate) status: Mutex<Option<String>>,
    pub(crate) cgroup: Mutex<HashMap<String, Vec<u8>>>,
    pub(crate) ips: Mutex<Vec<String>>,
    pub(crate) started: Mutex<Option<Vec<String>>>,
    pub(crate) attached: Mutex<Option<Vec<String>>>,
    pub(crate) shutdowns: Mutex<Vec<i32>>,
    pub(crate) fail_start: AtomicBool,
}

impl FakeState {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            refs: AtomicUsize::new(1),
            ..Default::default()
        })
    }

    pub(crate) fn set_status(&self, status: Option<&str>) {
        *self.status.lock().unwrap() = status.map(str::to_owned);
    }

    pub(crate) fn set_cgroup(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.cgroup
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.into());
    }

    pub(crate) fn set_running_config(&self, key: &str, value: &str) {
        self.running_config
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn config(&self) -> Vec<(String, String)> {
        self.config.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub(crate) struct FakeContainer(pub(crate) Arc<FakeState>);

fn failure(what: &str) -> Error {
    Error::Spawn {
        program: what.to_owned(),
        source: std::io::Error::other("scripted failure"),
    }
}

impl RuntimeContainer for FakeContainer {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn set_config_item(&self, key: &str, value: &str) -> Result<()> {
        self.0
            .config
            .lock()
            .unwrap()
            .push((key.to_owned(), value.to_owned()));
        Ok(())
    }

    fn running_config_item(&self, key: &str) -> Option<String> {
        self.0.running_config.lock().unwrap().get(key).cloned()
    }

    fn start(&self, argv: &[String]) -> Result<()> {
        if self.0.fail_start.load(Ordering::Acquire) {
            return Err(failure("start"));
        }
        *self.0.started.lock().unwrap() = Some(argv.to_vec());
        self.0.set_status(Some("RUNNING"));
        Ok(())
    }

    fn attach(&self, argv: &[String]) -> Result<u32> {
        *self.0.attached.lock().unwrap() = Some(argv.to_vec());
        Ok(FAKE_PID + 1)
    }

    fn shutdown(&self, timeout: i32) -> Result<()> {
        self.0.shutdowns.lock().unwrap().push(timeout);
        self.0.set_status(Some("STOPPED"));
        Ok(())
    }

    fn init_pid(&self) -> Option<u32> {
        self.is_running().then_some(FAKE_PID)
    }

    fn is_running(&self) -> bool {
        self.state().is_some_and(|state| state != "STOPPED")
    }

    fn state(&self) -> Option<String> {
        self.0.status.lock().unwrap().clone()
    }

    fn cgroup_item(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let cgroup = self.0.cgroup.lock().unwrap();
        let value = cgroup.get(key).ok_or_else(|| failure(key))?;
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(value.len())
    }

    fn ips(&self) -> Vec<String> {
        self.0.ips.lock().unwrap().clone()
    }

    fn get(&self) {
        self.0.refs.fetch_add(1, Ordering::AcqRel);
    }

    fn put(&self) -> bool {
        self.0.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }
}
