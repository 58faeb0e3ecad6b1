// ABOUTME: In-memory EngineApi for exercising the local runtime without a daemon.
// ABOUTME: Containers exit when told to; exec understands a handful of commands.

use async_trait::async_trait;
use berth::ExecOutput;
use berth::logs::LineStream;
use berth::runtime::local::{ContainerStatus, CreateRequest, EngineApi, EngineError};
use berth::types::{ContainerId, ImageRef};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;

use super::tarball::{self, Files};

pub struct FakeContainer {
    pub id: String,
    pub request: CreateRequest,
    pub running: bool,
    pub files: Files,
    exit: watch::Sender<Option<i64>>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    images: HashSet<String>,
    pulled: Vec<String>,
    containers: BTreeMap<String, FakeContainer>,
    removed: Vec<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
    logs: Mutex<Vec<String>>,
    exit_on_start: Mutex<Option<i64>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().images.insert(image.to_string());
        self
    }

    /// Lines every followed log stream yields.
    pub fn with_logs<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.logs.lock() = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Containers exit with `code` as soon as they start.
    pub fn exit_on_start(self, code: i64) -> Self {
        *self.exit_on_start.lock() = Some(code);
        self
    }

    /// Seed a leftover container with `name`.
    pub fn with_stale(self, name: &str) -> Self {
        {
            let mut state = self.state.lock();
            let (exit, _) = watch::channel(None);
            state.containers.insert(
                "stale".to_string(),
                FakeContainer {
                    id: "stale".to_string(),
                    request: CreateRequest {
                        name: name.to_string(),
                        ..CreateRequest::default()
                    },
                    running: true,
                    files: Files::new(),
                    exit,
                },
            );
        }
        self
    }

    /// Make a running container exit with `code`.
    pub fn exit(&self, name: &str, code: i64) {
        let mut state = self.state.lock();
        if let Some(c) = find_mut(&mut state.containers, name) {
            c.running = false;
            let _ = c.exit.send(Some(code));
        }
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    pub fn request(&self, name: &str) -> Option<CreateRequest> {
        let mut state = self.state.lock();
        find_mut(&mut state.containers, name).map(|c| c.request.clone())
    }

    pub fn file(&self, name: &str, path: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        find_mut(&mut state.containers, name).and_then(|c| c.files.get(path).cloned())
    }

    pub fn is_running(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        find_mut(&mut state.containers, name).is_some_and(|c| c.running)
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

fn find_mut<'a>(
    containers: &'a mut BTreeMap<String, FakeContainer>,
    id_or_name: &str,
) -> Option<&'a mut FakeContainer> {
    let key = containers
        .iter()
        .find(|(id, c)| id.as_str() == id_or_name || c.request.name == id_or_name)
        .map(|(id, _)| id.clone())?;
    containers.get_mut(&key)
}

fn not_found(id: &str) -> EngineError {
    EngineError::NotFound(id.to_string())
}

#[async_trait]
impl EngineApi for FakeEngine {
    async fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError> {
        Ok(self.state.lock().images.contains(&image.to_string()))
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.images.insert(image.to_string());
        state.pulled.push(image.to_string());
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<ContainerId, EngineError> {
        let mut state = self.state.lock();
        if state.containers.values().any(|c| c.request.name == request.name) {
            return Err(EngineError::AlreadyExists(request.name.clone()));
        }
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        let (exit, _) = watch::channel(None);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                request: request.clone(),
                running: false,
                files: Files::new(),
                exit,
            },
        );
        state.calls.push(format!("create {}", request.name));
        Ok(ContainerId::new(id))
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("start {id}"));
        let exit_code = *self.exit_on_start.lock();
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        if c.running {
            return Err(EngineError::AlreadyRunning(id.to_string()));
        }
        c.running = true;
        if let Some(code) = exit_code {
            c.running = false;
            let _ = c.exit.send(Some(code));
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), EngineError> {
        self.record(format!("stop {id}"));
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        if !c.running {
            return Err(EngineError::NotRunning(id.to_string()));
        }
        c.running = false;
        let _ = c.exit.send(Some(143));
        Ok(())
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("kill {id}"));
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        if !c.running {
            return Err(EngineError::NotRunning(id.to_string()));
        }
        c.running = false;
        let _ = c.exit.send(Some(137));
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        if c.running && !force {
            return Err(EngineError::StillRunning(id.to_string()));
        }
        let key = c.id.clone();
        state.containers.remove(&key);
        state.removed.push(key);
        state.calls.push(format!("remove {id}"));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus, EngineError> {
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        Ok(ContainerStatus {
            id: c.id.clone(),
            running: c.running,
            exit_code: *c.exit.borrow(),
            ip_address: Some("172.17.0.2".to_string()),
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let mut rx = {
            let mut state = self.state.lock();
            let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
            c.exit.subscribe()
        };
        loop {
            if let Some(code) = *rx.borrow_and_update() {
                return Ok(code);
            }
            if rx.changed().await.is_err() {
                return Err(not_found(id));
            }
        }
    }

    async fn exec(
        &self,
        id: &str,
        command: &[String],
        _tty: bool,
        working_dir: Option<&str>,
        _stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, EngineError> {
        if !self.is_running(id) {
            return Err(EngineError::NotRunning(id.to_string()));
        }
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::Exec("empty command".into()))?;
        let (exit_code, stdout) = match program.as_str() {
            "echo" => (0, format!("{}\n", args.join(" "))),
            "pwd" => (0, format!("{}\n", working_dir.unwrap_or("/"))),
            "sh" => (0, "out\nerr\n".to_string()),
            "false" => (1, String::new()),
            "sleep" => {
                std::future::pending::<()>().await;
                (0, String::new())
            }
            other => (127, format!("{other}: not found\n")),
        };
        Ok(ExecOutput {
            exit_code,
            stdout: stdout.into_bytes(),
            stderr: None,
        })
    }

    async fn upload_archive(
        &self,
        id: &str,
        dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        tarball::extract(&mut c.files, dir, &archive)
            .map_err(|e| EngineError::Archive(e.to_string()))
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let mut state = self.state.lock();
        let c = find_mut(&mut state.containers, id).ok_or_else(|| not_found(id))?;
        tarball::archive(&c.files, path).ok_or_else(|| not_found(path))
    }

    fn follow_logs(&self, _id: &str) -> LineStream {
        let lines: Vec<_> = self.logs.lock().iter().cloned().map(Ok).collect();
        futures::stream::iter(lines).boxed()
    }
}
