//! In-memory runtime gateway
//!
//! Mirrors the observable behaviour of the docker CLI closely enough to drive
//! the orchestrator, scaler and rollback flows without a container runtime:
//! names are unique, running units cannot be removed without force, renames
//! onto a taken name fail. Every mutating call is recorded, and failures or
//! health results can be scripted per unit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::DockyardError;
use crate::runtime::{ContainerRuntime, ContainerSpec, HealthState, ManagedContainer, RestartPolicy};

/// Observable state of one simulated unit
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContainer {
    pub image: String,
    pub running: bool,
    pub paused: bool,
    pub restart_policy: RestartPolicy,
    pub health: HealthState,
    pub labelled: bool,
    pub spec: Option<ContainerSpec>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, MemoryContainer>,
    images: HashSet<String>,
    health_on_create: HashMap<String, HealthState>,
    exits_on_create: HashSet<String>,
    failures: HashSet<(String, String)>,
    failures_once: HashSet<(String, String)>,
    calls: Vec<String>,
}

/// Runtime gateway holding its units in memory
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an image as present locally
    pub fn add_image(&self, image: &str) {
        self.lock().images.insert(image.to_string());
    }

    /// Insert a running unit without recording a call
    pub fn seed_running(&self, name: &str, image: &str, labelled: bool) {
        self.lock().containers.insert(
            name.to_string(),
            MemoryContainer {
                image: image.to_string(),
                running: true,
                paused: false,
                restart_policy: RestartPolicy::Always,
                health: HealthState::Healthy,
                labelled,
                spec: None,
            },
        );
    }

    /// Health reported for a unit; applies to a live unit now, or to the
    /// next unit created with this name
    pub fn set_health(&self, name: &str, health: HealthState) {
        let mut state = self.lock();
        if let Some(container) = state.containers.get_mut(name) {
            container.health = health;
        }
        state.health_on_create.insert(name.to_string(), health);
    }

    /// Units created with this name exit right after starting
    pub fn exit_on_create(&self, name: &str) {
        self.lock().exits_on_create.insert(name.to_string());
    }

    /// Make every future `op` call against `name` fail
    pub fn fail_on(&self, op: &str, name: &str) {
        self.lock()
            .failures
            .insert((op.to_string(), name.to_string()));
    }

    /// Make only the next `op` call against `name` fail
    pub fn fail_next(&self, op: &str, name: &str) {
        self.lock()
            .failures_once
            .insert((op.to_string(), name.to_string()));
    }

    /// Snapshot of a unit
    pub fn container(&self, name: &str) -> Option<MemoryContainer> {
        self.lock().containers.get(name).cloned()
    }

    /// Names of all units, sorted
    pub fn names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// Mutating calls in order, formatted as `"{op} {args}"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn mutate<T>(
        &self,
        op: &'static str,
        name: &str,
        call: String,
        f: impl FnOnce(&mut State) -> Result<T, String>,
    ) -> Result<T, DockyardError> {
        let mut state = self.lock();
        state.calls.push(call);
        let key = (op.to_string(), name.to_string());
        if state.failures_once.remove(&key) || state.failures.contains(&key) {
            return Err(DockyardError::runtime(op, name, "injected failure"));
        }
        f(&mut state).map_err(|output| DockyardError::runtime(op, name, output))
    }
}

fn no_such(name: &str) -> String {
    format!("Error: No such container: {}", name)
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn exists(&self, name: &str) -> bool {
        self.lock().containers.contains_key(name)
    }

    async fn is_running(&self, name: &str) -> bool {
        self.lock()
            .containers
            .get(name)
            .map(|c| c.running)
            .unwrap_or(false)
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<(), DockyardError> {
        self.mutate("create", &spec.name, format!("create {}", spec.name), |state| {
            if state.containers.contains_key(&spec.name) {
                return Err(format!("Conflict. The container name {} is already in use", spec.name));
            }
            let health = state
                .health_on_create
                .get(&spec.name)
                .copied()
                .unwrap_or(HealthState::NoHealthcheck);
            let running = !state.exits_on_create.contains(&spec.name);
            state.containers.insert(
                spec.name.clone(),
                MemoryContainer {
                    image: spec.image.clone(),
                    running,
                    paused: false,
                    restart_policy: spec.restart_policy,
                    health,
                    labelled: true,
                    spec: Some(spec.clone()),
                },
            );
            Ok(())
        })
    }

    async fn start(&self, name: &str) -> Result<(), DockyardError> {
        self.mutate("start", name, format!("start {}", name), |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            if container.paused {
                return Err(format!(
                    "cannot start a paused container {}, try unpause instead",
                    name
                ));
            }
            container.running = true;
            Ok(())
        })
    }

    async fn is_paused(&self, name: &str) -> bool {
        self.lock()
            .containers
            .get(name)
            .map(|c| c.paused)
            .unwrap_or(false)
    }

    async fn stop(&self, name: &str) -> Result<(), DockyardError> {
        self.mutate("stop", name, format!("stop {}", name), |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            container.running = false;
            container.paused = false;
            Ok(())
        })
    }

    async fn restart(&self, name: &str) -> Result<(), DockyardError> {
        self.mutate("restart", name, format!("restart {}", name), |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            container.running = true;
            container.paused = false;
            Ok(())
        })
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), DockyardError> {
        self.mutate("remove", name, format!("remove {}", name), |state| {
            let running = state
                .containers
                .get(name)
                .map(|c| c.running)
                .ok_or_else(|| no_such(name))?;
            if running && !force {
                return Err(format!("You cannot remove a running container {}", name));
            }
            state.containers.remove(name);
            Ok(())
        })
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<(), DockyardError> {
        let call = format!("rename {} {}", old_name, new_name);
        self.mutate("rename", old_name, call, |state| {
            if state.containers.contains_key(new_name) {
                return Err(format!("Conflict. The name {} is already in use", new_name));
            }
            let container = state
                .containers
                .remove(old_name)
                .ok_or_else(|| no_such(old_name))?;
            state.containers.insert(new_name.to_string(), container);
            Ok(())
        })
    }

    async fn pause(&self, name: &str) -> Result<(), DockyardError> {
        self.mutate("pause", name, format!("pause {}", name), |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            if !container.running {
                return Err(format!("Container {} is not running", name));
            }
            container.paused = true;
            Ok(())
        })
    }

    async fn unpause(&self, name: &str) -> Result<(), DockyardError> {
        self.mutate("unpause", name, format!("unpause {}", name), |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            if !container.paused {
                return Err(format!("Container {} is not paused", name));
            }
            container.paused = false;
            Ok(())
        })
    }

    async fn set_restart_policy(
        &self,
        name: &str,
        policy: RestartPolicy,
    ) -> Result<(), DockyardError> {
        let call = format!("update-restart {} {}", name, policy);
        self.mutate("update-restart", name, call, |state| {
            let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
            container.restart_policy = policy;
            Ok(())
        })
    }

    async fn inspect_health(&self, name: &str) -> HealthState {
        self.lock()
            .containers
            .get(name)
            .map(|c| c.health)
            .unwrap_or(HealthState::Unknown)
    }

    async fn inspect_image(&self, name: &str) -> Result<String, DockyardError> {
        self.lock()
            .containers
            .get(name)
            .map(|c| c.image.clone())
            .ok_or_else(|| DockyardError::runtime("inspect-image", name, no_such(name)))
    }

    async fn logs(&self, name: &str) -> Result<String, DockyardError> {
        let state = self.lock();
        if state.failures.contains(&("logs".to_string(), name.to_string())) {
            return Err(DockyardError::runtime("logs", name, "injected failure"));
        }
        if state.containers.contains_key(name) {
            Ok(format!("logs of {}", name))
        } else {
            Err(DockyardError::runtime("logs", name, no_such(name)))
        }
    }

    async fn image_exists(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    async fn list_by_label(&self, all: bool) -> Result<Vec<ManagedContainer>, DockyardError> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| c.labelled && (all || c.running))
            .map(|(name, c)| ManagedContainer {
                name: name.clone(),
                image: c.image.clone(),
                state: if c.running { "running" } else { "exited" }.to_string(),
                status: String::new(),
                ports: c
                    .spec
                    .as_ref()
                    .map(|s| s.ports.join(", "))
                    .unwrap_or_default(),
            })
            .collect())
    }
}
