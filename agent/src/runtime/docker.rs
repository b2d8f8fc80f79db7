//! Docker CLI backed runtime gateway

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DockyardError;
use crate::runtime::command::RuntimeCommand;
use crate::runtime::{ContainerRuntime, ContainerSpec, HealthState, ManagedContainer, RestartPolicy};

/// Runtime gateway invoking the docker CLI (or a compatible binary)
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    label_value: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, label_value: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            label_value: label_value.into(),
        }
    }

    async fn output(&self, cmd: &RuntimeCommand) -> Result<Output, DockyardError> {
        debug!("{} {}", self.binary, cmd.args().join(" "));
        Command::new(&self.binary)
            .args(cmd.args())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DockyardError::runtime(
                    cmd.op(),
                    cmd.target(),
                    format!("failed to run {}: {}", self.binary, e),
                )
            })
    }

    /// Run a command and require a zero exit status, returning stdout
    async fn exec(&self, cmd: RuntimeCommand) -> Result<String, DockyardError> {
        let output = self.output(&cmd).await?;
        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(DockyardError::runtime(
                cmd.op(),
                cmd.target(),
                combined.trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Exact-name match over a names listing; label lookup first, then plain
    /// name lookup for units created before labelling existed
    async fn find_name(&self, name: &str, all: bool) -> bool {
        let by_label = RuntimeCommand::list_names_by_label(&self.label_value, all);
        if let Ok(names) = self.exec(by_label).await {
            if contains_line(&names, name) {
                return true;
            }
        }

        match self.exec(RuntimeCommand::list_names_by_name(name, all)).await {
            Ok(names) => contains_line(&names, name),
            Err(e) => {
                debug!("Name lookup for {} failed: {}", name, e);
                false
            }
        }
    }
}

fn contains_line(output: &str, name: &str) -> bool {
    output.lines().any(|line| line.trim() == name)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn exists(&self, name: &str) -> bool {
        self.find_name(name, true).await
    }

    async fn is_running(&self, name: &str) -> bool {
        self.find_name(name, false).await
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::run(spec, &self.label_value))
            .await
            .map(|_| ())
    }

    async fn start(&self, name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::start(name)).await.map(|_| ())
    }

    async fn is_paused(&self, name: &str) -> bool {
        match self.exec(RuntimeCommand::inspect_paused(name)).await {
            Ok(output) => output.trim() == "true",
            Err(e) => {
                debug!("Pause inspect for {} failed: {}", name, e);
                false
            }
        }
    }

    async fn stop(&self, name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::stop(name)).await.map(|_| ())
    }

    async fn restart(&self, name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::restart(name)).await.map(|_| ())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::remove(name, force))
            .await
            .map(|_| ())
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::rename(old_name, new_name))
            .await
            .map(|_| ())
    }

    async fn pause(&self, name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::pause(name)).await.map(|_| ())
    }

    async fn unpause(&self, name: &str) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::unpause(name)).await.map(|_| ())
    }

    async fn set_restart_policy(
        &self,
        name: &str,
        policy: RestartPolicy,
    ) -> Result<(), DockyardError> {
        self.exec(RuntimeCommand::update_restart_policy(name, policy))
            .await
            .map(|_| ())
    }

    async fn inspect_health(&self, name: &str) -> HealthState {
        match self.exec(RuntimeCommand::inspect_health(name)).await {
            Ok(output) => HealthState::from_inspect_output(&output),
            Err(e) => {
                debug!("Health inspect for {} failed: {}", name, e);
                HealthState::Unknown
            }
        }
    }

    async fn inspect_image(&self, name: &str) -> Result<String, DockyardError> {
        let image = self.exec(RuntimeCommand::inspect_image(name)).await?;
        Ok(image.trim().to_string())
    }

    async fn logs(&self, name: &str) -> Result<String, DockyardError> {
        // The runtime splits container output across both streams
        let cmd = RuntimeCommand::logs(name);
        let output = self.output(&cmd).await?;
        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn image_exists(&self, image: &str) -> bool {
        self.exec(RuntimeCommand::image_inspect(image)).await.is_ok()
    }

    async fn list_by_label(&self, all: bool) -> Result<Vec<ManagedContainer>, DockyardError> {
        let output = self
            .exec(RuntimeCommand::list_json_by_label(&self.label_value, all))
            .await?;
        Ok(parse_json_lines(&output))
    }
}

/// Parse `{{json .}}` listing output, skipping lines that fail to parse
fn parse_json_lines(output: &str) -> Vec<ManagedContainer> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<ManagedContainer>(line) {
            Ok(container) => Some(container),
            Err(e) => {
                debug!("Skipping unparsable listing line: {}", e);
                None
            }
        })
        .collect()
}
