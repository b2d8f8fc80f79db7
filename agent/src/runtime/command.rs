//! Typed argument builders for runtime CLI invocations
//!
//! Every gateway operation is built as an argument vector and handed to the
//! process spawner directly, never through a shell.

use crate::runtime::{ContainerSpec, RestartPolicy, OWNER_LABEL_KEY};

/// Go template that distinguishes "no health check" from a real status
const HEALTH_TEMPLATE: &str =
    "{{if .State.Health}}{{.State.Health.Status}}{{else}}none{{end}}";

/// Number of log lines fetched for diagnostics
const LOG_TAIL_LINES: u32 = 200;

/// A single runtime invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCommand {
    op: &'static str,
    target: String,
    args: Vec<String>,
}

impl RuntimeCommand {
    fn new(op: &'static str, target: &str, args: Vec<String>) -> Self {
        Self {
            op,
            target: target.to_string(),
            args,
        }
    }

    /// Operation name, used in errors and logs
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// Unit or image the command acts on
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Arguments passed to the runtime binary
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// `run -d` with the full unit specification and the ownership label
    pub fn run(spec: &ContainerSpec, label_value: &str) -> Self {
        let mut args = strings(&["run", "-d", "--name", &spec.name]);
        args.push("--label".to_string());
        args.push(format!("{}={}", OWNER_LABEL_KEY, label_value));
        args.push("--restart".to_string());
        args.push(spec.restart_policy.as_str().to_string());

        if let Some(network) = &spec.network_mode {
            args.push("--network".to_string());
            args.push(network.as_str().to_string());
        }

        for port in &spec.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }

        if let Some(env_file) = &spec.env_file {
            args.push("--env-file".to_string());
            args.push(env_file.to_string_lossy().to_string());
        }

        for volume in &spec.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }

        if let Some(dir) = &spec.working_dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        args.push("--ulimit".to_string());
        args.push(format!("nofile={0}:{0}", spec.limits.nofile));
        args.push("--ulimit".to_string());
        args.push(format!("nproc={0}:{0}", spec.limits.nproc));

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        Self::new("create", &spec.name, args)
    }

    pub fn start(name: &str) -> Self {
        Self::new("start", name, strings(&["start", name]))
    }

    pub fn stop(name: &str) -> Self {
        Self::new("stop", name, strings(&["stop", name]))
    }

    pub fn restart(name: &str) -> Self {
        Self::new("restart", name, strings(&["restart", name]))
    }

    pub fn remove(name: &str, force: bool) -> Self {
        let args = if force {
            strings(&["rm", "-f", name])
        } else {
            strings(&["rm", name])
        };
        Self::new("remove", name, args)
    }

    pub fn rename(old_name: &str, new_name: &str) -> Self {
        Self::new("rename", old_name, strings(&["rename", old_name, new_name]))
    }

    pub fn pause(name: &str) -> Self {
        Self::new("pause", name, strings(&["pause", name]))
    }

    pub fn unpause(name: &str) -> Self {
        Self::new("unpause", name, strings(&["unpause", name]))
    }

    pub fn update_restart_policy(name: &str, policy: RestartPolicy) -> Self {
        Self::new(
            "update-restart",
            name,
            strings(&["update", "--restart", policy.as_str(), name]),
        )
    }

    pub fn inspect_health(name: &str) -> Self {
        Self::new(
            "inspect-health",
            name,
            strings(&["inspect", "--format", HEALTH_TEMPLATE, name]),
        )
    }

    pub fn inspect_image(name: &str) -> Self {
        Self::new(
            "inspect-image",
            name,
            strings(&["inspect", "--format", "{{.Config.Image}}", name]),
        )
    }

    pub fn inspect_paused(name: &str) -> Self {
        Self::new(
            "inspect-paused",
            name,
            strings(&["inspect", "--format", "{{.State.Paused}}", name]),
        )
    }

    pub fn logs(name: &str) -> Self {
        let tail = LOG_TAIL_LINES.to_string();
        Self::new("logs", name, strings(&["logs", "--tail", &tail, name]))
    }

    pub fn image_inspect(image: &str) -> Self {
        Self::new("image-inspect", image, strings(&["image", "inspect", image]))
    }

    /// Names of units carrying the ownership label
    pub fn list_names_by_label(label_value: &str, all: bool) -> Self {
        let filter = format!("label={}={}", OWNER_LABEL_KEY, label_value);
        let mut args = strings(&["ps"]);
        if all {
            args.push("-a".to_string());
        }
        args.extend(strings(&["--filter", &filter, "--format", "{{.Names}}"]));
        Self::new("list", label_value, args)
    }

    /// Names of units matching a name filter, labelled or not
    pub fn list_names_by_name(name: &str, all: bool) -> Self {
        let filter = format!("name=^{}$", name);
        let mut args = strings(&["ps"]);
        if all {
            args.push("-a".to_string());
        }
        args.extend(strings(&["--filter", &filter, "--format", "{{.Names}}"]));
        Self::new("list", name, args)
    }

    /// JSON lines describing units carrying the ownership label
    pub fn list_json_by_label(label_value: &str, all: bool) -> Self {
        let filter = format!("label={}={}", OWNER_LABEL_KEY, label_value);
        let mut args = strings(&["ps"]);
        if all {
            args.push("-a".to_string());
        }
        args.extend(strings(&["--filter", &filter, "--format", "{{json .}}"]));
        Self::new("list", label_value, args)
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
