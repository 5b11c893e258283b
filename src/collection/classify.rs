use hashbrown::HashMap;
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use crate::utils::{base_name, strip_prefix};

pub const DOCKER_PREFIXES: &[&str] = &["/docker/", "/system.slice/docker-", "/system.slice/docker/"];
const LXC_PREFIX: &str = "/lxc/";
const QEMU_PREFIX: &str = "/machine.slice/machine-qemu";

pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(1);
const INSPECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Technology owning a cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CgroupType {
    Docker,
    Lxc,
    LxcUser,
    Systemd,
    QemuKvm,
    OpenVz,
    Unknown,
}

impl CgroupType {
    pub const ALL: [CgroupType; 7] = [
        CgroupType::Docker,
        CgroupType::Lxc,
        CgroupType::LxcUser,
        CgroupType::Systemd,
        CgroupType::QemuKvm,
        CgroupType::OpenVz,
        CgroupType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CgroupType::Docker => "docker",
            CgroupType::Lxc => "lxc",
            CgroupType::LxcUser => "lxc-user",
            CgroupType::Systemd => "systemd",
            CgroupType::QemuKvm => "qemu-kvm",
            CgroupType::OpenVz => "openvz",
            CgroupType::Unknown => "-",
        }
    }
}

impl fmt::Display for CgroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CgroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CgroupType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Which container/VM tools are installed on this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backends {
    pub docker: bool,
    pub lxc: bool,
    pub openvz: bool,
    pub libvirt: bool,
}

impl Backends {
    pub fn detect() -> Self {
        let backends = Self {
            docker: command_exists("docker"),
            lxc: command_exists("lxc-start"),
            openvz: command_exists("vzctl"),
            libvirt: command_exists("virsh"),
        };
        log::info!("Detected backends: {:?}", backends);
        backends
    }

    /// Whether the tooling that drives cgroups of `kind` is present.
    pub fn supports(&self, kind: CgroupType) -> bool {
        match kind {
            CgroupType::Docker => self.docker,
            CgroupType::Lxc | CgroupType::LxcUser => self.lxc,
            CgroupType::OpenVz => self.openvz,
            CgroupType::QemuKvm => self.libvirt,
            CgroupType::Systemd | CgroupType::Unknown => false,
        }
    }
}

pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Process-lifetime cache of container id to display name.
///
/// Entries are never evicted and failed lookups are stored too, so a broken
/// `docker inspect` is only ever attempted once per container.
#[derive(Debug, Default)]
pub struct ContainerNameCache {
    names: HashMap<String, String>,
}

impl ContainerNameCache {
    pub fn resolve<F>(&mut self, container_id: &str, default: &str, lookup: F) -> String
    where
        F: FnOnce(&str) -> Option<String>,
    {
        if let Some(name) = self.names.get(container_id) {
            return name.clone();
        }

        let name = match lookup(container_id) {
            Some(name) => format!("/docker/{}", name),
            None => {
                log::debug!("No container name for {}, keeping {}", container_id, default);
                default.to_string()
            }
        };
        self.names.insert(container_id.to_string(), name.clone());
        name
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Deserialize)]
struct InspectEntry {
    #[serde(rename = "Name")]
    name: String,
}

/// Extract the container name from `docker inspect` JSON output.
pub fn parse_inspect_output(stdout: &[u8]) -> Option<String> {
    let entries: Vec<InspectEntry> = serde_json::from_slice(stdout).ok()?;
    match entries.as_slice() {
        [entry] => Some(entry.name.trim_start_matches('/').to_string()),
        _ => None,
    }
}

/// Run `docker inspect`, giving it about a second before killing it.
pub fn docker_inspect(container_id: &str) -> Option<String> {
    inspect_with(Command::new("docker"), container_id, INSPECT_TIMEOUT)
}

/// Run `command inspect <container_id>` and parse what it prints.
///
/// Stdout is drained on a separate thread while the child is polled, so a
/// large inspect document cannot fill the pipe and stall the child. A child
/// still running after `timeout` is killed and reaped.
pub fn inspect_with(mut command: Command, container_id: &str, timeout: Duration) -> Option<String> {
    let mut child = command
        .arg("inspect")
        .arg(container_id)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                let output = reader.join().ok()?.ok()?;
                return parse_inspect_output(&output);
            }
            Ok(Some(status)) => {
                log::debug!("docker inspect {} exited with {}", container_id, status);
                return None;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(INSPECT_POLL_INTERVAL),
            Ok(None) => {
                log::debug!("docker inspect {} timed out", container_id);
                break;
            }
            Err(e) => {
                log::debug!("docker inspect {} could not be polled: {}", container_id, e);
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    None
}

/// Guesses which technology owns a cgroup and resolves its display name.
pub struct Classifier {
    pub backends: Backends,
    /// Directory holding user homes, used to spot unprivileged LXC containers.
    pub home_root: PathBuf,
    names: ContainerNameCache,
    lookup: fn(&str) -> Option<String>,
}

impl Classifier {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            home_root: PathBuf::from("/home"),
            names: ContainerNameCache::default(),
            lookup: docker_inspect,
        }
    }

    pub fn with_home_root(mut self, home_root: PathBuf) -> Self {
        self.home_root = home_root;
        self
    }

    pub fn with_lookup(mut self, lookup: fn(&str) -> Option<String>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn classify(&self, path: &str, owner: &str) -> CgroupType {
        if DOCKER_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            CgroupType::Docker
        } else if path.starts_with(LXC_PREFIX) {
            CgroupType::Lxc
        } else if path.starts_with("/user.slice/") {
            let mut parts = path.rsplitn(3, '/');
            let name = parts.next().unwrap_or("");
            let parent = parts.next().unwrap_or("");
            if parent.ends_with(".scope") && self.is_user_lxc(owner, name) {
                CgroupType::LxcUser
            } else {
                CgroupType::Systemd
            }
        } else if path == "/user.slice" || path == "/system.slice" || path.starts_with("/system.slice/") {
            CgroupType::Systemd
        } else if path.starts_with(QEMU_PREFIX) {
            CgroupType::QemuKvm
        } else if self.backends.openvz && is_openvz_container(path) {
            CgroupType::OpenVz
        } else {
            CgroupType::Unknown
        }
    }

    fn is_user_lxc(&self, owner: &str, name: &str) -> bool {
        self.home_root
            .join(owner)
            .join(".local/share/lxc")
            .join(name)
            .is_dir()
    }

    /// Display name for a cgroup: docker containers get their engine name, everything
    /// else keeps the raw path.
    pub fn display_name(&mut self, path: &str, kind: CgroupType) -> String {
        if kind != CgroupType::Docker || !self.backends.docker {
            return path.to_string();
        }
        let container_id = docker_container_id(path);
        let lookup = self.lookup;
        self.names.resolve(container_id, path, lookup)
    }

    pub fn cached_names(&self) -> usize {
        self.names.len()
    }
}

/// Container id embedded in a docker cgroup path.
pub fn docker_container_id(path: &str) -> &str {
    let id = DOCKER_PREFIXES
        .iter()
        .fold(path, |id, prefix| strip_prefix(prefix, id));
    id.strip_suffix(".scope").unwrap_or(id)
}

/// OpenVZ containers live at small-integer top level cgroups, `/0` being the host.
pub fn is_openvz_container(path: &str) -> bool {
    match path.strip_prefix('/') {
        Some(id) => !id.is_empty() && id != "0" && id.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// libvirt domain name out of `/machine.slice/machine-qemu\x2d305\x2dvm1.scope/emulator`.
pub fn libvirt_vm_name(path: &str) -> String {
    let rest = strip_prefix("/machine.slice/machine-qemu", path);
    let scope = rest.split(".scope").next().unwrap_or("");
    scope.rsplit("\\x2d").next().unwrap_or("").to_string()
}

/// Name docker tooling understands for a row: `docker-<id>.scope` is reduced to `<id>`.
pub fn docker_target_name(path: &str) -> String {
    let name = base_name(path);
    match name.strip_prefix("docker-") {
        Some(id) => id.strip_suffix(".scope").unwrap_or(id).to_string(),
        None => name.to_string(),
    }
}
