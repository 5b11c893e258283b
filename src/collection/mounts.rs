use hashbrown::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::CollectError;

pub const PROC_CGROUPS: &str = "/proc/cgroups";
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Controller name (`cpuacct`, `blkio`, `memory`, `pids`, ...) to the directory it is mounted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mountpoints {
    inner: HashMap<String, PathBuf>,
}

impl Mountpoints {
    pub fn get(&self, controller: &str) -> Option<&Path> {
        self.inner.get(controller).map(PathBuf::as_path)
    }

    pub fn insert(&mut self, controller: impl Into<String>, path: impl Into<PathBuf>) {
        self.inner.insert(controller.into(), path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.inner.iter()
    }

    /// Read `/proc/cgroups` and `/proc/mounts` and match them up.
    pub fn resolve() -> Result<Self, CollectError> {
        Self::resolve_from(Path::new(PROC_CGROUPS), Path::new(PROC_MOUNTS))
    }

    pub fn resolve_from(cgroups_file: &Path, mounts_file: &Path) -> Result<Self, CollectError> {
        let controllers = parse_controllers(&fs::read_to_string(cgroups_file)?);
        let mountpoints = parse_mountpoints(&fs::read_to_string(mounts_file)?, &controllers);

        if mountpoints.is_empty() {
            return Err(CollectError::NoMountpoints);
        }

        for (controller, path) in mountpoints.iter() {
            log::info!("cgroup controller {} mounted on {}", controller, path.display());
        }

        Ok(mountpoints)
    }
}

/// Controller names listed by the kernel, skipping the `#subsys_name ...` header.
pub fn parse_controllers(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Map each known controller to the first `cgroup` mount listing it in its options.
pub fn parse_mountpoints(content: &str, controllers: &[String]) -> Mountpoints {
    let mut mountpoints = Mountpoints::default();

    for line in content.lines() {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 4 || fields[2] != "cgroup" {
            continue;
        }

        for option in fields[3].split(',') {
            if controllers.iter().any(|c| c == option) && mountpoints.get(option).is_none() {
                mountpoints.insert(option, fields[1]);
            }
        }
    }

    mountpoints
}
