pub mod cgroup;
pub mod classify;
pub mod mounts;

use hashbrown::HashMap;
use procfs::Current;
use std::io;
use std::process::Command;
use std::time::Instant;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use cgroup::{CGroupNode, ControllerValue, Value, cgroups};
use classify::{CgroupType, Classifier};
use mounts::Mountpoints;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to locate cgroup mountpoints")]
    NoMountpoints,
    #[error("failed to find any relevant cgroup/container")]
    NoCgroups,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Machine wide figures every rate computation is scaled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostContext {
    pub total_cpu: u64,
    pub total_memory: u64,
    pub clock_ticks: u64,
    pub page_size: u64,
}

impl HostContext {
    pub fn detect() -> anyhow::Result<Self> {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        let total_memory = procfs::Meminfo::current()?.mem_total;

        let context = Self {
            total_cpu: system.cpus().len().max(1) as u64,
            total_memory,
            clock_ticks: procfs::ticks_per_second(),
            page_size: procfs::page_size(),
        };
        log::info!("Host context: {:?}", context);
        Ok(context)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub user: u64,
    pub system: u64,
    pub user_delta: u64,
    pub system_delta: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlkioStats {
    pub total: u64,
    pub total_delta: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLimit {
    Unlimited,
    Max(u64),
}

/// Everything known about one logical cgroup, merged across controllers by path.
///
/// `owner`, `kind` and `tasks` come from whichever controller saw the path first;
/// controller sections stay `None` when that controller never reported the path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CgroupRecord {
    pub owner: Option<String>,
    pub kind: Option<CgroupType>,
    pub tasks: Option<Vec<u64>>,
    pub cpu: Option<CpuStats>,
    pub blkio: Option<BlkioStats>,
    pub memory: Option<MemoryStats>,
    pub pids_max: Option<TaskLimit>,
}

impl CgroupRecord {
    pub fn has_common(&self) -> bool {
        self.tasks.is_some()
    }

    /// Set the shared fields unless an earlier controller already did.
    pub fn fill_common(&mut self, owner: String, kind: CgroupType, tasks: Vec<u64>) {
        if self.has_common() {
            return;
        }
        self.owner = Some(owner);
        self.kind = Some(kind);
        self.tasks = Some(tasks);
    }
}

/// A full host snapshot.
#[derive(Debug, Clone)]
pub struct Sample {
    pub records: HashMap<String, CgroupRecord>,
    pub context: HostContext,
    pub taken_at: Instant,
}

impl Sample {
    pub fn new(records: HashMap<String, CgroupRecord>, context: HostContext) -> Self {
        Self {
            records,
            context,
            taken_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct CGroupCollector {
    pub mountpoints: Mountpoints,
    pub context: HostContext,
    pub classifier: Classifier,
    current: Option<Sample>,
    previous: Option<Sample>,
    vzlist: fn() -> io::Result<String>,
}

impl CGroupCollector {
    pub fn new(mountpoints: Mountpoints, context: HostContext, classifier: Classifier) -> Self {
        Self {
            mountpoints,
            context,
            classifier,
            current: None,
            previous: None,
            vzlist: run_vzlist,
        }
    }

    pub fn with_vzlist(mut self, vzlist: fn() -> io::Result<String>) -> Self {
        self.vzlist = vzlist;
        self
    }

    pub fn current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Sample> {
        self.previous.as_ref()
    }

    /// Walk every mounted controller and fold the result against the last sample.
    ///
    /// The new sample only replaces the current one once it is complete.
    pub fn collect_metrics(&mut self) -> Result<&Sample, CollectError> {
        let mut records: HashMap<String, CgroupRecord> = HashMap::new();
        let prev = self.current.take();

        let result = self.collect_into(&mut records, prev.as_ref());
        if let Err(e) = result {
            self.current = prev;
            return Err(e);
        }

        if records.is_empty() {
            self.current = prev;
            return Err(CollectError::NoCgroups);
        }

        log::debug!("Collected {} cgroup records", records.len());
        self.previous = prev;
        Ok(&*self.current.insert(Sample::new(records, self.context)))
    }

    fn collect_into(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
        prev: Option<&Sample>,
    ) -> Result<(), CollectError> {
        self.collect_cpuacct(records, prev)?;
        self.collect_blkio(records, prev)?;
        self.collect_memory(records)?;
        self.collect_pids(records)?;
        if self.classifier.backends.openvz {
            self.collect_openvz(records)?;
        }
        Ok(())
    }

    fn controller_nodes(&self, controller: &str) -> Vec<CGroupNode> {
        match self.mountpoints.get(controller) {
            Some(base) => cgroups(base).collect(),
            None => Vec::new(),
        }
    }

    /// Resolve the record key of `node` and make sure its shared fields are set.
    /// Returns `None` when the node vanished while we were looking at it.
    fn ensure_common(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
        node: &CGroupNode,
    ) -> Result<Option<String>, CollectError> {
        let short_path = node.short_path();
        let Some(owner) = skip_missing(node.owner(), node, "tasks")? else {
            return Ok(None);
        };
        let kind = self.classifier.classify(&short_path, &owner);
        let name = self.classifier.display_name(&short_path, kind);

        let record = records.entry(name.clone()).or_default();
        if !record.has_common() {
            let tasks = skip_missing(node.read("tasks"), node, "tasks")?
                .map(|tasks| tasks.lines().iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default();
            record.fill_common(owner, kind, tasks);
        }
        Ok(Some(name))
    }

    pub fn collect_cpuacct(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
        prev: Option<&Sample>,
    ) -> Result<(), CollectError> {
        for node in self.controller_nodes("cpuacct") {
            let Some(name) = self.ensure_common(records, &node)? else {
                continue;
            };
            let Some(stat) = skip_missing(node.read("cpuacct.stat"), &node, "cpuacct.stat")?
            else {
                continue;
            };

            let mut cpu = CpuStats {
                user: map_u64(&stat, "user"),
                system: map_u64(&stat, "system"),
                ..Default::default()
            };
            if let Some(before) = previous_record(prev, &name).and_then(|r| r.cpu) {
                cpu.user_delta = cpu.user.saturating_sub(before.user);
                cpu.system_delta = cpu.system.saturating_sub(before.system);
            }

            if let Some(record) = records.get_mut(&name) {
                record.cpu = Some(cpu);
            }
        }
        Ok(())
    }

    pub fn collect_blkio(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
        prev: Option<&Sample>,
    ) -> Result<(), CollectError> {
        const FILE: &str = "blkio.throttle.io_service_bytes";

        for node in self.controller_nodes("blkio") {
            let Some(name) = self.ensure_common(records, &node)? else {
                continue;
            };
            // some kernels do not expose the throttle files on every node
            let Some(bytes) = skip_missing(node.read(FILE), &node, FILE)? else {
                continue;
            };

            let mut blkio = BlkioStats {
                total: map_u64(&bytes, "Total"),
                ..Default::default()
            };
            if let Some(before) = previous_record(prev, &name).and_then(|r| r.blkio) {
                blkio.total_delta = blkio.total.saturating_sub(before.total);
            }

            if let Some(record) = records.get_mut(&name) {
                record.blkio = Some(blkio);
            }
        }
        Ok(())
    }

    pub fn collect_memory(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
    ) -> Result<(), CollectError> {
        for node in self.controller_nodes("memory") {
            let Some(name) = self.ensure_common(records, &node)? else {
                continue;
            };
            let usage = skip_missing(node.read("memory.usage_in_bytes"), &node, "memory.usage_in_bytes")?;
            let limit = skip_missing(node.read("memory.limit_in_bytes"), &node, "memory.limit_in_bytes")?;
            let stat = skip_missing(node.read("memory.stat"), &node, "memory.stat")?;
            let (Some(usage), Some(limit)) = (usage, limit) else {
                continue;
            };

            let cache = stat.map(|s| map_u64(&s, "cache")).unwrap_or(0);
            let usage = scalar_u64(&usage).saturating_sub(cache);
            let limit = scalar_u64(&limit).min(self.context.total_memory);

            if let Some(record) = records.get_mut(&name) {
                record.memory = Some(MemoryStats { usage, limit });
            }
        }
        Ok(())
    }

    pub fn collect_pids(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
    ) -> Result<(), CollectError> {
        for node in self.controller_nodes("pids") {
            // the root cgroup has no pids.max
            if node.is_root() {
                continue;
            }
            let Some(name) = self.ensure_common(records, &node)? else {
                continue;
            };
            let Some(max) = skip_missing(node.read("pids.max"), &node, "pids.max")? else {
                continue;
            };

            let limit = match max.scalar().and_then(Value::as_u64) {
                Some(n) => TaskLimit::Max(n),
                None => TaskLimit::Unlimited,
            };
            if let Some(record) = records.get_mut(&name) {
                record.pids_max = Some(limit);
            }
        }
        Ok(())
    }

    /// OpenVZ memory comes from `vzlist` rather than the cgroup tree.
    pub fn collect_openvz(
        &mut self,
        records: &mut HashMap<String, CgroupRecord>,
    ) -> Result<(), CollectError> {
        let output = match (self.vzlist)() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("vzlist failed: {}", e);
                return Ok(());
            }
        };

        for entry in parse_vzlist(&output) {
            let path = format!("/{}", entry.ctid);
            let Some(record) = records.get_mut(&path) else {
                continue;
            };
            if !record.has_common() {
                continue;
            }
            record.memory = Some(MemoryStats {
                usage: entry.privvmpages.saturating_mul(self.context.page_size),
                limit: entry
                    .privvmpages_limit
                    .saturating_mul(self.context.page_size)
                    .min(self.context.total_memory),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VzEntry {
    pub ctid: String,
    pub privvmpages: u64,
    pub privvmpages_limit: u64,
}

/// Parse `vzlist -o ctid,privvmpages,privvmpages.l -H` output.
pub fn parse_vzlist(output: &str) -> Vec<VzEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [ctid, pages, limit] = fields.as_slice() else {
                return None;
            };
            Some(VzEntry {
                ctid: ctid.to_string(),
                privvmpages: pages.parse().ok()?,
                privvmpages_limit: limit.parse().ok()?,
            })
        })
        .collect()
}

fn run_vzlist() -> io::Result<String> {
    let mut command = if nix::unistd::getuid().is_root() {
        Command::new("vzlist")
    } else {
        let mut sudo = Command::new("sudo");
        sudo.arg("vzlist");
        sudo
    };
    let output = command
        .args(["-o", "ctid,privvmpages,privvmpages.l", "-H"])
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn previous_record<'a>(prev: Option<&'a Sample>, name: &str) -> Option<&'a CgroupRecord> {
    prev.and_then(|sample| sample.records.get(name))
}

fn map_u64(value: &ControllerValue, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn scalar_u64(value: &ControllerValue) -> u64 {
    value.scalar().and_then(Value::as_u64).unwrap_or(0)
}

/// A missing controller file only drops that node's contribution.
fn skip_missing<T>(
    result: io::Result<T>,
    node: &CGroupNode,
    file: &str,
) -> Result<Option<T>, CollectError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("Skipping {} for {}: not found", file, node.path.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fill_common_first_wins() {
        let mut record = CgroupRecord::default();
        record.fill_common("root".into(), CgroupType::Docker, vec![1, 2]);
        record.fill_common("bob".into(), CgroupType::Systemd, vec![]);

        assert_eq!(record.owner.as_deref(), Some("root"));
        assert_eq!(record.kind, Some(CgroupType::Docker));
        assert_eq!(record.tasks, Some(vec![1, 2]));
    }

    #[test]
    fn test_parse_vzlist() {
        let output = "      1202     202419    2457600\n\
                      1000001212      13493    2457600\n\
                      garbage line\n\n";
        let entries = parse_vzlist(output);
        assert_eq!(
            entries,
            vec![
                VzEntry {
                    ctid: "1202".into(),
                    privvmpages: 202419,
                    privvmpages_limit: 2457600
                },
                VzEntry {
                    ctid: "1000001212".into(),
                    privvmpages: 13493,
                    privvmpages_limit: 2457600
                },
            ]
        );
    }
}
