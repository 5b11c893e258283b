#![allow(dead_code)]

use ctop::collection::classify::{Backends, CgroupType, Classifier};
use ctop::collection::mounts::Mountpoints;
use ctop::collection::{CGroupCollector, HostContext};
use ctop::stats::DisplayRow;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 1 CPU, 1 GiB of memory, 100 ticks per second.
pub fn host_context() -> HostContext {
    HostContext {
        total_cpu: 1,
        total_memory: 1_073_741_824,
        clock_ticks: 100,
        page_size: 4096,
    }
}

/// A fake cgroup v1 layout: one directory per controller, each holding a cgroup tree.
pub struct FakeHierarchy {
    dir: TempDir,
}

impl FakeHierarchy {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn controller(&self, controller: &str) -> PathBuf {
        self.dir.path().join(controller)
    }

    fn cgroup_dir(&self, controller: &str, cgroup: &str) -> PathBuf {
        self.controller(controller).join(cgroup.trim_start_matches('/'))
    }

    /// Create `cgroup` below `controller` with the given pids in its `tasks` file.
    pub fn add_cgroup(&self, controller: &str, cgroup: &str, tasks: &[u32]) -> PathBuf {
        let dir = self.cgroup_dir(controller, cgroup);
        fs::create_dir_all(&dir).unwrap();
        let content: String = tasks.iter().map(|pid| format!("{}\n", pid)).collect();
        fs::write(dir.join("tasks"), content).unwrap();
        dir
    }

    pub fn write(&self, controller: &str, cgroup: &str, file: &str, content: &str) {
        fs::write(self.cgroup_dir(controller, cgroup).join(file), content).unwrap();
    }

    pub fn mountpoints(&self, controllers: &[&str]) -> Mountpoints {
        let mut mountpoints = Mountpoints::default();
        for controller in controllers {
            mountpoints.insert(*controller, self.controller(controller));
        }
        mountpoints
    }

    /// Collector over `controllers` that never shells out to docker or vzlist.
    pub fn collector(&self, controllers: &[&str]) -> CGroupCollector {
        let classifier = Classifier::new(Backends::default())
            .with_home_root(self.root().join("home"))
            .with_lookup(|_| None);
        CGroupCollector::new(self.mountpoints(controllers), host_context(), classifier)
    }
}

pub fn row(cgroup: &str, kind: CgroupType) -> DisplayRow {
    DisplayRow {
        cgroup: cgroup.to_string(),
        owner: "root".to_string(),
        kind,
        cur_tasks: 0,
        max_tasks: "max".to_string(),
        tasks: "    0/max  ".to_string(),
        memory_cur_bytes: 0,
        memory_limit_bytes: 1_073_741_824,
        memory_cur_percent: 0.0,
        memory_cur_str: "  0.0 B/1.0GB  ".to_string(),
        cpu_syst: 0.0,
        cpu_user: 0.0,
        cpu_total: 0.0,
        cpu_total_seconds: 0,
        cpu_total_str: "00:00.00".to_string(),
        blkio_bw_bytes: 0.0,
        blkio_bw: "0.0 B/s".to_string(),
    }
}

/// A small host: systemd services next to a docker container, sorted by path.
pub fn sample_rows() -> Vec<DisplayRow> {
    vec![
        row("/", CgroupType::Unknown),
        row("/docker", CgroupType::Unknown),
        row("/docker/abc", CgroupType::Docker),
        row("/lxc", CgroupType::Unknown),
        row("/lxc/box", CgroupType::Lxc),
        row("/system.slice", CgroupType::Systemd),
        row("/system.slice/ssh.service", CgroupType::Systemd),
        row("/system.slice/x.scope", CgroupType::Systemd),
    ]
}
