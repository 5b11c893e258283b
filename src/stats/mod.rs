use std::time::Instant;

use crate::collection::classify::CgroupType;
use crate::collection::{CgroupRecord, HostContext, Sample, TaskLimit};
use crate::utils::{to_human, to_human_time};

/// One table line, rebuilt from scratch every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub cgroup: String,
    pub owner: String,
    pub kind: CgroupType,
    pub cur_tasks: usize,
    pub max_tasks: String,
    pub tasks: String,
    pub memory_cur_bytes: u64,
    pub memory_limit_bytes: u64,
    /// Usage as a percentage of the limit.
    pub memory_cur_percent: f64,
    pub memory_cur_str: String,
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu_syst: f64,
    pub cpu_user: f64,
    pub cpu_total: f64,
    pub cpu_total_seconds: u64,
    pub cpu_total_str: String,
    /// Bytes per second.
    pub blkio_bw_bytes: f64,
    pub blkio_bw: String,
}

/// Turn a sample into display rows, sorted by cgroup path.
///
/// Rates are computed against `previous_taken_at`; without it (first cycle) they are zero.
pub fn build_rows(sample: &Sample, previous_taken_at: Option<Instant>) -> Vec<DisplayRow> {
    let elapsed = previous_taken_at
        .map(|prev| sample.taken_at.saturating_duration_since(prev).as_secs_f64())
        .unwrap_or(0.0);

    let mut rows: Vec<DisplayRow> = sample
        .records
        .iter()
        .map(|(cgroup, record)| build_row(cgroup, record, &sample.context, elapsed))
        .collect();
    rows.sort_by(|a, b| a.cgroup.cmp(&b.cgroup));
    rows
}

pub fn build_row(
    cgroup: &str,
    record: &CgroupRecord,
    context: &HostContext,
    elapsed_secs: f64,
) -> DisplayRow {
    // one fully busy core for the whole interval reads 100%
    let cpu_to_percent =
        context.clock_ticks as f64 * context.total_cpu as f64 * elapsed_secs / 100.0;
    let rate = |delta: u64, denominator: f64| {
        if denominator > 0.0 {
            delta as f64 / denominator
        } else {
            0.0
        }
    };

    let cpu = record.cpu.unwrap_or_default();
    let cpu_syst = rate(cpu.system_delta, cpu_to_percent);
    let cpu_user = rate(cpu.user_delta, cpu_to_percent);
    let cpu_total_seconds = if context.clock_ticks > 0 {
        (cpu.user + cpu.system) / context.clock_ticks
    } else {
        0
    };

    let (memory_cur_bytes, memory_limit_bytes) = match record.memory {
        Some(memory) => (memory.usage, memory.limit),
        None => (0, context.total_memory),
    };
    let memory_cur_percent = rate(memory_cur_bytes, memory_limit_bytes as f64) * 100.0;

    let cur_tasks = record.tasks.as_ref().map_or(0, Vec::len);
    let max_tasks = match record.pids_max {
        Some(TaskLimit::Max(n)) => n.to_string(),
        Some(TaskLimit::Unlimited) | None => "max".to_string(),
    };

    let blkio_delta = record.blkio.map_or(0, |b| b.total_delta);
    let blkio_bw_bytes = rate(blkio_delta, elapsed_secs);

    DisplayRow {
        cgroup: cgroup.to_string(),
        owner: record.owner.clone().unwrap_or_else(|| "nobody".to_string()),
        kind: record.kind.unwrap_or(CgroupType::Unknown),
        cur_tasks,
        tasks: format!("{:>5}/{:<5}", cur_tasks, max_tasks),
        max_tasks,
        memory_cur_bytes,
        memory_limit_bytes,
        memory_cur_percent,
        memory_cur_str: format!(
            "{:>7}/{:<7}",
            to_human(memory_cur_bytes as f64, "B"),
            to_human(memory_limit_bytes as f64, "B")
        ),
        cpu_syst,
        cpu_user,
        cpu_total: cpu_syst + cpu_user,
        cpu_total_seconds,
        cpu_total_str: to_human_time(cpu_total_seconds),
        blkio_bw_bytes,
        blkio_bw: to_human(blkio_bw_bytes, "B/s"),
    }
}
