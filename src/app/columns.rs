use std::cmp::Ordering;

use crate::stats::DisplayRow;
use crate::utils::truncate_to_width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Center,
}

/// The row field a table is ordered by. Several columns may share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Owner,
    Type,
    Tasks,
    Memory,
    CpuTotal,
    Blkio,
    CpuTime,
    Cgroup,
}

impl SortKey {
    /// Ascending comparison of two rows on this key.
    pub fn compare(&self, a: &DisplayRow, b: &DisplayRow) -> Ordering {
        match self {
            SortKey::Owner => a.owner.cmp(&b.owner),
            SortKey::Type => a.kind.as_str().cmp(b.kind.as_str()),
            SortKey::Tasks => a.cur_tasks.cmp(&b.cur_tasks),
            SortKey::Memory => a.memory_cur_bytes.cmp(&b.memory_cur_bytes),
            SortKey::CpuTotal => a.cpu_total.total_cmp(&b.cpu_total),
            SortKey::Blkio => a.blkio_bw_bytes.total_cmp(&b.blkio_bw_bytes),
            SortKey::CpuTime => a.cpu_total_seconds.cmp(&b.cpu_total_seconds),
            SortKey::Cgroup => a.cgroup.cmp(&b.cgroup),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Owner,
    Type,
    Processes,
    Memory,
    CpuSys,
    CpuUser,
    Blkio,
    CpuTime,
    Name,
}

impl ColumnKind {
    pub const ALL: [ColumnKind; 9] = [
        ColumnKind::Owner,
        ColumnKind::Type,
        ColumnKind::Processes,
        ColumnKind::Memory,
        ColumnKind::CpuSys,
        ColumnKind::CpuUser,
        ColumnKind::Blkio,
        ColumnKind::CpuTime,
        ColumnKind::Name,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|col| col.name() == name)
    }

    /// Name accepted on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Owner => "owner",
            ColumnKind::Type => "type",
            ColumnKind::Processes => "processes",
            ColumnKind::Memory => "memory",
            ColumnKind::CpuSys => "cpu-sys",
            ColumnKind::CpuUser => "cpu-user",
            ColumnKind::Blkio => "blkio",
            ColumnKind::CpuTime => "cpu-time",
            ColumnKind::Name => "name",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ColumnKind::Owner => "OWNER",
            ColumnKind::Type => "TYPE",
            ColumnKind::Processes => "PROC",
            ColumnKind::Memory => "MEMORY",
            ColumnKind::CpuSys => "SYST",
            ColumnKind::CpuUser => "USER",
            ColumnKind::Blkio => "BLKIO",
            ColumnKind::CpuTime => "TIME+",
            ColumnKind::Name => "CGROUP",
        }
    }

    /// Fixed cell width; `None` means the column takes whatever is left.
    pub fn width(&self) -> Option<usize> {
        match self {
            ColumnKind::Owner | ColumnKind::Type | ColumnKind::Blkio => Some(10),
            ColumnKind::Processes => Some(11),
            ColumnKind::Memory => Some(17),
            ColumnKind::CpuSys | ColumnKind::CpuUser => Some(5),
            ColumnKind::CpuTime => Some(14),
            ColumnKind::Name => None,
        }
    }

    /// Alignment of the header title.
    pub fn align(&self) -> Align {
        match self {
            ColumnKind::Owner | ColumnKind::Type | ColumnKind::Name => Align::Left,
            ColumnKind::Processes => Align::Right,
            _ => Align::Center,
        }
    }

    /// Alignment of the data cells.
    pub fn cell_align(&self) -> Align {
        match self {
            ColumnKind::CpuSys | ColumnKind::CpuUser | ColumnKind::Blkio | ColumnKind::CpuTime => {
                Align::Right
            }
            _ => Align::Left,
        }
    }

    pub fn sort_key(&self) -> SortKey {
        match self {
            ColumnKind::Owner => SortKey::Owner,
            ColumnKind::Type => SortKey::Type,
            ColumnKind::Processes => SortKey::Tasks,
            ColumnKind::Memory => SortKey::Memory,
            ColumnKind::CpuSys | ColumnKind::CpuUser => SortKey::CpuTotal,
            ColumnKind::Blkio => SortKey::Blkio,
            ColumnKind::CpuTime => SortKey::CpuTime,
            ColumnKind::Name => SortKey::Cgroup,
        }
    }

    /// Unpadded cell text for `row`.
    pub fn value(&self, row: &DisplayRow) -> String {
        match self {
            ColumnKind::Owner => row.owner.clone(),
            ColumnKind::Type => row.kind.to_string(),
            ColumnKind::Processes => row.tasks.clone(),
            ColumnKind::Memory => row.memory_cur_str.clone(),
            ColumnKind::CpuSys => percent(row.cpu_syst, self.width()),
            ColumnKind::CpuUser => percent(row.cpu_user, self.width()),
            ColumnKind::Blkio => row.blkio_bw.clone(),
            ColumnKind::CpuTime => row.cpu_total_str.clone(),
            ColumnKind::Name => row.cgroup.clone(),
        }
    }
}

/// `12.3%`, dropping the decimal when that would not fit `width`.
fn percent(value: f64, width: Option<usize>) -> String {
    let text = format!("{:.1}%", value);
    match width {
        Some(width) if text.chars().count() > width => format!("{:.0}%", value),
        _ => text,
    }
}

/// Pad `text` to exactly `width` characters, clipping it when longer.
pub fn format_cell(text: &str, width: usize, align: Align) -> String {
    let text = truncate_to_width(text, width);
    match align {
        Align::Left => format!("{:<width$}", text),
        Align::Right => format!("{:>width$}", text),
        Align::Center => format!("{:^width$}", text),
    }
}

/// Column under horizontal position `x` of the header row.
///
/// Each fixed column occupies its width plus one separator space; the last,
/// variable width column catches everything to its right.
pub fn column_at(columns: &[ColumnKind], x: usize) -> Option<ColumnKind> {
    let mut x_max = 0;
    for col in columns {
        match col.width() {
            None => return Some(*col),
            Some(width) if x < x_max + width => return Some(*col),
            Some(width) => x_max += width + 1,
        }
    }
    None
}
