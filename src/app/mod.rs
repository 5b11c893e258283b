pub mod columns;

use clap::Parser;
use crossterm::event::KeyCode;
use hashbrown::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::actions::{Action, command_for};
use crate::collection::CollectError;
use crate::collection::classify::{Backends, CgroupType};
use crate::events::{Directive, InputEvent};
use crate::utils::parent_path;
use crate::widgets::TreeLine;
use columns::{ColumnKind, SortKey, column_at};

pub const DEFAULT_COLUMNS: &str = "owner,type,processes,memory,cpu-sys,cpu-user,blkio,cpu-time";

/// ctop - a top like view of cgroups and the containers living in them
#[derive(Parser, Debug)]
#[command(name = "ctop")]
#[command(about = "Monitor cgroup resource usage and the containers behind them", long_about = None)]
pub struct CliArgs {
    /// Show tree view by default
    #[arg(long)]
    pub tree: bool,

    /// Refresh display every <seconds>
    #[arg(long, default_value_t = 1.0)]
    pub refresh: f64,

    /// Comma separated optional columns to display. Always includes 'name'
    #[arg(long, default_value = DEFAULT_COLUMNS)]
    pub columns: String,

    /// Column to sort by initially. Can be changed dynamically
    #[arg(long = "sort-col", default_value = "cpu-user")]
    pub sort_col: String,

    /// Follow/highlight cgroup at path
    #[arg(long)]
    pub follow: Option<String>,

    /// Fold cgroup sub tree (repeatable)
    #[arg(long)]
    pub fold: Vec<String>,

    /// Only show containers of this type (repeatable)
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Write log records to this file instead of stderr
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid column name {0}")]
    InvalidColumn(String),
    #[error("Invalid sort column name {0}")]
    InvalidSortColumn(String),
    #[error("Invalid cgroup type {0}")]
    InvalidType(String),
    #[error("Refresh interval must be a positive number of seconds")]
    InvalidRefresh,
}

/// Validated startup settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tree: bool,
    pub refresh: Duration,
    /// Displayed columns, `name` always last.
    pub columns: Vec<ColumnKind>,
    pub sort_by: SortKey,
    pub follow: Option<String>,
    pub fold: Vec<String>,
    pub types: Vec<CgroupType>,
}

impl Config {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if !args.refresh.is_finite() || args.refresh <= 0.0 {
            return Err(ConfigError::InvalidRefresh);
        }

        let mut columns = Vec::new();
        for name in args.columns.split(',').map(str::trim) {
            match ColumnKind::from_name(name) {
                Some(ColumnKind::Name) => continue,
                Some(col) => columns.push(col),
                None => return Err(ConfigError::InvalidColumn(name.to_string())),
            }
        }
        columns.push(ColumnKind::Name);

        let sort_by = ColumnKind::from_name(&args.sort_col)
            .map(|col| col.sort_key())
            .ok_or_else(|| ConfigError::InvalidSortColumn(args.sort_col.clone()))?;

        let types = args
            .types
            .iter()
            .map(|t| t.parse().map_err(|_| ConfigError::InvalidType(t.clone())))
            .collect::<Result<Vec<CgroupType>, _>>()?;

        Ok(Self {
            tree: args.tree,
            refresh: Duration::from_secs_f64(args.refresh),
            columns,
            sort_by,
            follow: args.follow.clone().filter(|f| !f.is_empty()),
            fold: args.fold.clone(),
            types,
        })
    }
}

pub const NO_CGROUP_WARNING: &str = "[WARN] Failed to find any relevant cgroup/container.";

/// Turn the outcome of the main loop into the warning to print after the
/// terminal is restored, if any.
///
/// Running out of cgroups is a normal way to stop, as is quitting with almost
/// nothing on screen; every other error is passed on.
pub fn exit_report(result: anyhow::Result<usize>) -> anyhow::Result<Option<&'static str>> {
    match result {
        Ok(displayed) if displayed < 2 => Ok(Some(NO_CGROUP_WARNING)),
        Ok(_) => Ok(None),
        Err(err) => match err.downcast_ref::<CollectError>() {
            Some(CollectError::NoCgroups) => {
                log::warn!("Stopping: {}", err);
                Ok(Some(NO_CGROUP_WARNING))
            }
            _ => Err(err),
        },
    }
}

/// The row an action would apply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub cgroup: String,
    pub kind: CgroupType,
    pub owner: String,
}

/// Everything the input handlers mutate and the renderer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub columns: Vec<ColumnKind>,
    pub sort_by: SortKey,
    pub sort_asc: bool,
    pub tree: bool,
    pub follow: bool,
    pub paused: bool,
    pub refresh: Duration,
    pub fold: HashSet<String>,
    pub type_filter: HashSet<CgroupType>,
    pub selected_index: usize,
    pub selected_name: String,
    /// Index of the first displayed row.
    pub offset: usize,
    /// Rows that fit between the header and the status bar, as of the last layout.
    pub list_height: usize,
    /// Paths in display order as of the last layout.
    pub visible: Vec<String>,
    pub selected: Option<Selection>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS
                .split(',')
                .filter_map(ColumnKind::from_name)
                .chain([ColumnKind::Name])
                .collect(),
            sort_by: SortKey::CpuTotal,
            sort_asc: false,
            tree: false,
            follow: false,
            paused: false,
            refresh: Duration::from_secs(1),
            fold: HashSet::new(),
            type_filter: HashSet::new(),
            selected_index: 0,
            selected_name: "/".to_string(),
            offset: 0,
            list_height: 0,
            visible: Vec::new(),
            selected: None,
        }
    }
}

impl ViewState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            columns: config.columns.clone(),
            sort_by: config.sort_by,
            tree: config.tree,
            follow: config.follow.is_some(),
            refresh: config.refresh,
            fold: config.fold.iter().cloned().collect(),
            type_filter: config.types.iter().copied().collect(),
            selected_name: config.follow.clone().unwrap_or_else(|| "/".to_string()),
            ..Self::default()
        }
    }

    /// Select `sort_by`, or flip the direction if it already is the sort key.
    pub fn set_sort_col(&mut self, sort_by: SortKey) {
        if self.sort_by == sort_by {
            self.sort_asc = !self.sort_asc;
        } else {
            self.sort_by = sort_by;
        }
    }

    /// Re-anchor the selection on freshly prepared `lines`.
    ///
    /// While following, the selection tracks its path and falls back to the
    /// closest displayed ancestor; otherwise it keeps its (clamped) index.
    pub fn sync_selection(&mut self, lines: &[TreeLine<'_>]) {
        self.visible = lines.iter().map(|line| line.row.cgroup.clone()).collect();

        if lines.is_empty() {
            self.selected_index = 0;
            self.selected_name.clear();
            self.selected = None;
            return;
        }

        let followed = if self.follow { self.find_followed() } else { None };
        match followed {
            Some(index) => self.selected_index = index,
            None => {
                self.selected_index = self.selected_index.min(lines.len() - 1);
                self.selected_name = self.visible[self.selected_index].clone();
            }
        }

        let row = lines[self.selected_index].row;
        self.selected = Some(Selection {
            cgroup: row.cgroup.clone(),
            kind: row.kind,
            owner: row.owner.clone(),
        });
    }

    /// Position of the followed path or of its nearest displayed ancestor.
    fn find_followed(&mut self) -> Option<usize> {
        loop {
            if let Some(index) = self.position(&self.selected_name) {
                return Some(index);
            }
            let parent = parent_path(&self.selected_name);
            if parent == self.selected_name {
                return None;
            }
            self.selected_name = parent.to_string();
        }
    }

    fn position(&self, cgroup: &str) -> Option<usize> {
        self.visible.iter().position(|c| c == cgroup)
    }

    /// Scroll just enough to keep the selection inside a window of `list_height` rows.
    pub fn update_offset(&mut self, total: usize, list_height: usize) {
        self.list_height = list_height;
        let max_offset = total.saturating_sub(list_height);
        if self.selected_index < self.offset {
            self.offset = self.selected_index;
        } else if list_height > 0 && self.selected_index - self.offset > list_height - 1 {
            self.offset = self.selected_index + 1 - list_height;
        } else if self.offset > max_offset {
            self.offset = max_offset;
        }
    }

    /// Move the selection by `delta` rows, clamped to the visible list.
    pub fn move_selection(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let current = if self.follow {
            self.position(&self.selected_name)
                .unwrap_or(self.selected_index)
        } else {
            self.selected_index
        };
        let index = current
            .saturating_add_signed(delta)
            .min(self.visible.len() - 1);
        self.select_index(index);
    }

    fn select_index(&mut self, index: usize) {
        self.selected_index = index;
        self.selected_name = self.visible[index].clone();
    }

    /// Fold the selected node, or unfold it if already folded.
    pub fn toggle_fold(&mut self) -> bool {
        let Some(selected) = &self.selected else {
            return false;
        };
        if !self.fold.remove(&selected.cgroup) {
            self.fold.insert(selected.cgroup.clone());
        }
        true
    }

    pub fn is_folded(&self, cgroup: &str) -> bool {
        self.fold.contains(cgroup)
    }

    /// Select the row drawn at screen line `y` (the header is line 0).
    ///
    /// Lines past the list window, such as the status bar, select nothing.
    pub fn select_screen_row(&mut self, y: usize) -> bool {
        if y == 0 || y > self.list_height {
            return false;
        }
        let index = self.offset + y - 1;
        if index >= self.visible.len() {
            return false;
        }
        self.select_index(index);
        true
    }
}

pub struct App {
    pub view: ViewState,
    pub backends: Backends,
}

impl App {
    pub fn new(view: ViewState, backends: Backends) -> Self {
        Self { view, backends }
    }

    /// Apply one input event to the view state.
    pub fn apply(&mut self, event: InputEvent) -> Directive {
        if event.is_quit_key() {
            return Directive::Quit;
        }
        match event {
            InputEvent::Key(key) => self.on_keyboard(key.code),
            InputEvent::Click { column, row } => self.on_mouse(column as usize, row as usize),
            InputEvent::Resize => Directive::Redraw,
        }
    }

    fn on_keyboard(&mut self, code: KeyCode) -> Directive {
        match code {
            KeyCode::Char('p') => {
                self.view.paused = !self.view.paused;
                log::debug!("Pause: {}", self.view.paused);
                return Directive::Redraw;
            }
            KeyCode::Char('f') => {
                self.view.follow = !self.view.follow;
                return Directive::Redraw;
            }
            KeyCode::F(5) => {
                self.view.tree = !self.view.tree;
                return Directive::Redraw;
            }
            KeyCode::Down => {
                self.view.move_selection(1);
                return Directive::Redraw;
            }
            KeyCode::Up => {
                self.view.move_selection(-1);
                return Directive::Redraw;
            }
            _ => {}
        }

        // everything below needs a selected row
        let Some(selected) = self.view.selected.clone() else {
            return Directive::Continue;
        };

        match code {
            KeyCode::Char('+') | KeyCode::Char('-') => {
                self.view.toggle_fold();
                Directive::Redraw
            }
            KeyCode::Char(c) => match Action::from_key(c) {
                Some(action) => command_for(
                    action,
                    &selected.cgroup,
                    selected.kind,
                    &selected.owner,
                    &self.backends,
                )
                .map_or(Directive::Redraw, Directive::Run),
                None => {
                    log::debug!("Unhandled key: {:?}", code);
                    Directive::Continue
                }
            },
            _ => Directive::Continue,
        }
    }

    fn on_mouse(&mut self, x: usize, y: usize) -> Directive {
        if y == 0 {
            return match column_at(&self.view.columns, x) {
                Some(col) => {
                    self.view.set_sort_col(col.sort_key());
                    Directive::Redraw
                }
                None => Directive::Continue,
            };
        }
        if self.view.select_screen_row(y) {
            Directive::Redraw
        } else {
            Directive::Continue
        }
    }
}
