use hashbrown::HashMap;
use nix::unistd::{Uid, User};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// One cgroup directory below a controller mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CGroupNode {
    pub path: PathBuf,
    pub base_path: PathBuf,
}

impl CGroupNode {
    pub fn new(path: PathBuf, base_path: PathBuf) -> Self {
        Self { path, base_path }
    }

    /// Path relative to the mountpoint, `/` for the mountpoint itself.
    pub fn short_path(&self) -> String {
        match self.path.strip_prefix(&self.base_path) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy()),
            Err(_) => self.path.to_string_lossy().to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path == self.base_path
    }

    /// Read and parse one controller file of this cgroup.
    pub fn read(&self, file: &str) -> io::Result<ControllerValue> {
        let content = fs::read_to_string(self.path.join(file))?;
        Ok(ControllerValue::parse(file, &content))
    }

    /// Owner of the cgroup, taken from its `tasks` file. Falls back to the numeric uid.
    pub fn owner(&self) -> io::Result<String> {
        let uid = fs::metadata(self.path.join("tasks"))?.uid();
        Ok(user_name(uid))
    }
}

pub fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Depth-first walk over every directory below a mountpoint, the mountpoint first.
///
/// Directories that disappear mid-walk are silently skipped.
pub struct CGroupWalker {
    base_path: PathBuf,
    stack: Vec<PathBuf>,
}

impl CGroupWalker {
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            stack: vec![base_path.to_path_buf()],
        }
    }
}

impl Iterator for CGroupWalker {
    type Item = CGroupNode;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.stack.pop()?;

        if let Ok(entries) = fs::read_dir(&path) {
            let mut children: Vec<PathBuf> = entries
                .flatten()
                .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
                .map(|entry| entry.path())
                .collect();
            // reversed so the stack pops them in name order
            children.sort_by(|a, b| b.cmp(a));
            self.stack.extend(children);
        }

        Some(CGroupNode::new(path, self.base_path.clone()))
    }
}

pub fn cgroups(base_path: &Path) -> CGroupWalker {
    CGroupWalker::new(base_path)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn coerce(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            Value::Int(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            Value::Float(v)
        } else {
            Value::Text(raw.to_string())
        }
    }

    /// Numeric view of the value. Negative numbers clamp to zero, text yields `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some((*v).max(0) as u64),
            Value::Float(v) if v.is_finite() => Some(v.max(0.0) as u64),
            _ => None,
        }
    }
}

/// The three shapes a controller file can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerValue {
    Scalar(Value),
    Lines(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl ControllerValue {
    /// Sniff the layout of `content`: several lines or embedded spaces make a list,
    /// and a list whose first line has a space becomes a key/value map.
    pub fn parse(file: &str, content: &str) -> Self {
        let content = content.trim();

        if file != "tasks" && !content.contains('\n') && !content.contains(' ') {
            return ControllerValue::Scalar(Value::coerce(content));
        }

        let lines: Vec<&str> = content.lines().collect();
        let first = lines.first().copied().unwrap_or("");

        if first.contains(' ') {
            let map = lines
                .iter()
                .filter_map(|line| {
                    let (key, value) = line.split_once(' ')?;
                    Some((key.to_string(), Value::coerce(value.trim_start())))
                })
                .collect();
            ControllerValue::Map(map)
        } else {
            ControllerValue::Lines(
                lines
                    .iter()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .map(Value::coerce)
                    .collect(),
            )
        }
    }

    pub fn scalar(&self) -> Option<&Value> {
        match self {
            ControllerValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn lines(&self) -> &[Value] {
        match self {
            ControllerValue::Lines(lines) => lines,
            _ => &[],
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ControllerValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}
