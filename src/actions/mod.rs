use anyhow::Result;
use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::collection::cgroup::user_name;
use crate::collection::classify::{Backends, CgroupType, docker_target_name, libvirt_vm_name};
use crate::utils::base_name;

/// Lifecycle operations that can be sent to the tool owning a cgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Attach,
    Enter,
    Stop,
    Kill,
    Checkpoint,
}

impl Action {
    pub fn from_key(c: char) -> Option<Self> {
        match c {
            'a' => Some(Action::Attach),
            'e' => Some(Action::Enter),
            's' => Some(Action::Stop),
            'k' => Some(Action::Kill),
            'c' => Some(Action::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAs {
    CurrentUser,
    User(String),
}

/// A fully resolved command line plus how it should be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCommand {
    pub argv: Vec<String>,
    pub run_as: RunAs,
    /// Interactive commands take over the terminal until they exit.
    pub interactive: bool,
}

impl ActionCommand {
    fn new(argv: &[&str], run_as: RunAs, interactive: bool) -> Self {
        Self {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            run_as,
            interactive,
        }
    }
}

/// Build the command for `action` on a cgroup, or `None` when its type or the
/// installed tooling does not support it.
pub fn command_for(
    action: Action,
    cgroup: &str,
    kind: CgroupType,
    owner: &str,
    backends: &Backends,
) -> Option<ActionCommand> {
    if !backends.supports(kind) {
        return None;
    }

    let owner = RunAs::User(owner.to_string());
    let name = base_name(cgroup);

    let command = match (kind, action) {
        (CgroupType::Docker, action) => {
            let name = docker_target_name(cgroup);
            let name = name.as_str();
            match action {
                Action::Attach => ActionCommand::new(&["docker", "attach", name], RunAs::CurrentUser, true),
                Action::Enter => ActionCommand::new(
                    &["docker", "exec", "-it", name, "/bin/bash"],
                    RunAs::CurrentUser,
                    true,
                ),
                Action::Stop => ActionCommand::new(&["docker", "stop", name], RunAs::CurrentUser, false),
                Action::Kill => ActionCommand::new(
                    &["docker", "stop", "-t", "0", name],
                    RunAs::CurrentUser,
                    false,
                ),
                Action::Checkpoint => return None,
            }
        }
        (CgroupType::Lxc | CgroupType::LxcUser, action) => match action {
            Action::Attach => ActionCommand::new(
                &["lxc-console", "--name", name, "--", "/bin/bash"],
                owner,
                true,
            ),
            Action::Enter => ActionCommand::new(
                &["lxc-attach", "--name", name, "--", "/bin/bash"],
                owner,
                true,
            ),
            Action::Stop => ActionCommand::new(
                &["lxc-stop", "--name", name, "--nokill", "--nowait"],
                owner,
                false,
            ),
            Action::Kill => ActionCommand::new(
                &["lxc-stop", "-k", "--name", name, "--nowait"],
                owner,
                false,
            ),
            Action::Checkpoint => return None,
        },
        (CgroupType::OpenVz, action) => match action {
            Action::Attach => ActionCommand::new(&["vzctl", "console", name], owner, true),
            Action::Enter => ActionCommand::new(&["vzctl", "enter", name], owner, true),
            Action::Stop => ActionCommand::new(&["vzctl", "stop", name], owner, false),
            Action::Kill => ActionCommand::new(&["vzctl", "stop", name, "--fast"], owner, false),
            Action::Checkpoint => ActionCommand::new(&["vzctl", "chkpnt", name], owner, false),
        },
        (CgroupType::QemuKvm, action) => {
            let vm = libvirt_vm_name(cgroup);
            let vm = vm.as_str();
            match action {
                Action::Attach => ActionCommand::new(&["virsh", "console", vm], owner, true),
                Action::Stop => ActionCommand::new(&["virsh", "shutdown", vm], owner, false),
                Action::Kill => ActionCommand::new(&["virsh", "destroy", vm], owner, false),
                Action::Enter | Action::Checkpoint => return None,
            }
        }
        (CgroupType::Systemd | CgroupType::Unknown, _) => return None,
    };
    Some(command)
}

/// Key hints shown in the status bar for a row of type `kind`.
pub fn action_hints(kind: CgroupType, backends: &Backends) -> Option<&'static str> {
    if !backends.supports(kind) {
        return None;
    }
    match kind {
        CgroupType::OpenVz => Some("[A]ttach, [E]nter, [S]top, [C]hkpnt, [K]ill"),
        CgroupType::QemuKvm => Some("[A]ttach, [S]top, [K]ill"),
        CgroupType::Docker | CgroupType::Lxc | CgroupType::LxcUser => {
            Some("[A]ttach, [E]nter, [S]top, [K]ill")
        }
        CgroupType::Systemd | CgroupType::Unknown => None,
    }
}

/// Prefix `argv` with whatever it takes to run it as the requested user.
pub fn wrap_privileges(
    argv: &[String],
    run_as: &RunAs,
    is_root: bool,
    current_user: &str,
) -> Vec<String> {
    let user = match run_as {
        RunAs::User(user) if user != current_user => user,
        _ => return argv.to_vec(),
    };

    if is_root {
        vec!["su".to_string(), user.clone(), "-c".to_string(), shell_join(argv)]
    } else if user == "root" {
        std::iter::once("sudo".to_string()).chain(argv.iter().cloned()).collect()
    } else {
        ["sudo", "-u", user.as_str()]
            .into_iter()
            .map(str::to_string)
            .chain(argv.iter().cloned())
            .collect()
    }
}

fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| format!("'{}'", arg.replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Starts external processes.
#[cfg_attr(test, mockall::automock)]
pub trait Spawner {
    /// Run attached to the real terminal and wait for it to exit.
    fn run_foreground(&mut self, argv: &[String]) -> io::Result<ExitStatus>;
    /// Start in the background with all output discarded.
    fn spawn_detached(&mut self, argv: &[String]) -> io::Result<()>;
}

/// Hands the terminal over to a foreground command and takes it back.
#[cfg_attr(test, mockall::automock)]
pub trait TerminalControl {
    fn suspend(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
}

#[derive(Default)]
pub struct ProcessSpawner {
    children: Vec<Child>,
}

impl ProcessSpawner {
    /// Drop background children that already exited.
    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }

    pub fn pending(&self) -> usize {
        self.children.len()
    }
}

impl Spawner for ProcessSpawner {
    fn run_foreground(&mut self, argv: &[String]) -> io::Result<ExitStatus> {
        let (program, args) = split_argv(argv)?;
        Command::new(program).args(args).status()
    }

    fn spawn_detached(&mut self, argv: &[String]) -> io::Result<()> {
        self.reap();
        let (program, args) = split_argv(argv)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        self.children.push(child);
        Ok(())
    }
}

fn split_argv(argv: &[String]) -> io::Result<(&String, &[String])> {
    argv.split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Rendering,
    Suspended,
}

pub struct ActionRunner<S: Spawner> {
    spawner: S,
    state: SessionState,
    is_root: bool,
    current_user: String,
}

impl ActionRunner<ProcessSpawner> {
    pub fn new() -> Self {
        let uid = nix::unistd::geteuid();
        Self::with_spawner(ProcessSpawner::default(), uid.is_root(), user_name(uid.as_raw()))
    }
}

impl Default for ActionRunner<ProcessSpawner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Spawner> ActionRunner<S> {
    pub fn with_spawner(spawner: S, is_root: bool, current_user: String) -> Self {
        Self {
            spawner,
            state: SessionState::Rendering,
            is_root,
            current_user,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run `command`. Interactive commands suspend the terminal UI and block until the
    /// command exits; the UI is resumed afterwards whatever the outcome.
    pub fn run<T>(&mut self, command: &ActionCommand, terminal: &mut T) -> Result<()>
    where
        T: TerminalControl + ?Sized,
    {
        let argv = wrap_privileges(&command.argv, &command.run_as, self.is_root, &self.current_user);
        log::info!("Running {:?} (interactive: {})", argv, command.interactive);

        if !command.interactive {
            if let Err(e) = self.spawner.spawn_detached(&argv) {
                log::warn!("Failed to start {:?}: {}", argv, e);
            }
            return Ok(());
        }

        self.state = SessionState::Suspended;
        let suspended = terminal.suspend();
        if suspended.is_ok() {
            match self.spawner.run_foreground(&argv) {
                Ok(status) => log::info!("{:?} exited with {}", argv, status),
                Err(e) => log::warn!("Failed to run {:?}: {}", argv, e),
            }
        }
        let resumed = terminal.resume();
        self.state = SessionState::Rendering;

        suspended.and(resumed)
    }
}
