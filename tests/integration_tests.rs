mod common;

use assert_matches::assert_matches;
use common::{FakeHierarchy, sample_rows};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ctop::actions::RunAs;
use ctop::app::columns::SortKey;
use ctop::app::{App, CliArgs, Config, ViewState};
use ctop::canvas::Canvas;
use ctop::collection::classify::{Backends, CgroupType};
use ctop::events::{Directive, InputEvent};
use ctop::stats::{DisplayRow, build_rows};
use clap::Parser;
use pretty_assertions::assert_eq;

fn key(c: char) -> InputEvent {
    InputEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
}

fn code(code: KeyCode) -> InputEvent {
    InputEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

fn all_backends() -> Backends {
    Backends {
        docker: true,
        lxc: true,
        openvz: true,
        libvirt: true,
    }
}

fn app_from_flags(flags: &[&str], backends: Backends) -> App {
    let args = CliArgs::try_parse_from(std::iter::once("ctop").chain(flags.iter().copied())).unwrap();
    let config = Config::from_args(&args).unwrap();
    App::new(ViewState::from_config(&config), backends)
}

fn names(app: &mut App, rows: &[DisplayRow]) -> Vec<String> {
    let screen = Canvas::layout(rows, &mut app.view, &app.backends, 160, 30);
    screen.lines.into_iter().map(|l| l.name).collect()
}

#[test]
fn test_toggle_tree_and_fold_through_keys() {
    let rows = sample_rows();
    let mut app = app_from_flags(&["--sort-col", "name"], Backends::default());
    // name sort starts descending
    app.view.set_sort_col(SortKey::Cgroup);

    assert_eq!(names(&mut app, &rows).len(), rows.len());

    assert_eq!(app.apply(code(KeyCode::F(5))), Directive::Redraw);
    assert_eq!(
        names(&mut app, &rows),
        vec!["[root]", "docker", "abc", "lxc", "box", "system.slice", "ssh.service", "x.scope"]
    );

    // select /lxc and fold it
    for _ in 0..3 {
        app.apply(code(KeyCode::Down));
    }
    names(&mut app, &rows);
    assert_eq!(app.view.selected_name, "/lxc");
    assert_eq!(app.apply(key('+')), Directive::Redraw);
    assert_eq!(
        names(&mut app, &rows),
        vec!["[root]", "docker", "abc", "lxc", "system.slice", "ssh.service", "x.scope"]
    );

    let screen = Canvas::layout(&rows, &mut app.view, &app.backends, 160, 30);
    assert!(screen.status.contains("[+/-] unfold"));
}

#[test]
fn test_follow_keeps_tracking_after_reorder() {
    let mut rows = sample_rows();
    let mut app = app_from_flags(&["--follow", "/docker/abc"], Backends::default());

    names(&mut app, &rows);
    assert_eq!(app.view.selected.as_ref().map(|s| s.cgroup.as_str()), Some("/docker/abc"));

    // the container gets busy and moves to the top of the cpu sort
    rows[2].cpu_total = 90.0;
    assert_eq!(names(&mut app, &rows)[0], "/docker/abc");
    assert_eq!(app.view.selected_index, 0);

    // then disappears: the selection falls back to its parent
    rows.remove(2);
    names(&mut app, &rows);
    assert_eq!(app.view.selected_name, "/docker");
}

#[test]
fn test_header_click_sorts_by_column() {
    let mut rows = sample_rows();
    rows[6].memory_cur_bytes = 10;
    rows[4].memory_cur_bytes = 20;
    let mut app = app_from_flags(&["--columns", "memory"], Backends::default());

    assert_eq!(app.apply(InputEvent::Click { column: 3, row: 0 }), Directive::Redraw);
    assert_eq!(app.view.sort_by, SortKey::Memory);
    let order = names(&mut app, &rows);
    assert_eq!(&order[..2], ["/lxc/box", "/system.slice/ssh.service"]);

    app.apply(InputEvent::Click { column: 3, row: 0 });
    assert!(app.view.sort_asc);
    assert_eq!(names(&mut app, &rows).last().map(String::as_str), Some("/lxc/box"));

    // anything right of the fixed columns is the name column
    app.apply(InputEvent::Click { column: 40, row: 0 });
    assert_eq!(app.view.sort_by, SortKey::Cgroup);
}

#[test]
fn test_actions_need_backend_and_selection() {
    let rows = sample_rows();
    let mut app = app_from_flags(&["--sort-col", "name", "--type", "lxc"], all_backends());

    // nothing laid out yet
    assert_eq!(app.apply(key('a')), Directive::Continue);

    names(&mut app, &rows);
    assert_eq!(app.view.selected_name, "/lxc/box");
    assert_matches!(
        app.apply(key('e')),
        Directive::Run(cmd) if cmd.argv == ["lxc-attach", "--name", "box", "--", "/bin/bash"]
            && cmd.run_as == RunAs::User("root".into())
            && cmd.interactive
    );
    assert_matches!(
        app.apply(key('k')),
        Directive::Run(cmd) if !cmd.interactive
    );

    let mut no_tools = app_from_flags(&["--type", "lxc"], Backends::default());
    names(&mut no_tools, &rows);
    assert_eq!(no_tools.apply(key('e')), Directive::Redraw);
}

#[test]
fn test_pause_and_quit() {
    let mut app = app_from_flags(&[], Backends::default());
    assert_eq!(app.apply(key('p')), Directive::Redraw);
    assert!(app.view.paused);
    assert_eq!(app.apply(InputEvent::Resize), Directive::Redraw);
    assert_eq!(app.apply(code(KeyCode::Esc)), Directive::Quit);
    assert_eq!(
        app.apply(InputEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))),
        Directive::Quit
    );
}

#[test]
fn test_collect_build_and_layout() {
    let fake = FakeHierarchy::new();
    fake.add_cgroup("cpuacct", "/", &[1]);
    fake.write("cpuacct", "/", "cpuacct.stat", "user 10\nsystem 10\n");
    fake.add_cgroup("cpuacct", "/system.slice", &[2]);
    fake.write("cpuacct", "/system.slice", "cpuacct.stat", "user 5\nsystem 5\n");
    fake.add_cgroup("cpuacct", "/system.slice/cron.service", &[3, 4]);
    fake.write("cpuacct", "/system.slice/cron.service", "cpuacct.stat", "user 1\nsystem 1\n");

    let mut collector = fake.collector(&["cpuacct"]);
    collector.collect_metrics().unwrap();
    let sample = collector.current().unwrap();
    let rows = build_rows(sample, collector.previous().map(|p| p.taken_at));
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.cpu_total == 0.0));
    assert_eq!(rows[2].kind, CgroupType::Systemd);

    let mut app = app_from_flags(&["--tree", "--type", "systemd", "--sort-col", "name"], Backends::default());
    let screen = Canvas::layout(&rows, &mut app.view, &app.backends, 120, 10);
    let tree: Vec<String> = screen.lines.iter().map(|l| format!("{}{}", l.tree, l.name)).collect();
    assert_eq!(tree, vec!["[root]", "└─ system.slice", "   └─ cron.service"]);
    assert!(screen.lines[2].cells.contains("    2/max"));
}
