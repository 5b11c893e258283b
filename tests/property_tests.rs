mod common;

use common::{FakeHierarchy, row};
use ctop::app::ViewState;
use ctop::collection::classify::CgroupType;
use ctop::stats::DisplayRow;
use ctop::utils::{parent_path, to_human};
use ctop::widgets::{build_tree, filter_tree, prepare_view};
use hashbrown::HashSet;
use proptest::prelude::*;
use std::collections::BTreeMap;

const SEGMENTS: [&str; 3] = ["a", "b", "c"];
const KINDS: [CgroupType; 4] = [
    CgroupType::Docker,
    CgroupType::Lxc,
    CgroupType::Systemd,
    CgroupType::Unknown,
];

// Generate a cgroup path below the root, depth 1 to 4
fn arb_cgroup_path() -> impl Strategy<Value = String> {
    prop::collection::vec(0..SEGMENTS.len(), 1..=4)
        .prop_map(|parts| {
            let parts: Vec<&str> = parts.into_iter().map(|i| SEGMENTS[i]).collect();
            format!("/{}", parts.join("/"))
        })
}

// Generate a complete tree: every ancestor of a generated path is present
fn arb_rows() -> impl Strategy<Value = Vec<DisplayRow>> {
    prop::collection::vec((arb_cgroup_path(), 0..KINDS.len()), 1..25).prop_map(|entries| {
        let mut kinds: BTreeMap<String, CgroupType> = BTreeMap::new();
        kinds.insert("/".to_string(), CgroupType::Unknown);
        for (path, kind) in entries {
            let mut ancestor = parent_path(&path).to_string();
            while ancestor != "/" {
                kinds.entry(ancestor.clone()).or_insert(CgroupType::Unknown);
                ancestor = parent_path(&ancestor).to_string();
            }
            kinds.insert(path, KINDS[kind]);
        }
        kinds.into_iter().map(|(path, kind)| row(&path, kind)).collect()
    })
}

fn arb_filter() -> impl Strategy<Value = HashSet<CgroupType>> {
    prop::collection::vec(0..KINDS.len(), 1..3)
        .prop_map(|kinds| kinds.into_iter().map(|i| KINDS[i]).collect())
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    ancestor == "/" && path != "/" || path.starts_with(&format!("{}/", ancestor))
}

fn paths(rows: &[DisplayRow], tree: bool, types: &HashSet<CgroupType>, fold: &HashSet<String>) -> Vec<String> {
    prepare_view(rows, tree, types, fold)
        .iter()
        .map(|line| line.row.cgroup.clone())
        .collect()
}

// Re-read a humanized value back into bytes
fn parse_human(text: &str) -> f64 {
    let text = text.trim_end_matches('B');
    let (number, unit) = text.split_at(text.len() - 1);
    let exponent = [" ", "K", "M", "G", "T", "P"]
        .iter()
        .position(|u| *u == unit)
        .unwrap();
    number.parse::<f64>().unwrap() * 1024f64.powi(exponent as i32)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_cpu_delta_matches_counter_difference(
        first in (0u64..1_000_000, 0u64..1_000_000),
        increment in (0u64..1_000_000, 0u64..1_000_000),
    ) {
        let fake = FakeHierarchy::new();
        fake.add_cgroup("cpuacct", "/job", &[1]);
        fake.write("cpuacct", "/job", "cpuacct.stat", &format!("user {}\nsystem {}\n", first.0, first.1));
        let mut collector = fake.collector(&["cpuacct"]);
        collector.collect_metrics().unwrap();

        fake.add_cgroup("cpuacct", "/late", &[2]);
        fake.write("cpuacct", "/late", "cpuacct.stat", "user 500\nsystem 500\n");
        fake.write(
            "cpuacct",
            "/job",
            "cpuacct.stat",
            &format!("user {}\nsystem {}\n", first.0 + increment.0, first.1 + increment.1),
        );
        let sample = collector.collect_metrics().unwrap();

        let cpu = sample.records["/job"].cpu.unwrap();
        prop_assert_eq!((cpu.user_delta, cpu.system_delta), increment);
        // absent from the previous sample
        let late = sample.records["/late"].cpu.unwrap();
        prop_assert_eq!((late.user_delta, late.system_delta), (0, 0));
    }

    #[test]
    fn test_humanize_is_monotonic(a in 0u64..(1 << 55), b in 0u64..(1 << 55)) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_text = to_human(low as f64, "B");
        let high_text = to_human(high as f64, "B");
        prop_assert!(parse_human(&low_text) <= parse_human(&high_text), "{} > {}", low_text, high_text);
    }

    #[test]
    fn test_filter_is_idempotent(rows in arb_rows(), keep in arb_filter()) {
        let (_, mut once) = build_tree(&rows);
        filter_tree(&mut once, &keep, "/");
        let mut twice = once.clone();
        filter_tree(&mut twice, &keep, "/");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_filter_keeps_branch_iff_matching_descendant(rows in arb_rows(), keep in arb_filter()) {
        let shown: HashSet<String> = paths(&rows, true, &keep, &HashSet::new()).into_iter().collect();

        for row in rows.iter().filter(|r| r.cgroup != "/") {
            let matches = rows.iter().any(|other| {
                keep.contains(&other.kind)
                    && (other.cgroup == row.cgroup || is_descendant(&other.cgroup, &row.cgroup))
            });
            prop_assert_eq!(shown.contains(&row.cgroup), matches, "{}", row.cgroup);
        }
        prop_assert!(shown.contains("/"));
    }

    #[test]
    fn test_fold_removes_exactly_descendants(rows in arb_rows(), pick in any::<prop::sample::Index>()) {
        let target = rows[pick.index(rows.len())].cgroup.clone();
        let no_fold = HashSet::new();
        let unfolded = paths(&rows, true, &HashSet::new(), &no_fold);

        let mut view = ViewState { tree: true, ..ViewState::default() };
        view.fold.insert(target.clone());
        let folded = paths(&rows, true, &HashSet::new(), &view.fold);

        let expected: Vec<String> = if target == "/" {
            vec!["/".to_string()]
        } else {
            unfolded
                .iter()
                .filter(|p| !is_descendant(p, &target))
                .cloned()
                .collect()
        };
        prop_assert_eq!(folded, expected);

        // unfolding gives back the exact rendering, connectors included
        view.fold.remove(&target);
        let before = prepare_view(&rows, true, &HashSet::new(), &no_fold);
        let after = prepare_view(&rows, true, &HashSet::new(), &view.fold);
        prop_assert_eq!(before, after);
    }

    #[test]
    fn test_follow_resolves_nearest_ancestor(rows in arb_rows(), followed in arb_cgroup_path(), extra in arb_cgroup_path()) {
        let target = format!("{}{}", followed, extra);
        let mut view = ViewState {
            follow: true,
            selected_name: target.clone(),
            ..ViewState::default()
        };
        let lines = prepare_view(&rows, false, &HashSet::new(), &HashSet::new());
        view.sync_selection(&lines);

        let mut expected = target.as_str();
        while !rows.iter().any(|r| r.cgroup == expected) {
            expected = parent_path(expected);
        }
        prop_assert_eq!(view.selected_name.as_str(), expected);
        prop_assert_eq!(&view.visible[view.selected_index], expected);
    }
}
