/// Byte units used by [`to_human`], binary (1024) steps up to petabytes.
const UNITS: &[&str] = &[" ", "K", "M", "G", "T", "P"];

/// Format a byte count as `"{value:.1}{unit}{suffix}"`, e.g. `200.0MB` or `1.5KB/s`.
///
/// Values beyond the petabyte range stay expressed in petabytes.
pub fn to_human(num: f64, suffix: &str) -> String {
    let mut size = num;
    let mut unit_index = 0;

    while size.abs() >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1}{}{}", size, UNITS[unit_index], suffix)
}

/// Format a number of seconds as `Dd HH:MM.SS` (with days) or `HH:MM.SS`.
pub fn to_human_time(total_seconds: u64) -> String {
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = (total_seconds / 3600) % 24;
    let days = total_seconds / 86_400;

    if days > 0 {
        format!("{:>3}d {:02}:{:02}.{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}.{:02}", hours, minutes, seconds)
    }
}

/// Filesystem style parent of a cgroup path. The root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

/// Last component of a cgroup path, empty for the root.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Strip `prefix` from `text` when present, otherwise return `text` untouched.
pub fn strip_prefix<'a>(prefix: &str, text: &'a str) -> &'a str {
    text.strip_prefix(prefix).unwrap_or(text)
}

/// Clip a string to at most `width` characters.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_human_units() {
        assert_eq!(to_human(0.0, "B"), "0.0 B");
        assert_eq!(to_human(1023.0, "B"), "1023.0 B");
        assert_eq!(to_human(1024.0, "B"), "1.0KB");
        assert_eq!(to_human(209_715_200.0, "B"), "200.0MB");
        assert_eq!(to_human(1_073_741_824.0, "B"), "1.0GB");
        assert_eq!(to_human(1536.0, "B/s"), "1.5KB/s");
    }

    #[test]
    fn test_to_human_caps_at_petabytes() {
        let exabyte = 1024f64.powi(6);
        assert_eq!(to_human(exabyte, "B"), "1024.0PB");
    }

    #[test]
    fn test_to_human_time() {
        assert_eq!(to_human_time(0), "00:00.00");
        assert_eq!(to_human_time(61), "00:01.01");
        assert_eq!(to_human_time(3_723), "01:02.03");
        assert_eq!(to_human_time(90_061), "  1d 01:01.01");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/"), "/");
        assert_eq!(parent_path("/docker"), "/");
        assert_eq!(parent_path("/docker/abc"), "/docker");
        assert_eq!(parent_path("/a/b/c"), "/a/b");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/"), "");
        assert_eq!(base_name("/system.slice/ssh.service"), "ssh.service");
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("abcdef", 3), "abc");
        assert_eq!(truncate_to_width("ab", 3), "ab");
    }
}
