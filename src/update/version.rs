use std::cmp::Ordering;

/// Compare dotted version strings segment by segment.
///
/// Numeric segments compare as numbers, anything else lexically. Missing
/// trailing segments count as `0`, so `1.2` equals `1.2.0`. A leading `v`
/// is ignored.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left: Vec<&str> = segments(left).collect();
    let right: Vec<&str> = segments(right).collect();
    let len = left.len().max(right.len());

    for i in 0..len {
        let a = left.get(i).copied().unwrap_or("0");
        let b = right.get(i).copied().unwrap_or("0");

        let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Whether `candidate` is strictly newer than `current`
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

fn segments(version: &str) -> impl Iterator<Item = &str> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    version.split('.').map(str::trim)
}
