//! Line-based unified diff.
//!
//! Myers' O(ND) shortest edit script over lines, grouped into hunks with the
//! same range notation as GNU diff and Python's difflib. Output is a pure
//! function of the two inputs.

/// Edit distance above which the search gives up and emits a whole-file
/// replacement. Keeps the trace (roughly D² entries) bounded.
const MAX_EDIT_COST: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// Split text into lines, dropping exactly one terminal separator.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Unified diff hunks (`@@` headers and prefixed lines) turning `old` into `new`.
/// Empty when the line sequences are equal.
pub fn unified_hunks(old: &[&str], new: &[&str], context: usize) -> Vec<String> {
    let ops = edit_script(old, new);
    if ops.iter().all(|op| *op == Op::Equal) {
        return Vec::new();
    }

    // (old, new) line position before each op.
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut i, mut j) = (0usize, 0usize);
    for op in &ops {
        positions.push((i, j));
        match op {
            Op::Equal => {
                i += 1;
                j += 1;
            }
            Op::Delete => i += 1,
            Op::Insert => j += 1,
        }
    }

    let mut out = Vec::new();
    for (start, end) in group_changes(&ops, context) {
        let (old_start, new_start) = positions[start];
        let old_len = ops[start..end].iter().filter(|op| **op != Op::Insert).count();
        let new_len = ops[start..end].iter().filter(|op| **op != Op::Delete).count();
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(old_start, old_len),
            format_range(new_start, new_len)
        ));

        for (k, op) in ops[start..end].iter().enumerate() {
            let (i, j) = positions[start + k];
            match op {
                Op::Equal => out.push(format!(" {}", old[i])),
                Op::Delete => out.push(format!("-{}", old[i])),
                Op::Insert => out.push(format!("+{}", new[j])),
            }
        }
    }
    out
}

/// `start` is zero based; output is one based, `start` alone for one line,
/// and the line before the range for empty ranges.
fn format_range(start: usize, len: usize) -> String {
    match len {
        1 => format!("{}", start + 1),
        0 => format!("{},0", start),
        _ => format!("{},{}", start + 1, len),
    }
}

/// Op-index ranges of each hunk, with `context` equal ops on either side.
/// Changes separated by at most `2 * context` equal lines share a hunk.
fn group_changes(ops: &[Op], context: usize) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (idx, _) in ops.iter().enumerate().filter(|(_, op)| **op != Op::Equal) {
        let lo = idx.saturating_sub(context);
        let hi = (idx + context + 1).min(ops.len());
        current = match current {
            Some((start, end)) if lo <= end => Some((start, hi)),
            Some(done) => {
                groups.push(done);
                Some((lo, hi))
            }
            None => Some((lo, hi)),
        };
    }
    groups.extend(current);
    groups
}

fn edit_script(old: &[&str], new: &[&str]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let mut ops = vec![Op::Equal; prefix];
    match myers(a, b) {
        Some(middle) => ops.extend(middle),
        None => {
            ops.extend(std::iter::repeat(Op::Delete).take(a.len()));
            ops.extend(std::iter::repeat(Op::Insert).take(b.len()));
        }
    }
    ops.extend(std::iter::repeat(Op::Equal).take(suffix));
    ops
}

/// Shortest edit script, or `None` past [`MAX_EDIT_COST`].
fn myers(a: &[&str], b: &[&str]) -> Option<Vec<Op>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = (n + m) as usize;
    let offset = max as isize + 1;
    let idx = |k: isize| (k + offset) as usize;

    let mut v = vec![0isize; 2 * max + 3];
    // trace[d] holds v[-d..=d] as it was before step d.
    let mut trace: Vec<Vec<isize>> = Vec::new();
    let mut found = None;

    'search: for d in 0..=max.min(MAX_EDIT_COST) as isize {
        trace.push(v[idx(-d)..=idx(d)].to_vec());
        for k in (-d..=d).step_by(2) {
            let mut x = if k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]) {
                v[idx(k + 1)]
            } else {
                v[idx(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx(k)] = x;
            if x >= n && y >= m {
                found = Some(d);
                break 'search;
            }
        }
    }
    found?;

    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, snapshot) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| snapshot[(k + d) as usize];
        let k = x - y;

        if d == 0 {
            while x > 0 && y > 0 {
                ops.push(Op::Equal);
                x -= 1;
                y -= 1;
            }
            break;
        }

        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(Op::Equal);
            x -= 1;
            y -= 1;
        }
        ops.push(if x == prev_x { Op::Insert } else { Op::Delete });
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    Some(ops)
}
