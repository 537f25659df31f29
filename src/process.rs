//! Process-table and socket observation through host tools.
//!
//! Observation is best-effort: a missing or failing `ps`/`lsof` yields empty
//! results and the run continues with whatever the other facets saw.

use crate::probe::run_probe;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

const PS_TIMEOUT: Duration = Duration::from_secs(5);
const LSOF_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: i32,
    pub parent_pid: i32,
    pub command_line: String,
}

/// One sample of the host process table via `ps -axo pid=,ppid=,command=`.
/// Unparseable lines are skipped; a failed or absent `ps` yields an empty
/// table.
pub fn read_process_table() -> Vec<ProcessRecord> {
    let args: Vec<String> = vec!["-axo".to_string(), "pid=,ppid=,command=".to_string()];
    let out = match run_probe(Path::new("ps"), &args, PS_TIMEOUT, None, None) {
        Ok(out) => out,
        Err(err) => {
            tracing::debug!("process table read failed: {err:#}");
            return Vec::new();
        }
    };
    if out.exit_code != 0 {
        return Vec::new();
    }
    parse_process_table(&out.stdout)
}

pub fn parse_process_table(text: &str) -> Vec<ProcessRecord> {
    let row = Regex::new(r"^\s*(\d+)\s+(\d+)\s+(.*)$").expect("regex for ps rows");
    let mut records = Vec::new();
    for line in text.lines() {
        let Some(caps) = row.captures(line) else {
            continue;
        };
        let (Ok(pid), Ok(parent_pid)) = (caps[1].parse::<i32>(), caps[2].parse::<i32>()) else {
            continue;
        };
        records.push(ProcessRecord {
            pid,
            parent_pid,
            command_line: caps[3].trim().to_string(),
        });
    }
    records
}

/// Transitive closure of `root_pid` over parent links. Always contains the
/// root, whether or not the table does.
pub fn descendants(root_pid: i32, table: &[ProcessRecord]) -> BTreeSet<i32> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for record in table {
        children.entry(record.parent_pid).or_default().push(record.pid);
    }
    let mut seen = BTreeSet::new();
    seen.insert(root_pid);
    let mut queue = vec![root_pid];
    while let Some(current) = queue.pop() {
        for &child in children.get(&current).into_iter().flatten() {
            if seen.insert(child) {
                queue.push(child);
            }
        }
    }
    seen
}

/// Socket lines for one pid via `lsof -nP -i -p <pid>`, whitespace-squashed.
/// A failed or absent `lsof` yields an empty set.
pub fn endpoints_for_pid(pid: i32) -> BTreeSet<String> {
    let args: Vec<String> = vec![
        "-nP".to_string(),
        "-i".to_string(),
        "-p".to_string(),
        pid.to_string(),
    ];
    let out = match run_probe(Path::new("lsof"), &args, LSOF_TIMEOUT, None, None) {
        Ok(out) => out,
        Err(err) => {
            tracing::debug!("socket read for pid {pid} failed: {err:#}");
            return BTreeSet::new();
        }
    };
    if out.exit_code != 0 {
        return BTreeSet::new();
    }
    parse_endpoints(&out.stdout)
}

pub fn parse_endpoints(text: &str) -> BTreeSet<String> {
    let mut endpoints = BTreeSet::new();
    for line in text.lines() {
        if line.contains("->") || line.contains("TCP") || line.contains("UDP") {
            let squashed = line.split_whitespace().collect::<Vec<_>>().join(" ");
            endpoints.insert(squashed);
        }
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: i32, parent_pid: i32, command_line: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            parent_pid,
            command_line: command_line.to_string(),
        }
    }

    #[test]
    fn parses_well_formed_rows_and_skips_garbage() {
        let text = "    1     0 /sbin/init\n  203     1 sshd: worker\nnot a row\n 204 abc oops\n";
        let table = parse_process_table(text);
        assert_eq!(
            table,
            vec![
                record(1, 0, "/sbin/init"),
                record(203, 1, "sshd: worker"),
            ]
        );
    }

    #[test]
    fn descendants_contains_root_even_when_absent_from_table() {
        let set = descendants(999, &[record(1, 0, "init")]);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![999]);
    }

    #[test]
    fn descendants_is_transitively_closed() {
        let table = vec![
            record(10, 1, "root"),
            record(20, 10, "child"),
            record(30, 20, "grandchild"),
            record(40, 1, "sibling"),
        ];
        let set = descendants(10, &table);
        assert!(set.contains(&10) && set.contains(&20) && set.contains(&30));
        assert!(!set.contains(&40));
        for record in &table {
            if set.contains(&record.parent_pid) {
                assert!(set.contains(&record.pid));
            }
        }
    }

    #[test]
    fn endpoint_lines_are_filtered_and_squashed() {
        let text = concat!(
            "COMMAND  PID USER   FD TYPE DEVICE NODE NAME\n",
            "curl    4242 user   5u IPv4  12345  TCP 10.0.0.5:44444->93.184.216.34:443 (ESTABLISHED)\n",
            "curl    4242 user   6u IPv4  12346  UDP *:5353\n",
            "curl    4242 user  cwd  DIR    1,4  512 /tmp\n",
        );
        let endpoints = parse_endpoints(text);
        assert_eq!(endpoints.len(), 2);
        assert!(endpoints
            .iter()
            .any(|line| line.contains("93.184.216.34:443")));
        assert!(!endpoints.iter().any(|line| line.contains("/tmp")));
    }

    #[test]
    fn live_process_table_includes_this_process() {
        if which::which("ps").is_err() {
            return;
        }
        let table = read_process_table();
        if table.is_empty() {
            return;
        }
        let own_pid = std::process::id() as i32;
        assert!(table.iter().any(|record| record.pid == own_pid));
    }
}
