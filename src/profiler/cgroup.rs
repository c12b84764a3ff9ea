//! Container ID extraction from a process's cgroup v2 membership.
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::LazyLock;
use tracing::debug;

static CGROUP_V2_CONTAINER_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^0:.*?:.*?([0-9a-fA-F]{64})(?:\.scope)?(?:/[a-z]+)?$").ok()
});

/// Longest cgroup line scanned, newline excluded
pub const MAX_CGROUP_LINE_LEN: usize = 8192;

/// Return the first container ID found in cgroup v2 lines read from `cgroup_file`.
///
/// Scanning stops at the first line longer than [`MAX_CGROUP_LINE_LEN`].
pub fn parse_container_id<R: BufRead>(mut cgroup_file: R) -> Option<String> {
    let re = CGROUP_V2_CONTAINER_ID.as_ref()?;
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        let limit = (MAX_CGROUP_LINE_LEN + 1) as u64;
        match (&mut cgroup_file).take(limit).read_until(b'\n', &mut buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => {
                debug!("stopped reading cgroup file: {}", e);
                return None;
            }
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > MAX_CGROUP_LINE_LEN {
            debug!("stopped reading cgroup file: line exceeds {} bytes", MAX_CGROUP_LINE_LEN);
            return None;
        }
        let line = String::from_utf8_lossy(&buf);
        if line == "0::/" {
            continue;
        }
        match re.captures(&line) {
            Some(caps) => return Some(caps[1].to_string()),
            None => debug!("could not extract cgroupv2 path from line: {}", line),
        }
    }
}

/// Read `/proc/<pid>/cgroup` and extract the container ID, if any.
///
/// # Errors
///
/// Returns an error if the cgroup file cannot be opened
pub fn extract_container_id(pid: u32) -> io::Result<Option<String>> {
    let file = File::open(format!("/proc/{pid}/cgroup"))?;
    Ok(parse_container_id(BufReader::new(file)))
}
