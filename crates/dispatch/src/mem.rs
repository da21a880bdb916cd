/// Best-effort resident-set size in bytes. Linux reads `/proc/self/statm`;
/// elsewhere this reports `None` and memory logging degrades quietly.
pub fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}
