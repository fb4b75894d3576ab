use std::path::{Path, PathBuf};

pub const AGENT_SOCKET: &str = "agent.sock";
pub const AGENT_LOG: &str = "forecourt.log";
pub const TRANSFER_DB: &str = "transfers.sqlite3";

pub fn forecourt_root(home: &Path) -> PathBuf {
    home.join(".forecourt")
}

pub fn socket_path(home: &Path) -> PathBuf {
    forecourt_root(home).join(AGENT_SOCKET)
}

pub fn db_path(home: &Path) -> PathBuf {
    forecourt_root(home).join(TRANSFER_DB)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    forecourt_root(home).join("logs")
}

/// The newest agent log file, if any exist.
///
/// The appender writes one file per day, `forecourt.log.YYYY-MM-DD`, so
/// the lexicographic maximum is the current one.
pub fn latest_log_path(home: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(logs_dir(home)).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(AGENT_LOG))
                .unwrap_or(false)
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn layout_hangs_off_dot_forecourt() {
        let home = Path::new("/home/station");
        assert_eq!(
            socket_path(home),
            PathBuf::from("/home/station/.forecourt/agent.sock")
        );
        assert_eq!(
            db_path(home),
            PathBuf::from("/home/station/.forecourt/transfers.sqlite3")
        );
        assert_eq!(
            logs_dir(home),
            PathBuf::from("/home/station/.forecourt/logs")
        );
    }

    #[test]
    fn latest_log_prefers_the_newest_day() {
        let home = TempDir::new().expect("home");
        let logs = logs_dir(home.path());
        fs::create_dir_all(&logs).expect("create logs dir");
        fs::write(logs.join("forecourt.log.2026-08-24"), "old").expect("write old");
        fs::write(logs.join("forecourt.log.2026-08-25"), "new").expect("write new");
        fs::write(logs.join("unrelated.txt"), "noise").expect("write noise");

        let latest = latest_log_path(home.path()).expect("latest log");
        assert_eq!(
            latest.file_name().and_then(|n| n.to_str()),
            Some("forecourt.log.2026-08-25")
        );
    }

    #[test]
    fn latest_log_is_none_without_a_logs_dir() {
        let home = TempDir::new().expect("home");
        assert!(latest_log_path(home.path()).is_none());
    }
}
