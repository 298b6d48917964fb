use std::path::{Path, PathBuf};

use leadable_core::config::leadable_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    leadable_root(home).join(DAEMON_SOCKET)
}
