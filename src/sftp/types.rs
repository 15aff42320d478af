//! Directory listing entries as sent to the browser

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

// st_mode file type bits
const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// One entry of an `ls_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    /// `ls -l` style, e.g. `drwxr-xr-x`
    pub mode: String,
    /// RFC 3339, UTC
    pub mod_time: String,
}

impl FileEntry {
    pub fn new(name: String, size: u64, permissions: Option<u32>, mtime: Option<u32>) -> Self {
        let permissions = permissions.unwrap_or(0);
        Self {
            name,
            size,
            is_dir: permissions & S_IFMT == S_IFDIR,
            mode: format_mode(permissions),
            mod_time: format_mod_time(mtime),
        }
    }
}

/// Directories first, then by name.
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}

/// Render an `st_mode` value the way `ls -l` does.
pub fn format_mode(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Unknown times render as the Unix epoch.
pub fn format_mod_time(mtime: Option<u32>) -> String {
    DateTime::<Utc>::from_timestamp(i64::from(mtime.unwrap_or(0)), 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Final path component, as used for a `get_result` name.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
