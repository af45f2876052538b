//! Process virtual-memory map snapshots
//!
//! Parses `/proc/<pid>/maps`, one region per line:
//!
//! ```text
//! 7f2c4e1a2000-7f2c4e1c4000 r-xp 00000000 08:01 1048602    /usr/lib/libc.so.6
//! ```
//!
//! A snapshot is read eagerly and never refreshed; read again to observe new
//! mappings. Any malformed line fails the whole read.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{PosixError, PosixResult};
use crate::result::PosixIoResultExt;

/// Permission string of a region with no access at all
pub const NO_ACCESS_PRIVATE: &str = "---p";

/// One mapped region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryRegion {
    /// First address of the region
    pub start: usize,
    /// Length in bytes, `end - start`
    pub length: usize,
    /// Four characters: `r`, `w`, `x`, then `p` (private) or `s` (shared)
    pub perms: String,
    /// Offset into the backing file
    pub offset: u64,
    /// Device as `major:minor` in hex
    pub device: String,
    /// Inode of the backing file, 0 for anonymous memory
    pub inode: u64,
    /// Backing path or pseudo-name such as `[heap]`
    pub path: Option<String>,
    /// Source line, verbatim
    pub line: String,
}

impl MemoryRegion {
    /// Parse a single `maps` line
    pub fn parse(line: &str) -> PosixResult<Self> {
        let fail = |reason: &str| PosixError::map_parse(line, reason);
        let mut rest = line;

        let range = next_field(&mut rest).ok_or_else(|| fail("missing address range"))?;
        let perms = next_field(&mut rest).ok_or_else(|| fail("missing permissions"))?;
        let offset = next_field(&mut rest).ok_or_else(|| fail("missing offset"))?;
        let device = next_field(&mut rest).ok_or_else(|| fail("missing device"))?;
        let inode = next_field(&mut rest).ok_or_else(|| fail("missing inode"))?;

        let (start, end) = range.split_once('-').ok_or_else(|| fail("address range has no '-'"))?;
        let start = parse_address(start).ok_or_else(|| fail("bad start address"))?;
        let end = parse_address(end).ok_or_else(|| fail("bad end address"))?;
        if end <= start {
            return Err(fail("end address is not after start"));
        }

        if perms.len() != 4 {
            return Err(fail("permissions must be four characters"));
        }
        let offset = u64::from_str_radix(offset, 16).map_err(|_| fail("bad offset"))?;
        let inode = inode.parse::<u64>().map_err(|_| fail("bad inode"))?;

        let path = rest.trim();
        Ok(Self {
            start,
            length: end - start,
            perms: perms.to_owned(),
            offset,
            device: device.to_owned(),
            inode,
            path: (!path.is_empty()).then(|| path.to_owned()),
            line: line.to_owned(),
        })
    }

    /// One past the last address
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Readable
    pub fn is_readable(&self) -> bool {
        self.perms.as_bytes()[0] == b'r'
    }

    /// Writable
    pub fn is_writable(&self) -> bool {
        self.perms.as_bytes()[1] == b'w'
    }

    /// Executable
    pub fn is_executable(&self) -> bool {
        self.perms.as_bytes()[2] == b'x'
    }

    /// Shared rather than private
    pub fn is_shared(&self) -> bool {
        self.perms.as_bytes()[3] == b's'
    }

    /// Private region with no access, e.g. a guard page
    pub fn is_no_access(&self) -> bool {
        self.perms == NO_ACCESS_PRIVATE
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (field, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(field)
}

fn parse_address(hex: &str) -> Option<usize> {
    u64::from_str_radix(hex, 16).ok().and_then(|value| usize::try_from(value).ok())
}

/// Immutable snapshot of a process's mappings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcMaps {
    regions: Vec<MemoryRegion>,
}

impl ProcMaps {
    /// Snapshot of the calling process
    pub fn for_self() -> PosixResult<Self> {
        Self::read(Path::new("/proc/self/maps"))
    }

    /// Snapshot of process `pid`
    pub fn for_pid(pid: i32) -> PosixResult<Self> {
        Self::read(&Path::new("/proc").join(pid.to_string()).join("maps"))
    }

    /// Read and parse a listing from `path`
    pub fn read(path: &Path) -> PosixResult<Self> {
        let text = fs::read_to_string(path).with_operation("read process maps")?;
        Self::parse(&text)
    }

    /// Parse a full listing
    ///
    /// Blank lines are skipped. Regions must appear in ascending,
    /// non-overlapping order.
    pub fn parse(text: &str) -> PosixResult<Self> {
        let mut regions: Vec<MemoryRegion> = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let region = MemoryRegion::parse(line)?;
            if let Some(previous) = regions.last()
                && region.start < previous.end()
            {
                return Err(PosixError::map_parse(line, "region overlaps or precedes the previous one"));
            }
            regions.push(region);
        }
        Ok(Self { regions })
    }

    /// All regions, in address order
    pub fn list(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// First region matching `predicate`
    pub fn find_first(&self, predicate: impl Fn(&MemoryRegion) -> bool) -> Option<&MemoryRegion> {
        self.regions.iter().find(|region| predicate(region))
    }

    /// Every region matching `predicate`
    pub fn find_all(&self, predicate: impl Fn(&MemoryRegion) -> bool) -> Vec<&MemoryRegion> {
        self.regions.iter().filter(|region| predicate(region)).collect()
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when the snapshot has no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl IntoIterator for ProcMaps {
    type Item = MemoryRegion;
    type IntoIter = std::vec::IntoIter<MemoryRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}

impl<'a> IntoIterator for &'a ProcMaps {
    type Item = &'a MemoryRegion;
    type IntoIter = std::slice::Iter<'a, MemoryRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
