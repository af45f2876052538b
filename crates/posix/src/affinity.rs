//! CPU affinity bitmask codec
//!
//! A mask is a zero-filled byte buffer where CPU `i` is byte `i / 8`, bit
//! `i % 8`. The kernel's `cpu_set_t` is an array of native-endian
//! `unsigned long`s, so these bytes match it on little-endian targets only.
//! Big-endian targets would need each word byte-swapped before the call.
//!
//! Sizing only depends on the configured processor count, never on topology:
//!
//! ```
//! use nebula_posix::affinity::{self, AffinityMask};
//!
//! assert_eq!(affinity::mask_size(4), 8);
//! let mask = AffinityMask::range(4, 2, 3).unwrap();
//! assert_eq!(mask.summary(4), "2-3");
//! ```

use std::fmt;

use crate::error::{PosixError, PosixResult};

/// Bytes needed to hold a mask for `nprocs_conf` processors
///
/// Always a multiple of 8 and never less than 8.
pub fn mask_size(nprocs_conf: usize) -> usize {
    ((nprocs_conf + 7).div_ceil(64) * 8).max(8)
}

/// Fixed-width CPU set
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AffinityMask {
    bytes: Vec<u8>,
}

impl AffinityMask {
    /// Empty mask sized for `nprocs_conf` processors
    pub fn empty(nprocs_conf: usize) -> Self {
        Self { bytes: vec![0; mask_size(nprocs_conf)] }
    }

    /// Wrap raw bytes returned by the OS
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Mask with exactly `cpu` set
    pub fn single(nprocs_conf: usize, cpu: usize) -> PosixResult<Self> {
        let mut mask = Self::empty(nprocs_conf);
        mask.set(cpu)?;
        Ok(mask)
    }

    /// Mask with every CPU in `from..=to` set
    pub fn range(nprocs_conf: usize, from: usize, to: usize) -> PosixResult<Self> {
        if from > to {
            return Err(PosixError::invalid_argument(format!("CPU range {from}-{to} is reversed")));
        }
        let mut mask = Self::empty(nprocs_conf);
        for cpu in from..=to {
            mask.set(cpu)?;
        }
        Ok(mask)
    }

    /// Number of CPUs the buffer can describe
    pub fn capacity(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Enable `cpu`
    pub fn set(&mut self, cpu: usize) -> PosixResult<()> {
        if cpu >= self.capacity() {
            return Err(PosixError::invalid_argument(format!(
                "CPU {cpu} does not fit in a {}-byte affinity mask",
                self.bytes.len()
            )));
        }
        self.bytes[cpu / 8] |= 1 << (cpu % 8);
        Ok(())
    }

    /// Whether `cpu` is enabled; CPUs past the buffer are not
    pub fn is_set(&self, cpu: usize) -> bool {
        self.bytes.get(cpu / 8).is_some_and(|byte| byte & (1 << (cpu % 8)) != 0)
    }

    /// Enabled CPUs, lowest first
    pub fn cpus(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity()).filter(|cpu| self.is_set(*cpu))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when no byte is allocated
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Runs of enabled CPUs in `0..nprocs_conf`, as `"a-b"` joined by commas
    ///
    /// A lone CPU still prints as a run (`"3-3"`); no CPUs gives `""`.
    pub fn summary(&self, nprocs_conf: usize) -> String {
        let mut runs: Vec<String> = Vec::new();
        let mut start: Option<usize> = None;

        for cpu in 0..nprocs_conf {
            match (self.is_set(cpu), start) {
                (true, None) => start = Some(cpu),
                (false, Some(first)) => {
                    runs.push(format!("{first}-{}", cpu - 1));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(first) = start {
            runs.push(format!("{first}-{}", nprocs_conf - 1));
        }

        runs.join(",")
    }
}

impl fmt::Debug for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityMask")
            .field("len", &self.bytes.len())
            .field("cpus", &self.cpus().collect::<Vec<_>>())
            .finish()
    }
}

/// Mask with exactly `cpu` set
pub fn encode_single(nprocs_conf: usize, cpu: usize) -> PosixResult<AffinityMask> {
    AffinityMask::single(nprocs_conf, cpu)
}

/// Mask with every CPU in `from..=to` set
pub fn encode_range(nprocs_conf: usize, from: usize, to: usize) -> PosixResult<AffinityMask> {
    AffinityMask::range(nprocs_conf, from, to)
}

/// Human-readable runs of enabled CPUs
pub fn decode_to_summary(mask: &AffinityMask, nprocs_conf: usize) -> String {
    mask.summary(nprocs_conf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1, 8)]
    #[case(8, 8)]
    #[case(56, 8)]
    #[case(57, 8)]
    #[case(58, 16)]
    #[case(64, 16)]
    #[case(121, 16)]
    #[case(122, 24)]
    #[case(1024, 136)]
    fn test_mask_size(#[case] nprocs: usize, #[case] expected: usize) {
        assert_eq!(mask_size(nprocs), expected);
    }

    #[test]
    fn test_bit_layout() {
        let mask = AffinityMask::single(16, 9).unwrap();
        assert_eq!(mask.as_bytes()[1], 0b0000_0010);
        assert!(mask.as_bytes().iter().enumerate().all(|(i, b)| i == 1 || *b == 0));
    }

    #[test]
    fn test_summary_runs() {
        let mut mask = AffinityMask::empty(12);
        for cpu in [0, 1, 2, 5, 7, 8, 11] {
            mask.set(cpu).unwrap();
        }
        assert_eq!(mask.summary(12), "0-2,5-5,7-8,11-11");
    }

    #[test]
    fn test_summary_ignores_cpus_past_count() {
        let mask = AffinityMask::range(64, 2, 40).unwrap();
        assert_eq!(mask.summary(8), "2-7");
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(AffinityMask::empty(4).summary(4), "");
    }

    #[test]
    fn test_out_of_range_cpu() {
        assert!(matches!(AffinityMask::single(4, 64), Err(PosixError::InvalidArgument(_))));
        assert!(matches!(AffinityMask::range(4, 3, 2), Err(PosixError::InvalidArgument(_))));
    }
}
