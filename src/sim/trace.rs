//! Access Traces.
//!
//! A trace file holds one access per line: `<core> <R|W|F> <hex address>`.
//! Blank lines and everything after `#` are ignored.

use crate::common::{AccessType, Address, Result, VmError};
use std::fs;
use std::path::Path;

/// One memory access issued by a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceAccess {
    pub core: u32,
    pub access: AccessType,
    pub addr: Address,
}

/// Parses trace text.
///
/// # Errors
///
/// `Trace` with the 1-based line number of the first malformed line.
pub fn parse_trace(text: &str) -> Result<Vec<TraceAccess>> {
    let mut accesses = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let bad = |reason: String| VmError::Trace { line: idx + 1, reason };

        let mut fields = line.split_whitespace();
        let (Some(core), Some(kind), Some(addr), None) = (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(bad(format!("expected `<core> <R|W|F> <address>`, got `{line}`")));
        };
        let core = core
            .parse::<u32>()
            .map_err(|e| bad(format!("bad core id `{core}`: {e}")))?;
        let access = match kind {
            "R" | "r" => AccessType::Read,
            "W" | "w" => AccessType::Write,
            "F" | "f" => AccessType::Fetch,
            other => return Err(bad(format!("unknown access kind `{other}`"))),
        };
        let digits = addr.trim_start_matches("0x").trim_start_matches("0X");
        let addr = Address::from_str_radix(digits, 16).map_err(|e| bad(format!("bad address `{addr}`: {e}")))?;
        accesses.push(TraceAccess { core, access, addr });
    }
    Ok(accesses)
}

/// Reads and parses a trace file.
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceAccess>> {
    parse_trace(&fs::read_to_string(path)?)
}

/// A strided sweep over a footprint, interleaved across cores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyntheticWorkload {
    /// Total accesses over all cores.
    pub accesses: usize,
    /// Bytes between consecutive accesses of one core.
    pub stride: u64,
    /// Bytes swept before wrapping around.
    pub footprint: u64,
    /// First virtual address of the footprint.
    pub base: Address,
    /// Every `write_every`-th access is a write; 0 means reads only.
    pub write_every: usize,
}

impl SyntheticWorkload {
    /// Generates the accesses, core `i % cores` issuing the `i`-th.
    ///
    /// All cores sweep the same footprint, so pages become shared.
    pub fn generate(&self, cores: usize) -> Vec<TraceAccess> {
        let cores = cores.max(1);
        let footprint = self.footprint.max(1);
        (0..self.accesses)
            .map(|i| {
                let step = (i / cores) as u64;
                let write = self.write_every != 0 && i % self.write_every == self.write_every - 1;
                TraceAccess {
                    core: (i % cores) as u32,
                    access: if write { AccessType::Write } else { AccessType::Read },
                    addr: self.base + step.wrapping_mul(self.stride) % footprint,
                }
            })
            .collect()
    }
}
