//! Simulator configuration.
//!
//! Loaded from TOML. Every field has a default, so a configuration file
//! only needs the values it changes; an empty file is a valid
//! configuration.

use crate::common::constants::PAGE_SHIFT;
use crate::common::{Result, VmError};
use crate::paging::{HashFunction, PagingStyle};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_CORES: usize = 4;
const DEFAULT_RNG_SEED: u64 = 0x5eed;

const DEFAULT_PAGE_SHIFT: u32 = PAGE_SHIFT;
const DEFAULT_LINE_SIZE: u64 = 64;
const DEFAULT_MEM_ACCESS_TIME: u64 = 20;
const DEFAULT_PAGE_FAULT_LATENCY: u64 = 1000;

const DEFAULT_HASH_SIZE: usize = 4096;
const DEFAULT_HASH_THRESHOLD: f64 = 0.8;
const DEFAULT_CUCKOO_WAYS: usize = 4;
const DEFAULT_CUCKOO_SIZE: usize = 1024;
const DEFAULT_CUCKOO_THRESHOLD: f64 = 0.5;
const DEFAULT_SCALE: f64 = 2.0;

const DEFAULT_FRAME_BASE: u64 = 0x100;
const DEFAULT_FRAMES: u64 = 1 << 20;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub hash: HashConfig,
    #[serde(default)]
    pub cuckoo: CuckooConfig,
    #[serde(default)]
    pub tlb: TlbConfig,
    #[serde(default)]
    pub pwc: PwcConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Rejects values the simulator cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(VmError::Config(msg)) };

        if self.general.cores == 0 {
            return fail("general.cores must be at least 1".into());
        }
        if self.paging.page_shift != PAGE_SHIFT {
            return fail(format!(
                "paging.page_shift {} is not supported; base pages are 4KB (shift {PAGE_SHIFT})",
                self.paging.page_shift
            ));
        }
        if !self.paging.line_size.is_power_of_two() {
            return fail(format!("paging.line_size {} is not a power of two", self.paging.line_size));
        }
        if self.paging.line_shift() > self.paging.page_shift {
            return fail("paging.line_size exceeds the page size".into());
        }
        if self.hash.size == 0 || self.cuckoo.size == 0 || self.cuckoo.ways == 0 {
            return fail("hash and cuckoo tables need a non-zero size and way count".into());
        }
        for (name, threshold) in [("hash", self.hash.threshold), ("cuckoo", self.cuckoo.threshold)] {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return fail(format!("{name}.threshold {threshold} is outside (0, 1]"));
            }
        }
        for (name, scale) in [("hash", self.hash.scale), ("cuckoo", self.cuckoo.scale)] {
            if scale <= 1.0 {
                return fail(format!("{name}.scale {scale} must be greater than 1"));
            }
        }
        if self.tlb.l1.entries == 0 || self.tlb.l2.entries == 0 {
            return fail("TLBs need at least one entry".into());
        }
        if self.tlb.cluster.enabled {
            if self.tlb.cluster.entries == 0 {
                return fail("tlb.cluster.entries must be at least 1".into());
            }
            if self.tlb.cluster.cluster_bits == 0 || self.tlb.cluster.cluster_bits > 8 {
                return fail(format!(
                    "tlb.cluster.cluster_bits {} is outside 1..=8",
                    self.tlb.cluster.cluster_bits
                ));
            }
        }
        if self.pwc.enabled {
            let sets = if self.pwc.assoc == 0 { 0 } else { self.pwc.lines / self.pwc.assoc };
            if sets == 0 || self.pwc.lines % self.pwc.assoc != 0 || !sets.is_power_of_two() {
                return fail(format!(
                    "pwc of {} lines and associativity {} does not give a power-of-two set count",
                    self.pwc.lines, self.pwc.assoc
                ));
            }
        }
        if self.memory.frames == 0 {
            return fail("memory.frames must be at least 1".into());
        }
        if self.general.send_ptw && self.memory.parents == 0 {
            return fail("general.send_ptw needs at least one memory parent".into());
        }
        Ok(())
    }
}

/// Run-wide switches.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_cores")]
    pub cores: usize,

    /// Charge latencies; when off, structures keep state only.
    #[serde(default = "default_true")]
    pub timing_mode: bool,

    /// Send page-walk fetches to the parent memories.
    #[serde(default = "default_true")]
    pub send_ptw: bool,

    /// Seed for cuckoo salts.
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,

    /// Chain walk fetches in per-core event recorders.
    #[serde(default = "default_true")]
    pub record_events: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            timing_mode: true,
            send_ptw: true,
            rng_seed: default_rng_seed(),
            record_events: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PagingConfig {
    #[serde(default = "default_style")]
    pub style: PagingStyle,

    #[serde(default = "default_page_shift")]
    pub page_shift: u32,

    #[serde(default = "default_line_size")]
    pub line_size: u64,

    #[serde(default = "default_mem_access_time")]
    pub mem_access_time: u64,

    #[serde(default = "default_page_fault_latency")]
    pub page_fault_latency: u64,
}

impl PagingConfig {
    /// log2 of the cache line size.
    pub fn line_shift(&self) -> u32 {
        self.line_size.trailing_zeros()
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            style: default_style(),
            page_shift: default_page_shift(),
            line_size: default_line_size(),
            mem_access_time: default_mem_access_time(),
            page_fault_latency: default_page_fault_latency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HashConfig {
    #[serde(default = "default_hash_size")]
    pub size: usize,

    /// Live ratio above which the table is rebuilt.
    #[serde(default = "default_hash_threshold")]
    pub threshold: f64,

    /// Growth factor of a rebuild.
    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub function: HashFunction,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            size: default_hash_size(),
            threshold: default_hash_threshold(),
            scale: default_scale(),
            function: HashFunction::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CuckooConfig {
    #[serde(default = "default_cuckoo_ways")]
    pub ways: usize,

    /// Initial slots per way.
    #[serde(default = "default_cuckoo_size")]
    pub size: usize,

    #[serde(default = "default_cuckoo_threshold")]
    pub threshold: f64,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub function: HashFunction,
}

impl Default for CuckooConfig {
    fn default() -> Self {
        Self {
            ways: default_cuckoo_ways(),
            size: default_cuckoo_size(),
            threshold: default_cuckoo_threshold(),
            scale: default_scale(),
            function: HashFunction::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlbLevelConfig {
    #[serde(default = "default_tlb_entries")]
    pub entries: usize,

    #[serde(default = "default_tlb_hit_latency")]
    pub hit_latency: u64,

    #[serde(default)]
    pub response_latency: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterTlbConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cluster_entries")]
    pub entries: usize,

    /// Pages per block are `2^cluster_bits`.
    #[serde(default = "default_cluster_bits")]
    pub cluster_bits: u32,

    /// Weight of the member count in the eviction priority.
    #[serde(default = "default_cluster_weight")]
    pub weight: u64,

    #[serde(default = "default_cluster_hit_latency")]
    pub hit_latency: u64,

    #[serde(default)]
    pub response_latency: u64,
}

impl Default for ClusterTlbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entries: default_cluster_entries(),
            cluster_bits: default_cluster_bits(),
            weight: default_cluster_weight(),
            hit_latency: default_cluster_hit_latency(),
            response_latency: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlbConfig {
    #[serde(default = "default_l1_tlb")]
    pub l1: TlbLevelConfig,

    #[serde(default = "default_l2_tlb")]
    pub l2: TlbLevelConfig,

    #[serde(default)]
    pub cluster: ClusterTlbConfig,
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            l1: default_l1_tlb(),
            l2: default_l2_tlb(),
            cluster: ClusterTlbConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PwcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_pwc_lines")]
    pub lines: usize,

    #[serde(default = "default_pwc_assoc")]
    pub assoc: usize,

    #[serde(default = "default_pwc_access_latency")]
    pub access_latency: u64,

    #[serde(default = "default_pwc_invalidate_latency")]
    pub invalidate_latency: u64,
}

impl Default for PwcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lines: default_pwc_lines(),
            assoc: default_pwc_assoc(),
            access_latency: default_pwc_access_latency(),
            invalidate_latency: default_pwc_invalidate_latency(),
        }
    }
}

/// Timing model of the parent memories.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemControllerType {
    #[default]
    Simple,
    Dram,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default)]
    pub controller: MemControllerType,

    /// Fixed latency of the simple controller.
    #[serde(default = "default_mem_latency")]
    pub latency: u64,

    #[serde(default = "default_t_cas")]
    pub t_cas: u64,

    #[serde(default = "default_t_ras")]
    pub t_ras: u64,

    #[serde(default = "default_t_pre")]
    pub t_pre: u64,

    /// Number of parent memory objects walk fetches are spread over.
    #[serde(default = "default_parents")]
    pub parents: usize,

    /// Network round trip to a parent.
    #[serde(default = "default_parent_rtt")]
    pub parent_rtt: u32,

    /// First physical page number handed out by the frame allocator.
    #[serde(default = "default_frame_base")]
    pub frame_base: u64,

    /// Physical pages available to the frame allocator.
    #[serde(default = "default_frames")]
    pub frames: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemControllerType::Simple,
            latency: default_mem_latency(),
            t_cas: default_t_cas(),
            t_ras: default_t_ras(),
            t_pre: default_t_pre(),
            parents: default_parents(),
            parent_rtt: default_parent_rtt(),
            frame_base: default_frame_base(),
            frames: default_frames(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cores() -> usize {
    DEFAULT_CORES
}

fn default_rng_seed() -> u64 {
    DEFAULT_RNG_SEED
}

fn default_style() -> PagingStyle {
    PagingStyle::LongModeNormal
}

fn default_page_shift() -> u32 {
    DEFAULT_PAGE_SHIFT
}

fn default_line_size() -> u64 {
    DEFAULT_LINE_SIZE
}

fn default_mem_access_time() -> u64 {
    DEFAULT_MEM_ACCESS_TIME
}

fn default_page_fault_latency() -> u64 {
    DEFAULT_PAGE_FAULT_LATENCY
}

fn default_hash_size() -> usize {
    DEFAULT_HASH_SIZE
}

fn default_hash_threshold() -> f64 {
    DEFAULT_HASH_THRESHOLD
}

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

fn default_cuckoo_ways() -> usize {
    DEFAULT_CUCKOO_WAYS
}

fn default_cuckoo_size() -> usize {
    DEFAULT_CUCKOO_SIZE
}

fn default_cuckoo_threshold() -> f64 {
    DEFAULT_CUCKOO_THRESHOLD
}

fn default_tlb_entries() -> usize {
    64
}

fn default_tlb_hit_latency() -> u64 {
    1
}

fn default_l1_tlb() -> TlbLevelConfig {
    TlbLevelConfig {
        entries: 64,
        hit_latency: 1,
        response_latency: 0,
    }
}

fn default_l2_tlb() -> TlbLevelConfig {
    TlbLevelConfig {
        entries: 1024,
        hit_latency: 8,
        response_latency: 0,
    }
}

fn default_cluster_entries() -> usize {
    128
}

fn default_cluster_bits() -> u32 {
    3
}

fn default_cluster_weight() -> u64 {
    2
}

fn default_cluster_hit_latency() -> u64 {
    6
}

fn default_pwc_lines() -> usize {
    32
}

fn default_pwc_assoc() -> usize {
    4
}

fn default_pwc_access_latency() -> u64 {
    2
}

fn default_pwc_invalidate_latency() -> u64 {
    1
}

fn default_mem_latency() -> u64 {
    100
}

fn default_t_cas() -> u64 {
    14
}

fn default_t_ras() -> u64 {
    14
}

fn default_t_pre() -> u64 {
    14
}

fn default_parents() -> usize {
    4
}

fn default_parent_rtt() -> u32 {
    4
}

fn default_frame_base() -> u64 {
    DEFAULT_FRAME_BASE
}

fn default_frames() -> u64 {
    DEFAULT_FRAMES
}
