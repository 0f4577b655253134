//! Simulation statistics collection and reporting.
//!
//! Gathers TLB, walker, page-walk cache and page table counters at the end
//! of a run, prints them in a fixed report layout, and exports them as JSON.

use crate::paging::{PagingStats, PwcStats, WalkerStats};
use crate::tlb::TlbStats;
use serde::Serialize;

/// End-of-run statistics.
#[derive(Clone, Debug, Serialize)]
pub struct SimStats {
    pub host_seconds: f64,
    pub cores: usize,
    pub accesses: u64,
    /// Cycle at which the slowest core finished.
    pub cycles: u64,
    pub core_cycles: Vec<u64>,

    /// L1 TLB counters summed over cores.
    pub l1: TlbStats,
    /// L2 TLB counters summed over cores.
    pub l2: TlbStats,
    pub cluster: Option<TlbStats>,

    pub walker: WalkerStats,
    pub pwc: Option<PwcStats>,
    pub paging: PagingStats,

    /// Fetches served by the parent memories.
    pub memory_accesses: u64,
    /// Walk record chains collected from the event recorders.
    pub walk_chains: u64,

    pub frames_in_use: u64,
    pub frames_allocated: u64,
    pub frames_reclaimed: u64,
}

impl SimStats {
    /// Serializes the statistics as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Prints a formatted summary of all simulation statistics.
    pub fn print(&self) {
        let acc = self.accesses.max(1);
        let walks = self.walker.walks.max(1);

        println!("\n==========================================================");
        println!("VIRTUAL MEMORY SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", self.host_seconds);
        println!("sim_cores                {}", self.cores);
        println!("sim_accesses             {}", self.accesses);
        println!("sim_cycles               {}", self.cycles);
        println!(
            "cycles_per_access        {:.2}",
            self.core_cycles.iter().sum::<u64>() as f64 / acc as f64
        );
        for (core, cycles) in self.core_cycles.iter().enumerate() {
            println!("  core{:<3} cycles        {}", core, cycles);
        }
        println!("----------------------------------------------------------");
        println!("TLB");
        print_tlb("l1", &self.l1);
        if let Some(cluster) = &self.cluster {
            print_tlb("cluster", cluster);
            println!("  cluster.bypasses       {}", cluster.bypasses);
        }
        print_tlb("l2", &self.l2);
        println!("----------------------------------------------------------");
        println!("PAGE WALKS");
        println!("  walker.walks           {}", self.walker.walks);
        println!(
            "  walker.faults          {} ({:.2}%)",
            self.walker.faults,
            self.walker.faults as f64 / walks as f64 * 100.0
        );
        println!(
            "  walker.avg_cycles      {:.2}",
            self.walker.walk_cycles as f64 / walks as f64
        );
        if let Some(pwc) = &self.pwc {
            println!(
                "  pwc.accesses           {} (hits {}, misses {})",
                pwc.accesses, pwc.hits, pwc.misses
            );
        }
        println!("  memory.accesses        {}", self.memory_accesses);
        println!("  walk.chains            {}", self.walk_chains);
        println!("----------------------------------------------------------");
        println!("PAGE TABLE ({:?})", self.paging.style);
        println!("  mapped_pages           {}", self.paging.mapped_pages);
        for table in &self.paging.tables {
            println!(
                "  {:<8} tables {:<6} live {:<8} capacity {:<8} rehashes {}",
                table.name, table.tables, table.live, table.capacity, table.rehashes
            );
        }
        println!("  storage                {} KB", self.paging.storage_bytes / 1024);
        println!("  error_migrated_pages   {}", self.paging.error_migrated_pages);
        println!("----------------------------------------------------------");
        println!("FRAMES");
        println!("  frames.in_use          {}", self.frames_in_use);
        println!("  frames.allocated       {}", self.frames_allocated);
        println!("  frames.reclaimed       {}", self.frames_reclaimed);
        println!("==========================================================");
    }
}

fn print_tlb(name: &str, stats: &TlbStats) {
    println!(
        "  {:<8} accesses {:<10} hits {:<10} ({:.2}%) evictions {}",
        name,
        stats.accesses,
        stats.hits,
        stats.hit_rate(),
        stats.evictions
    );
}
