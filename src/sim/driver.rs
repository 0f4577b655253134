//! Simulation Driver.
//!
//! Builds the translation hierarchy from a [`Config`] and replays traces
//! through it. Every core gets its own L1 and L2 TLB (and clustered TLB if
//! enabled); all cores share one page table, walker, page-walk cache and
//! set of parent memories. Each core replays its accesses on its own thread.

use super::trace::TraceAccess;
use crate::common::{Address, MemReq, Result, VmError};
use crate::config::{Config, MemControllerType};
use crate::mem::{
    DramController, FrameAllocator, MemObject, MemoryController, MemoryPort, PageAllocator, ParentSet,
    RecorderSet, SimpleController,
};
use crate::paging::{PageTableOps, PageTableWalker, PageWalkCache, Paging, PagingParams};
use crate::stats::SimStats;
use crate::tlb::{ClusterTlb, CommonTlb, TlbGeometry, TlbStats, Translator};
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::Instant;
use tracing::info;

/// The TLB chain of one core.
pub struct CoreMmu {
    pub l1: Arc<CommonTlb>,
    pub l2: Arc<CommonTlb>,
    pub cluster: Option<Arc<ClusterTlb>>,
}

impl CoreMmu {
    /// Translates `req` and returns the physical line address.
    pub fn access(&self, req: &mut MemReq) -> Result<Address> {
        self.l1.access(req)
    }
}

/// Result of one core's replay.
struct CoreRun {
    cycles: u64,
    accesses: u64,
    walk_chains: u64,
}

/// A configured translation hierarchy ready to replay traces.
pub struct Simulation {
    config: Config,
    allocator: Arc<FrameAllocator>,
    walker: Arc<PageTableWalker>,
    pwc: Option<Arc<PageWalkCache>>,
    recorders: Option<Arc<RecorderSet>>,
    ports: Vec<Arc<MemoryPort>>,
    cores: Vec<CoreMmu>,
}

impl Simulation {
    /// Validates `config` and builds every component.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let allocator = Arc::new(FrameAllocator::new(config.memory.frame_base, config.memory.frames));
        let paging = Paging::new(&config, Arc::clone(&allocator) as Arc<dyn PageAllocator>)?.shared();

        let recorders = config
            .general
            .record_events
            .then(|| Arc::new(RecorderSet::new(config.general.cores)));

        let line_shift = config.paging.line_shift();
        let mut ports = Vec::with_capacity(config.memory.parents);
        let mut parents = ParentSet::new();
        for i in 0..config.memory.parents {
            let controller: Box<dyn MemoryController> = match config.memory.controller {
                MemControllerType::Simple => Box::new(SimpleController::new(config.memory.latency)),
                MemControllerType::Dram => Box::new(DramController::new(
                    config.memory.t_cas,
                    config.memory.t_ras,
                    config.memory.t_pre,
                )),
            };
            let mut port = MemoryPort::new(format!("mem{i}"), controller, line_shift);
            if let Some(recorders) = &recorders {
                port = port.with_recorders(Arc::clone(recorders));
            }
            let port = Arc::new(port);
            parents.push(Arc::clone(&port) as Arc<dyn MemObject>, config.memory.parent_rtt);
            ports.push(port);
        }

        let pwc = if config.pwc.enabled {
            Some(Arc::new(PageWalkCache::new(
                config.pwc.lines,
                config.pwc.assoc,
                config.pwc.access_latency,
                config.pwc.invalidate_latency,
            )?))
        } else {
            None
        };

        let mut walker = PageTableWalker::new(
            "walker",
            paging,
            Arc::clone(&allocator) as Arc<dyn PageAllocator>,
            PagingParams::from_config(&config),
            config.paging.page_fault_latency,
        )
        .with_parents(parents, config.general.send_ptw);
        if let Some(pwc) = &pwc {
            walker = walker.with_pwc(Arc::clone(pwc));
        }
        if let Some(recorders) = &recorders {
            walker = walker.with_recorders(Arc::clone(recorders));
        }
        let walker = Arc::new(walker);

        let geometry = TlbGeometry::from_config(&config);
        let cores = (0..config.general.cores)
            .map(|core| {
                let l2 = Arc::new(CommonTlb::new(
                    format!("core{core}.l2"),
                    &config.tlb.l2,
                    geometry,
                    Arc::clone(&walker) as Arc<dyn Translator>,
                )?);
                let cluster = if config.tlb.cluster.enabled {
                    Some(Arc::new(ClusterTlb::new(
                        format!("core{core}.cluster"),
                        &config.tlb.cluster,
                        geometry,
                        Arc::clone(&l2),
                    )?))
                } else {
                    None
                };
                let below: Arc<dyn Translator> = match &cluster {
                    Some(cluster) => Arc::clone(cluster) as Arc<dyn Translator>,
                    None => Arc::clone(&l2) as Arc<dyn Translator>,
                };
                let l1 = Arc::new(CommonTlb::new(format!("core{core}.l1"), &config.tlb.l1, geometry, below)?);
                Ok(CoreMmu { l1, l2, cluster })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            cores = config.general.cores,
            style = ?config.paging.style,
            parents = config.memory.parents,
            "simulation built"
        );
        Ok(Self {
            config,
            allocator,
            walker,
            pwc,
            recorders,
            ports,
            cores,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cores(&self) -> &[CoreMmu] {
        &self.cores
    }

    pub fn walker(&self) -> &Arc<PageTableWalker> {
        &self.walker
    }

    pub fn allocator(&self) -> &Arc<FrameAllocator> {
        &self.allocator
    }

    /// Replays `trace`, each core's accesses in order on its own thread.
    ///
    /// # Errors
    ///
    /// `Config` if the trace names a core that does not exist, or the first
    /// fatal error raised by any core.
    pub fn run(&self, trace: &[TraceAccess]) -> Result<SimStats> {
        let cores = self.cores.len();
        let mut per_core: Vec<Vec<TraceAccess>> = vec![Vec::new(); cores];
        for access in trace {
            let Some(queue) = per_core.get_mut(access.core as usize) else {
                return Err(VmError::Config(format!(
                    "trace uses core {} but only {cores} cores are configured",
                    access.core
                )));
            };
            queue.push(*access);
        }

        let start = Instant::now();
        let runs: Vec<Result<CoreRun>> = thread::scope(|s| {
            let handles: Vec<_> = per_core
                .iter()
                .enumerate()
                .map(|(core, accesses)| s.spawn(move || self.run_core(core, accesses)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });
        let runs = runs.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(self.collect_stats(&runs, start.elapsed().as_secs_f64()))
    }

    fn run_core(&self, core: usize, accesses: &[TraceAccess]) -> Result<CoreRun> {
        let mmu = &self.cores[core];
        let line_shift = self.config.paging.line_shift();
        let recorder = self.recorders.as_ref().and_then(|r| r.get(core as u32));
        let mut run = CoreRun {
            cycles: 0,
            accesses: 0,
            walk_chains: 0,
        };
        for access in accesses {
            let mut req = MemReq::new(access.addr, line_shift, access.access, core as u32, run.cycles);
            mmu.access(&mut req)?;
            run.cycles = req.cycle + 1;
            run.accesses += 1;

            if let Some(recorder) = recorder {
                let mut recorder = recorder.lock().unwrap_or_else(PoisonError::into_inner);
                while recorder.pop_record().is_some() {
                    run.walk_chains += 1;
                }
                recorder.reset();
            }
        }
        Ok(run)
    }

    fn collect_stats(&self, runs: &[CoreRun], host_seconds: f64) -> SimStats {
        let mut l1 = TlbStats::default();
        let mut l2 = TlbStats::default();
        let mut cluster: Option<TlbStats> = None;
        for mmu in &self.cores {
            l1.merge(&mmu.l1.stats());
            l2.merge(&mmu.l2.stats());
            if let Some(c) = &mmu.cluster {
                cluster.get_or_insert_with(TlbStats::default).merge(&c.stats());
            }
        }
        let paging = self
            .walker
            .paging()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats();

        SimStats {
            host_seconds,
            cores: self.cores.len(),
            accesses: runs.iter().map(|r| r.accesses).sum(),
            cycles: runs.iter().map(|r| r.cycles).max().unwrap_or(0),
            core_cycles: runs.iter().map(|r| r.cycles).collect(),
            l1,
            l2,
            cluster,
            walker: self.walker.stats(),
            pwc: self.pwc.as_ref().map(|p| p.stats()),
            paging,
            memory_accesses: self.ports.iter().map(|p| p.accesses()).sum(),
            walk_chains: runs.iter().map(|r| r.walk_chains).sum(),
            frames_in_use: self.allocator.in_use(),
            frames_allocated: self.allocator.allocated(),
            frames_reclaimed: self.allocator.reclaimed(),
        }
    }
}
