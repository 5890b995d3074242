//! Double-buffered, multi-threaded CA iteration driver.
//!
//! The processor owns two bit fields of equal length. Each iteration
//! partitions the destination byte range into contiguous chunks, hands every
//! chunk to a scoped worker thread running the resolved kernel, joins them
//! all, then swaps the buffers. Workers read the source field shared and
//! write disjoint destination slices, so the hot path needs no locks; the
//! scope join is the happens-before barrier between iterations.
//!
//! A processor is single-use: [`CaProcessor::process`] consumes it and moves
//! the final field out.

use std::thread;

use crate::bitfield::BitField;
use crate::ca::{CaNeighborhood, CaRule, GridGeometry};
use crate::cancel::CancelToken;
use crate::error::CaError;
use crate::progress::ProgressSink;
use crate::simd::{KernelDispatch, StepParams, VectorTier};

/// Progress task name emitted by the processor.
pub const CA_TASK: &str = "cellular-automata";

/// Configuration for a CA processing run.
#[derive(Debug, Clone)]
pub struct CaConfig {
    pub rule: CaRule,
    pub neighborhood: CaNeighborhood,
    /// Grid width for the 2-D neighborhoods; 0 selects a near-square layout.
    pub width: usize,
    /// Worker thread count; 0 selects the hardware parallelism.
    pub threads: usize,
    /// Vector tier token from the CPU-feature collaborator.
    pub tier: VectorTier,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            rule: CaRule::Rule30,
            neighborhood: CaNeighborhood::OneDimensional,
            width: 0,
            threads: 0,
            tier: VectorTier::Scalar,
        }
    }
}

/// Double-buffered CA driver.
pub struct CaProcessor {
    current: BitField,
    next: BitField,
    rule: CaRule,
    neighborhood: CaNeighborhood,
    geom: GridGeometry,
    threads: usize,
    dispatch: KernelDispatch,
}

impl CaProcessor {
    /// Build a processor around `input`.
    pub fn new(input: BitField, config: CaConfig) -> Self {
        let geom = GridGeometry::for_field(input.len(), config.width);
        let threads = if config.threads == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            config.threads
        };
        let next = BitField::zeroed(input.len());
        Self {
            current: input,
            next,
            rule: config.rule,
            neighborhood: config.neighborhood,
            geom,
            threads,
            dispatch: KernelDispatch::new(config.tier),
        }
    }

    /// Vector tier the kernel resolved to (after any downgrade).
    pub fn tier(&self) -> VectorTier {
        self.dispatch.tier()
    }

    /// Grid width used by the 2-D neighborhoods.
    pub fn width(&self) -> usize {
        self.geom.width
    }

    /// Grid height used by the 2-D neighborhoods.
    pub fn height(&self) -> usize {
        self.geom.height
    }

    /// Run `iterations` synchronous CA steps and return the final field.
    ///
    /// Zero iterations returns the input unchanged. Emits one progress event
    /// per iteration and checks `cancel` between iterations.
    pub fn process(
        mut self,
        iterations: u32,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<BitField, CaError> {
        if iterations == 0 {
            return Ok(self.current);
        }
        for iteration in 0..iterations {
            if cancel.is_cancelled() {
                return Err(CaError::Cancelled {
                    completed: iteration,
                    total: iterations,
                    partial: self.current,
                });
            }
            self.step(iteration)?;
            std::mem::swap(&mut self.current, &mut self.next);
            sink.update(CA_TASK, u64::from(iteration) + 1, u64::from(iterations));
        }
        sink.complete(CA_TASK);
        Ok(self.current)
    }

    /// Convenience wrapper returning the byte view of the processed field.
    pub fn process_bytes(
        self,
        iterations: u32,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>, CaError> {
        Ok(self.process(iterations, cancel, sink)?.to_bytes())
    }

    /// One synchronous step: fan the destination bytes out over the worker
    /// pool, join, and propagate any worker panic.
    fn step(&mut self, iteration: u32) -> Result<(), CaError> {
        let params = StepParams {
            src: &self.current,
            rule: &self.rule,
            neighborhood: self.neighborhood,
            geom: self.geom,
        };
        let dispatch = self.dispatch;
        let nb = self.next.byte_len();
        let workers = self.threads.clamp(1, nb.max(1));
        let chunk = nb.div_ceil(workers).max(1);

        let failed = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut rest = self.next.as_bytes_mut();
            let mut byte_start = 0usize;
            while !rest.is_empty() {
                let take = chunk.min(rest.len());
                let (slice, tail) = rest.split_at_mut(take);
                rest = tail;
                let params = &params;
                let start = byte_start;
                handles.push(scope.spawn(move || {
                    dispatch.step_range(params, slice, start);
                }));
                byte_start += take;
            }
            // Join every worker before leaving the scope; a short-circuit
            // here would leave a panicked thread to detonate the scope.
            let mut failed = false;
            for handle in handles {
                failed |= handle.join().is_err();
            }
            failed
        });

        if failed {
            return Err(CaError::WorkerFailed { iteration });
        }
        self.next.mask_tail();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use std::sync::Arc;

    fn random_field(n_bits: usize, seed: u64) -> BitField {
        let mut bytes = Vec::with_capacity(n_bits.div_ceil(8));
        let mut state = seed;
        for _ in 0..n_bits.div_ceil(8) {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            bytes.push((state >> 33) as u8);
        }
        BitField::from_bytes_with_len(&bytes, n_bits)
    }

    fn run(field: BitField, config: CaConfig, iterations: u32) -> BitField {
        CaProcessor::new(field, config)
            .process(iterations, &CancelToken::new(), &NullSink)
            .unwrap()
    }

    #[test]
    fn zero_iterations_returns_input_unchanged() {
        let field = random_field(1024, 1);
        let copy = field.clone();
        let out = run(field, CaConfig::default(), 0);
        assert_eq!(out, copy);
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let field = random_field(40_000, 2);
        for neighborhood in [
            CaNeighborhood::OneDimensional,
            CaNeighborhood::VonNeumann,
            CaNeighborhood::Moore,
        ] {
            let single = run(
                field.clone(),
                CaConfig {
                    rule: CaRule::Rule110,
                    neighborhood,
                    threads: 1,
                    ..CaConfig::default()
                },
                5,
            );
            for threads in [2, 3, 8, 61] {
                let multi = run(
                    field.clone(),
                    CaConfig {
                        rule: CaRule::Rule110,
                        neighborhood,
                        threads,
                        ..CaConfig::default()
                    },
                    5,
                );
                assert_eq!(multi, single, "{neighborhood} with {threads} threads");
            }
        }
    }

    #[test]
    fn more_workers_than_bytes() {
        let field = random_field(16, 3);
        let out = run(
            field.clone(),
            CaConfig {
                threads: 64,
                ..CaConfig::default()
            },
            3,
        );
        let reference = run(field, CaConfig { threads: 1, ..CaConfig::default() }, 3);
        assert_eq!(out, reference);
    }

    #[test]
    fn length_is_preserved_across_steps() {
        let field = random_field(1003, 4);
        let out = run(
            field,
            CaConfig {
                neighborhood: CaNeighborhood::Moore,
                ..CaConfig::default()
            },
            4,
        );
        assert_eq!(out.len(), 1003);
        // 1003 = 125 bytes + 3 bits; the 5 tail bits stay zero.
        assert_eq!(out.as_bytes()[125] & 0x1F, 0);
    }

    #[test]
    fn cancellation_before_first_iteration_returns_input() {
        let field = random_field(4096, 5);
        let copy = field.clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = CaProcessor::new(field, CaConfig::default())
            .process(10, &cancel, &NullSink)
            .unwrap_err();
        match err {
            CaError::Cancelled {
                completed,
                total,
                partial,
            } => {
                assert_eq!((completed, total), (0, 10));
                assert_eq!(partial, copy);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancellation_mid_run_carries_completed_iterations() {
        // A sink that cancels after the first iteration's progress event.
        struct CancelAfterFirst(CancelToken);
        impl ProgressSink for CancelAfterFirst {
            fn update(&self, _task: &str, processed: u64, _total: u64) {
                if processed == 1 {
                    self.0.cancel();
                }
            }
            fn complete(&self, _task: &str) {}
        }

        let field = random_field(4096, 5);
        let one_step = run(field.clone(), CaConfig::default(), 1);

        let cancel = CancelToken::new();
        let sink = CancelAfterFirst(cancel.clone());
        let err = CaProcessor::new(field, CaConfig::default())
            .process(10, &cancel, &sink)
            .unwrap_err();
        match err {
            CaError::Cancelled {
                completed, partial, ..
            } => {
                assert_eq!(completed, 1);
                assert_eq!(partial, one_step);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn worker_panic_becomes_worker_failed() {
        let field = random_field(256, 6);
        let rule = CaRule::Custom(Arc::new(|_field: &BitField, i: usize| {
            if i == 100 {
                panic!("injected kernel fault");
            }
            false
        }));
        let err = CaProcessor::new(
            field,
            CaConfig {
                rule,
                ..CaConfig::default()
            },
        )
        .process(1, &CancelToken::new(), &NullSink)
        .unwrap_err();
        assert_eq!(err, CaError::WorkerFailed { iteration: 0 });
    }

    #[test]
    fn rule150_parity_law_one_step() {
        // One 1-D rule-150 step equals the three-term toroidal XOR
        // left ^ center ^ right at every position.
        let field = random_field(256, 7);
        let stepped = run(
            field.clone(),
            CaConfig {
                rule: CaRule::Rule150,
                ..CaConfig::default()
            },
            1,
        );
        let n = field.len();
        for i in 0..n {
            let l = field.get(if i == 0 { n - 1 } else { i - 1 });
            let c = field.get(i);
            let r = field.get(if i + 1 == n { 0 } else { i + 1 });
            assert_eq!(stepped.get(i), l ^ c ^ r, "bit {i}");
        }
    }

    #[test]
    fn progress_events_once_per_iteration() {
        use std::sync::atomic::{AtomicU64, Ordering};

        #[derive(Default)]
        struct CountingSink {
            updates: AtomicU64,
            completions: AtomicU64,
        }
        impl ProgressSink for CountingSink {
            fn update(&self, _task: &str, _processed: u64, _total: u64) {
                self.updates.fetch_add(1, Ordering::Relaxed);
            }
            fn complete(&self, _task: &str) {
                self.completions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let field = random_field(512, 8);
        let sink = CountingSink::default();
        let _ = CaProcessor::new(field, CaConfig::default())
            .process(7, &CancelToken::new(), &sink)
            .unwrap();
        assert_eq!(sink.updates.load(Ordering::Relaxed), 7);
        assert_eq!(sink.completions.load(Ordering::Relaxed), 1);
    }
}
