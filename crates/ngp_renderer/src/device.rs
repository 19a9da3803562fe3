//! Compute devices that run data-parallel kernels.
//!
//! A kernel is a closure over a flat index. `dispatch` returns once every
//! index has run, so consecutive dispatches are ordered and a stage may read
//! everything the previous stage wrote.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

/// Indices handed to one rayon task at minimum.
const MIN_TASK_LEN: usize = 64;

/// Errors raised by a compute device.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Compute device unavailable: {0}")]
    Unavailable(String),

    #[error("Kernel failed during {stage}")]
    KernelFailed { stage: &'static str },
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A data-parallel executor.
pub trait ComputeDevice: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Run `kernel(i)` for every `i` in `0..count` and block until all finish.
    ///
    /// A panicking kernel is reported as [`DeviceError::KernelFailed`].
    fn dispatch(&self, stage: &'static str, count: usize, kernel: &(dyn Fn(usize) + Sync)) -> DeviceResult<()>;

    /// Block until all submitted work has completed.
    fn wait(&self) -> DeviceResult<()> {
        Ok(())
    }
}

/// Multi-threaded CPU device backed by a dedicated rayon pool.
pub struct CpuDevice {
    pool: ThreadPool,
}

impl CpuDevice {
    /// Create a device with `threads` workers, or one per core when `None`.
    pub fn new(threads: Option<usize>) -> DeviceResult<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("ngp-worker-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        log::info!("CPU device ready with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> &str {
        "cpu"
    }

    fn dispatch(&self, stage: &'static str, count: usize, kernel: &(dyn Fn(usize) + Sync)) -> DeviceResult<()> {
        if count == 0 {
            return Ok(());
        }
        catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                (0..count)
                    .into_par_iter()
                    .with_min_len(MIN_TASK_LEN)
                    .for_each(kernel)
            })
        }))
        .map_err(|_| {
            log::error!("Kernel panicked during {}", stage);
            DeviceError::KernelFailed { stage }
        })
    }
}

/// Single-threaded device running indices in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialDevice;

impl ComputeDevice for SerialDevice {
    fn name(&self) -> &str {
        "serial"
    }

    fn dispatch(&self, stage: &'static str, count: usize, kernel: &(dyn Fn(usize) + Sync)) -> DeviceResult<()> {
        catch_unwind(AssertUnwindSafe(|| (0..count).for_each(kernel))).map_err(|_| {
            log::error!("Kernel panicked during {}", stage);
            DeviceError::KernelFailed { stage }
        })
    }
}
