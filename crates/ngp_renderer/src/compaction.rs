//! Stream compaction of valid sample slots into network launch order.

use crate::buffer::{Counter, IndexBuffer};
use crate::device::{ComputeDevice, DeviceResult};

/// Launch position that carries no sample.
pub const INVALID_SLOT: u32 = u32::MAX;

/// Result of compacting one round of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compaction {
    /// Launch count, padded up to a whole number of network blocks
    pub launch_count: usize,
    /// Number of valid samples at the front of the launch list
    pub valid_count: usize,
}

impl Compaction {
    /// Padding entries at the end of the launch list.
    pub fn padding(&self) -> usize {
        self.launch_count - self.valid_count
    }
}

/// Round `count` up to a multiple of `block`.
#[inline]
pub fn padded_launch(count: usize, block: usize) -> usize {
    let block = block.max(1);
    count.div_ceil(block) * block
}

/// Gather the indices of valid slots among the first `slot_count` into
/// `launch`, then fill the padding with [`INVALID_SLOT`].
///
/// The order of valid entries is unspecified.
pub fn compact(
    device: &dyn ComputeDevice,
    valid: &IndexBuffer,
    slot_count: usize,
    counter: &Counter,
    launch: &IndexBuffer,
    block: usize,
) -> DeviceResult<Compaction> {
    counter.reset();
    device.dispatch("compact", slot_count, &|slot| {
        if valid.get(slot) != 0 {
            launch.set(counter.claim(), slot as u32);
        }
    })?;

    let valid_count = counter.load();
    let launch_count = padded_launch(valid_count, block);
    device.dispatch("pad", launch_count - valid_count, &|i| {
        launch.set(valid_count + i, INVALID_SLOT);
    })?;

    Ok(Compaction {
        launch_count,
        valid_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CpuDevice, SerialDevice};

    #[test]
    fn test_padded_launch() {
        assert_eq!(padded_launch(0, 128), 0);
        assert_eq!(padded_launch(1, 128), 128);
        assert_eq!(padded_launch(128, 128), 128);
        assert_eq!(padded_launch(129, 128), 256);
        assert_eq!(padded_launch(5, 1), 5);
    }

    #[test]
    fn test_compact_gathers_valid_slots() {
        let valid = IndexBuffer::new(8, 0);
        for slot in [1, 4, 5] {
            valid.set(slot, 1);
        }
        let launch = IndexBuffer::new(8, 0);
        let counter = Counter::new();

        let result = compact(&SerialDevice, &valid, 8, &counter, &launch, 4).unwrap();

        assert_eq!(
            result,
            Compaction {
                launch_count: 4,
                valid_count: 3
            }
        );
        assert_eq!(result.padding(), 1);
        assert_eq!(launch.to_vec(4), vec![1, 4, 5, INVALID_SLOT]);
    }

    #[test]
    fn test_compact_nothing_valid_launches_nothing() {
        let valid = IndexBuffer::new(16, 0);
        let launch = IndexBuffer::new(16, 7);
        let counter = Counter::new();

        let result = compact(&SerialDevice, &valid, 16, &counter, &launch, 128).unwrap();
        assert_eq!(result, Compaction::default());
    }

    #[test]
    fn test_parallel_compact_is_a_permutation() {
        let device = CpuDevice::new(Some(4)).unwrap();
        let n = 10_000;
        let valid = IndexBuffer::new(n, 0);
        for slot in (0..n).filter(|s| s % 7 != 0) {
            valid.set(slot, 1);
        }
        let launch = IndexBuffer::new(padded_launch(n, 128), 0);
        let counter = Counter::new();

        let result = compact(&device, &valid, n, &counter, &launch, 128).unwrap();
        let expected: Vec<u32> = (0..n as u32).filter(|s| s % 7 != 0).collect();
        assert_eq!(result.valid_count, expected.len());
        assert_eq!(result.launch_count % 128, 0);

        let mut gathered = launch.to_vec(result.valid_count);
        gathered.sort_unstable();
        assert_eq!(gathered, expected);
        assert!(launch.to_vec(result.launch_count)[result.valid_count..]
            .iter()
            .all(|&s| s == INVALID_SLOT));
    }
}
