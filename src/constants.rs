//! Tuning constants shared by the channel, sequencer and configuration layers.

/// Default channel buffer size, must stay a power of two for the sequence-to-slot mask.
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 4096;

/// Default number of sequences a single producer claim reserves at once.
pub const DEFAULT_STRIDE_LENGTH: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_size_is_power_of_two() {
        assert!(DEFAULT_CHANNEL_BUFFER_SIZE.is_power_of_two());
    }

    #[test]
    fn default_stride_length_is_nonzero() {
        assert!(DEFAULT_STRIDE_LENGTH > 0);
    }
}
