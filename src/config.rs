//! Validated, builder-style configuration for channels and networks.
//!
//! Mirrors the teacher's `RingBufferConfig::new(..).with_consumers(..)` shape:
//! constructors and `with_*` setters validate eagerly and return `Result`.

use crate::constants::{ DEFAULT_CHANNEL_BUFFER_SIZE, DEFAULT_STRIDE_LENGTH };
use crate::error::{ PipelineError, Result };

/// Per-channel sizing. Every channel created by a [`crate::network::Network`]
/// uses the network's `ChannelConfig` unless overridden per push.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub message_buffer_size: usize,
    pub stride_length: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            message_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
            stride_length: DEFAULT_STRIDE_LENGTH,
        }
    }
}

impl ChannelConfig {
    /// `message_buffer_size` must be a nonzero power of two: it backs the
    /// sequence-to-slot mask used by every hot-path read and write.
    pub fn new(message_buffer_size: usize) -> Result<Self> {
        if message_buffer_size == 0 || !message_buffer_size.is_power_of_two() {
            return Err(
                PipelineError::config(
                    format!(
                        "channel.message_buffer_size must be a nonzero power of two, got {message_buffer_size}"
                    )
                )
            );
        }
        Ok(Self { message_buffer_size, ..Default::default() })
    }

    /// Number of sequences a producer reserves per claim. Transformers always
    /// claim one sequence per transformed message regardless of this setting.
    pub fn with_stride_length(mut self, stride_length: u64) -> Result<Self> {
        if stride_length == 0 {
            return Err(PipelineError::config("channel.stride_length must be greater than zero"));
        }
        if stride_length > self.message_buffer_size as u64 {
            return Err(
                PipelineError::config(
                    "channel.stride_length cannot exceed channel.message_buffer_size"
                )
            );
        }
        self.stride_length = stride_length;
        Ok(self)
    }
}

/// Network-wide defaults: the channel sizing new channels are created with,
/// and the worker pool size the bundled CLI uses to build its runtime.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub channel: ChannelConfig,
    pub thread_pool_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            thread_pool_size: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_thread_pool_size(mut self, thread_pool_size: usize) -> Result<Self> {
        if thread_pool_size == 0 {
            return Err(PipelineError::config("thread_pool_size must be greater than zero"));
        }
        self.thread_pool_size = thread_pool_size;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_buffer_size() {
        assert!(ChannelConfig::new(0).is_err());
    }

    #[test]
    fn rejects_non_power_of_two_buffer_size() {
        assert!(ChannelConfig::new(100).is_err());
    }

    #[test]
    fn accepts_power_of_two_buffer_size() {
        assert!(ChannelConfig::new(256).is_ok());
    }

    #[test]
    fn rejects_zero_stride_length() {
        let config = ChannelConfig::new(256).unwrap();
        assert!(config.with_stride_length(0).is_err());
    }

    #[test]
    fn rejects_stride_length_above_buffer_size() {
        let config = ChannelConfig::new(256).unwrap();
        assert!(config.with_stride_length(512).is_err());
    }

    #[test]
    fn network_config_defaults_to_at_least_one_thread() {
        assert!(NetworkConfig::default().thread_pool_size >= 1);
    }

    #[test]
    fn rejects_zero_thread_pool_size() {
        assert!(NetworkConfig::default().with_thread_pool_size(0).is_err());
    }
}
