//! Static round-robin assignment of splits to channels.
//!
//! Split `i` belongs to channel `i % max_channels`. Every channel derives its
//! share from the same global split list without talking to the others, and
//! the shares partition `[0, n)`: no split is read twice or skipped.

use crate::error::{Error, Result};
use std::fmt;

/// Whether `split_index` belongs to `channel` out of `max_channels`.
#[must_use]
pub fn is_assigned(split_index: usize, channel: usize, max_channels: usize) -> bool {
    max_channels > 0 && split_index % max_channels == channel
}

/// This instance's position in a parallel region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelAssignment {
    channel: usize,
    max_channels: usize,
}

impl ChannelAssignment {
    /// # Errors
    /// [`Error::Config`] if `max_channels` is 0 or `channel >= max_channels`.
    pub fn new(channel: usize, max_channels: usize) -> Result<Self> {
        if max_channels == 0 || channel >= max_channels {
            return Err(Error::config(format!(
                "channel {channel} is out of range for {max_channels} channel(s)"
            )));
        }
        Ok(Self {
            channel,
            max_channels,
        })
    }

    /// A non-parallel deployment: one channel owns every split.
    #[must_use]
    pub fn single() -> Self {
        Self {
            channel: 0,
            max_channels: 1,
        }
    }

    /// From optional `(channel, max_channels)` context information.
    ///
    /// # Errors
    /// As for [`ChannelAssignment::new`].
    pub fn from_context(channel: Option<(usize, usize)>) -> Result<Self> {
        match channel {
            Some((c, m)) => Self::new(c, m),
            None => Ok(Self::single()),
        }
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.channel
    }

    #[must_use]
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    #[must_use]
    pub fn is_assigned(&self, split_index: usize) -> bool {
        is_assigned(split_index, self.channel, self.max_channels)
    }

    /// This channel's split indices in `[0, total)`, increasing.
    pub fn assigned_indices(&self, total: usize) -> impl Iterator<Item = usize> + use<> {
        (self.channel..total).step_by(self.max_channels)
    }
}

impl Default for ChannelAssignment {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Display for ChannelAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {} of {}", self.channel, self.max_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_partition_the_split_space() {
        for n in 0..40 {
            for m in 1..7 {
                let mut seen = vec![0u32; n];
                for c in 0..m {
                    let a = ChannelAssignment::new(c, m).unwrap();
                    for i in a.assigned_indices(n) {
                        assert!(a.is_assigned(i));
                        seen[i] += 1;
                    }
                }
                assert!(seen.iter().all(|&x| x == 1), "n={n} m={m}");
            }
        }
    }

    #[test]
    fn indices_match_predicate() {
        let a = ChannelAssignment::new(1, 3).unwrap();
        let via_iter: Vec<_> = a.assigned_indices(10).collect();
        let via_pred: Vec<_> = (0..10).filter(|&i| is_assigned(i, 1, 3)).collect();
        assert_eq!(via_iter, via_pred);
        assert_eq!(via_iter, vec![1, 4, 7]);
    }

    #[test]
    fn missing_context_means_single_channel() {
        assert_eq!(ChannelAssignment::from_context(None).unwrap(), ChannelAssignment::single());
        assert!(ChannelAssignment::new(2, 2).is_err());
        assert!(ChannelAssignment::new(0, 0).is_err());
    }
}
