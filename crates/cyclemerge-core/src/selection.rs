use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CycleMergeError, Result};

/// How a channel listed twice for the same cycle is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Keep every occurrence; the channel appears that many times in the output.
    #[default]
    Allow,
    /// Fail with [`CycleMergeError::DuplicateChannel`].
    Reject,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Per-cycle channel lists. Cycles without an entry keep all channels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelSelection {
    entries: BTreeMap<usize, Vec<usize>>,
}

impl ChannelSelection {
    /// Keep every channel of every cycle.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse `cycle:channel,channel;cycle:channel`.
    ///
    /// Blocks are separated by `;` and blank blocks are ignored. A cycle
    /// named twice keeps the later list. Channel indices are checked later by
    /// [`ChannelSelection::resolve`], once channel counts are known.
    pub fn parse(spec: &str, cycle_count: usize) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for block in spec.split(';').map(str::trim).filter(|b| !b.is_empty()) {
            let (cycle_str, channels_str) =
                block
                    .split_once(':')
                    .ok_or_else(|| CycleMergeError::InvalidSelection {
                        block: block.to_string(),
                        reason: "expected 'cycle:channel,channel,...'".into(),
                    })?;

            let cycle = parse_index(cycle_str, block)?;
            if cycle >= cycle_count {
                return Err(CycleMergeError::CycleRange {
                    index: cycle,
                    count: cycle_count,
                });
            }

            let channels = channels_str
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| parse_index(c, block))
                .collect::<Result<Vec<usize>>>()?;
            if channels.is_empty() {
                return Err(CycleMergeError::EmptyChannelList { cycle });
            }

            entries.insert(cycle, channels);
        }

        Ok(Self { entries })
    }

    /// Parse an optional selection string; `None` keeps everything.
    pub fn from_option(spec: Option<&str>, cycle_count: usize) -> Result<Self> {
        match spec {
            Some(s) => Self::parse(s, cycle_count),
            None => Ok(Self::all()),
        }
    }

    /// Explicit channel list of `cycle`, if any.
    pub fn get(&self, cycle: usize) -> Option<&[usize]> {
        self.entries.get(&cycle).map(Vec::as_slice)
    }

    pub fn is_all(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concrete channel lists for cycles with the given channel counts.
    ///
    /// `channel_counts[i]` is the channel count of cycle `i`. Unlisted cycles
    /// expand to `0..count`.
    pub fn resolve(
        &self,
        channel_counts: &[usize],
        duplicates: DuplicatePolicy,
    ) -> Result<Vec<Vec<usize>>> {
        if let Some((&cycle, _)) = self.entries.range(channel_counts.len()..).next() {
            return Err(CycleMergeError::CycleRange {
                index: cycle,
                count: channel_counts.len(),
            });
        }

        channel_counts
            .iter()
            .enumerate()
            .map(|(cycle, &count)| {
                let Some(list) = self.entries.get(&cycle) else {
                    return Ok((0..count).collect());
                };
                for (pos, &channel) in list.iter().enumerate() {
                    if channel >= count {
                        return Err(CycleMergeError::ChannelRange {
                            cycle,
                            channel,
                            channel_count: count,
                        });
                    }
                    if duplicates == DuplicatePolicy::Reject && list[..pos].contains(&channel) {
                        return Err(CycleMergeError::DuplicateChannel { cycle, channel });
                    }
                }
                Ok(list.clone())
            })
            .collect()
    }
}

fn parse_index(text: &str, block: &str) -> Result<usize> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| CycleMergeError::InvalidSelection {
            block: block.to_string(),
            reason: format!("'{}' is not a non-negative integer", text.trim()),
        })
}
