use serde::{Deserialize, Serialize};

use crate::cycle::Plane;
use crate::error::{CycleMergeError, Result};

/// Where one output channel came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOrigin {
    /// Position in the output stack.
    pub output_index: usize,
    pub cycle: usize,
    pub source_channel: usize,
    pub name: String,
}

/// Output channel order, returned to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    pub channels: Vec<ChannelOrigin>,
}

impl ChannelMap {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelOrigin> {
        self.channels.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Replace display names when the count matches exactly.
    pub fn apply_names(&mut self, names: &[String]) -> bool {
        if names.len() != self.channels.len() {
            return false;
        }
        for (channel, name) in self.channels.iter_mut().zip(names) {
            channel.name = name.clone();
        }
        true
    }
}

/// Default display name of output channel `index`.
pub fn default_channel_name(index: usize) -> String {
    format!("Channel_{}", index)
}

/// Lay out the output stack: ascending cycle order, then selection order.
///
/// `selected[i]` is the resolved channel list of cycle `i`; cycles listed in
/// `excluded` contribute nothing.
pub fn plan_stack(selected: &[Vec<usize>], excluded: &[usize]) -> ChannelMap {
    let channels = selected
        .iter()
        .enumerate()
        .filter(|(cycle, _)| !excluded.contains(cycle))
        .flat_map(|(cycle, list)| list.iter().map(move |&ch| (cycle, ch)))
        .enumerate()
        .map(|(output_index, (cycle, source_channel))| ChannelOrigin {
            output_index,
            cycle,
            source_channel,
            name: default_channel_name(output_index),
        })
        .collect();
    ChannelMap { channels }
}

/// Check a registered plane against the reference grid before it is
/// appended.
pub fn check_dimensions(
    origin: &ChannelOrigin,
    plane: &Plane,
    expected_width: usize,
    expected_height: usize,
) -> Result<()> {
    let (height, width) = plane.dim();
    if (width, height) != (expected_width, expected_height) {
        return Err(CycleMergeError::DimensionMismatch {
            cycle: origin.cycle,
            channel: origin.source_channel,
            width,
            height,
            expected_width,
            expected_height,
        });
    }
    Ok(())
}
