use serde::{Deserialize, Serialize};

use crate::ResourceQuantity;

/// Outcome of comparing shared headroom against one more cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityDecision {
    /// Headroom covers the required footprint.
    Proceed,
    /// Headroom does not cover the required footprint.
    Insufficient,
}

impl CapacityDecision {
    /// Returns stable decision value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Insufficient => "insufficient",
        }
    }
}

/// Aggregate capacity of the shared control plane at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Sum of allocatable resources across schedulable nodes.
    pub allocatable: ResourceQuantity,
    /// Sum of resource requests of running workloads.
    pub requested: ResourceQuantity,
    /// Extra capacity the autoscaler is projected to add.
    pub autoscale_headroom: ResourceQuantity,
}

impl CapacitySnapshot {
    /// Returns the free capacity including autoscaling headroom.
    #[must_use]
    pub fn available(&self) -> ResourceQuantity {
        self.allocatable
            .saturating_sub(self.requested)
            .saturating_add(self.autoscale_headroom)
    }

    /// Decides whether one more footprint of `required` fits.
    #[must_use]
    pub fn decide(&self, required: &ResourceQuantity) -> CapacityDecision {
        if self.available().covers(required) {
            CapacityDecision::Proceed
        } else {
            CapacityDecision::Insufficient
        }
    }
}
