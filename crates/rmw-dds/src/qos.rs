// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Canonical QoS profile recorded for graph endpoints.
//!
//! This is the ROS-level view of an endpoint's QoS (what introspection
//! reports), not a full DDS policy set. Translation to and from the
//! transport's native policies happens on the transport side.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum History {
    KeepLast(u32),
    KeepAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reliability {
    Reliable,
    BestEffort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Durability {
    Volatile,
    TransientLocal,
}

/// Only automatic liveliness is asserted by the rmw layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Liveliness {
    Automatic,
}

/// QoS settings captured for a graph endpoint.
///
/// `None` durations mean "infinite" (the DDS default).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QosProfile {
    pub history: History,
    pub reliability: Reliability,
    pub durability: Durability,
    pub deadline: Option<Duration>,
    pub lifespan: Option<Duration>,
    pub liveliness: Liveliness,
    pub liveliness_lease_duration: Option<Duration>,
    pub avoid_ros_namespace_conventions: bool,
}

impl Default for QosProfile {
    /// The ROS default profile: reliable, volatile, keep last 10.
    fn default() -> Self {
        Self {
            history: History::KeepLast(10),
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            deadline: None,
            lifespan: None,
            liveliness: Liveliness::Automatic,
            liveliness_lease_duration: None,
            avoid_ros_namespace_conventions: false,
        }
    }
}

impl QosProfile {
    pub fn reliable() -> Self {
        Self::default()
    }

    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Self::default()
        }
    }

    /// Profile of the `ros_discovery_info` publisher.
    pub fn participant_entities_info_writer() -> Self {
        Self::reliable()
            .transient_local()
            .keep_last(1)
            .avoid_ros_namespace_conventions(true)
    }

    /// Profile of the `ros_discovery_info` subscriber.
    pub fn participant_entities_info_reader() -> Self {
        Self::reliable()
            .transient_local()
            .keep_all()
            .avoid_ros_namespace_conventions(true)
    }

    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    pub fn avoid_ros_namespace_conventions(mut self, avoid: bool) -> Self {
        self.avoid_ros_namespace_conventions = avoid;
        self
    }

    /// Number of samples kept per writer/reader, `None` for keep-all.
    pub fn depth(&self) -> Option<usize> {
        match self.history {
            History::KeepLast(depth) => Some(depth.max(1) as usize),
            History::KeepAll => None,
        }
    }
}
