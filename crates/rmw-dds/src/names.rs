// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ROS <-> DDS topic and type name mangling.
//!
//! ROS topics live on DDS topics prefixed by `rt`, service requests on
//! `rq<service>Request` and replies on `rr<service>Reply`. Type names follow
//! the `pkg::msg::dds_::Type_` convention. Graph queries run the cached
//! (mangled) names through a pair of demangle functions; a function
//! returning `None` hides the entry from that query.

/// Demangle hook applied by graph queries to topic and type names.
pub type DemangleFn = fn(&str) -> Option<String>;

pub const ROS_TOPIC_PREFIX: &str = "rt";
pub const ROS_SERVICE_REQUESTER_PREFIX: &str = "rq";
pub const ROS_SERVICE_RESPONSE_PREFIX: &str = "rr";

pub const SERVICE_REQUEST_SUFFIX: &str = "Request";
pub const SERVICE_REPLY_SUFFIX: &str = "Reply";

const DDS_NAMESPACE_MARKER: &str = "dds_::";

fn fully_qualified(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Build the DDS topic name for a ROS name.
///
/// With `avoid_ros_namespace_conventions` the name is used verbatim and only
/// the suffix is appended.
pub fn mangle(
    prefix: &str,
    name: &str,
    suffix: &str,
    avoid_ros_namespace_conventions: bool,
) -> String {
    if avoid_ros_namespace_conventions {
        format!("{}{}", name, suffix)
    } else {
        format!("{}{}{}", prefix, fully_qualified(name), suffix)
    }
}

pub fn mangle_topic(name: &str, avoid_ros_namespace_conventions: bool) -> String {
    mangle(ROS_TOPIC_PREFIX, name, "", avoid_ros_namespace_conventions)
}

pub fn mangle_service_request(service: &str, avoid_ros_namespace_conventions: bool) -> String {
    mangle(
        ROS_SERVICE_REQUESTER_PREFIX,
        service,
        SERVICE_REQUEST_SUFFIX,
        avoid_ros_namespace_conventions,
    )
}

pub fn mangle_service_reply(service: &str, avoid_ros_namespace_conventions: bool) -> String {
    mangle(
        ROS_SERVICE_RESPONSE_PREFIX,
        service,
        SERVICE_REPLY_SUFFIX,
        avoid_ros_namespace_conventions,
    )
}

fn resolve_prefix(topic_name: &str, prefix: &str) -> Option<String> {
    topic_name
        .strip_prefix(prefix)
        .filter(|rest| rest.starts_with('/'))
        .map(str::to_string)
}

pub fn identity_demangle(name: &str) -> Option<String> {
    Some(name.to_string())
}

/// Plain topics only (`rt` prefix).
pub fn demangle_ros_topic_from_topic(topic_name: &str) -> Option<String> {
    resolve_prefix(topic_name, ROS_TOPIC_PREFIX)
}

/// `pkg::msg::dds_::Type_` -> `pkg/msg/Type`; anything else is returned as is.
pub fn demangle_if_ros_type(dds_type_name: &str) -> Option<String> {
    if !dds_type_name.ends_with('_') {
        return Some(dds_type_name.to_string());
    }
    let Some(marker) = dds_type_name.find(DDS_NAMESPACE_MARKER) else {
        return Some(dds_type_name.to_string());
    };
    let namespace = dds_type_name[..marker].replace("::", "/");
    let start = marker + DDS_NAMESPACE_MARKER.len();
    let type_name = &dds_type_name[start..dds_type_name.len() - 1];
    Some(format!("{}{}", namespace, type_name))
}

fn demangle_service(topic_name: &str, prefix: &str, suffix: &str) -> Option<String> {
    let rest = resolve_prefix(topic_name, prefix)?;
    let service = rest.strip_suffix(suffix)?;
    Some(service.to_string())
}

pub fn demangle_service_request_from_topic(topic_name: &str) -> Option<String> {
    demangle_service(topic_name, ROS_SERVICE_REQUESTER_PREFIX, SERVICE_REQUEST_SUFFIX)
}

pub fn demangle_service_reply_from_topic(topic_name: &str) -> Option<String> {
    demangle_service(topic_name, ROS_SERVICE_RESPONSE_PREFIX, SERVICE_REPLY_SUFFIX)
}

/// Either side of a service (request or reply topic).
pub fn demangle_service_from_topic(topic_name: &str) -> Option<String> {
    demangle_service_request_from_topic(topic_name)
        .or_else(|| demangle_service_reply_from_topic(topic_name))
}

/// `pkg::srv::dds_::Type_Request_` / `_Response_` -> `pkg/srv/Type`.
pub fn demangle_service_type_only(dds_type_name: &str) -> Option<String> {
    let marker = dds_type_name.find(DDS_NAMESPACE_MARKER)?;
    let type_end = ["_Response_", "_Request_"]
        .iter()
        .find_map(|suffix| dds_type_name.strip_suffix(suffix).map(str::len))?;
    let start = marker + DDS_NAMESPACE_MARKER.len();
    if type_end < start {
        return None;
    }
    let namespace = dds_type_name[..marker].replace("::", "/");
    Some(format!("{}{}", namespace, &dds_type_name[start..type_end]))
}
