// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Graph queries available from a node.
//!
//! Topic arguments are ROS names (`/chatter`); they are mangled before the
//! cache lookup unless `no_mangle` is set. Returned names are demangled.

use crate::condition::GuardCondition;
use crate::error::Result;
use crate::graph::{NamesAndTypes, NodeName, TopicEndpointInfo};
use crate::names::{
    demangle_if_ros_type, demangle_ros_topic_from_topic, demangle_service_from_topic,
    demangle_service_reply_from_topic, demangle_service_request_from_topic,
    demangle_service_type_only, identity_demangle, mangle_service_reply, mangle_service_request,
    mangle_topic, DemangleFn,
};
use crate::node::Node;
use std::sync::Arc;

fn topic_demanglers(no_demangle: bool) -> (DemangleFn, DemangleFn) {
    if no_demangle {
        (identity_demangle, identity_demangle)
    } else {
        (demangle_ros_topic_from_topic, demangle_if_ros_type)
    }
}

impl Node {
    fn graph(&self) -> &crate::graph::GraphCache {
        &self.inner.shared.graph_cache
    }

    /// Guard condition triggered on every graph change.
    pub fn graph_guard_condition(&self) -> Arc<GuardCondition> {
        Arc::clone(&self.inner.shared.graph_guard)
    }

    pub fn count_publishers(&self, topic_name: &str) -> usize {
        self.graph().get_writer_count(&mangle_topic(topic_name, false))
    }

    pub fn count_subscribers(&self, topic_name: &str) -> usize {
        self.graph().get_reader_count(&mangle_topic(topic_name, false))
    }

    /// Servers listen on the request topic.
    pub fn count_services(&self, service_name: &str) -> usize {
        self.graph()
            .get_reader_count(&mangle_service_request(service_name, false))
    }

    /// Clients write on the request topic.
    pub fn count_clients(&self, service_name: &str) -> usize {
        self.graph()
            .get_writer_count(&mangle_service_request(service_name, false))
    }

    /// Every topic in the graph. With `no_demangle`, raw DDS topic and type
    /// names are returned, including non-ROS topics.
    pub fn get_topic_names_and_types(&self, no_demangle: bool) -> NamesAndTypes {
        let (demangle_topic, demangle_type) = topic_demanglers(no_demangle);
        self.graph().get_names_and_types(demangle_topic, demangle_type)
    }

    pub fn get_service_names_and_types(&self) -> NamesAndTypes {
        self.graph()
            .get_names_and_types(demangle_service_from_topic, demangle_service_type_only)
    }

    pub fn get_publisher_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
        no_demangle: bool,
    ) -> Result<NamesAndTypes> {
        let (demangle_topic, demangle_type) = topic_demanglers(no_demangle);
        self.graph().get_writer_names_and_types_by_node(
            node_name,
            node_namespace,
            demangle_topic,
            demangle_type,
        )
    }

    pub fn get_subscriber_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
        no_demangle: bool,
    ) -> Result<NamesAndTypes> {
        let (demangle_topic, demangle_type) = topic_demanglers(no_demangle);
        self.graph().get_reader_names_and_types_by_node(
            node_name,
            node_namespace,
            demangle_topic,
            demangle_type,
        )
    }

    /// Services served by a node (its request readers).
    pub fn get_service_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
    ) -> Result<NamesAndTypes> {
        self.graph().get_reader_names_and_types_by_node(
            node_name,
            node_namespace,
            demangle_service_request_from_topic,
            demangle_service_type_only,
        )
    }

    /// Services used by a node (its reply readers).
    pub fn get_client_names_and_types_by_node(
        &self,
        node_name: &str,
        node_namespace: &str,
    ) -> Result<NamesAndTypes> {
        self.graph().get_reader_names_and_types_by_node(
            node_name,
            node_namespace,
            demangle_service_reply_from_topic,
            demangle_service_type_only,
        )
    }

    pub fn get_publishers_info_by_topic(
        &self,
        topic_name: &str,
        no_mangle: bool,
    ) -> Vec<TopicEndpointInfo> {
        let (topic, demangle_type) = lookup_topic(topic_name, no_mangle);
        self.graph().get_writers_info_by_topic(&topic, demangle_type)
    }

    pub fn get_subscriptions_info_by_topic(
        &self,
        topic_name: &str,
        no_mangle: bool,
    ) -> Vec<TopicEndpointInfo> {
        let (topic, demangle_type) = lookup_topic(topic_name, no_mangle);
        self.graph().get_readers_info_by_topic(&topic, demangle_type)
    }

    /// Name and namespace of every node in the graph.
    pub fn get_node_names(&self) -> Vec<(String, String)> {
        self.graph()
            .get_node_names()
            .into_iter()
            .map(|node| (node.name, node.namespace))
            .collect()
    }

    pub fn get_node_names_with_enclaves(&self) -> Vec<NodeName> {
        self.graph().get_node_names()
    }

    /// A server is available once both its request reader and its reply
    /// writer have been discovered.
    pub fn service_server_is_available(&self, service_name: &str) -> bool {
        let graph = self.graph();
        graph.get_reader_count(&mangle_service_request(service_name, false)) > 0
            && graph.get_writer_count(&mangle_service_reply(service_name, false)) > 0
    }
}

fn lookup_topic(topic_name: &str, no_mangle: bool) -> (String, DemangleFn) {
    if no_mangle {
        (topic_name.to_string(), identity_demangle)
    } else {
        (mangle_topic(topic_name, false), demangle_if_ros_type)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ContextOptions;
    use crate::context::Context;
    use crate::endpoint::TypeSupport;
    use crate::error::Error;
    use crate::graph::{EndpointType, NODE_NAME_UNKNOWN};
    use crate::qos::QosProfile;
    use crate::transport::LoopbackTransport;
    use std::sync::Arc;

    const STRING: &str = "std_msgs::msg::dds_::String_";

    fn context() -> Context {
        Context::new(Arc::new(LoopbackTransport::new()), ContextOptions::new(0))
    }

    #[test]
    fn counts_and_names_of_local_endpoints() {
        let ctx = context();
        let node = ctx.create_node("talker", "/").expect("node");
        let ts = TypeSupport::new(STRING);
        let _p = node.create_publisher("/chatter", &ts, &QosProfile::default()).expect("pub");
        let _s = node.create_subscription("/chatter", &ts, &QosProfile::default()).expect("sub");

        assert_eq!(node.count_publishers("/chatter"), 1);
        assert_eq!(node.count_subscribers("/chatter"), 1);

        let topics = node.get_topic_names_and_types(false);
        let types = topics.get("/chatter").expect("demangled topic");
        assert!(types.contains("std_msgs/msg/String"));
        assert!(!topics.contains_key("ros_discovery_info"));

        let raw = node.get_topic_names_and_types(true);
        assert!(raw.contains_key("rt/chatter"));
        assert!(raw.contains_key("ros_discovery_info"));

        let by_node = node
            .get_publisher_names_and_types_by_node("talker", "/", false)
            .expect("by node");
        assert_eq!(by_node.keys().collect::<Vec<_>>(), vec!["/chatter"]);
    }

    #[test]
    fn services_and_clients() {
        let ctx = context();
        let node = ctx.create_node("server", "/").expect("node");
        let req = TypeSupport::new("example::srv::dds_::Add_Request_");
        let rep = TypeSupport::new("example::srv::dds_::Add_Response_");
        assert!(!node.service_server_is_available("/add"));

        let _service = node
            .create_service("/add", &req, &rep, &QosProfile::default())
            .expect("service");
        assert!(node.service_server_is_available("/add"));
        assert_eq!(node.count_services("/add"), 1);
        assert_eq!(node.count_clients("/add"), 0);

        let services = node.get_service_names_and_types();
        assert!(services["/add"].contains("example/srv/Add"));
        let served = node.get_service_names_and_types_by_node("server", "/").expect("served");
        assert!(served.contains_key("/add"));
        let used = node.get_client_names_and_types_by_node("server", "/").expect("used");
        assert!(used.is_empty());

        let _client = node
            .create_client("/add", &req, &rep, &QosProfile::default())
            .expect("client");
        assert_eq!(node.count_clients("/add"), 1);
        let used = node.get_client_names_and_types_by_node("server", "/").expect("used");
        assert!(used.contains_key("/add"));
    }

    #[test]
    fn unknown_node_is_an_error() {
        let ctx = context();
        let node = ctx.create_node("n", "/").expect("node");
        let err = node
            .get_subscriber_names_and_types_by_node("ghost", "/", false)
            .expect_err("unknown node");
        assert!(matches!(err, Error::NodeNameNonExistent { .. }));
    }

    #[test]
    fn info_by_topic_reports_owner() {
        let ctx = context();
        let node = ctx.create_node("talker", "/ns").expect("node");
        let publisher = node
            .create_publisher("/chatter", &TypeSupport::new(STRING), &QosProfile::default())
            .expect("pub");
        let infos = node.get_publishers_info_by_topic("/chatter", false);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].node_name, "talker");
        assert_eq!(infos[0].node_namespace, "/ns");
        assert_eq!(infos[0].topic_type, "std_msgs/msg/String");
        assert_eq!(infos[0].endpoint_type, EndpointType::Publisher);
        assert_eq!(Some(infos[0].endpoint_gid), publisher.gid());
        assert!(node.get_subscriptions_info_by_topic("/chatter", false).is_empty());

        // gossip endpoints are not claimed by any node
        let gossip = node.get_publishers_info_by_topic("ros_discovery_info", true);
        assert_eq!(gossip.len(), 1);
        assert_eq!(gossip[0].node_name, NODE_NAME_UNKNOWN);
    }

    #[test]
    fn node_names_include_enclave() {
        let ctx = Context::new(
            Arc::new(LoopbackTransport::new()),
            ContextOptions::new(0).with_enclave("/secure"),
        );
        let a = ctx.create_node("a", "/").expect("a");
        let _b = ctx.create_node("b", "/x").expect("b");
        let mut names = a.get_node_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), "/".to_string()),
                ("b".to_string(), "/x".to_string())
            ]
        );
        assert!(a
            .get_node_names_with_enclaves()
            .iter()
            .all(|n| n.enclave == "/secure"));
    }

    #[test]
    fn graph_guard_fires_on_change() {
        let ctx = context();
        let node = ctx.create_node("n", "/").expect("node");
        let guard = node.graph_guard_condition();
        let _ = guard.take_trigger();
        let _p = node
            .create_publisher("/x", &TypeSupport::new(STRING), &QosProfile::default())
            .expect("pub");
        assert!(guard.take_trigger());
    }
}
