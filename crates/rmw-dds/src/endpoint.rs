// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publishers, subscriptions, services and clients.
//!
//! # Lifecycle
//!
//! ```text
//! create:  [entity_creation] check type, topic ref, reader/writer, cache record
//!          [node_update]     associate, publish snapshot
//!                            (publish failed: dissociate, then delete below)
//! destroy: [node_update]     dissociate, publish snapshot
//!          [entity_creation] cache record, reader/writer, topic ref
//! ```
//!
//! The two mutexes are never held together.
//!
//! The data path is a raw pass-through: payloads are already serialized.

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::gid::Gid;
use crate::names::{mangle_service_reply, mangle_service_request, mangle_topic};
use crate::node::{Attached, Entity, Node, NodeInner};
use crate::qos::QosProfile;
use crate::transport::{DataReader, DataWriter};
use crate::user_data::TypeHash;
use std::sync::Arc;

/// DDS type name plus its type hash, as announced in endpoint user data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSupport {
    pub type_name: String,
    pub type_hash: TypeHash,
}

impl TypeSupport {
    /// Type without a hash (announced as the zero hash).
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            type_hash: TypeHash::zero(),
        }
    }

    pub fn with_hash(mut self, type_hash: TypeHash) -> Self {
        self.type_hash = type_hash;
        self
    }
}

struct EntitySpec<'a> {
    topic_name: String,
    type_support: &'a TypeSupport,
    is_reader: bool,
}

/// Entities of one endpoint and their registration with the node.
struct EndpointCore {
    node: Arc<NodeInner>,
    parts: Vec<Attached>,
    destroyed: bool,
}

impl EndpointCore {
    fn open(node: &Node, specs: &[EntitySpec<'_>], qos: &QosProfile) -> Result<Self> {
        let node = Arc::clone(&node.inner);
        if node.is_destroyed() {
            return Err(Error::InvalidState(format!(
                "node '{}' has been destroyed",
                node.name()
            )));
        }

        let mut parts: Vec<Attached> = Vec::with_capacity(specs.len());
        for spec in specs {
            match node.create_entity(
                &spec.topic_name,
                &spec.type_support.type_name,
                qos,
                &spec.type_support.type_hash,
                spec.is_reader,
            ) {
                Ok(attached) => parts.push(attached),
                Err(err) => {
                    delete_all(&node, &parts);
                    return Err(err);
                }
            }
        }

        let refs: Vec<&Attached> = parts.iter().collect();
        if let Err(err) = node.announce(&refs) {
            delete_all(&node, &parts);
            return Err(err);
        }

        node.endpoint_created();
        Ok(Self {
            node,
            parts,
            destroyed: false,
        })
    }

    fn gid(&self, index: usize) -> Option<Gid> {
        self.parts.get(index).map(|attached| attached.entity.gid())
    }

    fn close(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        if self.node.is_destroyed() {
            log::warn!(
                "[context] endpoint destroyed after its node '{}'",
                self.node.name()
            );
        }

        let mut first_error: Option<Error> = None;
        let refs: Vec<&Attached> = self.parts.iter().collect();
        if let Err(err) = self.node.withdraw(&refs) {
            log::error!("[context] failed to announce endpoint removal: {}", err);
            first_error.get_or_insert(err);
        }
        for attached in &self.parts {
            if let Err(err) = self.node.delete_entity(attached) {
                first_error.get_or_insert(err);
            }
        }
        self.node.endpoint_destroyed();
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for EndpointCore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("[context] endpoint drop: {}", err);
        }
    }
}

fn delete_all(node: &NodeInner, parts: &[Attached]) {
    for attached in parts {
        if let Err(err) = node.delete_entity(attached) {
            log::warn!("[context] rollback of {} failed: {}", attached.entity.gid().guid(), err);
        }
    }
}

fn writer_of(attached: &Attached) -> Result<&Arc<dyn DataWriter>> {
    match &attached.entity {
        Entity::Writer(writer) => Ok(writer),
        Entity::Reader(_) => Err(Error::InvalidState("endpoint side is not a writer".into())),
    }
}

fn reader_of(attached: &Attached) -> Result<&Arc<dyn DataReader>> {
    match &attached.entity {
        Entity::Reader(reader) => Ok(reader),
        Entity::Writer(_) => Err(Error::InvalidState("endpoint side is not a reader".into())),
    }
}

fn part(core: &EndpointCore, index: usize) -> Result<&Attached> {
    core.parts
        .get(index)
        .ok_or_else(|| Error::InvalidState("endpoint has no such entity".into()))
}

fn write(core: &EndpointCore, index: usize, payload: &[u8]) -> Result<()> {
    if core.destroyed {
        return Err(Error::InvalidState("endpoint destroyed".into()));
    }
    writer_of(part(core, index)?)?
        .write(payload)
        .map_err(Error::from)
}

fn take(core: &EndpointCore, index: usize) -> Result<Option<Vec<u8>>> {
    if core.destroyed {
        return Err(Error::InvalidState("endpoint destroyed".into()));
    }
    reader_of(part(core, index)?)?.take().map_err(Error::from)
}

fn data_condition(core: &EndpointCore, index: usize) -> Result<Arc<dyn Condition>> {
    Ok(reader_of(part(core, index)?)?.data_condition())
}

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("{} name is empty", kind)));
    }
    Ok(())
}

/// Writer on `rt/<topic>`.
pub struct Publisher {
    core: EndpointCore,
    topic_name: String,
}

impl Publisher {
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn gid(&self) -> Option<Gid> {
        self.core.gid(0)
    }

    /// Send an already serialized sample.
    pub fn publish(&self, payload: &[u8]) -> Result<()> {
        write(&self.core, 0, payload)
    }

    pub fn destroy(mut self) -> Result<()> {
        self.core.close()
    }
}

/// Reader on `rt/<topic>`.
pub struct Subscription {
    core: EndpointCore,
    topic_name: String,
}

impl Subscription {
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn gid(&self) -> Option<Gid> {
        self.core.gid(0)
    }

    /// Next serialized sample, `None` when nothing is pending.
    pub fn take(&self) -> Result<Option<Vec<u8>>> {
        take(&self.core, 0)
    }

    pub fn data_condition(&self) -> Result<Arc<dyn Condition>> {
        data_condition(&self.core, 0)
    }

    pub fn destroy(mut self) -> Result<()> {
        self.core.close()
    }
}

/// Request reader on `rq/<service>Request` and reply writer on
/// `rr/<service>Reply`.
pub struct Service {
    core: EndpointCore,
    service_name: String,
}

impl Service {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn request_reader_gid(&self) -> Option<Gid> {
        self.core.gid(0)
    }

    pub fn reply_writer_gid(&self) -> Option<Gid> {
        self.core.gid(1)
    }

    pub fn take_request(&self) -> Result<Option<Vec<u8>>> {
        take(&self.core, 0)
    }

    pub fn send_response(&self, payload: &[u8]) -> Result<()> {
        write(&self.core, 1, payload)
    }

    pub fn data_condition(&self) -> Result<Arc<dyn Condition>> {
        data_condition(&self.core, 0)
    }

    pub fn destroy(mut self) -> Result<()> {
        self.core.close()
    }
}

/// Request writer on `rq/<service>Request` and reply reader on
/// `rr/<service>Reply`.
pub struct Client {
    core: EndpointCore,
    service_name: String,
}

impl Client {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn request_writer_gid(&self) -> Option<Gid> {
        self.core.gid(0)
    }

    pub fn reply_reader_gid(&self) -> Option<Gid> {
        self.core.gid(1)
    }

    pub fn send_request(&self, payload: &[u8]) -> Result<()> {
        write(&self.core, 0, payload)
    }

    pub fn take_response(&self) -> Result<Option<Vec<u8>>> {
        take(&self.core, 1)
    }

    pub fn data_condition(&self) -> Result<Arc<dyn Condition>> {
        data_condition(&self.core, 1)
    }

    pub fn destroy(mut self) -> Result<()> {
        self.core.close()
    }
}

impl Node {
    pub fn create_publisher(
        &self,
        topic_name: &str,
        type_support: &TypeSupport,
        qos: &QosProfile,
    ) -> Result<Publisher> {
        check_name("topic", topic_name)?;
        let spec = EntitySpec {
            topic_name: mangle_topic(topic_name, qos.avoid_ros_namespace_conventions),
            type_support,
            is_reader: false,
        };
        let core = EndpointCore::open(self, &[spec], qos)?;
        log::debug!("[context] publisher on '{}' created", topic_name);
        Ok(Publisher {
            core,
            topic_name: topic_name.to_string(),
        })
    }

    pub fn create_subscription(
        &self,
        topic_name: &str,
        type_support: &TypeSupport,
        qos: &QosProfile,
    ) -> Result<Subscription> {
        check_name("topic", topic_name)?;
        let spec = EntitySpec {
            topic_name: mangle_topic(topic_name, qos.avoid_ros_namespace_conventions),
            type_support,
            is_reader: true,
        };
        let core = EndpointCore::open(self, &[spec], qos)?;
        log::debug!("[context] subscription on '{}' created", topic_name);
        Ok(Subscription {
            core,
            topic_name: topic_name.to_string(),
        })
    }

    pub fn create_service(
        &self,
        service_name: &str,
        request_type: &TypeSupport,
        response_type: &TypeSupport,
        qos: &QosProfile,
    ) -> Result<Service> {
        check_name("service", service_name)?;
        let avoid = qos.avoid_ros_namespace_conventions;
        let specs = [
            EntitySpec {
                topic_name: mangle_service_request(service_name, avoid),
                type_support: request_type,
                is_reader: true,
            },
            EntitySpec {
                topic_name: mangle_service_reply(service_name, avoid),
                type_support: response_type,
                is_reader: false,
            },
        ];
        let core = EndpointCore::open(self, &specs, qos)?;
        log::debug!("[context] service '{}' created", service_name);
        Ok(Service {
            core,
            service_name: service_name.to_string(),
        })
    }

    pub fn create_client(
        &self,
        service_name: &str,
        request_type: &TypeSupport,
        response_type: &TypeSupport,
        qos: &QosProfile,
    ) -> Result<Client> {
        check_name("service", service_name)?;
        let avoid = qos.avoid_ros_namespace_conventions;
        let specs = [
            EntitySpec {
                topic_name: mangle_service_request(service_name, avoid),
                type_support: request_type,
                is_reader: false,
            },
            EntitySpec {
                topic_name: mangle_service_reply(service_name, avoid),
                type_support: response_type,
                is_reader: true,
            },
        ];
        let core = EndpointCore::open(self, &specs, qos)?;
        log::debug!("[context] client of '{}' created", service_name);
        Ok(Client {
            core,
            service_name: service_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextOptions;
    use crate::context::Context;
    use crate::graph::message::TOPIC_NAME;
    use crate::transport::LoopbackTransport;

    const STRING: &str = "std_msgs::msg::dds_::String_";
    const INT: &str = "std_msgs::msg::dds_::Int32_";

    fn setup() -> (LoopbackTransport, Context, Node) {
        let transport = LoopbackTransport::new();
        let ctx = Context::new(Arc::new(transport.clone()), ContextOptions::new(0));
        let node = ctx.create_node("node", "/").expect("node");
        (transport, ctx, node)
    }

    #[test]
    fn publisher_is_recorded_and_associated() {
        let (transport, ctx, node) = setup();
        let cache = ctx.graph_cache().expect("cache");
        let publisher = node
            .create_publisher("/chatter", &TypeSupport::new(STRING), &QosProfile::default())
            .expect("publisher");
        let gid = publisher.gid().expect("gid");

        let record = cache.writer(&gid).expect("recorded");
        assert_eq!(record.topic_name, "rt/chatter");
        assert_eq!(record.participant_gid, node.participant_gid());
        assert!(cache.is_associated(&gid, &node.participant_gid(), false));
        assert!(transport.has_topic(node.participant_gid().guid(), "rt/chatter"));
        assert_eq!(node.endpoint_count(), 1);

        publisher.destroy().expect("destroy");
        assert!(cache.writer(&gid).is_none());
        assert!(!cache.is_associated(&gid, &node.participant_gid(), false));
        assert!(!transport.has_topic(node.participant_gid().guid(), "rt/chatter"));
        assert_eq!(node.endpoint_count(), 0);
    }

    #[test]
    fn endpoints_share_one_topic_object() {
        let (transport, _ctx, node) = setup();
        let participant = node.participant_gid().guid();
        let ts = TypeSupport::new(STRING);
        let a = node.create_publisher("/t", &ts, &QosProfile::default()).expect("a");
        let b = node.create_subscription("/t", &ts, &QosProfile::default()).expect("b");
        assert!(transport.has_topic(participant, "rt/t"));

        a.destroy().expect("destroy a");
        assert!(transport.has_topic(participant, "rt/t"));
        b.destroy().expect("destroy b");
        assert!(!transport.has_topic(participant, "rt/t"));
    }

    #[test]
    fn conflicting_type_is_rejected() {
        let (_transport, ctx, node) = setup();
        let _a = node
            .create_publisher("/t", &TypeSupport::new(STRING), &QosProfile::default())
            .expect("a");
        let err = node
            .create_subscription("/t", &TypeSupport::new(INT), &QosProfile::default())
            .err()
            .expect("type mismatch");
        assert!(matches!(err, Error::TopicTypeMismatch { .. }));
        assert_eq!(ctx.graph_cache().expect("cache").get_reader_count("rt/t"), 0);
    }

    #[test]
    fn publish_failure_rolls_back_endpoint() {
        let (transport, ctx, node) = setup();
        let cache = ctx.graph_cache().expect("cache");
        transport.set_write_failure(TOPIC_NAME, true);
        let err = node
            .create_publisher("/chatter", &TypeSupport::new(STRING), &QosProfile::default())
            .err()
            .expect("publish fails");
        assert!(matches!(err, Error::GossipPublishFailure(_)));
        assert_eq!(cache.get_writer_count("rt/chatter"), 0);
        assert!(!transport.has_topic(node.participant_gid().guid(), "rt/chatter"));
        let snapshot = cache.participant(&node.participant_gid()).expect("participant");
        assert!(snapshot.nodes[0].writer_gids.is_empty());
        assert_eq!(node.endpoint_count(), 0);
        transport.set_write_failure(TOPIC_NAME, false);
    }

    #[test]
    fn service_and_client_exchange_payloads() {
        let (_transport, ctx, node) = setup();
        let request = TypeSupport::new("example::srv::dds_::Add_Request_");
        let response = TypeSupport::new("example::srv::dds_::Add_Response_");
        let service = node
            .create_service("/add", &request, &response, &QosProfile::default())
            .expect("service");
        let client = node
            .create_client("/add", &request, &response, &QosProfile::default())
            .expect("client");

        client.send_request(b"1+2").expect("request");
        assert_eq!(service.take_request().expect("take").as_deref(), Some(&b"1+2"[..]));
        service.send_response(b"3").expect("response");
        assert_eq!(client.take_response().expect("take").as_deref(), Some(&b"3"[..]));

        let cache = ctx.graph_cache().expect("cache");
        assert_eq!(cache.get_reader_count("rq/addRequest"), 1);
        assert_eq!(cache.get_writer_count("rr/addReply"), 1);
        let info = cache.participant(&node.participant_gid()).expect("participant");
        assert_eq!(info.nodes[0].reader_gids.len(), 2);
        assert_eq!(info.nodes[0].writer_gids.len(), 2);

        client.destroy().expect("client");
        service.destroy().expect("service");
        assert_eq!(cache.get_reader_count("rq/addRequest"), 0);
    }

    #[test]
    fn dropped_endpoint_is_cleaned_up() {
        let (_transport, ctx, node) = setup();
        let cache = ctx.graph_cache().expect("cache");
        {
            let _sub = node
                .create_subscription("/scoped", &TypeSupport::new(STRING), &QosProfile::default())
                .expect("sub");
            assert_eq!(cache.get_reader_count("rt/scoped"), 1);
        }
        assert_eq!(cache.get_reader_count("rt/scoped"), 0);
    }
}
