// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::graph::message::TOPIC_NAME;
use crate::transport::LoopbackTransport;
use crate::user_data::parse_enclave;
use std::time::{Duration, Instant};

fn transport() -> LoopbackTransport {
    LoopbackTransport::new()
}

fn context(transport: &LoopbackTransport, domain_id: u32) -> Context {
    Context::new(Arc::new(transport.clone()), ContextOptions::new(domain_id))
}

fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn participant_is_created_lazily() {
    let transport = transport();
    let ctx = context(&transport, 3);
    assert!(!ctx.is_initialized());
    assert_eq!(transport.participant_count(3), 0);

    let node = ctx.create_node("n", "/").expect("node");
    assert!(ctx.is_initialized());
    assert_eq!(ctx.ref_count(), 1);
    assert_eq!(transport.participant_count(3), 1);
    assert_eq!(ctx.participant_gid(), Some(node.participant_gid()));

    node.destroy().expect("destroy");
    assert!(!ctx.is_initialized());
    assert_eq!(transport.participant_count(3), 0);
}

#[test]
fn nodes_share_one_participant() {
    let transport = transport();
    let ctx = context(&transport, 0);
    let a = ctx.create_node("a", "/").expect("a");
    let b = ctx.create_node("b", "/").expect("b");
    assert_eq!(a.participant_gid(), b.participant_gid());
    assert_eq!(ctx.ref_count(), 2);
    assert_eq!(transport.participant_count(0), 1);

    a.destroy().expect("a");
    assert!(ctx.is_initialized());
    b.destroy().expect("b");
    assert!(!ctx.is_initialized());
}

#[test]
fn local_participant_is_recorded_with_enclave() {
    let transport = transport();
    let ctx = Context::new(
        Arc::new(transport.clone()),
        ContextOptions::new(0).with_enclave("/robot"),
    );
    let node = ctx.create_node("n", "/").expect("node");
    let cache = ctx.graph_cache().expect("cache");
    let record = cache.participant(&node.participant_gid()).expect("record");
    assert_eq!(record.enclave, "/robot");
    assert_eq!(cache.get_writer_count(TOPIC_NAME), 1);
    assert_eq!(cache.get_reader_count(TOPIC_NAME), 1);
}

#[test]
fn release_without_acquire_is_invalid() {
    let ctx = context(&transport(), 0);
    assert!(matches!(ctx.release(), Err(Error::InvalidState(_))));
}

#[test]
fn participants_discover_each_other() {
    let transport = transport();
    let ctx_a = context(&transport, 0);
    let ctx_b = Context::new(
        Arc::new(transport.clone()),
        ContextOptions::new(0).with_enclave("/b"),
    );
    let a = ctx_a.create_node("a", "/").expect("a");
    let b = ctx_b.create_node("b", "/").expect("b");

    let cache_a = ctx_a.graph_cache().expect("cache a");
    assert!(wait_for(|| cache_a.get_number_of_nodes() == 2));
    let remote = cache_a.participant(&b.participant_gid()).expect("remote");
    assert_eq!(remote.enclave, "/b");

    // A late empty snapshot from `b` may race with its removal; either way
    // only `a` remains.
    b.destroy().expect("b");
    assert!(wait_for(|| cache_a.get_number_of_nodes() == 1));
    a.destroy().expect("a");
}

#[test]
fn domains_are_isolated() {
    let transport = transport();
    let ctx_a = context(&transport, 1);
    let ctx_b = context(&transport, 2);
    let _a = ctx_a.create_node("a", "/").expect("a");
    let _b = ctx_b.create_node("b", "/").expect("b");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ctx_a.graph_cache().expect("cache").get_number_of_nodes(), 1);
}

#[test]
fn participant_user_data_carries_enclave() {
    let data = participant_user_data("/x");
    assert_eq!(parse_enclave(&data).expect("enclave"), "/x");
}
