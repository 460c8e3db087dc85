//! Block and operation streaming against an in-memory node.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chainstream_core::{Blockchain, BlockchainConfig, ChainMode, StreamError, StreamOptions};
use common::{block_body, fast_config, time_of, transfer_and_vote_shaped, MockNode};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;

#[tokio::test]
async fn ops_statistics_counts_each_type() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 104), fast_config());
    let stats = chain.ops_statistics(100, 104).await.unwrap();
    let expected = BTreeMap::from([("transfer".to_string(), 5), ("vote".to_string(), 5)]);
    assert_eq!(stats, expected);
}

#[tokio::test]
async fn statistics_match_only_ops_stream() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 110), fast_config());
    let stats = chain.ops_statistics(102, 108).await.unwrap();
    let ops: Vec<_> = chain
        .stream(StreamOptions::new().range(102, 108).only_ops(true))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(stats.values().sum::<u64>(), ops.len() as u64);
}

#[tokio::test]
async fn stream_respects_range_and_filter() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 110), fast_config());
    let ops: Vec<_> = chain
        .stream(StreamOptions::new().op_names(["transfer"]).range(103, 106))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ops.len(), 4);
    for op in &ops {
        assert_eq!(op.op_type(), "transfer");
        assert!((103..=106).contains(&op.block_num));
        let tx = op.transaction.as_ref().expect("transaction context");
        assert_eq!(tx.block_num, op.block_num);
    }
}

#[tokio::test]
async fn all_four_stream_views_agree_with_statistics() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 110), fast_config());
    let stats = chain.ops_statistics(100, 110).await.unwrap();

    for (raw, only_ops) in [(false, false), (true, false), (false, true), (true, true)] {
        let opts = StreamOptions::new()
            .op_names(["transfer", "vote"])
            .range(100, 110)
            .raw_ops(raw)
            .only_ops(only_ops);
        let ops: Vec<_> = chain.stream(opts).try_collect().await.unwrap();

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for op in &ops {
            let v = serde_json::to_value(op).unwrap();
            let op_type = if raw { v["op"][0].clone() } else { v["type"].clone() };
            *counts.entry(op_type.as_str().unwrap().to_string()).or_default() += 1;
            let block_num = v["block_num"].as_u64().unwrap();
            assert!((100..=110).contains(&block_num));
            assert_eq!(op.transaction.is_none(), only_ops);
        }
        assert_eq!(counts, stats, "raw={raw} only_ops={only_ops}");
    }
}

#[tokio::test]
async fn blocks_are_consecutive_and_bounded() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 120), fast_config());
    let blocks: Vec<_> = chain.blocks(Some(105), Some(115)).try_collect().await.unwrap();
    assert_eq!(blocks.len(), 11);
    assert_eq!(blocks[0].number, 105);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].number, pair[0].number + 1);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[tokio::test]
async fn batched_fetch_yields_same_blocks() {
    let node = Arc::new(MockNode::transfer_vote_chain(100, 120));
    let sequential = Blockchain::new(node.clone(), fast_config());
    let batched = Blockchain::new(
        node,
        BlockchainConfig {
            batch_size: 4,
            ..fast_config()
        },
    );
    let a: Vec<_> = sequential.blocks(Some(101), Some(117)).try_collect().await.unwrap();
    let b: Vec<_> = batched.blocks(Some(101), Some(117)).try_collect().await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn blocks_without_arguments_starts_at_head() {
    let node = MockNode::transfer_vote_chain(100, 130);
    let head = node.head();
    let chain = Blockchain::new(node, fast_config());
    let first: Vec<_> = chain.blocks(None, None).take(1).try_collect().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].number, head);
}

#[tokio::test]
async fn live_follow_waits_for_new_blocks() {
    let node = MockNode::transfer_vote_chain(100, 130);
    node.set_head(110);
    node.advance_on_query(true);
    let chain = Blockchain::new(node, fast_config());

    let blocks: Vec<_> = chain.blocks(Some(108), None).take(8).try_collect().await.unwrap();
    let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
    assert_eq!(numbers, (108..116).collect::<Vec<_>>());
}

#[tokio::test]
async fn stop_beyond_head_follows_until_stop() {
    let node = MockNode::transfer_vote_chain(100, 130);
    node.set_head(105);
    node.advance_on_query(true);
    let chain = Blockchain::new(node, fast_config());

    let blocks: Vec<_> = chain.blocks(Some(104), Some(112)).try_collect().await.unwrap();
    assert_eq!(blocks.first().unwrap().number, 104);
    assert_eq!(blocks.last().unwrap().number, 112);
    assert_eq!(blocks.len(), 9);
}

#[tokio::test]
async fn irreversible_mode_starts_at_last_irreversible_block() {
    let node = MockNode::transfer_vote_chain(100, 130);
    node.set_irreversible(115);
    let chain = Blockchain::new(
        node,
        BlockchainConfig {
            mode: ChainMode::Irreversible,
            ..fast_config()
        },
    );
    assert_eq!(chain.get_current_block_num().await.unwrap(), 115);
    let first: Vec<_> = chain.blocks(None, None).take(1).try_collect().await.unwrap();
    assert_eq!(first[0].number, 115);
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let chain = Blockchain::new(MockNode::transfer_vote_chain(100, 110), fast_config());
    let err = chain.blocks(Some(109), Some(101)).try_next().await.unwrap_err();
    assert!(matches!(err, StreamError::InvalidRange { start: 109, stop: 101 }));
}

#[tokio::test]
async fn malformed_block_aborts_the_stream() {
    let node = MockNode::transfer_vote_chain(100, 110);
    node.insert(103, json!({"witness": "broken", "transactions": []}));
    let chain = Blockchain::new(node, fast_config());

    let mut blocks = chain.blocks(Some(101), Some(106));
    assert_eq!(blocks.try_next().await.unwrap().unwrap().number, 101);
    assert_eq!(blocks.try_next().await.unwrap().unwrap().number, 102);
    let err = blocks.try_next().await.unwrap_err();
    assert!(matches!(err, StreamError::MalformedBlock { block_num: 103, .. }));
    assert!(blocks.next().await.is_none(), "stream must not resume after an error");
}

#[tokio::test]
async fn node_error_aborts_the_stream() {
    let node = Arc::new(MockNode::transfer_vote_chain(100, 110));
    node.fail_block(103);
    let chain = Blockchain::new(node.clone(), fast_config());

    let mut blocks = chain.blocks(Some(101), Some(106));
    assert_eq!(blocks.try_next().await.unwrap().unwrap().number, 101);
    assert_eq!(blocks.try_next().await.unwrap().unwrap().number, 102);
    let calls = node.block_calls.load(Ordering::SeqCst);
    let err = blocks.try_next().await.unwrap_err();
    assert!(matches!(err, StreamError::Rpc(_)), "{err:?}");
    assert_eq!(node.block_calls.load(Ordering::SeqCst), calls + 1, "node errors are not re-polled");
    assert!(blocks.next().await.is_none());
    assert_eq!(node.block_calls.load(Ordering::SeqCst), calls + 1);
}

#[tokio::test]
async fn node_error_aborts_statistics() {
    let node = MockNode::transfer_vote_chain(100, 110);
    node.fail_block(104);
    let chain = Blockchain::new(node, fast_config());
    let err = chain.ops_statistics(100, 108).await.unwrap_err();
    assert!(matches!(err, StreamError::Rpc(_)));
}

#[tokio::test]
async fn head_error_while_following_ends_the_stream() {
    let node = Arc::new(MockNode::transfer_vote_chain(100, 110));
    let chain = Blockchain::new(node.clone(), fast_config());

    let mut blocks = chain.blocks(Some(110), None);
    assert_eq!(blocks.try_next().await.unwrap().unwrap().number, 110);
    node.fail_head(true);
    let err = blocks.try_next().await.unwrap_err();
    assert!(matches!(err, StreamError::Rpc(_)));
    assert!(blocks.next().await.is_none());
}

#[tokio::test]
async fn missing_block_times_out_after_wait_repetitions() {
    let node = MockNode::transfer_vote_chain(100, 110);
    node.set_head(112); // head claims blocks the node cannot serve
    let chain = Blockchain::new(
        node,
        BlockchainConfig {
            max_block_wait_repetition: 3,
            ..fast_config()
        },
    );
    let result: Result<Vec<_>, _> = chain.blocks(Some(109), Some(112)).try_collect().await;
    assert!(matches!(
        result,
        Err(StreamError::BlockWaitTimeout { block_num: 111, attempts: 3 })
    ));
}

#[tokio::test]
async fn dropping_the_stream_stops_fetching() {
    let node = Arc::new(MockNode::transfer_vote_chain(100, 110));
    let chain = Blockchain::new(node.clone(), fast_config());
    {
        let mut blocks = chain.blocks(Some(100), None);
        blocks.try_next().await.unwrap();
        blocks.try_next().await.unwrap();
    }
    let calls = node.block_calls.load(Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(node.block_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn hash_op_matches_across_wire_shapes() {
    let chain = Blockchain::new(MockNode::new(), fast_config());
    let payload = json!({
        "voter": "ubg",
        "author": "yesslife",
        "permlink": "steemit-sandwich-contest-week-25-2da-entry",
        "weight": 100
    });
    let record = json!({"type": "vote_operation", "value": payload});
    let pair = json!(["vote", payload]);
    assert_eq!(chain.hash_op(&record).unwrap(), chain.hash_op(&pair).unwrap());
}

#[tokio::test]
async fn streamed_op_ids_are_canonical_hashes() {
    let node = MockNode::new();
    node.insert(1, block_body(1, time_of(1, 3), transfer_and_vote_shaped(1, false)));
    node.insert(2, block_body(2, time_of(2, 3), transfer_and_vote_shaped(1, true)));
    node.set_head(2);
    let chain = Blockchain::new(node, fast_config());

    // Same operations, block 1 as named records and block 2 as tagged pairs.
    let ops: Vec<_> = chain.ops(Some(1), Some(2)).try_collect().await.unwrap();
    assert_eq!(ops.len(), 4);
    assert_eq!(ops[0].id, ops[2].id);
    assert_eq!(ops[1].id, ops[3].id);
}
