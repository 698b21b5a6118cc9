use std::time::Duration;

use bytes::Bytes;
use ringcast_transport::connections::DummyConfig;
use ringcast_transport::connections::DummyNetwork;
use ringcast_transport::core::transport::ConnectionState;

use crate::error::Error;
use crate::error::Result;
use crate::message::RpcRequest;
use crate::node::callback::NodeEvent;
use crate::tests::default::*;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_successor_falls_back_to_next_candidate() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x40), did(0x70), did(0xa0), did(0xd0)];
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;
    for n in nodes.iter_mut() {
        n.drain();
    }

    let gone = nodes.remove(2);
    gone.node.destroy().await?;
    assert!(gone.node.is_destroyed());

    let event = nodes[1]
        .wait_event(WAIT, |e| matches!(e, NodeEvent::SuccessorRecovered { .. }))
        .await;
    assert_eq!(
        event,
        Some(NodeEvent::SuccessorRecovered {
            lost: did(0x70),
            successor: did(0xa0),
        })
    );
    assert_eq!(nodes[1].node.dht().successor()?, Some(did(0xa0)));

    stabilize_until_converged(&nodes, 10).await;
    run_fix_fingers(&nodes, 8).await;
    let alive = [did(0x10), did(0x40), did(0xa0), did(0xd0)];
    for n in nodes.iter() {
        assert_eq!(n.node.find_successor(did(0x60)).await?, did(0xa0));
        assert_eq!(n.node.find_successor(did(0xe0)).await?, did(0x10));
        assert!(!n.node.neighbors().contains(&did(0x70)));
        for target in alive {
            assert_eq!(n.node.find_successor(target).await?, target);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_ring_heals_around_lost_node() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x50), did(0x90)];
    let nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;

    nodes[0].node.destroy().await?;
    settle().await;
    // 0x90 lost its successor and falls back to 0x50
    assert_eq!(nodes[2].node.dht().successor()?, Some(did(0x50)));
    assert_ne!(nodes[1].node.dht().predecessor()?, Some(did(0x10)));

    stabilize_until_converged(&nodes[1..], 10).await;
    assert_eq!(nodes[1].node.dht().predecessor()?, Some(did(0x90)));
    assert_eq!(nodes[1].node.find_successor(did(0x05)).await?, did(0x50));
    Ok(())
}

#[tokio::test]
async fn test_exhausted_fallback_isolates_node() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let mut nodes =
        prepare_converged_ring(&network, &[did(0x10), did(0x50)], test_config(4)).await?;

    nodes[1].node.destroy().await?;
    let event = nodes[0]
        .wait_event(WAIT, |e| matches!(e, NodeEvent::Isolated { .. }))
        .await;
    assert_eq!(event, Some(NodeEvent::Isolated { lost: did(0x50) }));

    let dht = nodes[0].node.dht();
    assert_eq!(dht.successor()?, None);
    assert_eq!(dht.predecessor()?, None);
    assert!(nodes[0].node.neighbors().is_empty());

    // an isolated node can be joined again
    let fresh = prepare_node(&network, did(0x90), test_config(4))?;
    fresh.node.join(did(0x10)).await?;
    settle().await;
    assert_eq!(dht.successor()?, Some(did(0x90)));
    assert_eq!(fresh.node.dht().successor()?, Some(did(0x10)));
    Ok(())
}

#[tokio::test]
async fn test_link_state_changes_are_reported() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let mut nodes =
        prepare_converged_ring(&network, &[did(0x10), did(0x50)], test_config(4)).await?;

    let seen: Vec<Delivery> = nodes[1].drain();
    assert!(seen.contains(&Delivery::Event(NodeEvent::ConnectionStateChange {
        peer: did(0x10),
        state: ConnectionState::Connected,
    })));

    nodes[0].node.destroy().await?;
    let event = nodes[1]
        .wait_event(WAIT, |e| {
            matches!(e, NodeEvent::ConnectionStateChange { state, .. } if state.is_terminated())
        })
        .await;
    assert_eq!(
        event,
        Some(NodeEvent::ConnectionStateChange {
            peer: did(0x10),
            state: ConnectionState::Disconnected,
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_destroyed_node_refuses_work() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let nodes = prepare_converged_ring(&network, &[did(0x10), did(0x50)], test_config(4)).await?;
    let node = &nodes[0].node;
    node.destroy().await?;
    // a second destroy is a no-op
    node.destroy().await?;

    assert!(matches!(
        node.broadcast(Bytes::new()).await,
        Err(Error::NodeDestroyed)
    ));
    assert!(matches!(
        node.directed_send(did(0x50), Bytes::new()).await,
        Err(Error::NodeDestroyed)
    ));
    assert!(matches!(
        node.find_successor(did(0x30)).await,
        Err(Error::NodeDestroyed)
    ));
    assert!(matches!(
        node.handle_rpc(did(0x50), &RpcRequest::GetPredecessor).await,
        Err(Error::NodeDestroyed)
    ));
    assert!(matches!(node.stabilize().await, Err(Error::NodeDestroyed)));
    assert!(network.endpoint_ids().iter().all(|cid| *cid != did(0x10).to_string()));
    Ok(())
}

#[tokio::test]
async fn test_pending_resend_stops_on_destroy() -> Result<()> {
    // every message is lost, only rpcs get through
    let network = DummyNetwork::new(DummyConfig {
        drop_rate: 1.0,
        ..DummyConfig::instant()
    });
    let config = crate::config::NodeConfig {
        resend_interval_ms: 1000,
        ..test_config(4)
    };
    let nodes = prepare_converged_ring(&network, &[did(0x10), did(0x50)], config).await?;

    let node = nodes[0].node.clone();
    let sending = tokio::spawn(async move { node.broadcast(Bytes::from_static(b"x")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    nodes[0].node.destroy().await?;

    let ret = tokio::time::timeout(WAIT, sending).await.unwrap().unwrap();
    // the relay swallows per target failures
    assert_eq!(ret?, 0);
    Ok(())
}

#[tokio::test]
async fn test_resend_gives_up() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig {
        drop_rate: 1.0,
        ..DummyConfig::instant()
    });
    let config = crate::config::NodeConfig {
        resend_interval_ms: 10,
        max_resend: 2,
        ..test_config(4)
    };
    let nodes = prepare_converged_ring(&network, &[did(0x10), did(0x50)], config).await?;

    let ret = nodes[0]
        .node
        .directed_send(did(0x50), Bytes::from_static(b"lost"))
        .await;
    assert!(matches!(
        ret,
        Err(Error::ResendExhausted { attempts: 3, .. })
    ));
    Ok(())
}
