use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use ringcast_transport::connections::DummyConfig;
use ringcast_transport::connections::DummyNetwork;

use crate::dht::tests::gen_ordered_dids;
use crate::dht::Did;
use crate::dht::Ring;
use crate::error::Error;
use crate::error::Result;
use crate::message::DirectedReceipt;
use crate::message::FloodStream;
use crate::message::Message;
use crate::message::MessageKey;
use crate::message::TrackerKind;
use crate::tests::default::*;

const WAIT: Duration = Duration::from_secs(10);

fn lossy() -> DummyConfig {
    DummyConfig {
        min_delay_ms: 0,
        max_delay_ms: 20,
        drop_rate: 0.2,
        channel_open_delay_ms: 0,
    }
}

#[tokio::test]
async fn test_broadcast_reaches_every_node_once() -> Result<()> {
    let network = DummyNetwork::new(lossy());
    let ring = Ring::new(6)?;
    let dids = gen_ordered_dids(ring, 6, 5);
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(6)).await?;

    let mut sent = BTreeSet::new();
    for n in nodes.iter() {
        let data = Bytes::from(format!("hello from {}", n.did()));
        let id = n.node.broadcast(data.clone()).await?;
        assert_eq!(id, 0);
        sent.insert((n.did(), id, data));
    }

    for n in nodes.iter_mut() {
        let got: Vec<Delivery> = n.payloads(dids.len() - 1, WAIT).await;
        let got: BTreeSet<(Did, u64, Bytes)> = got
            .into_iter()
            .map(|d| match d {
                Delivery::Broadcast {
                    originator,
                    id,
                    data,
                } => (originator, id, data),
                d => panic!("unexpected {:?}", d),
            })
            .collect();
        let expected: BTreeSet<(Did, u64, Bytes)> = sent
            .iter()
            .filter(|(o, ..)| *o != n.did())
            .cloned()
            .collect();
        assert_eq!(got, expected, "deliveries of {}", n.did());
    }

    // resends and late duplicates never reach the application twice
    tokio::time::sleep(Duration::from_millis(500)).await;
    for n in nodes.iter_mut() {
        let extra: Vec<Delivery> = n
            .drain()
            .into_iter()
            .filter(|d| !matches!(d, Delivery::Event(_)))
            .collect();
        assert!(extra.is_empty(), "{} got {:?}", n.did(), extra);
    }
    Ok(())
}

#[tokio::test]
async fn test_broadcasts_are_delivered_in_send_order() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig {
        min_delay_ms: 0,
        max_delay_ms: 40,
        drop_rate: 0.1,
        channel_open_delay_ms: 0,
    });
    let ring = Ring::new(6)?;
    let dids = gen_ordered_dids(ring, 5, 9);
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(6)).await?;

    let origin = nodes[0].node.clone();
    let sends = (0..5u8).map(|i| origin.broadcast(Bytes::from(vec![i])));
    let ids: Vec<u64> = futures::future::try_join_all(sends).await?;
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    for n in nodes.iter_mut().skip(1) {
        let got: Vec<u64> = n
            .payloads(5, WAIT)
            .await
            .into_iter()
            .map(|d| match d {
                Delivery::Broadcast { originator, id, .. } => {
                    assert_eq!(originator, origin.did());
                    id
                }
                d => panic!("unexpected {:?}", d),
            })
            .collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4], "order seen by {}", n.did());
        let delivered = n
            .node
            .handler()
            .with_tracker(TrackerKind::Flood(FloodStream::Data), |t| {
                t.delivered_index(origin.did())
            })?;
        assert_eq!(delivered, 5);
    }
    Ok(())
}

#[tokio::test]
async fn test_broadcast_releases_tracker_entries() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x50), did(0x90), did(0xd0)];
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;

    let id = nodes[1].node.broadcast(Bytes::from_static(b"ping")).await?;
    for n in nodes.iter_mut().filter(|n| n.did() != did(0x50)) {
        assert_eq!(n.payloads(1, WAIT).await.len(), 1);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let key = MessageKey::new(did(0x50), id);
    for n in nodes.iter() {
        let tracking = n
            .node
            .handler()
            .with_tracker(TrackerKind::Flood(FloodStream::Data), |t| t.is_tracking(key))?;
        assert!(!tracking, "{} still tracks {}", n.did(), key);
    }
    Ok(())
}

#[tokio::test]
async fn test_late_joiner_receives_later_broadcasts() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let config = test_config(4);
    let mut nodes =
        prepare_converged_ring(&network, &[did(0x10), did(0x90)], config.clone()).await?;

    let origin = nodes[0].node.clone();
    assert_eq!(origin.broadcast(Bytes::from_static(b"before")).await?, 0);
    assert_eq!(nodes[1].payloads(1, WAIT).await.len(), 1);

    let late = prepare_node(&network, did(0x50), config.clone())?;
    late.node.join(did(0x90)).await?;
    nodes.push(late);
    stabilize_until_converged(&nodes, 10).await;

    assert_eq!(origin.broadcast(Bytes::from_static(b"after")).await?, 1);
    let expected = vec![Delivery::Broadcast {
        originator: did(0x10),
        id: 1,
        data: Bytes::from_static(b"after"),
    }];
    assert_eq!(nodes[1].payloads(1, WAIT).await, expected);
    // id 0 never reaches the late node, it is given up after the hold timeout
    assert_eq!(nodes[2].payloads(1, config.hold_timeout() + WAIT).await, expected);

    assert_eq!(origin.broadcast(Bytes::from_static(b"again")).await?, 2);
    let got = nodes[2].payloads(1, WAIT).await;
    assert_eq!(got, vec![Delivery::Broadcast {
        originator: did(0x10),
        id: 2,
        data: Bytes::from_static(b"again"),
    }]);
    let delivered = nodes[2]
        .node
        .handler()
        .with_tracker(TrackerKind::Flood(FloodStream::Data), |t| {
            t.delivered_index(did(0x10))
        })?;
    assert_eq!(delivered, 3);
    Ok(())
}

#[tokio::test]
async fn test_membership_gossip_does_not_consume_data_ids() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x50), did(0x90), did(0xd0)];
    let config = crate::config::NodeConfig {
        track_membership: true,
        ..test_config(4)
    };
    let mut nodes = prepare_converged_ring(&network, &dids, config).await?;
    run_stabilize(&nodes, 2).await;

    for n in nodes.iter() {
        assert_eq!(n.node.broadcast(Bytes::from(n.did().to_string())).await?, 0);
    }
    for n in nodes.iter_mut() {
        let got: BTreeSet<Did> = n
            .payloads(dids.len() - 1, WAIT)
            .await
            .into_iter()
            .map(|d| match d {
                Delivery::Broadcast { originator, id, .. } => {
                    assert_eq!(id, 0);
                    originator
                }
                d => panic!("unexpected {:?}", d),
            })
            .collect();
        let expected: BTreeSet<Did> = dids.iter().copied().filter(|d| *d != n.did()).collect();
        assert_eq!(got, expected, "deliveries of {}", n.did());
    }
    Ok(())
}

#[tokio::test]
async fn test_lonely_broadcast_resolves() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let node = prepare_node(&network, did(0x10), test_config(4))?;
    node.node.create()?;
    assert_eq!(node.node.broadcast(Bytes::from_static(b"a")).await?, 0);
    assert_eq!(node.node.broadcast(Bytes::from_static(b"b")).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_directed_reaches_destination_once() -> Result<()> {
    let network = DummyNetwork::new(lossy());
    let ring = Ring::new(6)?;
    let dids = gen_ordered_dids(ring, 7, 21);
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(6)).await?;
    let len = nodes.len();

    for (i, n) in nodes.iter().enumerate() {
        let destination = nodes[(i + len / 2) % len].did();
        let data = Bytes::from(format!("{} -> {}", n.did(), destination));
        n.node.directed_send(destination, data).await?;
    }

    for (i, n) in nodes.iter_mut().enumerate() {
        let sender = dids[(i + len - len / 2) % len];
        let got = n.payloads(1, WAIT).await;
        assert_eq!(got, vec![Delivery::Directed {
            originator: sender,
            id: 0,
            data: Bytes::from(format!("{} -> {}", sender, n.did())),
        }]);
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    for n in nodes.iter_mut() {
        assert!(n
            .drain()
            .iter()
            .all(|d| matches!(d, Delivery::Event(_))));
    }
    Ok(())
}

#[tokio::test]
async fn test_directed_forwarders_keep_no_trackers() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x30), did(0x50), did(0x70), did(0x90), did(0xb0)];
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;

    let destination = did(0xb0);
    nodes[0]
        .node
        .directed_send(destination, Bytes::from_static(b"far"))
        .await?;
    assert_eq!(nodes[5].payloads(1, WAIT).await.len(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(nodes[0].node.handler().has_directed_tracker(destination));
    assert!(nodes[5].node.handler().has_directed_tracker(destination));
    for n in &nodes[1..5] {
        assert!(
            !n.node.handler().has_directed_tracker(destination),
            "{} kept a tracker for {}",
            n.did(),
            destination
        );
    }

    // a receipt nobody asked for leaves nothing behind
    let stray = Message::DirectedReceipt(DirectedReceipt {
        originator: did(0x30),
        destination: did(0x90),
        id: 7,
    });
    nodes[1].node.receive(did(0x50), &stray).await?;
    assert!(!nodes[1].node.handler().has_directed_tracker(did(0x90)));
    Ok(())
}

#[tokio::test]
async fn test_directed_ids_are_per_destination() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x50), did(0x90)];
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;

    let origin = nodes[0].node.clone();
    assert_eq!(origin.directed_send(did(0x50), Bytes::from_static(b"a")).await?, 0);
    assert_eq!(origin.directed_send(did(0x50), Bytes::from_static(b"b")).await?, 1);
    assert_eq!(origin.directed_send(did(0x90), Bytes::from_static(b"c")).await?, 0);

    assert_eq!(nodes[1].payloads(2, WAIT).await.len(), 2);
    assert_eq!(nodes[2].payloads(1, WAIT).await, vec![Delivery::Directed {
        originator: did(0x10),
        id: 0,
        data: Bytes::from_static(b"c"),
    }]);
    Ok(())
}

#[tokio::test]
async fn test_directed_without_progress_fails() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let node = prepare_node(&network, did(0x10), test_config(4))?;
    node.node.create()?;
    assert!(matches!(
        node.node.directed_send(did(0x50), Bytes::new()).await,
        Err(Error::NoProgress(_))
    ));
    assert!(matches!(
        node.node.directed_send(did(0x10), Bytes::new()).await,
        Err(Error::ShouldNotSendSelf)
    ));
    Ok(())
}
