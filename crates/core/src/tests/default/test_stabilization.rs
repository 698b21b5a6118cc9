use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use ringcast_transport::connections::DummyConfig;
use ringcast_transport::connections::DummyNetwork;

use crate::dht::tests::gen_ordered_dids;
use crate::dht::Did;
use crate::dht::Ring;
use crate::error::Error;
use crate::error::Result;
use crate::tests::default::*;

#[tokio::test]
async fn test_two_nodes_converge_on_join() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let nodes = prepare_ring(&network, &[did(0x10), did(0x50)], test_config(4)).await?;
    settle().await;

    // notify and notify-back are enough for a ring of two
    assert!(is_converged(&nodes));
    assert_eq!(nodes[0].node.neighbors(), vec![did(0x50)]);
    assert_eq!(nodes[1].node.neighbors(), vec![did(0x10)]);
    Ok(())
}

#[tokio::test]
async fn test_join_self_and_unknown() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let node = prepare_node(&network, did(0x10), test_config(4))?;
    node.node.create()?;
    assert!(matches!(
        node.node.join(did(0x10)).await,
        Err(Error::ShouldNotConnectSelf)
    ));
    // a failed connect leaves the ring untouched
    assert!(matches!(
        node.node.join(did(0x50)).await,
        Err(Error::ConnectionFailed(..))
    ));
    assert_eq!(node.node.dht().successor()?, None);
    assert!(matches!(
        node.node.find_successor(did(0x30)).await,
        Err(Error::NoSuccessor)
    ));
    Ok(())
}

#[tokio::test]
async fn test_build_rejects_foreign_ids() {
    let network = DummyNetwork::new(DummyConfig::instant());
    // 0x100 does not fit a ring of 4^4
    assert!(matches!(
        prepare_node(&network, did(0x100), test_config(4)),
        Err(Error::DidOutOfRing(_))
    ));
    let transport = network.transport(&did(0x10).to_string());
    assert!(matches!(
        crate::node::ChordNodeBuilder::new(did(0x20), transport).build(),
        Err(Error::InvalidDid(_))
    ));
}

#[tokio::test]
async fn test_three_nodes_lookup() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let dids = [did(0x10), did(0x50), did(0x90)];
    let nodes = prepare_converged_ring(&network, &dids, test_config(4)).await?;

    assert_eq!(nodes[0].node.find_successor(did(0x30)).await?, did(0x50));
    for n in nodes.iter() {
        assert_eq!(n.node.find_successor(did(0x95)).await?, did(0x10));
        assert_eq!(n.node.find_successor(did(0x50)).await?, did(0x50));
        assert_eq!(n.node.find_successor(did(0x00)).await?, did(0x10));
    }
    Ok(())
}

#[tokio::test]
async fn test_ring_converges_and_fingers_are_exact() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let ring = Ring::new(8)?;
    let dids = gen_ordered_dids(ring, 8, 42);
    let nodes = prepare_converged_ring(&network, &dids, test_config(8)).await?;

    // the successor walk visits every node exactly once
    let mut visited = BTreeSet::new();
    let mut current = nodes[0].did();
    for _ in 0..dids.len() {
        assert!(visited.insert(current));
        let n = nodes.iter().find(|n| n.did() == current).unwrap();
        current = n.node.dht().successor()?.unwrap();
    }
    assert_eq!(current, nodes[0].did());
    assert_eq!(visited.len(), dids.len());

    for n in nodes.iter() {
        let dht = n.node.dht();
        let finger = dht.lock_finger()?;
        for i in 1..ring.width() {
            let expected = owner(&dids, ring.finger_start(n.did(), i));
            if expected == n.did() {
                continue;
            }
            assert_eq!(finger.get(i), Some(expected), "finger {} of {}", i, n.did());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_lookup_from_every_node() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let ring = Ring::new(8)?;
    let dids = gen_ordered_dids(ring, 10, 7);
    let nodes = prepare_converged_ring(&network, &dids, test_config(8)).await?;

    let mut rng = StdRng::seed_from_u64(1);
    let mut targets: Vec<Did> = (0..16).map(|_| ring.random_did(&mut rng)).collect();
    targets.extend(dids.iter().copied());
    targets.push(ring.max());
    for n in nodes.iter() {
        for target in targets.iter() {
            assert_eq!(
                n.node.find_successor(*target).await?,
                owner(&dids, *target),
                "lookup of {} from {}",
                target,
                n.did()
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_fix_fingers_is_idempotent_on_converged_ring() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let ring = Ring::new(6)?;
    let dids = gen_ordered_dids(ring, 6, 3);
    let mut nodes = prepare_converged_ring(&network, &dids, test_config(6)).await?;
    settle().await;

    let snapshot: Vec<_> = nodes.iter().map(|n| n.node.inspect()).collect();
    for n in nodes.iter_mut() {
        n.drain();
    }

    run_fix_fingers(&nodes, 2 * ring.width()).await;
    run_stabilize(&nodes, 2).await;

    assert_no_links_changed(&mut nodes);
    let after: Vec<_> = nodes.iter().map(|n| n.node.inspect()).collect();
    assert_eq!(snapshot, after);
    Ok(())
}

#[tokio::test]
async fn test_later_joiner_is_stabilized_in() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let mut nodes =
        prepare_converged_ring(&network, &[did(0x10), did(0x90)], test_config(4)).await?;

    let late = prepare_node(&network, did(0x50), test_config(4))?;
    late.node.join(did(0x90)).await?;
    nodes.push(late);
    stabilize_until_converged(&nodes, 10).await;

    assert_eq!(nodes[0].node.dht().successor()?, Some(did(0x50)));
    assert_eq!(nodes[2].node.dht().predecessor()?, Some(did(0x10)));
    assert_eq!(nodes[1].node.dht().predecessor()?, Some(did(0x50)));
    Ok(())
}

#[tokio::test]
async fn test_membership_gossip_collects_everyone() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let ring = Ring::new(6)?;
    let dids = gen_ordered_dids(ring, 5, 11);
    let config = crate::config::NodeConfig {
        track_membership: true,
        ..test_config(6)
    };
    let nodes = prepare_converged_ring(&network, &dids, config).await?;
    run_stabilize(&nodes, dids.len() + 2).await;
    settle().await;

    for n in nodes.iter() {
        let mut list = n.node.dht().membership_list()?.unwrap();
        // owner first, then clockwise
        assert_eq!(list[0], n.did());
        list.sort();
        assert_eq!(list, dids, "membership of {}", n.did());
        assert_eq!(
            n.node.inspect().dht.node_list.map(|l| l.len()),
            Some(dids.len())
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_periodic_stabilizer_converges() -> Result<()> {
    let network = DummyNetwork::new(DummyConfig::instant());
    let config = crate::config::NodeConfig {
        stabilize_interval_ms: 20,
        fix_fingers_interval_ms: 20,
        ..test_config(4)
    };
    let dids = [did(0x10), did(0x30), did(0x70), did(0xc0)];
    let nodes = prepare_ring(&network, &dids, config).await?;
    let handles: Vec<_> = nodes.iter().map(|n| n.node.start()).collect();

    let mut converged = false;
    for _ in 0..100 {
        if is_converged(&nodes) {
            converged = true;
            break;
        }
        settle().await;
    }
    assert!(converged);

    for n in nodes.iter() {
        n.node.destroy().await?;
    }
    for h in handles {
        h.await.unwrap();
    }
    Ok(())
}
