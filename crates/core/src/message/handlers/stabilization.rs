use async_trait::async_trait;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::HandleRpc;
use crate::message::MessageHandler;
use crate::message::NotifySend;
use crate::message::RpcRequest;
use crate::message::RpcResponse;

impl MessageHandler {
    /// One stabilize round.
    ///
    /// Asks the successor for its predecessor and lets [PeerRing](crate::dht::PeerRing) decide
    /// whether that node is a better successor. The successor is notified afterwards, whatever
    /// the outcome. Rpc failures are logged, the next round retries against fresh state.
    pub async fn stabilize(&self) -> Result<()> {
        let Some(succ) = self.dht.successor()? else {
            return Ok(());
        };

        match self.transport.send_rpc(succ, RpcRequest::GetPredecessor).await {
            Ok(RpcResponse::Predecessor(Some(ps))) => {
                let act = self.dht.stabilize(
                    succ,
                    ps,
                    self.transport.has_connection(ps),
                    self.transport.is_connected(ps),
                )?;
                if let Err(e) = self.handle_dht_events(&act).await {
                    tracing::warn!("[stabilize] {} failed on {:?}: {}", self.did(), act, e);
                }
            }
            Ok(RpcResponse::Predecessor(None)) => {}
            Ok(resp) => {
                tracing::warn!("[stabilize] {:?}", Error::UnexpectedRpcResponse(succ, resp))
            }
            Err(e) => {
                tracing::debug!("[stabilize] GET_PREDECESSOR to {} failed: {}", succ, e)
            }
        }

        if let Some(succ) = self.dht.successor()? {
            if let Err(e) = self.notify(succ).await {
                tracing::debug!("[stabilize] notify {} failed: {}", succ, e);
            }
        }
        Ok(())
    }

    /// Tell `did` that this node may be its predecessor.
    /// Carries the membership snapshot when membership is tracked.
    pub async fn notify(&self, did: Did) -> Result<()> {
        let node_list = self.dht.membership_list()?;
        let req = RpcRequest::Notify(NotifySend { node_list });
        match self.transport.send_rpc(did, req).await? {
            RpcResponse::Ack => Ok(()),
            resp => Err(Error::UnexpectedRpcResponse(did, resp)),
        }
    }

    /// Refresh the next finger in turn.
    /// A failed lookup leaves the entry as it is until the cursor comes back to it.
    pub async fn fix_fingers(&self) -> Result<()> {
        if self.dht.successor()?.is_none() {
            return Ok(());
        }
        let Some((index, target)) = self.dht.next_finger_target()? else {
            return Ok(());
        };

        match self.find_successor(target).await {
            Ok(found) => {
                let act =
                    self.dht
                        .fix_finger(index, found, self.transport.has_connection(found))?;
                self.handle_dht_events(&act).await
            }
            Err(e) => {
                tracing::debug!(
                    "[fix_fingers] lookup of finger {} ({}) failed: {}",
                    index,
                    target,
                    e
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl HandleRpc<NotifySend> for MessageHandler {
    async fn reply(&self, sender: Did, req: &NotifySend) -> Result<RpcResponse> {
        let act = self.dht.notify(sender)?;
        if !act.is_none() {
            let handler = self.clone();
            self.spawn("notify", async move { handler.handle_dht_events(&act).await });
        }

        if let Some(node_list) = &req.node_list {
            // only the predecessor speaks for the arc that ends at this node
            if self.dht.predecessor()? == Some(sender) {
                self.merge_membership(node_list)?;
            }
        }
        Ok(RpcResponse::Ack)
    }
}
