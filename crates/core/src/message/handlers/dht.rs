use async_recursion::async_recursion;
use async_trait::async_trait;

use crate::dht::Did;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindSuccessorSend;
use crate::message::HandleRpc;
use crate::message::MessageHandler;
use crate::message::RpcRequest;
use crate::message::RpcResponse;

impl MessageHandler {
    /// Carry out the remote work described by a [PeerRingAction].
    ///
    /// Members of [PeerRingAction::MultiActions] are independent: they run concurrently and
    /// their failures are logged without failing the whole batch.
    #[async_recursion]
    pub(crate) async fn handle_dht_events(&self, act: &PeerRingAction) -> Result<()> {
        match act {
            PeerRingAction::None => Ok(()),
            PeerRingAction::Some(_) => Ok(()),
            PeerRingAction::RemoteAction(did, PeerRingRemoteAction::Notify) => {
                self.notify(*did).await
            }
            // The receiver was displaced as our predecessor.
            PeerRingAction::RemoteAction(did, PeerRingRemoteAction::Update) => {
                match self.transport.send_rpc(*did, RpcRequest::Update).await? {
                    RpcResponse::Ack => Ok(()),
                    resp => Err(Error::UnexpectedRpcResponse(*did, resp)),
                }
            }
            PeerRingAction::RemoteAction(did, PeerRingRemoteAction::Connect) => {
                if self.transport.has_connection(*did) {
                    return Ok(());
                }
                self.transport.connect(*did).await
            }
            PeerRingAction::RemoteAction(did, PeerRingRemoteAction::Disconnect) => {
                if !self.transport.has_connection(*did) {
                    return Ok(());
                }
                self.transport.disconnect(*did).await
            }
            PeerRingAction::RemoteAction(did, PeerRingRemoteAction::RecoverSuccessor(pending)) => {
                if let Some(pending) = pending {
                    self.abandon_temp_successor(*pending).await?;
                }
                self.recover_successor(*did).await
            }
            PeerRingAction::MultiActions(acts) => {
                let jobs = acts
                    .iter()
                    .map(|act| async move { self.handle_dht_events(act).await });

                for res in futures::future::join_all(jobs).await {
                    if let Err(e) = res {
                        tracing::error!("Failed on handle multi actions: {:?}", e)
                    }
                }
                Ok(())
            }
            act => Err(Error::PeerRingUnexpectedAction(act.clone())),
        }
    }

    /// Find the successor of `did`.
    ///
    /// Answers locally when `did` falls between self and the successor. Otherwise asks the
    /// closest preceding fingers one after another, an unreachable finger is skipped.
    pub async fn find_successor(&self, did: Did) -> Result<Did> {
        match self.dht.find_successor(did)? {
            PeerRingAction::Some(succ) => Ok(succ),
            PeerRingAction::FallbackActions(acts) => {
                for act in acts {
                    let PeerRingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessor(target)) = act else {
                        return Err(Error::PeerRingUnexpectedAction(act));
                    };
                    let req = RpcRequest::FindSuccessor(FindSuccessorSend { did: target });
                    match self.transport.send_rpc(next, req).await {
                        Ok(RpcResponse::Successor(found)) => return Ok(found),
                        Ok(resp) => {
                            tracing::warn!(
                                "[find_successor] {:?}",
                                Error::UnexpectedRpcResponse(next, resp)
                            );
                        }
                        Err(e) => {
                            tracing::debug!(
                                "[find_successor] ask {} for {} failed: {}",
                                next,
                                target,
                                e
                            );
                        }
                    }
                }
                Err(Error::NoRouteFound(did))
            }
            act => Err(Error::PeerRingUnexpectedAction(act)),
        }
    }
}

#[async_trait]
impl HandleRpc<FindSuccessorSend> for MessageHandler {
    async fn reply(&self, sender: Did, req: &FindSuccessorSend) -> Result<RpcResponse> {
        tracing::debug!("{} find successor of {} for {}", self.did(), req.did, sender);
        Ok(RpcResponse::Successor(self.find_successor(req.did).await?))
    }
}
