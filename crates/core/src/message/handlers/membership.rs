use crate::dht::Did;
use crate::dht::NodeListDelta;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::message::PacketBody;

impl MessageHandler {
    /// Merge a snapshot announced by the predecessor and gossip the resulting delta.
    pub(crate) fn merge_membership(&self, announced: &[Did]) -> Result<()> {
        let Some(delta) = self.dht.merge_membership(announced)? else {
            return Ok(());
        };
        tracing::debug!("{} membership changed: {:?}", self.did(), delta);
        let handler = self.clone();
        self.spawn("membership", async move {
            handler
                .broadcast_body(PacketBody::NodeList(delta))
                .await
                .map(|_| ())
        });
        Ok(())
    }

    /// Apply a delta gossiped by another node.
    pub(crate) fn apply_membership(&self, delta: &NodeListDelta) -> Result<()> {
        if self.dht.apply_membership(delta)? {
            tracing::trace!("{} applied membership delta {:?}", self.did(), delta);
        }
        Ok(())
    }
}
