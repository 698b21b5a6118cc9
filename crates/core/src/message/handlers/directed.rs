use async_trait::async_trait;
use bytes::Bytes;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::DirectedPacket;
use crate::message::DirectedReceipt;
use crate::message::HandleMsg;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::MessageKey;
use crate::message::TrackerKind;

impl MessageHandler {
    /// Route `data` greedily toward `destination`. Returns the id assigned to the packet.
    ///
    /// Resolves once the first hop acknowledged the packet. Delivery to the destination
    /// itself is not confirmed end to end.
    pub async fn directed_send(&self, destination: Did, data: Bytes) -> Result<u64> {
        if destination == self.did() {
            return Err(Error::ShouldNotSendSelf);
        }
        let id = self.with_tracker(TrackerKind::Directed(destination), |t| {
            t.next_send_id()
        })?;
        let packet = DirectedPacket {
            originator: self.did(),
            destination,
            id,
            payload: data,
        };
        let next = self.send_to_closest_neighbor(&packet, None).await?;
        tracing::debug!(
            "{} sent directed {}:{} to {} via {}",
            self.did(),
            packet.originator,
            id,
            destination,
            next
        );
        Ok(id)
    }

    /// Forward `packet` to the neighbor closest to its destination and wait for its receipt.
    /// Returns the chosen hop.
    ///
    /// Fails with [Error::NoProgress] when there is no neighbor, when the closest one is
    /// `exclude`, or when it is not strictly closer to the destination than this node.
    pub async fn send_to_closest_neighbor(
        &self,
        packet: &DirectedPacket,
        exclude: Option<Did>,
    ) -> Result<Did> {
        let destination = packet.destination;
        let kind = TrackerKind::Directed(destination);
        let key = MessageKey::new(packet.originator, packet.id);
        let ret = match self.closest_neighbor(destination, exclude) {
            Some(next) => self
                .send_to_node(kind, next, key, &Message::Directed(packet.clone()))
                .await
                .map(|_| next),
            None => Err(Error::NoProgress(destination)),
        };
        self.with_tracker(kind, |t| t.release(key))?;
        self.prune_directed(destination);
        ret
    }

    fn closest_neighbor(&self, destination: Did, exclude: Option<Did>) -> Option<Did> {
        let ring = self.dht.ring;
        let next = self
            .transport
            .neighbors()
            .into_iter()
            .min_by_key(|n| (ring.distance(*n, destination), *n))?;
        if Some(next) == exclude
            || ring.distance(next, destination) >= ring.distance(self.did(), destination)
        {
            return None;
        }
        Some(next)
    }
}

#[async_trait]
impl HandleMsg<DirectedPacket> for MessageHandler {
    async fn handle(&self, sender: Did, packet: &DirectedPacket) -> Result<()> {
        let receipt = Message::DirectedReceipt(DirectedReceipt {
            originator: packet.originator,
            destination: packet.destination,
            id: packet.id,
        });
        if let Err(e) = self.transport.send_message(sender, &receipt).await {
            tracing::debug!("directed receipt to {} failed: {}", sender, e);
        }

        if packet.destination == self.did() {
            let first = self.with_tracker(TrackerKind::Directed(packet.destination), |t| {
                t.receive_message(packet.originator, packet.id)
            })?;
            if !first {
                tracing::trace!(
                    "{} drop duplicate directed {}:{}",
                    self.did(),
                    packet.originator,
                    packet.id
                );
                return Ok(());
            }
            let cb = self.callback()?;
            if let Err(e) = cb
                .on_directed(packet.originator, packet.id, &packet.payload)
                .await
            {
                tracing::warn!(
                    "Callback on_directed {}:{} failed: {:?}",
                    packet.originator,
                    packet.id,
                    e
                );
            }
            return Ok(());
        }

        let key = MessageKey::new(packet.originator, packet.id);
        let forwarding = self.with_tracker(TrackerKind::Directed(packet.destination), |t| {
            if t.is_tracking(key) {
                return false;
            }
            // the sender holds the packet already
            t.handle_receipt(key, sender);
            true
        })?;
        if !forwarding {
            tracing::trace!("{} already forwarding directed {}", self.did(), key);
            return Ok(());
        }

        let handler = self.clone();
        let forwarded = packet.clone();
        self.spawn("forward", async move {
            handler
                .send_to_closest_neighbor(&forwarded, Some(sender))
                .await
                .map(|_| ())
        });
        Ok(())
    }
}

#[async_trait]
impl HandleMsg<DirectedReceipt> for MessageHandler {
    async fn handle(&self, sender: Did, receipt: &DirectedReceipt) -> Result<()> {
        let key = MessageKey::new(receipt.originator, receipt.id);
        // receipts of resends may outlive the send, unsolicited ones create nothing
        self.with_existing_tracker(TrackerKind::Directed(receipt.destination), |t| {
            if t.is_tracking(key) {
                t.handle_receipt(key, sender)
            }
        })?;
        Ok(())
    }
}
