use async_trait::async_trait;
use bytes::Bytes;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::FloodStream;
use crate::message::HandleMsg;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::MessageKey;
use crate::message::Packet;
use crate::message::PacketBody;
use crate::message::Receipt;
use crate::message::TrackerKind;

impl MessageHandler {
    /// Flood `data` to every reachable node. Returns the id assigned to the packet.
    ///
    /// Resolves once every current neighbor acknowledged the packet or gave up.
    /// The packet is not delivered to the local callback.
    pub async fn broadcast(&self, data: Bytes) -> Result<u64> {
        self.broadcast_body(PacketBody::Data(data)).await
    }

    pub(crate) async fn broadcast_body(&self, body: PacketBody) -> Result<u64> {
        let originator = self.did();
        let id = self.with_tracker(TrackerKind::Flood(body.stream()), |t| {
            let id = t.next_send_id();
            // echoes of our own packet are duplicates
            t.accept(originator, id);
            id
        })?;
        let packet = Packet {
            originator,
            id,
            body,
        };
        self.relay(&packet, None).await?;
        Ok(id)
    }

    /// Send `packet` to every neighbor except `exclude` that has not acknowledged it yet,
    /// then forget its receipts.
    pub async fn relay(&self, packet: &Packet, exclude: Option<Did>) -> Result<()> {
        let kind = TrackerKind::Flood(packet.body.stream());
        let key = MessageKey::new(packet.originator, packet.id);
        let neighbors = self.transport.neighbors();
        let targets: Vec<Did> = self.with_tracker(kind, |t| {
            neighbors
                .into_iter()
                .filter(|n| Some(*n) != exclude && !t.has_receipt(key, *n))
                .collect()
        })?;

        let msg = Message::Packet(packet.clone());
        let jobs = targets
            .iter()
            .map(|target| self.send_to_node(kind, *target, key, &msg));
        for (target, res) in targets.iter().zip(futures::future::join_all(jobs).await) {
            match res {
                Ok(()) | Err(Error::AlreadyReceived { .. }) => {}
                Err(e) => tracing::debug!("[relay] {} to {} failed: {}", key, target, e),
            }
        }

        self.with_tracker(kind, |t| t.release(key))?;
        Ok(())
    }

    async fn deliver(&self, originator: Did, id: u64, data: Bytes) -> Result<()> {
        let cb = self.callback()?;
        if let Err(e) = cb.on_broadcast(originator, id, &data).await {
            tracing::warn!("Callback on_broadcast {}:{} failed: {:?}", originator, id, e);
        }
        Ok(())
    }

    /// Stop waiting for ids of `originator` missing before `id` in `stream`, and deliver
    /// the data held behind them.
    pub(crate) async fn skip_gap(
        &self,
        stream: FloodStream,
        originator: Did,
        id: u64,
    ) -> Result<()> {
        let mut inbox = self.lock_inbox().await;
        let ready = self.with_tracker(TrackerKind::Flood(stream), |t| {
            t.skip_through(originator, id)
        })?;
        if ready.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            "{} gave up on {:?} ids of {} before {}",
            self.did(),
            stream,
            originator,
            ready.end
        );
        if stream == FloodStream::Data {
            for (id, data) in inbox.release(originator, ready) {
                self.deliver(originator, id, data).await?;
            }
        }
        drop(inbox);
        Ok(())
    }
}

#[async_trait]
impl HandleMsg<Packet> for MessageHandler {
    async fn handle(&self, sender: Did, packet: &Packet) -> Result<()> {
        let stream = packet.body.stream();
        let kind = TrackerKind::Flood(stream);
        let key = MessageKey::new(packet.originator, packet.id);
        let receipt = Message::Receipt(Receipt {
            originator: packet.originator,
            id: packet.id,
            stream,
        });

        let mut inbox = self.lock_inbox().await;
        let ready = self.with_tracker(kind, |t| {
            let ready = t.accept(packet.originator, packet.id);
            if ready.is_some() {
                t.handle_receipt(key, sender);
            }
            ready
        })?;
        let Some(ready) = ready else {
            drop(inbox);
            tracing::trace!("{} drop duplicate packet {} from {}", self.did(), key, sender);
            return self.transport.send_message(sender, &receipt).await;
        };
        let held = !ready.contains(&packet.id);
        let deliverable = match &packet.body {
            PacketBody::Data(data) => {
                inbox.hold(key, data.clone());
                inbox.release(packet.originator, ready)
            }
            PacketBody::NodeList(_) => vec![],
        };

        if held {
            // an id before this one is missing, wait for it at most one resend budget
            let handler = self.clone();
            let originator = packet.originator;
            let id = packet.id;
            self.spawn("hold", async move {
                tokio::time::sleep(handler.config.hold_timeout()).await;
                handler.skip_gap(stream, originator, id).await
            });
        }

        let handler = self.clone();
        let relayed = packet.clone();
        self.spawn("relay", async move {
            handler.relay(&relayed, Some(sender)).await
        });

        let neighbors = self.transport.neighbors();
        let jobs = neighbors
            .iter()
            .map(|n| self.transport.send_message(*n, &receipt));
        for (n, res) in neighbors.iter().zip(futures::future::join_all(jobs).await) {
            if let Err(e) = res {
                tracing::debug!("receipt of {} to {} failed: {}", key, n, e);
            }
        }

        // membership deltas are advisory and applied on first sighting
        if let PacketBody::NodeList(delta) = &packet.body {
            self.apply_membership(delta)?;
        }

        // the inbox stays locked until the callback returns
        for (id, data) in deliverable {
            self.deliver(packet.originator, id, data).await?;
        }
        drop(inbox);
        Ok(())
    }
}

#[async_trait]
impl HandleMsg<Receipt> for MessageHandler {
    async fn handle(&self, sender: Did, receipt: &Receipt) -> Result<()> {
        let key = MessageKey::new(receipt.originator, receipt.id);
        self.with_tracker(TrackerKind::Flood(receipt.stream), |t| {
            // a packet that was seen and is no longer tracked has been relayed already
            if t.has_seen(receipt.originator, receipt.id) && !t.is_tracking(key) {
                return;
            }
            t.handle_receipt(key, sender)
        })
    }
}
