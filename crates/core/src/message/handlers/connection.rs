use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::node::callback::NodeEvent;

impl MessageHandler {
    /// Join the ring that `did` belongs to.
    /// The link is opened first, a failed connect leaves the ring state untouched.
    pub async fn join(&self, did: Did) -> Result<()> {
        if did == self.did() {
            return Err(Error::ShouldNotConnectSelf);
        }
        self.transport.connect(did).await?;
        let act = self.dht.join(did)?;
        self.handle_dht_events(&act).await
    }

    /// A link to `did` dropped.
    pub async fn on_disconnect(&self, did: Did) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::info!("{} lost link to {}", self.did(), did);
        let act = self.dht.remove(did)?;
        self.handle_dht_events(&act).await
    }

    /// Drop the link of an unfinished stabilize round unless the ring still uses it.
    pub(crate) async fn abandon_temp_successor(&self, pending: Did) -> Result<()> {
        let in_use = self.dht.lock_finger()?.contains(pending)
            || self.dht.predecessor()? == Some(pending);
        if in_use || !self.transport.has_connection(pending) {
            return Ok(());
        }
        if let Err(e) = self.transport.disconnect(pending).await {
            tracing::debug!("[recover_successor] drop pending {} failed: {}", pending, e);
        }
        Ok(())
    }

    /// Replace the lost successor with the first reachable candidate of
    /// [query_successors](crate::transport::ChordTransport::query_successors).
    ///
    /// An existing link to a candidate is reused. When no candidate can be reached the
    /// node is isolated: the successor is unset and [Error::SuccessorListExhausted] returned.
    pub(crate) async fn recover_successor(&self, lost: Did) -> Result<()> {
        for candidate in self.transport.query_successors() {
            if self.shutdown.is_cancelled() {
                return Err(Error::NodeDestroyed);
            }
            if !self.transport.has_connection(candidate) {
                if let Err(e) = self.transport.connect(candidate).await {
                    tracing::debug!("[recover_successor] skip {}: {}", candidate, e);
                    continue;
                }
            }
            if !self.dht.replace_successor(lost, candidate)? {
                tracing::debug!(
                    "[recover_successor] successor of {} changed meanwhile",
                    self.did()
                );
                return Ok(());
            }

            tracing::info!(
                "[recover_successor] {} replaced successor {} with {}",
                self.did(),
                lost,
                candidate
            );
            if let Err(e) = self.notify(candidate).await {
                tracing::warn!("[recover_successor] notify {} failed: {}", candidate, e);
            }
            self.emit(NodeEvent::SuccessorRecovered {
                lost,
                successor: candidate,
            })
            .await;
            return Ok(());
        }

        self.dht.isolate()?;
        tracing::error!(
            "[recover_successor] {} lost successor {} and no candidate is reachable, node isolated",
            self.did(),
            lost
        );
        self.emit(NodeEvent::Isolated { lost }).await;
        Err(Error::SuccessorListExhausted)
    }
}
