//! Change notification for store observers.
//!
//! Every committed write publishes the [`Table`] it touched. Observers
//! re-run their query when their table shows up; there is no polling.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    Movies,
    Genres,
}

#[derive(Debug)]
pub struct ChangeBus {
    sender: broadcast::Sender<Table>,
}

impl ChangeBus {
    /// A slow receiver that falls more than `capacity` notifications behind
    /// sees `RecvError::Lagged` and should re-query unconditionally.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, table: Table) {
        // Zero receivers is not an error.
        let _ = self.sender.send(table);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.sender.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_every_table_change() {
        let bus = ChangeBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Table::Movies);
        bus.publish(Table::Genres);

        assert_eq!(rx.recv().await.unwrap(), Table::Movies);
        assert_eq!(rx.recv().await.unwrap(), Table::Genres);
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        ChangeBus::default().publish(Table::Movies);
    }
}
