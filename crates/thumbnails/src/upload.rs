use std::sync::{Mutex, PoisonError};

use atlas_slots::SlotTicket;

use crate::decode::DecodedImage;

/// Decoded pixels waiting for the GPU-owning thread.
#[derive(Debug)]
pub struct UploadItem<K> {
    pub key: K,
    pub image: DecodedImage,
    /// Slot claim the decode was dispatched for.
    pub ticket: SlotTicket,
}

/// Hand-off from decode workers to the thread that owns the atlas.
///
/// Any number of producers may enqueue; `drain_all` takes everything queued
/// so far in arrival order as one batch.
#[derive(Debug)]
pub struct UploadQueue<K> {
    items: Mutex<Vec<UploadItem<K>>>,
}

impl<K> UploadQueue<K> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue(&self, item: UploadItem<K>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    pub fn drain_all(&self) -> Vec<UploadItem<K>> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for UploadQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atlas_slots::{AtlasConfig, AtlasLayout, SlotTable};

    use super::*;

    fn tickets(count: u32) -> Vec<SlotTicket> {
        let layout = AtlasLayout::from_config(AtlasConfig {
            max_slots: count,
            ..AtlasConfig::default()
        })
        .expect("valid atlas config");
        let mut table = SlotTable::new(layout);
        (0..count)
            .map(|key| table.acquire_slot_for(key).expect("unclaimed key").ticket)
            .collect()
    }

    fn item(key: u32, ticket: SlotTicket) -> UploadItem<u32> {
        UploadItem {
            key,
            image: DecodedImage::solid(1, 1, [key as u8, 0, 0, 255]).expect("1x1 image"),
            ticket,
        }
    }

    #[test]
    fn drain_returns_items_in_arrival_order_and_empties_queue() {
        let queue = UploadQueue::new();
        for (key, ticket) in tickets(3).into_iter().enumerate() {
            queue.enqueue(item(key as u32, ticket));
        }
        assert_eq!(queue.len(), 3);

        let keys: Vec<u32> = queue.drain_all().into_iter().map(|item| item.key).collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: u32 = 8;
        const PER_PRODUCER: u32 = 50;

        let ticket = tickets(1)[0];
        let queue = Arc::new(UploadQueue::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for index in 0..PER_PRODUCER {
                        queue.enqueue(item(producer * PER_PRODUCER + index, ticket));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for handle in handles {
            drained.extend(queue.drain_all());
            handle.join().expect("join producer");
        }
        drained.extend(queue.drain_all());

        let mut keys: Vec<u32> = drained.into_iter().map(|item| item.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
    }
}
