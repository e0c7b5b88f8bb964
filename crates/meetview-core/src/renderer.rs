//! Places SDK-produced stream elements into the session containers.
//!
//! Each `(participant, kind)` pair owns at most one slot. An attach is a
//! two-step affair because the SDK call producing the element is async:
//! `begin_attach` reserves the slot, `commit` inserts the elements if no
//! stop arrived in between. A stale commit hands the elements back so the
//! caller can release them through the SDK.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::host::{Container, ElementKind, Host};
use crate::sdk::{AttachedElements, ElementHandle, ParticipantId, StreamKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub participant_id: ParticipantId,
    pub kind: StreamKind,
}

impl TileKey {
    pub fn camera(participant_id: ParticipantId) -> Self {
        Self { participant_id, kind: StreamKind::Camera }
    }

    pub fn share(participant_id: ParticipantId) -> Self {
        Self { participant_id, kind: StreamKind::Share }
    }

    pub fn container(&self) -> Container {
        match self.kind {
            StreamKind::Camera => Container::Video,
            StreamKind::Share => Container::Share,
        }
    }
}

/// A tile currently in the element tree.
#[derive(Debug)]
pub struct Tile {
    pub key: TileKey,
    wrapper: ElementHandle,
    label: Option<ElementHandle>,
    elements: Vec<ElementHandle>,
}

impl Tile {
    pub fn elements(&self) -> &[ElementHandle] {
        &self.elements
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachTicket {
    pub key: TileKey,
    generation: u64,
}

#[derive(Debug)]
enum Slot {
    Pending(u64),
    Attached(Tile),
}

pub struct TileRenderer {
    host: Arc<dyn Host>,
    slots: Mutex<HashMap<TileKey, Slot>>,
    next_generation: AtomicU64,
}

impl TileRenderer {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Reserve the slot for `key`. Returns `None` when a tile is already
    /// attached or an attach is already under way.
    pub fn begin_attach(&self, key: TileKey) -> Option<AttachTicket> {
        let mut slots = self.slots.lock().expect("tile lock poisoned");
        if slots.contains_key(&key) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        slots.insert(key, Slot::Pending(generation));
        Some(AttachTicket { key, generation })
    }

    /// Release a reservation whose SDK attach failed.
    pub fn abandon(&self, ticket: AttachTicket) {
        let mut slots = self.slots.lock().expect("tile lock poisoned");
        if matches!(slots.get(&ticket.key), Some(Slot::Pending(g)) if *g == ticket.generation) {
            slots.remove(&ticket.key);
        }
    }

    /// Insert the SDK elements as a labelled tile.
    ///
    /// Fails with the flattened elements if the slot was released meanwhile.
    pub fn commit(
        &self,
        ticket: AttachTicket,
        attached: AttachedElements,
        label: Option<&str>,
    ) -> Result<(), Vec<ElementHandle>> {
        let elements = attached.into_vec();
        let mut slots = self.slots.lock().expect("tile lock poisoned");
        let current = matches!(
            slots.get(&ticket.key),
            Some(Slot::Pending(g)) if *g == ticket.generation
        );
        if !current {
            return Err(elements);
        }

        let wrapper = self.host.create_element(ElementKind::Tile);
        for el in &elements {
            self.host.append_child(wrapper, *el);
        }
        let label = label.map(|text| {
            let el = self.host.create_element(ElementKind::Label);
            self.host.set_text(el, text);
            self.host.append_child(wrapper, el);
            el
        });
        self.host.append_to_container(ticket.key.container(), wrapper);

        slots.insert(
            ticket.key,
            Slot::Attached(Tile {
                key: ticket.key,
                wrapper,
                label,
                elements,
            }),
        );
        Ok(())
    }

    /// Release the slot for `key`. Only an attached tile is returned; a
    /// pending reservation is dropped so its commit turns stale.
    pub fn take(&self, key: TileKey) -> Option<Tile> {
        let mut slots = self.slots.lock().expect("tile lock poisoned");
        match slots.remove(&key)? {
            Slot::Attached(tile) => Some(tile),
            Slot::Pending(_) => None,
        }
    }

    pub fn take_participant(&self, participant_id: ParticipantId) -> Vec<Tile> {
        [StreamKind::Camera, StreamKind::Share]
            .into_iter()
            .filter_map(|kind| self.take(TileKey { participant_id, kind }))
            .collect()
    }

    pub fn take_all(&self) -> Vec<Tile> {
        let mut slots = self.slots.lock().expect("tile lock poisoned");
        slots
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Attached(tile) => Some(tile),
                Slot::Pending(_) => None,
            })
            .collect()
    }

    /// Remove a released tile from the tree, together with whatever the
    /// SDK returned when detaching it.
    pub fn discard(&self, tile: Tile, returned: Vec<ElementHandle>) {
        let mut elements = tile.elements;
        for el in returned {
            if !elements.contains(&el) {
                elements.push(el);
            }
        }
        self.discard_elements(&elements);
        if let Some(label) = tile.label {
            self.host.remove_element(label);
        }
        self.host.remove_element(tile.wrapper);
    }

    pub fn discard_elements(&self, elements: &[ElementHandle]) {
        for el in elements {
            self.host.remove_element(*el);
        }
    }

    pub fn has_tile(&self, key: TileKey) -> bool {
        matches!(
            self.slots.lock().expect("tile lock poisoned").get(&key),
            Some(Slot::Attached(_))
        )
    }

    pub fn tile_count(&self) -> usize {
        self.slots
            .lock()
            .expect("tile lock poisoned")
            .values()
            .filter(|slot| matches!(slot, Slot::Attached(_)))
            .count()
    }

    pub fn attached_keys(&self) -> Vec<TileKey> {
        self.slots
            .lock()
            .expect("tile lock poisoned")
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Attached(_)))
            .map(|(key, _)| *key)
            .collect()
    }
}
