/// Index-addressed storage with free-slot recycling.
///
/// Indices stay valid for the lifetime of their occupant and are handed out
/// again only after an explicit [`SlotArena::remove`]. Capacity never shrinks
/// on removal.
#[derive(Debug, Clone)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<usize>,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }
}

impl<T> SlotArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next insert will use: the most recently freed slot, or a
    /// fresh slot at the end.
    pub fn find_free(&self) -> usize {
        self.free_list.last().copied().unwrap_or(self.slots.len())
    }

    /// # Panics
    ///
    /// Panics if `idx` is occupied or past the next append position.
    pub fn insert_at(&mut self, idx: usize, value: T) {
        if idx == self.slots.len() {
            self.slots.push(Some(value));
            return;
        }
        assert!(
            idx < self.slots.len(),
            "slot {idx} is beyond the next append position {}",
            self.slots.len()
        );
        assert!(self.slots[idx].is_none(), "slot {idx} is already occupied");
        if let Some(pos) = self.free_list.iter().rposition(|free| *free == idx) {
            self.free_list.swap_remove(pos);
        }
        self.slots[idx] = Some(value);
    }

    pub fn insert(&mut self, value: T) -> usize {
        let idx = self.find_free();
        self.insert_at(idx, value);
        idx
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of range or already free.
    pub fn remove(&mut self, idx: usize) -> T {
        assert!(
            idx < self.slots.len(),
            "slot {idx} out of range (len {})",
            self.slots.len()
        );
        let Some(value) = self.slots[idx].take() else {
            panic!("slot {idx} is already free");
        };
        self.free_list.push(idx);
        value
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    pub fn is_occupied(&self, idx: usize) -> bool {
        self.get(idx).is_some()
    }

    /// Number of slots, free or occupied.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (idx, value)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
    }
}
