use crate::vm::value::Value;

const MIN_CAPACITY: usize = 8;

/// Slot state. `Tombstone` marks a deleted entry so probe sequences that
/// ran through it still reach keys stored further along.
#[derive(Debug, Clone, Default)]
enum Slot<V> {
    #[default]
    Empty,
    Tombstone,
    Occupied {
        key: Box<str>,
        value: V,
    },
}

/// Open-addressing hash map from owned string keys to values.
///
/// Keys hash with 32-bit FNV-1a and probe linearly. The table grows by
/// doubling (starting at 8 slots) before an insert would push
/// `used / capacity` past 3/4, where `used` counts live entries plus
/// tombstones. When tombstones make up most of `used`, the table is
/// rehashed at its current capacity instead.
#[derive(Debug, Clone)]
pub struct Table<V = Value> {
    slots: Vec<Slot<V>>,
    live: usize,
    used: usize,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// 32-bit FNV-1a.
pub fn hash_key(key: &str) -> u32 {
    key.bytes().fold(2_166_136_261u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(16_777_619)
    })
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

/// Index of the slot holding `key`, or of the slot where it should be
/// inserted (the first tombstone passed, else the empty slot that ended the
/// probe). `slots` must be non-empty and contain at least one empty slot.
fn find_slot<V>(slots: &[Slot<V>], key: &str) -> usize {
    let capacity = slots.len();
    let mut index = hash_key(key) as usize % capacity;
    let mut tombstone = None;
    loop {
        match &slots[index] {
            Slot::Empty => return tombstone.unwrap_or(index),
            Slot::Tombstone => {
                tombstone.get_or_insert(index);
            }
            Slot::Occupied { key: existing, .. } if existing.as_ref() == key => return index,
            Slot::Occupied { .. } => {}
        }
        index = (index + 1) % capacity;
    }
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            used: 0,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        if self.live == 0 {
            return None;
        }
        match &self.slots[find_slot(&self.slots, key)] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or update `key`. Returns `true` when the key was not present.
    pub fn set(&mut self, key: &str, value: V) -> bool {
        if (self.used + 1) * 4 > self.capacity() * 3 {
            let capacity = if (self.live + 1) * 8 <= self.capacity() * 3 {
                self.capacity()
            } else {
                grow_capacity(self.capacity())
            };
            self.resize(capacity);
        }

        let index = find_slot(&self.slots, key);
        match &mut self.slots[index] {
            Slot::Occupied { value: existing, .. } => {
                *existing = value;
                false
            }
            slot => {
                if matches!(slot, Slot::Empty) {
                    self.used += 1;
                }
                *slot = Slot::Occupied {
                    key: key.into(),
                    value,
                };
                self.live += 1;
                true
            }
        }
    }

    /// Remove `key`, leaving a tombstone. Returns `true` if it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.live == 0 {
            return false;
        }
        let index = find_slot(&self.slots, key);
        if !matches!(self.slots[index], Slot::Occupied { .. }) {
            return false;
        }
        self.slots[index] = Slot::Tombstone;
        self.live -= 1;
        true
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { key, value } => Some((key.as_ref(), value)),
            _ => None,
        })
    }

    fn resize(&mut self, capacity: usize) {
        let mut slots: Vec<Slot<V>> = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        let old = std::mem::replace(&mut self.slots, slots);

        self.live = 0;
        for slot in old {
            if let Slot::Occupied { key, value } = slot {
                let index = find_slot(&self.slots, &key);
                self.slots[index] = Slot::Occupied { key, value };
                self.live += 1;
            }
        }
        self.used = self.live;
    }
}
