//! Growable open-addressed hash table and the rolling path-hash functions.
//!
//! This is the leaf component every pass is built on (spec §4.2). Slot `0`
//! is reserved for "empty" — callers must never store a key that hashes to
//! literal zero; [`mkmask`]'s callers offset such keys to `len + 1` before
//! inserting, exactly as the original.

/// Variable-step probing starts at this offset, matching the original's
/// `HASHCHAIN_START`. A fixed step of 1 (linear probing) clusters badly on
/// the skewed path-hash distribution real file trees produce; a second
/// independent hash (double hashing) isn't worth the extra computation here.
const HASHCHAIN_START: u32 = 7;

#[inline]
fn hashchain_next(h: u32, hh: &mut u32, mask: u32) -> u32 {
    let next = (h.wrapping_add(*hh)) & mask;
    *hh = hh.wrapping_add(1);
    next
}

/// Rolling "bytewise-radix" string hash: `r = r*8 + r + byte` over every
/// byte, seeded at zero. Never returns a value callers can rely on being
/// nonzero — callers substitute `len + 1` when this returns 0.
#[must_use]
pub fn strhash(s: &str) -> u32 {
    strhash_cont(s, 0)
}

/// Same recurrence as [`strhash`], but starting from an existing
/// accumulator `seed` instead of zero. This lets a full-path hash be
/// produced by extending a previously computed directory hash with the
/// basename bytes, without re-hashing the directory prefix (spec §4.2).
#[must_use]
pub fn strhash_cont(s: &str, seed: u32) -> u32 {
    let mut r = seed;
    for &b in s.as_bytes() {
        r = r
            .wrapping_shl(3)
            .wrapping_add(r)
            .wrapping_add(u32::from(b));
    }
    r
}

/// Hash only the first `len` bytes of `s`.
#[must_use]
pub fn strnhash(s: &str, len: usize) -> u32 {
    let mut r = 0u32;
    for &b in s.as_bytes().iter().take(len) {
        r = r
            .wrapping_shl(3)
            .wrapping_add(r)
            .wrapping_add(u32::from(b));
    }
    r
}

/// Offset a hash that would naturally be zero to `len + 1` (spec §3
/// invariant 1: zero is reserved for "empty slot", so every live key must
/// be non-zero). Every pass applies this to a raw `strhash`/`strnhash`
/// result before using it as a table key.
#[must_use]
pub fn nonzero_hash(hash: u32, len: usize) -> u32 {
    if hash == 0 {
        #[allow(clippy::cast_possible_truncation)]
        let fallback = len as u32 + 1;
        fallback
    } else {
        hash
    }
}

/// Smallest `2^k - 1` such that `2^k - 1 >= 2*num - 1`, i.e. the smallest
/// odd all-ones mask that can hold `num` entries at 50% load. Implemented
/// as the original's doubling loop rather than `next_power_of_two`
/// arithmetic so that the "grows when `2*used > mask`" invariant lines up
/// exactly with table construction.
#[must_use]
pub fn mkmask(num: u32) -> u32 {
    let mut n = num.saturating_mul(2);
    while n & n.wrapping_sub(1) != 0 {
        n &= n.wrapping_sub(1);
    }
    n.saturating_mul(2).saturating_sub(1)
}

/// A growable open-addressed `(key, value)` table where `key == 0` marks an
/// empty slot. Doubles when load exceeds 50%.
///
/// Keys are `u32` hash values (never zero for a live entry — callers offset
/// zero-hashing inputs before calling [`GrowableHashMap::insert`]). Values
/// are caller-defined `u32`s; this crate stores tagged [`crate::model::SlotValue`]
/// encodings or plain package indices depending on the pass.
#[derive(Debug, Clone)]
pub struct GrowableHashMap {
    mask: u32,
    slots: Vec<(u32, u32)>,
    used: u32,
}

impl GrowableHashMap {
    /// Create a table sized to hold at least `hint` entries at 50% load.
    #[must_use]
    pub fn with_capacity_hint(hint: u32) -> Self {
        let mask = mkmask(hint.max(1));
        Self {
            mask,
            slots: vec![(0, 0); mask as usize + 1],
            used: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.used
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Total slot count (`mask + 1`).
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    /// Approximate memory footprint in KiB, for debug-sink reporting.
    #[must_use]
    pub fn memory_kib(&self) -> usize {
        self.slots.len() * std::mem::size_of::<(u32, u32)>() / 1024
    }

    fn slot_index(&self, key: u32) -> Option<usize> {
        debug_assert_ne!(key, 0, "zero keys must be offset by the caller");
        let mut h = key & self.mask;
        let mut hh = HASHCHAIN_START;
        loop {
            let (k, _) = self.slots[h as usize];
            if k == 0 || k == key {
                return Some(h as usize);
            }
            h = hashchain_next(h, &mut hh, self.mask);
        }
    }

    /// Look up `key`, returning its stored value if present.
    #[must_use]
    pub fn get(&self, key: u32) -> Option<u32> {
        let idx = self.slot_index(key)?;
        let (k, v) = self.slots[idx];
        (k == key).then_some(v)
    }

    /// Insert or overwrite `key -> value`, growing the table first if load
    /// would exceed 50%.
    pub fn insert(&mut self, key: u32, value: u32) {
        if (self.used + 1).saturating_mul(2) > self.mask {
            self.grow();
        }
        let idx = self
            .slot_index(key)
            .expect("slot_index always finds a slot after growth");
        let (k, _) = self.slots[idx];
        if k == 0 {
            self.used += 1;
        }
        self.slots[idx] = (key, value);
    }

    /// Mutate the value for `key` in place if present, otherwise insert
    /// `default`. Returns a mutable reference for further updates.
    pub fn entry_or_insert(&mut self, key: u32, default: u32) -> &mut u32 {
        if (self.used + 1).saturating_mul(2) > self.mask {
            self.grow();
        }
        let idx = self
            .slot_index(key)
            .expect("slot_index always finds a slot after growth");
        let (k, _) = self.slots[idx];
        if k == 0 {
            self.slots[idx] = (key, default);
            self.used += 1;
        }
        &mut self.slots[idx].1
    }

    fn grow(&mut self) {
        let new_mask = (self.mask + 1) * 2 - 1;
        let mut new_slots = vec![(0u32, 0u32); new_mask as usize + 1];
        for &(k, v) in &self.slots {
            if k == 0 {
                continue;
            }
            let mut h = k & new_mask;
            let mut hh = HASHCHAIN_START;
            loop {
                if new_slots[h as usize].0 == 0 {
                    break;
                }
                h = hashchain_next(h, &mut hh, new_mask);
            }
            new_slots[h as usize] = (k, v);
        }
        self.mask = new_mask;
        self.slots = new_slots;
    }
}
