//! The fixed-capacity `{key, callback}` registry backing UDP ports, TCP
//! ports, and HTTP paths.
//!
//! Grounded in `port_service.c`: a linear-scan array with
//! overwrite-if-present / else-fill-first-empty / else-log-and-drop
//! semantics. The original's `port == 0` empty sentinel becomes `Option`
//! here; everything else — no sort, no eviction, O(N) lookup acceptable
//! for small N — carries over unchanged.

/// `N`-slot registry mapping `K` (a `u16` port or a `&'static str` path)
/// to a `C` callback value.
pub struct PortService<K, C, const N: usize> {
    slots: [Option<(K, C)>; N],
}

impl<K: Copy + PartialEq, C: Copy, const N: usize> PortService<K, C, N> {
    pub const fn new() -> Self {
        PortService { slots: [None; N] }
    }

    /// Overwrite the callback if `key` is already registered; otherwise
    /// fill the first empty slot. If the table is full, log and do
    /// nothing — matching `port_service_set`'s silent-drop-on-full
    /// behavior.
    pub fn set(&mut self, key: K, callback: C) {
        if let Some(slot) = self.slots.iter_mut().find(|s| matches!(s, Some((k, _)) if *k == key)) {
            *slot = Some((key, callback));
            return;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some((key, callback));
            return;
        }
        log::warn!("port-service table full, dropping registration");
    }

    pub fn remove(&mut self, key: K) {
        if let Some(slot) = self.slots.iter_mut().find(|s| matches!(s, Some((k, _)) if *k == key)) {
            *slot = None;
        }
    }

    pub fn get(&self, key: K) -> Option<C> {
        self.slots
            .iter()
            .find_map(|s| s.and_then(|(k, cb)| (k == key).then_some(cb)))
    }
}

impl<K: Copy + PartialEq, C: Copy, const N: usize> Default for PortService<K, C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Copy, const N: usize> PortService<&'static str, C, N> {
    /// Look a path up by a borrow that need not be `'static` — the HTTP
    /// path table's keys are registered as `&'static str` route literals,
    /// but a request's path is only ever borrowed from the buffer it
    /// arrived in.
    pub fn get_path(&self, key: &str) -> Option<C> {
        self.slots
            .iter()
            .find_map(|s| s.and_then(|(k, cb)| (k == key).then_some(cb)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_misses_on_empty_table() {
        let table: PortService<u16, u8, 4> = PortService::new();
        assert_eq!(table.get(80), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut table: PortService<u16, u8, 4> = PortService::new();
        table.set(80, 1);
        assert_eq!(table.get(80), Some(1));
    }

    #[test]
    fn set_overwrites_existing_port() {
        let mut table: PortService<u16, u8, 4> = PortService::new();
        table.set(80, 1);
        table.set(80, 2);
        assert_eq!(table.get(80), Some(2));
    }

    #[test]
    fn set_drops_registration_when_table_full() {
        let mut table: PortService<u16, u8, 2> = PortService::new();
        table.set(80, 1);
        table.set(443, 2);
        table.set(8080, 3);
        assert_eq!(table.get(8080), None);
        assert_eq!(table.get(80), Some(1));
        assert_eq!(table.get(443), Some(2));
    }

    #[test]
    fn remove_clears_slot() {
        let mut table: PortService<u16, u8, 4> = PortService::new();
        table.set(80, 1);
        table.remove(80);
        assert_eq!(table.get(80), None);
    }

    #[test]
    fn string_keyed_table_works_for_http_paths() {
        let mut table: PortService<&'static str, u8, 4> = PortService::new();
        table.set("/status", 1);
        assert_eq!(table.get("/status"), Some(1));
        assert_eq!(table.get("/missing"), None);
    }
}
