use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Copy-on-write allow and deny sets of IP literals.
///
/// A mutation clones the current set, applies the change, and publishes the
/// copy with an atomic swap. Readers load a reference once per query and see
/// a coherent snapshot. Concurrent mutations are not serialized: the last
/// publisher wins.
#[derive(Default)]
pub(crate) struct IpFilter {
    allowlist: ArcSwapOption<HashSet<String>>,
    denylist: ArcSwapOption<HashSet<String>>,
}

impl IpFilter {
    pub(crate) fn add_allowed(&self, ip: &str) {
        Self::insert(&self.allowlist, ip);
    }

    pub(crate) fn remove_allowed(&self, ip: &str) {
        Self::remove(&self.allowlist, ip);
    }

    pub(crate) fn is_allowed(&self, ip: &str) -> bool {
        Self::contains(&self.allowlist, ip)
    }

    pub(crate) fn add_denied(&self, ip: &str) {
        Self::insert(&self.denylist, ip);
    }

    pub(crate) fn remove_denied(&self, ip: &str) {
        Self::remove(&self.denylist, ip);
    }

    pub(crate) fn is_denied(&self, ip: &str) -> bool {
        Self::contains(&self.denylist, ip)
    }

    fn insert(list: &ArcSwapOption<HashSet<String>>, ip: &str) {
        let mut updated = match list.load_full() {
            Some(current) => (*current).clone(),
            None => HashSet::new(),
        };
        updated.insert(ip.to_owned());
        list.store(Some(Arc::new(updated)));
    }

    fn remove(list: &ArcSwapOption<HashSet<String>>, ip: &str) {
        let Some(current) = list.load_full() else {
            return;
        };
        let mut updated = (*current).clone();
        updated.remove(ip);
        list.store(Some(Arc::new(updated)));
    }

    fn contains(list: &ArcSwapOption<HashSet<String>>, ip: &str) -> bool {
        list.load().as_ref().map_or(false, |set| set.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_sets_match_nothing() {
        let filter = IpFilter::default();
        assert!(!filter.is_allowed("1.2.3.4"));
        assert!(!filter.is_denied("1.2.3.4"));
    }

    #[test]
    fn allow_and_deny_are_independent() {
        let filter = IpFilter::default();

        filter.add_allowed("10.0.0.1");
        filter.add_denied("10.0.0.2");

        assert!(filter.is_allowed("10.0.0.1"));
        assert!(!filter.is_denied("10.0.0.1"));
        assert!(filter.is_denied("10.0.0.2"));
        assert!(!filter.is_allowed("10.0.0.2"));
    }

    #[test]
    fn removal_publishes_a_new_snapshot() {
        let filter = IpFilter::default();

        filter.add_denied("1.2.3.4");
        filter.add_denied("5.6.7.8");
        filter.remove_denied("1.2.3.4");

        assert!(!filter.is_denied("1.2.3.4"));
        assert!(filter.is_denied("5.6.7.8"));
    }

    #[test]
    fn remove_from_absent_set_is_a_noop() {
        let filter = IpFilter::default();
        filter.remove_allowed("1.2.3.4");
        assert!(!filter.is_allowed("1.2.3.4"));
    }
}
