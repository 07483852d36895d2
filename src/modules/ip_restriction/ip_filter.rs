//! Allow-list authorization of client addresses.

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::warn;

/// A resolved allow-list: exact entries plus pre-parsed CIDR networks.
///
/// Exact membership is checked on the raw string first, so an entry that
/// is not a valid address can still match a client address spelled the
/// same way. Entries containing `/` are also parsed as networks; host bits
/// may be set. Unparseable networks are logged and skipped.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    /// Every entry, as configured.
    entries: HashSet<String>,

    /// Entries that parsed as CIDR networks.
    networks: Vec<IpNet>,
}

impl AllowList {
    /// Build an allow-list from raw entries.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: HashSet<String> = entries.into_iter().map(Into::into).collect();
        let mut networks = Vec::new();

        for entry in entries.iter().filter(|e| e.contains('/')) {
            match entry.parse::<IpNet>() {
                Ok(net) => networks.push(net),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "skipping invalid allow-list network");
                },
            }
        }

        Self { entries, networks }
    }

    /// Check whether an address is allowed.
    ///
    /// Never fails: an address that does not parse is denied.
    #[must_use]
    pub fn is_allowed(&self, address: &str) -> bool {
        if self.entries.contains(address) {
            return true;
        }

        let ip = match address.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(address = %address, "invalid client address format");
                return false;
            },
        };

        // IpNet::contains never matches across address families.
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Every configured entry.
    #[must_use]
    pub fn entries(&self) -> &HashSet<String> {
        &self.entries
    }

    /// Parsed networks.
    #[must_use]
    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    /// Number of configured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check an address against a raw allow-list.
///
/// Parses the networks on every call; hot paths should hold an [`AllowList`].
#[must_use]
pub fn is_allowed(address: &str, allowed: &HashSet<String>) -> bool {
    AllowList::new(allowed.iter().cloned()).is_allowed(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> AllowList {
        AllowList::new(entries.iter().copied())
    }

    #[test]
    fn test_exact_match() {
        let allow = list(&["203.0.113.5", "2001:db8::1"]);
        assert!(allow.is_allowed("203.0.113.5"));
        assert!(allow.is_allowed("2001:db8::1"));
        assert!(!allow.is_allowed("203.0.113.6"));
    }

    #[test]
    fn test_exact_match_wins_regardless_of_networks() {
        let allow = list(&["198.51.100.9", "10.0.0.0/24", "garbage/99"]);
        assert!(allow.is_allowed("198.51.100.9"));
    }

    #[test]
    fn test_cidr_containment() {
        let allow = list(&["10.0.0.0/24"]);
        assert!(allow.is_allowed("10.0.0.200"));
        assert!(allow.is_allowed("10.0.0.0"));
        assert!(allow.is_allowed("10.0.0.255"));
        assert!(!allow.is_allowed("10.0.1.5"));
        assert!(!allow.is_allowed("9.255.255.255"));
    }

    #[test]
    fn test_cidr_host_bits_tolerated() {
        let allow = list(&["192.168.1.77/24"]);
        assert_eq!(allow.networks().len(), 1);
        assert!(allow.is_allowed("192.168.1.1"));
        assert!(!allow.is_allowed("192.168.2.1"));
    }

    #[test]
    fn test_ipv6_networks() {
        let allow = list(&["2001:db8::/32"]);
        assert!(allow.is_allowed("2001:db8:1::42"));
        assert!(!allow.is_allowed("2001:db9::1"));
    }

    #[test]
    fn test_mixed_family_never_matches() {
        let v6_only = list(&["::/0"]);
        assert!(!v6_only.is_allowed("10.0.0.1"));
        assert!(v6_only.is_allowed("::1"));

        let v4_only = list(&["0.0.0.0/0"]);
        assert!(!v4_only.is_allowed("::1"));
        assert!(!v4_only.is_allowed("::ffff:10.0.0.1"));
        assert!(v4_only.is_allowed("8.8.8.8"));
    }

    #[test]
    fn test_invalid_client_address_denied() {
        let allow = list(&["10.0.0.0/8"]);
        assert!(!allow.is_allowed("not-an-ip"));
        assert!(!allow.is_allowed(""));
        assert!(!allow.is_allowed("10.0.0.1:8080"));
    }

    #[test]
    fn test_invalid_network_skipped() {
        let allow = list(&["10.0.0.0/33", "bogus/8", "172.16.0.0/12"]);
        assert_eq!(allow.len(), 3);
        assert_eq!(allow.networks().len(), 1);
        assert!(allow.is_allowed("172.20.1.1"));
        assert!(!allow.is_allowed("10.0.0.1"));
    }

    #[test]
    fn test_empty_list_denies() {
        let allow = AllowList::default();
        assert!(allow.is_empty());
        assert!(!allow.is_allowed("127.0.0.1"));
    }

    #[test]
    fn test_free_function() {
        let allowed: HashSet<String> = ["10.0.0.0/24".to_string()].into_iter().collect();
        assert!(is_allowed("10.0.0.9", &allowed));
        assert!(!is_allowed("10.0.1.9", &allowed));
    }
}
