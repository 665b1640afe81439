//! Property tests for MAC and IPv4 validation.

use proptest::prelude::*;
use wol_core::{validate_ip, validate_mac, MacAddress};

fn hex_pairs() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[0-9a-fA-F]{2}", 6)
}

proptest! {
    /// Uniformly separated hex pairs are always accepted.
    #[test]
    fn uniform_macs_are_valid(pairs in hex_pairs(), sep in prop::sample::select(vec![":", "-"])) {
        let mac = pairs.join(sep);
        prop_assert!(validate_mac(&mac), "{} should be valid", mac);
        prop_assert!(MacAddress::parse(&mac).is_ok());
    }

    /// Swapping one separator for the other is always rejected.
    #[test]
    fn mixed_separators_are_invalid(pairs in hex_pairs(), flip in 0usize..5) {
        let mut mac = String::new();
        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 {
                mac.push(if i - 1 == flip { '-' } else { ':' });
            }
            mac.push_str(pair);
        }
        prop_assert!(!validate_mac(&mac), "{} should be invalid", mac);
    }

    /// Dropping or adding a pair changes the length and is rejected.
    #[test]
    fn wrong_pair_count_is_invalid(count in (0usize..12).prop_filter("not six", |c| *c != 6)) {
        let mac = vec!["ab"; count].join(":");
        prop_assert!(!validate_mac(&mac));
    }

    /// A non-hex character anywhere makes the address invalid.
    #[test]
    fn non_hex_is_invalid(pairs in hex_pairs(), pos in 0usize..6, bad in "[g-zG-Z]") {
        let mut pairs = pairs;
        if let Some(pair) = pairs.get_mut(pos) {
            *pair = format!("{}{}", bad, &pair[1..]);
        }
        prop_assert!(!validate_mac(&pairs.join(":")));
    }

    /// Any four octets in range form a valid address.
    #[test]
    fn in_range_octets_are_valid(a: u8, b: u8, c: u8, d: u8) {
        let ip = format!("{a}.{b}.{c}.{d}");
        prop_assert!(validate_ip(&ip));
    }

    /// An octet above 255 invalidates the address.
    #[test]
    fn out_of_range_octet_is_invalid(a: u8, b: u8, c: u8, big in 256u32..100_000, pos in 0usize..4) {
        let mut octets: Vec<String> = vec![a.to_string(), b.to_string(), c.to_string()];
        octets.insert(pos.min(3), big.to_string());
        prop_assert!(!validate_ip(&octets.join(".")));
    }

    /// Anything other than four components is rejected.
    #[test]
    fn wrong_component_count_is_invalid(parts in proptest::collection::vec(any::<u8>(), 0..8)
        .prop_filter("not four", |p| p.len() != 4)) {
        let ip = parts.iter().map(u8::to_string).collect::<Vec<_>>().join(".");
        prop_assert!(!validate_ip(&ip));
    }
}
