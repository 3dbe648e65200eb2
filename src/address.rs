//! Client address normalization shared by visit tracking and geolocation

const MAPPED_IPV4_PREFIX: &str = "::ffff:";

/// Normalize a raw client address into the key used for deduplication.
///
/// - A forwarding chain (`client, proxy1, proxy2`) yields its first hop.
/// - An IPv4-mapped IPv6 address (`::ffff:1.2.3.4`) yields the bare IPv4 form.
pub fn normalize(raw: &str) -> String {
    let first_hop = raw.split(',').next().unwrap_or(raw).trim();

    match first_hop.get(..MAPPED_IPV4_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MAPPED_IPV4_PREFIX) => {
            first_hop[MAPPED_IPV4_PREFIX.len()..].to_string()
        }
        _ => first_hop.to_string(),
    }
}
