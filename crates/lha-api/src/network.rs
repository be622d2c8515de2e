//! Locally reachable address for the startup banner.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// RFC 1918 ranges.
pub fn is_private_lan(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 10
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
}

/// The LAN address this host would use for outbound traffic, or the first
/// private interface address. `None` when neither exists.
pub fn local_lan_address() -> Option<Ipv4Addr> {
    // Connecting a UDP socket sends nothing; it only selects the route.
    let routed = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .ok()
        .and_then(|addr| match addr.ip() {
            IpAddr::V4(ip) if is_private_lan(ip) => Some(ip),
            _ => None,
        });
    if routed.is_some() {
        return routed;
    }

    get_if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.addr {
            get_if_addrs::IfAddr::V4(v4) if is_private_lan(v4.ip) => Some(v4.ip),
            _ => None,
        })
}

/// `host:port` an operator on the LAN can reach, when the listener is on all interfaces.
pub fn lan_url_host(bind_host: &str, port: u16) -> Option<String> {
    let unspecified = bind_host
        .parse::<IpAddr>()
        .map(|ip| ip.is_unspecified())
        .unwrap_or(false);
    if !unspecified {
        return None;
    }
    local_lan_address().map(|ip| format!("{}:{}", ip, port))
}
