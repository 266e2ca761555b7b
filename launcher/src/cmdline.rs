use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Address handed to the guest on the user-mode network
pub const GUEST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 15);

/// Gateway of QEMU's user-mode NAT
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 1);

/// Subnet mask of the user-mode network (/24)
pub const SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Static interface configuration passed through the kernel `ip=` parameter.
///
/// Rendered as `<client>:<server>:<gateway>:<netmask>`; the server field is
/// left empty unless set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpConfig {
    pub client: Ipv4Addr,
    #[serde(default)]
    pub server: Option<Ipv4Addr>,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            client: GUEST_IP,
            server: None,
            gateway: GATEWAY_IP,
            netmask: SUBNET_MASK,
        }
    }
}

impl fmt::Display for IpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.client)?;
        if let Some(server) = self.server {
            write!(f, "{server}")?;
        }
        write!(f, ":{}:{}", self.gateway, self.netmask)
    }
}

/// Kernel command line for booting from the initial ramdisk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelCmdline {
    /// Root device
    pub root: String,
    /// Init program inside the ramdisk, relative to its root
    pub rdinit: String,
    pub ip: Option<IpConfig>,
    /// Console device the kernel logs to
    pub console: Option<String>,
    /// Bare parameters appended after everything else (e.g. `no_timer_check`)
    pub flags: Vec<String>,
}

impl Default for KernelCmdline {
    fn default() -> Self {
        Self {
            root: "/dev/ram".to_string(),
            rdinit: "sbin/init".to_string(),
            ip: Some(IpConfig::default()),
            console: Some("ttyS0".to_string()),
            flags: vec!["no_timer_check".to_string()],
        }
    }
}

impl fmt::Display for KernelCmdline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root={} rdinit={}", self.root, self.rdinit)?;
        if let Some(ip) = &self.ip {
            write!(f, " ip={ip}")?;
        }
        if let Some(console) = &self.console {
            write!(f, " console={console}")?;
        }
        for flag in &self.flags {
            write!(f, " {flag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cmdline_matches_boot_parameters() {
        assert_eq!(
            KernelCmdline::default().to_string(),
            "root=/dev/ram rdinit=sbin/init ip=10.0.2.15::10.0.2.1:255.255.255.0 console=ttyS0 no_timer_check"
        );
    }

    #[test]
    fn ip_config_renders_server_field_when_set() {
        let ip = IpConfig {
            server: Some(Ipv4Addr::new(10, 0, 2, 2)),
            ..Default::default()
        };
        assert_eq!(ip.to_string(), "10.0.2.15:10.0.2.2:10.0.2.1:255.255.255.0");
    }

    #[test]
    fn cmdline_without_network_or_console() {
        let cmdline = KernelCmdline {
            ip: None,
            console: None,
            flags: vec!["quiet".to_string(), "panic=1".to_string()],
            ..Default::default()
        };
        assert_eq!(
            cmdline.to_string(),
            "root=/dev/ram rdinit=sbin/init quiet panic=1"
        );
    }
}
