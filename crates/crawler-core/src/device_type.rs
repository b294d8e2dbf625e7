use std::fmt;

/// The OS families a device session can auto-detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    CiscoIos,
    CiscoIosXe,
    CiscoXr,
    CiscoNxos,
    AristaEos,
    CiscoAsa,
    Unknown,
}

impl DeviceType {
    /// The internal platform string used by the store and the parser adapter
    /// (`ios`, `iosxe`, `iosxr`, `nxos`, `eos`, `asa`).
    pub fn as_platform_str(&self) -> &'static str {
        match self {
            DeviceType::CiscoIos => "ios",
            DeviceType::CiscoIosXe => "iosxe",
            DeviceType::CiscoXr => "iosxr",
            DeviceType::CiscoNxos => "nxos",
            DeviceType::AristaEos => "eos",
            DeviceType::CiscoAsa => "asa",
            DeviceType::Unknown => "unknown",
        }
    }

    pub fn from_platform_str(s: &str) -> Self {
        match s {
            "ios" => DeviceType::CiscoIos,
            "iosxe" => DeviceType::CiscoIosXe,
            "iosxr" => DeviceType::CiscoXr,
            "nxos" => DeviceType::CiscoNxos,
            "eos" => DeviceType::AristaEos,
            "asa" => DeviceType::CiscoAsa,
            _ => DeviceType::Unknown,
        }
    }

    /// The command used to turn off paged output, if the family needs one.
    pub fn disable_paging_command(&self) -> &'static str {
        match self {
            DeviceType::CiscoAsa => "terminal pager 0",
            DeviceType::Unknown => "terminal length 0",
            _ => "terminal length 0",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_platform_str())
    }
}

/// Matches `show version` text against the ordered substring table. First
/// match wins; NX-OS is checked before the generic Cisco IOS fallback so a
/// Nexus banner that also happens to contain "Cisco IOS Software" (it does
/// not, but many vendor banners share vocabulary) can never be misread.
pub fn classify_show_version(output: &str) -> DeviceType {
    if output.contains("NX-OS") {
        DeviceType::CiscoNxos
    } else if output.contains("IOS XR") || output.contains("IOS-XR") {
        DeviceType::CiscoXr
    } else if output.contains("Adaptive Security Appliance") {
        DeviceType::CiscoAsa
    } else if output.contains("Arista") {
        DeviceType::AristaEos
    } else if output.contains("IOS-XE") {
        DeviceType::CiscoIosXe
    } else if output.contains("Cisco IOS Software") {
        DeviceType::CiscoIos
    } else {
        DeviceType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nxos_wins_over_ios_substring() {
        let banner = "Cisco Nexus Operating System (NX-OS) Software\nCisco IOS Software variant text";
        assert_eq!(classify_show_version(banner), DeviceType::CiscoNxos);
    }

    #[test]
    fn iosxr_is_detected() {
        assert_eq!(
            classify_show_version("Cisco IOS XR Software, Version 7.3.2"),
            DeviceType::CiscoXr
        );
    }

    #[test]
    fn asa_is_detected() {
        assert_eq!(
            classify_show_version("Cisco Adaptive Security Appliance Software Version 9.16"),
            DeviceType::CiscoAsa
        );
    }

    #[test]
    fn eos_is_detected() {
        assert_eq!(
            classify_show_version("Arista DCS-7050SX3-48YC8\nArista EOS"),
            DeviceType::AristaEos
        );
    }

    #[test]
    fn iosxe_is_detected() {
        assert_eq!(
            classify_show_version("Cisco IOS-XE Software, Version 17.3.4"),
            DeviceType::CiscoIosXe
        );
    }

    #[test]
    fn plain_ios_is_detected() {
        assert_eq!(
            classify_show_version("Cisco IOS Software, C2960 Software"),
            DeviceType::CiscoIos
        );
    }

    #[test]
    fn unrecognized_banner_is_unknown() {
        assert_eq!(classify_show_version("Welcome to some box"), DeviceType::Unknown);
    }

    #[test]
    fn asa_disables_paging_with_pager_command() {
        assert_eq!(DeviceType::CiscoAsa.disable_paging_command(), "terminal pager 0");
    }

    #[test]
    fn ios_disables_paging_with_terminal_length() {
        assert_eq!(DeviceType::CiscoIos.disable_paging_command(), "terminal length 0");
    }
}
