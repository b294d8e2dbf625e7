use crate::parse_output::{self, ParseOutputResult};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

/// Maps the crawler's internal platform strings to the TextFSM template
/// library's vendor naming convention. `iosxe` intentionally shares `ios`'s
/// templates since IOS-XE `show` output is compatible with classic IOS.
/// Anything not in the table is passed through unchanged.
fn map_platform(platform: &str) -> String {
    match platform {
        "ios" => "cisco_ios".to_string(),
        "iosxe" => "cisco_ios".to_string(),
        "iosxr" => "cisco_xr".to_string(),
        "nxos" => "cisco_nxos".to_string(),
        "eos" => "arista_eos".to_string(),
        "asa" => "cisco_asa".to_string(),
        other => other.to_string(),
    }
}

/// Parses raw command output into structured records for the given internal
/// platform string. Never propagates a parser exception: any failure is
/// logged and folded into `Ok(None)` so the caller always has the raw text to
/// fall back on.
pub fn parse(platform: &str, command: &str, raw: &str) -> Option<Vec<IndexMap<String, Value>>> {
    let mapped = map_platform(platform);
    let result: ParseOutputResult<Option<Vec<IndexMap<String, Value>>>> =
        parse_output::parse_output(&mapped, command, raw);

    match result {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                "parser adapter: failed to parse '{}' output for platform '{}' (mapped '{}'): {}",
                command, platform, mapped, e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ios_and_iosxe_share_the_cisco_ios_template_set() {
        assert_eq!(map_platform("ios"), "cisco_ios");
        assert_eq!(map_platform("iosxe"), "cisco_ios");
    }

    #[test]
    fn each_known_platform_maps_to_its_vendor_name() {
        assert_eq!(map_platform("iosxr"), "cisco_xr");
        assert_eq!(map_platform("nxos"), "cisco_nxos");
        assert_eq!(map_platform("eos"), "arista_eos");
        assert_eq!(map_platform("asa"), "cisco_asa");
    }

    #[test]
    fn unmapped_platform_passes_through_unchanged() {
        assert_eq!(map_platform("juniper_junos"), "juniper_junos");
    }

    #[test]
    fn missing_template_returns_none_without_panicking() {
        let result = parse("unknown", "show version", "some raw text");
        assert!(result.is_none());
    }
}
