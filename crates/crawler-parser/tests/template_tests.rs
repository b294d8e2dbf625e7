use crawler_parser::parse;

const IOS_SHOW_VERSION: &str = "\
Cisco IOS Software, C3560 Software (C3560-IPSERVICESK9-M), Version 15.0(2)SE11, RELEASE SOFTWARE (fc3)
Technical Support: http://www.cisco.com/techsupport
Copyright (c) 1986-2018 by Cisco Systems, Inc.

sw1 uptime is 3 weeks, 2 days, 22 hours, 4 minutes
System returned to ROM by power-on

Model number             : WS-C3560-24TS-S
System serial number     : FOC1234A5BC
";

const IOS_SHOW_CDP_NEIGHBORS_DETAIL: &str = "\
-------------------------
Device ID: sw2.example.com
Entry address(es):
  IP address: 10.0.0.2
Platform: cisco WS-C3560-24TS-S,  Capabilities: Switch IGMP
Interface: GigabitEthernet0/1,  Port ID (outgoing port): GigabitEthernet0/24
Holdtime : 145 sec

Total cdp entries displayed : 1
";

const NXOS_SHOW_VERSION: &str = "\
Cisco Nexus Operating System (NX-OS) Software
Software
  BIOS: version 07.69
  NXOS: version 9.3(8)
Hardware
  cisco Nexus9000 C93180YC-EX Chassis
  Device name: n9k-core1

  Kernel uptime is 45 day(s), 3 hour(s)

Processor Board ID FDO12345ABC
";

#[test]
fn ios_show_version_extracts_hostname_and_serial() {
    let result = parse("ios", "show version", IOS_SHOW_VERSION).expect("template should parse");
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get("HOSTNAME").unwrap(), "sw1");
    assert_eq!(result[0].get("SERIAL").unwrap(), "FOC1234A5BC");
}

#[test]
fn ios_cdp_neighbors_detail_extracts_one_neighbor() {
    let result = parse(
        "ios",
        "show cdp neighbors detail",
        IOS_SHOW_CDP_NEIGHBORS_DETAIL,
    )
    .expect("template should parse");
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get("NEIGHBOR_NAME").unwrap(), "sw2.example.com");
    assert_eq!(result[0].get("MGMT_ADDRESS").unwrap(), "10.0.0.2");
    assert_eq!(result[0].get("LOCAL_INTERFACE").unwrap(), "GigabitEthernet0/1");
}

#[test]
fn nxos_show_version_extracts_hostname_and_serial() {
    let result = parse("nxos", "show version", NXOS_SHOW_VERSION).expect("template should parse");
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get("HOSTNAME").unwrap(), "n9k-core1");
    assert_eq!(result[0].get("SERIAL").unwrap(), "FDO12345ABC");
}

#[test]
fn unknown_platform_returns_none() {
    assert!(parse("junos", "show version", IOS_SHOW_VERSION).is_none());
}
