use netctl::{Config, IpVersion, NetCtl, Scope};

use crate::kernel::fake_kernel;

fn netctl() -> NetCtl {
    NetCtl::new(fake_kernel(), Config::default())
}

#[tokio::test]
async fn address_on_new_veth() {
    let _ = tracing_subscriber::fmt::try_init();
    let ctl = netctl();

    ctl.namespaces().create("ns1").await.unwrap();
    assert!(ctl.namespaces().exists("ns1").await.unwrap());

    let (veth, _peer) = ctl.links(Some("ns1")).add_veth("veth0", "veth1", None).await.unwrap();
    veth.addr().add("192.168.45.100/24", Scope::Global, true).await.unwrap();

    let addresses = veth.addr().list(None, &[]).await.unwrap();
    assert_eq!(addresses.len(), 1);

    let addr = &addresses[0];
    assert_eq!(addr.name, "veth0");
    assert_eq!(addr.cidr.to_string(), "192.168.45.100/24");
    assert_eq!(addr.broadcast, Some("192.168.45.255".parse().unwrap()));
    assert_eq!(addr.scope, Scope::Global);
    assert!(!addr.tentative);

    veth.addr()
        .wait_until_ready(addr.ip(), std::time::Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn namespace_is_collected_once_empty() {
    let ctl = netctl();
    let namespaces = ctl.namespaces();
    namespaces.create("ns1").await.unwrap();

    let links = ctl.links(Some("ns1"));
    let (veth, _peer) = links.add_veth("veth0", "veth1", None).await.unwrap();

    assert!(!namespaces.is_empty("ns1").await.unwrap());
    assert!(!namespaces.garbage_collect("ns1").await.unwrap());
    assert_eq!(links.list_devices(false, true).await.unwrap().len(), 3);

    veth.delete().await.unwrap();
    assert!(!veth.exists().await.unwrap());
    assert!(links.list_devices(true, true).await.unwrap().is_empty());

    assert!(namespaces.garbage_collect("ns1").await.unwrap());
    assert!(!namespaces.exists("ns1").await.unwrap());
    assert!(!namespaces.garbage_collect("ns1").await.unwrap());
}

#[tokio::test]
async fn missing_namespace() {
    let ctl = netctl();

    assert!(ctl.links(Some("nsX")).list_devices(true, true).await.unwrap().is_empty());

    let err = ctl
        .device("veth0", Some("nsX"))
        .addr()
        .add("10.0.0.1/24", Scope::Global, true)
        .await
        .unwrap_err();
    assert!(err.is_namespace_not_found(), "{err}");

    let err = ctl.namespaces().delete("nsX").await.unwrap_err();
    assert!(err.is_namespace_not_found(), "{err}");
}

#[tokio::test]
async fn missing_device() {
    let ctl = netctl();
    ctl.namespaces().create("ns1").await.unwrap();

    let dev = ctl.device("veth9", Some("ns1"));
    let err = dev.addr().add("10.0.0.1/24", Scope::Global, true).await.unwrap_err();
    assert!(err.is_device_not_found(), "{err}");
    assert!(!dev.exists().await.unwrap());
    assert!(!dev.ensure_ready().await);
}

#[tokio::test]
async fn rules_are_added_once() {
    let ctl = netctl();
    ctl.namespaces().create("ns1").await.unwrap();
    let rules = ctl.rules(Some("ns1"));

    assert!(rules.add_rule("192.168.45.100", 2u32, Some(101), IpVersion::V4).await.unwrap());
    assert!(!rules.add_rule("192.168.45.100", 2u32, Some(101), IpVersion::V4).await.unwrap());
    assert!(rules.add_rule("10.0.0.0/24", 3u32, None, IpVersion::V4).await.unwrap());
    assert!(!rules.add_rule("10.0.0.0/24", 3u32, None, IpVersion::V4).await.unwrap());

    let listed = rules.list_rules(IpVersion::V4).await.unwrap();
    assert_eq!(listed.len(), 5);
    assert_eq!(listed.iter().filter(|r| r.fields.from == "192.168.45.100").count(), 1);
    assert_eq!(listed.iter().filter(|r| r.fields.from == "10.0.0.0/24").count(), 1);
    assert_eq!(listed[0].fields.from, "0.0.0.0/0");
}
