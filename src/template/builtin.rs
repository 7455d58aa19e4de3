//! Built-in unit and script templates.
//!
//! Each template can be overridden by dropping `<id>.tmpl` into the
//! configured template directory.

/// Identifier of the Quadlet container unit template
pub const CONTAINER_UNIT: &str = "container/container";

/// Identifier of the overlay network service template
pub const NETWORK_UNIT: &str = "container/network";

/// Identifier of the namespace attach script template
pub const ATTACH_SCRIPT: &str = "container/attach";

/// Identifier of the overlay peers script template
pub const PEERS_SCRIPT: &str = "container/peers";

const CONTAINER_UNIT_TEMPLATE: &str = "\
[Unit]
Description=Container {{ name }}
Wants=network-online.target
After=network-online.target

[Container]
ContainerName={{ name }}
Image={{ image }}
Network=none
{% for mount in mounts -%}
Volume={{ mount }}
{% endfor -%}
{% for port in ports -%}
PublishPort={{ port }}
{% endfor -%}
{% for variable in environment_variables -%}
Environment={{ variable }}
{% endfor %}
[Service]
ExecStartPost={{ attach_script }}
Restart=always

[Install]
WantedBy=multi-user.target
";

const NETWORK_UNIT_TEMPLATE: &str = "\
[Unit]
Description=Overlay network {{ network }}
Wants=network-online.target
After=network-online.target

[Service]
Type=oneshot
RemainAfterExit=yes
Environment=SUBNET={{ subnet_cidr_block }}
ExecStartPre=-/usr/sbin/ip netns delete {{ namespace }}
ExecStart=/usr/sbin/ip netns add {{ namespace }}
ExecStart=/usr/sbin/ip netns exec {{ namespace }} ip link add br0 type bridge
ExecStart=/usr/sbin/ip netns exec {{ namespace }} ip link set br0 up
ExecStart=/usr/sbin/ip link add vxlan{{ vxlan_id }} type vxlan id {{ vxlan_id }} dstport 4789 nolearning
ExecStart=/usr/sbin/ip link set vxlan{{ vxlan_id }} netns {{ namespace }}
ExecStart=/usr/sbin/ip netns exec {{ namespace }} ip link set vxlan{{ vxlan_id }} master br0 up
ExecStart={{ peers_script }}
ExecStop=/usr/sbin/ip netns delete {{ namespace }}

[Install]
WantedBy=multi-user.target
";

const ATTACH_SCRIPT_TEMPLATE: &str = "\
#!/bin/sh
set -eu

NAMESPACE={{ namespace }}
CONTAINER={{ name }}
PID=$(podman inspect --format '{% raw %}{{.State.Pid}}{% endraw %}' \"$CONTAINER\")

mkdir -p /var/run/netns
ln -sfT \"/proc/$PID/ns/net\" \"/var/run/netns/$CONTAINER\"

ip netns exec \"$NAMESPACE\" ip link add \"ve-$CONTAINER\" type veth peer name eth0 netns \"$CONTAINER\"
ip netns exec \"$NAMESPACE\" ip link set \"ve-$CONTAINER\" master br0 up
ip netns exec \"$CONTAINER\" ip link set eth0 address {{ mac_address }}
ip netns exec \"$CONTAINER\" ip addr add {{ ip_address }}/{{ netmask }} dev eth0
ip netns exec \"$CONTAINER\" ip link set eth0 up
";

const PEERS_SCRIPT_TEMPLATE: &str = "\
#!/bin/sh
set -eu

# overlay {{ network }}, vni {{ vxlan_id }}
{% for peer in peers -%}
ip netns exec {{ namespace }} bridge fdb append 00:00:00:00:00:00 dev vxlan{{ vxlan_id }} dst {{ peer }}
{% endfor -%}
";

/// Every built-in template as `(identifier, source)`
pub const ALL: [(&str, &str); 4] = [
    (CONTAINER_UNIT, CONTAINER_UNIT_TEMPLATE),
    (NETWORK_UNIT, NETWORK_UNIT_TEMPLATE),
    (ATTACH_SCRIPT, ATTACH_SCRIPT_TEMPLATE),
    (PEERS_SCRIPT, PEERS_SCRIPT_TEMPLATE),
];
