//! Netlink queries for the host's routing table and interface addresses on Linux
use std::{fmt::Debug, io::ErrorKind, net::IpAddr};

use netlink_packet_core::{
    NetlinkDeserializable, NetlinkMessage, NetlinkPayload, NetlinkSerializable, NLM_F_ACK,
    NLM_F_DUMP, NLM_F_REQUEST,
};
use netlink_packet_route::{
    address::{AddressAttribute, AddressMessage},
    link::{LinkAttribute, LinkMessage},
    route::{RouteAddress, RouteAttribute, RouteHeader, RouteMessage},
    AddressFamily, RouteNetlinkMessage,
};
use netlink_packet_utils::errors::DecodeError;
use netlink_sys::{constants::NETLINK_ROUTE, Socket, SocketAddr};
use thiserror::Error;

use crate::{net::IpAddrMask, GatewayError};

const SOCKET_BUFFER_LENGTH: usize = 12288;

#[derive(Debug, Error)]
pub(crate) enum NetlinkError {
    #[error("Unexpected netlink payload")]
    UnexpectedPayload,
    #[error("Failed to send netlink request")]
    SendFailure,
    #[error("Socket error: {0}")]
    SocketError(String),
    #[error("Failed to read response")]
    ResponseError(#[from] DecodeError),
    #[error("Netlink payload error: {0}")]
    PayloadError(netlink_packet_core::ErrorMessage),
    #[error("No such file")]
    NotFound,
}

impl From<NetlinkError> for GatewayError {
    fn from(error: NetlinkError) -> Self {
        GatewayError::NetlinkError(error.to_string())
    }
}

/// Wrapper `Result` type for Netlink operations
type NetlinkResult<T> = Result<T, NetlinkError>;

/// Default route of the main routing table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DefaultRoute {
    pub gateway: IpAddr,
    pub index: u32,
}

fn netlink_request<I>(
    message: I,
    flags: u16,
    protocol: isize,
) -> NetlinkResult<Vec<NetlinkMessage<I>>>
where
    NetlinkPayload<I>: From<I>,
    I: Clone + Debug + Eq + NetlinkSerializable + NetlinkDeserializable,
{
    let mut req = NetlinkMessage::from(message);

    req.header.flags = flags;
    req.finalize();
    let len = req.buffer_len();
    let mut buf = vec![0u8; len];
    req.serialize(&mut buf);

    let socket = Socket::new(protocol).map_err(|err| {
        error!("Failed to open socket: {err}");
        NetlinkError::SocketError(err.to_string())
    })?;
    let kernel_addr = SocketAddr::new(0, 0);
    socket.connect(&kernel_addr).map_err(|err| {
        error!("Failed to connect to socket: {err}");
        NetlinkError::SocketError(err.to_string())
    })?;
    let n_sent = socket.send(&buf, 0).map_err(|err| {
        error!("Failed to send to socket: {err}");
        NetlinkError::SocketError(err.to_string())
    })?;
    if n_sent != len {
        return Err(NetlinkError::SendFailure);
    }

    let mut responses = Vec::new();
    loop {
        let mut recv_buf = [0; SOCKET_BUFFER_LENGTH];
        let n_received = socket.recv(&mut &mut recv_buf[..], 0).map_err(|err| {
            error!("Failed to receive from socket: {err}");
            NetlinkError::SocketError(err.to_string())
        })?;
        let mut offset = 0;
        loop {
            let response = NetlinkMessage::<I>::deserialize(&recv_buf[offset..])?;
            trace!("Read netlink response from socket: {response:?}");
            match response.payload {
                // We've parsed all parts of the response and can leave the loop.
                NetlinkPayload::Error(msg) if msg.code.is_none() => return Ok(responses),
                NetlinkPayload::Done(_) => return Ok(responses),
                NetlinkPayload::Error(msg) => {
                    return match msg.to_io().kind() {
                        ErrorKind::NotFound => Err(NetlinkError::NotFound),
                        _ => Err(NetlinkError::PayloadError(msg)),
                    }
                }
                _ => {}
            }
            let header_length = response.header.length as usize;
            offset += header_length;
            responses.push(response);
            if offset == n_received || header_length == 0 {
                // We've fully parsed the datagram, but there may be further datagrams
                // with additional netlink response parts.
                break;
            }
        }
    }
}

fn route_messages(responses: Vec<NetlinkMessage<RouteNetlinkMessage>>) -> Vec<RouteNetlinkMessage> {
    responses
        .into_iter()
        .filter_map(|nlmsg| match nlmsg.payload {
            NetlinkPayload::InnerMessage(message) => Some(message),
            _ => {
                debug!("unknown nlmsg response");
                None
            }
        })
        .collect()
}

/// Find the default IPv4 route (gateway and outgoing interface index) of the main table.
pub(crate) fn get_default_route() -> NetlinkResult<Option<DefaultRoute>> {
    let header = RouteHeader {
        address_family: AddressFamily::Inet,
        table: RouteHeader::RT_TABLE_MAIN,
        ..Default::default()
    };
    let mut message = RouteMessage::default();
    message.header = header;
    let responses = netlink_request(
        RouteNetlinkMessage::GetRoute(message),
        NLM_F_REQUEST | NLM_F_DUMP,
        NETLINK_ROUTE,
    )?;

    // Dumps can't be filtered by the kernel, so look for the 0.0.0.0/0 entry here.
    for message in route_messages(responses) {
        let RouteNetlinkMessage::NewRoute(RouteMessage {
            header, attributes, ..
        }) = message
        else {
            continue;
        };
        if header.destination_prefix_length != 0 || header.table != RouteHeader::RT_TABLE_MAIN {
            continue;
        }
        let mut gateway = None;
        let mut index = None;
        for nla in attributes {
            match nla {
                RouteAttribute::Gateway(RouteAddress::Inet(ipv4)) => {
                    gateway = Some(IpAddr::V4(ipv4));
                }
                RouteAttribute::Oif(oif) => index = Some(oif),
                _ => (),
            }
        }
        if let (Some(gateway), Some(index)) = (gateway, index) {
            debug!("Found default route via {gateway} on interface index {index}");
            return Ok(Some(DefaultRoute { gateway, index }));
        }
    }

    Ok(None)
}

/// Get interface name by index.
pub(crate) fn get_interface_name(index: u32) -> NetlinkResult<Option<String>> {
    let mut message = LinkMessage::default();
    message.header.index = index;

    let responses = netlink_request(
        RouteNetlinkMessage::GetLink(message),
        NLM_F_REQUEST | NLM_F_ACK,
        NETLINK_ROUTE,
    )?;

    for message in route_messages(responses) {
        if let RouteNetlinkMessage::NewLink(LinkMessage { attributes, .. }) = message {
            for nla in attributes {
                if let LinkAttribute::IfName(name) = nla {
                    return Ok(Some(name));
                }
            }
        }
    }

    Ok(None)
}

/// Get IPv4 addresses (with prefix length) of the interface with `index`.
pub(crate) fn get_addresses(index: u32) -> NetlinkResult<Vec<IpAddrMask>> {
    let mut message = AddressMessage::default();
    message.header.family = AddressFamily::Inet;
    // The kernel ignores the index on dumps; it is matched below.
    message.header.index = index;

    let responses = netlink_request(
        RouteNetlinkMessage::GetAddress(message),
        NLM_F_REQUEST | NLM_F_DUMP,
        NETLINK_ROUTE,
    )?;

    let mut addresses = Vec::new();
    for message in route_messages(responses) {
        let RouteNetlinkMessage::NewAddress(AddressMessage {
            header, attributes, ..
        }) = message
        else {
            continue;
        };
        if header.index != index {
            continue;
        }
        let address = attributes.into_iter().find_map(|nla| match nla {
            AddressAttribute::Address(addr) => Some(addr),
            _ => None,
        });
        match address {
            Some(ip @ IpAddr::V4(_)) => addresses.push(IpAddrMask::new(ip, header.prefix_len)),
            Some(_) => (),
            None => return Err(NetlinkError::UnexpectedPayload),
        }
    }

    Ok(addresses)
}
