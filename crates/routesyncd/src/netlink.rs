//! Netlink route event source
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Kernel interface for routing state
//! - SI-4: System Monitoring - Monitor route table changes
//! - CP-10: System Recovery - Initial table dump on startup

#[cfg(target_os = "linux")]
mod linux {
    use crate::error::{Result, RoutesyncError};
    use crate::source::{RouteEventSource, SubscribeOptions, forward};
    use crate::types::{
        AddressFamily, MultipathHop, RouteChangeEvent, RouteChangeType, RoutePrefix,
    };
    use netlink_packet_core::{NetlinkHeader, NLM_F_DUMP, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload};
    use netlink_packet_route::RouteNetlinkMessage;
    use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
    use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
    use std::net::IpAddr;
    use std::os::fd::AsRawFd;
    use tokio::io::unix::AsyncFd;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, error, instrument, trace, warn};

    /// RTNLGRP_IPV4_ROUTE
    const RTNLGRP_IPV4_ROUTE: u32 = 7;
    /// RTNLGRP_IPV6_ROUTE
    const RTNLGRP_IPV6_ROUTE: u32 = 11;

    /// Socket receive buffer size (1MB) for full-table dumps and route storms
    /// NIST: SC-5 - DoS protection via adequate buffer sizing
    const SOCKET_RECV_BUFFER_SIZE: usize = 1024 * 1024;

    /// Capacity of the per-datagram receive buffer
    const RECV_BUFFER_CAPACITY: usize = 64 * 1024;

    /// Kernel route events from a `NETLINK_ROUTE` socket
    ///
    /// # NIST Controls
    /// - AC-3: Access Enforcement - Multicast membership may require CAP_NET_ADMIN
    #[derive(Debug, Default)]
    pub struct NetlinkRouteSource {
        subscribed: bool,
    }

    impl NetlinkRouteSource {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl RouteEventSource for NetlinkRouteSource {
        #[instrument(skip_all, fields(list_existing = options.list_existing))]
        fn subscribe(
            &mut self,
            events: mpsc::Sender<RouteChangeEvent>,
            stop: CancellationToken,
            options: SubscribeOptions,
        ) -> Result<()> {
            if self.subscribed {
                return Err(RoutesyncError::Lifecycle("source already subscribed".into()));
            }

            let socket = RouteSocket::open()?;
            if options.list_existing {
                socket.request_dump()?;
            }
            let reader = AsyncRouteSocket::new(socket)?;
            self.subscribed = true;

            tokio::spawn(reader.run(events, stop));
            Ok(())
        }
    }

    /// Bound, non-blocking netlink socket
    struct RouteSocket {
        socket: Socket,
    }

    impl RouteSocket {
        fn open() -> Result<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| RoutesyncError::Netlink(format!("Failed to create socket: {}", e)))?;

            let groups = (1 << (RTNLGRP_IPV4_ROUTE - 1)) | (1 << (RTNLGRP_IPV6_ROUTE - 1));
            socket
                .bind(&SocketAddr::new(0, groups))
                .map_err(|e| RoutesyncError::Netlink(format!("Failed to bind socket: {}", e)))?;
            socket.set_non_blocking(true).map_err(|e| {
                RoutesyncError::Netlink(format!("Failed to set non-blocking mode: {}", e))
            })?;

            debug!("Netlink socket bound to RTNLGRP_IPV4_ROUTE | RTNLGRP_IPV6_ROUTE");

            let route_socket = Self { socket };
            route_socket.tune_socket();
            Ok(route_socket)
        }

        /// Enlarge the receive buffer; failure only costs headroom
        fn tune_socket(&self) {
            let fd = self.socket.as_raw_fd();
            let size = SOCKET_RECV_BUFFER_SIZE as libc::c_int;
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &size as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                warn!("Failed to set SO_RCVBUF, using default buffer size");
            } else {
                debug!(size = SOCKET_RECV_BUFFER_SIZE, "Set socket receive buffer");
            }
        }

        /// Ask the kernel for every installed route (RTM_GETROUTE dump)
        fn request_dump(&self) -> Result<()> {
            let mut header = NetlinkHeader::default();
            header.flags = NLM_F_REQUEST | NLM_F_DUMP;

            let payload = RouteNetlinkMessage::GetRoute(RouteMessage::default());
            let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(payload));
            packet.finalize();

            let mut buf = vec![0u8; packet.buffer_len()];
            packet.serialize(&mut buf);

            self.socket.send(&buf, 0).map_err(|e| {
                RoutesyncError::Netlink(format!("Failed to send dump request: {}", e))
            })?;

            debug!("Requested route table dump");
            Ok(())
        }
    }

    /// Route socket registered with the tokio reactor
    struct AsyncRouteSocket {
        inner: AsyncFd<Socket>,
        buffer: Vec<u8>,
    }

    impl AsyncRouteSocket {
        fn new(socket: RouteSocket) -> Result<Self> {
            let inner = AsyncFd::new(socket.socket).map_err(|e| {
                RoutesyncError::Netlink(format!("Failed to create AsyncFd: {}", e))
            })?;
            Ok(Self {
                inner,
                buffer: Vec::with_capacity(RECV_BUFFER_CAPACITY),
            })
        }

        /// Forward events until `stop` fires or the receiver goes away
        async fn run(mut self, events: mpsc::Sender<RouteChangeEvent>, stop: CancellationToken) {
            loop {
                let batch = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    batch = self.recv_batch() => batch,
                };

                match batch {
                    Ok(batch) => {
                        for event in batch {
                            if !forward(&events, &stop, event).await {
                                debug!("Route event receiver closed");
                                return;
                            }
                        }
                    }
                    Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                        error!("Netlink receive buffer overrun, route updates were lost");
                    }
                    Err(e) => {
                        error!(error = %e, "Netlink receive failed, stopping route source");
                        return;
                    }
                }
            }

            debug!("Netlink route source stopped");
        }

        /// Wait for one datagram and parse it
        async fn recv_batch(&mut self) -> std::io::Result<Vec<RouteChangeEvent>> {
            loop {
                let mut guard = self.inner.readable().await?;
                self.buffer.clear();

                match guard.try_io(|inner| inner.get_ref().recv(&mut self.buffer, 0)) {
                    Ok(Ok(_)) => return Ok(parse_datagram(&self.buffer)),
                    Ok(Err(e)) => return Err(e),
                    // Spurious wakeup, readiness already cleared
                    Err(_would_block) => continue,
                }
            }
        }
    }

    /// Length of a netlink header (`struct nlmsghdr`)
    const NLMSG_HDRLEN: usize = 16;

    /// `nlmsg_len` of the message at the start of `buffer`, if it is usable
    fn message_length(buffer: &[u8]) -> Option<usize> {
        let bytes: [u8; 4] = buffer.get(..4)?.try_into().ok()?;
        let length = u32::from_ne_bytes(bytes) as usize;
        (NLMSG_HDRLEN..=buffer.len()).contains(&length).then_some(length)
    }

    /// Parse every route message in one netlink datagram.
    ///
    /// A message whose body fails to decode is skipped. Only a broken
    /// header ends the datagram early.
    pub(crate) fn parse_datagram(buffer: &[u8]) -> Vec<RouteChangeEvent> {
        let mut events = Vec::new();
        let mut offset = 0;

        while offset < buffer.len() {
            let Some(length) = message_length(&buffer[offset..]) else {
                warn!(offset, "Malformed netlink header, dropping rest of datagram");
                break;
            };
            let message = &buffer[offset..offset + length];
            // Align to 4 bytes (netlink alignment requirement)
            offset = (offset + length + 3) & !3;

            let msg = match NetlinkMessage::<RouteNetlinkMessage>::deserialize(message) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, length, "Skipping undecodable netlink message");
                    continue;
                }
            };

            let parsed = match msg.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(route)) => {
                    route_event_from_message(RouteChangeType::New, &route)
                }
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelRoute(route)) => {
                    route_event_from_message(RouteChangeType::Delete, &route)
                }
                NetlinkPayload::Done(_) => {
                    trace!("Route table dump complete");
                    continue;
                }
                NetlinkPayload::Error(e) => {
                    warn!(error = ?e, "Netlink error message");
                    continue;
                }
                _ => continue,
            };

            match parsed {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Skipping route message"),
            }
        }

        trace!(count = events.len(), "Received route events");
        events
    }

    /// Convert an RTM_NEWROUTE / RTM_DELROUTE body into a [`RouteChangeEvent`]
    ///
    /// An absent `RTA_DST` means the default route. A present but unusable
    /// one is an error, never a default route.
    pub fn route_event_from_message(
        change: RouteChangeType,
        msg: &RouteMessage,
    ) -> Result<RouteChangeEvent> {
        let family = AddressFamily::from_raw(u8::from(msg.header.address_family));
        let mut event = RouteChangeEvent::new(change, family);
        // RTA_TABLE, when present, supersedes the 8-bit header field
        event.table = u32::from(msg.header.table);

        for attr in &msg.attributes {
            match attr {
                RouteAttribute::Table(table) => event.table = *table,
                RouteAttribute::Destination(addr) => {
                    let address = route_address(addr).ok_or_else(|| {
                        RoutesyncError::InvalidPrefix(format!("unsupported destination {:?}", addr))
                    })?;
                    event.destination = Some(RoutePrefix::new(
                        address,
                        msg.header.destination_prefix_length,
                    )?);
                }
                RouteAttribute::Gateway(addr) => event.gateway = route_address(addr),
                RouteAttribute::Oif(ifindex) => event.out_ifindex = *ifindex,
                RouteAttribute::MultiPath(hops) => {
                    event.multipath = hops
                        .iter()
                        .map(|hop| MultipathHop {
                            gateway: hop.attributes.iter().find_map(|attr| match attr {
                                RouteAttribute::Gateway(addr) => route_address(addr),
                                _ => None,
                            }),
                            out_ifindex: hop.interface_index,
                        })
                        .collect();
                }
                _ => {}
            }
        }

        Ok(event)
    }

    fn route_address(addr: &RouteAddress) -> Option<IpAddr> {
        match addr {
            RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
            RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
            _ => None,
        }
    }

}

#[cfg(target_os = "linux")]
pub use linux::*;

/// Stand-in for non-Linux platforms (development only)
#[cfg(not(target_os = "linux"))]
mod mock {
    use crate::error::{Result, RoutesyncError};
    use crate::source::{RouteEventSource, SubscribeOptions};
    use crate::types::RouteChangeEvent;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Default)]
    pub struct NetlinkRouteSource;

    impl NetlinkRouteSource {
        pub fn new() -> Self {
            Self
        }
    }

    impl RouteEventSource for NetlinkRouteSource {
        fn subscribe(
            &mut self,
            _events: mpsc::Sender<RouteChangeEvent>,
            _stop: CancellationToken,
            _options: SubscribeOptions,
        ) -> Result<()> {
            Err(RoutesyncError::Netlink(
                "route subscription requires Linux netlink".into(),
            ))
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use mock::*;
