//! Reliable unicast delivery with recovery.
//!
//! Wraps the raw data-request command with an end-to-end confirmation wait
//! and a bounded retry ladder. Each confirmation failure code gets a
//! targeted remedy before the next attempt: congestion codes back off,
//! a repeated transaction expiry evicts a stale parent-table entry, a
//! missing acknowledgement re-resolves the short address and rediscovers
//! the route.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::driver::{Driver, RequestOptions};
use crate::error::{Result, ZnpError};
use crate::framing::Direction;
use crate::payload::Payload;
use crate::schema::Subsystem;
use crate::status::FailureKind;
use crate::waitress::Matcher;

/// Pause after congestion-style failures before retrying.
const COOL_DOWN: Duration = Duration::from_secs(2);

/// Pause after issuing a route discovery so it can propagate.
const ROUTE_SETTLE: Duration = Duration::from_secs(3);

/// Upper bound on send attempts, the first included.
const MAX_ATTEMPTS: u8 = 5;

/// Node-relation marker for an entry absent from the parent table.
const NO_RELATION: u8 = 0xff;

/// Short-address marker for an unresolved table entry.
const INVALID_ADDRESS: u16 = 0xfffe;

/// Where a payload goes.
#[derive(Debug, Clone, Copy)]
pub struct Destination {
    /// Stable extended address.
    pub ieee: [u8; 8],
    /// Current short address; may be refreshed during recovery.
    pub network_address: u16,
    pub endpoint: u8,
}

/// Per-send knobs.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Deadline for each confirmation wait.
    pub timeout: Duration,
    /// Fail on the first unsuccessful confirmation instead of recovering.
    pub disable_recovery: bool,
    /// Network-layer hop budget.
    pub radius: u8,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            disable_recovery: false,
            radius: 30,
        }
    }
}

/// Association-table entry saved before eviction, restored on success.
struct EvictedAssociation {
    network_address: u16,
    node_relation: u8,
}

/// Reliable sender over a [`Driver`].
pub struct Delivery {
    driver: Driver,
    transaction_id: u8,
}

impl Delivery {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            transaction_id: 0,
        }
    }

    /// Transaction identifiers run 1..=255 and wrap; zero is never issued
    /// so a zeroed confirmation cannot alias a live send.
    fn next_transaction_id(&mut self) -> u8 {
        self.transaction_id = if self.transaction_id >= 255 {
            1
        } else {
            self.transaction_id + 1
        };
        self.transaction_id
    }

    /// Send one payload and wait for its end-to-end confirmation,
    /// recovering from transient failures up to the attempt budget.
    pub async fn send(
        &mut self,
        destination: Destination,
        source_endpoint: u8,
        cluster: u16,
        data: &[u8],
        options: DeliveryOptions,
    ) -> Result<()> {
        let mut destination = destination;
        let mut attempt: u8 = 0;
        let mut confirm_retried = false;
        let mut discovered_route = false;
        let mut checked_network_address = false;
        let mut association_checked = false;
        let mut evicted: Option<EvictedAssociation> = None;

        loop {
            let transaction_id = self.next_transaction_id();

            let confirm = self.driver.wait_for(
                Matcher::new(Direction::Areq, Subsystem::Af, "dataConfirm")
                    .with("transid", transaction_id),
                options.timeout,
            );

            let request = Payload::new()
                .with("dstaddr", destination.network_address)
                .with("destendpoint", destination.endpoint)
                .with("srcendpoint", source_endpoint)
                .with("clusterid", cluster)
                .with("transid", transaction_id)
                .with("options", 0u8)
                .with("radius", options.radius)
                .with("len", data.len() as u8)
                .with("data", Bytes::copy_from_slice(data));

            let request_options = RequestOptions {
                cleanup_waiter: Some(confirm.id()),
                ..RequestOptions::default()
            };
            if let Err(err) = self
                .driver
                .request_with(Subsystem::Af, "dataRequest", request, request_options)
                .await
            {
                // Status rejections already unregistered the waiter via
                // the cleanup id; other failures have not.
                if !matches!(err, ZnpError::StatusRejected { .. }) {
                    confirm.cancel();
                }
                return Err(err);
            }

            let code = match confirm.receive().await {
                Ok(confirmation) => confirmation.payload.u8("status")?,
                Err(ZnpError::Timeout { .. }) if !confirm_retried => {
                    // A lost confirmation gets exactly one blind retry.
                    warn!(transaction_id, "confirmation timed out, retrying once");
                    confirm_retried = true;
                    continue;
                }
                Err(ZnpError::Timeout { .. }) => {
                    return Err(ZnpError::DeliveryFailed {
                        kind: FailureKind::ConfirmTimeout,
                        code: 0,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => return Err(err),
            };

            if code == 0 {
                // An evicted entry stays out: the device re-associates on
                // its own once traffic flows again.
                return Ok(());
            }

            let kind = FailureKind::from_status(code);
            debug!(
                transaction_id,
                code,
                attempt,
                failure = %kind,
                "delivery attempt failed"
            );

            if attempt + 1 >= MAX_ATTEMPTS || options.disable_recovery || !kind.is_recoverable() {
                return Err(ZnpError::DeliveryFailed {
                    kind,
                    code,
                    attempts: attempt + 1,
                });
            }

            // The entry evicted for the previous attempt did not unblock
            // the device; put it back before recovering further.
            if let Some(association) = evicted.take() {
                self.restore_association(&destination, association).await;
            }

            // Escalating recovery: the first failure only backs off, each
            // remedy afterwards runs at most once per send.
            match kind {
                FailureKind::ChannelAccess
                | FailureKind::BufferFull
                | FailureKind::NoResources => {
                    tokio::time::sleep(COOL_DOWN).await;
                }
                FailureKind::TransactionExpired if attempt >= 1 && !association_checked => {
                    // A stale parent-table entry keeps swallowing the
                    // indirect transmission.
                    association_checked = true;
                    evicted = self.evict_association(&destination).await;
                }
                _ if attempt >= 1 && !discovered_route => {
                    discovered_route = true;
                    self.discover_route(destination.network_address, options.radius)
                        .await;
                }
                FailureKind::NoAck if attempt >= 1 && !checked_network_address => {
                    checked_network_address = true;
                    if let Some(current) = self.lookup_network_address(&destination.ieee).await {
                        if current != destination.network_address {
                            debug!(
                                old = destination.network_address,
                                new = current,
                                "short address moved"
                            );
                            destination.network_address = current;
                        }
                    }
                }
                _ => {
                    tokio::time::sleep(COOL_DOWN).await;
                }
            }

            attempt += 1;
        }
    }

    /// Kick off a route discovery and give it time to settle.
    async fn discover_route(&self, network_address: u16, radius: u8) {
        let payload = Payload::new()
            .with("dstAddr", network_address)
            .with("options", 0u8)
            .with("radius", radius);
        if let Err(err) = self
            .driver
            .request(Subsystem::Zdo, "extRouteDisc", payload)
            .await
        {
            warn!(error = %err, "route discovery failed");
            return;
        }
        tokio::time::sleep(ROUTE_SETTLE).await;
    }

    /// Remove the destination from the parent's association table,
    /// remembering enough to put it back after a successful send.
    async fn evict_association(&self, destination: &Destination) -> Option<EvictedAssociation> {
        let lookup = Payload::new()
            .with("extaddr", destination.ieee)
            .with("nwkaddr", destination.network_address);
        let reply = match self
            .driver
            .request_expect_reply(Subsystem::Util, "assocGetWithAddress", lookup)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "association lookup failed");
                return None;
            }
        };

        let node_relation = reply.payload.u8("noderelation").ok()?;
        let table_address = reply.payload.u16("nwkaddr").ok()?;
        if node_relation == NO_RELATION || table_address == INVALID_ADDRESS {
            return None;
        }

        let remove = Payload::new().with("ieeeadr", destination.ieee);
        if let Err(err) = self
            .driver
            .request(Subsystem::Util, "assocRemove", remove)
            .await
        {
            warn!(error = %err, "association removal failed");
            return None;
        }

        Some(EvictedAssociation {
            network_address: destination.network_address,
            node_relation,
        })
    }

    async fn restore_association(&self, destination: &Destination, evicted: EvictedAssociation) {
        let payload = Payload::new()
            .with("ieeeadr", destination.ieee)
            .with("nwkaddr", evicted.network_address)
            .with("noderelation", evicted.node_relation);
        if let Err(err) = self.driver.request(Subsystem::Util, "assocAdd", payload).await {
            warn!(error = %err, "association restore failed");
        }
    }

    /// Ask the network for the device's current short address.
    async fn lookup_network_address(&self, ieee: &[u8; 8]) -> Option<u16> {
        let response = self.driver.wait_for(
            Matcher::new(Direction::Areq, Subsystem::Zdo, "nwkAddrRsp").with("ieeeaddr", *ieee),
            Duration::from_secs(10),
        );

        let request = Payload::new()
            .with("ieeeaddr", *ieee)
            .with("reqtype", 0u8)
            .with("startindex", 0u8);
        let options = RequestOptions {
            cleanup_waiter: Some(response.id()),
            ..RequestOptions::default()
        };
        if let Err(err) = self
            .driver
            .request_with(Subsystem::Zdo, "nwkAddrReq", request, options)
            .await
        {
            warn!(error = %err, "address lookup request failed");
            if !matches!(err, ZnpError::StatusRejected { .. }) {
                response.cancel();
            }
            return None;
        }

        match response.receive().await {
            Ok(rsp) => rsp.payload.u16("nwkaddr").ok(),
            Err(err) => {
                warn!(error = %err, "address lookup response missed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::framing::CodecKind;

    use super::*;

    #[tokio::test]
    async fn test_transaction_ids_skip_zero_and_wrap() {
        let (client, _server) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let mut delivery = Delivery::new(Driver::new(reader, writer, CodecKind::LengthPrefixed));

        assert_eq!(delivery.next_transaction_id(), 1);
        assert_eq!(delivery.next_transaction_id(), 2);

        delivery.transaction_id = 255;
        assert_eq!(delivery.next_transaction_id(), 1);
    }
}
