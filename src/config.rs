//! Compile-time configuration surface.
//!
//! Everything here is a `const`, matching spec.md §6's "compile-time
//! configuration surface only" — there is no runtime config file or CLI to
//! parse, this is firmware flashed once per device.

/// Usable payload size of `buffer_in`; the backing array is one byte
/// larger to hold the trailing NUL sentinel the NIC driver writes.
pub const MTU_IN: usize = 1500;
/// Usable payload size of `buffer_out`.
pub const MTU_OUT: usize = 1500;

/// Capacity of the ARP cache.
pub const N_ARP: usize = 10;
/// Capacity of each port-service table (UDP ports, TCP ports, HTTP paths).
pub const N_PORTS: usize = 8;

/// Hostname DHCP option 12 advertises, if non-empty.
pub const DHCP_HOSTNAME: &str = "";
