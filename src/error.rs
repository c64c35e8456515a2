//! Error taxonomy for the core.
//!
//! Per spec, almost nothing the protocol engine encounters is fatal: bad
//! frames are dropped, retries happen silently, tables that are full just
//! log and move on. The only thing that can genuinely fail here is the SPI
//! transaction to the NIC itself, which the original AVR firmware had no
//! way to observe (register writes over bit-banged SPI couldn't fail) but
//! a real `embedded_hal::spi::SpiDevice` can.

use core::fmt;

/// Failure talking to the ENC28J60 over SPI, or a malfunction it reported.
#[derive(Debug)]
pub enum NicError<E> {
    /// The underlying SPI transaction failed.
    Spi(E),
    /// `EREVID` read back as zero, suggesting the chip never came out of
    /// reset or isn't present on the bus.
    NotPresent,
    /// A transmission was aborted by the MAC (`ESTAT.TXABRT`); cleared and
    /// surfaced so the caller can count/log it, per spec.md's "transient
    /// transmit error" disposition.
    TransmitAborted,
}

impl<E: fmt::Debug> fmt::Display for NicError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NicError::Spi(e) => write!(f, "SPI transaction failed: {:?}", e),
            NicError::NotPresent => write!(f, "ENC28J60 not responding on SPI bus"),
            NicError::TransmitAborted => write!(f, "transmit aborted by MAC"),
        }
    }
}
