//! The ENC28J60 driver: bank-aware register access, PHY access, the
//! transmit/receive procedures and the init sequence of spec.md §4.1.
//!
//! Structured the way the reference ENC28J60 driver in the example pack
//! shapes its `Enc28j60<SPI, INT, RST>` type over `embedded-hal` traits,
//! but the register choices, init sequence, and receive/transmit procedure
//! follow spec.md §4.1 exactly rather than that reference's own defaults.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Operation, SpiDevice};

use crate::error::NicError;
use crate::nic::registers::*;

/// Dual-port packet RAM split: receive ring occupies the low half, the
/// transmit buffer the high half. Matches the 8 KiB of RAM the ENC28J60
/// exposes; `RXSTOP_INIT` is deliberately odd (required by the B4 errata
/// this driver works around in [`Enc28j60::poll_receive`]).
const RXSTART_INIT: u16 = 0x0000;
const RXSTOP_INIT: u16 = 0x0FFF;
const TXSTART_INIT: u16 = 0x1000;
const TXSTOP_INIT: u16 = 0x1FFF;

/// A banked ENC28J60 driven over `embedded-hal`'s `SpiDevice`.
///
/// `RST` is the chip's hardware reset pin. There is no interrupt pin here:
/// the dispatch loop polls [`Enc28j60::poll_receive`] every iteration
/// rather than waiting on `INT`, so nothing in the core needs to own it.
pub struct Enc28j60<SPI, RST> {
    spi: SPI,
    reset: RST,
    bank: Option<Bank>,
    next_packet_ptr: u16,
}

impl<SPI, RST, E> Enc28j60<SPI, RST>
where
    SPI: SpiDevice<Error = E>,
    RST: OutputPin,
{
    pub fn new(spi: SPI, reset: RST) -> Self {
        Enc28j60 {
            spi,
            reset,
            bank: None,
            next_packet_ptr: RXSTART_INIT,
        }
    }

    /// Step 1-2 and the remainder of spec.md §4.1's initialization
    /// sequence: hard reset, soft reset, ring pointers, receive filter,
    /// MAC configuration, the station address, PHY setup, and finally
    /// enabling reception.
    pub fn init<D: DelayNs>(
        &mut self,
        my_mac: &[u8; 6],
        delay: &mut D,
    ) -> Result<(), NicError<E>> {
        self.reset.set_low().map_err(|_| NicError::NotPresent)?;
        delay.delay_us(1);
        self.reset.set_high().map_err(|_| NicError::NotPresent)?;
        delay.delay_ms(20);

        self.soft_reset()?;
        delay.delay_ms(20);

        let revision = self.read_control(EREVID)?;
        if revision == 0 {
            return Err(NicError::NotPresent);
        }

        // Step 3: bank 0 ring pointers.
        self.write_u16(ETXSTL, ETXSTH, TXSTART_INIT)?;
        self.write_u16(ETXNDL, ETXNDH, TXSTOP_INIT)?;
        self.write_u16(ERXSTL, ERXSTH, RXSTART_INIT)?;
        self.write_u16(ERXNDL, ERXNDH, RXSTOP_INIT)?;
        self.write_u16(ERXRDPTL, ERXRDPTH, RXSTART_INIT)?;
        self.next_packet_ptr = RXSTART_INIT;

        // Step 4: bank 1, unicast + CRC + pattern-match filter, tuned to
        // admit ARP broadcast while leaving general broadcast (BCEN) off.
        self.write_control(ERXFCON, ERXFCON_UCEN | ERXFCON_CRCEN | ERXFCON_PMEN)?;
        self.write_control(EPMM0, 0x3F)?;
        self.write_control(EPMM1, 0x30)?;
        self.write_u16(EPMCSL, EPMCSH, 0xF7F9)?;

        // Step 5: bank 2, MAC configuration.
        self.write_control(MACON1, MACON1_MARXEN | MACON1_TXPAUS | MACON1_RXPAUS)?;
        self.write_control(MACON3, MACON3_PADCFG_FULL | MACON3_TXCRCEN | MACON3_FRMLNEN)?;
        self.write_control(MACON4, 0x00)?;
        self.write_control(MABBIPG, 0x12)?;
        self.write_u16(MAIPGL, MAIPGH, 0x0C12)?;
        self.write_u16(MAMXFLL, MAMXFLH, crate::config::MTU_IN as u16)?;

        // Step 6: bank 3, station address.
        self.write_control(MAADR1, my_mac[0])?;
        self.write_control(MAADR2, my_mac[1])?;
        self.write_control(MAADR3, my_mac[2])?;
        self.write_control(MAADR4, my_mac[3])?;
        self.write_control(MAADR5, my_mac[4])?;
        self.write_control(MAADR6, my_mac[5])?;

        // Step 7: PHY, disable loopback during half duplex, link/activity LEDs.
        self.write_phy(PhyRegister::Phcon2, 0x0100)?;
        self.write_phy(PhyRegister::Phlcon, 0x0476)?;

        // Step 8: enable interrupts and reception.
        self.write_control(EIE, EIE_INTIE | EIE_PKTIE)?;
        self.write_control(ECON1, ECON1_RXEN)?;
        self.write_control(ECOCON, 0)?;
        delay.delay_us(60);

        Ok(())
    }

    /// `EREVID` with the documented B7 display offset: revision 6 is
    /// reported by the silicon but must read as "B7" in logs/diagnostics.
    pub fn revision(&mut self) -> Result<u8, NicError<E>> {
        let raw = self.read_control(EREVID)?;
        Ok(if raw > 5 { raw + 1 } else { raw })
    }

    pub fn status(&mut self) -> Result<u8, NicError<E>> {
        self.read_phy(PhyRegister::Phstat1).map(|v| v as u8)
    }

    pub fn is_link_up(&mut self) -> Result<bool, NicError<E>> {
        Ok(self.read_phy(PhyRegister::Phstat1)? & 0x0004 != 0)
    }

    pub fn broadcast(&mut self, enable: bool) -> Result<(), NicError<E>> {
        let current = self.read_control(ERXFCON)?;
        let next = if enable {
            current | 0x01
        } else {
            current & !0x01
        };
        self.write_control(ERXFCON, next)
    }

    /// Transmit `buf_out[..length]`. Pulses `ECON1.TXRST` first if a prior
    /// transmission latched `EIR.TXERIF`, per spec.md §4.1's transmit
    /// errata disposition.
    pub fn send(&mut self, buf_out: &[u8], length: u16) -> Result<(), NicError<E>> {
        if self.read_control(EIR)? & EIR_TXERIF != 0 {
            self.bit_field_set(ECON1, ECON1_TXRST)?;
            self.bit_field_clear(ECON1, ECON1_TXRST)?;
            self.bit_field_clear(EIR, EIR_TXERIF)?;
        }

        self.write_u16(EWRPTL, EWRPTH, TXSTART_INIT)?;
        self.write_u16(ETXNDL, ETXNDH, TXSTART_INIT + length)?;

        self.mem_write(&[0x00])?;
        self.mem_write(&buf_out[..length as usize])?;

        self.bit_field_set(ECON1, ECON1_TXRTS)?;
        while self.read_control(ECON1)? & ECON1_TXRTS != 0 {}

        if self.read_control(ESTAT)? & ESTAT_TXABRT != 0 {
            self.bit_field_clear(ESTAT, ESTAT_TXABRT)?;
            return Err(NicError::TransmitAborted);
        }
        Ok(())
    }

    /// Drain one frame into `buf_in` if the chip has one queued, returning
    /// the number of bytes written (0 if `EPKTCNT` was zero). Implements
    /// the B4 odd-`ERXRDPT` errata: the value written back is never an
    /// even address.
    pub fn poll_receive(&mut self, buf_in: &mut [u8], mtu_in: usize) -> Result<u16, NicError<E>> {
        if self.read_control(EPKTCNT)? == 0 {
            return Ok(0);
        }

        self.write_u16(ERDPTL, ERDPTH, self.next_packet_ptr)?;

        let mut header = [0u8; 6];
        self.mem_read(&mut header)?;
        let next_packet_ptr = u16::from_le_bytes([header[0], header[1]]);
        let byte_count = u16::from_le_bytes([header[2], header[3]]);
        let status = header[5];

        let mut length = byte_count.saturating_sub(4);
        if status & RSV_RECEIVE_OK == 0 {
            length = 0;
        }
        if length as usize > mtu_in {
            length = mtu_in as u16;
        }

        if length > 0 {
            self.mem_read(&mut buf_in[..length as usize])?;
        }
        if (mtu_in) < buf_in.len() {
            buf_in[mtu_in] = 0;
        }

        let new_rdpt = if next_packet_ptr > RXSTOP_INIT {
            RXSTOP_INIT
        } else {
            next_packet_ptr.wrapping_sub(1)
        };
        self.next_packet_ptr = next_packet_ptr;
        self.write_u16(ERXRDPTL, ERXRDPTH, new_rdpt)?;
        self.bit_field_set(ECON2, ECON2_PKTDEC)?;

        Ok(length)
    }

    fn soft_reset(&mut self) -> Result<(), NicError<E>> {
        self.spi.write(&[ECON1.opcode(Op::Src)]).map_err(NicError::Spi)?;
        self.bank = None;
        Ok(())
    }

    fn mem_read(&mut self, data: &mut [u8]) -> Result<(), NicError<E>> {
        let opcode = [ECON1.opcode(Op::Rbm)];
        let mut ops = [Operation::Write(&opcode), Operation::Read(data)];
        self.spi.transaction(&mut ops).map_err(NicError::Spi)
    }

    fn mem_write(&mut self, data: &[u8]) -> Result<(), NicError<E>> {
        let opcode = [ECON1.opcode(Op::Wbm)];
        let mut ops = [Operation::Write(&opcode), Operation::Write(data)];
        self.spi.transaction(&mut ops).map_err(NicError::Spi)
    }

    fn set_bank(&mut self, bank: Bank) -> Result<(), NicError<E>> {
        self.spi
            .write(&[ECON1.opcode(Op::Bfc), ECON1_BSEL_MASK])
            .map_err(NicError::Spi)?;
        self.spi
            .write(&[ECON1.opcode(Op::Bfs), (bank as u8) & ECON1_BSEL_MASK])
            .map_err(NicError::Spi)?;
        self.bank = Some(bank);
        Ok(())
    }

    fn select_bank(&mut self, reg: ControlRegister) -> Result<(), NicError<E>> {
        if let Some(bank) = reg.bank {
            if self.bank != Some(bank) {
                self.set_bank(bank)?;
            }
        }
        Ok(())
    }

    pub fn read_control(&mut self, reg: ControlRegister) -> Result<u8, NicError<E>> {
        self.select_bank(reg)?;
        let mut rx = [0u8; 3];
        let tx = [reg.opcode(Op::Rcr), 0, 0];
        let len = if reg.dummy { 3 } else { 2 };
        self.spi
            .transfer(&mut rx[..len], &tx[..len])
            .map_err(NicError::Spi)?;
        Ok(if reg.dummy { rx[2] } else { rx[1] })
    }

    pub fn write_control(&mut self, reg: ControlRegister, data: u8) -> Result<(), NicError<E>> {
        self.select_bank(reg)?;
        self.spi
            .write(&[reg.opcode(Op::Wcr), data])
            .map_err(NicError::Spi)
    }

    fn bit_field_set(&mut self, reg: ControlRegister, mask: u8) -> Result<(), NicError<E>> {
        self.select_bank(reg)?;
        self.spi.write(&[reg.opcode(Op::Bfs), mask]).map_err(NicError::Spi)
    }

    fn bit_field_clear(&mut self, reg: ControlRegister, mask: u8) -> Result<(), NicError<E>> {
        self.select_bank(reg)?;
        self.spi.write(&[reg.opcode(Op::Bfc), mask]).map_err(NicError::Spi)
    }

    fn read_u16(
        &mut self,
        lo: ControlRegister,
        hi: ControlRegister,
    ) -> Result<u16, NicError<E>> {
        let lo = self.read_control(lo)? as u16;
        let hi = self.read_control(hi)? as u16;
        Ok(lo | (hi << 8))
    }

    fn write_u16(
        &mut self,
        lo: ControlRegister,
        hi: ControlRegister,
        value: u16,
    ) -> Result<(), NicError<E>> {
        self.write_control(lo, (value & 0xFF) as u8)?;
        self.write_control(hi, (value >> 8) as u8)
    }

    /// The two-step PHY read of spec.md §4.1: `MIREGADR`, `MICMD.MIIRD`,
    /// poll `MISTAT.BUSY`, clear, then `MIRDH`/`MIRDL`.
    pub fn read_phy(&mut self, reg: PhyRegister) -> Result<u16, NicError<E>> {
        self.write_control(MIREGADR, reg.addr())?;
        self.write_control(MICMD, 0x01)?;
        while self.read_control(MISTAT)? & MISTAT_BUSY != 0 {}
        self.write_control(MICMD, 0x00)?;
        self.read_u16(MIRDL, MIRDH)
    }

    pub fn write_phy(&mut self, reg: PhyRegister, value: u16) -> Result<(), NicError<E>> {
        self.write_control(MIREGADR, reg.addr())?;
        self.write_u16(MIWRL, MIWRH, value)?;
        while self.read_control(MISTAT)? & MISTAT_BUSY != 0 {}
        Ok(())
    }
}
