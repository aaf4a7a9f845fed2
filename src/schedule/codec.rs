//! Binary encoding of a [`Schedule`].
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic    u32   "K2SA"
//! version  u8
//! jobs     u32
//! machines u32
//! per machine:
//!   len    u32
//!   jobs   len x u32
//! checksum u32   FNV-1a over every preceding byte
//! ```
//!
//! Only the orders are stored; the incidence matrix is rebuilt on decode.

use std::sync::Arc;

use super::instance::Instance;
use super::solution::{validate_orders, Schedule};
use crate::error::DecodeError;

const MAGIC: u32 = u32::from_le_bytes(*b"K2SA");
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;
const CHECKSUM_LEN: usize = 4;

impl Schedule {
    /// Encodes the orders into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let words = self.orders().len() + self.instance().jobs() as usize;
        let mut out = Vec::with_capacity(HEADER_LEN + words * 4 + CHECKSUM_LEN);
        self.serialize_into(&mut out);
        out
    }

    /// Appends the encoding to `out`.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        encode_orders(self.instance(), self.orders(), out);
    }

    /// Replaces this schedule's assignment with the one in `bytes`.
    ///
    /// On error `self` is left exactly as it was.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let orders = decode_orders(self.instance(), bytes)?;
        self.replace_orders(orders);
        Ok(())
    }

    /// Decodes a new schedule for `instance`.
    pub fn decode(instance: Arc<Instance>, bytes: &[u8]) -> Result<Schedule, DecodeError> {
        let orders = decode_orders(&instance, bytes)?;
        Schedule::from_orders(instance, orders)
    }
}

fn encode_orders(instance: &Instance, orders: &[Vec<u32>], out: &mut Vec<u8>) {
    let start = out.len();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.push(VERSION);
    out.extend_from_slice(&instance.jobs().to_le_bytes());
    out.extend_from_slice(&instance.machines().to_le_bytes());
    for order in orders {
        out.extend_from_slice(&(order.len() as u32).to_le_bytes());
        for &job in order {
            out.extend_from_slice(&job.to_le_bytes());
        }
    }
    let checksum = fnv1a(&out[start..]);
    out.extend_from_slice(&checksum.to_le_bytes());
}

fn decode_orders(instance: &Instance, bytes: &[u8]) -> Result<Vec<Vec<u32>>, DecodeError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: HEADER_LEN + CHECKSUM_LEN,
            available: bytes.len(),
        });
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);

    let mut reader = Reader::new(body);
    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = fnv1a(body);
    if stored != computed {
        return Err(DecodeError::Checksum { stored, computed });
    }

    let version = reader.u8()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let jobs = reader.u32()?;
    if jobs != instance.jobs() {
        return Err(DecodeError::JobCount {
            expected: instance.jobs(),
            found: jobs,
        });
    }
    let machines = reader.u32()?;
    if machines != instance.machines() {
        return Err(DecodeError::MachineCount {
            expected: instance.machines(),
            found: machines,
        });
    }

    let mut orders = Vec::with_capacity(machines as usize);
    for _ in 0..machines {
        let len = reader.u32()? as usize;
        reader.ensure(len.saturating_mul(4))?;
        let mut order = Vec::with_capacity(len);
        for _ in 0..len {
            order.push(reader.u32()?);
        }
        orders.push(order);
    }
    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    validate_orders(instance, &orders)?;
    Ok(orders)
}

/// Bounds-checked little-endian reader.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.ensure(N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u32::from(b)).wrapping_mul(PRIME))
}
