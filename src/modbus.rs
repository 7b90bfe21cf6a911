use tokio_util::bytes::Buf;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Most registers a single read may ask for.
pub const MAX_READ_COUNT: u16 = 125;

const MBAP_HEADER_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadCoils { address: u16, count: u16 },
    ReadDiscreteInputs { address: u16, count: u16 },
    ReadHoldings { address: u16, count: u16 },
    ReadInputs { address: u16, count: u16 },
    WriteCoil { address: u16, value: bool },
    WriteHolding { address: u16, value: u16 },
}

impl Operation {
    pub fn function_code(&self) -> u8 {
        match self {
            Operation::ReadCoils { .. } => 1,
            Operation::ReadDiscreteInputs { .. } => 2,
            Operation::ReadHoldings { .. } => 3,
            Operation::ReadInputs { .. } => 4,
            Operation::WriteCoil { .. } => 5,
            Operation::WriteHolding { .. } => 6,
        }
    }

    /// The address and the second word of the request PDU.
    fn operands(&self) -> (u16, u16) {
        match *self {
            Operation::ReadCoils { address, count }
            | Operation::ReadDiscreteInputs { address, count }
            | Operation::ReadHoldings { address, count }
            | Operation::ReadInputs { address, count } => (address, count),
            Operation::WriteCoil { address, value } => (address, if value { 0xFF00 } else { 0 }),
            Operation::WriteHolding { address, value } => (address, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub unit_id: u8,
    pub transaction_id: u16,
    /// As received, i.e. with the high bit set for exceptions.
    pub function_code: u8,
    pub kind: ResponseKind,
}

impl Response {
    pub fn exception_code(&self) -> Option<u8> {
        match &self.kind {
            ResponseKind::ErrorCode(c) => Some(*c),
            ResponseKind::Bits(_)
            | ResponseKind::Words(_)
            | ResponseKind::WriteCoil { .. }
            | ResponseKind::WriteHolding { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    ErrorCode(u8),
    /// Packed bits of a coil or discrete input read, least significant bit first.
    Bits(Vec<u8>),
    Words(Vec<u16>),
    WriteCoil { address: u16, value: bool },
    WriteHolding { address: u16, value: u16 },
}

impl ResponseKind {
    fn decode(function_code: u8, payload: &[u8]) -> Option<Self> {
        if function_code & 0x80 != 0 {
            return payload.first().map(|c| Self::ErrorCode(*c));
        }
        Some(match (function_code, payload) {
            (1 | 2, [length, bits @ ..]) => {
                let bits = bits.get(..usize::from(*length))?;
                Self::Bits(bits.to_vec())
            }
            (3 | 4, [length, words @ ..]) => {
                let words = words.get(..usize::from(*length))?;
                let words = words.chunks_exact(2).map(|w| u16::from_be_bytes([w[0], w[1]]));
                Self::Words(words.collect())
            }
            (5, [a, b, v, 0]) => Self::WriteCoil {
                address: u16::from_be_bytes([*a, *b]),
                value: *v == 0xFF,
            },
            (6, [a, b, c, d]) => Self::WriteHolding {
                address: u16::from_be_bytes([*a, *b]),
                value: u16::from_be_bytes([*c, *d]),
            },
            _ => return None,
        })
    }
}

/// Unpack `count` bits out of a coil or discrete input response.
pub fn unpack_bits(bytes: &[u8], count: u16) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
        .take(usize::from(count))
        .collect()
}

/// Modbus TCP framing: the MBAP header followed by the PDU.
pub struct ModbusTCPCodec {}

impl Encoder<&Request> for ModbusTCPCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        let (address, operand) = req.operation.operands();
        dst.reserve(MBAP_HEADER_LENGTH + 6);
        dst.extend(req.transaction_id.to_be_bytes());
        // Protocol 0, and 6 bytes of unit id, function code, address and operand follow.
        dst.extend([0, 0, 0, 6, req.unit_id, req.operation.function_code()]);
        dst.extend(address.to_be_bytes());
        dst.extend(operand.to_be_bytes());
        trace!(message="sending encoded", buffer=?dst);
        Ok(())
    }
}

impl Decoder for ModbusTCPCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            trace!(message="attempt at decoding", buffer=?src);
            let Some((header, remainder)) = src.split_first_chunk::<MBAP_HEADER_LENGTH>() else {
                return Ok(None);
            };
            let [t0, t1, p0, p1, l0, l1] = *header;
            let transaction_id = u16::from_be_bytes([t0, t1]);
            let proto = u16::from_be_bytes([p0, p1]);
            let length = usize::from(u16::from_be_bytes([l0, l1]));
            if proto != 0 || length < 2 {
                src.advance(1);
                continue;
            }
            let Some((data, _)) = remainder.split_at_checked(length) else {
                return Ok(None);
            };
            let [unit_id, function_code, payload @ ..] = data else {
                src.advance(1);
                continue;
            };
            let (unit_id, function_code) = (*unit_id, *function_code);
            let kind = ResponseKind::decode(function_code, payload);
            src.advance(MBAP_HEADER_LENGTH + length);
            match kind {
                Some(kind) => {
                    return Ok(Some(Response { unit_id, transaction_id, function_code, kind }));
                }
                None => {
                    debug!(message = "skipping a malformed response", transaction_id, function_code);
                    continue;
                }
            }
        }
    }
}
