//! The seam between a [`crate::session::Session`] and whatever carries Modbus requests to the
//! heat pump.

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("`{0}` did not resolve to any address")]
    NoAddress(String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("could not send out the request")]
    Send(#[source] std::io::Error),
    #[error("could not read data from the stream")]
    Receive(#[source] std::io::Error),
    #[error("the connection was closed by the device")]
    Closed,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("device responded with exception code {0}")]
    Exception(u8),
    #[error("device responded with an unexpected function code {0:#04x}")]
    UnexpectedResponse(u8),
    #[error("could not shut down the connection")]
    Shutdown(#[source] std::io::Error),
}

impl Error {
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception(code) => Some(*code),
            _ => None,
        }
    }
}

/// Bulk reads and single writes against the four Modbus regions.
///
/// Addresses are the 0-based protocol addresses. Requests issued while closed connect first.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Human readable description of the device this transport talks to.
    fn peer(&self) -> String;

    /// Connect, unless already connected.
    async fn open(&mut self) -> Result<(), Error>;

    async fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, Error>;

    async fn read_discrete_inputs(&mut self, address: u16, count: u16)
    -> Result<Vec<bool>, Error>;

    async fn read_input_registers(&mut self, address: u16, count: u16)
    -> Result<Vec<u16>, Error>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, Error>;

    async fn write_coil(&mut self, address: u16, value: bool) -> Result<(), Error>;

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), Error>;

    /// Drop the connection, if any.
    async fn close(&mut self) -> Result<(), Error>;
}
