use crate::modbus::{self, ModbusTCPCodec, Operation, Request, ResponseKind};
use crate::transport::{Error, Transport};
use futures::{SinkExt, StreamExt as _};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_UNIT_ID: u8 = 1;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(clap::Parser, Clone)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Host name or IP address of the heat pump's Modbus TCP interface.
    host: String,

    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    /// The Modbus unit ID of the heat pump.
    #[arg(long, short = 'u', default_value_t = DEFAULT_UNIT_ID)]
    unit_id: u8,

    /// If the Modbus response isn't received in this amount of time, consider the request
    /// failed and drop the connection.
    #[arg(long, default_value = "3s")]
    read_timeout: humantime::Duration,
}

impl Args {
    pub fn options(&self) -> Options {
        Options {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
            read_timeout: *self.read_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub read_timeout: Duration,
}

impl Options {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id: DEFAULT_UNIT_ID,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

type TcpIo = Framed<TcpStream, ModbusTCPCodec>;

/// Modbus TCP client that runs one request at a time over a lazily established connection.
pub struct TcpTransport {
    options: Options,
    io: Option<TcpIo>,
    next_transaction_id: u16,
}

impl TcpTransport {
    pub fn new(options: Options) -> Self {
        Self { options, io: None, next_transaction_id: 0 }
    }

    async fn connect(&self) -> Result<TcpIo, Error> {
        let address = self.peer();
        info!(message = "connecting...", address);
        let addresses = tokio::net::lookup_host((self.options.host.as_str(), self.options.port))
            .await
            .map_err(|e| Error::LookupHost(e, address.clone()))?
            .collect::<Vec<_>>();
        debug!(message = "resolved", ?addresses);
        if addresses.is_empty() {
            return Err(Error::NoAddress(address));
        }
        let socket =
            TcpStream::connect(&*addresses).await.map_err(|e| Error::Connect(e, address))?;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        info!(message = "connected");
        Ok(Framed::new(socket, ModbusTCPCodec {}))
    }

    /// Send out `operation` and wait for its response.
    ///
    /// Any failure other than an exception response drops the connection, so that the next
    /// request starts afresh.
    async fn request(&mut self, operation: Operation) -> Result<ResponseKind, Error> {
        let mut io = match self.io.take() {
            Some(io) => io,
            None => self.connect().await?,
        };
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = transaction_id.wrapping_add(1);
        let request = Request { unit_id: self.options.unit_id, transaction_id, operation };
        let timeout = self.options.read_timeout;
        let response = tokio::time::timeout(timeout, exchange(&mut io, &request))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        self.io = Some(io);
        if response.function_code & 0x7F != operation.function_code() {
            return Err(Error::UnexpectedResponse(response.function_code));
        }
        match response.kind {
            ResponseKind::ErrorCode(code) => Err(Error::Exception(code)),
            kind => Ok(kind),
        }
    }

    async fn read_bits(&mut self, operation: Operation, count: u16) -> Result<Vec<bool>, Error> {
        match self.request(operation).await? {
            ResponseKind::Bits(bytes) => Ok(modbus::unpack_bits(&bytes, count)),
            _ => Err(Error::UnexpectedResponse(operation.function_code())),
        }
    }

    async fn read_words(&mut self, operation: Operation) -> Result<Vec<u16>, Error> {
        match self.request(operation).await? {
            ResponseKind::Words(words) => Ok(words),
            _ => Err(Error::UnexpectedResponse(operation.function_code())),
        }
    }
}

async fn exchange(io: &mut TcpIo, request: &Request) -> Result<modbus::Response, Error> {
    io.send(request).await.map_err(Error::Send)?;
    loop {
        let response = match io.next().await {
            None => return Err(Error::Closed),
            Some(response) => response.map_err(Error::Receive)?,
        };
        trace!(message = "decoded a response", transaction = response.transaction_id);
        if response.transaction_id != request.transaction_id {
            debug!(
                message = "a response we were not expecting",
                transaction = response.transaction_id,
                expected = request.transaction_id,
            );
            continue;
        }
        return Ok(response);
    }
}

impl Transport for TcpTransport {
    fn peer(&self) -> String {
        format!("{}:{}", self.options.host, self.options.port)
    }

    async fn open(&mut self) -> Result<(), Error> {
        if self.io.is_none() {
            self.io = Some(self.connect().await?);
        }
        Ok(())
    }

    async fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, Error> {
        self.read_bits(Operation::ReadCoils { address, count }, count).await
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, Error> {
        self.read_bits(Operation::ReadDiscreteInputs { address, count }, count).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, Error> {
        self.read_words(Operation::ReadInputs { address, count }).await
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, Error> {
        self.read_words(Operation::ReadHoldings { address, count }).await
    }

    async fn write_coil(&mut self, address: u16, value: bool) -> Result<(), Error> {
        let operation = Operation::WriteCoil { address, value };
        match self.request(operation).await? {
            ResponseKind::WriteCoil { .. } => Ok(()),
            _ => Err(Error::UnexpectedResponse(operation.function_code())),
        }
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), Error> {
        let operation = Operation::WriteHolding { address, value };
        match self.request(operation).await? {
            ResponseKind::WriteHolding { .. } => Ok(()),
            _ => Err(Error::UnexpectedResponse(operation.function_code())),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        let Some(mut io) = self.io.take() else {
            return Ok(());
        };
        debug!(message = "closing the connection", peer = self.peer());
        SinkExt::<&Request>::close(&mut io).await.map_err(Error::Shutdown)
    }
}
